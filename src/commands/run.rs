//! Run command - wires up the pool, the two worker loops and the optional
//! monitor, then waits for the run to finish.

use anyhow::{anyhow, Context, Result};
use colored::Colorize;
use std::path::Path;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crate::captcha::CommandRecognizer;
use crate::config::Config;
use crate::loops::{ElectionLoop, LoginLoop};
use crate::monitor::Monitor;
use crate::pool::ClientPool;
use crate::portal::auth::IaaaClient;
use crate::portal::client::ElectiveClient;
use crate::rules::RuleSet;
use crate::state::{RunContext, RunState};

pub fn execute(config_path: &Path, monitor_flag: bool) -> Result<()> {
    let config = Config::load(config_path)?;
    let rules = RuleSet::compile(&config.goals, &config.rules.mutexes, &config.rules.delays)?;
    let command = config
        .captcha
        .command
        .clone()
        .context("captcha.command must be configured before starting a run")?;

    let state = Arc::new(RunState::new(rules));
    let ctx = RunContext::new(
        Arc::clone(&state),
        config.account.clone(),
        config.client.clone(),
    );

    let timeout = config.client.timeout();
    let mut clients = Vec::with_capacity(config.client.pool_size);
    for _ in 0..config.client.pool_size {
        clients.push(ElectiveClient::new(timeout)?);
    }
    let mut clients = clients.into_iter();
    let (pool, receivers) = ClientPool::new(config.client.pool_size, |_| {
        match clients.next() {
            Some(client) => client,
            None => unreachable!("pool sized to client count"),
        }
    });

    {
        let state = Arc::clone(&state);
        let pool = pool.clone();
        ctrlc::set_handler(move || {
            println!("\n{} Interrupt received, shutting down...", "→".cyan().bold());
            state.kill();
            pool.shutdown_ready();
            pool.shutdown_needs_auth();
        })
        .context("Failed to install interrupt handler")?;
    }

    println!(
        "{} Starting run: {} goals, pool of {}",
        "→".cyan().bold(),
        state.rules().len(),
        config.client.pool_size
    );

    let login_handle = {
        let login = LoginLoop::new(
            ctx.clone(),
            pool.clone(),
            receivers.needs_auth,
            IaaaClient::new(timeout),
        );
        thread::Builder::new()
            .name("login-loop".to_string())
            .spawn(move || login.run())
            .context("Failed to spawn login loop")?
    };

    let election_handle = {
        let election = ElectionLoop::new(
            ctx.clone(),
            pool.clone(),
            receivers.ready,
            CommandRecognizer::new(command),
        );
        thread::Builder::new()
            .name("election-loop".to_string())
            .spawn(move || election.run())
            .context("Failed to spawn election loop")?
    };

    let monitor_handle = if monitor_flag || config.monitor.enabled {
        let monitor = Monitor::new(config.monitor.socket.clone(), Arc::clone(&state));
        Some(
            thread::Builder::new()
                .name("monitor".to_string())
                .spawn(move || monitor.run())
                .context("Failed to spawn monitor")?,
        )
    } else {
        None
    };

    let login_result = join_loop(login_handle, "login loop");
    let election_result = join_loop(election_handle, "election loop");

    // The monitor only winds down once the kill flag is up.
    state.kill();
    if let Some(handle) = monitor_handle {
        if let Err(err) = join_loop(handle, "monitor") {
            eprintln!("{} Monitor failed: {err:#}", "!".yellow().bold());
        }
    }

    print_summary(&state);
    login_result.and(election_result)
}

fn join_loop(handle: JoinHandle<Result<()>>, name: &str) -> Result<()> {
    handle
        .join()
        .map_err(|_| anyhow!("{name} thread panicked"))?
}

fn print_summary(state: &RunState) {
    let snapshot = state.snapshot();

    println!("\n{}", "Run summary".bold().blue());
    println!(
        "  Loops: {} login, {} election",
        snapshot.login_loop, snapshot.election_loop
    );
    for entry in &snapshot.ignored {
        if entry.reason == "Elected" {
            println!("  {} {}", "✓".green().bold(), entry.course);
        } else {
            println!("  {} {} ({})", "─".dimmed(), entry.course, entry.reason);
        }
    }
    for course in &snapshot.current {
        println!("  {} {} (still pending)", "…".yellow(), course);
    }
    if snapshot.error_count > 0 {
        println!("  {} errors:", snapshot.error_count);
        for (kind, count) in &snapshot.errors {
            println!("    {kind}: {count}");
        }
    }
}
