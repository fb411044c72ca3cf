//! Check command - validates the configuration and compiles the rules
//! without touching the network.

use anyhow::Result;
use colored::Colorize;
use std::path::Path;

use crate::config::Config;
use crate::rules::RuleSet;

pub fn execute(config_path: &Path) -> Result<()> {
    let config = Config::load(config_path)?;
    let rules = RuleSet::compile(&config.goals, &config.rules.mutexes, &config.rules.delays)?;

    println!(
        "{} Configuration {} is valid",
        "✓".green().bold(),
        config_path.display()
    );
    println!("  Goals:      {}", rules.len());
    println!("  Mutexes:    {}", config.rules.mutexes.len());
    println!("  Delays:     {}", config.rules.delays.len());
    println!("  Pool size:  {}", config.client.pool_size);
    if config.account.dual_degree {
        println!("  Dual degree account");
    }
    if config.captcha.command.is_none() {
        println!(
            "{} captcha.command is not set; `elector run` will refuse to start",
            "!".yellow().bold()
        );
    }
    Ok(())
}
