//! Harness that wires the two loops to the fakes and runs them to
//! completion.

use std::sync::Arc;
use std::thread;

use elector::config::{AccountConfig, ClientConfig, DelayDecl, GoalDecl, MutexDecl};
use elector::course::Course;
use elector::loops::{ElectionLoop, LoginLoop};
use elector::pool::ClientPool;
use elector::rules::RuleSet;
use elector::state::{RunContext, RunState};

use crate::fakes::{FakeAuth, FakePortal, FakeRecognizer, SharedAuth, SharedPortal};

pub fn course(name: &str, class_no: u32, school: &str) -> Course {
    Course::new(name, class_no, school)
}

pub fn goal(key: &str, course: &Course) -> GoalDecl {
    GoalDecl {
        key: Some(key.to_string()),
        name: course.name.clone(),
        class_no: course.class_no,
        school: course.school.clone(),
    }
}

pub fn mutex(name: &str, goals: &[&str]) -> MutexDecl {
    MutexDecl {
        name: name.to_string(),
        goals: goals.iter().map(|s| s.to_string()).collect(),
    }
}

pub fn delay(name: &str, goal: &str, threshold: u32) -> DelayDecl {
    DelayDecl {
        name: name.to_string(),
        goal: goal.to_string(),
        threshold,
    }
}

pub fn account() -> AccountConfig {
    AccountConfig {
        student_id: "1900000000".to_string(),
        password: "secret".to_string(),
        dual_degree: false,
        identity: None,
    }
}

pub struct EngineRun {
    pub state: Arc<RunState>,
    pub login: anyhow::Result<()>,
    pub election: anyhow::Result<()>,
}

impl EngineRun {
    /// Assert both loops wound down without an error, by reference so the
    /// run stays available for further assertions.
    pub fn expect_clean_exit(&self) {
        assert!(self.login.is_ok(), "login loop failed: {:?}", self.login);
        assert!(
            self.election.is_ok(),
            "election loop failed: {:?}",
            self.election
        );
    }
}

/// Run both loops against the fakes until the engine stops on its own.
/// All sleeps are zeroed so scripted scenarios finish promptly.
pub fn run_engine(
    account: AccountConfig,
    pool_size: usize,
    goals: &[GoalDecl],
    mutexes: &[MutexDecl],
    delays: &[DelayDecl],
    portal: Arc<FakePortal>,
    auth: Arc<FakeAuth>,
    recognizer: FakeRecognizer,
) -> EngineRun {
    let rules = RuleSet::compile(goals, mutexes, delays).expect("test rules compile");
    let state = Arc::new(RunState::new(rules));
    let client = ClientConfig {
        pool_size,
        refresh_interval_secs: 0,
        refresh_jitter: 0.0,
        login_retry_interval_secs: 0,
        ..ClientConfig::default()
    };
    let ctx = RunContext::new(Arc::clone(&state), account, client);

    let (pool, receivers) = ClientPool::new(pool_size, |_| SharedPortal(Arc::clone(&portal)));

    let login = {
        let login = LoginLoop::new(
            ctx.clone(),
            pool.clone(),
            receivers.needs_auth,
            SharedAuth(auth),
        );
        thread::spawn(move || login.run())
    };
    let election = {
        let election = ElectionLoop::new(ctx, pool, receivers.ready, recognizer);
        thread::spawn(move || election.run())
    };

    EngineRun {
        state,
        login: login.join().expect("login loop panicked"),
        election: election.join().expect("election loop panicked"),
    }
}

/// Reasons from the ignore map, keyed by course display name.
pub fn reason_for(run: &EngineRun, course: &Course) -> Option<String> {
    run.state
        .snapshot()
        .ignored
        .into_iter()
        .find(|entry| entry.course == course.to_string())
        .map(|entry| entry.reason)
}
