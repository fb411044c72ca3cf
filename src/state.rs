//! Shared run state: compiled rules, ignore map, counters and the kill flag.
//!
//! Both loops hold an `Arc<RunState>` threaded in through [`RunContext`];
//! there is no ambient global state. Each shared map sits behind its own
//! mutex; writers never need multi-key atomicity, and each loop is strictly
//! single-threaded internally.

use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use crate::config::{AccountConfig, ClientConfig};
use crate::course::Course;
use crate::rules::RuleSet;

pub struct RunState {
    rules: RuleSet,
    kill: AtomicBool,
    login_loops: AtomicU64,
    election_loops: AtomicU64,
    /// Append-only `(course, reason)` pairs; insertion order preserved for
    /// display, first reason wins.
    ignored: Mutex<Vec<(Course, String)>>,
    errors: Mutex<BTreeMap<String, u64>>,
}

impl RunState {
    pub fn new(rules: RuleSet) -> Self {
        Self {
            rules,
            kill: AtomicBool::new(false),
            login_loops: AtomicU64::new(0),
            election_loops: AtomicU64::new(0),
            ignored: Mutex::new(Vec::new()),
            errors: Mutex::new(BTreeMap::new()),
        }
    }

    pub fn rules(&self) -> &RuleSet {
        &self.rules
    }

    pub fn kill(&self) {
        self.kill.store(true, Ordering::SeqCst);
    }

    pub fn killed(&self) -> bool {
        self.kill.load(Ordering::SeqCst)
    }

    pub fn bump_login_loop(&self) -> u64 {
        self.login_loops.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub fn bump_election_loop(&self) -> u64 {
        self.election_loops.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Record a permanent ignore. The first reason wins; repeated calls for
    /// the same course are no-ops. Returns whether the entry was inserted.
    pub fn ignore(&self, course: Course, reason: impl Into<String>) -> bool {
        let mut ignored = self.ignored.lock().expect("ignore map poisoned");
        if ignored.iter().any(|(c, _)| *c == course) {
            return false;
        }
        ignored.push((course, reason.into()));
        true
    }

    pub fn is_ignored(&self, course: &Course) -> bool {
        self.ignored
            .lock()
            .expect("ignore map poisoned")
            .iter()
            .any(|(c, _)| c == course)
    }

    /// Goals not yet ignored, in goal order.
    pub fn candidates(&self) -> Vec<Course> {
        let ignored = self.ignored.lock().expect("ignore map poisoned");
        self.rules
            .goals()
            .iter()
            .filter(|g| !ignored.iter().any(|(c, _)| c == *g))
            .cloned()
            .collect()
    }

    pub fn has_candidates(&self) -> bool {
        !self.candidates().is_empty()
    }

    pub fn count_error(&self, kind: &str) {
        let mut errors = self.errors.lock().expect("error counters poisoned");
        *errors.entry(kind.to_string()).or_insert(0) += 1;
    }

    pub fn snapshot(&self) -> Snapshot {
        let ignored = self.ignored.lock().expect("ignore map poisoned");
        let errors = self.errors.lock().expect("error counters poisoned");
        let goals: Vec<String> = self.rules.goals().iter().map(|c| c.to_string()).collect();
        let current = self
            .rules
            .goals()
            .iter()
            .filter(|g| !ignored.iter().any(|(c, _)| c == *g))
            .map(|c| c.to_string())
            .collect();
        Snapshot {
            goals,
            current,
            ignored: ignored
                .iter()
                .map(|(c, reason)| IgnoredCourse {
                    course: c.to_string(),
                    reason: reason.clone(),
                })
                .collect(),
            login_loop: self.login_loops.load(Ordering::Relaxed),
            election_loop: self.election_loops.load(Ordering::Relaxed),
            error_count: errors.values().sum(),
            errors: errors.clone(),
        }
    }
}

/// Read-only view of the run, suitable for a monitor collaborator to poll.
#[derive(Debug, Clone, Serialize)]
pub struct Snapshot {
    pub goals: Vec<String>,
    pub current: Vec<String>,
    pub ignored: Vec<IgnoredCourse>,
    pub login_loop: u64,
    pub election_loop: u64,
    pub error_count: u64,
    pub errors: BTreeMap<String, u64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct IgnoredCourse {
    pub course: String,
    pub reason: String,
}

/// Explicitly constructed context passed into both loops.
#[derive(Clone)]
pub struct RunContext {
    pub state: Arc<RunState>,
    pub account: AccountConfig,
    pub client: ClientConfig,
}

impl RunContext {
    pub fn new(state: Arc<RunState>, account: AccountConfig, client: ClientConfig) -> Self {
        Self {
            state,
            account,
            client,
        }
    }
}
