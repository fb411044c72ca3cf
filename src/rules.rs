//! Rule compiler: turns declarative goal/mutex/delay configuration into
//! index-aligned structures the election loop can consult without locking.
//!
//! All validation happens here, before any network I/O. The compiled
//! [`RuleSet`] is immutable for the life of the run.

use std::collections::HashMap;
use thiserror::Error;

use crate::config::{DelayDecl, GoalDecl, MutexDecl};
use crate::course::Course;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RuleError {
    #[error("goal `{0}` is declared twice")]
    DuplicateGoal(String),
    #[error("goal key `{0}` is used twice")]
    DuplicateKey(String),
    #[error("{rule} rule `{name}` references undeclared goal `{goal}`")]
    UnknownGoal {
        rule: &'static str,
        name: String,
        goal: String,
    },
    #[error("delay rules `{0}` and `{1}` target the same goal")]
    DuplicateDelay(String, String),
    #[error("delay rule `{0}` must have a positive threshold")]
    NonPositiveThreshold(String),
}

/// Compiled goal list, mutex matrix and delay thresholds.
///
/// The mutex relation is stored as a row-major `n x n` boolean matrix,
/// symmetric with a zero diagonal by construction.
#[derive(Debug, Clone)]
pub struct RuleSet {
    goals: Vec<Course>,
    index: HashMap<Course, usize>,
    mutex: Vec<bool>,
    delays: Vec<Option<u32>>,
}

impl RuleSet {
    pub fn compile(
        goals: &[GoalDecl],
        mutexes: &[MutexDecl],
        delays: &[DelayDecl],
    ) -> Result<Self, RuleError> {
        let n = goals.len();
        let mut goal_list = Vec::with_capacity(n);
        let mut index = HashMap::with_capacity(n);
        let mut keys: HashMap<&str, usize> = HashMap::new();

        for (i, decl) in goals.iter().enumerate() {
            let course = decl.course();
            if index.insert(course.clone(), i).is_some() {
                return Err(RuleError::DuplicateGoal(course.to_string()));
            }
            if let Some(key) = decl.key.as_deref() {
                if keys.insert(key, i).is_some() {
                    return Err(RuleError::DuplicateKey(key.to_string()));
                }
            }
            goal_list.push(course);
        }

        let resolve = |rule: &'static str, name: &str, goal: &str| -> Result<usize, RuleError> {
            keys.get(goal).copied().ok_or_else(|| RuleError::UnknownGoal {
                rule,
                name: name.to_string(),
                goal: goal.to_string(),
            })
        };

        let mut matrix = vec![false; n * n];
        for group in mutexes {
            let mut members = Vec::with_capacity(group.goals.len());
            for goal in &group.goals {
                members.push(resolve("mutex", &group.name, goal)?);
            }
            for (a, &i) in members.iter().enumerate() {
                for &j in &members[a + 1..] {
                    if i == j {
                        continue;
                    }
                    matrix[i * n + j] = true;
                    matrix[j * n + i] = true;
                }
            }
        }

        let mut delay_slots: Vec<Option<u32>> = vec![None; n];
        let mut delay_names: Vec<Option<&str>> = vec![None; n];
        for rule in delays {
            if rule.threshold == 0 {
                return Err(RuleError::NonPositiveThreshold(rule.name.clone()));
            }
            let i = resolve("delay", &rule.name, &rule.goal)?;
            if let Some(prev) = delay_names[i] {
                return Err(RuleError::DuplicateDelay(
                    prev.to_string(),
                    rule.name.clone(),
                ));
            }
            delay_names[i] = Some(&rule.name);
            delay_slots[i] = Some(rule.threshold);
        }

        Ok(Self {
            goals: goal_list,
            index,
            mutex: matrix,
            delays: delay_slots,
        })
    }

    pub fn goals(&self) -> &[Course] {
        &self.goals
    }

    pub fn len(&self) -> usize {
        self.goals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.goals.is_empty()
    }

    pub fn index_of(&self, course: &Course) -> Option<usize> {
        self.index.get(course).copied()
    }

    pub fn are_mutex(&self, i: usize, j: usize) -> bool {
        self.mutex[i * self.goals.len() + j]
    }

    /// Goal indices declared mutually exclusive with goal `i`.
    pub fn partners(&self, i: usize) -> impl Iterator<Item = usize> + '_ {
        let n = self.goals.len();
        (0..n).filter(move |&j| self.mutex[i * n + j])
    }

    pub fn delay(&self, i: usize) -> Option<u32> {
        self.delays[i]
    }

    pub fn delays(&self) -> &[Option<u32>] {
        &self.delays
    }
}
