//! TOML configuration surface.
//!
//! One file declares the account, client tuning, the ordered goal list and
//! the named mutex/delay rules. Everything is validated before any network
//! I/O: structural problems are caught here, rule-level problems by
//! [`crate::rules::RuleSet::compile`].

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::course::Course;

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    pub account: AccountConfig,
    #[serde(default)]
    pub client: ClientConfig,
    #[serde(default)]
    pub captcha: CaptchaConfig,
    #[serde(default)]
    pub monitor: MonitorConfig,
    #[serde(default, rename = "goal")]
    pub goals: Vec<GoalDecl>,
    #[serde(default)]
    pub rules: RulesConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AccountConfig {
    pub student_id: String,
    pub password: String,
    /// Accounts holding two degree programs need an extra identity-selection
    /// handshake after SSO login.
    #[serde(default)]
    pub dual_degree: bool,
    pub identity: Option<Identity>,
}

/// Which identity a dual-degree account elects under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Identity {
    Major,
    Minor,
}

impl Identity {
    /// The portal's `sttp` parameter value.
    pub fn sttp(self) -> &'static str {
        match self {
            Identity::Major => "bzx",
            Identity::Minor => "bfx",
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct ClientConfig {
    /// Number of session handles in the pool.
    pub pool_size: usize,
    /// Base sleep between election iterations, seconds.
    pub refresh_interval_secs: u64,
    /// Jitter fraction applied to the refresh interval, in `[0, 1)`.
    pub refresh_jitter: f64,
    /// Maximum session lifetime before a handle is proactively re-logged-in.
    /// Unset means sessions are trusted until the portal invalidates them.
    pub session_lifetime_secs: Option<u64>,
    /// Which page of the enrollment-status listing to poll.
    pub supply_cancel_page: u32,
    /// Sleep between failed login attempts, seconds.
    pub login_retry_interval_secs: u64,
    /// Per-request timeout, seconds.
    pub timeout_secs: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            pool_size: 2,
            refresh_interval_secs: 8,
            refresh_jitter: 0.2,
            session_lifetime_secs: None,
            supply_cancel_page: 1,
            login_retry_interval_secs: 2,
            timeout_secs: 30,
        }
    }
}

impl ClientConfig {
    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_interval_secs)
    }

    pub fn session_lifetime(&self) -> Option<Duration> {
        self.session_lifetime_secs.map(Duration::from_secs)
    }

    pub fn login_retry_interval(&self) -> Duration {
        Duration::from_secs(self.login_retry_interval_secs)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CaptchaConfig {
    /// External recognizer command. It receives the captcha image on stdin
    /// and must print the recognized code on stdout.
    pub command: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct MonitorConfig {
    pub enabled: bool,
    pub socket: PathBuf,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            socket: PathBuf::from("elector.sock"),
        }
    }
}

/// One declared goal. `key` is the handle mutex/delay rules refer to.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GoalDecl {
    pub key: Option<String>,
    pub name: String,
    pub class_no: u32,
    pub school: String,
}

impl GoalDecl {
    pub fn course(&self) -> Course {
        Course::new(self.name.clone(), self.class_no, self.school.clone())
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RulesConfig {
    #[serde(default, rename = "mutex")]
    pub mutexes: Vec<MutexDecl>,
    #[serde(default, rename = "delay")]
    pub delays: Vec<DelayDecl>,
}

/// Named group of goals of which at most one may be held.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MutexDecl {
    pub name: String,
    pub goals: Vec<String>,
}

/// Named rule deferring one goal until its remaining seats drop to the
/// threshold.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DelayDecl {
    pub name: String,
    pub goal: String,
    pub threshold: u32,
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let config: Config = toml::from_str(&raw)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    /// Structural validation. Rule semantics (unknown goal references,
    /// duplicate delays, duplicate triples) are checked by the rule compiler.
    pub fn validate(&self) -> Result<()> {
        if self.account.student_id.trim().is_empty() {
            bail!("account.student_id must not be empty");
        }
        if self.account.password.is_empty() {
            bail!("account.password must not be empty");
        }
        if self.account.dual_degree && self.account.identity.is_none() {
            bail!("account.identity is required when dual_degree is enabled");
        }
        if self.goals.is_empty() {
            bail!("at least one [[goal]] must be declared");
        }
        if self.client.pool_size == 0 {
            bail!("client.pool_size must be at least 1");
        }
        if !(0.0..1.0).contains(&self.client.refresh_jitter) {
            bail!(
                "client.refresh_jitter must be in [0, 1), got {}",
                self.client.refresh_jitter
            );
        }
        if self.client.supply_cancel_page == 0 {
            bail!("client.supply_cancel_page is 1-based");
        }
        Ok(())
    }
}
