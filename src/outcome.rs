//! Closed taxonomy of portal outcomes and the retry/ignore/abort classifier.
//!
//! The portal reports election results as free-form tips and system-error
//! pages. Everything the engine can observe is folded into the closed enums
//! here and matched exhaustively; anything the markers do not recognize lands
//! in an explicit `Unrecognized`/`Unknown` variant and fails open as a retry,
//! never silently dropping a goal.

use thiserror::Error;

/// Result of submitting one election action, as reported by the portal's
/// tips banner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ElectOutcome {
    Success,
    Repeated,
    TimeConflict,
    ExamTimeConflict,
    PermissionWindow,
    CreditLimit,
    MutexViolation,
    MultiEnglish,
    MultiPe,
    /// Synthesized by the election loop when a candidate row advertises an
    /// anomalous zero quota cap.
    QuotaExhausted,
    OperationTimedOut,
    /// The portal's generic "operation failed, try again later" tip.
    Failed,
    Unrecognized(String),
}

impl ElectOutcome {
    /// Stable key used for the error counters.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Repeated => "repeated_election",
            Self::TimeConflict => "time_conflict",
            Self::ExamTimeConflict => "exam_time_conflict",
            Self::PermissionWindow => "permission_window",
            Self::CreditLimit => "credit_limit",
            Self::MutexViolation => "mutex_violation",
            Self::MultiEnglish => "multi_english_course",
            Self::MultiPe => "multi_pe_course",
            Self::QuotaExhausted => "quota_exhausted",
            Self::OperationTimedOut => "operation_timed_out",
            Self::Failed => "election_failed",
            Self::Unrecognized(_) => "unrecognized_tip",
        }
    }
}

/// Portal system-error pages (title "系统异常"), keyed by the error text.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SystemError {
    #[error("automation detected by the portal")]
    CaughtCheating,
    #[error("sso token rejected")]
    InvalidToken,
    #[error("session expired or not logged in")]
    SessionExpired,
    #[error("outside the portal's operating window")]
    NotInOperatingTime,
    #[error("course index error")]
    CourseIndex,
    #[error("captcha rejected by the portal")]
    Captcha,
    #[error("session carries no auth info")]
    NoAuthInfo,
    #[error("session shared with another client")]
    SharedSession,
    #[error("unknown portal system error: {0}")]
    Unknown(String),
}

/// Failures of the credential handshake against the auth service.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    #[error("credentials rejected")]
    BadCredentials,
    #[error("account temporarily banned")]
    Banned,
    #[error("authentication unsuccessful: {0}")]
    NotSuccess(String),
}

/// Everything a portal call can fail with.
#[derive(Debug, Error)]
pub enum PortalError {
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("unexpected status code {0}")]
    BadStatus(u16),
    #[error("server busy ({0})")]
    ServerBusy(u16),
    #[error("malformed response: {0}")]
    Malformed(String),
    #[error(transparent)]
    System(#[from] SystemError),
    #[error(transparent)]
    Auth(#[from] AuthError),
}

impl PortalError {
    /// Stable key used for the error counters.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Transport(_) => "transport",
            Self::BadStatus(_) => "bad_status",
            Self::ServerBusy(_) => "server_busy",
            Self::Malformed(_) => "malformed_response",
            Self::System(e) => match e {
                SystemError::CaughtCheating => "caught_cheating",
                SystemError::InvalidToken => "invalid_token",
                SystemError::SessionExpired => "session_expired",
                SystemError::NotInOperatingTime => "not_in_operating_time",
                SystemError::CourseIndex => "course_index",
                SystemError::Captcha => "captcha_rejected",
                SystemError::NoAuthInfo => "no_auth_info",
                SystemError::SharedSession => "shared_session",
                SystemError::Unknown(_) => "unknown_system_error",
            },
            Self::Auth(e) => match e {
                AuthError::BadCredentials => "bad_credentials",
                AuthError::Banned => "account_banned",
                AuthError::NotSuccess(_) => "auth_not_success",
            },
        }
    }
}

/// What the engine does next with a classified outcome or error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// The course was elected; record it locally, the next page reload is the
    /// source of truth.
    Elected,
    /// Permanently stop attempting the course, with a human-readable reason.
    Ignore(&'static str),
    /// Leave the course eligible for the next iteration.
    RetryLater,
    /// The session itself is invalid; route the handle back through login.
    NeedsRelogin,
    /// Terminate the whole run.
    Fatal,
}

/// Classify an election submission result.
pub fn classify_outcome(outcome: &ElectOutcome) -> Decision {
    match outcome {
        ElectOutcome::Success => Decision::Elected,
        ElectOutcome::Repeated => Decision::Ignore("Repeated election"),
        ElectOutcome::TimeConflict => Decision::Ignore("Time conflict"),
        ElectOutcome::ExamTimeConflict => Decision::Ignore("Exam time conflict"),
        ElectOutcome::PermissionWindow => Decision::Ignore("Permission not yet open"),
        ElectOutcome::CreditLimit => Decision::Ignore("Credit limit"),
        ElectOutcome::MutexViolation => Decision::Ignore("Mutex rules"),
        ElectOutcome::MultiEnglish => Decision::Ignore("Multiple English courses"),
        ElectOutcome::MultiPe => Decision::Ignore("Multiple PE courses"),
        ElectOutcome::QuotaExhausted => Decision::Ignore("Quota exhausted"),
        ElectOutcome::OperationTimedOut => Decision::NeedsRelogin,
        ElectOutcome::Failed => Decision::RetryLater,
        ElectOutcome::Unrecognized(_) => Decision::RetryLater,
    }
}

/// Classify a portal call failure.
pub fn classify_error(err: &PortalError) -> Decision {
    match err {
        PortalError::Transport(_)
        | PortalError::BadStatus(_)
        | PortalError::ServerBusy(_)
        | PortalError::Malformed(_) => Decision::RetryLater,
        PortalError::System(e) => match e {
            SystemError::CaughtCheating => Decision::Fatal,
            SystemError::InvalidToken
            | SystemError::SessionExpired
            | SystemError::NoAuthInfo
            | SystemError::SharedSession => Decision::NeedsRelogin,
            SystemError::NotInOperatingTime
            | SystemError::CourseIndex
            | SystemError::Captcha
            | SystemError::Unknown(_) => Decision::RetryLater,
        },
        PortalError::Auth(e) => match e {
            AuthError::BadCredentials | AuthError::Banned => Decision::Fatal,
            AuthError::NotSuccess(_) => Decision::RetryLater,
        },
    }
}
