//! Portal collaborators: the auth handshake client, the elective-site client
//! and the page parsers.
//!
//! The engine talks to these through the [`AuthClient`] and
//! [`ElectivePortal`] traits so the loops can be exercised against fakes;
//! the blocking `reqwest` implementations live in [`auth`] and [`client`].

pub mod auth;
pub mod client;
pub mod parser;
pub mod validate;

pub use auth::IaaaClient;
pub use client::ElectiveClient;

use crate::outcome::{ElectOutcome, PortalError};

pub(crate) const USER_AGENT: &str =
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/71.0.3578.80 Safari/537.36";

/// The page the portal lands on after SSO login. Dual-degree identity
/// selection needs both the final URL (as referer) and the body (for the
/// session token).
#[derive(Debug, Clone)]
pub struct SsoLanding {
    pub url: String,
    pub html: String,
}

/// Result of submitting a captcha code to the validation endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaptchaVerdict {
    Accepted,
    Rejected,
    Unrecognized(String),
}

/// Credential handshake: credentials in, bearer token out.
pub trait AuthClient {
    fn oauth_login(&self, student_id: &str, password: &str) -> Result<String, PortalError>;
}

/// One authenticated elective-site session. Implementations carry their own
/// cookie jar; `reset_session` discards it.
pub trait ElectivePortal {
    fn sso_login(&self, token: &str) -> Result<SsoLanding, PortalError>;
    fn select_identity(&self, sida: &str, sttp: &str, referer: &str) -> Result<(), PortalError>;
    /// Raw HTML of the enrollment-status page (1-based page number).
    fn supply_cancel(&self, page: u32) -> Result<String, PortalError>;
    fn captcha_image(&self) -> Result<Vec<u8>, PortalError>;
    fn submit_captcha(&self, code: &str) -> Result<CaptchaVerdict, PortalError>;
    fn elect(&self, action: &str) -> Result<ElectOutcome, PortalError>;
    fn logout(&self) -> Result<(), PortalError>;
    fn reset_session(&self) -> Result<(), PortalError>;
}
