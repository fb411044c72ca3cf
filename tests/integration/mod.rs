//! Integration tests for the election engine.
//!
//! Scripted fakes stand in for the auth service, the elective portal and the
//! captcha recognizer, so the two worker loops can be driven end to end
//! through realistic page sequences.

pub mod election_flow;
pub mod fakes;
pub mod helpers;
pub mod login_flow;
