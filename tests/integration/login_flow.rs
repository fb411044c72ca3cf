//! Login handshake scenarios.

use std::sync::atomic::Ordering;

use elector::config::Identity;
use elector::outcome::{AuthError, PortalError};

use crate::fakes::{page, FakeAuth, FakePortal, FakeRecognizer, SIDA};
use crate::helpers::{account, course, goal, reason_for, run_engine};

#[test]
fn transient_auth_failure_retries_the_same_handle() {
    let g = course("大学英语", 3, "外国语学院");
    let goals = [goal("g", &g)];

    let portal = FakePortal::new();
    portal.push_page(page(&[], &[&g]));

    let auth = FakeAuth::new();
    auth.push_failure(PortalError::Auth(AuthError::NotSuccess("系统繁忙".into())));

    let run = run_engine(
        account(),
        1,
        &goals,
        &[],
        &[],
        portal,
        auth.clone(),
        FakeRecognizer::new(),
    );

    run.expect_clean_exit();
    assert_eq!(auth.calls.load(Ordering::SeqCst), 2);
    assert_eq!(run.state.snapshot().errors["auth_not_success"], 1);
    assert_eq!(reason_for(&run, &g).as_deref(), Some("Elected"));
}

#[test]
fn bad_credentials_abort_the_whole_run() {
    let g = course("大学英语", 3, "外国语学院");
    let goals = [goal("g", &g)];

    let portal = FakePortal::new();
    let auth = FakeAuth::new();
    auth.push_failure(PortalError::Auth(AuthError::BadCredentials));

    let run = run_engine(
        account(),
        1,
        &goals,
        &[],
        &[],
        portal.clone(),
        auth,
        FakeRecognizer::new(),
    );

    assert!(run.login.is_err());
    assert!(
        run.election.is_ok(),
        "election loop failed: {:?}",
        run.election
    );
    assert!(run.state.killed());
    assert!(portal.elect_calls.lock().unwrap().is_empty());
    assert_eq!(run.state.snapshot().errors["bad_credentials"], 1);
}

#[test]
fn dual_degree_account_selects_its_identity() {
    let g = course("高等代数", 1, "数学科学学院");
    let goals = [goal("g", &g)];

    let portal = FakePortal::new();
    portal.push_page(page(&[], &[&g]));

    let mut account = account();
    account.dual_degree = true;
    account.identity = Some(Identity::Minor);

    let run = run_engine(
        account,
        1,
        &goals,
        &[],
        &[],
        portal.clone(),
        FakeAuth::new(),
        FakeRecognizer::new(),
    );

    run.expect_clean_exit();
    let selections = portal.identity_selections.lock().unwrap();
    assert_eq!(*selections, vec![(SIDA.to_string(), "bfx".to_string())]);
}
