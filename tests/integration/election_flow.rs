//! End-to-end election scenarios driven through scripted enrollment pages.

use std::sync::atomic::Ordering;

use elector::outcome::{ElectOutcome, PortalError, SystemError};
use elector::portal::CaptchaVerdict;

use crate::fakes::{page, Candidate, FakeAuth, FakePortal, FakeRecognizer};
use crate::helpers::{account, course, delay, goal, mutex, reason_for, run_engine};

#[test]
fn full_course_is_skipped_and_open_course_elected() {
    let x = course("线性代数", 1, "数学科学学院");
    let y = course("普通物理", 2, "物理学院");
    let goals = [goal("x", &x), goal("y", &y)];

    let portal = FakePortal::new();
    // Round 1: X has no vacancy, Y is open.
    portal.push_page(page(
        &[
            Candidate { course: &x, max: 30, used: 30, action: None },
            Candidate { course: &y, max: 120, used: 110, action: Some("/y") },
        ],
        &[],
    ));
    portal.stage_outcome("/y", ElectOutcome::Success);
    // Round 2: Y confirmed elected, a seat opened in X.
    portal.push_page(page(
        &[Candidate { course: &x, max: 30, used: 29, action: Some("/x") }],
        &[&y],
    ));
    portal.stage_outcome("/x", ElectOutcome::TimeConflict);

    let run = run_engine(
        account(),
        2,
        &goals,
        &[],
        &[],
        portal.clone(),
        FakeAuth::new(),
        FakeRecognizer::new(),
    );

    run.expect_clean_exit();
    assert_eq!(*portal.elect_calls.lock().unwrap(), vec!["/y", "/x"]);
    assert_eq!(reason_for(&run, &y).as_deref(), Some("Elected"));
    assert_eq!(reason_for(&run, &x).as_deref(), Some("Time conflict"));
    assert_eq!(run.state.snapshot().errors["time_conflict"], 1);
    assert!(!run.state.has_candidates());
}

#[test]
fn mutex_partner_is_dropped_in_the_same_iteration() {
    let a = course("课程甲", 1, "学院甲");
    let b = course("课程乙", 1, "学院乙");
    let goals = [goal("a", &a), goal("b", &b)];

    let portal = FakePortal::new();
    // Both open in the same round; only A may be attempted once it succeeds.
    portal.push_page(page(
        &[
            Candidate { course: &a, max: 10, used: 5, action: Some("/a") },
            Candidate { course: &b, max: 10, used: 5, action: Some("/b") },
        ],
        &[],
    ));
    portal.stage_outcome("/a", ElectOutcome::Success);
    portal.push_page(page(
        &[Candidate { course: &b, max: 10, used: 5, action: Some("/b") }],
        &[&a],
    ));

    let run = run_engine(
        account(),
        2,
        &goals,
        &[mutex("ab", &["a", "b"])],
        &[],
        portal.clone(),
        FakeAuth::new(),
        FakeRecognizer::new(),
    );

    run.expect_clean_exit();
    assert_eq!(*portal.elect_calls.lock().unwrap(), vec!["/a"]);
    assert_eq!(reason_for(&run, &a).as_deref(), Some("Elected"));
    // First reason wins: the page-confirmed "Elected" for A never overwrites
    // B's mutex drop.
    assert_eq!(reason_for(&run, &b).as_deref(), Some("Mutex rules"));
}

#[test]
fn delay_rule_defers_until_remaining_reaches_threshold() {
    let d = course("博弈论", 1, "经济学院");
    let goals = [goal("d", &d)];

    let portal = FakePortal::new();
    // 5 seats remaining, threshold 3: gated.
    portal.push_page(page(
        &[Candidate { course: &d, max: 50, used: 45, action: Some("/d1") }],
        &[],
    ));
    // 2 seats remaining: attempted.
    portal.push_page(page(
        &[Candidate { course: &d, max: 50, used: 48, action: Some("/d2") }],
        &[],
    ));
    portal.stage_outcome("/d2", ElectOutcome::Success);
    portal.push_page(page(&[], &[&d]));

    let run = run_engine(
        account(),
        1,
        &goals,
        &[],
        &[delay("wait-d", "d", 3)],
        portal.clone(),
        FakeAuth::new(),
        FakeRecognizer::new(),
    );

    run.expect_clean_exit();
    assert_eq!(*portal.elect_calls.lock().unwrap(), vec!["/d2"]);
    assert_eq!(reason_for(&run, &d).as_deref(), Some("Elected"));
}

#[test]
fn timed_out_election_routes_the_handle_through_login() {
    let g = course("数据结构", 1, "信息科学技术学院");
    let goals = [goal("g", &g)];

    let portal = FakePortal::new();
    portal.push_page(page(
        &[Candidate { course: &g, max: 40, used: 30, action: Some("/g1") }],
        &[],
    ));
    portal.stage_outcome("/g1", ElectOutcome::OperationTimedOut);
    portal.push_page(page(
        &[Candidate { course: &g, max: 40, used: 30, action: Some("/g2") }],
        &[],
    ));
    portal.stage_outcome("/g2", ElectOutcome::Success);
    portal.push_page(page(&[], &[&g]));

    let auth = FakeAuth::new();
    let run = run_engine(
        account(),
        1,
        &goals,
        &[],
        &[],
        portal.clone(),
        auth.clone(),
        FakeRecognizer::new(),
    );

    run.expect_clean_exit();
    // The single handle logged in twice: once at startup, once after the
    // timeout invalidated it.
    assert_eq!(auth.calls.load(Ordering::SeqCst), 2);
    assert_eq!(portal.resets.load(Ordering::SeqCst), 2);
    assert_eq!(run.state.snapshot().errors["operation_timed_out"], 1);
    assert_eq!(reason_for(&run, &g).as_deref(), Some("Elected"));
}

#[test]
fn rejected_captcha_is_retried_with_a_fresh_image() {
    let c = course("有机化学", 1, "化学与分子工程学院");
    let goals = [goal("c", &c)];

    let portal = FakePortal::new();
    portal.push_page(page(
        &[Candidate { course: &c, max: 20, used: 10, action: Some("/c") }],
        &[],
    ));
    portal.push_verdict(CaptchaVerdict::Rejected);
    portal.push_verdict(CaptchaVerdict::Accepted);
    portal.stage_outcome("/c", ElectOutcome::Success);
    portal.push_page(page(&[], &[&c]));

    let recognizer = FakeRecognizer::new();
    let run = run_engine(
        account(),
        1,
        &goals,
        &[],
        &[],
        portal.clone(),
        FakeAuth::new(),
        recognizer.clone(),
    );

    run.expect_clean_exit();
    assert_eq!(portal.captcha_fetches.load(Ordering::SeqCst), 2);
    assert_eq!(recognizer.calls.load(Ordering::SeqCst), 2);
    assert_eq!(*portal.elect_calls.lock().unwrap(), vec!["/c"]);
}

#[test]
fn expired_session_swaps_to_a_spare_handle() {
    let g = course("概率论", 1, "数学科学学院");
    let goals = [goal("g", &g)];

    let portal = FakePortal::new();
    portal.push_page_error(PortalError::System(SystemError::SessionExpired));
    portal.push_page(page(
        &[Candidate { course: &g, max: 40, used: 30, action: Some("/g") }],
        &[],
    ));
    portal.stage_outcome("/g", ElectOutcome::Success);
    portal.push_page(page(&[], &[&g]));

    let run = run_engine(
        account(),
        2,
        &goals,
        &[],
        &[],
        portal.clone(),
        FakeAuth::new(),
        FakeRecognizer::new(),
    );

    run.expect_clean_exit();
    assert_eq!(run.state.snapshot().errors["session_expired"], 1);
    assert_eq!(reason_for(&run, &g).as_deref(), Some("Elected"));
}

#[test]
fn transient_server_error_retries_the_same_handle() {
    let g = course("微观经济学", 2, "经济学院");
    let goals = [goal("g", &g)];

    let portal = FakePortal::new();
    portal.push_page_error(PortalError::ServerBusy(502));
    portal.push_page(page(
        &[Candidate { course: &g, max: 40, used: 39, action: Some("/g") }],
        &[],
    ));
    portal.stage_outcome("/g", ElectOutcome::Success);
    portal.push_page(page(&[], &[&g]));

    let auth = FakeAuth::new();
    let run = run_engine(
        account(),
        1,
        &goals,
        &[],
        &[],
        portal.clone(),
        auth.clone(),
        FakeRecognizer::new(),
    );

    run.expect_clean_exit();
    assert_eq!(run.state.snapshot().errors["server_busy"], 1);
    // No re-login for a transient fetch failure.
    assert_eq!(auth.calls.load(Ordering::SeqCst), 1);
    assert_eq!(reason_for(&run, &g).as_deref(), Some("Elected"));
}

#[test]
fn zero_quota_cap_is_permanently_ignored() {
    let z = course("民俗学", 1, "社会学系");
    let goals = [goal("z", &z)];

    let portal = FakePortal::new();
    portal.push_page(page(
        &[Candidate { course: &z, max: 0, used: 0, action: Some("/z") }],
        &[],
    ));

    let run = run_engine(
        account(),
        1,
        &goals,
        &[],
        &[],
        portal.clone(),
        FakeAuth::new(),
        FakeRecognizer::new(),
    );

    run.expect_clean_exit();
    assert!(portal.elect_calls.lock().unwrap().is_empty());
    assert_eq!(reason_for(&run, &z).as_deref(), Some("Quota exhausted"));
    assert_eq!(run.state.snapshot().errors["quota_exhausted"], 1);
}

#[test]
fn unchanged_page_re_poll_adds_nothing() {
    let e = course("西方哲学史", 1, "哲学系");
    let f = course("细胞生物学", 1, "生命科学学院");
    let goals = [goal("e", &e), goal("f", &f)];

    let portal = FakePortal::new();
    // The same page twice: E already elected, F full with no vacancy.
    let snapshot = page(
        &[Candidate { course: &f, max: 30, used: 30, action: None }],
        &[&e],
    );
    portal.push_page(snapshot.clone());
    portal.push_page(snapshot);
    // Terminate the run after the second poll.
    portal.push_page_error(PortalError::System(SystemError::CaughtCheating));

    let run = run_engine(
        account(),
        1,
        &goals,
        &[],
        &[],
        portal.clone(),
        FakeAuth::new(),
        FakeRecognizer::new(),
    );

    assert!(run.login.is_ok(), "login loop failed: {:?}", run.login);
    assert!(run.election.is_err());
    assert!(run.state.killed());
    // Re-scanning an unchanged page neither attempts anything nor grows the
    // ignore map: E is recorded once, F stays a plain skip.
    assert!(portal.elect_calls.lock().unwrap().is_empty());
    let snapshot = run.state.snapshot();
    assert_eq!(snapshot.ignored.len(), 1);
    assert_eq!(reason_for(&run, &e).as_deref(), Some("Elected"));
    assert_eq!(snapshot.errors["caught_cheating"], 1);
}

#[test]
fn goal_missing_from_both_tables_aborts_the_run() {
    let g = course("不存在的课", 1, "某学院");
    let other = course("别的课", 1, "别的学院");
    let goals = [goal("g", &g)];

    let portal = FakePortal::new();
    portal.push_page(page(
        &[Candidate { course: &other, max: 10, used: 5, action: None }],
        &[],
    ));

    let run = run_engine(
        account(),
        1,
        &goals,
        &[],
        &[],
        portal.clone(),
        FakeAuth::new(),
        FakeRecognizer::new(),
    );

    assert!(run.login.is_ok(), "login loop failed: {:?}", run.login);
    assert!(run.election.is_err());
    assert!(run.state.killed());
    assert_eq!(run.state.snapshot().errors["not_in_course_plan"], 1);
}
