//! Election loop: the single consumer of the `ready` queue.
//!
//! One handle is in flight at a time; election attempts are deliberately
//! serialized against the remote site. Parallelism comes from having
//! pre-authenticated spares in the pool, so a stale session costs a queue
//! swap rather than a login round-trip ("no-wait" fast path).

use anyhow::{bail, Result};
use std::sync::mpsc::Receiver;
use tracing::{debug, error, info, warn};

use crate::captcha::Recognizer;
use crate::loops::{interruptible_sleep, jittered};
use crate::outcome::{classify_error, classify_outcome, Decision, PortalError};
use crate::pool::{ClientPool, Slot};
use crate::portal::parser::{self, SupplyCancelPage};
use crate::portal::{CaptchaVerdict, ElectivePortal};
use crate::session::SessionHandle;
use crate::state::RunContext;

/// Bounded retries for the known transient empty-page artifact.
const PAGE_FETCH_RETRIES: usize = 3;
/// Bounded retries for malformed captcha-validation payloads and recognizer
/// failures before the course is deferred to the next iteration.
const CAPTCHA_PAYLOAD_RETRIES: usize = 3;

enum IterationEnd {
    Sleep,
    NoWait,
}

struct AttemptsEnd {
    relogin: bool,
}

enum GateFailure {
    Portal(PortalError),
    Recognizer(anyhow::Error),
}

pub struct ElectionLoop<C, R> {
    ctx: RunContext,
    pool: ClientPool<C>,
    ready: Receiver<Slot<C>>,
    recognizer: R,
}

impl<C: ElectivePortal, R: Recognizer> ElectionLoop<C, R> {
    pub fn new(
        ctx: RunContext,
        pool: ClientPool<C>,
        ready: Receiver<Slot<C>>,
        recognizer: R,
    ) -> Self {
        Self {
            ctx,
            pool,
            ready,
            recognizer,
        }
    }

    pub fn run(self) -> Result<()> {
        info!("election loop started");
        loop {
            if self.ctx.state.killed() {
                break;
            }
            if !self.ctx.state.has_candidates() {
                info!("no candidate goals remain, stopping the run");
                self.ctx.state.kill();
                self.pool.shutdown_needs_auth();
                break;
            }
            let slot = match self.ready.recv() {
                Ok(slot) => slot,
                Err(_) => break,
            };
            let handle = match slot {
                Slot::Client(handle) => handle,
                Slot::Shutdown => break,
            };

            let round = self.ctx.state.bump_election_loop();
            debug!(round, handle = handle.id, "election iteration");
            match self.iterate(handle)? {
                IterationEnd::NoWait => {}
                IterationEnd::Sleep => {
                    let interval = jittered(
                        self.ctx.client.refresh_interval(),
                        self.ctx.client.refresh_jitter,
                    );
                    debug!(?interval, "sleeping before next iteration");
                    interruptible_sleep(&self.ctx.state, interval);
                }
            }
        }
        info!("election loop exiting");
        Ok(())
    }

    fn iterate(&self, mut handle: SessionHandle<C>) -> Result<IterationEnd> {
        // Stale sessions are swapped, not waited for: hand the handle to the
        // login loop and immediately try the next spare.
        if !handle.is_usable() {
            debug!(handle = handle.id, "session unusable, routing to login");
            if let Err(err) = handle.client.logout() {
                debug!(error = %err, "best-effort logout failed");
            }
            handle.invalidate();
            self.pool.release_needs_auth(handle);
            return Ok(IterationEnd::NoWait);
        }

        let page = match self.fetch_page(&handle) {
            Ok(page) => page,
            Err(err) => return self.route_failure(handle, err),
        };

        let queue = match self.scan_goals(&page) {
            Ok(queue) => queue,
            Err(err) => {
                // A goal absent from both tables is a configuration error,
                // not something retries can fix.
                error!(error = %err, "goal missing from course plan, aborting run");
                self.ctx.state.count_error("not_in_course_plan");
                self.ctx.state.kill();
                self.pool.shutdown_needs_auth();
                return Err(err);
            }
        };

        if queue.is_empty() {
            info!("no courses available this round");
            self.pool.release_ready(handle);
            return Ok(IterationEnd::Sleep);
        }

        match self.attempt_all(&handle, queue) {
            Ok(AttemptsEnd { relogin: true }) => {
                handle.invalidate();
                self.pool.release_needs_auth(handle);
                Ok(IterationEnd::NoWait)
            }
            Ok(AttemptsEnd { relogin: false }) => {
                self.pool.release_ready(handle);
                Ok(IterationEnd::Sleep)
            }
            Err(err) => {
                error!(error = %err, "fatal portal error, aborting run");
                self.ctx.state.kill();
                self.pool.shutdown_needs_auth();
                Err(err.into())
            }
        }
    }

    /// Route a page-fetch failure according to its classification.
    fn route_failure(
        &self,
        mut handle: SessionHandle<C>,
        err: PortalError,
    ) -> Result<IterationEnd> {
        self.ctx.state.count_error(err.kind());
        match classify_error(&err) {
            Decision::NeedsRelogin => {
                warn!(error = %err, handle = handle.id, "session invalidated by portal");
                handle.invalidate();
                self.pool.release_needs_auth(handle);
                Ok(IterationEnd::NoWait)
            }
            Decision::Fatal => {
                error!(error = %err, "fatal portal error, aborting run");
                self.ctx.state.kill();
                self.pool.shutdown_needs_auth();
                Err(err.into())
            }
            _ => {
                warn!(error = %err, "transient failure fetching enrollment page");
                self.pool.release_ready(handle);
                Ok(IterationEnd::Sleep)
            }
        }
    }

    fn fetch_page(&self, handle: &SessionHandle<C>) -> Result<SupplyCancelPage, PortalError> {
        let page_no = self.ctx.client.supply_cancel_page;
        let mut last = None;
        for attempt in 1..=PAGE_FETCH_RETRIES {
            let html = handle.client.supply_cancel(page_no)?;
            match parser::parse_supply_cancel(&html) {
                Ok(page) => return Ok(page),
                Err(err) => {
                    debug!(attempt, error = %err, "empty supply/cancel page, refetching");
                    last = Some(err);
                }
            }
        }
        Err(last.unwrap_or_else(|| PortalError::Malformed("empty supply/cancel page".into())))
    }

    /// Mark page-confirmed elections, propagate mutex rules, and build the
    /// attempt queue in goal order.
    fn scan_goals(&self, page: &SupplyCancelPage) -> Result<Vec<(usize, String)>> {
        let state = &self.ctx.state;
        let rules = state.rules();

        for (i, goal) in rules.goals().iter().enumerate() {
            if state.is_ignored(goal) {
                continue;
            }
            if page.elected.iter().any(|c| c == goal) {
                info!(course = %goal, "already elected, ignoring");
                state.ignore(goal.clone(), "Elected");
                self.ignore_partners(i);
            }
        }

        let mut queue = Vec::new();
        for (i, goal) in rules.goals().iter().enumerate() {
            if state.is_ignored(goal) {
                continue;
            }
            let entry = match page.candidates.iter().find(|e| e.course == *goal) {
                Some(entry) => entry,
                None => bail!("goal {goal} is neither elected nor in the course plan"),
            };
            let quota = match entry.status {
                Some(quota) => quota,
                None => {
                    debug!(course = %goal, "candidate row without quota, skipping this round");
                    continue;
                }
            };
            if quota.max == 0 {
                warn!(course = %goal, "anomalous zero quota cap, ignoring");
                state.count_error("quota_exhausted");
                state.ignore(goal.clone(), "Quota exhausted");
                continue;
            }
            if !quota.has_vacancy() {
                debug!(course = %goal, %quota, "full");
                continue;
            }
            if let Some(threshold) = rules.delay(i) {
                if quota.remaining() > threshold {
                    debug!(
                        course = %goal,
                        remaining = quota.remaining(),
                        threshold,
                        "delay rule gates this goal"
                    );
                    continue;
                }
            }
            let action = match &entry.action {
                Some(action) => action.clone(),
                None => {
                    debug!(course = %goal, "no election action on this page");
                    continue;
                }
            };
            info!(course = %goal, %quota, "available now");
            queue.push((i, action));
        }
        Ok(queue)
    }

    fn ignore_partners(&self, i: usize) {
        let state = &self.ctx.state;
        let rules = state.rules();
        for j in rules.partners(i) {
            let partner = &rules.goals()[j];
            if state.ignore(partner.clone(), "Mutex rules") {
                info!(course = %partner, "mutex partner held, ignoring");
            }
        }
    }

    /// Work through the attempt queue with one handle. `Err` is fatal-only;
    /// everything recoverable is handled in place.
    fn attempt_all(
        &self,
        handle: &SessionHandle<C>,
        queue: Vec<(usize, String)>,
    ) -> Result<AttemptsEnd, PortalError> {
        let state = &self.ctx.state;
        let rules = state.rules();
        let mut just_elected: Vec<usize> = Vec::new();

        for (i, action) in queue {
            let goal = &rules.goals()[i];
            if state.is_ignored(goal) {
                continue;
            }
            // A course whose mutex partner was elected earlier in this same
            // iteration is dropped before spending a captcha round.
            if just_elected.iter().any(|&j| rules.are_mutex(i, j)) {
                info!(course = %goal, "mutex partner elected this iteration, ignoring");
                state.ignore(goal.clone(), "Mutex rules");
                continue;
            }

            info!(course = %goal, "trying to elect");
            match self.pass_captcha_gate(handle) {
                Ok(()) => {}
                Err(GateFailure::Recognizer(err)) => {
                    state.count_error("captcha_recognizer");
                    warn!(error = %err, course = %goal, "captcha recognizer failed, deferring course");
                    continue;
                }
                Err(GateFailure::Portal(err)) => {
                    state.count_error(err.kind());
                    match classify_error(&err) {
                        Decision::NeedsRelogin => {
                            warn!(error = %err, "session lost at the captcha gate");
                            return Ok(AttemptsEnd { relogin: true });
                        }
                        Decision::Fatal => return Err(err),
                        _ => {
                            warn!(error = %err, course = %goal, "captcha gate failed, deferring course");
                            continue;
                        }
                    }
                }
            }

            match handle.client.elect(&action) {
                Ok(outcome) => match classify_outcome(&outcome) {
                    Decision::Elected => {
                        // Deliberately not added to the ignore map: the next
                        // page reload is the source of truth for what is
                        // actually held.
                        info!(course = %goal, "course ELECTED");
                        just_elected.push(i);
                    }
                    Decision::Ignore(reason) => {
                        state.count_error(outcome.kind());
                        warn!(course = %goal, reason, "permanently ignoring");
                        state.ignore(goal.clone(), reason);
                    }
                    Decision::RetryLater => {
                        state.count_error(outcome.kind());
                        warn!(course = %goal, kind = outcome.kind(), "election failed, will retry");
                    }
                    Decision::NeedsRelogin => {
                        state.count_error(outcome.kind());
                        warn!(course = %goal, "portal demands re-login");
                        return Ok(AttemptsEnd { relogin: true });
                    }
                    Decision::Fatal => unreachable!("no election outcome classifies as fatal"),
                },
                Err(err) => {
                    state.count_error(err.kind());
                    match classify_error(&err) {
                        Decision::NeedsRelogin => {
                            warn!(error = %err, "session lost during election");
                            return Ok(AttemptsEnd { relogin: true });
                        }
                        Decision::Fatal => return Err(err),
                        _ => {
                            warn!(error = %err, course = %goal, "election errored, will retry");
                        }
                    }
                }
            }
        }
        Ok(AttemptsEnd { relogin: false })
    }

    /// Fetch/recognize/submit until the portal accepts a code. Unbounded on
    /// plain rejections; malformed payloads and recognizer failures are
    /// bounded before the course is deferred.
    fn pass_captcha_gate(&self, handle: &SessionHandle<C>) -> Result<(), GateFailure> {
        let mut malformed = 0usize;
        let mut recognizer_failures = 0usize;
        loop {
            let image = handle.client.captcha_image().map_err(GateFailure::Portal)?;
            let code = match self.recognizer.recognize(&image) {
                Ok(code) => code,
                Err(err) => {
                    recognizer_failures += 1;
                    if recognizer_failures >= CAPTCHA_PAYLOAD_RETRIES {
                        return Err(GateFailure::Recognizer(err));
                    }
                    debug!(error = %err, "recognizer failed, refetching captcha");
                    continue;
                }
            };
            debug!(code, "captcha recognized");
            match handle.client.submit_captcha(&code) {
                Ok(CaptchaVerdict::Accepted) => {
                    debug!("captcha accepted");
                    self.recognizer.clear_cache();
                    return Ok(());
                }
                Ok(CaptchaVerdict::Rejected) => {
                    debug!("captcha rejected, trying a new one");
                }
                Ok(CaptchaVerdict::Unrecognized(verdict)) => {
                    warn!(verdict, "unknown captcha validation verdict");
                }
                Err(err @ PortalError::Malformed(_)) => {
                    malformed += 1;
                    if malformed >= CAPTCHA_PAYLOAD_RETRIES {
                        return Err(GateFailure::Portal(err));
                    }
                    warn!(error = %err, "malformed captcha validation response, retrying");
                }
                Err(err) => return Err(GateFailure::Portal(err)),
            }
        }
    }
}
