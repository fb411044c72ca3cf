//! Login loop: the single consumer of the `needs_auth` queue.
//!
//! Each handle goes through the full handshake chain: a disposable OAuth
//! login for the token, the portal SSO login, and (for dual-degree
//! accounts) the identity-selection round-trip keyed by the `sida` token on
//! the landing page. Recoverable failures retry the same handle after a
//! fixed interval; fatal classes abort the whole run.

use anyhow::Result;
use std::sync::mpsc::Receiver;
use tracing::{debug, error, info, warn};

use crate::loops::interruptible_sleep;
use crate::outcome::{classify_error, Decision, PortalError};
use crate::pool::{ClientPool, Slot};
use crate::portal::{parser, AuthClient, ElectivePortal};
use crate::session::SessionHandle;
use crate::state::RunContext;

pub struct LoginLoop<C, A> {
    ctx: RunContext,
    pool: ClientPool<C>,
    needs_auth: Receiver<Slot<C>>,
    auth: A,
}

impl<C: ElectivePortal, A: AuthClient> LoginLoop<C, A> {
    pub fn new(
        ctx: RunContext,
        pool: ClientPool<C>,
        needs_auth: Receiver<Slot<C>>,
        auth: A,
    ) -> Self {
        Self {
            ctx,
            pool,
            needs_auth,
            auth,
        }
    }

    pub fn run(self) -> Result<()> {
        info!("login loop started");
        'outer: loop {
            if self.ctx.state.killed() {
                break;
            }
            let slot = match self.needs_auth.recv() {
                Ok(slot) => slot,
                Err(_) => break, // all producers gone
            };
            let mut handle = match slot {
                Slot::Client(handle) => handle,
                Slot::Shutdown => break,
            };

            // Retry the same handle until it authenticates; it is not
            // released back to the queue in between.
            loop {
                if self.ctx.state.killed() {
                    break 'outer;
                }
                let round = self.ctx.state.bump_login_loop();
                debug!(round, handle = handle.id, "authenticating session");
                match self.authenticate(&mut handle) {
                    Ok(()) => {
                        handle.stamp(self.ctx.client.session_lifetime());
                        info!(handle = handle.id, "login success");
                        self.pool.release_ready(handle);
                        break;
                    }
                    Err(err) => {
                        self.ctx.state.count_error(err.kind());
                        if classify_error(&err) == Decision::Fatal {
                            error!(error = %err, "fatal login failure, aborting run");
                            self.ctx.state.kill();
                            self.pool.shutdown_ready();
                            return Err(err.into());
                        }
                        warn!(error = %err, handle = handle.id, "login failed, retrying");
                        interruptible_sleep(&self.ctx.state, self.ctx.client.login_retry_interval());
                    }
                }
            }
        }
        info!("login loop exiting");
        Ok(())
    }

    fn authenticate(&self, handle: &mut SessionHandle<C>) -> Result<(), PortalError> {
        // Stale cookies poison the handshake; always start from a clean jar.
        handle.invalidate();
        handle.client.reset_session()?;

        let account = &self.ctx.account;
        let token = self.auth.oauth_login(&account.student_id, &account.password)?;
        let landing = handle.client.sso_login(&token)?;

        if account.dual_degree {
            if let Some(identity) = account.identity {
                let sida = parser::extract_sida(&landing.html).ok_or_else(|| {
                    PortalError::Malformed("sso landing page carries no sida token".into())
                })?;
                handle
                    .client
                    .select_identity(&sida, identity.sttp(), &landing.url)?;
            }
        }
        Ok(())
    }
}
