//! Session handles: one independently authenticated portal session per pool
//! slot.
//!
//! A handle owns its portal client (the client's cookie jar *is* the
//! session). Handles are created once at start-up and recycled between the
//! pool queues for the life of the run; ownership is exclusive to whichever
//! loop or queue currently holds it.

use std::time::{Duration, Instant};

pub struct SessionHandle<C> {
    pub id: usize,
    pub authenticated: bool,
    expires_at: Option<Instant>,
    pub client: C,
}

impl<C> SessionHandle<C> {
    pub fn new(id: usize, client: C) -> Self {
        Self {
            id,
            authenticated: false,
            expires_at: None,
            client,
        }
    }

    /// Mark the handle authenticated, with an expiry if a maximum session
    /// lifetime is configured.
    pub fn stamp(&mut self, lifetime: Option<Duration>) {
        self.authenticated = true;
        self.expires_at = lifetime.map(|d| Instant::now() + d);
    }

    pub fn invalidate(&mut self) {
        self.authenticated = false;
        self.expires_at = None;
    }

    pub fn is_expired(&self) -> bool {
        match self.expires_at {
            Some(deadline) => Instant::now() >= deadline,
            None => false,
        }
    }

    pub fn is_usable(&self) -> bool {
        self.authenticated && !self.is_expired()
    }
}
