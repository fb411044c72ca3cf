//! Client pool: the hand-off mechanism between the login and election loops.
//!
//! Two bounded FIFO queues carry session handles: `ready` (authenticated,
//! waiting for the election loop) and `needs_auth` (waiting for the login
//! loop). The total number of real handles is fixed at pool size P; each
//! queue is sized P + 1 and receives at most one shutdown sentinel, so a
//! `release` can never block no matter how often shutdown is requested.
//! Queue push/pop is the only ownership-transfer boundary for handles.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{sync_channel, Receiver, SyncSender, TrySendError};
use std::sync::Arc;
use tracing::debug;

use crate::session::SessionHandle;

/// Queue item: a real handle, or the shutdown sentinel used to wake a
/// consumer blocked on an empty queue. Sentinels never count against the
/// pool-size invariant.
pub enum Slot<C> {
    Client(SessionHandle<C>),
    Shutdown,
}

/// Cloneable producer half of both queues. Each loop owns the consumer half
/// of exactly one queue (see [`PoolReceivers`]).
pub struct ClientPool<C> {
    ready: SyncSender<Slot<C>>,
    needs_auth: SyncSender<Slot<C>>,
    ready_closed: Arc<AtomicBool>,
    needs_auth_closed: Arc<AtomicBool>,
}

// Manual impl: `C` itself need not be Clone for the senders to be.
impl<C> Clone for ClientPool<C> {
    fn clone(&self) -> Self {
        Self {
            ready: self.ready.clone(),
            needs_auth: self.needs_auth.clone(),
            ready_closed: Arc::clone(&self.ready_closed),
            needs_auth_closed: Arc::clone(&self.needs_auth_closed),
        }
    }
}

pub struct PoolReceivers<C> {
    pub ready: Receiver<Slot<C>>,
    pub needs_auth: Receiver<Slot<C>>,
}

impl<C> ClientPool<C> {
    /// Build a pool of `size` handles, all starting unauthenticated in the
    /// `needs_auth` queue.
    pub fn new(size: usize, mut make_client: impl FnMut(usize) -> C) -> (Self, PoolReceivers<C>) {
        let (ready_tx, ready_rx) = sync_channel(size + 1);
        let (needs_auth_tx, needs_auth_rx) = sync_channel(size + 1);
        for id in 0..size {
            let slot = Slot::Client(SessionHandle::new(id, make_client(id)));
            // A freshly built queue of capacity size + 1 cannot be full.
            if needs_auth_tx.send(slot).is_err() {
                unreachable!("receiver held locally");
            }
        }
        (
            Self {
                ready: ready_tx,
                needs_auth: needs_auth_tx,
                ready_closed: Arc::new(AtomicBool::new(false)),
                needs_auth_closed: Arc::new(AtomicBool::new(false)),
            },
            PoolReceivers {
                ready: ready_rx,
                needs_auth: needs_auth_rx,
            },
        )
    }

    /// Hand an authenticated handle to the election loop. Never blocks:
    /// outstanding handles never exceed pool size.
    pub fn release_ready(&self, handle: SessionHandle<C>) {
        if self.ready.send(Slot::Client(handle)).is_err() {
            // Consumer already exited; only happens during shutdown.
            debug!("ready queue consumer is gone, dropping handle");
        }
    }

    /// Hand an invalidated handle to the login loop.
    pub fn release_needs_auth(&self, handle: SessionHandle<C>) {
        if self.needs_auth.send(Slot::Client(handle)).is_err() {
            debug!("needs_auth queue consumer is gone, dropping handle");
        }
    }

    /// Wake the election loop so it can observe the kill flag. A queue
    /// receives at most one sentinel, so repeated shutdown requests (a second
    /// interrupt, a fatal failure racing one) cannot fill the extra slot that
    /// keeps `release` non-blocking. A full queue means the consumer is not
    /// blocked and will see the flag on its own.
    pub fn shutdown_ready(&self) {
        if self.ready_closed.swap(true, Ordering::SeqCst) {
            return;
        }
        match self.ready.try_send(Slot::Shutdown) {
            Ok(()) | Err(TrySendError::Full(_)) | Err(TrySendError::Disconnected(_)) => {}
        }
    }

    /// Wake the login loop so it can observe the kill flag.
    pub fn shutdown_needs_auth(&self) {
        if self.needs_auth_closed.swap(true, Ordering::SeqCst) {
            return;
        }
        match self.needs_auth.try_send(Slot::Shutdown) {
            Ok(()) | Err(TrySendError::Full(_)) | Err(TrySendError::Disconnected(_)) => {}
        }
    }
}
