//! The two long-running worker loops and their shared timing helpers.
//!
//! Exactly two workers exist: the login loop re-authenticates session
//! handles, the election loop spends them. Handles travel between the loops
//! only through the client pool queues; both loops poll the kill flag at
//! iteration boundaries and exit within one wake-up of a shutdown sentinel.

pub mod election;
pub mod login;

pub use election::ElectionLoop;
pub use login::LoginLoop;

use rand::Rng;
use std::time::{Duration, Instant};

use crate::state::RunState;

/// Sleep in short slices so a raised kill flag is observed promptly.
pub(crate) fn interruptible_sleep(state: &RunState, total: Duration) {
    const SLICE: Duration = Duration::from_millis(250);
    let deadline = Instant::now() + total;
    while !state.killed() {
        let now = Instant::now();
        if now >= deadline {
            break;
        }
        std::thread::sleep(SLICE.min(deadline - now));
    }
}

/// Refresh interval with a uniform deviation of up to `jitter` of the base
/// applied in either direction.
pub(crate) fn jittered(base: Duration, jitter: f64) -> Duration {
    if jitter <= 0.0 {
        return base;
    }
    let delta = rand::thread_rng().gen_range(-jitter..jitter);
    base.mul_f64(1.0 + delta)
}
