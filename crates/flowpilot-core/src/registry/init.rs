//! Guarded one-time initialization.

use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;

/// Double-checked "initialize if not yet initialized" guard.
///
/// The fast path is a single atomic load; the lock is only taken until the
/// first successful initialization.
#[derive(Default)]
pub struct OneTimeInit {
    done: AtomicBool,
    lock: Mutex<()>,
}

impl OneTimeInit {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_initialized(&self) -> bool {
        self.done.load(Ordering::Acquire)
    }

    /// Run `init` unless a previous call already succeeded.
    ///
    /// Returns `Ok(true)` if this call performed the initialization. A failed
    /// `init` leaves the guard open so a later call can retry.
    pub fn call<E>(&self, init: impl FnOnce() -> Result<(), E>) -> Result<bool, E> {
        if self.is_initialized() {
            return Ok(false);
        }
        let _guard = self.lock.lock();
        if self.is_initialized() {
            return Ok(false);
        }
        init()?;
        self.done.store(true, Ordering::Release);
        Ok(true)
    }
}
