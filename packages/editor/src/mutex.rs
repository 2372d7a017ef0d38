//! # Reentrancy guard
//!
//! A non-blocking token that keeps a synchronous call chain from re-entering
//! itself: a local write that triggers a replica event that would trigger
//! another local write. Contention never waits; the fallback runs instead.

use std::sync::atomic::{AtomicBool, Ordering};

#[derive(Debug, Default)]
pub struct ReentrancyMutex {
    busy: AtomicBool,
}

struct Release<'a>(&'a AtomicBool);

impl Drop for Release<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl ReentrancyMutex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }

    /// Run `primary` holding the token, or `fallback` if it is already held.
    /// The token is released when `primary` returns or unwinds.
    pub fn run<T>(&self, primary: impl FnOnce() -> T, fallback: impl FnOnce() -> T) -> T {
        match self.try_run(primary) {
            Some(value) => value,
            None => fallback(),
        }
    }

    /// `None` when the token is held
    pub fn try_run<T>(&self, primary: impl FnOnce() -> T) -> Option<T> {
        if self
            .busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return None;
        }
        let _release = Release(&self.busy);
        Some(primary())
    }
}
