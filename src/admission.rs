//! Bounds concurrent container runs by a configured capacity.
//!
//! Deliberately a counter rather than a queue: a request that cannot run
//! immediately is refused so upstream schedulers back off instead of piling
//! up latent work.

use std::sync::atomic::{AtomicUsize, Ordering};

pub struct AdmissionGate {
    running: AtomicUsize,
    max_concurrency: usize,
}

impl AdmissionGate {
    pub fn new(max_concurrency: usize) -> Self {
        Self {
            running: AtomicUsize::new(0),
            max_concurrency,
        }
    }

    /// Reserves a slot if one is free. Every `true` return must be paired
    /// with exactly one [`AdmissionGate::leave`] call.
    pub fn try_enter(&self) -> bool {
        loop {
            let current = self.running.load(Ordering::Acquire);
            if current >= self.max_concurrency {
                return false;
            }
            if self
                .running
                .compare_exchange(current, current + 1, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                return true;
            }
        }
    }

    pub fn leave(&self) {
        self.running.fetch_sub(1, Ordering::AcqRel);
    }

    pub fn busy(&self) -> bool {
        self.running.load(Ordering::Acquire) >= self.max_concurrency
    }

    #[cfg(test)]
    fn running(&self) -> usize {
        self.running.load(Ordering::Acquire)
    }
}

/// RAII guard returned by [`enter`] so `leave()` fires on every exit path,
/// including early returns and panics, mirroring the Execution Engine's own
/// guaranteed-cleanup-on-every-path discipline.
pub struct AdmissionGuard<'a> {
    gate: &'a AdmissionGate,
}

impl Drop for AdmissionGuard<'_> {
    fn drop(&mut self) {
        self.gate.leave();
    }
}

/// Reserves a slot and returns a guard that releases it on drop, or `None`
/// if the gate is at capacity.
pub fn enter(gate: &AdmissionGate) -> Option<AdmissionGuard<'_>> {
    if gate.try_enter() {
        Some(AdmissionGuard { gate })
    } else {
        None
    }
}
