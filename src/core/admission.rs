//! Slot accounting and greedy candidate selection.

use std::sync::atomic::{AtomicU32, Ordering};

use crate::core::model::CandidateTask;

/// Select candidates in order while their slot requirements fit in `free`.
///
/// A candidate that does not fit is skipped and later, smaller candidates are
/// still considered.
#[must_use]
pub fn select_candidates(candidates: &[CandidateTask], free: u32) -> Vec<&CandidateTask> {
    let mut remaining = free;
    let mut selected = Vec::new();
    for candidate in candidates {
        if remaining == 0 {
            break;
        }
        let cost = candidate.required_units();
        if cost <= remaining {
            remaining -= cost;
            selected.push(candidate);
        }
    }
    selected
}

/// Slot budget of one scheduler instance.
///
/// Reservations use a lock-free CAS loop on the used counter, so the sum of
/// reservations never exceeds the configured budget.
#[derive(Debug)]
pub struct SlotBudget {
    available: u32,
    used: AtomicU32,
}

impl SlotBudget {
    /// Budget of `available` slot units, all free.
    #[must_use]
    pub const fn new(available: u32) -> Self {
        Self {
            available,
            used: AtomicU32::new(0),
        }
    }

    /// Configured budget.
    #[must_use]
    pub const fn available(&self) -> u32 {
        self.available
    }

    /// Units currently reserved.
    #[must_use]
    pub fn used(&self) -> u32 {
        self.used.load(Ordering::Acquire)
    }

    /// Units currently free.
    #[must_use]
    pub fn free(&self) -> u32 {
        self.available.saturating_sub(self.used())
    }

    /// Reserve `units` if they fit. Returns whether the reservation was made.
    pub fn try_reserve(&self, units: u32) -> bool {
        let mut current = self.used.load(Ordering::Acquire);
        loop {
            let Some(next) = current.checked_add(units) else {
                return false;
            };
            if next > self.available {
                return false;
            }
            match self.used.compare_exchange_weak(
                current,
                next,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return true,
                Err(actual) => current = actual,
            }
        }
    }

    /// Return `units` to the budget.
    pub fn release(&self, units: u32) {
        let mut current = self.used.load(Ordering::Acquire);
        loop {
            let next = current.saturating_sub(units);
            match self.used.compare_exchange_weak(
                current,
                next,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return,
                Err(actual) => current = actual,
            }
        }
    }
}
