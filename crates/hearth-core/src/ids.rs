//! Connection and request identifier allocation.
//!
//! Connection identifiers come from a process-wide monotonic sequence and are
//! always strictly positive. Request identifiers are scoped to a server
//! instance via [`RequestIdSequence`]; a process-wide fallback sequence exists
//! for contexts created without an owning server, so tests can inject a fresh
//! sequence and stay deterministic.
//!
//! Both sequences wrap a fixed margin below their type maximum so that the
//! values stay positive through the wrap.

use std::sync::atomic::{AtomicI32, AtomicI64, Ordering};
use std::sync::OnceLock;

/// Distance below the type maximum at which a sequence wraps back to 1.
pub const ID_WRAP_MARGIN: i64 = 2048;

static CONNECTION_IDS: AtomicI64 = AtomicI64::new(0);

/// Allocates the next process-wide connection identifier.
///
/// The returned value is strictly positive and monotonically increasing
/// until the sequence wraps at `i64::MAX - 2048`.
pub fn next_connection_id() -> i64 {
    loop {
        let current = CONNECTION_IDS.load(Ordering::Relaxed);
        let next = if current >= i64::MAX - ID_WRAP_MARGIN {
            1
        } else {
            current + 1
        };
        if CONNECTION_IDS
            .compare_exchange_weak(current, next, Ordering::AcqRel, Ordering::Relaxed)
            .is_ok()
        {
            return next;
        }
    }
}

/// A 31-bit request identifier sequence.
///
/// One sequence lives on each server instance; request identifiers are unique
/// within that server until the sequence wraps at `i32::MAX - 2048`.
#[derive(Debug)]
pub struct RequestIdSequence(AtomicI32);

impl RequestIdSequence {
    /// Creates a sequence starting at 1.
    #[must_use]
    pub const fn new() -> Self {
        Self(AtomicI32::new(0))
    }

    /// Allocates the next request identifier, wrapping back to 1 near the
    /// 31-bit maximum.
    pub fn next(&self) -> u32 {
        loop {
            let current = self.0.load(Ordering::Relaxed);
            let next = if i64::from(current) >= i64::from(i32::MAX) - ID_WRAP_MARGIN {
                1
            } else {
                current + 1
            };
            if self
                .0
                .compare_exchange_weak(current, next, Ordering::AcqRel, Ordering::Relaxed)
                .is_ok()
            {
                #[allow(clippy::cast_sign_loss)]
                return next as u32;
            }
        }
    }

    /// Returns the most recently allocated identifier without advancing.
    #[must_use]
    pub fn current(&self) -> u32 {
        #[allow(clippy::cast_sign_loss)]
        {
            self.0.load(Ordering::Relaxed).max(0) as u32
        }
    }
}

impl Default for RequestIdSequence {
    fn default() -> Self {
        Self::new()
    }
}

/// Process-wide fallback used when a context has no owning server.
pub fn process_request_ids() -> &'static RequestIdSequence {
    static FALLBACK: OnceLock<RequestIdSequence> = OnceLock::new();
    FALLBACK.get_or_init(RequestIdSequence::new)
}
