//! Operational counters.
//!
//! One counter per request-read outcome, plus connection gauges. All updates
//! are single atomic increments; readers get a coherent-enough snapshot for
//! monitoring without any locking.

use std::sync::atomic::{AtomicU64, Ordering};

use crate::parser::ReadOutcome;

/// Read-only operational counters for one server instance.
#[derive(Debug, Default)]
pub struct ServerStats {
    active_connections: AtomicU64,
    total_connections: AtomicU64,
    connection_errors: AtomicU64,
    internal_errors: AtomicU64,
    oversized_payloads: AtomicU64,
    rejected: AtomicU64,
    timeouts: AtomicU64,
    headers_received: AtomicU64,
    bodies_received: AtomicU64,
    owned: AtomicU64,
}

impl ServerStats {
    /// Creates zeroed counters.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a new accepted connection.
    pub fn on_connect(&self) {
        self.active_connections.fetch_add(1, Ordering::Relaxed);
        self.total_connections.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a finished connection.
    pub fn on_disconnect(&self) {
        self.active_connections.fetch_sub(1, Ordering::Relaxed);
    }

    /// Records one request-read outcome.
    pub fn record(&self, outcome: ReadOutcome) {
        let counter = match outcome {
            ReadOutcome::ConnectionError => &self.connection_errors,
            ReadOutcome::InternalError => &self.internal_errors,
            ReadOutcome::OversizedPayload => &self.oversized_payloads,
            ReadOutcome::Rejected => &self.rejected,
            ReadOutcome::Timeout => &self.timeouts,
            ReadOutcome::HeaderReceived => &self.headers_received,
            ReadOutcome::BodyReceived => &self.bodies_received,
            ReadOutcome::Owned => &self.owned,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Connections currently being served.
    #[must_use]
    pub fn active_connections(&self) -> u64 {
        self.active_connections.load(Ordering::Relaxed)
    }

    /// Connections accepted since start.
    #[must_use]
    pub fn total_connections(&self) -> u64 {
        self.total_connections.load(Ordering::Relaxed)
    }

    /// Count for one outcome.
    #[must_use]
    pub fn outcome(&self, outcome: ReadOutcome) -> u64 {
        let counter = match outcome {
            ReadOutcome::ConnectionError => &self.connection_errors,
            ReadOutcome::InternalError => &self.internal_errors,
            ReadOutcome::OversizedPayload => &self.oversized_payloads,
            ReadOutcome::Rejected => &self.rejected,
            ReadOutcome::Timeout => &self.timeouts,
            ReadOutcome::HeaderReceived => &self.headers_received,
            ReadOutcome::BodyReceived => &self.bodies_received,
            ReadOutcome::Owned => &self.owned,
        };
        counter.load(Ordering::Relaxed)
    }

    /// Copies every counter into a plain snapshot.
    #[must_use]
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            active_connections: self.active_connections(),
            total_connections: self.total_connections(),
            connection_errors: self.outcome(ReadOutcome::ConnectionError),
            internal_errors: self.outcome(ReadOutcome::InternalError),
            oversized_payloads: self.outcome(ReadOutcome::OversizedPayload),
            rejected: self.outcome(ReadOutcome::Rejected),
            timeouts: self.outcome(ReadOutcome::Timeout),
            headers_received: self.outcome(ReadOutcome::HeaderReceived),
            bodies_received: self.outcome(ReadOutcome::BodyReceived),
            owned: self.outcome(ReadOutcome::Owned),
        }
    }
}

/// Point-in-time copy of all counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatsSnapshot {
    /// Connections currently being served.
    pub active_connections: u64,
    /// Connections accepted since start.
    pub total_connections: u64,
    /// Transport/framing failures.
    pub connection_errors: u64,
    /// Hook panics and server faults.
    pub internal_errors: u64,
    /// Requests refused for declaring an oversized body.
    pub oversized_payloads: u64,
    /// Requests refused by the early-rejection hook.
    pub rejected: u64,
    /// Header-read and idle timeouts.
    pub timeouts: u64,
    /// Requests whose headers were read (body deferred).
    pub headers_received: u64,
    /// Requests fully read.
    pub bodies_received: u64,
    /// Connections handed off to an external owner.
    pub owned: u64,
}
