//! Bounded worker pool for freshly-accepted connections.
//!
//! Pool workers parse only the *first* request head of each connection and
//! route on it: short-lived requests are served in place and closed, while
//! keep-alive connections and large uploads are promoted to a dedicated
//! thread so a single slow client can never pin a pool slot.

use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{bounded, Receiver, Sender};
use hearth_core::{log_debug, log_warn};

use crate::parser::ReadOutcome;
use crate::server::ServerShared;
use crate::stream::ClientStream;
use crate::worker::ConnectionWorker;

/// Upper bound on pool worker threads.
pub(crate) const MAX_POOL_WORKERS: usize = 256;

/// Declared bodies above this promote the connection to a dedicated thread,
/// so the pool is never blocked by one slow or large upload.
const PROMOTION_BODY_THRESHOLD: i64 = 16 * 1024 * 1024;

/// Poll interval while draining pool threads at shutdown.
const JOIN_POLL: Duration = Duration::from_millis(100);

struct PoolJob {
    stream: ClientStream,
    connection_id: i64,
}

/// Fixed-size pool of connection-intake threads.
pub(crate) struct WorkerPool {
    sender: Option<Sender<PoolJob>>,
    threads: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    /// Spawns the pool threads; the queue capacity is the configured
    /// queue length.
    pub(crate) fn new(shared: &Arc<ServerShared>) -> std::io::Result<Self> {
        let workers = shared.config.pool_size.clamp(1, MAX_POOL_WORKERS);
        let (sender, receiver) = bounded(shared.config.queue_length.max(1));

        let mut threads = Vec::with_capacity(workers);
        for i in 0..workers {
            let shared = Arc::clone(shared);
            let receiver: Receiver<PoolJob> = receiver.clone();
            let handle = thread::Builder::new()
                .name(format!("hearth-pool-{i}"))
                .spawn(move || {
                    while let Ok(job) = receiver.recv() {
                        Self::serve(&shared, job);
                    }
                })?;
            threads.push(handle);
        }

        Ok(Self {
            sender: Some(sender),
            threads,
        })
    }

    /// Enqueues a connection for intake.
    ///
    /// Blocks up to `contention_delay` when the queue is full and every
    /// worker is busy. Returns false when capacity never freed up; the
    /// caller then closes the connection.
    pub(crate) fn push(
        &self,
        stream: ClientStream,
        connection_id: i64,
        contention_delay: Duration,
    ) -> bool {
        let job = PoolJob {
            stream,
            connection_id,
        };
        match &self.sender {
            Some(sender) => sender.send_timeout(job, contention_delay).is_ok(),
            None => false,
        }
    }

    /// Closes the queue and waits for pool threads until `deadline`.
    ///
    /// Threads still busy past the deadline are left to finish on their own;
    /// teardown proceeds regardless.
    pub(crate) fn shutdown(mut self, deadline: Instant) {
        drop(self.sender.take());
        loop {
            if self.threads.iter().all(JoinHandle::is_finished) {
                break;
            }
            if Instant::now() >= deadline {
                log_warn!("pool drain timed out, detaching remaining workers");
                return;
            }
            thread::sleep(JOIN_POLL);
        }
        for handle in self.threads.drain(..) {
            let _ = handle.join();
        }
    }

    /// Intake for one connection: parse the first request head and route.
    fn serve(shared: &Arc<ServerShared>, job: PoolJob) {
        let connection_id = job.connection_id;
        let mut worker = ConnectionWorker::new(Arc::clone(shared), job.stream, connection_id);

        let (outcome, req) = worker.read_request_head();
        shared.stats.record(outcome);

        match outcome {
            ReadOutcome::HeaderReceived
                if req.keep_alive || req.content_length > PROMOTION_BODY_THRESHOLD =>
            {
                log_debug!("promoting connection", connection => connection_id);
                let spawned = thread::Builder::new()
                    .name(format!("hearth-conn-{connection_id}"))
                    .spawn(move || worker.run(Some(req)));
                if let Err(e) = spawned {
                    log_warn!("promotion failed", connection => connection_id, error => e);
                }
            }
            ReadOutcome::HeaderReceived => {
                worker.run_pooled(req);
            }
            ReadOutcome::Owned => {
                worker.hand_off(req);
            }
            _ => {
                worker.run_pooled_failed();
            }
        }
    }
}
