//! Per-connection worker.
//!
//! A worker owns exactly one client socket for the lifetime of the TCP
//! connection. It waits for data with short blocking peeks, reads one request
//! at a time, runs the hook pipeline, writes the response and loops while the
//! connection stays keep-alive. Ownership leaves the worker only through
//! [`detach`](ConnectionWorker::detach), which guarantees the socket is not
//! closed here.

use std::io;
use std::net::Shutdown;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use hearth_core::{log_debug, log_warn, RequestContext, RequestInput};

use crate::hooks::HookPipeline;
use crate::parser::{ParsedRequest, ReadOutcome, RequestParser};
use crate::response::ResponseEnv;
use crate::server::ServerShared;
use crate::stream::{ClientStream, StreamBuf};

/// Peek window while waiting for the next request.
const PEEK_TIMEOUT: Duration = Duration::from_millis(50);

/// A peek that returns empty faster than this is treated as a spurious
/// wakeup and absorbed with a short sleep.
const SPIN_GUARD_WINDOW: Duration = Duration::from_millis(40);

/// Sleep applied by the spin guard.
const SPIN_GUARD_SLEEP: Duration = Duration::from_millis(1);

/// Connection worker states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    /// Reading the request line and headers.
    ReadingHeaders,
    /// Headers done, body pending.
    AwaitingBody,
    /// Running the hook pipeline.
    Handling,
    /// Writing the response.
    Writing,
    /// Idle between keep-alive requests.
    KeepAliveWait,
    /// Tearing down.
    Closing,
    /// Ownership transferred to an external subsystem; the socket must not
    /// be closed here.
    Owned,
}

/// Serves one client connection.
pub struct ConnectionWorker {
    shared: Arc<ServerShared>,
    stream: StreamBuf,
    /// Server-assigned identifier; keys the live-worker list.
    assigned_id: i64,
    /// Effective identifier: a proxy-inherited value sticks here for the
    /// rest of the connection, otherwise this stays the assigned one.
    connection_id: i64,
    remote_ip: String,
    state: WorkerState,
    terminate: Arc<AtomicBool>,
}

impl ConnectionWorker {
    /// Wraps an accepted stream and registers with the server's live list.
    pub(crate) fn new(shared: Arc<ServerShared>, stream: ClientStream, connection_id: i64) -> Self {
        let remote_ip = stream.peer_ip();
        let terminate = Arc::new(AtomicBool::new(false));
        let signal = stream.try_clone().ok();
        shared.register_worker(connection_id, Arc::clone(&terminate), signal);

        let receive_timeout = shared.config.receive_timeout;
        Self {
            shared,
            stream: StreamBuf::new(stream, receive_timeout),
            assigned_id: connection_id,
            connection_id,
            remote_ip,
            state: WorkerState::ReadingHeaders,
            terminate,
        }
    }

    /// Current state, for diagnostics.
    #[must_use]
    pub fn state(&self) -> WorkerState {
        self.state
    }

    /// Connection identifier: server-assigned at accept time, or the
    /// proxy-inherited value once one has been seen.
    #[must_use]
    pub fn connection_id(&self) -> i64 {
        self.connection_id
    }

    /// Dedicated-thread mode: serve requests until the connection closes,
    /// times out or the server shuts down.
    ///
    /// `first` carries the pre-parsed head handed over by the pool on
    /// promotion; its body has not been read yet.
    pub(crate) fn run(mut self, first: Option<ParsedRequest>) {
        if let Some(mut req) = first {
            let outcome = self.finish_body(&mut req);
            self.shared.stats.record(outcome);
            if outcome != ReadOutcome::BodyReceived {
                self.close();
                return;
            }
            let keep_alive = req.keep_alive;
            if self.process(req).is_err() || !keep_alive {
                self.close();
                return;
            }
        }

        'connection: loop {
            let idle_window = if self.shared.config.keep_alive_timeout.is_zero() {
                self.shared.config.receive_timeout
            } else {
                self.shared.config.keep_alive_timeout
            };
            let idle_deadline = Instant::now() + idle_window;
            self.state = WorkerState::KeepAliveWait;

            loop {
                if self.should_terminate() {
                    break 'connection;
                }
                let peek_started = Instant::now();
                match self.stream.peek_available(PEEK_TIMEOUT) {
                    Err(_) => break 'connection,
                    Ok(false) => {
                        if Instant::now() >= idle_deadline {
                            self.shared.stats.record(ReadOutcome::Timeout);
                            break 'connection;
                        }
                        // Known workaround for spurious wakeups seen on some
                        // platforms: an instantly-empty peek burns CPU, so
                        // absorb it with a short sleep.
                        if self.shared.config.spin_guard
                            && peek_started.elapsed() < SPIN_GUARD_WINDOW
                        {
                            std::thread::sleep(SPIN_GUARD_SLEEP);
                        }
                        continue;
                    }
                    Ok(true) => {}
                }

                self.state = WorkerState::ReadingHeaders;
                let (outcome, req) = self.read_request(true);
                self.shared.stats.record(outcome);

                match outcome {
                    ReadOutcome::BodyReceived | ReadOutcome::HeaderReceived => {
                        let keep_alive = req.keep_alive;
                        if self.process(req).is_err() {
                            break 'connection;
                        }
                        if keep_alive {
                            continue 'connection;
                        }
                        break 'connection;
                    }
                    ReadOutcome::Owned => {
                        self.hand_off(req);
                        return;
                    }
                    _ => break 'connection,
                }
            }
        }

        self.close();
    }

    /// Pool mode: handle the first (and only) request of a connection whose
    /// headers were already judged short-lived, then close.
    pub(crate) fn run_pooled(mut self, mut req: ParsedRequest) {
        let outcome = self.finish_body(&mut req);
        self.shared.stats.record(outcome);
        if outcome == ReadOutcome::BodyReceived {
            let _ = self.process(req);
        }
        self.close();
    }

    /// Pool mode: the first read already failed; tear the connection down.
    pub(crate) fn run_pooled_failed(self) {
        self.close();
    }

    /// Reads the first request head only, for the pool's routing decision.
    pub(crate) fn read_request_head(&mut self) -> (ReadOutcome, ParsedRequest) {
        self.state = WorkerState::ReadingHeaders;
        let (outcome, req) = self.read_request(false);
        if outcome == ReadOutcome::HeaderReceived {
            self.state = WorkerState::AwaitingBody;
        }
        (outcome, req)
    }

    /// Hands the socket to the configured upgrade owner.
    pub(crate) fn hand_off(mut self, req: ParsedRequest) {
        self.state = WorkerState::Owned;
        let hook = self.shared.hooks.upgrade.clone();
        let stream = self.detach();
        if let Some(hook) = hook {
            hook(req, stream);
        }
    }

    /// Detaches the socket from this worker.
    ///
    /// The worker deregisters and will not close the returned stream; the
    /// caller owns it from here on.
    pub(crate) fn detach(mut self) -> ClientStream {
        self.state = WorkerState::Owned;
        self.shared
            .deregister_worker(self.assigned_id, self.stream.bytes_in(), self.stream.bytes_out());
        self.shared.stats.on_disconnect();
        self.stream.detach()
    }

    fn read_request(&mut self, want_body: bool) -> (ReadOutcome, ParsedRequest) {
        let deadline = if self.shared.config.header_retrieve_abort_delay.is_zero() {
            None
        } else {
            Some(Instant::now() + self.shared.config.header_retrieve_abort_delay)
        };
        let mut parser = RequestParser::new(
            &mut self.stream,
            &self.shared.parser_options,
            self.shared.hooks.before_body.as_ref(),
            &self.remote_ip,
            self.shared.config.is_ssl,
        );
        let (outcome, req) = parser.read_request(want_body, deadline);
        // An inherited id replaces the assigned one for the duration of the
        // connection; the parser already dropped out-of-range values.
        if req.remote_connection_id != 0 {
            self.connection_id = req.remote_connection_id as i64;
        }
        (outcome, req)
    }

    fn finish_body(&mut self, req: &mut ParsedRequest) -> ReadOutcome {
        self.state = WorkerState::AwaitingBody;
        let mut parser = RequestParser::new(
            &mut self.stream,
            &self.shared.parser_options,
            None,
            &self.remote_ip,
            self.shared.config.is_ssl,
        );
        parser.read_body(req)
    }

    /// Runs the pipeline for a fully-read request and writes the response.
    fn process(&mut self, req: ParsedRequest) -> io::Result<()> {
        self.state = WorkerState::Handling;
        let connection_id = self.connection_id;
        let input = RequestInput {
            url: req.url,
            method: req.method,
            headers: req.headers,
            content: req.content,
            content_type: req.content_type,
            remote_ip: req.remote_ip,
            is_ssl: self.shared.config.is_ssl,
        };
        let mut ctx = RequestContext::prepare(input, connection_id, Some(&self.shared.request_ids));

        let env = ResponseEnv {
            server_name: &self.shared.config.server_name,
            x_powered_by: &self.shared.config.x_powered_by,
            tcp_prefix: &self.shared.config.tcp_prefix,
            registry: &self.shared.registry,
            send_file: self.shared.send_file.as_deref(),
        };
        let pipeline = HookPipeline::new(&self.shared.hooks, &env);

        self.state = WorkerState::Writing;
        let result = pipeline.run(&mut self.stream, &mut ctx, req.keep_alive, &req.accept_encoding);
        match &result {
            Ok(code) => {
                log_debug!(
                    "request served",
                    connection => connection_id,
                    request => ctx.request_id(),
                    status => code,
                );
            }
            Err(e) => {
                log_warn!("response write failed", connection => connection_id, error => e);
            }
        }
        result.map(|_| ())
    }

    fn should_terminate(&self) -> bool {
        self.terminate.load(Ordering::Relaxed) || self.shared.is_terminated()
    }

    fn close(mut self) {
        self.state = WorkerState::Closing;
        let _ = self.stream.stream().shutdown(Shutdown::Both);
        self.shared
            .deregister_worker(self.assigned_id, self.stream.bytes_in(), self.stream.bytes_out());
        self.shared.stats.on_disconnect();
    }
}
