//! Server assembly: configuration, background binding, the accept loop and
//! graceful shutdown.
//!
//! Binding happens in a background thread so construction cannot fail
//! synchronously; embedders call [`HttpServer::wait_started`] to observe the
//! outcome. Shutdown sets the terminated flag, unblocks a pending accept with
//! a loopback self-connect, signals every live worker and drains them for up
//! to [`SHUTDOWN_DRAIN_TIMEOUT`] before tearing down regardless.

use std::io::{self, ErrorKind};
use std::net::{IpAddr, Ipv4Addr, Shutdown, SocketAddr, TcpListener, TcpStream};
#[cfg(unix)]
use std::os::unix::net::{UnixListener, UnixStream};
#[cfg(unix)]
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use hearth_core::ids::{next_connection_id, RequestIdSequence};
use hearth_core::{log_debug, log_error, log_info, log_warn, RequestContext};
use parking_lot::Mutex;

use crate::compress::{CompressionRegistry, CompressorFn};
use crate::hooks::{Hooks, RequestHead};
use crate::parser::{ParsedRequest, ParserOptions};
use crate::pool::WorkerPool;
use crate::sendfile::SendFileHook;
use crate::stats::ServerStats;
use crate::stream::ClientStream;
use crate::worker::ConnectionWorker;

/// Default bound of the pool's pending-connection queue.
pub const DEFAULT_QUEUE_LENGTH: usize = 1000;

/// Default time a saturated pool may block the acceptor before a connection
/// is dropped.
pub const DEFAULT_CONTENTION_ABORT_DELAY: Duration = Duration::from_secs(5);

/// Default keep-alive idle timeout.
pub const DEFAULT_KEEP_ALIVE_TIMEOUT: Duration = Duration::from_secs(30);

/// Default socket receive timeout guarding body reads.
pub const DEFAULT_RECEIVE_TIMEOUT: Duration = Duration::from_secs(5);

/// Default pool size.
pub const DEFAULT_POOL_SIZE: usize = 32;

/// How long shutdown waits for live connections to drain.
pub const SHUTDOWN_DRAIN_TIMEOUT: Duration = Duration::from_secs(20);

/// Poll interval used by `wait_started` and the shutdown drain.
const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Drain poll interval.
const DRAIN_POLL: Duration = Duration::from_millis(100);

/// Server configuration.
///
/// `addr` accepts a bare port (`"8080"`, bound on all interfaces), a full
/// socket address (`"127.0.0.1:8080"`), a Unix-domain path (`"unix:/run/x"`),
/// or an empty string to inherit a listen socket from the process
/// environment (Linux socket activation).
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Listen address, see the struct docs for accepted forms.
    pub addr: String,
    /// Value of the `Server` response header and error-page branding.
    pub server_name: String,
    /// Pool worker count (1..=256); 0 disables the pool and serves every
    /// connection on a dedicated thread.
    pub pool_size: usize,
    /// Capacity of the pending-connection queue.
    pub queue_length: usize,
    /// Time a saturated pool may block the acceptor before dropping.
    pub contention_abort_delay: Duration,
    /// Keep-alive idle timeout; zero disables keep-alive entirely.
    pub keep_alive_timeout: Duration,
    /// Wall-clock budget for reading one request's headers; zero means
    /// unlimited.
    pub header_retrieve_abort_delay: Duration,
    /// Socket receive timeout guarding body reads.
    pub receive_timeout: Duration,
    /// Largest accepted declared body; zero means unlimited.
    pub max_content_length: usize,
    /// Header whose value replaces the socket-derived remote IP; empty
    /// disables.
    pub remote_ip_header: String,
    /// Header carrying a front-proxy connection id; empty disables.
    pub remote_conn_id_header: String,
    /// Banner line exchanged before the HTTP request/status lines; empty
    /// disables.
    pub tcp_prefix: String,
    /// `X-Powered-By` response header value; empty skips the header.
    pub x_powered_by: String,
    /// Retain the special header set inside the header block instead of
    /// lifting it into typed fields.
    pub unfiltered_headers: bool,
    /// Absorb spuriously-empty peeks with a 1 ms sleep.
    pub spin_guard: bool,
    /// Propagated to contexts: a front proxy terminated TLS.
    pub is_ssl: bool,
}

impl ServerConfig {
    /// Creates a configuration listening on `addr` with defaults.
    #[must_use]
    pub fn new(addr: impl Into<String>) -> Self {
        Self {
            addr: addr.into(),
            server_name: "hearth".to_string(),
            pool_size: DEFAULT_POOL_SIZE,
            queue_length: DEFAULT_QUEUE_LENGTH,
            contention_abort_delay: DEFAULT_CONTENTION_ABORT_DELAY,
            keep_alive_timeout: DEFAULT_KEEP_ALIVE_TIMEOUT,
            header_retrieve_abort_delay: Duration::ZERO,
            receive_timeout: DEFAULT_RECEIVE_TIMEOUT,
            max_content_length: 0,
            remote_ip_header: String::new(),
            remote_conn_id_header: String::new(),
            tcp_prefix: String::new(),
            x_powered_by: String::new(),
            unfiltered_headers: false,
            spin_guard: true,
            is_ssl: false,
        }
    }

    /// Sets the `Server` header value.
    #[must_use]
    pub fn with_server_name(mut self, name: impl Into<String>) -> Self {
        self.server_name = name.into();
        self
    }

    /// Sets the pool size; 0 disables the pool.
    #[must_use]
    pub fn with_pool_size(mut self, size: usize) -> Self {
        self.pool_size = size;
        self
    }

    /// Sets the pending-connection queue capacity.
    #[must_use]
    pub fn with_queue_length(mut self, length: usize) -> Self {
        self.queue_length = length;
        self
    }

    /// Sets the contention-abort delay.
    #[must_use]
    pub fn with_contention_abort_delay(mut self, delay: Duration) -> Self {
        self.contention_abort_delay = delay;
        self
    }

    /// Sets the keep-alive idle timeout; zero disables keep-alive.
    #[must_use]
    pub fn with_keep_alive_timeout(mut self, timeout: Duration) -> Self {
        self.keep_alive_timeout = timeout;
        self
    }

    /// Sets the header-retrieval budget; zero means unlimited.
    #[must_use]
    pub fn with_header_retrieve_abort_delay(mut self, delay: Duration) -> Self {
        self.header_retrieve_abort_delay = delay;
        self
    }

    /// Sets the socket receive timeout.
    #[must_use]
    pub fn with_receive_timeout(mut self, timeout: Duration) -> Self {
        self.receive_timeout = timeout;
        self
    }

    /// Sets the largest accepted declared body; zero means unlimited.
    #[must_use]
    pub fn with_max_content_length(mut self, max: usize) -> Self {
        self.max_content_length = max;
        self
    }

    /// Names the header that overrides the socket-derived remote IP.
    #[must_use]
    pub fn with_remote_ip_header(mut self, name: impl Into<String>) -> Self {
        self.remote_ip_header = name.into();
        self
    }

    /// Names the header carrying a front-proxy connection id.
    #[must_use]
    pub fn with_remote_conn_id_header(mut self, name: impl Into<String>) -> Self {
        self.remote_conn_id_header = name.into();
        self
    }

    /// Sets the banner line exchanged before HTTP traffic.
    #[must_use]
    pub fn with_tcp_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.tcp_prefix = prefix.into();
        self
    }

    /// Sets the `X-Powered-By` header value.
    #[must_use]
    pub fn with_x_powered_by(mut self, value: impl Into<String>) -> Self {
        self.x_powered_by = value.into();
        self
    }

    /// Retains special headers inside the header block.
    #[must_use]
    pub fn with_unfiltered_headers(mut self, unfiltered: bool) -> Self {
        self.unfiltered_headers = unfiltered;
        self
    }

    /// Enables or disables the spin guard.
    #[must_use]
    pub fn with_spin_guard(mut self, enabled: bool) -> Self {
        self.spin_guard = enabled;
        self
    }

    /// Marks connections as TLS-terminated by a front proxy.
    #[must_use]
    pub fn with_is_ssl(mut self, is_ssl: bool) -> Self {
        self.is_ssl = is_ssl;
        self
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self::new("127.0.0.1:8080")
    }
}

/// Acceptor lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ExecuteState {
    /// `start` has not been called.
    NotStarted = 0,
    /// The background thread is binding the listen socket.
    Binding = 1,
    /// Accepting connections.
    Running = 2,
    /// The acceptor exited, cleanly or with an error.
    Finished = 3,
}

impl ExecuteState {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::Binding,
            2 => Self::Running,
            3 => Self::Finished,
            _ => Self::NotStarted,
        }
    }
}

/// Errors surfaced to the embedder.
#[derive(Debug)]
pub enum ServerError {
    /// Binding or acceptor startup failed.
    Startup(String),
    /// The server did not reach the running state in time.
    StartTimeout,
    /// The operation needs a protocol server owning upgraded connections.
    CallbackNotSupported,
}

impl std::fmt::Display for ServerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Startup(msg) => write!(f, "server startup failed: {msg}"),
            Self::StartTimeout => write!(f, "server did not start in time"),
            Self::CallbackNotSupported => {
                write!(f, "callbacks require a protocol server owning the connection")
            }
        }
    }
}

impl std::error::Error for ServerError {}

/// Address the listener ended up bound to.
#[derive(Debug, Clone)]
pub enum BoundAddr {
    /// TCP socket address.
    Tcp(SocketAddr),
    /// Unix-domain socket path.
    #[cfg(unix)]
    Unix(PathBuf),
}

struct WorkerHandle {
    id: i64,
    terminate: Arc<AtomicBool>,
    signal: Option<ClientStream>,
}

struct ConnectionRegistry {
    workers: Vec<WorkerHandle>,
    bytes_in: u64,
    bytes_out: u64,
}

/// State shared between the embedder handle, the acceptor and every worker.
pub(crate) struct ServerShared {
    pub(crate) config: ServerConfig,
    pub(crate) hooks: Hooks,
    pub(crate) registry: CompressionRegistry,
    pub(crate) send_file: Option<Arc<dyn SendFileHook>>,
    pub(crate) stats: ServerStats,
    pub(crate) request_ids: RequestIdSequence,
    pub(crate) parser_options: ParserOptions,
    state: AtomicU8,
    terminated: AtomicBool,
    last_error: Mutex<String>,
    bound: Mutex<Option<BoundAddr>>,
    connections: Mutex<ConnectionRegistry>,
}

impl ServerShared {
    pub(crate) fn is_terminated(&self) -> bool {
        self.terminated.load(Ordering::Relaxed)
    }

    fn execute_state(&self) -> ExecuteState {
        ExecuteState::from_u8(self.state.load(Ordering::Acquire))
    }

    fn set_state(&self, state: ExecuteState) {
        self.state.store(state as u8, Ordering::Release);
    }

    fn set_last_error(&self, message: String) {
        *self.last_error.lock() = message;
    }

    fn last_error(&self) -> String {
        self.last_error.lock().clone()
    }

    pub(crate) fn register_worker(
        &self,
        id: i64,
        terminate: Arc<AtomicBool>,
        signal: Option<ClientStream>,
    ) {
        self.connections.lock().workers.push(WorkerHandle {
            id,
            terminate,
            signal,
        });
    }

    pub(crate) fn deregister_worker(&self, id: i64, bytes_in: u64, bytes_out: u64) {
        let mut registry = self.connections.lock();
        registry.workers.retain(|w| w.id != id);
        registry.bytes_in += bytes_in;
        registry.bytes_out += bytes_out;
    }

    fn signal_workers(&self) {
        let registry = self.connections.lock();
        for worker in &registry.workers {
            worker.terminate.store(true, Ordering::Relaxed);
            if let Some(signal) = &worker.signal {
                let _ = signal.shutdown(Shutdown::Both);
            }
        }
    }

    fn live_worker_count(&self) -> usize {
        self.connections.lock().workers.len()
    }

    fn bytes_totals(&self) -> (u64, u64) {
        let registry = self.connections.lock();
        (registry.bytes_in, registry.bytes_out)
    }
}

/// Builds an [`HttpServer`]: hooks, codecs and the send-file strategy are
/// sealed before startup, so no registration can race the accept loop.
pub struct ServerBuilder {
    config: ServerConfig,
    hooks: Hooks,
    registry: CompressionRegistry,
    send_file: Option<Arc<dyn SendFileHook>>,
}

impl ServerBuilder {
    /// Starts a builder from a configuration.
    #[must_use]
    pub fn new(config: ServerConfig) -> Self {
        Self {
            config,
            hooks: Hooks::default(),
            registry: CompressionRegistry::new(),
            send_file: None,
        }
    }

    /// Sets the early-rejection hook, run before the body is read.
    #[must_use]
    pub fn on_before_body<F>(mut self, hook: F) -> Self
    where
        F: Fn(&RequestHead<'_>) -> u16 + Send + Sync + 'static,
    {
        self.hooks.before_body = Some(Arc::new(hook));
        self
    }

    /// Sets the hook run before the main handler.
    #[must_use]
    pub fn on_before_request<F>(mut self, hook: F) -> Self
    where
        F: Fn(&mut RequestContext) -> u16 + Send + Sync + 'static,
    {
        self.hooks.before_request = Some(Arc::new(hook));
        self
    }

    /// Sets the main request handler.
    #[must_use]
    pub fn on_request<F>(mut self, hook: F) -> Self
    where
        F: Fn(&mut RequestContext) -> u16 + Send + Sync + 'static,
    {
        self.hooks.request = Some(Arc::new(hook));
        self
    }

    /// Sets the hook run after the main handler; a positive return
    /// overrides the handler's status.
    #[must_use]
    pub fn on_after_request<F>(mut self, hook: F) -> Self
    where
        F: Fn(&mut RequestContext) -> u16 + Send + Sync + 'static,
    {
        self.hooks.after_request = Some(Arc::new(hook));
        self
    }

    /// Sets the post-response notification.
    #[must_use]
    pub fn on_after_response<F>(mut self, hook: F) -> Self
    where
        F: Fn(&RequestContext, u16) + Send + Sync + 'static,
    {
        self.hooks.after_response = Some(Arc::new(hook));
        self
    }

    /// Sets the owner of upgraded connections.
    #[must_use]
    pub fn on_upgrade<F>(mut self, hook: F) -> Self
    where
        F: Fn(ParsedRequest, ClientStream) + Send + Sync + 'static,
    {
        self.hooks.upgrade = Some(Arc::new(hook));
        self
    }

    /// Registers a content-encoding codec; insertion order is priority order.
    #[must_use]
    pub fn register_compressor(
        mut self,
        name: impl Into<String>,
        compressor: CompressorFn,
        min_size: usize,
    ) -> Self {
        self.registry.register(name, compressor, min_size);
        self
    }

    /// Sets the file-sending strategy for static-file responses.
    #[must_use]
    pub fn with_send_file<H>(mut self, hook: H) -> Self
    where
        H: SendFileHook + 'static,
    {
        self.send_file = Some(Arc::new(hook));
        self
    }

    /// Seals the builder into a server handle.
    #[must_use]
    pub fn build(self) -> HttpServer {
        let parser_options = ParserOptions {
            tcp_prefix: self.config.tcp_prefix.clone(),
            keep_alive_enabled: !self.config.keep_alive_timeout.is_zero(),
            filter_headers: !self.config.unfiltered_headers,
            max_content_length: self.config.max_content_length,
            remote_ip_header: self.config.remote_ip_header.clone(),
            remote_conn_id_header: self.config.remote_conn_id_header.clone(),
            upgrade_owned: self.hooks.upgrade.is_some(),
        };

        HttpServer {
            shared: Arc::new(ServerShared {
                config: self.config,
                hooks: self.hooks,
                registry: self.registry,
                send_file: self.send_file,
                stats: ServerStats::new(),
                request_ids: RequestIdSequence::new(),
                parser_options,
                state: AtomicU8::new(ExecuteState::NotStarted as u8),
                terminated: AtomicBool::new(false),
                last_error: Mutex::new(String::new()),
                bound: Mutex::new(None),
                connections: Mutex::new(ConnectionRegistry {
                    workers: Vec::new(),
                    bytes_in: 0,
                    bytes_out: 0,
                }),
            }),
            accept_thread: Mutex::new(None),
        }
    }
}

/// An embeddable HTTP/1.1 origin server.
pub struct HttpServer {
    shared: Arc<ServerShared>,
    accept_thread: Mutex<Option<JoinHandle<()>>>,
}

impl HttpServer {
    /// Starts building a server.
    #[must_use]
    pub fn builder(config: ServerConfig) -> ServerBuilder {
        ServerBuilder::new(config)
    }

    /// Launches the background binder/acceptor thread. Idempotent.
    pub fn start(&self) {
        let mut guard = self.accept_thread.lock();
        if guard.is_some() {
            return;
        }
        self.shared.set_state(ExecuteState::Binding);
        let shared = Arc::clone(&self.shared);
        match thread::Builder::new()
            .name("hearth-accept".to_string())
            .spawn(move || accept_main(&shared))
        {
            Ok(handle) => *guard = Some(handle),
            Err(e) => {
                self.shared.set_last_error(format!("accept thread spawn failed: {e}"));
                self.shared.set_state(ExecuteState::Finished);
            }
        }
    }

    /// Polls until the acceptor is running.
    ///
    /// Surfaces bind failures as [`ServerError::Startup`]; gives up with
    /// [`ServerError::StartTimeout`] after `timeout`.
    pub fn wait_started(&self, timeout: Duration) -> Result<(), ServerError> {
        let deadline = Instant::now() + timeout;
        loop {
            match self.shared.execute_state() {
                ExecuteState::Running => return Ok(()),
                ExecuteState::Finished => {
                    let message = self.shared.last_error();
                    let message = if message.is_empty() {
                        "server already finished".to_string()
                    } else {
                        message
                    };
                    return Err(ServerError::Startup(message));
                }
                _ => {}
            }
            if Instant::now() >= deadline {
                return Err(ServerError::StartTimeout);
            }
            thread::sleep(POLL_INTERVAL);
        }
    }

    /// Current acceptor state.
    #[must_use]
    pub fn execute_state(&self) -> ExecuteState {
        self.shared.execute_state()
    }

    /// Address the listener bound to, once running.
    #[must_use]
    pub fn bound_addr(&self) -> Option<BoundAddr> {
        self.shared.bound.lock().clone()
    }

    /// TCP listen address, once running; `None` for Unix-domain listeners.
    #[must_use]
    pub fn local_addr(&self) -> Option<SocketAddr> {
        match self.bound_addr() {
            Some(BoundAddr::Tcp(addr)) => Some(addr),
            _ => None,
        }
    }

    /// Operational counters.
    #[must_use]
    pub fn stats(&self) -> &ServerStats {
        &self.shared.stats
    }

    /// Total bytes received and sent over finished connections.
    #[must_use]
    pub fn bytes_totals(&self) -> (u64, u64) {
        self.shared.bytes_totals()
    }

    /// Pushes a payload to an upgraded connection.
    ///
    /// A plain HTTP/1.1 origin server owns no upgraded connections (they are
    /// handed off through the upgrade hook), so this always fails with
    /// [`ServerError::CallbackNotSupported`].
    pub fn notify_callback(
        &self,
        _connection_id: i64,
        _payload: &[u8],
    ) -> Result<(), ServerError> {
        Err(ServerError::CallbackNotSupported)
    }

    /// Gracefully terminates the server.
    ///
    /// Safe to call more than once; also invoked on drop.
    pub fn shutdown(&self) {
        if self.shared.execute_state() == ExecuteState::NotStarted {
            return;
        }
        self.shared.terminated.store(true, Ordering::Relaxed);

        // A loopback self-connect unblocks a pending accept portably.
        if let Some(bound) = self.bound_addr() {
            match bound {
                BoundAddr::Tcp(addr) => {
                    let target = if addr.ip().is_unspecified() {
                        SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), addr.port())
                    } else {
                        addr
                    };
                    if let Ok(stream) = TcpStream::connect_timeout(&target, Duration::from_secs(1))
                    {
                        let _ = stream.shutdown(Shutdown::Both);
                    }
                }
                #[cfg(unix)]
                BoundAddr::Unix(ref path) => {
                    if let Ok(stream) = UnixStream::connect(path) {
                        let _ = stream.shutdown(Shutdown::Both);
                    }
                }
            }
        }

        self.shared.signal_workers();

        let deadline = Instant::now() + SHUTDOWN_DRAIN_TIMEOUT;
        while self.shared.live_worker_count() > 0 && Instant::now() < deadline {
            thread::sleep(DRAIN_POLL);
        }

        if let Some(handle) = self.accept_thread.lock().take() {
            while !handle.is_finished() && Instant::now() < deadline {
                thread::sleep(DRAIN_POLL);
            }
            if handle.is_finished() {
                let _ = handle.join();
            } else {
                log_warn!("acceptor still busy past drain deadline, detaching");
            }
        }

        #[cfg(unix)]
        if let Some(BoundAddr::Unix(path)) = self.bound_addr() {
            let _ = std::fs::remove_file(path);
        }
    }
}

impl Drop for HttpServer {
    fn drop(&mut self) {
        self.shutdown();
    }
}

enum ListenerKind {
    Tcp(TcpListener),
    #[cfg(unix)]
    Unix(UnixListener),
}

impl ListenerKind {
    fn accept(&self) -> io::Result<ClientStream> {
        match self {
            Self::Tcp(listener) => listener.accept().map(|(stream, _)| ClientStream::Tcp(stream)),
            #[cfg(unix)]
            Self::Unix(listener) => {
                listener.accept().map(|(stream, _)| ClientStream::Unix(stream))
            }
        }
    }
}

fn bind_listener(config: &ServerConfig) -> io::Result<(ListenerKind, BoundAddr)> {
    let addr = config.addr.trim();
    if addr.is_empty() {
        return inherit_listener();
    }

    #[cfg(unix)]
    if let Some(path) = addr.strip_prefix("unix:") {
        let path = PathBuf::from(path);
        // A stale socket file from a previous run would fail the bind.
        let _ = std::fs::remove_file(&path);
        let listener = UnixListener::bind(&path)?;
        return Ok((ListenerKind::Unix(listener), BoundAddr::Unix(path)));
    }

    let target = if addr.contains(':') {
        addr.to_string()
    } else {
        format!("0.0.0.0:{addr}")
    };
    let listener = TcpListener::bind(&target)?;
    let local = listener.local_addr()?;
    Ok((ListenerKind::Tcp(listener), BoundAddr::Tcp(local)))
}

/// Inherits the listen socket passed by a socket-activation manager.
///
/// The 1 s receive timeout makes `accept` unblock periodically so the loop
/// can observe the terminated flag even without a self-connect target.
#[cfg(target_os = "linux")]
#[allow(unsafe_code)]
fn inherit_listener() -> io::Result<(ListenerKind, BoundAddr)> {
    use std::os::fd::FromRawFd;

    const SD_LISTEN_FDS_START: i32 = 3;

    let count: usize = std::env::var("LISTEN_FDS")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(0);
    if count == 0 {
        return Err(io::Error::new(
            ErrorKind::AddrNotAvailable,
            "no inherited listen socket (LISTEN_FDS unset)",
        ));
    }

    // SAFETY: fd 3 is the first socket passed by the activation manager and
    // belongs to this process from here on.
    let listener = unsafe { TcpListener::from_raw_fd(SD_LISTEN_FDS_START) };
    socket2::SockRef::from(&listener).set_read_timeout(Some(Duration::from_secs(1)))?;
    let local = listener.local_addr()?;
    Ok((ListenerKind::Tcp(listener), BoundAddr::Tcp(local)))
}

#[cfg(not(target_os = "linux"))]
fn inherit_listener() -> io::Result<(ListenerKind, BoundAddr)> {
    Err(io::Error::new(
        ErrorKind::Unsupported,
        "listen socket inheritance is only supported on Linux",
    ))
}

/// Binder + accept loop, run on the background thread.
fn accept_main(shared: &Arc<ServerShared>) {
    let (listener, bound) = match bind_listener(&shared.config) {
        Ok(bound) => bound,
        Err(e) => {
            log_error!("bind failed", addr => &shared.config.addr, error => &e);
            shared.set_last_error(format!("bind {} failed: {e}", shared.config.addr));
            shared.set_state(ExecuteState::Finished);
            return;
        }
    };
    *shared.bound.lock() = Some(bound);

    let pool = if shared.config.pool_size > 0 {
        match WorkerPool::new(shared) {
            Ok(pool) => Some(pool),
            Err(e) => {
                log_error!("worker pool start failed", error => &e);
                shared.set_last_error(format!("worker pool start failed: {e}"));
                shared.set_state(ExecuteState::Finished);
                return;
            }
        }
    } else {
        None
    };

    shared.set_state(ExecuteState::Running);
    log_info!("server listening", addr => &shared.config.addr);

    while !shared.is_terminated() {
        match listener.accept() {
            Ok(stream) => {
                if shared.is_terminated() {
                    break;
                }
                shared.stats.on_connect();
                let connection_id = next_connection_id();
                log_debug!("connection accepted", connection => connection_id);

                match &pool {
                    Some(pool) => {
                        if !pool.push(stream, connection_id, shared.config.contention_abort_delay)
                        {
                            log_warn!(
                                "pool saturated, dropping connection",
                                connection => connection_id,
                            );
                            shared.stats.on_disconnect();
                        }
                    }
                    None => {
                        let worker =
                            ConnectionWorker::new(Arc::clone(shared), stream, connection_id);
                        let spawned = thread::Builder::new()
                            .name(format!("hearth-conn-{connection_id}"))
                            .spawn(move || worker.run(None));
                        if let Err(e) = spawned {
                            log_warn!(
                                "worker thread spawn failed",
                                connection => connection_id,
                                error => e,
                            );
                        }
                    }
                }
            }
            Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => {
                // Inherited listeners carry a receive timeout so shutdown is
                // observed; just go around.
            }
            Err(e) => {
                if shared.is_terminated() {
                    break;
                }
                log_warn!("accept failed, retrying", error => e);
                thread::sleep(Duration::from_millis(1));
            }
        }
    }

    if let Some(pool) = pool {
        pool.shutdown(Instant::now() + SHUTDOWN_DRAIN_TIMEOUT);
    }
    shared.set_state(ExecuteState::Finished);
}
