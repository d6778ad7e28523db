//! Structured logging for the server and its workers.
//!
//! Log entries carry the connection and request identifiers so one request
//! can be followed across the acceptor, pool and worker threads. Entries are
//! emitted to stderr, JSON-formatted for production or compact for
//! development.
//!
//! # Usage
//!
//! ```ignore
//! use hearth_core::logging::{self, LogConfig};
//! use hearth_core::log_info;
//!
//! logging::init(LogConfig::development());
//! log_info!("connection accepted", connection => 42);
//! ```
//!
//! The `log_*!` macros auto-inject the module path as the entry target and
//! skip all construction when the level is below the configured minimum.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

/// Log levels, ordered from most to least verbose.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum LogLevel {
    /// Most verbose, for detailed debugging.
    Trace = 0,
    /// Debug information, not shown in production.
    Debug = 1,
    /// General information about normal operation.
    Info = 2,
    /// Something unexpected but recoverable.
    Warn = 3,
    /// An error that affected connection or request processing.
    Error = 4,
}

impl LogLevel {
    /// Returns the level as a lowercase string.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Trace => "trace",
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }

    /// Returns a single character representation.
    #[must_use]
    pub const fn as_char(&self) -> char {
        match self {
            Self::Trace => 'T',
            Self::Debug => 'D',
            Self::Info => 'I',
            Self::Warn => 'W',
            Self::Error => 'E',
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Configuration for the logging system.
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Minimum log level to emit.
    pub min_level: LogLevel,
    /// Whether to output JSON (true) or compact format (false).
    pub json_output: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            min_level: LogLevel::Info,
            json_output: true,
        }
    }
}

impl LogConfig {
    /// Creates a new configuration with defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the minimum log level.
    #[must_use]
    pub fn level(mut self, level: LogLevel) -> Self {
        self.min_level = level;
        self
    }

    /// Sets whether to output JSON format.
    #[must_use]
    pub fn json_output(mut self, json: bool) -> Self {
        self.json_output = json;
        self
    }

    /// Returns a development configuration (verbose, compact output).
    #[must_use]
    pub fn development() -> Self {
        Self {
            min_level: LogLevel::Debug,
            json_output: false,
        }
    }

    /// Returns a production configuration (info+, JSON output).
    #[must_use]
    pub fn production() -> Self {
        Self {
            min_level: LogLevel::Info,
            json_output: true,
        }
    }

    /// Returns a testing configuration (trace level, compact output).
    #[must_use]
    pub fn testing() -> Self {
        Self {
            min_level: LogLevel::Trace,
            json_output: false,
        }
    }
}

static GLOBAL_LOG_LEVEL: AtomicUsize = AtomicUsize::new(LogLevel::Info as usize);
static GLOBAL_JSON_OUTPUT: AtomicBool = AtomicBool::new(true);

/// Applies a configuration process-wide.
pub fn init(config: LogConfig) {
    GLOBAL_LOG_LEVEL.store(config.min_level as usize, Ordering::Relaxed);
    GLOBAL_JSON_OUTPUT.store(config.json_output, Ordering::Relaxed);
}

/// Returns the current global log level.
#[inline]
#[must_use]
pub fn global_log_level() -> LogLevel {
    match GLOBAL_LOG_LEVEL.load(Ordering::Relaxed) {
        0 => LogLevel::Trace,
        1 => LogLevel::Debug,
        2 => LogLevel::Info,
        3 => LogLevel::Warn,
        _ => LogLevel::Error,
    }
}

/// Sets the global log level.
pub fn set_global_log_level(level: LogLevel) {
    GLOBAL_LOG_LEVEL.store(level as usize, Ordering::Relaxed);
}

/// Returns true if the given level would be emitted.
#[inline]
#[must_use]
pub fn level_enabled(level: LogLevel) -> bool {
    level >= global_log_level()
}

/// A structured log entry.
#[derive(Debug)]
pub struct LogEntry {
    /// The log level.
    pub level: LogLevel,
    /// The log message.
    pub message: String,
    /// Connection identifier, 0 when not connection-scoped.
    pub connection_id: i64,
    /// Request identifier, 0 when not request-scoped.
    pub request_id: u32,
    /// Module/target path (optional).
    pub target: Option<String>,
    /// Structured key-value fields (max 16).
    pub fields: Vec<(String, String)>,
    /// Millisecond wall-clock timestamp.
    pub timestamp_ms: u64,
}

impl LogEntry {
    /// Creates a new log entry.
    #[must_use]
    pub fn new(level: LogLevel, message: impl Into<String>) -> Self {
        let timestamp_ms = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
            .unwrap_or(0);
        Self {
            level,
            message: message.into(),
            connection_id: 0,
            request_id: 0,
            target: None,
            fields: Vec::new(),
            timestamp_ms,
        }
    }

    /// Associates the entry with a connection.
    #[must_use]
    pub fn connection(mut self, id: i64) -> Self {
        self.connection_id = id;
        self
    }

    /// Associates the entry with a request.
    #[must_use]
    pub fn request(mut self, id: u32) -> Self {
        self.request_id = id;
        self
    }

    /// Sets the target module path.
    #[must_use]
    pub fn target(mut self, target: impl Into<String>) -> Self {
        self.target = Some(target.into());
        self
    }

    /// Adds a structured field.
    ///
    /// Fields beyond the max (16) are silently dropped.
    #[must_use]
    pub fn field(mut self, key: impl Into<String>, value: impl fmt::Display) -> Self {
        if self.fields.len() < 16 {
            self.fields.push((key.into(), value.to_string()));
        }
        self
    }

    /// Formats the log entry as JSON.
    #[must_use]
    pub fn to_json(&self) -> String {
        let mut json = format!(
            r#"{{"timestamp_ms":{},"level":"{}","message":"{}""#,
            self.timestamp_ms,
            self.level,
            escape_json(&self.message),
        );

        if self.connection_id != 0 {
            json.push_str(&format!(r#","connection_id":{}"#, self.connection_id));
        }
        if self.request_id != 0 {
            json.push_str(&format!(r#","request_id":{}"#, self.request_id));
        }
        if let Some(ref target) = self.target {
            json.push_str(&format!(r#","target":"{}""#, escape_json(target)));
        }

        if !self.fields.is_empty() {
            json.push_str(r#","fields":{"#);
            for (i, (k, v)) in self.fields.iter().enumerate() {
                if i > 0 {
                    json.push(',');
                }
                json.push_str(&format!(r#""{}":"{}""#, escape_json(k), escape_json(v)));
            }
            json.push('}');
        }

        json.push('}');
        json
    }

    /// Formats the log entry in compact format.
    #[must_use]
    pub fn to_compact(&self) -> String {
        let mut output = format!("[{}]", self.level.as_char());
        if self.connection_id != 0 {
            output.push_str(&format!(" conn={}", self.connection_id));
        }
        if self.request_id != 0 {
            output.push_str(&format!(" req={}", self.request_id));
        }
        output.push(' ');
        output.push_str(&self.message);

        if !self.fields.is_empty() {
            output.push_str(" {");
            for (i, (k, v)) in self.fields.iter().enumerate() {
                if i > 0 {
                    output.push_str(", ");
                }
                output.push_str(&format!("{k}={v}"));
            }
            output.push('}');
        }

        output
    }

    /// Emits the entry to stderr if its level is enabled.
    pub fn emit(self) {
        if !level_enabled(self.level) {
            return;
        }
        let output = if GLOBAL_JSON_OUTPUT.load(Ordering::Relaxed) {
            self.to_json()
        } else {
            self.to_compact()
        };
        eprintln!("{output}");
    }
}

/// Escapes a string for JSON output.
fn escape_json(s: &str) -> String {
    s.replace('\\', "\\\\")
        .replace('"', "\\\"")
        .replace('\n', "\\n")
        .replace('\r', "\\r")
        .replace('\t', "\\t")
}

/// Builds and emits a TRACE entry.
#[macro_export]
macro_rules! log_trace {
    ($($args:tt)*) => {
        $crate::log_at!($crate::logging::LogLevel::Trace, $($args)*)
    };
}

/// Builds and emits a DEBUG entry.
#[macro_export]
macro_rules! log_debug {
    ($($args:tt)*) => {
        $crate::log_at!($crate::logging::LogLevel::Debug, $($args)*)
    };
}

/// Builds and emits an INFO entry.
#[macro_export]
macro_rules! log_info {
    ($($args:tt)*) => {
        $crate::log_at!($crate::logging::LogLevel::Info, $($args)*)
    };
}

/// Builds and emits a WARN entry.
#[macro_export]
macro_rules! log_warn {
    ($($args:tt)*) => {
        $crate::log_at!($crate::logging::LogLevel::Warn, $($args)*)
    };
}

/// Builds and emits an ERROR entry.
#[macro_export]
macro_rules! log_error {
    ($($args:tt)*) => {
        $crate::log_at!($crate::logging::LogLevel::Error, $($args)*)
    };
}

/// Shared expansion for the level macros.
#[macro_export]
#[doc(hidden)]
macro_rules! log_at {
    ($level:expr, $msg:expr) => {
        if $crate::logging::level_enabled($level) {
            $crate::logging::LogEntry::new($level, $msg)
                .target(module_path!())
                .emit();
        }
    };
    ($level:expr, $msg:expr, $($key:ident => $value:expr),+ $(,)?) => {
        if $crate::logging::level_enabled($level) {
            $crate::logging::LogEntry::new($level, $msg)
                .target(module_path!())
                $(.field(stringify!($key), $value))+
                .emit();
        }
    };
}
