//! Embeddable threaded HTTP/1.1 origin server.
//!
//! This crate accepts TCP (or Unix-domain) connections, parses requests under
//! strict size and time budgets, dispatches them to user-supplied lifecycle
//! hooks, composes compliant responses with optional compression and
//! file-sending, and retains connections for keep-alive reuse.
//!
//! # Architecture
//!
//! ```text
//! Acceptor ──► WorkerPool ──► first request (headers only)
//!    │             │              │
//!    │             │              ├─ short request: serve in pool, close
//!    │             │              └─ keep-alive / large body: promote to
//!    │             │                 a dedicated ConnectionWorker thread
//!    └─ (no pool) ─┴────────────► ConnectionWorker ──► RequestParser
//!                                       │                   │
//!                                       │              HookPipeline
//!                                       │                   │
//!                                       └◄───────────  ResponseWriter
//! ```
//!
//! TLS is a non-goal: a front proxy terminates it and the `is_ssl` bit is
//! propagated. Routing, authentication and HTTP/2+ are equally out of scope.
//!
//! # Example
//!
//! ```ignore
//! use hearth_http::{HttpServer, ServerConfig};
//! use std::time::Duration;
//!
//! let server = HttpServer::builder(ServerConfig::new("127.0.0.1:0"))
//!     .on_request(|ctx| {
//!         ctx.set_out_content(b"hello".to_vec());
//!         ctx.set_out_content_type("text/plain");
//!         200
//!     })
//!     .build();
//! server.start();
//! server.wait_started(Duration::from_secs(5))?;
//! ```

#![deny(unsafe_code)]
// Pedantic clippy lints allowed (style suggestions, not correctness issues)
#![allow(clippy::uninlined_format_args)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::format_push_string)]
#![allow(clippy::struct_field_names)]
#![allow(clippy::match_same_arms)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_sign_loss)]

pub mod compress;
pub mod hooks;
pub mod parser;
mod pool;
pub mod response;
pub mod sendfile;
pub mod server;
pub mod stats;
pub mod stream;
pub mod worker;

pub use compress::{
    deflate_compressor, gzip_compressor, CompressionEntry, CompressionRegistry, CompressorFn,
    DEFAULT_MIN_COMPRESS_SIZE,
};
pub use hooks::{HookPipeline, Hooks, RequestHead};
pub use parser::{ParsedRequest, ParserOptions, ReadOutcome, RequestParser};
pub use response::{write_response, ResponseEnv};
pub use sendfile::{AccelRedirect, SendFileHook};
pub use server::{
    BoundAddr, ExecuteState, HttpServer, ServerBuilder, ServerConfig, ServerError,
    DEFAULT_CONTENTION_ABORT_DELAY, DEFAULT_KEEP_ALIVE_TIMEOUT, DEFAULT_POOL_SIZE,
    DEFAULT_QUEUE_LENGTH, DEFAULT_RECEIVE_TIMEOUT, SHUTDOWN_DRAIN_TIMEOUT,
};
pub use stats::{ServerStats, StatsSnapshot};
pub use stream::{ClientStream, StreamBuf};
pub use worker::{ConnectionWorker, WorkerState};

// Re-export the core types embedders interact with.
pub use hearth_core::{
    AuthStatus, RequestContext, NORESPONSE_CONTENT_TYPE, STATICFILE_CONTENT_TYPE,
};
