//! Embeddable threaded HTTP/1.1 origin server.
//!
//! This facade re-exports the public API of the workspace crates:
//!
//! - [`hearth_http`]: the server itself (acceptor, worker pool, parser,
//!   response pipeline, compression, file-sending strategies)
//! - [`hearth_core`]: request context, identifiers, logging
//!
//! # Quick start
//!
//! ```no_run
//! use hearth::{HttpServer, ServerConfig};
//! use std::time::Duration;
//!
//! let server = HttpServer::builder(ServerConfig::new("127.0.0.1:8080"))
//!     .on_request(|ctx| {
//!         ctx.set_out_content(b"hello".to_vec());
//!         ctx.set_out_content_type("text/plain");
//!         200
//!     })
//!     .build();
//! server.start();
//! server.wait_started(Duration::from_secs(5)).expect("server must start");
//! ```

pub use hearth_core::{
    logging, AuthStatus, LogConfig, LogEntry, LogLevel, RequestContext, RequestInput,
    NORESPONSE_CONTENT_TYPE, STATICFILE_CONTENT_TYPE,
};
pub use hearth_http::{
    deflate_compressor, gzip_compressor, write_response, AccelRedirect, BoundAddr, ClientStream,
    CompressionEntry, CompressionRegistry, CompressorFn, ExecuteState, HookPipeline, Hooks,
    HttpServer, ParsedRequest, ParserOptions, ReadOutcome, RequestHead, RequestParser,
    ResponseEnv, SendFileHook, ServerBuilder, ServerConfig, ServerError, ServerStats,
    StatsSnapshot, StreamBuf, WorkerState,
};
