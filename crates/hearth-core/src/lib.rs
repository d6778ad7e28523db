//! Core types for the hearth HTTP server.
//!
//! This crate provides the building blocks shared by the wire layer:
//! - [`RequestContext`] carrying one request's inputs and outputs between hooks
//! - Connection and request identifier allocation ([`ids`])
//! - CRLF header-block helpers and status reason phrases ([`headers`])
//! - Structured logging ([`logging`])
//!
//! # Design Principles
//!
//! - Input fields of a context are immutable once prepared
//! - No ambient global state beyond the process-wide identifier fallback
//! - All types are `Send + Sync` where shared across worker threads

#![forbid(unsafe_code)]
// Pedantic clippy lints allowed (style suggestions, not correctness issues)
#![allow(clippy::uninlined_format_args)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::format_push_string)]
#![allow(clippy::struct_field_names)]
#![allow(clippy::match_same_arms)]

mod context;
pub mod headers;
pub mod ids;
pub mod logging;

pub use context::{
    AuthStatus, RequestContext, RequestInput, NORESPONSE_CONTENT_TYPE, STATICFILE_CONTENT_TYPE,
};
pub use ids::{next_connection_id, process_request_ids, RequestIdSequence};
pub use logging::{LogConfig, LogEntry, LogLevel};
