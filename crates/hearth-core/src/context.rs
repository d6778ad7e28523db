//! Per-request context carried between lifecycle hooks.

use crate::headers::append_header_line;
use crate::ids::{process_request_ids, RequestIdSequence};

/// Sentinel content type: the output content is a file path to serve.
pub const STATICFILE_CONTENT_TYPE: &str = "!STATICFILE";

/// Sentinel content type: the handler already responded out-of-band.
pub const NORESPONSE_CONTENT_TYPE: &str = "!NORESPONSE";

/// Authentication scheme status carried through for external authenticators.
///
/// The server itself performs no authentication; a hook may record the
/// outcome here for downstream consumers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AuthStatus {
    /// No authentication attempted.
    #[default]
    None,
    /// Authentication attempted and failed.
    Failed,
    /// HTTP Basic.
    Basic,
    /// HTTP Digest.
    Digest,
    /// NTLM.
    Ntlm,
    /// Negotiate (SPNEGO).
    Negotiate,
    /// Kerberos.
    Kerberos,
}

/// Input side of a request, sealed into a [`RequestContext`] by
/// [`RequestContext::prepare`].
#[derive(Debug, Default, Clone)]
pub struct RequestInput {
    /// Request URL as received on the request line.
    pub url: String,
    /// Request method token (free-form; the wire grammar admits any token).
    pub method: String,
    /// Normalized header block with CRLF separators.
    pub headers: String,
    /// Request body bytes.
    pub content: Vec<u8>,
    /// Declared `Content-Type` of the body.
    pub content_type: String,
    /// Remote peer IP, socket-derived or overridden by a configured header.
    pub remote_ip: String,
    /// Whether the front proxy terminated TLS for this connection.
    pub is_ssl: bool,
}

/// Carries one request's inputs and outputs between lifecycle hooks.
///
/// A context is created when request processing starts and destroyed after
/// the final hook returns. Input fields are immutable once
/// [`prepare`](Self::prepare) has run; output fields are written by hooks and
/// consumed by the response writer.
///
/// When the remote IP is non-empty, `prepare` appends a `RemoteIP: <value>`
/// line to the header block so downstream hooks can read it uniformly.
#[derive(Debug)]
pub struct RequestContext {
    url: String,
    method: String,
    in_headers: String,
    in_content: Vec<u8>,
    in_content_type: String,
    remote_ip: String,
    is_ssl: bool,
    auth_status: AuthStatus,
    auth_user: String,
    out_content: Vec<u8>,
    out_content_type: String,
    out_custom_headers: String,
    connection_id: i64,
    request_id: u32,
}

impl RequestContext {
    /// Seals `input` into a context, allocating the request identifier.
    ///
    /// `request_ids` is the owning server's sequence; `None` falls back to
    /// the process-wide sequence.
    #[must_use]
    pub fn prepare(
        input: RequestInput,
        connection_id: i64,
        request_ids: Option<&RequestIdSequence>,
    ) -> Self {
        let mut in_headers = input.headers;
        if !input.remote_ip.is_empty() {
            append_header_line(&mut in_headers, "RemoteIP", &input.remote_ip);
        }
        let request_id = request_ids.unwrap_or_else(|| process_request_ids()).next();

        Self {
            url: input.url,
            method: input.method,
            in_headers,
            in_content: input.content,
            in_content_type: input.content_type,
            remote_ip: input.remote_ip,
            is_ssl: input.is_ssl,
            auth_status: AuthStatus::None,
            auth_user: String::new(),
            out_content: Vec::new(),
            out_content_type: String::new(),
            out_custom_headers: String::new(),
            connection_id,
            request_id,
        }
    }

    /// Request URL as received on the request line.
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Request method token.
    #[must_use]
    pub fn method(&self) -> &str {
        &self.method
    }

    /// Normalized input header block (CRLF separators).
    #[must_use]
    pub fn in_headers(&self) -> &str {
        &self.in_headers
    }

    /// Request body bytes.
    #[must_use]
    pub fn in_content(&self) -> &[u8] {
        &self.in_content
    }

    /// Declared body content type.
    #[must_use]
    pub fn in_content_type(&self) -> &str {
        &self.in_content_type
    }

    /// Remote peer IP (possibly overridden by a configured header).
    #[must_use]
    pub fn remote_ip(&self) -> &str {
        &self.remote_ip
    }

    /// Whether a front proxy terminated TLS for this connection.
    #[must_use]
    pub fn is_ssl(&self) -> bool {
        self.is_ssl
    }

    /// Connection identifier (server-assigned or proxy-inherited).
    #[must_use]
    pub fn connection_id(&self) -> i64 {
        self.connection_id
    }

    /// Request identifier, unique within the owning server until wrap.
    #[must_use]
    pub fn request_id(&self) -> u32 {
        self.request_id
    }

    /// Recorded authentication outcome.
    #[must_use]
    pub fn auth_status(&self) -> AuthStatus {
        self.auth_status
    }

    /// Authenticated principal, empty when not authenticated.
    #[must_use]
    pub fn auth_user(&self) -> &str {
        &self.auth_user
    }

    /// Records the outcome of an external authentication step.
    pub fn set_authenticated(&mut self, status: AuthStatus, user: impl Into<String>) {
        self.auth_status = status;
        self.auth_user = user.into();
    }

    /// Output body (or file path when the static-file sentinel is set).
    #[must_use]
    pub fn out_content(&self) -> &[u8] {
        &self.out_content
    }

    /// Mutable access to the output body, for the response writer.
    pub fn out_content_mut(&mut self) -> &mut Vec<u8> {
        &mut self.out_content
    }

    /// Replaces the output body.
    pub fn set_out_content(&mut self, content: impl Into<Vec<u8>>) {
        self.out_content = content.into();
    }

    /// Output content type (may hold a sentinel value).
    #[must_use]
    pub fn out_content_type(&self) -> &str {
        &self.out_content_type
    }

    /// Replaces the output content type.
    pub fn set_out_content_type(&mut self, content_type: impl Into<String>) {
        self.out_content_type = content_type.into();
    }

    /// Custom response headers, one `Name: value` per CRLF line.
    #[must_use]
    pub fn out_custom_headers(&self) -> &str {
        &self.out_custom_headers
    }

    /// Mutable access to the custom response headers.
    pub fn out_custom_headers_mut(&mut self) -> &mut String {
        &mut self.out_custom_headers
    }

    /// Appends one custom response header line.
    pub fn add_out_header(&mut self, name: &str, value: &str) {
        append_header_line(&mut self.out_custom_headers, name, value);
    }

    /// Clears all custom response headers.
    pub fn clear_out_headers(&mut self) {
        self.out_custom_headers.clear();
    }

    /// Instructs the response writer to serve a local file.
    pub fn serve_file(&mut self, path: impl Into<String>) {
        self.out_content = path.into().into_bytes();
        self.out_content_type = STATICFILE_CONTENT_TYPE.to_string();
    }
}
