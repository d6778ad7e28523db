//! Response composition and emission.
//!
//! [`write_response`] turns a request context's output side into a complete
//! HTTP response on the wire: sentinel handling, error pages, custom headers,
//! content-encoding negotiation and the keep-alive tail. From the caller's
//! perspective the response is atomic; nothing else writes to the connection
//! while it runs.

use std::io;

use hearth_core::headers::{html_escape, status_reason};
use hearth_core::{log_warn, RequestContext, NORESPONSE_CONTENT_TYPE, STATICFILE_CONTENT_TYPE};

use crate::compress::CompressionRegistry;
use crate::sendfile::SendFileHook;
use crate::stream::StreamBuf;

/// Default content type for directly-served files with no embedded type.
const OCTET_STREAM: &str = "application/octet-stream";

/// Server-side immutable inputs to response composition.
pub struct ResponseEnv<'a> {
    /// Value of the `Server` header and the error-page branding.
    pub server_name: &'a str,
    /// Optional `X-Powered-By` value; empty skips the header.
    pub x_powered_by: &'a str,
    /// Banner line written before the status line; empty skips it.
    pub tcp_prefix: &'a str,
    /// Registered content-encoding codecs.
    pub registry: &'a CompressionRegistry,
    /// Optional file-sending strategy for static-file responses.
    pub send_file: Option<&'a dyn SendFileHook>,
}

/// Writes one complete response for `ctx`.
///
/// `error_detail`, when present, replaces the output body with a synthesized
/// HTML error page carrying the escaped detail text. `accept_encoding` is the
/// raw request header consulted for codec selection; `keep_alive` decides the
/// advertised protocol version and connection tail.
pub fn write_response(
    stream: &mut StreamBuf,
    env: &ResponseEnv<'_>,
    ctx: &mut RequestContext,
    status_code: u16,
    error_detail: Option<&str>,
    keep_alive: bool,
    accept_encoding: &str,
) -> io::Result<()> {
    let mut status = status_code;
    let mut detail = error_detail.map(str::to_string);

    if ctx.out_content_type() == STATICFILE_CONTENT_TYPE {
        serve_static_file(env, ctx, &mut status, &mut detail);
    }

    // A true HTTP server always responds; the out-of-band marker only
    // suppresses the content type it was parked in.
    if ctx.out_content_type() == NORESPONSE_CONTENT_TYPE {
        ctx.set_out_content_type("");
    }

    if status < 200 || ctx.in_headers().is_empty() {
        status = 404;
    }

    if let Some(detail) = detail {
        let reason = status_reason(status);
        let page = format!(
            "<!DOCTYPE html><html><body style=\"font-family:verdana\">\n\
             <h1>{server} Server Error {status}</h1><p>\n\
             {status} {reason}<br>{detail}\n\
             </p><small>{server}</small>\n</body></html>",
            server = html_escape(env.server_name),
            detail = html_escape(&detail),
        );
        ctx.set_out_content(page.into_bytes());
        ctx.set_out_content_type("text/html; charset=utf-8");
        ctx.clear_out_headers();
    }

    let mut head = String::with_capacity(256);
    if !env.tcp_prefix.is_empty() {
        head.push_str(env.tcp_prefix);
        head.push_str("\r\n");
    }
    let version = if keep_alive { "HTTP/1.1" } else { "HTTP/1.0" };
    head.push_str(&format!("{version} {status} {}\r\n", status_reason(status)));

    // Custom headers pass through verbatim; a handler-set Content-Encoding
    // means the body is already encoded and must not be re-encoded.
    let mut compression_allowed = true;
    for line in ctx.out_custom_headers().split("\r\n") {
        let line = line.trim_end();
        if line.is_empty() {
            continue;
        }
        if line
            .get(..17)
            .is_some_and(|p| p.eq_ignore_ascii_case("content-encoding:"))
        {
            compression_allowed = false;
        }
        head.push_str(line);
        head.push_str("\r\n");
    }

    if !env.x_powered_by.is_empty() {
        head.push_str(&format!("X-Powered-By: {}\r\n", env.x_powered_by));
    }
    head.push_str(&format!("Server: {}\r\n", env.server_name));

    if compression_allowed {
        if let Some(entry) = env.registry.select(accept_encoding, ctx.out_content().len()) {
            match entry.compress(ctx.out_content()) {
                Ok(encoded) => {
                    ctx.set_out_content(encoded);
                    head.push_str(&format!("Content-Encoding: {}\r\n", entry.name()));
                }
                Err(e) => {
                    log_warn!("content encoding failed, sending identity", error => e);
                }
            }
        }
    }

    head.push_str(&format!("Content-Length: {}\r\n", ctx.out_content().len()));
    if !ctx.out_content_type().is_empty() {
        head.push_str(&format!("Content-Type: {}\r\n", ctx.out_content_type()));
    }

    if keep_alive {
        if !env.registry.is_empty() {
            head.push_str(&format!("Accept-Encoding: {}\r\n", env.registry.advertisement()));
        }
        head.push_str("Connection: Keep-Alive\r\n\r\n");
    } else {
        head.push_str("\r\n");
    }

    stream.write_all(head.as_bytes())?;
    stream.write_all(ctx.out_content())?;
    stream.flush()
}

/// Resolves the static-file sentinel: offer the path to the send-file hook,
/// fall back to a direct read, degrade to a 404 page on failure.
fn serve_static_file(
    env: &ResponseEnv<'_>,
    ctx: &mut RequestContext,
    status: &mut u16,
    detail: &mut Option<String>,
) {
    let path = String::from_utf8_lossy(ctx.out_content()).into_owned();

    if let Some(hook) = env.send_file {
        let mut headers = std::mem::take(ctx.out_custom_headers_mut());
        let mut content = std::mem::take(ctx.out_content_mut());
        let handled = hook.send_file(&path, &mut headers, &mut content);
        *ctx.out_custom_headers_mut() = headers;
        *ctx.out_content_mut() = content;
        if handled {
            let embedded = extract_content_type(ctx);
            ctx.set_out_content_type(embedded.unwrap_or_default());
            return;
        }
    }

    match std::fs::read(&path) {
        Ok(bytes) => {
            ctx.set_out_content(bytes);
            let embedded = extract_content_type(ctx);
            ctx.set_out_content_type(embedded.unwrap_or_else(|| OCTET_STREAM.to_string()));
        }
        Err(e) => {
            log_warn!("static file read failed", path => &path, error => &e);
            *status = 404;
            *detail = Some(format!("Impossible to send file: {path}"));
            ctx.set_out_content(Vec::new());
            ctx.set_out_content_type("");
        }
    }
}

/// Moves a `Content-Type:` line out of the custom headers, returning its
/// value.
fn extract_content_type(ctx: &mut RequestContext) -> Option<String> {
    let block = ctx.out_custom_headers();
    let mut found = None;
    let mut rebuilt = String::with_capacity(block.len());
    for line in block.split("\r\n") {
        if line.is_empty() {
            continue;
        }
        if found.is_none()
            && line
                .get(..13)
                .is_some_and(|p| p.eq_ignore_ascii_case("content-type:"))
        {
            found = Some(line[13..].trim().to_string());
        } else {
            rebuilt.push_str(line);
            rebuilt.push_str("\r\n");
        }
    }
    if found.is_some() {
        *ctx.out_custom_headers_mut() = rebuilt;
    }
    found
}
