//! CRLF header-block helpers.
//!
//! Request headers are carried between hooks as a normalized text block with
//! `\r\n` separators. These helpers look up and append lines without parsing
//! the block into a map, which keeps the hot path allocation-free.

/// Returns the value of `name` inside a CRLF header block, if present.
///
/// Matching is case-insensitive on the header name; the returned value has
/// surrounding whitespace trimmed.
#[must_use]
pub fn header_value<'a>(block: &'a str, name: &str) -> Option<&'a str> {
    for line in block.split("\r\n") {
        if let Some((field, value)) = line.split_once(':') {
            if field.trim().eq_ignore_ascii_case(name) {
                return Some(value.trim());
            }
        }
    }
    None
}

/// Appends a `Name: value` line to a CRLF header block.
pub fn append_header_line(block: &mut String, name: &str, value: &str) {
    if !block.is_empty() && !block.ends_with("\r\n") {
        block.push_str("\r\n");
    }
    block.push_str(name);
    block.push_str(": ");
    block.push_str(value);
    block.push_str("\r\n");
}

/// Escapes a string for inclusion in an HTML body.
#[must_use]
pub fn html_escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(c),
        }
    }
    out
}

/// Returns the RFC 7231 reason phrase for a status code.
///
/// Unknown codes fall back to the reason of their class (e.g. `299` maps to
/// `OK`), matching what proxies commonly emit.
#[must_use]
pub fn status_reason(code: u16) -> &'static str {
    match code {
        100 => "Continue",
        101 => "Switching Protocols",
        200 => "OK",
        201 => "Created",
        202 => "Accepted",
        203 => "Non-Authoritative Information",
        204 => "No Content",
        205 => "Reset Content",
        206 => "Partial Content",
        300 => "Multiple Choices",
        301 => "Moved Permanently",
        302 => "Found",
        303 => "See Other",
        304 => "Not Modified",
        307 => "Temporary Redirect",
        308 => "Permanent Redirect",
        400 => "Bad Request",
        401 => "Unauthorized",
        403 => "Forbidden",
        404 => "Not Found",
        405 => "Method Not Allowed",
        406 => "Not Acceptable",
        408 => "Request Timeout",
        409 => "Conflict",
        410 => "Gone",
        411 => "Length Required",
        412 => "Precondition Failed",
        413 => "Payload Too Large",
        414 => "URI Too Long",
        415 => "Unsupported Media Type",
        416 => "Range Not Satisfiable",
        426 => "Upgrade Required",
        429 => "Too Many Requests",
        500 => "Internal Server Error",
        501 => "Not Implemented",
        502 => "Bad Gateway",
        503 => "Service Unavailable",
        504 => "Gateway Timeout",
        505 => "HTTP Version Not Supported",
        c if (100..200).contains(&c) => "Continue",
        c if (200..300).contains(&c) => "OK",
        c if (300..400).contains(&c) => "Redirect",
        c if (400..500).contains(&c) => "Bad Request",
        _ => "Internal Server Error",
    }
}
