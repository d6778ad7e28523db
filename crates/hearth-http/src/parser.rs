//! HTTP/1.1 request parsing under size and time budgets.
//!
//! [`RequestParser::read_request`] consumes one request from a buffered
//! client stream and reports a [`ReadOutcome`]. Policy rejections (oversized
//! payload, early hook refusal) write their minimal HTTP/1.0 response here,
//! before the body is ever read; transport and parse failures close silently
//! because the request framing is already suspect.

use std::io::{self, ErrorKind};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::time::Instant;

use hearth_core::headers::status_reason;

use crate::hooks::{BeforeBodyHook, RequestHead};
use crate::stream::StreamBuf;

/// Maximum length of the request line or a single header line.
const MAX_HEADER_LINE: usize = 8 * 1024;

/// Maximum number of header lines per request.
const MAX_HEADER_LINES: usize = 256;

/// Terminal result of reading one request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReadOutcome {
    /// Transport or framing failure; the connection closes silently.
    ConnectionError,
    /// A hook panicked or the server faulted; the connection closes.
    InternalError,
    /// Declared body exceeds the configured cap; a 413 was written.
    OversizedPayload,
    /// The early-rejection hook declined; its status was written.
    Rejected,
    /// The header deadline or a socket timeout elapsed.
    Timeout,
    /// Headers parsed; the body was not requested.
    HeaderReceived,
    /// Headers parsed and the body fully read.
    BodyReceived,
    /// The connection is being handed off to an external owner.
    Owned,
}

/// One parsed request, before it is sealed into a request context.
#[derive(Debug, Clone)]
pub struct ParsedRequest {
    /// Request method token.
    pub method: String,
    /// Request URL.
    pub url: String,
    /// HTTP version token (`HTTP/1.1`, `HTTP/1.0`, ...).
    pub version: String,
    /// Negotiated keep-alive: HTTP/1.1, keep-alive enabled server-side, and
    /// no `Connection: close`.
    pub keep_alive: bool,
    /// `Connection: upgrade` was present.
    pub upgrade: bool,
    /// Header block (filtered or unfiltered, CRLF separators).
    pub headers: String,
    /// Declared `Content-Type`.
    pub content_type: String,
    /// Declared `Content-Length`; `-1` when absent or unparsable.
    pub content_length: i64,
    /// Declared `Content-Encoding` of the request body.
    pub content_encoding: String,
    /// Raw `Accept-Encoding` value, consulted when composing the response.
    pub accept_encoding: String,
    /// `Host` header.
    pub host: String,
    /// `User-Agent` header.
    pub user_agent: String,
    /// `Referer` header.
    pub referer: String,
    /// Peer IP: socket-derived, or the configured proxy header's value.
    pub remote_ip: String,
    /// Connection identifier inherited from the configured proxy header;
    /// zero when absent, unparsable or outside the positive 63-bit range.
    pub remote_connection_id: u64,
    /// Request body.
    pub content: Vec<u8>,
}

impl Default for ParsedRequest {
    fn default() -> Self {
        Self {
            method: String::new(),
            url: String::new(),
            version: String::new(),
            keep_alive: false,
            upgrade: false,
            headers: String::new(),
            content_type: String::new(),
            content_length: -1,
            content_encoding: String::new(),
            accept_encoding: String::new(),
            host: String::new(),
            user_agent: String::new(),
            referer: String::new(),
            remote_ip: String::new(),
            remote_connection_id: 0,
            content: Vec::new(),
        }
    }
}

/// Server-side knobs consulted while parsing.
#[derive(Debug, Clone)]
pub struct ParserOptions {
    /// Expected banner line before the request line; empty disables.
    pub tcp_prefix: String,
    /// Whether the server keeps connections alive at all (timeout > 0).
    pub keep_alive_enabled: bool,
    /// Filtered mode lifts the special header set out of the block.
    pub filter_headers: bool,
    /// Maximum declared body size; 0 means unlimited.
    pub max_content_length: usize,
    /// Header name overriding the socket-derived remote IP; empty disables.
    pub remote_ip_header: String,
    /// Header name carrying a proxy connection id; empty disables.
    pub remote_conn_id_header: String,
    /// Whether upgrade requests are handed off to an external owner.
    pub upgrade_owned: bool,
}

impl Default for ParserOptions {
    fn default() -> Self {
        Self {
            tcp_prefix: String::new(),
            keep_alive_enabled: true,
            filter_headers: true,
            max_content_length: 0,
            remote_ip_header: String::new(),
            remote_conn_id_header: String::new(),
            upgrade_owned: false,
        }
    }
}

/// Parses requests from one client connection.
pub struct RequestParser<'a> {
    stream: &'a mut StreamBuf,
    options: &'a ParserOptions,
    before_body: Option<&'a BeforeBodyHook>,
    remote_ip: &'a str,
    is_ssl: bool,
}

impl<'a> RequestParser<'a> {
    /// Creates a parser over `stream`.
    ///
    /// `remote_ip` is the socket-derived peer address; `is_ssl` is the
    /// propagated front-proxy TLS bit.
    pub fn new(
        stream: &'a mut StreamBuf,
        options: &'a ParserOptions,
        before_body: Option<&'a BeforeBodyHook>,
        remote_ip: &'a str,
        is_ssl: bool,
    ) -> Self {
        Self {
            stream,
            options,
            before_body,
            remote_ip,
            is_ssl,
        }
    }

    /// Reads one request.
    ///
    /// `deadline`, when set, bounds the time allowed to finish reading the
    /// headers. With `want_body` false the caller receives
    /// [`ReadOutcome::HeaderReceived`] and finishes the body later via
    /// [`read_body`](Self::read_body).
    pub fn read_request(
        &mut self,
        want_body: bool,
        deadline: Option<Instant>,
    ) -> (ReadOutcome, ParsedRequest) {
        let mut req = ParsedRequest {
            remote_ip: self.remote_ip.to_string(),
            ..ParsedRequest::default()
        };

        // Configured banner line must match exactly.
        if !self.options.tcp_prefix.is_empty() {
            match self.stream.read_line(MAX_HEADER_LINE, deadline) {
                Ok(line) if line == self.options.tcp_prefix => {}
                Ok(_) => return (ReadOutcome::ConnectionError, req),
                Err(e) => return (outcome_for_io(&e), req),
            }
        }

        let line = match self.stream.read_line(MAX_HEADER_LINE, deadline) {
            Ok(line) => line,
            Err(e) => return (outcome_for_io(&e), req),
        };
        let mut parts = line.splitn(3, ' ');
        let (method, url, version) = match (parts.next(), parts.next(), parts.next()) {
            (Some(m), Some(u), Some(v)) if !m.is_empty() && !u.is_empty() && !v.is_empty() => {
                (m, u, v)
            }
            _ => return (ReadOutcome::ConnectionError, req),
        };
        req.method = method.to_string();
        req.url = url.to_string();
        req.version = version.to_string();
        req.keep_alive = req.version == "HTTP/1.1" && self.options.keep_alive_enabled;

        if let Err(outcome) = self.read_headers(&mut req, deadline) {
            return (outcome, req);
        }

        // The configured deadline is checked once more before any body work.
        if let Some(d) = deadline {
            if Instant::now() >= d {
                return (ReadOutcome::Timeout, req);
            }
        }

        if self.options.max_content_length > 0
            && req.content_length > self.options.max_content_length as i64
        {
            let _ = self.write_minimal_response(413);
            return (ReadOutcome::OversizedPayload, req);
        }

        if let Some(hook) = self.before_body {
            let head = RequestHead {
                url: &req.url,
                method: &req.method,
                headers: &req.headers,
                content_type: &req.content_type,
                remote_ip: &req.remote_ip,
                content_length: req.content_length,
                is_ssl: self.is_ssl,
            };
            match catch_unwind(AssertUnwindSafe(|| hook(&head))) {
                Ok(200) => {}
                Ok(code) => {
                    let _ = self.write_minimal_response(code);
                    return (ReadOutcome::Rejected, req);
                }
                Err(_) => return (ReadOutcome::InternalError, req),
            }
        }

        if req.upgrade && self.options.upgrade_owned {
            return (ReadOutcome::Owned, req);
        }

        if want_body && !req.upgrade {
            let outcome = self.read_body(&mut req);
            (outcome, req)
        } else {
            (ReadOutcome::HeaderReceived, req)
        }
    }

    /// Reads the request body declared by an already-parsed head.
    ///
    /// A negative `content_length` means no declared length: GET requests and
    /// keep-alive connections treat that as an empty body, anything else
    /// consumes the stream to EOF (a compatibility quirk some HTTP/1.0
    /// clients rely on).
    pub fn read_body(&mut self, req: &mut ParsedRequest) -> ReadOutcome {
        if req.content_length > 0 {
            match self.stream.read_exact_vec(req.content_length as usize, None) {
                Ok(content) => req.content = content,
                Err(e) => return outcome_for_io(&e),
            }
        } else if req.content_length < 0 && req.method != "GET" && !req.keep_alive {
            match self.stream.read_to_end_vec() {
                Ok(content) => req.content = content,
                Err(e) => return outcome_for_io(&e),
            }
        }
        ReadOutcome::BodyReceived
    }

    fn read_headers(
        &mut self,
        req: &mut ParsedRequest,
        deadline: Option<Instant>,
    ) -> Result<(), ReadOutcome> {
        for _ in 0..MAX_HEADER_LINES {
            let line = self
                .stream
                .read_line(MAX_HEADER_LINE, deadline)
                .map_err(|e| outcome_for_io(&e))?;
            if line.is_empty() {
                return Ok(());
            }
            let Some((name, value)) = line.split_once(':') else {
                return Err(ReadOutcome::ConnectionError);
            };
            let name = name.trim();
            let value = value.trim();

            let special = self.lift_special_header(req, name, value);
            if !special || !self.options.filter_headers {
                req.headers.push_str(&line);
                req.headers.push_str("\r\n");
            }
        }
        Err(ReadOutcome::ConnectionError)
    }

    /// Lifts a member of the special header set into its typed field.
    /// Returns false for ordinary headers.
    fn lift_special_header(&self, req: &mut ParsedRequest, name: &str, value: &str) -> bool {
        if name.eq_ignore_ascii_case("content-length") {
            req.content_length = value.parse().unwrap_or(-1);
        } else if name.eq_ignore_ascii_case("content-type") {
            req.content_type = value.to_string();
        } else if name.eq_ignore_ascii_case("content-encoding") {
            req.content_encoding = value.to_string();
        } else if name.eq_ignore_ascii_case("accept-encoding") {
            req.accept_encoding = value.to_string();
        } else if name.eq_ignore_ascii_case("host") {
            req.host = value.to_string();
        } else if name.eq_ignore_ascii_case("user-agent") {
            req.user_agent = value.to_string();
        } else if name.eq_ignore_ascii_case("referer") {
            req.referer = value.to_string();
        } else if name.eq_ignore_ascii_case("connection") {
            for token in value.split(',') {
                let token = token.trim();
                if token.eq_ignore_ascii_case("close") {
                    req.keep_alive = false;
                } else if token.eq_ignore_ascii_case("upgrade") {
                    req.upgrade = true;
                }
            }
        } else if !self.options.remote_ip_header.is_empty()
            && name.eq_ignore_ascii_case(&self.options.remote_ip_header)
        {
            req.remote_ip = value.to_string();
        } else if !self.options.remote_conn_id_header.is_empty()
            && name.eq_ignore_ascii_case(&self.options.remote_conn_id_header)
        {
            // Values above i64::MAX cannot stay positive as a connection id;
            // treat them like unparsable input.
            req.remote_connection_id = value
                .parse::<u64>()
                .ok()
                .filter(|&id| id <= i64::MAX as u64)
                .unwrap_or(0);
        } else {
            return false;
        }
        true
    }

    /// Writes the minimal HTTP/1.0 response used for early rejections.
    fn write_minimal_response(&mut self, code: u16) -> io::Result<()> {
        let reason = status_reason(code);
        let body = format!("HTTP/1.0 {code} {reason}\r\n\r\n{reason} {code}");
        self.stream.write_all(body.as_bytes())?;
        self.stream.flush()
    }
}

fn outcome_for_io(e: &io::Error) -> ReadOutcome {
    match e.kind() {
        ErrorKind::TimedOut | ErrorKind::WouldBlock => ReadOutcome::Timeout,
        _ => ReadOutcome::ConnectionError,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::ClientStream;
    use proptest::prelude::*;
    use std::io::{Read, Write};
    use std::net::{TcpListener, TcpStream};
    use std::sync::Arc;
    use std::time::Duration;

    fn tcp_pair() -> (StreamBuf, TcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
        let addr = listener.local_addr().expect("local addr");
        let client = TcpStream::connect(addr).expect("connect");
        let (server, _) = listener.accept().expect("accept");
        (
            StreamBuf::new(ClientStream::Tcp(server), Duration::from_secs(2)),
            client,
        )
    }

    fn parse(
        raw: &[u8],
        options: &ParserOptions,
        want_body: bool,
    ) -> (ReadOutcome, ParsedRequest) {
        let (mut stream, mut client) = tcp_pair();
        client.write_all(raw).expect("write request");
        drop(client);
        let mut parser = RequestParser::new(&mut stream, options, None, "127.0.0.1", false);
        parser.read_request(want_body, None)
    }

    #[test]
    fn parses_simple_get() {
        let options = ParserOptions::default();
        let (outcome, req) = parse(b"GET /a/b?q=1 HTTP/1.1\r\nHost: x\r\n\r\n", &options, true);

        assert_eq!(outcome, ReadOutcome::BodyReceived);
        assert_eq!(req.method, "GET");
        assert_eq!(req.url, "/a/b?q=1");
        assert_eq!(req.version, "HTTP/1.1");
        assert_eq!(req.host, "x");
        assert!(req.keep_alive);
        assert!(req.content.is_empty());
    }

    #[test]
    fn http10_is_not_keep_alive() {
        let options = ParserOptions::default();
        let (outcome, req) = parse(b"GET / HTTP/1.0\r\n\r\n", &options, true);

        assert_eq!(outcome, ReadOutcome::BodyReceived);
        assert!(!req.keep_alive);
    }

    #[test]
    fn keep_alive_requires_server_opt_in() {
        let options = ParserOptions {
            keep_alive_enabled: false,
            ..ParserOptions::default()
        };
        let (_, req) = parse(b"GET / HTTP/1.1\r\n\r\n", &options, true);
        assert!(!req.keep_alive);
    }

    #[test]
    fn connection_close_clears_keep_alive() {
        let options = ParserOptions::default();
        let (_, req) = parse(b"GET / HTTP/1.1\r\nConnection: close\r\n\r\n", &options, true);
        assert!(!req.keep_alive);
    }

    #[test]
    fn connection_upgrade_sets_flag() {
        let options = ParserOptions::default();
        let (outcome, req) = parse(
            b"GET /ws HTTP/1.1\r\nConnection: Upgrade\r\nUpgrade: websocket\r\n\r\n",
            &options,
            true,
        );
        // No upgrade owner configured: the request parses normally.
        assert_eq!(outcome, ReadOutcome::BodyReceived);
        assert!(req.upgrade);
    }

    #[test]
    fn upgrade_with_owner_reports_owned() {
        let options = ParserOptions {
            upgrade_owned: true,
            ..ParserOptions::default()
        };
        let (outcome, _) = parse(
            b"GET /ws HTTP/1.1\r\nConnection: Upgrade\r\n\r\n",
            &options,
            true,
        );
        assert_eq!(outcome, ReadOutcome::Owned);
    }

    #[test]
    fn filtered_mode_lifts_special_headers() {
        let options = ParserOptions::default();
        let (_, req) = parse(
            b"GET / HTTP/1.1\r\nHost: x\r\nX-Custom: 1\r\nUser-Agent: probe\r\n\r\n",
            &options,
            true,
        );
        assert_eq!(req.headers, "X-Custom: 1\r\n");
        assert_eq!(req.host, "x");
        assert_eq!(req.user_agent, "probe");
    }

    #[test]
    fn unfiltered_mode_retains_everything() {
        let options = ParserOptions {
            filter_headers: false,
            ..ParserOptions::default()
        };
        let (_, req) = parse(b"GET / HTTP/1.1\r\nHost: x\r\nX-Custom: 1\r\n\r\n", &options, true);
        assert_eq!(req.headers, "Host: x\r\nX-Custom: 1\r\n");
        assert_eq!(req.host, "x");
    }

    #[test]
    fn reads_declared_body() {
        let options = ParserOptions::default();
        let (outcome, req) = parse(
            b"POST /u HTTP/1.1\r\nContent-Length: 3\r\nContent-Type: text/plain\r\n\r\nabc",
            &options,
            true,
        );
        assert_eq!(outcome, ReadOutcome::BodyReceived);
        assert_eq!(req.content, b"abc");
        assert_eq!(req.content_type, "text/plain");
        assert_eq!(req.content_length, 3);
    }

    #[test]
    fn headers_only_when_body_not_wanted() {
        let options = ParserOptions::default();
        let (outcome, req) = parse(
            b"POST /u HTTP/1.1\r\nContent-Length: 3\r\n\r\nabc",
            &options,
            false,
        );
        assert_eq!(outcome, ReadOutcome::HeaderReceived);
        assert!(req.content.is_empty());
    }

    #[test]
    fn read_body_finishes_a_deferred_body() {
        let (mut stream, mut client) = tcp_pair();
        client
            .write_all(b"POST /u HTTP/1.1\r\nContent-Length: 5\r\n\r\nhello")
            .expect("write");
        let options = ParserOptions::default();
        let mut parser = RequestParser::new(&mut stream, &options, None, "127.0.0.1", false);
        let (outcome, mut req) = parser.read_request(false, None);
        assert_eq!(outcome, ReadOutcome::HeaderReceived);

        assert_eq!(parser.read_body(&mut req), ReadOutcome::BodyReceived);
        assert_eq!(req.content, b"hello");
    }

    #[test]
    fn missing_length_reads_to_eof_for_non_get() {
        // HTTP/1.0 POST without Content-Length: body runs to connection close.
        let options = ParserOptions::default();
        let (outcome, req) = parse(b"POST /u HTTP/1.0\r\n\r\nraw stream", &options, true);
        assert_eq!(outcome, ReadOutcome::BodyReceived);
        assert_eq!(req.content, b"raw stream");
        assert_eq!(req.content_length, -1);
    }

    #[test]
    fn missing_length_is_empty_for_get() {
        let options = ParserOptions::default();
        let (outcome, req) = parse(b"GET / HTTP/1.0\r\n\r\n", &options, true);
        assert_eq!(outcome, ReadOutcome::BodyReceived);
        assert!(req.content.is_empty());
    }

    #[test]
    fn remote_ip_header_overrides_socket_ip() {
        let options = ParserOptions {
            remote_ip_header: "X-Real-IP".into(),
            ..ParserOptions::default()
        };
        let (_, req) = parse(b"GET / HTTP/1.1\r\nX-Real-IP: 9.9.9.9\r\n\r\n", &options, true);
        assert_eq!(req.remote_ip, "9.9.9.9");
    }

    #[test]
    fn remote_conn_id_header_is_parsed() {
        let options = ParserOptions {
            remote_conn_id_header: "X-Conn-ID".into(),
            ..ParserOptions::default()
        };
        let (_, req) = parse(b"GET / HTTP/1.1\r\nX-Conn-ID: 777\r\n\r\n", &options, true);
        assert_eq!(req.remote_connection_id, 777);

        let (_, req) = parse(b"GET / HTTP/1.1\r\nX-Conn-ID: junk\r\n\r\n", &options, true);
        assert_eq!(req.remote_connection_id, 0);
    }

    #[test]
    fn remote_conn_id_above_positive_63_bit_range_is_dropped() {
        let options = ParserOptions {
            remote_conn_id_header: "X-Conn-ID".into(),
            ..ParserOptions::default()
        };
        // u64::MAX parses but cannot stay positive as a connection id.
        let (_, req) = parse(
            b"GET / HTTP/1.1\r\nX-Conn-ID: 18446744073709551615\r\n\r\n",
            &options,
            true,
        );
        assert_eq!(req.remote_connection_id, 0);

        // The largest in-range value passes through untouched.
        let (_, req) = parse(
            b"GET / HTTP/1.1\r\nX-Conn-ID: 9223372036854775807\r\n\r\n",
            &options,
            true,
        );
        assert_eq!(req.remote_connection_id, i64::MAX as u64);
    }

    #[test]
    fn oversized_payload_writes_413() {
        let (mut stream, mut client) = tcp_pair();
        client
            .write_all(b"POST /u HTTP/1.1\r\nContent-Length: 100\r\n\r\n")
            .expect("write");
        let options = ParserOptions {
            max_content_length: 10,
            ..ParserOptions::default()
        };
        let mut parser = RequestParser::new(&mut stream, &options, None, "127.0.0.1", false);
        let (outcome, _) = parser.read_request(true, None);
        assert_eq!(outcome, ReadOutcome::OversizedPayload);

        drop(stream);
        let mut response = String::new();
        client.read_to_string(&mut response).expect("read response");
        assert!(response.starts_with("HTTP/1.0 413 Payload Too Large"));
    }

    #[test]
    fn before_body_hook_rejects_without_body_read() {
        let (mut stream, mut client) = tcp_pair();
        client
            .write_all(b"POST /deny HTTP/1.1\r\nContent-Length: 3\r\n\r\nabc")
            .expect("write");
        let options = ParserOptions::default();
        let hook: BeforeBodyHook =
            Arc::new(|head| if head.url == "/deny" { 403 } else { 200 });
        let mut parser =
            RequestParser::new(&mut stream, &options, Some(&hook), "127.0.0.1", false);
        let (outcome, req) = parser.read_request(true, None);

        assert_eq!(outcome, ReadOutcome::Rejected);
        assert!(req.content.is_empty(), "body must not be read");

        drop(stream);
        let mut response = String::new();
        client.read_to_string(&mut response).expect("read response");
        assert!(response.starts_with("HTTP/1.0 403 Forbidden"));
        assert!(response.ends_with("Forbidden 403"));
    }

    #[test]
    fn before_body_hook_panic_is_internal_error() {
        let (mut stream, mut client) = tcp_pair();
        client.write_all(b"GET / HTTP/1.1\r\n\r\n").expect("write");
        let options = ParserOptions::default();
        let hook: BeforeBodyHook = Arc::new(|_| panic!("boom"));
        let mut parser =
            RequestParser::new(&mut stream, &options, Some(&hook), "127.0.0.1", false);
        let (outcome, _) = parser.read_request(true, None);
        assert_eq!(outcome, ReadOutcome::InternalError);
    }

    #[test]
    fn slow_headers_hit_the_deadline() {
        let (mut stream, mut client) = tcp_pair();
        client.write_all(b"GET / HTT").expect("write partial");
        let options = ParserOptions::default();
        let mut parser = RequestParser::new(&mut stream, &options, None, "127.0.0.1", false);
        let deadline = Instant::now() + Duration::from_millis(50);
        let (outcome, _) = parser.read_request(true, Some(deadline));
        assert_eq!(outcome, ReadOutcome::Timeout);
    }

    #[test]
    fn tcp_prefix_must_match() {
        let options = ParserOptions {
            tcp_prefix: "PROXY-OK".into(),
            ..ParserOptions::default()
        };
        let (outcome, _) = parse(b"PROXY-OK\r\nGET / HTTP/1.1\r\n\r\n", &options, true);
        assert_eq!(outcome, ReadOutcome::BodyReceived);

        let (outcome, _) = parse(b"NOPE\r\nGET / HTTP/1.1\r\n\r\n", &options, true);
        assert_eq!(outcome, ReadOutcome::ConnectionError);
    }

    #[test]
    fn malformed_request_line_is_an_error() {
        let options = ParserOptions::default();
        let (outcome, _) = parse(b"GARBAGE\r\n\r\n", &options, true);
        assert_eq!(outcome, ReadOutcome::ConnectionError);
    }

    #[test]
    fn header_without_colon_is_an_error() {
        let options = ParserOptions::default();
        let (outcome, _) = parse(b"GET / HTTP/1.1\r\nbroken header\r\n\r\n", &options, true);
        assert_eq!(outcome, ReadOutcome::ConnectionError);
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(32))]

        #[test]
        fn body_bytes_survive_content_length_framing(body in proptest::collection::vec(any::<u8>(), 0..2048)) {
            let raw = [
                format!("POST /u HTTP/1.1\r\nContent-Length: {}\r\n\r\n", body.len()).into_bytes(),
                body.clone(),
            ]
            .concat();
            let options = ParserOptions::default();
            let (outcome, req) = parse(&raw, &options, true);
            prop_assert_eq!(outcome, ReadOutcome::BodyReceived);
            prop_assert_eq!(req.content, body);
        }

        #[test]
        fn ordinary_header_values_reach_the_block(value in "[ -~]{0,64}") {
            let trimmed = value.trim().to_string();
            let raw = format!("GET / HTTP/1.1\r\nX-Probe: {value}\r\n\r\n").into_bytes();
            let options = ParserOptions::default();
            let (outcome, req) = parse(&raw, &options, true);
            prop_assert_eq!(outcome, ReadOutcome::BodyReceived);
            let stored = hearth_core::headers::header_value(&req.headers, "X-Probe")
                .unwrap_or("")
                .to_string();
            prop_assert_eq!(stored, trimmed);
        }
    }
}
