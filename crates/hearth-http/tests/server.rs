//! End-to-end server tests over real sockets.

use std::io::{Read, Write};
use std::net::{Shutdown, SocketAddr, TcpStream};
use std::sync::Arc;
use std::time::{Duration, Instant};

use hearth_http::{HttpServer, ReadOutcome, ServerBuilder, ServerConfig};
use parking_lot::Mutex;
use serial_test::serial;

fn start(builder: ServerBuilder) -> (HttpServer, SocketAddr) {
    let server = builder.build();
    server.start();
    server
        .wait_started(Duration::from_secs(5))
        .expect("server must start");
    let addr = server.local_addr().expect("tcp address");
    (server, addr)
}

fn echo_builder(config: ServerConfig) -> ServerBuilder {
    HttpServer::builder(config).on_request(|ctx| {
        let body = format!("url={}", ctx.url());
        ctx.set_out_content(body.into_bytes());
        ctx.set_out_content_type("text/plain");
        200
    })
}

/// Writes a request, half-closes, and drains the full response.
fn send_request(addr: SocketAddr, raw: &[u8]) -> Vec<u8> {
    let mut stream = TcpStream::connect(addr).expect("connect");
    stream
        .set_read_timeout(Some(Duration::from_secs(5)))
        .expect("set read timeout");
    stream.write_all(raw).expect("write request");
    stream.shutdown(Shutdown::Write).expect("half close");
    let mut response = Vec::new();
    stream.read_to_end(&mut response).expect("read response");
    response
}

/// Reads exactly one response (head + declared body) from a kept-open socket.
fn read_response(stream: &mut TcpStream) -> (String, Vec<u8>) {
    let mut buf = Vec::new();
    let mut tmp = [0u8; 1024];
    let header_end = loop {
        if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos;
        }
        let n = stream.read(&mut tmp).expect("read head");
        assert!(n > 0, "connection closed before end of headers");
        buf.extend_from_slice(&tmp[..n]);
    };

    let head = String::from_utf8_lossy(&buf[..header_end]).into_owned();
    let content_length: usize = head
        .lines()
        .find_map(|line| {
            let (name, value) = line.split_once(':')?;
            if name.trim().eq_ignore_ascii_case("content-length") {
                value.trim().parse().ok()
            } else {
                None
            }
        })
        .expect("response must declare Content-Length");

    let mut body = buf[header_end + 4..].to_vec();
    while body.len() < content_length {
        let n = stream.read(&mut tmp).expect("read body");
        assert!(n > 0, "connection closed before end of body");
        body.extend_from_slice(&tmp[..n]);
    }
    body.truncate(content_length);
    (head, body)
}

#[test]
fn default_handler_answers_http10_404() {
    let (server, addr) = start(HttpServer::builder(ServerConfig::new("127.0.0.1:0")));

    let response = send_request(addr, b"GET / HTTP/1.0\r\nHost: x\r\n\r\n");
    let text = String::from_utf8_lossy(&response);
    assert!(
        text.starts_with("HTTP/1.0 404 Not Found\r\n"),
        "got:\n{text}"
    );

    server.shutdown();
}

#[test]
fn post_round_trips_body_and_keeps_alive() {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let builder = HttpServer::builder(ServerConfig::new("127.0.0.1:0")).on_request({
        let seen = Arc::clone(&seen);
        move |ctx| {
            seen.lock().push(ctx.in_content().to_vec());
            ctx.set_out_content(b"ok".to_vec());
            ctx.set_out_content_type("text/plain");
            200
        }
    });
    let (server, addr) = start(builder);

    let response = send_request(
        addr,
        b"POST /u HTTP/1.1\r\nHost: x\r\nContent-Length: 3\r\n\r\nabc",
    );
    let text = String::from_utf8_lossy(&response);
    assert!(text.starts_with("HTTP/1.1 200 OK\r\n"), "got:\n{text}");
    assert!(text.contains("Content-Length: 2\r\n"));
    assert!(text.contains("Connection: Keep-Alive\r\n"));
    assert!(text.ends_with("ok"));
    // The handler saw exactly the declared payload.
    assert_eq!(seen.lock().as_slice(), &[b"abc".to_vec()]);

    server.shutdown();
}

#[test]
fn keep_alive_serves_sequential_requests_on_one_socket() {
    let (server, addr) = start(echo_builder(ServerConfig::new("127.0.0.1:0")));

    let mut stream = TcpStream::connect(addr).expect("connect");
    stream
        .set_read_timeout(Some(Duration::from_secs(5)))
        .expect("set read timeout");

    stream
        .write_all(b"GET /first HTTP/1.1\r\nHost: x\r\n\r\n")
        .expect("write first");
    let (head1, body1) = read_response(&mut stream);
    assert!(head1.starts_with("HTTP/1.1 200 OK"));
    assert_eq!(body1, b"url=/first");

    stream
        .write_all(b"GET /second HTTP/1.1\r\nHost: x\r\n\r\n")
        .expect("write second");
    let (head2, body2) = read_response(&mut stream);
    assert!(head2.starts_with("HTTP/1.1 200 OK"));
    assert_eq!(body2, b"url=/second");

    server.shutdown();
}

#[test]
fn oversized_declared_body_is_rejected_with_413() {
    let builder =
        HttpServer::builder(ServerConfig::new("127.0.0.1:0").with_max_content_length(10));
    let (server, addr) = start(builder);

    let response = send_request(
        addr,
        b"POST /u HTTP/1.1\r\nHost: x\r\nContent-Length: 100\r\n\r\n",
    );
    let text = String::from_utf8_lossy(&response);
    assert!(
        text.starts_with("HTTP/1.0 413 Payload Too Large"),
        "got:\n{text}"
    );
    assert_eq!(server.stats().outcome(ReadOutcome::OversizedPayload), 1);

    server.shutdown();
}

#[test]
fn connection_and_request_ids_are_positive_and_monotonic() {
    let ids = Arc::new(Mutex::new(Vec::new()));
    let builder = HttpServer::builder(ServerConfig::new("127.0.0.1:0")).on_request({
        let ids = Arc::clone(&ids);
        move |ctx| {
            ids.lock().push((ctx.connection_id(), ctx.request_id()));
            200
        }
    });
    let (server, addr) = start(builder);

    for _ in 0..3 {
        send_request(addr, b"GET / HTTP/1.0\r\nHost: x\r\n\r\n");
    }

    let ids = ids.lock();
    assert_eq!(ids.len(), 3);
    for (connection_id, request_id) in ids.iter() {
        assert!(*connection_id > 0);
        assert!(*request_id > 0);
    }
    for pair in ids.windows(2) {
        assert!(pair[1].1 > pair[0].1, "request ids must increase: {ids:?}");
    }

    server.shutdown();
}

#[test]
fn inherited_connection_id_replaces_assigned_one() {
    let ids = Arc::new(Mutex::new(Vec::new()));
    let builder = HttpServer::builder(
        ServerConfig::new("127.0.0.1:0").with_remote_conn_id_header("X-Conn-ID"),
    )
    .on_request({
        let ids = Arc::clone(&ids);
        move |ctx| {
            ids.lock().push(ctx.connection_id());
            200
        }
    });
    let (server, addr) = start(builder);

    let mut stream = TcpStream::connect(addr).expect("connect");
    stream
        .set_read_timeout(Some(Duration::from_secs(5)))
        .expect("set read timeout");

    stream
        .write_all(b"GET / HTTP/1.1\r\nHost: x\r\nX-Conn-ID: 424242\r\n\r\n")
        .expect("write first");
    let _ = read_response(&mut stream);

    // The second request omits the header; the inherited id must hold for
    // the rest of the connection.
    stream
        .write_all(b"GET / HTTP/1.1\r\nHost: x\r\n\r\n")
        .expect("write second");
    let _ = read_response(&mut stream);

    assert_eq!(ids.lock().as_slice(), &[424242, 424242]);

    server.shutdown();
}

#[test]
fn out_of_range_inherited_connection_id_is_ignored() {
    let ids = Arc::new(Mutex::new(Vec::new()));
    let builder = HttpServer::builder(
        ServerConfig::new("127.0.0.1:0").with_remote_conn_id_header("X-Conn-ID"),
    )
    .on_request({
        let ids = Arc::clone(&ids);
        move |ctx| {
            ids.lock().push(ctx.connection_id());
            200
        }
    });
    let (server, addr) = start(builder);

    // u64::MAX would wrap negative; the server-assigned id must survive.
    send_request(
        addr,
        b"GET / HTTP/1.0\r\nHost: x\r\nX-Conn-ID: 18446744073709551615\r\n\r\n",
    );

    let ids = ids.lock();
    assert_eq!(ids.len(), 1);
    assert!(ids[0] > 0, "connection ids must stay strictly positive");

    server.shutdown();
}

#[test]
fn connection_counters_track_accepts() {
    let (server, addr) = start(echo_builder(ServerConfig::new("127.0.0.1:0")));

    send_request(addr, b"GET / HTTP/1.0\r\nHost: x\r\n\r\n");
    send_request(addr, b"GET / HTTP/1.0\r\nHost: x\r\n\r\n");

    // Disconnect accounting is asynchronous; give workers a moment.
    let deadline = Instant::now() + Duration::from_secs(2);
    while server.stats().active_connections() > 0 && Instant::now() < deadline {
        std::thread::sleep(Duration::from_millis(10));
    }
    assert_eq!(server.stats().total_connections(), 2);
    assert_eq!(server.stats().active_connections(), 0);

    let (bytes_in, bytes_out) = server.bytes_totals();
    assert!(bytes_in > 0);
    assert!(bytes_out > 0);

    server.shutdown();
}

#[test]
fn promotion_keeps_the_pool_free_for_new_connections() {
    // One pool worker only: a keep-alive connection must be promoted to a
    // dedicated thread, or the second client would starve.
    let builder = echo_builder(ServerConfig::new("127.0.0.1:0").with_pool_size(1));
    let (server, addr) = start(builder);

    let mut first = TcpStream::connect(addr).expect("connect first");
    first
        .set_read_timeout(Some(Duration::from_secs(5)))
        .expect("set read timeout");
    first
        .write_all(b"GET /a HTTP/1.1\r\nHost: x\r\n\r\n")
        .expect("write first");
    let (head, _) = read_response(&mut first);
    assert!(head.starts_with("HTTP/1.1 200 OK"));

    // The first socket stays open; the lone pool worker must be free again.
    let mut second = TcpStream::connect(addr).expect("connect second");
    second
        .set_read_timeout(Some(Duration::from_secs(5)))
        .expect("set read timeout");
    second
        .write_all(b"GET /b HTTP/1.1\r\nHost: x\r\n\r\n")
        .expect("write second");
    let (head, body) = read_response(&mut second);
    assert!(head.starts_with("HTTP/1.1 200 OK"));
    assert_eq!(body, b"url=/b");

    // And the promoted connection still serves requests.
    first
        .write_all(b"GET /again HTTP/1.1\r\nHost: x\r\n\r\n")
        .expect("write again");
    let (_, body) = read_response(&mut first);
    assert_eq!(body, b"url=/again");

    server.shutdown();
}

#[test]
#[serial]
fn saturated_pool_drops_the_overflow_connection() {
    // Two pool workers, queue of one: with three idle clients holding all
    // capacity, a fourth connection is dropped after the contention delay.
    let builder = echo_builder(
        ServerConfig::new("127.0.0.1:0")
            .with_pool_size(2)
            .with_queue_length(1)
            .with_contention_abort_delay(Duration::from_millis(200))
            .with_receive_timeout(Duration::from_secs(10)),
    );
    let (server, addr) = start(builder);

    let holders: Vec<TcpStream> = (0..3)
        .map(|_| TcpStream::connect(addr).expect("holder connect"))
        .collect();
    // Let the pool pick the first two up and park the third in the queue.
    std::thread::sleep(Duration::from_millis(100));

    let mut overflow = TcpStream::connect(addr).expect("overflow connect");
    overflow
        .set_read_timeout(Some(Duration::from_secs(5)))
        .expect("set read timeout");
    let mut response = Vec::new();
    overflow
        .read_to_end(&mut response)
        .expect("overflow read");
    assert!(
        response.is_empty(),
        "dropped connection must not receive a response"
    );

    drop(holders);
    server.shutdown();
}

#[test]
#[serial]
fn slow_header_writer_is_timed_out() {
    let builder = echo_builder(
        ServerConfig::new("127.0.0.1:0")
            .with_header_retrieve_abort_delay(Duration::from_millis(150)),
    );
    let (server, addr) = start(builder);

    let mut stream = TcpStream::connect(addr).expect("connect");
    stream
        .set_read_timeout(Some(Duration::from_secs(5)))
        .expect("set read timeout");
    stream
        .write_all(b"GET / HTTP/1.1\r\nHost: partial")
        .expect("write partial");

    let mut response = Vec::new();
    stream.read_to_end(&mut response).expect("read");
    assert!(response.is_empty(), "timeouts close without a response");

    let deadline = Instant::now() + Duration::from_secs(2);
    while server.stats().outcome(ReadOutcome::Timeout) == 0 && Instant::now() < deadline {
        std::thread::sleep(Duration::from_millis(10));
    }
    assert!(server.stats().outcome(ReadOutcome::Timeout) >= 1);

    server.shutdown();
}

#[test]
#[serial]
fn idle_keep_alive_connection_is_closed_after_timeout() {
    let builder = echo_builder(
        ServerConfig::new("127.0.0.1:0").with_keep_alive_timeout(Duration::from_millis(250)),
    );
    let (server, addr) = start(builder);

    let mut stream = TcpStream::connect(addr).expect("connect");
    stream
        .set_read_timeout(Some(Duration::from_secs(5)))
        .expect("set read timeout");
    stream
        .write_all(b"GET / HTTP/1.1\r\nHost: x\r\n\r\n")
        .expect("write");
    let (head, _) = read_response(&mut stream);
    assert!(head.contains("Connection: Keep-Alive"));

    // Stay idle past the keep-alive window; the server closes first.
    let started = Instant::now();
    let mut probe = [0u8; 16];
    let n = stream.read(&mut probe).expect("read after idle");
    assert_eq!(n, 0, "server must close the idle connection");
    assert!(started.elapsed() >= Duration::from_millis(150));

    server.shutdown();
}

#[test]
fn shutdown_closes_live_connections_promptly() {
    let (server, addr) = start(echo_builder(ServerConfig::new("127.0.0.1:0")));

    let mut stream = TcpStream::connect(addr).expect("connect");
    stream
        .set_read_timeout(Some(Duration::from_secs(5)))
        .expect("set read timeout");
    stream
        .write_all(b"GET / HTTP/1.1\r\nHost: x\r\n\r\n")
        .expect("write");
    let _ = read_response(&mut stream);

    let started = Instant::now();
    server.shutdown();
    assert!(
        started.elapsed() < Duration::from_secs(5),
        "drain must not run into the full timeout for an idle connection"
    );

    let mut probe = [0u8; 16];
    match stream.read(&mut probe) {
        Ok(0) | Err(_) => {}
        Ok(n) => panic!("unexpected {n} bytes after shutdown"),
    }
}

#[cfg(unix)]
#[test]
fn serves_over_unix_domain_sockets() {
    use std::os::unix::net::UnixStream;

    let path = std::env::temp_dir().join(format!("hearth-test-{}.sock", std::process::id()));
    let builder = echo_builder(ServerConfig::new(format!("unix:{}", path.display())));
    let server = builder.build();
    server.start();
    server
        .wait_started(Duration::from_secs(5))
        .expect("server must start");

    let mut stream = UnixStream::connect(&path).expect("unix connect");
    stream
        .set_read_timeout(Some(Duration::from_secs(5)))
        .expect("set read timeout");
    // Unix peers carry no remote IP; an ordinary header keeps the block
    // non-empty so the request is not mistaken for a broken one.
    stream
        .write_all(b"GET /unix HTTP/1.0\r\nHost: x\r\nX-Probe: 1\r\n\r\n")
        .expect("write");
    stream
        .shutdown(Shutdown::Write)
        .expect("half close");
    let mut response = Vec::new();
    stream.read_to_end(&mut response).expect("read");
    let text = String::from_utf8_lossy(&response);
    assert!(text.starts_with("HTTP/1.0 200 OK"), "got:\n{text}");
    assert!(text.ends_with("url=/unix"));

    server.shutdown();
    assert!(!path.exists(), "socket file must be removed on shutdown");
}
