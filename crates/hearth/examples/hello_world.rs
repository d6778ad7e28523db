//! Minimal server: answers every request with a greeting.
//!
//! Run with `cargo run --example hello_world`, then
//! `curl http://127.0.0.1:8080/`.

use std::time::Duration;

use hearth::{logging, HttpServer, LogConfig, ServerConfig};

fn main() {
    logging::init(LogConfig::development());

    let server = HttpServer::builder(
        ServerConfig::new("127.0.0.1:8080").with_x_powered_by("hearth example"),
    )
    .on_request(|ctx| {
        let body = format!("hello from {}\n", ctx.url());
        ctx.set_out_content(body.into_bytes());
        ctx.set_out_content_type("text/plain; charset=utf-8");
        200
    })
    .build();

    server.start();
    server
        .wait_started(Duration::from_secs(5))
        .expect("server must start");
    println!(
        "listening on {}",
        server.local_addr().expect("tcp listener")
    );

    // Serve until interrupted.
    loop {
        std::thread::sleep(Duration::from_secs(60));
    }
}
