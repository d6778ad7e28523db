//! Lifecycle hook table and the per-request pipeline.
//!
//! Hooks are an explicit table of function slots on the server; an unset slot
//! is skipped. The pipeline invokes them per request with fixed short-circuit
//! semantics:
//!
//! 1. `before_request`: a positive non-202 status answers immediately
//!    (the after-response notification still fires); 202 falls through.
//! 2. `request`: the main handler; absent means 404.
//! 3. `after_request`: a positive status overrides the handler's.
//! 4. The response is written.
//! 5. `after_response`: best-effort notification, no return value.
//!
//! A panicking hook is answered with a 500 carrying the panic text and the
//! after-response notification is skipped.

use std::any::Any;
use std::io;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use hearth_core::RequestContext;

use crate::parser::ParsedRequest;
use crate::response::{write_response, ResponseEnv};
use crate::stream::{ClientStream, StreamBuf};

/// Borrowed view of a request head, handed to [`Hooks::before_body`] before
/// any body byte is read.
#[derive(Debug, Clone, Copy)]
pub struct RequestHead<'a> {
    /// Request URL.
    pub url: &'a str,
    /// Request method token.
    pub method: &'a str,
    /// Header block (filtered or unfiltered).
    pub headers: &'a str,
    /// Declared body content type.
    pub content_type: &'a str,
    /// Peer IP, after any configured header override.
    pub remote_ip: &'a str,
    /// Declared `Content-Length`; `-1` when absent.
    pub content_length: i64,
    /// Propagated front-proxy TLS bit.
    pub is_ssl: bool,
}

/// Early-rejection hook: anything other than 200 refuses the request before
/// its body is read.
pub type BeforeBodyHook = Arc<dyn Fn(&RequestHead<'_>) -> u16 + Send + Sync>;

/// Request-stage hook returning an HTTP status code (0 = no opinion).
pub type RequestHook = Arc<dyn Fn(&mut RequestContext) -> u16 + Send + Sync>;

/// Post-response notification carrying the final status code.
pub type AfterResponseHook = Arc<dyn Fn(&RequestContext, u16) + Send + Sync>;

/// Owner of an upgraded connection: receives the parsed head and the raw
/// stream; the server neither reads, writes nor closes it afterwards.
pub type UpgradeHook = Arc<dyn Fn(ParsedRequest, ClientStream) + Send + Sync>;

/// The hook table. Unset slots are skipped.
#[derive(Default, Clone)]
pub struct Hooks {
    /// Runs after headers, before the body is read.
    pub before_body: Option<BeforeBodyHook>,
    /// Runs before the main handler.
    pub before_request: Option<RequestHook>,
    /// The main handler; absent means every request is answered 404.
    pub request: Option<RequestHook>,
    /// Runs after the main handler; may override its status.
    pub after_request: Option<RequestHook>,
    /// Runs after the final byte is flushed.
    pub after_response: Option<AfterResponseHook>,
    /// Takes ownership of upgraded connections.
    pub upgrade: Option<UpgradeHook>,
}

impl std::fmt::Debug for Hooks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Hooks")
            .field("before_body", &self.before_body.is_some())
            .field("before_request", &self.before_request.is_some())
            .field("request", &self.request.is_some())
            .field("after_request", &self.after_request.is_some())
            .field("after_response", &self.after_response.is_some())
            .field("upgrade", &self.upgrade.is_some())
            .finish()
    }
}

/// Runs the hook pipeline for one prepared request and writes its response.
pub struct HookPipeline<'a> {
    hooks: &'a Hooks,
    env: &'a ResponseEnv<'a>,
}

impl<'a> HookPipeline<'a> {
    /// Creates a pipeline over a hook table and response environment.
    pub fn new(hooks: &'a Hooks, env: &'a ResponseEnv<'a>) -> Self {
        Self { hooks, env }
    }

    /// Runs the pipeline; returns the status code that went on the wire.
    pub fn run(
        &self,
        stream: &mut StreamBuf,
        ctx: &mut RequestContext,
        keep_alive: bool,
        accept_encoding: &str,
    ) -> io::Result<u16> {
        let before_code = match self.guarded(ctx, |hooks, ctx| {
            hooks.before_request.as_ref().map_or(0, |h| h(ctx))
        }) {
            Ok(code) => code,
            Err(text) => {
                return self.answer_panic(stream, ctx, keep_alive, accept_encoding, &text);
            }
        };

        if before_code > 0 && before_code != 202 {
            write_response(
                stream,
                self.env,
                ctx,
                before_code,
                None,
                keep_alive,
                accept_encoding,
            )?;
            if let Some(after) = &self.hooks.after_response {
                let _ = catch_unwind(AssertUnwindSafe(|| after(ctx, before_code)));
            }
            return Ok(before_code);
        }

        let mut code = match self.guarded(ctx, |hooks, ctx| {
            hooks.request.as_ref().map_or(404, |h| h(ctx))
        }) {
            Ok(code) => code,
            Err(text) => {
                return self.answer_panic(stream, ctx, keep_alive, accept_encoding, &text);
            }
        };

        match self.guarded(ctx, |hooks, ctx| {
            hooks.after_request.as_ref().map_or(0, |h| h(ctx))
        }) {
            Ok(after_code) if after_code > 0 => code = after_code,
            Ok(_) => {}
            Err(text) => {
                return self.answer_panic(stream, ctx, keep_alive, accept_encoding, &text);
            }
        }

        write_response(stream, self.env, ctx, code, None, keep_alive, accept_encoding)?;

        if let Some(after) = &self.hooks.after_response {
            let _ = catch_unwind(AssertUnwindSafe(|| after(ctx, code)));
        }
        Ok(code)
    }

    /// Runs one hook stage, translating a panic into its message.
    fn guarded<F>(&self, ctx: &mut RequestContext, stage: F) -> Result<u16, String>
    where
        F: FnOnce(&Hooks, &mut RequestContext) -> u16,
    {
        catch_unwind(AssertUnwindSafe(|| stage(self.hooks, ctx))).map_err(panic_message)
    }

    /// Answers a panicking stage with a 500; the after-response notification
    /// is skipped.
    fn answer_panic(
        &self,
        stream: &mut StreamBuf,
        ctx: &mut RequestContext,
        keep_alive: bool,
        accept_encoding: &str,
        text: &str,
    ) -> io::Result<u16> {
        write_response(stream, self.env, ctx, 500, Some(text), keep_alive, accept_encoding)?;
        Ok(500)
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "handler panicked".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compress::CompressionRegistry;
    use crate::stream::ClientStream;
    use hearth_core::RequestInput;
    use parking_lot::Mutex;
    use std::io::Read;
    use std::net::{TcpListener, TcpStream};
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

    fn ctx() -> RequestContext {
        RequestContext::prepare(
            RequestInput {
                url: "/".into(),
                method: "GET".into(),
                headers: "Accept: */*\r\n".into(),
                content: Vec::new(),
                content_type: String::new(),
                remote_ip: "127.0.0.1".into(),
                is_ssl: false,
            },
            1,
            None,
        )
    }

    fn run(hooks: &Hooks) -> (u16, String) {
        let registry = CompressionRegistry::new();
        let env = ResponseEnv {
            server_name: "hearth",
            x_powered_by: "",
            tcp_prefix: "",
            registry: &registry,
            send_file: None,
        };
        let (mut stream, mut client) = tcp_pair();
        let mut ctx = ctx();
        let code = HookPipeline::new(hooks, &env)
            .run(&mut stream, &mut ctx, false, "")
            .expect("pipeline");
        drop(stream);
        let mut raw = String::new();
        client.read_to_string(&mut raw).expect("read");
        (code, raw)
    }

    #[test]
    fn absent_handler_answers_404() {
        let hooks = Hooks::default();
        let (code, raw) = run(&hooks);
        assert_eq!(code, 404);
        assert!(raw.starts_with("HTTP/1.0 404 Not Found\r\n"));
    }

    #[test]
    fn handler_status_and_body_are_used() {
        let hooks = Hooks {
            request: Some(Arc::new(|ctx| {
                ctx.set_out_content(b"hi".to_vec());
                ctx.set_out_content_type("text/plain");
                200
            })),
            ..Hooks::default()
        };
        let (code, raw) = run(&hooks);
        assert_eq!(code, 200);
        assert!(raw.starts_with("HTTP/1.0 200 OK\r\n"));
        assert!(raw.ends_with("hi"));
    }

    #[test]
    fn before_request_short_circuits_but_notifies() {
        let order: Arc<Mutex<Vec<&'static str>>> = Arc::new(Mutex::new(Vec::new()));
        let hooks = Hooks {
            before_request: Some(Arc::new({
                let order = Arc::clone(&order);
                move |_| {
                    order.lock().push("before");
                    401
                }
            })),
            request: Some(Arc::new({
                let order = Arc::clone(&order);
                move |_| {
                    order.lock().push("request");
                    200
                }
            })),
            after_response: Some(Arc::new({
                let order = Arc::clone(&order);
                move |_, code| {
                    order.lock().push("after_response");
                    assert_eq!(code, 401);
                }
            })),
            ..Hooks::default()
        };
        let (code, raw) = run(&hooks);
        assert_eq!(code, 401);
        assert!(raw.starts_with("HTTP/1.0 401 Unauthorized\r\n"));
        // The main handler is skipped; the notification still fires.
        assert_eq!(*order.lock(), vec!["before", "after_response"]);
    }

    #[test]
    fn before_request_202_falls_through_to_handler() {
        let hooks = Hooks {
            before_request: Some(Arc::new(|_| 202)),
            request: Some(Arc::new(|ctx| {
                ctx.set_out_content(b"handled".to_vec());
                200
            })),
            ..Hooks::default()
        };
        let (code, raw) = run(&hooks);
        assert_eq!(code, 200);
        assert!(raw.ends_with("handled"));
    }

    #[test]
    fn after_request_overrides_status() {
        let hooks = Hooks {
            request: Some(Arc::new(|_| 200)),
            after_request: Some(Arc::new(|_| 503)),
            ..Hooks::default()
        };
        let (code, raw) = run(&hooks);
        assert_eq!(code, 503);
        assert!(raw.starts_with("HTTP/1.0 503 Service Unavailable\r\n"));
    }

    #[test]
    fn after_request_zero_keeps_handler_status() {
        let hooks = Hooks {
            request: Some(Arc::new(|_| 201)),
            after_request: Some(Arc::new(|_| 0)),
            ..Hooks::default()
        };
        let (code, _) = run(&hooks);
        assert_eq!(code, 201);
    }

    #[test]
    fn panicking_handler_answers_500_and_skips_notification() {
        let notified = Arc::new(Mutex::new(false));
        let hooks = Hooks {
            request: Some(Arc::new(|_| panic!("database exploded"))),
            after_response: Some(Arc::new({
                let notified = Arc::clone(&notified);
                move |_, _| *notified.lock() = true
            })),
            ..Hooks::default()
        };
        let (code, raw) = run(&hooks);
        assert_eq!(code, 500);
        assert!(raw.starts_with("HTTP/1.0 500 Internal Server Error\r\n"));
        assert!(raw.contains("database exploded"));
        assert!(!*notified.lock(), "after_response must be skipped on panic");
    }

    #[test]
    fn after_response_runs_after_success() {
        let seen = Arc::new(Mutex::new(0u16));
        let hooks = Hooks {
            request: Some(Arc::new(|_| 200)),
            after_response: Some(Arc::new({
                let seen = Arc::clone(&seen);
                move |_, code| *seen.lock() = code
            })),
            ..Hooks::default()
        };
        let (code, _) = run(&hooks);
        assert_eq!(code, 200);
        assert_eq!(*seen.lock(), 200);
    }
}
