//! The controller: accept loop, request dispatch, and the control task
//! that owns the store and the apply serializer.
//!
//! Connection tasks only read and write sockets; every decision that
//! touches shared state happens on the single control task, so applies
//! are serialized in the order requests arrive and the store has exactly
//! one writer.

use crate::{
    conf::{ops, path, store::ConfStore, validate},
    errors::ErrorKind,
    http::{response::Response, types::Method},
    limits::ControllerLimits,
    server::{
        apply::{ApplyQueue, PendingApply},
        connection::{self, DispatchRequest},
        router::{RouterLink, RouterPort},
    },
};
use serde_json::{json, Value};
use socket2::{Domain, Protocol, Socket, Type};
use std::{io, net::SocketAddr};
use tokio::{
    net::TcpListener,
    sync::{mpsc, oneshot},
};
use tracing::{debug, error};

/// Opens the control listener: plain TCP, non-blocking, with the given
/// backlog. Must be called from within a tokio runtime.
///
/// # Examples
///
/// ```no_run
/// use confctl::{listen, limits::DEFAULT_CONTROL_ADDR};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let listener = listen(DEFAULT_CONTROL_ADDR.parse().unwrap(), 1024).unwrap();
/// # drop(listener);
/// # }
/// ```
pub fn listen(addr: SocketAddr, backlog: i32) -> io::Result<TcpListener> {
    let socket = Socket::new(Domain::for_address(addr), Type::STREAM, Some(Protocol::TCP))?;

    socket.set_reuse_address(true)?;
    socket.set_nonblocking(true)?;
    socket.bind(&addr.into())?;
    socket.listen(backlog)?;

    TcpListener::from_std(socket.into())
}

/// The configuration controller.
///
/// Accepts one HTTP/1.x request per connection on the control listener,
/// reads and edits the JSON configuration tree, and pushes accepted
/// trees to the router process through a [`RouterLink`]. See the crate
/// docs for the full surface.
///
/// # Examples
///
/// ```no_run
/// use confctl::{listen, pair, Controller};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let listener = listen("127.0.0.1:8443".parse().unwrap(), 1024).unwrap();
/// let (link, _router) = pair();
///
/// Controller::builder()
///     .listener(listener)
///     .router(link)
///     .build()
///     .launch()
///     .await;
/// # }
/// ```
pub struct Controller {
    listener: TcpListener,
    router: RouterLink,
    limits: ControllerLimits,
}

impl Controller {
    /// Creates a new builder for configuring the controller instance.
    #[inline]
    pub fn builder() -> ControllerBuilder {
        ControllerBuilder {
            listener: None,
            router: None,
            limits: None,
        }
    }

    /// Runs the controller until the router side of the transport goes
    /// away.
    pub async fn launch(self) {
        let Controller {
            listener,
            router,
            limits,
        } = self;
        let RouterLink {
            mut port,
            mut replies,
        } = router;

        let (dispatch_tx, mut dispatch_rx) = mpsc::unbounded_channel();
        let mut ctx = ControlContext::startup();

        loop {
            tokio::select! {
                biased;

                reply = replies.recv() => {
                    let Some(payload) = reply else {
                        error!("router reply stream closed");
                        return;
                    };
                    ctx.on_router_reply(port.as_mut(), &payload);
                }

                request = dispatch_rx.recv() => {
                    if let Some(request) = request {
                        ctx.dispatch(port.as_mut(), request);
                    }
                }

                accepted = listener.accept() => {
                    let Ok((stream, _)) = accepted else {
                        continue;
                    };
                    tokio::spawn(connection::serve(stream, dispatch_tx.clone(), limits.clone()));
                }
            }
        }
    }
}

//

/// Builder for configuring and creating [`Controller`] instances.
pub struct ControllerBuilder {
    listener: Option<TcpListener>,
    router: Option<RouterLink>,
    limits: Option<ControllerLimits>,
}

impl ControllerBuilder {
    /// Sets the TCP listener the controller accepts commands on.
    ///
    /// **This is a required component.** The supervisor owns the bind
    /// address; [`listen`] builds a suitable listener.
    #[inline(always)]
    pub fn listener(mut self, listener: TcpListener) -> Self {
        self.listener = Some(listener);
        self
    }

    /// Sets the transport to the router process.
    ///
    /// **This is a required component.** See [`pair`](crate::pair) for
    /// the in-process transport.
    #[inline(always)]
    pub fn router(mut self, router: RouterLink) -> Self {
        self.router = Some(router);
        self
    }

    /// Overrides the default [`ControllerLimits`].
    #[inline(always)]
    pub fn limits(mut self, limits: ControllerLimits) -> Self {
        self.limits = Some(limits);
        self
    }

    /// Finalizes the builder and constructs a [`Controller`] instance.
    ///
    /// # Panics
    ///
    /// Panics when:
    /// - The `listener` method was not called.
    /// - The `router` method was not called.
    #[inline]
    #[track_caller]
    pub fn build(self) -> Controller {
        Controller {
            listener: self
                .listener
                .expect("The `listener` method must be called to create"),
            router: self
                .router
                .expect("The `router` method must be called to create"),
            limits: self.limits.unwrap_or_default(),
        }
    }
}

//

/// Everything a dispatched request may touch. Lives on the control task
/// only.
struct ControlContext {
    store: ConfStore,
    applies: ApplyQueue,
}

impl ControlContext {
    #[inline]
    fn startup() -> Self {
        Self {
            store: ConfStore::startup(),
            applies: ApplyQueue::new(),
        }
    }

    #[inline]
    fn on_router_reply(&mut self, port: &mut dyn RouterPort, payload: &[u8]) {
        debug!("router reply: {} bytes", payload.len());
        self.applies.on_reply(&mut self.store, port, payload);
    }

    /// Runs one fully buffered request. `GET` and every failure answer
    /// immediately; a validated `PUT`/`DELETE` candidate goes to the
    /// apply serializer and answers on the router's verdict.
    fn dispatch(&mut self, port: &mut dyn RouterPort, request: DispatchRequest) {
        let DispatchRequest {
            method,
            target,
            body,
            reply,
        } = request;
        let path = path::normalize(&target);

        debug!("controller request: {:?} {}", method, path);

        let built = match method {
            Method::Get => {
                let response = match path::resolve(self.store.current(), path) {
                    Some(value) => Some(Response::tree(value.clone())),
                    None => Response::from_error(&ErrorKind::PathNotFound),
                };
                if let Some(response) = response {
                    let _ = reply.send(response);
                }
                return;
            }
            Method::Put => self.build_put(path, &body),
            Method::Delete => self.build_delete(path),
            Method::Other => Err(ErrorKind::MethodNotAllowed),
        };

        match built {
            Ok(candidate) => {
                let request = PendingApply { candidate, reply };
                if let Err(failed) = self.applies.submit(port, request) {
                    respond_error(failed.reply, &ErrorKind::ResourceExhausted);
                }
            }
            Err(err) => respond_error(reply, &err),
        }
    }

    fn build_put(&self, path: &str, body: &[u8]) -> Result<Value, ErrorKind> {
        let value: Value = serde_json::from_slice(body).map_err(|_| ErrorKind::InvalidJson)?;

        let candidate = if path::is_root(path) {
            value
        } else {
            let program = ops::compile(self.store.current(), path, Some(value))
                .map_err(|_| ErrorKind::PathNotFound)?;
            ops::clone_with(self.store.current(), program)
        };

        self.validated(candidate)
    }

    fn build_delete(&self, path: &str) -> Result<Value, ErrorKind> {
        let candidate = if path::is_root(path) {
            json!({})
        } else {
            let program = ops::compile(self.store.current(), path, None)
                .map_err(|_| ErrorKind::PathNotFound)?;
            ops::clone_with(self.store.current(), program)
        };

        self.validated(candidate)
    }

    #[inline]
    fn validated(&self, candidate: Value) -> Result<Value, ErrorKind> {
        if validate::validate(&candidate) {
            Ok(candidate)
        } else {
            Err(ErrorKind::InvalidConfig)
        }
    }
}

#[inline]
fn respond_error(reply: oneshot::Sender<Response>, kind: &ErrorKind) {
    if let Some(response) = Response::from_error(kind) {
        let _ = reply.send(response);
    }
}

#[cfg(test)]
mod dispatch {
    use super::*;
    use crate::testing::FakePort;

    struct Rig {
        ctx: ControlContext,
        port: FakePort,
    }

    impl Rig {
        fn new() -> Self {
            Self {
                ctx: ControlContext::startup(),
                port: FakePort::new(),
            }
        }

        fn send(&mut self, method: Method, target: &str, body: &[u8]) -> oneshot::Receiver<Response> {
            let (reply, rx) = oneshot::channel();
            self.ctx.dispatch(
                &mut self.port,
                DispatchRequest {
                    method,
                    target: target.to_owned(),
                    body: body.to_vec(),
                    reply,
                },
            );
            rx
        }

        fn reply(&mut self, payload: &[u8]) {
            self.ctx.on_router_reply(&mut self.port, payload);
        }
    }

    fn body(mut rx: oneshot::Receiver<Response>) -> String {
        String::from_utf8(rx.try_recv().unwrap().encode()).unwrap()
    }

    const FULL_CONF: &[u8] =
        br#"{"listeners":{"*:80":{"application":"app"}},"applications":{"app":{"type":"external"}}}"#;

    #[test]
    fn initial_get_root() {
        let mut rig = Rig::new();

        let response = body(rig.send(Method::Get, "/", b""));

        assert_eq!(
            response,
            "HTTP/1.0 200 OK\r\n\r\n{\n  \"listeners\": {},\n  \"applications\": {}\n}\r\n"
        );
    }

    #[test]
    fn repeated_get_is_identical() {
        let mut rig = Rig::new();

        let first = body(rig.send(Method::Get, "/", b""));
        let second = body(rig.send(Method::Get, "/", b""));

        assert_eq!(first, second);
    }

    #[test]
    fn trailing_slash_is_insignificant() {
        let mut rig = Rig::new();

        let plain = body(rig.send(Method::Get, "/listeners", b""));
        let slashed = body(rig.send(Method::Get, "/listeners/", b""));

        assert_eq!(plain, slashed);
    }

    #[test]
    fn get_miss() {
        let mut rig = Rig::new();

        let response = body(rig.send(Method::Get, "/nope", b""));

        assert!(response.starts_with("HTTP/1.0 404 Not Found"));
        assert!(response.contains("Value doesn't exist."));
        assert!(rig.port.sent.is_empty());
    }

    #[test]
    fn put_root_replaces_on_ok() {
        let mut rig = Rig::new();

        let rx = rig.send(Method::Put, "/", FULL_CONF);
        assert_eq!(rig.port.sent.len(), 1);

        rig.reply(b"OK");
        assert!(body(rx).contains("Reconfiguration done."));

        let response = body(rig.send(Method::Get, "/listeners/*:80/application", b""));
        assert_eq!(response, "HTTP/1.0 200 OK\r\n\r\n\"app\"\r\n");
    }

    #[test]
    fn get_during_apply_sees_old_tree() {
        let mut rig = Rig::new();

        let _pending = rig.send(Method::Put, "/", FULL_CONF);

        let response = body(rig.send(Method::Get, "/", b""));
        assert!(response.contains("\"listeners\": {}"));
    }

    #[test]
    fn put_invalid_json() {
        let mut rig = Rig::new();

        let response = body(rig.send(Method::Put, "/", b"{ not json"));

        assert!(response.starts_with("HTTP/1.0 400 Bad Request"));
        assert!(response.contains("Invalid JSON."));
        assert!(rig.port.sent.is_empty());
    }

    #[test]
    fn put_missing_path() {
        let mut rig = Rig::new();

        let response = body(rig.send(Method::Put, "/applications/app/type", b"\"external\""));

        assert!(response.starts_with("HTTP/1.0 404 Not Found"));
        assert!(rig.port.sent.is_empty());
    }

    #[test]
    fn put_invalid_config() {
        let mut rig = Rig::new();

        for raw in [
            br#"["not", "an", "object"]"# as &[u8],
            br#"{"listeners":{"*:80":{"application":"ghost"}}}"#,
        ] {
            let response = body(rig.send(Method::Put, "/", raw));

            assert!(response.starts_with("HTTP/1.0 400 Bad Request"), "{:?}", raw);
            assert!(response.contains("Invalid configuration."), "{:?}", raw);
        }

        assert!(rig.port.sent.is_empty());
    }

    #[test]
    fn put_subtree_breaking_config() {
        let mut rig = Rig::new();
        rig.send(Method::Put, "/", FULL_CONF);
        rig.reply(b"OK");

        // pointing the listener at a missing application fails validation
        let response = body(rig.send(
            Method::Put,
            "/listeners/*:80",
            br#"{"application":"ghost"}"#,
        ));

        assert!(response.contains("Invalid configuration."));
    }

    #[test]
    fn rejected_apply_rolls_back() {
        let mut rig = Rig::new();
        rig.send(Method::Put, "/", FULL_CONF);
        rig.reply(b"OK");

        let before = body(rig.send(Method::Get, "/", b""));

        let rx = rig.send(Method::Put, "/applications/app", br#"{"type":"external"}"#);
        rig.reply(b"NOT TODAY");

        let response = body(rx);
        assert!(response.starts_with("HTTP/1.0 500 Internal Server Error"));
        assert!(response.contains("Failed to apply new configuration."));

        let after = body(rig.send(Method::Get, "/", b""));
        assert_eq!(before, after);

        let response = body(rig.send(Method::Get, "/applications/app/type", b""));
        assert_eq!(response, "HTTP/1.0 200 OK\r\n\r\n\"external\"\r\n");
    }

    #[test]
    fn delete_root_resets() {
        let mut rig = Rig::new();
        rig.send(Method::Put, "/", FULL_CONF);
        rig.reply(b"OK");

        let rx = rig.send(Method::Delete, "/", b"");
        rig.reply(b"OK");
        assert!(body(rx).contains("Reconfiguration done."));

        let response = body(rig.send(Method::Get, "/", b""));
        assert_eq!(response, "HTTP/1.0 200 OK\r\n\r\n{}\r\n");
    }

    #[test]
    fn delete_missing_path() {
        let mut rig = Rig::new();

        let response = body(rig.send(Method::Delete, "/applications/does-not-exist", b""));

        assert!(response.starts_with("HTTP/1.0 404 Not Found"));
        assert!(response.contains("Value doesn't exist."));
        assert!(rig.port.sent.is_empty());
    }

    #[test]
    fn delete_subtree() {
        let mut rig = Rig::new();
        rig.send(Method::Put, "/", FULL_CONF);
        rig.reply(b"OK");

        // the listener must go before its application can
        let rx = rig.send(Method::Delete, "/applications/app", b"");
        assert!(body(rx).contains("Invalid configuration."));

        let rx = rig.send(Method::Delete, "/listeners/*:80", b"");
        rig.reply(b"OK");
        assert!(body(rx).contains("Reconfiguration done."));

        let rx = rig.send(Method::Delete, "/applications/app", b"");
        rig.reply(b"OK");
        assert!(body(rx).contains("Reconfiguration done."));

        let response = body(rig.send(Method::Get, "/", b""));
        assert!(response.contains("\"applications\": {}"));
    }

    #[test]
    fn method_not_allowed() {
        let mut rig = Rig::new();

        let response = body(rig.send(Method::Other, "/", b""));

        assert!(response.starts_with("HTTP/1.0 405 Method Not Allowed"));
        assert!(response.contains("Invalid method."));
        assert!(rig.port.sent.is_empty());
    }

    #[test]
    fn applies_are_serialized_fifo() {
        let mut rig = Rig::new();

        let first = rig.send(Method::Put, "/", br#"{"applications":{"a":{}}}"#);
        let second = rig.send(Method::Put, "/", br#"{"applications":{"b":{}}}"#);

        assert_eq!(rig.port.sent.len(), 1);
        assert!(rig.port.sent[0].windows(3).any(|w| w == b"\"a\""));

        rig.reply(b"OK");
        assert!(body(first).contains("Reconfiguration done."));
        assert_eq!(rig.port.sent.len(), 2);
        assert!(rig.port.sent[1].windows(3).any(|w| w == b"\"b\""));

        rig.reply(b"OK");
        assert!(body(second).contains("Reconfiguration done."));

        let response = body(rig.send(Method::Get, "/applications", b""));
        assert!(response.contains("\"b\""));
    }

    #[test]
    fn transport_failure_is_resource_exhaustion() {
        let mut rig = Rig::new();
        rig.port = FakePort::accepting(0);

        let response = body(rig.send(Method::Put, "/", b"{}"));

        assert!(response.starts_with("HTTP/1.0 500 Internal Server Error"));
        assert!(response.contains("Memory allocation failed."));
    }
}
