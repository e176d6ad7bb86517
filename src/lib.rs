//! confctl - Atomic-apply HTTP configuration controller
//!
//! A long-lived control-plane component for multi-process application
//! servers: it accepts HTTP-framed configuration commands on a local
//! socket, validates and edits a JSON configuration tree, and pushes
//! accepted trees to the sibling router process that owns the data plane.
//! External observers only ever see a tree the router has acknowledged.
//!
//! # Guarantees
//!
//! - **At most one apply in flight** - contending requests queue in FIFO
//!   order and are pushed to the router strictly in arrival order.
//! - **Atomic commit** - the visible tree switches in one step on router
//!   `OK`; on any other reply the candidate is discarded whole and `GET`
//!   keeps returning the previous rendering byte for byte.
//! - **One request per connection** - a connection carries one HTTP/1.x
//!   request, receives one `HTTP/1.0` response, and closes.
//! - **Nothing persists** - a restarted controller always starts from
//!   `{ "listeners": {}, "applications": {} }`.
//!
//! # Quick Start
//!
//! ```no_run
//! use confctl::{listen, pair, Controller};
//! use confctl::limits::DEFAULT_CONTROL_ADDR;
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() {
//!     let listener = listen(DEFAULT_CONTROL_ADDR.parse().unwrap(), 1024).unwrap();
//!     let (link, router) = pair();
//!
//!     // Hand `router` to the task that bridges the data-plane process:
//!     // it receives one JSON payload per apply and must answer each with
//!     // `OK` (accept) or anything else (reject), in order.
//!     # drop(router);
//!
//!     Controller::builder()
//!         .listener(listener)
//!         .router(link)
//!         .build()
//!         .launch()
//!         .await;
//! }
//! ```
//!
//! # Surface
//!
//! - `GET <path>` - read a subtree of the current configuration.
//! - `PUT <path>` - replace or create the subtree at `<path>` with the
//!   JSON request body.
//! - `DELETE <path>` - remove the subtree at `<path>` (the root resets
//!   to `{}`).
//!
//! Paths address object members by name and array elements by decimal
//! index; a single trailing `/` is ignored. Responses are bare `HTTP/1.0`
//! status lines followed by a pretty-printed JSON body.
pub(crate) mod conf {
    pub(crate) mod ops;
    pub(crate) mod path;
    pub(crate) mod store;
    pub(crate) mod validate;
}
pub(crate) mod http {
    pub(crate) mod request;
    pub(crate) mod response;
    pub(crate) mod types;
}
pub(crate) mod server {
    pub(crate) mod apply;
    pub(crate) mod connection;
    pub(crate) mod controller;
    pub(crate) mod router;
}
pub(crate) mod errors;
pub mod limits;

pub use crate::{
    http::types::{Method, StatusCode},
    server::{
        controller::{listen, Controller, ControllerBuilder},
        router::{pair, ChannelRouterPort, PortSendError, RouterHandle, RouterLink, RouterPort},
    },
};
