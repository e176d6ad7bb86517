//! Controller tunables and timeouts
//!
//! # Security-First Defaults
//!
//! Default limits are intentionally conservative to prevent:
//! - Slowloris-style stalled connections
//! - Header flooding of the fixed head buffer
//! - Unbounded body allocations (opt-in via `max_body_size`)
//!
//! # Examples
//!
//! ```no_run
//! use confctl::{listen, pair, Controller, limits::ControllerLimits};
//! use std::time::Duration;
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() {
//!     let listener = listen("127.0.0.1:8443".parse().unwrap(), 1024).unwrap();
//!     let (link, _router) = pair();
//!
//!     Controller::builder()
//!         .listener(listener)
//!         .router(link)
//!         .limits(ControllerLimits {
//!             io_timeout: Duration::from_secs(10),
//!             max_body_size: 4 * 1024 * 1024,
//!             ..ControllerLimits::default()
//!         })
//!         .build()
//!         .launch()
//!         .await;
//! }
//! ```

use std::time::Duration;

/// Default control endpoint. The supervisor may bind any other address
/// before startup; this one is used when nothing is configured.
pub const DEFAULT_CONTROL_ADDR: &str = "127.0.0.1:8443";

/// Per-connection limits and timeouts of the control listener.
///
/// Default values match the behavior of the stock controller. Only
/// change them if you understand the consequences.
#[derive(Debug, Clone)]
pub struct ControllerLimits {
    /// Size of the initial read buffer holding the request head
    /// (default: `1024`).
    ///
    /// A head that does not fit is answered by closing the connection;
    /// no response is sent.
    pub head_buffer_size: usize,

    /// Inactivity timeout for the head, body, and write phases of a
    /// connection (default: `60s`).
    ///
    /// The timer re-arms whenever the socket makes progress. Expiry
    /// closes the connection silently. It does not cancel an apply that
    /// is already in flight to the router.
    pub io_timeout: Duration,

    /// Largest accepted `Content-Length` (default: `usize::MAX`).
    ///
    /// A declared length above this closes the connection before any
    /// body byte is read.
    pub max_body_size: usize,

    #[doc(hidden)]
    #[allow(dead_code)]
    pub _priv: (),
}

impl Default for ControllerLimits {
    fn default() -> Self {
        Self {
            head_buffer_size: 1024,
            io_timeout: Duration::from_secs(60),
            max_body_size: usize::MAX,

            _priv: (),
        }
    }
}
