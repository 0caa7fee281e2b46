//! Connector - Multi-Reactor HTTP/1.1 Server
//!
//! Poller shards multiplex readiness, a fixed worker pool runs request
//! cycles, and reapers evict idle connections and sessions.

pub mod config;
pub mod error;
pub mod handler;
pub mod http;
pub mod logging;
pub mod server;

pub use config::Config;
pub use error::{HandlerError, ServerError};
pub use handler::{Handler, Router};
pub use server::Server;
