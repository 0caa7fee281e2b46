//! Application-facing request handling.
//!
//! A worker hands each parsed request to one shared [`Handler`]. Returning
//! `Ok(None)` means the handler does not route the path and the
//! [`StaticFiles`] fallback answers instead.

pub mod router;
pub mod session;
pub mod static_files;

pub use router::{RouteMethod, Router};
pub use session::{MemorySessionStore, Session, SessionStore, SESSION_COOKIE};
pub use static_files::StaticFiles;

use crate::error::HandlerError;
use crate::http::request::Request;
use crate::http::response::Response;

/// Request handler invoked concurrently by every worker.
pub trait Handler: Send + Sync {
    /// Called once while the server starts; an error aborts startup.
    fn init(&self) -> Result<(), HandlerError> {
        Ok(())
    }

    fn handle(&self, request: &mut Request) -> Result<Option<Response>, HandlerError>;
}

impl<F> Handler for F
where
    F: Fn(&mut Request) -> Result<Option<Response>, HandlerError> + Send + Sync,
{
    fn handle(&self, request: &mut Request) -> Result<Option<Response>, HandlerError> {
        self(request)
    }
}
