//! Error types shared across the connector.
//!
//! Errors that happen before a response exists (bind, accept, spawn) are
//! [`ServerError`]s and stay local to the thread that hit them. Errors raised
//! while serving a request carry a [`StatusCode`] so the worker can turn them
//! into an HTTP error page.

use std::io;

use thiserror::Error;

use crate::http::response::StatusCode;

/// Failures of the server lifecycle itself.
#[derive(Debug, Error)]
pub enum ServerError {
    /// The listening port could not be bound.
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: io::Error,
    },

    /// A long-lived thread could not be started.
    #[error("failed to spawn {name} thread: {source}")]
    Spawn {
        name: String,
        #[source]
        source: io::Error,
    },

    /// The application handler refused to initialize.
    #[error("handler initialization failed: {0}")]
    HandlerInit(#[source] HandlerError),

    /// Invalid startup configuration.
    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Errors produced while decoding a request from the wire.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    /// More bytes are needed before a request can be produced.
    #[error("incomplete request")]
    Incomplete,

    /// Malformed request line, header or parameter.
    #[error("malformed request: {0}")]
    Protocol(String),

    /// The request head exceeded the size guard.
    #[error("request head exceeds {limit} bytes")]
    TooLarge { limit: usize },
}

impl ParseError {
    pub fn status_code(&self) -> StatusCode {
        StatusCode::BadRequest
    }
}

/// Failure signals a [`Handler`](crate::handler::Handler) can raise.
#[derive(Debug, Error)]
pub enum HandlerError {
    /// The target exists but is not bound to the request method.
    #[error("method {0} not supported")]
    MethodNotSupported(String),

    /// The handler failed; the text is sent back as the 500 diagnostic.
    #[error("handler failure: {0}")]
    Failure(String),
}

impl HandlerError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::MethodNotSupported(_) => StatusCode::MethodNotAllowed,
            Self::Failure(_) => StatusCode::InternalServerError,
        }
    }
}

/// Errors of the static-resource fallback.
#[derive(Debug, Error)]
pub enum StaticFileError {
    #[error("file not found: {0}")]
    NotFound(String),

    /// The path tried to escape the static root.
    #[error("forbidden path: {0}")]
    Forbidden(String),

    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: io::Error,
    },
}

impl StaticFileError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::NotFound(_) => StatusCode::NotFound,
            Self::Forbidden(_) => StatusCode::Forbidden,
            Self::Io { .. } => StatusCode::InternalServerError,
        }
    }
}
