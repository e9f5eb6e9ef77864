//! # Protocol Module
//!
//! Adapters between a wire engine and the dispatcher.
//!
//! A [`ProtocolService`] drives exactly one exchange per call on an
//! [`HttpConnection`]: read a request, build the host-agnostic
//! [`Request`], hand it to an [`HttpHandler`] (normally the
//! [`Dispatcher`](crate::Dispatcher)) and write the [`Response`] back.
//! Whether the connection stays open afterwards is up to the service.
//!
//! [`H1Service`] is the blocking HTTP/1.1 engine built on `httparse`.

use http::StatusCode;
use thiserror::Error;

use crate::server::{Context, Request, Response};

mod connection;
mod h1;

pub use connection::HttpConnection;
pub use h1::{H1Config, H1Service, MAX_HEADERS};

/// Handles one parsed exchange. Infallible: errors must already be turned
/// into a response.
pub trait HttpHandler: Send + Sync {
    fn handle(&self, req: &mut Request, res: &mut Response, ctx: &Context);
}

/// Drives one request/response exchange on a connection
pub trait ProtocolService: Send + Sync {
    fn handle_request(&self, conn: &mut HttpConnection) -> Result<(), ProtocolError>;
}

/// Wire-level failures. The ones with a [`status`](Self::status) are
/// answered before the connection is closed.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed request: {0}")]
    Malformed(#[from] httparse::Error),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("request head exceeds the configured limit")]
    HeadersTooLarge,

    #[error("request body exceeds {limit} bytes")]
    BodyTooLarge { limit: usize },

    #[error("invalid chunked encoding")]
    InvalidChunk,

    #[error("connection closed mid-request")]
    UnexpectedEof,
}

impl ProtocolError {
    /// Status sent to the client before closing, if any
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            ProtocolError::Malformed(httparse::Error::TooManyHeaders)
            | ProtocolError::HeadersTooLarge => Some(StatusCode::REQUEST_HEADER_FIELDS_TOO_LARGE),
            ProtocolError::Malformed(_)
            | ProtocolError::InvalidRequest(_)
            | ProtocolError::InvalidChunk => Some(StatusCode::BAD_REQUEST),
            ProtocolError::BodyTooLarge { .. } => Some(StatusCode::PAYLOAD_TOO_LARGE),
            ProtocolError::Io(_) | ProtocolError::UnexpectedEof => None,
        }
    }
}
