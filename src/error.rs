//! Error taxonomy for request dispatch.
//!
//! Every failure that can arise while an exchange is being dispatched is an
//! [`Error`]. The dispatcher never lets one escape: it is handed to the
//! configured [`ExceptionResolver`](crate::exception::ExceptionResolver),
//! which turns it into an HTTP response using [`Error::status_code`].
//!
//! | Kind | Variants | Status |
//! |------|----------|--------|
//! | Routing | `NotFound`, `MethodNotSupported` | 404, 405 |
//! | Parameter binding | `MissingParameter`, `InvalidParameter`, `ParamValidation`, `HeaderValidation`, `InvalidBody` | 400 |
//! | Content negotiation | `UnsupportedMediaType`, `NotAcceptable` | 415, 406 |
//! | Handler-raised | `Status` | explicit |
//! | Internal | `BodyAlreadyWritten`, `InvalidMapping`, `HandlerPanicked`, `Io`, `Other` | 500 |

use std::fmt;

use http::{Method, StatusCode};
use thiserror::Error;

/// Result type alias for dispatch operations
pub type Result<T> = std::result::Result<T, Error>;

/// Where a request parameter was expected to come from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamLocation {
    Path,
    Query,
    Form,
    Header,
    Cookie,
    Body,
}

impl fmt::Display for ParamLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ParamLocation::Path => "path",
            ParamLocation::Query => "query",
            ParamLocation::Form => "form",
            ParamLocation::Header => "header",
            ParamLocation::Cookie => "cookie",
            ParamLocation::Body => "body",
        };
        f.write_str(s)
    }
}

/// Errors raised while dispatching a single exchange
#[derive(Debug, Error)]
pub enum Error {
    /// No handler matched the request path
    #[error("No handler found for path: {path}")]
    NotFound { path: String },

    /// A handler exists for the path but does not accept the request method
    #[error("Method {method} is not supported, allowed: {}", format_methods(.allowed))]
    MethodNotSupported { method: Method, allowed: Vec<Method> },

    /// A required parameter was absent
    #[error("Missing required {location} parameter: {name}")]
    MissingParameter {
        location: ParamLocation,
        name: String,
    },

    /// A parameter was present but could not be converted
    #[error("Invalid {location} parameter {name}: {reason}")]
    InvalidParameter {
        location: ParamLocation,
        name: String,
        reason: String,
    },

    /// The request failed a mapping rule's query/form parameter condition
    #[error("Parameter condition not satisfied: {0}")]
    ParamValidation(String),

    /// The request failed a mapping rule's header condition
    #[error("Header condition not satisfied: {0}")]
    HeaderValidation(String),

    /// The request body's media type is not consumable by the handler
    #[error("Content type not supported: {content_type}")]
    UnsupportedMediaType { content_type: String },

    /// None of the handler's producible media types is acceptable
    #[error("No acceptable representation for: {accept}")]
    NotAcceptable { accept: String },

    /// The request body could not be decoded
    #[error("Invalid request body: {0}")]
    InvalidBody(String),

    /// The response body was written twice within one exchange
    #[error("Response body has already been written")]
    BodyAlreadyWritten,

    /// A mapping rule could not be constructed
    #[error("Invalid mapping: {0}")]
    InvalidMapping(String),

    /// A handler asked for an explicit status
    #[error("{status}: {message}")]
    Status { status: StatusCode, message: String },

    /// A handler, filter or interceptor panicked
    #[error("Handler panicked: {0}")]
    HandlerPanicked(String),

    /// IO error raised from handler code
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Any other application error
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl Error {
    /// Build an explicit status error
    pub fn status(status: StatusCode, message: impl Into<String>) -> Self {
        Error::Status {
            status,
            message: message.into(),
        }
    }

    /// Shortcut for a missing parameter
    pub fn missing(location: ParamLocation, name: impl Into<String>) -> Self {
        Error::MissingParameter {
            location,
            name: name.into(),
        }
    }

    /// HTTP status this error is reported with
    #[must_use]
    pub fn status_code(&self) -> StatusCode {
        match self {
            Error::NotFound { .. } => StatusCode::NOT_FOUND,
            Error::MethodNotSupported { .. } => StatusCode::METHOD_NOT_ALLOWED,
            Error::MissingParameter { .. }
            | Error::InvalidParameter { .. }
            | Error::ParamValidation(_)
            | Error::HeaderValidation(_)
            | Error::InvalidBody(_) => StatusCode::BAD_REQUEST,
            Error::UnsupportedMediaType { .. } => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            Error::NotAcceptable { .. } => StatusCode::NOT_ACCEPTABLE,
            Error::Status { status, .. } => *status,
            Error::BodyAlreadyWritten
            | Error::InvalidMapping(_)
            | Error::HandlerPanicked(_)
            | Error::Io(_)
            | Error::Other(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Whether the message is safe to show to the client.
    ///
    /// Internal failures are reported with the canonical reason phrase only.
    #[must_use]
    pub fn is_client_error(&self) -> bool {
        self.status_code().is_client_error()
    }
}

pub(crate) fn format_methods(methods: &[Method]) -> String {
    methods
        .iter()
        .map(Method::as_str)
        .collect::<Vec<_>>()
        .join(", ")
}
