//! Turning dispatch failures into HTTP responses.
//!
//! The dispatcher owns two resolver roles: a pluggable primary
//! [`ExceptionResolver`] (by default [`DefaultExceptionResolver`]) and the
//! fixed [`FallbackResolver`], used only when the primary fails or panics.

use http::header::ALLOW;
use http::StatusCode;
use serde::Serialize;
use tracing::{debug, error};

use crate::error::{format_methods, Error, Result};
use crate::server::{Context, Request, Response};

pub trait ExceptionResolver: Send + Sync {
    /// Write a complete error response for `err`
    fn resolve_exception(
        &self,
        err: &Error,
        req: &Request,
        res: &mut Response,
        ctx: &Context,
    ) -> Result<()>;
}

impl<F> ExceptionResolver for F
where
    F: Fn(&Error, &Request, &mut Response, &Context) -> Result<()> + Send + Sync,
{
    fn resolve_exception(
        &self,
        err: &Error,
        req: &Request,
        res: &mut Response,
        ctx: &Context,
    ) -> Result<()> {
        self(err, req, res, ctx)
    }
}

#[derive(Serialize)]
struct ErrorBody<'a> {
    error: &'a str,
    status: u16,
    path: &'a str,
}

/// Maps the error taxonomy to status codes with a small JSON body:
/// `{"error": "...", "status": 404, "path": "/missing"}`.
///
/// Server-side failures only expose the status reason phrase; the detail
/// goes to the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultExceptionResolver;

impl ExceptionResolver for DefaultExceptionResolver {
    fn resolve_exception(
        &self,
        err: &Error,
        req: &Request,
        res: &mut Response,
        ctx: &Context,
    ) -> Result<()> {
        let status = err.status_code();
        let message = match err {
            Error::Status { message, .. } => message.clone(),
            _ if status.is_server_error() => {
                error!(
                    request_id = %ctx.request_id(),
                    method = %req.method(),
                    path = %req.path(),
                    status = status.as_u16(),
                    error = %err,
                    "Request failed"
                );
                status
                    .canonical_reason()
                    .unwrap_or("Internal Server Error")
                    .to_string()
            }
            _ => {
                debug!(
                    request_id = %ctx.request_id(),
                    method = %req.method(),
                    path = %req.path(),
                    status = status.as_u16(),
                    error = %err,
                    "Request rejected"
                );
                err.to_string()
            }
        };

        res.reset_body();
        res.set_status(status);
        if let Error::MethodNotSupported { allowed, .. } = err {
            if !allowed.is_empty() {
                res.set_header(ALLOW.as_str(), &format_methods(allowed));
            }
        }
        res.set_json(&ErrorBody {
            error: &message,
            status: status.as_u16(),
            path: req.path(),
        })
    }
}

/// Last line of defence: a bare `500` with an empty body. Cannot fail.
#[derive(Debug, Default, Clone, Copy)]
pub struct FallbackResolver;

impl FallbackResolver {
    pub fn resolve(&self, res: &mut Response) {
        res.reset();
        res.set_status(StatusCode::INTERNAL_SERVER_ERROR);
    }
}

impl ExceptionResolver for FallbackResolver {
    fn resolve_exception(
        &self,
        _err: &Error,
        _req: &Request,
        res: &mut Response,
        _ctx: &Context,
    ) -> Result<()> {
        self.resolve(res);
        Ok(())
    }
}
