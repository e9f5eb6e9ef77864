//! Handler contracts consumed by the dispatcher.
//!
//! A [`RequestHandler`] processes one exchange. Plain closures implement it
//! directly, [`MappedHandler`] adds a structured [`Mapping`] (what the
//! `#[request_mapping]` attribute generates) and a [`HandlerAdapter`] hands
//! the registry a whole controller's worth of `(Mapping, handler)` pairs.

use std::sync::Arc;

use crate::error::Result;
use crate::router::Mapping;
use crate::server::{Context, Request, Response};

/// Unit of request-processing logic.
///
/// Errors are routed to the exception resolver; handlers never write error
/// responses themselves unless they want to.
pub trait RequestHandler: Send + Sync {
    fn handle(&self, req: &mut Request, res: &mut Response, ctx: &Context) -> Result<()>;
}

impl<F> RequestHandler for F
where
    F: Fn(&mut Request, &mut Response, &Context) -> Result<()> + Send + Sync,
{
    fn handle(&self, req: &mut Request, res: &mut Response, ctx: &Context) -> Result<()> {
        self(req, res, ctx)
    }
}

/// Pin a closure's argument types so it can be registered without annotations.
///
/// ```rust
/// use portico::handler_fn;
///
/// let hello = handler_fn(|_req, res, _ctx| res.set_body("hello"));
/// # let _ = hello;
/// ```
pub fn handler_fn<F>(f: F) -> F
where
    F: Fn(&mut Request, &mut Response, &Context) -> Result<()> + Send + Sync,
{
    f
}

/// Wraps handler invocation. Call `next.handle(..)` to continue, or return
/// without calling it to short-circuit.
pub trait Filter: Send + Sync {
    fn do_filter(
        &self,
        req: &mut Request,
        res: &mut Response,
        ctx: &Context,
        next: &dyn RequestHandler,
    ) -> Result<()>;
}

impl<F> Filter for F
where
    F: Fn(&mut Request, &mut Response, &Context, &dyn RequestHandler) -> Result<()> + Send + Sync,
{
    fn do_filter(
        &self,
        req: &mut Request,
        res: &mut Response,
        ctx: &Context,
        next: &dyn RequestHandler,
    ) -> Result<()> {
        self(req, res, ctx, next)
    }
}

/// Handler that carries its own mapping rule
pub trait MappedHandler: RequestHandler {
    fn mapping(&self) -> Result<Mapping>;
}

/// Source of `(Mapping, handler)` pairs, typically one per controller
pub trait HandlerAdapter {
    fn mappings(&self) -> Result<Vec<(Mapping, Arc<dyn RequestHandler>)>>;
}
