use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use http::Method;
use tracing::{debug, error, info};

use crate::error::{Error, Result};
use crate::exception::{DefaultExceptionResolver, ExceptionResolver, FallbackResolver};
use crate::handler::{Filter, RequestHandler};
use crate::interceptor::HandlerInterceptor;
use crate::protocol::HttpHandler;
use crate::registry::{HandlerRegistry, Resolution, ResolvedBy};
use crate::router::{method_allowed, ParamVec};
use crate::server::{attr, Context, Cookie, Request, Response};
use crate::session::SessionManager;
use crate::website::Website;

/// Response header echoing the exchange's request id
pub const REQUEST_ID_HEADER: &str = "x-request-id";

struct WebsiteSlot {
    site: Arc<dyn Website>,
    handler: Arc<dyn RequestHandler>,
}

/// Central request router.
///
/// Immutable once built; shared by every connection worker.
pub struct Dispatcher {
    registry: HandlerRegistry,
    website: Option<WebsiteSlot>,
    interceptor: Option<Arc<dyn HandlerInterceptor>>,
    filter: Option<Arc<dyn Filter>>,
    resolver: Arc<dyn ExceptionResolver>,
    fallback: FallbackResolver,
    session_manager: Option<Arc<dyn SessionManager>>,
}

impl Dispatcher {
    pub fn builder() -> DispatcherBuilder {
        DispatcherBuilder::default()
    }

    /// Dispatcher over a registry with every optional concern left out
    pub fn new(registry: HandlerRegistry) -> Self {
        Self::builder().registry(registry).build()
    }

    pub fn registry(&self) -> &HandlerRegistry {
        &self.registry
    }

    /// Run one exchange. Never fails and never panics past this boundary:
    /// every error ends up as a response written by the exception resolver
    /// or, failing that, the fallback resolver.
    pub fn dispatch(&self, req: &mut Request, res: &mut Response, ctx: &Context) {
        if let Some(manager) = &self.session_manager {
            req.set_session_manager(Arc::clone(manager));
        }

        let outcome = catch_unwind(AssertUnwindSafe(|| self.run(req, res, ctx)))
            .unwrap_or_else(|panic| {
                let message = panic_message(panic.as_ref());
                error!(
                    request_id = %ctx.request_id(),
                    path = %req.path(),
                    panic_message = %message,
                    "Handler panicked - converting to error"
                );
                Err(Error::HandlerPanicked(message))
            });

        match outcome {
            Ok(()) => {
                if let Some((name, session)) = req.created_session() {
                    let cookie = Cookie::new(name, session.id()).path("/").http_only(true);
                    res.add_cookie(cookie);
                }
            }
            Err(err) => self.resolve_error(&err, req, res, ctx),
        }

        res.set_header(REQUEST_ID_HEADER, &ctx.request_id().to_string());

        info!(
            request_id = %ctx.request_id(),
            method = %req.method(),
            path = %req.path(),
            status = res.status().as_u16(),
            resolved_by = req
                .attributes()
                .get::<&'static str>(attr::RESOLVED_BY)
                .copied()
                .unwrap_or("none"),
            latency_ms = ctx.received_at().elapsed().as_millis() as u64,
            "Request dispatched"
        );
    }

    fn run(&self, req: &mut Request, res: &mut Response, ctx: &Context) -> Result<()> {
        // D1: pre-intercept
        if let Some(interceptor) = &self.interceptor {
            if interceptor.on_before_execute(req, res, ctx)? {
                debug!(request_id = %ctx.request_id(), path = %req.path(), "Interceptor handled request");
                return Ok(());
            }
        }

        // D2: handler lookup
        let Resolution {
            handler,
            methods,
            pattern,
            params,
            resolved_by,
        } = match self.resolve(req, ctx)? {
            Some(resolution) => resolution,
            None => {
                // D3: not found
                debug!(request_id = %ctx.request_id(), path = %req.path(), "No handler matched");
                return Err(Error::NotFound {
                    path: req.path().to_string(),
                });
            }
        };

        // D4: method verification
        if !method_allowed(&methods, req.method()) {
            return Err(Error::MethodNotSupported {
                method: req.method().clone(),
                allowed: methods,
            });
        }

        req.set_path_params(params);
        req.attributes_mut().insert(attr::MATCHED_PATTERN, pattern);
        req.attributes_mut()
            .insert(attr::RESOLVED_BY, resolved_by.as_str());

        // D5: invoke, through the filter when one is installed
        match &self.filter {
            Some(filter) => filter.do_filter(req, res, ctx, handler.as_ref())?,
            None => handler.handle(req, res, ctx)?,
        }

        // D6: post-intercept, success path only
        if let Some(interceptor) = &self.interceptor {
            interceptor.on_after_execute(req, res, ctx)?;
        }
        Ok(())
    }

    fn resolve(&self, req: &Request, ctx: &Context) -> Result<Option<Resolution>> {
        if let Some(website) = &self.website {
            if website.site.intercept(req, ctx) {
                return Ok(Some(Resolution {
                    handler: Arc::clone(&website.handler),
                    methods: website.site.allowed_methods(),
                    pattern: req.path().to_string(),
                    params: ParamVec::new(),
                    resolved_by: ResolvedBy::Website,
                }));
            }
        }
        self.registry.resolve(req)
    }

    fn resolve_error(&self, err: &Error, req: &Request, res: &mut Response, ctx: &Context) {
        let primary = catch_unwind(AssertUnwindSafe(|| {
            self.resolver.resolve_exception(err, req, res, ctx)
        }));
        match primary {
            Ok(Ok(())) => {}
            Ok(Err(resolver_err)) => {
                error!(
                    request_id = %ctx.request_id(),
                    error = %err,
                    resolver_error = %resolver_err,
                    "Exception resolver failed - using fallback"
                );
                self.fallback.resolve(res);
            }
            Err(panic) => {
                error!(
                    request_id = %ctx.request_id(),
                    error = %err,
                    panic_message = %panic_message(panic.as_ref()),
                    "Exception resolver panicked - using fallback"
                );
                self.fallback.resolve(res);
            }
        }
    }
}

impl HttpHandler for Dispatcher {
    fn handle(&self, req: &mut Request, res: &mut Response, ctx: &Context) {
        self.dispatch(req, res, ctx);
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("registry", &self.registry)
            .field("website", &self.website.is_some())
            .field("interceptor", &self.interceptor.is_some())
            .field("filter", &self.filter.is_some())
            .field("session_manager", &self.session_manager.is_some())
            .finish()
    }
}

/// Assembles a [`Dispatcher`]. The website's
/// [`on_register`](Website::on_register) runs against the registry in
/// [`build`](Self::build).
#[derive(Default)]
pub struct DispatcherBuilder {
    registry: HandlerRegistry,
    website: Option<WebsiteSlot>,
    interceptor: Option<Arc<dyn HandlerInterceptor>>,
    filter: Option<Arc<dyn Filter>>,
    resolver: Option<Arc<dyn ExceptionResolver>>,
    session_manager: Option<Arc<dyn SessionManager>>,
}

impl DispatcherBuilder {
    #[must_use]
    pub fn registry(mut self, registry: HandlerRegistry) -> Self {
        self.registry = registry;
        self
    }

    pub fn registry_mut(&mut self) -> &mut HandlerRegistry {
        &mut self.registry
    }

    #[must_use]
    pub fn register<H: RequestHandler + 'static>(mut self, path: &str, handler: H) -> Self {
        self.registry.register(path, handler);
        self
    }

    #[must_use]
    pub fn register_with_methods<H: RequestHandler + 'static>(
        mut self,
        path: &str,
        methods: &[Method],
        handler: H,
    ) -> Self {
        self.registry
            .register_with_methods(path, methods.iter().cloned(), handler);
        self
    }

    #[must_use]
    pub fn website<W: Website + 'static>(mut self, website: W) -> Self {
        let site = Arc::new(website);
        self.website = Some(WebsiteSlot {
            site: Arc::clone(&site) as Arc<dyn Website>,
            handler: site,
        });
        self
    }

    #[must_use]
    pub fn interceptor<I: HandlerInterceptor + 'static>(mut self, interceptor: I) -> Self {
        self.interceptor = Some(Arc::new(interceptor));
        self
    }

    #[must_use]
    pub fn filter<F: Filter + 'static>(mut self, filter: F) -> Self {
        self.filter = Some(Arc::new(filter));
        self
    }

    #[must_use]
    pub fn exception_resolver<R: ExceptionResolver + 'static>(mut self, resolver: R) -> Self {
        self.resolver = Some(Arc::new(resolver));
        self
    }

    #[must_use]
    pub fn session_manager<S: SessionManager + 'static>(mut self, manager: S) -> Self {
        self.session_manager = Some(Arc::new(manager));
        self
    }

    #[must_use]
    pub fn shared_session_manager(mut self, manager: Arc<dyn SessionManager>) -> Self {
        self.session_manager = Some(manager);
        self
    }

    pub fn build(self) -> Dispatcher {
        let mut registry = self.registry;
        if let Some(website) = &self.website {
            website.site.on_register(&mut registry);
        }
        debug!(entries = registry.len(), "Dispatcher built");
        Dispatcher {
            registry,
            website: self.website,
            interceptor: self.interceptor,
            filter: self.filter,
            resolver: self
                .resolver
                .unwrap_or_else(|| Arc::new(DefaultExceptionResolver)),
            fallback: FallbackResolver,
            session_manager: self.session_manager,
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
