//! Pre/post hooks around every dispatch.
//!
//! [`HandlerInterceptor::on_before_execute`] returning `true` means the
//! interceptor handled the exchange itself: routing stops and
//! `on_after_execute` is not called. `on_after_execute` only runs when the
//! handler completed without error.
//!
//! [`InterceptorChain`] composes several interceptors; [`CorsInterceptor`]
//! is the built-in cross-origin gate.

use std::sync::Arc;

use http::header::{
    ACCESS_CONTROL_ALLOW_CREDENTIALS, ACCESS_CONTROL_ALLOW_HEADERS, ACCESS_CONTROL_ALLOW_METHODS,
    ACCESS_CONTROL_ALLOW_ORIGIN, ACCESS_CONTROL_EXPOSE_HEADERS, ACCESS_CONTROL_MAX_AGE,
    ACCESS_CONTROL_REQUEST_METHOD, ORIGIN, VARY,
};
use http::{Method, StatusCode};
use thiserror::Error;
use tracing::debug;

use crate::error::Result;
use crate::server::{Context, Request, Response};

pub trait HandlerInterceptor: Send + Sync {
    /// Return `Ok(true)` to short-circuit dispatch
    fn on_before_execute(&self, req: &mut Request, res: &mut Response, ctx: &Context)
        -> Result<bool>;

    fn on_after_execute(&self, _req: &mut Request, _res: &mut Response, _ctx: &Context) -> Result<()> {
        Ok(())
    }
}

/// Ordered interceptors acting as one.
///
/// `before` hooks run in order and stop at the first short-circuit; `after`
/// hooks run in reverse order.
#[derive(Default, Clone)]
pub struct InterceptorChain {
    interceptors: Vec<Arc<dyn HandlerInterceptor>>,
}

impl InterceptorChain {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with<I: HandlerInterceptor + 'static>(mut self, interceptor: I) -> Self {
        self.push(Arc::new(interceptor));
        self
    }

    pub fn push(&mut self, interceptor: Arc<dyn HandlerInterceptor>) {
        self.interceptors.push(interceptor);
    }

    pub fn len(&self) -> usize {
        self.interceptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.interceptors.is_empty()
    }
}

impl HandlerInterceptor for InterceptorChain {
    fn on_before_execute(
        &self,
        req: &mut Request,
        res: &mut Response,
        ctx: &Context,
    ) -> Result<bool> {
        for interceptor in &self.interceptors {
            if interceptor.on_before_execute(req, res, ctx)? {
                return Ok(true);
            }
        }
        Ok(false)
    }

    fn on_after_execute(&self, req: &mut Request, res: &mut Response, ctx: &Context) -> Result<()> {
        for interceptor in self.interceptors.iter().rev() {
            interceptor.on_after_execute(req, res, ctx)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CorsConfigError {
    #[error("wildcard origin (*) cannot be combined with credentials")]
    WildcardWithCredentials,
    #[error("invalid origin '{origin}', expected scheme://host[:port]")]
    InvalidOriginFormat { origin: String },
}

/// Cross-origin gate.
///
/// Preflight requests (`OPTIONS` with `Access-Control-Request-Method`) are
/// answered here: `204` with the policy headers for an allowed origin, `403`
/// otherwise. Actual requests from an allowed origin get
/// `Access-Control-Allow-Origin` and continue to the handler.
#[derive(Debug, Clone)]
pub struct CorsInterceptor {
    allowed_origins: Vec<String>,
    allowed_headers: Vec<String>,
    allowed_methods: Vec<Method>,
    allow_credentials: bool,
    expose_headers: Vec<String>,
    max_age: Option<u32>,
}

impl CorsInterceptor {
    pub fn builder() -> CorsInterceptorBuilder {
        CorsInterceptorBuilder::default()
    }

    /// Permissive policy for development: any origin, common methods
    #[must_use]
    pub fn permissive() -> Self {
        Self {
            allowed_origins: vec!["*".into()],
            allowed_headers: vec!["Content-Type".into(), "Authorization".into()],
            allowed_methods: vec![
                Method::GET,
                Method::POST,
                Method::PUT,
                Method::DELETE,
                Method::OPTIONS,
            ],
            allow_credentials: false,
            expose_headers: Vec::new(),
            max_age: None,
        }
    }

    fn is_origin_allowed(&self, origin: &str) -> bool {
        self.allowed_origins.iter().any(|o| o == "*" || o == origin)
    }

    fn allow_origin_value<'a>(&self, origin: &'a str) -> &'a str {
        if self.allowed_origins.iter().any(|o| o == "*") && !self.allow_credentials {
            "*"
        } else {
            origin
        }
    }

    fn apply_common(&self, origin: &str, res: &mut Response) {
        res.set_header(ACCESS_CONTROL_ALLOW_ORIGIN.as_str(), self.allow_origin_value(origin));
        res.append_header(VARY.as_str(), "Origin");
        if self.allow_credentials {
            res.set_header(ACCESS_CONTROL_ALLOW_CREDENTIALS.as_str(), "true");
        }
    }
}

impl HandlerInterceptor for CorsInterceptor {
    fn on_before_execute(
        &self,
        req: &mut Request,
        res: &mut Response,
        _ctx: &Context,
    ) -> Result<bool> {
        let Some(origin) = req.header(ORIGIN.as_str()).map(str::to_string) else {
            return Ok(false);
        };
        let preflight = *req.method() == Method::OPTIONS
            && req.header(ACCESS_CONTROL_REQUEST_METHOD.as_str()).is_some();

        if !self.is_origin_allowed(&origin) {
            if preflight {
                debug!(origin = %origin, "CORS preflight rejected");
                res.set_status(StatusCode::FORBIDDEN);
                return Ok(true);
            }
            return Ok(false);
        }

        self.apply_common(&origin, res);
        if preflight {
            let methods = self
                .allowed_methods
                .iter()
                .map(Method::as_str)
                .collect::<Vec<_>>()
                .join(", ");
            res.set_header(ACCESS_CONTROL_ALLOW_METHODS.as_str(), &methods);
            res.set_header(
                ACCESS_CONTROL_ALLOW_HEADERS.as_str(),
                &self.allowed_headers.join(", "),
            );
            if let Some(max_age) = self.max_age {
                res.set_header(ACCESS_CONTROL_MAX_AGE.as_str(), &max_age.to_string());
            }
            res.set_status(StatusCode::NO_CONTENT);
            return Ok(true);
        }

        if !self.expose_headers.is_empty() {
            res.set_header(
                ACCESS_CONTROL_EXPOSE_HEADERS.as_str(),
                &self.expose_headers.join(", "),
            );
        }
        Ok(false)
    }
}

/// Fluent configuration for [`CorsInterceptor`]; no origins allowed by default
#[derive(Debug, Clone)]
pub struct CorsInterceptorBuilder {
    inner: CorsInterceptor,
}

impl Default for CorsInterceptorBuilder {
    fn default() -> Self {
        let mut inner = CorsInterceptor::permissive();
        inner.allowed_origins.clear();
        Self { inner }
    }
}

impl CorsInterceptorBuilder {
    #[must_use]
    pub fn allowed_origins(mut self, origins: &[&str]) -> Self {
        self.inner.allowed_origins = origins.iter().map(|s| s.to_string()).collect();
        self
    }

    #[must_use]
    pub fn allowed_methods(mut self, methods: &[Method]) -> Self {
        self.inner.allowed_methods = methods.to_vec();
        self
    }

    #[must_use]
    pub fn allowed_headers(mut self, headers: &[&str]) -> Self {
        self.inner.allowed_headers = headers.iter().map(|s| s.to_string()).collect();
        self
    }

    #[must_use]
    pub fn expose_headers(mut self, headers: &[&str]) -> Self {
        self.inner.expose_headers = headers.iter().map(|s| s.to_string()).collect();
        self
    }

    #[must_use]
    pub fn allow_credentials(mut self, allow: bool) -> Self {
        self.inner.allow_credentials = allow;
        self
    }

    #[must_use]
    pub fn max_age(mut self, seconds: u32) -> Self {
        self.inner.max_age = Some(seconds);
        self
    }

    pub fn build(self) -> std::result::Result<CorsInterceptor, CorsConfigError> {
        let origins = &self.inner.allowed_origins;
        if self.inner.allow_credentials && origins.iter().any(|o| o == "*") {
            return Err(CorsConfigError::WildcardWithCredentials);
        }
        for origin in origins.iter().filter(|o| *o != "*") {
            let valid = url::Url::parse(origin)
                .map(|u| u.has_host() && matches!(u.path(), "" | "/"))
                .unwrap_or(false);
            if !valid {
                return Err(CorsConfigError::InvalidOriginFormat {
                    origin: origin.clone(),
                });
            }
        }
        Ok(self.inner)
    }
}
