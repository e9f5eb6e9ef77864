//! Handler registry: exact paths plus ordered mapping rules.
//!
//! Lookup runs in two tiers:
//!
//! 1. **Exact** - a hash map keyed by normalized path. Registering the same
//!    path twice replaces the earlier handler.
//! 2. **Mapping rules** - an insertion-ordered list of `(Mapping, handler)`
//!    pairs. Among rules that fully match, the most specific path template
//!    wins; equally specific rules resolve to the one registered first.
//!
//! An exact entry shadows every mapping rule for the same path. When nothing
//! matches but some rule matched the path, the rejection from the rule that
//! got furthest through evaluation is reported (e.g. 405 rather than 404),
//! with the allowed methods of every path-matching rule merged for 405.

use std::collections::HashMap;
use std::sync::Arc;

use http::Method;
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::handler::{HandlerAdapter, MappedHandler, RequestHandler};
use crate::router::{Evaluation, Mapping, ParamVec, Specificity, Stage};
use crate::server::normalize_path;
use crate::server::Request;

/// Which registry tier (or the website) produced a handler
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolvedBy {
    Exact,
    Mapping,
    Website,
}

impl ResolvedBy {
    pub fn as_str(self) -> &'static str {
        match self {
            ResolvedBy::Exact => "exact",
            ResolvedBy::Mapping => "mapping",
            ResolvedBy::Website => "website",
        }
    }
}

/// Result of a successful lookup
pub struct Resolution {
    pub handler: Arc<dyn RequestHandler>,
    /// Allowed methods recorded at registration; empty = any
    pub methods: Vec<Method>,
    /// Path template (or the exact path) that matched
    pub pattern: String,
    pub params: ParamVec,
    pub resolved_by: ResolvedBy,
}

impl std::fmt::Debug for Resolution {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Resolution")
            .field("methods", &self.methods)
            .field("pattern", &self.pattern)
            .field("params", &self.params)
            .field("resolved_by", &self.resolved_by)
            .finish_non_exhaustive()
    }
}

struct HandlerEntry {
    handler: Arc<dyn RequestHandler>,
    methods: Vec<Method>,
}

struct MappingEntry {
    mapping: Mapping,
    handler: Arc<dyn RequestHandler>,
}

/// Path and mapping-rule table, built before the server starts and
/// read-only afterwards.
#[derive(Default)]
pub struct HandlerRegistry {
    exact: HashMap<String, HandlerEntry>,
    mappings: Vec<MappingEntry>,
}

impl HandlerRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler for an exact path accepting any method
    pub fn register<H>(&mut self, path: &str, handler: H)
    where
        H: RequestHandler + 'static,
    {
        self.insert_exact(path, Arc::new(handler), Vec::new());
    }

    /// Register a handler for an exact path restricted to `methods`
    pub fn register_with_methods<H, I>(&mut self, path: &str, methods: I, handler: H)
    where
        H: RequestHandler + 'static,
        I: IntoIterator<Item = Method>,
    {
        self.insert_exact(path, Arc::new(handler), methods.into_iter().collect());
    }

    /// Register a shared handler for an exact path
    pub fn register_shared(
        &mut self,
        path: &str,
        methods: Vec<Method>,
        handler: Arc<dyn RequestHandler>,
    ) {
        self.insert_exact(path, handler, methods);
    }

    pub fn register_mapping<H>(&mut self, mapping: Mapping, handler: H)
    where
        H: RequestHandler + 'static,
    {
        self.push_mapping(mapping, Arc::new(handler));
    }

    /// Register a handler that carries its own mapping
    pub fn register_mapped<H>(&mut self, handler: H) -> Result<()>
    where
        H: MappedHandler + 'static,
    {
        let mapping = handler.mapping()?;
        self.push_mapping(mapping, Arc::new(handler));
        Ok(())
    }

    /// Register every `(Mapping, handler)` pair an adapter provides, in order
    pub fn register_adapter(&mut self, adapter: &dyn HandlerAdapter) -> Result<()> {
        for (mapping, handler) in adapter.mappings()? {
            self.push_mapping(mapping, handler);
        }
        Ok(())
    }

    fn insert_exact(&mut self, path: &str, handler: Arc<dyn RequestHandler>, methods: Vec<Method>) {
        let key = normalize_path(path);
        let entry = HandlerEntry { handler, methods };
        if self.exact.insert(key.clone(), entry).is_some() {
            warn!(path = %key, "Replaced existing handler registration");
        } else {
            debug!(path = %key, total = self.exact.len(), "Handler registered");
        }
    }

    fn push_mapping(&mut self, mapping: Mapping, handler: Arc<dyn RequestHandler>) {
        debug!(
            paths = ?mapping.paths().iter().map(|p| p.as_str()).collect::<Vec<_>>(),
            methods = ?mapping.methods(),
            order = self.mappings.len(),
            "Mapping registered"
        );
        self.mappings.push(MappingEntry { mapping, handler });
    }

    /// Find the handler for a request.
    ///
    /// `Ok(None)` means no path matched at all. `Err` carries the rejection
    /// of a rule whose path matched but whose conditions did not.
    pub fn resolve(&self, req: &Request) -> Result<Option<Resolution>> {
        if let Some(entry) = self.exact.get(req.path()) {
            return Ok(Some(Resolution {
                handler: Arc::clone(&entry.handler),
                methods: entry.methods.clone(),
                pattern: req.path().to_string(),
                params: ParamVec::new(),
                resolved_by: ResolvedBy::Exact,
            }));
        }

        let mut best: Option<(Specificity, &MappingEntry, String, ParamVec)> = None;
        let mut rejection: Option<(Stage, Error)> = None;
        let mut allowed: Vec<Method> = Vec::new();

        for entry in &self.mappings {
            match entry.mapping.evaluate(req) {
                Evaluation::NoPath => {}
                Evaluation::Matched {
                    pattern,
                    specificity,
                    params,
                } => {
                    let better = best.as_ref().map_or(true, |(s, ..)| specificity > *s);
                    if better {
                        best = Some((specificity, entry, pattern, params));
                    }
                }
                Evaluation::Rejected(stage, err) => {
                    if stage == Stage::Method {
                        for m in entry.mapping.methods() {
                            if !allowed.contains(m) {
                                allowed.push(m.clone());
                            }
                        }
                    }
                    if rejection.as_ref().map_or(true, |(s, _)| stage > *s) {
                        rejection = Some((stage, err));
                    }
                }
            }
        }

        if let Some((_, entry, pattern, params)) = best {
            return Ok(Some(Resolution {
                handler: Arc::clone(&entry.handler),
                methods: entry.mapping.methods().to_vec(),
                pattern,
                params,
                resolved_by: ResolvedBy::Mapping,
            }));
        }

        match rejection {
            None => Ok(None),
            Some((Stage::Method, _)) => Err(Error::MethodNotSupported {
                method: req.method().clone(),
                allowed,
            }),
            Some((_, err)) => Err(err),
        }
    }

    /// Number of exact entries plus mapping rules
    pub fn len(&self) -> usize {
        self.exact.len() + self.mappings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.exact.is_empty() && self.mappings.is_empty()
    }

    /// Exact paths and mapping templates, exact paths first (sorted)
    pub fn paths(&self) -> Vec<String> {
        let mut exact: Vec<String> = self.exact.keys().cloned().collect();
        exact.sort();
        exact.extend(
            self.mappings
                .iter()
                .flat_map(|e| e.mapping.paths().iter().map(|p| p.as_str().to_string())),
        );
        exact
    }
}

impl std::fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlerRegistry")
            .field("paths", &self.paths())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::server::{Context, Response};

    fn request(method: &str, uri: &str) -> Request {
        Request::from(
            http::Request::builder()
                .method(method)
                .uri(uri)
                .body(Vec::new())
                .unwrap(),
        )
    }

    fn tagged(tag: &'static str) -> impl RequestHandler {
        move |_: &mut Request, res: &mut Response, _: &Context| res.set_body(tag)
    }

    fn invoke(resolution: &Resolution, req: &mut Request) -> Vec<u8> {
        let mut res = Response::new();
        resolution
            .handler
            .handle(req, &mut res, &Context::detached())
            .unwrap();
        res.body_bytes().to_vec()
    }

    #[test]
    fn test_exact_lookup_is_normalized() {
        let mut registry = HandlerRegistry::new();
        registry.register("/status/", tagged("status"));
        let mut req = request("GET", "//status");
        let r = registry.resolve(&req).unwrap().unwrap();
        assert_eq!(r.resolved_by, ResolvedBy::Exact);
        assert_eq!(invoke(&r, &mut req), b"status");
    }

    #[test]
    fn test_later_exact_registration_overwrites() {
        let mut registry = HandlerRegistry::new();
        registry.register("/a", tagged("first"));
        registry.register("/a", tagged("second"));
        assert_eq!(registry.len(), 1);
        let mut req = request("GET", "/a");
        let r = registry.resolve(&req).unwrap().unwrap();
        assert_eq!(invoke(&r, &mut req), b"second");
    }

    #[test]
    fn test_miss_is_none() {
        let registry = HandlerRegistry::new();
        assert!(registry.resolve(&request("GET", "/nothing")).unwrap().is_none());
        assert!(registry.is_empty());
    }

    #[test]
    fn test_most_specific_mapping_wins() {
        let mut registry = HandlerRegistry::new();
        registry.register_mapping(Mapping::path("/user/{id}").unwrap(), tagged("by-id"));
        registry.register_mapping(Mapping::path("/user/profile").unwrap(), tagged("profile"));

        let mut req = request("GET", "/user/profile");
        let r = registry.resolve(&req).unwrap().unwrap();
        assert_eq!(r.pattern, "/user/profile");
        assert_eq!(invoke(&r, &mut req), b"profile");

        let mut req = request("GET", "/user/7");
        let r = registry.resolve(&req).unwrap().unwrap();
        assert_eq!(r.params[0].1, "7");
        assert_eq!(invoke(&r, &mut req), b"by-id");
    }

    #[test]
    fn test_first_registered_wins_ties() {
        let mut registry = HandlerRegistry::new();
        registry.register_mapping(Mapping::path("/x/{a}").unwrap(), tagged("first"));
        registry.register_mapping(Mapping::path("/x/{b}").unwrap(), tagged("second"));
        let mut req = request("GET", "/x/1");
        let r = registry.resolve(&req).unwrap().unwrap();
        assert_eq!(invoke(&r, &mut req), b"first");
    }

    #[test]
    fn test_exact_shadows_mapping() {
        let mut registry = HandlerRegistry::new();
        registry.register_mapping(Mapping::path("/items/{id}").unwrap(), tagged("mapping"));
        registry.register("/items/special", tagged("exact"));
        let mut req = request("GET", "/items/special");
        let r = registry.resolve(&req).unwrap().unwrap();
        assert_eq!(r.resolved_by, ResolvedBy::Exact);
        assert_eq!(invoke(&r, &mut req), b"exact");
    }

    #[test]
    fn test_method_rejections_merge_allowed() {
        let mut registry = HandlerRegistry::new();
        registry.register_mapping(
            Mapping::builder().path("/orders").method(Method::POST).build().unwrap(),
            tagged("create"),
        );
        registry.register_mapping(
            Mapping::builder().path("/orders").method(Method::PUT).build().unwrap(),
            tagged("replace"),
        );
        match registry.resolve(&request("DELETE", "/orders")) {
            Err(Error::MethodNotSupported { method, allowed }) => {
                assert_eq!(method, Method::DELETE);
                assert_eq!(allowed, vec![Method::POST, Method::PUT]);
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn test_furthest_rejection_reported() {
        let mut registry = HandlerRegistry::new();
        registry.register_mapping(
            Mapping::builder().path("/search").method(Method::POST).build().unwrap(),
            tagged("post"),
        );
        registry.register_mapping(
            Mapping::builder().path("/search").method(Method::GET).param("q").build().unwrap(),
            tagged("get"),
        );
        assert!(matches!(
            registry.resolve(&request("GET", "/search")),
            Err(Error::ParamValidation(_))
        ));
    }

    #[test]
    fn test_adapter_registration() {
        struct Pets;
        impl HandlerAdapter for Pets {
            fn mappings(&self) -> Result<Vec<(Mapping, Arc<dyn RequestHandler>)>> {
                let list: Arc<dyn RequestHandler> = Arc::new(tagged("list"));
                let get: Arc<dyn RequestHandler> = Arc::new(tagged("get"));
                Ok(vec![
                    (Mapping::path("/pets")?, list),
                    (Mapping::path("/pets/{id}")?, get),
                ])
            }
        }
        let mut registry = HandlerRegistry::new();
        registry.register_adapter(&Pets).unwrap();
        assert_eq!(registry.len(), 2);
        assert_eq!(registry.paths(), vec!["/pets".to_string(), "/pets/{id}".to_string()]);
    }
}
