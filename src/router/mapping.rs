use std::fmt;

use http::Method;

use super::template::{PathTemplate, Specificity};
use super::{method_allowed, ParamVec};
use crate::error::{Error, Result};
use crate::server::media_essence;
use crate::server::Request;

/// Key/value predicate on query parameters or headers.
///
/// Parsed from `key`, `!key`, `key=value` or `key!=value`. A `key!=value`
/// condition is satisfied when the key is absent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Condition {
    Present(String),
    Absent(String),
    Equals(String, String),
    NotEquals(String, String),
}

impl Condition {
    pub fn parse(expr: &str) -> Result<Self> {
        let expr = expr.trim();
        let cond = if let Some((k, v)) = expr.split_once("!=") {
            Condition::NotEquals(k.trim().to_string(), v.trim().to_string())
        } else if let Some((k, v)) = expr.split_once('=') {
            Condition::Equals(k.trim().to_string(), v.trim().to_string())
        } else if let Some(k) = expr.strip_prefix('!') {
            Condition::Absent(k.trim().to_string())
        } else {
            Condition::Present(expr.to_string())
        };
        if cond.key().is_empty() {
            return Err(Error::InvalidMapping(format!("empty condition key in '{expr}'")));
        }
        Ok(cond)
    }

    pub fn key(&self) -> &str {
        match self {
            Condition::Present(k)
            | Condition::Absent(k)
            | Condition::Equals(k, _)
            | Condition::NotEquals(k, _) => k,
        }
    }

    /// Evaluate against a value lookup
    pub fn check<'a>(&self, lookup: impl Fn(&str) -> Option<&'a str>) -> bool {
        match self {
            Condition::Present(k) => lookup(k).is_some(),
            Condition::Absent(k) => lookup(k).is_none(),
            Condition::Equals(k, v) => lookup(k) == Some(v.as_str()),
            Condition::NotEquals(k, v) => lookup(k) != Some(v.as_str()),
        }
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Condition::Present(k) => write!(f, "{k}"),
            Condition::Absent(k) => write!(f, "!{k}"),
            Condition::Equals(k, v) => write!(f, "{k}={v}"),
            Condition::NotEquals(k, v) => write!(f, "{k}!={v}"),
        }
    }
}

/// Media type rule for `consumes`/`produces`, optionally negated (`!text/plain`)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaRule {
    media: String,
    negated: bool,
}

impl MediaRule {
    pub fn parse(expr: &str) -> Result<Self> {
        let expr = expr.trim();
        let (negated, media) = match expr.strip_prefix('!') {
            Some(rest) => (true, rest),
            None => (false, expr),
        };
        let media = media_essence(media);
        if media.is_empty() || !media.contains('/') {
            return Err(Error::InvalidMapping(format!("invalid media type '{expr}'")));
        }
        Ok(Self { media, negated })
    }

    pub fn media(&self) -> &str {
        &self.media
    }

    pub fn is_negated(&self) -> bool {
        self.negated
    }
}

/// Whether two media types/ranges overlap, honouring `*` on either side
pub(crate) fn media_compatible(a: &str, b: &str) -> bool {
    let (a_type, a_sub) = a.split_once('/').unwrap_or((a, "*"));
    let (b_type, b_sub) = b.split_once('/').unwrap_or((b, "*"));
    let type_ok = a_type == "*" || b_type == "*" || a_type == b_type;
    let sub_ok = a_sub == "*" || b_sub == "*" || a_sub == b_sub;
    type_ok && sub_ok
}

/// Stage at which a request was rejected by a mapping; later stages mean the
/// request got closer to matching.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub(crate) enum Stage {
    Method,
    Params,
    Headers,
    Consumes,
    Produces,
}

/// Outcome of evaluating one mapping against a request
#[derive(Debug)]
pub(crate) enum Evaluation {
    /// No path template matched
    NoPath,
    /// Path matched but a later condition failed
    Rejected(Stage, Error),
    /// Everything matched
    Matched {
        pattern: String,
        specificity: Specificity,
        params: ParamVec,
    },
}

/// Structured mapping rule: path templates, methods, parameter and header
/// conditions, consumable and producible media types.
///
/// ```rust
/// use http::Method;
/// use portico::router::Mapping;
///
/// let mapping = Mapping::builder()
///     .path("/users/{id}")
///     .method(Method::GET)
///     .param("!debug")
///     .produces("application/json")
///     .build()
///     .unwrap();
/// assert_eq!(mapping.paths()[0].as_str(), "/users/{id}");
/// ```
#[derive(Clone)]
pub struct Mapping {
    paths: Vec<PathTemplate>,
    methods: Vec<Method>,
    params: Vec<Condition>,
    headers: Vec<Condition>,
    consumes: Vec<MediaRule>,
    produces: Vec<MediaRule>,
}

impl Mapping {
    pub fn builder() -> MappingBuilder {
        MappingBuilder::default()
    }

    /// Mapping on a single path accepting any method
    pub fn path(path: &str) -> Result<Self> {
        Self::builder().path(path).build()
    }

    pub fn paths(&self) -> &[PathTemplate] {
        &self.paths
    }

    /// Allowed methods; empty means any
    pub fn methods(&self) -> &[Method] {
        &self.methods
    }

    pub fn params(&self) -> &[Condition] {
        &self.params
    }

    pub fn headers(&self) -> &[Condition] {
        &self.headers
    }

    pub fn consumes(&self) -> &[MediaRule] {
        &self.consumes
    }

    pub fn produces(&self) -> &[MediaRule] {
        &self.produces
    }

    /// Evaluate in order: path, method, params, headers, consumes, produces
    pub(crate) fn evaluate(&self, req: &Request) -> Evaluation {
        let best = self
            .paths
            .iter()
            .filter_map(|t| t.matches(req.path()).map(|params| (t, params)))
            .max_by_key(|(t, _)| t.specificity());
        let Some((template, params)) = best else {
            return Evaluation::NoPath;
        };

        if !method_allowed(&self.methods, req.method()) {
            return Evaluation::Rejected(
                Stage::Method,
                Error::MethodNotSupported {
                    method: req.method().clone(),
                    allowed: self.methods.clone(),
                },
            );
        }

        if let Some(failed) = self.params.iter().find(|c| !c.check(|k| req.param(k))) {
            return Evaluation::Rejected(Stage::Params, Error::ParamValidation(failed.to_string()));
        }

        if let Some(failed) = self.headers.iter().find(|c| !c.check(|k| req.header(k))) {
            return Evaluation::Rejected(
                Stage::Headers,
                Error::HeaderValidation(failed.to_string()),
            );
        }

        if !self.consumes.is_empty() {
            let content_type = req
                .media_type()
                .unwrap_or_else(|| "application/octet-stream".to_string());
            if !self.accepts_content(&content_type) {
                return Evaluation::Rejected(
                    Stage::Consumes,
                    Error::UnsupportedMediaType { content_type },
                );
            }
        }

        if !self.produces.is_empty() {
            let accepts = req.accepts();
            if !accepts.is_empty() && !self.produces_any(&accepts) {
                return Evaluation::Rejected(
                    Stage::Produces,
                    Error::NotAcceptable {
                        accept: accepts.join(", "),
                    },
                );
            }
        }

        Evaluation::Matched {
            pattern: template.as_str().to_string(),
            specificity: template.specificity(),
            params,
        }
    }

    fn accepts_content(&self, content_type: &str) -> bool {
        if self
            .consumes
            .iter()
            .filter(|r| r.negated)
            .any(|r| media_compatible(&r.media, content_type))
        {
            return false;
        }
        let mut positives = self.consumes.iter().filter(|r| !r.negated).peekable();
        positives.peek().is_none() || positives.any(|r| media_compatible(&r.media, content_type))
    }

    fn produces_any(&self, accepts: &[String]) -> bool {
        let positives: Vec<&MediaRule> = self.produces.iter().filter(|r| !r.negated).collect();
        accepts.iter().any(|range| {
            let excluded = self
                .produces
                .iter()
                .filter(|r| r.negated)
                .any(|r| r.media == *range);
            !excluded
                && (positives.is_empty() || positives.iter().any(|r| media_compatible(&r.media, range)))
        })
    }
}

impl fmt::Debug for Mapping {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Mapping")
            .field("paths", &self.paths)
            .field("methods", &self.methods)
            .field("params", &self.params)
            .field("headers", &self.headers)
            .field("consumes", &self.consumes)
            .field("produces", &self.produces)
            .finish()
    }
}

/// Builder for [`Mapping`]; expressions are validated in [`build`](Self::build)
#[derive(Debug, Default, Clone)]
pub struct MappingBuilder {
    paths: Vec<String>,
    methods: Vec<Method>,
    params: Vec<String>,
    headers: Vec<String>,
    consumes: Vec<String>,
    produces: Vec<String>,
}

impl MappingBuilder {
    #[must_use]
    pub fn path(mut self, path: &str) -> Self {
        self.paths.push(path.to_string());
        self
    }

    #[must_use]
    pub fn method(mut self, method: Method) -> Self {
        if !self.methods.contains(&method) {
            self.methods.push(method);
        }
        self
    }

    #[must_use]
    pub fn methods<I: IntoIterator<Item = Method>>(mut self, methods: I) -> Self {
        for m in methods {
            self = self.method(m);
        }
        self
    }

    #[must_use]
    pub fn param(mut self, expr: &str) -> Self {
        self.params.push(expr.to_string());
        self
    }

    #[must_use]
    pub fn header(mut self, expr: &str) -> Self {
        self.headers.push(expr.to_string());
        self
    }

    #[must_use]
    pub fn consumes(mut self, media: &str) -> Self {
        self.consumes.push(media.to_string());
        self
    }

    #[must_use]
    pub fn produces(mut self, media: &str) -> Self {
        self.produces.push(media.to_string());
        self
    }

    pub fn build(self) -> Result<Mapping> {
        if self.paths.is_empty() {
            return Err(Error::InvalidMapping("mapping has no path".to_string()));
        }
        Ok(Mapping {
            paths: self
                .paths
                .iter()
                .map(|p| PathTemplate::parse(p))
                .collect::<Result<_>>()?,
            methods: self.methods,
            params: self
                .params
                .iter()
                .map(|c| Condition::parse(c))
                .collect::<Result<_>>()?,
            headers: self
                .headers
                .iter()
                .map(|c| Condition::parse(c))
                .collect::<Result<_>>()?,
            consumes: self
                .consumes
                .iter()
                .map(|m| MediaRule::parse(m))
                .collect::<Result<_>>()?,
            produces: self
                .produces
                .iter()
                .map(|m| MediaRule::parse(m))
                .collect::<Result<_>>()?,
        })
    }
}
