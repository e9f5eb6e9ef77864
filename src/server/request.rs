use std::any::Any;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

use http::header::{ACCEPT, CONNECTION, CONTENT_TYPE, COOKIE};
use http::{HeaderMap, Method, Uri, Version};
use serde::de::DeserializeOwned;
use smallvec::SmallVec;

use super::cookie::parse_cookie_header;
use crate::error::{Error, ParamLocation, Result};
use crate::router::ParamVec;
use crate::session::{Session, SessionManager};

/// Maximum number of query/form parameters before heap allocation
pub const MAX_INLINE_QUERY: usize = 8;

/// Stack-allocated storage for query and form parameters.
///
/// Names repeat (`?tag=a&tag=b`), so this is a list rather than a map.
pub type QueryVec = SmallVec<[(String, String); MAX_INLINE_QUERY]>;

/// Well-known keys of the request [`Attributes`] bag
pub mod attr {
    /// `String`: path template of the mapping rule that resolved the request
    pub const MATCHED_PATTERN: &str = "portico.matched_pattern";
    /// `&'static str`: which stage produced the handler (`exact`, `mapping`, `website`)
    pub const RESOLVED_BY: &str = "portico.resolved_by";
}

/// Request-scoped attribute bag.
///
/// Values are typed; a lookup with the wrong type behaves like a miss.
#[derive(Default)]
pub struct Attributes {
    map: HashMap<String, Box<dyn Any + Send + Sync>>,
}

impl Attributes {
    pub fn insert<T: Any + Send + Sync>(&mut self, key: impl Into<String>, value: T) {
        self.map.insert(key.into(), Box::new(value));
    }

    pub fn get<T: Any>(&self, key: &str) -> Option<&T> {
        self.map.get(key).and_then(|v| v.downcast_ref::<T>())
    }

    pub fn remove(&mut self, key: &str) -> bool {
        self.map.remove(key).is_some()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.map.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

impl fmt::Debug for Attributes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.map.keys()).finish()
    }
}

/// Host-agnostic view of one HTTP request.
///
/// Built by a protocol service from whatever its wire engine produced; the
/// dispatcher and handlers only ever see this type. Query string, cookies and
/// url-encoded form bodies are decoded once at construction.
pub struct Request {
    method: Method,
    uri: Uri,
    version: Version,
    headers: HeaderMap,
    body: Vec<u8>,
    path: String,
    query: QueryVec,
    form: QueryVec,
    cookies: Vec<(String, String)>,
    path_params: ParamVec,
    attributes: Attributes,
    session_manager: Option<Arc<dyn SessionManager>>,
    session: Option<Arc<Session>>,
    session_created: bool,
}

impl Request {
    #[must_use]
    pub fn new(method: Method, uri: Uri, version: Version, headers: HeaderMap, body: Vec<u8>) -> Self {
        let path = normalize_path(uri.path());
        let query: QueryVec = uri
            .query()
            .map(|q| {
                url::form_urlencoded::parse(q.as_bytes())
                    .map(|(k, v)| (k.into_owned(), v.into_owned()))
                    .collect()
            })
            .unwrap_or_default();
        let cookies = headers
            .get_all(COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .flat_map(parse_cookie_header)
            .collect();
        let is_form = headers
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(media_essence)
            .is_some_and(|ct| ct == "application/x-www-form-urlencoded");
        let form: QueryVec = if is_form {
            url::form_urlencoded::parse(&body)
                .map(|(k, v)| (k.into_owned(), v.into_owned()))
                .collect()
        } else {
            QueryVec::new()
        };

        Self {
            method,
            uri,
            version,
            headers,
            body,
            path,
            query,
            form,
            cookies,
            path_params: ParamVec::new(),
            attributes: Attributes::default(),
            session_manager: None,
            session: None,
            session_created: false,
        }
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn uri(&self) -> &Uri {
        &self.uri
    }

    pub fn version(&self) -> Version {
        self.version
    }

    /// Normalized path: percent-decoded, `.`/`..` resolved, duplicate and
    /// trailing slashes removed. Always starts with `/`.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Path exactly as it appeared on the request line
    pub fn raw_path(&self) -> &str {
        self.uri.path()
    }

    /// Raw query string without the leading `?`
    pub fn query(&self) -> Option<&str> {
        self.uri.query()
    }

    /// First value of a query parameter
    pub fn query_param(&self, name: &str) -> Option<&str> {
        self.query
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    /// All values of a query parameter, in order of appearance
    pub fn query_params(&self, name: &str) -> Vec<&str> {
        self.query
            .iter()
            .filter(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
            .collect()
    }

    /// Query parameter, falling back to the url-encoded form body
    pub fn param(&self, name: &str) -> Option<&str> {
        self.query_param(name).or_else(|| {
            self.form
                .iter()
                .find(|(k, _)| k == name)
                .map(|(_, v)| v.as_str())
        })
    }

    /// Every query and form parameter name, once each, in first-seen order
    pub fn param_names(&self) -> Vec<&str> {
        let mut seen = HashSet::new();
        self.query
            .iter()
            .chain(self.form.iter())
            .map(|(k, _)| k.as_str())
            .filter(|k| seen.insert(*k))
            .collect()
    }

    /// Like [`param`](Self::param) but missing is an error
    pub fn required_param(&self, name: &str) -> Result<&str> {
        self.param(name)
            .ok_or_else(|| Error::missing(ParamLocation::Query, name))
    }

    /// First value of a header (case-insensitive); non-UTF-8 values are skipped
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    pub fn header_values(&self, name: &str) -> Vec<&str> {
        self.headers
            .get_all(name)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .collect()
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn cookie(&self, name: &str) -> Option<&str> {
        self.cookies
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn cookies(&self) -> &[(String, String)] {
        &self.cookies
    }

    /// Full `Content-Type` header value
    pub fn content_type(&self) -> Option<&str> {
        self.header(CONTENT_TYPE.as_str())
    }

    /// Lower-cased media type of the body without parameters
    pub fn media_type(&self) -> Option<String> {
        self.content_type().map(media_essence)
    }

    /// Media ranges from `Accept`, parameters stripped; ranges with `q=0` are excluded.
    pub fn accepts(&self) -> Vec<String> {
        self.header_values(ACCEPT.as_str())
            .into_iter()
            .flat_map(|v| v.split(','))
            .filter(|range| {
                !range.split(';').skip(1).any(|p| {
                    let p = p.trim();
                    p == "q=0" || p == "q=0.0" || p == "q=0.00" || p == "q=0.000"
                })
            })
            .map(media_essence)
            .filter(|r| !r.is_empty())
            .collect()
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    pub fn body_string(&self) -> Result<String> {
        String::from_utf8(self.body.clone()).map_err(|e| Error::InvalidBody(e.to_string()))
    }

    /// Deserialize the JSON body
    pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
        if self.body.is_empty() {
            return Err(Error::missing(ParamLocation::Body, "body"));
        }
        serde_json::from_slice(&self.body).map_err(|e| Error::InvalidBody(e.to_string()))
    }

    /// Path variable captured by the mapping rule that resolved this request.
    ///
    /// Last write wins when a template repeats a name.
    pub fn path_param(&self, name: &str) -> Option<&str> {
        self.path_params
            .iter()
            .rfind(|(k, _)| k.as_ref() == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn path_params(&self) -> &ParamVec {
        &self.path_params
    }

    pub(crate) fn set_path_params(&mut self, params: ParamVec) {
        self.path_params = params;
    }

    pub fn attributes(&self) -> &Attributes {
        &self.attributes
    }

    pub fn attributes_mut(&mut self) -> &mut Attributes {
        &mut self.attributes
    }

    /// Whether the client asked for the connection to stay open
    pub fn is_keep_alive(&self) -> bool {
        let connection = self
            .header_values(CONNECTION.as_str())
            .into_iter()
            .flat_map(|v| v.split(','))
            .map(|t| t.trim().to_ascii_lowercase())
            .collect::<Vec<_>>();
        match self.version {
            Version::HTTP_10 | Version::HTTP_09 => connection.iter().any(|t| t == "keep-alive"),
            _ => !connection.iter().any(|t| t == "close"),
        }
    }

    pub(crate) fn set_session_manager(&mut self, manager: Arc<dyn SessionManager>) {
        self.session_manager = Some(manager);
    }

    /// Current session if the client presented a live session cookie
    /// (or one was created earlier in this exchange).
    pub fn session(&mut self) -> Option<Arc<Session>> {
        if let Some(session) = &self.session {
            if session.is_valid() {
                return Some(Arc::clone(session));
            }
        }
        let manager = self.session_manager.as_ref()?;
        let id = self.cookie(manager.cookie_name())?;
        let session = manager.find(id)?;
        self.session = Some(Arc::clone(&session));
        Some(session)
    }

    /// Current session, created on demand. `None` only when no session
    /// manager is configured.
    pub fn valid_session(&mut self) -> Option<Arc<Session>> {
        if let Some(session) = self.session() {
            return Some(session);
        }
        let session = self.session_manager.as_ref()?.create();
        self.session = Some(Arc::clone(&session));
        self.session_created = true;
        Some(session)
    }

    /// Session created during this exchange, which the client does not know about yet
    pub(crate) fn created_session(&self) -> Option<(&str, &Arc<Session>)> {
        if !self.session_created {
            return None;
        }
        let manager = self.session_manager.as_ref()?;
        let session = self.session.as_ref()?;
        Some((manager.cookie_name(), session))
    }
}

impl From<http::Request<Vec<u8>>> for Request {
    fn from(req: http::Request<Vec<u8>>) -> Self {
        let (parts, body) = req.into_parts();
        Request::new(parts.method, parts.uri, parts.version, parts.headers, body)
    }
}

impl fmt::Debug for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Request")
            .field("method", &self.method)
            .field("path", &self.path)
            .field("query", &self.query)
            .field("path_params", &self.path_params)
            .field("body_len", &self.body.len())
            .field("attributes", &self.attributes)
            .finish_non_exhaustive()
    }
}

/// Lower-cased `type/subtype` of a media type or range
pub(crate) fn media_essence(value: &str) -> String {
    value
        .split(';')
        .next()
        .unwrap_or("")
        .trim()
        .to_ascii_lowercase()
}

/// Normalize a request path for registry lookup.
///
/// Segments are percent-decoded individually, so an encoded `%2F` cannot be
/// used to smuggle an extra segment. `..` never climbs above the root.
pub fn normalize_path(raw: &str) -> String {
    let mut segments: Vec<String> = Vec::new();
    for segment in raw.split('/') {
        let decoded = urlencoding::decode(segment)
            .map(|s| s.into_owned())
            .unwrap_or_else(|_| segment.to_string());
        match decoded.as_str() {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            _ => segments.push(decoded.replace('/', "%2F")),
        }
    }
    if segments.is_empty() {
        return "/".to_string();
    }
    let mut path = String::with_capacity(raw.len());
    for segment in &segments {
        path.push('/');
        path.push_str(segment);
    }
    path
}
