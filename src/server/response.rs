use http::header::{HeaderName, HeaderValue, CONTENT_TYPE, LOCATION, SET_COOKIE};
use http::{HeaderMap, StatusCode};
use serde::Serialize;
use tracing::warn;

use super::cookie::Cookie;
use crate::error::{Error, Result};

/// Body of a response together with its default media type
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseBody {
    bytes: Vec<u8>,
    content_type: Option<&'static str>,
}

impl ResponseBody {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            bytes: text.into().into_bytes(),
            content_type: Some("text/plain; charset=utf-8"),
        }
    }

    pub fn html(html: impl Into<String>) -> Self {
        Self {
            bytes: html.into().into_bytes(),
            content_type: Some("text/html; charset=utf-8"),
        }
    }

    /// Serialize a value as JSON
    pub fn json<T: Serialize + ?Sized>(value: &T) -> Result<Self> {
        let bytes = serde_json::to_vec(value).map_err(|e| Error::Other(e.into()))?;
        Ok(Self {
            bytes,
            content_type: Some("application/json"),
        })
    }

    /// Raw bytes with an explicit media type
    pub fn bytes(bytes: impl Into<Vec<u8>>, content_type: &'static str) -> Self {
        Self {
            bytes: bytes.into(),
            content_type: Some(content_type),
        }
    }

    pub fn empty() -> Self {
        Self {
            bytes: Vec::new(),
            content_type: None,
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

impl From<&str> for ResponseBody {
    fn from(s: &str) -> Self {
        ResponseBody::text(s)
    }
}

impl From<String> for ResponseBody {
    fn from(s: String) -> Self {
        ResponseBody::text(s)
    }
}

impl From<Vec<u8>> for ResponseBody {
    fn from(bytes: Vec<u8>) -> Self {
        ResponseBody::bytes(bytes, "application/octet-stream")
    }
}

/// Response being assembled for one exchange.
///
/// The body is write-once: handlers set it exactly one time, a second
/// [`set_body`](Self::set_body) fails with [`Error::BodyAlreadyWritten`].
/// Exception resolvers start over with [`reset_body`](Self::reset_body) or
/// [`reset`](Self::reset).
#[derive(Debug, Clone)]
pub struct Response {
    status: StatusCode,
    headers: HeaderMap,
    body: Option<ResponseBody>,
}

impl Default for Response {
    fn default() -> Self {
        Self::new()
    }
}

impl Response {
    #[must_use]
    pub fn new() -> Self {
        Self {
            status: StatusCode::OK,
            headers: HeaderMap::new(),
            body: None,
        }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn set_status(&mut self, status: StatusCode) {
        self.status = status;
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Replace every value of a header. Invalid names or values are dropped
    /// with a warning rather than failing the exchange.
    pub fn set_header(&mut self, name: &str, value: &str) {
        if let Some((name, value)) = header_pair(name, value) {
            self.headers.insert(name, value);
        }
    }

    /// Add a value without replacing existing ones
    pub fn append_header(&mut self, name: &str, value: &str) {
        if let Some((name, value)) = header_pair(name, value) {
            self.headers.append(name, value);
        }
    }

    pub fn remove_header(&mut self, name: &str) {
        self.headers.remove(name);
    }

    pub fn add_cookie(&mut self, cookie: Cookie) {
        self.append_header(SET_COOKIE.as_str(), &cookie.to_string());
    }

    /// Set the body once. The body's media type becomes `Content-Type`
    /// unless the handler already chose one.
    pub fn set_body(&mut self, body: impl Into<ResponseBody>) -> Result<()> {
        if self.body.is_some() {
            return Err(Error::BodyAlreadyWritten);
        }
        let body = body.into();
        if !self.headers.contains_key(CONTENT_TYPE) {
            if let Some(ct) = body.content_type {
                self.headers.insert(CONTENT_TYPE, HeaderValue::from_static(ct));
            }
        }
        self.body = Some(body);
        Ok(())
    }

    /// Serialize `value` as the JSON body
    pub fn set_json<T: Serialize + ?Sized>(&mut self, value: &T) -> Result<()> {
        self.set_body(ResponseBody::json(value)?)
    }

    pub fn has_body(&self) -> bool {
        self.body.is_some()
    }

    pub fn body(&self) -> Option<&ResponseBody> {
        self.body.as_ref()
    }

    pub fn body_bytes(&self) -> &[u8] {
        self.body.as_ref().map(ResponseBody::as_bytes).unwrap_or(&[])
    }

    /// Discard the body and its `Content-Type`, keeping status and other headers
    pub fn reset_body(&mut self) {
        self.body = None;
        self.headers.remove(CONTENT_TYPE);
    }

    /// Back to a fresh 200 with no headers and no body
    pub fn reset(&mut self) {
        self.status = StatusCode::OK;
        self.headers.clear();
        self.body = None;
    }

    /// `302 Found` to `location`
    pub fn redirect(&mut self, location: &str) {
        self.status = StatusCode::FOUND;
        self.set_header(LOCATION.as_str(), location);
    }
}

fn header_pair(name: &str, value: &str) -> Option<(HeaderName, HeaderValue)> {
    let parsed_name = match HeaderName::from_bytes(name.as_bytes()) {
        Ok(n) => n,
        Err(e) => {
            warn!(header = %name, error = %e, "Dropping response header with invalid name");
            return None;
        }
    };
    match HeaderValue::from_str(value) {
        Ok(v) => Some((parsed_name, v)),
        Err(e) => {
            warn!(header = %name, error = %e, "Dropping response header with invalid value");
            None
        }
    }
}
