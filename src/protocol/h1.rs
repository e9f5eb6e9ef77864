use std::io::ErrorKind;
use std::sync::Arc;

use http::header::{HeaderName, HeaderValue, CONNECTION, CONTENT_LENGTH, EXPECT, TRANSFER_ENCODING};
use http::{HeaderMap, Method, StatusCode, Uri, Version};
use tracing::debug;

use super::{HttpConnection, HttpHandler, ProtocolError, ProtocolService};
use crate::config::ServerConfig;
use crate::server::{Context, Request, RequestId, Response};

/// Maximum number of request headers parsed
pub const MAX_HEADERS: usize = 64;

const CONTINUE: &[u8] = b"HTTP/1.1 100 Continue\r\n\r\n";

/// Limits and keep-alive policy of [`H1Service`]
#[derive(Debug, Clone)]
pub struct H1Config {
    pub max_header_bytes: usize,
    pub max_body_bytes: usize,
    pub keep_alive: bool,
}

impl Default for H1Config {
    fn default() -> Self {
        Self {
            max_header_bytes: 64 * 1024,
            max_body_bytes: 10 * 1024 * 1024,
            keep_alive: true,
        }
    }
}

impl From<&ServerConfig> for H1Config {
    fn from(config: &ServerConfig) -> Self {
        Self {
            max_header_bytes: config.max_header_bytes,
            max_body_bytes: config.max_body_bytes,
            keep_alive: config.keep_alive,
        }
    }
}

struct Head {
    method: Method,
    uri: Uri,
    version: Version,
    headers: HeaderMap,
}

/// Blocking HTTP/1.1 protocol service.
///
/// Parses the request head with `httparse`, reads `Content-Length` or
/// chunked bodies, answers `Expect: 100-continue`, and always frames the
/// response with `Content-Length`. Bytes of a pipelined next request stay in
/// the connection buffer for the following call.
pub struct H1Service {
    handler: Arc<dyn HttpHandler>,
    config: H1Config,
}

impl H1Service {
    pub fn new(handler: Arc<dyn HttpHandler>, config: H1Config) -> Self {
        Self { handler, config }
    }

    pub fn config(&self) -> &H1Config {
        &self.config
    }

    fn read_request(
        &self,
        conn: &mut HttpConnection,
    ) -> Result<Option<(Request, Context)>, ProtocolError> {
        let Some(head) = self.read_head(conn)? else {
            return Ok(None);
        };
        let body = self.read_body(conn, &head)?;
        let ctx = Context::new(
            RequestId::from_header_or_new(
                head.headers
                    .get("x-request-id")
                    .and_then(|v| v.to_str().ok()),
            ),
            conn.peer_addr(),
            conn.local_addr(),
        );
        let req = Request::new(head.method, head.uri, head.version, head.headers, body);
        Ok(Some((req, ctx)))
    }

    /// `Ok(None)` when the peer closed (or idled out) between requests
    fn read_head(&self, conn: &mut HttpConnection) -> Result<Option<Head>, ProtocolError> {
        loop {
            if !conn.buffered().is_empty() {
                let mut headers = [httparse::EMPTY_HEADER; MAX_HEADERS];
                let mut parsed = httparse::Request::new(&mut headers);
                match parsed.parse(conn.buffered())? {
                    httparse::Status::Complete(len) => {
                        if len > self.config.max_header_bytes {
                            return Err(ProtocolError::HeadersTooLarge);
                        }
                        let head = build_head(&parsed)?;
                        conn.consume(len);
                        return Ok(Some(head));
                    }
                    httparse::Status::Partial => {
                        if conn.buffered().len() > self.config.max_header_bytes {
                            return Err(ProtocolError::HeadersTooLarge);
                        }
                    }
                }
            }

            match conn.fill() {
                Ok(0) if conn.buffered().is_empty() => return Ok(None),
                Ok(0) => return Err(ProtocolError::UnexpectedEof),
                Ok(_) => {}
                Err(e)
                    if conn.buffered().is_empty()
                        && matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) =>
                {
                    debug!(peer_addr = ?conn.peer_addr(), "Idle connection timed out");
                    return Ok(None);
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    fn read_body(&self, conn: &mut HttpConnection, head: &Head) -> Result<Vec<u8>, ProtocolError> {
        let chunked = head
            .headers
            .get_all(TRANSFER_ENCODING)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .flat_map(|v| v.split(','))
            .any(|t| t.trim().eq_ignore_ascii_case("chunked"));
        if chunked {
            self.send_continue(conn, head)?;
            return self.read_chunked(conn);
        }

        let len = match head.headers.get(CONTENT_LENGTH) {
            None => 0,
            Some(v) => v
                .to_str()
                .ok()
                .and_then(|s| s.trim().parse::<usize>().ok())
                .ok_or_else(|| ProtocolError::InvalidRequest("invalid Content-Length".into()))?,
        };
        if len > self.config.max_body_bytes {
            return Err(ProtocolError::BodyTooLarge {
                limit: self.config.max_body_bytes,
            });
        }
        if len == 0 {
            return Ok(Vec::new());
        }
        self.send_continue(conn, head)?;
        ensure(conn, len)?;
        Ok(conn.take(len))
    }

    fn send_continue(&self, conn: &mut HttpConnection, head: &Head) -> Result<(), ProtocolError> {
        let expects_continue = head
            .headers
            .get(EXPECT)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| v.trim().eq_ignore_ascii_case("100-continue"));
        if expects_continue && head.version == Version::HTTP_11 && conn.buffered().is_empty() {
            conn.write_all(CONTINUE)?;
        }
        Ok(())
    }

    fn read_chunked(&self, conn: &mut HttpConnection) -> Result<Vec<u8>, ProtocolError> {
        let mut body = Vec::new();
        loop {
            let line_end = self.find_crlf(conn)?;
            let size = {
                let line = std::str::from_utf8(&conn.buffered()[..line_end])
                    .map_err(|_| ProtocolError::InvalidChunk)?;
                let digits = line.split(';').next().unwrap_or("").trim();
                usize::from_str_radix(digits, 16).map_err(|_| ProtocolError::InvalidChunk)?
            };
            conn.consume(line_end + 2);

            if size == 0 {
                // trailers, terminated by an empty line
                loop {
                    let end = self.find_crlf(conn)?;
                    conn.consume(end + 2);
                    if end == 0 {
                        return Ok(body);
                    }
                }
            }

            if body.len().saturating_add(size) > self.config.max_body_bytes {
                return Err(ProtocolError::BodyTooLarge {
                    limit: self.config.max_body_bytes,
                });
            }
            ensure(conn, size + 2)?;
            if &conn.buffered()[size..size + 2] != b"\r\n" {
                return Err(ProtocolError::InvalidChunk);
            }
            body.extend_from_slice(&conn.buffered()[..size]);
            conn.consume(size + 2);
        }
    }

    fn find_crlf(&self, conn: &mut HttpConnection) -> Result<usize, ProtocolError> {
        loop {
            if let Some(pos) = conn.buffered().windows(2).position(|w| w == b"\r\n") {
                return Ok(pos);
            }
            if conn.buffered().len() > self.config.max_header_bytes {
                return Err(ProtocolError::InvalidChunk);
            }
            if conn.fill()? == 0 {
                return Err(ProtocolError::UnexpectedEof);
            }
        }
    }

    /// Answer a wire-level failure (when it has a status) and close
    fn reject(&self, conn: &mut HttpConnection, err: &ProtocolError) {
        if let Some(status) = err.status() {
            let head = format!(
                "HTTP/1.1 {} {}\r\ncontent-length: 0\r\nconnection: close\r\n\r\n",
                status.as_u16(),
                status.canonical_reason().unwrap_or("")
            );
            if let Err(e) = conn.write_all(head.as_bytes()) {
                debug!(error = %e, "Failed to write protocol error response");
            }
        }
        debug!(peer_addr = ?conn.peer_addr(), error = %err, "Rejected request at protocol level");
        conn.close();
    }
}

impl ProtocolService for H1Service {
    fn handle_request(&self, conn: &mut HttpConnection) -> Result<(), ProtocolError> {
        let (mut req, ctx) = match self.read_request(conn) {
            Ok(Some(exchange)) => exchange,
            Ok(None) => {
                conn.close();
                return Ok(());
            }
            Err(err) => {
                self.reject(conn, &err);
                return Err(err);
            }
        };

        let mut res = Response::new();
        self.handler.handle(&mut req, &mut res, &ctx);

        let keep_alive = self.config.keep_alive && req.is_keep_alive() && !wants_close(&res);
        let bytes = serialize_response(req.method(), req.version(), &res, keep_alive);
        conn.write_all(&bytes)?;
        if !keep_alive {
            conn.close();
        }
        Ok(())
    }
}

fn build_head(parsed: &httparse::Request<'_, '_>) -> Result<Head, ProtocolError> {
    let method = parsed
        .method
        .ok_or_else(|| ProtocolError::InvalidRequest("missing method".into()))
        .and_then(|m| {
            Method::from_bytes(m.as_bytes())
                .map_err(|_| ProtocolError::InvalidRequest(format!("invalid method {m}")))
        })?;
    let uri = parsed
        .path
        .ok_or_else(|| ProtocolError::InvalidRequest("missing request target".into()))
        .and_then(|p| {
            p.parse::<Uri>()
                .map_err(|e| ProtocolError::InvalidRequest(format!("invalid request target: {e}")))
        })?;
    let version = match parsed.version {
        Some(0) => Version::HTTP_10,
        _ => Version::HTTP_11,
    };
    let mut headers = HeaderMap::with_capacity(parsed.headers.len());
    for h in parsed.headers.iter() {
        let name = HeaderName::from_bytes(h.name.as_bytes())
            .map_err(|_| ProtocolError::InvalidRequest(format!("invalid header name {}", h.name)))?;
        let value = HeaderValue::from_bytes(h.value)
            .map_err(|_| ProtocolError::InvalidRequest(format!("invalid value for header {}", h.name)))?;
        headers.append(name, value);
    }
    Ok(Head {
        method,
        uri,
        version,
        headers,
    })
}

fn wants_close(res: &Response) -> bool {
    res.headers()
        .get_all(CONNECTION)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .any(|t| t.trim().eq_ignore_ascii_case("close"))
}

/// Status line, headers and body of a response.
///
/// Framing headers set by handlers are replaced. `HEAD` responses keep the
/// `Content-Length` of the representation but send no body; 1xx, 204 and
/// 304 carry neither.
pub(crate) fn serialize_response(
    method: &Method,
    version: Version,
    res: &Response,
    keep_alive: bool,
) -> Vec<u8> {
    let status = res.status();
    let body = res.body_bytes();
    let mut out = Vec::with_capacity(256 + body.len());

    let version_str = if version == Version::HTTP_10 {
        "HTTP/1.0"
    } else {
        "HTTP/1.1"
    };
    out.extend_from_slice(
        format!(
            "{version_str} {} {}\r\n",
            status.as_u16(),
            status.canonical_reason().unwrap_or("")
        )
        .as_bytes(),
    );

    for (name, value) in res.headers() {
        if name == CONTENT_LENGTH || name == TRANSFER_ENCODING || name == CONNECTION {
            continue;
        }
        out.extend_from_slice(name.as_str().as_bytes());
        out.extend_from_slice(b": ");
        out.extend_from_slice(value.as_bytes());
        out.extend_from_slice(b"\r\n");
    }

    let bodiless_status = status.is_informational()
        || status == StatusCode::NO_CONTENT
        || status == StatusCode::NOT_MODIFIED;
    if !bodiless_status {
        out.extend_from_slice(format!("content-length: {}\r\n", body.len()).as_bytes());
    }
    if !keep_alive {
        out.extend_from_slice(b"connection: close\r\n");
    } else if version == Version::HTTP_10 {
        out.extend_from_slice(b"connection: keep-alive\r\n");
    }
    out.extend_from_slice(b"\r\n");

    if !bodiless_status && *method != Method::HEAD {
        out.extend_from_slice(body);
    }
    out
}

fn ensure(conn: &mut HttpConnection, n: usize) -> Result<(), ProtocolError> {
    while conn.buffered().len() < n {
        if conn.fill()? == 0 {
            return Err(ProtocolError::UnexpectedEof);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text(bytes: Vec<u8>) -> String {
        String::from_utf8(bytes).unwrap()
    }

    #[test]
    fn test_serialize_sets_content_length() {
        let mut res = Response::new();
        res.set_body("hello").unwrap();
        let out = text(serialize_response(&Method::GET, Version::HTTP_11, &res, true));
        assert!(out.starts_with("HTTP/1.1 200 OK\r\n"));
        assert!(out.contains("content-length: 5\r\n"));
        assert!(!out.contains("connection:"));
        assert!(out.ends_with("\r\n\r\nhello"));
    }

    #[test]
    fn test_serialize_head_omits_body() {
        let mut res = Response::new();
        res.set_body("hello").unwrap();
        let out = text(serialize_response(&Method::HEAD, Version::HTTP_11, &res, true));
        assert!(out.contains("content-length: 5\r\n"));
        assert!(out.ends_with("\r\n\r\n"));
    }

    #[test]
    fn test_serialize_no_content() {
        let mut res = Response::new();
        res.set_status(StatusCode::NO_CONTENT);
        let out = text(serialize_response(&Method::DELETE, Version::HTTP_11, &res, false));
        assert!(out.starts_with("HTTP/1.1 204 No Content\r\n"));
        assert!(!out.contains("content-length"));
        assert!(out.contains("connection: close\r\n"));
    }

    #[test]
    fn test_serialize_replaces_framing_headers() {
        let mut res = Response::new();
        res.set_header("Content-Length", "999");
        res.set_header("X-Custom", "yes");
        let out = text(serialize_response(&Method::GET, Version::HTTP_10, &res, true));
        assert!(out.starts_with("HTTP/1.0 200 OK\r\n"));
        assert!(out.contains("content-length: 0\r\n"));
        assert!(!out.contains("999"));
        assert!(out.contains("x-custom: yes\r\n"));
        assert!(out.contains("connection: keep-alive\r\n"));
    }

    #[test]
    fn test_protocol_error_statuses() {
        assert_eq!(
            ProtocolError::HeadersTooLarge.status(),
            Some(StatusCode::REQUEST_HEADER_FIELDS_TOO_LARGE)
        );
        assert_eq!(
            ProtocolError::BodyTooLarge { limit: 1 }.status(),
            Some(StatusCode::PAYLOAD_TOO_LARGE)
        );
        assert_eq!(ProtocolError::InvalidChunk.status(), Some(StatusCode::BAD_REQUEST));
        assert_eq!(ProtocolError::UnexpectedEof.status(), None);
    }
}
