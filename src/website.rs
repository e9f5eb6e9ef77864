//! Website fallback: a handler that claims requests by its own rule.
//!
//! The dispatcher asks the configured [`Website`] first. When
//! [`intercept`](Website::intercept) returns `true` the website handles the
//! exchange itself, subject to its [`allowed_methods`](Website::allowed_methods).
//! [`StaticWebsite`] serves a directory tree.

use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};

use http::Method;
use tracing::debug;

use crate::error::{Error, Result};
use crate::handler::RequestHandler;
use crate::registry::HandlerRegistry;
use crate::router::method_allowed;
use crate::server::{Context, Request, Response, ResponseBody};

pub trait Website: RequestHandler {
    /// Whether this website takes the request
    fn intercept(&self, req: &Request, ctx: &Context) -> bool;

    /// Contribute extra registry entries when the server is built
    fn on_register(&self, _registry: &mut HandlerRegistry) {}

    /// Methods accepted for intercepted requests
    fn allowed_methods(&self) -> Vec<Method> {
        vec![Method::GET, Method::HEAD]
    }
}

/// Serves files below a base directory.
///
/// ```rust,no_run
/// use portico::StaticWebsite;
///
/// let site = StaticWebsite::new("./public").mount("/assets").index_file("index.html");
/// # let _ = site;
/// ```
#[derive(Debug, Clone)]
pub struct StaticWebsite {
    base_dir: PathBuf,
    mount: String,
    index_file: Option<String>,
}

impl StaticWebsite {
    pub fn new<P: Into<PathBuf>>(base: P) -> Self {
        Self {
            base_dir: base.into(),
            mount: "/".to_string(),
            index_file: Some("index.html".to_string()),
        }
    }

    /// URL prefix the tree is served under (default `/`)
    #[must_use]
    pub fn mount(mut self, prefix: &str) -> Self {
        let trimmed = prefix.trim_matches('/');
        self.mount = if trimmed.is_empty() {
            "/".to_string()
        } else {
            format!("/{trimmed}")
        };
        self
    }

    /// File served for directory requests (default `index.html`)
    #[must_use]
    pub fn index_file(mut self, name: &str) -> Self {
        self.index_file = Some(name.to_string());
        self
    }

    /// Do not serve anything for directory requests
    #[must_use]
    pub fn without_index(mut self) -> Self {
        self.index_file = None;
        self
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    fn relative<'a>(&self, path: &'a str) -> Option<&'a str> {
        if self.mount == "/" {
            return Some(path);
        }
        let rest = path.strip_prefix(self.mount.as_str())?;
        if rest.is_empty() || rest.starts_with('/') {
            Some(rest)
        } else {
            None
        }
    }

    fn map_path(&self, url_path: &str) -> Option<PathBuf> {
        let mut pb = self.base_dir.clone();
        for comp in Path::new(url_path.trim_start_matches('/')).components() {
            match comp {
                Component::Normal(s) => pb.push(s),
                Component::CurDir => {}
                _ => return None,
            }
        }
        Some(pb)
    }

    /// File that would be served for a normalized request path
    pub fn resolve_file(&self, path: &str) -> Option<PathBuf> {
        let mapped = self.map_path(self.relative(path)?)?;
        if mapped.is_file() {
            return Some(mapped);
        }
        if mapped.is_dir() {
            let index = mapped.join(self.index_file.as_deref()?);
            if index.is_file() {
                return Some(index);
            }
        }
        None
    }

    fn content_type(path: &Path) -> &'static str {
        match path
            .extension()
            .and_then(|s| s.to_str())
            .unwrap_or("")
            .to_ascii_lowercase()
            .as_str()
        {
            "html" | "htm" => "text/html; charset=utf-8",
            "css" => "text/css; charset=utf-8",
            "js" | "mjs" => "application/javascript",
            "json" => "application/json",
            "txt" => "text/plain; charset=utf-8",
            "xml" => "application/xml",
            "svg" => "image/svg+xml",
            "png" => "image/png",
            "jpg" | "jpeg" => "image/jpeg",
            "gif" => "image/gif",
            "ico" => "image/x-icon",
            "webp" => "image/webp",
            "wasm" => "application/wasm",
            "pdf" => "application/pdf",
            "woff" => "font/woff",
            "woff2" => "font/woff2",
            _ => "application/octet-stream",
        }
    }
}

impl RequestHandler for StaticWebsite {
    fn handle(&self, req: &mut Request, res: &mut Response, _ctx: &Context) -> Result<()> {
        let file = self.resolve_file(req.path()).ok_or_else(|| Error::NotFound {
            path: req.path().to_string(),
        })?;
        let bytes = fs::read(&file).map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => Error::NotFound {
                path: req.path().to_string(),
            },
            _ => Error::Io(e),
        })?;
        debug!(path = %req.path(), file = %file.display(), bytes = bytes.len(), "Serving static file");
        res.set_body(ResponseBody::bytes(bytes, Self::content_type(&file)))
    }
}

impl Website for StaticWebsite {
    /// Claims only GET/HEAD for an existing file; other methods fall
    /// through to the registry.
    fn intercept(&self, req: &Request, _ctx: &Context) -> bool {
        method_allowed(&self.allowed_methods(), req.method())
            && self.resolve_file(req.path()).is_some()
    }
}
