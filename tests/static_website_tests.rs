//! Static website fallback, in-process and over a live server

use std::fs;
use std::path::Path;

use http::{Method, StatusCode};
use portico::server::{Context, Request, Response};
use portico::{handler_fn, Dispatcher, StaticWebsite};

mod common;
use common::http::send_request;
use common::server::test_builder;

fn request(method: Method, uri: &str) -> Request {
    http::Request::builder()
        .method(method)
        .uri(uri)
        .body(Vec::new())
        .unwrap()
        .into()
}

fn get(dispatcher: &Dispatcher, uri: &str) -> Response {
    let mut req = request(Method::GET, uri);
    let mut res = Response::new();
    dispatcher.dispatch(&mut req, &mut res, &Context::detached());
    res
}

/// `root/public` is served; `root/secret.txt` sits just outside it
fn site_tree(root: &Path) -> std::path::PathBuf {
    let public = root.join("public");
    fs::create_dir_all(public.join("css")).unwrap();
    fs::create_dir_all(public.join("docs")).unwrap();
    fs::write(public.join("index.html"), "<h1>home</h1>").unwrap();
    fs::write(public.join("css/site.css"), "body{}").unwrap();
    fs::write(public.join("docs/readme.txt"), "read me").unwrap();
    fs::write(root.join("secret.txt"), "top secret").unwrap();
    public
}

#[test]
fn test_serves_files_with_content_type() {
    let dir = tempfile::tempdir().unwrap();
    let public = site_tree(dir.path());
    let dispatcher = Dispatcher::builder()
        .website(StaticWebsite::new(&public))
        .build();

    let res = get(&dispatcher, "/css/site.css");
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(res.header("content-type"), Some("text/css; charset=utf-8"));
    assert_eq!(res.body_bytes(), b"body{}");

    let res = get(&dispatcher, "/docs/readme.txt");
    assert_eq!(res.header("content-type"), Some("text/plain; charset=utf-8"));

    let res = get(&dispatcher, "/");
    assert_eq!(res.body_bytes(), b"<h1>home</h1>");
    assert_eq!(res.header("content-type"), Some("text/html; charset=utf-8"));
}

#[test]
fn test_missing_file_falls_through_to_404() {
    let dir = tempfile::tempdir().unwrap();
    let public = site_tree(dir.path());
    let dispatcher = Dispatcher::builder()
        .website(StaticWebsite::new(&public))
        .build();

    assert_eq!(get(&dispatcher, "/nope.html").status(), StatusCode::NOT_FOUND);
    // directory without an index file
    assert_eq!(get(&dispatcher, "/docs").status(), StatusCode::NOT_FOUND);
}

#[test]
fn test_traversal_stays_inside_base_dir() {
    let dir = tempfile::tempdir().unwrap();
    let public = site_tree(dir.path());
    let site = StaticWebsite::new(&public);

    assert!(site.resolve_file("/../secret.txt").is_none());
    assert!(site.resolve_file("/css/../../secret.txt").is_none());

    let dispatcher = Dispatcher::builder().website(site).build();
    for uri in ["/../secret.txt", "/css/%2E%2E/%2E%2E/secret.txt", "/..%2Fsecret.txt"] {
        let res = get(&dispatcher, uri);
        assert_eq!(res.status(), StatusCode::NOT_FOUND, "{uri}");
        assert_ne!(res.body_bytes(), b"top secret");
    }
}

#[test]
fn test_mount_prefix_and_index_options() {
    let dir = tempfile::tempdir().unwrap();
    let public = site_tree(dir.path());

    let mounted = Dispatcher::builder()
        .website(StaticWebsite::new(&public).mount("/assets"))
        .build();
    assert_eq!(get(&mounted, "/assets/css/site.css").body_bytes(), b"body{}");
    assert_eq!(get(&mounted, "/assets").body_bytes(), b"<h1>home</h1>");
    assert_eq!(get(&mounted, "/css/site.css").status(), StatusCode::NOT_FOUND);

    let custom = Dispatcher::builder()
        .website(StaticWebsite::new(&public).index_file("readme.txt"))
        .build();
    assert_eq!(get(&custom, "/docs").body_bytes(), b"read me");

    let bare = Dispatcher::builder()
        .website(StaticWebsite::new(&public).without_index())
        .build();
    assert_eq!(get(&bare, "/").status(), StatusCode::NOT_FOUND);
    assert_eq!(get(&bare, "/index.html").status(), StatusCode::OK);
}

#[test]
fn test_registry_still_serves_unclaimed_paths() {
    let dir = tempfile::tempdir().unwrap();
    let public = site_tree(dir.path());
    let server = test_builder()
        .register("/api/ping", handler_fn(|_req, res, _ctx| res.set_body("pong")))
        .website(StaticWebsite::new(&public))
        .build();
    let addr = server.start().unwrap();

    let page = send_request(addr, "GET", "/", None);
    assert_eq!(page.status, 200);
    assert_eq!(page.body_text(), "<h1>home</h1>");

    let api = send_request(addr, "GET", "/api/ping", None);
    assert_eq!(api.body_text(), "pong");

    let head = send_request(addr, "HEAD", "/css/site.css", None);
    assert_eq!(head.status, 200);
    assert_eq!(head.header("content-length"), Some("6"));
}
