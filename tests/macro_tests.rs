//! `#[request_mapping]` handlers registered and dispatched in-process

use http::{Method, StatusCode};
use portico::server::{Context, Request, Response};
use portico::{request_mapping, Dispatcher, MappedHandler};
use serde_json::json;

#[request_mapping(path = "/users/{id}", method = "GET", produces = "application/json")]
fn get_user(req: &mut Request, res: &mut Response, _ctx: &Context) -> portico::Result<()> {
    let id = req.path_param("id").unwrap_or_default().to_string();
    res.set_json(&json!({ "id": id }))
}

#[request_mapping(
    path = "/search, /find",
    method = "GET, POST",
    params = "q, !debug",
    headers = "x-client=cli"
)]
fn search(req: &mut Request, res: &mut Response, _ctx: &Context) -> portico::Result<()> {
    let q = req.query_param("q").unwrap_or_default().to_string();
    res.set_body(format!("results for {q}"))
}

fn dispatcher() -> Dispatcher {
    let mut builder = Dispatcher::builder();
    builder.registry_mut().register_mapped(GetUser).unwrap();
    builder.registry_mut().register_mapped(Search).unwrap();
    builder.build()
}

fn send(dispatcher: &Dispatcher, raw: http::Request<Vec<u8>>) -> Response {
    let mut req: Request = raw.into();
    let mut res = Response::new();
    dispatcher.dispatch(&mut req, &mut res, &Context::detached());
    res
}

#[test]
fn test_generated_mapping() {
    let mapping = GetUser.mapping().unwrap();
    assert_eq!(mapping.methods(), &[Method::GET]);
    assert_eq!(mapping.paths().len(), 1);
    assert_eq!(mapping.produces().len(), 1);

    let mapping = Search.mapping().unwrap();
    assert_eq!(mapping.paths().len(), 2);
    assert_eq!(mapping.methods(), &[Method::GET, Method::POST]);
    assert_eq!(mapping.params().len(), 2);
    assert_eq!(mapping.headers().len(), 1);
}

#[test]
fn test_path_template_binds_variable() {
    let dispatcher = dispatcher();
    let res = send(
        &dispatcher,
        http::Request::get("/users/42").body(Vec::new()).unwrap(),
    );
    assert_eq!(res.status(), StatusCode::OK);
    let body: serde_json::Value = serde_json::from_slice(res.body_bytes()).unwrap();
    assert_eq!(body["id"], "42");

    let res = send(
        &dispatcher,
        http::Request::delete("/users/42").body(Vec::new()).unwrap(),
    );
    assert_eq!(res.status(), StatusCode::METHOD_NOT_ALLOWED);
}

#[test]
fn test_params_and_headers_conditions() {
    let dispatcher = dispatcher();

    let res = send(
        &dispatcher,
        http::Request::get("/find?q=rust")
            .header("x-client", "cli")
            .body(Vec::new())
            .unwrap(),
    );
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(res.body_bytes(), b"results for rust");

    let missing_header = send(
        &dispatcher,
        http::Request::get("/search?q=rust").body(Vec::new()).unwrap(),
    );
    assert_eq!(missing_header.status(), StatusCode::BAD_REQUEST);

    let forbidden_param = send(
        &dispatcher,
        http::Request::get("/search?q=rust&debug=1")
            .header("x-client", "cli")
            .body(Vec::new())
            .unwrap(),
    );
    assert_eq!(forbidden_param.status(), StatusCode::BAD_REQUEST);
}
