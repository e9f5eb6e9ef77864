use http::Method;

use super::mapping::media_compatible;
use super::*;
use crate::error::Error;
use crate::server::Request;

fn request(method: &str, uri: &str, headers: &[(&str, &str)]) -> Request {
    let mut builder = http::Request::builder().method(method).uri(uri);
    for (k, v) in headers {
        builder = builder.header(*k, *v);
    }
    Request::from(builder.body(Vec::new()).unwrap())
}

fn matched_pattern(eval: Evaluation) -> Option<String> {
    match eval {
        Evaluation::Matched { pattern, .. } => Some(pattern),
        _ => None,
    }
}

#[test]
fn test_root_template() {
    let t = PathTemplate::parse("/").unwrap();
    assert!(t.matches("/").is_some());
    assert!(t.matches("/a").is_none());
    assert!(t.param_names().is_empty());
    assert!(t.is_exact());
}

#[test]
fn test_variable_template() {
    let t = PathTemplate::parse("/items/{id}").unwrap();
    let params = t.matches("/items/123").unwrap();
    assert_eq!(params.len(), 1);
    assert_eq!(params[0].0.as_ref(), "id");
    assert_eq!(params[0].1, "123");
    assert!(t.matches("/items").is_none());
    assert!(t.matches("/items/1/2").is_none());
}

#[test]
fn test_trailing_slash_is_normalized_in_template() {
    let t = PathTemplate::parse("/a/{b}/c/").unwrap();
    assert_eq!(t.as_str(), "/a/{b}/c");
    assert!(t.matches("/a/1/c").is_some());
}

#[test]
fn test_single_wildcard() {
    let t = PathTemplate::parse("/files/*/meta").unwrap();
    assert!(t.matches("/files/x/meta").is_some());
    assert!(t.matches("/files/meta").is_none());
    assert!(t.matches("/files/x/y/meta").is_none());
}

#[test]
fn test_catch_all() {
    let t = PathTemplate::parse("/assets/**").unwrap();
    assert!(t.matches("/assets").is_some());
    assert!(t.matches("/assets/css/site.css").is_some());
    assert!(t.matches("/assetsx").is_none());

    let everything = PathTemplate::parse("/**").unwrap();
    assert!(everything.matches("/").is_some());
    assert!(everything.matches("/deep/path").is_some());
}

#[test]
fn test_regex_metacharacters_are_literal() {
    let t = PathTemplate::parse("/v1.0/a+b").unwrap();
    assert!(t.matches("/v1.0/a+b").is_some());
    assert!(t.matches("/v1x0/aab").is_none());
}

#[test]
fn test_invalid_templates() {
    assert!(matches!(PathTemplate::parse("no-slash"), Err(Error::InvalidMapping(_))));
    assert!(PathTemplate::parse("/a/**/b").is_err());
    assert!(PathTemplate::parse("/a/{}").is_err());
    assert!(PathTemplate::parse("/a/x{id}").is_err());
}

#[test]
fn test_specificity_ordering() {
    let literal = PathTemplate::parse("/user/profile").unwrap().specificity();
    let variable = PathTemplate::parse("/user/{id}").unwrap().specificity();
    let wildcard = PathTemplate::parse("/user/*").unwrap().specificity();
    let catch_all = PathTemplate::parse("/user/**").unwrap().specificity();
    assert!(literal > variable);
    assert!(variable > wildcard);
    assert!(wildcard > catch_all);
}

#[test]
fn test_condition_parse_and_check() {
    let lookup = |k: &str| match k {
        "mode" => Some("fast"),
        "debug" => Some("1"),
        _ => None,
    };
    assert_eq!(Condition::parse("debug").unwrap(), Condition::Present("debug".into()));
    assert!(Condition::parse("debug").unwrap().check(lookup));
    assert!(Condition::parse("!trace").unwrap().check(lookup));
    assert!(!Condition::parse("!debug").unwrap().check(lookup));
    assert!(Condition::parse("mode=fast").unwrap().check(lookup));
    assert!(!Condition::parse("mode=slow").unwrap().check(lookup));
    assert!(Condition::parse("mode!=slow").unwrap().check(lookup));
    assert!(Condition::parse("absent!=x").unwrap().check(lookup));
    assert!(Condition::parse("=x").is_err());
    assert_eq!(Condition::parse("mode != slow").unwrap().to_string(), "mode!=slow");
}

#[test]
fn test_media_compatibility() {
    assert!(media_compatible("application/json", "application/json"));
    assert!(media_compatible("application/*", "application/json"));
    assert!(media_compatible("*/*", "text/plain"));
    assert!(!media_compatible("text/plain", "application/json"));
    assert!(MediaRule::parse("!text/plain").unwrap().is_negated());
    assert!(MediaRule::parse("json").is_err());
}

#[test]
fn test_method_allowed() {
    assert!(method_allowed(&[], &Method::DELETE));
    assert!(method_allowed(&[Method::GET], &Method::HEAD));
    assert!(!method_allowed(&[Method::POST], &Method::GET));
    assert!(!method_allowed(&[Method::POST], &Method::HEAD));
}

#[test]
fn test_mapping_requires_path() {
    assert!(Mapping::builder().method(Method::GET).build().is_err());
}

#[test]
fn test_mapping_evaluation_order() {
    let mapping = Mapping::builder()
        .path("/orders/{id}")
        .method(Method::POST)
        .param("confirm")
        .header("x-tenant")
        .consumes("application/json")
        .produces("application/json")
        .build()
        .unwrap();

    assert!(matches!(
        mapping.evaluate(&request("POST", "/other", &[])),
        Evaluation::NoPath
    ));
    assert!(matches!(
        mapping.evaluate(&request("GET", "/orders/1", &[])),
        Evaluation::Rejected(Stage::Method, Error::MethodNotSupported { .. })
    ));
    assert!(matches!(
        mapping.evaluate(&request("POST", "/orders/1", &[])),
        Evaluation::Rejected(Stage::Params, Error::ParamValidation(_))
    ));
    assert!(matches!(
        mapping.evaluate(&request("POST", "/orders/1?confirm=yes", &[])),
        Evaluation::Rejected(Stage::Headers, Error::HeaderValidation(_))
    ));
    assert!(matches!(
        mapping.evaluate(&request(
            "POST",
            "/orders/1?confirm=yes",
            &[("x-tenant", "acme"), ("content-type", "text/plain")]
        )),
        Evaluation::Rejected(Stage::Consumes, Error::UnsupportedMediaType { .. })
    ));
    assert!(matches!(
        mapping.evaluate(&request(
            "POST",
            "/orders/1?confirm=yes",
            &[
                ("x-tenant", "acme"),
                ("content-type", "application/json; charset=utf-8"),
                ("accept", "text/html")
            ]
        )),
        Evaluation::Rejected(Stage::Produces, Error::NotAcceptable { .. })
    ));
    assert_eq!(
        matched_pattern(mapping.evaluate(&request(
            "POST",
            "/orders/1?confirm=yes",
            &[
                ("x-tenant", "acme"),
                ("content-type", "application/json"),
                ("accept", "application/*")
            ]
        ))),
        Some("/orders/{id}".to_string())
    );
}

#[test]
fn test_missing_content_type_is_octet_stream() {
    let mapping = Mapping::builder()
        .path("/upload")
        .consumes("application/octet-stream")
        .build()
        .unwrap();
    assert!(matched_pattern(mapping.evaluate(&request("PUT", "/upload", &[]))).is_some());

    let json_only = Mapping::builder()
        .path("/upload")
        .consumes("application/json")
        .build()
        .unwrap();
    assert!(matches!(
        json_only.evaluate(&request("PUT", "/upload", &[])),
        Evaluation::Rejected(Stage::Consumes, _)
    ));
}

#[test]
fn test_negated_consumes() {
    let mapping = Mapping::builder()
        .path("/notes")
        .consumes("!text/plain")
        .build()
        .unwrap();
    assert!(matches!(
        mapping.evaluate(&request("POST", "/notes", &[("content-type", "text/plain")])),
        Evaluation::Rejected(Stage::Consumes, _)
    ));
    assert!(matched_pattern(
        mapping.evaluate(&request("POST", "/notes", &[("content-type", "application/json")]))
    )
    .is_some());
}

#[test]
fn test_produces_without_accept_matches() {
    let mapping = Mapping::builder()
        .path("/report")
        .produces("text/csv")
        .build()
        .unwrap();
    assert!(matched_pattern(mapping.evaluate(&request("GET", "/report", &[]))).is_some());
    assert!(matched_pattern(mapping.evaluate(&request("GET", "/report", &[("accept", "*/*")]))).is_some());
}

#[test]
fn test_multiple_paths_pick_most_specific() {
    let mapping = Mapping::builder()
        .path("/docs/**")
        .path("/docs/{page}")
        .build()
        .unwrap();
    match mapping.evaluate(&request("GET", "/docs/intro", &[])) {
        Evaluation::Matched { pattern, params, .. } => {
            assert_eq!(pattern, "/docs/{page}");
            assert_eq!(params[0].1, "intro");
        }
        other => panic!("unexpected evaluation: {other:?}"),
    }
}
