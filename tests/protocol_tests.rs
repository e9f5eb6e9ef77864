//! Wire-level tests for the HTTP/1.1 engine
//!
//! Raw bytes go in, raw bytes come out: chunked and fixed-length bodies,
//! `Expect: 100-continue`, size limits, malformed requests, pipelining,
//! `HEAD` and HTTP/1.0 keep-alive.

use std::io::{Read, Write};

use http::Method;
use portico::{handler_fn, Server};

mod common;
use common::http::{connect, parse_response, read_one, send_raw};
use common::server::test_builder;

fn body_server() -> Server {
    test_builder()
        .max_body_bytes(1024)
        .register(
            "/len",
            handler_fn(|req, res, _ctx| {
                res.set_body(format!("{}:{}", req.body().len(), String::from_utf8_lossy(req.body())))
            }),
        )
        .register_with_methods(
            "/page",
            &[Method::GET],
            handler_fn(|_req, res, _ctx| res.set_body("0123456789")),
        )
        .build()
}

#[test]
fn test_chunked_body_is_reassembled() {
    let server = body_server();
    let addr = server.start().unwrap();

    let raw = send_raw(
        addr,
        b"POST /len HTTP/1.1\r\nHost: x\r\nConnection: close\r\nTransfer-Encoding: chunked\r\n\r\n\
          5\r\nhello\r\n6;ext=1\r\n world\r\n0\r\nX-Trailer: t\r\n\r\n",
    );
    let (res, _) = parse_response(&raw);
    assert_eq!(res.status, 200);
    assert_eq!(res.body_text(), "11:hello world");
}

#[test]
fn test_invalid_chunk_size_is_400() {
    let server = body_server();
    let addr = server.start().unwrap();

    let raw = send_raw(
        addr,
        b"POST /len HTTP/1.1\r\nHost: x\r\nTransfer-Encoding: chunked\r\n\r\nzz\r\nhello\r\n0\r\n\r\n",
    );
    let (res, _) = parse_response(&raw);
    assert_eq!(res.status, 400);
    assert_eq!(res.header("connection"), Some("close"));
}

#[test]
fn test_expect_continue_gets_interim_response() {
    let server = body_server();
    let addr = server.start().unwrap();

    let mut stream = connect(addr);
    stream
        .write_all(
            b"POST /len HTTP/1.1\r\nHost: x\r\nContent-Length: 4\r\nExpect: 100-continue\r\nConnection: close\r\n\r\n",
        )
        .unwrap();

    let mut interim = [0u8; 25];
    stream.read_exact(&mut interim).unwrap();
    assert_eq!(&interim, b"HTTP/1.1 100 Continue\r\n\r\n");

    stream.write_all(b"data").unwrap();
    let mut rest = Vec::new();
    stream.read_to_end(&mut rest).unwrap();
    let (res, _) = parse_response(&rest);
    assert_eq!(res.status, 200);
    assert_eq!(res.body_text(), "4:data");
}

#[test]
fn test_oversized_body_is_413() {
    let server = body_server();
    let addr = server.start().unwrap();

    let raw = send_raw(
        addr,
        b"POST /len HTTP/1.1\r\nHost: x\r\nContent-Length: 4096\r\n\r\n",
    );
    let (res, _) = parse_response(&raw);
    assert_eq!(res.status, 413);
}

#[test]
fn test_too_many_headers_is_431() {
    let server = body_server();
    let addr = server.start().unwrap();

    let mut request = String::from("GET /page HTTP/1.1\r\nHost: x\r\n");
    for i in 0..(portico::protocol::MAX_HEADERS + 4) {
        request.push_str(&format!("X-Filler-{i}: v\r\n"));
    }
    request.push_str("\r\n");

    let (res, _) = parse_response(&send_raw(addr, request.as_bytes()));
    assert_eq!(res.status, 431);
}

#[test]
fn test_garbage_request_line_is_400() {
    let server = body_server();
    let addr = server.start().unwrap();

    let (res, _) = parse_response(&send_raw(addr, b"NOT A REQUEST\r\n\r\n"));
    assert_eq!(res.status, 400);
}

#[test]
fn test_bad_content_length_is_400() {
    let server = body_server();
    let addr = server.start().unwrap();

    let (res, _) = parse_response(&send_raw(
        addr,
        b"POST /len HTTP/1.1\r\nHost: x\r\nContent-Length: ten\r\n\r\n",
    ));
    assert_eq!(res.status, 400);
}

#[test]
fn test_pipelined_requests_answered_in_order() {
    let server = body_server();
    let addr = server.start().unwrap();

    let raw = send_raw(
        addr,
        b"POST /len HTTP/1.1\r\nHost: x\r\nContent-Length: 3\r\n\r\nabc\
          GET /page HTTP/1.1\r\nHost: x\r\n\r\n\
          POST /len HTTP/1.1\r\nHost: x\r\nContent-Length: 2\r\nConnection: close\r\n\r\nxy",
    );

    let mut offset = 0;
    let mut bodies = Vec::new();
    for _ in 0..3 {
        let (res, used) = parse_response(&raw[offset..]);
        assert_eq!(res.status, 200);
        bodies.push(res.body_text());
        offset += used;
    }
    assert_eq!(bodies, vec!["3:abc", "0123456789", "2:xy"]);
    assert_eq!(offset, raw.len());
}

#[test]
fn test_head_sends_length_without_body() {
    let server = body_server();
    let addr = server.start().unwrap();

    let mut stream = connect(addr);
    stream
        .write_all(b"HEAD /page HTTP/1.1\r\nHost: x\r\n\r\nGET /page HTTP/1.1\r\nHost: x\r\nConnection: close\r\n\r\n")
        .unwrap();
    let mut raw = Vec::new();
    stream.read_to_end(&mut raw).unwrap();

    let text = String::from_utf8_lossy(&raw);
    // HEAD advertises the length but the next bytes are the GET response
    let second = text.find("HTTP/1.1 200 OK\r\n").and_then(|first| {
        text[first + 1..].find("HTTP/1.1 200 OK\r\n").map(|i| i + first + 1)
    });
    let second = second.expect("two responses");
    assert!(text[..second].contains("content-length: 10\r\n"));
    assert!(text[..second].ends_with("\r\n\r\n"));
    assert!(text[second..].ends_with("0123456789"));
}

#[test]
fn test_http10_keep_alive_requires_opt_in() {
    let server = body_server();
    let addr = server.start().unwrap();

    let raw = send_raw(addr, b"GET /page HTTP/1.0\r\n\r\n");
    let (res, _) = parse_response(&raw);
    assert_eq!(res.status, 200);
    assert_eq!(res.header("connection"), Some("close"));

    let mut stream = connect(addr);
    stream
        .write_all(b"GET /page HTTP/1.0\r\nConnection: keep-alive\r\n\r\n")
        .unwrap();
    let res = read_one(&mut stream);
    assert_eq!(res.header("connection"), Some("keep-alive"));
    assert_eq!(res.body_text(), "0123456789");
}
