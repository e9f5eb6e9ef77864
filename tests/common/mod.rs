#![allow(dead_code)]

pub mod http {
    use std::io::{Read, Write};
    use std::net::{SocketAddr, TcpStream};
    use std::time::Duration;

    /// Parsed raw HTTP response
    #[derive(Debug)]
    pub struct RawResponse {
        pub status: u16,
        pub headers: Vec<(String, String)>,
        pub body: Vec<u8>,
    }

    impl RawResponse {
        pub fn header(&self, name: &str) -> Option<&str> {
            self.headers
                .iter()
                .find(|(k, _)| k.eq_ignore_ascii_case(name))
                .map(|(_, v)| v.as_str())
        }

        pub fn body_text(&self) -> String {
            String::from_utf8_lossy(&self.body).into_owned()
        }

        pub fn json(&self) -> serde_json::Value {
            serde_json::from_slice(&self.body).unwrap()
        }
    }

    pub fn connect(addr: SocketAddr) -> TcpStream {
        let stream = TcpStream::connect(addr).unwrap();
        stream
            .set_read_timeout(Some(Duration::from_secs(5)))
            .unwrap();
        stream
    }

    /// Send raw bytes and read until the server closes the connection
    pub fn send_raw(addr: SocketAddr, raw: &[u8]) -> Vec<u8> {
        let mut stream = connect(addr);
        stream.write_all(raw).unwrap();
        let mut buf = Vec::new();
        let _read = stream.read_to_end(&mut buf);
        buf
    }

    /// One request with `Connection: close`
    pub fn send_request(addr: SocketAddr, method: &str, path: &str, body: Option<&str>) -> RawResponse {
        let body = body.unwrap_or("");
        let raw = format!(
            "{method} {path} HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\nContent-Length: {}\r\n\r\n{body}",
            body.len()
        );
        parse_response(&send_raw(addr, raw.as_bytes())).0
    }

    /// Parse one response from the front of `bytes`; returns it and the
    /// number of bytes it occupied.
    pub fn parse_response(bytes: &[u8]) -> (RawResponse, usize) {
        let head_end = bytes
            .windows(4)
            .position(|w| w == b"\r\n\r\n")
            .expect("response head terminator");
        let head = String::from_utf8_lossy(&bytes[..head_end]).into_owned();
        let mut lines = head.split("\r\n");
        let status_line = lines.next().unwrap();
        let status = status_line
            .split_whitespace()
            .nth(1)
            .unwrap()
            .parse()
            .unwrap();
        let headers: Vec<(String, String)> = lines
            .filter_map(|line| line.split_once(':'))
            .map(|(k, v)| (k.trim().to_ascii_lowercase(), v.trim().to_string()))
            .collect();
        let length = headers
            .iter()
            .find(|(k, _)| k == "content-length")
            .map(|(_, v)| v.parse::<usize>().unwrap())
            .unwrap_or(0);
        let start = head_end + 4;
        let end = (start + length).min(bytes.len());
        (
            RawResponse {
                status,
                headers,
                body: bytes[start..end].to_vec(),
            },
            end,
        )
    }

    /// Read exactly one response off a kept-alive stream
    pub fn read_one(stream: &mut TcpStream) -> RawResponse {
        let mut buf = Vec::new();
        let mut chunk = [0u8; 1024];
        loop {
            if let Some(head_end) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
                let head = String::from_utf8_lossy(&buf[..head_end]).to_ascii_lowercase();
                let length = head
                    .lines()
                    .find_map(|l| l.strip_prefix("content-length:"))
                    .map(|v| v.trim().parse::<usize>().unwrap())
                    .unwrap_or(0);
                if buf.len() >= head_end + 4 + length {
                    return parse_response(&buf).0;
                }
            }
            let n = stream.read(&mut chunk).unwrap();
            assert!(n > 0, "connection closed before a full response");
            buf.extend_from_slice(&chunk[..n]);
        }
    }
}

pub mod server {
    use std::net::{IpAddr, Ipv4Addr};
    use std::time::Duration;

    use portico::ServerBuilder;

    /// Builder bound to an ephemeral loopback port with short timeouts
    pub fn test_builder() -> ServerBuilder {
        portico::Server::builder()
            .bind_address(IpAddr::V4(Ipv4Addr::LOCALHOST))
            .port(0)
            .timeout(Duration::from_secs(2))
    }
}

pub mod logs {
    use tracing::subscriber::DefaultGuard;

    /// Thread-local subscriber writing through the test harness
    pub fn init() -> DefaultGuard {
        let subscriber = tracing_subscriber::fmt()
            .with_test_writer()
            .with_max_level(tracing::Level::DEBUG)
            .finish();
        tracing::subscriber::set_default(subscriber)
    }
}
