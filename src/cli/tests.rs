//! Unit tests for CLI commands

use crate::cli::{build_demo_server, Cli, Commands};
use crate::config::ServerConfig;
use clap::Parser;
use std::net::{IpAddr, Ipv4Addr};
use std::path::PathBuf;

#[test]
fn test_serve_command_defaults() {
    let cli = Cli::try_parse_from(["portico", "serve"]).unwrap();
    let Commands::Serve(args) = cli.command;
    assert!(args.config.is_none());
    assert!(args.port.is_none());
    assert!(args.static_dir.is_none());
}

#[test]
fn test_serve_command_with_flags() {
    let cli = Cli::try_parse_from([
        "portico",
        "serve",
        "--port",
        "9191",
        "--bind",
        "127.0.0.1",
        "--static-dir",
        "public",
        "--log-level",
        "debug",
    ])
    .unwrap();
    let Commands::Serve(args) = cli.command;
    assert_eq!(args.port, Some(9191));
    assert_eq!(args.bind, Some(IpAddr::V4(Ipv4Addr::LOCALHOST)));
    assert_eq!(args.static_dir, Some(PathBuf::from("public")));
    assert_eq!(args.log_level.as_deref(), Some("debug"));
}

#[test]
fn test_flags_override_config_file() {
    use std::io::Write;
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "port: 7000\nkeep_alive: false").unwrap();
    let path = file.path().to_string_lossy().into_owned();

    let cli = Cli::try_parse_from(["portico", "serve", "--config", &path, "--port", "7001"]).unwrap();
    let Commands::Serve(args) = cli.command;
    let config = args.server_config().unwrap();
    assert_eq!(config.port, 7001);
    assert!(!config.keep_alive);
}

#[test]
fn test_invalid_port_rejected() {
    assert!(Cli::try_parse_from(["portico", "serve", "--port", "not-a-port"]).is_err());
}

#[test]
fn test_demo_server_registers_handlers() {
    let server = build_demo_server(ServerConfig::default(), None).build();
    let paths = server.dispatcher().registry().paths();
    assert_eq!(paths, vec!["/echo", "/health", "/only-post"]);
}

#[test]
fn test_demo_echo_returns_body_verbatim() {
    use std::io::{Read, Write};
    use std::net::TcpStream;

    let config = ServerConfig {
        bind_address: IpAddr::V4(Ipv4Addr::LOCALHOST),
        port: 0,
        ..ServerConfig::default()
    };
    let server = build_demo_server(config, None).build();
    let addr = server.start().unwrap();

    let mut stream = TcpStream::connect(addr).unwrap();
    stream
        .set_read_timeout(Some(std::time::Duration::from_secs(5)))
        .unwrap();
    stream
        .write_all(
            b"POST /echo HTTP/1.1\r\nHost: localhost\r\nContent-Type: text/plain\r\n\
              Content-Length: 5\r\nConnection: close\r\n\r\nhello",
        )
        .unwrap();
    let mut raw = String::new();
    stream.read_to_string(&mut raw).unwrap();

    assert!(raw.starts_with("HTTP/1.1 200 OK\r\n"), "{raw}");
    assert!(raw.contains("content-type: text/plain\r\n"));
    assert!(raw.ends_with("\r\n\r\nhello"));
    server.stop();
}
