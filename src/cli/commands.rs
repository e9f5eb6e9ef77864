use std::net::IpAddr;
use std::path::PathBuf;
use std::sync::mpsc;

use anyhow::{Context as _, Result};
use clap::{Args, Parser, Subcommand};
use http::Method;
use serde_json::json;
use tracing::info;

use crate::config::ServerConfig;
use crate::handler::handler_fn;
use crate::logging::{init_logging_with_config, LogConfig};
use crate::server::{ChannelListener, Server, ServerBuilder, ServerEvent};
use crate::website::StaticWebsite;

/// Command-line interface for the portico demo server
#[derive(Debug, Parser)]
#[command(name = "portico")]
#[command(about = "Embeddable thread-per-connection HTTP server", long_about = None)]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Run the demo server until SIGINT or SIGTERM
    Serve(ServeArgs),
}

#[derive(Debug, Clone, Args)]
pub struct ServeArgs {
    /// YAML configuration file
    #[arg(short, long, env = "PORTICO_CONFIG")]
    pub config: Option<PathBuf>,

    /// Listening port (overrides the configuration)
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Bind address (overrides the configuration)
    #[arg(long)]
    pub bind: Option<IpAddr>,

    /// Directory served as the static website
    #[arg(long)]
    pub static_dir: Option<PathBuf>,

    /// trace, debug, info, warn or error
    #[arg(long)]
    pub log_level: Option<String>,
}

impl ServeArgs {
    /// Defaults, then the file, then `PORTICO_*` variables, then flags
    pub fn server_config(&self) -> Result<ServerConfig> {
        let mut config = match &self.config {
            Some(path) => ServerConfig::from_yaml_file(path)?,
            None => ServerConfig::default(),
        };
        config.apply_env();
        if let Some(port) = self.port {
            config.port = port;
        }
        if let Some(bind) = self.bind {
            config.bind_address = bind;
        }
        Ok(config)
    }
}

pub fn run_cli(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Serve(args) => serve(&args),
    }
}

fn serve(args: &ServeArgs) -> Result<()> {
    let mut log_config = LogConfig::from_env();
    if let Some(level) = &args.log_level {
        log_config.log_level = level.clone();
    }
    init_logging_with_config(&log_config)?;

    let config = args.server_config()?;
    let (listener, events) = ChannelListener::channel();
    let server = build_demo_server(config, args.static_dir.clone())
        .listener(listener)
        .build();

    let addr = server
        .start()
        .with_context(|| format!("starting server on {}", server.config().socket_addr()))?;
    info!(%addr, "Serving; press Ctrl-C to stop");

    wait_for_shutdown(&events)?;
    server.stop();
    Ok(())
}

/// The demo handlers on top of `config`, plus an optional static website
pub fn build_demo_server(config: ServerConfig, static_dir: Option<PathBuf>) -> ServerBuilder {
    let mut builder = Server::builder()
        .config(config)
        .register(
            "/health",
            handler_fn(|_req, res, _ctx| res.set_json(&json!({ "status": "ok" }))),
        )
        .register(
            "/echo",
            handler_fn(|req, res, _ctx| {
                if let Some(content_type) = req.header("content-type") {
                    res.set_header("content-type", content_type);
                }
                res.set_body(req.body().to_vec())
            }),
        )
        .register_with_methods(
            "/only-post",
            &[Method::POST],
            handler_fn(|req, res, _ctx| {
                res.set_json(&json!({ "received": req.body().len() }))
            }),
        );
    if let Some(dir) = static_dir {
        builder = builder.website(StaticWebsite::new(dir));
    }
    builder
}

/// Block until a termination signal arrives or the acceptor reports that
/// it stopped on its own.
#[cfg(unix)]
fn wait_for_shutdown(events: &mpsc::Receiver<ServerEvent>) -> Result<()> {
    use signal_hook::consts::{SIGINT, SIGTERM};
    use signal_hook::iterator::Signals;
    use std::thread;

    let mut signals = Signals::new([SIGINT, SIGTERM]).context("installing signal handlers")?;
    let handle = signals.handle();
    let (tx, rx) = mpsc::channel();
    thread::Builder::new()
        .name("portico-signals".to_string())
        .spawn(move || {
            if let Some(signal) = signals.forever().next() {
                info!(signal, "Received termination signal");
                if tx.send(()).is_err() {
                    return;
                }
            }
        })
        .context("spawning signal thread")?;

    loop {
        if rx.recv_timeout(std::time::Duration::from_millis(200)).is_ok() {
            break;
        }
        if matches!(events.try_recv(), Ok(ServerEvent::Stopped)) {
            info!("Acceptor stopped without a signal");
            break;
        }
    }
    handle.close();
    Ok(())
}

#[cfg(not(unix))]
fn wait_for_shutdown(events: &mpsc::Receiver<ServerEvent>) -> Result<()> {
    while let Ok(event) = events.recv() {
        if event == ServerEvent::Stopped {
            break;
        }
    }
    Ok(())
}
