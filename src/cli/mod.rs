//! # CLI Module
//!
//! Command line for running a standalone demo server.
//!
//! ## Commands
//!
//! ### `serve`
//!
//! ```bash
//! portico serve --config portico.yaml --port 9090 --static-dir ./public
//! ```
//!
//! Options:
//! - `--config <FILE>` - YAML server configuration (flat or under `http:`)
//! - `--port <N>` - overrides the configured port
//! - `--bind <ADDR>` - overrides the configured bind address
//! - `--static-dir <DIR>` - serve files from this directory as the website
//! - `--log-level <LEVEL>` - trace, debug, info, warn or error
//!
//! The demo registers `/health`, `/echo` (any method) and `/only-post`
//! (POST only), and stops cleanly on SIGINT or SIGTERM.
//!
//! ## Usage from Code
//!
//! ```rust,ignore
//! use portico::cli::{run_cli, Cli};
//! use clap::Parser;
//!
//! run_cli(Cli::parse())?;
//! ```

mod commands;

#[cfg(test)]
mod tests;

pub use commands::{build_demo_server, run_cli, Cli, Commands, ServeArgs};
