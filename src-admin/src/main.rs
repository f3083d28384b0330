//! `keyward-admin`: operator entry point.
//!
//! Parses CLI arguments, installs the tracing subscriber (stderr, or a
//! daily rolling file with `--log-dir`), and dispatches to the command
//! handler. Secrets are only ever read from stdin.

#![cfg_attr(test, allow(clippy::unwrap_used, clippy::arithmetic_side_effects))]

mod cli;

use std::io;
use std::path::Path;

use clap::Parser;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

use crate::cli::{execute, Cli};

fn init_tracing(log_dir: Option<&Path>) -> Option<WorkerGuard> {
    // RUST_LOG=keyward=debug for verbose output. No level logs key material.
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("keyward=info"));

    match log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "keyward-admin.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_ansi(false)
                .with_writer(writer)
                .init();
            Some(guard)
        }
        None => {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_target(false)
                .with_writer(io::stderr)
                .init();
            None
        }
    }
}

fn main() {
    let cli = Cli::parse();
    let guard = init_tracing(cli.log_dir.as_deref());

    if let Err(e) = keyward_crypto_core::disable_core_dumps() {
        tracing::warn!(error = %e, "could not disable core dumps");
    }

    let stdin = io::stdin();
    let mut input = stdin.lock();
    let mut output = io::stdout().lock();
    let result = execute(&cli, &mut input, &mut output);
    // Flush the log writer; `exit` skips destructors.
    drop(guard);
    if let Err(e) = result {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}
