//! Command-line interface (clap derive).

mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

pub use commands::execute;

/// keyward-admin: set up and inspect a keyward key service.
#[derive(Parser, Debug)]
#[command(name = "keyward-admin")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Directory holding key files, `keyward.json` and `appsettings.json`.
    #[arg(long, global = true, default_value = "config")]
    pub config_dir: PathBuf,

    /// Write logs to daily rolling files in this directory instead of stderr.
    #[arg(long, global = true)]
    pub log_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Show master key status and the setup step the gate would route to.
    Status,

    /// Step 1: generate the master key. Reads the backup password from stdin.
    CreateMasterKey,

    /// Step 1 (disaster recovery): restore the master key from the backup.
    /// Reads the recovery password from stdin.
    Recover,

    /// Print the backup file path and its fingerprint.
    BackupFingerprint,

    /// Step 2: save store connection settings, credentials encrypted under
    /// the master key. Reads the store password from stdin unless
    /// `--integrated-security` is set.
    ConfigureStore {
        /// Store host name or address.
        #[arg(long)]
        server: String,

        /// Store TCP port.
        #[arg(long)]
        port: u16,

        /// Database name.
        #[arg(long)]
        database: String,

        /// Authenticate as the service account.
        #[arg(long, default_value = "false")]
        integrated_security: bool,

        /// Login name (required without integrated security).
        #[arg(long, default_value = "")]
        user_id: String,
    },

    /// Print the gate decision and its setup route.
    Gate,
}
