//! Command Line and Logging
//!
//! Argument parsing, logging setup and build information for the
//! `bulk-messenger` binary.

use anyhow::{Context, Result};
use clap::{ArgAction, Args, Parser, Subcommand};
use std::path::PathBuf;
use tracing::{debug, Level};
use tracing_subscriber::{fmt, EnvFilter};

/// Bulk WhatsApp sender command-line interface
#[derive(Parser, Debug)]
#[command(name = "bulk-messenger")]
#[command(about = "Send an image and a brochure to every number in a contact sheet", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Set log level (error, warn, info, debug, trace)
    #[arg(short, long, value_name = "LEVEL", default_value = "info")]
    pub log_level: String,

    /// Enable JSON structured logging
    #[arg(long)]
    pub json_logs: bool,

    /// Show timestamps in logs
    #[arg(long, action = ArgAction::Set, default_value_t = true)]
    pub timestamps: bool,

    /// Configuration file (defaults to the user config directory)
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Connect, then send to every contact in the sheet
    Send(SendArgs),

    /// List the contacts of a sheet with their normalized addresses
    Contacts {
        /// Spreadsheet or CSV file with a `Number` column
        #[arg(long, value_name = "FILE")]
        contacts: Option<PathBuf>,
    },

    /// Show current configuration
    Config {
        /// Show the bridge API key
        #[arg(long)]
        show_sensitive: bool,
    },

    /// Show version and build information
    Version {
        /// Show detailed build information
        #[arg(long)]
        verbose: bool,
    },
}

/// Options of a send run; unset options fall back to the configuration
#[derive(Args, Debug, Default)]
pub struct SendArgs {
    /// Spreadsheet or CSV file with a `Number` column
    #[arg(long, value_name = "FILE")]
    pub contacts: Option<PathBuf>,

    /// Image sent first to each contact
    #[arg(long, value_name = "FILE")]
    pub image: Option<PathBuf>,

    /// Document sent after the image
    #[arg(long, value_name = "FILE")]
    pub document: Option<PathBuf>,

    /// Image caption, or the text sent when no image goes out
    #[arg(long)]
    pub caption: Option<String>,

    /// Caption of the document
    #[arg(long)]
    pub document_caption: Option<String>,

    /// Do not send an image
    #[arg(long)]
    pub no_image: bool,

    /// Do not send a document
    #[arg(long)]
    pub no_document: bool,

    /// Use the dry-run gateway regardless of configuration
    #[arg(long)]
    pub dry_run: bool,

    /// Session to restore or create
    #[arg(long, value_name = "ID")]
    pub session: Option<String>,
}

/// Initialize logging based on CLI configuration
///
/// Logs go to stderr; stdout carries notifications and the pairing QR code.
pub fn init_logging(cli: &Cli) -> Result<()> {
    let level: Level = cli.log_level.parse().with_context(|| {
        format!(
            "Invalid log level '{}'. Valid levels: error, warn, info, debug, trace",
            cli.log_level
        )
    })?;

    // RUST_LOG wins over --log-level
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(level.as_str()).context("Failed to create log filter")?,
    };

    let builder = fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(filter)
        .with_target(true)
        .with_file(cli.json_logs)
        .with_line_number(cli.json_logs);

    match (cli.json_logs, cli.timestamps) {
        (true, true) => builder.json().init(),
        (true, false) => builder.json().without_time().init(),
        (false, true) => builder.compact().init(),
        (false, false) => builder.compact().without_time().init(),
    }

    debug!(
        %level,
        json = cli.json_logs,
        timestamps = cli.timestamps,
        "Logging initialized"
    );
    Ok(())
}

/// Human-readable size of a media file
pub fn format_bytes(bytes: u64) -> String {
    const LARGER: [&str; 4] = ["KB", "MB", "GB", "TB"];
    if bytes < 1024 {
        return format!("{} B", bytes);
    }

    let mut value = bytes as f64 / 1024.0;
    let mut unit = LARGER[0];
    for next in &LARGER[1..] {
        if value < 1024.0 {
            break;
        }
        value /= 1024.0;
        unit = next;
    }
    format!("{:.2} {}", value, unit)
}

/// Version details printed by `bulk-messenger version`
pub struct BuildInfo {
    pub version: &'static str,
    pub git_hash: Option<&'static str>,
}

impl BuildInfo {
    pub fn get() -> Self {
        Self {
            version: env!("CARGO_PKG_VERSION"),
            git_hash: option_env!("GIT_HASH"),
        }
    }

    pub fn summary(&self, verbose: bool) -> String {
        let mut lines = vec![format!("Bulk Messenger v{}", self.version)];
        if verbose {
            lines.push(format!("Git commit: {}", self.git_hash.unwrap_or("unknown")));
            lines.push(format!(
                "Platform: {}/{}",
                std::env::consts::OS,
                std::env::consts::ARCH
            ));
            lines.push(format!(
                "Config file: {}",
                crate::config::Config::default_path().display()
            ));
        }
        lines.join("\n")
    }
}
