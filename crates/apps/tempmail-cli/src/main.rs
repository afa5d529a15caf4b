//! tempmail - Disposable mailboxes from the command line
//!
//! Thin presentation layer over the tempmail session controller.

use std::process::ExitCode;

use clap::{Parser, Subcommand};
use log::error;

mod commands;

/// Command line arguments
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Write the effective configuration to the config directory
    Init,
    /// Show which storage backend is in use and why
    Status,
    /// Register a new random mailbox
    Create,
    /// List stored accounts with their token state
    Accounts,
    /// Re-authenticate a stored account
    Restore { email: String },
    /// Download new messages for an account
    Fetch { email: String },
    /// List stored messages for an account, newest first
    Inbox {
        email: String,
        /// Maximum number of messages to show
        #[arg(long, default_value_t = 50)]
        limit: usize,
    },
    /// Print one stored message
    Show { id: i64 },
}

fn main() -> ExitCode {
    let args = Args::parse();

    // Initialize logging
    let default_level = if args.debug { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .format_timestamp_millis()
        .init();

    // Bootstrap config directory
    if let Err(e) = config::init() {
        error!("Failed to initialize config directory: {}", e);
    }

    match commands::run(args.command) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}
