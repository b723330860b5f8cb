//! Command-line interface for chatrelay
//!
//! Provides argument parsing using clap derive macros.

use crate::ipc::protocol::BackendTarget;
use clap::{Parser, Subcommand};
use clap_complete::Shell;
use std::path::PathBuf;

/// Relay live transcripts and translations into live chat
#[derive(Parser, Debug)]
#[command(
    name = "chatrelay",
    version,
    about = "Relay live transcripts and translations into live chat"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Path to configuration file
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Path to Unix socket (default: $XDG_RUNTIME_DIR/chatrelay.sock)
    #[arg(long, global = true, value_name = "PATH")]
    pub socket: Option<PathBuf>,

    /// Only log errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Verbose logging (-v: debug, -vv: trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the relay daemon in the foreground
    Daemon,

    /// Log in by confirming a code on the mobile app
    Login {
        /// Return right away instead of following the login
        #[arg(long)]
        no_wait: bool,
    },

    /// Disconnect and forget the stored credential
    Logout,

    /// Connect with the stored credential
    Connect,

    /// Go offline, keeping the credential
    Disconnect,

    /// Show session, queue and backend status
    Status {
        /// Print the raw JSON response
        #[arg(long)]
        json: bool,
    },

    /// Post text as manual input
    Say {
        /// Text to post
        #[arg(required = true, num_args = 1..)]
        text: Vec<String>,
    },

    /// Feed a WAV file to the recognition backend
    Feed {
        /// WAV file (any rate, mono or stereo)
        path: PathBuf,
    },

    /// Drop all pending chat messages
    ClearQueue,

    /// Start or stop a backend
    Backend {
        #[command(subcommand)]
        action: BackendAction,
    },

    /// Re-read the configuration file in the daemon
    Reload,

    /// Stop the daemon
    Shutdown,

    /// Inspect the configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        shell: Shell,
    },
}

/// Backend lifecycle actions
#[derive(Subcommand, Debug)]
pub enum BackendAction {
    Start {
        #[arg(value_enum)]
        backend: BackendTarget,
    },
    Stop {
        #[arg(value_enum)]
        backend: BackendTarget,
    },
}

/// Configuration actions
#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Print the configuration file path
    Path,
    /// Print the effective configuration (credential redacted)
    Show,
    /// Write the defaults to the configuration file if it does not exist
    Init,
}
