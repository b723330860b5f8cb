//! JSON message protocol for IPC communication between CLI and daemon.

use crate::backend::BackendState;
use crate::delivery::QueueSnapshot;
use crate::session::SessionSnapshot;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Which backend host a command addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[cfg_attr(feature = "cli", derive(clap::ValueEnum))]
pub enum BackendTarget {
    Translation,
    Recognition,
}

/// Commands sent by CLI to the daemon.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Command {
    /// Start a login attempt
    Login,
    /// Disconnect and forget the stored credential
    Logout,
    /// Connect with the stored credential
    Connect,
    /// Go offline, keeping the credential
    Disconnect,
    /// Get session, queue and backend status
    Status,
    /// Publish operator text as manual input
    Say { text: String },
    /// Feed a WAV file to the recognition backend
    Feed { path: PathBuf },
    /// Drop every pending chat message
    ClearQueue,
    StartBackend { backend: BackendTarget },
    StopBackend { backend: BackendTarget },
    /// Re-read the configuration file
    Reload,
    /// Shutdown the daemon
    Shutdown,
}

impl Command {
    /// Serialize command to JSON string.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserialize command from JSON string.
    pub fn from_json(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }
}

/// Responses sent by daemon to CLI.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Response {
    /// Command succeeded
    Ok,
    /// Current daemon status
    Status {
        session: SessionSnapshot,
        queue: QueueSnapshot,
        translation: BackendState,
        recognition: BackendState,
    },
    /// Audio accepted by the recognition backend
    Fed { clips: usize },
    /// Error occurred
    Error { message: String },
}

impl Response {
    /// Serialize response to JSON string.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserialize response from JSON string.
    pub fn from_json(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }

    pub fn error(message: impl std::fmt::Display) -> Self {
        Response::Error {
            message: message.to_string(),
        }
    }
}
