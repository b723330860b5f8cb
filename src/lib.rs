//! chatrelay - relay live transcripts and translations into live chat
//!
//! Final text events from speech recognition, translation or manual input are
//! split into chat-sized pieces and delivered to a streaming platform's live
//! chat at a steady pace, behind a QR-style login session.

#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]
#![warn(clippy::let_underscore_must_use)]

pub mod backend;
#[cfg(feature = "cli")]
pub mod cli;
pub mod config;
pub mod daemon;
pub mod defaults;
pub mod delivery;
pub mod error;
pub mod events;
pub mod ipc;
pub mod output;
pub mod platform;
pub mod router;
pub mod session;

// Collaborator seams
pub use config::{ConfigStore, SharedConfig};
pub use platform::{BilibiliClient, PlatformApi};

// Core
pub use delivery::{DeliveryQueue, QueueSnapshot};
pub use events::{EventBus, TextEvent, TextEventSource};
pub use session::{SessionController, SessionSnapshot, SessionStatus};

// Error handling
pub use error::{ChatRelayError, Result};

// Config
pub use config::{Config, LiveGatePolicy};

/// Build version string with optional git commit hash.
///
/// Returns `"0.1.0+abc1234"` when git hash is available, `"0.1.0"` otherwise.
pub fn version_string() -> String {
    let version = env!("CARGO_PKG_VERSION");
    match option_env!("GIT_HASH") {
        Some(hash) if !hash.is_empty() => format!("{}+{}", version, hash),
        _ => version.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_string_starts_with_cargo_version() {
        let ver = version_string();
        assert!(
            ver.starts_with(env!("CARGO_PKG_VERSION")),
            "version_string should start with CARGO_PKG_VERSION, got: {}",
            ver
        );
    }

    #[test]
    fn version_string_has_hash_only_when_built_from_git() {
        let ver = version_string();
        if option_env!("GIT_HASH").is_some_and(|h| !h.is_empty()) {
            let hash_part = ver.split('+').nth(1).unwrap_or("");
            assert_eq!(hash_part.len(), 7, "Git hash should be 7 chars, got: {}", ver);
        } else {
            assert_eq!(ver, env!("CARGO_PKG_VERSION"));
        }
    }
}
