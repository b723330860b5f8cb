//! Streaming-platform collaborator contract.
//!
//! The session controller and delivery queue talk to the platform only
//! through [`PlatformApi`]; [`bilibili::BilibiliClient`] is the HTTP
//! implementation shipped with the crate.

pub mod bilibili;
pub mod mock;

use crate::error::Result;
use serde::{Deserialize, Serialize};

pub use bilibili::BilibiliClient;
pub use mock::MockPlatform;

/// The three-part credential required to act as an authenticated user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Credential {
    /// Platform user id (`DedeUserID`).
    pub user_id: String,
    /// Anti-forgery token (`bili_jct`).
    pub csrf: String,
    /// Session cookie header value, `SESSDATA=<value>`.
    pub cookie: String,
}

impl Credential {
    /// All three parts present.
    pub fn is_complete(&self) -> bool {
        !self.user_id.is_empty() && !self.csrf.is_empty() && !self.cookie.is_empty()
    }
}

/// Identity record of the logged-in user. Opaque to the session core.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub user_id: u64,
    pub name: String,
    pub avatar_url: String,
}

/// A freshly issued login ticket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginTicket {
    /// Opaque ticket id used for polling.
    pub ticket: String,
    /// URL the user must open (or scan) to authorize the ticket.
    pub verification_url: String,
}

/// Status of a login ticket as reported by a poll.
///
/// Raw platform codes are converted here and never travel further as
/// integers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QrCodeStatus {
    Success,
    Expired,
    WaitingScan,
    WaitingConfirm,
    Unknown(i64),
}

impl QrCodeStatus {
    pub const SUCCESS_CODE: i64 = 0;
    pub const EXPIRED_CODE: i64 = 86038;
    pub const WAITING_SCAN_CODE: i64 = 86101;
    pub const WAITING_CONFIRM_CODE: i64 = 86090;

    pub fn from_code(code: i64) -> Self {
        match code {
            Self::SUCCESS_CODE => QrCodeStatus::Success,
            Self::EXPIRED_CODE => QrCodeStatus::Expired,
            Self::WAITING_SCAN_CODE => QrCodeStatus::WaitingScan,
            Self::WAITING_CONFIRM_CODE => QrCodeStatus::WaitingConfirm,
            other => QrCodeStatus::Unknown(other),
        }
    }

    pub fn code(self) -> i64 {
        match self {
            QrCodeStatus::Success => Self::SUCCESS_CODE,
            QrCodeStatus::Expired => Self::EXPIRED_CODE,
            QrCodeStatus::WaitingScan => Self::WAITING_SCAN_CODE,
            QrCodeStatus::WaitingConfirm => Self::WAITING_CONFIRM_CODE,
            QrCodeStatus::Unknown(code) => code,
        }
    }

    /// Human-readable hint for the login surface.
    pub fn describe(self) -> &'static str {
        match self {
            QrCodeStatus::Success => "login confirmed",
            QrCodeStatus::Expired => "code expired, refresh to get a new one",
            QrCodeStatus::WaitingScan => "scan the code with the mobile app",
            QrCodeStatus::WaitingConfirm => "scanned, confirm the login on your phone",
            QrCodeStatus::Unknown(_) => "waiting",
        }
    }
}

/// Result of one poll of a login ticket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollOutcome {
    pub status: QrCodeStatus,
    /// Present on success: a URL whose query string carries the credential.
    pub credential_url: Option<String>,
}

/// Calls the core needs from the streaming platform.
#[async_trait::async_trait]
pub trait PlatformApi: Send + Sync {
    /// Request a new login ticket.
    async fn request_login_ticket(&self) -> Result<LoginTicket>;

    /// Poll the status of a login ticket.
    async fn poll_login_ticket(&self, ticket: &str) -> Result<PollOutcome>;

    /// Check whether a stored credential is still accepted.
    async fn validate_credential(&self, credential: &Credential) -> Result<bool>;

    /// Fetch the identity belonging to a credential.
    async fn fetch_identity(&self, credential: &Credential) -> Result<Identity>;

    /// Post one chat message into a room.
    async fn send_chat_message(&self, credential: &Credential, room_id: &str, text: &str)
    -> Result<()>;
}
