//! Login-ticket polling.
//!
//! Polls on a fixed interval until the ticket is confirmed or expires, or
//! the surface goes away. Each observed status is forwarded to the surface
//! and to a caller-supplied hook.

use super::surface::LoginSurface;
use crate::platform::{PlatformApi, QrCodeStatus};
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PollState {
    #[default]
    Idle,
    Polling,
    Succeeded,
    Expired,
}

/// Why polling ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollEnd {
    /// Confirmed; carries the credential URL when the platform sent one.
    Succeeded(Option<String>),
    /// The ticket expired. A new login is required.
    Expired,
    /// The surface closed or the ticket was empty.
    Abandoned,
}

/// Poll `ticket` every `interval` until it settles.
///
/// The first poll happens one interval after the call. A failed poll call is
/// logged and polling continues.
pub async fn poll_ticket(
    platform: &dyn PlatformApi,
    ticket: &str,
    surface: &dyn LoginSurface,
    interval: Duration,
    mut on_status: impl FnMut(QrCodeStatus) + Send,
) -> PollEnd {
    loop {
        tokio::time::sleep(interval).await;
        if ticket.is_empty() || !surface.is_open() {
            return PollEnd::Abandoned;
        }

        let outcome = match platform.poll_login_ticket(ticket).await {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::warn!(error = %e, "login poll failed");
                continue;
            }
        };

        tracing::debug!(status = ?outcome.status, "login poll");
        on_status(outcome.status);
        surface.show_status(outcome.status, outcome.credential_url.as_deref());

        match outcome.status {
            QrCodeStatus::Success => return PollEnd::Succeeded(outcome.credential_url),
            QrCodeStatus::Expired => return PollEnd::Expired,
            QrCodeStatus::WaitingScan
            | QrCodeStatus::WaitingConfirm
            | QrCodeStatus::Unknown(_) => {}
        }
    }
}
