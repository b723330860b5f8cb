//! Terminal rendering of daemon snapshots.
//! Used by `chatrelay status` and `chatrelay login`.

use crate::backend::{BackendState, BackendStatus};
use crate::delivery::QueueSnapshot;
use crate::platform::QrCodeStatus;
use crate::session::poller::PollState;
use crate::session::{LoginSession, SessionSnapshot, SessionStatus};
use std::fmt::Write;

const DIM: &str = "\x1b[2m";
const GREEN: &str = "\x1b[32m";
const YELLOW: &str = "\x1b[33m";
const RED: &str = "\x1b[31m";
const RESET: &str = "\x1b[0m";

/// Wraps text in an ANSI color, or not at all when `color` is off.
#[derive(Debug, Clone, Copy)]
pub struct Painter {
    color: bool,
}

impl Painter {
    pub fn new(color: bool) -> Self {
        Self { color }
    }

    fn paint(&self, code: &str, text: &str) -> String {
        if self.color {
            format!("{code}{text}{RESET}")
        } else {
            text.to_string()
        }
    }
}

fn session_color(status: SessionStatus) -> &'static str {
    match status {
        SessionStatus::Connected => GREEN,
        SessionStatus::Connecting => YELLOW,
        SessionStatus::Disconnected => DIM,
    }
}

fn backend_line(painter: Painter, state: &BackendState) -> String {
    let (code, label) = match state.status {
        BackendStatus::Connected => (GREEN, "running"),
        BackendStatus::Connecting => (YELLOW, "starting"),
        BackendStatus::Disconnected => (DIM, "stopped"),
    };
    let mut line = painter.paint(code, label);
    if let Some(error) = &state.error {
        line.push_str(&format!(" {}", painter.paint(RED, &format!("({error})"))));
    }
    line
}

/// One-line description of a login attempt.
pub fn format_login(painter: Painter, login: &LoginSession) -> String {
    match (login.poll_state, login.status) {
        (PollState::Expired, _) | (_, Some(QrCodeStatus::Expired)) => painter.paint(
            RED,
            "code expired, run `chatrelay login` again for a new one",
        ),
        (PollState::Succeeded, _) | (_, Some(QrCodeStatus::Success)) => {
            painter.paint(GREEN, QrCodeStatus::Success.describe())
        }
        (_, Some(status)) => status.describe().to_string(),
        (_, None) => "waiting for the first poll".to_string(),
    }
}

/// Multi-line status report.
pub fn format_status(
    painter: Painter,
    session: &SessionSnapshot,
    queue: &QueueSnapshot,
    translation: &BackendState,
    recognition: &BackendState,
) -> String {
    let mut out = String::from("Status:\n");
    let label = |text: &str| painter.paint(DIM, text);

    let _ = writeln!(
        out,
        "  {}     {}",
        label("Session:"),
        painter.paint(session_color(session.status), &session.status.to_string())
    );
    match &session.identity {
        Some(identity) => {
            let _ = writeln!(
                out,
                "  {}        {} (uid {})",
                label("User:"),
                identity.name,
                identity.user_id
            );
        }
        None => {
            let _ = writeln!(out, "  {}        not logged in", label("User:"));
        }
    }
    if let Some(login) = &session.login {
        let _ = writeln!(out, "  {}       {}", label("Login:"), format_login(painter, login));
        let _ = writeln!(out, "  {}         {}", label("URL:"), login.verification_url);
    }

    let worker = if queue.running { "running" } else { "stopped" };
    let _ = writeln!(
        out,
        "  {}       {} pending, {} delivered, {} requeued ({})",
        label("Queue:"),
        queue.pending,
        queue.delivered,
        queue.requeued,
        worker
    );
    let _ = writeln!(
        out,
        "  {} {}",
        label("Translation:"),
        backend_line(painter, translation)
    );
    let _ = writeln!(
        out,
        "  {} {}",
        label("Recognition:"),
        backend_line(painter, recognition)
    );
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::Identity;

    fn login(status: Option<QrCodeStatus>, poll_state: PollState) -> LoginSession {
        LoginSession {
            ticket: "t".to_string(),
            verification_url: "https://example.test/qr".to_string(),
            status,
            poll_state,
        }
    }

    #[test]
    fn test_plain_painter_adds_no_escapes() {
        let text = Painter::new(false).paint(GREEN, "ok");
        assert_eq!(text, "ok");
        assert_eq!(Painter::new(true).paint(GREEN, "ok"), "\x1b[32mok\x1b[0m");
    }

    #[test]
    fn test_login_descriptions() {
        let plain = Painter::new(false);
        assert_eq!(
            format_login(plain, &login(None, PollState::Polling)),
            "waiting for the first poll"
        );
        assert_eq!(
            format_login(plain, &login(Some(QrCodeStatus::WaitingConfirm), PollState::Polling)),
            QrCodeStatus::WaitingConfirm.describe()
        );
        assert!(
            format_login(plain, &login(Some(QrCodeStatus::Expired), PollState::Expired))
                .contains("expired")
        );
    }

    #[test]
    fn test_status_report_lists_every_part() {
        let session = SessionSnapshot {
            status: SessionStatus::Connected,
            identity: Some(Identity {
                user_id: 7,
                name: "streamer".to_string(),
                avatar_url: String::new(),
            }),
            login: None,
        };
        let queue = QueueSnapshot {
            pending: 3,
            running: true,
            delivered: 12,
            requeued: 1,
        };
        let failed = BackendState {
            status: BackendStatus::Disconnected,
            error: Some("options missing: key".to_string()),
        };

        let report = format_status(
            Painter::new(false),
            &session,
            &queue,
            &BackendState::default(),
            &failed,
        );

        assert!(report.contains("Session:     connected"));
        assert!(report.contains("streamer (uid 7)"));
        assert!(report.contains("3 pending, 12 delivered, 1 requeued (running)"));
        assert!(report.contains("Translation: stopped"));
        assert!(report.contains("Recognition: stopped (options missing: key)"));
        assert!(!report.contains("Login:"));
    }

    #[test]
    fn test_status_report_shows_login_url() {
        let session = SessionSnapshot {
            login: Some(login(Some(QrCodeStatus::WaitingScan), PollState::Polling)),
            ..SessionSnapshot::default()
        };
        let report = format_status(
            Painter::new(false),
            &session,
            &QueueSnapshot::default(),
            &BackendState::default(),
            &BackendState::default(),
        );
        assert!(report.contains("not logged in"));
        assert!(report.contains("URL:         https://example.test/qr"));
        assert!(report.contains(QrCodeStatus::WaitingScan.describe()));
    }
}
