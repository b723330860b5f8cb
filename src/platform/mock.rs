//! Scriptable in-memory platform for tests.

use super::{Credential, Identity, LoginTicket, PlatformApi, PollOutcome, QrCodeStatus};
use crate::error::{ChatRelayError, Result};
use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// One message accepted by [`MockPlatform::send_chat_message`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentMessage {
    pub room_id: String,
    pub text: String,
    pub at: tokio::time::Instant,
}

/// Mock platform for testing
///
/// Poll outcomes are consumed in order; once exhausted every poll reports
/// `WaitingScan`.
#[derive(Debug)]
pub struct MockPlatform {
    ticket: Mutex<Option<LoginTicket>>,
    polls: Mutex<VecDeque<Result<PollOutcome>>>,
    credential_valid: bool,
    identity_fails: bool,
    auth_latency: Duration,
    identity: Identity,
    send_failures: AtomicUsize,
    send_latency: Duration,
    sent: Mutex<Vec<SentMessage>>,
    attempts: AtomicUsize,
    ticket_requests: AtomicUsize,
}

impl Default for MockPlatform {
    fn default() -> Self {
        Self::new()
    }
}

impl MockPlatform {
    pub fn new() -> Self {
        Self {
            ticket: Mutex::new(Some(LoginTicket {
                ticket: "ticket-1".to_string(),
                verification_url: "https://example.test/qr?key=ticket-1".to_string(),
            })),
            polls: Mutex::new(VecDeque::new()),
            credential_valid: true,
            identity_fails: false,
            auth_latency: Duration::ZERO,
            identity: Identity {
                user_id: 42,
                name: "tester".to_string(),
                avatar_url: "https://example.test/face.png".to_string(),
            },
            send_failures: AtomicUsize::new(0),
            send_latency: Duration::ZERO,
            sent: Mutex::new(Vec::new()),
            attempts: AtomicUsize::new(0),
            ticket_requests: AtomicUsize::new(0),
        }
    }

    /// Issue tickets with empty fields
    pub fn with_empty_ticket(self) -> Self {
        *lock(&self.ticket) = Some(LoginTicket {
            ticket: String::new(),
            verification_url: String::new(),
        });
        self
    }

    /// Queue a poll status
    pub fn with_poll(self, status: QrCodeStatus, credential_url: Option<&str>) -> Self {
        lock(&self.polls).push_back(Ok(PollOutcome {
            status,
            credential_url: credential_url.map(str::to_string),
        }));
        self
    }

    /// Queue a failing poll call
    pub fn with_poll_error(self) -> Self {
        lock(&self.polls).push_back(Err(ChatRelayError::Other("mock poll failure".to_string())));
        self
    }

    /// Reject every credential
    pub fn with_invalid_credential(mut self) -> Self {
        self.credential_valid = false;
        self
    }

    /// Accept credentials but fail the identity lookup
    pub fn with_identity_failure(mut self) -> Self {
        self.identity_fails = true;
        self
    }

    /// Make credential validation take `latency`
    pub fn with_auth_latency(mut self, latency: Duration) -> Self {
        self.auth_latency = latency;
        self
    }

    /// Fail the next `count` sends
    pub fn with_send_failures(self, count: usize) -> Self {
        self.send_failures.store(count, Ordering::SeqCst);
        self
    }

    /// Make each send take `latency`
    pub fn with_send_latency(mut self, latency: Duration) -> Self {
        self.send_latency = latency;
        self
    }

    pub fn fail_next_sends(&self, count: usize) {
        self.send_failures.store(count, Ordering::SeqCst);
    }

    /// Messages accepted so far, in order.
    pub fn sent(&self) -> Vec<SentMessage> {
        lock(&self.sent).clone()
    }

    pub fn sent_texts(&self) -> Vec<String> {
        lock(&self.sent).iter().map(|m| m.text.clone()).collect()
    }

    /// Send attempts including failed ones.
    pub fn send_attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    pub fn ticket_requests(&self) -> usize {
        self.ticket_requests.load(Ordering::SeqCst)
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

#[async_trait::async_trait]
impl PlatformApi for MockPlatform {
    async fn request_login_ticket(&self) -> Result<LoginTicket> {
        self.ticket_requests.fetch_add(1, Ordering::SeqCst);
        lock(&self.ticket)
            .clone()
            .ok_or_else(|| ChatRelayError::Other("mock has no ticket".to_string()))
    }

    async fn poll_login_ticket(&self, _ticket: &str) -> Result<PollOutcome> {
        lock(&self.polls).pop_front().unwrap_or(Ok(PollOutcome {
            status: QrCodeStatus::WaitingScan,
            credential_url: None,
        }))
    }

    async fn validate_credential(&self, credential: &Credential) -> Result<bool> {
        if !self.auth_latency.is_zero() {
            tokio::time::sleep(self.auth_latency).await;
        }
        Ok(self.credential_valid && credential.is_complete())
    }

    async fn fetch_identity(&self, _credential: &Credential) -> Result<Identity> {
        if !self.credential_valid {
            return Err(ChatRelayError::AuthFailure {
                message: "mock rejects credential".to_string(),
            });
        }
        if self.identity_fails {
            return Err(ChatRelayError::Platform {
                code: -101,
                message: "not logged in".to_string(),
            });
        }
        Ok(self.identity.clone())
    }

    async fn send_chat_message(
        &self,
        _credential: &Credential,
        room_id: &str,
        text: &str,
    ) -> Result<()> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if !self.send_latency.is_zero() {
            tokio::time::sleep(self.send_latency).await;
        }
        let failing = self
            .send_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(ChatRelayError::SendFailure {
                message: "mock send failure".to_string(),
            });
        }
        lock(&self.sent).push(SentMessage {
            room_id: room_id.to_string(),
            text: text.to_string(),
            at: tokio::time::Instant::now(),
        });
        Ok(())
    }
}
