//! Session controller: login, connect, disconnect, logout.
//!
//! Owns the platform session state machine
//! (`disconnected -> connecting -> connected`), the QR-style login flow and
//! the running state of the delivery queue. Observers read it through
//! [`SessionSnapshot`]s.

pub mod credential;
pub mod poller;
pub mod surface;

use crate::config::ConfigStore;
use crate::defaults;
use crate::delivery::DeliveryQueue;
use crate::error::{ChatRelayError, Result};
use crate::platform::{Credential, Identity, PlatformApi, QrCodeStatus};
use poller::{PollEnd, PollState, poll_ticket};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use surface::{LoginSurface, SurfaceEvent, SurfaceLauncher};
use tokio::sync::{Mutex, mpsc, watch};
use tokio::task::JoinHandle;

pub use credential::parse_credential_url;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    #[default]
    Disconnected,
    Connecting,
    Connected,
}

impl std::fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            SessionStatus::Disconnected => "disconnected",
            SessionStatus::Connecting => "connecting",
            SessionStatus::Connected => "connected",
        };
        f.write_str(name)
    }
}

/// An in-flight login attempt as seen by observers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoginSession {
    pub ticket: String,
    pub verification_url: String,
    /// Status reported by the most recent poll.
    pub status: Option<QrCodeStatus>,
    pub poll_state: PollState,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct SessionSnapshot {
    pub status: SessionStatus,
    pub identity: Option<Identity>,
    pub login: Option<LoginSession>,
}

/// Resources held by one login attempt.
struct LoginAttempt {
    verification_url: String,
    surface: Arc<dyn LoginSurface>,
    listener: JoinHandle<()>,
    poller: JoinHandle<()>,
}

impl LoginAttempt {
    fn is_polling(&self) -> bool {
        !self.poller.is_finished()
    }

    fn teardown(self) {
        self.poller.abort();
        self.listener.abort();
        self.surface.close();
    }
}

pub struct SessionController {
    platform: Arc<dyn PlatformApi>,
    config: Arc<dyn ConfigStore>,
    queue: Arc<DeliveryQueue>,
    launcher: Arc<dyn SurfaceLauncher>,
    state: watch::Sender<SessionSnapshot>,
    attempt: Mutex<Option<LoginAttempt>>,
    poll_interval: Duration,
    /// Bumped by every disconnect; a connect only commits if it is unchanged.
    epoch: AtomicU64,
    this: Weak<SessionController>,
}

impl SessionController {
    pub fn new(
        platform: Arc<dyn PlatformApi>,
        config: Arc<dyn ConfigStore>,
        queue: Arc<DeliveryQueue>,
        launcher: Arc<dyn SurfaceLauncher>,
    ) -> Arc<Self> {
        Self::with_poll_interval(platform, config, queue, launcher, defaults::POLL_INTERVAL)
    }

    pub fn with_poll_interval(
        platform: Arc<dyn PlatformApi>,
        config: Arc<dyn ConfigStore>,
        queue: Arc<DeliveryQueue>,
        launcher: Arc<dyn SurfaceLauncher>,
        poll_interval: Duration,
    ) -> Arc<Self> {
        let (state, _rx) = watch::channel(SessionSnapshot::default());
        Arc::new_cyclic(|this| Self {
            platform,
            config,
            queue,
            launcher,
            state,
            attempt: Mutex::new(None),
            poll_interval,
            epoch: AtomicU64::new(0),
            this: this.clone(),
        })
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.state.subscribe()
    }

    pub fn status(&self) -> SessionStatus {
        self.state.borrow().status
    }

    pub fn queue(&self) -> &Arc<DeliveryQueue> {
        &self.queue
    }

    /// Start a login attempt.
    ///
    /// If one is already polling and its surface can be focused, this is a
    /// no-op. Otherwise any previous attempt is torn down first.
    #[tracing::instrument(skip_all)]
    pub async fn login(&self) -> Result<()> {
        let mut attempt = self.attempt.lock().await;
        if let Some(current) = attempt.as_ref()
            && current.is_polling()
            && current.surface.focus().is_ok()
        {
            tracing::info!("login already in progress");
            return Ok(());
        }
        if let Some(previous) = attempt.take() {
            tracing::debug!("tearing down previous login attempt");
            previous.teardown();
        }
        self.set_login(None);

        let ticket = self.platform.request_login_ticket().await.map_err(|e| {
            tracing::error!(error = %e, "failed to request login ticket");
            ChatRelayError::AuthFailure {
                message: format!("login ticket request failed: {}", e),
            }
        })?;
        if ticket.ticket.is_empty() || ticket.verification_url.is_empty() {
            let field = if ticket.ticket.is_empty() {
                "ticket"
            } else {
                "verification_url"
            };
            tracing::error!(field, "login ticket response incomplete");
            return Err(ChatRelayError::ConfigMissing {
                field: field.to_string(),
            });
        }

        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let surface = self.launcher.launch(events_tx)?;
        let listener = self.spawn_listener(events_rx);
        let poller = self.spawn_poller(ticket.ticket.clone(), surface.clone());

        self.set_login(Some(LoginSession {
            ticket: ticket.ticket,
            verification_url: ticket.verification_url.clone(),
            status: None,
            poll_state: PollState::Polling,
        }));
        *attempt = Some(LoginAttempt {
            verification_url: ticket.verification_url,
            surface,
            listener,
            poller,
        });
        tracing::info!("login started, waiting for confirmation");
        Ok(())
    }

    /// Validate the stored credential and go online.
    ///
    /// Any failure logs out, leaving the session disconnected with no
    /// identity. A `disconnect` issued while this is validating wins: the
    /// session stays offline.
    #[tracing::instrument(skip_all)]
    pub async fn connect(&self) -> Result<()> {
        let mut epoch = 0;
        self.state.send_modify(|state| {
            epoch = self.epoch.load(Ordering::SeqCst);
            state.status = SessionStatus::Connecting;
        });

        match self.authenticate().await {
            Ok(identity) => {
                let (name, uid) = (identity.name.clone(), identity.user_id);
                let committed = self.state.send_if_modified(|state| {
                    if self.epoch.load(Ordering::SeqCst) != epoch {
                        return false;
                    }
                    state.status = SessionStatus::Connected;
                    state.identity = Some(identity);
                    self.queue.start();
                    true
                });
                if committed {
                    tracing::info!(user = %name, uid, "connected");
                } else {
                    tracing::info!("disconnected while connecting, staying offline");
                }
                Ok(())
            }
            Err(e) => {
                tracing::warn!(error = %e, "connect failed, logging out");
                self.logout().await;
                Err(e)
            }
        }
    }

    /// Go offline, keeping identity and credential.
    pub async fn disconnect(&self) {
        self.state.send_modify(|state| {
            self.epoch.fetch_add(1, Ordering::SeqCst);
            state.status = SessionStatus::Disconnected;
            state.login = None;
        });
        self.queue.stop();
        if let Some(attempt) = self.attempt.lock().await.take() {
            attempt.teardown();
        }
        tracing::info!("disconnected");
    }

    /// Disconnect and forget the identity and stored credential.
    ///
    /// Pending chat messages are kept; see [`DeliveryQueue::clear`].
    pub async fn logout(&self) {
        self.disconnect().await;
        self.state.send_modify(|state| state.identity = None);
        if let Err(e) = self.config.clear_credential() {
            tracing::error!(error = %e, "failed to clear stored credential");
        }
        tracing::info!("logged out");
    }

    /// Connect at startup when enabled and a credential is stored.
    ///
    /// Returns whether a connect was attempted and succeeded.
    pub async fn restore(&self) -> Result<bool> {
        let config = self.config.config();
        if !config.chat.enable {
            tracing::debug!("chat disabled, not restoring session");
            return Ok(false);
        }
        if !config.credential.as_ref().is_some_and(Credential::is_complete) {
            tracing::debug!("no stored credential, not restoring session");
            return Ok(false);
        }
        self.connect().await.map(|()| true)
    }

    /// React to the chat master switch being flipped.
    pub async fn on_chat_enable_changed(&self, enabled: bool) -> Result<()> {
        if enabled {
            if self.state.borrow().identity.is_some() {
                return self.connect().await;
            }
            tracing::debug!("chat enabled without a previous login");
            Ok(())
        } else {
            self.disconnect().await;
            Ok(())
        }
    }

    async fn authenticate(&self) -> Result<Identity> {
        let credential = self
            .config
            .config()
            .credential
            .filter(Credential::is_complete)
            .ok_or_else(|| ChatRelayError::AuthFailure {
                message: "no stored credential".to_string(),
            })?;

        match self.platform.validate_credential(&credential).await {
            Ok(true) => {}
            Ok(false) => {
                return Err(ChatRelayError::AuthFailure {
                    message: "stored credential was rejected".to_string(),
                });
            }
            Err(e) => {
                return Err(ChatRelayError::AuthFailure {
                    message: format!("credential validation failed: {}", e),
                });
            }
        }

        self.platform
            .fetch_identity(&credential)
            .await
            .map_err(|e| match e {
                ChatRelayError::AuthFailure { .. } => e,
                other => ChatRelayError::AuthFailure {
                    message: format!("identity fetch failed: {}", other),
                },
            })
    }

    /// Finish a login from the confirmation URL.
    ///
    /// An incomplete credential is reported and the attempt stays open.
    async fn complete_login(&self, url: &str) -> Result<()> {
        let mut slot = self.attempt.lock().await;
        if slot.is_none() {
            tracing::debug!("login confirmation without an attempt in flight");
            return Ok(());
        }
        let credential = match parse_credential_url(url) {
            Ok(credential) => credential,
            Err(e) => {
                tracing::error!(error = %e, "login confirmation rejected");
                return Err(e);
            }
        };
        let Some(attempt) = slot.take() else {
            return Ok(());
        };
        drop(slot);

        tracing::info!(uid = %credential.user_id, "login confirmed, saving credential");
        let result = match self.config.save_credential(&credential) {
            Ok(()) => self.connect().await,
            Err(e) => Err(e),
        };
        attempt.teardown();
        self.set_login(None);
        result
    }

    async fn abandon_login(&self) {
        if let Some(attempt) = self.attempt.lock().await.take() {
            tracing::info!("login surface closed, abandoning login");
            attempt.teardown();
        }
        self.set_login(None);
    }

    async fn handle_surface_event(&self, event: SurfaceEvent) {
        match event {
            SurfaceEvent::Ready => {
                let attempt = self.attempt.lock().await;
                if let Some(attempt) = attempt.as_ref()
                    && let Err(e) = attempt.surface.deliver_verification(&attempt.verification_url)
                {
                    tracing::warn!(error = %e, "could not deliver verification URL");
                }
            }
            SurfaceEvent::Refresh => {
                if let Some(previous) = self.attempt.lock().await.take() {
                    previous.teardown();
                }
                if let Err(e) = self.login().await {
                    tracing::error!(error = %e, "login refresh failed");
                }
            }
            SurfaceEvent::Success { url } => {
                if let Err(e) = self.complete_login(&url).await {
                    tracing::error!(error = %e, "login failed");
                }
            }
            SurfaceEvent::Closed => self.abandon_login().await,
        }
    }

    /// Forward surface events. Everything but `Ready` runs on its own task
    /// because it may tear down this listener.
    fn spawn_listener(&self, mut events: mpsc::UnboundedReceiver<SurfaceEvent>) -> JoinHandle<()> {
        let this = self.this.clone();
        tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                let Some(controller) = this.upgrade() else {
                    break;
                };
                if event == SurfaceEvent::Ready {
                    controller.handle_surface_event(event).await;
                } else {
                    tokio::spawn(async move { controller.handle_surface_event(event).await });
                }
            }
        })
    }

    fn spawn_poller(&self, ticket: String, surface: Arc<dyn LoginSurface>) -> JoinHandle<()> {
        let this = self.this.clone();
        let platform = Arc::clone(&self.platform);
        let interval = self.poll_interval;
        tokio::spawn(async move {
            let status_hook = {
                let this = this.clone();
                move |status: QrCodeStatus| {
                    if let Some(controller) = this.upgrade() {
                        controller.update_login(|login| login.status = Some(status));
                    }
                }
            };
            let end = poll_ticket(
                platform.as_ref(),
                &ticket,
                surface.as_ref(),
                interval,
                status_hook,
            )
            .await;

            let Some(controller) = this.upgrade() else {
                return;
            };
            match end {
                PollEnd::Succeeded(url) => {
                    controller.update_login(|login| login.poll_state = PollState::Succeeded);
                    if let Some(url) = url {
                        tokio::spawn(async move {
                            if let Err(e) = controller.complete_login(&url).await {
                                tracing::error!(error = %e, "login failed");
                            }
                        });
                    }
                }
                PollEnd::Expired => {
                    tracing::info!("login code expired, start a new login");
                    controller.update_login(|login| login.poll_state = PollState::Expired);
                }
                PollEnd::Abandoned => {
                    tokio::spawn(async move { controller.abandon_login().await });
                }
            }
        })
    }

    fn set_login(&self, login: Option<LoginSession>) {
        self.state.send_modify(|state| state.login = login);
    }

    fn update_login(&self, edit: impl FnOnce(&mut LoginSession)) {
        self.state.send_modify(|state| {
            if let Some(login) = state.login.as_mut() {
                edit(login);
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Config, SharedConfig};
    use crate::platform::MockPlatform;
    use surface::{MockLauncher, SurfaceCall};

    const SUCCESS_URL: &str =
        "https://passport.biligame.com/crossDomain?DedeUserID=42&SESSDATA=sess&bili_jct=csrf";

    struct Fixture {
        controller: Arc<SessionController>,
        platform: Arc<MockPlatform>,
        config: Arc<SharedConfig>,
        launcher: Arc<MockLauncher>,
    }

    fn stored_credential() -> Credential {
        Credential {
            user_id: "42".to_string(),
            csrf: "csrf".to_string(),
            cookie: "SESSDATA=sess".to_string(),
        }
    }

    fn fixture_with(platform: MockPlatform, launcher: MockLauncher, config: Config) -> Fixture {
        let platform = Arc::new(platform);
        let config = Arc::new(SharedConfig::new(config));
        let launcher = Arc::new(launcher);
        let queue = Arc::new(DeliveryQueue::new(platform.clone(), config.clone()));
        let controller = SessionController::new(
            platform.clone(),
            config.clone(),
            queue,
            launcher.clone(),
        );
        Fixture {
            controller,
            platform,
            config,
            launcher,
        }
    }

    fn fixture(platform: MockPlatform) -> Fixture {
        fixture_with(platform, MockLauncher::new(), Config::default())
    }

    fn logged_in_config() -> Config {
        let mut config = Config::default();
        config.chat.enable = true;
        config.credential = Some(stored_credential());
        config
    }

    async fn settle() {
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    #[tokio::test]
    async fn test_connect_with_valid_credential() {
        let f = fixture_with(MockPlatform::new(), MockLauncher::new(), logged_in_config());

        f.controller.connect().await.unwrap();

        let snapshot = f.controller.snapshot();
        assert_eq!(snapshot.status, SessionStatus::Connected);
        assert_eq!(snapshot.identity.unwrap().name, "tester");
        assert!(f.controller.queue().is_running());
    }

    #[tokio::test]
    async fn test_connect_with_invalid_credential_logs_out() {
        let f = fixture_with(
            MockPlatform::new().with_invalid_credential(),
            MockLauncher::new(),
            logged_in_config(),
        );

        let err = f.controller.connect().await.unwrap_err();
        assert!(err.is_auth(), "unexpected error: {}", err);

        let snapshot = f.controller.snapshot();
        assert_eq!(snapshot.status, SessionStatus::Disconnected);
        assert_eq!(snapshot.identity, None);
        assert_eq!(f.config.config().credential, None, "credential must be cleared");
        assert!(!f.controller.queue().is_running());
    }

    #[tokio::test]
    async fn test_connect_with_failing_identity_logs_out() {
        let f = fixture_with(
            MockPlatform::new().with_identity_failure(),
            MockLauncher::new(),
            logged_in_config(),
        );

        let err = f.controller.connect().await.unwrap_err();
        assert!(err.is_auth(), "unexpected error: {}", err);

        let snapshot = f.controller.snapshot();
        assert_eq!(snapshot.status, SessionStatus::Disconnected);
        assert_eq!(snapshot.identity, None);
        assert_eq!(f.config.config().credential, None, "credential must be cleared");
        assert!(!f.controller.queue().is_running());
    }

    #[tokio::test(start_paused = true)]
    async fn test_disconnect_during_connect_stays_offline() {
        let f = fixture_with(
            MockPlatform::new().with_auth_latency(Duration::from_secs(1)),
            MockLauncher::new(),
            logged_in_config(),
        );

        let controller = f.controller.clone();
        let connecting = tokio::spawn(async move { controller.connect().await });
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(f.controller.status(), SessionStatus::Connecting);

        f.controller.disconnect().await;
        connecting.await.unwrap().unwrap();

        assert_eq!(f.controller.status(), SessionStatus::Disconnected);
        assert!(!f.controller.queue().is_running());
        assert_eq!(
            f.config.config().credential,
            Some(stored_credential()),
            "disconnect keeps the credential"
        );

        // A later connect is not affected
        f.controller.connect().await.unwrap();
        assert_eq!(f.controller.status(), SessionStatus::Connected);
    }

    #[tokio::test]
    async fn test_connect_without_credential_fails() {
        let f = fixture(MockPlatform::new());
        assert!(matches!(
            f.controller.connect().await,
            Err(ChatRelayError::AuthFailure { .. })
        ));
        assert_eq!(f.controller.status(), SessionStatus::Disconnected);
    }

    #[tokio::test]
    async fn test_connect_status_passes_through_connecting() {
        let f = fixture_with(MockPlatform::new(), MockLauncher::new(), logged_in_config());
        let mut rx = f.controller.subscribe();

        let watcher = tokio::spawn(async move {
            let mut seen = Vec::new();
            while rx.changed().await.is_ok() {
                let status = rx.borrow_and_update().status;
                seen.push(status);
                if status == SessionStatus::Connected {
                    break;
                }
            }
            seen
        });
        f.controller.connect().await.unwrap();

        let seen = watcher.await.unwrap();
        assert_eq!(seen.last(), Some(&SessionStatus::Connected));
    }

    #[tokio::test(start_paused = true)]
    async fn test_login_success_connects_and_closes_surface() {
        let f = fixture(
            MockPlatform::new()
                .with_poll(QrCodeStatus::WaitingScan, None)
                .with_poll(QrCodeStatus::Success, Some(SUCCESS_URL)),
        );

        f.controller.login().await.unwrap();
        settle().await;

        let login = f.controller.snapshot().login.unwrap();
        assert_eq!(login.poll_state, PollState::Polling);
        assert_eq!(login.ticket, "ticket-1");

        tokio::time::sleep(Duration::from_secs(7)).await;
        settle().await;

        let snapshot = f.controller.snapshot();
        assert_eq!(snapshot.status, SessionStatus::Connected);
        assert_eq!(snapshot.login, None);
        assert_eq!(f.config.config().credential, Some(stored_credential()));

        let (surface, _) = f.launcher.last().unwrap();
        let calls = surface.calls();
        assert_eq!(
            calls.first(),
            Some(&SurfaceCall::Verification(
                "https://example.test/qr?key=ticket-1".to_string()
            ))
        );
        assert!(calls.contains(&SurfaceCall::Status(QrCodeStatus::WaitingScan)));
        assert_eq!(calls.last(), Some(&SurfaceCall::Close));
    }

    #[tokio::test(start_paused = true)]
    async fn test_expired_code_stays_disconnected() {
        let f = fixture(MockPlatform::new().with_poll(QrCodeStatus::Expired, None));

        f.controller.login().await.unwrap();
        tokio::time::sleep(Duration::from_secs(4)).await;
        settle().await;

        let snapshot = f.controller.snapshot();
        assert_eq!(snapshot.status, SessionStatus::Disconnected);
        let login = snapshot.login.unwrap();
        assert_eq!(login.poll_state, PollState::Expired);
        assert_eq!(login.status, Some(QrCodeStatus::Expired));

        // No automatic retry; a new login requests a fresh ticket
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(f.platform.ticket_requests(), 1);
        f.controller.login().await.unwrap();
        assert_eq!(f.platform.ticket_requests(), 2);
        assert_eq!(f.launcher.launched(), 2);
    }

    #[tokio::test]
    async fn test_empty_ticket_is_config_missing() {
        let f = fixture(MockPlatform::new().with_empty_ticket());

        let err = f.controller.login().await.unwrap_err();
        assert!(matches!(err, ChatRelayError::ConfigMissing { .. }));
        assert_eq!(f.launcher.launched(), 0, "no surface without a ticket");
        assert_eq!(f.controller.snapshot().login, None);
    }

    #[tokio::test]
    async fn test_login_reentry_focuses_existing_surface() {
        let f = fixture(MockPlatform::new());

        f.controller.login().await.unwrap();
        f.controller.login().await.unwrap();

        assert_eq!(f.platform.ticket_requests(), 1);
        assert_eq!(f.launcher.launched(), 1);
        let (surface, _) = f.launcher.last().unwrap();
        assert!(surface.calls().contains(&SurfaceCall::Focus));
        f.controller.disconnect().await;
    }

    #[tokio::test]
    async fn test_login_reentry_replaces_unfocusable_surface() {
        let f = fixture_with(
            MockPlatform::new(),
            MockLauncher::new().with_focus_failure(),
            Config::default(),
        );

        f.controller.login().await.unwrap();
        let (first, _) = f.launcher.last().unwrap();
        f.controller.login().await.unwrap();

        assert_eq!(f.platform.ticket_requests(), 2);
        assert_eq!(f.launcher.launched(), 2);
        assert!(!first.is_open(), "previous surface must be closed");
        f.controller.disconnect().await;
    }

    #[tokio::test]
    async fn test_incomplete_credential_persists_nothing() {
        let f = fixture(MockPlatform::new());
        f.controller.login().await.unwrap();
        let (surface, events) = f.launcher.last().unwrap();

        events
            .send(SurfaceEvent::Success {
                url: "https://x.test/?DedeUserID=42&SESSDATA=sess".to_string(),
            })
            .unwrap();
        settle().await;

        assert_eq!(f.config.config().credential, None);
        assert_eq!(f.controller.status(), SessionStatus::Disconnected);
        assert!(surface.is_open(), "the attempt stays open for another try");
        assert!(f.controller.snapshot().login.is_some());
        f.controller.disconnect().await;
    }

    #[tokio::test]
    async fn test_surface_success_event_connects() {
        let f = fixture(MockPlatform::new());
        f.controller.login().await.unwrap();
        let (surface, events) = f.launcher.last().unwrap();

        events
            .send(SurfaceEvent::Success {
                url: SUCCESS_URL.to_string(),
            })
            .unwrap();
        settle().await;

        assert_eq!(f.controller.status(), SessionStatus::Connected);
        assert!(!surface.is_open());
    }

    #[tokio::test]
    async fn test_refresh_restarts_login() {
        let f = fixture(MockPlatform::new());
        f.controller.login().await.unwrap();
        let (first, events) = f.launcher.last().unwrap();

        events.send(SurfaceEvent::Refresh).unwrap();
        settle().await;

        assert_eq!(f.platform.ticket_requests(), 2);
        assert_eq!(f.launcher.launched(), 2);
        assert!(!first.is_open());
        f.controller.disconnect().await;
    }

    #[tokio::test]
    async fn test_closed_surface_abandons_login() {
        let f = fixture(MockPlatform::new());
        f.controller.login().await.unwrap();
        let (_, events) = f.launcher.last().unwrap();

        events.send(SurfaceEvent::Closed).unwrap();
        settle().await;

        assert_eq!(f.controller.snapshot().login, None);
    }

    #[tokio::test]
    async fn test_disconnect_keeps_identity_logout_clears_it() {
        let f = fixture_with(MockPlatform::new(), MockLauncher::new(), logged_in_config());
        f.controller.connect().await.unwrap();
        f.controller.queue().enqueue("pending text").await;

        f.controller.disconnect().await;
        let snapshot = f.controller.snapshot();
        assert_eq!(snapshot.status, SessionStatus::Disconnected);
        assert!(snapshot.identity.is_some());
        assert!(f.config.config().credential.is_some());

        f.controller.logout().await;
        let snapshot = f.controller.snapshot();
        assert_eq!(snapshot.identity, None);
        assert_eq!(f.config.config().credential, None);
        assert!(
            f.controller.queue().snapshot().await.pending > 0,
            "logout does not clear the queue"
        );
    }

    #[tokio::test]
    async fn test_restore_requires_enable_and_credential() {
        let mut disabled = logged_in_config();
        disabled.chat.enable = false;
        let f = fixture_with(MockPlatform::new(), MockLauncher::new(), disabled);
        assert!(!f.controller.restore().await.unwrap());
        assert_eq!(f.controller.status(), SessionStatus::Disconnected);

        let mut no_credential = logged_in_config();
        no_credential.credential = None;
        let f = fixture_with(MockPlatform::new(), MockLauncher::new(), no_credential);
        assert!(!f.controller.restore().await.unwrap());

        let f = fixture_with(MockPlatform::new(), MockLauncher::new(), logged_in_config());
        assert!(f.controller.restore().await.unwrap());
        assert_eq!(f.controller.status(), SessionStatus::Connected);
    }

    #[tokio::test]
    async fn test_chat_enable_flip() {
        let f = fixture_with(MockPlatform::new(), MockLauncher::new(), logged_in_config());

        // Never connected: enabling does nothing
        f.controller.on_chat_enable_changed(true).await.unwrap();
        assert_eq!(f.controller.status(), SessionStatus::Disconnected);

        f.controller.connect().await.unwrap();
        f.controller.on_chat_enable_changed(false).await.unwrap();
        assert_eq!(f.controller.status(), SessionStatus::Disconnected);

        f.controller.on_chat_enable_changed(true).await.unwrap();
        assert_eq!(f.controller.status(), SessionStatus::Connected);
    }
}
