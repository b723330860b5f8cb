//! Login surfaces.
//!
//! A login surface is whatever shows the verification URL to the user (a
//! window, a terminal, a web page). It talks back to the session controller
//! only through [`SurfaceEvent`]s on the channel handed to it at launch.

use crate::error::{ChatRelayError, Result};
use crate::platform::QrCodeStatus;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

/// Messages a login surface sends to the controller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SurfaceEvent {
    /// The surface can receive the verification URL.
    Ready,
    /// The user asked for a new code.
    Refresh,
    /// The surface observed the confirmation URL carrying the credential.
    Success { url: String },
    /// The user dismissed the surface.
    Closed,
}

pub type SurfaceEvents = mpsc::UnboundedSender<SurfaceEvent>;

pub trait LoginSurface: Send + Sync {
    /// Bring the surface to the foreground.
    fn focus(&self) -> Result<()>;

    fn deliver_verification(&self, url: &str) -> Result<()>;

    /// Show the latest poll status.
    fn show_status(&self, status: QrCodeStatus, credential_url: Option<&str>);

    fn close(&self);

    fn is_open(&self) -> bool;
}

/// Opens login surfaces.
pub trait SurfaceLauncher: Send + Sync {
    fn launch(&self, events: SurfaceEvents) -> Result<Arc<dyn LoginSurface>>;
}

/// Surface that prints the URL and status changes to stderr.
pub struct TerminalSurface {
    open: AtomicBool,
    last_status: Mutex<Option<QrCodeStatus>>,
}

impl TerminalSurface {
    fn new() -> Self {
        Self {
            open: AtomicBool::new(true),
            last_status: Mutex::new(None),
        }
    }
}

impl LoginSurface for TerminalSurface {
    fn focus(&self) -> Result<()> {
        if !self.is_open() {
            return Err(ChatRelayError::LoginSurface {
                message: "terminal surface is closed".to_string(),
            });
        }
        eprintln!("Login already in progress, see the URL above.");
        Ok(())
    }

    fn deliver_verification(&self, url: &str) -> Result<()> {
        eprintln!("Open this URL with the mobile app to log in:\n  {url}");
        Ok(())
    }

    fn show_status(&self, status: QrCodeStatus, _credential_url: Option<&str>) {
        let mut last = self.last_status.lock().unwrap_or_else(|e| e.into_inner());
        if *last != Some(status) {
            eprintln!("Login: {}", status.describe());
            *last = Some(status);
        }
    }

    fn close(&self) {
        self.open.store(false, Ordering::SeqCst);
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }
}

/// Launches [`TerminalSurface`]s, which are ready immediately.
#[derive(Debug, Default, Clone, Copy)]
pub struct TerminalLauncher;

impl SurfaceLauncher for TerminalLauncher {
    fn launch(&self, events: SurfaceEvents) -> Result<Arc<dyn LoginSurface>> {
        events
            .send(SurfaceEvent::Ready)
            .map_err(|_| ChatRelayError::LoginSurface {
                message: "controller stopped listening".to_string(),
            })?;
        Ok(Arc::new(TerminalSurface::new()))
    }
}

/// What a [`MockSurface`] was asked to do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SurfaceCall {
    Focus,
    Verification(String),
    Status(QrCodeStatus),
    Close,
}

/// Mock surface for testing
///
/// Records every call; the launcher keeps the event sender so tests can act
/// as the user.
#[derive(Debug, Default)]
pub struct MockSurface {
    calls: Mutex<Vec<SurfaceCall>>,
    closed: AtomicBool,
    focus_fails: bool,
}

impl MockSurface {
    pub fn calls(&self) -> Vec<SurfaceCall> {
        self.calls.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    fn record(&self, call: SurfaceCall) {
        self.calls.lock().unwrap_or_else(|e| e.into_inner()).push(call);
    }
}

impl LoginSurface for MockSurface {
    fn focus(&self) -> Result<()> {
        self.record(SurfaceCall::Focus);
        if self.focus_fails || !self.is_open() {
            return Err(ChatRelayError::LoginSurface {
                message: "mock surface cannot focus".to_string(),
            });
        }
        Ok(())
    }

    fn deliver_verification(&self, url: &str) -> Result<()> {
        self.record(SurfaceCall::Verification(url.to_string()));
        Ok(())
    }

    fn show_status(&self, status: QrCodeStatus, _credential_url: Option<&str>) {
        self.record(SurfaceCall::Status(status));
    }

    fn close(&self) {
        self.record(SurfaceCall::Close);
        self.closed.store(true, Ordering::SeqCst);
    }

    fn is_open(&self) -> bool {
        !self.closed.load(Ordering::SeqCst)
    }
}

/// Launcher for [`MockSurface`]s
#[derive(Default)]
pub struct MockLauncher {
    surfaces: Mutex<Vec<(Arc<MockSurface>, SurfaceEvents)>>,
    focus_fails: bool,
    auto_ready: bool,
}

impl MockLauncher {
    pub fn new() -> Self {
        Self {
            auto_ready: true,
            ..Self::default()
        }
    }

    /// Surfaces refuse to come to the foreground
    pub fn with_focus_failure(mut self) -> Self {
        self.focus_fails = true;
        self
    }

    /// Surfaces do not announce readiness on their own
    pub fn without_ready(mut self) -> Self {
        self.auto_ready = false;
        self
    }

    pub fn launched(&self) -> usize {
        self.surfaces.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// The most recently launched surface and its event sender.
    pub fn last(&self) -> Option<(Arc<MockSurface>, SurfaceEvents)> {
        self.surfaces
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .last()
            .cloned()
    }
}

impl SurfaceLauncher for MockLauncher {
    fn launch(&self, events: SurfaceEvents) -> Result<Arc<dyn LoginSurface>> {
        let surface = Arc::new(MockSurface {
            focus_fails: self.focus_fails,
            ..MockSurface::default()
        });
        if self.auto_ready {
            let _ = events.send(SurfaceEvent::Ready);
        }
        self.surfaces
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push((surface.clone(), events));
        Ok(surface)
    }
}
