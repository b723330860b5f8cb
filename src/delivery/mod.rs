//! Rate-limited delivery of chat messages.
//!
//! Text is split into chat-sized pieces and appended to a FIFO queue. A
//! single worker sends the head of the queue, waits the configured delay,
//! and repeats. A failed piece is moved to the tail and retried after a
//! fixed backoff, so delivery is at-least-once and may reorder after a
//! failure.

pub mod chunk;

use crate::config::{Config, ConfigStore};
use crate::defaults;
use crate::error::{ChatRelayError, Result};
use crate::platform::PlatformApi;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::{Mutex, watch};

pub use chunk::split_message;

/// Observer-facing view of the queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct QueueSnapshot {
    pub pending: usize,
    pub running: bool,
    pub delivered: u64,
    pub requeued: u64,
}

/// Receives the outcome of every send attempt.
pub trait DeliveryReporter: Send + Sync {
    fn delivered(&self, text: &str);

    fn failed(&self, text: &str, error: &ChatRelayError);
}

/// Reports outcomes through `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogReporter;

impl DeliveryReporter for LogReporter {
    fn delivered(&self, text: &str) {
        tracing::info!(%text, "chat message delivered");
    }

    fn failed(&self, text: &str, error: &ChatRelayError) {
        tracing::warn!(%text, %error, "chat message failed, requeued");
    }
}

pub struct DeliveryQueue {
    platform: Arc<dyn PlatformApi>,
    config: Arc<dyn ConfigStore>,
    reporter: Arc<dyn DeliveryReporter>,
    pending: Mutex<VecDeque<String>>,
    running: AtomicBool,
    should_run: watch::Sender<bool>,
    delivered: AtomicU64,
    requeued: AtomicU64,
}

impl DeliveryQueue {
    pub fn new(platform: Arc<dyn PlatformApi>, config: Arc<dyn ConfigStore>) -> Self {
        Self::with_reporter(platform, config, Arc::new(LogReporter))
    }

    pub fn with_reporter(
        platform: Arc<dyn PlatformApi>,
        config: Arc<dyn ConfigStore>,
        reporter: Arc<dyn DeliveryReporter>,
    ) -> Self {
        let (should_run, _rx) = watch::channel(false);
        Self {
            platform,
            config,
            reporter,
            pending: Mutex::new(VecDeque::new()),
            running: AtomicBool::new(false),
            should_run,
            delivered: AtomicU64::new(0),
            requeued: AtomicU64::new(0),
        }
    }

    /// Split `text` and append the pieces in order. Returns the piece count.
    ///
    /// The queue lock is held for the whole append, so pieces of two
    /// concurrent calls never interleave.
    pub async fn enqueue(&self, text: &str) -> usize {
        let max_len = self.config.config().chat.max_unit_length();
        let mut pending = self.pending.lock().await;
        let pieces = split_message(text, max_len);
        let count = pieces.len();
        pending.extend(pieces);
        if count > 0 {
            tracing::debug!(pieces = count, pending = pending.len(), "text enqueued");
        }
        count
    }

    /// Request the worker to run, spawning it if none is alive.
    ///
    /// If a stopping worker is still finishing a send, it simply keeps going.
    pub fn start(self: &Arc<Self>) {
        self.should_run.send_replace(true);
        if self.running.swap(true, Ordering::SeqCst) {
            return;
        }
        let queue = Arc::clone(self);
        tokio::spawn(async move { queue.run().await });
    }

    /// Ask the worker to exit. An in-flight send completes first; pending
    /// waits end immediately.
    pub fn stop(&self) {
        self.should_run.send_replace(false);
    }

    /// Drop every pending message.
    pub async fn clear(&self) {
        let mut pending = self.pending.lock().await;
        let dropped = pending.len();
        pending.clear();
        tracing::info!(dropped, "delivery queue cleared");
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub async fn snapshot(&self) -> QueueSnapshot {
        QueueSnapshot {
            pending: self.pending.lock().await.len(),
            running: self.is_running(),
            delivered: self.delivered.load(Ordering::SeqCst),
            requeued: self.requeued.load(Ordering::SeqCst),
        }
    }

    fn should_run(&self) -> bool {
        *self.should_run.borrow()
    }

    async fn run(self: Arc<Self>) {
        tracing::info!("delivery worker started");
        let guard = RunningGuard(&self.running);
        loop {
            while self.should_run() {
                self.step().await;
            }
            self.running.store(false, Ordering::SeqCst);
            // A start() that raced with our exit saw `running` still set and
            // did not spawn; pick its request up here.
            if !self.should_run() || self.running.swap(true, Ordering::SeqCst) {
                break;
            }
        }
        // `running` may already belong to a newer worker
        std::mem::forget(guard);
        tracing::info!("delivery worker stopped");
    }

    async fn step(&self) {
        let head = self.pending.lock().await.front().cloned();
        let Some(text) = head else {
            self.pause(defaults::QUEUE_IDLE_WAIT).await;
            return;
        };

        let config = self.config.config();
        match self.send(&config, &text).await {
            Ok(()) => {
                self.take_head(&text).await;
                self.delivered.fetch_add(1, Ordering::SeqCst);
                self.reporter.delivered(&text);
                self.pause(config.chat.send_delay()).await;
            }
            Err(e) => {
                if self.take_head(&text).await {
                    self.pending.lock().await.push_back(text.clone());
                    self.requeued.fetch_add(1, Ordering::SeqCst);
                }
                self.reporter.failed(&text, &e);
                self.pause(defaults::RETRY_BACKOFF).await;
            }
        }
    }

    /// Pop the head if it is still `text` (a clear may have raced the send).
    async fn take_head(&self, text: &str) -> bool {
        let mut pending = self.pending.lock().await;
        if pending.front().map(String::as_str) == Some(text) {
            pending.pop_front();
            true
        } else {
            false
        }
    }

    async fn send(&self, config: &Config, text: &str) -> Result<()> {
        let credential = config
            .credential
            .as_ref()
            .filter(|c| c.is_complete())
            .ok_or_else(|| ChatRelayError::SendFailure {
                message: "no login credential".to_string(),
            })?;
        if config.chat.room_id.trim().is_empty() {
            return Err(ChatRelayError::SendFailure {
                message: "no room id configured".to_string(),
            });
        }
        self.platform
            .send_chat_message(credential, config.chat.room_id.trim(), text)
            .await
    }

    /// Sleep for `duration`, returning early once a stop is requested.
    async fn pause(&self, duration: Duration) {
        let mut rx = self.should_run.subscribe();
        if !*rx.borrow_and_update() {
            return;
        }
        tokio::select! {
            _ = tokio::time::sleep(duration) => {}
            _ = rx.wait_for(|run| !*run) => {}
        }
    }
}

/// Clears the running flag if the worker task unwinds or is aborted.
struct RunningGuard<'a>(&'a AtomicBool);

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SharedConfig;
    use crate::platform::{Credential, MockPlatform};
    use std::sync::Mutex as StdMutex;

    #[derive(Default)]
    struct RecordingReporter {
        events: StdMutex<Vec<(String, bool)>>,
    }

    impl DeliveryReporter for RecordingReporter {
        fn delivered(&self, text: &str) {
            self.events.lock().unwrap().push((text.to_string(), true));
        }

        fn failed(&self, text: &str, _error: &ChatRelayError) {
            self.events.lock().unwrap().push((text.to_string(), false));
        }
    }

    fn connected_config() -> Config {
        let mut config = Config::default();
        config.chat.room_id = "1000".to_string();
        config.chat.send_delay = "1".to_string();
        config.credential = Some(Credential {
            user_id: "42".to_string(),
            csrf: "csrf".to_string(),
            cookie: "SESSDATA=abc".to_string(),
        });
        config
    }

    fn queue_with(
        platform: Arc<MockPlatform>,
        config: Config,
    ) -> (Arc<DeliveryQueue>, Arc<RecordingReporter>) {
        let reporter = Arc::new(RecordingReporter::default());
        let store: Arc<dyn ConfigStore> = Arc::new(SharedConfig::new(config));
        let queue = Arc::new(DeliveryQueue::with_reporter(
            platform,
            store,
            reporter.clone(),
        ));
        (queue, reporter)
    }

    #[tokio::test]
    async fn test_enqueue_splits_into_pieces() {
        let platform = Arc::new(MockPlatform::new());
        let (queue, _) = queue_with(platform, connected_config());

        let text: String = ('a'..='z').cycle().take(52).collect();
        assert_eq!(queue.enqueue(&text).await, 3);
        assert_eq!(queue.enqueue("").await, 0);

        let pending: Vec<usize> = queue
            .pending
            .lock()
            .await
            .iter()
            .map(|p| p.chars().count())
            .collect();
        assert_eq!(pending, vec![20, 20, 12]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_pieces_sent_in_order_with_delay() {
        let platform = Arc::new(MockPlatform::new());
        let (queue, reporter) = queue_with(platform.clone(), connected_config());

        let text: String = ('a'..='z').cycle().take(52).collect();
        queue.enqueue(&text).await;
        queue.start();

        tokio::time::sleep(Duration::from_millis(2500)).await;

        let sent = platform.sent();
        assert_eq!(sent.len(), 3);
        assert_eq!(sent.iter().map(|m| m.text.clone()).collect::<String>(), text);
        assert!(sent.iter().all(|m| m.room_id == "1000"));
        for pair in sent.windows(2) {
            assert!(
                pair[1].at - pair[0].at >= Duration::from_secs(1),
                "consecutive sends must be separated by the send delay"
            );
        }
        assert_eq!(reporter.events.lock().unwrap().len(), 3);
        assert_eq!(queue.snapshot().await.delivered, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_piece_moves_to_tail() {
        let platform = Arc::new(MockPlatform::new().with_send_failures(1));
        let (queue, reporter) = queue_with(platform.clone(), connected_config());

        queue.enqueue("first").await;
        queue.enqueue("second").await;
        queue.start();

        // Failure, 5s backoff, "second", 1s delay, "first"
        tokio::time::sleep(Duration::from_millis(6500)).await;

        assert_eq!(
            platform.sent_texts(),
            vec!["second".to_string(), "first".to_string()]
        );
        assert_eq!(
            *reporter.events.lock().unwrap(),
            vec![
                ("first".to_string(), false),
                ("second".to_string(), true),
                ("first".to_string(), true),
            ]
        );
        let snapshot = queue.snapshot().await;
        assert_eq!(snapshot.requeued, 1);
        assert_eq!(snapshot.pending, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_single_failure_then_success_delivers_once() {
        let platform = Arc::new(MockPlatform::new().with_send_failures(1));
        let (queue, _) = queue_with(platform.clone(), connected_config());

        queue.enqueue("only").await;
        queue.start();
        tokio::time::sleep(Duration::from_secs(6)).await;

        assert_eq!(platform.send_attempts(), 2);
        assert_eq!(platform.sent_texts(), vec!["only".to_string()]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_credential_requeues() {
        let platform = Arc::new(MockPlatform::new());
        let mut config = connected_config();
        config.credential = None;
        let (queue, reporter) = queue_with(platform.clone(), config);

        queue.enqueue("hello").await;
        queue.start();
        tokio::time::sleep(Duration::from_secs(12)).await;

        assert_eq!(platform.send_attempts(), 0);
        assert!(reporter.events.lock().unwrap().iter().all(|(_, ok)| !ok));
        assert_eq!(queue.snapshot().await.pending, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_mid_send_completes_then_exits() {
        let platform = Arc::new(MockPlatform::new().with_send_latency(Duration::from_secs(2)));
        let (queue, _) = queue_with(platform.clone(), connected_config());

        queue.enqueue("one").await;
        queue.enqueue("two").await;
        queue.start();

        tokio::time::sleep(Duration::from_millis(500)).await;
        queue.stop();
        assert!(queue.is_running(), "worker is still inside the send");

        tokio::time::sleep(Duration::from_secs(3)).await;
        assert!(!queue.is_running());
        assert_eq!(platform.sent_texts(), vec!["one".to_string()]);
        assert_eq!(queue.snapshot().await.pending, 1, "contents survive a stop");
    }

    #[tokio::test(start_paused = true)]
    async fn test_restart_while_stopping_keeps_single_worker() {
        let platform = Arc::new(MockPlatform::new().with_send_latency(Duration::from_secs(2)));
        let (queue, _) = queue_with(platform.clone(), connected_config());

        for text in ["a", "b", "c"] {
            queue.enqueue(text).await;
        }
        queue.start();
        tokio::time::sleep(Duration::from_millis(500)).await;
        queue.stop();
        queue.start();

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(platform.sent_texts(), vec!["a", "b", "c"]);
        assert_eq!(platform.send_attempts(), 3, "exactly one send in flight at a time");
        assert!(queue.is_running());
        queue.stop();
    }

    #[tokio::test]
    async fn test_concurrent_enqueues_do_not_interleave() {
        let platform = Arc::new(MockPlatform::new());
        let (queue, _) = queue_with(platform, connected_config());

        let a = "A".repeat(100);
        let b = "B".repeat(100);
        let (qa, qb) = (queue.clone(), queue.clone());
        let (ta, tb) = (a.clone(), b.clone());
        let h1 = tokio::spawn(async move { qa.enqueue(&ta).await });
        let h2 = tokio::spawn(async move { qb.enqueue(&tb).await });
        h1.await.unwrap();
        h2.await.unwrap();

        let pending: Vec<String> = queue.pending.lock().await.iter().cloned().collect();
        assert_eq!(pending.len(), 10);
        let joined = pending.concat();
        assert!(
            joined == format!("{a}{b}") || joined == format!("{b}{a}"),
            "pieces of one enqueue must stay contiguous"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_delay_change_applies_to_next_wait() {
        let platform = Arc::new(MockPlatform::new());
        let reporter = Arc::new(RecordingReporter::default());
        let shared = Arc::new(SharedConfig::new(connected_config()));
        let store: Arc<dyn ConfigStore> = shared.clone();
        let queue = Arc::new(DeliveryQueue::with_reporter(
            platform.clone(),
            store,
            reporter,
        ));

        queue.enqueue("one").await;
        queue.enqueue("two").await;
        shared.update(|config| config.chat.send_delay = "3".to_string());
        queue.start();

        tokio::time::sleep(Duration::from_millis(3500)).await;
        let sent = platform.sent();
        assert_eq!(sent.len(), 2);
        assert!(sent[1].at - sent[0].at >= Duration::from_secs(3));
    }

    #[tokio::test(start_paused = true)]
    async fn test_unrepresentable_delay_uses_default() {
        let platform = Arc::new(MockPlatform::new());
        let mut config = connected_config();
        config.chat.send_delay = "1e30".to_string();
        let (queue, _) = queue_with(platform.clone(), config);

        queue.enqueue("one").await;
        queue.enqueue("two").await;
        queue.start();

        tokio::time::sleep(defaults::SEND_DELAY + Duration::from_secs(1)).await;
        assert_eq!(platform.sent_texts(), vec!["one", "two"]);
        assert!(queue.is_running());
        queue.stop();
    }

    /// Panics on the first delivery, then behaves.
    #[derive(Default)]
    struct PanicOnceReporter {
        fired: AtomicBool,
    }

    impl DeliveryReporter for PanicOnceReporter {
        fn delivered(&self, _text: &str) {
            if !self.fired.swap(true, Ordering::SeqCst) {
                panic!("reporter failure");
            }
        }

        fn failed(&self, _text: &str, _error: &ChatRelayError) {}
    }

    #[tokio::test(start_paused = true)]
    async fn test_crashed_worker_can_be_restarted() {
        let platform = Arc::new(MockPlatform::new());
        let store: Arc<dyn ConfigStore> = Arc::new(SharedConfig::new(connected_config()));
        let queue = Arc::new(DeliveryQueue::with_reporter(
            platform.clone(),
            store,
            Arc::new(PanicOnceReporter::default()),
        ));

        queue.enqueue("one").await;
        queue.enqueue("two").await;
        queue.start();
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(!queue.is_running(), "a dead worker must not report running");

        queue.stop();
        queue.start();
        tokio::time::sleep(Duration::from_secs(3)).await;
        assert_eq!(platform.sent_texts(), vec!["one", "two"]);
        queue.stop();
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_after_clear_is_not_counted_as_requeue() {
        let platform = Arc::new(
            MockPlatform::new()
                .with_send_failures(1)
                .with_send_latency(Duration::from_secs(2)),
        );
        let (queue, _) = queue_with(platform, connected_config());

        queue.enqueue("x").await;
        queue.start();
        tokio::time::sleep(Duration::from_millis(500)).await;
        queue.clear().await;
        tokio::time::sleep(Duration::from_secs(2)).await;

        let snapshot = queue.snapshot().await;
        assert_eq!(snapshot.pending, 0);
        assert_eq!(snapshot.requeued, 0);
        queue.stop();
    }

    #[tokio::test]
    async fn test_clear_drops_pending() {
        let platform = Arc::new(MockPlatform::new());
        let (queue, _) = queue_with(platform, connected_config());
        queue.enqueue("x").await;
        queue.clear().await;
        assert_eq!(queue.snapshot().await, QueueSnapshot::default());
    }
}
