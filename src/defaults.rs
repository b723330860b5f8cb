//! Default configuration constants for chatrelay.
//!
//! Shared by the configuration types and the runtime components so that the
//! timings below are defined in one place.

use std::time::Duration;

/// Default maximum length of a single outbound chat message, in characters.
///
/// Every character counts as one unit regardless of script.
pub const MAX_UNIT_LENGTH: usize = 20;

/// Default delay between two delivered chat messages.
pub const SEND_DELAY: Duration = Duration::from_secs(5);

/// How long the delivery worker sleeps when the queue is empty.
pub const QUEUE_IDLE_WAIT: Duration = Duration::from_secs(1);

/// Fixed backoff after a failed delivery before the next attempt.
pub const RETRY_BACKOFF: Duration = Duration::from_secs(5);

/// Interval between two login-ticket polls.
pub const POLL_INTERVAL: Duration = Duration::from_secs(3);

/// Timeout applied to every platform HTTP request.
pub const HTTP_TIMEOUT: Duration = Duration::from_secs(60);

/// Default bus source whose final events are posted to chat.
pub const CHAT_POST_SOURCE: &str = "stt";

/// Default OpenAI-compatible API base URL.
pub const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";

/// Default translation model.
pub const OPENAI_TRANSLATION_MODEL: &str = "gpt-4o-mini";

/// Default transcription model.
pub const OPENAI_TRANSCRIPTION_MODEL: &str = "whisper-1";

/// Default system prompt for the OpenAI translator.
pub const OPENAI_SYSTEM_PROMPT: &str =
    "You are a professional, authentic machine translation engine.";

/// Default Azure Translator endpoint.
pub const AZURE_TRANSLATOR_ENDPOINT: &str = "https://api.cognitive.microsofttranslator.com";

/// Default silence timeout before the recognition backend stops itself.
pub const SILENCE_TIMEOUT: Duration = Duration::from_secs(20);

/// Sample rate expected for recognition clips.
pub const SAMPLE_RATE: u32 = 16000;

/// Capacity of the event bus broadcast channel.
pub const EVENT_BUS_CAPACITY: usize = 256;
