use crate::backend::{RecognitionBackendKind, TranslationBackendKind};
use crate::defaults;
use crate::error::{ChatRelayError, Result};
use crate::events::TextEventSource;
use crate::platform::Credential;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::watch;

/// Root configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct Config {
    pub chat: ChatConfig,
    /// Persisted login credential, written after a successful login.
    pub credential: Option<Credential>,
    pub translation: TranslationConfig,
    pub recognition: RecognitionConfig,
}

/// Live-chat relay configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ChatConfig {
    /// Master switch for the chat relay.
    pub enable: bool,
    /// Post final events from `post_source`.
    pub post_enable: bool,
    /// Live-gate flag, interpreted according to `live_gate`.
    pub post_live: bool,
    /// Also post text typed by the operator.
    pub post_input: bool,
    pub post_source: TextEventSource,
    /// Delay between messages: bare seconds ("3") or a duration ("1500ms").
    pub send_delay: String,
    pub room_id: String,
    pub max_unit_length: usize,
    pub live_gate: LiveGatePolicy,
}

/// How the `post_live` flag gates posting.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum LiveGatePolicy {
    /// With the flag on, posting requires a connected session and is then
    /// still refused at the final check. The flag therefore disables posting.
    #[default]
    Observed,
    /// With the flag on, post only while connected.
    LiveOnly,
}

/// Translation host configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TranslationConfig {
    pub backend: TranslationBackendKind,
    pub auto_start: bool,
    /// Translate operator input in addition to recognition output.
    pub input_field: bool,
    pub openai: OpenAiTranslationConfig,
    pub azure: AzureTranslationConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct OpenAiTranslationConfig {
    pub api_key: String,
    pub base_url: String,
    pub model: String,
    /// Target language.
    pub language: String,
    /// Translate interim events too.
    pub interim: bool,
    pub system_prompt: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AzureTranslationConfig {
    pub key: String,
    /// Resource region, e.g. "eastus".
    pub location: String,
    pub endpoint: String,
    pub language_from: String,
    pub language: String,
    pub profanity: ProfanityAction,
    pub interim: bool,
}

/// Azure Translator profanity handling.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum ProfanityAction {
    Deleted,
    #[default]
    Marked,
    NoAction,
}

impl ProfanityAction {
    pub fn as_str(self) -> &'static str {
        match self {
            ProfanityAction::Deleted => "Deleted",
            ProfanityAction::Marked => "Marked",
            ProfanityAction::NoAction => "NoAction",
        }
    }
}

/// Recognition host configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RecognitionConfig {
    pub backend: RecognitionBackendKind,
    pub auto_start: bool,
    pub openai: OpenAiRecognitionConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct OpenAiRecognitionConfig {
    pub api_key: String,
    pub base_url: String,
    pub model: String,
    /// Seconds without clips before the backend stops itself.
    pub silence_timeout_secs: u64,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            enable: false,
            post_enable: false,
            post_live: false,
            post_input: false,
            post_source: TextEventSource::Stt,
            send_delay: "0".to_string(),
            room_id: String::new(),
            max_unit_length: defaults::MAX_UNIT_LENGTH,
            live_gate: LiveGatePolicy::default(),
        }
    }
}

impl Default for TranslationConfig {
    fn default() -> Self {
        Self {
            backend: TranslationBackendKind::default(),
            auto_start: false,
            input_field: true,
            openai: OpenAiTranslationConfig::default(),
            azure: AzureTranslationConfig::default(),
        }
    }
}

impl Default for OpenAiTranslationConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: defaults::OPENAI_BASE_URL.to_string(),
            model: defaults::OPENAI_TRANSLATION_MODEL.to_string(),
            language: "en".to_string(),
            interim: true,
            system_prompt: defaults::OPENAI_SYSTEM_PROMPT.to_string(),
        }
    }
}

impl Default for AzureTranslationConfig {
    fn default() -> Self {
        Self {
            key: String::new(),
            location: String::new(),
            endpoint: defaults::AZURE_TRANSLATOR_ENDPOINT.to_string(),
            language_from: "en".to_string(),
            language: "en".to_string(),
            profanity: ProfanityAction::default(),
            interim: true,
        }
    }
}

impl Default for RecognitionConfig {
    fn default() -> Self {
        Self {
            backend: RecognitionBackendKind::default(),
            auto_start: false,
            openai: OpenAiRecognitionConfig::default(),
        }
    }
}

impl Default for OpenAiRecognitionConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: defaults::OPENAI_BASE_URL.to_string(),
            model: defaults::OPENAI_TRANSCRIPTION_MODEL.to_string(),
            silence_timeout_secs: defaults::SILENCE_TIMEOUT.as_secs(),
        }
    }
}

impl ChatConfig {
    /// Effective delay between two delivered messages.
    ///
    /// Zero, empty or unparseable values fall back to the default delay.
    pub fn send_delay(&self) -> Duration {
        parse_send_delay(&self.send_delay).unwrap_or(defaults::SEND_DELAY)
    }

    /// Effective chunk length; zero falls back to the default.
    pub fn max_unit_length(&self) -> usize {
        if self.max_unit_length == 0 {
            defaults::MAX_UNIT_LENGTH
        } else {
            self.max_unit_length
        }
    }
}

fn parse_send_delay(raw: &str) -> Option<Duration> {
    let raw = raw.trim();
    let delay = match raw.parse::<f64>() {
        Ok(secs) if secs > 0.0 => Duration::try_from_secs_f64(secs).ok()?,
        Ok(_) => return None,
        Err(_) => humantime::parse_duration(raw).ok()?,
    };
    (!delay.is_zero()).then_some(delay)
}

impl OpenAiRecognitionConfig {
    pub fn silence_timeout(&self) -> Duration {
        if self.silence_timeout_secs == 0 {
            defaults::SILENCE_TIMEOUT
        } else {
            Duration::from_secs(self.silence_timeout_secs)
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// Returns an error if the file contains invalid TOML.
    /// Missing fields will use default values.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let contents = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Load configuration from a file or return defaults if file doesn't exist
    ///
    /// Invalid TOML is still an error.
    pub fn load_or_default(path: &Path) -> anyhow::Result<Self> {
        match Self::load(path) {
            Ok(config) => Ok(config),
            Err(e)
                if e.downcast_ref::<std::io::Error>()
                    .is_some_and(|io_err| io_err.kind() == std::io::ErrorKind::NotFound) =>
            {
                Ok(Self::default())
            }
            Err(e) => Err(e.context(format!("Failed to load config from {}", path.display()))),
        }
    }

    /// Apply environment variable overrides
    ///
    /// Supported environment variables:
    /// - CHATRELAY_ROOM_ID → chat.room_id
    /// - CHATRELAY_SEND_DELAY → chat.send_delay
    /// - CHATRELAY_OPENAI_API_KEY → translation.openai.api_key, recognition.openai.api_key
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(room_id) = std::env::var("CHATRELAY_ROOM_ID")
            && !room_id.is_empty()
        {
            self.chat.room_id = room_id;
        }

        if let Ok(delay) = std::env::var("CHATRELAY_SEND_DELAY")
            && !delay.is_empty()
        {
            self.chat.send_delay = delay;
        }

        if let Ok(key) = std::env::var("CHATRELAY_OPENAI_API_KEY")
            && !key.is_empty()
        {
            self.translation.openai.api_key = key.clone();
            self.recognition.openai.api_key = key;
        }

        self
    }

    /// Get the default configuration file path
    ///
    /// Returns ~/.config/chatrelay/config.toml on Linux
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("chatrelay")
            .join("config.toml")
    }

    /// Write this configuration to `path`, creating parent directories.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)?;
        }
        let contents = toml::to_string_pretty(self).map_err(|e| ChatRelayError::ConfigParse {
            message: e.to_string(),
        })?;
        fs::write(path, contents)?;
        Ok(())
    }
}

/// Read access to the live configuration plus credential persistence.
///
/// Components call [`config`](ConfigStore::config) at the moment they need a
/// value, so edits made while running apply to the next operation.
pub trait ConfigStore: Send + Sync {
    fn config(&self) -> Config;

    fn save_credential(&self, credential: &Credential) -> Result<()>;

    fn clear_credential(&self) -> Result<()>;
}

/// Configuration shared across tasks through a watch channel.
///
/// When backed by a file, credential changes are written back to it. Only the
/// `credential` key of the file is touched, so environment overrides never
/// leak into the persisted file.
pub struct SharedConfig {
    tx: watch::Sender<Config>,
    path: Option<PathBuf>,
}

impl SharedConfig {
    /// In-memory configuration, never persisted.
    pub fn new(config: Config) -> Self {
        let (tx, _rx) = watch::channel(config);
        Self { tx, path: None }
    }

    /// Load from `path` (defaults when missing) and apply env overrides.
    pub fn open(path: impl Into<PathBuf>) -> anyhow::Result<Self> {
        let path = path.into();
        let config = Config::load_or_default(&path)?.with_env_overrides();
        let (tx, _rx) = watch::channel(config);
        Ok(Self {
            tx,
            path: Some(path),
        })
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn subscribe(&self) -> watch::Receiver<Config> {
        self.tx.subscribe()
    }

    /// Apply an in-memory edit and notify subscribers.
    pub fn update(&self, edit: impl FnOnce(&mut Config)) {
        self.tx.send_modify(edit);
    }

    /// Re-read the backing file. No-op for in-memory configs.
    pub fn reload(&self) -> anyhow::Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let config = Config::load_or_default(path)?.with_env_overrides();
        self.tx.send_replace(config);
        tracing::info!(path = %path.display(), "Configuration reloaded");
        Ok(())
    }

    fn persist_credential(&self, credential: Option<&Credential>) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let mut on_disk = Config::load_or_default(path).map_err(|e| ChatRelayError::ConfigParse {
            message: e.to_string(),
        })?;
        on_disk.credential = credential.cloned();
        on_disk.save(path)
    }
}

impl ConfigStore for SharedConfig {
    fn config(&self) -> Config {
        self.tx.borrow().clone()
    }

    fn save_credential(&self, credential: &Credential) -> Result<()> {
        self.persist_credential(Some(credential))?;
        self.update(|config| config.credential = Some(credential.clone()));
        Ok(())
    }

    fn clear_credential(&self) -> Result<()> {
        self.persist_credential(None)?;
        self.update(|config| config.credential = None);
        Ok(())
    }
}
