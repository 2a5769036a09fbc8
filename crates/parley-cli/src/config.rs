//! Configuration loading from file and environment variables.

use serde::Deserialize;
use thiserror::Error;

/// Top-level configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// Conversation settings.
    #[serde(default)]
    pub session: SessionConfig,

    /// Remote endpoints for credentials and the realtime service.
    #[serde(default)]
    pub endpoints: EndpointsConfig,

    /// External service base URLs used by the tool handlers.
    #[serde(default)]
    pub services: ServicesConfig,

    /// Audio capture/playback settings.
    #[serde(default)]
    pub audio: AudioConfig,

    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Conversation-level settings.
#[derive(Debug, Clone, Deserialize)]
pub struct SessionConfig {
    #[serde(default = "default_model")]
    pub model: String,

    #[serde(default = "default_voice")]
    pub voice: String,

    #[serde(default = "default_language")]
    pub language: String,

    /// Persona / system instructions.
    #[serde(default)]
    pub persona: String,

    /// Long-term memory context prepended to the session instructions.
    #[serde(default)]
    pub memory_context: String,

    /// Recent-conversation summaries prepended to the session instructions.
    #[serde(default)]
    pub recent_summaries: String,

    /// Whether to speak a greeting once the session is ready.
    #[serde(default = "default_true")]
    pub greeting: bool,

    /// Whether user speech interrupts assistant speech.
    #[serde(default = "default_true")]
    pub barge_in: bool,

    /// Override for the spoken stop-intent regex.
    #[serde(default)]
    pub stop_pattern: Option<String>,
}

/// Remote endpoints.
#[derive(Debug, Clone, Deserialize)]
pub struct EndpointsConfig {
    /// Trusted backend minting ephemeral credentials.
    #[serde(default = "default_credential_endpoint")]
    pub credential: String,

    /// Realtime endpoint accepting SDP offers.
    #[serde(default = "default_realtime_endpoint")]
    pub realtime: String,

    /// STUN/TURN server URLs.
    #[serde(default)]
    pub ice_servers: Vec<String>,
}

/// Tool handler service base URLs. A single base serves every tool when the
/// per-tool entries are left empty.
#[derive(Debug, Clone, Deserialize)]
pub struct ServicesConfig {
    #[serde(default = "default_services_base")]
    pub base: String,

    #[serde(default)]
    pub memory: Option<String>,
    #[serde(default)]
    pub macros: Option<String>,
    #[serde(default)]
    pub search: Option<String>,
    #[serde(default)]
    pub conversations: Option<String>,
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub calendar: Option<String>,
    #[serde(default)]
    pub mail: Option<String>,

    /// Transcript persistence service. When unset, transcripts are kept in
    /// memory for the lifetime of the process.
    #[serde(default)]
    pub transcripts: Option<String>,
}

/// Audio settings.
#[derive(Debug, Clone, Deserialize)]
pub struct AudioConfig {
    #[serde(default = "default_sample_rate")]
    pub sample_rate: u32,

    #[serde(default = "default_true")]
    pub voice_optimized: bool,

    /// Exact input device name, or unset for the platform default.
    #[serde(default)]
    pub input_device: Option<String>,

    /// Preferred output device, re-bound on every inbound track.
    #[serde(default)]
    pub output_device: Option<String>,
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level filter (e.g., "info", "parley_session=debug,info").
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Whether to output logs in JSON format.
    #[serde(default)]
    pub json: bool,
}

fn default_model() -> String {
    "gpt-realtime".to_string()
}

fn default_voice() -> String {
    "marin".to_string()
}

fn default_language() -> String {
    "en".to_string()
}

fn default_true() -> bool {
    true
}

fn default_credential_endpoint() -> String {
    "http://127.0.0.1:8787/realtime/credentials".to_string()
}

fn default_realtime_endpoint() -> String {
    "https://api.openai.com/v1/realtime".to_string()
}

fn default_services_base() -> String {
    "http://127.0.0.1:8788".to_string()
}

fn default_sample_rate() -> u32 {
    24_000
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            model: default_model(),
            voice: default_voice(),
            language: default_language(),
            persona: String::new(),
            memory_context: String::new(),
            recent_summaries: String::new(),
            greeting: true,
            barge_in: true,
            stop_pattern: None,
        }
    }
}

impl Default for EndpointsConfig {
    fn default() -> Self {
        Self {
            credential: default_credential_endpoint(),
            realtime: default_realtime_endpoint(),
            ice_servers: Vec::new(),
        }
    }
}

impl Default for ServicesConfig {
    fn default() -> Self {
        Self {
            base: default_services_base(),
            memory: None,
            macros: None,
            search: None,
            conversations: None,
            code: None,
            calendar: None,
            mail: None,
            transcripts: None,
        }
    }
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            sample_rate: default_sample_rate(),
            voice_optimized: true,
            input_device: None,
            output_device: None,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

impl ServicesConfig {
    fn or_base(&self, specific: &Option<String>) -> String {
        specific.clone().unwrap_or_else(|| self.base.clone())
    }

    /// Resolves the per-tool endpoints, falling back to the shared base.
    pub fn endpoints(&self) -> parley_tools::ServiceEndpoints {
        parley_tools::ServiceEndpoints {
            memory: self.or_base(&self.memory),
            macros: self.or_base(&self.macros),
            search: self.or_base(&self.search),
            conversations: self.or_base(&self.conversations),
            code: self.or_base(&self.code),
            calendar: self.or_base(&self.calendar),
            mail: self.or_base(&self.mail),
        }
    }
}

/// Errors that can occur when loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read the configuration file.
    #[error("failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),

    /// Failed to parse the configuration file.
    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Loads configuration from a TOML file, falling back to defaults.
///
/// Environment variable overrides:
/// - `PARLEY_CREDENTIAL_URL` overrides `endpoints.credential`
/// - `PARLEY_REALTIME_URL` overrides `endpoints.realtime`
/// - `PARLEY_MODEL` overrides `session.model`
/// - `PARLEY_VOICE` overrides `session.voice`
/// - `PARLEY_LANGUAGE` overrides `session.language`
/// - `PARLEY_SERVICES_BASE` overrides `services.base`
/// - `PARLEY_LOG_LEVEL` overrides `logging.level`
/// - `PARLEY_LOG_JSON` overrides `logging.json` (set to "true" to enable)
///
/// # Errors
///
/// Returns `ConfigError` if the file exists but cannot be read or parsed.
pub fn load_config(path: Option<&str>) -> Result<Config, ConfigError> {
    let mut config = match path {
        Some(p) => match std::fs::read_to_string(p) {
            Ok(contents) => toml::from_str(&contents)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!(path = p, "config file not found, using defaults");
                Config::default()
            }
            Err(e) => return Err(ConfigError::FileRead(e)),
        },
        None => Config::default(),
    };

    // Environment variable overrides
    if let Ok(url) = std::env::var("PARLEY_CREDENTIAL_URL") {
        config.endpoints.credential = url;
    }
    if let Ok(url) = std::env::var("PARLEY_REALTIME_URL") {
        config.endpoints.realtime = url;
    }
    if let Ok(model) = std::env::var("PARLEY_MODEL") {
        config.session.model = model;
    }
    if let Ok(voice) = std::env::var("PARLEY_VOICE") {
        config.session.voice = voice;
    }
    if let Ok(language) = std::env::var("PARLEY_LANGUAGE") {
        config.session.language = language;
    }
    if let Ok(base) = std::env::var("PARLEY_SERVICES_BASE") {
        config.services.base = base;
    }
    if let Ok(level) = std::env::var("PARLEY_LOG_LEVEL") {
        config.logging.level = level;
    }
    if let Ok(json) = std::env::var("PARLEY_LOG_JSON") {
        config.logging.json = json == "true" || json == "1";
    }

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let config = Config::default();
        assert_eq!(config.session.model, "gpt-realtime");
        assert!(config.session.greeting);
        assert!(config.session.barge_in);
        assert_eq!(config.audio.sample_rate, 24_000);
        assert!(!config.logging.json);
    }

    #[test]
    fn parses_partial_toml() {
        let config: Config = toml::from_str(
            r#"
            [session]
            voice = "cedar"

            [services]
            base = "http://tools.internal"
            search = "http://search.internal"
            "#,
        )
        .unwrap();
        assert_eq!(config.session.voice, "cedar");
        assert_eq!(config.session.model, "gpt-realtime");

        let endpoints = config.services.endpoints();
        assert_eq!(endpoints.search, "http://search.internal");
        assert_eq!(endpoints.memory, "http://tools.internal");
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let config = load_config(Some("/definitely/not/here.toml")).unwrap();
        assert_eq!(config.session.language, "en");
    }

    #[test]
    fn loads_toml_from_disk() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("parley.toml");
        std::fs::write(
            &path,
            r#"
            [session]
            model = "gpt-realtime-mini"
            persona = "You are Parley."

            [endpoints]
            credential = "https://backend.example.com/credentials"
            ice_servers = ["stun:stun.example.com:3478"]

            [audio]
            sample_rate = 16000
            input_device = "USB Microphone"

            [logging]
            level = "debug"
            json = true
            "#,
        )
        .expect("write config");

        let config = load_config(path.to_str()).unwrap();
        assert_eq!(config.session.model, "gpt-realtime-mini");
        assert_eq!(config.session.persona, "You are Parley.");
        assert_eq!(
            config.endpoints.credential,
            "https://backend.example.com/credentials"
        );
        assert_eq!(config.endpoints.ice_servers.len(), 1);
        assert_eq!(config.audio.sample_rate, 16_000);
        assert_eq!(config.audio.input_device.as_deref(), Some("USB Microphone"));
        assert!(config.logging.json);
    }
}
