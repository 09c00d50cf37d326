use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// HTTP listener configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
        }
    }
}

impl ServerConfig {
    /// Socket address string for binding.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: "trace", "debug", "info", "warn", "error".
    pub level: String,
    /// Enable file logging with rotation.
    pub file_logging: bool,
    /// Maximum number of log files to keep.
    pub max_files: u32,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file_logging: false,
            max_files: 7,
        }
    }
}

/// Static decoding defaults, overridable per request.
///
/// Defaults follow the whisper.cpp command-line examples.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DecodingDefaults {
    /// Number of threads for a single decode.
    pub threads: u32,
    /// Number of processors splitting a single decode.
    pub processors: u32,
    /// Language code, or "auto".
    pub language: String,
    pub translate: bool,
    pub detect_language: bool,
    pub offset_ms: u32,
    pub duration_ms: u32,
    pub beam_size: u32,
    pub best_of: u32,
    /// Word timestamp probability threshold.
    pub word_threshold: f32,
    /// Maximum segment length in characters (0 = unlimited).
    pub max_segment_len: u32,
    pub split_on_word: bool,
    pub entropy_threshold: f32,
    pub logprob_threshold: f32,
    pub temperature: f32,
    pub temperature_inc: f32,
    /// Audio context size (0 = full).
    pub audio_ctx: u32,
    pub grammar_penalty: f32,
    pub initial_prompt: Option<String>,
}

impl Default for DecodingDefaults {
    fn default() -> Self {
        let cores = std::thread::available_parallelism()
            .map(|p| p.get() as u32)
            .unwrap_or(1);

        Self {
            threads: cores.min(4),
            processors: 1,
            language: "en".to_string(),
            translate: false,
            detect_language: false,
            offset_ms: 0,
            duration_ms: 0,
            beam_size: 5,
            best_of: 5,
            word_threshold: 0.01,
            max_segment_len: 0,
            split_on_word: false,
            entropy_threshold: 2.40,
            logprob_threshold: -1.00,
            temperature: 0.0,
            temperature_inc: 0.2,
            audio_ctx: 0,
            grammar_penalty: 100.0,
            initial_prompt: None,
        }
    }
}

/// Inference engine configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Allow concurrent decodes on one model (one engine state per call).
    pub parallel_states: bool,
}

/// Model to load at startup, if any.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PreloadConfig {
    pub model: Option<PathBuf>,
    pub language: String,
    /// Inline grammar text or path to a grammar file.
    pub grammar: Option<String>,
    pub grammar_rule: Option<String>,
    pub use_gpu: bool,
    pub flash_attn: bool,
    /// Alignment-heads preset name for token-level timestamps.
    pub alignment_preset: Option<String>,
}

impl Default for PreloadConfig {
    fn default() -> Self {
        Self {
            model: None,
            language: "en".to_string(),
            grammar: None,
            grammar_rule: None,
            use_gpu: true,
            flash_attn: false,
            alignment_preset: None,
        }
    }
}

/// Main application configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub logging: LoggingConfig,
    pub decoding: DecodingDefaults,
    pub engine: EngineConfig,
    pub preload: PreloadConfig,
}

impl AppConfig {
    /// Create a new AppConfig with default values.
    pub fn new() -> Self {
        Self::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decoding_defaults() {
        let defaults = DecodingDefaults::default();
        assert!(defaults.threads >= 1 && defaults.threads <= 4);
        assert_eq!(defaults.beam_size, 5);
        assert_eq!(defaults.language, "en");
        assert!((defaults.entropy_threshold - 2.4).abs() < 1e-6);
        assert!((defaults.grammar_penalty - 100.0).abs() < 1e-6);
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: AppConfig = toml::from_str(
            r#"
            [server]
            port = 9000

            [decoding]
            beam_size = 1
            "#,
        )
        .unwrap();

        assert_eq!(config.server.port, 9000);
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.decoding.beam_size, 1);
        assert_eq!(config.decoding.best_of, 5);
        assert!(config.preload.model.is_none());
    }
}
