use std::path::PathBuf;
use std::sync::Arc;

use axum::Router;
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;

use crate::adapters::TomlConfigStore;
use crate::commands;
use crate::domain::{AppConfig, DomainError, LoadError};
use crate::infrastructure::init_logging;
use crate::ports::{ConfigStore, InferenceEngine, ModelSpec, ModelStatus, Transcriber};

use super::registry::ModelRegistry;
use super::service::TranscriptionService;

/// Application controller that wires configuration, logging, and the
/// transcription service together.
pub struct AppController {
    config: AppConfig,
    config_store: Option<TomlConfigStore>,
    transcriber: Arc<dyn Transcriber>,
    _log_guard: Option<WorkerGuard>,
}

impl AppController {
    /// Initialize from a config store.
    ///
    /// Loads (or creates) the configuration, starts logging, then builds the
    /// engine from the loaded configuration.
    pub fn new<F>(config_store: TomlConfigStore, make_engine: F) -> Result<Self, DomainError>
    where
        F: FnOnce(&AppConfig) -> Arc<dyn InferenceEngine>,
    {
        let config = config_store.load()?;

        let log_guard = init_logging(&config_store.logs_dir(), &config.logging)?;

        info!(config = ?config_store.config_path(), "Voxgate starting up");

        let engine = make_engine(&config);
        let mut controller = Self::with_config(config, engine);
        controller.config_store = Some(config_store);
        controller._log_guard = log_guard;

        Ok(controller)
    }

    /// Build a controller from an in-memory configuration, without logging
    /// or a backing config file.
    pub fn with_config(config: AppConfig, engine: Arc<dyn InferenceEngine>) -> Self {
        let registry = Arc::new(ModelRegistry::new(engine));
        let transcriber = Arc::new(TranscriptionService::new(
            registry,
            config.decoding.clone(),
        ));

        info!(
            threads = config.decoding.threads,
            beam_size = config.decoding.beam_size,
            "AppController initialized"
        );

        Self {
            config,
            config_store: None,
            transcriber,
            _log_guard: None,
        }
    }

    /// Get the current configuration.
    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Override the listen address, e.g. from command-line flags.
    pub fn override_bind(&mut self, host: Option<String>, port: Option<u16>) {
        if let Some(host) = host {
            self.config.server.host = host;
        }
        if let Some(port) = port {
            self.config.server.port = port;
        }
    }

    pub fn bind_addr(&self) -> String {
        self.config.server.bind_addr()
    }

    pub fn transcriber(&self) -> Arc<dyn Transcriber> {
        Arc::clone(&self.transcriber)
    }

    /// Load the configured startup model, if any.
    pub async fn preload(&self) -> Result<Option<ModelStatus>, LoadError> {
        let preload = &self.config.preload;
        let Some(model) = preload.model.as_ref() else {
            return Ok(None);
        };

        let mut spec = ModelSpec::new(model.clone(), preload.language.clone());
        spec.grammar = preload.grammar.clone();
        spec.grammar_rule = preload.grammar_rule.clone();
        spec.use_gpu = preload.use_gpu;
        spec.flash_attn = preload.flash_attn;
        spec.alignment_preset = preload.alignment_preset.clone();

        info!(model = ?model, "Preloading model");
        self.transcriber.reconfigure(spec).await.map(Some)
    }

    /// Build the HTTP router.
    pub fn router(&self) -> Router {
        commands::router(self.transcriber())
    }

    /// Get the config file path, when backed by a file.
    pub fn config_path(&self) -> Option<PathBuf> {
        self.config_store.as_ref().map(|s| s.config_path())
    }

    /// Get the logs directory path, when backed by a file.
    pub fn logs_dir(&self) -> Option<PathBuf> {
        self.config_store.as_ref().map(|s| s.logs_dir())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::scripted_engine::ScriptedEngine;

    fn engine() -> Arc<dyn InferenceEngine> {
        Arc::new(ScriptedEngine::new())
    }

    #[tokio::test]
    async fn test_preload_without_model_is_noop() {
        let controller = AppController::with_config(AppConfig::new(), engine());

        assert!(controller.preload().await.unwrap().is_none());
        assert!(controller.transcriber().model_status().is_none());
    }

    #[tokio::test]
    async fn test_preload_installs_configured_model() {
        let mut config = AppConfig::new();
        config.preload.model = Some(PathBuf::from("models/small.bin"));
        config.preload.language = "de".to_string();
        config.preload.grammar = Some("root ::= \"ja\" | \"nein\"".to_string());
        config.preload.grammar_rule = Some("root".to_string());
        let controller = AppController::with_config(config, engine());

        let status = controller.preload().await.unwrap().unwrap();

        assert_eq!(status.language, "de");
        assert_eq!(status.grammar_rules, 1);
        assert_eq!(controller.transcriber().model_status(), Some(status));
    }

    #[tokio::test]
    async fn test_preload_failure_is_reported() {
        let mut config = AppConfig::new();
        config.preload.model = Some(PathBuf::from("models/missing.bin"));
        let controller = AppController::with_config(config, engine());

        assert!(matches!(
            controller.preload().await,
            Err(LoadError::ModelLoadFailed { .. })
        ));
    }

    #[test]
    fn test_bind_override() {
        let mut controller = AppController::with_config(AppConfig::new(), engine());
        assert_eq!(controller.bind_addr(), "0.0.0.0:8080");

        controller.override_bind(Some("127.0.0.1".to_string()), None);
        assert_eq!(controller.bind_addr(), "127.0.0.1:8080");

        controller.override_bind(None, Some(9090));
        assert_eq!(controller.bind_addr(), "127.0.0.1:9090");
    }

    #[test]
    fn test_new_reads_config_file() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("config.toml");
        std::fs::write(&path, "[server]\nport = 9100\n\n[engine]\nparallel_states = true\n")
            .unwrap();

        let mut saw_parallel = false;
        let controller = AppController::new(TomlConfigStore::at(&path), |config| {
            saw_parallel = config.engine.parallel_states;
            engine()
        })
        .unwrap();

        assert!(saw_parallel);
        assert_eq!(controller.config().server.port, 9100);
        assert_eq!(controller.config_path(), Some(path));
        assert!(controller.logs_dir().unwrap().ends_with("logs"));
    }
}
