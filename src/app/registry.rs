use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tokio::sync::{OwnedRwLockReadGuard, RwLock as SlotLock};
use tracing::{debug, info, warn};

use crate::domain::{
    check_c_text, DecodingConfiguration, GrammarRuleSet, LoadError, TranscriptSegment,
};
use crate::ports::{
    AlignmentPreset, DeviceOptions, EngineError, InferenceEngine, ModelHandle, ModelSpec,
    ModelStatus,
};

/// Read access to the active model for the length of one decode.
///
/// While any lease is alive the model cannot be swapped out or unloaded.
pub type ModelLease = OwnedRwLockReadGuard<Option<ActiveModel>, ActiveModel>;

/// The loaded model together with the grammar it was configured with.
pub struct ActiveModel {
    handle: Box<dyn ModelHandle>,
    model_path: PathBuf,
    language: String,
    grammar: Option<Arc<GrammarRuleSet>>,
    grammar_rule: Option<String>,
    generation: u64,
    backend: String,
    inference_gate: Mutex<()>,
}

impl ActiveModel {
    pub fn grammar(&self) -> Option<&Arc<GrammarRuleSet>> {
        self.grammar.as_ref()
    }

    /// Default start rule configured with the model.
    pub fn grammar_rule(&self) -> Option<&str> {
        self.grammar_rule.as_deref()
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Run one blocking decode.
    ///
    /// Decodes are serialized per model unless the handle supports
    /// concurrent calls.
    pub fn decode(
        &self,
        config: DecodingConfiguration,
        samples: &[f32],
    ) -> Result<Vec<TranscriptSegment>, EngineError> {
        if self.handle.supports_concurrent_decode() {
            return self.handle.decode(config, samples);
        }

        let _gate = self.inference_gate.lock();
        self.handle.decode(config, samples)
    }

    pub fn status(&self) -> ModelStatus {
        ModelStatus {
            model_path: self.model_path.to_string_lossy().to_string(),
            language: self.language.clone(),
            grammar_rules: self.grammar.as_ref().map_or(0, |g| g.len()),
            grammar_rule: self.grammar_rule.clone(),
            generation: self.generation,
            backend: self.backend.clone(),
        }
    }
}

impl Drop for ActiveModel {
    fn drop(&mut self) {
        info!(
            path = ?self.model_path,
            generation = self.generation,
            "Model released"
        );
    }
}

/// Owner of the single active model.
///
/// Reconfigurations are serialized. The replacement is fully built first,
/// then the swap takes the slot's write lock, which waits for every
/// outstanding `ModelLease`. The previous model is dropped right after the
/// swap, so at most one model is resident outside of a load.
pub struct ModelRegistry {
    engine: Arc<dyn InferenceEngine>,
    active: Arc<SlotLock<Option<ActiveModel>>>,
    status: RwLock<Option<ModelStatus>>,
    reconfigure: tokio::sync::Mutex<()>,
    generation: AtomicU64,
}

impl ModelRegistry {
    pub fn new(engine: Arc<dyn InferenceEngine>) -> Self {
        info!(backend = engine.name(), "ModelRegistry created");
        Self {
            engine,
            active: Arc::new(SlotLock::new(None)),
            status: RwLock::new(None),
            reconfigure: tokio::sync::Mutex::new(()),
            generation: AtomicU64::new(0),
        }
    }

    pub fn engine(&self) -> &Arc<dyn InferenceEngine> {
        &self.engine
    }

    /// Validate, load, and install a new model.
    ///
    /// Everything that can fail (language, preset, grammar, model file) is
    /// checked before the swap. On failure the previous model, if any, stays
    /// active and unchanged.
    pub async fn load(&self, spec: ModelSpec) -> Result<ModelStatus, LoadError> {
        let _exclusive = self.reconfigure.lock().await;

        if spec.model_path.as_os_str().is_empty() {
            return Err(LoadError::InvalidRequest("model path is required".to_string()));
        }
        check_c_text("modelpath", &spec.model_path.to_string_lossy())
            .map_err(LoadError::InvalidRequest)?;

        let language = spec.language.trim().to_string();
        if language.is_empty() {
            return Err(LoadError::InvalidRequest("language is required".to_string()));
        }
        check_c_text("lang", &language).map_err(LoadError::InvalidRequest)?;
        if let Some(rule) = spec.grammar_rule.as_deref() {
            check_c_text("grammar_rule", rule).map_err(LoadError::InvalidRequest)?;
        }
        if language != "auto" && self.engine.language_id(&language).is_none() {
            return Err(LoadError::UnknownLanguage(language));
        }

        let alignment = match spec.alignment_preset.as_deref().filter(|p| !p.is_empty()) {
            Some(name) => match AlignmentPreset::from_name(name) {
                Some(preset) if self.engine.supports_alignment(preset) => Some(preset),
                Some(_) => {
                    warn!(
                        preset = name,
                        backend = self.engine.name(),
                        "Alignment preset not available"
                    );
                    return Err(LoadError::UnknownAlignmentPreset(name.to_string()));
                }
                None => return Err(LoadError::UnknownAlignmentPreset(name.to_string())),
            },
            None => None,
        };

        let grammar = match spec.grammar.as_deref().filter(|g| !g.trim().is_empty()) {
            Some(source) => {
                let rules = GrammarRuleSet::from_source(source).map_err(|e| {
                    warn!(error = %e, "Failed to compile grammar");
                    e
                })?;
                info!(rules = rules.len(), "Grammar compiled");
                debug!("grammar:\n{}", rules);
                Some(Arc::new(rules))
            }
            None => None,
        };

        let options = DeviceOptions {
            use_gpu: spec.use_gpu,
            flash_attn: spec.flash_attn,
            gpu_device: spec.gpu_device,
            alignment,
        };

        info!(
            path = ?spec.model_path,
            language = %language,
            use_gpu = options.use_gpu,
            flash_attn = options.flash_attn,
            "Loading model"
        );

        let engine = Arc::clone(&self.engine);
        let path = spec.model_path.clone();
        let load_result =
            tokio::task::spawn_blocking(move || engine.load_model(&path, &options)).await;

        let handle = match load_result {
            Ok(Ok(handle)) => handle,
            Ok(Err(e)) => {
                warn!(path = ?spec.model_path, error = %e, "Model load failed, keeping previous model");
                return Err(LoadError::ModelLoadFailed {
                    path: spec.model_path.to_string_lossy().to_string(),
                    reason: e.to_string(),
                });
            }
            Err(e) => {
                return Err(LoadError::ModelLoadFailed {
                    path: spec.model_path.to_string_lossy().to_string(),
                    reason: format!("load task failed: {}", e),
                });
            }
        };

        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let model = ActiveModel {
            handle,
            model_path: spec.model_path,
            language,
            grammar,
            grammar_rule: spec.grammar_rule.filter(|r| !r.is_empty()),
            generation,
            backend: self.engine.name().to_string(),
            inference_gate: Mutex::new(()),
        };
        let status = model.status();

        let previous = {
            let mut slot = self.active.write().await;
            let previous = slot.replace(model);
            *self.status.write() = Some(status.clone());
            previous
        };
        if let Some(previous) = previous {
            debug!(
                generation = previous.generation(),
                "Previous model swapped out"
            );
            drop(previous);
        }

        info!(
            path = %status.model_path,
            generation,
            grammar_rules = status.grammar_rules,
            "Model loaded"
        );
        Ok(status)
    }

    /// Lease the active model, if any.
    ///
    /// Waits while a swap or unload is in progress.
    pub async fn acquire(&self) -> Option<ModelLease> {
        let guard = Arc::clone(&self.active).read_owned().await;
        OwnedRwLockReadGuard::try_map(guard, |slot| slot.as_ref()).ok()
    }

    pub fn status(&self) -> Option<ModelStatus> {
        self.status.read().clone()
    }

    /// Drop the active model once no decode holds it. Returns whether one
    /// was loaded.
    pub async fn unload(&self) -> bool {
        let _exclusive = self.reconfigure.lock().await;

        let previous = {
            let mut slot = self.active.write().await;
            *self.status.write() = None;
            slot.take()
        };
        let had_model = previous.is_some();
        drop(previous);

        if had_model {
            info!("Model unloaded");
        }
        had_model
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::scripted_engine::ScriptedEngine;
    use crate::domain::GrammarError;

    fn registry() -> (ModelRegistry, Arc<crate::adapters::scripted_engine::ScriptState>) {
        let engine = ScriptedEngine::new();
        let state = Arc::clone(&engine.state);
        (ModelRegistry::new(Arc::new(engine)), state)
    }

    #[tokio::test]
    async fn test_load_installs_model() {
        let (registry, state) = registry();
        assert!(registry.acquire().await.is_none());

        let status = registry.load(ModelSpec::new("models/a.bin", "en")).await.unwrap();

        assert_eq!(status.model_path, "models/a.bin");
        assert_eq!(status.generation, 1);
        assert_eq!(status.grammar_rules, 0);
        assert_eq!(status.backend, "scripted");
        assert_eq!(state.loads.load(Ordering::SeqCst), 1);
        assert_eq!(registry.status(), Some(status));
    }

    #[tokio::test]
    async fn test_failed_reload_keeps_previous_model() {
        let (registry, state) = registry();
        registry.load(ModelSpec::new("models/a.bin", "en")).await.unwrap();

        let err = registry
            .load(ModelSpec::new("models/missing.bin", "en"))
            .await
            .unwrap_err();

        assert!(matches!(err, LoadError::ModelLoadFailed { .. }));
        let current = registry.acquire().await.expect("previous model still active");
        assert_eq!(current.status().model_path, "models/a.bin");
        assert_eq!(state.releases.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_unknown_language_rejected_before_load() {
        let (registry, state) = registry();

        let err = registry
            .load(ModelSpec::new("models/a.bin", "xx"))
            .await
            .unwrap_err();

        assert!(matches!(err, LoadError::UnknownLanguage(ref l) if l == "xx"));
        assert_eq!(state.loads.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_auto_language_accepted() {
        let (registry, _) = registry();
        let status = registry.load(ModelSpec::new("models/a.bin", "auto")).await.unwrap();
        assert_eq!(status.language, "auto");
    }

    #[tokio::test]
    async fn test_unknown_alignment_preset() {
        let (registry, state) = registry();
        let mut spec = ModelSpec::new("models/a.bin", "en");
        spec.alignment_preset = Some("huge.v9".to_string());

        let err = registry.load(spec).await.unwrap_err();

        assert!(matches!(err, LoadError::UnknownAlignmentPreset(_)));
        assert_eq!(state.loads.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_empty_model_path_is_invalid() {
        let (registry, _) = registry();
        let err = registry.load(ModelSpec::new("", "en")).await.unwrap_err();
        assert!(matches!(err, LoadError::InvalidRequest(_)));
    }

    #[tokio::test]
    async fn test_grammar_failure_leaves_previous_state() {
        let (registry, state) = registry();
        let mut first = ModelSpec::new("models/a.bin", "en");
        first.grammar = Some("root ::= \"yes\" | \"no\"".to_string());
        first.grammar_rule = Some("root".to_string());
        registry.load(first).await.unwrap();

        let mut second = ModelSpec::new("models/b.bin", "en");
        second.grammar = Some("root = \"broken\"".to_string());
        let err = registry.load(second).await.unwrap_err();

        assert!(matches!(
            err,
            LoadError::GrammarCompileFailed(GrammarError::Syntax { .. })
        ));
        // The new model was never loaded, the old grammar is still bound.
        assert_eq!(state.loads.load(Ordering::SeqCst), 1);
        let current = registry.acquire().await.unwrap();
        assert_eq!(current.status().model_path, "models/a.bin");
        assert_eq!(current.grammar_rule(), Some("root"));
        assert!(current.grammar().is_some());
    }

    #[tokio::test]
    async fn test_grammar_loaded_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("commands.gbnf");
        std::fs::write(&path, "root ::= cmd\ncmd ::= \"up\" | \"down\"\n").unwrap();

        let (registry, _) = registry();
        let mut spec = ModelSpec::new("models/a.bin", "en");
        spec.grammar = Some(path.to_string_lossy().to_string());

        let status = registry.load(spec).await.unwrap();
        assert_eq!(status.grammar_rules, 2);
    }

    #[tokio::test]
    async fn test_swap_waits_for_lease_and_releases_old_model() {
        let (registry, state) = registry();
        let registry = Arc::new(registry);
        registry.load(ModelSpec::new("models/a.bin", "en")).await.unwrap();

        let lease = registry.acquire().await.unwrap();
        let reload = {
            let registry = Arc::clone(&registry);
            tokio::spawn(async move { registry.load(ModelSpec::new("models/b.bin", "en")).await })
        };

        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        assert!(!reload.is_finished());
        assert_eq!(state.releases.load(Ordering::SeqCst), 0);
        assert_eq!(registry.status().unwrap().generation, 1);

        drop(lease);
        let status = reload.await.unwrap().unwrap();
        assert_eq!(status.generation, 2);

        let resident = state.loads.load(Ordering::SeqCst) - state.releases.load(Ordering::SeqCst);
        assert_eq!(resident, 1);
        assert_eq!(state.releases.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_unsupported_alignment_preset_rejected_before_load() {
        let engine = ScriptedEngine::new().without_alignment(AlignmentPreset::LargeV3Turbo);
        let state = Arc::clone(&engine.state);
        let registry = ModelRegistry::new(Arc::new(engine));

        let mut spec = ModelSpec::new("models/turbo.bin", "en");
        spec.alignment_preset = Some("large.v3.turbo".to_string());
        let err = registry.load(spec).await.unwrap_err();

        assert!(matches!(err, LoadError::UnknownAlignmentPreset(ref p) if p == "large.v3.turbo"));
        assert_eq!(state.loads.load(Ordering::SeqCst), 0);

        let mut spec = ModelSpec::new("models/large.bin", "en");
        spec.alignment_preset = Some("large.v3".to_string());
        registry.load(spec).await.unwrap();
    }

    #[tokio::test]
    async fn test_nul_bytes_rejected_before_load() {
        let (registry, state) = registry();

        let err = registry
            .load(ModelSpec::new("models/a\0.bin", "en"))
            .await
            .unwrap_err();
        assert!(matches!(err, LoadError::InvalidRequest(ref m) if m.contains("modelpath")));

        let err = registry
            .load(ModelSpec::new("models/a.bin", "e\0n"))
            .await
            .unwrap_err();
        assert!(matches!(err, LoadError::InvalidRequest(ref m) if m.contains("lang")));

        let mut spec = ModelSpec::new("models/a.bin", "en");
        spec.grammar = Some("root ::= \"yes\"".to_string());
        spec.grammar_rule = Some("ro\0ot".to_string());
        let err = registry.load(spec).await.unwrap_err();
        assert!(matches!(err, LoadError::InvalidRequest(ref m) if m.contains("grammar_rule")));

        assert_eq!(state.loads.load(Ordering::SeqCst), 0);
        assert!(registry.status().is_none());
    }

    #[tokio::test]
    async fn test_concurrent_reloads_leave_one_model() {
        let (registry, state) = registry();
        let registry = Arc::new(registry);

        let a = {
            let registry = Arc::clone(&registry);
            tokio::spawn(async move { registry.load(ModelSpec::new("models/a.bin", "en")).await })
        };
        let b = {
            let registry = Arc::clone(&registry);
            tokio::spawn(async move { registry.load(ModelSpec::new("models/b.bin", "en")).await })
        };
        a.await.unwrap().unwrap();
        b.await.unwrap().unwrap();

        assert_eq!(state.loads.load(Ordering::SeqCst), 2);
        assert_eq!(state.releases.load(Ordering::SeqCst), 1);
        assert_eq!(registry.status().unwrap().generation, 2);
    }

    #[tokio::test]
    async fn test_unload() {
        let (registry, state) = registry();
        assert!(!registry.unload().await);

        registry.load(ModelSpec::new("models/a.bin", "en")).await.unwrap();
        assert!(registry.unload().await);
        assert!(registry.acquire().await.is_none());
        assert!(registry.status().is_none());
        assert_eq!(state.releases.load(Ordering::SeqCst), 1);
    }
}
