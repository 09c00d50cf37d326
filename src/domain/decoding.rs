use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::domain::config::DecodingDefaults;
use crate::domain::grammar::GrammarRuleSet;

/// Token sampling strategy.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SamplingStrategy {
    Greedy { best_of: u32 },
    BeamSearch { beam_size: u32, patience: f32 },
}

/// Beam search is required by grammar-constrained sampling.
pub fn select_strategy(beam_size: u32, best_of: u32, grammar_active: bool) -> SamplingStrategy {
    if beam_size > 1 || grammar_active {
        SamplingStrategy::BeamSearch {
            beam_size,
            patience: -1.0,
        }
    } else {
        SamplingStrategy::Greedy { best_of }
    }
}

/// Per-request decoding overrides. Unset fields fall back to the defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DecodingOverrides {
    pub language: Option<String>,
    pub translate: Option<bool>,
    pub detect_language: Option<bool>,
    pub threads: Option<u32>,
    pub processors: Option<u32>,
    pub offset_ms: Option<u32>,
    pub duration_ms: Option<u32>,
    pub beam_size: Option<u32>,
    pub best_of: Option<u32>,
    #[serde(alias = "word_thold")]
    pub word_threshold: Option<f32>,
    #[serde(alias = "max_len")]
    pub max_segment_len: Option<u32>,
    pub split_on_word: Option<bool>,
    #[serde(alias = "entropy_thold")]
    pub entropy_threshold: Option<f32>,
    #[serde(alias = "logprob_thold")]
    pub logprob_threshold: Option<f32>,
    pub temperature: Option<f32>,
    pub temperature_inc: Option<f32>,
    pub audio_ctx: Option<u32>,
    #[serde(alias = "prompt")]
    pub initial_prompt: Option<String>,
    /// Start rule to constrain decoding with; falls back to the model's default.
    pub grammar_rule: Option<String>,
    pub grammar_penalty: Option<f32>,
}

/// Reject text that cannot cross into the engine as a C string.
pub fn check_c_text(field: &str, value: &str) -> Result<(), String> {
    if value.contains('\0') {
        return Err(format!("{} must not contain NUL bytes", field));
    }
    Ok(())
}

/// A compiled grammar bound to a start rule.
#[derive(Debug, Clone)]
pub struct GrammarBinding {
    pub rules: Arc<GrammarRuleSet>,
    pub start_rule: u32,
    pub penalty: f32,
}

/// Cancellation hooks polled by the engine during one decode.
#[derive(Debug, Clone)]
pub struct AbortHooks {
    token: CancellationToken,
}

impl AbortHooks {
    pub fn new(token: CancellationToken) -> Self {
        Self { token }
    }

    /// Polled before each encoder pass. Returns false to abort.
    pub fn encoder_may_begin(&self) -> bool {
        !self.token.is_cancelled()
    }

    /// Polled between compute steps by backends that can stop mid-decode.
    /// Returns true to abort.
    pub fn should_abort(&self) -> bool {
        self.token.is_cancelled()
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }
}

/// Complete engine configuration for one decode.
#[derive(Debug, Clone)]
pub struct DecodingConfiguration {
    pub strategy: SamplingStrategy,
    pub language: String,
    pub translate: bool,
    pub detect_language: bool,
    pub threads: u32,
    pub processors: u32,
    pub offset_ms: u32,
    pub duration_ms: u32,
    pub word_threshold: f32,
    pub max_segment_len: u32,
    pub split_on_word: bool,
    pub entropy_threshold: f32,
    pub logprob_threshold: f32,
    pub temperature: f32,
    pub temperature_inc: f32,
    pub audio_ctx: u32,
    pub initial_prompt: Option<String>,
    pub grammar: Option<GrammarBinding>,
    pub hooks: AbortHooks,
    pub warnings: Vec<String>,
}

impl DecodingConfiguration {
    /// Build the configuration for one request.
    ///
    /// `default_rule` is the start rule configured with the model; the
    /// request's `grammar_rule` takes precedence. A start rule missing from
    /// the grammar disables grammar sampling with a warning, never an error.
    pub fn build(
        defaults: &DecodingDefaults,
        overrides: &DecodingOverrides,
        grammar: Option<&Arc<GrammarRuleSet>>,
        default_rule: Option<&str>,
        cancel: CancellationToken,
    ) -> Self {
        let beam_size = overrides.beam_size.unwrap_or(defaults.beam_size);
        let best_of = overrides.best_of.unwrap_or(defaults.best_of);
        let penalty = overrides.grammar_penalty.unwrap_or(defaults.grammar_penalty);

        let requested_rule = overrides
            .grammar_rule
            .as_deref()
            .or(default_rule)
            .filter(|r| !r.is_empty());
        let rules = grammar.filter(|g| !g.is_empty());
        let grammar_active = rules.is_some() && requested_rule.is_some();

        let mut warnings = Vec::new();
        let mut binding = None;
        if let (Some(rules), Some(rule_name)) = (rules, requested_rule) {
            match rules.symbol_id(rule_name) {
                Some(start_rule) => {
                    binding = Some(GrammarBinding {
                        rules: Arc::clone(rules),
                        start_rule,
                        penalty,
                    });
                }
                None => {
                    warn!(rule = rule_name, "Grammar rule not found, skipping grammar sampling");
                    warnings.push(format!(
                        "grammar rule '{}' not found - skipping grammar sampling",
                        rule_name
                    ));
                }
            }
        }

        Self {
            strategy: select_strategy(beam_size, best_of, grammar_active),
            language: overrides
                .language
                .clone()
                .unwrap_or_else(|| defaults.language.clone()),
            translate: overrides.translate.unwrap_or(defaults.translate),
            detect_language: overrides.detect_language.unwrap_or(defaults.detect_language),
            threads: overrides.threads.unwrap_or(defaults.threads).max(1),
            processors: overrides.processors.unwrap_or(defaults.processors).max(1),
            offset_ms: overrides.offset_ms.unwrap_or(defaults.offset_ms),
            duration_ms: overrides.duration_ms.unwrap_or(defaults.duration_ms),
            word_threshold: overrides.word_threshold.unwrap_or(defaults.word_threshold),
            max_segment_len: overrides.max_segment_len.unwrap_or(defaults.max_segment_len),
            split_on_word: overrides.split_on_word.unwrap_or(defaults.split_on_word),
            entropy_threshold: overrides
                .entropy_threshold
                .unwrap_or(defaults.entropy_threshold),
            logprob_threshold: overrides
                .logprob_threshold
                .unwrap_or(defaults.logprob_threshold),
            temperature: overrides.temperature.unwrap_or(defaults.temperature),
            temperature_inc: overrides.temperature_inc.unwrap_or(defaults.temperature_inc),
            audio_ctx: overrides.audio_ctx.unwrap_or(defaults.audio_ctx),
            initial_prompt: overrides
                .initial_prompt
                .clone()
                .or_else(|| defaults.initial_prompt.clone()),
            grammar: binding,
            hooks: AbortHooks::new(cancel),
            warnings,
        }
    }
}
