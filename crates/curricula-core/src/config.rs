//! Optimizer configuration.
//!
//! Every policy knob lives here with its default. Values come from, in order:
//! built-in defaults, an optional TOML file, then `CURRICULA_*` environment
//! variables.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::collaborators::heuristic::CriticConfig;
use crate::collaborators::RetryPolicy;
use crate::domain::curriculum::TopicSpec;
use crate::domain::error::{CurriculaError, Result};
use crate::judge::JudgeConfig;
use crate::planner::PlannerConfig;

pub const ENV_MAX_ITERATIONS: &str = "CURRICULA_MAX_ITERATIONS";
pub const ENV_ACCEPT_THRESHOLD: &str = "CURRICULA_ACCEPT_THRESHOLD";
pub const ENV_LEARNER_FLOOR: &str = "CURRICULA_LEARNER_FLOOR";
pub const ENV_MAX_ACTIONS: &str = "CURRICULA_MAX_ACTIONS";
pub const ENV_SEED: &str = "CURRICULA_SEED";

/// Loop budget and determinism settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoopConfig {
    /// Maximum judging passes per run.
    pub max_iterations: u32,
    /// Wall-clock cap for a run (milliseconds). Reaching it ends the run as
    /// exhausted.
    pub max_run_duration_ms: Option<u64>,
    /// Seed for the backoff jitter generator.
    pub seed: u64,
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            max_iterations: 4,
            max_run_duration_ms: None,
            seed: 0,
        }
    }
}

impl LoopConfig {
    pub fn max_run_duration(&self) -> Option<Duration> {
        self.max_run_duration_ms.map(Duration::from_millis)
    }
}

/// Complete optimizer configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct OptimizerConfig {
    #[serde(rename = "loop")]
    pub loop_config: LoopConfig,
    pub judge: JudgeConfig,
    pub planner: PlannerConfig,
    pub retry: RetryPolicy,
    pub critic: CriticConfig,
}

impl OptimizerConfig {
    /// Parse and validate a TOML document. Missing keys keep their defaults.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a TOML file, then apply environment overrides.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let mut config: Self = toml::from_str(&text)?;
        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    /// Apply `CURRICULA_*` overrides from the process environment.
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from an arbitrary lookup. Unparseable values are
    /// configuration errors rather than silently ignored.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = parse_var(&lookup, ENV_MAX_ITERATIONS)? {
            self.loop_config.max_iterations = v;
        }
        if let Some(v) = parse_var(&lookup, ENV_ACCEPT_THRESHOLD)? {
            self.judge.accept_threshold = v;
        }
        if let Some(v) = parse_var(&lookup, ENV_LEARNER_FLOOR)? {
            self.judge.learner_floor = v;
        }
        if let Some(v) = parse_var(&lookup, ENV_MAX_ACTIONS)? {
            self.planner.max_actions_per_iteration = v;
        }
        if let Some(v) = parse_var(&lookup, ENV_SEED)? {
            self.loop_config.seed = v;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.loop_config.max_iterations == 0 {
            return Err(CurriculaError::Config(
                "loop.max_iterations must be at least 1".to_string(),
            ));
        }
        if self.planner.max_actions_per_iteration == 0 {
            return Err(CurriculaError::Config(
                "planner.max_actions_per_iteration must be at least 1".to_string(),
            ));
        }
        self.judge.validate().map_err(CurriculaError::Config)?;
        self.retry.validate().map_err(CurriculaError::Config)?;
        Ok(())
    }

    /// Judge configuration with per-topic overrides applied.
    pub fn judge_for(&self, topic: &TopicSpec) -> JudgeConfig {
        let mut judge = self.judge.clone();
        judge.evidence_mode = topic.evidence_mode;
        if let Some(max) = topic.max_prerequisites_per_node {
            judge.max_prerequisites_per_node = max;
        }
        judge
    }
}

fn parse_var<F, T>(lookup: &F, key: &str) -> Result<Option<T>>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    match lookup(key) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| CurriculaError::Config(format!("{key}={raw:?} is not a valid value"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::curriculum::EvidenceMode;
    use std::collections::HashMap;

    #[test]
    fn test_defaults_validate() {
        let config = OptimizerConfig::default();
        config.validate().expect("defaults are valid");
        assert_eq!(config.loop_config.max_iterations, 4);
        assert_eq!(config.planner.max_actions_per_iteration, 4);
        assert_eq!(config.judge.accept_threshold, 82);
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = OptimizerConfig::from_toml_str(
            r#"
            [loop]
            max_iterations = 6
            seed = 42

            [judge]
            accept_threshold = 90
            "#,
        )
        .expect("parse");
        assert_eq!(config.loop_config.max_iterations, 6);
        assert_eq!(config.loop_config.seed, 42);
        assert_eq!(config.judge.accept_threshold, 90);
        assert_eq!(config.judge.learner_floor, 70);
        assert_eq!(config.retry, RetryPolicy::default());
    }

    #[test]
    fn test_unknown_section_rejected() {
        let err = OptimizerConfig::from_toml_str("[metrics]\nenabled = true\n").unwrap_err();
        assert!(matches!(err, CurriculaError::Toml(_)));
    }

    #[test]
    fn test_zero_iterations_rejected() {
        let err = OptimizerConfig::from_toml_str("[loop]\nmax_iterations = 0\n").unwrap_err();
        assert!(matches!(err, CurriculaError::Config(_)));
    }

    #[test]
    fn test_overrides_apply_and_reject_garbage() {
        let vars: HashMap<&str, &str> = [(ENV_MAX_ITERATIONS, "7"), (ENV_SEED, "99")]
            .into_iter()
            .collect();
        let mut config = OptimizerConfig::default();
        config
            .apply_overrides(|k| vars.get(k).map(|v| v.to_string()))
            .expect("overrides");
        assert_eq!(config.loop_config.max_iterations, 7);
        assert_eq!(config.loop_config.seed, 99);

        let err = config
            .apply_overrides(|k| (k == ENV_ACCEPT_THRESHOLD).then(|| "high".to_string()))
            .unwrap_err();
        assert!(err.to_string().contains(ENV_ACCEPT_THRESHOLD));
    }

    #[test]
    fn test_judge_for_applies_topic_overrides() {
        let mut topic = TopicSpec::new("Learn caching");
        topic.evidence_mode = EvidenceMode::Strict;
        topic.max_prerequisites_per_node = Some(2);

        let judge = OptimizerConfig::default().judge_for(&topic);
        assert_eq!(judge.evidence_mode, EvidenceMode::Strict);
        assert_eq!(judge.max_prerequisites_per_node, 2);
    }
}
