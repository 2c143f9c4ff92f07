//! Critic output: diagnostics plus per-node novice confusion signals.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::domain::diagnostic::{Diagnostic, DiagnosticSource};
use crate::domain::error::{CurriculaError, Result};

/// How confusing a simulated novice found one node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConfusionSignal {
    /// 0 (clear) to 100 (lost).
    pub score: u32,
    #[serde(default)]
    pub summary: String,
}

/// Response from the critic collaborator.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Critique {
    #[serde(default)]
    pub diagnostics: Vec<Diagnostic>,
    /// Keyed by node id.
    #[serde(default)]
    pub confusion: BTreeMap<String, ConfusionSignal>,
}

impl Critique {
    /// Decode a critic payload. Every diagnostic is re-tagged as critic-sourced
    /// regardless of what the payload claims.
    pub fn from_response(stage: &str, value: serde_json::Value) -> Result<Self> {
        let mut critique: Critique =
            serde_json::from_value(value).map_err(|e| CurriculaError::SchemaViolation {
                stage: stage.to_string(),
                detail: e.to_string(),
            })?;
        if let Some((node_id, signal)) = critique.confusion.iter().find(|(_, s)| s.score > 100) {
            return Err(CurriculaError::SchemaViolation {
                stage: stage.to_string(),
                detail: format!(
                    "confusion score {} for node {} is outside 0..=100",
                    signal.score, node_id
                ),
            });
        }
        for diag in &mut critique.diagnostics {
            diag.source = DiagnosticSource::Critic;
        }
        Ok(critique)
    }
}
