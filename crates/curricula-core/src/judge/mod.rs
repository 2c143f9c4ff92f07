//! Deterministic quality judge.
//!
//! Scores a draft on eight dimensions, counts hard gates and returns the
//! acceptance verdict. The judge is the only acceptance authority in the loop:
//! critic output feeds `learner_path_coherence` but can never hard-gate a
//! draft on its own.
//!
//! Every dimension starts at 100 and loses a rule-specific deduction per
//! finding, floored at 0. Diagnostics are emitted in dimension order and,
//! within a dimension, in draft order, so two evaluations of the same input
//! serialize byte-identically.

mod content;
mod learner;
mod structural;

use std::collections::{BTreeMap, BTreeSet};
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::domain::critique::Critique;
use crate::domain::curriculum::{CurriculumDraft, EvidenceMode, Node};
use crate::domain::diagnostic::{Diagnostic, Dimension, RuleId, Severity};
use crate::graph::GraphView;

pub(crate) use content::{contains_action_verb, has_measurable_signal};
pub(crate) use structural::{compound_action_verbs, has_weak_compound_marker};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Relative weight of each dimension in the aggregate score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DimensionWeights {
    pub structural_validity: f64,
    pub atomicity: f64,
    pub pedagogical_progression: f64,
    pub resource_relevance: f64,
    pub mastery_actionability: f64,
    pub effort_coherence: f64,
    pub redundancy: f64,
    pub learner_path_coherence: f64,
}

impl Default for DimensionWeights {
    fn default() -> Self {
        Self {
            structural_validity: 0.22,
            atomicity: 0.14,
            pedagogical_progression: 0.14,
            resource_relevance: 0.12,
            mastery_actionability: 0.14,
            effort_coherence: 0.08,
            redundancy: 0.08,
            learner_path_coherence: 0.08,
        }
    }
}

impl DimensionWeights {
    pub fn weight(&self, dimension: Dimension) -> f64 {
        match dimension {
            Dimension::StructuralValidity => self.structural_validity,
            Dimension::Atomicity => self.atomicity,
            Dimension::PedagogicalProgression => self.pedagogical_progression,
            Dimension::ResourceRelevance => self.resource_relevance,
            Dimension::MasteryActionability => self.mastery_actionability,
            Dimension::EffortCoherence => self.effort_coherence,
            Dimension::Redundancy => self.redundancy,
            Dimension::LearnerPathCoherence => self.learner_path_coherence,
        }
    }

    /// Weights must be finite, non-negative and not all zero.
    pub fn validate(&self) -> Result<(), String> {
        let mut total = 0.0;
        for dimension in Dimension::ALL {
            let w = self.weight(dimension);
            if !w.is_finite() || w < 0.0 {
                return Err(format!("weight for {} must be >= 0", dimension.as_str()));
            }
            total += w;
        }
        if total <= 0.0 {
            return Err("dimension weights must not all be zero".to_string());
        }
        Ok(())
    }
}

/// Thresholds, floors and envelopes used by the judge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct JudgeConfig {
    pub weights: DimensionWeights,
    /// Minimum aggregate score for acceptance.
    pub accept_threshold: u32,
    /// Minimum `learner_path_coherence` score for acceptance.
    pub learner_floor: u32,
    pub min_estimate_minutes: f64,
    pub max_estimate_minutes: f64,
    /// Estimates above `median * outlier_factor` are outliers.
    pub outlier_factor: f64,
    /// Jaccard similarity at or above which two nodes are near-duplicates.
    pub similarity_threshold: f64,
    /// Estimates above `ratio * max prerequisite estimate` are workload jumps.
    pub workload_jump_ratio: f64,
    pub max_prerequisites_per_node: usize,
    /// Minimum characters in a mastery task or pass criteria.
    pub min_mastery_chars: usize,
    /// Novice confusion score at or above which a node is flagged.
    pub confusion_threshold: u32,
    pub evidence_mode: EvidenceMode,
}

impl Default for JudgeConfig {
    fn default() -> Self {
        Self {
            weights: DimensionWeights::default(),
            accept_threshold: 82,
            learner_floor: 70,
            min_estimate_minutes: 10.0,
            max_estimate_minutes: 240.0,
            outlier_factor: 3.0,
            similarity_threshold: 0.8,
            workload_jump_ratio: 2.2,
            max_prerequisites_per_node: 4,
            min_mastery_chars: 20,
            confusion_threshold: 60,
            evidence_mode: EvidenceMode::Minimal,
        }
    }
}

impl JudgeConfig {
    pub fn validate(&self) -> Result<(), String> {
        self.weights.validate()?;
        if self.accept_threshold > 100 || self.learner_floor > 100 {
            return Err("accept_threshold and learner_floor must be <= 100".to_string());
        }
        if !(self.min_estimate_minutes > 0.0 && self.min_estimate_minutes <= self.max_estimate_minutes)
        {
            return Err("estimate envelope must satisfy 0 < min <= max".to_string());
        }
        if !(self.outlier_factor > 1.0 && self.workload_jump_ratio > 1.0) {
            return Err("outlier_factor and workload_jump_ratio must be > 1".to_string());
        }
        if !(0.0..=1.0).contains(&self.similarity_threshold) {
            return Err("similarity_threshold must be in [0, 1]".to_string());
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Report
// ---------------------------------------------------------------------------

/// Full judgment of one draft. Recomputed fresh every iteration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityReport {
    pub scores: BTreeMap<Dimension, u32>,
    pub aggregate: u32,
    pub hard_gate_count: usize,
    pub diagnostics: Vec<Diagnostic>,
    pub accepted: bool,
}

/// Compact report view recorded in the trace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportSummary {
    pub scores: BTreeMap<Dimension, u32>,
    pub aggregate: u32,
    pub hard_gate_count: usize,
    pub diagnostic_count: usize,
    /// Distinct rules that fired, ascending.
    pub rules: Vec<String>,
    pub accepted: bool,
}

impl QualityReport {
    pub fn score(&self, dimension: Dimension) -> u32 {
        self.scores.get(&dimension).copied().unwrap_or(0)
    }

    /// Sum of severity weights of every diagnostic mentioning `node_id`.
    pub fn node_penalty(&self, node_id: &str) -> u32 {
        self.diagnostics
            .iter()
            .filter(|d| d.mentions(node_id))
            .map(|d| d.severity.penalty_weight())
            .sum()
    }

    pub fn has_rule(&self, rule: RuleId) -> bool {
        self.diagnostics.iter().any(|d| d.rule == rule)
    }

    pub fn summary(&self) -> ReportSummary {
        let rules: BTreeSet<&'static str> = self.diagnostics.iter().map(|d| d.rule.as_str()).collect();
        ReportSummary {
            scores: self.scores.clone(),
            aggregate: self.aggregate,
            hard_gate_count: self.hard_gate_count,
            diagnostic_count: self.diagnostics.len(),
            rules: rules.into_iter().map(str::to_string).collect(),
            accepted: self.accepted,
        }
    }
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

/// Inputs shared by every dimension rule.
pub(crate) struct JudgeContext<'a> {
    pub draft: &'a CurriculumDraft,
    pub view: &'a GraphView,
    pub config: &'a JudgeConfig,
    pub critique: Option<&'a Critique>,
}

/// Findings for one dimension.
pub(crate) struct Findings {
    penalty: u32,
    diagnostics: Vec<Diagnostic>,
}

impl Findings {
    pub fn new() -> Self {
        Self {
            penalty: 0,
            diagnostics: Vec::new(),
        }
    }

    pub fn push(&mut self, diagnostic: Diagnostic, deduction: u32) {
        self.penalty = self.penalty.saturating_add(deduction);
        self.diagnostics.push(diagnostic);
    }

    pub fn contains(&self, rule: RuleId, node_id: &str) -> bool {
        self.diagnostics
            .iter()
            .any(|d| d.rule == rule && d.primary_node() == Some(node_id))
    }

    pub fn score(&self) -> u32 {
        100u32.saturating_sub(self.penalty)
    }
}

#[derive(Debug, Clone, Default)]
pub struct DeterministicQualityJudge {
    config: JudgeConfig,
}

impl DeterministicQualityJudge {
    pub fn new(config: JudgeConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &JudgeConfig {
        &self.config
    }

    /// Judge a draft. `view` must be the analysis of `draft`.
    pub fn evaluate(
        &self,
        draft: &CurriculumDraft,
        view: &GraphView,
        critique: Option<&Critique>,
    ) -> QualityReport {
        let ctx = JudgeContext {
            draft,
            view,
            config: &self.config,
            critique,
        };

        let mut scores = BTreeMap::new();
        let mut diagnostics = Vec::new();
        for dimension in Dimension::ALL {
            let findings = match dimension {
                Dimension::StructuralValidity => structural::structural_validity(&ctx),
                Dimension::Atomicity => structural::atomicity(&ctx),
                Dimension::PedagogicalProgression => structural::pedagogical_progression(&ctx),
                Dimension::ResourceRelevance => content::resource_relevance(&ctx),
                Dimension::MasteryActionability => content::mastery_actionability(&ctx),
                Dimension::EffortCoherence => content::effort_coherence(&ctx),
                Dimension::Redundancy => content::redundancy(&ctx),
                Dimension::LearnerPathCoherence => learner::learner_path_coherence(&ctx),
            };
            scores.insert(dimension, findings.score());
            diagnostics.extend(findings.diagnostics);
        }

        let aggregate = weighted_aggregate(&scores, &self.config.weights);
        let hard_gate_count = diagnostics.iter().filter(|d| d.is_hard_gate()).count();
        let learner = scores
            .get(&Dimension::LearnerPathCoherence)
            .copied()
            .unwrap_or(0);
        let accepted = hard_gate_count == 0
            && aggregate >= self.config.accept_threshold
            && learner >= self.config.learner_floor;

        QualityReport {
            scores,
            aggregate,
            hard_gate_count,
            diagnostics,
            accepted,
        }
    }
}

/// Weighted mean of the dimension scores, rounded to the nearest integer.
pub fn weighted_aggregate(scores: &BTreeMap<Dimension, u32>, weights: &DimensionWeights) -> u32 {
    let mut total = 0.0;
    let mut weight_sum = 0.0;
    for dimension in Dimension::ALL {
        let w = weights.weight(dimension);
        total += f64::from(scores.get(&dimension).copied().unwrap_or(0)) * w;
        weight_sum += w;
    }
    if weight_sum <= 0.0 {
        return 0;
    }
    (total / weight_sum).round().clamp(0.0, 100.0) as u32
}

fn token_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[a-z0-9]{4,}").expect("valid token regex"))
}

/// Lowercased alphanumeric tokens of at least four characters.
pub(crate) fn tokens(text: &str) -> BTreeSet<String> {
    token_pattern()
        .find_iter(&text.to_lowercase())
        .map(|m| m.as_str().to_string())
        .collect()
}

/// Draft nodes with repeated ids skipped after their first occurrence.
pub(crate) fn unique_nodes<'a>(draft: &'a CurriculumDraft) -> impl Iterator<Item = &'a Node> + 'a {
    let mut seen: BTreeSet<&'a str> = BTreeSet::new();
    draft.nodes.iter().filter(move |n| seen.insert(n.id.as_str()))
}

pub(crate) fn severity_for(hard: bool) -> Severity {
    if hard {
        Severity::HardFail
    } else {
        Severity::Warn
    }
}
