//! In-process collaborators that need no external service.
//!
//! - [`StaticProposer`] hands back a draft supplied up front.
//! - [`HeuristicCritic`] simulates a novice walking the path with lexical and
//!   workload rules.
//! - [`DeterministicRepairExecutor`] applies repair actions locally. It never
//!   introduces a cycle: rewired prerequisites exclude the target's
//!   descendants, and any action whose result would turn an acyclic draft
//!   cyclic is discarded.

use std::collections::{BTreeMap, BTreeSet};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{
    Critic, CritiqueRequest, ProposalRequest, Proposer, ProviderError, ProviderResult,
    RepairExecutor, RepairRequest,
};
use crate::domain::action::RepairAction;
use crate::domain::critique::{ConfusionSignal, Critique};
use crate::domain::curriculum::{is_well_formed_url, CurriculumDraft, Node, Resource};
use crate::domain::diagnostic::{Diagnostic, RuleId, Severity};
use crate::graph::{self, GraphView};
use crate::judge::{
    compound_action_verbs, contains_action_verb, has_measurable_signal,
    has_weak_compound_marker, tokens, unique_nodes, JudgeConfig,
};

fn to_payload<T: Serialize>(value: &T) -> ProviderResult {
    serde_json::to_value(value).map_err(|e| ProviderError::new(e.to_string()))
}

// ---------------------------------------------------------------------------
// StaticProposer
// ---------------------------------------------------------------------------

/// Proposer that returns a fixed draft, e.g. one loaded from disk.
#[derive(Debug, Clone)]
pub struct StaticProposer {
    draft: CurriculumDraft,
}

impl StaticProposer {
    pub fn new(draft: CurriculumDraft) -> Self {
        Self { draft }
    }
}

#[async_trait]
impl Proposer for StaticProposer {
    async fn propose(&self, _request: &ProposalRequest) -> ProviderResult {
        to_payload(&self.draft)
    }
}

// ---------------------------------------------------------------------------
// HeuristicCritic
// ---------------------------------------------------------------------------

const ADVANCED_TERMS: &[&str] = &["integrate", "integration", "validate", "validation"];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CriticConfig {
    /// Declared prerequisite count at which a node overloads a novice.
    pub overload_threshold: usize,
    pub workload_jump_ratio: f64,
}

impl Default for CriticConfig {
    fn default() -> Self {
        Self {
            overload_threshold: 3,
            workload_jump_ratio: 2.2,
        }
    }
}

/// Deterministic novice simulation.
#[derive(Debug, Clone, Default)]
pub struct HeuristicCritic {
    config: CriticConfig,
}

impl HeuristicCritic {
    pub fn new(config: CriticConfig) -> Self {
        Self { config }
    }

    /// Review a draft without going through the async trait.
    pub fn review(&self, draft: &CurriculumDraft) -> Critique {
        let index: BTreeMap<&str, &Node> = unique_nodes(draft).map(|n| (n.id.as_str(), n)).collect();
        let mut diagnostics = Vec::new();

        for node in unique_nodes(draft) {
            let title_tokens = tokens(&node.title);
            let capability_tokens = tokens(&node.capability);
            let prereqs: Vec<&Node> = node
                .prerequisites
                .iter()
                .filter_map(|p| index.get(p.as_str()).copied())
                .collect();

            let looks_advanced = ADVANCED_TERMS
                .iter()
                .any(|t| capability_tokens.contains(*t) || title_tokens.contains(*t));
            if node.prerequisites.is_empty() && looks_advanced {
                diagnostics.push(
                    Diagnostic::new(
                        RuleId::HiddenPrerequisite,
                        Severity::Warn,
                        format!("node {} looks advanced but has no prerequisites", node.id),
                    )
                    .for_node(&node.id)
                    .from_critic(),
                );
            }

            if node.prerequisites.len() >= self.config.overload_threshold {
                diagnostics.push(
                    Diagnostic::new(
                        RuleId::PrerequisiteOverload,
                        Severity::Warn,
                        format!(
                            "node {} asks a novice to hold {} prerequisites at once",
                            node.id,
                            node.prerequisites.len()
                        ),
                    )
                    .for_node(&node.id)
                    .from_critic(),
                );
            }

            if !prereqs.is_empty() && !title_tokens.is_empty() {
                let bridged = prereqs.iter().any(|p| {
                    let mut known = tokens(&p.title);
                    known.extend(tokens(&p.capability));
                    !title_tokens.is_disjoint(&known)
                });
                if !bridged {
                    diagnostics.push(
                        Diagnostic::new(
                            RuleId::ConceptJump,
                            Severity::Warn,
                            format!("title of node {} has no lexical bridge to its prerequisites", node.id),
                        )
                        .for_node(&node.id)
                        .from_critic(),
                    );
                }
            }

            let peak = prereqs.iter().map(|p| p.estimate_minutes).fold(0.0_f64, f64::max);
            if peak > 0.0 && node.estimate_minutes > peak * self.config.workload_jump_ratio {
                diagnostics.push(
                    Diagnostic::new(
                        RuleId::WorkloadJump,
                        Severity::Warn,
                        format!("workload jump into node {} may be too abrupt", node.id),
                    )
                    .for_node(&node.id)
                    .from_critic(),
                );
            }
        }

        let mut confusion: BTreeMap<String, ConfusionSignal> = BTreeMap::new();
        for diag in &diagnostics {
            let Some(node_id) = diag.primary_node() else {
                continue;
            };
            let weight = if diag.rule == RuleId::HiddenPrerequisite { 40 } else { 25 };
            let entry = confusion.entry(node_id.to_string()).or_insert(ConfusionSignal {
                score: 0,
                summary: String::new(),
            });
            entry.score = (entry.score + weight).min(100);
            if !entry.summary.is_empty() {
                entry.summary.push_str(", ");
            }
            entry.summary.push_str(diag.rule.as_str());
        }

        Critique {
            diagnostics,
            confusion,
        }
    }
}

#[async_trait]
impl Critic for HeuristicCritic {
    async fn critique(&self, request: &CritiqueRequest) -> ProviderResult {
        to_payload(&self.review(&request.draft))
    }
}

// ---------------------------------------------------------------------------
// DeterministicRepairExecutor
// ---------------------------------------------------------------------------

const SPLIT_SEPARATORS: &[&str] = &[" and ", " & ", ", then ", " then ", ";", " / ", " + "];
const DEFAULT_CRITERIA: &str = "Must explain each step and include at least one worked example";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutorConfig {
    pub min_estimate_minutes: f64,
    pub max_estimate_minutes: f64,
    /// Prerequisite count a rewired node is trimmed to.
    pub max_prerequisites: usize,
    /// Retimed estimates stay within `ratio * heaviest prerequisite`.
    pub workload_ratio: f64,
    /// Retimed estimates stay within `ratio * median`.
    pub outlier_ratio: f64,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            min_estimate_minutes: 10.0,
            max_estimate_minutes: 240.0,
            max_prerequisites: 2,
            workload_ratio: 2.0,
            outlier_ratio: 2.5,
        }
    }
}

impl ExecutorConfig {
    /// Keep retimed estimates inside the judge's envelope with some margin.
    pub fn from_judge(judge: &JudgeConfig) -> Self {
        Self {
            min_estimate_minutes: judge.min_estimate_minutes,
            max_estimate_minutes: judge.max_estimate_minutes,
            max_prerequisites: judge.max_prerequisites_per_node.clamp(1, 2),
            workload_ratio: (judge.workload_jump_ratio - 0.2).max(1.0),
            outlier_ratio: (judge.outlier_factor - 0.5).max(1.0),
        }
    }
}

/// Applies repair actions without any external call.
#[derive(Debug, Clone, Default)]
pub struct DeterministicRepairExecutor {
    config: ExecutorConfig,
    catalog: Vec<Resource>,
}

impl DeterministicRepairExecutor {
    pub fn new(config: ExecutorConfig) -> Self {
        Self {
            config,
            catalog: Vec::new(),
        }
    }

    /// Extra resources `retarget_resources` may draw from.
    pub fn with_catalog(mut self, catalog: Vec<Resource>) -> Self {
        self.catalog = catalog;
        self
    }

    /// Apply `actions` in order. Actions that target unknown nodes or would
    /// close a cycle are skipped.
    pub fn apply(&self, draft: &CurriculumDraft, actions: &[RepairAction]) -> CurriculumDraft {
        let mut current = draft.clone();
        for action in actions {
            let was_acyclic = graph::analyze(&current).is_acyclic();
            let mut candidate = current.clone();
            self.apply_one(&mut candidate, action);
            if candidate == current {
                debug!(action = action.kind().as_str(), "repair action left draft unchanged");
                continue;
            }
            if was_acyclic && !graph::analyze(&candidate).is_acyclic() {
                debug!(action = action.kind().as_str(), "discarding repair that would close a cycle");
                continue;
            }
            current = candidate;
        }
        current
    }

    fn apply_one(&self, draft: &mut CurriculumDraft, action: &RepairAction) {
        match action {
            RepairAction::SplitNode { node_id } => self.split_node(draft, node_id),
            RepairAction::MergeNodes { node_id, other_id } => merge_nodes(draft, node_id, other_id),
            RepairAction::RewriteNode { node_id } => rewrite_node(draft, node_id),
            RepairAction::RewirePrereqs { node_id } => self.rewire_prereqs(draft, node_id),
            RepairAction::RetargetResources { node_id } => self.retarget_resources(draft, node_id),
            RepairAction::RetimeNode { node_id } => self.retime_node(draft, node_id),
            RepairAction::ReorderNodes => reorder_nodes(draft),
        }
    }

    fn split_node(&self, draft: &mut CurriculumDraft, node_id: &str) {
        let Some(idx) = position(draft, node_id) else {
            return;
        };
        let Some((head, tail)) = split_capability(&draft.nodes[idx].capability) else {
            rewrite_node(draft, node_id);
            return;
        };

        let original = draft.nodes[idx].clone();
        let new_id = fresh_id(draft, &original.id);
        let half = (original.estimate_minutes / 2.0)
            .round()
            .max(self.config.min_estimate_minutes);

        let mut first = original.clone();
        first.capability = head;
        first.estimate_minutes = half;
        first.mastery_check.task = mastery_task_for(&first.capability);

        let mut second = original.clone();
        second.id = new_id.clone();
        second.title = capitalize(&tail);
        second.capability = tail;
        second.prerequisites = vec![original.id.clone()];
        second.estimate_minutes = half;
        second.mastery_check.task = mastery_task_for(&second.capability);

        // Dependents now build on the completed pair.
        for node in draft.nodes.iter_mut() {
            if node.id != original.id && node.prerequisites.contains(&original.id) {
                replace_prerequisite(node, &original.id, &new_id);
            }
        }
        draft.nodes[idx] = first;
        draft.nodes.insert(idx + 1, second);
    }

    fn rewire_prereqs(&self, draft: &mut CurriculumDraft, node_id: &str) {
        let Some(idx) = position(draft, node_id) else {
            return;
        };
        let view = graph::analyze(draft);
        let descendants = view.descendants(node_id);
        let declared = draft.nodes[idx].prerequisites.clone();

        let mut cleaned: Vec<String> = Vec::new();
        for p in &declared {
            if p != node_id && draft.contains(p) && !descendants.contains(p) && !cleaned.contains(p) {
                cleaned.push(p.clone());
            }
        }
        if cleaned != declared {
            draft.nodes[idx].prerequisites = cleaned;
            return;
        }

        let max = self.config.max_prerequisites.max(1);
        if cleaned.len() > max {
            cleaned.truncate(max);
            draft.nodes[idx].prerequisites = cleaned;
            return;
        }

        if cleaned.len() < max {
            if let Some(anchor) = choose_anchor(draft, &view, node_id, &descendants, &cleaned) {
                draft.nodes[idx].prerequisites.push(anchor);
            }
        }
    }

    fn retarget_resources(&self, draft: &mut CurriculumDraft, node_id: &str) {
        let Some(idx) = position(draft, node_id) else {
            return;
        };

        let mut claimed: BTreeSet<String> = BTreeSet::new();
        for node in &draft.nodes[..idx] {
            claimed.extend(node.resources.iter().map(|r| r.url.clone()));
        }

        let node = &draft.nodes[idx];
        let uses = tokens(&format!("{} {}", node.title, node.capability));
        let mut kept: Vec<Resource> = Vec::new();
        for r in &node.resources {
            if is_well_formed_url(&r.url) && !kept.iter().any(|k| k.url == r.url) {
                kept.push(r.clone());
            }
        }
        // Shed anchors already used upstream, but never the last one.
        if kept.len() > 1 {
            let fresh: Vec<Resource> = kept.iter().filter(|r| !claimed.contains(&r.url)).cloned().collect();
            if !fresh.is_empty() {
                kept = fresh;
            }
        }

        let relevant = kept.iter().any(|r| !uses.is_disjoint(&tokens(&format!("{} {}", r.title, r.url))));
        if !relevant {
            let pool = self
                .catalog
                .iter()
                .chain(draft.nodes.iter().filter(|n| n.id != node_id).flat_map(|n| n.resources.iter()));
            let mut best: Option<(&Resource, usize)> = None;
            for candidate in pool {
                if !is_well_formed_url(&candidate.url) || kept.iter().any(|k| k.url == candidate.url) {
                    continue;
                }
                let overlap = uses
                    .intersection(&tokens(&format!("{} {}", candidate.title, candidate.url)))
                    .count();
                if overlap > 0 && best.map_or(true, |(_, b)| overlap > b) {
                    best = Some((candidate, overlap));
                }
            }
            if let Some((resource, _)) = best {
                kept.insert(0, resource.clone());
            }
        }
        draft.nodes[idx].resources = kept;
    }

    fn retime_node(&self, draft: &mut CurriculumDraft, node_id: &str) {
        let Some(idx) = position(draft, node_id) else {
            return;
        };
        let view = graph::analyze(draft);
        let valid: Vec<f64> = draft
            .nodes
            .iter()
            .map(|n| n.estimate_minutes)
            .filter(|e| e.is_finite() && *e > 0.0)
            .collect();
        let med = median(&valid).unwrap_or(self.config.min_estimate_minutes);
        let distinct: BTreeSet<u64> = valid.iter().map(|e| e.to_bits()).collect();
        let flat = valid.len() >= 6 && distinct.len() <= 2;

        let node = &draft.nodes[idx];
        let mut estimate = if node.estimate_minutes.is_finite() && node.estimate_minutes > 0.0 {
            node.estimate_minutes
        } else {
            med
        };
        if flat {
            let layer = view.layer(node_id).unwrap_or(0) as f64;
            estimate = med * (1.0 + 0.15 * layer);
        }
        let anchor = view
            .prerequisites
            .get(node_id)
            .into_iter()
            .flatten()
            .filter_map(|p| draft.node(p))
            .map(|p| p.estimate_minutes)
            .filter(|e| e.is_finite() && *e > 0.0)
            .fold(0.0_f64, f64::max);
        if anchor > 0.0 {
            estimate = estimate.min(anchor * self.config.workload_ratio);
        }
        if med > 0.0 {
            estimate = estimate.min(med * self.config.outlier_ratio);
        }
        let lo = self.config.min_estimate_minutes;
        let hi = self.config.max_estimate_minutes.max(lo);
        draft.nodes[idx].estimate_minutes = estimate.clamp(lo, hi).round();
    }
}

#[async_trait]
impl RepairExecutor for DeterministicRepairExecutor {
    async fn repair(&self, request: &RepairRequest) -> ProviderResult {
        to_payload(&self.apply(&request.draft, &request.actions))
    }
}

// ---------------------------------------------------------------------------
// Draft edits
// ---------------------------------------------------------------------------

fn position(draft: &CurriculumDraft, node_id: &str) -> Option<usize> {
    draft.nodes.iter().position(|n| n.id == node_id)
}

fn fresh_id(draft: &CurriculumDraft, base: &str) -> String {
    (2..)
        .map(|n| format!("{base}-{n}"))
        .find(|candidate| !draft.contains(candidate))
        .unwrap_or_else(|| format!("{base}-split"))
}

fn replace_prerequisite(node: &mut Node, from: &str, to: &str) {
    let mut next: Vec<String> = Vec::with_capacity(node.prerequisites.len());
    for p in &node.prerequisites {
        let mapped = if p == from { to } else { p.as_str() };
        if mapped != node.id && !next.iter().any(|q| q == mapped) {
            next.push(mapped.to_string());
        }
    }
    node.prerequisites = next;
}

fn capitalize(text: &str) -> String {
    let mut chars = text.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

fn lowercase_first(text: &str) -> String {
    let mut chars = text.chars();
    match chars.next() {
        Some(first) => first.to_lowercase().chain(chars).collect(),
        None => String::new(),
    }
}

fn mastery_task_for(capability: &str) -> String {
    let trimmed = capability.trim().trim_end_matches('.');
    format!("Write a short exercise showing you can {}", lowercase_first(trimmed))
}

/// Split a compound capability into its leading skill and the remainder.
/// A bare leading verb borrows the object of the remainder:
/// "implement and test the cache" becomes ("implement the cache", "test the cache").
fn split_capability(capability: &str) -> Option<(String, String)> {
    let lowered = capability.to_ascii_lowercase();
    for sep in SPLIT_SEPARATORS {
        let Some(pos) = lowered.find(sep) else {
            continue;
        };
        let head = capability[..pos].trim().trim_end_matches(',').trim();
        let tail = capability[pos + sep.len()..].trim();
        if head.is_empty() || tail.is_empty() {
            continue;
        }
        let head = if head.split_whitespace().count() == 1 {
            let object: Vec<&str> = tail.split_whitespace().skip(1).collect();
            if object.is_empty() {
                head.to_string()
            } else {
                format!("{} {}", head, object.join(" "))
            }
        } else {
            head.to_string()
        };
        return Some((head, tail.to_string()));
    }
    None
}

fn merge_nodes(draft: &mut CurriculumDraft, keep: &str, other: &str) {
    if keep == other {
        return;
    }
    let (Some(keep_idx), Some(other_idx)) = (position(draft, keep), position(draft, other)) else {
        return;
    };
    let absorbed = draft.nodes[other_idx].clone();
    {
        let kept = &mut draft.nodes[keep_idx];
        for p in &absorbed.prerequisites {
            if p != keep && p != other && !kept.prerequisites.contains(p) {
                kept.prerequisites.push(p.clone());
            }
        }
        for idea in &absorbed.core_ideas {
            if !kept.core_ideas.contains(idea) {
                kept.core_ideas.push(idea.clone());
            }
        }
        for pitfall in &absorbed.pitfalls {
            if !kept.pitfalls.contains(pitfall) {
                kept.pitfalls.push(pitfall.clone());
            }
        }
        for resource in &absorbed.resources {
            if !kept.resources.iter().any(|r| r.url == resource.url) {
                kept.resources.push(resource.clone());
            }
        }
        kept.estimate_minutes = kept.estimate_minutes.max(absorbed.estimate_minutes);
    }
    draft.nodes.remove(other_idx);
    for node in draft.nodes.iter_mut() {
        if node.prerequisites.iter().any(|p| p == other) {
            replace_prerequisite(node, other, keep);
        }
    }
    for question in draft.open_questions.iter_mut() {
        for related in question.related_nodes.iter_mut() {
            if related == other {
                *related = keep.to_string();
            }
        }
        question.related_nodes.dedup();
    }
}

fn rewrite_node(draft: &mut CurriculumDraft, node_id: &str) {
    let Some(idx) = position(draft, node_id) else {
        return;
    };

    let bridge = {
        let node = &draft.nodes[idx];
        let uses = tokens(&format!("{} {}", node.title, node.capability));
        let prereqs: Vec<&Node> = node.prerequisites.iter().filter_map(|p| draft.node(p)).collect();
        let bridged = prereqs.iter().any(|p| {
            !uses.is_disjoint(&tokens(&format!(
                "{} {} {}",
                p.title,
                p.capability,
                p.core_ideas.join(" ")
            )))
        });
        if bridged {
            None
        } else {
            prereqs.first().map(|p| lowercase_first(&p.title))
        }
    };

    let node = &mut draft.nodes[idx];
    if compound_action_verbs(&node.capability).is_some() || has_weak_compound_marker(&node.capability) {
        if let Some((head, _)) = split_capability(&node.capability) {
            node.capability = head;
        }
    }
    if let Some(prereq_title) = bridge {
        node.capability = format!("{} building on {}", node.capability.trim_end_matches('.'), prereq_title);
    }

    let task = node.mastery_check.task.trim();
    if task.chars().count() < 20 || !contains_action_verb(task) {
        node.mastery_check.task = mastery_task_for(&node.capability);
    }
    let criteria = node.mastery_check.pass_criteria.trim();
    if criteria.chars().count() < 20 || !has_measurable_signal(criteria) {
        node.mastery_check.pass_criteria = DEFAULT_CRITERIA.to_string();
    }
    if node.core_ideas.is_empty() {
        node.core_ideas.push(node.title.clone());
    }
}

/// Best extra prerequisite for `node_id`: the non-descendant with the most
/// shared concepts, ties to the latest in topological order. When nothing
/// overlaps and the node has no prerequisites at all, its topological
/// predecessor is used.
fn choose_anchor(
    draft: &CurriculumDraft,
    view: &GraphView,
    node_id: &str,
    descendants: &BTreeSet<String>,
    current: &[String],
) -> Option<String> {
    let node = draft.node(node_id)?;
    let uses = tokens(&format!("{} {}", node.title, node.capability));
    let order: Vec<&str> = if view.is_acyclic() {
        view.topological_order.iter().map(String::as_str).collect()
    } else {
        unique_nodes(draft).map(|n| n.id.as_str()).collect()
    };

    let eligible = |id: &str| id != node_id && !descendants.contains(id) && !current.iter().any(|c| c == id);

    let mut best: Option<(&str, usize)> = None;
    for id in order.iter().copied().filter(|id| eligible(*id)) {
        let Some(candidate) = draft.node(id) else {
            continue;
        };
        let overlap = uses
            .intersection(&tokens(&format!(
                "{} {} {}",
                candidate.title,
                candidate.capability,
                candidate.core_ideas.join(" ")
            )))
            .count();
        if overlap > 0 && best.map_or(true, |(_, b)| overlap >= b) {
            best = Some((id, overlap));
        }
    }
    if let Some((id, _)) = best {
        return Some(id.to_string());
    }
    if !current.is_empty() {
        return None;
    }
    let here = order.iter().position(|id| *id == node_id)?;
    order[..here]
        .iter()
        .rev()
        .copied()
        .find(|id| eligible(*id))
        .map(str::to_string)
}

fn reorder_nodes(draft: &mut CurriculumDraft) {
    let view = graph::analyze(draft);
    if view.is_acyclic() {
        let rank: BTreeMap<&str, usize> = view
            .topological_order
            .iter()
            .enumerate()
            .map(|(i, id)| (id.as_str(), i))
            .collect();
        let mut nodes = std::mem::take(&mut draft.nodes);
        nodes.sort_by_key(|n| rank.get(n.id.as_str()).copied().unwrap_or(usize::MAX));
        draft.nodes = nodes;
    } else {
        draft
            .nodes
            .sort_by(|a, b| (a.prerequisites.len(), &a.id).cmp(&(b.prerequisites.len(), &b.id)));
    }
}

fn median(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    let mid = sorted.len() / 2;
    Some(if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    } else {
        sorted[mid]
    })
}
