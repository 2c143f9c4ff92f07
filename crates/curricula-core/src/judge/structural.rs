//! Structural validity, atomicity and pedagogical progression rules.

use std::collections::{BTreeMap, BTreeSet};

use super::content::action_verb;
use super::{severity_for, unique_nodes, Findings, JudgeContext};
use crate::domain::curriculum::is_well_formed_url;
use crate::domain::diagnostic::{Diagnostic, RuleId, Severity};

const CONJUNCTIONS: &[&str] = &["and", "&", "then", "plus"];
const WEAK_MARKERS: &[&str] = &[";", " / ", " + "];

pub(super) fn structural_validity(ctx: &JudgeContext<'_>) -> Findings {
    let mut findings = Findings::new();
    let draft = ctx.draft;

    if draft.nodes.is_empty() {
        findings.push(
            Diagnostic::new(RuleId::EmptyDraft, Severity::HardFail, "draft has no nodes"),
            100,
        );
        return findings;
    }

    let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
    for node in &draft.nodes {
        *counts.entry(node.id.as_str()).or_default() += 1;
    }
    let mut reported = BTreeSet::new();
    for node in &draft.nodes {
        if counts[node.id.as_str()] > 1 && reported.insert(node.id.as_str()) {
            findings.push(
                Diagnostic::new(
                    RuleId::DuplicateNodeIds,
                    Severity::HardFail,
                    format!("node id {} appears {} times", node.id, counts[node.id.as_str()]),
                )
                .for_node(&node.id),
                60,
            );
        }
    }

    for node in &draft.nodes {
        for prereq in &node.prerequisites {
            if *prereq == node.id {
                findings.push(
                    Diagnostic::new(
                        RuleId::SelfPrerequisite,
                        Severity::HardFail,
                        format!("node {} lists itself as a prerequisite", node.id),
                    )
                    .for_node(&node.id),
                    20,
                );
            } else if !draft.contains(prereq) {
                findings.push(
                    Diagnostic::new(
                        RuleId::MissingPrerequisite,
                        Severity::HardFail,
                        format!("prerequisite {} of node {} does not exist", prereq, node.id),
                    )
                    .for_node(&node.id),
                    15,
                );
            }
        }
    }

    if ctx.view.cycles.cycles_detected {
        let cycles = &ctx.view.cycles;
        // Only on-cycle nodes are named; the smallest one is rewired first.
        findings.push(
            Diagnostic::new(
                RuleId::Cycle,
                Severity::HardFail,
                format!(
                    "cycle through {}; {} node(s) unreachable by topological sort",
                    cycles.on_cycle.iter().cloned().collect::<Vec<_>>().join(", "),
                    cycles.unvisited.len()
                ),
            )
            .for_nodes(cycles.on_cycle.iter().cloned()),
            50,
        );
    }

    for node in &draft.nodes {
        if !node.estimate_minutes.is_finite() || node.estimate_minutes <= 0.0 {
            findings.push(
                Diagnostic::new(
                    RuleId::InvalidEstimate,
                    Severity::Warn,
                    format!("node {} has a non-positive estimate", node.id),
                )
                .for_node(&node.id),
                15,
            );
        }
        if let Some(confidence) = node.estimate_confidence {
            if !(0.0..=1.0).contains(&confidence) {
                findings.push(
                    Diagnostic::new(
                        RuleId::InvalidConfidence,
                        Severity::Warn,
                        format!("node {} estimate confidence {} is outside [0, 1]", node.id, confidence),
                    )
                    .for_node(&node.id),
                    5,
                );
            }
        }
        if node.resources.iter().any(|r| !is_well_formed_url(&r.url)) {
            findings.push(
                Diagnostic::new(
                    RuleId::MalformedResourceUrl,
                    Severity::Warn,
                    format!("node {} has a resource with a malformed URL", node.id),
                )
                .for_node(&node.id),
                10,
            );
        }
    }

    for question in &draft.open_questions {
        let unknown: Vec<&str> = question
            .related_nodes
            .iter()
            .filter(|id| !draft.contains(id))
            .map(String::as_str)
            .collect();
        if !unknown.is_empty() {
            findings.push(
                Diagnostic::new(
                    RuleId::DanglingOpenQuestion,
                    Severity::Info,
                    format!(
                        "open question {:?} references unknown node(s) {}",
                        question.question,
                        unknown.join(", ")
                    ),
                ),
                3,
            );
        }
    }

    findings
}

/// The two distinct action verbs a conjunction joins in `capability`, if any.
///
/// "implement and test the cache" yields `("implement", "test")`; "explain
/// caches and queues" yields nothing because only one side carries a verb.
pub(crate) fn compound_action_verbs(capability: &str) -> Option<(&'static str, &'static str)> {
    let lowered = capability.to_lowercase();
    let words: Vec<&str> = lowered
        .split(|c: char| !(c.is_ascii_alphanumeric() || c == '&'))
        .filter(|w| !w.is_empty())
        .collect();

    for (idx, word) in words.iter().enumerate() {
        if !CONJUNCTIONS.contains(word) {
            continue;
        }
        let before = words[..idx].iter().rev().find_map(|w| action_verb(w));
        let after = words[idx + 1..].iter().find_map(|w| action_verb(w));
        if let (Some(a), Some(b)) = (before, after) {
            if a != b {
                return Some((a, b));
            }
        }
    }
    None
}

pub(crate) fn has_weak_compound_marker(capability: &str) -> bool {
    WEAK_MARKERS.iter().any(|m| capability.contains(m))
}

pub(super) fn atomicity(ctx: &JudgeContext<'_>) -> Findings {
    let mut findings = Findings::new();
    let mut offenders: Vec<&str> = Vec::new();

    for node in &ctx.draft.nodes {
        if let Some((first, second)) = compound_action_verbs(&node.capability) {
            offenders.push(&node.id);
            findings.push(
                Diagnostic::new(
                    RuleId::CompoundCapability,
                    severity_for(true),
                    format!(
                        "capability of node {} joins two skills ({} + {}); split it",
                        node.id, first, second
                    ),
                )
                .for_node(&node.id),
                20,
            );
        } else if has_weak_compound_marker(&node.capability) {
            offenders.push(&node.id);
            findings.push(
                Diagnostic::new(
                    RuleId::CompoundMarker,
                    Severity::Warn,
                    format!("capability of node {} looks compound", node.id),
                )
                .for_node(&node.id),
                8,
            );
        }
    }

    let n = ctx.draft.nodes.len();
    if n > 0 && offenders.len() > (n / 4).max(1) {
        findings.push(
            Diagnostic::new(
                RuleId::AtomicityThreshold,
                Severity::Warn,
                format!("{} of {} nodes are not atomic", offenders.len(), n),
            )
            .for_nodes(offenders.iter().copied()),
            20,
        );
    }
    findings
}

pub(super) fn pedagogical_progression(ctx: &JudgeContext<'_>) -> Findings {
    let mut findings = Findings::new();
    let view = ctx.view;
    let n = view.prerequisites.len();

    if n >= 4 && view.roots().len() == n {
        findings.push(
            Diagnostic::new(
                RuleId::AllRoots,
                Severity::Warn,
                "every node is a root; progression is weak",
            )
            .for_nodes(view.topological_order.iter().skip(1).cloned()),
            45,
        );
    }

    if view.is_acyclic() && n >= 6 && view.max_depth() < 2 {
        let deepest = view
            .milestones
            .last()
            .map(|m| m.node_ids.clone())
            .unwrap_or_default();
        findings.push(
            Diagnostic::new(
                RuleId::DepthTooShallow,
                Severity::Warn,
                format!(
                    "graph depth {} is too shallow for {} nodes",
                    view.max_depth(),
                    n
                ),
            )
            .for_nodes(deepest),
            40,
        );
    }

    let max = ctx.config.max_prerequisites_per_node;
    for node in unique_nodes(ctx.draft) {
        let count = view.prerequisites.get(&node.id).map_or(0, Vec::len);
        if count > max {
            findings.push(
                Diagnostic::new(
                    RuleId::PrerequisiteFanIn,
                    Severity::Warn,
                    format!("node {} has {} prerequisites (max {})", node.id, count, max),
                )
                .for_node(&node.id),
                10,
            );
        }
    }
    findings
}
