//! Resource, mastery, effort and redundancy rules.

use std::cmp::Reverse;
use std::collections::{BTreeMap, BTreeSet};

use super::{tokens, unique_nodes, Findings, JudgeContext};
use crate::domain::curriculum::{EvidenceMode, Node, ResourceRole};
use crate::domain::diagnostic::{Diagnostic, RuleId, Severity};

pub(crate) const ACTION_VERBS: &[&str] = &[
    "analyze", "apply", "benchmark", "build", "compare", "compute", "configure", "debug",
    "define", "deploy", "derive", "describe", "design", "diagnose", "document", "evaluate",
    "explain", "identify", "implement", "integrate", "interpret", "measure", "optimize",
    "profile", "prove", "read", "refactor", "run", "simulate", "test", "tune", "validate",
    "write",
];

const MEASURABLE_SIGNALS: &[&str] = &[
    "must ", "at least", "at most", "include", "pass", "threshold", "criteria", "within",
];

/// Base form of `word` if it is an action verb, tolerating `-s` and `-ing`.
pub(crate) fn action_verb(word: &str) -> Option<&'static str> {
    let lookup = |candidate: &str| ACTION_VERBS.iter().copied().find(|v| *v == candidate);
    if let Some(v) = lookup(word) {
        return Some(v);
    }
    if let Some(stem) = word.strip_suffix('s') {
        if let Some(v) = lookup(stem) {
            return Some(v);
        }
    }
    if let Some(stem) = word.strip_suffix("ing") {
        if let Some(v) = lookup(stem) {
            return Some(v);
        }
        return lookup(format!("{stem}e").as_str());
    }
    None
}

pub(crate) fn contains_action_verb(text: &str) -> bool {
    text.to_lowercase()
        .split(|c: char| !c.is_ascii_alphanumeric())
        .any(|w| action_verb(w).is_some())
}

pub(crate) fn has_measurable_signal(text: &str) -> bool {
    let lowered = text.to_lowercase();
    MEASURABLE_SIGNALS.iter().any(|s| lowered.contains(s))
        || lowered.chars().any(|c| c.is_ascii_digit())
}

pub(super) fn resource_relevance(ctx: &JudgeContext<'_>) -> Findings {
    let mut findings = Findings::new();
    let mut first_holder: BTreeMap<&str, &str> = BTreeMap::new();
    let mut duplicate_urls = 0usize;
    let mut repeaters: Vec<&str> = Vec::new();

    for node in &ctx.draft.nodes {
        if node.resources.is_empty() {
            findings.push(
                Diagnostic::new(
                    RuleId::MissingResources,
                    Severity::Warn,
                    format!("node {} has no resources", node.id),
                )
                .for_node(&node.id),
                18,
            );
            continue;
        }

        let node_tokens = tokens(&format!("{} {}", node.title, node.capability));
        let material: String = node
            .resources
            .iter()
            .map(|r| format!("{} {} ", r.title, r.url))
            .collect();
        if !node_tokens.is_empty() && node_tokens.is_disjoint(&tokens(&material)) {
            findings.push(
                Diagnostic::new(
                    RuleId::WeakRelevance,
                    Severity::Warn,
                    format!("resources of node {} do not mention its title or capability", node.id),
                )
                .for_node(&node.id),
                8,
            );
        }

        if let Some(gap) = evidence_gap(node, ctx.config.evidence_mode) {
            findings.push(
                Diagnostic::new(
                    RuleId::InsufficientEvidence,
                    Severity::Warn,
                    format!("node {}: {}", node.id, gap),
                )
                .for_node(&node.id),
                6,
            );
        }

        for resource in &node.resources {
            match first_holder.get(resource.url.as_str()) {
                Some(holder) if *holder != node.id => {
                    duplicate_urls += 1;
                    if !repeaters.contains(&node.id.as_str()) {
                        repeaters.push(&node.id);
                    }
                }
                Some(_) => {}
                None => {
                    first_holder.insert(&resource.url, &node.id);
                }
            }
        }
    }

    if duplicate_urls > (ctx.draft.nodes.len() / 2).max(2) {
        findings.push(
            Diagnostic::new(
                RuleId::RepetitiveAnchor,
                Severity::Warn,
                format!("{} resource URLs are reused across nodes", duplicate_urls),
            )
            .for_nodes(repeaters),
            10,
        );
    }
    findings
}

fn evidence_gap(node: &Node, mode: EvidenceMode) -> Option<&'static str> {
    if mode == EvidenceMode::Minimal {
        return None;
    }
    let has_role = |role| node.resources.iter().any(|r| r.role == Some(role));
    if node.resources.len() < 2 {
        return Some("needs at least two resources");
    }
    if !has_role(ResourceRole::Definition) || !has_role(ResourceRole::Example) {
        return Some("needs both a definition and an example resource");
    }
    if mode == EvidenceMode::Strict {
        if node.resources.iter().any(|r| r.citation.is_none()) {
            return Some("every resource needs a citation");
        }
        if node.estimate_confidence.is_none() {
            return Some("estimate confidence is required");
        }
    }
    None
}

pub(super) fn mastery_actionability(ctx: &JudgeContext<'_>) -> Findings {
    let mut findings = Findings::new();
    let min_chars = ctx.config.min_mastery_chars;

    for node in &ctx.draft.nodes {
        let task = node.mastery_check.task.trim();
        if task.is_empty() {
            findings.push(
                Diagnostic::new(
                    RuleId::MissingTask,
                    Severity::HardFail,
                    format!("node {} has no mastery task", node.id),
                )
                .for_node(&node.id),
                25,
            );
        } else if task.chars().count() < min_chars || !contains_action_verb(task) {
            findings.push(
                Diagnostic::new(
                    RuleId::NonActionableTask,
                    Severity::Warn,
                    format!("mastery task of node {} is not specific enough to act on", node.id),
                )
                .for_node(&node.id),
                12,
            );
        }

        let criteria = node.mastery_check.pass_criteria.trim();
        if criteria.is_empty() {
            findings.push(
                Diagnostic::new(
                    RuleId::MissingCriteria,
                    Severity::HardFail,
                    format!("node {} has no pass criteria", node.id),
                )
                .for_node(&node.id),
                25,
            );
        } else if criteria.chars().count() < min_chars || !has_measurable_signal(criteria) {
            findings.push(
                Diagnostic::new(
                    RuleId::NonMeasurableCriteria,
                    Severity::Warn,
                    format!("pass criteria of node {} lack a measurable signal", node.id),
                )
                .for_node(&node.id),
                12,
            );
        }
    }
    findings
}

fn median(values: &[f64]) -> f64 {
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    } else {
        sorted[mid]
    }
}

pub(super) fn effort_coherence(ctx: &JudgeContext<'_>) -> Findings {
    let mut findings = Findings::new();
    let config = ctx.config;
    let estimated: Vec<&Node> = ctx
        .draft
        .nodes
        .iter()
        .filter(|n| n.estimate_minutes.is_finite() && n.estimate_minutes > 0.0)
        .collect();
    if estimated.is_empty() {
        return findings;
    }
    let estimates: Vec<f64> = estimated.iter().map(|n| n.estimate_minutes).collect();

    let distinct: BTreeSet<u64> = estimates.iter().map(|e| e.to_bits()).collect();
    if estimates.len() >= 6 && distinct.len() <= 2 {
        // Deepest nodes first: they are the ones a layered retime can spread out.
        let mut targets = estimated.clone();
        targets.sort_by_key(|n| Reverse(ctx.view.layer(&n.id).unwrap_or(0)));
        findings.push(
            Diagnostic::new(
                RuleId::FlatDistribution,
                Severity::Warn,
                format!(
                    "{} nodes share only {} distinct estimate(s)",
                    estimates.len(),
                    distinct.len()
                ),
            )
            .for_nodes(targets.iter().map(|n| n.id.as_str())),
            25,
        );
    }

    for node in &estimated {
        let e = node.estimate_minutes;
        if e < config.min_estimate_minutes || e > config.max_estimate_minutes {
            findings.push(
                Diagnostic::new(
                    RuleId::OutsideEnvelope,
                    Severity::Warn,
                    format!(
                        "node {} estimate {}m is outside {}..{}m",
                        node.id, e, config.min_estimate_minutes, config.max_estimate_minutes
                    ),
                )
                .for_node(&node.id),
                10,
            );
        }
    }

    let med = median(&estimates);
    if med > 0.0 {
        for node in &estimated {
            if node.estimate_minutes > med * config.outlier_factor {
                findings.push(
                    Diagnostic::new(
                        RuleId::EffortOutlier,
                        Severity::Warn,
                        format!(
                            "node {} estimate {}m exceeds {}x the median {}m",
                            node.id, node.estimate_minutes, config.outlier_factor, med
                        ),
                    )
                    .for_node(&node.id),
                    10,
                );
            }
        }
    }
    findings
}

fn jaccard(a: &BTreeSet<String>, b: &BTreeSet<String>) -> f64 {
    let union = a.union(b).count();
    if union == 0 {
        return 0.0;
    }
    a.intersection(b).count() as f64 / union as f64
}

fn title_prefix(title: &str) -> String {
    title
        .to_lowercase()
        .split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|w| !w.is_empty())
        .take(5)
        .collect::<Vec<_>>()
        .join(" ")
}

pub(super) fn redundancy(ctx: &JudgeContext<'_>) -> Findings {
    let mut findings = Findings::new();
    let nodes: Vec<&Node> = unique_nodes(ctx.draft).collect();
    let token_sets: Vec<BTreeSet<String>> = nodes
        .iter()
        .map(|n| tokens(&format!("{} {}", n.title, n.capability)))
        .collect();

    for i in 0..nodes.len() {
        for j in (i + 1)..nodes.len() {
            if token_sets[i].is_empty() || token_sets[j].is_empty() {
                continue;
            }
            let similarity = jaccard(&token_sets[i], &token_sets[j]);
            if similarity >= ctx.config.similarity_threshold {
                findings.push(
                    Diagnostic::new(
                        RuleId::SimilarNodes,
                        Severity::Warn,
                        format!(
                            "nodes {} and {} are near-duplicates (similarity {:.2})",
                            nodes[i].id, nodes[j].id, similarity
                        ),
                    )
                    .for_nodes([nodes[i].id.as_str(), nodes[j].id.as_str()]),
                    15,
                );
            }
        }
    }

    let prefixes: Vec<String> = nodes.iter().map(|n| title_prefix(&n.title)).collect();
    let distinct: BTreeSet<&str> = prefixes.iter().map(String::as_str).collect();
    if nodes.len() >= 6 && distinct.len() <= (nodes.len() / 3).max(2) {
        let repeated: Vec<&str> = nodes
            .iter()
            .zip(&prefixes)
            .filter(|(_, p)| prefixes.iter().filter(|q| q == p).count() > 1)
            .map(|(n, _)| n.id.as_str())
            .collect();
        findings.push(
            Diagnostic::new(
                RuleId::TitleRepetition,
                Severity::Warn,
                format!("{} nodes share only {} title prefixes", nodes.len(), distinct.len()),
            )
            .for_nodes(repeated),
            25,
        );
    }
    findings
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_action_verb_inflections() {
        assert_eq!(action_verb("implements"), Some("implement"));
        assert_eq!(action_verb("writing"), Some("write"));
        assert_eq!(action_verb("testing"), Some("test"));
        assert_eq!(action_verb("cache"), None);
    }

    #[test]
    fn test_measurable_signal() {
        assert!(has_measurable_signal("Must evict the least recently used key"));
        assert!(has_measurable_signal("Answers 4 of 5 questions"));
        assert!(!has_measurable_signal("Looks good"));
    }

    #[test]
    fn test_median() {
        assert_eq!(median(&[30.0, 10.0, 20.0]), 20.0);
        assert_eq!(median(&[10.0, 20.0, 30.0, 40.0]), 25.0);
    }
}
