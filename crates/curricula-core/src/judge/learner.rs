//! Learner path coherence: local path checks merged with critic signals.

use std::collections::{BTreeMap, BTreeSet};

use super::{tokens, unique_nodes, Findings, JudgeContext};
use crate::domain::curriculum::Node;
use crate::domain::diagnostic::{Diagnostic, RuleId, Severity};

fn node_text(node: &Node) -> String {
    format!("{} {} {}", node.title, node.capability, node.core_ideas.join(" "))
}

/// Local path checks plus every critic finding.
///
/// Critic diagnostics deduct here whatever dimension their rule belongs to:
/// a critic-reported `atomicity.compound_capability` lowers this score, not
/// `atomicity`. The rule is kept on the merged diagnostic so the planner still
/// maps it to that rule's repair.
pub(super) fn learner_path_coherence(ctx: &JudgeContext<'_>) -> Findings {
    let mut findings = Findings::new();
    if ctx.view.is_acyclic() {
        local_path_checks(ctx, &mut findings);
    }
    if let Some(critique) = ctx.critique {
        for diag in &critique.diagnostics {
            if let Some(node_id) = diag.primary_node() {
                if findings.contains(diag.rule, node_id) {
                    continue;
                }
            }
            // The judge alone decides hard gates.
            let mut merged = diag.clone();
            if merged.severity == Severity::HardFail {
                merged.severity = Severity::Warn;
            }
            let deduction = match merged.severity {
                Severity::Info => 3,
                _ => 10,
            };
            findings.push(merged, deduction);
        }
        for (node_id, signal) in &critique.confusion {
            if signal.score < ctx.config.confusion_threshold
                || findings.contains(RuleId::NoviceConfusion, node_id)
            {
                continue;
            }
            let mut message = format!("novice confusion {} at node {}", signal.score, node_id);
            if !signal.summary.is_empty() {
                message.push_str(": ");
                message.push_str(&signal.summary);
            }
            findings.push(
                Diagnostic::new(RuleId::NoviceConfusion, Severity::Warn, message)
                    .for_node(node_id)
                    .from_critic(),
                8,
            );
        }
    }
    findings
}

fn local_path_checks(ctx: &JudgeContext<'_>, findings: &mut Findings) {
    let view = ctx.view;
    let index: BTreeMap<&str, &Node> = unique_nodes(ctx.draft).map(|n| (n.id.as_str(), n)).collect();
    let topic_tokens = tokens(&ctx.draft.topic);

    for node in unique_nodes(ctx.draft) {
        let uses = tokens(&format!("{} {}", node.title, node.capability));
        let prereqs: Vec<&Node> = view
            .prerequisites
            .get(&node.id)
            .into_iter()
            .flatten()
            .filter_map(|p| index.get(p.as_str()).copied())
            .collect();

        if let Some((sibling, concept)) = hidden_prerequisite(ctx, &index, node, &uses, &topic_tokens) {
            findings.push(
                Diagnostic::new(
                    RuleId::HiddenPrerequisite,
                    Severity::Warn,
                    format!(
                        "node {} uses '{}' which only sibling {} introduces",
                        node.id, concept, sibling
                    ),
                )
                .for_nodes([node.id.as_str(), sibling]),
                20,
            );
        }

        if !prereqs.is_empty() && !uses.is_empty() {
            let bridged = prereqs
                .iter()
                .any(|p| !uses.is_disjoint(&tokens(&node_text(p))));
            if !bridged {
                findings.push(
                    Diagnostic::new(
                        RuleId::ConceptJump,
                        Severity::Warn,
                        format!("node {} shares no concept with its prerequisites", node.id),
                    )
                    .for_node(&node.id),
                    9,
                );
            }
        }

        let peak = prereqs
            .iter()
            .map(|p| p.estimate_minutes)
            .filter(|e| e.is_finite() && *e > 0.0)
            .fold(0.0_f64, f64::max);
        let ratio = ctx.config.workload_jump_ratio;
        if peak > 0.0 && node.estimate_minutes > peak * ratio {
            findings.push(
                Diagnostic::new(
                    RuleId::WorkloadJump,
                    Severity::Warn,
                    format!(
                        "node {} estimate {}m is more than {}x its heaviest prerequisite ({}m)",
                        node.id, node.estimate_minutes, ratio, peak
                    ),
                )
                .for_node(&node.id),
                9,
            );
        }
    }
}

/// A concept `node` relies on that only a same-layer sibling introduces.
/// Returns the sibling id and the concept token.
fn hidden_prerequisite<'a>(
    ctx: &JudgeContext<'a>,
    index: &BTreeMap<&'a str, &'a Node>,
    node: &Node,
    uses: &BTreeSet<String>,
    topic_tokens: &BTreeSet<String>,
) -> Option<(&'a str, String)> {
    let layer = ctx.view.layer(&node.id)?;
    let milestone = ctx.view.milestones.iter().find(|m| m.layer == layer)?;

    let mut known: BTreeSet<String> = tokens(&node.core_ideas.join(" "));
    known.extend(topic_tokens.iter().cloned());
    for ancestor in ctx.view.ancestors(&node.id) {
        if let Some(a) = index.get(ancestor.as_str()) {
            known.extend(tokens(&node_text(a)));
        }
    }

    for sibling_id in &milestone.node_ids {
        if *sibling_id == node.id {
            continue;
        }
        let Some((&id, sibling)) = index.get_key_value(sibling_id.as_str()) else {
            continue;
        };
        let introduced = tokens(&sibling.core_ideas.join(" "));
        if let Some(concept) = uses
            .iter()
            .find(|t| introduced.contains(*t) && !known.contains(*t))
        {
            return Some((id, concept.clone()));
        }
    }
    None
}
