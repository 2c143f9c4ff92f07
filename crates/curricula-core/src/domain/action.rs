//! Typed repair actions sent to the repair executor.

use serde::{Deserialize, Serialize};

use crate::domain::diagnostic::{RuleId, Severity};

/// Kind of repair, without parameters.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum RepairActionKind {
    SplitNode,
    MergeNodes,
    RewriteNode,
    RewirePrereqs,
    RetargetResources,
    RetimeNode,
    ReorderNodes,
}

impl RepairActionKind {
    pub fn as_str(self) -> &'static str {
        match self {
            RepairActionKind::SplitNode => "split_node",
            RepairActionKind::MergeNodes => "merge_nodes",
            RepairActionKind::RewriteNode => "rewrite_node",
            RepairActionKind::RewirePrereqs => "rewire_prereqs",
            RepairActionKind::RetargetResources => "retarget_resources",
            RepairActionKind::RetimeNode => "retime_node",
            RepairActionKind::ReorderNodes => "reorder_nodes",
        }
    }
}

/// A repair action carrying the minimal parameters it needs.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RepairAction {
    SplitNode { node_id: String },
    MergeNodes { node_id: String, other_id: String },
    RewriteNode { node_id: String },
    RewirePrereqs { node_id: String },
    RetargetResources { node_id: String },
    RetimeNode { node_id: String },
    ReorderNodes,
}

impl RepairAction {
    /// Build an action of `kind` targeting the given nodes.
    ///
    /// Node-scoped kinds without a target degrade to `ReorderNodes`; a merge
    /// without a second node degrades to `RewriteNode`.
    pub fn targeting(kind: RepairActionKind, node_ids: &[String]) -> Self {
        let Some(first) = node_ids.first().cloned() else {
            return RepairAction::ReorderNodes;
        };
        match kind {
            RepairActionKind::SplitNode => RepairAction::SplitNode { node_id: first },
            RepairActionKind::MergeNodes => match node_ids.get(1) {
                Some(other) if *other != first => RepairAction::MergeNodes {
                    node_id: first,
                    other_id: other.clone(),
                },
                _ => RepairAction::RewriteNode { node_id: first },
            },
            RepairActionKind::RewriteNode => RepairAction::RewriteNode { node_id: first },
            RepairActionKind::RewirePrereqs => RepairAction::RewirePrereqs { node_id: first },
            RepairActionKind::RetargetResources => {
                RepairAction::RetargetResources { node_id: first }
            }
            RepairActionKind::RetimeNode => RepairAction::RetimeNode { node_id: first },
            RepairActionKind::ReorderNodes => RepairAction::ReorderNodes,
        }
    }

    pub fn kind(&self) -> RepairActionKind {
        match self {
            RepairAction::SplitNode { .. } => RepairActionKind::SplitNode,
            RepairAction::MergeNodes { .. } => RepairActionKind::MergeNodes,
            RepairAction::RewriteNode { .. } => RepairActionKind::RewriteNode,
            RepairAction::RewirePrereqs { .. } => RepairActionKind::RewirePrereqs,
            RepairAction::RetargetResources { .. } => RepairActionKind::RetargetResources,
            RepairAction::RetimeNode { .. } => RepairActionKind::RetimeNode,
            RepairAction::ReorderNodes => RepairActionKind::ReorderNodes,
        }
    }

    /// Primary node the action touches, if any.
    pub fn node_id(&self) -> Option<&str> {
        match self {
            RepairAction::SplitNode { node_id }
            | RepairAction::MergeNodes { node_id, .. }
            | RepairAction::RewriteNode { node_id }
            | RepairAction::RewirePrereqs { node_id }
            | RepairAction::RetargetResources { node_id }
            | RepairAction::RetimeNode { node_id } => Some(node_id),
            RepairAction::ReorderNodes => None,
        }
    }
}

/// A repair action together with the diagnostic that justified it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PlannedAction {
    pub action: RepairAction,
    pub rule: RuleId,
    pub severity: Severity,
    pub reason: String,
}
