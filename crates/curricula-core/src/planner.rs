//! Repair planner.
//!
//! Turns a [`QualityReport`]'s diagnostics into a bounded, deterministically
//! ordered list of typed repair actions. An empty plan is the controller's
//! convergence (or stall) signal.

use std::cmp::Reverse;
use std::collections::{BTreeSet, HashSet};

use serde::{Deserialize, Serialize};

use crate::domain::action::{PlannedAction, RepairAction, RepairActionKind};
use crate::domain::diagnostic::{Diagnostic, Severity};
use crate::judge::QualityReport;

// ---------------------------------------------------------------------------
// Policy
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct PlannerConfig {
    /// Upper bound on actions sent to the repair executor per iteration.
    pub max_actions_per_iteration: usize,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            max_actions_per_iteration: 4,
        }
    }
}

// ---------------------------------------------------------------------------
// Cooldown
// ---------------------------------------------------------------------------

/// A (node, action kind) pair excluded from one planning pass.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CooldownEntry {
    pub node_id: Option<String>,
    pub kind: RepairActionKind,
}

impl CooldownEntry {
    pub fn for_action(action: &RepairAction) -> Self {
        Self {
            node_id: action.node_id().map(str::to_string),
            kind: action.kind(),
        }
    }
}

/// Pairs whose last application did not reduce the node's penalty.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cooldown {
    entries: BTreeSet<CooldownEntry>,
}

impl Cooldown {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, action: &RepairAction) {
        self.entries.insert(CooldownEntry::for_action(action));
    }

    pub fn contains(&self, action: &RepairAction) -> bool {
        self.entries.contains(&CooldownEntry::for_action(action))
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn entries(&self) -> impl Iterator<Item = &CooldownEntry> {
        self.entries.iter()
    }
}

// ---------------------------------------------------------------------------
// Plan
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepairPlan {
    /// Actions to send, highest severity first.
    pub actions: Vec<PlannedAction>,
    /// Actions cut by the per-iteration budget.
    pub dropped: Vec<PlannedAction>,
    /// Actions skipped because their pair is cooling down.
    pub suppressed: Vec<PlannedAction>,
}

impl RepairPlan {
    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    pub fn repair_actions(&self) -> Vec<RepairAction> {
        self.actions.iter().map(|p| p.action.clone()).collect()
    }
}

// ---------------------------------------------------------------------------
// Planner
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default)]
pub struct RepairPlanner {
    config: PlannerConfig,
}

impl RepairPlanner {
    pub fn new(config: PlannerConfig) -> Self {
        Self { config }
    }

    /// Plan repairs for `report`, skipping pairs in `cooldown`.
    pub fn plan(&self, report: &QualityReport, cooldown: &Cooldown) -> RepairPlan {
        let mut ordered: Vec<&Diagnostic> = report
            .diagnostics
            .iter()
            .filter(|d| d.severity > Severity::Info)
            .collect();
        ordered.sort_by(|a, b| {
            Reverse(a.severity)
                .cmp(&Reverse(b.severity))
                .then_with(|| a.primary_node().unwrap_or("").cmp(b.primary_node().unwrap_or("")))
                .then_with(|| a.rule.as_str().cmp(b.rule.as_str()))
        });

        let mut plan = RepairPlan::default();
        let mut seen: HashSet<RepairAction> = HashSet::new();
        for diag in ordered {
            let action = RepairAction::targeting(diag.action_kind(), &diag.node_ids);
            if !seen.insert(action.clone()) {
                continue;
            }
            let planned = PlannedAction {
                action,
                rule: diag.rule,
                severity: diag.severity,
                reason: diag.message.clone(),
            };
            if cooldown.contains(&planned.action) {
                plan.suppressed.push(planned);
            } else {
                plan.actions.push(planned);
            }
        }

        let max = self.config.max_actions_per_iteration;
        if plan.actions.len() > max {
            plan.dropped = plan.actions.split_off(max);
        }
        plan
    }
}
