//! Quality diagnostics and the closed rule taxonomy.

use serde::{Deserialize, Serialize};

use crate::domain::action::RepairActionKind;

/// Severity level for a diagnostic. Ordered so that `HardFail` is greatest.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Info,
    Warn,
    HardFail,
}

impl Severity {
    /// Weight used when summing a node's outstanding penalty.
    pub fn penalty_weight(self) -> u32 {
        match self {
            Severity::Info => 0,
            Severity::Warn => 1,
            Severity::HardFail => 4,
        }
    }
}

/// Which component produced a diagnostic.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DiagnosticSource {
    #[default]
    Judge,
    Critic,
}

/// The eight scored quality dimensions.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Dimension {
    StructuralValidity,
    Atomicity,
    PedagogicalProgression,
    ResourceRelevance,
    MasteryActionability,
    EffortCoherence,
    Redundancy,
    LearnerPathCoherence,
}

impl Dimension {
    pub const ALL: [Dimension; 8] = [
        Dimension::StructuralValidity,
        Dimension::Atomicity,
        Dimension::PedagogicalProgression,
        Dimension::ResourceRelevance,
        Dimension::MasteryActionability,
        Dimension::EffortCoherence,
        Dimension::Redundancy,
        Dimension::LearnerPathCoherence,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Dimension::StructuralValidity => "structural_validity",
            Dimension::Atomicity => "atomicity",
            Dimension::PedagogicalProgression => "pedagogical_progression",
            Dimension::ResourceRelevance => "resource_relevance",
            Dimension::MasteryActionability => "mastery_actionability",
            Dimension::EffortCoherence => "effort_coherence",
            Dimension::Redundancy => "redundancy",
            Dimension::LearnerPathCoherence => "learner_path_coherence",
        }
    }
}

macro_rules! rule_ids {
    ($($variant:ident => $id:literal, $dim:ident, $action:ident;)*) => {
        /// Closed set of rule identifiers. Unknown identifiers coming from a
        /// collaborator fail decoding instead of being matched as strings.
        #[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
        pub enum RuleId {
            $(#[serde(rename = $id)] $variant,)*
        }

        impl RuleId {
            /// Dotted identifier, e.g. `"structure.cycle"`.
            pub fn as_str(self) -> &'static str {
                match self {
                    $(RuleId::$variant => $id,)*
                }
            }

            /// Dimension the rule contributes to.
            pub fn dimension(self) -> Dimension {
                match self {
                    $(RuleId::$variant => Dimension::$dim,)*
                }
            }

            /// Fixed rule → repair mapping used by the planner.
            pub fn default_action(self) -> RepairActionKind {
                match self {
                    $(RuleId::$variant => RepairActionKind::$action,)*
                }
            }
        }
    };
}

rule_ids! {
    EmptyDraft => "structure.empty_draft", StructuralValidity, ReorderNodes;
    DuplicateNodeIds => "structure.duplicate_node_ids", StructuralValidity, MergeNodes;
    MissingPrerequisite => "structure.missing_prerequisite", StructuralValidity, RewirePrereqs;
    SelfPrerequisite => "structure.self_prerequisite", StructuralValidity, RewirePrereqs;
    Cycle => "structure.cycle", StructuralValidity, RewirePrereqs;
    InvalidEstimate => "structure.invalid_estimate", StructuralValidity, RetimeNode;
    InvalidConfidence => "structure.invalid_confidence", StructuralValidity, RetimeNode;
    MalformedResourceUrl => "structure.malformed_resource_url", StructuralValidity, RetargetResources;
    DanglingOpenQuestion => "structure.dangling_open_question", StructuralValidity, RewriteNode;
    CompoundCapability => "atomicity.compound_capability", Atomicity, SplitNode;
    CompoundMarker => "atomicity.compound_marker", Atomicity, RewriteNode;
    AtomicityThreshold => "atomicity.threshold", Atomicity, SplitNode;
    AllRoots => "progression.all_roots", PedagogicalProgression, RewirePrereqs;
    DepthTooShallow => "progression.depth_too_shallow", PedagogicalProgression, RewirePrereqs;
    PrerequisiteFanIn => "progression.prerequisite_fan_in", PedagogicalProgression, RewirePrereqs;
    MissingResources => "resource.missing", ResourceRelevance, RetargetResources;
    WeakRelevance => "resource.weak_relevance", ResourceRelevance, RetargetResources;
    RepetitiveAnchor => "resource.repetitive_anchor", ResourceRelevance, RetargetResources;
    InsufficientEvidence => "resource.insufficient_evidence", ResourceRelevance, RetargetResources;
    MissingTask => "mastery.missing_task", MasteryActionability, RewriteNode;
    MissingCriteria => "mastery.missing_criteria", MasteryActionability, RewriteNode;
    NonActionableTask => "mastery.non_actionable_task", MasteryActionability, RewriteNode;
    NonMeasurableCriteria => "mastery.non_measurable_criteria", MasteryActionability, RewriteNode;
    FlatDistribution => "effort.flat_distribution", EffortCoherence, RetimeNode;
    OutsideEnvelope => "effort.outside_envelope", EffortCoherence, RetimeNode;
    EffortOutlier => "effort.outlier", EffortCoherence, RetimeNode;
    SimilarNodes => "redundancy.similar_nodes", Redundancy, MergeNodes;
    TitleRepetition => "redundancy.title_repetition", Redundancy, RewriteNode;
    HiddenPrerequisite => "learner.hidden_prerequisite", LearnerPathCoherence, RewirePrereqs;
    ConceptJump => "learner.concept_jump", LearnerPathCoherence, RewriteNode;
    WorkloadJump => "learner.workload_jump", LearnerPathCoherence, RetimeNode;
    PrerequisiteOverload => "learner.prerequisite_overload", LearnerPathCoherence, RewirePrereqs;
    NoviceConfusion => "learner.novice_confusion", LearnerPathCoherence, RewriteNode;
}

impl std::fmt::Display for RuleId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single quality finding.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct Diagnostic {
    /// Rule that fired.
    pub rule: RuleId,

    pub severity: Severity,

    /// Affected node ids; empty for graph-wide findings.
    #[serde(default)]
    pub node_ids: Vec<String>,

    /// Human-readable message.
    pub message: String,

    /// Overrides the rule's default repair kind when present.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suggested_action: Option<RepairActionKind>,

    #[serde(default)]
    pub source: DiagnosticSource,
}

impl Diagnostic {
    pub fn new(rule: RuleId, severity: Severity, message: impl Into<String>) -> Self {
        Self {
            rule,
            severity,
            node_ids: Vec::new(),
            message: message.into(),
            suggested_action: None,
            source: DiagnosticSource::Judge,
        }
    }

    pub fn for_node(mut self, node_id: impl Into<String>) -> Self {
        self.node_ids.push(node_id.into());
        self
    }

    pub fn for_nodes<I, S>(mut self, node_ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.node_ids.extend(node_ids.into_iter().map(Into::into));
        self
    }

    pub fn with_suggested_action(mut self, kind: RepairActionKind) -> Self {
        self.suggested_action = Some(kind);
        self
    }

    pub fn from_critic(mut self) -> Self {
        self.source = DiagnosticSource::Critic;
        self
    }

    pub fn is_hard_gate(&self) -> bool {
        self.severity == Severity::HardFail
    }

    pub fn primary_node(&self) -> Option<&str> {
        self.node_ids.first().map(String::as_str)
    }

    pub fn mentions(&self, node_id: &str) -> bool {
        self.node_ids.iter().any(|id| id == node_id)
    }

    pub fn action_kind(&self) -> RepairActionKind {
        self.suggested_action
            .unwrap_or_else(|| self.rule.default_action())
    }
}
