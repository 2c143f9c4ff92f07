//! Curricula Core Library
//!
//! Deterministic quality optimization for curriculum DAGs: graph analysis,
//! rule-based judging, repair planning and the bounded loop that ties them to
//! external proposer, critic and repair collaborators.

pub mod artifact;
pub mod collaborators;
pub mod config;
pub mod controller;
pub mod domain;
pub mod graph;
pub mod judge;
pub mod obs;
pub mod planner;
pub mod telemetry;
pub mod trace;

pub use domain::{
    canonical_json, compute_digest, draft_digest, ConfusionSignal, Critique, CurriculaError,
    CurriculumDraft, Diagnostic, DiagnosticSource, Dimension, ErrorCode, EvidenceMode,
    MasteryCheck, Node, PlannedAction, RepairAction, RepairActionKind, Resource, ResourceKind,
    ResourceRole, Result, RuleId, Severity, TopicSpec,
};

pub use graph::{analyze, CriticalPath, CycleReport, GraphView, Milestone};

pub use judge::{
    DeterministicQualityJudge, DimensionWeights, JudgeConfig, QualityReport, ReportSummary,
};

pub use planner::{Cooldown, PlannerConfig, RepairPlan, RepairPlanner};

pub use collaborators::{
    Critic, CritiqueRequest, DeterministicRepairExecutor, HeuristicCritic, ProposalRequest,
    Proposer, ProviderError, RepairExecutor, RepairRequest, RetryPolicy, StaticProposer,
};

pub use controller::{
    CancellationFlag, Candidate, LoopController, LoopState, OptimizationResult, RunAborted,
};

pub use trace::{
    BestSeen, IterationRecord, OptimizationTrace, StopReason, TraceRecorder, TRACE_SCHEMA_VERSION,
};

pub use artifact::{
    read_curriculum_artifact, read_trace_artifact, write_curriculum_artifact,
    write_trace_artifact, RetentionPolicy, StoredRun,
};

pub use config::{LoopConfig, OptimizerConfig};

pub use obs::RunSpan;
pub use telemetry::init_tracing;

/// Curricula version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
