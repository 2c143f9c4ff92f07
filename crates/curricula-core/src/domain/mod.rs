//! Domain models for curriculum optimization.
//!
//! Canonical definitions for the core entities:
//! - `CurriculumDraft` / `Node` / `Resource`: the candidate learning graph
//! - `Diagnostic` / `RuleId`: quality findings and the closed rule taxonomy
//! - `RepairAction`: typed repairs sent to the executor
//! - `CurriculaError`: exceptional failures

pub mod action;
pub mod critique;
pub mod curriculum;
pub mod diagnostic;
pub mod digest;
pub mod error;

pub use action::{PlannedAction, RepairAction, RepairActionKind};
pub use critique::{ConfusionSignal, Critique};
pub use curriculum::{
    CurriculumDraft, EvidenceMode, MasteryCheck, Node, OpenQuestion, QuestionStatus, Resource,
    ResourceKind, ResourceRole, TopicSpec,
};
pub use diagnostic::{Diagnostic, DiagnosticSource, Dimension, RuleId, Severity};
pub use digest::{canonical_json, compute_digest, draft_digest, sha256_hex};
pub use error::{CurriculaError, ErrorCode, Result};
