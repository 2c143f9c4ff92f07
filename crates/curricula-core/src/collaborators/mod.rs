//! External collaborator contracts.
//!
//! The proposer, critic and repair executor are opaque services that accept a
//! structured request and return raw JSON. Their output is untrusted: the
//! controller decodes every response strictly and never lets a collaborator
//! decide acceptance.
//!
//! Guarantees expected of implementations:
//! - Calls are safe to retry; the controller may re-issue a request after a
//!   timeout or a schema violation.
//! - `Err(ProviderError)` means the provider itself failed (network, quota,
//!   crash). Malformed output should be returned as `Ok` and left to decoding.

pub mod fakes;
pub mod heuristic;
pub mod retry;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::action::RepairAction;
use crate::domain::curriculum::{CurriculumDraft, TopicSpec};

pub use heuristic::{DeterministicRepairExecutor, HeuristicCritic, StaticProposer};
pub use retry::{call_with_retry, Attempted, RetryPolicy};

pub const STAGE_PROPOSER: &str = "proposer";
pub const STAGE_CRITIC: &str = "critic";
pub const STAGE_REPAIR: &str = "repair";

/// Failure reported by the provider itself.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{0}")]
pub struct ProviderError(pub String);

impl ProviderError {
    pub fn new(detail: impl Into<String>) -> Self {
        Self(detail.into())
    }
}

pub type ProviderResult = std::result::Result<serde_json::Value, ProviderError>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProposalRequest {
    pub topic: TopicSpec,
    #[serde(default)]
    pub context_snippets: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CritiqueRequest {
    pub draft: CurriculumDraft,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RepairRequest {
    pub draft: CurriculumDraft,
    /// Ordered, already bounded by the planner.
    pub actions: Vec<RepairAction>,
}

/// Produces the initial draft. Called exactly once per run.
#[async_trait]
pub trait Proposer: Send + Sync {
    async fn propose(&self, request: &ProposalRequest) -> ProviderResult;
}

/// Reviews a draft from a novice's point of view.
#[async_trait]
pub trait Critic: Send + Sync {
    async fn critique(&self, request: &CritiqueRequest) -> ProviderResult;
}

/// Applies repair actions and returns a new draft.
#[async_trait]
pub trait RepairExecutor: Send + Sync {
    async fn repair(&self, request: &RepairRequest) -> ProviderResult;
}
