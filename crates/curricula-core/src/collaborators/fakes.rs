//! Scripted collaborators for tests.
//!
//! Each fake replays a queue of [`Scripted`] steps, one per call. The last
//! step is sticky: once the queue is down to one entry it is returned for
//! every further call.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;

use super::{
    Critic, CritiqueRequest, ProposalRequest, Proposer, ProviderError, ProviderResult,
    RepairExecutor, RepairRequest,
};
use crate::domain::action::RepairAction;

/// One scripted collaborator response.
#[derive(Debug, Clone)]
pub enum Scripted {
    /// Return this payload.
    Respond(serde_json::Value),
    /// Fail as an unavailable provider.
    Fail(String),
    /// Sleep before answering with the payload (used to trigger timeouts).
    Delay(Duration, serde_json::Value),
}

#[derive(Debug)]
struct Script {
    steps: Mutex<VecDeque<Scripted>>,
    calls: AtomicU32,
}

impl Script {
    fn new(steps: Vec<Scripted>) -> Self {
        Self {
            steps: Mutex::new(steps.into()),
            calls: AtomicU32::new(0),
        }
    }

    fn next(&self) -> Option<Scripted> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let mut steps = self.steps.lock().unwrap_or_else(PoisonError::into_inner);
        if steps.len() > 1 {
            steps.pop_front()
        } else {
            steps.front().cloned()
        }
    }

    async fn play(&self) -> ProviderResult {
        match self.next() {
            Some(Scripted::Respond(value)) => Ok(value),
            Some(Scripted::Fail(detail)) => Err(ProviderError::new(detail)),
            Some(Scripted::Delay(delay, value)) => {
                tokio::time::sleep(delay).await;
                Ok(value)
            }
            None => Err(ProviderError::new("script exhausted")),
        }
    }

    fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

// ---------------------------------------------------------------------------
// Proposer
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub struct ScriptedProposer {
    script: Script,
}

impl ScriptedProposer {
    pub fn new(steps: Vec<Scripted>) -> Self {
        Self {
            script: Script::new(steps),
        }
    }

    pub fn calls(&self) -> u32 {
        self.script.calls()
    }
}

#[async_trait]
impl Proposer for ScriptedProposer {
    async fn propose(&self, _request: &ProposalRequest) -> ProviderResult {
        self.script.play().await
    }
}

// ---------------------------------------------------------------------------
// Critic
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub struct ScriptedCritic {
    script: Script,
}

impl ScriptedCritic {
    pub fn new(steps: Vec<Scripted>) -> Self {
        Self {
            script: Script::new(steps),
        }
    }

    /// Critic that never reports anything.
    pub fn silent() -> Self {
        Self::new(vec![Scripted::Respond(serde_json::json!({}))])
    }

    pub fn calls(&self) -> u32 {
        self.script.calls()
    }
}

#[async_trait]
impl Critic for ScriptedCritic {
    async fn critique(&self, _request: &CritiqueRequest) -> ProviderResult {
        self.script.play().await
    }
}

// ---------------------------------------------------------------------------
// Repair executor
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub struct ScriptedRepairExecutor {
    script: Script,
    received: Mutex<Vec<Vec<RepairAction>>>,
}

impl ScriptedRepairExecutor {
    pub fn new(steps: Vec<Scripted>) -> Self {
        Self {
            script: Script::new(steps),
            received: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> u32 {
        self.script.calls()
    }

    /// Action lists received so far, one entry per call.
    pub fn received(&self) -> Vec<Vec<RepairAction>> {
        self.received
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl RepairExecutor for ScriptedRepairExecutor {
    async fn repair(&self, request: &RepairRequest) -> ProviderResult {
        self.received
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(request.actions.clone());
        self.script.play().await
    }
}
