//! Loop controller.
//!
//! Drives one optimization run through
//! `proposing -> critiquing -> judging -> (accepted | planning -> repairing ->
//! critiquing -> ...)` until the draft is accepted, the budget runs out, the
//! planner has nothing left to try, or the caller cancels.
//!
//! All run state lives in a single owned [`Run`] threaded through the
//! transitions. Every exit path, collaborator failure included, produces a
//! finalized [`OptimizationTrace`].

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use rand::rngs::StdRng;
use rand::SeedableRng;
use tokio::time::Instant;
use tracing::{debug, Instrument};

use crate::collaborators::{
    call_with_retry, Critic, CritiqueRequest, ProposalRequest, Proposer, RepairExecutor,
    RepairRequest, STAGE_CRITIC, STAGE_PROPOSER, STAGE_REPAIR,
};
use crate::config::OptimizerConfig;
use crate::domain::action::PlannedAction;
use crate::domain::critique::Critique;
use crate::domain::curriculum::CurriculumDraft;
use crate::domain::digest::draft_digest;
use crate::domain::error::{CurriculaError, Result};
use crate::graph::analyze;
use crate::judge::{DeterministicQualityJudge, QualityReport};
use crate::obs::{self, RunSpan};
use crate::planner::{Cooldown, RepairPlanner};
use crate::trace::{BestSeen, IterationRecord, OptimizationTrace, StopReason, TraceRecorder};

/// Controller states. Terminal states map one-to-one onto [`StopReason`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    Idle,
    Proposing,
    Critiquing,
    Judging,
    Planning,
    Repairing,
}

impl LoopState {
    pub fn as_str(self) -> &'static str {
        match self {
            LoopState::Idle => "idle",
            LoopState::Proposing => "proposing",
            LoopState::Critiquing => "critiquing",
            LoopState::Judging => "judging",
            LoopState::Planning => "planning",
            LoopState::Repairing => "repairing",
        }
    }
}

/// Cooperative cancellation, checked at every state transition.
#[derive(Debug, Clone, Default)]
pub struct CancellationFlag(Arc<AtomicBool>);

impl CancellationFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// A judged draft.
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub iteration: u32,
    pub draft: CurriculumDraft,
    pub report: QualityReport,
}

/// Outcome of a run that ended without a collaborator failure.
#[derive(Debug, Clone)]
pub struct OptimizationResult {
    /// The accepted draft, or the best-seen draft for any other stop reason.
    /// `None` only when the run was cancelled before the first judging pass.
    pub candidate: Option<Candidate>,
    pub trace: OptimizationTrace,
}

impl OptimizationResult {
    pub fn accepted(&self) -> bool {
        self.trace.accepted
    }

    pub fn stop_reason(&self) -> &StopReason {
        &self.trace.stop_reason
    }

    pub fn draft(&self) -> Option<&CurriculumDraft> {
        self.candidate.as_ref().map(|c| &c.draft)
    }
}

/// A run aborted by an exceptional error. The trace is still finalized.
#[derive(Debug, thiserror::Error)]
#[error("run {} aborted: {error}", .trace.run_id)]
pub struct RunAborted {
    #[source]
    pub error: CurriculaError,
    pub trace: OptimizationTrace,
}

// ---------------------------------------------------------------------------
// Run state
// ---------------------------------------------------------------------------

struct Run {
    state: LoopState,
    recorder: TraceRecorder,
    rng: StdRng,
    judge: DeterministicQualityJudge,
    started: Instant,
    passes: u32,
    /// Record of the current pass, appended once the pass is complete.
    pending: Option<IterationRecord>,
    /// Actions applied after the previous pass, with that pass's report.
    last_applied: Vec<PlannedAction>,
    previous_report: Option<QualityReport>,
    cooldown: Cooldown,
    accepted: Option<Candidate>,
    best: Option<Candidate>,
    best_digest: Option<String>,
}

impl Run {
    fn new(recorder: TraceRecorder, seed: u64, judge: DeterministicQualityJudge) -> Self {
        Self {
            state: LoopState::Idle,
            recorder,
            rng: StdRng::seed_from_u64(seed),
            judge,
            started: Instant::now(),
            passes: 0,
            pending: None,
            last_applied: Vec::new(),
            previous_report: None,
            cooldown: Cooldown::new(),
            accepted: None,
            best: None,
            best_digest: None,
        }
    }

    /// Move to `next` unless the caller has cancelled.
    fn enter(&mut self, next: LoopState, cancel: &CancellationFlag) -> Option<StopReason> {
        if cancel.is_cancelled() {
            debug!(state = self.state.as_str(), "cancellation observed");
            return Some(StopReason::Cancelled);
        }
        debug!(from = self.state.as_str(), to = next.as_str(), "transition");
        self.state = next;
        None
    }

    /// Recompute the cooldown from what the last repair achieved.
    ///
    /// An action whose node's penalty did not drop (or, for actions without a
    /// node, whose draft aggregate did not rise) is held back for one pass.
    fn refresh_cooldown(&mut self, report: &QualityReport) {
        let mut cooldown = Cooldown::new();
        if let Some(previous) = &self.previous_report {
            for planned in &self.last_applied {
                let improved = match planned.action.node_id() {
                    Some(id) => report.node_penalty(id) < previous.node_penalty(id),
                    None => report.aggregate > previous.aggregate,
                };
                if !improved {
                    cooldown.insert(&planned.action);
                }
            }
        }
        self.cooldown = cooldown;
    }

    /// Keep the highest aggregate; ties keep the earlier pass.
    fn observe(&mut self, iteration: u32, draft: &CurriculumDraft, report: &QualityReport, digest: &str) {
        let better = self
            .best
            .as_ref()
            .map_or(true, |best| report.aggregate > best.report.aggregate);
        if better {
            self.best = Some(Candidate {
                iteration,
                draft: draft.clone(),
                report: report.clone(),
            });
            self.best_digest = Some(digest.to_string());
        }
    }

    fn commit_pending(&mut self) {
        if let Some(record) = self.pending.take() {
            self.recorder.record(record);
        }
    }

    fn seal(mut self, stop_reason: StopReason) -> (OptimizationTrace, Option<Candidate>) {
        // A stop between passes lands on the last committed record.
        match self.pending.take() {
            Some(mut record) => {
                record.stop_reason = Some(stop_reason.clone());
                self.recorder.record(record);
            }
            None => {
                self.recorder.stamp_last(&stop_reason);
            }
        }
        let best = match (&self.best, &self.best_digest) {
            (Some(candidate), Some(digest)) => Some(BestSeen {
                iteration: candidate.iteration,
                aggregate: candidate.report.aggregate,
                draft_digest: digest.clone(),
            }),
            _ => None,
        };
        let run_id = self.recorder.run_id().to_string();
        let passes = self.recorder.len();
        let trace = self.recorder.finalize(stop_reason, best);
        obs::emit_run_finished(
            &run_id,
            trace.stop_reason.as_str(),
            passes,
            trace.best.as_ref().map(|b| b.aggregate),
            self.started.elapsed().as_millis() as u64,
        );
        let candidate = self.accepted.or(self.best);
        (trace, candidate)
    }
}

// ---------------------------------------------------------------------------
// Controller
// ---------------------------------------------------------------------------

/// Orchestrates the proposer, critic, judge, planner and repair executor.
pub struct LoopController {
    proposer: Arc<dyn Proposer>,
    critic: Arc<dyn Critic>,
    executor: Arc<dyn RepairExecutor>,
    planner: RepairPlanner,
    config: OptimizerConfig,
}

impl LoopController {
    pub fn new(
        proposer: Arc<dyn Proposer>,
        critic: Arc<dyn Critic>,
        executor: Arc<dyn RepairExecutor>,
        config: OptimizerConfig,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            proposer,
            critic,
            executor,
            planner: RepairPlanner::new(config.planner.clone()),
            config,
        })
    }

    pub fn config(&self) -> &OptimizerConfig {
        &self.config
    }

    /// Run one optimization for `request`.
    pub async fn optimize(
        &self,
        request: ProposalRequest,
        cancel: &CancellationFlag,
    ) -> std::result::Result<OptimizationResult, RunAborted> {
        let recorder = TraceRecorder::new(request.topic.goal.clone(), self.config.loop_config.seed);
        let span = RunSpan::span(recorder.run_id());
        self.run(request, cancel, recorder).instrument(span).await
    }

    async fn run(
        &self,
        request: ProposalRequest,
        cancel: &CancellationFlag,
        recorder: TraceRecorder,
    ) -> std::result::Result<OptimizationResult, RunAborted> {
        let judge = DeterministicQualityJudge::new(self.config.judge_for(&request.topic));
        let mut run = Run::new(recorder, self.config.loop_config.seed, judge);
        obs::emit_run_started(
            run.recorder.run_id(),
            &request.topic.goal,
            self.config.loop_config.max_iterations,
            self.config.loop_config.seed,
        );

        match self.drive(&request, cancel, &mut run).await {
            Ok(stop_reason) => {
                let (trace, candidate) = run.seal(stop_reason);
                Ok(OptimizationResult { candidate, trace })
            }
            Err(error) => {
                obs::emit_run_aborted(run.recorder.run_id(), &error);
                let stop_reason = StopReason::Error {
                    code: error.code(),
                    message: error.to_string(),
                };
                let (trace, _) = run.seal(stop_reason);
                Err(RunAborted { error, trace })
            }
        }
    }

    async fn drive(
        &self,
        request: &ProposalRequest,
        cancel: &CancellationFlag,
        run: &mut Run,
    ) -> Result<StopReason> {
        let limits = &self.config.loop_config;

        if let Some(stop) = run.enter(LoopState::Proposing, cancel) {
            return Ok(stop);
        }
        let proposer = &self.proposer;
        let proposed = call_with_retry(
            STAGE_PROPOSER,
            &self.config.retry,
            &mut run.rng,
            move || proposer.propose(request),
            |raw| CurriculumDraft::from_response(STAGE_PROPOSER, raw),
        )
        .await?;
        let mut draft = proposed.value;

        loop {
            if let Some(stop) = run.enter(LoopState::Critiquing, cancel) {
                return Ok(stop);
            }
            let critique_request = CritiqueRequest {
                draft: draft.clone(),
            };
            let critique_request = &critique_request;
            let critic = &self.critic;
            let critique = call_with_retry(
                STAGE_CRITIC,
                &self.config.retry,
                &mut run.rng,
                move || critic.critique(critique_request),
                |raw| Critique::from_response(STAGE_CRITIC, raw),
            )
            .await?;

            if let Some(stop) = run.enter(LoopState::Judging, cancel) {
                return Ok(stop);
            }
            run.passes += 1;
            let iteration = run.passes;
            let view = analyze(&draft);
            let report = run.judge.evaluate(&draft, &view, Some(&critique.value));
            let digest = draft_digest(&draft)?;
            obs::emit_iteration_judged(
                run.recorder.run_id(),
                iteration,
                report.aggregate,
                report.hard_gate_count,
                report.diagnostics.len(),
                report.accepted,
            );

            run.refresh_cooldown(&report);
            run.observe(iteration, &draft, &report, &digest);
            run.pending = Some(IterationRecord::new(
                iteration,
                digest,
                report.summary(),
                critique.attempts,
            ));

            if report.accepted {
                run.accepted = Some(Candidate {
                    iteration,
                    draft,
                    report,
                });
                return Ok(StopReason::Accepted);
            }
            let out_of_time = limits
                .max_run_duration()
                .map_or(false, |cap| run.started.elapsed() >= cap);
            if iteration >= limits.max_iterations || out_of_time {
                return Ok(StopReason::Exhausted);
            }

            if let Some(stop) = run.enter(LoopState::Planning, cancel) {
                return Ok(stop);
            }
            let plan = self.planner.plan(&report, &run.cooldown);
            obs::emit_repair_planned(
                run.recorder.run_id(),
                iteration,
                plan.actions.len(),
                plan.dropped.len(),
                plan.suppressed.len(),
            );
            if let Some(record) = run.pending.as_mut() {
                record.actions_dropped = plan.dropped.clone();
                record.cooldown_suppressed = plan.suppressed.clone();
            }
            if plan.is_empty() {
                return Ok(StopReason::Stalled);
            }

            if let Some(stop) = run.enter(LoopState::Repairing, cancel) {
                return Ok(stop);
            }
            if let Some(record) = run.pending.as_mut() {
                record.actions_applied = plan.actions.clone();
            }
            let repair_request = RepairRequest {
                draft,
                actions: plan.repair_actions(),
            };
            let repair_request = &repair_request;
            let executor = &self.executor;
            let repaired = call_with_retry(
                STAGE_REPAIR,
                &self.config.retry,
                &mut run.rng,
                move || executor.repair(repair_request),
                |raw| CurriculumDraft::from_response(STAGE_REPAIR, raw),
            )
            .await?;

            run.commit_pending();
            run.last_applied = plan.actions;
            run.previous_report = Some(report);
            draft = repaired.value;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::action::RepairAction;
    use crate::domain::diagnostic::{Diagnostic, RuleId, Severity};
    use crate::judge::JudgeConfig;
    use std::collections::BTreeMap;

    fn report(aggregate: u32, diagnostics: Vec<Diagnostic>) -> QualityReport {
        QualityReport {
            scores: BTreeMap::new(),
            aggregate,
            hard_gate_count: 0,
            diagnostics,
            accepted: false,
        }
    }

    fn planned(node: &str) -> PlannedAction {
        PlannedAction {
            action: RepairAction::RewriteNode {
                node_id: node.to_string(),
            },
            rule: RuleId::NonActionableTask,
            severity: Severity::Warn,
            reason: "test".to_string(),
        }
    }

    fn run() -> Run {
        Run::new(
            TraceRecorder::with_run_id("r", "t", 0),
            0,
            DeterministicQualityJudge::new(JudgeConfig::default()),
        )
    }

    #[test]
    fn test_cancel_flag_is_shared() {
        let flag = CancellationFlag::new();
        let clone = flag.clone();
        clone.cancel();
        assert!(flag.is_cancelled());
    }

    #[test]
    fn test_cooldown_holds_back_unhelpful_action() {
        let warn = |node: &str| {
            Diagnostic::new(RuleId::NonActionableTask, Severity::Warn, "x").for_node(node)
        };
        let mut run = run();
        run.previous_report = Some(report(60, vec![warn("A"), warn("B")]));
        run.last_applied = vec![planned("A"), planned("B")];

        run.refresh_cooldown(&report(65, vec![warn("A")]));
        assert!(run.cooldown.contains(&planned("A").action));
        assert!(!run.cooldown.contains(&planned("B").action));
    }

    #[test]
    fn test_best_seen_prefers_earliest_on_tie() {
        let mut run = run();
        let draft = CurriculumDraft::new("t", Vec::new());
        run.observe(1, &draft, &report(70, Vec::new()), "d1");
        run.observe(2, &draft, &report(70, Vec::new()), "d2");
        run.observe(3, &draft, &report(65, Vec::new()), "d3");
        assert_eq!(run.best.as_ref().map(|b| b.iteration), Some(1));
        assert_eq!(run.best_digest.as_deref(), Some("d1"));
    }
}
