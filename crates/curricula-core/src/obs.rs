//! Structured observability hooks for the optimization loop.
//!
//! This module provides:
//! - Run-scoped tracing spans via the `RunSpan` RAII guard
//! - Emission functions for lifecycle events: start, judging, planning,
//!   collaborator retries, finish
//!
//! Events are emitted at `info!` level, retries at `warn!`. Filtering follows
//! `RUST_LOG`; see [`crate::telemetry::init_tracing`].

use std::time::Duration;

use tracing::{info, warn};

use crate::domain::error::CurriculaError;

/// RAII guard that enters a run-scoped tracing span for the duration of a run.
///
/// # Example
///
/// ```ignore
/// let _span = RunSpan::enter("run-12345");
/// // every event below carries run_id = "run-12345"
/// ```
pub struct RunSpan {
    _span: tracing::span::EnteredSpan,
}

impl RunSpan {
    /// Create and enter a span tagged with the run_id.
    pub fn enter(run_id: &str) -> Self {
        let span = tracing::info_span!("curricula.run", run_id = %run_id);
        Self {
            _span: span.entered(),
        }
    }

    /// A span that is created but not entered, for attaching to futures.
    pub fn span(run_id: &str) -> tracing::Span {
        tracing::info_span!("curricula.run", run_id = %run_id)
    }
}

/// Emit event: run started for a topic with an iteration budget.
pub fn emit_run_started(run_id: &str, topic: &str, max_iterations: u32, seed: u64) {
    info!(
        event = "run.started",
        run_id = %run_id,
        topic = %topic,
        max_iterations = max_iterations,
        seed = seed,
    );
}

/// Emit event: one draft judged.
pub fn emit_iteration_judged(
    run_id: &str,
    iteration: u32,
    aggregate: u32,
    hard_gates: usize,
    diagnostics: usize,
    accepted: bool,
) {
    info!(
        event = "iteration.judged",
        run_id = %run_id,
        iteration = iteration,
        aggregate = aggregate,
        hard_gates = hard_gates,
        diagnostics = diagnostics,
        accepted = accepted,
    );
}

/// Emit event: repair plan built.
pub fn emit_repair_planned(run_id: &str, iteration: u32, planned: usize, dropped: usize, suppressed: usize) {
    info!(
        event = "repair.planned",
        run_id = %run_id,
        iteration = iteration,
        planned = planned,
        dropped = dropped,
        suppressed = suppressed,
    );
}

/// Emit event: a collaborator call failed and will be retried.
pub fn emit_provider_retry(stage: &str, attempt: u32, delay: Duration, error: &CurriculaError) {
    warn!(
        event = "provider.retry",
        stage = %stage,
        attempt = attempt,
        delay_ms = delay.as_millis() as u64,
        error = %error,
    );
}

/// Emit event: run finished with its stop reason.
pub fn emit_run_finished(
    run_id: &str,
    stop_reason: &str,
    judging_passes: usize,
    best_score: Option<u32>,
    duration_ms: u64,
) {
    info!(
        event = "run.finished",
        run_id = %run_id,
        stop_reason = %stop_reason,
        judging_passes = judging_passes,
        best_score = ?best_score,
        duration_ms = duration_ms,
    );
}

/// Emit event: run aborted by a collaborator or contract failure (warning level).
pub fn emit_run_aborted(run_id: &str, error: &CurriculaError) {
    warn!(event = "run.aborted", run_id = %run_id, code = ?error.code(), error = %error);
}
