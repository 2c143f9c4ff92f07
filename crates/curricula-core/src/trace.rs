//! Optimization trace.
//!
//! One immutable [`IterationRecord`] per judging pass, in order. The
//! controller owns the [`TraceRecorder`] for the length of a run and seals it
//! with [`TraceRecorder::finalize`], which always happens, abort included.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::action::PlannedAction;
use crate::domain::error::ErrorCode;
use crate::judge::ReportSummary;

/// Trace format version. Readers reject a different major version.
pub const TRACE_SCHEMA_VERSION: &str = "1.0";

/// Why a run ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StopReason {
    Accepted,
    Exhausted,
    Stalled,
    Cancelled,
    Error { code: ErrorCode, message: String },
}

impl StopReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            StopReason::Accepted => "accepted",
            StopReason::Exhausted => "exhausted",
            StopReason::Stalled => "stalled",
            StopReason::Cancelled => "cancelled",
            StopReason::Error { .. } => "error",
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, StopReason::Error { .. })
    }
}

impl std::fmt::Display for StopReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StopReason::Error { code, message } => write!(f, "error({:?}): {}", code, message),
            other => f.write_str(other.as_str()),
        }
    }
}

/// Everything decided in one judging pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IterationRecord {
    /// 1-based judging pass.
    pub iteration: u32,
    /// Canonical digest of the judged draft.
    pub draft_digest: String,
    pub report: ReportSummary,
    /// Actions sent to the repair executor after this pass.
    #[serde(default)]
    pub actions_applied: Vec<PlannedAction>,
    /// Actions cut by the per-iteration budget.
    #[serde(default)]
    pub actions_dropped: Vec<PlannedAction>,
    /// Actions withheld because their (node, kind) pair was cooling down.
    #[serde(default)]
    pub cooldown_suppressed: Vec<PlannedAction>,
    /// Collaborator attempts spent producing this draft's critique.
    pub critic_attempts: u32,
    /// Present on the final record only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stop_reason: Option<StopReason>,
    pub recorded_at: DateTime<Utc>,
}

impl IterationRecord {
    pub fn new(iteration: u32, draft_digest: String, report: ReportSummary, critic_attempts: u32) -> Self {
        Self {
            iteration,
            draft_digest,
            report,
            actions_applied: Vec::new(),
            actions_dropped: Vec::new(),
            cooldown_suppressed: Vec::new(),
            critic_attempts,
            stop_reason: None,
            recorded_at: Utc::now(),
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.stop_reason.is_some()
    }
}

/// Best-scoring draft across a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BestSeen {
    pub iteration: u32,
    pub aggregate: u32,
    pub draft_digest: String,
}

/// Sealed record of one optimization run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OptimizationTrace {
    pub schema_version: String,
    pub run_id: String,
    pub topic: String,
    /// Seed of the run's backoff jitter generator.
    pub seed: u64,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub stop_reason: StopReason,
    pub accepted: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub best: Option<BestSeen>,
    pub iterations: Vec<IterationRecord>,
}

impl OptimizationTrace {
    pub fn judging_passes(&self) -> usize {
        self.iterations.len()
    }

    pub fn last(&self) -> Option<&IterationRecord> {
        self.iterations.last()
    }
}

/// Append-only builder for an [`OptimizationTrace`].
#[derive(Debug)]
pub struct TraceRecorder {
    run_id: String,
    topic: String,
    seed: u64,
    started_at: DateTime<Utc>,
    iterations: Vec<IterationRecord>,
}

impl TraceRecorder {
    pub fn new(topic: impl Into<String>, seed: u64) -> Self {
        Self::with_run_id(Uuid::new_v4().to_string(), topic, seed)
    }

    pub fn with_run_id(run_id: impl Into<String>, topic: impl Into<String>, seed: u64) -> Self {
        Self {
            run_id: run_id.into(),
            topic: topic.into(),
            seed,
            started_at: Utc::now(),
            iterations: Vec::new(),
        }
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    /// Append a completed record.
    pub fn record(&mut self, record: IterationRecord) {
        self.iterations.push(record);
    }

    /// Mark the newest record as the one that ended the run. Returns false
    /// when nothing has been recorded or the record is already terminal.
    pub fn stamp_last(&mut self, stop_reason: &StopReason) -> bool {
        match self.iterations.last_mut() {
            Some(record) if !record.is_terminal() => {
                record.stop_reason = Some(stop_reason.clone());
                true
            }
            _ => false,
        }
    }

    pub fn len(&self) -> usize {
        self.iterations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.iterations.is_empty()
    }

    /// Seal the trace.
    pub fn finalize(self, stop_reason: StopReason, best: Option<BestSeen>) -> OptimizationTrace {
        OptimizationTrace {
            schema_version: TRACE_SCHEMA_VERSION.to_string(),
            run_id: self.run_id,
            topic: self.topic,
            seed: self.seed,
            started_at: self.started_at,
            finished_at: Utc::now(),
            accepted: stop_reason == StopReason::Accepted,
            stop_reason,
            best,
            iterations: self.iterations,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn summary(aggregate: u32) -> ReportSummary {
        ReportSummary {
            scores: BTreeMap::new(),
            aggregate,
            hard_gate_count: 0,
            diagnostic_count: 0,
            rules: Vec::new(),
            accepted: false,
        }
    }

    #[test]
    fn test_stop_reason_serde() {
        let json = serde_json::to_value(StopReason::Stalled).expect("serialize");
        assert_eq!(json["kind"], "stalled");

        let err = StopReason::Error {
            code: ErrorCode::ProviderTimeout,
            message: "critic timed out".to_string(),
        };
        let json = serde_json::to_value(&err).expect("serialize");
        assert_eq!(json["kind"], "error");
        assert_eq!(json["code"], "provider_timeout");
        assert!(err.is_error());
    }

    #[test]
    fn test_recorder_preserves_order_and_seals() {
        let mut recorder = TraceRecorder::with_run_id("run-1", "caching", 7);
        recorder.record(IterationRecord::new(1, "d1".to_string(), summary(60), 1));
        let mut last = IterationRecord::new(2, "d2".to_string(), summary(85), 1);
        last.stop_reason = Some(StopReason::Accepted);
        recorder.record(last);

        let trace = recorder.finalize(
            StopReason::Accepted,
            Some(BestSeen {
                iteration: 2,
                aggregate: 85,
                draft_digest: "d2".to_string(),
            }),
        );
        assert_eq!(trace.schema_version, TRACE_SCHEMA_VERSION);
        assert!(trace.accepted);
        assert_eq!(trace.judging_passes(), 2);
        assert_eq!(trace.iterations[0].iteration, 1);
        assert!(trace.last().map_or(false, IterationRecord::is_terminal));
        assert!(trace.finished_at >= trace.started_at);
    }

    #[test]
    fn test_stamp_last_marks_only_an_open_record() {
        let mut recorder = TraceRecorder::with_run_id("run-2", "caching", 7);
        assert!(!recorder.stamp_last(&StopReason::Cancelled));

        recorder.record(IterationRecord::new(1, "d1".to_string(), summary(60), 1));
        assert!(recorder.stamp_last(&StopReason::Cancelled));
        assert!(!recorder.stamp_last(&StopReason::Stalled));

        let trace = recorder.finalize(StopReason::Cancelled, None);
        assert_eq!(trace.iterations[0].stop_reason, Some(StopReason::Cancelled));
    }
}
