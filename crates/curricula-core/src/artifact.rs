//! Run artifact persistence and retention policy.
//!
//! A run directory `<dir>/<run_id>/` holds:
//! - `trace.json` + `trace.digest`: the sealed [`OptimizationTrace`]
//! - `curriculum.json` + `curriculum.digest`: the returned draft
//!
//! Digests are SHA-256 hex over the canonical JSON form, so a file that was
//! reformatted but not edited still verifies. [`RetentionPolicy`] prunes run
//! directories by outcome, age and count.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::domain::curriculum::CurriculumDraft;
use crate::domain::digest::{compute_digest, draft_digest};
use crate::domain::error::{CurriculaError, Result};
use crate::trace::{OptimizationTrace, StopReason, TRACE_SCHEMA_VERSION};

const TRACE_FILE: &str = "trace.json";
const TRACE_DIGEST_FILE: &str = "trace.digest";
const CURRICULUM_FILE: &str = "curriculum.json";
const CURRICULUM_DIGEST_FILE: &str = "curriculum.digest";

fn major(version: &str) -> &str {
    version.split('.').next().unwrap_or(version)
}

fn read_digest_file(path: &Path) -> Result<String> {
    Ok(std::fs::read_to_string(path)?.trim().to_string())
}

/// Write a trace to `<dir>/<run_id>/trace.json`.
///
/// Returns the path to `trace.json`.
pub fn write_trace_artifact(trace: &OptimizationTrace, dir: &Path) -> Result<PathBuf> {
    let run_dir = dir.join(&trace.run_id);
    std::fs::create_dir_all(&run_dir)?;

    let trace_path = run_dir.join(TRACE_FILE);
    let digest = compute_digest(trace)?;

    std::fs::write(&trace_path, serde_json::to_vec_pretty(trace)?)?;
    std::fs::write(run_dir.join(TRACE_DIGEST_FILE), digest.as_bytes())?;

    Ok(trace_path)
}

/// Read and verify the trace of `run_id`.
///
/// Fails with `IncompatibleSchema` when the major schema version differs and
/// with `DigestMismatch` when the content does not match `trace.digest`.
pub fn read_trace_artifact(run_id: &str, dir: &Path) -> Result<OptimizationTrace> {
    let run_dir = dir.join(run_id);
    let raw: serde_json::Value = serde_json::from_slice(&std::fs::read(run_dir.join(TRACE_FILE))?)?;

    let found = raw
        .get("schema_version")
        .and_then(serde_json::Value::as_str)
        .unwrap_or("0")
        .to_string();
    if major(&found) != major(TRACE_SCHEMA_VERSION) {
        return Err(CurriculaError::IncompatibleSchema {
            found,
            expected: TRACE_SCHEMA_VERSION.to_string(),
        });
    }

    let trace: OptimizationTrace = serde_json::from_value(raw)?;
    let expected = read_digest_file(&run_dir.join(TRACE_DIGEST_FILE))?;
    let actual = compute_digest(&trace)?;
    if actual != expected {
        return Err(CurriculaError::DigestMismatch { expected, actual });
    }

    Ok(trace)
}

/// Write the returned draft to `<dir>/<run_id>/curriculum.json`.
pub fn write_curriculum_artifact(run_id: &str, draft: &CurriculumDraft, dir: &Path) -> Result<PathBuf> {
    let run_dir = dir.join(run_id);
    std::fs::create_dir_all(&run_dir)?;

    let path = run_dir.join(CURRICULUM_FILE);
    std::fs::write(&path, serde_json::to_vec_pretty(draft)?)?;
    std::fs::write(run_dir.join(CURRICULUM_DIGEST_FILE), draft_digest(draft)?.as_bytes())?;

    Ok(path)
}

/// Read and verify the draft stored for `run_id`.
pub fn read_curriculum_artifact(run_id: &str, dir: &Path) -> Result<CurriculumDraft> {
    let run_dir = dir.join(run_id);
    let draft: CurriculumDraft = serde_json::from_slice(&std::fs::read(run_dir.join(CURRICULUM_FILE))?)?;

    let expected = read_digest_file(&run_dir.join(CURRICULUM_DIGEST_FILE))?;
    let actual = draft_digest(&draft)?;
    if actual != expected {
        return Err(CurriculaError::DigestMismatch { expected, actual });
    }

    Ok(draft)
}

/// Which run directories survive a prune.
///
/// Runs are ranked by `finished_at`, newest first. Accepted runs are the
/// artifacts worth keeping, so `keep_accepted` exempts them from both limits.
/// Aborted runs carry no curriculum and go first when `drop_aborted` is set.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RetentionPolicy {
    pub max_age_days: Option<u64>,
    /// Non-exempt runs kept, newest first.
    pub max_runs: Option<usize>,
    pub keep_accepted: bool,
    pub drop_aborted: bool,
}

/// Trace metadata retention decisions are made on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredRun {
    pub run_id: String,
    pub finished_at: DateTime<Utc>,
    pub stop_reason: StopReason,
}

impl StoredRun {
    fn from_trace(trace: &OptimizationTrace) -> Self {
        Self {
            run_id: trace.run_id.clone(),
            finished_at: trace.finished_at,
            stop_reason: trace.stop_reason.clone(),
        }
    }
}

impl RetentionPolicy {
    /// Run ids to delete, given every stored run and the current time.
    pub fn select(&self, runs: &[StoredRun], now: DateTime<Utc>) -> Vec<String> {
        let mut ranked: Vec<&StoredRun> = runs.iter().collect();
        ranked.sort_by(|a, b| {
            b.finished_at
                .cmp(&a.finished_at)
                .then_with(|| a.run_id.cmp(&b.run_id))
        });

        let cutoff = self
            .max_age_days
            .map(|days| now - chrono::Duration::days(days as i64));
        let mut doomed = Vec::new();
        let mut kept = 0usize;
        for run in ranked {
            if self.keep_accepted && run.stop_reason == StopReason::Accepted {
                continue;
            }
            let aborted = self.drop_aborted && run.stop_reason.is_error();
            let expired = cutoff.map_or(false, |cutoff| run.finished_at < cutoff);
            let over_count = self.max_runs.map_or(false, |max| kept >= max);
            if aborted || expired || over_count {
                doomed.push(run.run_id.clone());
            } else {
                kept += 1;
            }
        }
        doomed
    }

    /// Apply the policy to `<dir>/*/trace.json`. Directories without a
    /// readable trace are left alone. Returns the deleted run ids.
    pub fn prune(&self, dir: &Path) -> Result<Vec<String>> {
        let read_dir = match std::fs::read_dir(dir) {
            Ok(rd) => rd,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(CurriculaError::Io(e)),
        };

        let mut runs = Vec::new();
        for entry in read_dir {
            let trace_path = entry?.path().join(TRACE_FILE);
            let Ok(bytes) = std::fs::read(&trace_path) else {
                continue;
            };
            match serde_json::from_slice::<OptimizationTrace>(&bytes) {
                Ok(trace) => runs.push(StoredRun::from_trace(&trace)),
                Err(e) => debug!(path = %trace_path.display(), error = %e, "skipping unreadable trace"),
            }
        }

        let mut pruned = Vec::new();
        for run_id in self.select(&runs, Utc::now()) {
            std::fs::remove_dir_all(dir.join(&run_id))?;
            pruned.push(run_id);
        }
        Ok(pruned)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::curriculum::Node;
    use crate::trace::TraceRecorder;
    use tempfile::tempdir;

    fn trace(run_id: &str) -> OptimizationTrace {
        TraceRecorder::with_run_id(run_id, "caching", 1).finalize(StopReason::Stalled, None)
    }

    #[test]
    fn test_trace_roundtrip_verifies() {
        let dir = tempdir().expect("tempdir");
        let original = trace("run-a");
        let path = write_trace_artifact(&original, dir.path()).expect("write");
        assert!(path.ends_with("run-a/trace.json"));

        let loaded = read_trace_artifact("run-a", dir.path()).expect("read");
        assert_eq!(loaded, original);
    }

    #[test]
    fn test_tampered_digest_rejected() {
        let dir = tempdir().expect("tempdir");
        write_trace_artifact(&trace("run-b"), dir.path()).expect("write");
        std::fs::write(dir.path().join("run-b").join(TRACE_DIGEST_FILE), "0".repeat(64))
            .expect("tamper");

        let err = read_trace_artifact("run-b", dir.path()).unwrap_err();
        assert!(matches!(err, CurriculaError::DigestMismatch { .. }));
    }

    #[test]
    fn test_major_version_mismatch_rejected() {
        let dir = tempdir().expect("tempdir");
        let mut old = trace("run-c");
        old.schema_version = "2.3".to_string();
        write_trace_artifact(&old, dir.path()).expect("write");

        match read_trace_artifact("run-c", dir.path()) {
            Err(CurriculaError::IncompatibleSchema { found, expected }) => {
                assert_eq!(found, "2.3");
                assert_eq!(expected, TRACE_SCHEMA_VERSION);
            }
            other => panic!("expected IncompatibleSchema, got {other:?}"),
        }
    }

    #[test]
    fn test_curriculum_roundtrip_and_tamper() {
        let dir = tempdir().expect("tempdir");
        let draft = CurriculumDraft::new(
            "caching",
            vec![Node::new("N1", "Cache basics", "Explain cache hits").with_estimate(30.0)],
        );
        write_curriculum_artifact("run-d", &draft, dir.path()).expect("write");
        assert_eq!(read_curriculum_artifact("run-d", dir.path()).expect("read"), draft);

        let mut edited = draft.clone();
        edited.nodes[0].estimate_minutes = 45.0;
        std::fs::write(
            dir.path().join("run-d").join(CURRICULUM_FILE),
            serde_json::to_vec(&edited).expect("json"),
        )
        .expect("overwrite");
        assert!(matches!(
            read_curriculum_artifact("run-d", dir.path()),
            Err(CurriculaError::DigestMismatch { .. })
        ));
    }

    fn stored(run_id: &str, hours_ago: i64, stop_reason: StopReason) -> StoredRun {
        StoredRun {
            run_id: run_id.to_string(),
            finished_at: Utc::now() - chrono::Duration::hours(hours_ago),
            stop_reason,
        }
    }

    #[test]
    fn test_select_keeps_accepted_outside_count() {
        let runs = vec![
            stored("accepted-old", 30, StopReason::Accepted),
            stored("stalled", 3, StopReason::Stalled),
            stored("exhausted", 2, StopReason::Exhausted),
            stored("accepted-new", 1, StopReason::Accepted),
        ];
        let policy = RetentionPolicy {
            max_runs: Some(1),
            keep_accepted: true,
            ..Default::default()
        };
        assert_eq!(policy.select(&runs, Utc::now()), vec!["stalled".to_string()]);

        let strict = RetentionPolicy {
            max_runs: Some(1),
            ..Default::default()
        };
        assert_eq!(
            strict.select(&runs, Utc::now()),
            vec!["exhausted", "stalled", "accepted-old"]
        );
    }

    #[test]
    fn test_select_drops_aborted_and_expired() {
        let aborted = StopReason::Error {
            code: crate::domain::error::ErrorCode::ProviderTimeout,
            message: "critic timed out".to_string(),
        };
        let runs = vec![
            stored("fresh", 1, StopReason::Stalled),
            stored("crashed", 2, aborted),
            stored("stale", 24 * 10, StopReason::Exhausted),
        ];
        let policy = RetentionPolicy {
            max_age_days: Some(7),
            drop_aborted: true,
            ..Default::default()
        };
        assert_eq!(policy.select(&runs, Utc::now()), vec!["crashed", "stale"]);
    }

    #[test]
    fn test_prune_removes_selected_directories() {
        let dir = tempdir().expect("tempdir");
        for (i, id) in ["old", "mid", "new"].iter().enumerate() {
            let mut t = trace(id);
            t.finished_at = Utc::now() - chrono::Duration::hours(10 - i as i64);
            write_trace_artifact(&t, dir.path()).expect("write");
        }
        std::fs::create_dir_all(dir.path().join("scratch")).expect("mkdir");

        let policy = RetentionPolicy {
            max_runs: Some(1),
            ..Default::default()
        };
        let mut pruned = policy.prune(dir.path()).expect("prune");
        pruned.sort();
        assert_eq!(pruned, vec!["mid", "old"]);
        assert!(dir.path().join("new").exists());
        assert!(dir.path().join("scratch").exists());
    }

    #[test]
    fn test_prune_missing_dir_is_noop() {
        let dir = tempdir().expect("tempdir");
        let policy = RetentionPolicy {
            max_age_days: Some(1),
            ..Default::default()
        };
        assert!(policy.prune(&dir.path().join("absent")).expect("prune").is_empty());
    }
}
