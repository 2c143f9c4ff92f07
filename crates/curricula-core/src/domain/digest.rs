//! Canonical JSON digests for drafts and artifacts.
//!
//! Drafts are snapshotted in the trace by digest only. The canonical form
//! sorts object keys and writes integer-valued floats as integers, so a draft
//! whose estimates round-trip as `45` or `45.0` hashes the same.

use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::domain::curriculum::CurriculumDraft;
use crate::domain::error::{CurriculaError, Result};

fn canonicalize(value: &serde_json::Value) -> Result<serde_json::Value> {
    use serde_json::Value;

    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            let mut sorted = serde_json::Map::new();
            for key in keys {
                sorted.insert(key.clone(), canonicalize(&map[key])?);
            }
            Ok(Value::Object(sorted))
        }
        Value::Array(items) => Ok(Value::Array(
            items.iter().map(canonicalize).collect::<Result<Vec<_>>>()?,
        )),
        Value::Number(n) if !(n.is_i64() || n.is_u64()) => {
            let Some(f) = n.as_f64() else {
                return Ok(value.clone());
            };
            if !f.is_finite() {
                return Err(CurriculaError::ContractViolation(
                    "non-finite number in canonical JSON".to_string(),
                ));
            }
            if f.fract() == 0.0 && f.abs() < 9.0e15 {
                Ok(Value::Number(serde_json::Number::from(f as i64)))
            } else {
                Ok(value.clone())
            }
        }
        other => Ok(other.clone()),
    }
}

/// Canonical compact JSON for any serializable value.
pub fn canonical_json<T: Serialize>(value: &T) -> Result<String> {
    let raw = serde_json::to_value(value)?;
    Ok(serde_json::to_string(&canonicalize(&raw)?)?)
}

/// SHA-256 hex digest of raw bytes.
pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

/// SHA-256 hex digest of the canonical JSON form of `value`.
pub fn compute_digest<T: Serialize>(value: &T) -> Result<String> {
    Ok(sha256_hex(canonical_json(value)?.as_bytes()))
}

/// Snapshot reference for a draft, as recorded in the trace.
pub fn draft_digest(draft: &CurriculumDraft) -> Result<String> {
    compute_digest(draft)
}
