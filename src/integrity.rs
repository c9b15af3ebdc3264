//! Tamper-evidence hashing for audit summaries.
//!
//! The hash is SHA-256 over a canonical JSON rendering of the summary:
//! object keys sorted at every depth, no insignificant whitespace, and any
//! image payload keys removed. Publishing the hex digest next to an export
//! lets anyone re-hash the exported record later and detect edits.
//!
//! This is a one-way check. Watermarks on exported images are cosmetic and
//! carry no cryptographic weight.

use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::error::{AuditError, Result};
use crate::models::AuditSummary;

/// Keys holding binary image payloads. Never part of the hash input.
pub const EXCLUDED_KEYS: [&str; 3] = ["original_images", "processed_images", "watermarked_images"];

pub fn audit_hash(summary: &AuditSummary) -> Result<String> {
    let value = serde_json::to_value(summary)?;
    Ok(hash_value(&value))
}

/// Hashes an already-serialized summary, such as one read back from an export.
pub fn hash_value(value: &Value) -> String {
    let canonical = canonical_json(&strip_binary(value));
    format!("{:x}", Sha256::digest(canonical.as_bytes()))
}

pub fn verify(summary: &AuditSummary, published_hash: &str) -> Result<bool> {
    Ok(audit_hash(summary)?.eq_ignore_ascii_case(published_hash.trim()))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Verification {
    pub published: String,
    pub recomputed: String,
}

impl Verification {
    pub fn is_valid(&self) -> bool {
        self.published.eq_ignore_ascii_case(&self.recomputed)
    }
}

/// Re-hashes an exported `{"summary": ..., "hash": ...}` record.
pub fn verify_record(record: &Value) -> Result<Verification> {
    let summary = record
        .get("summary")
        .ok_or_else(|| AuditError::InvalidInput("export record has no summary".to_string()))?;
    let published = record
        .get("hash")
        .and_then(Value::as_str)
        .ok_or_else(|| AuditError::InvalidInput("export record has no hash".to_string()))?;

    let verification = Verification {
        published: published.trim().to_string(),
        recomputed: hash_value(summary),
    };
    if !verification.is_valid() {
        tracing::warn!(
            published = %verification.published,
            recomputed = %verification.recomputed,
            "export record does not match its published hash"
        );
    }
    Ok(verification)
}

fn strip_binary(value: &Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.iter()
                .filter(|(key, _)| !EXCLUDED_KEYS.contains(&key.as_str()))
                .map(|(key, inner)| (key.clone(), strip_binary(inner)))
                .collect(),
        ),
        Value::Array(items) => Value::Array(items.iter().map(strip_binary).collect()),
        other => other.clone(),
    }
}

fn canonical_json(value: &Value) -> String {
    let mut out = String::new();
    write_canonical(value, &mut out);
    out
}

fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(&String, &Value)> = map.iter().collect();
            entries.sort_by(|a, b| a.0.cmp(b.0));
            out.push('{');
            for (index, (key, inner)) in entries.into_iter().enumerate() {
                if index > 0 {
                    out.push(',');
                }
                out.push_str(&Value::String(key.clone()).to_string());
                out.push(':');
                write_canonical(inner, out);
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (index, inner) in items.iter().enumerate() {
                if index > 0 {
                    out.push(',');
                }
                write_canonical(inner, out);
            }
            out.push(']');
        }
        scalar => out.push_str(&scalar.to_string()),
    }
}
