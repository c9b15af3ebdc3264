//! Jute stock auditing core.
//!
//! Detector output for each image is normalized into a [`models::DetectionRecord`],
//! records are aggregated into an [`models::AuditSummary`] with grade and
//! compliance verdicts, and exports carry a SHA-256 hash of the summary plus
//! watermarked images.

pub mod aggregate;
pub mod config;
pub mod error;
pub mod glyphs;
pub mod integrity;
pub mod models;
pub mod normalize;
pub mod report;
pub mod session;
pub mod watermark;

pub use error::{AuditError, Result};
