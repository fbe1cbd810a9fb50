//! Error types for the metrics agent
//!
//! None of these are fatal: a source error zeroes the affected samples and an
//! overflow truncates the report at the last complete unit.

use std::path::PathBuf;
use thiserror::Error;

/// Failure to obtain a reading from a kernel data source.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("source unavailable: {path}: {source}")]
    Unavailable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("unexpected content in {path}: {reason}")]
    Malformed { path: PathBuf, reason: String },

    #[error("statvfs failed for {mount}: {source}")]
    Statvfs {
        mount: String,
        #[source]
        source: nix::errno::Errno,
    },
}

impl SourceError {
    pub fn malformed(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::Malformed {
            path: path.into(),
            reason: reason.into(),
        }
    }
}

/// Raised by the bounded JSON writer when a fragment does not fit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("output buffer overflow: {requested} bytes requested, {remaining} remaining")]
pub struct Overflow {
    pub requested: usize,
    pub remaining: usize,
}
