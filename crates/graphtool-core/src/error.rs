//! Error types for scanning, planning and executing migrations.

use crate::migration::{Direction, Version};
use std::path::PathBuf;
use thiserror::Error;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, MigrationError>;

/// Errors produced while scanning, planning or executing migrations.
#[derive(Debug, Error)]
pub enum MigrationError {
    /// A version string could not be parsed.
    #[error("invalid version format {input:?}: {reason}")]
    InvalidVersionFormat {
        /// The rejected input.
        input: String,
        /// Why it was rejected.
        reason: String,
    },

    /// A file inside a batch folder does not follow the artifact naming scheme.
    #[error("malformed artifact name {}: {reason}", path.display())]
    MalformedArtifactName {
        /// Offending file.
        path: PathBuf,
        /// Why it was rejected.
        reason: String,
    },

    /// A command artifact contains no arguments.
    #[error("command artifact {} has no arguments", path.display())]
    EmptyCommand {
        /// Offending file.
        path: PathBuf,
    },

    /// Two artifacts share the same version within one batch and direction.
    #[error(
        "duplicate {direction} version {version} in batch {batch}: {} and {}",
        first.display(),
        second.display()
    )]
    DuplicateVersion {
        /// Batch name.
        batch: String,
        /// Direction of both artifacts.
        direction: Direction,
        /// The clashing version.
        version: Version,
        /// Path of the artifact seen first.
        first: PathBuf,
        /// Path of the artifact seen second.
        second: PathBuf,
    },

    /// A version in the planned range lacks the artifact for the requested direction.
    #[error("batch {batch}: version {version} has no {direction} artifact")]
    MissingCounterpartArtifact {
        /// Batch name.
        batch: String,
        /// Version lacking the artifact.
        version: Version,
        /// Direction that is missing.
        direction: Direction,
    },

    /// The requested batch does not exist in the inventory.
    #[error("unknown batch: {batch}")]
    UnknownBatch {
        /// Batch name.
        batch: String,
    },

    /// The target cannot be reached from the recorded version.
    #[error("batch {batch}: no path from {current} to {target}: {reason}")]
    NoPathToTarget {
        /// Batch name.
        batch: String,
        /// Recorded version.
        current: Version,
        /// Requested version.
        target: Version,
        /// Why the path is broken.
        reason: String,
    },

    /// The configured batch dependencies form a cycle.
    #[error("batch dependency cycle: {}", chain.join(" -> "))]
    DependencyCycle {
        /// The batches forming the cycle, first batch repeated at the end.
        chain: Vec<String>,
    },

    /// A migration cannot be generated without a name.
    #[error("migration name cannot be empty")]
    EmptyName,

    /// A migration name cannot be used in a file name.
    #[error("invalid migration name {name:?}: {reason}")]
    InvalidName {
        /// The rejected name.
        name: String,
        /// Why it was rejected.
        reason: String,
    },

    /// Filesystem access failed.
    #[error("filesystem error at {}: {source}", path.display())]
    Filesystem {
        /// Path being accessed.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Reading recorded versions failed.
    #[error("database read error: {0}")]
    DatabaseRead(String),

    /// Recording a version failed.
    #[error("database write error: {0}")]
    DatabaseWrite(String),

    /// A step failed while executing.
    #[error("step {step_index} ({batch} {direction} {version}) failed: {message}")]
    StepExecution {
        /// Zero-based position of the step in the plan.
        step_index: usize,
        /// Batch of the failed step.
        batch: String,
        /// Version of the failed step.
        version: Version,
        /// Direction of the failed step.
        direction: Direction,
        /// Error message reported by the runner.
        message: String,
    },

    /// Execution was cancelled before the step at `step_index` started.
    #[error("execution cancelled before step {step_index}")]
    Cancelled {
        /// Zero-based position of the first step not run.
        step_index: usize,
    },

    /// Configuration could not be loaded or is inconsistent.
    #[error("configuration error: {0}")]
    Config(String),

    /// A saved plan could not be decoded.
    #[error("invalid saved plan: {0}")]
    PlanFormat(String),
}

impl MigrationError {
    pub(crate) fn filesystem(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        MigrationError::Filesystem {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn malformed(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        MigrationError::MalformedArtifactName {
            path: path.into(),
            reason: reason.into(),
        }
    }
}
