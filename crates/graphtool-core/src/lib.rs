//! Graph Tool Core - Migration scanning, planning and execution.
//!
//! This crate discovers versioned migration artifacts on disk, computes the
//! ordered steps that move a graph database from its recorded version to a
//! target version, and executes them with fail-fast semantics.

pub mod config;
pub mod error;
pub mod migration;
pub mod shell;
pub mod store;

pub use config::{BatchConfig, PlannerConfig};
pub use error::{MigrationError, Result};
pub use migration::{
    ArtifactKind, CancellationToken, Direction, ExecutionReport, ExecutionStep, ExecutionSteps,
    Executor, Inventory, MigrationArtifact, Payload, Planner, RecordGranularity, Scanner,
    StepRunner, TargetVersion, UnknownFilePolicy, Version,
};
pub use shell::ShellRunner;
pub use store::{DatabaseModel, MemoryVersionStore, SledVersionStore, VersionStore};
