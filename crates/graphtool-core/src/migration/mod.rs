//! Versioned migrations for graph databases.
//!
//! This module provides:
//! - Version parsing and ordering
//! - Scanning of batch folders into an [`Inventory`]
//! - Generation of paired up/down artifact files
//! - Planning of ordered [`ExecutionSteps`] between two versions
//! - Fail-fast execution with version recording
//!
//! # Example
//!
//! ```ignore
//! use graphtool_core::migration::{Planner, Scanner, TargetVersion};
//! use graphtool_core::store::{MemoryVersionStore, VersionStore};
//!
//! let inventory = Scanner::new("import").scan()?;
//! let store = MemoryVersionStore::new();
//! let target: TargetVersion = "200".parse()?;
//!
//! let steps = Planner::new().plan(&inventory, &store.read_versions()?, &target, "schema")?;
//! print!("{}", steps);
//! ```

pub mod artifact;
pub mod executor;
pub mod inventory;
pub mod planner;
pub mod scanner;
pub mod steps;
pub mod version;

// Artifact types
pub use artifact::{
    ArtifactFileName, ArtifactKind, Direction, MigrationArtifact, Payload, NOOP_COMMAND,
};

// Executor types
pub use executor::{
    CancellationToken, ExecutionReport, Executor, RecordGranularity, StepError, StepRunner,
};

// Inventory and scanning
pub use inventory::{BatchInventory, Inventory};
pub use scanner::{Scanner, UnknownFilePolicy};

// Planning
pub use planner::{BatchDependencies, Planner};
pub use steps::{ExecutionStep, ExecutionSteps};
pub use version::{TargetVersion, Version};
