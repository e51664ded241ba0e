//! Planner configuration.
//!
//! Loaded from the `[planner]` table of a TOML file:
//!
//! ```toml
//! [planner]
//! base_folder = "import"
//! initial_batch = "schema"
//! cypher_shell_format = "verbose"
//! unknown_files = "reject"
//! record_granularity = "per-step"
//!
//! [planner.batches.schema]
//!
//! [planner.batches.data]
//! dependencies = ["schema"]
//! ```

use crate::error::{MigrationError, Result};
use crate::migration::{BatchDependencies, Planner, RecordGranularity, Scanner, UnknownFilePolicy};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Default folder scanned for batches.
pub const DEFAULT_BASE_FOLDER: &str = "import";

/// Default batch to plan from.
pub const DEFAULT_INITIAL_BATCH: &str = "schema";

/// Default `--format` passed to cypher-shell.
pub const DEFAULT_CYPHER_SHELL_FORMAT: &str = "verbose";

/// Default cypher-shell executable.
pub const DEFAULT_CYPHER_SHELL_PATH: &str = "cypher-shell";

/// Configuration of one batch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BatchConfig {
    /// Batches that must be planned before this one, in order.
    pub dependencies: Vec<String>,
}

/// Planner configuration value passed to the scanner, planner and executor.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PlannerConfig {
    /// Folder whose child directories are batches.
    pub base_folder: PathBuf,
    /// Batch planned when the target names none.
    pub initial_batch: String,
    /// Configured batches and their dependencies.
    pub batches: BTreeMap<String, BatchConfig>,
    /// Output format passed to cypher-shell.
    pub cypher_shell_format: String,
    /// Path to the cypher-shell executable.
    pub cypher_shell_path: PathBuf,
    /// Handling of unrecognised files in batch folders.
    pub unknown_files: UnknownFilePolicy,
    /// When recorded versions are written.
    pub record_granularity: RecordGranularity,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ConfigFile {
    planner: PlannerConfig,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            base_folder: PathBuf::from(DEFAULT_BASE_FOLDER),
            initial_batch: DEFAULT_INITIAL_BATCH.to_string(),
            batches: BTreeMap::new(),
            cypher_shell_format: DEFAULT_CYPHER_SHELL_FORMAT.to_string(),
            cypher_shell_path: PathBuf::from(DEFAULT_CYPHER_SHELL_PATH),
            unknown_files: UnknownFilePolicy::default(),
            record_granularity: RecordGranularity::default(),
        }
    }
}

impl PlannerConfig {
    /// Create a configuration with the given base folder.
    pub fn new(base_folder: impl Into<PathBuf>) -> Self {
        Self {
            base_folder: base_folder.into(),
            ..Self::default()
        }
    }

    /// Load and validate a TOML configuration file.
    ///
    /// Relative base folders are resolved against the file's directory.
    pub fn load_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content =
            std::fs::read_to_string(path).map_err(|e| MigrationError::filesystem(path, e))?;
        let mut config = Self::from_toml_str(&content)?;
        if config.base_folder.is_relative() {
            if let Some(dir) = path.parent() {
                config.base_folder = dir.join(&config.base_folder);
            }
        }
        tracing::debug!(path = %path.display(), base_folder = %config.base_folder.display(), "configuration loaded");
        Ok(config)
    }

    /// Parse and validate TOML text.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let file: ConfigFile =
            toml::from_str(content).map_err(|e| MigrationError::Config(e.to_string()))?;
        file.planner.validate()?;
        Ok(file.planner)
    }

    /// Check that every dependency names a configured batch and that the
    /// initial batch is not empty.
    pub fn validate(&self) -> Result<()> {
        if self.initial_batch.is_empty() {
            return Err(MigrationError::Config("initial_batch cannot be empty".to_string()));
        }
        for (batch, config) in &self.batches {
            for dependency in &config.dependencies {
                if dependency == batch {
                    return Err(MigrationError::Config(format!(
                        "batch {batch} depends on itself"
                    )));
                }
                if !self.batches.contains_key(dependency) {
                    return Err(MigrationError::Config(format!(
                        "batch {batch} depends on unknown batch {dependency}"
                    )));
                }
            }
        }
        let planner = self.planner();
        for batch in self.batches.keys() {
            planner.resolve_batches(batch)?;
        }
        Ok(())
    }

    /// Set the base folder.
    pub fn with_base_folder(mut self, base_folder: impl Into<PathBuf>) -> Self {
        self.base_folder = base_folder.into();
        self
    }

    /// Set the initial batch.
    pub fn with_initial_batch(mut self, batch: impl Into<String>) -> Self {
        self.initial_batch = batch.into();
        self
    }

    /// Add a batch with its dependencies.
    pub fn with_batch<I, S>(mut self, batch: impl Into<String>, dependencies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.batches.insert(
            batch.into(),
            BatchConfig {
                dependencies: dependencies.into_iter().map(Into::into).collect(),
            },
        );
        self
    }

    /// Set the cypher-shell output format.
    pub fn with_cypher_shell_format(mut self, format: impl Into<String>) -> Self {
        self.cypher_shell_format = format.into();
        self
    }

    /// Set the cypher-shell executable.
    pub fn with_cypher_shell_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.cypher_shell_path = path.into();
        self
    }

    /// Set the unknown file policy.
    pub fn with_unknown_files(mut self, policy: UnknownFilePolicy) -> Self {
        self.unknown_files = policy;
        self
    }

    /// Set the record granularity.
    pub fn with_record_granularity(mut self, granularity: RecordGranularity) -> Self {
        self.record_granularity = granularity;
        self
    }

    /// Dependency lists per batch.
    pub fn dependencies(&self) -> BatchDependencies {
        self.batches
            .iter()
            .map(|(batch, config)| (batch.clone(), config.dependencies.clone()))
            .collect()
    }

    /// Planner using the configured dependencies.
    pub fn planner(&self) -> Planner {
        Planner::with_dependencies(self.dependencies())
    }

    /// Scanner for the base folder.
    pub fn scanner(&self) -> Scanner {
        Scanner::new(&self.base_folder).with_unknown_files(self.unknown_files)
    }
}
