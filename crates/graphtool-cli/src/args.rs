//! Command-line arguments.

use crate::formatter::OutputFormat;
use clap::{Args as ClapArgs, Parser, Subcommand};
use graphtool_core::{PlannerConfig, RecordGranularity, Result, TargetVersion, Version};
use std::path::{Path, PathBuf};

/// Configuration file read when `--config` is not given and it exists.
pub const DEFAULT_CONFIG_FILE: &str = "graph-tool.toml";

/// Default directory of the local version store.
pub const DEFAULT_STATE_DIR: &str = ".graph-tool";

/// Default database address.
pub const DEFAULT_ADDRESS: &str = "neo4j://localhost:7687";

/// Graph database migration tool
#[derive(Parser, Debug)]
#[command(name = "graph-tool")]
#[command(version, about = "Graph database migration tool")]
pub struct Args {
    #[command(flatten)]
    pub global: GlobalArgs,

    #[command(subcommand)]
    pub command: Command,
}

/// Options shared by every subcommand.
#[derive(ClapArgs, Debug)]
pub struct GlobalArgs {
    /// Configuration file
    #[arg(short = 'c', long, global = true)]
    pub config: Option<PathBuf>,

    /// Folder containing migration batches
    #[arg(long, global = true)]
    pub base_folder: Option<PathBuf>,

    /// Batch planned when the target names none
    #[arg(long, env = "NEO4J_INITIAL_BATCH", global = true)]
    pub initial_batch: Option<String>,

    /// When recorded versions are written
    #[arg(long, value_enum, global = true)]
    pub record: Option<RecordArg>,

    /// Directory of the local version store
    #[arg(long, default_value = DEFAULT_STATE_DIR, global = true)]
    pub state_dir: PathBuf,
}

/// Subcommands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Show the steps needed to reach a target version
    Plan(PlanArgs),
    /// Compute (or load) a plan and execute it
    Apply(ApplyArgs),
    /// Create an up/down migration pair
    Genmigration(GenerateArgs),
    /// Show recorded versions per batch
    Status(StatusArgs),
}

/// Target selection shared by `plan` and `apply`.
#[derive(ClapArgs, Debug, Clone)]
pub struct TargetArgs {
    /// Target version (`<revision>[+<part>]`); an omitted or zero revision means now
    #[arg(short = 't', long, env = "NEO4J_TARGET_VERSION")]
    pub target: Option<TargetVersion>,

    /// Batch to plan from instead of the initial batch
    #[arg(short = 'b', long)]
    pub batch: Option<String>,
}

impl TargetArgs {
    /// Resolve the target, substituting `now` for a missing revision.
    pub fn resolve(&self, now: u64) -> TargetVersion {
        let target = self
            .target
            .clone()
            .unwrap_or_else(|| TargetVersion::new(Version::new(0)))
            .fill_revision(now);
        match &self.batch {
            Some(batch) => target.with_batch(batch.clone()),
            None => target,
        }
    }
}

/// Database connection options.
#[derive(ClapArgs, Debug, Clone)]
pub struct ConnectionArgs {
    /// Database address passed to cypher-shell and commands
    #[arg(short = 'a', long, env = "NEO4J_HOST", default_value = DEFAULT_ADDRESS)]
    pub address: String,

    /// Database user
    #[arg(short = 'u', long, env = "NEO4J_USERNAME")]
    pub username: Option<String>,

    /// Database password
    #[arg(short = 'p', long, env = "NEO4J_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,
}

#[derive(ClapArgs, Debug)]
pub struct PlanArgs {
    #[command(flatten)]
    pub target: TargetArgs,

    /// Save the plan as JSON
    #[arg(short = 'o', long)]
    pub out: Option<PathBuf>,

    /// Output format
    #[arg(long, default_value = "text", value_enum)]
    pub format: OutputFormat,

    #[command(flatten)]
    pub connection: ConnectionArgs,
}

#[derive(ClapArgs, Debug)]
pub struct ApplyArgs {
    #[command(flatten)]
    pub target: TargetArgs,

    #[command(flatten)]
    pub connection: ConnectionArgs,

    /// Execute a plan saved by `plan --out` instead of computing one
    #[arg(long, conflicts_with_all = ["target", "batch"])]
    pub plan: Option<PathBuf>,

    /// Skip the confirmation prompt
    #[arg(short = 'f', long)]
    pub force_run: bool,
}

#[derive(ClapArgs, Debug)]
pub struct GenerateArgs {
    /// `[BATCH] <VERSION> <NAME>`; batch defaults to the initial batch
    #[arg(num_args = 2..=3, required = true, value_name = "ARGS")]
    pub args: Vec<String>,

    /// Generate the up migration as a command instead of a script
    #[arg(short = 'u', long)]
    pub up_cmd: bool,

    /// Generate the down migration as a command instead of a script
    #[arg(short = 'd', long)]
    pub down_cmd: bool,
}

impl GenerateArgs {
    /// Split positional arguments into batch, version and name.
    pub fn positional<'a>(&'a self, initial_batch: &'a str) -> Option<(&'a str, &'a str, &'a str)> {
        match self.args.as_slice() {
            [batch, version, name] => Some((batch, version, name)),
            [version, name] => Some((initial_batch, version, name)),
            _ => None,
        }
    }
}

#[derive(ClapArgs, Debug)]
pub struct StatusArgs {
    /// Output format
    #[arg(long, default_value = "text", value_enum)]
    pub format: OutputFormat,

    #[command(flatten)]
    pub connection: ConnectionArgs,
}

/// Record granularity flag values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum RecordArg {
    /// After every successful step
    PerStep,
    /// After every completed batch
    PerBatch,
}

impl From<RecordArg> for RecordGranularity {
    fn from(arg: RecordArg) -> Self {
        match arg {
            RecordArg::PerStep => RecordGranularity::PerStep,
            RecordArg::PerBatch => RecordGranularity::PerBatch,
        }
    }
}

/// Resolved configuration for a command.
#[derive(Debug, Clone)]
pub struct Context {
    pub config: PlannerConfig,
    pub state_dir: PathBuf,
}

impl GlobalArgs {
    /// Load the configuration file and apply flag overrides.
    pub fn into_context(self) -> Result<Context> {
        let mut config = match &self.config {
            Some(path) => PlannerConfig::load_file(path)?,
            None if Path::new(DEFAULT_CONFIG_FILE).is_file() => {
                PlannerConfig::load_file(DEFAULT_CONFIG_FILE)?
            }
            None => PlannerConfig::default(),
        };

        if let Some(base_folder) = self.base_folder {
            config = config.with_base_folder(base_folder);
        }
        if let Some(initial_batch) = self.initial_batch {
            config = config.with_initial_batch(initial_batch);
        }
        if let Some(record) = self.record {
            config = config.with_record_granularity(record.into());
        }
        config.validate()?;

        Ok(Context {
            config,
            state_dir: self.state_dir,
        })
    }
}
