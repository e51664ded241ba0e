//! Subcommand handlers.

use crate::args::{ApplyArgs, Context, GenerateArgs, PlanArgs, StatusArgs, TargetArgs};
use crate::formatter::{self, OutputFormat};
use graphtool_core::{
    ArtifactKind, CancellationToken, ExecutionSteps, Executor, MigrationError, Planner,
    ShellRunner, SledVersionStore, TargetVersion, VersionStore,
};
use std::io::{BufRead, Write};
use std::path::Path;

type CommandResult = Result<(), Box<dyn std::error::Error + Send + Sync>>;

/// Current Unix time in seconds, used for omitted revisions.
fn now() -> u64 {
    u64::try_from(chrono::Utc::now().timestamp()).unwrap_or_default()
}

fn open_db(state_dir: &Path) -> graphtool_core::Result<sled::Db> {
    sled::open(state_dir).map_err(|e| {
        MigrationError::DatabaseRead(format!("cannot open {}: {e}", state_dir.display()))
    })
}

/// Versions recorded for the database at `address`.
fn open_store(state_dir: &Path, address: &str) -> graphtool_core::Result<SledVersionStore> {
    SledVersionStore::open_scoped(&open_db(state_dir)?, address)
}

fn compute_plan(
    context: &Context,
    store: &SledVersionStore,
    target: &TargetArgs,
) -> graphtool_core::Result<ExecutionSteps> {
    let target: TargetVersion = target.resolve(now());
    let inventory = context.config.scanner().scan()?;
    let current = store.read_versions()?;
    let planner: Planner = context.config.planner();
    planner.plan(&inventory, &current, &target, &context.config.initial_batch)
}

/// `plan`: print the steps to reach the target, optionally saving them.
pub fn plan(context: &Context, args: PlanArgs) -> CommandResult {
    let store = open_store(&context.state_dir, &args.connection.address)?;
    let steps = compute_plan(context, &store, &args.target)?;

    if let Some(out) = &args.out {
        std::fs::write(out, steps.to_json()?)
            .map_err(|e| MigrationError::Filesystem {
                path: out.clone(),
                source: e,
            })?;
        tracing::info!(path = %out.display(), steps = steps.len(), "plan saved");
    }

    println!("{}", formatter::format_plan(&steps, args.format)?);
    Ok(())
}

/// `apply`: compute or load a plan, confirm, then execute it.
pub fn apply(context: &Context, args: ApplyArgs, cancel: CancellationToken) -> CommandResult {
    let store = open_store(&context.state_dir, &args.connection.address)?;
    let steps = match &args.plan {
        Some(path) => {
            let json = std::fs::read_to_string(path).map_err(|e| MigrationError::Filesystem {
                path: path.clone(),
                source: e,
            })?;
            ExecutionSteps::from_json(&json)?
        }
        None => compute_plan(context, &store, &args.target)?,
    };

    println!("{}", formatter::format_plan(&steps, OutputFormat::Text)?);
    if steps.is_empty() {
        return Ok(());
    }

    if !args.force_run && !confirm(steps.len())? {
        println!("Aborted");
        return Ok(());
    }

    let runner = ShellRunner::new(&context.config, &args.connection.address)
        .with_credentials(args.connection.username, args.connection.password);
    let report = Executor::new(runner, &store)
        .with_granularity(context.config.record_granularity)
        .with_cancellation(cancel)
        .execute(&steps)?;

    println!(
        "Applied {} step(s), skipped {} no-op step(s)",
        report.executed, report.skipped
    );
    Ok(())
}

/// Ask for confirmation; only `yes` proceeds.
fn confirm(count: usize) -> std::io::Result<bool> {
    print!("Apply {count} step(s)? Type 'yes' to continue: ");
    std::io::stdout().flush()?;
    let mut answer = String::new();
    std::io::stdin().lock().read_line(&mut answer)?;
    Ok(answer.trim() == "yes")
}

/// `genmigration`: create an up/down artifact pair.
pub fn genmigration(context: &Context, args: GenerateArgs) -> CommandResult {
    let (batch, version, name) = args
        .positional(&context.config.initial_batch)
        .ok_or("expected [BATCH] <VERSION> <NAME>")?;
    let version = version.parse::<TargetVersion>()?.fill_revision(now()).version;

    let kind = |command: bool| {
        if command {
            ArtifactKind::Command
        } else {
            ArtifactKind::Script
        }
    };
    let paths = context.config.scanner().generate(
        batch,
        &version,
        name,
        kind(args.up_cmd),
        kind(args.down_cmd),
    )?;

    for path in paths {
        println!("{}", path.display());
    }
    Ok(())
}

/// `status`: show recorded and available versions per batch.
pub fn status(context: &Context, args: StatusArgs) -> CommandResult {
    let store = open_store(&context.state_dir, &args.connection.address)?;
    let inventory = context.config.scanner().scan()?;
    let model = store.read_versions()?;
    let rows = formatter::status_rows(&inventory, &model);
    println!("{}", formatter::format_status(&rows, args.format)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::args::{ConnectionArgs, DEFAULT_ADDRESS};
    use graphtool_core::{PlannerConfig, Version};
    use std::path::PathBuf;

    fn context(root: &Path) -> Context {
        Context {
            config: PlannerConfig::new(root.join("import")),
            state_dir: root.join("state"),
        }
    }

    fn connection(address: &str) -> ConnectionArgs {
        ConnectionArgs {
            address: address.to_string(),
            username: None,
            password: None,
        }
    }

    fn target(rev: u64) -> TargetArgs {
        TargetArgs {
            target: Some(TargetVersion::new(Version::new(rev))),
            batch: None,
        }
    }

    #[test]
    fn test_genmigration_then_plan() {
        let dir = tempfile::tempdir().unwrap();
        let context = context(dir.path());

        genmigration(
            &context,
            GenerateArgs {
                args: vec!["100".into(), "init".into()],
                up_cmd: false,
                down_cmd: true,
            },
        )
        .unwrap();
        let batch_dir = dir.path().join("import").join("schema");
        assert!(batch_dir.join("0000000100_init.up.cypher").is_file());
        assert!(batch_dir.join("0000000100_init.down.run").is_file());

        let store = open_store(&context.state_dir, DEFAULT_ADDRESS).unwrap();
        let steps = compute_plan(&context, &store, &target(100)).unwrap();
        assert_eq!(steps.len(), 1);
        assert_eq!(steps.as_slice()[0].version, Version::new(100));
    }

    #[test]
    fn test_plan_saves_json() {
        let dir = tempfile::tempdir().unwrap();
        let context = context(dir.path());
        context
            .config
            .scanner()
            .generate(
                "schema",
                &Version::new(100),
                "init",
                ArtifactKind::Script,
                ArtifactKind::Script,
            )
            .unwrap();

        let out: PathBuf = dir.path().join("plan.json");
        plan(
            &context,
            PlanArgs {
                target: target(100),
                out: Some(out.clone()),
                format: OutputFormat::Text,
                connection: connection(DEFAULT_ADDRESS),
            },
        )
        .unwrap();

        let saved = ExecutionSteps::from_json(&std::fs::read_to_string(out).unwrap()).unwrap();
        assert_eq!(saved.len(), 1);
    }

    #[test]
    fn test_addresses_keep_independent_versions() {
        let dir = tempfile::tempdir().unwrap();
        let context = context(dir.path());
        for (rev, name) in [(100, "one"), (200, "two")] {
            context
                .config
                .scanner()
                .generate(
                    "schema",
                    &Version::new(rev),
                    name,
                    ArtifactKind::Script,
                    ArtifactKind::Script,
                )
                .unwrap();
        }

        let db = open_db(&context.state_dir).unwrap();
        let staging = SledVersionStore::open_scoped(&db, "neo4j://staging:7687").unwrap();
        let prod = SledVersionStore::open_scoped(&db, "neo4j://prod:7687").unwrap();
        staging.write_version("schema", &Version::new(200)).unwrap();

        assert!(compute_plan(&context, &staging, &target(200))
            .unwrap()
            .is_empty());
        let steps = compute_plan(&context, &prod, &target(200)).unwrap();
        assert_eq!(steps.len(), 2);
        assert!(prod.read_versions().unwrap().get("schema").is_none());
    }

    #[test]
    fn test_genmigration_rejects_bad_version() {
        let dir = tempfile::tempdir().unwrap();
        let err = genmigration(
            &context(dir.path()),
            GenerateArgs {
                args: vec!["abc".into(), "init".into()],
                up_cmd: false,
                down_cmd: false,
            },
        )
        .unwrap_err();
        assert!(err.to_string().contains("invalid version format"));
    }
}
