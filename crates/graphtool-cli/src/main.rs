//! Graph Tool Command-Line Client
//!
//! Plans, applies and generates versioned graph database migrations.

mod args;
mod commands;
mod formatter;

use args::{Args, Command};
use clap::Parser;
use graphtool_core::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "graphtool_cli=info,graphtool_core=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let args = Args::parse();

    let cancel = CancellationToken::new();
    spawn_interrupt_handler(cancel.clone());

    let result = tokio::task::spawn_blocking(move || run(args, cancel)).await;

    match result {
        Ok(Ok(())) => {}
        Ok(Err(e)) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    }
}

/// First Ctrl-C stops the run after the current step; the second exits.
fn spawn_interrupt_handler(cancel: CancellationToken) {
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for ctrl+c");
            return;
        }
        tracing::warn!("interrupt received, stopping after the current step");
        cancel.cancel();

        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("second interrupt received, exiting");
            std::process::exit(130);
        }
    });
}

fn run(args: Args, cancel: CancellationToken) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let context = args.global.into_context()?;
    tracing::debug!(
        base_folder = %context.config.base_folder.display(),
        initial_batch = %context.config.initial_batch,
        state_dir = %context.state_dir.display(),
        "configuration loaded"
    );

    match args.command {
        Command::Plan(plan) => commands::plan(&context, plan),
        Command::Apply(apply) => commands::apply(&context, apply, cancel),
        Command::Genmigration(generate) => commands::genmigration(&context, generate),
        Command::Status(status) => commands::status(&context, status),
    }
}
