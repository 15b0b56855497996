//! `forge` - manager wrapper around the release pipeline.
//!
//! Each invocation is a separate process over the same state directory,
//! so `activate` here stands in for the next start of the host process.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use clap::{Parser, Subcommand};
use forge_core::app::{ActivationOutcome, ForgeBuilder, ForgeConfig, ForgeRuntime, ReleaseOutcome};
use forge_core::domain::HostManifest;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "forge")]
#[command(about = "Release, activate and roll back hot patches")]
struct Args {
    /// Config file (TOML); missing means defaults
    #[arg(short, long, value_name = "PATH", default_value = "forge.toml")]
    config: PathBuf,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Validate, install and record an artifact as the next version
    Release {
        artifact: PathBuf,
    },
    /// Activate the current version, as the next process start would
    Activate,
    /// Swap current and previous
    Rollback,
    /// Delete the previous version's files
    Clean,
    /// Keep only the most recently installed versions
    Prune {
        #[arg(long)]
        keep: Option<usize>,
    },
    /// Forget every patch and delete all version files
    Reset,
    /// Show version state
    Status {
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let args = Args::parse();
    setup_tracing(args.verbose);

    let config = ForgeConfig::load(&args.config)?;
    let host = HostManifest::from_path(&config.host_manifest)
        .with_context(|| format!("loading host descriptor {}", config.host_manifest.display()))?;
    let keep_default = config.keep_versions;
    let forge = ForgeBuilder::new(config, host).build()?;

    let ok = run(&forge, args.command, keep_default).await?;
    Ok(if ok { ExitCode::SUCCESS } else { ExitCode::FAILURE })
}

async fn run(forge: &ForgeRuntime, command: Command, keep_default: usize) -> anyhow::Result<bool> {
    let pipeline = forge.pipeline();
    let ok = match command {
        Command::Release { artifact } => {
            match pipeline.release(&artifact).await? {
                ReleaseOutcome::Released(v) => println!("released {} ({})", v.id, v.code),
                ReleaseOutcome::AlreadyCurrent(v) => println!("{} ({}) is already current", v.id, v.code),
            }
            true
        }
        Command::Activate => match forge.activate() {
            Ok(ActivationOutcome::Base) => {
                println!("no patch current, running base");
                true
            }
            Ok(ActivationOutcome::Patch(v)) => {
                println!("activated {} ({})", v.id, v.code);
                true
            }
            Err(e) => {
                eprintln!("activation failed, reverted to previous: {e}");
                false
            }
        },
        Command::Rollback => report(pipeline.rollback().await, "rolled back", "nothing to roll back"),
        Command::Clean => report(
            pipeline.clean_previous().await,
            "previous version cleaned",
            "nothing to clean",
        ),
        Command::Prune { keep } => {
            let removed = pipeline.prune(keep.unwrap_or(keep_default)).await;
            for id in &removed {
                println!("removed {id}");
            }
            true
        }
        Command::Reset => report(pipeline.reset().await, "all patches removed", "reset failed"),
        Command::Status { json } => {
            let view = pipeline.query_version_state();
            if json {
                println!("{}", serde_json::to_string_pretty(&view)?);
            } else {
                println!("base:            {}", view.base);
                println!("runtime:         {}", view.runtime);
                println!("pending next:    {}", view.pending_next);
                println!("can rollback:    {}", view.can_rollback);
                println!("pending restart: {}", view.pending_restart);
            }
            true
        }
    };
    info!(state = %pipeline.state(), "done");
    Ok(ok)
}

fn report(ok: bool, done: &str, skipped: &str) -> bool {
    println!("{}", if ok { done } else { skipped });
    ok
}

fn setup_tracing(verbose: bool) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if verbose {
            EnvFilter::new("forge_core=debug,forge=debug,info")
        } else {
            EnvFilter::new("info")
        }
    });
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}
