//! CLI front-end for the knowledge hook engine

use anyhow::Context;
use clap::{Parser, Subcommand};
use knowhook::{EngineConfig, EvaluateOptions, HookOrchestrator};
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser)]
#[command(name = "knowhook", version, about = "Knowledge hook engine")]
struct Cli {
    /// Path to a TOML configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Override the hook graph directory
    #[arg(long, global = true, env = "ENGINE_GRAPH_DIR")]
    graph_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Evaluate all hooks and execute the triggered ones
    Evaluate {
        /// Evaluate predicates without executing workflows
        #[arg(long)]
        dry_run: bool,
    },
    /// List the hooks found in the graph directory
    ListHooks,
    /// Check that one hook parses cleanly
    ValidateHook {
        /// Hook IRI
        id: String,
    },
}

fn load_config(cli: &Cli) -> anyhow::Result<EngineConfig> {
    let mut config =
        EngineConfig::load(cli.config.as_deref()).context("failed to load configuration")?;
    if let Some(dir) = &cli.graph_dir {
        config.graph_dir = dir.clone();
    }
    Ok(config)
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            tracing::error!(error = %e, "fatal");
            eprintln!("error: {:#}", e);
            // Infrastructure failures exit 2, malformed input 3
            let code = e
                .downcast_ref::<knowhook::EngineError>()
                .map(|engine_err| engine_err.exit_code())
                .unwrap_or(2);
            ExitCode::from(code as u8)
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<ExitCode> {
    let config = load_config(&cli)?;
    let orchestrator = HookOrchestrator::new(config)?;

    match cli.command {
        Commands::Evaluate { dry_run } => {
            let result = orchestrator.evaluate(EvaluateOptions { dry_run }).await?;
            println!("{}", serde_json::to_string_pretty(&result)?);
            Ok(ExitCode::from(result.exit_code() as u8))
        }
        Commands::ListHooks => {
            let hooks = orchestrator.list_hooks()?;
            for hook in &hooks {
                println!(
                    "{}\t{}\t{}\t{} pipeline(s)",
                    hook.id,
                    hook.predicate.kind(),
                    hook.title,
                    hook.pipelines.len()
                );
            }
            if hooks.is_empty() {
                eprintln!("no hooks found");
            }
            Ok(ExitCode::SUCCESS)
        }
        Commands::ValidateHook { id } => match orchestrator.validate_hook(&id) {
            Ok(hook) => {
                println!("{}", serde_json::to_string_pretty(&hook)?);
                Ok(ExitCode::SUCCESS)
            }
            Err(e) => {
                eprintln!("invalid hook: {}", e);
                Ok(ExitCode::from(3))
            }
        },
    }
}
