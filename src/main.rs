mod config;
mod context;
mod error;
mod explorer;
mod format;
mod kctl;
mod manager;
mod model;
mod path_guard;
mod registry;
mod resolver;
mod supervisor;
mod tools;

use std::sync::Arc;

use clap::{Parser, Subcommand};
use rmcp::transport::stdio;
use rmcp::ServiceExt;
use tracing_subscriber::EnvFilter;

use config::Settings;
use context::AppContext;
use tools::BundleServer;

/// Serve a Kubernetes support-bundle as a read-only, tool-driven MCP analysis surface over stdio.
#[derive(Parser)]
#[command(name = "bundle-mcp")]
#[command(about = "MCP server exposing a Kubernetes support-bundle as a read-only analysis surface", long_about = None)]
struct Cli {
    /// Override the bundle-storage directory (defaults to MCP_BUNDLE_STORAGE or a temp dir).
    #[arg(long, global = true)]
    bundle_storage: Option<std::path::PathBuf>,

    /// Enable verbose debug logging on stderr.
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Start the MCP stdio server (the default when no subcommand is given).
    Serve,
    /// Print the bundles found in the bundle-storage directory as a human-readable table.
    /// Does not go through the MCP protocol; for operator debugging outside an agent session.
    ListBundles,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut settings = Settings::from_env();
    if let Some(dir) = cli.bundle_storage {
        settings.bundle_storage = dir;
    }

    setup_tracing(&settings, cli.verbose);

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => run_server(settings).await,
        Command::ListBundles => {
            print_bundle_table(&settings);
            Ok(())
        }
    }
}

async fn run_server(settings: Settings) -> anyhow::Result<()> {
    let ctx = Arc::new(AppContext::new(settings));
    let server = BundleServer::new(ctx.clone());

    let service = server
        .serve(stdio())
        .await
        .map_err(|e| anyhow::anyhow!("MCP serve error: {e}"))?;

    let result = service.waiting().await;

    ctx.shutdown().await;

    result.map_err(|e| anyhow::anyhow!("MCP runtime error: {e}"))?;
    Ok(())
}

/// `list-bundles`: a thin wrapper over the same Bundle Registry scan `list_available_bundles`
/// uses, printed as a table rather than formatted by the response formatter.
fn print_bundle_table(settings: &Settings) {
    match registry::scan(&settings.bundle_storage) {
        Ok(entries) if entries.is_empty() => {
            println!("no bundles found in {}", settings.bundle_storage.display());
        }
        Ok(entries) => {
            println!("{:<60} {:>12} {:<8} REASON", "PATH", "SIZE", "VALID");
            for entry in entries {
                let size = entry.size_bytes.to_string();
                let valid = if entry.valid { "yes" } else { "no" };
                let reason = entry.invalid_reason.as_deref().unwrap_or("");
                println!(
                    "{:<60} {:>12} {:<8} {}",
                    entry.path.display(),
                    size,
                    valid,
                    reason
                );
            }
        }
        Err(e) => eprintln!("failed to scan bundle storage: {e}"),
    }
}

fn setup_tracing(settings: &Settings, verbose: bool) {
    let default_filter = if verbose {
        "debug".to_string()
    } else {
        settings.log_filter()
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(true)
        .init();
}
