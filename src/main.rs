//! spdedupe - find duplicate files in SharePoint and replace them with shortcuts.
//!
//! Usage:
//!   spdedupe serve [--config PATH] [--bind ADDR]   Run the HTTP service
//!   spdedupe scan <SITE_URL> [--format json]       One-shot duplicate report
//!   spdedupe --help                                Show help

mod api;
mod config;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use clap::{Args, Parser, Subcommand, ValueEnum};
use color_eyre::eyre::{Context, Result, eyre};
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::EnvFilter;

use spdedupe_core::{ScanReport, ScanStatus};
use spdedupe_graph::{ClientSecretCredential, CredentialProvider, GraphClient, StaticToken};
use spdedupe_scan::{ScanOrchestrator, ScanPhase};

use crate::config::AppConfig;

const DEFAULT_LOG_FILTER: &str = "warn,spdedupe=info,spdedupe_scan=info,spdedupe_ops=info";

#[derive(Parser)]
#[command(
    name = "spdedupe",
    version,
    about = "Find duplicate files across SharePoint document libraries",
    long_about = "spdedupe scans every document library of a SharePoint site for files \
                  with identical content hashes and can replace the extra copies with \
                  internet shortcuts to the one you keep.\n\n\
                  Run `spdedupe serve` for the HTTP API or `spdedupe scan URL` for a \
                  one-shot report."
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Args)]
struct ConnectionArgs {
    /// Config file (defaults to <config dir>/spdedupe/config.toml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Use a fixed bearer token instead of the client-credentials grant
    #[arg(long)]
    access_token: Option<String>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP service
    Serve {
        #[command(flatten)]
        connection: ConnectionArgs,

        /// Address to listen on (overrides the config file)
        #[arg(short, long)]
        bind: Option<String>,
    },

    /// Scan a site and print its duplicate groups
    Scan {
        /// Site URL, e.g. https://contoso.sharepoint.com/sites/team
        site_url: String,

        #[command(flatten)]
        connection: ConnectionArgs,

        /// Maximum number of duplicate groups to show
        #[arg(short = 'n', long, default_value = "20")]
        top: usize,

        /// Output format
        #[arg(short, long, default_value = "text")]
        format: OutputFormat,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum, Default)]
enum OutputFormat {
    #[default]
    Text,
    Json,
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    init_logging();

    let cli = Cli::parse();

    match cli.command {
        Command::Serve { connection, bind } => run_serve(connection, bind).await,
        Command::Scan {
            site_url,
            connection,
            top,
            format,
        } => run_scan(&site_url, connection, top, format).await,
    }
}

fn init_logging() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Build the Graph client from the config and CLI overrides.
fn connect(config: &AppConfig, access_token: Option<String>) -> Result<Arc<GraphClient>> {
    let credentials: Arc<dyn CredentialProvider> = match access_token {
        Some(token) => Arc::new(StaticToken::new(token)),
        None => {
            let (tenant_id, client_id, client_secret) = config.credentials()?;
            Arc::new(
                ClientSecretCredential::new(&config.graph, tenant_id, client_id, client_secret)
                    .context("Failed to set up credentials")?,
            )
        }
    };
    let client = GraphClient::new(&config.graph, credentials).context("Failed to set up client")?;
    Ok(Arc::new(client))
}

/// Cancel `token` on Ctrl-C.
fn cancel_on_ctrl_c(token: CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Shutting down");
            token.cancel();
        }
    });
}

async fn run_serve(connection: ConnectionArgs, bind: Option<String>) -> Result<()> {
    let mut config = AppConfig::load(connection.config.as_deref())?;
    if let Some(bind) = bind {
        config.server.bind = bind;
    }
    let addr: SocketAddr = config
        .server
        .bind
        .parse()
        .with_context(|| format!("Invalid bind address {}", config.server.bind))?;

    let client = connect(&config, connection.access_token)?;
    let shutdown = CancellationToken::new();
    cancel_on_ctrl_c(shutdown.clone());

    let state = api::AppState::new(client, config.scanner.clone(), shutdown.clone());
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to listen on {addr}"))?;
    info!(%addr, "Listening");

    axum::serve(listener, api::router(state))
        .with_graceful_shutdown(shutdown.cancelled_owned())
        .await
        .context("Server error")?;
    Ok(())
}

async fn run_scan(
    site_url: &str,
    connection: ConnectionArgs,
    top_n: usize,
    format: OutputFormat,
) -> Result<()> {
    let config = AppConfig::load(connection.config.as_deref())?;
    let client = connect(&config, connection.access_token)?;

    let cancel = CancellationToken::new();
    cancel_on_ctrl_c(cancel.clone());

    let orchestrator = ScanOrchestrator::new(
        client,
        Arc::new(spdedupe_core::ScanRegistry::new()),
        config.scanner.clone(),
    );

    eprintln!("Scanning {site_url}...");
    let mut progress_rx = orchestrator.subscribe();
    let progress = tokio::spawn(async move {
        while let Ok(progress) = progress_rx.recv().await {
            match progress.phase {
                ScanPhase::Enumerating => eprint!(
                    "\r {} files, {}/{} drives ({:.0} files/s)",
                    progress.files_scanned,
                    progress.drives_completed,
                    progress.drives_total,
                    progress.files_per_second()
                ),
                ScanPhase::Finished => {
                    eprintln!();
                    break;
                }
                ScanPhase::Resolving | ScanPhase::Grouping => {}
            }
        }
    });

    let report = orchestrator.scan_site(site_url, &cancel).await;
    let _ = progress.await;

    match format {
        OutputFormat::Text => print_report(&report, top_n),
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
    }

    match report.status {
        ScanStatus::Completed => Ok(()),
        _ => Err(eyre!(
            "Scan failed: {}",
            report.error_message.as_deref().unwrap_or("unknown error")
        )),
    }
}

fn print_report(report: &ScanReport, top_n: usize) {
    println!();
    println!("{}", "─".repeat(70));
    println!(" Duplicate File Report - {}", report.site_url);
    println!("{}", "─".repeat(70));
    println!();
    println!(" Scan {} ({:?})", report.scan_id, report.status);
    println!(" {} files scanned", report.total_files_scanned);

    if report.duplicate_groups.is_empty() {
        println!(" No duplicate files found.");
        return;
    }

    println!(
        " Found {} duplicate groups ({} files)",
        report.duplicate_groups.len(),
        report.duplicate_files_found
    );
    println!(" Total wasted space: {}", format_size(report.total_space_wasted));
    println!();

    for (i, group) in report.duplicate_groups.iter().take(top_n).enumerate() {
        println!(
            " Group {} ({} files, {} each, {} wasted, {} {})",
            i + 1,
            group.count(),
            format_size(group.file_size),
            format_size(group.total_wasted_space),
            group.hash_algorithm,
            group.hash
        );
        for file in &group.files {
            println!("   {}  [{}]", file.path, file.id);
        }
        println!();
    }

    let remaining = report.duplicate_groups.len().saturating_sub(top_n);
    if remaining > 0 {
        println!(" ... and {remaining} more groups");
    }
}

/// Format size in human-readable form.
fn format_size(bytes: u64) -> String {
    humansize::format_size(bytes, humansize::BINARY)
}
