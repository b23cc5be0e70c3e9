//! Scanforge CLI - run and observe scan tasks from the command line.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use scanforge_core::{summarize_by_severity, ScanOptions, TaskState};
use scanforge_engine::{DirTemplateStore, Scheduler, Settings};

/// Scanforge - concurrent scan-task orchestration
#[derive(Parser)]
#[command(name = "scanforge")]
#[command(about = "Run an external vulnerability scanner against targets and templates", long_about = None)]
struct Cli {
    /// Settings file (defaults to the per-user config path)
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Launch a scan and wait for it to finish
    Scan {
        /// Label for the task
        #[arg(long, default_value = "scan")]
        name: String,

        /// Target to scan (repeatable)
        #[arg(short, long = "target", required = true)]
        targets: Vec<String>,

        /// Template id to run (repeatable)
        #[arg(short = 'T', long = "template", required = true)]
        templates: Vec<String>,

        /// Requests-per-second cap
        #[arg(long)]
        rate_limit: Option<u32>,

        /// In-scanner template concurrency
        #[arg(long)]
        concurrency: Option<u32>,

        /// Severity filter (info, low, medium, high, critical)
        #[arg(long)]
        severity: Option<String>,

        /// Proxy URL (http, https or socks5)
        #[arg(long)]
        proxy: Option<String>,

        /// DNS-callback (interactsh) server address
        #[arg(long)]
        interactsh_url: Option<String>,

        /// Scanner-side output file
        #[arg(long)]
        output: Option<PathBuf>,
    },

    /// List template ids available in the template directory
    Templates,

    /// Print the effective settings as JSON
    Config,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let cli = Cli::parse();

    let settings_path = cli.config.unwrap_or_else(Settings::default_path);
    let settings = Settings::load(&settings_path)?;

    match cli.command {
        Commands::Scan {
            name,
            targets,
            templates,
            rate_limit,
            concurrency,
            severity,
            proxy,
            interactsh_url,
            output,
        } => {
            let options = ScanOptions {
                rate_limit,
                concurrency,
                severity,
                proxy,
                interactsh_url,
                output_path: output,
            };
            run_scan(settings, name, targets, templates, options).await?;
        }
        Commands::Templates => {
            let store = DirTemplateStore::new(settings.templates_dir.clone());
            for id in store.list() {
                println!("{}", id);
            }
        }
        Commands::Config => {
            println!("{}", serde_json::to_string_pretty(&settings)?);
        }
    }

    Ok(())
}

async fn run_scan(
    settings: Settings,
    name: String,
    targets: Vec<String>,
    templates: Vec<String>,
    options: ScanOptions,
) -> Result<(), Box<dyn std::error::Error>> {
    let store = Arc::new(DirTemplateStore::new(settings.templates_dir.clone()));
    let scheduler = Scheduler::new(settings, store);

    let mut events = scheduler.subscribe();
    let task_id = scheduler
        .create_task(name, targets, templates, options)
        .await?;
    info!(task_id = %task_id, "scan task created");

    // Follow state transitions until the task is terminal; snapshots stay
    // authoritative if the event stream lags.
    let final_state = loop {
        match events.recv().await {
            Ok(event) if event.task_id == task_id => {
                info!(state = %event.state, "task transitioned");
                if event.state.is_terminal() {
                    break event.state;
                }
            }
            Ok(_) => {}
            Err(_) => {
                let snap = scheduler.get(&task_id).await?;
                if snap.state.is_terminal() {
                    break snap.state;
                }
            }
        }
    };

    let snapshot = scheduler.get(&task_id).await?;
    let findings = scheduler.findings(&task_id).await?;

    println!(
        "{} - {} finding(s), {} line(s) read, {} malformed, {} ms",
        snapshot.state,
        snapshot.result_count,
        snapshot.lines_processed,
        snapshot.malformed_lines,
        snapshot.elapsed_ms.unwrap_or(0),
    );
    for (severity, count) in summarize_by_severity(&findings) {
        println!("  {}: {}", severity, count);
    }
    for finding in &findings {
        println!("  [{}] {} at {}", finding.severity, finding.template_id, finding.matched_at);
    }

    if final_state == TaskState::Failed {
        if let Some(error) = &snapshot.last_error {
            eprintln!("scan failed: {}", error);
        }
        std::process::exit(1);
    }

    Ok(())
}
