use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use cloudsecmonitor::config::{CloudSecConfig, LogFormat, LoggingConfig};
use cloudsecmonitor::detect::alert::AlertSink;
use cloudsecmonitor::detect::incident::{IncidentRecorder, StatusChange};
use cloudsecmonitor::detect::IncidentStatus;
use cloudsecmonitor::events::generator;
use cloudsecmonitor::monitor::CycleReport;
use cloudsecmonitor::storage::{stats, SharedStore};
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

#[derive(Parser)]
#[command(
    name = "cloudsecmonitor",
    about = "Security log monitor: brute-force and port-scan detection with deduplicated incidents",
    version,
    long_about = None
)]
struct Cli {
    /// Configuration file (defaults: $CLOUDSEC_CONFIG, ./cloudsec.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run detection continuously until interrupted
    Monitor {
        /// Seconds between cycles (overrides monitor.interval_secs)
        #[arg(long)]
        interval: Option<u64>,
    },

    /// Run a single detection cycle now
    Analyze {
        /// JSON output for machine parsing
        #[arg(long)]
        json: bool,
    },

    /// Write synthetic security events
    Simulate {
        #[command(subcommand)]
        action: SimulateAction,
    },

    /// Inspect and manage incidents
    Incidents {
        #[command(subcommand)]
        action: IncidentAction,
    },

    /// Show event and incident statistics
    Stats {
        /// JSON output for machine parsing
        #[arg(long)]
        json: bool,
    },

    /// Serve the read-only dashboard API
    Serve {
        /// Bind address (overrides api.bind)
        #[arg(long)]
        bind: Option<String>,
    },
}

#[derive(Subcommand)]
enum SimulateAction {
    /// A random mix of SSH, port-scan and file-access events
    Generate {
        #[arg(long, default_value = "100")]
        count: usize,
    },

    /// Failed SSH logins from a single attacker
    BruteForce {
        #[arg(long, default_value = "10")]
        attempts: usize,
    },

    /// Detected port scans from a single scanner
    PortScan {
        #[arg(long, default_value = "3")]
        scans: usize,
    },
}

#[derive(Subcommand)]
enum IncidentAction {
    /// List the most recent incidents
    List {
        #[arg(long, default_value = "10")]
        limit: usize,
    },

    /// Incident counts by severity and status
    Stats,

    /// Show one incident
    Show {
        id: i64,
    },

    /// Change an incident's status
    Update {
        id: i64,

        /// new, in-progress or resolved
        #[arg(long)]
        status: IncidentStatus,

        /// Who resolved it (required with --status resolved)
        #[arg(long)]
        resolved_by: Option<String>,

        /// Resolution notes (required with --status resolved)
        #[arg(long)]
        notes: Option<String>,
    },
}

fn init_tracing(logging: &LoggingConfig) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&logging.level));

    match logging.format {
        LogFormat::Pretty => tracing_subscriber::fmt().with_env_filter(filter).init(),
        LogFormat::Json => tracing_subscriber::fmt().json().with_env_filter(filter).init(),
    }
}

/// Cancelled on Ctrl-C.
fn shutdown_on_ctrl_c() -> CancellationToken {
    let token = CancellationToken::new();
    let trigger = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Interrupt received, shutting down");
        }
        trigger.cancel();
    });
    token
}

fn print_report(report: &CycleReport) {
    println!("\n=== Analysis {} ===", report.cycle_id);
    println!("{:<18} | {:<10} | {:<7} | {:<10} | {:<6} | Error", "Rule", "Candidates", "Created", "Suppressed", "Failed");
    println!("{:-<18}-|-{:-<10}-|-{:-<7}-|-{:-<10}-|-{:-<6}-|-{:-<20}", "", "", "", "", "", "");
    for r in &report.rules {
        println!(
            "{:<18} | {:<10} | {:<7} | {:<10} | {:<6} | {}",
            r.rule.to_string(),
            r.candidates,
            r.created.len(),
            r.suppressed,
            r.failed,
            r.error.as_deref().unwrap_or("-")
        );
    }
    println!("{} new incident(s) recorded\n", report.incidents_created());
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let mut config = CloudSecConfig::resolve(cli.config.as_deref())?;
    init_tracing(&config.logging);

    match cli.command {
        Commands::Monitor { interval } => {
            if let Some(secs) = interval {
                config.monitor.interval_secs = secs;
                config.validate()?;
            }
            tracing::info!(interval_secs = config.monitor.interval_secs, "Starting continuous monitoring");
            let shutdown = shutdown_on_ctrl_c();
            cloudsecmonitor::run_monitor(&config, shutdown).await?;
        }
        Commands::Analyze { json } => {
            let report = tokio::task::spawn_blocking(move || cloudsecmonitor::analyze_once(&config)).await??;
            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                print_report(&report);
            }
        }
        Commands::Simulate { action } => {
            let store = cloudsecmonitor::open_store(&config)?;
            match action {
                SimulateAction::Generate { count } => {
                    let written = generator::generate(&store, count)?;
                    println!("{} events written.", written);
                }
                SimulateAction::BruteForce { attempts } => {
                    let ids = generator::simulate_brute_force(&store, attempts)?;
                    println!("{} failed SSH logins written from {}.", ids.len(), generator::BRUTE_FORCE_ADDR);
                }
                SimulateAction::PortScan { scans } => {
                    let ids = generator::simulate_port_scan(&store, scans)?;
                    println!("{} port scans written from {}.", ids.len(), generator::PORT_SCAN_ADDR);
                }
            }
        }
        Commands::Incidents { action } => {
            let store = cloudsecmonitor::open_store(&config)?;
            match action {
                IncidentAction::List { limit } => {
                    let incidents = store.recent_incidents(limit)?;
                    if incidents.is_empty() {
                        println!("No incidents recorded.");
                    } else {
                        println!("{:<6} | {:<20} | {:<8} | {:<11} | {:<12} | {:<15} | Detected", "ID", "Type", "Severity", "Status", "Server", "Source");
                        println!("{:-<6}-|-{:-<20}-|-{:-<8}-|-{:-<11}-|-{:-<12}-|-{:-<15}-|-{:-<20}", "", "", "", "", "", "", "");
                        for v in incidents {
                            let i = &v.incident;
                            println!(
                                "{:<6} | {:<20} | {:<8} | {:<11} | {:<12} | {:<15} | {}",
                                i.id,
                                i.incident_type,
                                i.severity.as_str(),
                                i.status.as_str(),
                                v.server_name,
                                v.source_addr,
                                i.detected_at.format("%Y-%m-%d %H:%M:%S")
                            );
                        }
                    }
                }
                IncidentAction::Stats => {
                    let breakdown = stats::incident_breakdown(store.pool())?;
                    if breakdown.is_empty() {
                        println!("No incidents recorded.");
                    }
                    for row in breakdown {
                        println!("{:<8} - {:<11}: {}", row.severity, row.status, row.count);
                    }
                }
                IncidentAction::Show { id } => match store.get_incident(id)? {
                    Some(incident) => println!("{}", serde_json::to_string_pretty(&incident)?),
                    None => bail!("Incident #{} not found", id),
                },
                IncidentAction::Update { id, status, resolved_by, notes } => {
                    let change = StatusChange::from_parts(status, resolved_by, notes)?;
                    let sink: Arc<dyn AlertSink> = config.alerts.sink.build();
                    let shared: SharedStore = Arc::new(store);
                    let recorder = IncidentRecorder::new(shared, sink);
                    if !recorder.update_status(id, &change) {
                        bail!("Failed to update incident #{}", id);
                    }
                    println!("Incident #{} updated: {}", id, change.status());
                }
            }
        }
        Commands::Stats { json } => {
            let store = cloudsecmonitor::open_store(&config)?;
            let pool = store.pool();
            let global = stats::global_stats(pool)?;
            let by_type = stats::events_by_type(pool)?;
            let top = stats::top_failing_sources(pool, 10)?;

            if json {
                let out = serde_json::json!({ "global": global, "events_by_type": by_type, "top_failing_sources": top });
                println!("{}", serde_json::to_string_pretty(&out)?);
            } else {
                println!("\n=== CloudSecMonitor Statistics ===");
                println!("Total events:            {}", global.total_events);
                println!("Open critical incidents: {}", global.open_critical_incidents);
                println!("Failing sources:         {}", global.failing_sources);
                println!("Total incidents:         {}", global.total_incidents);
                println!("\nEvents by type:");
                for row in by_type {
                    println!(" - {:<12} {}", row.label, row.count);
                }
                println!("\nTop failing sources:");
                for row in top {
                    println!(" - {:<16} {}", row.label, row.count);
                }
                println!();
            }
        }
        Commands::Serve { bind } => {
            if let Some(bind) = bind {
                config.api.bind = bind;
            }
            let shutdown = shutdown_on_ctrl_c();
            cloudsecmonitor::serve(&config, shutdown).await?;
        }
    }

    Ok(())
}
