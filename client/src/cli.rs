use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use common::{
    ApiError, ReplayAccepted, ReplayCreateRequest, ReplayPlan, ReplayRecord, WorkerPoolMetrics,
};
use reqwest::{Client, Response};
use std::env;

/// - En Docker: MASTER_URL=http://master:8080
/// - Local: default http://localhost:8080
fn master_base_url() -> String {
    env::var("MASTER_URL").unwrap_or_else(|_| "http://localhost:8080".to_string())
}

#[derive(Parser)]
#[command(name = "client")]
#[command(about = "CLI para pedir y consultar replays en el master")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Pide re-ejecutar un job (y sus dependientes) en un rango de fechas
    Replay {
        #[arg(value_name = "JOB")]
        job: String,
        /// Fecha inicial inclusive (YYYY-MM-DD)
        #[arg(long)]
        start: NaiveDate,
        /// Fecha final inclusive (YYYY-MM-DD)
        #[arg(long)]
        end: NaiveDate,
    },
    /// Muestra qué se re-ejecutaría, sin registrar nada
    Plan {
        #[arg(value_name = "JOB")]
        job: String,
        #[arg(long)]
        start: NaiveDate,
        #[arg(long)]
        end: NaiveDate,
    },
    /// Consulta el estado de un replay
    Status {
        #[arg(value_name = "REPLAY_ID")]
        id: String,
    },
    /// Lista replays, opcionalmente filtrados por estado
    List {
        /// ACCEPTED, IN_PROGRESS, SUCCESS o FAILED
        #[arg(long)]
        status: Option<String>,
    },
    /// Métricas del pool de workers de replay
    Workers,
}

/// Convierte una respuesta con error en un mensaje legible.
async fn describe_error(resp: Response) -> String {
    let status = resp.status();
    match resp.json::<ApiError>().await {
        Ok(err) => format!("{} ({}): {}", status, err.kind, err.message),
        Err(_) => format!("status {}", status),
    }
}

fn print_record(record: &ReplayRecord) {
    println!("Replay {}", record.id);
    println!("  job    : {}", record.job_name);
    println!("  rango  : {} → {}", record.start_date, record.end_date);
    println!("  estado : {}", record.status);
    if let Some(ref msg) = record.message {
        println!("  detalle: {}", msg);
    }
    println!("  creado : {}", record.created_at);
    println!("  update : {}", record.updated_at);
}

pub async fn run() -> Result<()> {
    let cli = Cli::parse();
    let client = Client::new();
    let base_url = master_base_url();

    match cli.command {
        Commands::Replay { job, start, end } => {
            let url = format!("{}/api/v1/replays", base_url);
            let resp = client
                .post(&url)
                .json(&ReplayCreateRequest {
                    job_name: job.clone(),
                    start_date: start,
                    end_date: end,
                })
                .send()
                .await
                .with_context(|| format!("no se pudo contactar al master en {base_url}"))?;

            if resp.status().is_success() {
                let accepted: ReplayAccepted = resp.json().await?;
                println!("Replay aceptado:");
                println!("  id   : {}", accepted.id);
                println!("  job  : {}", job);
                println!("  rango: {} → {}", start, end);
            } else {
                println!("Replay rechazado: {}", describe_error(resp).await);
            }
        }

        Commands::Plan { job, start, end } => {
            let url = format!("{}/api/v1/replays/plan", base_url);
            let resp = client
                .post(&url)
                .json(&ReplayCreateRequest {
                    job_name: job,
                    start_date: start,
                    end_date: end,
                })
                .send()
                .await?;

            if resp.status().is_success() {
                let plan: ReplayPlan = resp.json().await?;
                println!(
                    "Plan de replay para {} ({} → {}): {} corridas",
                    plan.job_name, plan.start_date, plan.end_date, plan.total_runs
                );
                for node in plan.tree.walk_order() {
                    println!("  - {} ({} corridas)", node.name, node.runs.len());
                    if let (Some(first), Some(last)) = (node.runs.first(), node.runs.last()) {
                        println!("      {} … {}", first, last);
                    }
                }
            } else {
                println!("No se pudo armar el plan: {}", describe_error(resp).await);
            }
        }

        Commands::Status { id } => {
            let url = format!("{}/api/v1/replays/{}", base_url, id);
            let resp = client.get(&url).send().await?;
            if resp.status().is_success() {
                let record: ReplayRecord = resp.json().await?;
                print_record(&record);
            } else {
                println!("Error: {}", describe_error(resp).await);
            }
        }

        Commands::List { status } => {
            let url = format!("{}/api/v1/replays", base_url);
            let mut req = client.get(&url);
            if let Some(ref s) = status {
                req = req.query(&[("status", s)]);
            }
            let resp = req.send().await?;

            if resp.status().is_success() {
                let records: Vec<ReplayRecord> = resp.json().await?;
                if records.is_empty() {
                    println!("No hay replays.");
                }
                for r in records {
                    print_record(&r);
                    println!();
                }
            } else {
                println!("Error: {}", describe_error(resp).await);
            }
        }

        Commands::Workers => {
            let url = format!("{}/api/v1/replays/workers", base_url);
            let resp = client.get(&url).send().await?;
            if resp.status().is_success() {
                let m: WorkerPoolMetrics = resp.json().await?;
                println!("Pool de replay");
                println!("  workers        : {} ({} libres)", m.num_workers, m.idle_workers);
                println!("  cola           : {}/{}", m.queued, m.queue_capacity);
                println!(
                    "  replays        : started={}, ok={}, failed={}, timeout={}",
                    m.replays_started, m.replays_succeeded, m.replays_failed, m.replays_timed_out
                );
                if let Some(avg) = m.avg_process_ms {
                    println!("  avg_process_ms : {:.1}", avg);
                } else {
                    println!("  avg_process_ms : (sin datos)");
                }
            } else {
                println!(
                    "Error consultando /api/v1/replays/workers (status {})",
                    resp.status()
                );
            }
        }
    }

    Ok(())
}
