//! Command-line interface for the externally-triggered operations: schema
//! migration and the monthly deduction/reconciliation cycle. Periodic
//! generation is driven from here (manually or by cron); the core does not
//! schedule itself.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use uuid::Uuid;

use crate::auth::{Actor, Role};
use crate::config::AppConfig;
use crate::database::postgres::PgStore;
use crate::services::deductions::DeductionService;
use crate::services::reconciliation::ReconciliationService;
use crate::services::SystemClock;

#[derive(Parser)]
#[command(name = "kika")]
#[command(about = "KIKA CLI - SACCOS loan workflow and deduction core")]
#[command(version)]
pub struct Cli {
    #[arg(long, global = true, help = "Output in JSON format")]
    pub json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    #[command(about = "Apply pending database migrations")]
    Migrate,

    #[command(about = "Monthly payroll deduction operations")]
    Deductions {
        #[command(subcommand)]
        cmd: DeductionCommands,
    },
}

#[derive(Subcommand)]
pub enum DeductionCommands {
    #[command(about = "Generate the expected-deduction batch for a period")]
    Generate {
        #[arg(long)]
        tenant: Uuid,
        #[arg(long)]
        month: u32,
        #[arg(long)]
        year: i32,
        #[arg(long, help = "Write the MoF CSV export to this path")]
        csv_out: Option<PathBuf>,
    },

    #[command(about = "Export an existing batch as the MoF CSV")]
    Export {
        #[arg(long)]
        tenant: Uuid,
        #[arg(long)]
        request: Uuid,
        #[arg(long)]
        out: PathBuf,
    },

    #[command(about = "Reconcile a MoF actuals file against a period")]
    Reconcile {
        #[arg(long)]
        tenant: Uuid,
        #[arg(long)]
        month: u32,
        #[arg(long)]
        year: i32,
        #[arg(long, help = "Path to the MoF actual-deductions CSV")]
        file: PathBuf,
        #[arg(long, help = "Deduction request supplying the expected baseline")]
        request: Option<Uuid>,
    },
}

pub async fn run(cli: Cli) -> anyhow::Result<()> {
    let config = AppConfig::from_env();
    let database_url =
        std::env::var("DATABASE_URL").context("DATABASE_URL must be set")?;
    let pool = crate::database::connect(&database_url, &config.database).await?;

    if let Commands::Migrate = cli.command {
        crate::database::migrate(&pool).await?;
        println!("Migrations applied");
        return Ok(());
    }

    let store = Arc::new(PgStore::new(pool));
    let clock = Arc::new(SystemClock);
    // CLI invocations act as the tenant's admin; the id is taken from the
    // environment so audit rows attribute to a real operator.
    let operator: Uuid = std::env::var("KIKA_OPERATOR_ID")
        .context("KIKA_OPERATOR_ID must be set")?
        .parse()
        .context("KIKA_OPERATOR_ID must be a UUID")?;

    match cli.command {
        Commands::Migrate => unreachable!("handled above"),
        Commands::Deductions { cmd } => match cmd {
            DeductionCommands::Generate {
                tenant,
                month,
                year,
                csv_out,
            } => {
                let actor = Actor::new(operator, tenant, Role::Admin);
                let service =
                    DeductionService::new(store.clone(), clock.clone(), config.deductions.clone());
                let (request, items) = service.generate_batch(&actor, month, year).await?;
                if cli.json {
                    println!("{}", serde_json::to_string_pretty(&request)?);
                } else {
                    println!(
                        "Generated batch {} ({} members, P {})",
                        request.batch_number, request.total_members, request.total_amount
                    );
                }
                if let Some(path) = csv_out {
                    let csv = service.export_csv(&actor, request.id).await?;
                    std::fs::write(&path, csv)
                        .with_context(|| format!("writing {}", path.display()))?;
                    println!("Wrote {} rows to {}", items.len(), path.display());
                }
            }
            DeductionCommands::Export { tenant, request, out } => {
                let actor = Actor::new(operator, tenant, Role::Admin);
                let service =
                    DeductionService::new(store.clone(), clock.clone(), config.deductions.clone());
                let csv = service.export_csv(&actor, request).await?;
                std::fs::write(&out, csv).with_context(|| format!("writing {}", out.display()))?;
                println!("Wrote {}", out.display());
            }
            DeductionCommands::Reconcile {
                tenant,
                month,
                year,
                file,
                request,
            } => {
                let actor = Actor::new(operator, tenant, Role::Admin);
                let content = std::fs::read_to_string(&file)
                    .with_context(|| format!("reading {}", file.display()))?;
                let service = ReconciliationService::new(store.clone(), clock.clone());
                let (batch, _items) = service
                    .reconcile(&actor, month, year, &content, request)
                    .await?;
                if cli.json {
                    println!("{}", serde_json::to_string_pretty(&batch)?);
                } else {
                    println!(
                        "Batch {}: {} records, {} matched, {} variance, {} unmatched, total variance P {}",
                        batch.batch_number,
                        batch.total_records,
                        batch.matched_records,
                        batch.variance_records,
                        batch.unmatched_records,
                        batch.total_variance
                    );
                }
            }
        },
    }
    Ok(())
}
