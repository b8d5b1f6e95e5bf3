use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use sqlx::postgres::PgPoolOptions;
use tokio_util::sync::CancellationToken;
use tracing::info;
use uuid::Uuid;

use teacher_performance_scoring::db::{self, PgStore};
use teacher_performance_scoring::models::{PerformanceResult, Scope};
use teacher_performance_scoring::ranking::Ranking;
use teacher_performance_scoring::recalc::{RecalculationOrchestrator, RecalculationRun};
use teacher_performance_scoring::source::ResultStore;
use teacher_performance_scoring::{config, report, telemetry};

#[derive(Parser)]
#[command(name = "teacher-performance")]
#[command(about = "Monthly teacher performance scoring for school campuses", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args, Clone, Copy)]
struct ScopeArgs {
    /// Limit to one campus; all campuses when omitted
    #[arg(long)]
    campus: Option<Uuid>,
    #[arg(long)]
    month: u32,
    #[arg(long)]
    year: i32,
}

impl ScopeArgs {
    fn scope(self) -> anyhow::Result<Scope> {
        Ok(Scope::new(self.campus, self.month, self.year)?)
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Create or upgrade the database schema
    InitDb,
    /// Load realistic seed data
    Seed,
    /// Import classified attendance entries from a CSV file
    ImportAttendance {
        #[arg(long)]
        csv: PathBuf,
    },
    /// Compute scores for review without saving them
    Preview {
        #[command(flatten)]
        scope: ScopeArgs,
        #[arg(long, default_value_t = 10)]
        limit: usize,
        /// Print every computed result as JSON
        #[arg(long)]
        json: bool,
    },
    /// Compute scores and replace the stored results for the scope
    Recalculate {
        #[command(flatten)]
        scope: ScopeArgs,
    },
    /// List the highest committed scores
    Top {
        #[command(flatten)]
        scope: ScopeArgs,
        #[arg(long, default_value_t = 10)]
        limit: usize,
    },
    /// Generate a markdown report from committed scores
    Report {
        #[command(flatten)]
        scope: ScopeArgs,
        #[arg(long, default_value_t = 20)]
        top: usize,
        #[arg(long, default_value = "performance-report.md")]
        out: PathBuf,
    },
    /// Export committed scores as CSV
    Export {
        #[command(flatten)]
        scope: ScopeArgs,
        #[arg(long, default_value = "performance-results.csv")]
        out: PathBuf,
    },
}

fn print_ranking(title: &str, ranking: &Ranking, limit: usize) {
    if ranking.is_empty() {
        println!("No teachers scored for this scope.");
        return;
    }

    println!("{title}");
    for (position, result) in ranking.positions().into_iter().take(limit) {
        println!(
            "{}. {} score {:.2}/20 (attendance {}/{} days, on time {}, exams {:.1}%)",
            position,
            result.teacher_name,
            result.total_score,
            result.attended_days,
            result.working_days,
            result.on_time_days,
            result.avg_test_percentage
        );
    }
}

fn cancel_on_ctrl_c() -> CancellationToken {
    let token = CancellationToken::new();
    let child = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            child.cancel();
        }
    });
    token
}

async fn committed(store: &PgStore, scope: &Scope) -> anyhow::Result<Vec<PerformanceResult>> {
    store
        .scope_results(scope)
        .await
        .with_context(|| format!("failed to load committed results for {scope}"))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = config::AppConfig::load().context("invalid configuration")?;
    telemetry::init(&config.log_level)?;

    let database_url = config
        .database_url
        .clone()
        .context("DATABASE_URL must be set to a production Postgres instance")?;

    let pool = PgPoolOptions::new()
        .max_connections(config.db_max_connections)
        .connect(&database_url)
        .await
        .context("failed to connect to Postgres")?;
    let store = Arc::new(PgStore::new(pool.clone()));

    match cli.command {
        Commands::InitDb => {
            db::init_db(&pool).await?;
            println!("Schema ready.");
        }
        Commands::Seed => {
            db::seed(&pool).await?;
            println!("Seed data inserted.");
        }
        Commands::ImportAttendance { csv } => {
            let inserted = db::import_attendance_csv(&pool, &csv).await?;
            println!("Inserted {inserted} attendance entries from {}.", csv.display());
        }
        Commands::Preview { scope, limit, json } => {
            let scope = scope.scope()?;
            let orchestrator =
                RecalculationOrchestrator::new(Arc::clone(&store), Arc::clone(&store), config.scoring);
            let mut run = RecalculationRun::new(scope);
            orchestrator.preview(&mut run, &cancel_on_ctrl_c()).await?;

            if json {
                println!("{}", serde_json::to_string_pretty(run.results())?);
            } else {
                let ranking = Ranking::new(run.results().to_vec());
                print_ranking(&format!("Preview for {scope} (not saved):"), &ranking, limit);
            }
        }
        Commands::Recalculate { scope } => {
            let scope = scope.scope()?;
            let orchestrator =
                RecalculationOrchestrator::new(Arc::clone(&store), Arc::clone(&store), config.scoring);
            let run = orchestrator.recalculate(scope, &cancel_on_ctrl_c()).await?;

            if let Some(summary) = run.summary() {
                info!(scope = %scope, replaced = summary.deleted, "recalculation committed");
                println!(
                    "Saved {} results for {} (replaced {}).",
                    summary.inserted, scope, summary.deleted
                );
            }
        }
        Commands::Top { scope, limit } => {
            let scope = scope.scope()?;
            let ranking = Ranking::new(committed(&store, &scope).await?);
            print_ranking(&format!("Top teachers for {scope}:"), &ranking, limit);
            let shown = ranking.top(limit).len();
            if shown < ranking.len() {
                println!("Showing {shown} of {} teachers.", ranking.len());
            }
        }
        Commands::Report { scope, top, out } => {
            let scope = scope.scope()?;
            let ranking = Ranking::new(committed(&store, &scope).await?);
            let report = report::build_report(&scope, &ranking, top);
            std::fs::write(&out, report)?;
            println!("Report written to {}.", out.display());
        }
        Commands::Export { scope, out } => {
            let scope = scope.scope()?;
            let ranking = Ranking::new(committed(&store, &scope).await?);
            report::export_csv(&ranking, &out)?;
            println!("Exported {} results to {}.", ranking.len(), out.display());
        }
    }

    Ok(())
}
