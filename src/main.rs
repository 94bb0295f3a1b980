use std::path::PathBuf;

use anyhow::Context;
use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};
use rust_decimal::Decimal;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tracing::info;
use uuid::Uuid;

mod dashboard;
mod db;
mod error;
mod metrics;
mod models;
mod progress;
mod report;

use crate::models::{ProgressWeights, ProjectStatus};
use crate::progress::{ActualCostPolicy, CalculatorConfig};

#[derive(Parser)]
#[command(name = "field-progress")]
#[command(about = "Earned value progress and health tracking for field-service projects", long_about = None)]
struct Cli {
    /// Log computed figures at debug level
    #[arg(short, long, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct CalcArgs {
    /// Evaluate as of this date (YYYY-MM-DD) instead of today
    #[arg(long)]
    as_of: Option<NaiveDate>,
    /// Share of an in-progress work order counted as done
    #[arg(long, default_value = "0.50")]
    in_progress_credit: Decimal,
    /// project, project-plus-supplies or project-plus-work-orders
    #[arg(long, default_value = "project")]
    ac_policy: ActualCostPolicy,
    #[arg(long)]
    w_work_orders: Option<Decimal>,
    #[arg(long)]
    w_schedule: Option<Decimal>,
    #[arg(long)]
    w_earned_value: Option<Decimal>,
}

impl CalcArgs {
    fn config(&self) -> CalculatorConfig {
        CalculatorConfig {
            in_progress_credit: self.in_progress_credit.max(Decimal::ZERO).min(Decimal::ONE),
            actual_cost_policy: self.ac_policy,
        }
    }

    /// Custom weights when any weight flag is given; omitted ones count as zero.
    fn weights(&self) -> Option<ProgressWeights> {
        if self.w_work_orders.is_none() && self.w_schedule.is_none() && self.w_earned_value.is_none()
        {
            return None;
        }
        Some(progress::normalize_weights(&ProgressWeights {
            work_orders: self.w_work_orders.unwrap_or_default(),
            schedule: self.w_schedule.unwrap_or_default(),
            earned_value: self.w_earned_value.unwrap_or_default(),
        }))
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Create or upgrade the database schema
    InitDb,
    /// Load realistic seed data
    Seed,
    /// Import work orders from a CSV file
    Import {
        #[arg(long)]
        csv: PathBuf,
    },
    /// Show blended progress and earned value for one project
    Progress {
        #[arg(long)]
        project: Uuid,
        #[command(flatten)]
        calc: CalcArgs,
        #[arg(long)]
        json: bool,
    },
    /// Print every metric for one project as JSON
    Metrics {
        #[arg(long)]
        project: Uuid,
        #[command(flatten)]
        calc: CalcArgs,
    },
    /// Show the 0-100 health score for one project
    Health {
        #[arg(long)]
        project: Uuid,
        #[command(flatten)]
        calc: CalcArgs,
        #[arg(long)]
        json: bool,
    },
    /// Summaries across projects
    Dashboard {
        #[arg(long)]
        status: Option<ProjectStatus>,
        /// Comma-separated keys, prefix with - for descending
        #[arg(long)]
        sort: Option<String>,
        #[arg(long, default_value_t = 1)]
        page: usize,
        #[arg(long, default_value_t = 25)]
        page_size: usize,
        #[command(flatten)]
        calc: CalcArgs,
        #[arg(long)]
        json: bool,
    },
    /// Generate a markdown report
    Report {
        #[arg(long)]
        project: Uuid,
        #[command(flatten)]
        calc: CalcArgs,
        #[arg(long, default_value = "report.md")]
        out: PathBuf,
    },
}

fn init_tracing(verbose: bool) -> anyhow::Result<()> {
    let level = if verbose { "debug" } else { "warn" };
    let filter = tracing_subscriber::EnvFilter::try_from_env("FIELD_PROGRESS_LOG")
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|error| anyhow::anyhow!("failed to initialize tracing subscriber: {error}"))?;

    Ok(())
}

struct ProjectInputs {
    project: models::ProjectSnapshot,
    work_orders: Vec<models::WorkOrderSnapshot>,
    supplies: Vec<models::SupplyLine>,
    team: Vec<models::TeamMember>,
}

impl ProjectInputs {
    async fn load(pool: &PgPool, project_id: Uuid) -> anyhow::Result<Self> {
        let project = db::fetch_project(pool, project_id).await?;
        let work_orders = db::fetch_work_orders(pool, &[project_id]).await?;
        let supplies = db::fetch_supplies(pool, &[project_id]).await?;
        let team = db::fetch_team(pool, project_id).await?;
        Ok(Self {
            project,
            work_orders,
            supplies,
            team,
        })
    }

    fn metrics_input(&self) -> metrics::MetricsInput<'_> {
        metrics::MetricsInput {
            project: &self.project,
            work_orders: &self.work_orders,
            supplies: &self.supplies,
            team: &self.team,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose)?;

    let database_url = std::env::var("DATABASE_URL")
        .context("DATABASE_URL must be set to a production Postgres instance")?;

    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&database_url)
        .await
        .context("failed to connect to Postgres")?;

    match cli.command {
        Commands::InitDb => {
            db::init_db(&pool).await?;
            println!("Schema ready.");
        }
        Commands::Seed => {
            db::seed(&pool).await?;
            println!("Seed data inserted.");
        }
        Commands::Import { csv } => {
            let inserted = db::import_csv(&pool, &csv).await?;
            info!(inserted, path = %csv.display(), "import finished");
            println!("Inserted {inserted} work orders from {}.", csv.display());
        }
        Commands::Progress {
            project,
            calc,
            json,
        } => {
            let inputs = ProjectInputs::load(&pool, project).await?;
            let report = progress::compute_project_progress(
                &inputs.project,
                &inputs.work_orders,
                &inputs.supplies,
                calc.weights().as_ref(),
                calc.as_of,
                &calc.config(),
            );

            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
                return Ok(());
            }

            println!("{} ({})", inputs.project.name, report.status);
            println!(
                "- overall {:.1}% (work orders {:.1}%, schedule {:.1}%, earned value {:.1}%)",
                report.overall_progress * Decimal::ONE_HUNDRED,
                report.work_order_completion * Decimal::ONE_HUNDRED,
                report.schedule_progress * Decimal::ONE_HUNDRED,
                report.earned_value_progress * Decimal::ONE_HUNDRED
            );
            println!(
                "- PV {:.2} / EV {:.2} / AC {:.2}, SPI {:.2}, CPI {:.2}",
                report.details.budget.planned_value,
                report.details.budget.earned_value,
                report.details.budget.actual_cost,
                report.spi,
                report.cpi
            );
        }
        Commands::Metrics { project, calc } => {
            let inputs = ProjectInputs::load(&pool, project).await?;
            let all = metrics::compute_project_metrics(
                &inputs.metrics_input(),
                calc.weights().as_ref(),
                calc.as_of,
                &calc.config(),
            )?;
            println!("{}", serde_json::to_string_pretty(&all)?);
        }
        Commands::Health {
            project,
            calc,
            json,
        } => {
            let inputs = ProjectInputs::load(&pool, project).await?;
            let health = metrics::health_score_or_fallback(
                &inputs.project,
                &inputs.work_orders,
                &inputs.supplies,
                None,
                calc.as_of,
                &calc.config(),
            );

            if json {
                println!("{}", serde_json::to_string_pretty(&health)?);
                return Ok(());
            }

            println!(
                "{} health {:.1} / 100",
                inputs.project.name, health.health_score
            );
            println!(
                "- schedule {:.1}, cost {:.1}, completion {:.1}, risk {:.1}",
                health.components.schedule_health,
                health.components.cost_health,
                health.components.completion_health,
                health.components.risk_score
            );
            if let Some(forecast) = health.metrics.forecast_end_date {
                println!("- forecast finish {forecast}");
            }
        }
        Commands::Dashboard {
            status,
            sort,
            page,
            page_size,
            calc,
            json,
        } => {
            let projects = db::fetch_projects(&pool, status).await?;
            if projects.is_empty() {
                println!("No projects found.");
                return Ok(());
            }

            let ids: Vec<Uuid> = projects.iter().map(|p| p.id).collect();
            let work_orders = db::fetch_work_orders(&pool, &ids).await?;
            let supplies = db::fetch_supplies(&pool, &ids).await?;
            let mut summaries = dashboard::summarize_projects(
                &projects,
                &work_orders,
                &supplies,
                calc.weights().as_ref(),
                calc.as_of,
                &calc.config(),
            );
            if let Some(sort) = sort.as_deref() {
                dashboard::sort_summaries(&mut summaries, sort);
            }
            let page = dashboard::paginate(summaries, page, page_size);

            if json {
                println!("{}", serde_json::to_string_pretty(&page)?);
                return Ok(());
            }

            println!(
                "Projects {} of {} (page {}):",
                page.results.len(),
                page.count,
                page.page
            );
            for summary in &page.results {
                println!(
                    "- {} [{}] overall {:.1}% SPI {:.2} ({:?}) CPI {:.2} ({:?})",
                    summary.name,
                    summary.status,
                    summary.overall_progress * Decimal::ONE_HUNDRED,
                    summary.spi,
                    summary.badges.schedule,
                    summary.cpi,
                    summary.badges.cost
                );
            }
        }
        Commands::Report { project, calc, out } => {
            let inputs = ProjectInputs::load(&pool, project).await?;
            let as_of = calc.as_of.unwrap_or_else(progress::today);
            let config = calc.config();
            let all = metrics::compute_project_metrics(
                &inputs.metrics_input(),
                calc.weights().as_ref(),
                Some(as_of),
                &config,
            )?;
            let report =
                report::build_report(&inputs.project, as_of, &all, config.actual_cost_policy);
            std::fs::write(&out, report)?;
            println!("Report written to {}.", out.display());
        }
    }

    Ok(())
}
