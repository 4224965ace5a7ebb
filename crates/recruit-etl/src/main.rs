//! Recruit ETL - recruitment analytics pipeline

use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use clap::{Parser, Subcommand};
use recruit_common::logging::{init_logging, LogConfig, LogLevel};
use recruit_common::DateRange;
use recruit_etl::config::EtlConfig;
use recruit_etl::models::ExtractFilters;
use recruit_etl::pipeline::{PipelineOrchestrator, PipelineStores};
use recruit_etl::stores::{ElasticsearchIndex, PgDocumentSource, PgMetricsSink, PgRequisitionSource};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tracing::info;

const DEFAULT_LOOKBACK_DAYS: i64 = 30;

#[derive(Parser, Debug)]
#[command(name = "recruit-etl")]
#[command(author, version, about = "Recruitment analytics ETL pipeline")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the pipeline for a date range
    Run {
        /// Range start, YYYY-MM-DD or RFC 3339 (defaults to 30 days before --end)
        #[arg(long)]
        start: Option<String>,

        /// Range end, YYYY-MM-DD (end of day) or RFC 3339 (defaults to now)
        #[arg(long)]
        end: Option<String>,

        /// Transform workers
        #[arg(short, long, env = "ETL_WORKERS")]
        workers: Option<usize>,

        /// Records per extraction page
        #[arg(long, env = "ETL_PAGE_SIZE")]
        page_size: Option<usize>,

        /// daily, weekly, monthly, quarterly or yearly
        #[arg(short, long)]
        aggregation: Option<String>,

        /// Only extract requisitions for this client
        #[arg(long)]
        client_id: Option<String>,

        /// Only keep candidates holding any of these skills
        #[arg(long, value_delimiter = ',')]
        skills: Vec<String>,

        /// Do not apply metrics store migrations before running
        #[arg(long)]
        skip_migrations: bool,
    },

    /// Apply metrics store migrations and exit
    Migrate,
}

fn parse_bound(value: &str, end_of_day: bool) -> Result<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(value) {
        return Ok(ts.with_timezone(&Utc));
    }
    let date = NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .with_context(|| format!("Invalid date '{}', expected YYYY-MM-DD or RFC 3339", value))?;
    let time = if end_of_day {
        NaiveTime::from_hms_opt(23, 59, 59)
    } else {
        Some(NaiveTime::MIN)
    }
    .context("Invalid time of day")?;
    Ok(date.and_time(time).and_utc())
}

fn resolve_range(start: Option<&str>, end: Option<&str>) -> Result<DateRange> {
    let end = match end {
        Some(value) => parse_bound(value, true)?,
        None => Utc::now(),
    };
    let start = match start {
        Some(value) => parse_bound(value, false)?,
        None => end - chrono::Duration::days(DEFAULT_LOOKBACK_DAYS),
    };
    Ok(DateRange::new(start, end)?)
}

async fn connect(config: &EtlConfig) -> Result<PgPool> {
    PgPoolOptions::new()
        .max_connections(config.database.max_connections)
        .acquire_timeout(Duration::from_secs(config.database.connect_timeout_secs))
        .connect(&config.database.url)
        .await
        .context("Failed to connect to database")
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    let log_config = LogConfig::builder()
        .level(if cli.verbose { LogLevel::Debug } else { LogLevel::Info })
        .log_file_prefix("recruit-etl")
        .build()
        .merge_env()?;
    let _guard = init_logging(&log_config)?;

    let config = EtlConfig::load()?;

    match cli.command {
        Command::Migrate => {
            let pool = connect(&config).await?;
            recruit_etl::run_migrations(&pool)
                .await
                .context("Failed to apply migrations")?;
            info!("Migrations applied");
            Ok(ExitCode::SUCCESS)
        },
        Command::Run {
            start,
            end,
            workers,
            page_size,
            aggregation,
            client_id,
            skills,
            skip_migrations,
        } => {
            let range = resolve_range(start.as_deref(), end.as_deref())?;

            let mut pipeline = config.pipeline_config();
            if let Some(workers) = workers {
                pipeline.worker_count = workers;
            }
            if let Some(page_size) = page_size {
                pipeline.page_size = page_size;
            }
            if let Some(level) = aggregation.as_deref() {
                pipeline = pipeline.with_aggregation(level)?;
            }
            let mut filters = client_id.map(ExtractFilters::for_client).unwrap_or_default();
            if !skills.is_empty() {
                filters = filters.with_skills(skills);
            }
            pipeline.filters = filters;
            pipeline.validate()?;

            let pool = connect(&config).await?;
            if !skip_migrations {
                recruit_etl::run_migrations(&pool)
                    .await
                    .context("Failed to apply migrations")?;
            }

            let index = ElasticsearchIndex::new(
                config.search.url.clone(),
                Duration::from_secs(config.search.request_timeout_secs),
            )?;
            let stores = PipelineStores {
                requisitions: Arc::new(PgRequisitionSource::new(pool.clone())),
                documents: Arc::new(PgDocumentSource::new(pool.clone())),
                sink: Arc::new(PgMetricsSink::new(pool)),
                index: Arc::new(index),
            };
            let orchestrator = PipelineOrchestrator::new(stores, config.search.index.clone(), &config.cache);

            let outcome = orchestrator.run(range, &pipeline).await;
            println!("{}", serde_json::to_string_pretty(&outcome)?);

            Ok(if outcome.success {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            })
        },
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_parse_bound_dates_and_timestamps() {
        assert_eq!(
            parse_bound("2024-01-31", true).unwrap(),
            Utc.with_ymd_and_hms(2024, 1, 31, 23, 59, 59).unwrap()
        );
        assert_eq!(
            parse_bound("2024-01-01", false).unwrap(),
            Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
        );
        assert_eq!(
            parse_bound("2024-01-01T12:00:00+02:00", false).unwrap(),
            Utc.with_ymd_and_hms(2024, 1, 1, 10, 0, 0).unwrap()
        );
        assert!(parse_bound("31/01/2024", false).is_err());
    }

    #[test]
    fn test_resolve_range_rejects_inverted_bounds() {
        assert!(resolve_range(Some("2024-02-01"), Some("2024-01-01")).is_err());
        let range = resolve_range(None, Some("2024-01-31")).unwrap();
        assert_eq!(range.duration(), chrono::Duration::days(30));
    }

    #[test]
    fn test_cli_parses_run_flags() {
        let cli = Cli::try_parse_from([
            "recruit-etl",
            "run",
            "--start",
            "2024-01-01",
            "--aggregation",
            "weekly",
            "--skills",
            "rust,sql",
        ])
        .unwrap();
        match cli.command {
            Command::Run { start, skills, aggregation, .. } => {
                assert_eq!(start.as_deref(), Some("2024-01-01"));
                assert_eq!(aggregation.as_deref(), Some("weekly"));
                assert_eq!(skills, vec!["rust", "sql"]);
            },
            Command::Migrate => panic!("expected run"),
        }
    }
}
