//! Configuration management
//!
//! Process-level settings come from the environment (a `.env` file is honoured
//! in development). [`PipelineConfig`] is the per-run subset handed to the
//! orchestrator; the CLI derives it from [`EtlConfig`] and applies overrides.

use std::time::Duration;

use recruit_common::AggregationLevel;
use serde::{Deserialize, Serialize};

use crate::error::{EtlError, EtlResult};
use crate::models::ExtractFilters;

// ============================================================================
// Configuration Constants
// ============================================================================

/// Default database URL for local development.
pub const DEFAULT_DATABASE_URL: &str = "postgresql://localhost/recruitment";

/// Default maximum database connections in the pool.
pub const DEFAULT_DATABASE_MAX_CONNECTIONS: u32 = 10;

/// Default database connection timeout in seconds.
pub const DEFAULT_DATABASE_CONNECT_TIMEOUT_SECS: u64 = 10;

/// Default search cluster URL.
pub const DEFAULT_ELASTICSEARCH_URL: &str = "http://localhost:9200";

/// Default index receiving analytics documents.
pub const DEFAULT_SEARCH_INDEX: &str = "recruitment_analytics";

/// Default search request timeout in seconds.
pub const DEFAULT_SEARCH_TIMEOUT_SECS: u64 = 30;

/// Default number of records fetched per page.
pub const DEFAULT_PAGE_SIZE: usize = 1000;

/// Default number of parallel transform workers.
pub const DEFAULT_WORKER_COUNT: usize = 4;

/// Default attempts for the extract and load stages.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Default backoff unit in milliseconds; attempt `n` waits `2^n` units.
pub const DEFAULT_BACKOFF_UNIT_MS: u64 = 1000;

/// Default lifetime of a cached extraction bundle (1 hour).
pub const DEFAULT_EXTRACT_CACHE_TTL_SECS: u64 = 3600;

/// Default lifetime of cached metric artifacts (5 minutes).
pub const DEFAULT_METRICS_CACHE_TTL_SECS: u64 = 300;

/// Default upper bound on entries held by each cache.
pub const DEFAULT_CACHE_MAX_ENTRIES: usize = 100;

/// Full process configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EtlConfig {
    pub database: DatabaseConfig,
    pub search: SearchConfig,
    pub pipeline: PipelineSettings,
    pub cache: CacheConfig,
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub connect_timeout_secs: u64,
}

/// Search cluster configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    pub url: String,
    pub index: String,
    pub request_timeout_secs: u64,
}

/// Pipeline defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineSettings {
    pub page_size: usize,
    pub worker_count: usize,
    pub max_retries: u32,
    pub backoff_unit_ms: u64,
    pub aggregation_level: AggregationLevel,
    pub stage_timeout_secs: Option<u64>,
}

/// Cache tunables shared by the extraction and metrics caches
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    pub extract_ttl_secs: u64,
    pub metrics_ttl_secs: u64,
    pub max_entries: usize,
}

impl CacheConfig {
    pub fn extract_ttl(&self) -> Duration {
        Duration::from_secs(self.extract_ttl_secs)
    }

    pub fn metrics_ttl(&self) -> Duration {
        Duration::from_secs(self.metrics_ttl_secs)
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            extract_ttl_secs: DEFAULT_EXTRACT_CACHE_TTL_SECS,
            metrics_ttl_secs: DEFAULT_METRICS_CACHE_TTL_SECS,
            max_entries: DEFAULT_CACHE_MAX_ENTRIES,
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key).ok().and_then(|s| s.trim().parse().ok()).unwrap_or(default)
}

impl EtlConfig {
    /// Load configuration from environment and defaults
    pub fn load() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        // An unparseable level is an operator mistake, not something to default over.
        let aggregation_level = match std::env::var("ETL_AGGREGATION_LEVEL") {
            Ok(raw) => raw.parse()?,
            Err(_) => AggregationLevel::default(),
        };

        let config = EtlConfig {
            database: DatabaseConfig {
                url: std::env::var("DATABASE_URL")
                    .unwrap_or_else(|_| DEFAULT_DATABASE_URL.to_string()),
                max_connections: env_parse(
                    "DATABASE_MAX_CONNECTIONS",
                    DEFAULT_DATABASE_MAX_CONNECTIONS,
                ),
                connect_timeout_secs: env_parse(
                    "DATABASE_CONNECT_TIMEOUT",
                    DEFAULT_DATABASE_CONNECT_TIMEOUT_SECS,
                ),
            },
            search: SearchConfig {
                url: std::env::var("ELASTICSEARCH_URL")
                    .unwrap_or_else(|_| DEFAULT_ELASTICSEARCH_URL.to_string()),
                index: std::env::var("ETL_SEARCH_INDEX")
                    .unwrap_or_else(|_| DEFAULT_SEARCH_INDEX.to_string()),
                request_timeout_secs: env_parse("ELASTICSEARCH_TIMEOUT", DEFAULT_SEARCH_TIMEOUT_SECS),
            },
            pipeline: PipelineSettings {
                page_size: env_parse("ETL_PAGE_SIZE", DEFAULT_PAGE_SIZE),
                worker_count: env_parse("ETL_WORKERS", DEFAULT_WORKER_COUNT),
                max_retries: env_parse("ETL_MAX_RETRIES", DEFAULT_MAX_RETRIES),
                backoff_unit_ms: env_parse("ETL_BACKOFF_UNIT_MS", DEFAULT_BACKOFF_UNIT_MS),
                aggregation_level,
                stage_timeout_secs: std::env::var("ETL_STAGE_TIMEOUT_SECS")
                    .ok()
                    .and_then(|s| s.trim().parse().ok()),
            },
            cache: CacheConfig {
                extract_ttl_secs: env_parse(
                    "ETL_EXTRACT_CACHE_TTL_SECS",
                    DEFAULT_EXTRACT_CACHE_TTL_SECS,
                ),
                metrics_ttl_secs: env_parse(
                    "ETL_METRICS_CACHE_TTL_SECS",
                    DEFAULT_METRICS_CACHE_TTL_SECS,
                ),
                max_entries: env_parse("ETL_CACHE_MAX_ENTRIES", DEFAULT_CACHE_MAX_ENTRIES),
            },
        };

        config.validate()?;

        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.database.url.is_empty() {
            anyhow::bail!("Database URL cannot be empty");
        }

        if self.database.max_connections == 0 {
            anyhow::bail!("Database max_connections must be greater than 0");
        }

        if self.search.url.is_empty() {
            anyhow::bail!("Search URL cannot be empty");
        }

        if self.search.index.is_empty() {
            anyhow::bail!("Search index name cannot be empty");
        }

        if self.pipeline.page_size == 0 {
            anyhow::bail!("Page size must be greater than 0");
        }

        if self.pipeline.worker_count == 0 {
            anyhow::bail!("Worker count must be greater than 0");
        }

        if self.pipeline.max_retries == 0 {
            anyhow::bail!("max_retries must be at least 1 (one attempt)");
        }

        if self.pipeline.stage_timeout_secs == Some(0) {
            anyhow::bail!("Stage timeout must be greater than 0 when set");
        }

        if self.cache.max_entries == 0 {
            tracing::warn!("ETL_CACHE_MAX_ENTRIES is 0 - caches will be unbounded");
        }

        Ok(())
    }

    /// Per-run configuration seeded from the process defaults
    pub fn pipeline_config(&self) -> PipelineConfig {
        PipelineConfig {
            page_size: self.pipeline.page_size,
            worker_count: self.pipeline.worker_count,
            aggregation_level: self.pipeline.aggregation_level,
            max_retries: self.pipeline.max_retries,
            backoff_unit: Duration::from_millis(self.pipeline.backoff_unit_ms),
            stage_timeout: self.pipeline.stage_timeout_secs.map(Duration::from_secs),
            filters: ExtractFilters::default(),
        }
    }
}

impl Default for EtlConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig {
                url: DEFAULT_DATABASE_URL.to_string(),
                max_connections: DEFAULT_DATABASE_MAX_CONNECTIONS,
                connect_timeout_secs: DEFAULT_DATABASE_CONNECT_TIMEOUT_SECS,
            },
            search: SearchConfig {
                url: DEFAULT_ELASTICSEARCH_URL.to_string(),
                index: DEFAULT_SEARCH_INDEX.to_string(),
                request_timeout_secs: DEFAULT_SEARCH_TIMEOUT_SECS,
            },
            pipeline: PipelineSettings {
                page_size: DEFAULT_PAGE_SIZE,
                worker_count: DEFAULT_WORKER_COUNT,
                max_retries: DEFAULT_MAX_RETRIES,
                backoff_unit_ms: DEFAULT_BACKOFF_UNIT_MS,
                aggregation_level: AggregationLevel::default(),
                stage_timeout_secs: None,
            },
            cache: CacheConfig::default(),
        }
    }
}

/// Settings for a single pipeline run
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineConfig {
    pub page_size: usize,
    pub worker_count: usize,
    pub aggregation_level: AggregationLevel,
    /// Total attempts for extract and load, including the first
    pub max_retries: u32,
    pub backoff_unit: Duration,
    pub stage_timeout: Option<Duration>,
    pub filters: ExtractFilters,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        EtlConfig::default().pipeline_config()
    }
}

impl PipelineConfig {
    /// Parse an aggregation level supplied by a caller
    pub fn with_aggregation(mut self, level: &str) -> EtlResult<Self> {
        self.aggregation_level = level.parse()?;
        Ok(self)
    }

    /// Reject parameters no stage can run with
    pub fn validate(&self) -> EtlResult<()> {
        if self.page_size == 0 {
            return Err(EtlError::validation("page_size must be greater than 0"));
        }
        if self.worker_count == 0 {
            return Err(EtlError::validation("worker_count must be greater than 0"));
        }
        Ok(())
    }

    /// Delay before retry `attempt` (1-based): `2^attempt` backoff units
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt);
        self.backoff_unit.saturating_mul(factor)
    }
}
