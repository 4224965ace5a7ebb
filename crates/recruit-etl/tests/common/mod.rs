//! Shared fixtures for recruit-etl integration tests
//!
//! In-memory doubles for every store trait, deterministic data generators, and
//! a PostgreSQL testcontainer wrapper for the database-backed tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use recruit_common::DateRange;
use recruit_etl::error::{EtlError, EtlResult};
use recruit_etl::models::{ExtractFilters, PageRequest, RequisitionMetric, RequisitionRow, SkillMetric};
use recruit_etl::pipeline::PipelineStores;
use recruit_etl::stores::{Collection, DocumentSource, IndexDocument, MetricsSink, RequisitionSource, SearchIndex};
use serde_json::{json, Value};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use testcontainers::core::IntoContainerPort;
use testcontainers::runners::AsyncRunner;
use testcontainers::ContainerAsync;
use testcontainers_modules::postgres::Postgres;
use tracing::info;

pub const SKILLS: &[&str] = &["rust", "python", "sql", "kubernetes", "react"];

pub fn init_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};

    let _ = fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,recruit_etl=debug")),
        )
        .with_test_writer()
        .try_init();
}

pub fn ts(y: i32, m: u32, d: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(y, m, d, 0, 0, 0).unwrap()
}

/// January 2024, the range most tests run over
pub fn january() -> DateRange {
    DateRange::new(ts(2024, 1, 1), ts(2024, 1, 31)).unwrap()
}

// ============================================================================
// Data generators
// ============================================================================

/// `count` requisitions spread over 30 days from `start`, 70% of them filled
///
/// Filled requisitions take `5 + i % 20` days to fill and carry a satisfaction
/// score; the rest alternate between open and cancelled.
pub fn requisition_rows(count: usize, start: DateTime<Utc>) -> Vec<RequisitionRow> {
    (0..count)
        .map(|i| {
            let created_at = start + Duration::minutes((i as i64 * 43_200) / count.max(1) as i64);
            let filled = i % 10 < 7;
            let status = if filled {
                "filled"
            } else if i % 2 == 0 {
                "open"
            } else {
                "cancelled"
            };
            RequisitionRow {
                id: format!("req-{:05}", i),
                title: format!("Engineer {}", i),
                status: status.to_string(),
                client_id: format!("client-{}", i % 3),
                client_name: format!("Client {}", i % 3),
                client_industry: Some("software".to_string()),
                satisfaction_score: filled.then(|| 60.0 + (i % 40) as f64),
                created_at,
                filled_at: filled.then(|| created_at + Duration::days(5 + (i % 20) as i64)),
                required_skills: vec![
                    SKILLS[i % SKILLS.len()].to_string(),
                    SKILLS[(i / 2) % SKILLS.len()].to_uppercase(),
                ],
            }
        })
        .collect()
}

pub fn candidate_docs(count: usize, start: DateTime<Utc>) -> Vec<Value> {
    (0..count)
        .map(|i| {
            json!({
                "_id": format!("cand-{:05}", i),
                "skills": [SKILLS[i % SKILLS.len()], SKILLS[(i + 1) % SKILLS.len()]],
                "experience_years": (i % 12) as f64,
                "created_at": (start + Duration::hours(i as i64)).to_rfc3339(),
            })
        })
        .collect()
}

/// Communications touching every other candidate
pub fn communication_docs(candidates: usize, start: DateTime<Utc>) -> Vec<Value> {
    (0..candidates)
        .step_by(2)
        .map(|i| {
            json!({
                "_id": format!("comm-{:05}", i),
                "timestamp": (start + Duration::hours(i as i64 + 1)).to_rfc3339(),
                "participants": [format!("cand-{:05}", i), "recruiter-1"],
            })
        })
        .collect()
}

// ============================================================================
// Store doubles
// ============================================================================

/// Requisition source that can fail its first `fail_times` calls
#[derive(Default)]
pub struct InMemoryRequisitionSource {
    rows: Vec<RequisitionRow>,
    calls: AtomicUsize,
    fail_times: AtomicUsize,
}

impl InMemoryRequisitionSource {
    pub fn new(mut rows: Vec<RequisitionRow>) -> Self {
        rows.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        Self {
            rows,
            ..Self::default()
        }
    }

    pub fn failing(self, times: usize) -> Self {
        self.fail_times.store(times, Ordering::SeqCst);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RequisitionSource for InMemoryRequisitionSource {
    async fn fetch_requisitions(
        &self,
        range: &DateRange,
        filters: &ExtractFilters,
        page: PageRequest,
    ) -> EtlResult<Vec<RequisitionRow>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let remaining = self.fail_times.load(Ordering::SeqCst);
        if remaining > 0 {
            self.fail_times.store(remaining - 1, Ordering::SeqCst);
            return Err(EtlError::extraction("connection refused"));
        }

        Ok(self
            .rows
            .iter()
            .filter(|r| range.contains(r.created_at))
            .filter(|r| filters.client_id.as_ref().map_or(true, |c| &r.client_id == c))
            .skip(page.offset as usize)
            .take(page.limit as usize)
            .cloned()
            .collect())
    }
}

#[derive(Default)]
pub struct InMemoryDocumentSource {
    collections: HashMap<Collection, Vec<Value>>,
    calls: AtomicUsize,
}

impl InMemoryDocumentSource {
    pub fn new(candidates: Vec<Value>, communications: Vec<Value>) -> Self {
        let mut collections = HashMap::new();
        collections.insert(Collection::Candidates, candidates);
        collections.insert(Collection::Communications, communications);
        Self {
            collections,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

fn document_time(doc: &Value, field: &str) -> Option<DateTime<Utc>> {
    doc.get(field)?.as_str()?.parse().ok()
}

#[async_trait]
impl DocumentSource for InMemoryDocumentSource {
    async fn scan(&self, collection: Collection, range: &DateRange, page: PageRequest) -> EtlResult<Vec<Value>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let docs = self.collections.get(&collection).map(Vec::as_slice).unwrap_or_default();
        Ok(docs
            .iter()
            .filter(|d| document_time(d, collection.time_field()).map_or(true, |t| range.contains(t)))
            .skip(page.offset as usize)
            .take(page.limit as usize)
            .cloned()
            .collect())
    }
}

/// Metrics sink upserting by row id; can be switched to fail every write
#[derive(Default)]
pub struct InMemorySink {
    pub requisition_rows: Mutex<HashMap<uuid::Uuid, RequisitionMetric>>,
    pub skill_rows: Mutex<HashMap<uuid::Uuid, SkillMetric>>,
    fail_times: AtomicUsize,
    writes: AtomicUsize,
}

impl InMemorySink {
    pub fn failing(self, times: usize) -> Self {
        self.fail_times.store(times, Ordering::SeqCst);
        self
    }

    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    pub fn requisition_count(&self) -> usize {
        self.requisition_rows.lock().unwrap().len()
    }

    pub fn skill_count(&self) -> usize {
        self.skill_rows.lock().unwrap().len()
    }
}

#[async_trait]
impl MetricsSink for InMemorySink {
    async fn write_metrics(&self, metrics: &[RequisitionMetric], skills: &[SkillMetric]) -> EtlResult<u64> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        let remaining = self.fail_times.load(Ordering::SeqCst);
        if remaining > 0 {
            self.fail_times.store(remaining - 1, Ordering::SeqCst);
            return Err(EtlError::load("deadlock detected"));
        }

        let mut requisition_rows = self.requisition_rows.lock().unwrap();
        for row in metrics {
            requisition_rows.insert(row.id, row.clone());
        }
        let mut skill_rows = self.skill_rows.lock().unwrap();
        for row in skills {
            skill_rows.insert(row.id, row.clone());
        }
        Ok((metrics.len() + skills.len()) as u64)
    }
}

#[derive(Default)]
pub struct InMemoryIndex {
    pub documents: Mutex<HashMap<String, Value>>,
    fail_times: AtomicUsize,
}

impl InMemoryIndex {
    pub fn failing(self, times: usize) -> Self {
        self.fail_times.store(times, Ordering::SeqCst);
        self
    }

    pub fn len(&self) -> usize {
        self.documents.lock().unwrap().len()
    }
}

#[async_trait]
impl SearchIndex for InMemoryIndex {
    async fn bulk_index(&self, _index: &str, documents: Vec<IndexDocument>) -> EtlResult<usize> {
        let remaining = self.fail_times.load(Ordering::SeqCst);
        if remaining > 0 {
            self.fail_times.store(remaining - 1, Ordering::SeqCst);
            return Err(EtlError::load("search cluster unavailable"));
        }
        let count = documents.len();
        let mut stored = self.documents.lock().unwrap();
        for doc in documents {
            stored.insert(doc.id, doc.body);
        }
        Ok(count)
    }
}

/// Doubles wired together, with handles kept for assertions
pub struct TestStores {
    pub requisitions: Arc<InMemoryRequisitionSource>,
    pub documents: Arc<InMemoryDocumentSource>,
    pub sink: Arc<InMemorySink>,
    pub index: Arc<InMemoryIndex>,
}

impl TestStores {
    pub fn new(
        requisitions: InMemoryRequisitionSource,
        documents: InMemoryDocumentSource,
        sink: InMemorySink,
        index: InMemoryIndex,
    ) -> Self {
        Self {
            requisitions: Arc::new(requisitions),
            documents: Arc::new(documents),
            sink: Arc::new(sink),
            index: Arc::new(index),
        }
    }

    /// `count` generated requisitions, and candidates with communications, over January
    pub fn generated(count: usize) -> Self {
        let start = january().start();
        Self::new(
            InMemoryRequisitionSource::new(requisition_rows(count, start)),
            InMemoryDocumentSource::new(candidate_docs(count / 4, start), communication_docs(count / 4, start)),
            InMemorySink::default(),
            InMemoryIndex::default(),
        )
    }

    pub fn pipeline_stores(&self) -> PipelineStores {
        PipelineStores {
            requisitions: self.requisitions.clone(),
            documents: self.documents.clone(),
            sink: self.sink.clone(),
            index: self.index.clone(),
        }
    }
}

// ============================================================================
// PostgreSQL Test Container
// ============================================================================

pub struct TestPostgres {
    _container: ContainerAsync<Postgres>,
    pool: PgPool,
}

impl TestPostgres {
    /// Start PostgreSQL with the source schema and metrics migrations applied
    pub async fn start() -> Result<Self> {
        info!("Starting PostgreSQL test container...");
        let container = Postgres::default()
            .start()
            .await
            .context("Failed to start PostgreSQL container")?;

        let host = container.get_host().await.context("Failed to get container host")?;
        let port = container
            .get_host_port_ipv4(5432.tcp())
            .await
            .context("Failed to get container port")?;
        let url = format!("postgresql://postgres:postgres@{}:{}/postgres", host, port);

        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect(&url)
            .await
            .context("Failed to connect to PostgreSQL")?;

        sqlx::raw_sql(include_str!("../fixtures/source_schema.sql"))
            .execute(&pool)
            .await
            .context("Failed to create source schema")?;
        recruit_etl::run_migrations(&pool)
            .await
            .context("Failed to run migrations")?;

        Ok(Self {
            _container: container,
            pool,
        })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}
