//! Query Cache Demo Application
//!
//! Runs a few queries against an in-memory job board through the cache and
//! prints what was served from where.
//!
//! Usage:
//!   cargo run --example query_cache_demo
//!
//! Environment variables:
//!   QUERY_CACHE_CAPACITY      - maximum cached result sets (default: 100)
//!   QUERY_CACHE_TTL_SECS      - entry lifetime in seconds (default: 300)
//!   QUERY_CACHE_ENABLED       - set to false to bypass the cache (default: true)
//!   QUERY_CACHE_HISTORY_LIMIT - executed queries remembered (default: 256)
//!   RUST_LOG                  - log filter (default: query_cache_demo=info,ouroboros_query_cache=debug)

use async_trait::async_trait;
use ouroboros_query_cache::{
    logging, CacheConfig, CachedExecutor, Column, ExecutionError, Executor, QueryResult, SqlValue,
};
use std::time::Duration;
use tracing::info;

/// Pretends to be a database: a fixed job table and a bit of latency
struct JobBoard {
    jobs: Vec<(i64, &'static str, &'static str)>,
}

impl JobBoard {
    fn new() -> Self {
        Self {
            jobs: vec![
                (1, "Rust engineer", "open"),
                (2, "Database administrator", "closed"),
                (3, "Site reliability engineer", "open"),
            ],
        }
    }
}

#[async_trait]
impl Executor for JobBoard {
    async fn execute(
        &self,
        query: &str,
        params: &[SqlValue],
    ) -> ouroboros_query_cache::Result<QueryResult> {
        tokio::time::sleep(Duration::from_millis(50)).await;

        let lowered = query.to_lowercase();
        if !lowered.contains("jobs") {
            return Err(ExecutionError::QueryError(format!("unknown relation in: {}", query)));
        }
        if !lowered.trim_start().starts_with("select") {
            return Ok(QueryResult::affected(1));
        }

        let state = match params.first() {
            Some(SqlValue::Text(state)) => Some(state.as_str()),
            _ => None,
        };
        let rows = self
            .jobs
            .iter()
            .filter(|(_, _, s)| state.map_or(true, |wanted| wanted == *s))
            .map(|(id, title, s)| {
                vec![
                    SqlValue::Int(*id),
                    SqlValue::from(*title),
                    SqlValue::from(*s),
                ]
            })
            .collect();

        Ok(QueryResult::new(
            vec![
                Column::new("id", "int8"),
                Column::new("title", "text"),
                Column::new("state", "text"),
            ],
            rows,
        ))
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    logging::init_tracing("query_cache_demo=info,ouroboros_query_cache=debug");

    info!("=== Query Cache Demo ===");

    let config = CacheConfig::from_env()?;
    info!("Using {:?}", config);

    let db = CachedExecutor::new(JobBoard::new(), config);
    let open = [SqlValue::from("open")];

    info!("\n--- First read (miss) ---");
    let jobs = db
        .execute("SELECT id, title, state FROM jobs WHERE state = $1", &open)
        .await?;
    info!("{}", serde_json::to_string_pretty(&jobs.to_json_records())?);

    info!("\n--- Same read again (hit) ---");
    let again = db
        .execute("SELECT id, title, state FROM jobs WHERE state = $1", &open)
        .await?;
    info!("Rows: {}", again.row_count());

    info!("\n--- Write (never cached) ---");
    let updated = db
        .execute("UPDATE jobs SET state = 'closed' WHERE id = 1", &[])
        .await?;
    info!("Rows affected: {:?}", updated.rows_affected);

    info!("\n--- Invalidate after the write ---");
    let dropped = db
        .invalidate("SELECT id, title, state FROM jobs WHERE state = $1", &open)
        .await;
    info!("Dropped cached read: {}", dropped);

    info!("\n--- Failing query ---");
    if let Err(e) = db.execute("SELECT * FROM applicants", &[]).await {
        info!("Error passed through: {}", e);
    }

    info!("\n--- Statistics ---");
    info!("{}", db.cache_stats().await);

    let summary = db.cache().history().summary().await;
    info!(
        "History: {} queries ({} hits, {} misses, {} bypassed, {} errors) in {:?}",
        summary.total,
        summary.hits,
        summary.misses,
        summary.bypassed,
        summary.errors,
        summary.total_elapsed
    );

    Ok(())
}
