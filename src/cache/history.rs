//! Bounded log of executed queries and how each was answered

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;
use std::time::Duration;
use tokio::sync::RwLock;
use uuid::Uuid;

/// How a query was answered
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryOutcome {
    /// Served from the store
    Hit,
    /// Executed and stored
    Miss,
    /// Executed without consulting the store
    Bypass,
    /// The executor returned an error
    Error,
}

impl fmt::Display for QueryOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QueryOutcome::Hit => write!(f, "hit"),
            QueryOutcome::Miss => write!(f, "miss"),
            QueryOutcome::Bypass => write!(f, "bypass"),
            QueryOutcome::Error => write!(f, "error"),
        }
    }
}

/// One executed query
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryRecord {
    pub id: Uuid,
    pub query: String,
    pub outcome: QueryOutcome,
    /// Wall time spent answering, including the executor call
    pub elapsed: Duration,
    pub executed_at: DateTime<Utc>,
}

impl QueryRecord {
    pub fn new(query: impl Into<String>, outcome: QueryOutcome, elapsed: Duration) -> Self {
        Self {
            id: Uuid::new_v4(),
            query: query.into(),
            outcome,
            elapsed,
            executed_at: Utc::now(),
        }
    }
}

/// Aggregate view over the records currently held
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HistorySummary {
    pub total: usize,
    pub hits: usize,
    pub misses: usize,
    pub bypassed: usize,
    pub errors: usize,
    pub total_elapsed: Duration,
}

/// Ring of the most recent query records
///
/// Once `limit` records are held the oldest is dropped. A limit of 0 keeps
/// nothing.
#[derive(Debug)]
pub struct QueryHistory {
    limit: usize,
    records: RwLock<VecDeque<QueryRecord>>,
}

impl QueryHistory {
    pub fn new(limit: usize) -> Self {
        Self {
            limit,
            records: RwLock::new(VecDeque::with_capacity(limit.min(1024))),
        }
    }

    pub async fn record(&self, record: QueryRecord) {
        if self.limit == 0 {
            return;
        }
        let mut records = self.records.write().await;
        while records.len() >= self.limit {
            records.pop_front();
        }
        records.push_back(record);
    }

    /// Up to `n` most recent records, newest first
    pub async fn recent(&self, n: usize) -> Vec<QueryRecord> {
        let records = self.records.read().await;
        records.iter().rev().take(n).cloned().collect()
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }

    pub async fn clear(&self) {
        self.records.write().await.clear();
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    pub async fn summary(&self) -> HistorySummary {
        let records = self.records.read().await;
        let mut summary = HistorySummary {
            total: records.len(),
            ..Default::default()
        };

        for record in records.iter() {
            match record.outcome {
                QueryOutcome::Hit => summary.hits += 1,
                QueryOutcome::Miss => summary.misses += 1,
                QueryOutcome::Bypass => summary.bypassed += 1,
                QueryOutcome::Error => summary.errors += 1,
            }
            summary.total_elapsed += record.elapsed;
        }

        summary
    }
}
