//! Best-effort stats aggregation for the dashboard. Every cross-module
//! figure follows the same fan-out rule: sources run concurrently, each
//! under its own timeout, and a failing source degrades its field to zero
//! instead of failing the aggregate.

use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::task::JoinSet;
use tracing::warn;

/// Boxed count query against one module's backend.
pub type CountFuture = Pin<Box<dyn Future<Output = anyhow::Result<u64>> + Send + 'static>>;

/// One independent count query feeding a dashboard field.
pub struct CountSource {
    pub name: String,
    pub timeout: Duration,
    pub query: CountFuture,
}

impl CountSource {
    pub fn new<F>(name: impl Into<String>, timeout: Duration, query: F) -> Self
    where
        F: Future<Output = anyhow::Result<u64>> + Send + 'static,
    {
        Self {
            name: name.into(),
            timeout,
            query: Box::pin(query),
        }
    }
}

/// Aggregated dashboard counts. `degraded` is set when any source failed;
/// failed sources still appear in `counts` with a zero value.
#[derive(Debug, Clone, Serialize)]
pub struct DashboardStats {
    pub counts: BTreeMap<String, u64>,
    pub degraded: bool,
    pub failed_sources: Vec<String>,
    pub generated_at: DateTime<Utc>,
}

impl DashboardStats {
    pub fn total(&self) -> u64 {
        self.counts.values().sum()
    }
}

/// Fan out all sources concurrently and join with "wait for all, tolerate
/// individual failure". Never returns an error.
pub async fn collect(sources: Vec<CountSource>) -> DashboardStats {
    let mut set = JoinSet::new();
    // Names stay on this side of the spawn so a panicked task can still be
    // attributed to its source.
    let mut names: HashMap<tokio::task::Id, String> = HashMap::new();
    for source in sources {
        let deadline = source.timeout;
        let query = source.query;
        let handle = set.spawn(async move {
            match tokio::time::timeout(deadline, query).await {
                Ok(Ok(count)) => Ok(count),
                Ok(Err(e)) => Err(format!("query failed: {e}")),
                Err(_) => Err(format!("timed out after {}ms", deadline.as_millis())),
            }
        });
        names.insert(handle.id(), source.name);
    }

    let mut counts = BTreeMap::new();
    let mut failed_sources = Vec::new();
    while let Some(joined) = set.join_next_with_id().await {
        match joined {
            Ok((id, outcome)) => {
                let name = names.remove(&id).unwrap_or_default();
                match outcome {
                    Ok(count) => {
                        counts.insert(name, count);
                    }
                    Err(reason) => {
                        warn!(source = %name, reason = %reason, "stats source degraded");
                        counts.insert(name.clone(), 0);
                        failed_sources.push(name);
                    }
                }
            }
            Err(e) => {
                let name = names.remove(&e.id()).unwrap_or_default();
                warn!(source = %name, error = %e, "stats source task panicked");
                counts.insert(name.clone(), 0);
                failed_sources.push(name);
            }
        }
    }
    failed_sources.sort();

    DashboardStats {
        degraded: !failed_sources.is_empty(),
        counts,
        failed_sources,
        generated_at: Utc::now(),
    }
}
