//! Coactivation Engine
//!
//! Memories that appear together in a query result accrue edge weight
//! between their waypoints. Query completion enqueues one durable job row
//! (cost: a single insert); a worker drains pending jobs in batches,
//! accumulates pairwise waypoint edges with atomic increments, and marks
//! jobs done. Failures retry with exponential backoff until a terminal
//! `failed` state.
//!
//! The legacy `interval` mode keeps the old in-memory buffer with periodic
//! flushes. It loses buffered events on crash and is kept only for
//! compatibility; `cron` (the durable queue) is the default.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::CoactivationMode;
use crate::error::{EngineError, Result};
use crate::memory::{to_millis, Sector};
use crate::storage::Storage;

/// Retries before a job is terminally failed.
const MAX_RETRIES: u32 = 5;

/// Base retry backoff; doubles per retry.
const BACKOFF_BASE_SECS: i64 = 30;

/// Jobs claimed per worker pass.
const CLAIM_BATCH: usize = 32;

/// Edge weight contributed by one co-occurrence.
const EDGE_INCREMENT: f64 = 1.0;

// ============================================================================
// JOB TYPES
// ============================================================================

/// Durable job status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Running,
    Done,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Running => "running",
            JobStatus::Done => "done",
            JobStatus::Failed => "failed",
        }
    }

    pub fn parse_name(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(JobStatus::Pending),
            "running" => Some(JobStatus::Running),
            "done" => Some(JobStatus::Done),
            "failed" => Some(JobStatus::Failed),
            _ => None,
        }
    }
}

/// One returned memory within a coactivation event.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemoryActivation {
    pub id: String,
    pub sector: Sector,
}

/// Job payload: the memories one query returned, with the query instant.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CoactivationPayload {
    pub memories: Vec<MemoryActivation>,
    /// Epoch milliseconds of the originating query.
    pub queried_at: i64,
}

/// A durable coactivation job row.
#[derive(Debug, Clone)]
pub struct CoactivationJob {
    pub id: String,
    pub status: JobStatus,
    pub payload: CoactivationPayload,
    pub retries: u32,
    pub last_error: Option<String>,
    pub enqueued_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub next_attempt_at: DateTime<Utc>,
}

// ============================================================================
// QUEUE
// ============================================================================

/// Publishes coactivation events and reconciles them into waypoint edges.
pub struct CoactivationQueue {
    storage: Arc<Storage>,
    mode: CoactivationMode,
    /// Legacy interval-mode buffer. Unused in cron/disabled modes.
    buffer: Mutex<Vec<CoactivationPayload>>,
}

impl CoactivationQueue {
    pub fn new(storage: Arc<Storage>, mode: CoactivationMode) -> Self {
        Self {
            storage,
            mode,
            buffer: Mutex::new(Vec::new()),
        }
    }

    pub fn mode(&self) -> CoactivationMode {
        self.mode
    }

    /// Record one query's returned memories. In cron mode this is a single
    /// durable insert; in interval mode an in-memory push; disabled is a
    /// no-op.
    pub fn publish(&self, memories: Vec<MemoryActivation>, queried_at: DateTime<Utc>) -> Result<()> {
        if memories.len() < 2 && self.mode != CoactivationMode::Disabled {
            // A single memory coactivates with nothing; skip the row.
            return Ok(());
        }
        let payload = CoactivationPayload {
            memories,
            queried_at: to_millis(queried_at),
        };
        match self.mode {
            CoactivationMode::Cron => {
                let json = serde_json::to_string(&payload)
                    .map_err(|e| EngineError::Internal(format!("payload encode: {e}")))?;
                self.storage.enqueue_coactivation(&json, Utc::now())?;
            }
            CoactivationMode::Interval => {
                self.buffer
                    .lock()
                    .map_err(|_| EngineError::Internal("coactivation buffer poisoned".to_string()))?
                    .push(payload);
            }
            CoactivationMode::Disabled => {}
        }
        Ok(())
    }

    /// One worker pass over the durable queue. Returns jobs processed.
    pub fn process_batch(&self) -> Result<usize> {
        let now = Utc::now();
        let jobs = self.storage.claim_coactivation_jobs(CLAIM_BATCH, now)?;
        let mut processed = 0usize;
        for job in jobs {
            match self.apply_payload(&job.payload) {
                Ok(()) => {
                    self.storage.complete_coactivation(&job.id, Utc::now())?;
                    processed += 1;
                }
                Err(e) => {
                    let retries = job.retries + 1;
                    if retries >= MAX_RETRIES {
                        tracing::error!(
                            job = %job.id,
                            retries,
                            error = %e,
                            "coactivation job terminally failed"
                        );
                        self.storage
                            .fail_coactivation(&job.id, &e.to_string(), retries, None, Utc::now())?;
                    } else {
                        let backoff = BACKOFF_BASE_SECS * (1i64 << (retries - 1));
                        let next = Utc::now() + chrono::Duration::seconds(backoff);
                        tracing::warn!(
                            job = %job.id,
                            retries,
                            backoff_secs = backoff,
                            error = %e,
                            "coactivation job failed; re-enqueued"
                        );
                        self.storage.fail_coactivation(
                            &job.id,
                            &e.to_string(),
                            retries,
                            Some(next),
                            Utc::now(),
                        )?;
                    }
                }
            }
        }
        Ok(processed)
    }

    /// Drain the legacy interval buffer straight into edges.
    pub fn flush_interval_buffer(&self) -> Result<usize> {
        let drained: Vec<CoactivationPayload> = {
            let mut buffer = self
                .buffer
                .lock()
                .map_err(|_| EngineError::Internal("coactivation buffer poisoned".to_string()))?;
            std::mem::take(&mut *buffer)
        };
        let count = drained.len();
        for payload in drained {
            if let Err(e) = self.apply_payload(&payload) {
                tracing::warn!(error = %e, "interval-mode coactivation flush dropped an event");
            }
        }
        Ok(count)
    }

    /// Increment edges between every pair of waypoints that own the
    /// returned memories. Increments are commutative accumulations, so
    /// concurrent workers compose.
    fn apply_payload(&self, payload: &CoactivationPayload) -> Result<()> {
        let sectors: HashSet<Sector> = payload.memories.iter().map(|m| m.sector).collect();
        let mut member_to_waypoint: HashMap<(Sector, String), String> = HashMap::new();
        for &sector in &sectors {
            for waypoint in self.storage.waypoints_by_sector(sector)? {
                for member in &waypoint.member_ids {
                    member_to_waypoint.insert((sector, member.clone()), waypoint.id.clone());
                }
            }
        }

        let mut waypoints: Vec<String> = payload
            .memories
            .iter()
            .filter_map(|m| member_to_waypoint.get(&(m.sector, m.id.clone())).cloned())
            .collect();
        waypoints.sort();
        waypoints.dedup();

        let activated_at = DateTime::<Utc>::from_timestamp_millis(payload.queried_at)
            .unwrap_or_else(Utc::now);
        for i in 0..waypoints.len() {
            for j in (i + 1)..waypoints.len() {
                self.storage.accumulate_waypoint_edge(
                    &waypoints[i],
                    &waypoints[j],
                    EDGE_INCREMENT,
                    activated_at,
                )?;
            }
        }
        Ok(())
    }

    pub fn pending(&self) -> Result<u64> {
        self.storage.count_pending_coactivations()
    }
}

// ============================================================================
// WORKER
// ============================================================================

/// Spawns the background reconciliation task for the configured mode.
/// Returns `None` when coactivation is disabled.
pub fn spawn_worker(
    queue: Arc<CoactivationQueue>,
    poll_interval: Duration,
) -> Option<tokio::task::JoinHandle<()>> {
    match queue.mode() {
        CoactivationMode::Disabled => None,
        mode => Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(poll_interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let queue = queue.clone();
                let result = tokio::task::spawn_blocking(move || match mode {
                    CoactivationMode::Cron => queue.process_batch(),
                    CoactivationMode::Interval => queue.flush_interval_buffer(),
                    CoactivationMode::Disabled => Ok(0),
                })
                .await;
                match result {
                    Ok(Ok(count)) if count > 0 => {
                        tracing::debug!(count, "coactivation pass complete");
                    }
                    Ok(Ok(_)) => {}
                    Ok(Err(e)) => tracing::warn!(error = %e, "coactivation pass failed"),
                    Err(e) => tracing::warn!(error = %e, "coactivation task panicked"),
                }
            }
        })),
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hsg::WaypointRecord;
    use tempfile::TempDir;

    fn test_queue(mode: CoactivationMode) -> (CoactivationQueue, Arc<Storage>, TempDir) {
        let dir = TempDir::new().unwrap();
        let storage = Arc::new(Storage::open(Some(dir.path().join("test.db"))).unwrap());
        (CoactivationQueue::new(storage.clone(), mode), storage, dir)
    }

    fn seed_waypoint(storage: &Storage, sector: Sector, member: &str) -> String {
        let waypoint = WaypointRecord::seed(sector, member, &[1.0, 0.0], Utc::now());
        storage.insert_waypoint(&waypoint).unwrap();
        waypoint.id
    }

    fn activations(ids: &[&str]) -> Vec<MemoryActivation> {
        ids.iter()
            .map(|id| MemoryActivation {
                id: id.to_string(),
                sector: Sector::Semantic,
            })
            .collect()
    }

    #[test]
    fn test_publish_enqueues_durable_row() {
        let (queue, storage, _dir) = test_queue(CoactivationMode::Cron);
        queue.publish(activations(&["m1", "m2"]), Utc::now()).unwrap();
        assert_eq!(storage.count_pending_coactivations().unwrap(), 1);
    }

    #[test]
    fn test_single_memory_skipped() {
        let (queue, storage, _dir) = test_queue(CoactivationMode::Cron);
        queue.publish(activations(&["m1"]), Utc::now()).unwrap();
        assert_eq!(storage.count_pending_coactivations().unwrap(), 0);
    }

    #[test]
    fn test_disabled_mode_is_noop() {
        let (queue, storage, _dir) = test_queue(CoactivationMode::Disabled);
        queue.publish(activations(&["m1", "m2"]), Utc::now()).unwrap();
        assert_eq!(storage.count_pending_coactivations().unwrap(), 0);
    }

    #[test]
    fn test_process_batch_builds_edges() {
        let (queue, storage, _dir) = test_queue(CoactivationMode::Cron);
        let w1 = seed_waypoint(&storage, Sector::Semantic, "m1");
        let w2 = seed_waypoint(&storage, Sector::Semantic, "m2");

        queue.publish(activations(&["m1", "m2"]), Utc::now()).unwrap();
        let processed = queue.process_batch().unwrap();
        assert_eq!(processed, 1);

        let edges = storage.edges_for_waypoint(&w1).unwrap();
        assert_eq!(edges.len(), 1);
        assert_eq!(edges[0].0, w2);
        assert!((edges[0].1 - EDGE_INCREMENT).abs() < 1e-9);
        assert_eq!(storage.count_pending_coactivations().unwrap(), 0);
    }

    #[test]
    fn test_repeated_coactivation_accumulates() {
        let (queue, storage, _dir) = test_queue(CoactivationMode::Cron);
        let w1 = seed_waypoint(&storage, Sector::Semantic, "m1");
        seed_waypoint(&storage, Sector::Semantic, "m2");

        for _ in 0..3 {
            queue.publish(activations(&["m1", "m2"]), Utc::now()).unwrap();
        }
        queue.process_batch().unwrap();

        let edges = storage.edges_for_waypoint(&w1).unwrap();
        assert!((edges[0].1 - 3.0 * EDGE_INCREMENT).abs() < 1e-9);
    }

    #[test]
    fn test_same_waypoint_no_self_edge() {
        let (queue, storage, _dir) = test_queue(CoactivationMode::Cron);
        // Both memories live in the same waypoint.
        let waypoint = WaypointRecord {
            id: "w-shared".to_string(),
            sector: Sector::Semantic,
            mean: vec![1.0, 0.0],
            member_ids: vec!["m1".to_string(), "m2".to_string()],
            created_at: Utc::now(),
        };
        storage.insert_waypoint(&waypoint).unwrap();

        queue.publish(activations(&["m1", "m2"]), Utc::now()).unwrap();
        queue.process_batch().unwrap();
        assert_eq!(storage.count_waypoint_edges().unwrap(), 0);
    }

    #[test]
    fn test_interval_mode_buffers_then_flushes() {
        let (queue, storage, _dir) = test_queue(CoactivationMode::Interval);
        let w1 = seed_waypoint(&storage, Sector::Semantic, "m1");
        seed_waypoint(&storage, Sector::Semantic, "m2");

        queue.publish(activations(&["m1", "m2"]), Utc::now()).unwrap();
        // Nothing durable, nothing applied yet.
        assert_eq!(storage.count_pending_coactivations().unwrap(), 0);
        assert_eq!(storage.count_waypoint_edges().unwrap(), 0);

        let flushed = queue.flush_interval_buffer().unwrap();
        assert_eq!(flushed, 1);
        assert_eq!(storage.edges_for_waypoint(&w1).unwrap().len(), 1);
    }

    #[test]
    fn test_payload_roundtrip() {
        let payload = CoactivationPayload {
            memories: activations(&["m1", "m2"]),
            queried_at: 1_700_000_000_000,
        };
        let json = serde_json::to_string(&payload).unwrap();
        assert!(json.contains("queriedAt"));
        let back: CoactivationPayload = serde_json::from_str(&json).unwrap();
        assert_eq!(back.memories.len(), 2);
    }
}
