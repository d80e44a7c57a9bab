//! Waypoints: centroid-summarized clusters of memories
//!
//! A waypoint is the associative hub of one sector: its mean vector is the
//! L2-renormalized centroid of its members, and coactivation accrues edges
//! between waypoints. Memories join the nearest waypoint when similarity
//! clears the sector threshold; otherwise they seed a new one.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::embedding::{cosine_similarity, l2_normalize};
use crate::error::{EngineError, Result};
use crate::memory::Sector;

/// A waypoint row.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WaypointRecord {
    pub id: String,
    pub sector: Sector,
    /// Unit-norm centroid of the member vectors
    pub mean: Vec<f32>,
    /// Member memory ids (unordered set, stored as JSON)
    pub member_ids: Vec<String>,
    pub created_at: DateTime<Utc>,
}

impl WaypointRecord {
    /// Seed a new waypoint from a single member.
    pub fn seed(sector: Sector, memory_id: &str, vector: &[f32], now: DateTime<Utc>) -> Self {
        let mut mean = vector.to_vec();
        l2_normalize(&mut mean);
        Self {
            id: Uuid::new_v4().to_string(),
            sector,
            mean,
            member_ids: vec![memory_id.to_string()],
            created_at: now,
        }
    }

    pub fn contains(&self, memory_id: &str) -> bool {
        self.member_ids.iter().any(|m| m == memory_id)
    }

    /// Fold a new member into the centroid: incremental mean over the
    /// current member count, renormalized to unit length.
    pub fn absorb(&mut self, memory_id: &str, vector: &[f32]) -> Result<()> {
        if self.contains(memory_id) {
            return Ok(());
        }
        let n = self.member_ids.len() as f32;
        for (m, v) in self.mean.iter_mut().zip(vector.iter()) {
            *m = (*m * n + v) / (n + 1.0);
        }
        l2_normalize(&mut self.mean);
        self.check_mean()?;
        self.member_ids.push(memory_id.to_string());
        Ok(())
    }

    /// Remove a member, subtracting its vector from the centroid when the
    /// vector is still known. Returns true when the waypoint is now empty
    /// and should be deleted.
    pub fn release(&mut self, memory_id: &str, vector: Option<&[f32]>) -> Result<bool> {
        let before = self.member_ids.len();
        self.member_ids.retain(|m| m != memory_id);
        if self.member_ids.len() == before {
            return Ok(self.member_ids.is_empty());
        }
        if self.member_ids.is_empty() {
            return Ok(true);
        }
        if let Some(v) = vector {
            let n = before as f32;
            let remaining = self.member_ids.len() as f32;
            for (m, x) in self.mean.iter_mut().zip(v.iter()) {
                *m = (*m * n - x) / remaining;
            }
            l2_normalize(&mut self.mean);
            self.check_mean()?;
        }
        Ok(false)
    }

    fn check_mean(&self) -> Result<()> {
        if self.mean.iter().any(|x| !x.is_finite()) {
            return Err(EngineError::Internal(format!(
                "waypoint {} centroid became non-finite",
                self.id
            )));
        }
        Ok(())
    }
}

/// Index of the waypoint whose centroid is nearest to `vector`, with the
/// similarity. Ties resolve to the lower waypoint id.
pub fn nearest<'a>(
    waypoints: &'a [WaypointRecord],
    vector: &[f32],
) -> Option<(&'a WaypointRecord, f32)> {
    let mut best: Option<(&WaypointRecord, f32)> = None;
    for waypoint in waypoints {
        let score = cosine_similarity(&waypoint.mean, vector);
        best = match best {
            None => Some((waypoint, score)),
            Some((b, s)) if score > s || (score == s && waypoint.id < b.id) => {
                Some((waypoint, score))
            }
            keep => keep,
        };
    }
    best
}

// ============================================================================
// TESTS
// ============================================================================
