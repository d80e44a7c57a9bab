//! SQLite Storage Implementation
//!
//! Single metadata backend holding all persisted state. Uses separate
//! reader/writer connections behind mutexes so every method takes `&self`
//! and `Storage` stays `Send + Sync`; the engine shares it as `Arc<Storage>`.
//!
//! Scoping rule: every method that accepts `user: Option<&str>` conjoins
//! `user_id = ?` into the statement when the scope is present. Unscoped
//! calls see all rows.

use std::path::PathBuf;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use directories::ProjectDirs;
use rusqlite::{params, Connection, OptionalExtension, ToSql};
use uuid::Uuid;

use crate::coactivation::{CoactivationJob, JobStatus};
use crate::embedding::{vector_from_bytes, vector_to_bytes};
use crate::error::{EngineError, Result};
use crate::hsg::WaypointRecord;
use crate::index::VectorRow;
use crate::memory::{from_millis, to_millis, MemoryRecord, Sector};
use crate::temporal::{FactField, TemporalEdge, TemporalFact};

// ============================================================================
// STORAGE
// ============================================================================

/// SQLite-backed storage for every subsystem.
pub struct Storage {
    writer: Mutex<Connection>,
    reader: Mutex<Connection>,
}

type LockResult<'a> = std::sync::MutexGuard<'a, Connection>;

impl Storage {
    /// Apply performance PRAGMAs to a connection.
    fn configure_connection(conn: &Connection) -> Result<()> {
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;
             PRAGMA cache_size = -64000;
             PRAGMA temp_store = MEMORY;
             PRAGMA foreign_keys = ON;
             PRAGMA busy_timeout = 5000;",
        )?;
        Ok(())
    }

    /// Open (or create) the database. `None` resolves to the platform data
    /// directory.
    pub fn open(db_path: Option<PathBuf>) -> Result<Self> {
        let path = match db_path {
            Some(p) => {
                if let Some(parent) = p.parent() {
                    if !parent.as_os_str().is_empty() {
                        std::fs::create_dir_all(parent)?;
                    }
                }
                p
            }
            None => {
                let proj_dirs = ProjectDirs::from("dev", "engram", "core").ok_or_else(|| {
                    EngineError::Config("could not determine project directories".to_string())
                })?;
                let data_dir = proj_dirs.data_dir();
                std::fs::create_dir_all(data_dir)?;
                data_dir.join("engram.db")
            }
        };

        let writer_conn = Connection::open(&path)?;
        Self::configure_connection(&writer_conn)?;
        super::migrations::apply_migrations(&writer_conn)?;

        let reader_conn = Connection::open(&path)?;
        Self::configure_connection(&reader_conn)?;

        Ok(Self {
            writer: Mutex::new(writer_conn),
            reader: Mutex::new(reader_conn),
        })
    }

    fn writer(&self) -> Result<LockResult<'_>> {
        self.writer
            .lock()
            .map_err(|_| EngineError::Internal("writer lock poisoned".to_string()))
    }

    fn reader(&self) -> Result<LockResult<'_>> {
        self.reader
            .lock()
            .map_err(|_| EngineError::Internal("reader lock poisoned".to_string()))
    }

    // ========================================================================
    // MEMORIES
    // ========================================================================

    /// Insert a memory row. Last write wins on id collision.
    pub fn insert_memory(&self, memory: &MemoryRecord) -> Result<()> {
        let sectors = serde_json::to_string(&memory.sectors).unwrap_or_else(|_| "[]".to_string());
        let tags = serde_json::to_string(&memory.tags).unwrap_or_else(|_| "[]".to_string());
        let metadata =
            serde_json::to_string(&memory.metadata).unwrap_or_else(|_| "{}".to_string());

        self.writer()?.execute(
            "INSERT OR REPLACE INTO memories (
                id, user_id, content, primary_sector, sectors, tags, metadata,
                salience, created_at, last_seen_at
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                memory.id,
                memory.user_id,
                memory.content,
                memory.primary_sector.as_str(),
                sectors,
                tags,
                metadata,
                memory.salience,
                to_millis(memory.created_at),
                to_millis(memory.last_seen_at),
            ],
        )?;
        Ok(())
    }

    /// Fetch one memory row by id (unscoped; ownership checks live in the
    /// engine so NotFoundForUser can be surfaced opaquely).
    pub fn get_memory(&self, id: &str) -> Result<Option<MemoryRecord>> {
        let reader = self.reader()?;
        let mut stmt = reader.prepare(
            "SELECT id, user_id, content, primary_sector, sectors, tags, metadata,
                    salience, created_at, last_seen_at
             FROM memories WHERE id = ?1",
        )?;
        stmt.query_row(params![id], row_to_memory)
            .optional()
            .map_err(Into::into)
    }

    /// Fetch many memory rows, preserving the requested order.
    pub fn memories_by_ids(&self, ids: &[String]) -> Result<Vec<MemoryRecord>> {
        let mut out = Vec::with_capacity(ids.len());
        let reader = self.reader()?;
        let mut stmt = reader.prepare(
            "SELECT id, user_id, content, primary_sector, sectors, tags, metadata,
                    salience, created_at, last_seen_at
             FROM memories WHERE id = ?1",
        )?;
        for id in ids {
            if let Some(memory) = stmt.query_row(params![id], row_to_memory).optional()? {
                out.push(memory);
            }
            // Missing rows are skipped: a vector row may briefly outlive (or
            // precede) its memory row under concurrent writes.
        }
        Ok(out)
    }

    /// Page through memories, optionally scoped by user and primary sector.
    pub fn list_memories(
        &self,
        user: Option<&str>,
        sector: Option<Sector>,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<MemoryRecord>> {
        let mut sql = String::from(
            "SELECT id, user_id, content, primary_sector, sectors, tags, metadata,
                    salience, created_at, last_seen_at
             FROM memories WHERE 1=1",
        );
        let mut bind: Vec<Box<dyn ToSql>> = Vec::new();
        if let Some(u) = user {
            sql.push_str(" AND user_id = ?");
            bind.push(Box::new(u.to_string()));
        }
        if let Some(s) = sector {
            sql.push_str(" AND primary_sector = ?");
            bind.push(Box::new(s.as_str().to_string()));
        }
        sql.push_str(" ORDER BY created_at DESC, id ASC LIMIT ? OFFSET ?");
        bind.push(Box::new(limit as i64));
        bind.push(Box::new(offset as i64));

        let reader = self.reader()?;
        let mut stmt = reader.prepare(&sql)?;
        let refs: Vec<&dyn ToSql> = bind.iter().map(|b| b.as_ref()).collect();
        let rows = stmt.query_map(refs.as_slice(), row_to_memory)?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Into::into)
    }

    /// Add the reinforcement step to salience (capped at 1.0) and refresh
    /// `last_seen_at`. Returns false when the id does not exist.
    pub fn reinforce_memory(&self, id: &str, step: f64, now: DateTime<Utc>) -> Result<bool> {
        let changed = self.writer()?.execute(
            "UPDATE memories
             SET salience = MIN(1.0, salience + ?1), last_seen_at = ?2
             WHERE id = ?3",
            params![step, to_millis(now), id],
        )?;
        Ok(changed > 0)
    }

    /// Page of (id, salience, last_seen_at) for the decay sweep.
    pub fn salience_page(
        &self,
        sector: Sector,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<(String, f64, DateTime<Utc>)>> {
        let reader = self.reader()?;
        let mut stmt = reader.prepare(
            "SELECT id, salience, last_seen_at FROM memories
             WHERE primary_sector = ?1
             ORDER BY id ASC LIMIT ?2 OFFSET ?3",
        )?;
        let rows = stmt.query_map(
            params![sector.as_str(), limit as i64, offset as i64],
            |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, f64>(1)?,
                    row.get::<_, i64>(2)?,
                ))
            },
        )?;
        let mut out = Vec::new();
        for row in rows {
            let (id, salience, seen_ms) = row?;
            out.push((id, salience, from_millis(seen_ms)?));
        }
        Ok(out)
    }

    /// Persist a batch of decayed salience values in one transaction.
    pub fn update_salience_batch(&self, updates: &[(String, f64)]) -> Result<()> {
        if updates.is_empty() {
            return Ok(());
        }
        let mut writer = self.writer()?;
        let tx = writer.transaction()?;
        {
            let mut stmt = tx.prepare("UPDATE memories SET salience = ?1 WHERE id = ?2")?;
            for (id, salience) in updates {
                stmt.execute(params![salience, id])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    /// Delete one memory row. Vector rows cascade separately via
    /// `delete_vectors`.
    pub fn delete_memory(&self, id: &str) -> Result<bool> {
        let changed = self
            .writer()?
            .execute("DELETE FROM memories WHERE id = ?1", params![id])?;
        Ok(changed > 0)
    }

    /// Delete all memory rows in scope; returns the ids removed so callers
    /// can cascade.
    pub fn wipe_memories(&self, user: Option<&str>) -> Result<Vec<String>> {
        let ids: Vec<String> = {
            let reader = self.reader()?;
            match user {
                Some(u) => {
                    let mut stmt =
                        reader.prepare("SELECT id FROM memories WHERE user_id = ?1")?;
                    let rows = stmt.query_map(params![u], |row| row.get(0))?;
                    rows.collect::<std::result::Result<Vec<_>, _>>()?
                }
                None => {
                    let mut stmt = reader.prepare("SELECT id FROM memories")?;
                    let rows = stmt.query_map([], |row| row.get(0))?;
                    rows.collect::<std::result::Result<Vec<_>, _>>()?
                }
            }
        };
        match user {
            Some(u) => {
                self.writer()?
                    .execute("DELETE FROM memories WHERE user_id = ?1", params![u])?;
            }
            None => {
                self.writer()?.execute("DELETE FROM memories", [])?;
            }
        }
        Ok(ids)
    }

    pub fn count_memories(&self) -> Result<u64> {
        let reader = self.reader()?;
        let count: i64 = reader.query_row("SELECT COUNT(*) FROM memories", [], |r| r.get(0))?;
        Ok(count as u64)
    }

    /// Memory counts grouped by primary sector.
    pub fn count_memories_by_sector(&self) -> Result<Vec<(Sector, u64)>> {
        let reader = self.reader()?;
        let mut stmt = reader
            .prepare("SELECT primary_sector, COUNT(*) FROM memories GROUP BY primary_sector")?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
        })?;
        let mut out = Vec::new();
        for row in rows {
            let (name, count) = row?;
            if let Some(sector) = Sector::parse_name(&name) {
                out.push((sector, count as u64));
            }
        }
        Ok(out)
    }

    // ========================================================================
    // VECTORS
    // ========================================================================

    /// Upsert one vector row; idempotent on (id, sector), last write wins.
    pub fn upsert_vector(
        &self,
        id: &str,
        sector: Sector,
        user_id: &str,
        vector: &[f32],
    ) -> Result<()> {
        self.writer()?.execute(
            "INSERT OR REPLACE INTO vectors (id, sector, user_id, v, dim)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                id,
                sector.as_str(),
                user_id,
                vector_to_bytes(vector),
                vector.len() as i64
            ],
        )?;
        Ok(())
    }

    /// Delete one sector row, or all sector rows of an id.
    pub fn delete_vectors(&self, id: &str, sector: Option<Sector>) -> Result<usize> {
        let changed = match sector {
            Some(s) => self.writer()?.execute(
                "DELETE FROM vectors WHERE id = ?1 AND sector = ?2",
                params![id, s.as_str()],
            )?,
            None => self
                .writer()?
                .execute("DELETE FROM vectors WHERE id = ?1", params![id])?,
        };
        Ok(changed)
    }

    pub fn get_vector(&self, id: &str, sector: Sector) -> Result<Option<Vec<f32>>> {
        let reader = self.reader()?;
        let blob: Option<Vec<u8>> = reader
            .query_row(
                "SELECT v FROM vectors WHERE id = ?1 AND sector = ?2",
                params![id, sector.as_str()],
                |row| row.get(0),
            )
            .optional()?;
        Ok(blob.and_then(|b| vector_from_bytes(&b)))
    }

    /// All vector rows in a sector, optionally pre-filtered by user.
    /// This is the exact-linear backend's candidate load.
    pub fn vector_rows_by_sector(
        &self,
        sector: Sector,
        user: Option<&str>,
    ) -> Result<Vec<VectorRow>> {
        let mut sql =
            String::from("SELECT id, sector, user_id, v FROM vectors WHERE sector = ?");
        let mut bind: Vec<Box<dyn ToSql>> = vec![Box::new(sector.as_str().to_string())];
        if let Some(u) = user {
            sql.push_str(" AND user_id = ?");
            bind.push(Box::new(u.to_string()));
        }
        sql.push_str(" ORDER BY id ASC");

        let reader = self.reader()?;
        let mut stmt = reader.prepare(&sql)?;
        let refs: Vec<&dyn ToSql> = bind.iter().map(|b| b.as_ref()).collect();
        let rows = stmt.query_map(refs.as_slice(), row_to_vector)?;
        let mut out = Vec::new();
        for row in rows {
            if let Some(vr) = row? {
                out.push(vr);
            }
        }
        Ok(out)
    }

    /// Every vector row, for rebuilding in-memory indexes at startup.
    pub fn all_vector_rows(&self) -> Result<Vec<VectorRow>> {
        let reader = self.reader()?;
        let mut stmt =
            reader.prepare("SELECT id, sector, user_id, v FROM vectors ORDER BY id ASC")?;
        let rows = stmt.query_map([], row_to_vector)?;
        let mut out = Vec::new();
        for row in rows {
            if let Some(vr) = row? {
                out.push(vr);
            }
        }
        Ok(out)
    }

    /// Ids whose vectors are owned by the given scope (used for wipe cascade).
    pub fn wipe_vectors(&self, user: Option<&str>) -> Result<usize> {
        let changed = match user {
            Some(u) => self
                .writer()?
                .execute("DELETE FROM vectors WHERE user_id = ?1", params![u])?,
            None => self.writer()?.execute("DELETE FROM vectors", [])?,
        };
        Ok(changed)
    }

    pub fn count_vectors(&self) -> Result<u64> {
        let reader = self.reader()?;
        let count: i64 = reader.query_row("SELECT COUNT(*) FROM vectors", [], |r| r.get(0))?;
        Ok(count as u64)
    }

    // ========================================================================
    // WAYPOINTS
    // ========================================================================

    pub fn insert_waypoint(&self, waypoint: &WaypointRecord) -> Result<()> {
        let members =
            serde_json::to_string(&waypoint.member_ids).unwrap_or_else(|_| "[]".to_string());
        self.writer()?.execute(
            "INSERT OR REPLACE INTO waypoints (id, sector, mean_v, member_ids, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                waypoint.id,
                waypoint.sector.as_str(),
                vector_to_bytes(&waypoint.mean),
                members,
                to_millis(waypoint.created_at),
            ],
        )?;
        Ok(())
    }

    /// Replace a waypoint's centroid and membership after a join/leave.
    pub fn update_waypoint(&self, id: &str, mean: &[f32], member_ids: &[String]) -> Result<()> {
        let members = serde_json::to_string(member_ids).unwrap_or_else(|_| "[]".to_string());
        self.writer()?.execute(
            "UPDATE waypoints SET mean_v = ?1, member_ids = ?2 WHERE id = ?3",
            params![vector_to_bytes(mean), members, id],
        )?;
        Ok(())
    }

    pub fn get_waypoint(&self, id: &str) -> Result<Option<WaypointRecord>> {
        let reader = self.reader()?;
        let mut stmt = reader.prepare(
            "SELECT id, sector, mean_v, member_ids, created_at FROM waypoints WHERE id = ?1",
        )?;
        match stmt.query_row(params![id], row_to_waypoint).optional()? {
            Some(w) => Ok(w),
            None => Ok(None),
        }
    }

    pub fn waypoints_by_sector(&self, sector: Sector) -> Result<Vec<WaypointRecord>> {
        let reader = self.reader()?;
        let mut stmt = reader.prepare(
            "SELECT id, sector, mean_v, member_ids, created_at
             FROM waypoints WHERE sector = ?1 ORDER BY id ASC",
        )?;
        let rows = stmt.query_map(params![sector.as_str()], row_to_waypoint)?;
        let mut out = Vec::new();
        for row in rows {
            if let Some(w) = row? {
                out.push(w);
            }
        }
        Ok(out)
    }

    pub fn delete_waypoint(&self, id: &str) -> Result<bool> {
        self.writer()?
            .execute("DELETE FROM waypoint_edges WHERE a = ?1 OR b = ?1", params![id])?;
        let changed = self
            .writer()?
            .execute("DELETE FROM waypoints WHERE id = ?1", params![id])?;
        Ok(changed > 0)
    }

    pub fn wipe_waypoints(&self) -> Result<()> {
        let writer = self.writer()?;
        writer.execute("DELETE FROM waypoint_edges", [])?;
        writer.execute("DELETE FROM waypoints", [])?;
        Ok(())
    }

    pub fn count_waypoints(&self) -> Result<u64> {
        let reader = self.reader()?;
        let count: i64 = reader.query_row("SELECT COUNT(*) FROM waypoints", [], |r| r.get(0))?;
        Ok(count as u64)
    }

    // ========================================================================
    // WAYPOINT EDGES
    // ========================================================================

    /// Accumulate coactivation weight onto an undirected edge. Stored with
    /// a < b; the increment is atomic so concurrent workers compose.
    pub fn accumulate_waypoint_edge(
        &self,
        a: &str,
        b: &str,
        delta: f64,
        now: DateTime<Utc>,
    ) -> Result<()> {
        if a == b {
            return Err(EngineError::Internal(
                "waypoint edge endpoints must differ".to_string(),
            ));
        }
        let (lo, hi) = if a < b { (a, b) } else { (b, a) };
        self.writer()?.execute(
            "INSERT INTO waypoint_edges (a, b, weight, last_activated_at)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(a, b) DO UPDATE SET
                weight = weight + excluded.weight,
                last_activated_at = excluded.last_activated_at",
            params![lo, hi, delta, to_millis(now)],
        )?;
        Ok(())
    }

    /// Neighbors of a waypoint with edge weights, strongest first.
    pub fn edges_for_waypoint(&self, id: &str) -> Result<Vec<(String, f64)>> {
        let reader = self.reader()?;
        let mut stmt = reader.prepare(
            "SELECT CASE WHEN a = ?1 THEN b ELSE a END AS other, weight
             FROM waypoint_edges WHERE a = ?1 OR b = ?1
             ORDER BY weight DESC, other ASC",
        )?;
        let rows = stmt.query_map(params![id], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, f64>(1)?))
        })?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Into::into)
    }

    pub fn count_waypoint_edges(&self) -> Result<u64> {
        let reader = self.reader()?;
        let count: i64 =
            reader.query_row("SELECT COUNT(*) FROM waypoint_edges", [], |r| r.get(0))?;
        Ok(count as u64)
    }

    // ========================================================================
    // TEMPORAL FACTS
    // ========================================================================

    pub fn insert_fact(&self, fact: &TemporalFact) -> Result<()> {
        let bind = fact_params(fact);
        let refs: Vec<&dyn ToSql> = bind.iter().map(|b| b.as_ref()).collect();
        self.writer()?.execute(
            "INSERT INTO temporal_facts (
                id, user_id, subject, predicate, object,
                valid_from, valid_to, confidence, last_updated, metadata
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            refs.as_slice(),
        )?;
        Ok(())
    }

    /// Close any currently-open facts for (user, subject, predicate) at the
    /// supersession instant. Returns how many were closed.
    pub fn close_open_facts(
        &self,
        user_id: &str,
        subject: &str,
        predicate: &str,
        at: DateTime<Utc>,
    ) -> Result<usize> {
        let changed = self.writer()?.execute(
            "UPDATE temporal_facts
             SET valid_to = ?1, last_updated = ?1
             WHERE user_id = ?2 AND subject = ?3 AND predicate = ?4
               AND valid_to IS NULL AND valid_from < ?1",
            params![to_millis(at), user_id, subject, predicate],
        )?;
        Ok(changed)
    }

    /// Atomic batch insert with per-fact auto-close: all-or-nothing.
    pub fn insert_facts_batch(&self, facts: &[TemporalFact]) -> Result<()> {
        let mut writer = self.writer()?;
        let tx = writer.transaction()?;
        {
            let mut close = tx.prepare(
                "UPDATE temporal_facts
                 SET valid_to = ?1, last_updated = ?1
                 WHERE user_id = ?2 AND subject = ?3 AND predicate = ?4
                   AND valid_to IS NULL AND valid_from < ?1",
            )?;
            let mut insert = tx.prepare(
                "INSERT INTO temporal_facts (
                    id, user_id, subject, predicate, object,
                    valid_from, valid_to, confidence, last_updated, metadata
                 ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            )?;
            for fact in facts {
                if fact.valid_to.is_none() {
                    close.execute(params![
                        to_millis(fact.valid_from),
                        fact.user_id,
                        fact.subject,
                        fact.predicate
                    ])?;
                }
                let bind = fact_params(fact);
                let refs: Vec<&dyn ToSql> = bind.iter().map(|b| b.as_ref()).collect();
                insert.execute(refs.as_slice())?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    pub fn get_fact(&self, id: &str) -> Result<Option<TemporalFact>> {
        let reader = self.reader()?;
        let mut stmt = reader.prepare(&format!("{FACT_SELECT} WHERE id = ?1"))?;
        stmt.query_row(params![id], row_to_fact)
            .optional()
            .map_err(Into::into)
    }

    /// As-of query: facts whose validity interval contains `t`, matching the
    /// provided patterns (None = wildcard), confidence >= min_conf.
    #[allow(clippy::too_many_arguments)]
    pub fn facts_at(
        &self,
        user: Option<&str>,
        subject: Option<&str>,
        predicate: Option<&str>,
        object: Option<&str>,
        t: DateTime<Utc>,
        min_conf: f64,
        limit: usize,
    ) -> Result<Vec<TemporalFact>> {
        let mut sql = format!(
            "{FACT_SELECT} WHERE valid_from <= ?1
             AND (valid_to IS NULL OR valid_to > ?1)
             AND confidence >= ?2"
        );
        let mut bind: Vec<Box<dyn ToSql>> =
            vec![Box::new(to_millis(t)), Box::new(min_conf)];
        push_scope(&mut sql, &mut bind, user, subject, predicate, object);
        sql.push_str(" ORDER BY confidence DESC, valid_from DESC, id ASC LIMIT ?");
        bind.push(Box::new(limit as i64));

        self.query_facts(&sql, &bind)
    }

    /// The single current (open) fact for (user?, subject, predicate).
    pub fn current_fact(
        &self,
        user: Option<&str>,
        subject: &str,
        predicate: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<TemporalFact>> {
        let mut sql = format!(
            "{FACT_SELECT} WHERE subject = ?1 AND predicate = ?2
             AND valid_to IS NULL AND valid_from <= ?3"
        );
        let mut bind: Vec<Box<dyn ToSql>> = vec![
            Box::new(subject.to_string()),
            Box::new(predicate.to_string()),
            Box::new(to_millis(now)),
        ];
        if let Some(u) = user {
            sql.push_str(" AND user_id = ?");
            bind.push(Box::new(u.to_string()));
        }
        sql.push_str(" ORDER BY valid_from DESC, confidence DESC LIMIT 1");
        Ok(self.query_facts(&sql, &bind)?.into_iter().next())
    }

    /// Range query: any fact whose validity interval overlaps [from, to]
    /// (open bounds when absent).
    pub fn facts_in_range(
        &self,
        user: Option<&str>,
        subject: Option<&str>,
        predicate: Option<&str>,
        from: Option<DateTime<Utc>>,
        to: Option<DateTime<Utc>>,
        limit: usize,
    ) -> Result<Vec<TemporalFact>> {
        let mut sql = format!("{FACT_SELECT} WHERE 1=1");
        let mut bind: Vec<Box<dyn ToSql>> = Vec::new();
        if let Some(to) = to {
            sql.push_str(" AND valid_from <= ?");
            bind.push(Box::new(to_millis(to)));
        }
        if let Some(from) = from {
            sql.push_str(" AND (valid_to IS NULL OR valid_to >= ?)");
            bind.push(Box::new(to_millis(from)));
        }
        push_scope(&mut sql, &mut bind, user, subject, predicate, None);
        sql.push_str(" ORDER BY valid_from DESC, confidence DESC, id ASC LIMIT ?");
        bind.push(Box::new(limit as i64));

        self.query_facts(&sql, &bind)
    }

    /// Case-sensitive substring search over one field, intersected with an
    /// as-of instant. Capped at 100 rows.
    pub fn search_facts(
        &self,
        user: Option<&str>,
        pattern: &str,
        field: FactField,
        t: DateTime<Utc>,
    ) -> Result<Vec<TemporalFact>> {
        // instr() is byte-wise and case-sensitive, unlike LIKE.
        let column = field.column();
        let mut sql = format!(
            "{FACT_SELECT} WHERE instr({column}, ?1) > 0
             AND valid_from <= ?2 AND (valid_to IS NULL OR valid_to > ?2)"
        );
        let mut bind: Vec<Box<dyn ToSql>> = vec![
            Box::new(pattern.to_string()),
            Box::new(to_millis(t)),
        ];
        if let Some(u) = user {
            sql.push_str(" AND user_id = ?");
            bind.push(Box::new(u.to_string()));
        }
        sql.push_str(" ORDER BY confidence DESC, valid_from DESC, id ASC LIMIT 100");
        self.query_facts(&sql, &bind)
    }

    /// All facts active at `t` for (user?, subject, predicate); two or more
    /// rows constitute a conflict.
    pub fn conflicting_facts(
        &self,
        user: Option<&str>,
        subject: &str,
        predicate: &str,
        t: DateTime<Utc>,
    ) -> Result<Vec<TemporalFact>> {
        self.facts_at(user, Some(subject), Some(predicate), None, t, 0.0, 1000)
    }

    pub fn facts_by_subject(
        &self,
        user: Option<&str>,
        subject: &str,
        limit: usize,
    ) -> Result<Vec<TemporalFact>> {
        let mut sql = format!("{FACT_SELECT} WHERE subject = ?1");
        let mut bind: Vec<Box<dyn ToSql>> = vec![Box::new(subject.to_string())];
        if let Some(u) = user {
            sql.push_str(" AND user_id = ?");
            bind.push(Box::new(u.to_string()));
        }
        sql.push_str(" ORDER BY valid_from DESC, confidence DESC LIMIT ?");
        bind.push(Box::new(limit as i64));
        self.query_facts(&sql, &bind)
    }

    /// Mutate confidence and/or metadata only; (s, p, o) are immutable.
    pub fn update_fact_row(
        &self,
        id: &str,
        confidence: Option<f64>,
        metadata: Option<&serde_json::Map<String, serde_json::Value>>,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        let mut sql = String::from("UPDATE temporal_facts SET last_updated = ?");
        let mut bind: Vec<Box<dyn ToSql>> = vec![Box::new(to_millis(now))];
        if let Some(c) = confidence {
            sql.push_str(", confidence = ?");
            bind.push(Box::new(c));
        }
        if let Some(m) = metadata {
            sql.push_str(", metadata = ?");
            bind.push(Box::new(
                serde_json::to_string(m).unwrap_or_else(|_| "{}".to_string()),
            ));
        }
        sql.push_str(" WHERE id = ?");
        bind.push(Box::new(id.to_string()));

        let refs: Vec<&dyn ToSql> = bind.iter().map(|b| b.as_ref()).collect();
        let changed = self.writer()?.execute(&sql, refs.as_slice())?;
        Ok(changed > 0)
    }

    pub fn invalidate_fact_row(&self, id: &str, valid_to: DateTime<Utc>, now: DateTime<Utc>) -> Result<bool> {
        let changed = self.writer()?.execute(
            "UPDATE temporal_facts SET valid_to = ?1, last_updated = ?2 WHERE id = ?3",
            params![to_millis(valid_to), to_millis(now), id],
        )?;
        Ok(changed > 0)
    }

    pub fn delete_fact_row(&self, id: &str) -> Result<bool> {
        let writer = self.writer()?;
        writer.execute(
            "DELETE FROM temporal_edges WHERE source_id = ?1 OR target_id = ?1",
            params![id],
        )?;
        let changed = writer.execute("DELETE FROM temporal_facts WHERE id = ?1", params![id])?;
        Ok(changed > 0)
    }

    pub fn wipe_facts(&self, user: Option<&str>) -> Result<usize> {
        let writer = self.writer()?;
        let changed = match user {
            Some(u) => {
                writer.execute("DELETE FROM temporal_edges WHERE user_id = ?1", params![u])?;
                writer.execute("DELETE FROM temporal_facts WHERE user_id = ?1", params![u])?
            }
            None => {
                writer.execute("DELETE FROM temporal_edges", [])?;
                writer.execute("DELETE FROM temporal_facts", [])?
            }
        };
        Ok(changed)
    }

    pub fn count_facts(&self) -> Result<u64> {
        let reader = self.reader()?;
        let count: i64 =
            reader.query_row("SELECT COUNT(*) FROM temporal_facts", [], |r| r.get(0))?;
        Ok(count as u64)
    }

    fn query_facts(&self, sql: &str, bind: &[Box<dyn ToSql>]) -> Result<Vec<TemporalFact>> {
        let reader = self.reader()?;
        let mut stmt = reader.prepare(sql)?;
        let refs: Vec<&dyn ToSql> = bind.iter().map(|b| b.as_ref()).collect();
        let rows = stmt.query_map(refs.as_slice(), row_to_fact)?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Into::into)
    }

    // ========================================================================
    // TEMPORAL EDGES
    // ========================================================================

    pub fn insert_temporal_edge(&self, edge: &TemporalEdge) -> Result<()> {
        self.writer()?.execute(
            "INSERT OR REPLACE INTO temporal_edges (
                source_id, target_id, relation_type, weight, valid_from, valid_to, user_id
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                edge.source_id,
                edge.target_id,
                edge.relation_type,
                edge.weight,
                edge.valid_from.map(to_millis),
                edge.valid_to.map(to_millis),
                edge.user_id,
            ],
        )?;
        Ok(())
    }

    /// Edges touching a fact in either direction.
    pub fn edges_for_fact(&self, fact_id: &str) -> Result<Vec<TemporalEdge>> {
        let reader = self.reader()?;
        let mut stmt = reader.prepare(
            "SELECT source_id, target_id, relation_type, weight, valid_from, valid_to, user_id
             FROM temporal_edges WHERE source_id = ?1 OR target_id = ?1
             ORDER BY weight DESC",
        )?;
        let rows = stmt.query_map(params![fact_id], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, f64>(3)?,
                row.get::<_, Option<i64>>(4)?,
                row.get::<_, Option<i64>>(5)?,
                row.get::<_, String>(6)?,
            ))
        })?;
        let mut out = Vec::new();
        for row in rows {
            let (source_id, target_id, relation_type, weight, from_ms, to_ms, user_id) = row?;
            out.push(TemporalEdge {
                source_id,
                target_id,
                relation_type,
                weight,
                valid_from: from_ms.map(from_millis).transpose()?,
                valid_to: to_ms.map(from_millis).transpose()?,
                user_id,
            });
        }
        Ok(out)
    }

    // ========================================================================
    // COACTIVATION JOBS
    // ========================================================================

    /// Enqueue one durable job row. Cost of publishing a coactivation: one
    /// insert.
    pub fn enqueue_coactivation(&self, payload_json: &str, now: DateTime<Utc>) -> Result<String> {
        let id = Uuid::new_v4().to_string();
        let now_ms = to_millis(now);
        self.writer()?.execute(
            "INSERT INTO coactivation_jobs (id, status, payload, retries, enqueued_at, updated_at, next_attempt_at)
             VALUES (?1, 'pending', ?2, 0, ?3, ?3, ?3)",
            params![id, payload_json, now_ms],
        )?;
        Ok(id)
    }

    /// Claim a batch of runnable jobs: pending rows whose next attempt is
    /// due, flipped to running inside one transaction so concurrent workers
    /// never double-claim.
    pub fn claim_coactivation_jobs(
        &self,
        limit: usize,
        now: DateTime<Utc>,
    ) -> Result<Vec<CoactivationJob>> {
        let mut writer = self.writer()?;
        let tx = writer.transaction()?;
        let jobs = {
            let mut stmt = tx.prepare(
                "SELECT id, status, payload, retries, last_error, enqueued_at, updated_at, next_attempt_at
                 FROM coactivation_jobs
                 WHERE status = 'pending' AND next_attempt_at <= ?1
                 ORDER BY enqueued_at ASC LIMIT ?2",
            )?;
            let rows = stmt.query_map(params![to_millis(now), limit as i64], row_to_job)?;
            let mut jobs = Vec::new();
            for row in rows {
                if let Some(job) = row? {
                    jobs.push(job);
                }
            }
            let mut mark = tx.prepare(
                "UPDATE coactivation_jobs SET status = 'running', updated_at = ?1 WHERE id = ?2",
            )?;
            for job in &jobs {
                mark.execute(params![to_millis(now), job.id])?;
            }
            jobs
        };
        tx.commit()?;
        Ok(jobs)
    }

    pub fn complete_coactivation(&self, id: &str, now: DateTime<Utc>) -> Result<()> {
        self.writer()?.execute(
            "UPDATE coactivation_jobs SET status = 'done', updated_at = ?1 WHERE id = ?2",
            params![to_millis(now), id],
        )?;
        Ok(())
    }

    /// Record a failure: either re-enqueue with a future attempt time, or
    /// mark terminally failed.
    pub fn fail_coactivation(
        &self,
        id: &str,
        error: &str,
        retries: u32,
        next_attempt: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> Result<()> {
        match next_attempt {
            Some(at) => {
                self.writer()?.execute(
                    "UPDATE coactivation_jobs
                     SET status = 'pending', retries = ?1, last_error = ?2,
                         next_attempt_at = ?3, updated_at = ?4
                     WHERE id = ?5",
                    params![retries, error, to_millis(at), to_millis(now), id],
                )?;
            }
            None => {
                self.writer()?.execute(
                    "UPDATE coactivation_jobs
                     SET status = 'failed', retries = ?1, last_error = ?2, updated_at = ?3
                     WHERE id = ?4",
                    params![retries, error, to_millis(now), id],
                )?;
            }
        }
        Ok(())
    }

    pub fn count_pending_coactivations(&self) -> Result<u64> {
        let reader = self.reader()?;
        let count: i64 = reader.query_row(
            "SELECT COUNT(*) FROM coactivation_jobs WHERE status = 'pending'",
            [],
            |r| r.get(0),
        )?;
        Ok(count as u64)
    }
}

// ============================================================================
// ROW MAPPERS
// ============================================================================

const FACT_SELECT: &str = "SELECT id, user_id, subject, predicate, object,
    valid_from, valid_to, confidence, last_updated, metadata FROM temporal_facts";

fn push_scope(
    sql: &mut String,
    bind: &mut Vec<Box<dyn ToSql>>,
    user: Option<&str>,
    subject: Option<&str>,
    predicate: Option<&str>,
    object: Option<&str>,
) {
    if let Some(u) = user {
        sql.push_str(" AND user_id = ?");
        bind.push(Box::new(u.to_string()));
    }
    if let Some(s) = subject {
        sql.push_str(" AND subject = ?");
        bind.push(Box::new(s.to_string()));
    }
    if let Some(p) = predicate {
        sql.push_str(" AND predicate = ?");
        bind.push(Box::new(p.to_string()));
    }
    if let Some(o) = object {
        sql.push_str(" AND object = ?");
        bind.push(Box::new(o.to_string()));
    }
}

fn fact_params(fact: &TemporalFact) -> Vec<Box<dyn ToSql>> {
    vec![
        Box::new(fact.id.clone()),
        Box::new(fact.user_id.clone()),
        Box::new(fact.subject.clone()),
        Box::new(fact.predicate.clone()),
        Box::new(fact.object.clone()),
        Box::new(to_millis(fact.valid_from)),
        Box::new(fact.valid_to.map(to_millis)),
        Box::new(fact.confidence),
        Box::new(to_millis(fact.last_updated)),
        Box::new(serde_json::to_string(&fact.metadata).unwrap_or_else(|_| "{}".to_string())),
    ]
}

fn row_to_memory(row: &rusqlite::Row<'_>) -> rusqlite::Result<MemoryRecord> {
    let primary_raw: String = row.get(3)?;
    let primary_sector = Sector::parse_name(&primary_raw).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            3,
            rusqlite::types::Type::Text,
            format!("unknown sector '{primary_raw}'").into(),
        )
    })?;
    let sectors_json: String = row.get(4)?;
    let tags_json: String = row.get(5)?;
    let metadata_json: String = row.get(6)?;
    let created_ms: i64 = row.get(8)?;
    let seen_ms: i64 = row.get(9)?;

    Ok(MemoryRecord {
        id: row.get(0)?,
        user_id: row.get(1)?,
        content: row.get(2)?,
        primary_sector,
        sectors: serde_json::from_str(&sectors_json).unwrap_or_else(|_| vec![primary_sector]),
        tags: serde_json::from_str(&tags_json).unwrap_or_default(),
        metadata: serde_json::from_str(&metadata_json).unwrap_or_default(),
        salience: row.get(7)?,
        created_at: DateTime::<Utc>::from_timestamp_millis(created_ms).unwrap_or_default(),
        last_seen_at: DateTime::<Utc>::from_timestamp_millis(seen_ms).unwrap_or_default(),
    })
}

/// Vector rows with an unknown sector name or corrupted blob decode to
/// `None` and are skipped by callers.
fn row_to_vector(row: &rusqlite::Row<'_>) -> rusqlite::Result<Option<VectorRow>> {
    let sector_raw: String = row.get(1)?;
    let Some(sector) = Sector::parse_name(&sector_raw) else {
        return Ok(None);
    };
    let blob: Vec<u8> = row.get(3)?;
    let Some(vector) = vector_from_bytes(&blob) else {
        return Ok(None);
    };
    Ok(Some(VectorRow {
        id: row.get(0)?,
        sector,
        user_id: row.get(2)?,
        vector,
    }))
}

fn row_to_waypoint(row: &rusqlite::Row<'_>) -> rusqlite::Result<Option<WaypointRecord>> {
    let sector_raw: String = row.get(1)?;
    let Some(sector) = Sector::parse_name(&sector_raw) else {
        return Ok(None);
    };
    let blob: Vec<u8> = row.get(2)?;
    let Some(mean) = vector_from_bytes(&blob) else {
        return Ok(None);
    };
    let members_json: String = row.get(3)?;
    let created_ms: i64 = row.get(4)?;
    Ok(Some(WaypointRecord {
        id: row.get(0)?,
        sector,
        mean,
        member_ids: serde_json::from_str(&members_json).unwrap_or_default(),
        created_at: DateTime::<Utc>::from_timestamp_millis(created_ms).unwrap_or_default(),
    }))
}

fn row_to_fact(row: &rusqlite::Row<'_>) -> rusqlite::Result<TemporalFact> {
    let from_ms: i64 = row.get(5)?;
    let to_ms: Option<i64> = row.get(6)?;
    let updated_ms: i64 = row.get(8)?;
    let metadata_json: String = row.get(9)?;
    Ok(TemporalFact {
        id: row.get(0)?,
        user_id: row.get(1)?,
        subject: row.get(2)?,
        predicate: row.get(3)?,
        object: row.get(4)?,
        valid_from: DateTime::<Utc>::from_timestamp_millis(from_ms).unwrap_or_default(),
        valid_to: to_ms.and_then(DateTime::<Utc>::from_timestamp_millis),
        confidence: row.get(7)?,
        last_updated: DateTime::<Utc>::from_timestamp_millis(updated_ms).unwrap_or_default(),
        metadata: serde_json::from_str(&metadata_json).unwrap_or_default(),
    })
}

fn row_to_job(row: &rusqlite::Row<'_>) -> rusqlite::Result<Option<CoactivationJob>> {
    let status_raw: String = row.get(1)?;
    let Some(status) = JobStatus::parse_name(&status_raw) else {
        return Ok(None);
    };
    let payload_json: String = row.get(2)?;
    let Ok(payload) = serde_json::from_str(&payload_json) else {
        return Ok(None);
    };
    let enqueued_ms: i64 = row.get(5)?;
    let updated_ms: i64 = row.get(6)?;
    let next_ms: i64 = row.get(7)?;
    Ok(Some(CoactivationJob {
        id: row.get(0)?,
        status,
        payload,
        retries: row.get::<_, i64>(3)? as u32,
        last_error: row.get(4)?,
        enqueued_at: DateTime::<Utc>::from_timestamp_millis(enqueued_ms).unwrap_or_default(),
        updated_at: DateTime::<Utc>::from_timestamp_millis(updated_ms).unwrap_or_default(),
        next_attempt_at: DateTime::<Utc>::from_timestamp_millis(next_ms).unwrap_or_default(),
    }))
}

// ============================================================================
// TESTS
// ============================================================================
