//! SQLite-backed State Store (C1, §4.7): save/load/checkpoint/cleanup
//! primitives keyed by analysis id.

use std::path::Path;
use std::sync::{Arc, Mutex};

use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::state::{AnalysisState, AnalysisStatus};

const SCHEMA_VERSION: i32 = 1;

fn initialize_schema(conn: &Connection) -> rusqlite::Result<()> {
    conn.pragma_update(None, "journal_mode", "WAL")?;
    conn.pragma_update(None, "foreign_keys", "ON")?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        )",
        [],
    )?;

    let current_version: i32 = conn
        .query_row(
            "SELECT COALESCE(MAX(version), 0) FROM schema_version",
            [],
            |row| row.get(0),
        )
        .unwrap_or(0);

    if current_version < SCHEMA_VERSION {
        conn.execute(
            "CREATE TABLE IF NOT EXISTS analyses (
                analysis_id TEXT PRIMARY KEY,
                status TEXT NOT NULL,
                state_json TEXT NOT NULL,
                is_checkpoint INTEGER NOT NULL DEFAULT 0,
                updated_at TEXT NOT NULL DEFAULT (datetime('now')),
                expires_at TEXT NOT NULL
            )",
            [],
        )?;
        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_analyses_expires ON analyses(expires_at)",
            [],
        )?;
        conn.execute(
            "INSERT INTO schema_version (version) VALUES (?1)",
            params![SCHEMA_VERSION],
        )?;
    }

    Ok(())
}

fn is_initialized(conn: &Connection) -> bool {
    conn.query_row(
        "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name='analyses'",
        [],
        |row| row.get::<_, i32>(0),
    )
    .map(|count| count > 0)
    .unwrap_or(false)
}

/// Per-analysis state persistence, sharded by analysis id; only the owning
/// worker ever writes a given id (§5 shared resources).
pub struct StateStore {
    conn: Arc<Mutex<Connection>>,
}

impl StateStore {
    /// Open or create a state store at the given path.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(path)?;
        if !is_initialized(&conn) {
            initialize_schema(&conn)?;
        }
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// In-memory store, for tests and ephemeral use.
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        initialize_schema(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn with_conn<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> rusqlite::Result<T>,
    {
        let conn = self
            .conn
            .lock()
            .map_err(|e| Error::fatal(format!("state store lock poisoned: {e}")))?;
        Ok(f(&conn)?)
    }

    /// Persist a logical write. `is_checkpoint` distinguishes a stage-boundary
    /// checkpoint from an ad hoc save; checkpoints replace the previous one
    /// because they share the same primary key (§4.7). Error states persist
    /// at 2x the default TTL (§3 lifecycle).
    fn write(&self, state: &AnalysisState, ttl: std::time::Duration, is_checkpoint: bool) -> Result<()> {
        let state_json = serde_json::to_string(state)?;
        let status = format!("{:?}", state.status).to_lowercase();
        let expires_at = (Utc::now() + chrono::Duration::from_std(ttl).unwrap_or_default())
            .to_rfc3339();

        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO analyses (analysis_id, status, state_json, is_checkpoint, updated_at, expires_at)
                 VALUES (?1, ?2, ?3, ?4, datetime('now'), ?5)
                 ON CONFLICT(analysis_id) DO UPDATE SET
                    status = excluded.status,
                    state_json = excluded.state_json,
                    is_checkpoint = excluded.is_checkpoint,
                    updated_at = excluded.updated_at,
                    expires_at = excluded.expires_at",
                params![
                    state.analysis_id.to_string(),
                    status,
                    state_json,
                    is_checkpoint as i32,
                    expires_at,
                ],
            )?;
            Ok(())
        })
    }

    /// Save the initial or fully-updated state (§4.1, §4.7).
    pub fn save(&self, state: &AnalysisState, ttl: std::time::Duration) -> Result<()> {
        let ttl = if matches!(state.status, AnalysisStatus::Failed) {
            ttl * 2
        } else {
            ttl
        };
        self.write(state, ttl, false)
    }

    /// Write a stage-boundary checkpoint (§4.2, §4.7). Replaces the previous
    /// checkpoint for this analysis id.
    pub fn checkpoint(&self, state: &AnalysisState, ttl: std::time::Duration) -> Result<()> {
        let ttl = if matches!(state.status, AnalysisStatus::Failed) {
            ttl * 2
        } else {
            ttl
        };
        self.write(state, ttl, true)
    }

    /// Load the latest checkpoint for an analysis id. Recovery prefers the
    /// checkpoint over any other representation (§4.7); if none exists the
    /// analysis is considered lost (`Ok(None)`), never reconstructed from a
    /// partial progress record (§9 open question).
    pub fn load(&self, analysis_id: Uuid) -> Result<Option<AnalysisState>> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT state_json FROM analyses WHERE analysis_id = ?1",
                params![analysis_id.to_string()],
                |row| row.get::<_, String>(0),
            )
            .optional()
        })?
        .map(|json| serde_json::from_str(&json).map_err(Error::from))
        .transpose()
    }

    /// Enumerate ids currently tracked (not expired), for cleanup and
    /// observability (§4.7 active-workflows enumeration).
    pub fn active_analysis_ids(&self) -> Result<Vec<Uuid>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT analysis_id FROM analyses WHERE expires_at > datetime('now')",
            )?;
            let ids = stmt
                .query_map([], |row| row.get::<_, String>(0))?
                .filter_map(|r| r.ok())
                .filter_map(|s| Uuid::parse_str(&s).ok())
                .collect();
            Ok(ids)
        })
    }

    /// Delete expired entries (§4.7 cleanup primitive).
    pub fn cleanup(&self) -> Result<usize> {
        self.with_conn(|conn| {
            conn.execute(
                "DELETE FROM analyses WHERE expires_at <= datetime('now')",
                [],
            )
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{AnalysisDepth, AnalysisRequest, AttackSession};
    use std::time::Duration;

    fn sample_state() -> AnalysisState {
        let request = AnalysisRequest {
            attack_sessions: vec![
                AttackSession {
                    source_ip: "10.0.0.1".to_string(),
                    timestamp: Utc::now(),
                    payload: "GET / HTTP/1.1".to_string(),
                    target_port: None,
                    protocol: None,
                },
                AttackSession {
                    source_ip: "10.0.0.2".to_string(),
                    timestamp: Utc::now(),
                    payload: "GET / HTTP/1.1".to_string(),
                    target_port: None,
                    protocol: None,
                },
            ],
            analysis_depth: AnalysisDepth::Standard,
            callback_url: None,
        };
        AnalysisState::new(Uuid::new_v4(), request)
    }

    #[test]
    fn save_and_load_round_trips() {
        let store = StateStore::in_memory().unwrap();
        let state = sample_state();
        store.save(&state, Duration::from_secs(3600)).unwrap();

        let loaded = store.load(state.analysis_id).unwrap().unwrap();
        assert_eq!(loaded.analysis_id, state.analysis_id);
    }

    #[test]
    fn load_missing_id_returns_none() {
        let store = StateStore::in_memory().unwrap();
        assert!(store.load(Uuid::new_v4()).unwrap().is_none());
    }

    #[test]
    fn checkpoint_replaces_previous() {
        let store = StateStore::in_memory().unwrap();
        let mut state = sample_state();
        store.checkpoint(&state, Duration::from_secs(3600)).unwrap();

        state.record_step("orchestrator");
        store.checkpoint(&state, Duration::from_secs(3600)).unwrap();

        let loaded = store.load(state.analysis_id).unwrap().unwrap();
        assert_eq!(loaded.metadata.processing_steps.len(), 1);
    }

    #[test]
    fn cleanup_removes_expired_entries() {
        let store = StateStore::in_memory().unwrap();
        let state = sample_state();
        store.save(&state, Duration::from_secs(0)).unwrap();

        std::thread::sleep(std::time::Duration::from_millis(1100));
        let removed = store.cleanup().unwrap();
        assert_eq!(removed, 1);
        assert!(store.load(state.analysis_id).unwrap().is_none());
    }

    #[test]
    fn active_ids_lists_unexpired_analyses() {
        let store = StateStore::in_memory().unwrap();
        let state = sample_state();
        store.save(&state, Duration::from_secs(3600)).unwrap();

        let ids = store.active_analysis_ids().unwrap();
        assert!(ids.contains(&state.analysis_id));
    }

    #[test]
    fn open_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("analyses.sqlite3");
        let state = sample_state();

        {
            let store = StateStore::open(&db_path).unwrap();
            store.save(&state, Duration::from_secs(3600)).unwrap();
        }

        let reopened = StateStore::open(&db_path).unwrap();
        let loaded = reopened.load(state.analysis_id).unwrap().unwrap();
        assert_eq!(loaded.analysis_id, state.analysis_id);
    }
}
