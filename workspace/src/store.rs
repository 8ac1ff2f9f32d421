//! SQLite-backed registry of known projects: when a project's workdir was created and when it
//! was last touched by a turn. Used for housekeeping and project listing, not for turn state
//! itself (that lives on the in-memory Project Lock).

use std::path::Path;
use std::sync::{Arc, Mutex};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("storage: {0}")]
    Storage(String),
}

/// One row per project the engine has ever seen a turn for.
#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
pub struct ProjectWorkdirMeta {
    pub project_id: String,
    /// Milliseconds since Unix epoch.
    pub created_at_ms: i64,
    /// Milliseconds since Unix epoch.
    pub last_accessed_ms: i64,
}

/// SQLite-backed project registry, independent of the engine's in-memory Project Lock map.
pub struct Store {
    db: Arc<Mutex<rusqlite::Connection>>,
}

impl Store {
    /// Opens or creates the database and tables.
    pub fn new(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let conn = rusqlite::Connection::open(path.as_ref())
            .map_err(|e| StoreError::Storage(e.to_string()))?;
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS project_workdirs (
                project_id TEXT PRIMARY KEY,
                created_at INTEGER NOT NULL,
                last_accessed INTEGER NOT NULL
            );
            "#,
        )
        .map_err(|e| StoreError::Storage(e.to_string()))?;
        Ok(Self {
            db: Arc::new(Mutex::new(conn)),
        })
    }

    /// Records a turn for `project_id`: inserts a fresh row or bumps `last_accessed`.
    pub async fn touch_project(&self, project_id: &str, now_ms: i64) -> Result<(), StoreError> {
        let db = self.db.clone();
        let project_id = project_id.to_string();
        tokio::task::block_in_place(|| {
            let conn = db.lock().map_err(|_| StoreError::Storage("lock".into()))?;
            conn.execute(
                "INSERT INTO project_workdirs (project_id, created_at, last_accessed)
                 VALUES (?1, ?2, ?2)
                 ON CONFLICT(project_id) DO UPDATE SET last_accessed = excluded.last_accessed",
                rusqlite::params![project_id, now_ms],
            )
            .map_err(|e| StoreError::Storage(e.to_string()))?;
            Ok(())
        })
    }

    /// Lists all known projects, most recently touched first.
    pub async fn list_projects(&self) -> Result<Vec<ProjectWorkdirMeta>, StoreError> {
        let db = self.db.clone();
        tokio::task::block_in_place(|| {
            let conn = db.lock().map_err(|_| StoreError::Storage("lock".into()))?;
            let mut stmt = conn
                .prepare(
                    "SELECT project_id, created_at, last_accessed FROM project_workdirs
                     ORDER BY last_accessed DESC",
                )
                .map_err(|e| StoreError::Storage(e.to_string()))?;
            let rows = stmt
                .query_map([], |row| {
                    Ok(ProjectWorkdirMeta {
                        project_id: row.get(0)?,
                        created_at_ms: row.get(1)?,
                        last_accessed_ms: row.get(2)?,
                    })
                })
                .map_err(|e| StoreError::Storage(e.to_string()))?;
            rows.collect::<Result<Vec<_>, _>>()
                .map_err(|e| StoreError::Storage(e.to_string()))
        })
    }

    /// Drops a project's registry row. Does not touch its workdir on disk.
    pub async fn remove_project(&self, project_id: &str) -> Result<(), StoreError> {
        let db = self.db.clone();
        let project_id = project_id.to_string();
        tokio::task::block_in_place(|| {
            let conn = db.lock().map_err(|_| StoreError::Storage("lock".into()))?;
            conn.execute(
                "DELETE FROM project_workdirs WHERE project_id = ?1",
                rusqlite::params![project_id],
            )
            .map_err(|e| StoreError::Storage(e.to_string()))?;
            Ok(())
        })
    }
}
