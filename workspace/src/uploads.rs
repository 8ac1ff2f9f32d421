//! Upload persistence: bytes under `uploads/<bucket>/`, metadata under `uploads/meta/<file_id>.json`
//! (spec §6 disk layout). One JSON file per upload, matching the upstream runtime's file-backed
//! metadata store rather than a database table.

use crate::workdir::WorkdirResolver;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum UploadStoreError {
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialize metadata: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("upload not found: {0}")]
    NotFound(String),
}

/// Metadata persisted alongside an uploaded file's bytes.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct UploadMeta {
    pub file_id: String,
    pub project_id: String,
    pub bucket: String,
    pub original_filename: String,
    pub content_type: Option<String>,
    pub size_bytes: u64,
    pub created_at: DateTime<Utc>,
}

/// Writes upload bytes and reads back metadata for a project's workdir.
pub struct UploadStore {
    resolver: WorkdirResolver,
}

impl UploadStore {
    pub fn new(resolver: WorkdirResolver) -> Self {
        Self { resolver }
    }

    /// Persists `bytes` under `uploads/<bucket>/<file_id>` and writes the matching meta JSON.
    /// Returns the assigned `file_id`.
    pub fn store(
        &self,
        project_id: &str,
        bucket: &str,
        original_filename: &str,
        content_type: Option<String>,
        bytes: &[u8],
        now: DateTime<Utc>,
    ) -> Result<String, UploadStoreError> {
        self.resolver.ensure_project_dirs(project_id)?;
        let bucket_dir = self.resolver.ensure_upload_bucket(project_id, bucket)?;
        let file_id = uuid::Uuid::new_v4().to_string();

        std::fs::write(bucket_dir.join(&file_id), bytes)?;

        let meta = UploadMeta {
            file_id: file_id.clone(),
            project_id: project_id.to_string(),
            bucket: bucket.to_string(),
            original_filename: original_filename.to_string(),
            content_type,
            size_bytes: bytes.len() as u64,
            created_at: now,
        };
        let meta_path = self.meta_path(project_id, &file_id);
        std::fs::write(meta_path, serde_json::to_vec_pretty(&meta)?)?;
        Ok(file_id)
    }

    /// Reads back an upload's metadata.
    pub fn read_meta(&self, project_id: &str, file_id: &str) -> Result<UploadMeta, UploadStoreError> {
        let path = self.meta_path(project_id, file_id);
        let content = std::fs::read_to_string(&path)
            .map_err(|_| UploadStoreError::NotFound(file_id.to_string()))?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Resolves the on-disk path of an upload's bytes, given its already-loaded metadata.
    pub fn content_path(&self, meta: &UploadMeta) -> PathBuf {
        self.resolver
            .project_dir(&meta.project_id)
            .join("uploads")
            .join(&meta.bucket)
            .join(&meta.file_id)
    }

    fn meta_path(&self, project_id: &str, file_id: &str) -> PathBuf {
        self.resolver
            .project_dir(project_id)
            .join("uploads")
            .join("meta")
            .join(format!("{file_id}.json"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn fixed_now() -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000, 0).unwrap()
    }

    #[test]
    fn store_then_read_meta_round_trips() {
        let tmp = tempfile::tempdir().unwrap();
        let store = UploadStore::new(WorkdirResolver::new(tmp.path()));

        let file_id = store
            .store(
                "proj-1",
                "attachments",
                "report.pdf",
                Some("application/pdf".to_string()),
                b"hello world",
                fixed_now(),
            )
            .unwrap();

        let meta = store.read_meta("proj-1", &file_id).unwrap();
        assert_eq!(meta.original_filename, "report.pdf");
        assert_eq!(meta.size_bytes, 11);

        let content = std::fs::read(store.content_path(&meta)).unwrap();
        assert_eq!(content, b"hello world");
    }

    #[test]
    fn read_meta_missing_file_is_not_found() {
        let tmp = tempfile::tempdir().unwrap();
        let store = UploadStore::new(WorkdirResolver::new(tmp.path()));
        let err = store.read_meta("proj-1", "does-not-exist").unwrap_err();
        assert!(matches!(err, UploadStoreError::NotFound(_)));
    }
}
