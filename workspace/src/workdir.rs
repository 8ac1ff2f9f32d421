//! Resolves the on-disk root for a project's scratch space (spec §5/§6 disk layout).

use std::path::{Path, PathBuf};

/// Replaces every character outside `[A-Za-z0-9_-]` with `_`, so a `project_id` can never escape
/// its workdir root via `..`, path separators, or other filesystem-meaningful characters.
pub fn sanitize_project_id(project_id: &str) -> String {
    project_id
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' || c == '-' { c } else { '_' })
        .collect()
}

/// The subdirectories under a single project's workdir root.
pub struct ProjectDirs {
    pub root: PathBuf,
    pub uploads_root: PathBuf,
    pub uploads_meta_dir: PathBuf,
}

/// Resolves `<root>/<sanitized-project>` and its fixed subdirectories. `root` is typically
/// `Settings::resolved_workdir()` from `cowork-config`.
#[derive(Clone, Debug)]
pub struct WorkdirResolver {
    root: PathBuf,
}

impl WorkdirResolver {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// The project's workdir, without touching the filesystem.
    pub fn project_dir(&self, project_id: &str) -> PathBuf {
        self.root.join(sanitize_project_id(project_id))
    }

    /// Creates the project's workdir and its `uploads/` subtree if missing, returning the
    /// resolved paths.
    pub fn ensure_project_dirs(&self, project_id: &str) -> std::io::Result<ProjectDirs> {
        let root = self.project_dir(project_id);
        let uploads_root = root.join("uploads");
        let uploads_meta_dir = uploads_root.join("meta");
        std::fs::create_dir_all(&uploads_meta_dir)?;
        Ok(ProjectDirs {
            root,
            uploads_root,
            uploads_meta_dir,
        })
    }

    /// Bucket directory for an upload (e.g. `uploads/attachments/`), created if missing.
    pub fn ensure_upload_bucket(&self, project_id: &str, bucket: &str) -> std::io::Result<PathBuf> {
        let dir = self.project_dir(project_id).join("uploads").join(bucket);
        std::fs::create_dir_all(&dir)?;
        Ok(dir)
    }

    /// True if `candidate` resolves to a path inside the given project's workdir, after
    /// canonicalizing both sides. Used to constrain `GET /files/generated/{project_id}/download`
    /// to the project's own scratch space.
    pub fn contains(&self, project_id: &str, candidate: &Path) -> bool {
        let project_root = self.project_dir(project_id);
        match (project_root.canonicalize(), candidate.canonicalize()) {
            (Ok(root), Ok(candidate)) => candidate.starts_with(root),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitizes_path_separators_and_traversal() {
        assert_eq!(sanitize_project_id("../../etc/passwd"), "______etc_passwd");
        assert_eq!(sanitize_project_id("proj-1_ok"), "proj-1_ok");
    }

    #[test]
    fn ensure_project_dirs_creates_uploads_subtree() {
        let tmp = tempfile::tempdir().unwrap();
        let resolver = WorkdirResolver::new(tmp.path());
        let dirs = resolver.ensure_project_dirs("proj/../evil").unwrap();
        assert!(dirs.uploads_meta_dir.exists());
        assert!(dirs.root.starts_with(tmp.path()));
    }

    #[test]
    fn contains_rejects_paths_outside_project_root() {
        let tmp = tempfile::tempdir().unwrap();
        let resolver = WorkdirResolver::new(tmp.path());
        resolver.ensure_project_dirs("p1").unwrap();
        resolver.ensure_project_dirs("p2").unwrap();
        let inside = resolver.project_dir("p1").join("uploads");
        let outside = resolver.project_dir("p2");
        assert!(resolver.contains("p1", &inside));
        assert!(!resolver.contains("p1", &outside));
    }
}
