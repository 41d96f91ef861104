//! Intermediate markup snapshots for troubleshooting extraction.
//!
//! File names are fixed, so two conversions sharing a `dir` overwrite each
//! other's snapshots. Write failures are logged and never reach the caller.

use std::path::{Path, PathBuf};

/// Snapshot sink; a no-op unless enabled.
#[derive(Debug, Clone, Default)]
pub struct DebugSnapshots {
    dir: Option<PathBuf>,
}

impl DebugSnapshots {
    /// Snapshots written into `dir`.
    pub fn enabled(dir: impl Into<PathBuf>) -> Self {
        Self { dir: Some(dir.into()) }
    }

    /// Snapshots discarded.
    pub fn disabled() -> Self {
        Self { dir: None }
    }

    pub fn new(enabled: bool, dir: &Path) -> Self {
        if enabled { Self::enabled(dir) } else { Self::disabled() }
    }

    /// Write `contents` to `dir/name`, if enabled.
    pub async fn save(&self, name: &str, contents: &str) {
        let Some(dir) = &self.dir else {
            return;
        };

        let path = dir.join(name);
        match tokio::fs::write(&path, contents).await {
            Ok(()) => tracing::debug!(path = %path.display(), bytes = contents.len(), "saved debug snapshot"),
            Err(e) => tracing::warn!(path = %path.display(), error = %e, "failed to save debug snapshot"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_disabled_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let snapshots = DebugSnapshots::new(false, dir.path());
        snapshots.save("paper.html", "<h1>T</h1>").await;
        assert!(!dir.path().join("paper.html").exists());
    }

    #[tokio::test]
    async fn test_enabled_writes_file() {
        let dir = tempfile::tempdir().unwrap();
        let snapshots = DebugSnapshots::new(true, dir.path());
        snapshots.save("paper.html", "<h1>T</h1>").await;
        let written = std::fs::read_to_string(dir.path().join("paper.html")).unwrap();
        assert_eq!(written, "<h1>T</h1>");
    }

    #[tokio::test]
    async fn test_write_failure_is_swallowed() {
        let dir = tempfile::tempdir().unwrap();
        let snapshots = DebugSnapshots::enabled(dir.path().join("missing").join("nested"));
        snapshots.save("paper.html", "x").await;
    }
}
