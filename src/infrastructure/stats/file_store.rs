//! JSON-file backend for recovery strategy statistics.
//!
//! The stats table is tiny (classes times strategies), so the whole table is
//! rewritten atomically on every save: write to a sibling temp file, then
//! rename over the target.

use async_trait::async_trait;
use std::path::PathBuf;
use tokio::fs;
use tracing::debug;

use crate::domain::errors::{OrchestratorError, OrchestratorResult};
use crate::domain::models::StrategyStat;
use crate::domain::ports::RecoveryStatsStore;

pub struct FileStatsStore {
    path: PathBuf,
}

impl FileStatsStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn io_error(context: &str, err: impl std::fmt::Display) -> OrchestratorError {
        OrchestratorError::Unknown {
            message: format!("{context}: {err}"),
            suggestion: None,
            diagnostics: serde_json::Value::Null,
        }
    }
}

#[async_trait]
impl RecoveryStatsStore for FileStatsStore {
    async fn load(&self) -> OrchestratorResult<Vec<StrategyStat>> {
        let raw = match fs::read_to_string(&self.path).await {
            Ok(raw) => raw,
            // A missing file is a fresh start, not an error.
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(Self::io_error("failed to read stats file", err)),
        };
        let stats: Vec<StrategyStat> = serde_json::from_str(&raw)
            .map_err(|err| Self::io_error("stats file is not valid JSON", err))?;
        debug!(path = %self.path.display(), records = stats.len(), "loaded recovery stats");
        Ok(stats)
    }

    async fn save(&self, stats: &[StrategyStat]) -> OrchestratorResult<()> {
        let raw = serde_json::to_string_pretty(stats)
            .map_err(|err| Self::io_error("failed to serialize stats", err))?;

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)
                    .await
                    .map_err(|err| Self::io_error("failed to create stats directory", err))?;
            }
        }

        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, raw)
            .await
            .map_err(|err| Self::io_error("failed to write stats file", err))?;
        fs::rename(&tmp, &self.path)
            .await
            .map_err(|err| Self::io_error("failed to replace stats file", err))?;
        Ok(())
    }
}
