//! Durable cost log destinations

use async_trait::async_trait;
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tracing::debug;

use super::record::CostRecord;

/// Append-only destination for cost records
#[async_trait]
pub trait CostSink: Send + Sync + fmt::Debug {
    /// Persist one record. The ledger serializes calls.
    async fn append(&self, record: &CostRecord) -> io::Result<()>;

    /// Previously persisted lines, oldest first (used for replay)
    async fn read_lines(&self) -> io::Result<Vec<String>> {
        Ok(Vec::new())
    }
}

/// Cost log stored as a CSV-style text file
#[derive(Debug, Clone)]
pub struct CsvCostLog {
    path: PathBuf,
}

impl CsvCostLog {
    /// Log at `path`; the file and its parent directory are created on first write
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Path of the log file
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl CostSink for CsvCostLog {
    async fn append(&self, record: &CostRecord) -> io::Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        let mut line = record.to_log_line();
        line.push('\n');

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(line.as_bytes()).await?;
        file.flush().await?;

        debug!(path = %self.path.display(), service = %record.service, "cost record appended");
        Ok(())
    }

    async fn read_lines(&self) -> io::Result<Vec<String>> {
        let content = match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e),
        };

        Ok(content
            .lines()
            .filter(|line| !line.trim().is_empty())
            .map(str::to_string)
            .collect())
    }
}
