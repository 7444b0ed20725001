//! Append-only cost ledger
//!
//! One JSON object per line. Rows are only ever appended; reading returns
//! every row in file order.

use crate::config::CostConfig;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, ErrorKind, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::info;

/// Ledger errors
#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("Failed to access ledger '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to encode ledger row: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("Malformed ledger row at {path}:{line}: {source}")]
    Parse {
        path: String,
        line: usize,
        #[source]
        source: serde_json::Error,
    },
}

/// Usage of one model during one run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerRow {
    pub timestamp: DateTime<Utc>,
    pub run_id: String,
    pub model: String,
    pub call_count: u64,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub total_tokens: u64,
    /// USD
    pub input_cost: f64,
    pub output_cost: f64,
    pub total_cost: f64,
}

/// Writes and reads a JSON Lines ledger file
#[derive(Debug, Clone)]
pub struct LedgerWriter {
    path: PathBuf,
}

impl LedgerWriter {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Writer for the configured ledger path, if any
    pub fn from_config(config: &CostConfig) -> Option<Self> {
        config.ledger_path.as_ref().map(|p| Self::new(p.clone()))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn io_error(&self, source: std::io::Error) -> LedgerError {
        LedgerError::Io {
            path: self.path.display().to_string(),
            source,
        }
    }

    /// Append rows, creating the file and its directory if needed
    pub fn append(&self, rows: &[LedgerRow]) -> Result<usize, LedgerError> {
        if rows.is_empty() {
            return Ok(0);
        }

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| self.io_error(e))?;
        }

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| self.io_error(e))?;
        let mut writer = BufWriter::new(file);

        for row in rows {
            let line = serde_json::to_string(row)?;
            writeln!(writer, "{}", line).map_err(|e| self.io_error(e))?;
        }
        writer.flush().map_err(|e| self.io_error(e))?;

        info!(path = %self.path.display(), rows = rows.len(), "ledger rows appended");
        Ok(rows.len())
    }

    /// Every row in the ledger. A missing file is an empty ledger.
    pub fn read_all(&self) -> Result<Vec<LedgerRow>, LedgerError> {
        let file = match File::open(&self.path) {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(self.io_error(e)),
        };

        let mut rows = Vec::new();
        for (index, line) in BufReader::new(file).lines().enumerate() {
            let line = line.map_err(|e| self.io_error(e))?;
            if line.trim().is_empty() {
                continue;
            }
            let row = serde_json::from_str(&line).map_err(|source| LedgerError::Parse {
                path: self.path.display().to_string(),
                line: index + 1,
                source,
            })?;
            rows.push(row);
        }
        Ok(rows)
    }
}
