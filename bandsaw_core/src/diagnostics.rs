//! Append-only diagnostic rows, one per accepted adjustment.
//!
//! Each strategy owns exactly one sink. The CSV sink opens its file lazily on
//! the first row and closes it when dropped.

use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use eyre::WrapErr;

use crate::error::Result;

#[derive(Debug, Clone, PartialEq)]
pub struct DiagnosticRecord {
    /// Wall-clock ms since the Unix epoch.
    pub timestamp_ms: u64,
    pub strategy: &'static str,
    pub inputs: Vec<(&'static str, f64)>,
    pub outputs: Vec<(&'static str, f64)>,
    pub multiplier: f64,
}

impl DiagnosticRecord {
    pub fn new(strategy: &'static str, multiplier: f64) -> Self {
        Self {
            timestamp_ms: crate::util::unix_millis(),
            strategy,
            inputs: Vec::new(),
            outputs: Vec::new(),
            multiplier,
        }
    }

    pub fn input(mut self, name: &'static str, v: f64) -> Self {
        self.inputs.push((name, v));
        self
    }

    pub fn output(mut self, name: &'static str, v: f64) -> Self {
        self.outputs.push((name, v));
        self
    }

    /// Column names in row order.
    pub fn header(&self) -> Vec<&'static str> {
        let mut h = vec!["timestamp_ms", "multiplier"];
        h.extend(self.inputs.iter().map(|(n, _)| *n));
        h.extend(self.outputs.iter().map(|(n, _)| *n));
        h
    }

    fn row(&self) -> Vec<String> {
        let mut r = vec![self.timestamp_ms.to_string(), self.multiplier.to_string()];
        r.extend(self.inputs.iter().map(|(_, v)| v.to_string()));
        r.extend(self.outputs.iter().map(|(_, v)| v.to_string()));
        r
    }
}

pub trait DiagnosticSink: Send {
    fn record(&mut self, rec: &DiagnosticRecord) -> Result<()>;
}

/// Discards every row.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl DiagnosticSink for NullSink {
    fn record(&mut self, _rec: &DiagnosticRecord) -> Result<()> {
        Ok(())
    }
}

/// Keeps rows in memory; clones share storage.
#[derive(Debug, Default, Clone)]
pub struct MemorySink {
    rows: Arc<Mutex<Vec<DiagnosticRecord>>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rows(&self) -> Vec<DiagnosticRecord> {
        self.rows
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }
}

impl DiagnosticSink for MemorySink {
    fn record(&mut self, rec: &DiagnosticRecord) -> Result<()> {
        let mut rows = self
            .rows
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        rows.push(rec.clone());
        Ok(())
    }
}

/// CSV file sink. The header comes from the first row written.
#[derive(Debug)]
pub struct CsvDiagnosticSink {
    path: PathBuf,
    writer: Option<csv::Writer<File>>,
    header: Vec<&'static str>,
}

impl CsvDiagnosticSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            writer: None,
            header: Vec::new(),
        }
    }

    /// `<dir>/<strategy>.csv`
    pub fn in_dir(dir: &Path, strategy: &str) -> Self {
        Self::new(dir.join(format!("{strategy}.csv")))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn open(&mut self, rec: &DiagnosticRecord) -> Result<()> {
        if self.writer.is_none() {
            if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent)
                    .wrap_err_with(|| format!("create diagnostics dir {}", parent.display()))?;
            }
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(&self.path)
                .wrap_err_with(|| format!("open diagnostics file {}", self.path.display()))?;
            let fresh = file.metadata().map(|m| m.len() == 0).unwrap_or(true);
            let mut w = csv::WriterBuilder::new()
                .has_headers(false)
                .from_writer(file);
            self.header = rec.header();
            if fresh {
                w.write_record(&self.header)?;
            }
            tracing::debug!(path = %self.path.display(), "diagnostics sink opened");
            self.writer = Some(w);
        }
        Ok(())
    }
}

impl DiagnosticSink for CsvDiagnosticSink {
    fn record(&mut self, rec: &DiagnosticRecord) -> Result<()> {
        self.open(rec)?;
        if self.header != rec.header() {
            eyre::bail!(
                "diagnostic row columns changed for {} (expected {})",
                rec.strategy,
                self.header.join(",")
            );
        }
        let w = self
            .writer
            .as_mut()
            .ok_or_else(|| eyre::eyre!("diagnostics writer unavailable"))?;
        w.write_record(rec.row())?;
        w.flush()?;
        Ok(())
    }
}
