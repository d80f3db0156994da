//! Append-only print records
//!
//! Two files under the work dir: a JSON-lines log with one record per
//! dispatched label, and a plain-text notice log for templates the
//! catalog references but the disk does not have. Both survive worker
//! restarts and are never rewritten, only appended.

use crate::job::LabelFormat;
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use serde::Serialize;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;
use thiserror::Error;

pub type JournalResult<T> = Result<T, JournalError>;

#[derive(Error, Debug)]
pub enum JournalError {
    #[error("Journal IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Journal encode error: {0}")]
    Encode(#[from] serde_json::Error),
}

/// One printed label, as recorded on disk
///
/// Field names match the historical log format so existing records keep
/// parsing alongside new ones.
#[derive(Debug, Clone, Serialize)]
pub struct PrintAttempt {
    #[serde(rename = "fecha")]
    pub at: String,
    #[serde(rename = "tipo")]
    pub kind: String,
    pub color: String,
    #[serde(rename = "tipo_etiqueta")]
    pub format: String,
    #[serde(rename = "id_numero")]
    pub ticket: String,
    #[serde(rename = "codigo_barra")]
    pub barcode: String,
    #[serde(rename = "id_maquina")]
    pub station: String,
    #[serde(rename = "maquina_id")]
    pub machine: i64,
    #[serde(rename = "operador")]
    pub operator: String,
    #[serde(rename = "cantidad")]
    pub quantity: u32,
}

/// Appends attempt records and missing-template notices
#[derive(Debug, Clone)]
pub struct PrintJournal {
    attempts_path: PathBuf,
    notices_path: PathBuf,
    timezone: Tz,
}

impl PrintJournal {
    pub fn new(
        attempts_path: impl Into<PathBuf>,
        notices_path: impl Into<PathBuf>,
        timezone: Tz,
    ) -> Self {
        Self {
            attempts_path: attempts_path.into(),
            notices_path: notices_path.into(),
            timezone,
        }
    }

    /// Append one record as a single JSON line
    pub fn append_attempt(&self, attempt: &PrintAttempt) -> JournalResult<()> {
        let line = serde_json::to_string(attempt)?;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.attempts_path)?;
        writeln!(file, "{}", line)?;
        Ok(())
    }

    /// Record a template the catalog names but the template dir lacks
    ///
    /// Notices carry an ISO-style stamp; label records keep the legacy
    /// day-first one.
    pub fn notify_missing_template(
        &self,
        color: &str,
        format: LabelFormat,
        material: &str,
        at: DateTime<Utc>,
    ) -> JournalResult<()> {
        let stamp = at
            .with_timezone(&self.timezone)
            .format("%Y-%m-%d %H:%M:%S");
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.notices_path)?;
        writeln!(
            file,
            "[{}] ARCHIVO PRN FALTANTE: {} ({}) - {}",
            stamp,
            color,
            format.as_wire(),
            material
        )?;
        Ok(())
    }

    /// Local wall-clock stamp in the label timezone
    pub fn format_stamp(&self, at: DateTime<Utc>) -> String {
        at.with_timezone(&self.timezone)
            .format("%d/%m/%Y %H:%M:%S")
            .to_string()
    }
}
