//! Attendance ledger: per-day, per-lecture deduplicated records.
//!
//! The dedup logic lives in [`Ledger`] and is generic over a [`TableStore`],
//! so it is tested without file I/O; the per-date CSV file is one adapter.
//!
//! The read-modify-write in `mark` is not atomic across processes. The
//! design assumes exactly one process owns a given date's table at a time;
//! concurrent runs against the same date can lose updates.

use crate::types::Identity;
use chrono::{Local, NaiveDate, NaiveDateTime, Timelike};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
    #[error("csv: {0}")]
    Csv(#[from] csv::Error),
}

/// One attendance row. Field order matches the persisted column order:
/// `ID, Name, Date, Time, Lecture`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttendanceRecord {
    #[serde(rename = "ID")]
    pub id: String,
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "Date")]
    pub date: NaiveDate,
    #[serde(rename = "Time")]
    pub time: chrono::NaiveTime,
    #[serde(rename = "Lecture")]
    pub lecture: String,
}

/// Outcome of a mark attempt. Both are expected steady-state results, not
/// errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarkOutcome {
    Recorded,
    AlreadyPresent,
}

/// Append-only keyed table storage, one table per calendar date.
///
/// `load` of a date with no table yet returns an empty list; `persist`
/// rewrites the whole table (tables are small, one school day).
pub trait TableStore {
    fn load(&self, date: NaiveDate) -> Result<Vec<AttendanceRecord>, LedgerError>;
    fn persist(&self, date: NaiveDate, records: &[AttendanceRecord]) -> Result<(), LedgerError>;
}

/// True when the table already holds a record for this `(id, lecture)`.
pub fn contains(records: &[AttendanceRecord], id: &str, lecture: &str) -> bool {
    records.iter().any(|r| r.id == id && r.lecture == lecture)
}

/// The attendance ledger. Owns a table store; stateless otherwise.
pub struct Ledger<S: TableStore> {
    store: S,
}

impl<S: TableStore> Ledger<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Mark `identity` present for `lecture` today.
    ///
    /// Idempotent per `(id, lecture, date)`: the first call appends and
    /// persists, every later call returns `AlreadyPresent` without touching
    /// storage.
    pub fn mark(&self, identity: &Identity, lecture: &str) -> Result<MarkOutcome, LedgerError> {
        self.mark_at(identity, lecture, Local::now().naive_local())
    }

    /// `mark` with an explicit clock, for tests and replays.
    pub fn mark_at(
        &self,
        identity: &Identity,
        lecture: &str,
        now: NaiveDateTime,
    ) -> Result<MarkOutcome, LedgerError> {
        let date = now.date();
        let mut records = self.store.load(date)?;

        if contains(&records, &identity.id, lecture) {
            return Ok(MarkOutcome::AlreadyPresent);
        }

        // Whole seconds only; the persisted format is HH:MM:SS.
        let time = now.time().with_nanosecond(0).unwrap_or_else(|| now.time());
        records.push(AttendanceRecord {
            id: identity.id.clone(),
            name: identity.name.clone(),
            date,
            time,
            lecture: lecture.to_string(),
        });
        self.store.persist(date, &records)?;

        tracing::info!(
            id = %identity.id,
            name = %identity.name,
            %lecture,
            %date,
            "attendance recorded"
        );
        Ok(MarkOutcome::Recorded)
    }
}

/// CSV adapter: one `attendance_<YYYY-MM-DD>.csv` per date in the reports
/// directory, created on first write of the day.
pub struct CsvTableStore {
    reports_dir: PathBuf,
}

impl CsvTableStore {
    pub fn new(reports_dir: impl Into<PathBuf>) -> Self {
        Self {
            reports_dir: reports_dir.into(),
        }
    }

    pub fn table_path(&self, date: NaiveDate) -> PathBuf {
        self.reports_dir
            .join(format!("attendance_{}.csv", date.format("%Y-%m-%d")))
    }
}

impl TableStore for CsvTableStore {
    fn load(&self, date: NaiveDate) -> Result<Vec<AttendanceRecord>, LedgerError> {
        let path = self.table_path(date);
        if !path.exists() {
            return Ok(Vec::new());
        }

        let mut reader = csv::Reader::from_path(&path)?;
        let mut records = Vec::new();
        for row in reader.deserialize() {
            records.push(row?);
        }
        Ok(records)
    }

    fn persist(&self, date: NaiveDate, records: &[AttendanceRecord]) -> Result<(), LedgerError> {
        std::fs::create_dir_all(&self.reports_dir)?;

        let mut writer = csv::Writer::from_path(self.table_path(date))?;
        for record in records {
            writer.serialize(record)?;
        }
        writer.flush()?;
        Ok(())
    }
}
