use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use super::Reporter;
use crate::error::{ArbError, Result};
use crate::trading::{TradeReport, TradeState};

pub const JOURNAL_FILE: &str = "trades.jsonl";

/// One finished trade attempt, as written to the journal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeRecord {
    pub timestamp: DateTime<Utc>,
    pub source_address: String,
    pub dest_address: String,
    pub amount_x: Decimal,
    pub amount_y: Decimal,
    pub state: TradeState,
    pub challenge: Option<String>,
    pub pow_nonce: Option<String>,
    pub pow_attempts: Option<u64>,
    pub open_position: bool,
    pub error_kind: Option<String>,
    pub error: Option<String>,
    pub elapsed_ms: u64,
}

impl From<&TradeReport> for TradeRecord {
    fn from(report: &TradeReport) -> Self {
        Self {
            timestamp: report.started_at,
            source_address: report.tx.source_address.clone(),
            dest_address: report.tx.dest_address.clone(),
            amount_x: report.tx.amount_x,
            amount_y: report.tx.amount_y,
            state: report.state,
            challenge: report.pow.as_ref().map(|p| p.challenge.clone()),
            pow_nonce: report.pow.as_ref().map(|p| p.solution.nonce.clone()),
            pow_attempts: report.pow.as_ref().map(|p| p.solution.attempts),
            open_position: report.open_position(),
            error_kind: report.error.as_ref().map(|e| e.kind().to_string()),
            error: report.error.as_ref().map(|e| e.to_string()),
            elapsed_ms: report.elapsed.as_millis() as u64,
        }
    }
}

/// Append-only JSON-lines audit log of trade attempts. Nothing reads it back
/// to resume trades.
pub struct TradeJournal {
    log_path: PathBuf,
    file: Mutex<File>,
}

impl TradeJournal {
    pub fn new(log_dir: impl AsRef<Path>) -> Result<Self> {
        let log_dir = log_dir.as_ref();
        std::fs::create_dir_all(log_dir)?;

        let log_path = log_dir.join(JOURNAL_FILE);
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_path)?;

        Ok(Self {
            log_path,
            file: Mutex::new(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.log_path
    }

    /// Appends one line and flushes before returning. Runs synchronously on
    /// the caller's thread; the lock is held only for the single write.
    pub fn record(&self, entry: &TradeRecord) -> Result<()> {
        let mut line = serde_json::to_vec(entry)?;
        line.push(b'\n');

        let mut file = self.file.lock();
        file.write_all(&line)?;
        file.flush()?;
        debug!(state = %entry.state, "Trade recorded");
        Ok(())
    }

    /// Reads every record; a truncated last line is ignored.
    pub fn read_history(path: impl AsRef<Path>) -> Result<Vec<TradeRecord>> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(Vec::new());
        }

        let reader = BufReader::new(File::open(path)?);
        let mut records = Vec::new();
        let mut lines = reader.lines().peekable();
        while let Some(line) = lines.next() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str(&line) {
                Ok(record) => records.push(record),
                Err(_) if lines.peek().is_none() => break,
                Err(e) => return Err(ArbError::from(e)),
            }
        }
        Ok(records)
    }
}

/// Synchronous sink: the record is on disk when `report_trade` returns, at
/// the cost of one small blocking append per finished trade.
impl Reporter for TradeJournal {
    fn report_error(&self, _context: &str, _err: &ArbError) {}

    fn report_trade(&self, report: &TradeReport) {
        if let Err(e) = self.record(&TradeRecord::from(report)) {
            error!("Failed to log trade: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn record(state: TradeState) -> TradeRecord {
        TradeRecord {
            timestamp: Utc::now(),
            source_address: "address1".into(),
            dest_address: "address2".into(),
            amount_x: dec!(10.5),
            amount_y: dec!(20.3),
            state,
            challenge: Some("6162".into()),
            pow_nonce: Some("01".into()),
            pow_attempts: Some(2),
            open_position: false,
            error_kind: None,
            error: None,
            elapsed_ms: 12,
        }
    }

    #[test]
    fn records_are_appended_and_read_back() {
        let dir = tempfile::tempdir().unwrap();
        let journal = TradeJournal::new(dir.path()).unwrap();

        journal.record(&record(TradeState::Completed)).unwrap();
        journal.record(&record(TradeState::BuyFailed)).unwrap();

        let history = TradeJournal::read_history(journal.path()).unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].state, TradeState::Completed);
        assert_eq!(history[1].state, TradeState::BuyFailed);
        assert_eq!(history[1].amount_y, dec!(20.3));
    }

    #[test]
    fn concurrent_writers_never_interleave_lines() {
        let dir = tempfile::tempdir().unwrap();
        let journal = std::sync::Arc::new(TradeJournal::new(dir.path()).unwrap());

        let writers: Vec<_> = (0..8)
            .map(|_| {
                let journal = journal.clone();
                std::thread::spawn(move || {
                    for _ in 0..25 {
                        journal.record(&record(TradeState::Completed)).unwrap();
                    }
                })
            })
            .collect();
        for writer in writers {
            writer.join().unwrap();
        }

        let history = TradeJournal::read_history(journal.path()).unwrap();
        assert_eq!(history.len(), 200);
    }

    #[test]
    fn missing_journal_is_empty_history() {
        let dir = tempfile::tempdir().unwrap();
        let history = TradeJournal::read_history(dir.path().join(JOURNAL_FILE)).unwrap();
        assert!(history.is_empty());
    }

    #[test]
    fn truncated_tail_is_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let journal = TradeJournal::new(dir.path()).unwrap();
        journal.record(&record(TradeState::Completed)).unwrap();
        std::fs::OpenOptions::new()
            .append(true)
            .open(journal.path())
            .unwrap()
            .write_all(b"{\"timestamp\":")
            .unwrap();

        let history = TradeJournal::read_history(journal.path()).unwrap();
        assert_eq!(history.len(), 1);
    }
}
