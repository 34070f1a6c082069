//! # Activity log
//!
//! Durable record of completed sprays. Callers hand records to [`ActivityLog::record`], which
//! never blocks on storage. A single writer thread owns the database connection and commits each
//! record with a timestamp taken at write time.
//!
//! Records still queued when the log is stopped are lost.

// ---------------------------------------------------------------------------
// MODULES
// ---------------------------------------------------------------------------

mod params;

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use crossbeam::channel::{self, Sender};
use log::{debug, info, warn};
use rusqlite::Connection;
use std::{
    fs,
    path::{Path, PathBuf},
    time::{Duration, Instant},
};

use crate::worker::{Worker, WorkerError, WorkerParams};
use robot_if::report::{ActivityLogEntry, DailyReport};
use util::time::{day_bounds, secs};

pub use params::*;

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

const CREATE_TABLE_SQL: &str = "CREATE TABLE IF NOT EXISTS spray_log (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    ts TEXT NOT NULL,
    ml_used REAL NOT NULL,
    area_m2 REAL NOT NULL,
    x REAL,
    y REAL,
    duration_s REAL
);
CREATE INDEX IF NOT EXISTS spray_log_ts ON spray_log (ts);";

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Handle to the activity log writer.
pub struct ActivityLog {
    params: Params,

    worker: Worker<LogMsg>,
}

/// A spray waiting to be committed.
#[derive(Debug, Clone, PartialEq)]
struct PendingRecord {
    ml_used: f64,
    area_m2: f64,
    x: Option<f64>,
    y: Option<f64>,
    duration_s: Option<f64>,
}

/// State owned by the writer thread.
struct Writer {
    conn: Connection,

    last_ts: Option<DateTime<Utc>>,
}

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

enum LogMsg {
    Record(PendingRecord),

    /// Acknowledge once every message queued before this one has been handled
    Flush(Sender<()>),
}

#[derive(Debug, thiserror::Error)]
pub enum ActivityLogError {
    #[error("Could not create the database directory {0}: {1}")]
    CreateDirError(PathBuf, std::io::Error),

    #[error("Database error: {0}")]
    DbError(#[from] rusqlite::Error),

    #[error("Corrupt activity log row: {0}")]
    Corrupt(String),

    #[error("Could not start the writer: {0}")]
    WorkerError(#[from] WorkerError),
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl ActivityLog {
    /// Open (creating if needed) the database and start the writer thread.
    pub fn new(params: &Params, worker_params: &WorkerParams) -> Result<Self, ActivityLogError> {
        let path = Path::new(&params.db_path);
        if let Some(dir) = path.parent() {
            if !dir.as_os_str().is_empty() && !dir.exists() {
                fs::create_dir_all(dir)
                    .map_err(|e| ActivityLogError::CreateDirError(dir.to_path_buf(), e))?;
            }
        }

        let conn = Connection::open(path)?;
        conn.execute_batch(CREATE_TABLE_SQL)?;
        info!("Activity log open at {:?}", path);

        let mut writer = Writer {
            conn,
            last_ts: None,
        };

        let worker_params = WorkerParams {
            queue_capacity: params.queue_capacity,
            ..worker_params.clone()
        };
        let worker = Worker::spawn("activity_log", &worker_params, move |msg: LogMsg, _| {
            writer.handle(msg)
        })?;

        Ok(Self {
            params: params.clone(),
            worker,
        })
    }

    /// Queue a completed spray for writing.
    ///
    /// Never blocks and never fails. If the record cannot be queued it is dropped with a
    /// warning.
    pub fn record(
        &self,
        ml_used: f64,
        area_m2: f64,
        x: Option<f64>,
        y: Option<f64>,
        duration_s: Option<f64>,
    ) {
        let rec = PendingRecord {
            ml_used,
            area_m2,
            x,
            y,
            duration_s,
        };

        if let Err(e) = self.worker.send(LogMsg::Record(rec)) {
            warn!("Spray of {:.2} ml not recorded: {}", ml_used, e);
        }
    }

    /// Wait until every record queued so far has been written.
    ///
    /// Returns `false` if the writer did not catch up within `timeout`.
    pub fn flush(&self, timeout: Duration) -> bool {
        let (tx, rx) = channel::bounded(1);
        if self.worker.send(LogMsg::Flush(tx)).is_err() {
            return false;
        }
        rx.recv_timeout(timeout).is_ok()
    }

    /// All sprays committed on `date` (today, UTC, if `None`), in timestamp order.
    pub fn daily_report(&self, date: Option<NaiveDate>) -> Result<DailyReport, ActivityLogError> {
        let date = date.unwrap_or_else(|| Utc::now().date_naive());
        let (start, end) = day_bounds(date);

        let conn = Connection::open(&self.params.db_path)?;
        conn.busy_timeout(secs(self.params.busy_timeout_s))?;

        let mut stmt = conn.prepare(
            "SELECT ts, ml_used, area_m2, x, y, duration_s FROM spray_log
             WHERE ts BETWEEN ?1 AND ?2
             ORDER BY ts, id",
        )?;
        let rows = stmt.query_map(rusqlite::params![fmt_ts(&start), fmt_ts(&end)], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, f64>(1)?,
                row.get::<_, f64>(2)?,
                row.get::<_, Option<f64>>(3)?,
                row.get::<_, Option<f64>>(4)?,
                row.get::<_, Option<f64>>(5)?,
            ))
        })?;

        let mut entries = Vec::new();
        for row in rows {
            let (ts, ml_used, area_m2, x, y, duration_s) = row?;
            let timestamp = DateTime::parse_from_rfc3339(&ts)
                .map_err(|e| ActivityLogError::Corrupt(format!("invalid timestamp {ts}: {e}")))?
                .with_timezone(&Utc);

            entries.push(ActivityLogEntry {
                timestamp,
                ml_used,
                area_m2,
                x,
                y,
                duration_s,
            });
        }

        let total_ml = entries.iter().map(|e| e.ml_used).sum();

        Ok(DailyReport {
            date,
            total_ml,
            entries,
        })
    }

    /// Signal the writer to exit. Queued records are not written.
    pub fn stop(&self) {
        self.worker.stop();
    }

    pub fn join_until(&self, deadline: Instant) -> bool {
        self.worker.join_until(deadline)
    }
}

impl Writer {
    fn handle(&mut self, msg: LogMsg) {
        match msg {
            LogMsg::Record(rec) => {
                if let Err(e) = self.insert(&rec) {
                    warn!("Could not write activity log record {:?}: {}", rec, e);
                }
            }
            LogMsg::Flush(ack) => {
                ack.send(()).ok();
            }
        }
    }

    fn insert(&mut self, rec: &PendingRecord) -> Result<(), rusqlite::Error> {
        // Never step backwards if the wall clock does, range queries rely on the order
        let ts = match self.last_ts {
            Some(last) => Utc::now().max(last),
            None => Utc::now(),
        };

        self.conn.execute(
            "INSERT INTO spray_log (ts, ml_used, area_m2, x, y, duration_s)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            rusqlite::params![
                fmt_ts(&ts),
                rec.ml_used,
                rec.area_m2,
                rec.x,
                rec.y,
                rec.duration_s,
            ],
        )?;

        self.last_ts = Some(ts);
        debug!("Recorded spray of {:.2} ml at {}", rec.ml_used, fmt_ts(&ts));
        Ok(())
    }
}

/// Fixed width RFC 3339 so that string order is time order.
fn fmt_ts(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;
    use chrono::Duration as ChronoDuration;

    fn open(dir: &Path) -> ActivityLog {
        let params = Params {
            db_path: dir.join("log.db").to_string_lossy().into_owned(),
            ..Params::default()
        };
        let worker_params = WorkerParams {
            queue_capacity: 64,
            poll_period_s: 0.01,
        };
        ActivityLog::new(&params, &worker_params).unwrap()
    }

    #[test]
    fn test_records_ordered_and_totalled() {
        let dir = tempfile::tempdir().unwrap();
        let log = open(dir.path());

        let amounts = [5.0, 12.5, 0.25, 30.0, 7.75];
        for (i, ml) in amounts.iter().enumerate() {
            log.record(*ml, 0.5, Some(i as f64), None, Some(ml / 10.0));
        }
        assert!(log.flush(Duration::from_secs(5)));

        let report = log.daily_report(None).unwrap();
        assert_eq!(report.entries.len(), amounts.len());
        assert_eq!(report.total_ml, amounts.iter().sum::<f64>());

        for pair in report.entries.windows(2) {
            assert!(pair[0].timestamp <= pair[1].timestamp);
        }

        // Enqueue order is preserved
        let xs: Vec<_> = report.entries.iter().map(|e| e.x.unwrap()).collect();
        assert_eq!(xs, vec![0.0, 1.0, 2.0, 3.0, 4.0]);
        assert_eq!(report.entries[0].y, None);
        assert_eq!(report.entries[0].area_m2, 0.5);
    }

    #[test]
    fn test_report_for_other_day_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let log = open(dir.path());

        log.record(10.0, 0.5, None, None, Some(1.0));
        assert!(log.flush(Duration::from_secs(5)));

        let yesterday = (Utc::now() - ChronoDuration::days(1)).date_naive();
        let report = log.daily_report(Some(yesterday)).unwrap();
        assert_eq!(report.date, yesterday);
        assert!(report.entries.is_empty());
        assert_eq!(report.total_ml, 0.0);
    }

    #[test]
    fn test_records_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        {
            let log = open(dir.path());
            log.record(3.0, 0.5, None, None, None);
            assert!(log.flush(Duration::from_secs(5)));
            log.stop();
            assert!(log.join_until(Instant::now() + Duration::from_secs(1)));
        }

        let log = open(dir.path());
        let report = log.daily_report(None).unwrap();
        assert_eq!(report.entries.len(), 1);
        assert_eq!(report.entries[0].duration_s, None);
    }

    #[test]
    fn test_record_after_stop_is_silent() {
        let dir = tempfile::tempdir().unwrap();
        let log = open(dir.path());

        log.stop();
        log.record(1.0, 0.5, None, None, None);
        assert!(!log.flush(Duration::from_millis(100)));
    }

    #[test]
    fn test_timestamp_format_is_fixed_width() {
        let a = fmt_ts(&"2026-03-14T09:05:00Z".parse::<DateTime<Utc>>().unwrap());
        let b = fmt_ts(&"2026-03-14T09:05:00.5Z".parse::<DateTime<Utc>>().unwrap());
        assert_eq!(a, "2026-03-14T09:05:00.000000Z");
        assert_eq!(a.len(), b.len());
        assert!(a < b);
    }
}
