//! Sign log -- append-only outcome records and the statistics derived from them.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use std::sync::Mutex;

use chrono::{DateTime, Duration, Local, NaiveDate};
use rusqlite::params;
use serde::{Deserialize, Serialize};

use super::Pool;
use crate::error::StoreError;

/// Largest page size served by [`OutcomeLog::list`].
pub const MAX_PAGE_LIMIT: u32 = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignStatus {
    Success,
    Failed,
}

impl SignStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SignStatus::Success => "success",
            SignStatus::Failed => "failed",
        }
    }
}

/// Who started a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Trigger {
    #[default]
    Manual,
    Scheduled,
}

impl Trigger {
    pub fn as_str(&self) -> &'static str {
        match self {
            Trigger::Manual => "manual",
            Trigger::Scheduled => "scheduled",
        }
    }
}

impl fmt::Display for Trigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Trigger {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "manual" => Ok(Trigger::Manual),
            "scheduled" => Ok(Trigger::Scheduled),
            other => Err(format!("unknown trigger '{other}'")),
        }
    }
}

/// One immutable log record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    pub id: i64,
    pub status: SignStatus,
    pub message: String,
    pub trigger: Trigger,
    pub created_at: DateTime<Local>,
}

/// One page of log entries, newest first.
#[derive(Debug, Clone, Serialize)]
pub struct LogPage {
    pub logs: Vec<LogEntry>,
    pub total: u64,
    pub page: u32,
    pub limit: u32,
}

/// Aggregate view over the log.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SignStats {
    pub signed_today: bool,
    pub last_sign_time: Option<DateTime<Local>>,
    pub continuous_days: u32,
    pub total_signs: u64,
}

impl SignStats {
    /// Derive stats from the timestamps of successful runs.
    ///
    /// The streak counts consecutive days ending today, or yesterday when
    /// today has no success yet.
    pub fn from_successes(successes: &[DateTime<Local>], today: NaiveDate) -> Self {
        let days: BTreeSet<NaiveDate> = successes.iter().map(|t| t.date_naive()).collect();
        let signed_today = days.contains(&today);

        let mut cursor = if signed_today {
            Some(today)
        } else {
            today.checked_sub_signed(Duration::days(1))
        };
        let mut continuous_days = 0;
        while let Some(day) = cursor.filter(|d| days.contains(d)) {
            continuous_days += 1;
            cursor = day.checked_sub_signed(Duration::days(1));
        }

        Self {
            signed_today,
            last_sign_time: successes.iter().max().copied(),
            continuous_days,
            total_signs: successes.len() as u64,
        }
    }
}

fn clamp_page(page: u32, limit: u32) -> (u32, u32) {
    (page.max(1), limit.clamp(1, MAX_PAGE_LIMIT))
}

/// Contract the workflow and the API depend on.
pub trait OutcomeLog: Send + Sync {
    fn append(
        &self,
        status: SignStatus,
        message: &str,
        trigger: Trigger,
    ) -> Result<LogEntry, StoreError>;

    /// Stats as of `today` (local calendar date).
    fn stats_at(&self, today: NaiveDate) -> Result<SignStats, StoreError>;

    fn stats(&self) -> Result<SignStats, StoreError> {
        self.stats_at(Local::now().date_naive())
    }

    /// `page` is 1-based; `limit` is clamped to `1..=50`.
    fn list(&self, page: u32, limit: u32) -> Result<LogPage, StoreError>;
}

// ---------------------------------------------------------------------------
// SQLite
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct SqliteOutcomeLog {
    pool: Pool,
}

impl SqliteOutcomeLog {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }
}

fn parse_timestamp(raw: &str) -> Option<DateTime<Local>> {
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|t| t.with_timezone(&Local))
}

impl OutcomeLog for SqliteOutcomeLog {
    fn append(
        &self,
        status: SignStatus,
        message: &str,
        trigger: Trigger,
    ) -> Result<LogEntry, StoreError> {
        let conn = self.pool.get()?;
        let created_at = Local::now();
        conn.execute(
            "INSERT INTO sign_logs (status, message, trigger_source, created_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                status.as_str(),
                message,
                trigger.as_str(),
                created_at.to_rfc3339()
            ],
        )?;

        Ok(LogEntry {
            id: conn.last_insert_rowid(),
            status,
            message: message.to_string(),
            trigger,
            created_at,
        })
    }

    fn stats_at(&self, today: NaiveDate) -> Result<SignStats, StoreError> {
        let conn = self.pool.get()?;
        let mut stmt =
            conn.prepare("SELECT created_at FROM sign_logs WHERE status = 'success'")?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;

        let mut successes = Vec::new();
        for r in rows {
            if let Some(t) = parse_timestamp(&r?) {
                successes.push(t);
            }
        }
        Ok(SignStats::from_successes(&successes, today))
    }

    fn list(&self, page: u32, limit: u32) -> Result<LogPage, StoreError> {
        let (page, limit) = clamp_page(page, limit);
        let conn = self.pool.get()?;

        let total: i64 = conn.query_row("SELECT COUNT(*) FROM sign_logs", [], |row| row.get(0))?;

        let mut stmt = conn.prepare(
            "SELECT id, status, message, trigger_source, created_at FROM sign_logs
             ORDER BY id DESC LIMIT ?1 OFFSET ?2",
        )?;
        let offset = i64::from(page - 1) * i64::from(limit);
        let rows = stmt.query_map(params![limit, offset], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, String>(4)?,
            ))
        })?;

        let mut logs = Vec::new();
        for r in rows {
            let (id, status, message, trigger, created_at) = r?;
            let status = if status == "success" {
                SignStatus::Success
            } else {
                SignStatus::Failed
            };
            logs.push(LogEntry {
                id,
                status,
                message,
                trigger: trigger.parse().unwrap_or_default(),
                created_at: parse_timestamp(&created_at).unwrap_or_default(),
            });
        }

        Ok(LogPage {
            logs,
            total: total as u64,
            page,
            limit,
        })
    }
}

// ---------------------------------------------------------------------------
// In-memory
// ---------------------------------------------------------------------------

/// Vec-backed log for tests and dry runs.
#[derive(Default)]
pub struct MemoryOutcomeLog {
    entries: Mutex<Vec<LogEntry>>,
}

impl MemoryOutcomeLog {
    pub fn entries(&self) -> Vec<LogEntry> {
        self.lock().clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<LogEntry>> {
        match self.entries.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl OutcomeLog for MemoryOutcomeLog {
    fn append(
        &self,
        status: SignStatus,
        message: &str,
        trigger: Trigger,
    ) -> Result<LogEntry, StoreError> {
        let mut entries = self.lock();
        let entry = LogEntry {
            id: entries.len() as i64 + 1,
            status,
            message: message.to_string(),
            trigger,
            created_at: Local::now(),
        };
        entries.push(entry.clone());
        Ok(entry)
    }

    fn stats_at(&self, today: NaiveDate) -> Result<SignStats, StoreError> {
        let successes: Vec<_> = self
            .lock()
            .iter()
            .filter(|e| e.status == SignStatus::Success)
            .map(|e| e.created_at)
            .collect();
        Ok(SignStats::from_successes(&successes, today))
    }

    fn list(&self, page: u32, limit: u32) -> Result<LogPage, StoreError> {
        let (page, limit) = clamp_page(page, limit);
        let entries = self.lock();
        let logs = entries
            .iter()
            .rev()
            .skip(((page - 1) * limit) as usize)
            .take(limit as usize)
            .cloned()
            .collect();
        Ok(LogPage {
            logs,
            total: entries.len() as u64,
            page,
            limit,
        })
    }
}
