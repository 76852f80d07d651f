use anyhow::{Context, Result};
use chrono::{DateTime, Local, NaiveTime, Timelike};
use cron::Schedule as CronSchedule;
use serde::Serialize;
use std::str::FromStr;

use crate::storage::Pool;

/// The daily schedule as reported to callers.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ScheduleStatus {
    pub enabled: bool,
    /// `HH:MM`, local time.
    pub time: Option<String>,
    pub next_run: Option<DateTime<Local>>,
    pub last_run: Option<DateTime<Local>>,
}

struct Row {
    enabled: bool,
    time: Option<String>,
    cron_expr: Option<String>,
    last_run_at: Option<String>,
    updated_at: String,
}

fn parse_local(raw: &str) -> Option<DateTime<Local>> {
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|t| t.with_timezone(&Local))
}

/// Cron expression (seconds first) firing daily at `HH:MM`.
pub fn daily_cron(time: &str) -> Result<String> {
    let t = NaiveTime::parse_from_str(time.trim(), "%H:%M")
        .map_err(|e| anyhow::anyhow!("Invalid time '{}', expected HH:MM: {}", time, e))?;
    Ok(format!("0 {} {} * * *", t.minute(), t.hour()))
}

/// The single daily check-in schedule, persisted in SQLite.
#[derive(Clone)]
pub struct Scheduler {
    pool: Pool,
}

impl Scheduler {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }

    fn row(&self) -> Result<Option<Row>> {
        let conn = self.pool.get()?;
        let mut stmt = conn.prepare(
            "SELECT enabled, time_of_day, cron_expr, last_run_at, updated_at FROM schedule WHERE id = 1",
        )?;
        let mut rows = stmt.query_map([], |row| {
            Ok(Row {
                enabled: row.get::<_, i64>(0)? != 0,
                time: row.get(1)?,
                cron_expr: row.get(2)?,
                last_run_at: row.get(3)?,
                updated_at: row.get(4)?,
            })
        })?;
        let row = rows.next().transpose()?;
        Ok(row)
    }

    /// Enable or disable the daily run. A time is required when enabling.
    pub async fn set(&self, enabled: bool, time: Option<&str>) -> Result<ScheduleStatus> {
        let time = time.map(str::trim).filter(|t| !t.is_empty());
        let cron_expr = match (enabled, time) {
            (true, None) => anyhow::bail!("A time (HH:MM) is required to enable the schedule"),
            (_, Some(t)) => Some(daily_cron(t)?),
            (false, None) => None,
        };
        // Validate Cron
        if let Some(expr) = &cron_expr {
            CronSchedule::from_str(expr)
                .map_err(|e| anyhow::anyhow!("Invalid cron expression '{}': {}", expr, e))?;
        }

        let conn = self.pool.get()?;
        conn.execute(
            "INSERT INTO schedule (id, enabled, time_of_day, cron_expr, updated_at)
             VALUES (1, ?1, ?2, ?3, ?4)
             ON CONFLICT(id) DO UPDATE SET
                enabled = excluded.enabled,
                time_of_day = COALESCE(excluded.time_of_day, schedule.time_of_day),
                cron_expr = COALESCE(excluded.cron_expr, schedule.cron_expr),
                updated_at = excluded.updated_at",
            rusqlite::params![enabled, time, cron_expr, Local::now().to_rfc3339()],
        )
        .context("Failed to save schedule")?;

        self.status().await
    }

    /// Remove the schedule entirely.
    pub async fn delete(&self) -> Result<()> {
        let conn = self.pool.get()?;
        conn.execute("DELETE FROM schedule WHERE id = 1", [])?;
        Ok(())
    }

    pub async fn status(&self) -> Result<ScheduleStatus> {
        let Some(row) = self.row()? else {
            return Ok(ScheduleStatus::default());
        };

        let next_run = match (&row.cron_expr, row.enabled) {
            (Some(expr), true) => CronSchedule::from_str(expr).ok().and_then(|s| {
                let next = s.after(&Local::now()).next();
                next
            }),
            _ => None,
        };

        Ok(ScheduleStatus {
            enabled: row.enabled,
            time: row.time,
            next_run,
            last_run: row.last_run_at.as_deref().and_then(parse_local),
        })
    }

    /// Whether a run is owed at `now`: the first occurrence after both the
    /// last run and the last save has passed.
    pub async fn is_due_at(&self, now: DateTime<Local>) -> Result<bool> {
        let Some(row) = self.row()? else {
            return Ok(false);
        };
        let (true, Some(expr)) = (row.enabled, row.cron_expr) else {
            return Ok(false);
        };
        let schedule = CronSchedule::from_str(&expr)
            .map_err(|e| anyhow::anyhow!("Invalid cron expression '{}': {}", expr, e))?;

        let saved = parse_local(&row.updated_at);
        let last_run = row.last_run_at.as_deref().and_then(parse_local);
        let anchor = last_run.max(saved).unwrap_or(now);

        let next = schedule.after(&anchor).next();
        Ok(next.is_some_and(|next| next <= now))
    }

    /// Stamp the last run time.
    pub async fn mark_run(&self, at: DateTime<Local>) -> Result<()> {
        let conn = self.pool.get()?;
        conn.execute(
            "UPDATE schedule SET last_run_at = ?1 WHERE id = 1",
            rusqlite::params![at.to_rfc3339()],
        )?;
        Ok(())
    }
}
