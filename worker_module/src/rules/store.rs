use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::PathBuf;
use std::time::Duration;

use super::expression::validate_schedule_expression;
use super::{RuleError, RuleScheduler, RuleState, ScheduleRule};

/// Rule service backed by a local SQLite file.
#[derive(Debug, Clone)]
pub struct SqliteRuleStore {
    path: PathBuf,
}

impl SqliteRuleStore {
    pub fn new(path: impl Into<PathBuf>) -> Result<Self, RuleError> {
        let store = Self { path: path.into() };
        let _ = store.open()?;
        Ok(store)
    }

    /// Upsert with an explicit install time.
    pub fn put_rule_at(
        &self,
        name: &str,
        schedule_expression: &str,
        state: RuleState,
        updated_at: DateTime<Utc>,
    ) -> Result<(), RuleError> {
        validate_schedule_expression(schedule_expression)?;
        let conn = self.open()?;
        conn.execute(
            "INSERT INTO schedule_rules (name, schedule_expression, state, updated_at)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(name) DO UPDATE SET
                schedule_expression = excluded.schedule_expression,
                state = excluded.state,
                updated_at = excluded.updated_at",
            params![
                name,
                schedule_expression,
                state.as_str(),
                format_datetime(updated_at),
            ],
        )?;
        Ok(())
    }

    pub fn get_rule(&self, name: &str) -> Result<Option<ScheduleRule>, RuleError> {
        let conn = self.open()?;
        let row = conn
            .query_row(
                "SELECT name, schedule_expression, state, updated_at, last_fired_at
                 FROM schedule_rules
                 WHERE name = ?1",
                params![name],
                read_columns,
            )
            .optional()?;
        row.map(into_rule).transpose()
    }

    pub fn enabled_rules(&self) -> Result<Vec<ScheduleRule>, RuleError> {
        let conn = self.open()?;
        let mut stmt = conn.prepare(
            "SELECT name, schedule_expression, state, updated_at, last_fired_at
             FROM schedule_rules
             WHERE state = ?1
             ORDER BY name",
        )?;
        let rows = stmt.query_map(params![RuleState::Enabled.as_str()], read_columns)?;

        let mut rules = Vec::new();
        for row in rows {
            rules.push(into_rule(row?)?);
        }
        Ok(rules)
    }

    pub fn mark_fired(&self, name: &str, fired_at: DateTime<Utc>) -> Result<(), RuleError> {
        let conn = self.open()?;
        conn.execute(
            "UPDATE schedule_rules SET last_fired_at = ?1 WHERE name = ?2",
            params![format_datetime(fired_at), name],
        )?;
        Ok(())
    }

    fn open(&self) -> Result<Connection, RuleError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(&self.path)?;
        conn.busy_timeout(Duration::from_secs(5))?;
        conn.execute(
            "CREATE TABLE IF NOT EXISTS schedule_rules (
                name TEXT PRIMARY KEY,
                schedule_expression TEXT NOT NULL,
                state TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                last_fired_at TEXT
            )",
            [],
        )?;
        Ok(conn)
    }
}

impl RuleScheduler for SqliteRuleStore {
    fn put_rule(
        &self,
        name: &str,
        schedule_expression: &str,
        state: RuleState,
    ) -> Result<(), RuleError> {
        self.put_rule_at(name, schedule_expression, state, Utc::now())
    }
}

type RuleColumns = (String, String, String, String, Option<String>);

fn read_columns(row: &Row<'_>) -> rusqlite::Result<RuleColumns> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
    ))
}

fn into_rule(columns: RuleColumns) -> Result<ScheduleRule, RuleError> {
    let (name, schedule_expression, state, updated_at, last_fired_at) = columns;
    Ok(ScheduleRule {
        name,
        schedule_expression,
        state: RuleState::parse(&state)?,
        updated_at: parse_datetime(&updated_at)?,
        last_fired_at: last_fired_at.as_deref().map(parse_datetime).transpose()?,
    })
}

fn format_datetime(value: DateTime<Utc>) -> String {
    value.to_rfc3339()
}

fn parse_datetime(value: &str) -> Result<DateTime<Utc>, chrono::ParseError> {
    Ok(DateTime::parse_from_rfc3339(value)?.with_timezone(&Utc))
}
