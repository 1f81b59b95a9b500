//! SQLite repository implementing every store trait over one connection.

use anyhow::Context;
use chrono::NaiveDate;
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use super::schema::create_tables;
use super::stores::{AnalysisStore, ConfigStore, FormStore, MeetingStore, PredictionFilter};
use crate::error::{AnalysisError, Result};
use crate::form::{parse_race_date, FormRecord};
use crate::predictions::Region;

/// One entrant on today's race card
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Runner {
    pub selection_id: i64,
    pub selection_name: String,
    #[serde(default)]
    pub selection_link: String,
    pub event_name: String,
    pub event_date: NaiveDate,
    /// Scheduled race time; the ranking slot
    pub event_time: String,
    #[serde(default)]
    pub event_link: String,
    /// Current market price as quoted, e.g. `"5/2"`
    #[serde(default)]
    pub price: String,
    /// Raw distance text, e.g. `"1m2f"`
    pub race_distance: String,
    #[serde(default)]
    pub race_category: String,
    #[serde(default)]
    pub race_class: String,
    #[serde(default)]
    pub track_condition: String,
    #[serde(default)]
    pub number_of_runners: Option<u32>,
    #[serde(default)]
    pub race_track: String,
}

/// Persisted analysis row, unique per (event date, selection id)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AnalysisRecord {
    pub event_date: NaiveDate,
    pub selection_id: i64,
    pub selection_name: String,
    pub selection_link: String,
    pub event_link: String,
    pub event_name: String,
    pub event_time: String,
    /// Date of the most recent run before the event
    pub race_date: Option<NaiveDate>,
    /// Market price at write time
    pub odds: Option<String>,
    pub age: Option<u32>,
    pub total_score: f64,
    pub average_position: f64,
    pub average_rating: f64,
    /// Finishing position of the most recent run
    pub selection_position: String,
    pub num_runners: Option<u32>,
    pub number_runs: u32,
    pub preferred_distance: f64,
    pub current_distance: f64,
    pub potential_return: Option<String>,
    pub current_event_price: Option<String>,
    pub current_event_position: Option<String>,
}

/// Outcome fields written back after the race
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RaceOutcome {
    pub current_event_price: String,
    pub current_event_position: String,
    pub potential_return: String,
}

/// An event with its race times for one date
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EventSummary {
    pub event_name: String,
    /// Comma-joined, ordered
    pub event_times: String,
}

const ANALYSIS_COLUMNS: &str = "event_date, selection_id, selection_name, selection_link, \
    event_link, event_name, event_time, race_date, odds, age, clean_bet_score, \
    average_position, average_rating, selection_position, num_runners, number_runs, \
    preferred_distance, current_distance, potential_return, current_event_price, \
    current_event_position";

const FORM_COLUMNS: &str = "race_date, position, rating, race_type, racecourse, distance, \
    going, race_class, sp_odds, age, trainer, sex, sire, dam, owner";

const RUNNER_COLUMNS: &str = "selection_id, selection_name, selection_link, event_name, \
    event_date, event_time, event_link, price, race_distance, race_category, race_class, \
    track_condition, number_of_runners, race_track";

/// SQLite-backed store
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open (or create) the database at `db_path` and ensure the schema
    pub fn new(db_path: &Path) -> anyhow::Result<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent).context("Failed to create database directory")?;
        }

        let conn = Connection::open(db_path).context("Failed to open database")?;
        create_tables(&conn).context("Failed to create tables")?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// In-memory store, used by tests and dry runs
    pub fn open_in_memory() -> anyhow::Result<Self> {
        let conn = Connection::open_in_memory()?;
        create_tables(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| AnalysisError::Storage("connection lock poisoned".to_string()))
    }

    // ==================== Insert Operations ====================

    /// Insert or replace a race card entry
    pub fn insert_runner(&self, runner: &Runner) -> Result<()> {
        let conn = self.lock()?;
        conn.execute(
            &format!(
                "INSERT OR REPLACE INTO meetings ({}) VALUES \
                 (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
                RUNNER_COLUMNS
            ),
            params![
                runner.selection_id,
                runner.selection_name,
                runner.selection_link,
                runner.event_name,
                runner.event_date.to_string(),
                runner.event_time,
                runner.event_link,
                runner.price,
                runner.race_distance,
                runner.race_category,
                runner.race_class,
                runner.track_condition,
                runner.number_of_runners,
                runner.race_track,
            ],
        )?;
        Ok(())
    }

    /// Map a racecourse to its country
    pub fn insert_event(&self, event_name: &str, country: &str) -> Result<()> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT OR REPLACE INTO events (event_name, country) VALUES (?1, ?2)",
            params![event_name, country],
        )?;
        Ok(())
    }

    pub fn set_config(&self, key: &str, value: &str) -> Result<()> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO configurations (key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            params![key, value],
        )?;
        Ok(())
    }

    // ==================== Query Operations ====================

    /// All analysis rows of a date, best first
    pub fn analyses_for_date(&self, event_date: NaiveDate) -> Result<Vec<AnalysisRecord>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM analysis WHERE event_date = ?1
             ORDER BY clean_bet_score DESC, selection_id ASC",
            ANALYSIS_COLUMNS
        ))?;
        let rows = stmt
            .query_map([event_date.to_string()], analysis_from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn form_count(&self) -> Result<i64> {
        let conn = self.lock()?;
        let count = conn.query_row("SELECT COUNT(*) FROM forms", [], |row| row.get(0))?;
        Ok(count)
    }
}

// ==================== Row helpers ====================

fn date_column(row: &Row<'_>, idx: usize) -> rusqlite::Result<NaiveDate> {
    let text: String = row.get(idx)?;
    parse_race_date(&text)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn optional_date_column(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<NaiveDate>> {
    match row.get::<_, Option<String>>(idx)? {
        Some(text) => parse_race_date(&text)
            .map(Some)
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e))),
        None => Ok(None),
    }
}

/// Nullable text column, empty when NULL
fn text_column(row: &Row<'_>, idx: usize) -> rusqlite::Result<String> {
    Ok(row.get::<_, Option<String>>(idx)?.unwrap_or_default())
}

fn analysis_from_row(row: &Row<'_>) -> rusqlite::Result<AnalysisRecord> {
    Ok(AnalysisRecord {
        event_date: date_column(row, 0)?,
        selection_id: row.get(1)?,
        selection_name: row.get(2)?,
        selection_link: text_column(row, 3)?,
        event_link: text_column(row, 4)?,
        event_name: row.get(5)?,
        event_time: row.get(6)?,
        race_date: optional_date_column(row, 7)?,
        odds: row.get(8)?,
        age: row.get(9)?,
        total_score: row.get(10)?,
        average_position: row.get::<_, Option<f64>>(11)?.unwrap_or_default(),
        average_rating: row.get::<_, Option<f64>>(12)?.unwrap_or_default(),
        selection_position: text_column(row, 13)?,
        num_runners: row.get(14)?,
        number_runs: row.get(15)?,
        preferred_distance: row.get::<_, Option<f64>>(16)?.unwrap_or_default(),
        current_distance: row.get::<_, Option<f64>>(17)?.unwrap_or_default(),
        potential_return: row.get(18)?,
        current_event_price: row.get(19)?,
        current_event_position: row.get(20)?,
    })
}

fn form_from_row(row: &Row<'_>) -> rusqlite::Result<FormRecord> {
    Ok(FormRecord {
        race_date: date_column(row, 0)?,
        position: row.get(1)?,
        rating: text_column(row, 2)?,
        race_type: text_column(row, 3)?,
        racecourse: text_column(row, 4)?,
        distance: row.get(5)?,
        going: text_column(row, 6)?,
        race_class: text_column(row, 7)?,
        sp_odds: text_column(row, 8)?,
        age: text_column(row, 9)?,
        trainer: text_column(row, 10)?,
        sex: text_column(row, 11)?,
        sire: text_column(row, 12)?,
        dam: text_column(row, 13)?,
        owner: text_column(row, 14)?,
    })
}

fn runner_from_row(row: &Row<'_>) -> rusqlite::Result<Runner> {
    Ok(Runner {
        selection_id: row.get(0)?,
        selection_name: row.get(1)?,
        selection_link: text_column(row, 2)?,
        event_name: row.get(3)?,
        event_date: date_column(row, 4)?,
        event_time: row.get(5)?,
        event_link: text_column(row, 6)?,
        price: text_column(row, 7)?,
        race_distance: text_column(row, 8)?,
        race_category: text_column(row, 9)?,
        race_class: text_column(row, 10)?,
        track_condition: text_column(row, 11)?,
        number_of_runners: row.get(12)?,
        race_track: text_column(row, 13)?,
    })
}

fn insert_analysis_row(conn: &Connection, record: &AnalysisRecord) -> rusqlite::Result<()> {
    conn.execute(
        &format!(
            "INSERT INTO analysis ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, \
             ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?19, ?20, ?21)",
            ANALYSIS_COLUMNS
        ),
        params![
            record.event_date.to_string(),
            record.selection_id,
            record.selection_name,
            record.selection_link,
            record.event_link,
            record.event_name,
            record.event_time,
            record.race_date.map(|d| d.to_string()),
            record.odds,
            record.age,
            record.total_score,
            record.average_position,
            record.average_rating,
            record.selection_position,
            record.num_runners,
            record.number_runs,
            record.preferred_distance,
            record.current_distance,
            record.potential_return,
            record.current_event_price,
            record.current_event_position,
        ],
    )?;
    Ok(())
}

fn delete_analysis_row(conn: &Connection, event_date: NaiveDate, selection_id: i64) -> rusqlite::Result<usize> {
    conn.execute(
        "DELETE FROM analysis WHERE event_date = ?1 AND selection_id = ?2",
        params![event_date.to_string(), selection_id],
    )
}

fn lookup_price(conn: &Connection, event_date: NaiveDate, selection_id: i64) -> rusqlite::Result<Option<String>> {
    let price: Option<Option<String>> = conn
        .query_row(
            "SELECT price FROM meetings WHERE event_date = ?1 AND selection_id = ?2",
            params![event_date.to_string(), selection_id],
            |row| row.get(0),
        )
        .optional()?;
    Ok(price.flatten().filter(|p| !p.is_empty()))
}

// ==================== Store implementations ====================

impl FormStore for SqliteStore {
    fn forms_for_selection(&self, selection_id: i64) -> Result<Vec<FormRecord>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM forms WHERE selection_id = ?1 ORDER BY race_date DESC",
            FORM_COLUMNS
        ))?;
        let records = stmt
            .query_map([selection_id], form_from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(records)
    }

    fn last_run_date(&self, selection_id: i64) -> Result<NaiveDate> {
        let conn = self.lock()?;
        let latest: Option<String> = conn.query_row(
            "SELECT MAX(race_date) FROM forms WHERE selection_id = ?1",
            [selection_id],
            |row| row.get(0),
        )?;

        match latest {
            Some(text) => parse_race_date(&text),
            None => Err(AnalysisError::NotFound(format!(
                "no form history for selection {}",
                selection_id
            ))),
        }
    }

    fn insert_form(&self, runner: &Runner, record: &FormRecord) -> Result<bool> {
        let conn = self.lock()?;
        let inserted = conn.execute(
            &format!(
                "INSERT OR IGNORE INTO forms (selection_id, selection_name, selection_link, {})
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18)",
                FORM_COLUMNS
            ),
            params![
                runner.selection_id,
                runner.selection_name,
                runner.selection_link,
                record.race_date.to_string(),
                record.position,
                record.rating,
                record.race_type,
                record.racecourse,
                record.distance,
                record.going,
                record.race_class,
                record.sp_odds,
                record.age,
                record.trainer,
                record.sex,
                record.sire,
                record.dam,
                record.owner,
            ],
        )?;
        Ok(inserted > 0)
    }
}

impl MeetingStore for SqliteStore {
    fn runners_for_date(&self, event_date: NaiveDate) -> Result<Vec<Runner>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM meetings WHERE event_date = ?1
             ORDER BY event_time, event_name, selection_id",
            RUNNER_COLUMNS
        ))?;
        let runners = stmt
            .query_map([event_date.to_string()], runner_from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(runners)
    }

    fn selection_price(&self, event_date: NaiveDate, selection_id: i64) -> Result<Option<String>> {
        let conn = self.lock()?;
        Ok(lookup_price(&conn, event_date, selection_id)?)
    }

    fn events_for_date(&self, event_date: NaiveDate) -> Result<Vec<EventSummary>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT DISTINCT event_name, event_time FROM meetings WHERE event_date = ?1
             ORDER BY event_name, event_time",
        )?;
        let pairs = stmt
            .query_map([event_date.to_string()], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        let mut events: Vec<EventSummary> = Vec::new();
        for (name, time) in pairs {
            match events.last_mut() {
                Some(event) if event.event_name == name => {
                    event.event_times.push(',');
                    event.event_times.push_str(&time);
                }
                _ => events.push(EventSummary {
                    event_name: name,
                    event_times: time,
                }),
            }
        }
        Ok(events)
    }
}

impl ConfigStore for SqliteStore {
    fn config_value(&self, key: &str) -> Result<Option<String>> {
        let conn = self.lock()?;
        let value = conn
            .query_row(
                "SELECT value FROM configurations WHERE key = ?1",
                [key],
                |row| row.get(0),
            )
            .optional()?;
        Ok(value)
    }
}

impl AnalysisStore for SqliteStore {
    fn delete_analysis(&self, event_date: NaiveDate, selection_id: i64) -> Result<bool> {
        let conn = self.lock()?;
        Ok(delete_analysis_row(&conn, event_date, selection_id)? > 0)
    }

    fn insert_analysis(&self, record: &AnalysisRecord) -> Result<()> {
        let conn = self.lock()?;
        insert_analysis_row(&conn, record)?;
        Ok(())
    }

    fn replace_analyses(
        &self,
        event_date: NaiveDate,
        records: &[AnalysisRecord],
        stale: &[i64],
    ) -> Result<usize> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;

        for selection_id in stale {
            delete_analysis_row(&tx, event_date, *selection_id)?;
        }

        for record in records {
            if record.event_date != event_date {
                // Dropping the transaction rolls back
                return Err(AnalysisError::Validation(format!(
                    "record for selection {} is dated {}, batch is {}",
                    record.selection_id, record.event_date, event_date
                )));
            }
            delete_analysis_row(&tx, event_date, record.selection_id)?;

            let mut row = record.clone();
            row.odds = lookup_price(&tx, event_date, record.selection_id)?;
            insert_analysis_row(&tx, &row)?;
        }

        tx.commit()?;
        Ok(records.len())
    }

    fn query_analyses(&self, filter: &PredictionFilter) -> Result<Vec<AnalysisRecord>> {
        let conn = self.lock()?;

        let mut sql = format!(
            "SELECT {} FROM analysis
             WHERE event_date = ?1
               AND ABS(preferred_distance - current_distance) < ?2
               AND average_position < ?3
               AND number_runs < ?4",
            ANALYSIS_COLUMNS
        );
        let country = match filter.region {
            Region::Both => {
                sql.push_str(
                    " AND event_name IN (SELECT event_name FROM events WHERE country IN ('UK', 'Ireland'))",
                );
                None
            }
            Region::All => None,
            Region::Uk | Region::Ireland => {
                sql.push_str(" AND event_name IN (SELECT event_name FROM events WHERE country = ?6)");
                filter.region.country()
            }
        };
        sql.push_str(" ORDER BY clean_bet_score DESC, selection_id ASC LIMIT ?5");

        let mut stmt = conn.prepare(&sql)?;
        let date = filter.event_date.to_string();
        let limit = filter.limit as i64;
        let rows = match country {
            Some(country) => stmt
                .query_map(
                    params![
                        date,
                        filter.distance_tolerance,
                        filter.max_average_position,
                        filter.max_runs,
                        limit,
                        country
                    ],
                    analysis_from_row,
                )?
                .collect::<std::result::Result<Vec<_>, _>>()?,
            None => stmt
                .query_map(
                    params![
                        date,
                        filter.distance_tolerance,
                        filter.max_average_position,
                        filter.max_runs,
                        limit
                    ],
                    analysis_from_row,
                )?
                .collect::<std::result::Result<Vec<_>, _>>()?,
        };
        Ok(rows)
    }

    fn get_analysis(&self, event_date: NaiveDate, selection_id: i64) -> Result<Option<AnalysisRecord>> {
        let conn = self.lock()?;
        let record = conn
            .query_row(
                &format!(
                    "SELECT {} FROM analysis WHERE event_date = ?1 AND selection_id = ?2",
                    ANALYSIS_COLUMNS
                ),
                params![event_date.to_string(), selection_id],
                analysis_from_row,
            )
            .optional()?;
        Ok(record)
    }

    fn record_outcome(
        &self,
        event_date: NaiveDate,
        selection_id: i64,
        outcome: &RaceOutcome,
    ) -> Result<bool> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        let updated = tx.execute(
            "UPDATE analysis
             SET current_event_price = ?3,
                 current_event_position = ?4,
                 potential_return = ?5,
                 updated_at = datetime('now')
             WHERE event_date = ?1 AND selection_id = ?2 AND current_event_position IS NULL",
            params![
                event_date.to_string(),
                selection_id,
                outcome.current_event_price,
                outcome.current_event_position,
                outcome.potential_return,
            ],
        )?;
        tx.commit()?;
        Ok(updated > 0)
    }
}
