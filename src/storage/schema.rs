//! SQLite schema definitions
//!
//! Tables:
//! - meetings: today's runners per event date, with the current market price
//! - forms: scraped historical form records per selection
//! - analysis: per-(event date, selection) scores and outcome fields
//! - configurations: named business tunables
//! - events: racecourse to country mapping used for region filters

use rusqlite::{Connection, Result};

/// Create all tables in the database
pub fn create_tables(conn: &Connection) -> Result<()> {
    conn.execute(
        r#"
        CREATE TABLE IF NOT EXISTS meetings (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            selection_id INTEGER NOT NULL,
            selection_name TEXT NOT NULL,
            selection_link TEXT NOT NULL,
            event_name TEXT NOT NULL,
            event_date TEXT NOT NULL,
            event_time TEXT NOT NULL,
            event_link TEXT,
            price TEXT,
            race_distance TEXT,
            race_category TEXT,
            race_class TEXT,
            track_condition TEXT,
            number_of_runners INTEGER,
            race_track TEXT,
            created_at TEXT DEFAULT (datetime('now')),
            UNIQUE(event_date, selection_id)
        )
        "#,
        [],
    )?;

    // Scraped history; one run per selection per day
    conn.execute(
        r#"
        CREATE TABLE IF NOT EXISTS forms (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            selection_id INTEGER NOT NULL,
            selection_name TEXT NOT NULL,
            selection_link TEXT,
            race_date TEXT NOT NULL,
            position TEXT NOT NULL,
            rating TEXT,
            race_type TEXT,
            racecourse TEXT,
            distance TEXT NOT NULL,
            going TEXT,
            race_class TEXT,
            sp_odds TEXT,
            age TEXT,
            trainer TEXT,
            sex TEXT,
            sire TEXT,
            dam TEXT,
            owner TEXT,
            created_at TEXT DEFAULT (datetime('now')),
            UNIQUE(selection_id, race_date)
        )
        "#,
        [],
    )?;

    conn.execute(
        r#"
        CREATE TABLE IF NOT EXISTS analysis (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            event_date TEXT NOT NULL,
            selection_id INTEGER NOT NULL,
            selection_name TEXT NOT NULL,
            selection_link TEXT,
            event_link TEXT,
            event_name TEXT NOT NULL,
            event_time TEXT NOT NULL,
            race_date TEXT,
            odds TEXT,
            age INTEGER,
            clean_bet_score REAL NOT NULL,
            average_position REAL,
            average_rating REAL,
            selection_position TEXT,
            num_runners INTEGER,
            number_runs INTEGER NOT NULL,
            preferred_distance REAL,
            current_distance REAL,
            potential_return TEXT,
            current_event_price TEXT,
            current_event_position TEXT,
            created_at TEXT DEFAULT (datetime('now')),
            updated_at TEXT DEFAULT (datetime('now')),
            UNIQUE(event_date, selection_id)
        )
        "#,
        [],
    )?;

    conn.execute(
        r#"
        CREATE TABLE IF NOT EXISTS configurations (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            key TEXT NOT NULL UNIQUE,
            value TEXT NOT NULL
        )
        "#,
        [],
    )?;

    conn.execute(
        r#"
        CREATE TABLE IF NOT EXISTS events (
            event_name TEXT PRIMARY KEY,
            country TEXT NOT NULL
        )
        "#,
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_meetings_date ON meetings(event_date)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_forms_selection ON forms(selection_id, race_date)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_analysis_date_score ON analysis(event_date, clean_bet_score)",
        [],
    )?;

    Ok(())
}
