//! # IdeaForge Database
//!
//! Single SQLite database for analysis persistence at `.ideaforge/ideaforge.db`.

use anyhow::{Context, Result};
use rusqlite::Connection;
use std::path::Path;
use std::sync::{Arc, Mutex};

/// Schema version for migrations
const SCHEMA_VERSION: i32 = 1;

/// Default on-disk location
pub const DEFAULT_DB_PATH: &str = ".ideaforge/ideaforge.db";

/// Database manager shared by the stores
pub struct AnalysisDb {
    conn: Arc<Mutex<Connection>>,
}

impl AnalysisDb {
    /// Open or create the database at `.ideaforge/ideaforge.db`
    pub fn open() -> Result<Self> {
        Self::open_at(DEFAULT_DB_PATH)
    }

    /// Open database at a specific path
    pub fn open_at<P: AsRef<Path>>(path: P) -> Result<Self> {
        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent).ok();
        }

        let conn = Connection::open(path.as_ref()).context("Failed to open ideaforge database")?;
        Self::from_connection(conn)
    }

    /// Private in-memory database (tests, one-shot CLI runs)
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("Failed to open in-memory database")?;
        Self::from_connection(conn)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        db.run_migrations()?;
        Ok(db)
    }

    /// Get a shared connection for use by other modules
    pub fn connection(&self) -> Arc<Mutex<Connection>> {
        Arc::clone(&self.conn)
    }

    fn run_migrations(&self) -> Result<()> {
        let conn = self
            .conn
            .lock()
            .map_err(|e| anyhow::anyhow!("Lock error: {}", e))?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS schema_version (version INTEGER PRIMARY KEY)",
            [],
        )?;

        let current_version: i32 = conn
            .query_row(
                "SELECT COALESCE(MAX(version), 0) FROM schema_version",
                [],
                |row| row.get(0),
            )
            .context("Failed to read schema version")?;

        if current_version < 1 {
            Self::migrate_v1(&conn)?;
            conn.execute(
                "INSERT OR REPLACE INTO schema_version (version) VALUES (?1)",
                [1],
            )?;
        }

        Ok(())
    }

    /// Migration to version 1 - analyses table
    fn migrate_v1(conn: &Connection) -> Result<()> {
        conn.execute(
            r#"
            CREATE TABLE IF NOT EXISTS analyses (
                id TEXT PRIMARY KEY,
                idea TEXT NOT NULL,
                follow_up_answers_json TEXT NOT NULL DEFAULT '{}',
                status TEXT NOT NULL DEFAULT 'analyzing',
                current_stage INTEGER NOT NULL DEFAULT 0,
                score INTEGER,
                analysis_result_json TEXT,
                is_real_analysis INTEGER NOT NULL DEFAULT 0,
                is_partial_success INTEGER NOT NULL DEFAULT 0,
                error_message TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )
            "#,
            [],
        )?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_analyses_status ON analyses(status)",
            [],
        )?;

        Ok(())
    }
}
