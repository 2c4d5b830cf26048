//! # Analysis Records
//!
//! The persisted analysis record and the store the job wrapper reads and
//! writes it through.

use super::db::AnalysisDb;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::{Arc, Mutex};
use thiserror::Error;

use crate::skills::context::{AnalysisRequest, FollowUpAnswers};

#[derive(Debug, Error)]
pub enum AnalysisStoreError {
    #[error("analysis not found: {0}")]
    NotFound(String),

    #[error("analysis already exists: {0}")]
    AlreadyExists(String),

    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("lock error: {0}")]
    Lock(String),
}

/// Lifecycle of an analysis; `Completed` and `Failed` are terminal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisStatus {
    Analyzing,
    Completed,
    Failed,
}

impl AnalysisStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Analyzing => "analyzing",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    fn from_db(s: &str) -> Self {
        match s {
            "analyzing" => Self::Analyzing,
            "completed" => Self::Completed,
            _ => Self::Failed,
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Analyzing)
    }
}

/// One analysis as stored
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistedAnalysis {
    pub id: String,
    pub idea: String,
    pub follow_up_answers: FollowUpAnswers,
    pub status: AnalysisStatus,
    /// 0 before the first stage finishes, 5 when all have
    pub current_stage: usize,
    pub score: Option<i64>,
    pub analysis_result: Option<Value>,
    pub is_real_analysis: bool,
    pub is_partial_success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PersistedAnalysis {
    /// Fresh record in `analyzing`, stage 0
    pub fn new(request: &AnalysisRequest) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            idea: request.idea.clone(),
            follow_up_answers: request.follow_up_answers.clone(),
            status: AnalysisStatus::Analyzing,
            current_stage: 0,
            score: None,
            analysis_result: None,
            is_real_analysis: false,
            is_partial_success: false,
            error_message: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Rebuild the request this record was created from
    pub fn request(&self) -> anyhow::Result<AnalysisRequest> {
        AnalysisRequest::new(self.idea.clone(), self.follow_up_answers.clone())
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

/// Persistence used by the job wrapper
pub trait AnalysisStore: Send + Sync {
    /// Insert a new record
    fn create(&self, analysis: &PersistedAnalysis) -> Result<(), AnalysisStoreError>;

    /// Load by id; unknown ids are [`AnalysisStoreError::NotFound`]
    fn load(&self, id: &str) -> Result<PersistedAnalysis, AnalysisStoreError>;

    /// Overwrite an existing record
    fn save(&self, analysis: &PersistedAnalysis) -> Result<(), AnalysisStoreError>;
}

/// SQLite-backed analysis store
pub struct SqliteAnalysisStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteAnalysisStore {
    /// Create from shared AnalysisDb connection
    pub fn new(db: &AnalysisDb) -> Self {
        Self {
            conn: db.connection(),
        }
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>, AnalysisStoreError> {
        self.conn
            .lock()
            .map_err(|e| AnalysisStoreError::Lock(e.to_string()))
    }

    fn row_to_analysis(row: &rusqlite::Row) -> rusqlite::Result<(PersistedAnalysis, String, Option<String>)> {
        let created_at_str: String = row.get(10)?;
        let updated_at_str: String = row.get(11)?;
        let parse_time = |s: &str| {
            DateTime::parse_from_rfc3339(s)
                .map(|t| t.with_timezone(&Utc))
                .unwrap_or_else(|_| Utc::now())
        };

        let analysis = PersistedAnalysis {
            id: row.get(0)?,
            idea: row.get(1)?,
            follow_up_answers: FollowUpAnswers::new(),
            status: AnalysisStatus::from_db(&row.get::<_, String>(3)?),
            current_stage: row.get::<_, i64>(4)?.max(0) as usize,
            score: row.get(5)?,
            analysis_result: None,
            is_real_analysis: row.get(7)?,
            is_partial_success: row.get(8)?,
            error_message: row.get(9)?,
            created_at: parse_time(&created_at_str),
            updated_at: parse_time(&updated_at_str),
        };
        Ok((analysis, row.get(2)?, row.get(6)?))
    }
}

impl AnalysisStore for SqliteAnalysisStore {
    fn create(&self, analysis: &PersistedAnalysis) -> Result<(), AnalysisStoreError> {
        let conn = self.lock()?;
        let answers_json = serde_json::to_string(&analysis.follow_up_answers)?;
        let result_json = analysis
            .analysis_result
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;

        let inserted = conn.execute(
            r#"
            INSERT OR IGNORE INTO analyses
            (id, idea, follow_up_answers_json, status, current_stage, score,
             analysis_result_json, is_real_analysis, is_partial_success,
             error_message, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
            "#,
            params![
                analysis.id,
                analysis.idea,
                answers_json,
                analysis.status.as_str(),
                analysis.current_stage as i64,
                analysis.score,
                result_json,
                analysis.is_real_analysis,
                analysis.is_partial_success,
                analysis.error_message,
                analysis.created_at.to_rfc3339(),
                analysis.updated_at.to_rfc3339(),
            ],
        )?;

        if inserted == 0 {
            return Err(AnalysisStoreError::AlreadyExists(analysis.id.clone()));
        }
        Ok(())
    }

    fn load(&self, id: &str) -> Result<PersistedAnalysis, AnalysisStoreError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT id, idea, follow_up_answers_json, status, current_stage, score,
                   analysis_result_json, is_real_analysis, is_partial_success,
                   error_message, created_at, updated_at
            FROM analyses WHERE id = ?1
            "#,
        )?;

        let (mut analysis, answers_json, result_json) = stmt
            .query_row(params![id], Self::row_to_analysis)
            .optional()?
            .ok_or_else(|| AnalysisStoreError::NotFound(id.to_string()))?;

        analysis.follow_up_answers = serde_json::from_str(&answers_json)?;
        analysis.analysis_result = result_json
            .map(|s| serde_json::from_str(&s))
            .transpose()?;
        Ok(analysis)
    }

    fn save(&self, analysis: &PersistedAnalysis) -> Result<(), AnalysisStoreError> {
        let conn = self.lock()?;
        let result_json = analysis
            .analysis_result
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;

        let affected = conn.execute(
            r#"
            UPDATE analyses
            SET status = ?1, current_stage = ?2, score = ?3, analysis_result_json = ?4,
                is_real_analysis = ?5, is_partial_success = ?6, error_message = ?7,
                updated_at = ?8
            WHERE id = ?9
            "#,
            params![
                analysis.status.as_str(),
                analysis.current_stage as i64,
                analysis.score,
                result_json,
                analysis.is_real_analysis,
                analysis.is_partial_success,
                analysis.error_message,
                analysis.updated_at.to_rfc3339(),
                analysis.id,
            ],
        )?;

        if affected == 0 {
            return Err(AnalysisStoreError::NotFound(analysis.id.clone()));
        }
        Ok(())
    }
}
