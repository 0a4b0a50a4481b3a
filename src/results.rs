use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;

use chrono::{DateTime, Utc};
use rusqlite::{params, types::Type, Connection};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::SubmitError;
use crate::language::Language;

const HTTP_TIMEOUT: Duration = Duration::from_secs(10);

/// Final snapshot of a completed session. Built once, never mutated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionResult {
    pub language: Language,
    pub wpm: u32,
    pub accuracy: u32,
    pub total_keystrokes: u32,
    pub error_count: u32,
    pub timestamp: DateTime<Utc>,
    pub session_id: Uuid,
}

impl SessionResult {
    pub fn payload(&self, user_id: &str) -> SubmissionPayload {
        SubmissionPayload {
            user_id: user_id.to_string(),
            lang: self.language,
            wpm: self.wpm,
            accuracy: self.accuracy,
            keystrokes: self.total_keystrokes,
            errors: self.error_count,
            date: self.timestamp,
            session_id: self.session_id,
        }
    }
}

/// Wire shape accepted by the result-submission collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmissionPayload {
    pub user_id: String,
    pub lang: Language,
    pub wpm: u32,
    pub accuracy: u32,
    pub keystrokes: u32,
    pub errors: u32,
    pub date: DateTime<Utc>,
    pub session_id: Uuid,
}

/// Destination for completed session results.
pub trait ResultSink: Send + Sync {
    fn submit(&self, payload: &SubmissionPayload) -> Result<(), SubmitError>;
}

/// `POST {base}/api/text/save-result` with the payload as JSON.
#[derive(Debug, Clone)]
pub struct HttpResultSink {
    base_url: String,
    client: reqwest::blocking::Client,
}

impl HttpResultSink {
    pub fn new(base_url: impl Into<String>) -> Result<Self, SubmitError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(HTTP_TIMEOUT)
            .build()?;
        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client,
        })
    }
}

impl ResultSink for HttpResultSink {
    fn submit(&self, payload: &SubmissionPayload) -> Result<(), SubmitError> {
        self.client
            .post(format!("{}/api/text/save-result", self.base_url))
            .json(payload)
            .send()?
            .error_for_status()?;
        Ok(())
    }
}

/// Local SQLite store of results, keyed by session id.
#[derive(Debug)]
pub struct ResultStore {
    conn: Mutex<Connection>,
}

impl ResultStore {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, SubmitError> {
        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                rusqlite::Error::SqliteFailure(
                    rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_CANTOPEN),
                    Some(format!("Failed to create directory: {}", e)),
                )
            })?;
        }
        Self::init(Connection::open(path)?)
    }

    pub fn open_in_memory() -> Result<Self, SubmitError> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self, SubmitError> {
        conn.execute(
            r#"
            CREATE TABLE IF NOT EXISTS session_results (
                session_id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                lang TEXT NOT NULL,
                wpm INTEGER NOT NULL,
                accuracy INTEGER NOT NULL,
                keystrokes INTEGER NOT NULL,
                errors INTEGER NOT NULL,
                date TEXT NOT NULL
            )
            "#,
            [],
        )?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_session_results_user_date ON session_results(user_id, date)",
            [],
        )?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> std::sync::MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn count(&self) -> Result<usize, SubmitError> {
        let count: i64 =
            self.conn()
                .query_row("SELECT COUNT(*) FROM session_results", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    /// Most recent results for a user, newest first.
    pub fn recent(&self, user_id: &str, limit: usize) -> Result<Vec<SubmissionPayload>, SubmitError> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            r#"
            SELECT user_id, lang, wpm, accuracy, keystrokes, errors, date, session_id
            FROM session_results
            WHERE user_id = ?1
            ORDER BY date DESC
            LIMIT ?2
            "#,
        )?;

        let rows = stmt.query_map(params![user_id, limit as i64], |row| {
            let lang: String = row.get(1)?;
            let date: String = row.get(6)?;
            let session_id: String = row.get(7)?;
            Ok(SubmissionPayload {
                user_id: row.get(0)?,
                lang: lang
                    .parse()
                    .map_err(|e| rusqlite::Error::FromSqlConversionFailure(1, Type::Text, Box::new(e)))?,
                wpm: row.get(2)?,
                accuracy: row.get(3)?,
                keystrokes: row.get(4)?,
                errors: row.get(5)?,
                date: DateTime::parse_from_rfc3339(&date)
                    .map_err(|e| rusqlite::Error::FromSqlConversionFailure(6, Type::Text, Box::new(e)))?
                    .with_timezone(&Utc),
                session_id: Uuid::parse_str(&session_id)
                    .map_err(|e| rusqlite::Error::FromSqlConversionFailure(7, Type::Text, Box::new(e)))?,
            })
        })?;

        let mut results = Vec::new();
        for row in rows {
            results.push(row?);
        }
        Ok(results)
    }
}

impl ResultSink for ResultStore {
    fn submit(&self, payload: &SubmissionPayload) -> Result<(), SubmitError> {
        let inserted = self.conn().execute(
            r#"
            INSERT OR IGNORE INTO session_results
            (session_id, user_id, lang, wpm, accuracy, keystrokes, errors, date)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            "#,
            params![
                payload.session_id.to_string(),
                payload.user_id,
                payload.lang.code(),
                payload.wpm,
                payload.accuracy,
                payload.keystrokes,
                payload.errors,
                payload.date.to_rfc3339(),
            ],
        )?;

        if inserted == 0 {
            tracing::debug!(session_id = %payload.session_id, "result already stored");
        }
        Ok(())
    }
}
