use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use rusqlite::{
    params,
    types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef},
    Connection, OptionalExtension, Row,
};
use tracing::{debug, error, info};
use uuid::Uuid;
use crate::error::AppError;
use crate::models::*;
use crate::services::analytics::AnalyticsSummary;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS users (
    id BLOB PRIMARY KEY,
    name TEXT NOT NULL,
    email TEXT NOT NULL UNIQUE,
    password_hash TEXT NOT NULL,
    role TEXT NOT NULL DEFAULT 'user',
    is_active INTEGER NOT NULL DEFAULT 1,
    created_at TEXT NOT NULL,
    last_login TEXT
);

CREATE TABLE IF NOT EXISTS sessions (
    token BLOB PRIMARY KEY,
    user_id BLOB NOT NULL REFERENCES users(id) ON DELETE CASCADE,
    expires_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS files (
    id BLOB PRIMARY KEY,
    uploaded_by BLOB NOT NULL REFERENCES users(id) ON DELETE CASCADE,
    original_name TEXT NOT NULL,
    mimetype TEXT NOT NULL,
    size INTEGER NOT NULL,
    file_path TEXT NOT NULL,
    upload_date TEXT NOT NULL,
    processing_status TEXT NOT NULL DEFAULT 'pending',
    processing_error TEXT,
    data TEXT NOT NULL,
    analytics TEXT,
    row_count INTEGER NOT NULL,
    column_count INTEGER NOT NULL,
    worksheet_count INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_files_owner_date ON files (uploaded_by, upload_date DESC);
CREATE INDEX IF NOT EXISTS idx_files_status ON files (processing_status);
";

const USER_COLUMNS: &str = "id, name, email, password_hash, role, is_active, created_at, last_login";

const FILE_COLUMNS: &str = "id, uploaded_by, original_name, mimetype, size, file_path, \
     upload_date, processing_status, processing_error, row_count, column_count, worksheet_count";

impl ToSql for Role {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for Role {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        value.as_str()?.parse().map_err(|e: String| FromSqlError::Other(e.into()))
    }
}

impl ToSql for ProcessingStatus {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for ProcessingStatus {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        value.as_str()?.parse().map_err(|e: String| FromSqlError::Other(e.into()))
    }
}

fn user_from_row(row: &Row<'_>) -> rusqlite::Result<User> {
    Ok(User {
        id: row.get(0)?,
        name: row.get(1)?,
        email: row.get(2)?,
        password_hash: row.get(3)?,
        role: row.get(4)?,
        is_active: row.get(5)?,
        created_at: row.get(6)?,
        last_login: row.get(7)?,
    })
}

fn file_from_row(row: &Row<'_>) -> rusqlite::Result<FileRecord> {
    Ok(FileRecord {
        id: row.get(0)?,
        uploaded_by: row.get(1)?,
        original_name: row.get(2)?,
        mimetype: row.get(3)?,
        size: row.get::<_, i64>(4)? as u64,
        file_path: row.get(5)?,
        upload_date: row.get(6)?,
        processing_status: row.get(7)?,
        processing_error: row.get(8)?,
        row_count: row.get::<_, i64>(9)? as usize,
        column_count: row.get::<_, i64>(10)? as usize,
        worksheet_count: row.get::<_, i64>(11)? as usize,
    })
}

/// SQLite-backed persistence for accounts, sessions and uploaded workbooks.
pub struct Store {
    conn: Mutex<Connection>,
}

impl Store {
    pub fn open(path: &str) -> Result<Self, AppError> {
        info!("Opening database at {}", path);
        let conn = if path == ":memory:" {
            Connection::open_in_memory()
        } else {
            Connection::open(path)
        }
        .map_err(|e| {
            error!("Failed to open database {}: {}", path, e);
            AppError::DatabaseError(e.to_string())
        })?;

        Self::with_connection(conn)
    }

    fn with_connection(conn: Connection) -> Result<Self, AppError> {
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        conn.execute_batch(SCHEMA)?;
        debug!("Database schema ready");

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn create_user(&self, new_user: NewUser) -> Result<User, AppError> {
        let user = User {
            id: Uuid::new_v4(),
            name: new_user.name,
            email: new_user.email,
            password_hash: new_user.password_hash,
            role: new_user.role,
            is_active: true,
            created_at: Utc::now(),
            last_login: None,
        };

        self.conn.lock().execute(
            &format!("INSERT INTO users ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)", USER_COLUMNS),
            params![
                user.id,
                user.name,
                user.email,
                user.password_hash,
                user.role,
                user.is_active,
                user.created_at,
                user.last_login
            ],
        )?;

        info!("Created user {} ({})", user.id, user.role.as_str());
        Ok(user)
    }

    pub fn find_user(&self, id: Uuid) -> Result<Option<User>, AppError> {
        let user = self
            .conn
            .lock()
            .query_row(
                &format!("SELECT {} FROM users WHERE id = ?1", USER_COLUMNS),
                params![id],
                user_from_row,
            )
            .optional()?;
        Ok(user)
    }

    pub fn find_user_by_email(&self, email: &str) -> Result<Option<User>, AppError> {
        let user = self
            .conn
            .lock()
            .query_row(
                &format!("SELECT {} FROM users WHERE email = ?1", USER_COLUMNS),
                params![email],
                user_from_row,
            )
            .optional()?;
        Ok(user)
    }

    /// Whether `email` belongs to an account other than `except`.
    pub fn email_taken(&self, email: &str, except: Option<Uuid>) -> Result<bool, AppError> {
        let owner: Option<Uuid> = self
            .conn
            .lock()
            .query_row("SELECT id FROM users WHERE email = ?1", params![email], |row| row.get(0))
            .optional()?;
        Ok(owner.map_or(false, |id| Some(id) != except))
    }

    pub fn list_users(&self) -> Result<Vec<User>, AppError> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM users ORDER BY created_at DESC",
            USER_COLUMNS
        ))?;
        let users = stmt
            .query_map([], user_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(users)
    }

    pub fn update_profile(&self, id: Uuid, name: &str, email: &str) -> Result<Option<User>, AppError> {
        let updated = self.conn.lock().execute(
            "UPDATE users SET name = ?1, email = ?2 WHERE id = ?3",
            params![name, email, id],
        )?;
        if updated == 0 {
            return Ok(None);
        }
        self.find_user(id)
    }

    pub fn update_password(&self, id: Uuid, password_hash: &str) -> Result<(), AppError> {
        self.conn.lock().execute(
            "UPDATE users SET password_hash = ?1 WHERE id = ?2",
            params![password_hash, id],
        )?;
        Ok(())
    }

    pub fn record_login(&self, id: Uuid) -> Result<DateTime<Utc>, AppError> {
        let now = Utc::now();
        self.conn.lock().execute(
            "UPDATE users SET last_login = ?1 WHERE id = ?2",
            params![now, id],
        )?;
        Ok(now)
    }

    pub fn set_active(&self, id: Uuid, is_active: bool) -> Result<(), AppError> {
        self.conn.lock().execute(
            "UPDATE users SET is_active = ?1 WHERE id = ?2",
            params![is_active, id],
        )?;
        Ok(())
    }

    pub fn create_session(&self, user_id: Uuid, ttl: Duration) -> Result<Session, AppError> {
        let session = Session {
            token: Uuid::new_v4(),
            user_id,
            expires_at: Utc::now() + ttl,
        };

        self.conn.lock().execute(
            "INSERT INTO sessions (token, user_id, expires_at) VALUES (?1, ?2, ?3)",
            params![session.token, session.user_id, session.expires_at],
        )?;

        debug!("Created session for user {}", user_id);
        Ok(session)
    }

    pub fn find_session(&self, token: Uuid) -> Result<Option<Session>, AppError> {
        let session = self
            .conn
            .lock()
            .query_row(
                "SELECT token, user_id, expires_at FROM sessions WHERE token = ?1",
                params![token],
                |row| {
                    Ok(Session {
                        token: row.get(0)?,
                        user_id: row.get(1)?,
                        expires_at: row.get(2)?,
                    })
                },
            )
            .optional()?;
        Ok(session)
    }

    pub fn delete_session(&self, token: Uuid) -> Result<bool, AppError> {
        let deleted = self
            .conn
            .lock()
            .execute("DELETE FROM sessions WHERE token = ?1", params![token])?;
        Ok(deleted > 0)
    }

    pub fn purge_expired_sessions(&self) -> Result<usize, AppError> {
        let purged = self
            .conn
            .lock()
            .execute("DELETE FROM sessions WHERE expires_at <= ?1", params![Utc::now()])?;
        if purged > 0 {
            info!("Purged {} expired sessions", purged);
        }
        Ok(purged)
    }

    pub fn insert_file(
        &self,
        new_file: NewFile,
        analytics: Option<&AnalyticsSummary>,
    ) -> Result<FileRecord, AppError> {
        let record = FileRecord {
            id: Uuid::new_v4(),
            uploaded_by: new_file.uploaded_by,
            original_name: new_file.original_name,
            mimetype: new_file.mimetype,
            size: new_file.size,
            file_path: new_file.file_path,
            upload_date: Utc::now(),
            processing_status: new_file.processing_status,
            processing_error: None,
            row_count: new_file.data.table.row_count(),
            column_count: new_file.data.table.column_count(),
            worksheet_count: new_file.data.sheet_names.len(),
        };

        let data_json = serde_json::to_string(&new_file.data)?;
        let analytics_json = analytics.map(serde_json::to_string).transpose()?;

        self.conn.lock().execute(
            &format!(
                "INSERT INTO files ({}, data, analytics) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
                FILE_COLUMNS
            ),
            params![
                record.id,
                record.uploaded_by,
                record.original_name,
                record.mimetype,
                record.size as i64,
                record.file_path,
                record.upload_date,
                record.processing_status,
                record.processing_error,
                record.row_count as i64,
                record.column_count as i64,
                record.worksheet_count as i64,
                data_json,
                analytics_json
            ],
        )?;

        info!(
            "Stored file {} ({}) with {} rows for user {}",
            record.id, record.original_name, record.row_count, record.uploaded_by
        );
        Ok(record)
    }

    /// Files of `owner`, newest first.
    pub fn list_files(&self, owner: Uuid, limit: usize, offset: usize) -> Result<Vec<FileRecord>, AppError> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM files WHERE uploaded_by = ?1 \
             ORDER BY upload_date DESC LIMIT ?2 OFFSET ?3",
            FILE_COLUMNS
        ))?;
        let files = stmt
            .query_map(params![owner, limit as i64, offset as i64], file_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(files)
    }

    pub fn count_files(&self, owner: Uuid) -> Result<usize, AppError> {
        let count: i64 = self.conn.lock().query_row(
            "SELECT COUNT(*) FROM files WHERE uploaded_by = ?1",
            params![owner],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }

    pub fn find_file(&self, owner: Uuid, id: Uuid) -> Result<Option<FileRecord>, AppError> {
        let file = self
            .conn
            .lock()
            .query_row(
                &format!("SELECT {} FROM files WHERE id = ?1 AND uploaded_by = ?2", FILE_COLUMNS),
                params![id, owner],
                file_from_row,
            )
            .optional()?;
        Ok(file)
    }

    pub fn file_data(&self, id: Uuid) -> Result<Option<SheetData>, AppError> {
        let raw: Option<String> = self
            .conn
            .lock()
            .query_row("SELECT data FROM files WHERE id = ?1", params![id], |row| row.get(0))
            .optional()?;
        raw.map(|json| serde_json::from_str(&json)).transpose().map_err(AppError::from)
    }

    pub fn file_analytics(&self, id: Uuid) -> Result<Option<AnalyticsSummary>, AppError> {
        let raw: Option<Option<String>> = self
            .conn
            .lock()
            .query_row("SELECT analytics FROM files WHERE id = ?1", params![id], |row| row.get(0))
            .optional()?;
        raw.flatten()
            .map(|json| serde_json::from_str(&json))
            .transpose()
            .map_err(AppError::from)
    }

    pub fn save_analytics(&self, id: Uuid, analytics: &AnalyticsSummary) -> Result<(), AppError> {
        let json = serde_json::to_string(analytics)?;
        self.conn.lock().execute(
            "UPDATE files SET analytics = ?1 WHERE id = ?2",
            params![json, id],
        )?;
        debug!("Saved analytics for file {}", id);
        Ok(())
    }

    pub fn delete_file(&self, owner: Uuid, id: Uuid) -> Result<bool, AppError> {
        let deleted = self.conn.lock().execute(
            "DELETE FROM files WHERE id = ?1 AND uploaded_by = ?2",
            params![id, owner],
        )?;
        Ok(deleted > 0)
    }

    pub fn dashboard_stats(&self, owner: Uuid) -> Result<DashboardStats, AppError> {
        let total_files = self.count_files(owner)?;
        let total_rows: i64 = self.conn.lock().query_row(
            "SELECT COALESCE(SUM(row_count), 0) FROM files \
             WHERE uploaded_by = ?1 AND processing_status = ?2",
            params![owner, ProcessingStatus::Completed],
            |row| row.get(0),
        )?;
        let recent_uploads = self.list_files(owner, 5, 0)?;

        Ok(DashboardStats {
            total_files,
            total_rows: total_rows as usize,
            recent_uploads,
        })
    }
}
