//! File metadata rows. Every query is scoped by owner id.

use serde::Serialize;
use sqlx::sqlite::SqlitePool;

#[derive(Clone)]
pub struct FileStore {
    pool: SqlitePool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum UploadStatus {
    Pending,
    Completed,
}

impl UploadStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            UploadStatus::Pending => "pending",
            UploadStatus::Completed => "completed",
        }
    }

    /// Unknown values read as `Pending`.
    pub fn parse(s: &str) -> Self {
        match s {
            "completed" => UploadStatus::Completed,
            _ => UploadStatus::Pending,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FileRecord {
    pub id: String,
    pub user_id: String,
    pub filename: String,
    pub original_filename: String,
    pub file_size: i64,
    pub mime_type: String,
    pub storage_key: String,
    pub storage_bucket: String,
    pub upload_status: UploadStatus,
    pub created_at: String,
}

#[derive(sqlx::FromRow)]
struct FileRow {
    id: String,
    user_id: String,
    filename: String,
    original_filename: String,
    file_size: i64,
    mime_type: String,
    storage_key: String,
    storage_bucket: String,
    upload_status: String,
    created_at: String,
}

impl From<FileRow> for FileRecord {
    fn from(row: FileRow) -> Self {
        Self {
            id: row.id,
            user_id: row.user_id,
            filename: row.filename,
            original_filename: row.original_filename,
            file_size: row.file_size,
            mime_type: row.mime_type,
            storage_key: row.storage_key,
            storage_bucket: row.storage_bucket,
            upload_status: UploadStatus::parse(&row.upload_status),
            created_at: row.created_at,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct NewFile<'a> {
    pub user_id: &'a str,
    pub filename: &'a str,
    pub original_filename: &'a str,
    pub file_size: i64,
    pub mime_type: &'a str,
    pub storage_key: &'a str,
    pub storage_bucket: &'a str,
    pub status: UploadStatus,
}

const FILE_COLUMNS: &str = "id, user_id, filename, original_filename, file_size, mime_type, storage_key, storage_bucket, upload_status, created_at";

impl FileStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn insert(&self, new: &NewFile<'_>) -> Result<FileRecord, sqlx::Error> {
        let id = uuid::Uuid::new_v4().to_string();

        sqlx::query(
            "INSERT INTO files (id, user_id, filename, original_filename, file_size, mime_type, storage_key, storage_bucket, upload_status)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&id)
        .bind(new.user_id)
        .bind(new.filename)
        .bind(new.original_filename)
        .bind(new.file_size)
        .bind(new.mime_type)
        .bind(new.storage_key)
        .bind(new.storage_bucket)
        .bind(new.status.as_str())
        .execute(&self.pool)
        .await?;

        self.get_owned(&id, new.user_id)
            .await?
            .ok_or(sqlx::Error::RowNotFound)
    }

    /// All files for an owner, newest first.
    pub async fn list_by_owner(&self, user_id: &str) -> Result<Vec<FileRecord>, sqlx::Error> {
        let rows: Vec<FileRow> = sqlx::query_as(&format!(
            "SELECT {} FROM files WHERE user_id = ? ORDER BY created_at DESC, rowid DESC",
            FILE_COLUMNS
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(FileRecord::from).collect())
    }

    /// Fetch one file, only if it belongs to `user_id`.
    pub async fn get_owned(
        &self,
        id: &str,
        user_id: &str,
    ) -> Result<Option<FileRecord>, sqlx::Error> {
        let row: Option<FileRow> = sqlx::query_as(&format!(
            "SELECT {} FROM files WHERE id = ? AND user_id = ?",
            FILE_COLUMNS
        ))
        .bind(id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(FileRecord::from))
    }

    /// Delete one file row, only if it belongs to `user_id`.
    pub async fn delete_owned(&self, id: &str, user_id: &str) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM files WHERE id = ? AND user_id = ?")
            .bind(id)
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
