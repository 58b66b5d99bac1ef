use crate::Result;
use chrono::Utc;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::path::Path;

/// One catalogued file version. Exactly one of `uploaded_at` and
/// `skip_reason` is populated on a terminal write.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct FileRecord {
    pub id: i64,
    pub local_path: String,
    pub remote_path: String,
    pub file_size: i64,
    pub mtime: i64,
    pub uploaded_at: Option<i64>,
    pub skip_reason: Option<String>,
}

/// Durable per-path record of the last handled file version, keyed unique
/// by local path. Accessed only from the processor; a single-connection
/// pool is all the concurrency the store needs.
#[derive(Debug, Clone)]
pub struct Catalog {
    pool: SqlitePool,
}

impl Catalog {
    /// Open (creating if missing) the catalogue at `path`. Directories on
    /// the way to the file are created first.
    pub async fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS files (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                local_path TEXT UNIQUE NOT NULL,
                remote_path TEXT NOT NULL,
                file_size INTEGER NOT NULL,
                mtime INTEGER NOT NULL,
                uploaded_at INTEGER,
                skip_reason TEXT
            )
            "#,
        )
        .execute(&pool)
        .await?;
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_files_local_path ON files(local_path)")
            .execute(&pool)
            .await?;

        Ok(Self { pool })
    }

    /// Point lookup by local path; `Ok(None)` means the path has never
    /// reached a terminal write.
    pub async fn get(&self, local_path: &Path) -> Result<Option<FileRecord>> {
        let record = sqlx::query_as::<_, FileRecord>(
            r#"
            SELECT id, local_path, remote_path, file_size, mtime, uploaded_at, skip_reason
            FROM files WHERE local_path = ?
            "#,
        )
        .bind(path_key(local_path))
        .fetch_optional(&self.pool)
        .await?;
        Ok(record)
    }

    /// Insert a new row. `uploaded_at` is stamped with the current UTC
    /// epoch seconds iff no skip reason is given.
    pub async fn insert(
        &self,
        local_path: &Path,
        remote_path: &str,
        file_size: i64,
        mtime: i64,
        skip_reason: Option<&str>,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO files (local_path, remote_path, file_size, mtime, uploaded_at, skip_reason)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(path_key(local_path))
        .bind(remote_path)
        .bind(file_size)
        .bind(mtime)
        .bind(uploaded_at_for(skip_reason))
        .bind(skip_reason)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Overwrite the row matched by `local_path`, same timestamp rule as
    /// [`insert`](Self::insert).
    pub async fn update(
        &self,
        local_path: &Path,
        remote_path: &str,
        file_size: i64,
        mtime: i64,
        skip_reason: Option<&str>,
    ) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE files SET remote_path = ?, file_size = ?, mtime = ?, uploaded_at = ?, skip_reason = ?
            WHERE local_path = ?
            "#,
        )
        .bind(remote_path)
        .bind(file_size)
        .bind(mtime)
        .bind(uploaded_at_for(skip_reason))
        .bind(skip_reason)
        .bind(path_key(local_path))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

fn uploaded_at_for(skip_reason: Option<&str>) -> Option<i64> {
    skip_reason.is_none().then(|| Utc::now().timestamp())
}

fn path_key(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}
