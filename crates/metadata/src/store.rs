//! Session registry trait and the SQLite implementation.

use crate::error::{MetadataError, MetadataResult};
use crate::models::{UploadChunkRow, UploadSessionRow, to_u32};
use crate::repos::{ChunkReceipt, TransitionDetail, UploadRepo};
use async_trait::async_trait;
use reel_core::{ChunkIndex, ChunkRecord, OwnerId, SessionId, UploadSession, UploadState};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Pool, Sqlite, SqliteConnection};
use std::collections::BTreeSet;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use time::OffsetDateTime;
use tracing::{debug, instrument};

/// Combined session registry trait.
#[async_trait]
pub trait SessionRegistry: UploadRepo + Send + Sync {
    /// Create tables if they do not exist.
    async fn migrate(&self) -> MetadataResult<()>;

    /// Check database connectivity and health.
    async fn health_check(&self) -> MetadataResult<()>;
}

/// SQLite-based session registry.
pub struct SqliteStore {
    pool: Pool<Sqlite>,
}

impl SqliteStore {
    /// Open (or create) the database at `path` and apply the schema.
    pub async fn new(path: impl AsRef<Path>, busy_timeout: Duration) -> MetadataResult<Self> {
        let path = path.as_ref();

        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }

        let opts = SqliteConnectOptions::from_str(&format!("sqlite:{}?mode=rwc", path.display()))?
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .synchronous(sqlx::sqlite::SqliteSynchronous::Normal)
            .foreign_keys(true)
            .busy_timeout(busy_timeout);

        // One connection serializes every registry transaction, which is
        // what makes mark_received and transition atomic across tasks.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(opts)
            .await?;

        let store = Self { pool };
        store.migrate().await?;
        debug!(path = %path.display(), "sqlite registry ready");

        Ok(store)
    }

    async fn load_session(
        conn: &mut SqliteConnection,
        session_id: SessionId,
    ) -> MetadataResult<Option<UploadSession>> {
        let row = sqlx::query_as::<_, UploadSessionRow>(
            "SELECT * FROM upload_sessions WHERE session_id = ?",
        )
        .bind(session_id.as_uuid())
        .fetch_optional(&mut *conn)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let indices: Vec<i64> = sqlx::query_scalar(
            "SELECT chunk_index FROM upload_chunks WHERE session_id = ? ORDER BY chunk_index",
        )
        .bind(session_id.as_uuid())
        .fetch_all(&mut *conn)
        .await?;

        let received = indices
            .into_iter()
            .map(|i| to_u32(i, "chunk_index"))
            .collect::<MetadataResult<BTreeSet<_>>>()?;

        row.into_session(received).map(Some)
    }
}

#[async_trait]
impl SessionRegistry for SqliteStore {
    async fn migrate(&self) -> MetadataResult<()> {
        sqlx::raw_sql(SCHEMA_SQL).execute(&self.pool).await?;
        Ok(())
    }

    async fn health_check(&self) -> MetadataResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

#[async_trait]
impl UploadRepo for SqliteStore {
    #[instrument(skip(self), fields(session_id = %session_id))]
    async fn get_or_create_session(
        &self,
        session_id: SessionId,
        owner_id: &OwnerId,
    ) -> MetadataResult<UploadSession> {
        let now = OffsetDateTime::now_utc();
        let mut conn = self.pool.acquire().await?;

        let created = sqlx::query(
            r#"
            INSERT INTO upload_sessions (session_id, owner_id, state, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(session_id) DO NOTHING
            "#,
        )
        .bind(session_id.as_uuid())
        .bind(owner_id.as_str())
        .bind(UploadState::Uploading.as_str())
        .bind(now)
        .bind(now)
        .execute(&mut *conn)
        .await?
        .rows_affected()
            > 0;

        if created {
            debug!(owner_id = %owner_id, "upload session created");
        }

        let session = Self::load_session(&mut conn, session_id)
            .await?
            .ok_or_else(|| MetadataError::NotFound(session_id.to_string()))?;

        if &session.owner_id != owner_id {
            return Err(MetadataError::OwnershipMismatch {
                session_id: session_id.to_string(),
            });
        }

        Ok(session)
    }

    async fn get_session(&self, session_id: SessionId) -> MetadataResult<Option<UploadSession>> {
        let mut conn = self.pool.acquire().await?;
        Self::load_session(&mut conn, session_id).await
    }

    #[instrument(skip(self), fields(session_id = %session_id))]
    async fn claim_chunk_count(
        &self,
        session_id: SessionId,
        total_chunks: u32,
    ) -> MetadataResult<u32> {
        let mut tx = self.pool.begin().await?;

        let claimed = sqlx::query(
            r#"
            UPDATE upload_sessions SET expected_chunks = ?, updated_at = ?
            WHERE session_id = ? AND expected_chunks IS NULL
            "#,
        )
        .bind(i64::from(total_chunks))
        .bind(OffsetDateTime::now_utc())
        .bind(session_id.as_uuid())
        .execute(&mut *tx)
        .await?
        .rows_affected()
            > 0;

        let expected: Option<i64> =
            sqlx::query_scalar("SELECT expected_chunks FROM upload_sessions WHERE session_id = ?")
                .bind(session_id.as_uuid())
                .fetch_optional(&mut *tx)
                .await?
                .ok_or_else(|| MetadataError::NotFound(session_id.to_string()))?;

        tx.commit().await?;

        let expected = match expected {
            Some(n) => to_u32(n, "expected_chunks")?,
            None => return Err(MetadataError::NotFound(session_id.to_string())),
        };
        if expected != total_chunks {
            return Err(MetadataError::ChunkCountMismatch {
                expected,
                actual: total_chunks,
            });
        }

        if claimed {
            debug!(total_chunks, "chunk count fixed");
        }
        Ok(expected)
    }

    #[instrument(skip(self), fields(session_id = %session_id))]
    async fn mark_received(
        &self,
        session_id: SessionId,
        index: ChunkIndex,
        total_chunks: u32,
        byte_length: u64,
    ) -> MetadataResult<ChunkReceipt> {
        if index >= total_chunks {
            return Err(MetadataError::Constraint(format!(
                "chunk index {index} outside 0..{total_chunks}"
            )));
        }

        let now = OffsetDateTime::now_utc();
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query_as::<_, UploadSessionRow>(
            "SELECT * FROM upload_sessions WHERE session_id = ?",
        )
        .bind(session_id.as_uuid())
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| MetadataError::NotFound(session_id.to_string()))?;

        let state: UploadState = row.state.parse()?;
        let expected = match row.expected_chunks {
            Some(n) => to_u32(n, "expected_chunks")?,
            None => total_chunks,
        };
        if expected != total_chunks {
            return Err(MetadataError::ChunkCountMismatch {
                expected,
                actual: total_chunks,
            });
        }

        if state == UploadState::Uploading {
            if row.expected_chunks.is_none() {
                sqlx::query(
                    "UPDATE upload_sessions SET expected_chunks = ? WHERE session_id = ? AND expected_chunks IS NULL",
                )
                .bind(i64::from(total_chunks))
                .bind(session_id.as_uuid())
                .execute(&mut *tx)
                .await?;
            }

            let byte_length = i64::try_from(byte_length).map_err(|_| {
                MetadataError::Constraint(format!("byte length too large: {byte_length}"))
            })?;

            sqlx::query(
                r#"
                INSERT INTO upload_chunks (session_id, chunk_index, byte_length, received_at)
                VALUES (?, ?, ?, ?)
                ON CONFLICT(session_id, chunk_index) DO UPDATE SET
                    byte_length = excluded.byte_length,
                    received_at = excluded.received_at
                "#,
            )
            .bind(session_id.as_uuid())
            .bind(i64::from(index))
            .bind(byte_length)
            .bind(now)
            .execute(&mut *tx)
            .await?;

            sqlx::query("UPDATE upload_sessions SET updated_at = ? WHERE session_id = ?")
                .bind(now)
                .bind(session_id.as_uuid())
                .execute(&mut *tx)
                .await?;
        }

        let received: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM upload_chunks WHERE session_id = ?")
                .bind(session_id.as_uuid())
                .fetch_one(&mut *tx)
                .await?;
        let received = to_u32(received, "received count")?;

        tx.commit().await?;

        Ok(ChunkReceipt {
            complete: received == expected,
            received,
            expected,
            state,
        })
    }

    #[instrument(skip(self, detail), fields(session_id = %session_id, %from, %to))]
    async fn transition(
        &self,
        session_id: SessionId,
        from: UploadState,
        to: UploadState,
        detail: TransitionDetail,
    ) -> MetadataResult<()> {
        from.ensure_transition(to)
            .map_err(|_| MetadataError::InvalidStateTransition {
                from: from.to_string(),
                to: to.to_string(),
            })?;

        let (artifact, error) = match (to, detail) {
            (UploadState::Complete, TransitionDetail::Published(artifact)) => {
                (Some(artifact), None)
            }
            (UploadState::Complete, _) => {
                return Err(MetadataError::Constraint(
                    "completing a session requires a published artifact".to_string(),
                ));
            }
            (UploadState::Failed, TransitionDetail::Failed { code, detail }) => {
                (None, Some((code, detail)))
            }
            (_, TransitionDetail::None) => (None, None),
            (to, _) => {
                return Err(MetadataError::Constraint(format!(
                    "transition detail does not apply to state {to}"
                )));
            }
        };

        let artifact_size = artifact
            .as_ref()
            .map(|a| i64::try_from(a.size))
            .transpose()
            .map_err(|_| MetadataError::Constraint("artifact size too large".to_string()))?;

        let result = sqlx::query(
            r#"
            UPDATE upload_sessions SET
                state = ?,
                updated_at = ?,
                artifact_key = COALESCE(?, artifact_key),
                artifact_size = COALESCE(?, artifact_size),
                artifact_sha256 = COALESCE(?, artifact_sha256),
                error_code = COALESCE(?, error_code),
                error_detail = COALESCE(?, error_detail)
            WHERE session_id = ? AND state = ?
            "#,
        )
        .bind(to.as_str())
        .bind(OffsetDateTime::now_utc())
        .bind(artifact.as_ref().map(|a| a.key.as_str()))
        .bind(artifact_size)
        .bind(artifact.as_ref().map(|a| a.sha256.to_hex()))
        .bind(error.as_ref().map(|(code, _)| code.as_str()))
        .bind(error.as_ref().map(|(_, detail)| detail.as_str()))
        .bind(session_id.as_uuid())
        .bind(from.as_str())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() > 0 {
            debug!("session state changed");
            return Ok(());
        }

        let current: Option<String> =
            sqlx::query_scalar("SELECT state FROM upload_sessions WHERE session_id = ?")
                .bind(session_id.as_uuid())
                .fetch_optional(&self.pool)
                .await?;

        match current {
            None => Err(MetadataError::NotFound(session_id.to_string())),
            Some(actual) => Err(MetadataError::InvalidStateTransition {
                from: actual,
                to: to.to_string(),
            }),
        }
    }

    async fn received_chunks(&self, session_id: SessionId) -> MetadataResult<Vec<ChunkRecord>> {
        let rows = sqlx::query_as::<_, UploadChunkRow>(
            "SELECT * FROM upload_chunks WHERE session_id = ? ORDER BY chunk_index",
        )
        .bind(session_id.as_uuid())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(ChunkRecord::try_from).collect()
    }
}

const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS upload_sessions (
    session_id BLOB PRIMARY KEY,
    owner_id TEXT NOT NULL,
    expected_chunks INTEGER,
    state TEXT NOT NULL DEFAULT 'uploading',
    artifact_key TEXT,
    artifact_size INTEGER,
    artifact_sha256 TEXT,
    error_code TEXT,
    error_detail TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_upload_sessions_state ON upload_sessions(state);

CREATE TABLE IF NOT EXISTS upload_chunks (
    session_id BLOB NOT NULL,
    chunk_index INTEGER NOT NULL,
    byte_length INTEGER NOT NULL,
    received_at TEXT NOT NULL,
    PRIMARY KEY (session_id, chunk_index),
    FOREIGN KEY (session_id) REFERENCES upload_sessions(session_id) ON DELETE CASCADE
);
"#;
