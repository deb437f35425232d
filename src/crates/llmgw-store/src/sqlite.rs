use std::path::Path;

use async_trait::async_trait;
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};
use sqlx::Row;
use tracing::{debug, info};

use llmgw_types::{BatchRecord, CallIdentifier, ParsedError, ParsedResponse, ToolCall};

use crate::coldtier::{self, ColdTierPaths};
use crate::error::Result;
use crate::Datastore;

/// The SQLite-backed hot tier. One pool per process, connections treated
/// as thread-affine and write transactions kept short, which a
/// single-connection `SqlitePool` gives us for free.
pub struct SqliteDatastore {
    pool: SqlitePool,
    cold: ColdTierPaths,
}

impl SqliteDatastore {
    pub async fn open(db_path: impl AsRef<Path>, cold: ColdTierPaths) -> Result<Self> {
        let path = db_path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let url = format!("sqlite:{}?mode=rwc", path.display());
        let pool = SqlitePoolOptions::new().max_connections(1).connect(&url).await?;
        sqlx::migrate!("./migrations").run(&pool).await?;
        info!(path = %path.display(), "datastore opened");
        Ok(SqliteDatastore { pool, cold })
    }

    /// In-memory datastore for tests: same schema, no file on disk.
    pub async fn open_in_memory(cold: ColdTierPaths) -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;
        sqlx::migrate!("./migrations").run(&pool).await?;
        Ok(SqliteDatastore { pool, cold })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

#[async_trait]
impl Datastore for SqliteDatastore {
    async fn retrieve(&self, cid: &CallIdentifier, with_metadata: bool) -> Result<Option<ParsedResponse>> {
        let row = sqlx::query(
            "SELECT id, response, response_id, function_calls_json FROM responses \
             WHERE agent_name = ? AND doc_hash = ? AND seq_id = ? ORDER BY id ASC LIMIT 1",
        )
        .bind(&cid.agent_name)
        .bind(&cid.doc_hash)
        .bind(cid.seq_id as i64)
        .fetch_optional(&self.pool)
        .await?;

        let row = match row {
            Some(row) => Some(row),
            None => {
                debug!(agent = %cid.agent_name, hash = %cid.doc_hash, seq = cid.seq_id, "exact seq_id miss, retrying without it");
                sqlx::query(
                    "SELECT id, response, response_id, function_calls_json FROM responses \
                     WHERE agent_name = ? AND doc_hash = ? ORDER BY id ASC LIMIT 1",
                )
                .bind(&cid.agent_name)
                .bind(&cid.doc_hash)
                .fetch_optional(&self.pool)
                .await?
            }
        };

        let Some(row) = row else {
            return Ok(None);
        };

        let id: i64 = row.get("id");
        let text: String = row.get("response");
        let response_id: Option<String> = row.get("response_id");
        let function_calls_json: String = row.get("function_calls_json");
        let function_calls: Vec<ToolCall> = serde_json::from_str(&function_calls_json)?;

        let metadata = if with_metadata {
            fetch_metadata_json(&self.pool, id, &response_id, &cid.agent_name, cid.seq_id, cid.session_id).await?
        } else {
            serde_json::Value::Null
        };

        Ok(Some(ParsedResponse {
            text,
            response_id,
            custom_id: None,
            metadata,
            function_calls,
        }))
    }

    async fn store(&self, cid: &CallIdentifier, parsed: &ParsedResponse, upsert: bool) -> Result<()> {
        let function_calls_json = serde_json::to_string(&parsed.function_calls)?;
        let mut tx = self.pool.begin().await?;

        let existing_id = if upsert {
            sqlx::query(
                "SELECT id FROM responses WHERE agent_name = ? AND doc_hash = ? ORDER BY id ASC LIMIT 1",
            )
            .bind(&cid.agent_name)
            .bind(&cid.doc_hash)
            .fetch_optional(&mut *tx)
            .await?
            .map(|row| row.get::<i64, _>("id"))
        } else {
            None
        };

        let response_id = if let Some(id) = existing_id {
            sqlx::query(
                "UPDATE responses SET seq_id = ?, session_id = ?, response = ?, response_id = ?, function_calls_json = ? WHERE id = ?",
            )
            .bind(cid.seq_id as i64)
            .bind(cid.session_id as i64)
            .bind(&parsed.text)
            .bind(&parsed.response_id)
            .bind(&function_calls_json)
            .bind(id)
            .execute(&mut *tx)
            .await?;
            id
        } else {
            let result = sqlx::query(
                "INSERT INTO responses (agent_name, seq_id, session_id, doc_hash, response, response_id, function_calls_json) \
                 VALUES (?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(&cid.agent_name)
            .bind(cid.seq_id as i64)
            .bind(cid.session_id as i64)
            .bind(&cid.doc_hash)
            .bind(&parsed.text)
            .bind(&parsed.response_id)
            .bind(&function_calls_json)
            .execute(&mut *tx)
            .await?;
            result.last_insert_rowid()
        };

        let metadata_json = serde_json::to_string(&parsed.metadata)?;
        sqlx::query("DELETE FROM metadata WHERE response_id = ?")
            .bind(response_id)
            .execute(&mut *tx)
            .await?;
        sqlx::query(
            "INSERT INTO metadata (response_id, agent_name, seq_id, session_id, metadata_json, provider_type, tag) \
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(response_id)
        .bind(&cid.agent_name)
        .bind(cid.seq_id as i64)
        .bind(cid.session_id as i64)
        .bind(&metadata_json)
        .bind(&cid.meta.provider_type)
        .bind(&cid.meta.tag)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn store_error(&self, cid: &CallIdentifier, err: &ParsedError) -> Result<()> {
        sqlx::query(
            "INSERT INTO errors (agent_name, seq_id, session_id, doc_hash, error_message, error_code, error_id) \
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&cid.agent_name)
        .bind(cid.seq_id as i64)
        .bind(cid.session_id as i64)
        .bind(&cid.doc_hash)
        .bind(&err.message)
        .bind(&err.code)
        .bind(&err.error_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn store_pending_batch(&self, batch_uuid: &str, entries: &[(CallIdentifier, String)]) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        for (cid, custom_id) in entries {
            sqlx::query(
                "INSERT OR IGNORE INTO batch_pending \
                 (agent_name, seq_id, session_id, doc_hash, provider_type, batch_uuid, custom_id, is_pending, tag) \
                 VALUES (?, ?, ?, ?, ?, ?, ?, 1, ?)",
            )
            .bind(&cid.agent_name)
            .bind(cid.seq_id as i64)
            .bind(cid.session_id as i64)
            .bind(&cid.doc_hash)
            .bind(&cid.meta.provider_type)
            .bind(batch_uuid)
            .bind(custom_id)
            .bind(&cid.meta.tag)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn store_ready_batch(
        &self,
        batch_uuid: &str,
        responses: &[ParsedResponse],
        upsert: bool,
    ) -> Result<Vec<CallIdentifier>> {
        let mut resolved = Vec::with_capacity(responses.len());
        for parsed in responses {
            let Some(custom_id) = &parsed.custom_id else {
                continue;
            };
            let row = sqlx::query(
                "SELECT agent_name, seq_id, session_id, doc_hash, provider_type, tag \
                 FROM batch_pending WHERE batch_uuid = ? AND custom_id = ?",
            )
            .bind(batch_uuid)
            .bind(custom_id)
            .fetch_optional(&self.pool)
            .await?;
            let Some(row) = row else {
                tracing::warn!(%batch_uuid, %custom_id, "batch result has no matching pending row, dropping");
                continue;
            };
            let cid = CallIdentifier::new(
                row.get::<String, _>("agent_name"),
                row.get::<String, _>("doc_hash"),
                row.get::<i64, _>("seq_id") as u64,
                row.get::<i64, _>("session_id") as u64,
            )
            .with_meta(row.get("provider_type"), row.get("tag"));
            self.store(&cid, parsed, upsert).await?;
            resolved.push(cid);
        }
        Ok(resolved)
    }

    async fn retrieve_batch_cids(&self, batch_uuid: &str) -> Result<Vec<BatchRecord>> {
        let rows = sqlx::query(
            "SELECT agent_name, seq_id, session_id, doc_hash, provider_type, tag, custom_id, is_pending \
             FROM batch_pending WHERE batch_uuid = ?",
        )
        .bind(batch_uuid)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| {
                let cid = CallIdentifier::new(
                    row.get::<String, _>("agent_name"),
                    row.get::<String, _>("doc_hash"),
                    row.get::<i64, _>("seq_id") as u64,
                    row.get::<i64, _>("session_id") as u64,
                )
                .with_meta(row.get("provider_type"), row.get("tag"));
                BatchRecord {
                    cid,
                    custom_id: row.get("custom_id"),
                    batch_uuid: batch_uuid.to_string(),
                    is_pending: row.get::<i64, _>("is_pending") != 0,
                }
            })
            .collect())
    }

    async fn list_pending_batch_uuids(&self) -> Result<Vec<String>> {
        let rows = sqlx::query("SELECT DISTINCT batch_uuid FROM batch_pending WHERE is_pending = 1")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(|row| row.get("batch_uuid")).collect())
    }

    async fn clear_batch_pending(&self, batch_uuid: &str) -> Result<()> {
        sqlx::query("UPDATE batch_pending SET is_pending = 0 WHERE batch_uuid = ?")
            .bind(batch_uuid)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn call_in_pending_batch(&self, cid: &CallIdentifier) -> Result<bool> {
        let row = sqlx::query(
            "SELECT COUNT(*) as n FROM batch_pending \
             WHERE agent_name = ? AND doc_hash = ? AND seq_id = ? AND is_pending = 1",
        )
        .bind(&cid.agent_name)
        .bind(&cid.doc_hash)
        .bind(cid.seq_id as i64)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.get::<i64, _>("n") > 0)
    }

    async fn persist(&self) -> Result<()> {
        coldtier::flush(&self.pool, &self.cold).await
    }

    async fn close(&self) -> Result<()> {
        self.pool.close().await;
        Ok(())
    }
}

/// Legacy-tolerant join: try `response_id` first, falling back to the
/// `(agent, seq, session)` triple when it is absent or stale. The hot
/// table is consulted first; callers that also need cold-tier metadata
/// look there once this returns `Null`.
async fn fetch_metadata_json(
    pool: &SqlitePool,
    response_id: i64,
    legacy_response_id: &Option<String>,
    agent_name: &str,
    seq_id: u64,
    session_id: u64,
) -> Result<serde_json::Value> {
    if let Some(legacy_id) = legacy_response_id {
        let row = sqlx::query("SELECT metadata_json FROM metadata WHERE response_id = ? AND ? != ''")
            .bind(response_id)
            .bind(legacy_id)
            .fetch_optional(pool)
            .await?;
        if let Some(row) = row {
            let json: String = row.get("metadata_json");
            return Ok(serde_json::from_str(&json)?);
        }
    }
    let row = sqlx::query(
        "SELECT metadata_json FROM metadata WHERE agent_name = ? AND seq_id = ? AND session_id = ?",
    )
    .bind(agent_name)
    .bind(seq_id as i64)
    .bind(session_id as i64)
    .fetch_optional(pool)
    .await?;
    match row {
        Some(row) => {
            let json: String = row.get("metadata_json");
            Ok(serde_json::from_str(&json)?)
        }
        None => Ok(serde_json::Value::Null),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use llmgw_types::ParsedResponse;

    async fn store() -> SqliteDatastore {
        SqliteDatastore::open_in_memory(ColdTierPaths::new(std::env::temp_dir()))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn store_then_retrieve_round_trips() {
        let store = store().await;
        let cid = CallIdentifier::new("agent", "hash", 0, 1);
        store.store(&cid, &ParsedResponse::new("hello"), false).await.unwrap();
        let got = store.retrieve(&cid, false).await.unwrap().unwrap();
        assert_eq!(got.text, "hello");
    }

    #[tokio::test]
    async fn oldest_row_wins_on_duplicate() {
        let store = store().await;
        let cid = CallIdentifier::new("a", "h", 0, 1);
        store.store(&cid, &ParsedResponse::new("old"), false).await.unwrap();
        store.store(&cid, &ParsedResponse::new("new"), false).await.unwrap();
        let got = store.retrieve(&cid, false).await.unwrap().unwrap();
        assert_eq!(got.text, "old");
    }

    #[tokio::test]
    async fn upsert_replaces_smallest_id() {
        let store = store().await;
        let cid = CallIdentifier::new("a", "h", 0, 1);
        store.store(&cid, &ParsedResponse::new("old"), false).await.unwrap();
        store.store(&cid, &ParsedResponse::new("new"), true).await.unwrap();
        let got = store.retrieve(&cid, false).await.unwrap().unwrap();
        assert_eq!(got.text, "new");
    }

    #[tokio::test]
    async fn missing_seq_id_falls_back_to_doc_hash() {
        let store = store().await;
        let written = CallIdentifier::new("a", "h", 5, 1);
        store.store(&written, &ParsedResponse::new("v"), false).await.unwrap();
        let lookup = CallIdentifier::new("a", "h", 99, 1);
        let got = store.retrieve(&lookup, false).await.unwrap().unwrap();
        assert_eq!(got.text, "v");
    }

    #[tokio::test]
    async fn pending_batch_lifecycle() {
        let store = store().await;
        let cid = CallIdentifier::new("a", "h", 0, 1);
        store
            .store_pending_batch("uuid-1", &[(cid.clone(), "custom-1".to_string())])
            .await
            .unwrap();
        assert!(store.call_in_pending_batch(&cid).await.unwrap());

        let mut response = ParsedResponse::new("batched");
        response.custom_id = Some("custom-1".to_string());
        let resolved = store.store_ready_batch("uuid-1", &[response], false).await.unwrap();
        assert_eq!(resolved.len(), 1);

        store.clear_batch_pending("uuid-1").await.unwrap();
        assert!(!store.call_in_pending_batch(&cid).await.unwrap());

        let got = store.retrieve(&cid, false).await.unwrap().unwrap();
        assert_eq!(got.text, "batched");
    }
}
