//! Cold-tier columnar archival.
//!
//! Metadata rows whose `provider_type ∈ {openai, google}` are
//! periodically moved out of the hot relational tables into per-provider
//! Parquet files — one for responses, one for messages (the joined
//! metadata). Flush is atomic per file: write a `.tmp` sibling, `fsync`
//! it, then `rename` over the target; the hot-row delete happens in the
//! same database transaction as the rename. A crash between the rename
//! and the delete just means the next flush re-reads rows that are
//! already archived — the merge step below dedups by `(agent_name,
//! doc_hash, seq_id, session_id)`, so that is harmless.

use std::collections::HashSet;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parquet::column::writer::ColumnWriter;
use parquet::data_type::ByteArray;
use parquet::file::properties::WriterProperties;
use parquet::file::reader::{FileReader, SerializedFileReader};
use parquet::file::writer::SerializedFileWriter;
use parquet::schema::parser::parse_message_type;
use serde::Deserialize;
use sqlx::{Row, SqlitePool};

use crate::error::{Result, StoreError};

/// Provider families archived to the cold tier.
const COLD_PROVIDERS: &[&str] = &["openai", "google"];

/// Where the cold-tier files for one working directory live:
/// `<dir>/datastore/apimeta/<provider>-{responses,messages}.parquet`.
#[derive(Clone, Debug)]
pub struct ColdTierPaths {
    dir: PathBuf,
}

impl ColdTierPaths {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        ColdTierPaths { dir: dir.into() }
    }

    pub fn responses_path(&self, provider: &str) -> PathBuf {
        self.dir.join(format!("{provider}-responses.parquet"))
    }

    pub fn messages_path(&self, provider: &str) -> PathBuf {
        self.dir.join(format!("{provider}-messages.parquet"))
    }
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
struct ColdResponseRow {
    agent_name: String,
    seq_id: i64,
    session_id: i64,
    doc_hash: String,
    response: String,
    response_id: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
struct ColdMessageRow {
    response_id: Option<String>,
    agent_name: String,
    seq_id: i64,
    session_id: i64,
    metadata_json: String,
    tag: Option<String>,
}

const RESPONSE_SCHEMA: &str = "
message cold_response {
    REQUIRED BYTE_ARRAY agent_name (UTF8);
    REQUIRED INT64 seq_id;
    REQUIRED INT64 session_id;
    REQUIRED BYTE_ARRAY doc_hash (UTF8);
    REQUIRED BYTE_ARRAY response (UTF8);
    OPTIONAL BYTE_ARRAY response_id (UTF8);
}
";

const MESSAGE_SCHEMA: &str = "
message cold_message {
    OPTIONAL BYTE_ARRAY response_id (UTF8);
    REQUIRED BYTE_ARRAY agent_name (UTF8);
    REQUIRED INT64 seq_id;
    REQUIRED INT64 session_id;
    REQUIRED BYTE_ARRAY metadata_json (UTF8);
    OPTIONAL BYTE_ARRAY tag (UTF8);
}
";

/// Archives every cold-eligible provider's metadata. Called from
/// `Datastore::persist()`.
pub async fn flush(pool: &SqlitePool, paths: &ColdTierPaths) -> Result<()> {
    std::fs::create_dir_all(&paths.dir)?;
    for provider in COLD_PROVIDERS {
        flush_provider(pool, paths, provider).await?;
    }
    Ok(())
}

async fn flush_provider(pool: &SqlitePool, paths: &ColdTierPaths, provider: &str) -> Result<()> {
    let rows = sqlx::query(
        "SELECT r.id, r.agent_name, r.seq_id, r.session_id, r.doc_hash, r.response, r.response_id, \
                m.metadata_json, m.tag \
         FROM responses r JOIN metadata m ON m.response_id = r.id \
         WHERE m.provider_type = ?",
    )
    .bind(provider)
    .fetch_all(pool)
    .await?;

    if rows.is_empty() {
        return Ok(());
    }

    let mut response_rows = Vec::with_capacity(rows.len());
    let mut message_rows = Vec::with_capacity(rows.len());
    let mut ids = Vec::with_capacity(rows.len());
    for row in &rows {
        let id: i64 = row.get("id");
        ids.push(id);
        let response_id: Option<String> = row.get("response_id");
        response_rows.push(ColdResponseRow {
            agent_name: row.get("agent_name"),
            seq_id: row.get("seq_id"),
            session_id: row.get("session_id"),
            doc_hash: row.get("doc_hash"),
            response: row.get("response"),
            response_id: response_id.clone(),
        });
        message_rows.push(ColdMessageRow {
            response_id,
            agent_name: row.get("agent_name"),
            seq_id: row.get("seq_id"),
            session_id: row.get("session_id"),
            metadata_json: row.get("metadata_json"),
            tag: row.get("tag"),
        });
    }

    merge_and_write_responses(&paths.responses_path(provider), response_rows)?;
    merge_and_write_messages(&paths.messages_path(provider), message_rows)?;

    let mut tx = pool.begin().await?;
    for id in ids {
        sqlx::query("DELETE FROM metadata WHERE response_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM responses WHERE id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;
    }
    tx.commit().await?;
    Ok(())
}

fn merge_and_write_responses(path: &Path, new_rows: Vec<ColdResponseRow>) -> Result<()> {
    let mut existing = read_rows::<ColdResponseRow>(path)?;
    let mut seen: HashSet<(String, String, i64, i64)> = existing
        .iter()
        .map(|r| (r.agent_name.clone(), r.doc_hash.clone(), r.seq_id, r.session_id))
        .collect();
    for row in new_rows {
        let key = (row.agent_name.clone(), row.doc_hash.clone(), row.seq_id, row.session_id);
        if seen.insert(key) {
            existing.push(row);
        }
    }

    let agent_name: Vec<&str> = existing.iter().map(|r| r.agent_name.as_str()).collect();
    let seq_id: Vec<i64> = existing.iter().map(|r| r.seq_id).collect();
    let session_id: Vec<i64> = existing.iter().map(|r| r.session_id).collect();
    let doc_hash: Vec<&str> = existing.iter().map(|r| r.doc_hash.as_str()).collect();
    let response: Vec<&str> = existing.iter().map(|r| r.response.as_str()).collect();
    let response_id: Vec<Option<&str>> = existing.iter().map(|r| r.response_id.as_deref()).collect();

    write_parquet(
        path,
        RESPONSE_SCHEMA,
        vec![
            ColumnData::Str(agent_name),
            ColumnData::I64(seq_id),
            ColumnData::I64(session_id),
            ColumnData::Str(doc_hash),
            ColumnData::Str(response),
            ColumnData::OptStr(response_id),
        ],
    )
}

fn merge_and_write_messages(path: &Path, new_rows: Vec<ColdMessageRow>) -> Result<()> {
    let mut existing = read_rows::<ColdMessageRow>(path)?;
    let mut seen: HashSet<(String, i64, i64)> = existing
        .iter()
        .map(|r| (r.agent_name.clone(), r.seq_id, r.session_id))
        .collect();
    for row in new_rows {
        let key = (row.agent_name.clone(), row.seq_id, row.session_id);
        if seen.insert(key) {
            existing.push(row);
        }
    }

    let response_id: Vec<Option<&str>> = existing.iter().map(|r| r.response_id.as_deref()).collect();
    let agent_name: Vec<&str> = existing.iter().map(|r| r.agent_name.as_str()).collect();
    let seq_id: Vec<i64> = existing.iter().map(|r| r.seq_id).collect();
    let session_id: Vec<i64> = existing.iter().map(|r| r.session_id).collect();
    let metadata_json: Vec<&str> = existing.iter().map(|r| r.metadata_json.as_str()).collect();
    let tag: Vec<Option<&str>> = existing.iter().map(|r| r.tag.as_deref()).collect();

    write_parquet(
        path,
        MESSAGE_SCHEMA,
        vec![
            ColumnData::OptStr(response_id),
            ColumnData::Str(agent_name),
            ColumnData::I64(seq_id),
            ColumnData::I64(session_id),
            ColumnData::Str(metadata_json),
            ColumnData::OptStr(tag),
        ],
    )
}

/// Reads back whatever is currently archived so a flush merges instead
/// of clobbering earlier rounds. Missing file means nothing archived
/// yet, not an error.
fn read_rows<T: for<'de> Deserialize<'de>>(path: &Path) -> Result<Vec<T>> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let file = File::open(path)?;
    let reader = SerializedFileReader::new(file).map_err(|e| StoreError::ColdTier(e.to_string()))?;
    let mut out = Vec::new();
    let iter = reader
        .get_row_iter(None)
        .map_err(|e| StoreError::ColdTier(e.to_string()))?;
    for row in iter {
        let row = row.map_err(|e| StoreError::ColdTier(e.to_string()))?;
        let value = row.to_json_value();
        out.push(serde_json::from_value(value)?);
    }
    Ok(out)
}

enum ColumnData<'a> {
    Str(Vec<&'a str>),
    OptStr(Vec<Option<&'a str>>),
    I64(Vec<i64>),
}

fn write_parquet(path: &Path, schema_str: &str, columns: Vec<ColumnData>) -> Result<()> {
    let tmp_path = path.with_extension("parquet.tmp");
    {
        let schema = Arc::new(parse_message_type(schema_str).map_err(|e| StoreError::ColdTier(e.to_string()))?);
        let props = Arc::new(WriterProperties::builder().build());
        let file = File::create(&tmp_path)?;
        let mut writer =
            SerializedFileWriter::new(file, schema, props).map_err(|e| StoreError::ColdTier(e.to_string()))?;
        let mut row_group = writer
            .next_row_group()
            .map_err(|e| StoreError::ColdTier(e.to_string()))?;

        for column in &columns {
            let mut col_writer = row_group
                .next_column()
                .map_err(|e| StoreError::ColdTier(e.to_string()))?
                .ok_or_else(|| StoreError::ColdTier("schema/column count mismatch".into()))?;
            match (&mut col_writer, column) {
                (ColumnWriter::Int64ColumnWriter(w), ColumnData::I64(values)) => {
                    w.write_batch(values, None, None)
                        .map_err(|e| StoreError::ColdTier(e.to_string()))?;
                }
                (ColumnWriter::ByteArrayColumnWriter(w), ColumnData::Str(values)) => {
                    let data: Vec<ByteArray> = values.iter().map(|s| ByteArray::from(*s)).collect();
                    w.write_batch(&data, None, None)
                        .map_err(|e| StoreError::ColdTier(e.to_string()))?;
                }
                (ColumnWriter::ByteArrayColumnWriter(w), ColumnData::OptStr(values)) => {
                    let mut def_levels = Vec::with_capacity(values.len());
                    let mut data = Vec::new();
                    for v in values {
                        match v {
                            Some(s) => {
                                def_levels.push(1i16);
                                data.push(ByteArray::from(*s));
                            }
                            None => def_levels.push(0i16),
                        }
                    }
                    w.write_batch(&data, Some(&def_levels), None)
                        .map_err(|e| StoreError::ColdTier(e.to_string()))?;
                }
                _ => return Err(StoreError::ColdTier("column type mismatch in cold-tier schema".into())),
            }
            col_writer.close().map_err(|e| StoreError::ColdTier(e.to_string()))?;
        }

        row_group.close().map_err(|e| StoreError::ColdTier(e.to_string()))?;
        writer.close().map_err(|e| StoreError::ColdTier(e.to_string()))?;
    }

    let tmp_file = File::open(&tmp_path)?;
    tmp_file.sync_all()?;
    drop(tmp_file);
    std::fs::rename(&tmp_path, path)?;
    Ok(())
}
