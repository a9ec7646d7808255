use std::path::Path;
use std::time::Duration;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use serde_json::{Map, Value};
use sqlx::query::Query;
use sqlx::sqlite::{
    SqliteArguments, SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteRow,
    SqliteSynchronous,
};
use sqlx::{Column, Row, Sqlite, SqlitePool, TypeInfo, ValueRef};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Only SELECT queries are allowed")]
    ReadOnlyViolation,
    #[error("Invalid identifier: {0:?}")]
    InvalidIdentifier(String),
}

pub type Result<T> = std::result::Result<T, StorageError>;

static IDENTIFIER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("identifier pattern is valid"));

/// Table and column names are interpolated into SQL, so only plain identifiers pass.
fn checked_identifier(name: &str) -> Result<&str> {
    if IDENTIFIER.is_match(name) {
        Ok(name)
    } else {
        Err(StorageError::InvalidIdentifier(name.to_string()))
    }
}

/// One row of `PRAGMA table_info`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ColumnInfo {
    pub name: String,
    #[serde(rename = "type")]
    pub column_type: String,
    pub notnull: bool,
    pub dflt_value: Option<String>,
    pub pk: bool,
}

/// A stored documentation chunk with its embedding.
#[derive(Debug, Clone, PartialEq)]
pub struct VectorDocument {
    pub document_id: String,
    pub source_path: String,
    pub title: String,
    pub content: String,
    pub embedding: Vec<f32>,
}

/// SQLite storage backing the database and vector tools
#[derive(Clone)]
pub struct SqliteStorage {
    pool: SqlitePool,
}

impl SqliteStorage {
    /// Open (lazily) the database at `db_path`. No connection is made until first use.
    pub async fn new(db_path: &Path) -> Result<Self> {
        // Ensure parent directory exists
        if let Some(parent) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }

        let options = SqliteConnectOptions::new()
            .filename(db_path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .busy_timeout(Duration::from_secs(5));

        let pool = SqlitePoolOptions::new()
            .max_connections(8)
            .acquire_timeout(Duration::from_secs(5))
            .idle_timeout(Some(Duration::from_secs(300)))
            .connect_lazy_with(options);

        Ok(Self { pool })
    }

    /// Run migrations
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;

        tracing::info!("SQLite migrations completed");
        Ok(())
    }

    /// Quick connectivity check: runs SELECT 1.
    pub async fn health_check(&self) -> Result<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    // === Query Operations ===

    /// Run a read-only query with positional parameters; rows come back as JSON objects.
    pub async fn execute_select(&self, query: &str, params: &[Value]) -> Result<Vec<Value>> {
        if !query.trim_start().to_ascii_lowercase().starts_with("select") {
            return Err(StorageError::ReadOnlyViolation);
        }

        let mut q = sqlx::query(query);
        for param in params {
            q = bind_json(q, param);
        }

        // `query_only` also rejects statements chained after the SELECT.
        let mut conn = self.pool.acquire().await?;
        sqlx::query("PRAGMA query_only = ON").execute(&mut *conn).await?;
        let rows = q.fetch_all(&mut *conn).await;
        let reset = sqlx::query("PRAGMA query_only = OFF").execute(&mut *conn).await;
        if let Err(e) = reset {
            tracing::warn!("Discarding connection stuck in query_only mode: {}", e);
            drop(conn.detach());
        }

        Ok(rows?.iter().map(row_to_json).collect())
    }

    /// User tables, excluding SQLite and migration bookkeeping.
    pub async fn list_tables(&self) -> Result<Vec<String>> {
        let rows: Vec<(String,)> = sqlx::query_as(
            "SELECT name FROM sqlite_master
             WHERE type = 'table' AND name NOT LIKE 'sqlite_%' AND name != '_sqlx_migrations'
             ORDER BY name",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(|(name,)| name).collect())
    }

    /// Column layout of `table`. Unknown tables yield an empty list.
    pub async fn describe_table(&self, table: &str) -> Result<Vec<ColumnInfo>> {
        let table = checked_identifier(table)?;

        let rows: Vec<(i64, String, String, i64, Option<String>, i64)> =
            sqlx::query_as(&format!("PRAGMA table_info(\"{}\")", table))
                .fetch_all(&self.pool)
                .await?;

        Ok(rows
            .into_iter()
            .map(|(_cid, name, column_type, notnull, dflt_value, pk)| ColumnInfo {
                name,
                column_type,
                notnull: notnull != 0,
                dflt_value,
                pk: pk != 0,
            })
            .collect())
    }

    /// Insert one row and return its rowid.
    pub async fn insert_row(&self, table: &str, data: &Map<String, Value>) -> Result<i64> {
        let table = checked_identifier(table)?;

        let sql = if data.is_empty() {
            format!("INSERT INTO \"{}\" DEFAULT VALUES", table)
        } else {
            let columns = data
                .keys()
                .map(|k| checked_identifier(k).map(|c| format!("\"{}\"", c)))
                .collect::<Result<Vec<_>>>()?;
            let placeholders = vec!["?"; columns.len()].join(", ");
            format!(
                "INSERT INTO \"{}\" ({}) VALUES ({})",
                table,
                columns.join(", "),
                placeholders
            )
        };

        let mut q = sqlx::query(&sql);
        for value in data.values() {
            q = bind_json(q, value);
        }

        let result = q.execute(&self.pool).await?;
        Ok(result.last_insert_rowid())
    }

    // === Vector Document Operations ===

    /// Insert or replace a document keyed by `document_id`.
    pub async fn upsert_vector_document(&self, doc: &VectorDocument) -> Result<()> {
        sqlx::query(
            "INSERT INTO vector_documents (document_id, source_path, title, content, embedding)
             VALUES (?, ?, ?, ?, ?)
             ON CONFLICT(document_id) DO UPDATE SET
                source_path = excluded.source_path,
                title = excluded.title,
                content = excluded.content,
                embedding = excluded.embedding,
                updated_at = CURRENT_TIMESTAMP",
        )
        .bind(&doc.document_id)
        .bind(&doc.source_path)
        .bind(&doc.title)
        .bind(&doc.content)
        .bind(encode_embedding(&doc.embedding))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn all_vector_documents(&self) -> Result<Vec<VectorDocument>> {
        let rows: Vec<(String, String, String, String, Vec<u8>)> = sqlx::query_as(
            "SELECT document_id, source_path, title, content, embedding
             FROM vector_documents ORDER BY id",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(
                |(document_id, source_path, title, content, blob)| VectorDocument {
                    document_id,
                    source_path,
                    title,
                    content,
                    embedding: decode_embedding(&blob),
                },
            )
            .collect())
    }

    pub async fn count_vector_documents(&self) -> Result<i64> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM vector_documents")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }
}

fn bind_json<'q>(
    query: Query<'q, Sqlite, SqliteArguments<'q>>,
    value: &Value,
) -> Query<'q, Sqlite, SqliteArguments<'q>> {
    match value {
        Value::Null => query.bind(None::<String>),
        Value::Bool(b) => query.bind(*b),
        Value::Number(n) => match n.as_i64() {
            Some(i) => query.bind(i),
            None => query.bind(n.as_f64()),
        },
        Value::String(s) => query.bind(s.clone()),
        other => query.bind(other.to_string()),
    }
}

/// Decode by the runtime storage class of each value, not the declared column type.
fn row_to_json(row: &SqliteRow) -> Value {
    let mut object = Map::new();

    for (i, column) in row.columns().iter().enumerate() {
        let value = match row.try_get_raw(i) {
            Ok(raw) if raw.is_null() => Value::Null,
            Ok(raw) => {
                let class = raw.type_info().name().to_ascii_uppercase();
                match class.as_str() {
                    "INTEGER" | "BOOLEAN" => row
                        .try_get_unchecked::<i64, _>(i)
                        .map(Value::from)
                        .unwrap_or(Value::Null),
                    "REAL" => row
                        .try_get_unchecked::<f64, _>(i)
                        .map(Value::from)
                        .unwrap_or(Value::Null),
                    "BLOB" => row
                        .try_get_unchecked::<Vec<u8>, _>(i)
                        .map(|bytes| Value::String(hex(&bytes)))
                        .unwrap_or(Value::Null),
                    _ => row
                        .try_get_unchecked::<String, _>(i)
                        .map(Value::String)
                        .unwrap_or(Value::Null),
                }
            }
            Err(e) => {
                tracing::warn!("Failed to read column {}: {}", column.name(), e);
                Value::Null
            }
        };
        object.insert(column.name().to_string(), value);
    }

    Value::Object(object)
}

fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

fn encode_embedding(embedding: &[f32]) -> Vec<u8> {
    embedding.iter().flat_map(|f| f.to_le_bytes()).collect()
}

fn decode_embedding(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect()
}
