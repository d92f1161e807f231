use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::Row;
use tracing::info;

use crate::traits::{Fact, MemoryStore, Message};

/// SQLite-backed conversation history and long-term facts.
pub struct SqliteMemoryStore {
    pool: SqlitePool,
    max_facts: usize,
}

impl SqliteMemoryStore {
    pub async fn new(db_path: &str, max_facts: usize) -> anyhow::Result<Self> {
        let opts = SqliteConnectOptions::new()
            .filename(db_path)
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(opts)
            .await?;
        let store = Self { pool, max_facts };
        store.migrate().await?;
        info!(db_path, "Memory store initialized");
        Ok(store)
    }

    /// In-memory database for tests. One connection, since every in-memory
    /// connection is its own database.
    #[cfg(test)]
    pub async fn in_memory() -> anyhow::Result<Self> {
        use std::str::FromStr;

        let opts = SqliteConnectOptions::from_str("sqlite::memory:")?;
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(opts)
            .await?;
        let store = Self {
            pool,
            max_facts: 50,
        };
        store.migrate().await?;
        Ok(store)
    }

    async fn migrate(&self) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS messages (
                id TEXT PRIMARY KEY,
                source TEXT NOT NULL,
                role TEXT NOT NULL,
                content TEXT NOT NULL,
                created_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS facts (
                category TEXT NOT NULL,
                key TEXT NOT NULL,
                value TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                PRIMARY KEY (category, key)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

fn parse_timestamp(raw: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(raw)
        .map(|d| d.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

#[async_trait]
impl MemoryStore for SqliteMemoryStore {
    async fn append(&self, msg: &Message) -> anyhow::Result<()> {
        sqlx::query(
            "INSERT OR REPLACE INTO messages (id, source, role, content, created_at) \
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&msg.id)
        .bind(&msg.source)
        .bind(&msg.role)
        .bind(&msg.content)
        .bind(msg.created_at.to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn recent_context(&self, limit: usize) -> anyhow::Result<Vec<Message>> {
        let rows = sqlx::query(
            "SELECT id, source, role, content, created_at FROM messages \
             ORDER BY created_at DESC, rowid DESC LIMIT ?",
        )
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        let mut messages: Vec<Message> = rows
            .iter()
            .map(|row| Message {
                id: row.get("id"),
                source: row.get("source"),
                role: row.get("role"),
                content: row.get("content"),
                created_at: parse_timestamp(&row.get::<String, _>("created_at")),
            })
            .collect();
        messages.reverse();
        Ok(messages)
    }

    async fn remember_fact(&self, category: &str, key: &str, value: &str) -> anyhow::Result<()> {
        sqlx::query(
            "INSERT INTO facts (category, key, value, updated_at) VALUES (?, ?, ?, ?) \
             ON CONFLICT(category, key) DO UPDATE SET \
                 value = excluded.value, updated_at = excluded.updated_at",
        )
        .bind(category)
        .bind(key)
        .bind(value)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn facts(&self) -> anyhow::Result<Vec<Fact>> {
        let rows = sqlx::query(
            "SELECT category, key, value, updated_at FROM facts \
             ORDER BY updated_at DESC LIMIT ?",
        )
        .bind(self.max_facts as i64)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(|row| Fact {
                category: row.get("category"),
                key: row.get("key"),
                value: row.get("value"),
                updated_at: parse_timestamp(&row.get::<String, _>("updated_at")),
            })
            .collect())
    }
}
