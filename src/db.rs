use std::str::FromStr;

use sqlx::{
    pool::PoolConnection,
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
    ConnectOptions, Sqlite, SqliteConnection, SqlitePool,
};
use tracing::{info, warn};

use crate::domain::FeedId;

// Creation order; dropped in reverse.
const TABLES: [&str; 3] = ["feed", "url_to_content", "source"];

const SCHEMA: [&str; 5] = [
    r#"
    CREATE TABLE IF NOT EXISTS feed (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        name TEXT NOT NULL,
        created TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS url_to_content (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        url TEXT NOT NULL UNIQUE,
        last_updated TEXT,
        content BLOB
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS source (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        name TEXT NOT NULL,
        url TEXT NOT NULL UNIQUE,
        update_frequency INTEGER NOT NULL
            CHECK (update_frequency BETWEEN 60 AND 111600),
        feed_id INTEGER NOT NULL REFERENCES feed(id) ON DELETE CASCADE
    )
    "#,
    r#"
    CREATE INDEX IF NOT EXISTS idx_source_feed_id ON source(feed_id)
    "#,
    // A url stays registered exactly as long as a source uses it.
    r#"
    CREATE TRIGGER IF NOT EXISTS trg_source_release_url
    AFTER DELETE ON source
    BEGIN
        DELETE FROM url_to_content WHERE url = OLD.url;
    END
    "#,
];

pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Open a pool against `database_url`.
    ///
    /// Every connection has foreign key enforcement switched on, otherwise the
    /// feed -> source cascade would silently do nothing. In-memory databases get
    /// a single connection that is never recycled, since the data lives and dies
    /// with it.
    pub async fn new(database_url: &str, trace_queries: bool) -> anyhow::Result<Self> {
        let mut options = SqliteConnectOptions::from_str(database_url)?.foreign_keys(true);
        if !trace_queries {
            options = options.disable_statement_logging();
        }

        let pool = if is_in_memory(database_url) {
            SqlitePoolOptions::new()
                .max_connections(1)
                .min_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
                .connect_with(options)
                .await?
        } else {
            SqlitePoolOptions::new()
                .max_connections(5)
                .connect_with(options)
                .await?
        };

        Ok(Self { pool })
    }

    /// Create any missing tables. Safe to call on every startup.
    pub async fn initialize(&self) -> anyhow::Result<()> {
        for statement in SCHEMA {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        Ok(())
    }

    /// Drop everything and recreate the schema from scratch.
    pub async fn reset(&self) -> anyhow::Result<()> {
        warn!("Dropping all tables");
        for table in TABLES.iter().rev() {
            sqlx::query(&format!("DROP TABLE IF EXISTS {}", table))
                .execute(&self.pool)
                .await?;
        }
        self.initialize().await?;
        info!("Database schema recreated");
        Ok(())
    }

    /// Check out one connection for the duration of a single operation.
    pub async fn acquire(&self) -> sqlx::Result<PoolConnection<Sqlite>> {
        self.pool.acquire().await
    }
}

fn is_in_memory(database_url: &str) -> bool {
    database_url.contains(":memory:") || database_url.contains("mode=memory")
}

/// Delete a feed together with all of its sources.
///
/// Returns `false` when no feed had that id.
pub async fn delete_feed(conn: &mut SqliteConnection, feed_id: FeedId) -> sqlx::Result<bool> {
    let result = sqlx::query("DELETE FROM feed WHERE id = ?")
        .bind(feed_id)
        .execute(&mut *conn)
        .await?;

    let deleted = result.rows_affected() > 0;
    if deleted {
        info!("Deleted feed {}", feed_id);
    }
    Ok(deleted)
}
