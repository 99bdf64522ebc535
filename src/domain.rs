//! Business rules for feeds and sources.
//!
//! Every operation works on a connection owned by the caller. Some of the
//! rules live in the schema (unique urls, the feed -> source cascade); this
//! module turns the store's verdict into an [`Error`] the caller can show.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{Connection, FromRow, SqliteConnection};
use tracing::{debug, info, warn};

use crate::error::{rejection, Error, Rejection, Result};

/// Shortest allowed poll interval: one minute.
pub const MIN_UPDATE_FREQUENCY: i64 = 60;
/// Longest allowed poll interval: 31 hours.
pub const MAX_UPDATE_FREQUENCY: i64 = 60 * 60 * 31;

const REGISTRY_URL_TARGET: &str = "url_to_content.url";

/// Primary key of the `feed` table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[derive(sqlx::Type)]
#[serde(transparent)]
#[sqlx(transparent)]
pub struct FeedId(i64);

/// Primary key of the `source` table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[derive(sqlx::Type)]
#[serde(transparent)]
#[sqlx(transparent)]
pub struct SourceId(i64);

macro_rules! id_conversions {
    ($($id:ident),*) => {$(
        impl From<i64> for $id {
            fn from(raw: i64) -> Self {
                Self(raw)
            }
        }

        impl $id {
            pub fn get(self) -> i64 {
                self.0
            }
        }

        impl fmt::Display for $id {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                self.0.fmt(f)
            }
        }
    )*};
}

id_conversions!(FeedId, SourceId);

/// A feed row without its sources.
#[derive(Debug, Clone, PartialEq, FromRow)]
pub struct FeedSummary {
    pub id: FeedId,
    pub name: String,
    pub created: DateTime<Utc>,
}

/// A feed together with every source attached to it.
#[derive(Debug, Clone, PartialEq)]
pub struct Feed {
    pub id: FeedId,
    pub name: String,
    pub created: DateTime<Utc>,
    pub sources: Vec<Source>,
}

#[derive(Debug, Clone, PartialEq, FromRow)]
pub struct Source {
    pub id: SourceId,
    pub name: String,
    pub url: String,
    /// Seconds between polls.
    pub update_frequency: i64,
    pub feed_id: FeedId,
}

/// Input for [`create_source`].
#[derive(Debug, Clone)]
pub struct NewSource {
    pub name: String,
    pub url: String,
    pub update_frequency: i64,
    pub feed_id: FeedId,
}

pub async fn create_feed(conn: &mut SqliteConnection, name: &str) -> Result<FeedSummary> {
    if name.trim().is_empty() {
        return Err(Error::Validation(
            "The 'name' field must be a non-empty string".to_string(),
        ));
    }

    let feed = sqlx::query_as::<_, FeedSummary>(
        r#"
        INSERT INTO feed (name, created)
        VALUES (?, strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
        RETURNING id, name, created
        "#,
    )
    .bind(name)
    .fetch_one(&mut *conn)
    .await
    .map_err(|err| match rejection(&err) {
        Some(_) => {
            warn!("Feed insert rejected by store: {}", err);
            Error::Conflict("Invalid operation".to_string())
        }
        None => Error::Store(err),
    })?;

    info!("Created feed {} ({})", feed.id, feed.name);
    Ok(feed)
}

pub async fn get_feed_by_id(conn: &mut SqliteConnection, feed_id: FeedId) -> Result<Feed> {
    debug!("Loading feed {}", feed_id);

    let feed = sqlx::query_as::<_, FeedSummary>("SELECT id, name, created FROM feed WHERE id = ?")
        .bind(feed_id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| Error::NotFound(format!("No feed with id {} exists", feed_id)))?;

    let sources = sqlx::query_as::<_, Source>(
        r#"
        SELECT id, name, url, update_frequency, feed_id
        FROM source
        WHERE feed_id = ?
        ORDER BY id
        "#,
    )
    .bind(feed_id)
    .fetch_all(&mut *conn)
    .await?;

    Ok(Feed {
        id: feed.id,
        name: feed.name,
        created: feed.created,
        sources,
    })
}

/// All feeds, oldest first. Sources are not loaded.
pub async fn get_feeds(conn: &mut SqliteConnection) -> Result<Vec<FeedSummary>> {
    let feeds = sqlx::query_as::<_, FeedSummary>("SELECT id, name, created FROM feed ORDER BY id")
        .fetch_all(&mut *conn)
        .await?;
    Ok(feeds)
}

/// Attach a new source to an existing feed.
///
/// The url is reserved in `url_to_content` and the source row is written in
/// the same transaction, so a taken url never leaves a half-created source.
/// A missing feed surfaces as [`Error::Store`]: the caller handed us an id
/// that does not exist.
pub async fn create_source(conn: &mut SqliteConnection, new: NewSource) -> Result<Source> {
    if !(MIN_UPDATE_FREQUENCY..=MAX_UPDATE_FREQUENCY).contains(&new.update_frequency) {
        return Err(Error::Validation(format!(
            "Update frequency of {} is out of range. It should be between {} (1 minute) and {} (31 hours)",
            new.update_frequency, MIN_UPDATE_FREQUENCY, MAX_UPDATE_FREQUENCY
        )));
    }

    let mut tx = conn.begin().await?;
    let source = match insert_source(&mut tx, &new).await {
        Ok(source) => source,
        Err(err) => {
            return Err(match rejection(&err) {
                Some(Rejection::Unique(target)) if target == REGISTRY_URL_TARGET => {
                    warn!("Source url {} is already registered", new.url);
                    Error::Conflict("URL already in use as source for this feed".to_string())
                }
                _ => Error::Store(err),
            });
        }
    };
    tx.commit().await?;

    info!(
        "Created source {} ({}) for feed {}",
        source.id, source.url, source.feed_id
    );
    Ok(source)
}

async fn insert_source(conn: &mut SqliteConnection, new: &NewSource) -> sqlx::Result<Source> {
    sqlx::query("INSERT INTO url_to_content (url, last_updated, content) VALUES (?, NULL, NULL)")
        .bind(&new.url)
        .execute(&mut *conn)
        .await?;

    sqlx::query_as::<_, Source>(
        r#"
        INSERT INTO source (name, url, update_frequency, feed_id)
        VALUES (?, ?, ?, ?)
        RETURNING id, name, url, update_frequency, feed_id
        "#,
    )
    .bind(&new.name)
    .bind(&new.url)
    .bind(new.update_frequency)
    .bind(new.feed_id)
    .fetch_one(&mut *conn)
    .await
}
