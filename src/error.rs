use sqlx::error::ErrorKind;
use thiserror::Error;

/// Errors surfaced by the domain layer.
///
/// `Validation`, `NotFound` and `Conflict` describe something the caller can
/// act on. `Store` is everything else and should be treated as a bug.
#[derive(Debug, Error)]
pub enum Error {
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    #[error("store error: {0}")]
    Store(#[from] sqlx::Error),
}

impl Error {
    /// True for the three kinds a user can be shown and re-prompted for.
    pub fn is_domain(&self) -> bool {
        !matches!(self, Error::Store(_))
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// A constraint violation reported by the store, stripped of driver details.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rejection {
    /// Unique constraint on the given target, e.g. `url_to_content.url`.
    Unique(String),
    ForeignKey,
    NotNull,
    Check,
    Other,
}

const UNIQUE_PREFIX: &str = "UNIQUE constraint failed: ";

// SQLITE_CONSTRAINT primary result code
const SQLITE_CONSTRAINT: i32 = 19;

/// Inspect a store error and describe which constraint rejected the write.
///
/// Returns `None` when the error is not an integrity violation at all
/// (I/O, pool timeouts, syntax errors and so on).
pub fn rejection(err: &sqlx::Error) -> Option<Rejection> {
    let sqlx::Error::Database(db_err) = err else {
        return None;
    };

    match db_err.kind() {
        ErrorKind::UniqueViolation => {
            let message = db_err.message();
            let target = message.strip_prefix(UNIQUE_PREFIX).unwrap_or(message);
            Some(Rejection::Unique(target.to_string()))
        }
        ErrorKind::ForeignKeyViolation => Some(Rejection::ForeignKey),
        ErrorKind::NotNullViolation => Some(Rejection::NotNull),
        ErrorKind::CheckViolation => Some(Rejection::Check),
        _ => {
            let code = db_err
                .code()
                .and_then(|code| code.parse::<i32>().ok())
                .unwrap_or_default();
            (code & 0xff == SQLITE_CONSTRAINT).then_some(Rejection::Other)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;

    async fn create_test_db() -> Database {
        let db = Database::new("sqlite::memory:", false).await.unwrap();
        db.initialize().await.unwrap();
        db
    }

    #[test]
    fn test_domain_kinds() {
        assert!(Error::Validation("bad".into()).is_domain());
        assert!(Error::NotFound("gone".into()).is_domain());
        assert!(Error::Conflict("taken".into()).is_domain());
        assert!(!Error::Store(sqlx::Error::RowNotFound).is_domain());
    }

    #[test]
    fn test_domain_messages_are_shown_verbatim() {
        let err = Error::Conflict("URL already in use".into());
        assert_eq!(err.to_string(), "URL already in use");
    }

    #[test]
    fn test_non_database_error_is_not_a_rejection() {
        assert_eq!(rejection(&sqlx::Error::RowNotFound), None);
        assert_eq!(rejection(&sqlx::Error::PoolTimedOut), None);
    }

    #[tokio::test]
    async fn test_unique_violation_names_its_target() {
        let db = create_test_db().await;
        let mut conn = db.acquire().await.unwrap();

        let insert = "INSERT INTO url_to_content (url) VALUES ('https://a.example/rss')";
        sqlx::query(insert).execute(&mut *conn).await.unwrap();
        let err = sqlx::query(insert).execute(&mut *conn).await.unwrap_err();

        assert_eq!(
            rejection(&err),
            Some(Rejection::Unique("url_to_content.url".to_string()))
        );
    }

    #[tokio::test]
    async fn test_foreign_key_violation() {
        let db = create_test_db().await;
        let mut conn = db.acquire().await.unwrap();

        let err = sqlx::query(
            "INSERT INTO source (name, url, update_frequency, feed_id) VALUES ('x', 'u', 60, 42)",
        )
        .execute(&mut *conn)
        .await
        .unwrap_err();

        assert_eq!(rejection(&err), Some(Rejection::ForeignKey));
    }

    #[tokio::test]
    async fn test_check_violation() {
        let db = create_test_db().await;
        let mut conn = db.acquire().await.unwrap();

        sqlx::query("INSERT INTO feed (name, created) VALUES ('f', '2024-01-01T00:00:00Z')")
            .execute(&mut *conn)
            .await
            .unwrap();
        let err = sqlx::query(
            "INSERT INTO source (name, url, update_frequency, feed_id) VALUES ('x', 'u', 5, 1)",
        )
        .execute(&mut *conn)
        .await
        .unwrap_err();

        assert_eq!(rejection(&err), Some(Rejection::Check));
    }

    #[tokio::test]
    async fn test_syntax_error_is_not_a_rejection() {
        let db = create_test_db().await;
        let mut conn = db.acquire().await.unwrap();

        let err = sqlx::query("SELEKT 1").execute(&mut *conn).await.unwrap_err();
        assert_eq!(rejection(&err), None);
    }
}
