//! Storage layer: SQLite pool setup, schema migrations and error classification.
//!
//! Both the local and the external ratings DB are plain SQLite files opened
//! through [`connect`] and brought to the current schema with [`migrate`].

use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;

const SQLITE_BUSY: i32 = 5;
const SQLITE_LOCKED: i32 = 6;

/// Opens a pool for a `sqlite:` URL or a bare file path.
///
/// Bare paths are created (together with their parent directory) when missing.
pub async fn connect(database_url: &str) -> anyhow::Result<SqlitePool> {
    let mut url = database_url.to_string();
    if !database_url.starts_with("sqlite:") {
        let path = std::path::PathBuf::from(database_url);
        if let Some(parent) = path.parent() {
            let _ = std::fs::create_dir_all(parent);
        }
        let norm = path.to_string_lossy().replace('\\', "/");
        if path.is_absolute() {
            url = format!("sqlite:///{}?mode=rwc", norm.trim_start_matches('/'));
        } else {
            url = format!("sqlite://{}?mode=rwc", norm);
        }
    }
    let mut opts = SqlitePoolOptions::new();
    if url.contains("memory") {
        opts = opts.max_connections(1);
    } else {
        opts = opts.max_connections(5);
    }
    let pool = opts.connect(&url).await?;
    tracing::debug!(url = %url, "opened ratings db");
    Ok(pool)
}

pub async fn migrate(pool: &SqlitePool) -> anyhow::Result<()> {
    // Applies SQLx migrations located in crates/storage/migrations.
    // Safe to run multiple times (idempotent).
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

/// True when the error means another writer holds the database.
///
/// SQLite reports extended result codes; the primary code lives in the low byte.
pub fn is_locked(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db) => db
            .code()
            .and_then(|code| code.parse::<i32>().ok())
            .map(|code| matches!(code & 0xff, SQLITE_BUSY | SQLITE_LOCKED))
            .unwrap_or(false),
        sqlx::Error::PoolTimedOut => true,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn connect_creates_missing_file_and_migrates() {
        let temp = tempfile::tempdir().unwrap();
        let db_path = temp.path().join("nested").join("personal.db");

        let pool = connect(&db_path.to_string_lossy()).await.unwrap();
        migrate(&pool).await.unwrap();
        migrate(&pool).await.unwrap();

        assert!(db_path.exists());
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM songs")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(count, 0);
    }

    #[test]
    fn other_errors_are_not_locks() {
        assert!(!is_locked(&sqlx::Error::RowNotFound));
        assert!(is_locked(&sqlx::Error::PoolTimedOut));
    }
}
