mod common;

use async_trait::async_trait;
use common::{open_db, record, track};
use prdb_core::executor::{run_all, ExecutorConfig, Outcome, Processor};
use prdb_core::models::{Record, Stats};
use prdb_core::prdb::SqlitePrdb;
use prdb_core::store::Store;
use prdb_core::{PrdbError, Result};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use std::time::Duration;
use tempfile::tempdir;
use tokio_util::sync::CancellationToken;

struct InsertRecord(SqlitePrdb);

#[async_trait]
impl Processor<Record> for InsertRecord {
    async fn process(&self, record: &mut Record, _cancel: &CancellationToken) -> Result<Outcome> {
        let id = self.0.insert(record).await?;
        record.fingerprint_id = id;
        Ok(Outcome::Succeeded)
    }
}

/// A second handle on the same file that gives up on a busy database quickly.
async fn impatient(path: &std::path::Path) -> SqlitePrdb {
    let options = SqliteConnectOptions::new()
        .filename(path)
        .busy_timeout(Duration::from_millis(50));
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(options)
        .await
        .unwrap();
    SqlitePrdb::new(pool)
}

#[tokio::test]
async fn busy_database_is_retried_until_released() {
    let temp = tempdir().unwrap();
    let owner = open_db(temp.path(), "busy.db").await;
    let store = impatient(&temp.path().join("busy.db")).await;

    let mut holder = owner.pool().acquire().await.unwrap();
    sqlx::query("BEGIN EXCLUSIVE")
        .execute(&mut *holder)
        .await
        .unwrap();

    let err = store
        .insert(&record(track(31), "held.mp3", Stats::default(), None))
        .await
        .unwrap_err();
    assert_eq!(err, PrdbError::StoreLocked);

    let config = ExecutorConfig {
        retry_delay_ms: 100,
        drain_delay_ms: 10,
        max_lock_retries: None,
    };
    let run = tokio::spawn(async move {
        let items = vec![record(track(32), "queued.mp3", Stats::default(), None)];
        run_all(InsertRecord(store), items, config, &CancellationToken::new()).await
    });

    tokio::time::sleep(Duration::from_millis(250)).await;
    sqlx::query("COMMIT").execute(&mut *holder).await.unwrap();
    drop(holder);

    let totals = tokio::time::timeout(Duration::from_secs(5), run)
        .await
        .unwrap()
        .unwrap();
    assert!(totals.failed.is_empty());
    assert!(totals.retries >= 1);
    assert_eq!(totals.succeeded.len(), 1);
    assert_eq!(owner.list_all().await.unwrap().len(), 1);
}
