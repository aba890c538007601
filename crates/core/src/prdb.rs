use crate::error::{PrdbError, Result};
use crate::fingerprint::Fingerprint;
use crate::matcher::hamming_distance;
use crate::models::{now_ts, FingerprintId, Record, Stats};
use crate::store::Store;
use async_trait::async_trait;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use tracing::debug;

const COLUMNS: &str = "song_id, fp_hash, algorithm, fingerprint, basename, dirname, created_at, \
     updated_at, rating, lastplayed, laststarted, playcount, skipcount, playlists";

/// A ratings DB in one SQLite file.
#[derive(Clone)]
pub struct SqlitePrdb {
    pool: SqlitePool,
}

impl SqlitePrdb {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Connects to `url` (file path or `sqlite:` URL) and migrates the schema.
    pub async fn open(url: &str) -> anyhow::Result<Self> {
        let pool = storage::connect(url).await?;
        storage::migrate(&pool).await?;
        Ok(Self::new(pool))
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

fn record_from_row(row: &SqliteRow) -> Result<Record> {
    let hash: i64 = row.try_get("fp_hash")?;
    let algorithm: i64 = row.try_get("algorithm")?;
    let blob: Vec<u8> = row.try_get("fingerprint")?;
    let fingerprint = Fingerprint::from_blob(algorithm as u8, &blob, Some(hash as u32))?;
    Ok(Record {
        fingerprint_id: row.try_get("song_id")?,
        fingerprint,
        basename: row.try_get("basename")?,
        dirname: row.try_get("dirname")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
        stats: Stats {
            last_played: row.try_get("lastplayed")?,
            last_started: row.try_get("laststarted")?,
            play_count: row.try_get("playcount")?,
            rating: row.try_get("rating")?,
            skip_count: row.try_get("skipcount")?,
            playlists: row.try_get("playlists")?,
        },
    })
}

#[async_trait]
impl Store for SqlitePrdb {
    async fn find_by_exact_key(&self, id: FingerprintId) -> Result<Option<Record>> {
        let row = sqlx::query(&format!("SELECT {COLUMNS} FROM songs WHERE song_id = ?1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(record_from_row).transpose()
    }

    async fn find_candidates_by_hash(
        &self,
        summary_hash: u32,
        max_distance: u32,
    ) -> Result<Vec<Record>> {
        // SQLite has no popcount; exact hits use the index, the rest a scan.
        let rows = if max_distance == 0 {
            sqlx::query(&format!("SELECT {COLUMNS} FROM songs WHERE fp_hash = ?1"))
                .bind(summary_hash as i64)
                .fetch_all(&self.pool)
                .await?
        } else {
            sqlx::query(&format!("SELECT {COLUMNS} FROM songs"))
                .fetch_all(&self.pool)
                .await?
        };
        let mut out = Vec::new();
        for row in &rows {
            let hash: i64 = row.try_get("fp_hash")?;
            if hamming_distance(hash as u32, summary_hash) <= max_distance {
                out.push(record_from_row(row)?);
            }
        }
        Ok(out)
    }

    async fn insert(&self, record: &Record) -> Result<FingerprintId> {
        let fp = &record.fingerprint;
        let res = sqlx::query(
            r#"
            INSERT INTO songs (fp_hash, algorithm, fingerprint, basename, dirname, created_at,
                               updated_at, rating, lastplayed, laststarted, playcount, skipcount,
                               playlists)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)
            "#,
        )
        .bind(fp.summary_hash() as i64)
        .bind(fp.raw().algorithm() as i64)
        .bind(fp.to_blob())
        .bind(&record.basename)
        .bind(&record.dirname)
        .bind(record.created_at)
        .bind(record.updated_at)
        .bind(record.stats.rating)
        .bind(record.stats.last_played)
        .bind(record.stats.last_started)
        .bind(record.stats.play_count)
        .bind(record.stats.skip_count)
        .bind(&record.stats.playlists)
        .execute(&self.pool)
        .await?;
        let id = res.last_insert_rowid();
        debug!(fingerprint_id = id, basename = %record.basename, "inserted record");
        Ok(id)
    }

    async fn update_if_different(
        &self,
        id: FingerprintId,
        basename: &str,
        stats: &Stats,
    ) -> Result<bool> {
        let res = sqlx::query(
            r#"
            UPDATE songs
            SET basename = ?2, rating = ?3, lastplayed = ?4, laststarted = ?5,
                playcount = ?6, skipcount = ?7, playlists = ?8, updated_at = ?9
            WHERE song_id = ?1
              AND (basename IS NOT ?2 OR rating IS NOT ?3 OR lastplayed IS NOT ?4
                   OR laststarted IS NOT ?5 OR playcount IS NOT ?6 OR skipcount IS NOT ?7
                   OR playlists IS NOT ?8 OR updated_at IS NULL)
            "#,
        )
        .bind(id)
        .bind(basename)
        .bind(stats.rating)
        .bind(stats.last_played)
        .bind(stats.last_started)
        .bind(stats.play_count)
        .bind(stats.skip_count)
        .bind(&stats.playlists)
        .bind(now_ts())
        .execute(&self.pool)
        .await?;
        let updated = res.rows_affected() > 0;
        if updated {
            debug!(fingerprint_id = id, "updated stats");
        }
        Ok(updated)
    }

    async fn force_update(&self, record: &Record) -> Result<()> {
        let res = sqlx::query(
            r#"
            UPDATE songs
            SET basename = ?2, dirname = ?3, created_at = ?4, updated_at = ?5, rating = ?6,
                lastplayed = ?7, laststarted = ?8, playcount = ?9, skipcount = ?10,
                playlists = ?11
            WHERE song_id = ?1
            "#,
        )
        .bind(record.fingerprint_id)
        .bind(&record.basename)
        .bind(&record.dirname)
        .bind(record.created_at)
        .bind(record.updated_at)
        .bind(record.stats.rating)
        .bind(record.stats.last_played)
        .bind(record.stats.last_started)
        .bind(record.stats.play_count)
        .bind(record.stats.skip_count)
        .bind(&record.stats.playlists)
        .execute(&self.pool)
        .await?;
        if res.rows_affected() == 0 {
            return Err(PrdbError::Store(format!(
                "no record with id {}",
                record.fingerprint_id
            )));
        }
        debug!(fingerprint_id = record.fingerprint_id, "overwrote record");
        Ok(())
    }

    async fn list_all(&self) -> Result<Vec<Record>> {
        let rows = sqlx::query(&format!("SELECT {COLUMNS} FROM songs ORDER BY song_id"))
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(record_from_row).collect()
    }
}
