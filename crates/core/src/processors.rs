//! Song events and bulk operations expressed as executor processors.
//!
//! `Outcome::Succeeded` means the song value was changed and the caller has
//! to pass it back to the host library.

use crate::error::{PrdbError, Result};
use crate::executor::{Outcome, Processor};
use crate::fingerprint::Fingerprint;
use crate::matcher::MatchParams;
use crate::models::{now_ts, Record, Song};
use crate::store::Store;
use async_trait::async_trait;
use producers::FingerprintProducer;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// What every processor needs: a way to fingerprint files and a store.
#[derive(Clone)]
pub struct SongContext {
    pub producer: Arc<dyn FingerprintProducer>,
    pub store: Arc<dyn Store>,
    pub params: MatchParams,
}

impl SongContext {
    pub fn new(
        producer: Arc<dyn FingerprintProducer>,
        store: Arc<dyn Store>,
        params: MatchParams,
    ) -> Self {
        Self {
            producer,
            store,
            params,
        }
    }

    pub async fn fingerprint(&self, song: &Song, cancel: &CancellationToken) -> Result<Fingerprint> {
        let encoded = self.producer.compute(&song.path, cancel).await?;
        Fingerprint::from_base64(&encoded)
    }

    /// Links `song` to a stored record, inserting one when nothing matches.
    /// A new record carries the song's stats only when `keep_rating` is set
    /// and the song has a rating.
    async fn link(
        &self,
        song: &mut Song,
        keep_rating: bool,
        cancel: &CancellationToken,
    ) -> Result<Option<Record>> {
        let fp = self.fingerprint(song, cancel).await?;
        if let Some(record) = self.store.find_matching(&fp, &self.params).await? {
            song.fingerprint_id = Some(record.fingerprint_id);
            return Ok(Some(record));
        }
        let now = now_ts();
        let mut record = Record::empty(fp, &song.basename(), &song.dirname(), now);
        if keep_rating && song.rating.is_some() {
            record.stats = song.stats();
            record.updated_at = Some(now);
        }
        let id = self.store.insert(&record).await?;
        song.fingerprint_id = Some(id);
        Ok(None)
    }
}

/// Assigns fingerprint ids to newly added songs and restores known ratings.
pub struct AddedProcessor(pub SongContext);

#[async_trait]
impl Processor<Song> for AddedProcessor {
    async fn process(&self, song: &mut Song, cancel: &CancellationToken) -> Result<Outcome> {
        if let Some(record) = self.0.link(song, false, cancel).await? {
            if record.has_stats() {
                song.rating = Some(record.stats.rating);
            }
        }
        Ok(Outcome::Succeeded)
    }
}

/// Writes changed stats back into the store.
pub struct ChangedProcessor(pub SongContext);

#[async_trait]
impl Processor<Song> for ChangedProcessor {
    async fn process(&self, song: &mut Song, cancel: &CancellationToken) -> Result<Outcome> {
        let Some(id) = song.fingerprint_id else {
            if let Some(record) = self.0.link(song, true, cancel).await? {
                if record.has_stats() {
                    song.rating = Some(record.stats.rating);
                }
            }
            return Ok(Outcome::Skipped);
        };
        if song.rating.is_none() {
            return Ok(Outcome::Skipped);
        }
        let updated = self
            .0
            .store
            .update_if_different(id, &song.basename(), &song.stats())
            .await?;
        Ok(if updated {
            Outcome::Succeeded
        } else {
            Outcome::Skipped
        })
    }
}

/// Copies rated songs into the store.
///
/// An existing record is overwritten when the song was played or started
/// more recently, or, with `force`, whenever the stats differ.
pub struct ExportProcessor {
    pub ctx: SongContext,
    pub force: bool,
}

#[async_trait]
impl Processor<Song> for ExportProcessor {
    async fn process(&self, song: &mut Song, cancel: &CancellationToken) -> Result<Outcome> {
        if song.rating.is_none() {
            return Ok(Outcome::Skipped);
        }
        let known = match song.fingerprint_id {
            Some(id) => self.ctx.store.find_by_exact_key(id).await?,
            None => None,
        };
        let record = match known {
            Some(record) => record,
            None => match self.ctx.link(song, true, cancel).await? {
                Some(record) => record,
                None => return Ok(Outcome::Succeeded),
            },
        };

        let stats = song.stats();
        if stats == record.stats {
            return Ok(Outcome::Skipped);
        }
        let newer = song.last_played > record.stats.last_played
            || song.last_started > record.stats.last_started;
        if !self.force && !newer {
            return Ok(Outcome::Skipped);
        }
        info!(fingerprint_id = record.fingerprint_id, path = %song.path.display(), "exporting stats");
        let updated = Record {
            basename: song.basename(),
            dirname: song.dirname(),
            updated_at: Some(now_ts()),
            stats,
            ..record
        };
        self.ctx.store.force_update(&updated).await?;
        Ok(Outcome::Succeeded)
    }
}

/// Restores stored ratings onto songs that already have an id.
pub struct ImportProcessor(pub SongContext);

#[async_trait]
impl Processor<Song> for ImportProcessor {
    async fn process(&self, song: &mut Song, _cancel: &CancellationToken) -> Result<Outcome> {
        let Some(id) = song.fingerprint_id else {
            return Err(PrdbError::FingerprintUnavailable(format!(
                "{} has no fingerprint id",
                song.path.display()
            )));
        };
        let Some(record) = self.0.store.find_by_exact_key(id).await? else {
            return Err(PrdbError::Store(format!("no record with id {id}")));
        };
        if !record.has_stats() || song.rating == Some(record.stats.rating) {
            return Ok(Outcome::Skipped);
        }
        debug!(fingerprint_id = id, rating = record.stats.rating, "importing rating");
        song.rating = Some(record.stats.rating);
        Ok(Outcome::Succeeded)
    }
}

/// Fingerprints songs and assigns ids, nothing else.
pub struct FingerprintProcessor(pub SongContext);

#[async_trait]
impl Processor<Song> for FingerprintProcessor {
    async fn process(&self, song: &mut Song, cancel: &CancellationToken) -> Result<Outcome> {
        let before = song.fingerprint_id;
        self.0.link(song, false, cancel).await?;
        Ok(if song.fingerprint_id == before {
            Outcome::Skipped
        } else {
            Outcome::Succeeded
        })
    }
}
