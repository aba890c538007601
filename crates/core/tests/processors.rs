mod common;

use common::{base64, open_db, record, reencoded, track};
use prdb_core::executor::{run_all, ExecutorConfig, Outcome, Processor};
use prdb_core::matcher::MatchParams;
use prdb_core::models::{Song, Stats};
use prdb_core::processors::{
    AddedProcessor, ChangedProcessor, ExportProcessor, FingerprintProcessor, ImportProcessor,
    SongContext,
};
use prdb_core::store::Store;
use prdb_core::PrdbError;
use producers::fixed::FixedProducer;
use std::sync::Arc;
use tempfile::tempdir;
use tokio_util::sync::CancellationToken;

async fn context(dir: &std::path::Path) -> (SongContext, Arc<dyn Store>) {
    let producer = FixedProducer::new()
        .with("/lib/a.mp3", base64(&track(11)))
        .with("/other/a-copy.flac", base64(&reencoded(11)))
        .with("/lib/b.mp3", base64(&track(12)));
    let store: Arc<dyn Store> = Arc::new(open_db(dir, "local.db").await);
    (
        SongContext::new(Arc::new(producer), store.clone(), MatchParams::default()),
        store,
    )
}

fn rated(path: &str, rating: i64) -> Song {
    Song {
        rating: Some(rating),
        last_played: 100,
        ..Song::new(path)
    }
}

#[tokio::test]
async fn added_songs_share_the_id_of_their_track() {
    let temp = tempdir().unwrap();
    let (ctx, store) = context(temp.path()).await;
    let cancel = CancellationToken::new();
    let added = AddedProcessor(ctx);

    let mut first = Song::new("/lib/a.mp3");
    assert_eq!(added.process(&mut first, &cancel).await.unwrap(), Outcome::Succeeded);
    let id = first.fingerprint_id.unwrap();
    assert_eq!(first.rating, None);

    let stored = store.find_by_exact_key(id).await.unwrap().unwrap();
    assert_eq!(stored.updated_at, None);
    assert_eq!(stored.basename, "a.mp3");
    assert_eq!(stored.dirname, "/lib");

    let mut copy = Song::new("/other/a-copy.flac");
    added.process(&mut copy, &cancel).await.unwrap();
    assert_eq!(copy.fingerprint_id, Some(id));
    assert_eq!(copy.rating, None);
    assert_eq!(store.list_all().await.unwrap().len(), 1);
}

#[tokio::test]
async fn added_song_picks_up_an_authoritative_rating() {
    let temp = tempdir().unwrap();
    let (ctx, store) = context(temp.path()).await;
    let stats = Stats {
        rating: 900,
        ..Stats::default()
    };
    store
        .insert(&record(track(11), "a.mp3", stats, Some(50)))
        .await
        .unwrap();

    let mut song = Song::new("/other/a-copy.flac");
    AddedProcessor(ctx)
        .process(&mut song, &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(song.rating, Some(900));
}

#[tokio::test]
async fn changed_song_updates_only_when_stats_differ() {
    let temp = tempdir().unwrap();
    let (ctx, store) = context(temp.path()).await;
    let cancel = CancellationToken::new();
    let changed = ChangedProcessor(ctx);

    let mut song = rated("/lib/b.mp3", 400);
    assert_eq!(changed.process(&mut song, &cancel).await.unwrap(), Outcome::Skipped);
    let id = song.fingerprint_id.unwrap();
    let stored = store.find_by_exact_key(id).await.unwrap().unwrap();
    assert_eq!(stored.stats.rating, 400);
    assert!(stored.has_stats());

    assert_eq!(changed.process(&mut song, &cancel).await.unwrap(), Outcome::Skipped);
    song.rating = Some(1000);
    assert_eq!(changed.process(&mut song, &cancel).await.unwrap(), Outcome::Succeeded);
    let stored = store.find_by_exact_key(id).await.unwrap().unwrap();
    assert_eq!(stored.stats.rating, 1000);
}

#[tokio::test]
async fn changed_song_without_id_takes_the_stored_rating() {
    let temp = tempdir().unwrap();
    let (ctx, store) = context(temp.path()).await;
    let stats = Stats {
        rating: 900,
        ..Stats::default()
    };
    let id = store
        .insert(&record(track(11), "a.mp3", stats, Some(50)))
        .await
        .unwrap();

    let mut copy = Song::new("/other/a-copy.flac");
    let outcome = ChangedProcessor(ctx)
        .process(&mut copy, &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(outcome, Outcome::Skipped);
    assert_eq!(copy.fingerprint_id, Some(id));
    assert_eq!(copy.rating, Some(900));
    assert_eq!(store.list_all().await.unwrap().len(), 1);
}

#[tokio::test]
async fn export_respects_recency_unless_forced() {
    let temp = tempdir().unwrap();
    let (ctx, store) = context(temp.path()).await;
    let cancel = CancellationToken::new();
    let existing = Stats {
        rating: 200,
        last_played: 500,
        ..Stats::default()
    };
    let id = store
        .insert(&record(track(11), "a.mp3", existing, Some(10)))
        .await
        .unwrap();

    let mut stale = rated("/lib/a.mp3", 800);
    let export = ExportProcessor {
        ctx: ctx.clone(),
        force: false,
    };
    assert_eq!(export.process(&mut stale, &cancel).await.unwrap(), Outcome::Skipped);
    assert_eq!(stale.fingerprint_id, Some(id));
    assert_eq!(
        store.find_by_exact_key(id).await.unwrap().unwrap().stats.rating,
        200
    );

    let forced = ExportProcessor { ctx, force: true };
    assert_eq!(forced.process(&mut stale, &cancel).await.unwrap(), Outcome::Succeeded);
    let stored = store.find_by_exact_key(id).await.unwrap().unwrap();
    assert_eq!(stored.stats.rating, 800);
    assert_eq!(stored.stats.last_played, 100);

    let mut unrated = Song::new("/lib/b.mp3");
    assert_eq!(forced.process(&mut unrated, &cancel).await.unwrap(), Outcome::Skipped);
}

#[tokio::test]
async fn import_copies_stored_ratings() {
    let temp = tempdir().unwrap();
    let (ctx, store) = context(temp.path()).await;
    let cancel = CancellationToken::new();
    let stats = Stats {
        rating: 700,
        ..Stats::default()
    };
    let rated_id = store
        .insert(&record(track(11), "a.mp3", stats, Some(10)))
        .await
        .unwrap();
    let empty_id = store
        .insert(&record(track(12), "b.mp3", Stats::default(), None))
        .await
        .unwrap();
    let import = ImportProcessor(ctx);

    let mut song = Song {
        fingerprint_id: Some(rated_id),
        ..Song::new("/lib/a.mp3")
    };
    assert_eq!(import.process(&mut song, &cancel).await.unwrap(), Outcome::Succeeded);
    assert_eq!(song.rating, Some(700));
    assert_eq!(import.process(&mut song, &cancel).await.unwrap(), Outcome::Skipped);

    let mut never_rated = Song {
        fingerprint_id: Some(empty_id),
        ..Song::new("/lib/b.mp3")
    };
    assert_eq!(
        import.process(&mut never_rated, &cancel).await.unwrap(),
        Outcome::Skipped
    );

    let mut unknown = Song::new("/lib/a.mp3");
    let err = import.process(&mut unknown, &cancel).await.unwrap_err();
    assert!(matches!(err, PrdbError::FingerprintUnavailable(_)));
}

#[tokio::test]
async fn one_bad_file_does_not_stop_the_rest() {
    let temp = tempdir().unwrap();
    let (ctx, _store) = context(temp.path()).await;
    let songs = vec![
        Song::new("/lib/a.mp3"),
        Song::new("/lib/missing.mp3"),
        Song::new("/lib/b.mp3"),
    ];
    let totals = run_all(
        FingerprintProcessor(ctx),
        songs,
        ExecutorConfig::default(),
        &CancellationToken::new(),
    )
    .await;

    assert_eq!(totals.succeeded.len(), 2);
    assert_eq!(totals.failed.len(), 1);
    assert_eq!(totals.failed[0].0.basename(), "missing.mp3");
    assert!(matches!(
        totals.failed[0].1,
        PrdbError::FingerprintUnavailable(_)
    ));
    assert!(totals.succeeded.iter().all(|s| s.fingerprint_id.is_some()));
}
