//! Walks library roots and collects the audio files found as songs.

use crate::models::Song;
use anyhow::Context;
use globset::{Glob, GlobSet, GlobSetBuilder};
use std::path::{Path, PathBuf};
use tokio::sync::mpsc;
use tokio::task;
use tracing::debug;
use walkdir::WalkDir;

pub async fn discover(
    roots: &[PathBuf],
    excludes: &[String],
    extensions: &[String],
) -> anyhow::Result<Vec<Song>> {
    let (tx, mut rx) = mpsc::channel(100);
    let exclude_set = build_globset(excludes)?;
    let extensions: Vec<String> = extensions.iter().map(|e| e.to_lowercase()).collect();
    let roots = roots.to_vec();

    let walker_handle = task::spawn_blocking(move || {
        for root in roots {
            for entry in WalkDir::new(&root)
                .follow_links(true)
                .into_iter()
                .filter_entry(|e| e.depth() == 0 || should_descend(e.path(), &exclude_set))
            {
                let entry = match entry {
                    Ok(e) => e,
                    Err(_) => continue,
                };
                let path = entry.path();
                if !entry.file_type().is_file() || !has_extension(path, &extensions) {
                    continue;
                }
                if tx.blocking_send(path.to_path_buf()).is_err() {
                    // Receiver dropped, stop walking.
                    return;
                }
            }
        }
    });

    let mut songs = Vec::new();
    while let Some(path) = rx.recv().await {
        songs.push(Song::new(path));
    }
    walker_handle.await.context("directory walker panicked")?;
    debug!(found = songs.len(), "discovery finished");
    Ok(songs)
}

fn build_globset(patterns: &[String]) -> anyhow::Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pat in patterns {
        let glob = Glob::new(pat).with_context(|| format!("invalid exclude pattern {pat}"))?;
        builder.add(glob);
    }
    Ok(builder.build()?)
}

fn should_descend(path: &Path, excludes: &GlobSet) -> bool {
    !excludes.is_match(path) && !is_hidden(path)
}

fn is_hidden(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .map(|s| s.starts_with('.'))
        .unwrap_or(false)
}

fn has_extension(path: &Path, extensions: &[String]) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| extensions.iter().any(|x| x.eq_ignore_ascii_case(e)))
        .unwrap_or(false)
}
