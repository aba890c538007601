//! Diff of two fingerprint-indexed record sets.
//!
//! Every left record is paired with at most one fuzzy-equal right record.
//! Pairs with diverging stats are resolved youngest-wins: the store holding
//! the older snapshot receives the younger stats.

use crate::error::{PrdbError, Result};
use crate::matcher::MatchParams;
use crate::models::Record;
use std::cmp::Ordering;
use tokio_util::sync::CancellationToken;
use tracing::debug;

#[derive(Debug, Clone, Default)]
pub struct ReconciliationPlan {
    pub add_to_left: Vec<Record>,
    pub add_to_right: Vec<Record>,
    pub update_left: Vec<Record>,
    pub update_right: Vec<Record>,
}

impl ReconciliationPlan {
    pub fn len(&self) -> usize {
        self.add_to_left.len()
            + self.add_to_right.len()
            + self.update_left.len()
            + self.update_right.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Orders two records by recency of listening activity.
///
/// The first decisive field wins: `last_played`, `last_started`,
/// `skip_count`, `play_count`, `updated_at` (absent sorts first), `created_at`.
pub fn compare_age(x: &Record, y: &Record) -> Ordering {
    x.stats
        .last_played
        .cmp(&y.stats.last_played)
        .then(x.stats.last_started.cmp(&y.stats.last_started))
        .then(x.stats.skip_count.cmp(&y.stats.skip_count))
        .then(x.stats.play_count.cmp(&y.stats.play_count))
        .then(x.updated_at.cmp(&y.updated_at))
        .then(x.created_at.cmp(&y.created_at))
}

pub fn is_younger(x: &Record, y: &Record) -> bool {
    compare_age(x, y) == Ordering::Greater
}

/// `older` keeping its own identity, carrying `younger`'s stats.
pub fn adopt_stats(older: &Record, younger: &Record) -> Record {
    Record {
        stats: younger.stats.clone(),
        updated_at: younger.updated_at,
        ..older.clone()
    }
}

fn in_window(record: &Record, min_timestamp: Option<i64>) -> bool {
    min_timestamp.map_or(true, |min| record.last_activity() >= min)
}

/// Computes the add/update plan bringing `left` and `right` in line.
///
/// Records whose last activity predates `min_timestamp` are left out on both
/// sides. On a full tie with differing stats the left record is authoritative.
pub fn diff(
    left: Vec<Record>,
    right: Vec<Record>,
    min_timestamp: Option<i64>,
    params: &MatchParams,
    cancel: &CancellationToken,
) -> Result<ReconciliationPlan> {
    let mut remaining: Vec<Option<Record>> = right
        .into_iter()
        .filter(|r| in_window(r, min_timestamp))
        .map(Some)
        .collect();
    let mut plan = ReconciliationPlan::default();

    for l in left.into_iter().filter(|l| in_window(l, min_timestamp)) {
        if cancel.is_cancelled() {
            return Err(PrdbError::Cancelled);
        }
        let found = remaining.iter_mut().find(|slot| {
            slot.as_ref()
                .map_or(false, |r| l.fingerprint.matches(&r.fingerprint, params))
        });
        let Some(r) = found.and_then(Option::take) else {
            plan.add_to_right.push(l);
            continue;
        };
        if l.stats == r.stats {
            continue;
        }
        if is_younger(&r, &l) {
            debug!(left = l.fingerprint_id, right = r.fingerprint_id, "right is younger");
            plan.update_left.push(adopt_stats(&l, &r));
        } else {
            debug!(left = l.fingerprint_id, right = r.fingerprint_id, "left is younger");
            plan.update_right.push(adopt_stats(&r, &l));
        }
    }

    plan.add_to_left.extend(remaining.into_iter().flatten());
    Ok(plan)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::RawFingerprint;
    use crate::fingerprint::Fingerprint;
    use crate::models::Stats;

    fn fp(pattern: u32) -> Fingerprint {
        let values = (0..64u32).map(|i| pattern ^ (i % 3)).collect();
        Fingerprint::new(RawFingerprint::new(1, values))
    }

    fn record(id: i64, pattern: u32) -> Record {
        Record {
            fingerprint_id: id,
            fingerprint: fp(pattern),
            basename: format!("{id}.mp3"),
            dirname: "/music".into(),
            created_at: 10,
            updated_at: Some(50),
            stats: Stats::default(),
        }
    }

    fn run(left: Vec<Record>, right: Vec<Record>, min: Option<i64>) -> ReconciliationPlan {
        diff(left, right, min, &MatchParams::default(), &CancellationToken::new()).unwrap()
    }

    #[test]
    fn younger_right_updates_left() {
        let mut l = record(1, 0x0f0f_0000);
        l.stats.play_count = 5;
        l.updated_at = Some(100);
        let mut r = record(7, 0x0f0f_0000);
        r.stats.play_count = 9;
        r.updated_at = Some(200);

        let plan = run(vec![l], vec![r], None);
        assert!(plan.add_to_left.is_empty() && plan.add_to_right.is_empty());
        assert!(plan.update_right.is_empty());
        assert_eq!(plan.update_left.len(), 1);
        let updated = &plan.update_left[0];
        assert_eq!(updated.fingerprint_id, 1);
        assert_eq!(updated.stats.play_count, 9);
        assert_eq!(updated.updated_at, Some(200));
    }

    #[test]
    fn disjoint_fingerprints_are_added_across() {
        let plan = run(
            vec![record(1, 0x0000_ffff)],
            vec![record(2, 0xffff_0000)],
            None,
        );
        assert_eq!(plan.add_to_right.len(), 1);
        assert_eq!(plan.add_to_right[0].fingerprint_id, 1);
        assert_eq!(plan.add_to_left.len(), 1);
        assert_eq!(plan.add_to_left[0].fingerprint_id, 2);
        assert!(plan.update_left.is_empty() && plan.update_right.is_empty());
    }

    #[test]
    fn equal_stats_need_no_action() {
        let plan = run(vec![record(1, 0x1234_0000)], vec![record(2, 0x1234_0000)], None);
        assert!(plan.is_empty());
    }

    #[test]
    fn full_tie_keeps_left() {
        let mut l = record(1, 0x00ff_00ff);
        l.stats.playlists = "road".into();
        let r = record(2, 0x00ff_00ff);
        let plan = run(vec![l], vec![r], None);
        assert_eq!(plan.update_right.len(), 1);
        assert_eq!(plan.update_right[0].fingerprint_id, 2);
        assert_eq!(plan.update_right[0].stats.playlists, "road");
    }

    #[test]
    fn priority_chain_decides_first_field() {
        let mut a = record(1, 1);
        let mut b = record(2, 1);
        a.stats.last_played = 5;
        b.stats.play_count = 100;
        assert!(is_younger(&a, &b));
        assert!(!is_younger(&b, &a));
        assert!(!is_younger(&a, &a));

        a.stats.last_played = 0;
        assert!(is_younger(&b, &a));
        b.stats.play_count = 0;
        b.updated_at = None;
        assert!(is_younger(&a, &b));
    }

    #[test]
    fn stale_records_are_outside_the_window() {
        let mut old = record(1, 0x0000_ffff);
        old.updated_at = None;
        let mut fresh = record(2, 0xffff_0000);
        fresh.stats.last_played = 500;
        let plan = run(vec![old], vec![fresh], Some(400));
        assert!(plan.add_to_right.is_empty());
        assert_eq!(plan.add_to_left.len(), 1);
    }

    #[test]
    fn cancelled_diff_stops() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = diff(
            vec![record(1, 1)],
            vec![],
            None,
            &MatchParams::default(),
            &cancel,
        )
        .unwrap_err();
        assert_eq!(err, PrdbError::Cancelled);
    }
}
