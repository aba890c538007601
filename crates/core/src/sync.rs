//! Two-way sync of the local and the external ratings DB.

use crate::error::Result;
use crate::executor::{run_all, ExecutorConfig, Outcome, Processor};
use crate::matcher::MatchParams;
use crate::models::Record;
use crate::reconcile::{self, adopt_stats, is_younger, ReconciliationPlan};
use crate::store::Store;
use anyhow::Context;
use async_trait::async_trait;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

#[derive(Debug, Clone)]
pub enum SyncOp {
    AddLocal(Record),
    UpdateLocal(Record),
    AddExternal(Record),
    UpdateExternal(Record),
}

impl SyncOp {
    fn record(&self) -> &Record {
        match self {
            SyncOp::AddLocal(r)
            | SyncOp::UpdateLocal(r)
            | SyncOp::AddExternal(r)
            | SyncOp::UpdateExternal(r) => r,
        }
    }
}

impl fmt::Display for SyncOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let action = match self {
            SyncOp::AddLocal(_) => "add to local",
            SyncOp::UpdateLocal(_) => "update local",
            SyncOp::AddExternal(_) => "add to external",
            SyncOp::UpdateExternal(_) => "update external",
        };
        let r = self.record();
        write!(f, "{action}: {}/{}", r.dirname, r.basename)
    }
}

fn plan_ops(plan: ReconciliationPlan) -> Vec<SyncOp> {
    let mut ops = Vec::with_capacity(plan.len());
    ops.extend(plan.add_to_left.into_iter().map(SyncOp::AddLocal));
    ops.extend(plan.update_left.into_iter().map(SyncOp::UpdateLocal));
    ops.extend(plan.add_to_right.into_iter().map(SyncOp::AddExternal));
    ops.extend(plan.update_right.into_iter().map(SyncOp::UpdateExternal));
    ops
}

struct SyncProcessor {
    local: Arc<dyn Store>,
    external: Arc<dyn Store>,
    params: MatchParams,
}

impl SyncProcessor {
    /// Inserts `record` unless the target already holds a match; then the
    /// younger side wins.
    async fn add(&self, target: &dyn Store, record: &Record) -> Result<Outcome> {
        match target.find_matching(&record.fingerprint, &self.params).await? {
            Some(existing) if existing.stats != record.stats && is_younger(record, &existing) => {
                target.force_update(&adopt_stats(&existing, record)).await?;
                Ok(Outcome::Succeeded)
            }
            Some(_) => Ok(Outcome::Skipped),
            None => {
                target.insert(record).await?;
                Ok(Outcome::Succeeded)
            }
        }
    }
}

#[async_trait]
impl Processor<SyncOp> for SyncProcessor {
    async fn process(&self, op: &mut SyncOp, _cancel: &CancellationToken) -> Result<Outcome> {
        debug!(op = %op, "applying");
        match op {
            SyncOp::AddLocal(r) => self.add(self.local.as_ref(), r).await,
            SyncOp::AddExternal(r) => self.add(self.external.as_ref(), r).await,
            SyncOp::UpdateLocal(r) => {
                self.local.force_update(r).await?;
                Ok(Outcome::Succeeded)
            }
            SyncOp::UpdateExternal(r) => {
                self.external.force_update(r).await?;
                Ok(Outcome::Succeeded)
            }
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct SyncOptions {
    /// Ignore records without activity since this unix timestamp.
    pub min_timestamp: Option<i64>,
    pub dry_run: bool,
    pub params: MatchParams,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct SyncSummary {
    pub add_local: usize,
    pub update_local: usize,
    pub add_external: usize,
    pub update_external: usize,
    pub applied: usize,
    pub skipped: usize,
    pub failed: Vec<String>,
    pub cancelled: bool,
}

/// Reconciles both stores and applies the plan through a task executor.
pub async fn sync_stores(
    local: Arc<dyn Store>,
    external: Arc<dyn Store>,
    options: &SyncOptions,
    config: ExecutorConfig,
    cancel: &CancellationToken,
) -> anyhow::Result<SyncSummary> {
    let left = local.list_all().await.context("load local records")?;
    let right = external.list_all().await.context("load external records")?;
    info!(local = left.len(), external = right.len(), "diffing ratings DBs");

    let params = options.params;
    let min_timestamp = options.min_timestamp;
    let diff_cancel = cancel.clone();
    let plan = tokio::task::spawn_blocking(move || {
        reconcile::diff(left, right, min_timestamp, &params, &diff_cancel)
    })
    .await
    .context("diff task panicked")??;

    let mut summary = SyncSummary {
        add_local: plan.add_to_left.len(),
        update_local: plan.update_left.len(),
        add_external: plan.add_to_right.len(),
        update_external: plan.update_right.len(),
        ..SyncSummary::default()
    };
    if options.dry_run || plan.is_empty() {
        info!(planned = plan.len(), dry_run = options.dry_run, "nothing applied");
        return Ok(summary);
    }

    let processor = SyncProcessor {
        local,
        external,
        params,
    };
    let totals = run_all(processor, plan_ops(plan), config, cancel).await;
    summary.applied = totals.succeeded.len();
    summary.skipped = totals.skipped;
    summary.failed = totals
        .failed
        .iter()
        .map(|(op, err)| format!("{op}: {err}"))
        .collect();
    summary.cancelled = totals.error.is_some();
    info!(
        applied = summary.applied,
        skipped = summary.skipped,
        failed = summary.failed.len(),
        "sync finished"
    );
    Ok(summary)
}
