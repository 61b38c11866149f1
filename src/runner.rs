//! One compilation cycle on either side of the exchange.
//!
//! Both cycles are idempotent: running them again with unchanged inputs
//! writes nothing new. Scheduling and retries belong to whatever runs the
//! binary periodically.

use tracing::{debug, info, warn};

use crate::config::{ConsumerConfig, ProducerConfig};
use crate::exchange::{Broker, ExchangeStore, IdentifierConflict, ReplaceSummary};
use crate::reconcile::{apply, reconcile, ApplyReport, Materializer, ReconcilePlan};
use crate::server::ServerName;
use crate::snapshot::SnapshotManager;
use crate::Result;

/// Validates all declarations of a producer, then replaces its publications.
///
/// Nothing is published if any declaration is invalid.
pub async fn publish<S: ExchangeStore>(
    broker: &Broker<S>,
    producer: &ProducerConfig,
) -> Result<ReplaceSummary> {
    let producer_id = producer.producer_id()?;
    let records = producer.records()?;
    info!(producer = %producer_id, servers = records.len(), "Publishing server records");

    let summary = broker.replace_producer(&producer_id, records).await?;
    info!(
        producer = %producer_id,
        published = summary.published.len(),
        unchanged = summary.unchanged.len(),
        retracted = summary.retracted.len(),
        "Publish complete"
    );
    Ok(summary)
}

#[derive(Debug, Clone)]
pub struct CollectOutcome {
    pub plan: ReconcilePlan,
    /// `None` for a dry run
    pub report: Option<ApplyReport>,
    pub conflicts: Vec<IdentifierConflict>,
    pub stale: Vec<ServerName>,
}

/// Collects matching publications, reconciles them against the last
/// snapshot and applies the difference.
///
/// Per-server failures are reported in the outcome, not returned as
/// errors. The snapshot is only advanced when the plan was applied.
pub async fn collect<S, M>(
    broker: &Broker<S>,
    consumer: &ConsumerConfig,
    materializer: &M,
    snapshots: &SnapshotManager,
    dry_run: bool,
) -> Result<CollectOutcome>
where
    S: ExchangeStore,
    M: Materializer + ?Sized,
{
    let previous = snapshots.load().await?.unwrap_or_default();
    let collection = broker.collect(&consumer.selector).await?;

    let stale = previous.stale_identifiers(&collection);
    for identifier in &stale {
        debug!(identifier = %identifier, "Collected publication is older than the last run");
    }

    let current = collection.records();
    let plan = reconcile(&previous.records, &current);
    info!(
        selector = %consumer.selector,
        collected = current.len(),
        create = plan.to_create.len(),
        update = plan.to_update.len(),
        delete = plan.to_delete.len(),
        "Reconciliation plan"
    );

    if dry_run {
        return Ok(CollectOutcome {
            plan,
            report: None,
            conflicts: collection.conflicts,
            stale,
        });
    }

    let report = apply(&plan, materializer, &consumer.apply_options()).await;
    for failure in &report.failed {
        warn!(identifier = %failure.identifier, error = %failure.error, "Server not applied");
    }

    let records = plan.settle(&previous.records, &report);
    let failed: Vec<ServerName> = report.failed.iter().map(|f| f.identifier.clone()).collect();
    let snapshot = previous.advance(records, &collection, &failed);
    snapshots.save(&snapshot).await?;

    Ok(CollectOutcome {
        plan,
        report: Some(report),
        conflicts: collection.conflicts,
        stale,
    })
}
