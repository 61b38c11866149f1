use std::collections::{BTreeMap, BTreeSet};

use super::apply::ApplyReport;
use crate::server::{ServerName, ServerRecord};

/// Difference between the last materialized set and the current collection.
///
/// All three lists are ordered by identifier.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcilePlan {
    pub to_create: Vec<ServerRecord>,
    pub to_update: Vec<ServerRecord>,
    pub to_delete: Vec<ServerName>,
}

impl ReconcilePlan {
    pub fn is_empty(&self) -> bool {
        self.to_create.is_empty() && self.to_update.is_empty() && self.to_delete.is_empty()
    }

    /// Computes the set to remember after applying this plan.
    ///
    /// Successful changes are taken over. A failed create is left out, a
    /// failed update keeps the previous record and a failed delete keeps the
    /// record, so each one shows up again in the next plan.
    pub fn settle(&self, previous: &[ServerRecord], report: &ApplyReport) -> Vec<ServerRecord> {
        let failed: BTreeSet<&ServerName> = report.failed.iter().map(|f| &f.identifier).collect();
        let mut settled = by_identifier(previous);

        for record in self.to_create.iter().chain(&self.to_update) {
            if !failed.contains(&record.identifier) {
                settled.insert(&record.identifier, record);
            }
        }
        for identifier in &self.to_delete {
            if !failed.contains(identifier) {
                settled.remove(identifier);
            }
        }

        settled.into_values().cloned().collect()
    }
}

/// Diffs two snapshots on identifier and content.
///
/// A record present in both with different content is an update. If a
/// snapshot repeats an identifier, its last entry wins.
pub fn reconcile(previous: &[ServerRecord], current: &[ServerRecord]) -> ReconcilePlan {
    let previous = by_identifier(previous);
    let current = by_identifier(current);
    let mut plan = ReconcilePlan::default();

    for (identifier, record) in &current {
        match previous.get(identifier) {
            None => plan.to_create.push((*record).clone()),
            Some(old) if old != record => plan.to_update.push((*record).clone()),
            Some(_) => {}
        }
    }

    plan.to_delete = previous
        .keys()
        .filter(|identifier| !current.contains_key(*identifier))
        .map(|identifier| (*identifier).clone())
        .collect();

    plan
}

fn by_identifier(records: &[ServerRecord]) -> BTreeMap<&ServerName, &ServerRecord> {
    records.iter().map(|r| (&r.identifier, r)).collect()
}
