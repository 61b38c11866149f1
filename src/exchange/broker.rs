use std::collections::BTreeSet;
use tracing::{debug, info, warn};

use super::store::ExchangeStore;
use super::types::{Collection, IdentifierConflict, Labels, ProducerId, Publication, Selector};
use crate::server::{ServerName, ServerRecord};
use crate::{Error, Result};

/// Outcome of [`Broker::replace_producer`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReplaceSummary {
    pub published: Vec<ServerName>,
    pub unchanged: Vec<ServerName>,
    pub retracted: Vec<ServerName>,
}

/// Publish/collect front end over an [`ExchangeStore`].
///
/// Producers and consumers never talk to each other; they only share the
/// store. Every operation is idempotent and safe to re-run on the next
/// compilation cycle.
pub struct Broker<S> {
    store: S,
}

impl<S: ExchangeStore> Broker<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Stores `record` under `(producer, record.identifier)`.
    ///
    /// Re-publishing an identical record with identical labels leaves the
    /// stored publication (and its timestamp) untouched.
    pub async fn publish(
        &self,
        producer: &ProducerId,
        record: ServerRecord,
        labels: Labels,
    ) -> Result<Publication> {
        let publication = match self.store.get(producer, &record.identifier).await? {
            Some(existing) if existing.record == record && existing.labels == labels => {
                debug!(producer = %producer, identifier = %record.identifier, "Publication unchanged");
                return Ok(existing);
            }
            Some(existing) => Publication::superseding(&existing, record, labels),
            None => Publication::new(producer.clone(), record, labels),
        };
        self.store.put(&publication).await?;
        info!(
            producer = %producer,
            identifier = %publication.identifier(),
            "Published server record"
        );
        Ok(publication)
    }

    pub async fn retract(&self, producer: &ProducerId, identifier: &ServerName) -> Result<bool> {
        let removed = self.store.remove(producer, identifier).await?;
        if removed {
            info!(producer = %producer, identifier = %identifier, "Retracted server record");
        }
        Ok(removed)
    }

    /// Makes the store hold exactly `entries` for this producer.
    ///
    /// This is what one producer compilation submits: every declared record
    /// is published and anything the producer published before but no longer
    /// declares is retracted. A name declared twice in `entries` fails the
    /// whole call before anything is written.
    pub async fn replace_producer(
        &self,
        producer: &ProducerId,
        entries: Vec<(ServerRecord, Labels)>,
    ) -> Result<ReplaceSummary> {
        let mut declared = BTreeSet::new();
        for (record, _) in &entries {
            if !declared.insert(record.identifier.clone()) {
                return Err(Error::IdentifierConflict {
                    identifier: record.identifier.to_string(),
                    kept: producer.to_string(),
                    rejected: vec![producer.to_string()],
                });
            }
        }

        let previous = self.store.list_producer(producer).await?;
        let mut summary = ReplaceSummary::default();

        for (record, labels) in entries {
            let unchanged = previous.iter().any(|p| {
                p.identifier() == &record.identifier && p.record == record && p.labels == labels
            });
            let identifier = record.identifier.clone();
            self.publish(producer, record, labels).await?;
            if unchanged {
                summary.unchanged.push(identifier);
            } else {
                summary.published.push(identifier);
            }
        }

        for publication in previous {
            if !declared.contains(publication.identifier())
                && self.retract(producer, publication.identifier()).await?
            {
                summary.retracted.push(publication.identifier().clone());
            }
        }

        summary.retracted.sort();
        Ok(summary)
    }

    /// Returns every stored publication matching `selector`.
    ///
    /// Publications are ordered by identifier, then first publication time,
    /// then producer. When several producers publish the same identifier the
    /// first in that order is kept and the others are reported as conflicts.
    /// Updating a record does not move it in that order.
    pub async fn collect(&self, selector: &Selector) -> Result<Collection> {
        let mut matching: Vec<Publication> = self
            .store
            .list()
            .await?
            .into_iter()
            .filter(|p| selector.matches(&p.labels))
            .collect();

        matching.sort_by(|a, b| {
            a.identifier()
                .cmp(b.identifier())
                .then(a.first_published_at.cmp(&b.first_published_at))
                .then(a.producer.cmp(&b.producer))
        });

        let mut collection = Collection::default();
        for publication in matching {
            match collection.publications.last() {
                Some(kept) if kept.identifier() == publication.identifier() => {
                    let kept_producer = kept.producer.clone();
                    match collection.conflicts.last_mut() {
                        Some(conflict) if &conflict.identifier == publication.identifier() => {
                            conflict.rejected.push(publication.producer);
                        }
                        _ => collection.conflicts.push(IdentifierConflict {
                            identifier: publication.identifier().clone(),
                            kept: kept_producer,
                            rejected: vec![publication.producer],
                        }),
                    }
                }
                _ => collection.publications.push(publication),
            }
        }

        for conflict in &collection.conflicts {
            warn!(error = %Error::from(conflict), "Identifier conflict in collection");
        }
        debug!(
            selector = %selector,
            records = collection.publications.len(),
            conflicts = collection.conflicts.len(),
            "Collected publications"
        );

        Ok(collection)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exchange::MemoryStore;
    use crate::server::ServerDeclaration;
    use chrono::{Duration, Utc};

    fn record(name: &str, host: &str) -> ServerRecord {
        let decl = ServerDeclaration {
            host: Some(host.to_string()),
            ssh_command: Some(format!("ssh postgres@{}", host)),
            ..ServerDeclaration::new(name)
        };
        ServerRecord::new(&decl, None).unwrap()
    }

    fn group(name: &str) -> Labels {
        Labels::from([("host_group".to_string(), name.to_string())])
    }

    fn producer(id: &str) -> ProducerId {
        ProducerId::new(id).unwrap()
    }

    fn names(collection: &Collection) -> Vec<String> {
        collection
            .publications
            .iter()
            .map(|p| p.identifier().to_string())
            .collect()
    }

    #[tokio::test]
    async fn test_collect_empty_store() {
        let broker = Broker::new(MemoryStore::new());
        let collection = broker.collect(&Selector::all()).await.unwrap();
        assert!(collection.is_empty());
        assert!(collection.conflicts.is_empty());
    }

    #[tokio::test]
    async fn test_collect_filters_and_sorts() {
        let broker = Broker::new(MemoryStore::new());
        broker.publish(&producer("db3"), record("zeta", "db3"), group("global")).await.unwrap();
        broker.publish(&producer("db1"), record("alpha", "db1"), group("global")).await.unwrap();
        broker.publish(&producer("db2"), record("mid", "db2"), group("eu")).await.unwrap();

        let global = broker
            .collect(&Selector::all().with("host_group", "global"))
            .await
            .unwrap();
        assert_eq!(names(&global), vec!["alpha", "zeta"]);

        let all = broker.collect(&Selector::all()).await.unwrap();
        assert_eq!(names(&all), vec!["alpha", "mid", "zeta"]);
    }

    #[tokio::test]
    async fn test_publish_is_last_writer_wins() {
        let broker = Broker::new(MemoryStore::new());
        let db1 = producer("db1");

        broker.publish(&db1, record("server1", "old-host"), group("global")).await.unwrap();
        broker.publish(&db1, record("server1", "new-host"), group("global")).await.unwrap();

        let collection = broker.collect(&Selector::all()).await.unwrap();
        assert_eq!(collection.publications.len(), 1);
        assert!(collection.publications[0].record.conninfo.contains("host=new-host"));
    }

    #[tokio::test]
    async fn test_republish_identical_keeps_timestamp() {
        let broker = Broker::new(MemoryStore::new());
        let db1 = producer("db1");

        let first = broker.publish(&db1, record("server1", "db1"), group("global")).await.unwrap();
        let second = broker.publish(&db1, record("server1", "db1"), group("global")).await.unwrap();
        assert_eq!(first.published_at, second.published_at);
    }

    #[tokio::test]
    async fn test_conflict_first_published_wins() {
        let store = MemoryStore::new();
        let now = Utc::now();

        let mut early = Publication::new(producer("db2"), record("shared", "db2"), group("global"));
        early.first_published_at = now - Duration::seconds(60);
        let late = Publication::new(producer("db1"), record("shared", "db1"), group("global"));
        let mut later = Publication::new(producer("db3"), record("shared", "db3"), group("global"));
        later.first_published_at = now + Duration::seconds(60);

        store.put(&late).await.unwrap();
        store.put(&later).await.unwrap();
        store.put(&early).await.unwrap();

        let broker = Broker::new(store);
        let collection = broker.collect(&Selector::all()).await.unwrap();

        assert_eq!(collection.publications.len(), 1);
        assert_eq!(collection.publications[0].producer.as_str(), "db2");
        assert_eq!(
            collection.conflicts,
            vec![IdentifierConflict {
                identifier: ServerName::new("shared").unwrap(),
                kept: producer("db2"),
                rejected: vec![producer("db1"), producer("db3")],
            }]
        );
    }

    #[tokio::test]
    async fn test_conflict_winner_survives_own_update() {
        let broker = Broker::new(MemoryStore::new());
        let db1 = producer("db1");
        let db2 = producer("db2");

        broker.publish(&db1, record("shared", "db1"), group("global")).await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        broker.publish(&db2, record("shared", "db2"), group("global")).await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;

        let updated = ServerRecord {
            description: "updated".to_string(),
            ..record("shared", "db1")
        };
        let republished = broker.publish(&db1, updated, group("global")).await.unwrap();
        assert!(republished.published_at > republished.first_published_at);

        let collection = broker.collect(&Selector::all()).await.unwrap();
        assert_eq!(collection.publications.len(), 1);
        assert_eq!(collection.publications[0].producer, db1);
        assert_eq!(collection.publications[0].record.description, "updated");
        assert_eq!(collection.conflicts[0].kept, db1);
        assert_eq!(collection.conflicts[0].rejected, vec![db2]);
    }

    #[tokio::test]
    async fn test_fan_out_to_several_selectors() {
        let broker = Broker::new(MemoryStore::new());
        let labels = Labels::from([
            ("host_group".to_string(), "global".to_string()),
            ("site".to_string(), "eu".to_string()),
        ]);
        broker.publish(&producer("db1"), record("server1", "db1"), labels).await.unwrap();

        let by_group = broker.collect(&Selector::all().with("host_group", "global")).await.unwrap();
        let by_site = broker.collect(&Selector::all().with("site", "eu")).await.unwrap();
        assert_eq!(names(&by_group), vec!["server1"]);
        assert_eq!(names(&by_site), vec!["server1"]);
    }

    #[tokio::test]
    async fn test_replace_producer_retracts_undeclared() {
        let broker = Broker::new(MemoryStore::new());
        let db1 = producer("db1");
        let db2 = producer("db2");

        broker
            .replace_producer(
                &db1,
                vec![
                    (record("a", "db1"), group("global")),
                    (record("b", "db1"), group("global")),
                ],
            )
            .await
            .unwrap();
        broker.publish(&db2, record("c", "db2"), group("global")).await.unwrap();

        let summary = broker
            .replace_producer(
                &db1,
                vec![
                    (record("a", "db1"), group("global")),
                    (record("d", "db1"), group("global")),
                ],
            )
            .await
            .unwrap();

        assert_eq!(summary.unchanged, vec![ServerName::new("a").unwrap()]);
        assert_eq!(summary.published, vec![ServerName::new("d").unwrap()]);
        assert_eq!(summary.retracted, vec![ServerName::new("b").unwrap()]);

        let collection = broker.collect(&Selector::all()).await.unwrap();
        assert_eq!(names(&collection), vec!["a", "c", "d"]);
    }

    #[tokio::test]
    async fn test_replace_producer_rejects_duplicates() {
        let broker = Broker::new(MemoryStore::new());
        let db1 = producer("db1");

        let result = broker
            .replace_producer(
                &db1,
                vec![
                    (record("a", "db1"), group("global")),
                    (record("a", "other"), group("global")),
                ],
            )
            .await;

        assert!(matches!(result, Err(Error::IdentifierConflict { .. })));
        assert!(broker.collect(&Selector::all()).await.unwrap().is_empty());
    }
}
