//! Cross-host exchange of server records.
//!
//! Database hosts publish [`ServerRecord`](crate::ServerRecord)s under
//! `(producer, identifier)` keys with a label set; backup hosts collect
//! every publication whose labels match their [`Selector`]. The two sides
//! share nothing but the [`ExchangeStore`], and the consumer must cope with
//! whatever subset has been published by the time it runs.

pub mod broker;
pub mod file;
pub mod store;
pub mod types;

pub use broker::{Broker, ReplaceSummary};
pub use file::FileStore;
pub use store::{ExchangeStore, MemoryStore};
pub use types::{Collection, IdentifierConflict, Labels, ProducerId, Publication, Selector};
