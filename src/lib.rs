pub mod config;
pub mod error;
pub mod exchange;
pub mod reconcile;
pub mod runner;
pub mod server;
pub mod snapshot;

pub use config::Config;
pub use error::{Error, Result};
pub use exchange::{Broker, ExchangeStore, FileStore, MemoryStore, ProducerId, Selector};
pub use reconcile::{reconcile, ReconcilePlan};
pub use server::{render, ServerDeclaration, ServerName, ServerRecord};
