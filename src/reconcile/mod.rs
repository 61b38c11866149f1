//! Consumer-side reconciliation.
//!
//! [`reconcile`] is a pure diff between the set materialized last time and
//! the set collected now. [`apply`] drives a [`Materializer`] through the
//! resulting plan, one identifier at a time.

pub mod apply;
pub mod fs;
pub mod plan;

pub use apply::{
    apply, ApplyFailure, ApplyOptions, ApplyReport, CheckStatus, HealthCheck, Materializer,
};
pub use fs::FsMaterializer;
pub use plan::{reconcile, ReconcilePlan};
