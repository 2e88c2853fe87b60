//! Reconciliation between the local catalog and the remote record database.

mod config;
mod driver;
mod engine;
mod index;
mod matcher;
mod payload;

pub use config::{parse_bool, ConfigError, RunMode, SyncConfig};
pub use driver::{SyncDriver, SyncRunSummary};
pub use engine::{
    AlignStats, EngineOptions, ItemOutcome, ItemReport, MergeStats, ReconcileStats,
    ReconciliationEngine,
};
pub use index::{usable_specs, RemoteIndex};
pub use matcher::{IdentityMatcher, ReferenceCheck, Resolution};
pub use payload::{placeholder_title, PayloadBuilder};

/// Runs one pass against the remote and workbook named by `config`.
pub async fn run_sync_once(config: SyncConfig) -> anyhow::Result<SyncRunSummary> {
    SyncDriver::from_config(config)?.run().await
}
