use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use shelf_remote::{ArxivEnricher, Enricher, GitHubEnricher, NotionClient, PropertyMap, RemoteApi};
use shelf_storage::{CatalogStore, HttpClientConfig, HttpTransport, XlsxCatalogStore};
use tracing::{info, info_span, Instrument};
use uuid::Uuid;

use crate::config::{RunMode, SyncConfig};
use crate::engine::{
    AlignStats, EngineOptions, ItemOutcome, ItemReport, MergeStats, ReconcileStats,
    ReconciliationEngine,
};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncRunSummary {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub mode: RunMode,
    pub created: usize,
    pub updated: usize,
    pub skipped: usize,
    pub failed: usize,
    pub not_found: usize,
    pub recovered: usize,
    pub cleared_references: usize,
    pub duplicate_remote_keys: usize,
    pub degraded_index: bool,
    /// The schema read failed; main-pass items were counted as failed.
    pub schema_unavailable: bool,
    pub merge: MergeStats,
    pub alignment: AlignStats,
    pub reconcile: ReconcileStats,
    pub catalog_path: String,
    pub migrated: bool,
    pub saved: bool,
}

impl SyncRunSummary {
    fn new(run_id: Uuid, started_at: DateTime<Utc>, mode: RunMode) -> Self {
        Self {
            run_id,
            started_at,
            finished_at: started_at,
            mode,
            created: 0,
            updated: 0,
            skipped: 0,
            failed: 0,
            not_found: 0,
            recovered: 0,
            cleared_references: 0,
            duplicate_remote_keys: 0,
            degraded_index: false,
            schema_unavailable: false,
            merge: MergeStats::default(),
            alignment: AlignStats::default(),
            reconcile: ReconcileStats::default(),
            catalog_path: String::new(),
            migrated: false,
            saved: false,
        }
    }

    pub fn record(&mut self, report: &ItemReport) {
        match report.outcome {
            ItemOutcome::Created => self.created += 1,
            ItemOutcome::Updated => self.updated += 1,
            ItemOutcome::Skipped => self.skipped += 1,
            ItemOutcome::Failed => self.failed += 1,
            ItemOutcome::NotFound => self.not_found += 1,
        }
        self.recovered += report.recovered as usize;
        self.cleared_references += report.cleared as usize;
    }
}

/// Loads the catalog, runs the configured passes against the remote, and
/// saves the catalog once at the end.
pub struct SyncDriver<S: CatalogStore> {
    config: SyncConfig,
    store: S,
    api: Arc<dyn RemoteApi>,
    map: PropertyMap,
    enrichers: Vec<Arc<dyn Enricher>>,
}

impl SyncDriver<XlsxCatalogStore> {
    /// Wires the HTTP remote, workbook store and enrichers from `config`.
    pub fn from_config(config: SyncConfig) -> Result<Self> {
        let http = HttpTransport::new(HttpClientConfig {
            timeout: config.timeout,
            ..Default::default()
        })?;
        let api: Arc<dyn RemoteApi> = Arc::new(NotionClient::new(
            http.clone(),
            config.token.clone(),
            config.database_id.clone(),
            config.api_base.clone(),
        ));
        let map = PropertyMap::load(config.kind, config.property_map_file.as_deref())?;
        let enrichers: Vec<Arc<dyn Enricher>> = if config.enrich {
            vec![
                Arc::new(GitHubEnricher::new(http.clone(), config.github_token.clone()))
                    as Arc<dyn Enricher>,
                Arc::new(ArxivEnricher::new(http)) as Arc<dyn Enricher>,
            ]
        } else {
            Vec::new()
        };
        let store = XlsxCatalogStore::new(&config.catalog_path, config.kind);
        Ok(Self::new(config, store, api, map).with_enrichers(enrichers))
    }
}

impl<S: CatalogStore> SyncDriver<S> {
    pub fn new(config: SyncConfig, store: S, api: Arc<dyn RemoteApi>, map: PropertyMap) -> Self {
        Self {
            config,
            store,
            api,
            map,
            enrichers: Vec::new(),
        }
    }

    pub fn with_enrichers(mut self, enrichers: Vec<Arc<dyn Enricher>>) -> Self {
        self.enrichers = enrichers;
        self
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub async fn run(&self) -> Result<SyncRunSummary> {
        let run_id = Uuid::new_v4();
        let span = info_span!(
            "sync_run",
            %run_id,
            mode = %self.config.mode,
            kind = self.config.kind.as_str()
        );
        self.run_inner(run_id).instrument(span).await
    }

    async fn run_inner(&self, run_id: Uuid) -> Result<SyncRunSummary> {
        let config = &self.config;
        let mut summary = SyncRunSummary::new(run_id, Utc::now(), config.mode);

        let loaded = self.store.load().context("loading local catalog")?;
        let mut catalog = loaded.catalog;
        summary.migrated = loaded.migrated;
        info!(
            path = %loaded.path.display(),
            categories = catalog.categories().len(),
            items = catalog.item_count(),
            migrated = loaded.migrated,
            "catalog loaded"
        );

        let mut engine = ReconciliationEngine::prepare(
            self.api.clone(),
            self.map.clone(),
            config.kind,
            EngineOptions {
                mode: config.mode,
                force_title: config.force_title,
            },
            self.enrichers.clone(),
        )
        .await;
        summary.schema_unavailable = !engine.has_schema();
        summary.duplicate_remote_keys = engine.index().duplicate_count();
        summary.degraded_index = engine.index().is_degraded();

        if config.merge_from_remote {
            summary.merge = engine.merge_from_remote(&mut catalog);
            info!(merge = ?summary.merge, "merged remote records");
        }
        if config.align_categories {
            summary.alignment = engine.align_categories(&mut catalog).await;
            info!(alignment = ?summary.alignment, "aligned categories");
        }

        if config.mode == RunMode::ReconcileOnly {
            summary.reconcile = engine.reconcile(&mut catalog);
            info!(reconcile = ?summary.reconcile, "reconciled");
        } else {
            let item_ids = catalog.item_ids();
            let total = item_ids.len();
            for (position, item_id) in item_ids.iter().enumerate() {
                let report = engine.process_item(&mut catalog, item_id).await;
                summary.record(&report);
                if report.mutated && position + 1 < total && !config.delay.is_zero() {
                    tokio::time::sleep(config.delay).await;
                }
            }
        }

        let path = if config.dry_run {
            info!("dry run, catalog not saved");
            loaded.path
        } else {
            summary.saved = true;
            self.store.save(&catalog).context("saving local catalog")?
        };
        summary.catalog_path = path.display().to_string();
        summary.finished_at = Utc::now();

        info!(
            created = summary.created,
            updated = summary.updated,
            skipped = summary.skipped,
            failed = summary.failed,
            "sync finished"
        );
        Ok(summary)
    }
}
