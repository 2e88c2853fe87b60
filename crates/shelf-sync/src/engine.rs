//! Per-item create/update/skip decisions and the catalog-side passes that
//! pull remote state into the local catalog.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use shelf_core::{fill, identity_keys, override_title, Catalog, CatalogKind, Item, MoveOutcome};
use shelf_remote::{
    Enricher, FieldValue, Properties, PropertyMap, RemoteApi, RemotePage, RemoteRecord, Schema,
    UpdateStatus,
};
use shelf_storage::{UNCATEGORIZED_ID, UNCATEGORIZED_NAME};
use tracing::{debug, info, warn};

use crate::config::RunMode;
use crate::index::RemoteIndex;
use crate::matcher::{IdentityMatcher, Resolution};
use crate::payload::PayloadBuilder;

/// What happened to one item in the main pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemOutcome {
    Created,
    Updated,
    Skipped,
    Failed,
    /// The reference was stale, nothing matched, and the mode forbids creating.
    NotFound,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemReport {
    pub item_id: String,
    pub outcome: ItemOutcome,
    /// A reference was recovered by identity key.
    pub recovered: bool,
    /// A stale reference was cleared.
    pub cleared: bool,
    /// A create or update call was issued.
    pub mutated: bool,
}

impl ItemReport {
    fn new(item_id: &str) -> Self {
        Self {
            item_id: item_id.to_string(),
            outcome: ItemOutcome::Skipped,
            recovered: false,
            cleared: false,
            mutated: false,
        }
    }

    fn finish(mut self, outcome: ItemOutcome) -> Self {
        self.outcome = outcome;
        self
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergeStats {
    pub inserted: usize,
    pub merged: usize,
    pub moved: usize,
    pub created_categories: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlignStats {
    pub moved: usize,
    pub created_categories: usize,
    pub skipped: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconcileStats {
    pub filled: usize,
    pub cleared: usize,
    pub moved: usize,
    pub created_categories: usize,
    pub unmatched: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EngineOptions {
    pub mode: RunMode,
    /// Enrichment titles replace local titles.
    pub force_title: bool,
}

/// Moves `item_id` into the category labelled `label` unless it is already
/// there. Returns `(moved, created_category)`.
fn align_to_label(catalog: &mut Catalog, item_id: &str, label: &str) -> (bool, bool) {
    let label = label.trim();
    if label.is_empty() || catalog.category_of(item_id).is_some_and(|c| c.name == label) {
        return (false, false);
    }
    let ensured = catalog.ensure_category(label);
    let moved = catalog.relocate(item_id, &ensured.id) == MoveOutcome::Moved;
    if moved {
        info!(item_id, category = label, "moved item to remote category");
    }
    (moved, ensured.created)
}

/// Category for records without a label: the existing uncategorized bucket,
/// created when missing.
fn fallback_category(catalog: &mut Catalog) -> (String, bool) {
    if catalog.category(UNCATEGORIZED_ID).is_some() {
        return (UNCATEGORIZED_ID.to_string(), false);
    }
    let ensured = catalog.ensure_category(UNCATEGORIZED_NAME);
    (ensured.id, ensured.created)
}

fn set_reference(catalog: &mut Catalog, item_id: &str, remote_id: &str) {
    if let Some(item) = catalog.item_mut(item_id) {
        item.remote_record_id = remote_id.to_string();
    }
}

fn clear_reference(catalog: &mut Catalog, item_id: &str) -> bool {
    catalog
        .item_mut(item_id)
        .and_then(Item::clear_reference)
        .is_some()
}

pub struct ReconciliationEngine {
    api: Arc<dyn RemoteApi>,
    kind: CatalogKind,
    map: PropertyMap,
    options: EngineOptions,
    enrichers: Vec<Arc<dyn Enricher>>,
    matcher: IdentityMatcher,
    payload: PayloadBuilder,
    index: RemoteIndex,
}

impl ReconciliationEngine {
    /// Fetches the schema and scans the remote once. A failed scan leaves the
    /// engine on per-item lookups. A failed schema fetch leaves it with an
    /// empty schema, under which every item of the main pass fails without
    /// a remote call.
    pub async fn prepare(
        api: Arc<dyn RemoteApi>,
        map: PropertyMap,
        kind: CatalogKind,
        options: EngineOptions,
        enrichers: Vec<Arc<dyn Enricher>>,
    ) -> Self {
        let schema = match api.schema().await {
            Ok(schema) => schema,
            Err(err) => {
                warn!(error = %err, "remote schema unavailable, no payload can be built");
                Schema::new()
            }
        };
        let index = match RemoteIndex::build(api.as_ref(), &schema, &map, kind).await {
            Ok(index) => index,
            Err(err) => {
                warn!(error = %err, "remote scan failed, using per-item lookups");
                RemoteIndex::degraded()
            }
        };
        let matcher = IdentityMatcher::new(api.clone(), &map, kind, &schema);
        let payload = PayloadBuilder::new(map.clone(), schema);
        Self {
            api,
            kind,
            map,
            options,
            enrichers: enrichers
                .into_iter()
                .filter(|e| e.applies_to(kind))
                .collect(),
            matcher,
            payload,
            index,
        }
    }

    pub fn index(&self) -> &RemoteIndex {
        &self.index
    }

    /// False when the schema could not be read and no payload can be shaped.
    pub fn has_schema(&self) -> bool {
        !self.payload.schema().is_empty()
    }

    pub fn options(&self) -> EngineOptions {
        self.options
    }

    /// Pulls every remote record into the catalog: unmatched records become
    /// new items, matched ones fill gaps and follow the remote category.
    /// Records that share a key with an earlier scanned record are left out,
    /// unless an item references them directly.
    pub fn merge_from_remote(&self, catalog: &mut Catalog) -> MergeStats {
        let mut stats = MergeStats::default();
        if self.index.is_degraded() {
            warn!("remote index unavailable, skipping merge from remote");
            return stats;
        }
        let records: Vec<RemoteRecord> = self.index.records().to_vec();
        for record in &records {
            let fields = self.map.fields(record);
            let keys = identity_keys(self.kind, &fields.primary_link, &fields.external_id);
            let local = match catalog.find_item_by_reference(&record.remote_id) {
                Some(item) => Some(item.id.clone()),
                None => {
                    let shadowed = keys.iter().any(|key| {
                        self.index
                            .lookup(key)
                            .is_some_and(|first| first != record.remote_id)
                    });
                    if shadowed {
                        debug!(remote_id = %record.remote_id, "duplicate remote record, first scanned wins");
                        continue;
                    }
                    let by_key = keys.iter().find_map(|key| catalog.find_item_by_key(key));
                    if let Some(item) = by_key {
                        if let Some(other) = item.reference().filter(|r| self.index.contains(r)) {
                            debug!(
                                item_id = %item.id,
                                remote_id = %record.remote_id,
                                referenced = other,
                                "item already references another remote record"
                            );
                            continue;
                        }
                    }
                    by_key.map(|item| item.id.clone())
                }
            };

            let Some(item_id) = local else {
                if keys.is_empty() && fields.title.trim().is_empty() {
                    debug!(remote_id = %record.remote_id, "remote record has nothing to import");
                    continue;
                }
                let mut item = Item {
                    remote_record_id: record.remote_id.clone(),
                    ..Item::default()
                };
                fill(&mut item, &fields);
                item.normalize(self.kind);
                let (category_id, created) = if record.category_name.is_empty() {
                    fallback_category(catalog)
                } else {
                    let ensured = catalog.ensure_category(&record.category_name);
                    (ensured.id, ensured.created)
                };
                stats.created_categories += created as usize;
                match catalog.insert_item(&category_id, item) {
                    Ok(item_id) => {
                        stats.inserted += 1;
                        info!(item_id = %item_id, remote_id = %record.remote_id, "inserted item from remote");
                    }
                    Err(err) => warn!(remote_id = %record.remote_id, error = %err, "could not insert remote item"),
                }
                continue;
            };

            if let Some(item) = catalog.item_mut(&item_id) {
                let mut changed = fill(item, &fields);
                if !item.has_reference() {
                    item.remote_record_id = record.remote_id.clone();
                    changed += 1;
                }
                if changed > 0 {
                    stats.merged += 1;
                    debug!(item_id = %item_id, fields = changed, "merged remote fields");
                }
            }
            let (moved, created) = align_to_label(catalog, &item_id, &record.category_name);
            stats.moved += moved as usize;
            stats.created_categories += created as usize;
        }
        stats
    }

    /// Moves every referenced item into the category its remote record
    /// carries. Reads only; failures skip the item.
    pub async fn align_categories(&self, catalog: &mut Catalog) -> AlignStats {
        let mut stats = AlignStats::default();
        for item_id in catalog.item_ids() {
            let Some(reference) = catalog
                .item(&item_id)
                .and_then(Item::reference)
                .map(str::to_string)
            else {
                stats.skipped += 1;
                continue;
            };
            let label = match self.api.get_record(&reference).await {
                Ok(Some(page)) => self.map.record(page).category_name,
                Ok(None) => {
                    debug!(item_id = %item_id, remote_id = %reference, "referenced record missing");
                    String::new()
                }
                Err(err) => {
                    warn!(item_id = %item_id, error = %err, "could not read remote category");
                    String::new()
                }
            };
            if label.is_empty() {
                stats.skipped += 1;
                continue;
            }
            let (moved, created) = align_to_label(catalog, &item_id, &label);
            stats.moved += moved as usize;
            stats.created_categories += created as usize;
        }
        stats
    }

    /// Aligns references and categories with the scanned remote state without
    /// any remote mutation. Items without a match are left alone. A reference
    /// to any record stored under the item's key is kept, including a later
    /// scanned duplicate; only references outside that set are cleared.
    pub fn reconcile(&self, catalog: &mut Catalog) -> ReconcileStats {
        let mut stats = ReconcileStats::default();
        if self.index.is_degraded() {
            warn!("remote index unavailable, nothing to reconcile against");
            return stats;
        }
        for item_id in catalog.item_ids() {
            let Some(item) = catalog.item(&item_id) else {
                continue;
            };
            let Some((key, remote_id)) = self
                .index
                .resolve(item, self.kind)
                .map(|(key, id)| (key, id.to_string()))
            else {
                stats.unmatched += 1;
                continue;
            };

            let reference = item.reference().map(str::to_string);
            let mut anchor = remote_id.clone();
            match reference {
                None => {
                    set_reference(catalog, &item_id, &remote_id);
                    stats.filled += 1;
                    debug!(item_id = %item_id, remote_id = %remote_id, "filled reference");
                }
                Some(reference) if self.index.lookup_all(&key).contains(&reference) => {
                    anchor = reference;
                }
                Some(reference) => {
                    clear_reference(catalog, &item_id);
                    stats.cleared += 1;
                    warn!(item_id = %item_id, stale = %reference, expected = %remote_id, "cleared mismatched reference");
                }
            }

            let label = self
                .index
                .record(&anchor)
                .map(|r| r.category_name.clone())
                .unwrap_or_default();
            let (moved, created) = align_to_label(catalog, &item_id, &label);
            stats.moved += moved as usize;
            stats.created_categories += created as usize;
        }
        stats
    }

    /// Runs the applicable enrichers against the item, filling empty local
    /// fields. Returns remote-only values for the payload.
    async fn enrich(&self, catalog: &mut Catalog, item_id: &str) -> BTreeMap<String, FieldValue> {
        let mut remote = BTreeMap::new();
        for enricher in &self.enrichers {
            let Some(snapshot) = catalog.item(item_id).cloned() else {
                break;
            };
            let enrichment = match enricher.enrich(&snapshot).await {
                Ok(Some(enrichment)) => enrichment,
                Ok(None) => continue,
                Err(err) => {
                    warn!(item_id, source = enricher.name(), error = %err, "enrichment failed, using local data");
                    continue;
                }
            };
            if let Some(item) = catalog.item_mut(item_id) {
                if self.options.force_title {
                    override_title(item, &enrichment.fields.title);
                }
                let changed = fill(item, &enrichment.fields);
                debug!(item_id, source = enricher.name(), fields = changed, "enriched item");
            }
            for (key, value) in enrichment.remote {
                remote.entry(key).or_insert(value);
            }
        }
        remote
    }

    fn included(&self, item: &Item) -> bool {
        match self.options.mode {
            RunMode::All => true,
            RunMode::UpdateOnly => item.has_reference(),
            RunMode::ReconcileOnly => false,
            RunMode::CreateOnly => {
                let Some(reference) = item.reference() else {
                    return true;
                };
                let known = self.index.is_degraded() || self.index.contains(reference);
                // incomplete items go through the update path, not a create
                !(known && item.missing_required(self.kind).is_empty())
            }
        }
    }

    async fn create(
        &mut self,
        catalog: &mut Catalog,
        mut report: ItemReport,
        properties: Properties,
    ) -> ItemReport {
        if self.options.mode == RunMode::UpdateOnly {
            info!(item_id = %report.item_id, "no remote record and mode forbids creating");
            return report.finish(ItemOutcome::NotFound);
        }
        report.mutated = true;
        match self.api.create_record(&properties).await {
            Ok(remote_id) => {
                set_reference(catalog, &report.item_id, &remote_id);
                let record = self.map.record(RemotePage {
                    id: remote_id.clone(),
                    properties,
                });
                self.index.insert(record, &self.map, self.kind);
                info!(item_id = %report.item_id, remote_id = %remote_id, "created");
                report.finish(ItemOutcome::Created)
            }
            Err(err) => {
                warn!(item_id = %report.item_id, error = %err, "create failed");
                if clear_reference(catalog, &report.item_id) {
                    report.cleared = true;
                }
                report.finish(ItemOutcome::Failed)
            }
        }
    }

    /// Decides and performs the remote action for one item. Never fails; every
    /// error becomes an outcome.
    pub async fn process_item(&mut self, catalog: &mut Catalog, item_id: &str) -> ItemReport {
        let mut report = ItemReport::new(item_id);
        let Some(item) = catalog.item(item_id).cloned() else {
            warn!(item_id, "item vanished from catalog");
            return report.finish(ItemOutcome::Failed);
        };
        if !self.has_schema() {
            warn!(item_id, "no remote schema, cannot build a payload");
            return report.finish(ItemOutcome::Failed);
        }

        if !item.has_reference() {
            match self.matcher.lookup(&item, &self.index).await {
                Ok(Some(remote_id)) => {
                    info!(item_id, remote_id = %remote_id, "recovered reference by key");
                    set_reference(catalog, item_id, &remote_id);
                    report.recovered = true;
                }
                Ok(None) => {}
                Err(message) if self.options.mode == RunMode::UpdateOnly => {
                    debug!(item_id, error = %message, "lookup failed for unreferenced item");
                }
                Err(message) => {
                    warn!(item_id, error = %message, "lookup failed, not risking a duplicate");
                    return report.finish(ItemOutcome::Failed);
                }
            }
        }

        let Some(item) = catalog.item(item_id).cloned() else {
            return report.finish(ItemOutcome::Failed);
        };
        if !self.included(&item) {
            debug!(item_id, mode = %self.options.mode, "skipped");
            return report.finish(ItemOutcome::Skipped);
        }

        let remote_only = self.enrich(catalog, item_id).await;
        let Some(item) = catalog.item(item_id).cloned() else {
            return report.finish(ItemOutcome::Failed);
        };
        let category_name = catalog
            .category_of(item_id)
            .map(|c| c.name.clone())
            .unwrap_or_default();
        let properties = self.payload.build(&item, &category_name, &remote_only);

        // unreferenced items were already looked up by key above
        let resolution = if item.has_reference() {
            report.mutated = true;
            self.matcher.resolve(&item, &properties, &self.index).await
        } else {
            Resolution::Unmatched { stale: None }
        };
        match resolution {
            Resolution::Confirmed(remote_id) => {
                info!(item_id, remote_id = %remote_id, "updated");
                report.finish(ItemOutcome::Updated)
            }
            Resolution::Transient(message) => {
                warn!(item_id, error = %message, "remote call failed, leaving item for the next run");
                report.finish(ItemOutcome::Failed)
            }
            Resolution::Found { remote_id, stale } => {
                if stale.is_some() && clear_reference(catalog, item_id) {
                    report.cleared = true;
                }
                report.recovered = true;
                report.mutated = true;
                match self.api.update_record(&remote_id, &properties).await {
                    UpdateStatus::Ok => {
                        set_reference(catalog, item_id, &remote_id);
                        info!(item_id, remote_id = %remote_id, "updated recovered record");
                        report.finish(ItemOutcome::Updated)
                    }
                    UpdateStatus::NotFound => {
                        warn!(item_id, remote_id = %remote_id, "recovered record not found");
                        self.create(catalog, report, properties).await
                    }
                    UpdateStatus::Error(message) => {
                        warn!(item_id, remote_id = %remote_id, error = %message, "update of recovered record failed");
                        report.finish(ItemOutcome::Failed)
                    }
                }
            }
            Resolution::Unmatched { stale } => {
                if stale.is_some() && clear_reference(catalog, item_id) {
                    report.cleared = true;
                }
                self.create(catalog, report, properties).await
            }
        }
    }
}
