//! Full-scan index of remote records by normalized identity key.

use std::collections::HashMap;

use shelf_core::{CatalogKind, Item, KeyKind, NormalizedKey};
use shelf_remote::{KeySpec, PropertyMap, RemoteApi, RemoteError, RemoteRecord, Schema, MAX_PAGE_SIZE};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Default)]
pub struct RemoteIndex {
    /// Ids per key in scan order; the first is authoritative.
    keys: HashMap<NormalizedKey, Vec<String>>,
    records: Vec<RemoteRecord>,
    positions: HashMap<String, usize>,
    duplicates: usize,
    degraded: bool,
}

/// Key specs whose property the schema reports with an expected type.
/// `None` when the link property itself is unusable.
pub fn usable_specs(specs: Vec<KeySpec>, schema: &Schema) -> Option<Vec<KeySpec>> {
    let typed_ok = |spec: &KeySpec| {
        schema
            .get(&spec.property)
            .is_some_and(|ptype| spec.expected.contains(ptype))
    };
    let link_ok = specs
        .iter()
        .filter(|s| s.key_kind == KeyKind::Link)
        .all(typed_ok);
    if !link_ok {
        return None;
    }
    Some(specs.into_iter().filter(|s| typed_ok(s)).collect())
}

impl RemoteIndex {
    /// Index that matches nothing; callers fall back to per-item lookups.
    pub fn degraded() -> Self {
        Self {
            degraded: true,
            ..Self::default()
        }
    }

    /// Scans every remote record, paging until the remote reports no more.
    pub async fn build(
        api: &dyn RemoteApi,
        schema: &Schema,
        map: &PropertyMap,
        kind: CatalogKind,
    ) -> Result<Self, RemoteError> {
        let Some(specs) = usable_specs(map.key_specs(kind), schema) else {
            warn!(
                property = %map.primary_link,
                "link property missing or not url-typed, using per-item lookups"
            );
            return Ok(Self::degraded());
        };

        let mut index = Self::default();
        let mut cursor: Option<String> = None;
        let mut pages = 0usize;
        loop {
            let page = api.query(None, MAX_PAGE_SIZE, cursor.as_deref()).await?;
            pages += 1;
            for record in page.records {
                index.add(map.record(record), &specs);
            }
            match page.next_cursor {
                Some(next) if page.has_more => cursor = Some(next),
                _ => break,
            }
        }

        info!(
            records = index.records.len(),
            keys = index.keys.len(),
            duplicates = index.duplicates,
            pages,
            "remote index built"
        );
        Ok(index)
    }

    fn add(&mut self, record: RemoteRecord, specs: &[KeySpec]) {
        if self.positions.contains_key(&record.remote_id) {
            return;
        }
        for spec in specs {
            let Some(value) = record.page.property(&spec.property) else {
                continue;
            };
            let Some(key) = NormalizedKey::from_kind(spec.key_kind, &value.as_text()) else {
                continue;
            };
            let ids = self.keys.entry(key).or_default();
            if !ids.is_empty() {
                self.duplicates += 1;
                debug!(remote_id = %record.remote_id, first = %ids[0], "duplicate remote key");
            }
            ids.push(record.remote_id.clone());
        }
        self.positions
            .insert(record.remote_id.clone(), self.records.len());
        self.records.push(record);
    }

    /// Records a freshly created remote record so later items resolve to it.
    pub fn insert(&mut self, record: RemoteRecord, map: &PropertyMap, kind: CatalogKind) {
        if self.degraded {
            return;
        }
        self.add(record, &map.key_specs(kind));
    }

    /// Authoritative id for `key`.
    pub fn lookup(&self, key: &NormalizedKey) -> Option<&str> {
        self.keys
            .get(key)
            .and_then(|ids| ids.first())
            .map(String::as_str)
    }

    /// Every id sharing `key`, in scan order.
    pub fn lookup_all(&self, key: &NormalizedKey) -> &[String] {
        self.keys.get(key).map(Vec::as_slice).unwrap_or_default()
    }

    /// First key of `item` (precedence order) that resolves, and its id.
    pub fn resolve(&self, item: &Item, kind: CatalogKind) -> Option<(NormalizedKey, &str)> {
        item.identity_keys(kind)
            .into_iter()
            .find_map(|key| self.lookup(&key).map(|id| (key, id)))
    }

    pub fn record(&self, remote_id: &str) -> Option<&RemoteRecord> {
        self.positions
            .get(remote_id)
            .map(|position| &self.records[*position])
    }

    pub fn records(&self) -> &[RemoteRecord] {
        &self.records
    }

    pub fn contains(&self, remote_id: &str) -> bool {
        self.positions.contains_key(remote_id)
    }

    /// Records that shared a key with an earlier record.
    pub fn duplicate_count(&self) -> usize {
        self.duplicates
    }

    pub fn is_degraded(&self) -> bool {
        self.degraded
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shelf_remote::{InMemoryRemote, Properties, PropertyType, PropertyValue};

    fn schema() -> Schema {
        [
            ("Name".to_string(), PropertyType::Title),
            ("GitHub".to_string(), PropertyType::Url),
            ("Category".to_string(), PropertyType::Select),
        ]
        .into_iter()
        .collect()
    }

    fn record(name: &str, link: &str) -> Properties {
        let mut props = Properties::new();
        props.insert("Name".into(), PropertyValue::Title(name.into()));
        props.insert("GitHub".into(), PropertyValue::Url(link.into()));
        props
    }

    #[tokio::test]
    async fn paginates_to_exhaustion_and_keeps_first_duplicate() {
        let remote = InMemoryRemote::new(schema());
        for n in 0..230 {
            remote.insert(record(&format!("p{n}"), &format!("https://github.com/o/p{n}")));
        }
        let first = remote.insert(record("dup-a", "https://github.com/o/dup"));
        remote.insert(record("dup-b", "https://GitHub.com/o/dup/"));
        remote.insert(record("no-link", ""));

        let map = PropertyMap::for_kind(CatalogKind::Projects);
        let index = RemoteIndex::build(&remote, &schema(), &map, CatalogKind::Projects)
            .await
            .unwrap();

        assert_eq!(remote.calls().query, 3);
        assert_eq!(index.len(), 233);
        assert!(!index.is_degraded());
        let key = NormalizedKey::from_link("https://github.com/o/dup").unwrap();
        assert_eq!(index.lookup(&key), Some(first.as_str()));
        assert_eq!(index.lookup_all(&key).len(), 2);
        assert_eq!(index.duplicate_count(), 1);
    }

    fn paper_schema(arxiv: PropertyType, link: PropertyType) -> Schema {
        [
            ("Title".to_string(), PropertyType::Title),
            ("Paper URL".to_string(), link),
            ("arXiv ID".to_string(), arxiv),
        ]
        .into_iter()
        .collect()
    }

    fn paper(title: &str, arxiv: &str, link: &str) -> Properties {
        let mut props = Properties::new();
        props.insert("Title".into(), PropertyValue::Title(title.into()));
        props.insert("arXiv ID".into(), PropertyValue::RichText(arxiv.into()));
        props.insert("Paper URL".into(), PropertyValue::Url(link.into()));
        props
    }

    #[test]
    fn external_key_needs_a_text_property() {
        let map = PropertyMap::for_kind(CatalogKind::Papers);
        let specs = |schema: &Schema| usable_specs(map.key_specs(CatalogKind::Papers), schema);

        let both = specs(&paper_schema(PropertyType::RichText, PropertyType::Url)).unwrap();
        assert_eq!(both.len(), 2);
        let titled = specs(&paper_schema(PropertyType::Title, PropertyType::Url)).unwrap();
        assert_eq!(titled[0].key_kind, KeyKind::External);

        let link_only = specs(&paper_schema(PropertyType::Select, PropertyType::Url)).unwrap();
        assert_eq!(link_only.len(), 1);
        assert_eq!(link_only[0].key_kind, KeyKind::Link);

        assert!(specs(&paper_schema(PropertyType::RichText, PropertyType::RichText)).is_none());
    }

    #[tokio::test]
    async fn papers_resolve_by_arxiv_id_and_count_duplicates_per_key() {
        let schema = paper_schema(PropertyType::RichText, PropertyType::Url);
        let remote = InMemoryRemote::new(schema.clone());
        let first = remote.insert(paper("Attention", "1706.03762v5", "https://arxiv.org/abs/1706.03762"));
        remote.insert(paper("Attention mirror", "1706.03762", "https://papers.example.org/attention"));
        remote.insert(paper("Other", "2401.01234", "https://arxiv.org/abs/1706.03762/"));

        let map = PropertyMap::for_kind(CatalogKind::Papers);
        let index = RemoteIndex::build(&remote, &schema, &map, CatalogKind::Papers)
            .await
            .unwrap();
        assert_eq!(index.len(), 3);
        assert_eq!(index.duplicate_count(), 2);

        let item = Item {
            external_id: "1706.03762".into(),
            primary_link: "https://papers.example.org/attention".into(),
            ..Item::default()
        };
        let (key, id) = index.resolve(&item, CatalogKind::Papers).expect("match");
        assert_eq!(key.kind(), KeyKind::External);
        assert_eq!(id, first);
        let ext = NormalizedKey::from_external("1706.03762v2").unwrap();
        assert_eq!(index.lookup_all(&ext).len(), 2);
    }

    #[tokio::test]
    async fn wrong_link_type_degrades_without_scanning() {
        let mut schema = schema();
        schema.insert("GitHub".into(), PropertyType::RichText);
        let remote = InMemoryRemote::new(schema.clone());
        remote.insert(record("a", "https://github.com/o/a"));

        let map = PropertyMap::for_kind(CatalogKind::Projects);
        let index = RemoteIndex::build(&remote, &schema, &map, CatalogKind::Projects)
            .await
            .unwrap();
        assert!(index.is_degraded());
        assert!(index.is_empty());
        assert_eq!(remote.calls().query, 0);
    }
}
