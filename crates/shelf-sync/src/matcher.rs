//! Resolves a local item to at most one remote record.

use std::sync::Arc;

use shelf_core::{CatalogKind, Item, KeyKind, NormalizedKey};
use shelf_remote::{
    KeySpec, Properties, PropertyMap, PropertyType, QueryFilter, RemoteApi, Schema, UpdateStatus,
};
use tracing::{debug, warn};

use crate::index::RemoteIndex;

/// Outcome of checking a stored reference with an update call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReferenceCheck {
    /// The update landed; the reference is valid.
    Confirmed,
    /// The remote reports the record missing; the reference must be cleared.
    Stale,
    /// Ambiguous failure; nothing else may be tried for this item.
    Transient(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// Update against the stored reference succeeded.
    Confirmed(String),
    /// Found by identity key. `stale` carries a reference invalidated on the way.
    Found {
        remote_id: String,
        stale: Option<String>,
    },
    Unmatched { stale: Option<String> },
    Transient(String),
}

pub struct IdentityMatcher {
    api: Arc<dyn RemoteApi>,
    kind: CatalogKind,
    /// Key properties a text `equals` filter can run against, with the type
    /// the schema reports for them.
    filterable: Vec<(KeySpec, PropertyType)>,
}

impl IdentityMatcher {
    pub fn new(api: Arc<dyn RemoteApi>, map: &PropertyMap, kind: CatalogKind, schema: &Schema) -> Self {
        let filterable = map
            .key_specs(kind)
            .into_iter()
            .filter_map(|spec| {
                let ptype = schema.get(&spec.property).copied()?;
                ptype.is_text_like().then_some((spec, ptype))
            })
            .collect();
        Self {
            api,
            kind,
            filterable,
        }
    }

    pub async fn check_reference(&self, reference: &str, properties: &Properties) -> ReferenceCheck {
        match self.api.update_record(reference, properties).await {
            UpdateStatus::Ok => ReferenceCheck::Confirmed,
            UpdateStatus::NotFound => ReferenceCheck::Stale,
            UpdateStatus::Error(message) => ReferenceCheck::Transient(message),
        }
    }

    /// Key-based lookup: the index when it is usable, otherwise one filtered
    /// query per key. `Err` means a lookup failed and the item must not be
    /// treated as unmatched.
    pub async fn lookup(&self, item: &Item, index: &RemoteIndex) -> Result<Option<String>, String> {
        if !index.is_degraded() {
            return Ok(index.resolve(item, self.kind).map(|(_, id)| id.to_string()));
        }
        for key in item.identity_keys(self.kind) {
            let Some((spec, ptype)) = self.filterable.iter().find(|(s, _)| s.key_kind == key.kind())
            else {
                continue;
            };
            let equals = match key.kind() {
                KeyKind::Link => item.primary_link.trim().to_string(),
                KeyKind::External => key.as_str().to_string(),
            };
            let filter = QueryFilter {
                property: spec.property.clone(),
                ptype: *ptype,
                equals,
            };
            let page = self
                .api
                .query(Some(&filter), 10, None)
                .await
                .map_err(|e| e.to_string())?;
            let hit = page.records.into_iter().find(|record| {
                record
                    .property(&spec.property)
                    .and_then(|value| NormalizedKey::from_kind(key.kind(), &value.as_text()))
                    .is_some_and(|found| found == key)
            });
            if let Some(record) = hit {
                debug!(item_id = %item.id, remote_id = %record.id, %key, "matched by filtered query");
                return Ok(Some(record.id));
            }
        }
        Ok(None)
    }

    /// Full precedence chain: stored reference, then identity key, then none.
    pub async fn resolve(&self, item: &Item, properties: &Properties, index: &RemoteIndex) -> Resolution {
        let mut stale = None;
        if let Some(reference) = item.reference() {
            match self.check_reference(reference, properties).await {
                ReferenceCheck::Confirmed => return Resolution::Confirmed(reference.to_string()),
                ReferenceCheck::Transient(message) => return Resolution::Transient(message),
                ReferenceCheck::Stale => {
                    warn!(item_id = %item.id, remote_id = reference, "stored reference not found");
                    stale = Some(reference.to_string());
                }
            }
        }
        match self.lookup(item, index).await {
            Ok(Some(remote_id)) if Some(&remote_id) != stale.as_ref() => {
                Resolution::Found { remote_id, stale }
            }
            Ok(_) => Resolution::Unmatched { stale },
            Err(message) => Resolution::Transient(message),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shelf_remote::{InMemoryRemote, PropertyValue};

    fn schema(link_type: PropertyType) -> Schema {
        [
            ("Name".to_string(), PropertyType::Title),
            ("GitHub".to_string(), link_type),
        ]
        .into_iter()
        .collect()
    }

    fn item(link: &str, reference: &str) -> Item {
        Item {
            id: "fd".into(),
            title: "fd".into(),
            primary_link: link.into(),
            remote_record_id: reference.into(),
            ..Item::default()
        }
    }

    #[tokio::test]
    async fn transient_reference_failure_stops_matching() {
        let remote = Arc::new(InMemoryRemote::new(schema(PropertyType::Url)));
        let mut props = Properties::new();
        props.insert("GitHub".into(), PropertyValue::Url("https://github.com/sharkdp/fd".into()));
        remote.insert(props.clone());
        remote.script_update("R1", UpdateStatus::Error("502 bad gateway".into()));

        let map = PropertyMap::for_kind(CatalogKind::Projects);
        let matcher =
            IdentityMatcher::new(remote.clone(), &map, CatalogKind::Projects, &schema(PropertyType::Url));
        let resolution = matcher
            .resolve(&item("https://github.com/sharkdp/fd", "R1"), &props, &RemoteIndex::degraded())
            .await;
        assert_eq!(resolution, Resolution::Transient("502 bad gateway".into()));
        assert_eq!(remote.calls().query, 0);
    }

    #[tokio::test]
    async fn degraded_lookup_verifies_the_normalized_key() {
        let remote = Arc::new(InMemoryRemote::new(schema(PropertyType::RichText)));
        let mut props = Properties::new();
        props.insert("GitHub".into(), PropertyValue::Url("https://github.com/sharkdp/fd".into()));
        let id = remote.insert(props);

        let map = PropertyMap::for_kind(CatalogKind::Projects);
        let matcher = IdentityMatcher::new(
            remote.clone(),
            &map,
            CatalogKind::Projects,
            &schema(PropertyType::RichText),
        );
        let index = RemoteIndex::degraded();
        let found = matcher
            .lookup(&item("https://github.com/sharkdp/fd", ""), &index)
            .await
            .unwrap();
        assert_eq!(found, Some(id));
        let missing = matcher
            .lookup(&item("https://github.com/sharkdp/bat", ""), &index)
            .await
            .unwrap();
        assert_eq!(missing, None);

        remote.fail_queries(true);
        assert!(matcher
            .lookup(&item("https://github.com/sharkdp/fd", ""), &index)
            .await
            .is_err());
    }
}
