//! Logical catalog fields to remote property names, per catalog kind.

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::Context;
use serde::{Deserialize, Serialize};
use shelf_core::{CatalogKind, ItemFields, KeyKind};

use crate::api::RemotePage;
use crate::property::PropertyType;

/// A remote record viewed through the property map. Read-only.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteRecord {
    pub remote_id: String,
    pub page: RemotePage,
    /// Category label; empty when the record has none.
    pub category_name: String,
}

/// Property that carries an identity key, and the types it must have for
/// exact lookups to be trusted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeySpec {
    pub property: String,
    pub key_kind: KeyKind,
    pub expected: &'static [PropertyType],
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PropertyMap {
    pub title: String,
    pub primary_link: String,
    pub description: String,
    pub tags: String,
    pub category: String,
    /// Empty when the kind has no external identifier.
    pub external_id: String,
    /// Positional: first entry receives the first secondary link.
    pub secondary_links: Vec<String>,
    /// Item attribute key to property name.
    pub attributes: BTreeMap<String, String>,
    /// Enrichment key to property name; these are written, never read back.
    pub enrichment: BTreeMap<String, String>,
    pub tag_limit: usize,
}

/// Partial override read from YAML; absent keys keep the defaults.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PropertyMapOverride {
    pub title: Option<String>,
    pub primary_link: Option<String>,
    pub description: Option<String>,
    pub tags: Option<String>,
    pub category: Option<String>,
    pub external_id: Option<String>,
    pub secondary_links: Option<Vec<String>>,
    pub attributes: BTreeMap<String, String>,
    pub enrichment: BTreeMap<String, String>,
    pub tag_limit: Option<usize>,
}

fn string_map(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

impl PropertyMap {
    pub fn for_kind(kind: CatalogKind) -> Self {
        match kind {
            CatalogKind::Projects => Self {
                title: "Name".into(),
                primary_link: "GitHub".into(),
                description: "Description".into(),
                tags: "Topics".into(),
                category: "Category".into(),
                external_id: String::new(),
                secondary_links: Vec::new(),
                attributes: BTreeMap::new(),
                enrichment: string_map(&[
                    ("stars", "Stars"),
                    ("forks", "Forks"),
                    ("watchers", "Watchers"),
                    ("open_issues", "Open Issues"),
                    ("language", "Language"),
                    ("license", "License"),
                    ("updated_at", "Last Updated"),
                    ("pushed_at", "Last Pushed"),
                    ("owner", "Owner"),
                    ("status", "Status"),
                ]),
                tag_limit: 10,
            },
            CatalogKind::Papers => Self {
                title: "Title".into(),
                primary_link: "Paper URL".into(),
                description: "Notes".into(),
                tags: "Keywords".into(),
                category: "Category".into(),
                external_id: "arXiv ID".into(),
                secondary_links: vec!["PDF URL".into(), "Code URL".into()],
                attributes: string_map(&[
                    ("authors", "Authors"),
                    ("year", "Year"),
                    ("venue", "Venue"),
                    ("status", "Status"),
                    ("rating", "Rating"),
                    ("doi", "DOI"),
                ]),
                enrichment: BTreeMap::new(),
                tag_limit: 20,
            },
        }
    }

    pub fn overlay(mut self, over: PropertyMapOverride) -> Self {
        let PropertyMapOverride {
            title,
            primary_link,
            description,
            tags,
            category,
            external_id,
            secondary_links,
            attributes,
            enrichment,
            tag_limit,
        } = over;
        if let Some(v) = title {
            self.title = v;
        }
        if let Some(v) = primary_link {
            self.primary_link = v;
        }
        if let Some(v) = description {
            self.description = v;
        }
        if let Some(v) = tags {
            self.tags = v;
        }
        if let Some(v) = category {
            self.category = v;
        }
        if let Some(v) = external_id {
            self.external_id = v;
        }
        if let Some(v) = secondary_links {
            self.secondary_links = v;
        }
        self.attributes.extend(attributes);
        self.enrichment.extend(enrichment);
        if let Some(v) = tag_limit {
            self.tag_limit = v;
        }
        self
    }

    /// Defaults for `kind`, overlaid with the YAML file at `path` if given.
    pub fn load(kind: CatalogKind, path: Option<&Path>) -> anyhow::Result<Self> {
        let defaults = Self::for_kind(kind);
        let Some(path) = path else {
            return Ok(defaults);
        };
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading property map {}", path.display()))?;
        let over: PropertyMapOverride = serde_yaml::from_str(&raw)
            .with_context(|| format!("parsing property map {}", path.display()))?;
        Ok(defaults.overlay(over))
    }

    /// Identity-bearing properties in match precedence order.
    pub fn key_specs(&self, kind: CatalogKind) -> Vec<KeySpec> {
        let mut specs = Vec::new();
        if kind == CatalogKind::Papers && !self.external_id.is_empty() {
            specs.push(KeySpec {
                property: self.external_id.clone(),
                key_kind: KeyKind::External,
                expected: &[PropertyType::RichText, PropertyType::Title],
            });
        }
        specs.push(KeySpec {
            property: self.primary_link.clone(),
            key_kind: KeyKind::Link,
            expected: &[PropertyType::Url],
        });
        specs
    }

    fn text(&self, page: &RemotePage, property: &str) -> String {
        if property.is_empty() {
            return String::new();
        }
        page.property(property)
            .map(|v| v.as_text().trim().to_string())
            .unwrap_or_default()
    }

    pub fn record(&self, page: RemotePage) -> RemoteRecord {
        let category_name = page
            .property(&self.category)
            .map(|v| v.label())
            .unwrap_or_default();
        RemoteRecord {
            remote_id: page.id.clone(),
            page,
            category_name,
        }
    }

    /// Local field values a remote record can offer.
    pub fn fields(&self, record: &RemoteRecord) -> ItemFields {
        let page = &record.page;
        let mut secondary_links: Vec<String> = self
            .secondary_links
            .iter()
            .map(|property| self.text(page, property))
            .collect();
        while secondary_links.last().is_some_and(|l| l.is_empty()) {
            secondary_links.pop();
        }
        ItemFields {
            title: self.text(page, &self.title),
            description: self.text(page, &self.description),
            primary_link: self.text(page, &self.primary_link),
            secondary_links,
            tags: page
                .property(&self.tags)
                .map(|v| v.as_list())
                .unwrap_or_default(),
            external_id: self.text(page, &self.external_id),
            attributes: self
                .attributes
                .iter()
                .map(|(key, property)| (key.clone(), self.text(page, property)))
                .filter(|(_, value)| !value.is_empty())
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::property::PropertyValue;

    #[test]
    fn yaml_override_replaces_named_properties_only() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("map.yaml");
        std::fs::write(
            &path,
            "title: 名称\nprimary_link: GitHub 链接\ncategory: 分类\nenrichment:\n  stars: Stars_init\n",
        )
        .unwrap();
        let map = PropertyMap::load(CatalogKind::Projects, Some(&path)).unwrap();
        assert_eq!(map.title, "名称");
        assert_eq!(map.primary_link, "GitHub 链接");
        assert_eq!(map.category, "分类");
        assert_eq!(map.description, "Description");
        assert_eq!(map.enrichment.get("stars").map(String::as_str), Some("Stars_init"));
        assert_eq!(map.enrichment.get("forks").map(String::as_str), Some("Forks"));

        std::fs::write(&path, "titel: typo\n").unwrap();
        assert!(PropertyMap::load(CatalogKind::Projects, Some(&path)).is_err());
    }

    #[test]
    fn papers_match_on_external_id_before_link() {
        let map = PropertyMap::for_kind(CatalogKind::Papers);
        let specs = map.key_specs(CatalogKind::Papers);
        assert_eq!(specs.len(), 2);
        assert_eq!(specs[0].key_kind, KeyKind::External);
        assert_eq!(specs[1].property, "Paper URL");
    }

    #[test]
    fn records_expose_category_label_and_fields() {
        let map = PropertyMap::for_kind(CatalogKind::Papers);
        let mut properties = crate::api::Properties::new();
        properties.insert("Title".into(), PropertyValue::Title("Attention".into()));
        properties.insert("Category".into(), PropertyValue::Select("NLP".into()));
        properties.insert("Keywords".into(), PropertyValue::MultiSelect(vec!["transformer".into()]));
        properties.insert("Code URL".into(), PropertyValue::Url("https://github.com/x/y".into()));
        properties.insert("Year".into(), PropertyValue::Number(Some(2017.0)));
        let record = map.record(RemotePage {
            id: "r1".into(),
            properties,
        });
        assert_eq!(record.category_name, "NLP");
        let fields = map.fields(&record);
        assert_eq!(fields.title, "Attention");
        assert_eq!(fields.tags, vec!["transformer"]);
        assert_eq!(fields.secondary_links, vec!["", "https://github.com/x/y"]);
        assert_eq!(fields.attributes.get("year").map(String::as_str), Some("2017"));
    }
}
