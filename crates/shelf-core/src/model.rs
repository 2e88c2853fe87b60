use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::key::{arxiv_urls, identity_keys, parse_arxiv_id, slugify, NormalizedKey};

/// Sort position given to rows without a usable `order` value.
pub const UNSORTED_ORDER: i64 = 999_999;

/// Which flavour of catalog is being synced. Both share the engine; they
/// differ in sheet names, icons, identity keys and required fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CatalogKind {
    #[default]
    Projects,
    Papers,
}

impl CatalogKind {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "projects" | "project" => Some(Self::Projects),
            "papers" | "paper" => Some(Self::Papers),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Projects => "projects",
            Self::Papers => "papers",
        }
    }

    /// Sheet name of the item record set.
    pub fn items_sheet(&self) -> &'static str {
        self.as_str()
    }

    pub fn default_icon(&self) -> &'static str {
        match self {
            Self::Projects => "📁",
            Self::Papers => "📚",
        }
    }

    pub fn default_catalog_file(&self) -> &'static str {
        match self {
            Self::Projects => "data/projects.xlsx",
            Self::Papers => "data/papers.xlsx",
        }
    }

    pub fn legacy_file_name(&self) -> &'static str {
        match self {
            Self::Projects => "projects.json",
            Self::Papers => "papers.json",
        }
    }

    /// Free-form attribute columns every catalog of this kind carries.
    pub fn attribute_columns(&self) -> &'static [&'static str] {
        match self {
            Self::Projects => &[],
            Self::Papers => &["authors", "venue", "year", "doi", "status", "rating"],
        }
    }

    /// Fields that must be populated before `create_only` considers an item done.
    pub fn required_fields(&self) -> &'static [ItemField] {
        match self {
            Self::Projects => &[ItemField::Title, ItemField::Description, ItemField::PrimaryLink],
            Self::Papers => &[
                ItemField::Title,
                ItemField::PrimaryLink,
                ItemField::Attribute("authors"),
            ],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ItemField {
    Title,
    Description,
    PrimaryLink,
    SecondaryLinks,
    Tags,
    ExternalId,
    Attribute(&'static str),
}

/// A project or paper. Owned by exactly one [`Category`].
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Item {
    pub id: String,
    pub title: String,
    pub description: String,
    pub primary_link: String,
    #[serde(default)]
    pub secondary_links: Vec<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub external_id: String,
    /// Claimed remote record id; empty when unknown.
    #[serde(default)]
    pub remote_record_id: String,
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
    #[serde(default)]
    pub order: i64,
}

impl Item {
    pub fn reference(&self) -> Option<&str> {
        let trimmed = self.remote_record_id.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed)
        }
    }

    pub fn has_reference(&self) -> bool {
        self.reference().is_some()
    }

    pub fn clear_reference(&mut self) -> Option<String> {
        if self.has_reference() {
            Some(std::mem::take(&mut self.remote_record_id))
        } else {
            self.remote_record_id.clear();
            None
        }
    }

    pub fn attribute(&self, key: &str) -> &str {
        self.attributes.get(key).map(String::as_str).unwrap_or("")
    }

    pub fn is_field_empty(&self, field: ItemField) -> bool {
        match field {
            ItemField::Title => self.title.trim().is_empty(),
            ItemField::Description => self.description.trim().is_empty(),
            ItemField::PrimaryLink => self.primary_link.trim().is_empty(),
            ItemField::SecondaryLinks => self.secondary_links.iter().all(|l| l.trim().is_empty()),
            ItemField::Tags => self.tags.is_empty(),
            ItemField::ExternalId => self.external_id.trim().is_empty(),
            ItemField::Attribute(key) => self.attribute(key).trim().is_empty(),
        }
    }

    pub fn missing_required(&self, kind: CatalogKind) -> Vec<ItemField> {
        kind.required_fields()
            .iter()
            .copied()
            .filter(|f| self.is_field_empty(*f))
            .collect()
    }

    pub fn identity_keys(&self, kind: CatalogKind) -> Vec<NormalizedKey> {
        identity_keys(kind, &self.primary_link, &self.external_id)
    }

    /// Deterministic id: projects use the last link segment, papers the arXiv
    /// id, DOI, title or link slug in that order.
    pub fn derive_id(&self, kind: CatalogKind) -> String {
        match kind {
            CatalogKind::Projects => {
                let tail = self
                    .primary_link
                    .trim()
                    .trim_end_matches('/')
                    .rsplit('/')
                    .next()
                    .unwrap_or_default()
                    .to_lowercase();
                if tail.is_empty() {
                    slugify(&self.title, "project")
                } else {
                    tail
                }
            }
            CatalogKind::Papers => {
                let source = [
                    self.external_id.as_str(),
                    self.attribute("doi"),
                    self.title.as_str(),
                    self.primary_link.as_str(),
                ]
                .into_iter()
                .find(|s| !s.trim().is_empty())
                .unwrap_or_default();
                slugify(source, "paper")
            }
        }
    }

    /// Trims text fields, cleans tags, fills arXiv-derived fields for papers
    /// and derives a missing id.
    pub fn normalize(&mut self, kind: CatalogKind) {
        self.id = self.id.trim().to_string();
        self.title = self.title.trim().to_string();
        self.description = self.description.trim().to_string();
        self.primary_link = self.primary_link.trim().to_string();
        self.external_id = self.external_id.trim().to_string();
        self.remote_record_id = self.remote_record_id.trim().to_string();
        self.secondary_links = self
            .secondary_links
            .iter()
            .map(|l| l.trim().to_string())
            .collect();
        while self.secondary_links.last().is_some_and(|l| l.is_empty()) {
            self.secondary_links.pop();
        }
        self.tags = clean_tags(std::mem::take(&mut self.tags));
        self.attributes.retain(|_, v| {
            *v = v.trim().to_string();
            true
        });

        if kind == CatalogKind::Papers {
            let pdf = self.secondary_links.first().cloned().unwrap_or_default();
            if let Some(arxiv) = parse_arxiv_id(&[self.external_id.as_str(), self.primary_link.as_str(), pdf.as_str()]) {
                self.external_id = arxiv;
            }
            if let Some((abs, pdf_url)) = arxiv_urls(&self.external_id)
                .filter(|_| parse_arxiv_id(&[self.external_id.as_str()]).is_some())
            {
                if self.primary_link.is_empty() {
                    self.primary_link = abs;
                }
                if pdf.is_empty() {
                    if self.secondary_links.is_empty() {
                        self.secondary_links.push(pdf_url);
                    } else {
                        self.secondary_links[0] = pdf_url;
                    }
                }
            }
        }

        if self.id.is_empty() {
            self.id = self.derive_id(kind);
        }
    }
}

fn clean_tags(tags: Vec<String>) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(tags.len());
    for tag in tags {
        let tag = tag.trim();
        if !tag.is_empty() && !out.iter().any(|t| t == tag) {
            out.push(tag.to_string());
        }
    }
    out
}

/// Parses a stored tag cell: comma separated, or a JSON array string.
pub fn parse_tag_list(raw: &str) -> Vec<String> {
    let text = raw.trim();
    if text.is_empty() {
        return Vec::new();
    }
    if text.starts_with('[') && text.ends_with(']') {
        if let Ok(values) = serde_json::from_str::<Vec<serde_json::Value>>(text) {
            return clean_tags(
                values
                    .into_iter()
                    .map(|v| match v {
                        serde_json::Value::String(s) => s,
                        other => other.to_string(),
                    })
                    .collect(),
            );
        }
    }
    clean_tags(text.split(',').map(str::to_string).collect())
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Category {
    pub id: String,
    pub name: String,
    pub icon: String,
    pub order: i64,
    #[serde(default)]
    pub items: Vec<Item>,
}

impl Category {
    pub fn new(id: impl Into<String>, name: impl Into<String>, icon: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            icon: icon.into(),
            order: 0,
            items: Vec::new(),
        }
    }

    pub fn position_of(&self, item_id: &str) -> Option<usize> {
        self.items.iter().position(|i| i.id == item_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tag_cells_accept_commas_and_json_arrays() {
        assert_eq!(parse_tag_list("rust, cli , ,rust"), vec!["rust", "cli"]);
        assert_eq!(parse_tag_list(r#"["async", " io ", ""]"#), vec!["async", "io"]);
        assert!(parse_tag_list("   ").is_empty());
    }

    #[test]
    fn project_ids_derive_from_link_tail() {
        let mut item = Item {
            primary_link: "https://github.com/BurntSushi/ripgrep/".into(),
            ..Default::default()
        };
        item.normalize(CatalogKind::Projects);
        assert_eq!(item.id, "ripgrep");
    }

    #[test]
    fn papers_fill_links_from_arxiv_identifier() {
        let mut item = Item {
            title: " Attention Is All You Need ".into(),
            external_id: "1706.03762v7".into(),
            ..Default::default()
        };
        item.normalize(CatalogKind::Papers);
        assert_eq!(item.external_id, "1706.03762");
        assert_eq!(item.primary_link, "https://arxiv.org/abs/1706.03762");
        assert_eq!(item.secondary_links, vec!["https://arxiv.org/pdf/1706.03762.pdf"]);
        assert_eq!(item.id, "1706-03762");
        assert_eq!(item.title, "Attention Is All You Need");
    }

    #[test]
    fn required_fields_depend_on_kind() {
        let item = Item {
            title: "t".into(),
            primary_link: "https://x".into(),
            ..Default::default()
        };
        assert_eq!(item.missing_required(CatalogKind::Projects), vec![ItemField::Description]);
        assert_eq!(
            item.missing_required(CatalogKind::Papers),
            vec![ItemField::Attribute("authors")]
        );
    }
}
