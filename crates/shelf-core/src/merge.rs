use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::model::Item;

/// Field values offered by a remote record or an enrichment source. Empty
/// strings and empty lists mean "nothing to offer".
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ItemFields {
    pub title: String,
    pub description: String,
    pub primary_link: String,
    pub secondary_links: Vec<String>,
    pub tags: Vec<String>,
    pub external_id: String,
    pub attributes: BTreeMap<String, String>,
}

impl ItemFields {
    pub fn is_empty(&self) -> bool {
        self.title.trim().is_empty()
            && self.description.trim().is_empty()
            && self.primary_link.trim().is_empty()
            && self.secondary_links.iter().all(|l| l.trim().is_empty())
            && self.tags.is_empty()
            && self.external_id.trim().is_empty()
            && self.attributes.values().all(|v| v.trim().is_empty())
    }

    /// Layers `other` under `self`: keeps own values, takes others where empty.
    pub fn or(&self, other: &ItemFields) -> ItemFields {
        let mut layered = Item::default();
        fill(&mut layered, self);
        fill(&mut layered, other);
        ItemFields::from_item(&layered)
    }

    pub fn from_item(item: &Item) -> ItemFields {
        ItemFields {
            title: item.title.clone(),
            description: item.description.clone(),
            primary_link: item.primary_link.clone(),
            secondary_links: item.secondary_links.clone(),
            tags: item.tags.clone(),
            external_id: item.external_id.clone(),
            attributes: item.attributes.clone(),
        }
    }
}

fn fill_text(slot: &mut String, offered: &str) -> bool {
    let offered = offered.trim();
    if slot.trim().is_empty() && !offered.is_empty() {
        *slot = offered.to_string();
        true
    } else {
        false
    }
}

fn fill_list(slot: &mut Vec<String>, offered: &[String]) -> bool {
    let offered: Vec<String> = offered
        .iter()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .collect();
    if slot.iter().all(|v| v.trim().is_empty()) && !offered.is_empty() {
        *slot = offered;
        true
    } else {
        false
    }
}

/// Copies each offered value into `item` only where the item's field is empty.
/// Lists are taken wholesale, never merged element-wise. Returns the number of
/// fields changed.
pub fn fill(item: &mut Item, source: &ItemFields) -> usize {
    let mut changed = 0;
    changed += fill_text(&mut item.title, &source.title) as usize;
    changed += fill_text(&mut item.description, &source.description) as usize;
    changed += fill_text(&mut item.primary_link, &source.primary_link) as usize;
    changed += fill_list(&mut item.secondary_links, &source.secondary_links) as usize;
    changed += fill_list(&mut item.tags, &source.tags) as usize;
    changed += fill_text(&mut item.external_id, &source.external_id) as usize;
    for (key, value) in &source.attributes {
        let slot = item.attributes.entry(key.clone()).or_default();
        changed += fill_text(slot, value) as usize;
    }
    item.attributes.retain(|_, v| !v.is_empty());
    changed
}

/// Forces the title to `title` when it is non-empty and differs.
pub fn override_title(item: &mut Item, title: &str) -> bool {
    let title = title.trim();
    if title.is_empty() || item.title == title {
        return false;
    }
    item.title = title.to_string();
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    fn populated() -> Item {
        let mut item = Item {
            id: "tokio".into(),
            title: "tokio".into(),
            description: "runtime".into(),
            primary_link: "https://github.com/tokio-rs/tokio".into(),
            secondary_links: vec!["https://tokio.rs".into()],
            tags: vec!["async".into()],
            external_id: "x1".into(),
            ..Default::default()
        };
        item.attributes.insert("status".into(), "Active".into());
        item
    }

    #[test]
    fn populated_fields_are_never_touched() {
        let mut item = populated();
        let before = item.clone();
        let mut source = ItemFields {
            title: "Tokio".into(),
            description: "".into(),
            primary_link: "https://elsewhere".into(),
            secondary_links: vec![],
            tags: vec!["io".into(), "net".into()],
            external_id: "x2".into(),
            ..Default::default()
        };
        source.attributes.insert("status".into(), "".into());
        assert_eq!(fill(&mut item, &source), 0);
        assert_eq!(item, before);
    }

    #[test]
    fn empty_fields_take_offered_values() {
        let mut item = Item {
            id: "fd".into(),
            tags: vec![],
            ..Default::default()
        };
        let mut source = ItemFields {
            title: " fd ".into(),
            description: "find entries".into(),
            tags: vec!["cli".into(), " ".into(), "search".into()],
            ..Default::default()
        };
        source.attributes.insert("authors".into(), "David Peter".into());
        source.attributes.insert("venue".into(), " ".into());
        assert_eq!(fill(&mut item, &source), 4);
        assert_eq!(item.title, "fd");
        assert_eq!(item.tags, vec!["cli", "search"]);
        assert_eq!(item.attribute("authors"), "David Peter");
        assert!(!item.attributes.contains_key("venue"));
    }

    #[test]
    fn layered_sources_prefer_the_first() {
        let primary = ItemFields {
            title: "A".into(),
            ..Default::default()
        };
        let fallback = ItemFields {
            title: "B".into(),
            description: "d".into(),
            ..Default::default()
        };
        let merged = primary.or(&fallback);
        assert_eq!(merged.title, "A");
        assert_eq!(merged.description, "d");
        assert!(!merged.is_empty());
    }

    #[test]
    fn title_override_replaces_only_with_content() {
        let mut item = populated();
        assert!(!override_title(&mut item, "  "));
        assert!(override_title(&mut item, "Tokio"));
        assert_eq!(item.title, "Tokio");
        assert!(!override_title(&mut item, "Tokio"));
    }
}
