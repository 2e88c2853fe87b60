use std::collections::{HashMap, HashSet};

use thiserror::Error;

use crate::key::{uniquify, NormalizedKey};
use crate::model::{CatalogKind, Category, Item};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CatalogError {
    #[error("unknown category `{0}`")]
    UnknownCategory(String),
    #[error("unknown item `{0}`")]
    UnknownItem(String),
}

/// The whole local hierarchy. Category ids and item ids are unique; every
/// item lives in exactly one category, tracked by `locations`.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Catalog {
    kind: CatalogKind,
    pub(crate) categories: Vec<Category>,
    /// item id -> index into `categories`
    pub(crate) locations: HashMap<String, usize>,
}

impl Catalog {
    pub fn new(kind: CatalogKind) -> Self {
        Self {
            kind,
            categories: Vec::new(),
            locations: HashMap::new(),
        }
    }

    /// Builds a catalog from loaded categories, suffixing any duplicate
    /// category or item ids so both stay unique.
    pub fn from_categories(kind: CatalogKind, categories: Vec<Category>) -> Self {
        let mut catalog = Self::new(kind);
        let mut category_ids = HashSet::new();
        let mut item_ids = HashSet::new();
        for mut category in categories {
            category.id = uniquify(&category.id, |c| category_ids.contains(c));
            category_ids.insert(category.id.clone());
            let index = catalog.categories.len();
            for item in &mut category.items {
                item.id = uniquify(&item.id, |c| item_ids.contains(c));
                item_ids.insert(item.id.clone());
                catalog.locations.insert(item.id.clone(), index);
            }
            catalog.categories.push(category);
        }
        catalog
    }

    pub fn kind(&self) -> CatalogKind {
        self.kind
    }

    pub fn categories(&self) -> &[Category] {
        &self.categories
    }

    pub fn category(&self, id: &str) -> Option<&Category> {
        self.categories.iter().find(|c| c.id == id)
    }

    pub fn category_by_name(&self, name: &str) -> Option<&Category> {
        self.categories.iter().find(|c| c.name == name)
    }

    pub(crate) fn category_index(&self, id: &str) -> Option<usize> {
        self.categories.iter().position(|c| c.id == id)
    }

    pub fn item(&self, id: &str) -> Option<&Item> {
        let index = *self.locations.get(id)?;
        self.categories[index].items.iter().find(|i| i.id == id)
    }

    pub fn item_mut(&mut self, id: &str) -> Option<&mut Item> {
        let index = *self.locations.get(id)?;
        self.categories[index].items.iter_mut().find(|i| i.id == id)
    }

    pub fn category_of(&self, item_id: &str) -> Option<&Category> {
        self.locations
            .get(item_id)
            .map(|index| &self.categories[*index])
    }

    /// Snapshot of item ids in catalog order; stable while items move.
    pub fn item_ids(&self) -> Vec<String> {
        self.items().map(|(_, item)| item.id.clone()).collect()
    }

    pub fn items(&self) -> impl Iterator<Item = (&Category, &Item)> {
        self.categories
            .iter()
            .flat_map(|c| c.items.iter().map(move |i| (c, i)))
    }

    pub fn item_count(&self) -> usize {
        self.categories.iter().map(|c| c.items.len()).sum()
    }

    pub fn contains_item(&self, id: &str) -> bool {
        self.locations.contains_key(id)
    }

    pub fn find_item_by_reference(&self, remote_id: &str) -> Option<&Item> {
        let wanted = remote_id.trim();
        if wanted.is_empty() {
            return None;
        }
        self.items()
            .map(|(_, item)| item)
            .find(|item| item.reference() == Some(wanted))
    }

    /// First item (catalog order) whose identity keys include `key`.
    pub fn find_item_by_key(&self, key: &NormalizedKey) -> Option<&Item> {
        let kind = self.kind;
        self.items()
            .map(|(_, item)| item)
            .find(|item| item.identity_keys(kind).contains(key))
    }

    /// Appends `item` to the category, suffixing its id if already taken.
    /// Returns the id the item ended up with.
    pub fn insert_item(&mut self, category_id: &str, mut item: Item) -> Result<String, CatalogError> {
        let index = self
            .category_index(category_id)
            .ok_or_else(|| CatalogError::UnknownCategory(category_id.to_string()))?;
        if item.id.trim().is_empty() {
            item.id = item.derive_id(self.kind);
        }
        item.id = uniquify(&item.id, |c| self.locations.contains_key(c));
        item.order = self.categories[index].items.len() as i64;
        let id = item.id.clone();
        self.locations.insert(id.clone(), index);
        self.categories[index].items.push(item);
        Ok(id)
    }
}
