//! Category creation and item moves between category containers.

use tracing::debug;

use crate::catalog::Catalog;
use crate::key::{slugify, uniquify, DEFAULT_CATEGORY_SLUG};
use crate::model::Category;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnsuredCategory {
    pub id: String,
    pub created: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MoveOutcome {
    Moved,
    AlreadyInPlace,
    ItemNotFound,
    CategoryNotFound,
}

impl Catalog {
    /// Returns the category whose name matches exactly, creating it when
    /// absent. New ids are slugs of the name, suffixed `-2`, `-3`, ... on
    /// collision; icon is the kind default and order is the append position.
    pub fn ensure_category(&mut self, name: &str) -> EnsuredCategory {
        if let Some(existing) = self.category_by_name(name) {
            return EnsuredCategory {
                id: existing.id.clone(),
                created: false,
            };
        }
        let base = slugify(name, DEFAULT_CATEGORY_SLUG);
        let id = uniquify(&base, |candidate| {
            self.categories.iter().any(|c| c.id == candidate)
        });
        let mut category = Category::new(id.clone(), name, self.kind().default_icon());
        category.order = self.categories.len() as i64;
        debug!(category_id = %id, name, "created category");
        self.categories.push(category);
        EnsuredCategory { id, created: true }
    }

    /// Pops the item with `item_id` out of `from` and appends it to `to`.
    pub fn move_item(&mut self, item_id: &str, from: &str, to: &str) -> MoveOutcome {
        let (Some(from_index), Some(to_index)) = (self.category_index(from), self.category_index(to))
        else {
            return MoveOutcome::CategoryNotFound;
        };
        if self.categories[to_index].position_of(item_id).is_some() {
            return MoveOutcome::AlreadyInPlace;
        }
        let Some(position) = self.categories[from_index].position_of(item_id) else {
            return MoveOutcome::ItemNotFound;
        };
        let mut item = self.categories[from_index].items.remove(position);
        item.order = self.categories[to_index].items.len() as i64;
        self.categories[to_index].items.push(item);
        self.locations.insert(item_id.to_string(), to_index);
        MoveOutcome::Moved
    }

    /// Moves an item from wherever it currently lives into `to`.
    pub fn relocate(&mut self, item_id: &str, to: &str) -> MoveOutcome {
        let Some(from) = self.category_of(item_id).map(|c| c.id.clone()) else {
            return MoveOutcome::ItemNotFound;
        };
        self.move_item(item_id, &from, to)
    }
}

#[cfg(test)]
mod tests {
    use crate::model::{CatalogKind, Item};
    use crate::{Catalog, Category, MoveOutcome};

    fn catalog_with(items: &[&str]) -> Catalog {
        let mut inbox = Category::new("uncategorized", "Uncategorized", "📁");
        inbox.items = items
            .iter()
            .map(|id| Item {
                id: id.to_string(),
                title: "same".into(),
                ..Default::default()
            })
            .collect();
        Catalog::from_categories(CatalogKind::Projects, vec![inbox])
    }

    #[test]
    fn slugs_fold_case_and_whitespace_into_suffixed_ids() {
        let mut catalog = Catalog::new(CatalogKind::Projects);
        let ids: Vec<String> = ["AI", "ai", "AI "]
            .into_iter()
            .map(|name| catalog.ensure_category(name).id)
            .collect();
        assert_eq!(ids, vec!["ai", "ai-2", "ai-3"]);

        let again = catalog.ensure_category("ai");
        assert_eq!(again.id, "ai-2");
        assert!(!again.created);
        assert_eq!(catalog.categories().len(), 3);
        assert_eq!(catalog.categories()[2].order, 2);
    }

    #[test]
    fn unsluggable_names_use_placeholder_id() {
        let mut catalog = Catalog::new(CatalogKind::Papers);
        let first = catalog.ensure_category("???");
        let second = catalog.ensure_category("!!!");
        assert_eq!(first.id, "category");
        assert_eq!(second.id, "category-2");
        assert_eq!(catalog.categories()[0].icon, "📚");
    }

    #[test]
    fn move_keeps_item_in_exactly_one_place() {
        let mut catalog = catalog_with(&["a", "b", "c"]);
        let infra = catalog.ensure_category("Infra").id;
        let before = catalog.item_count();

        assert_eq!(catalog.move_item("b", "uncategorized", &infra), MoveOutcome::Moved);
        assert_eq!(catalog.item_count(), before);
        let inbox = catalog.category("uncategorized").unwrap();
        assert!(inbox.position_of("b").is_none());
        let target = catalog.category(&infra).unwrap();
        assert_eq!(target.items.iter().filter(|i| i.id == "b").count(), 1);
        assert_eq!(catalog.category_of("b").map(|c| c.id.as_str()), Some("infra"));

        assert_eq!(
            catalog.move_item("b", "uncategorized", &infra),
            MoveOutcome::AlreadyInPlace
        );
        assert_eq!(catalog.relocate("a", &infra), MoveOutcome::Moved);
        assert_eq!(catalog.relocate("zzz", &infra), MoveOutcome::ItemNotFound);
        assert_eq!(catalog.move_item("c", "uncategorized", "nope"), MoveOutcome::CategoryNotFound);
        assert_eq!(catalog.item_count(), before);
    }
}
