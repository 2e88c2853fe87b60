//! Column-name tolerant conversion from flat records to catalog rows, shared
//! by the workbook reader and the legacy JSON migration.

use std::collections::{BTreeMap, HashMap};

use shelf_core::{
    normalize_record_id, parse_tag_list, slugify, CatalogKind, Category, Item, UNSORTED_ORDER,
};

pub const UNCATEGORIZED_ID: &str = "uncategorized";
pub const UNCATEGORIZED_NAME: &str = "Uncategorized";

const CATEGORY_ID: &[&str] = &["category_id", "category"];
const ID: &[&str] = &["id"];
const TITLE: &[&str] = &["title", "name"];
const DESCRIPTION: &[&str] = &["description", "notes"];
const PRIMARY_LINK: &[&str] = &["primary_link", "github", "paper_url"];
const SECONDARY_LINKS: &[&str] = &["secondary_links"];
const POSITIONAL_LINKS: &[&str] = &["pdf_url", "code_url"];
const TAGS: &[&str] = &["tags", "topics", "keywords"];
const EXTERNAL_ID: &[&str] = &["external_id", "arxiv_id"];
const REMOTE_RECORD_ID: &[&str] = &["remote_record_id", "notion_page_id"];
const ORDER: &[&str] = &["order"];

fn is_known_column(name: &str) -> bool {
    [
        CATEGORY_ID,
        ID,
        TITLE,
        DESCRIPTION,
        PRIMARY_LINK,
        SECONDARY_LINKS,
        POSITIONAL_LINKS,
        TAGS,
        EXTERNAL_ID,
        REMOTE_RECORD_ID,
        ORDER,
    ]
    .iter()
    .any(|aliases| aliases.contains(&name))
}

/// One flat record: lower-cased column name to cell text.
#[derive(Debug, Clone, Default)]
pub struct RawRecord {
    cells: HashMap<String, String>,
}

impl RawRecord {
    pub fn insert(&mut self, column: &str, value: String) {
        let column = column.trim().to_lowercase();
        if column.is_empty() {
            return;
        }
        self.cells.insert(column, value.trim().to_string());
    }

    /// Value of the first alias present with non-empty content.
    fn first(&self, aliases: &[&str]) -> String {
        aliases
            .iter()
            .filter_map(|alias| self.cells.get(*alias))
            .find(|v| !v.is_empty())
            .cloned()
            .unwrap_or_default()
    }

    fn order(&self) -> i64 {
        parse_order(&self.first(ORDER))
    }
}

pub fn parse_order(raw: &str) -> i64 {
    raw.trim().parse::<i64>().unwrap_or(UNSORTED_ORDER)
}

/// Comma separated links; empty slots keep their position.
pub fn parse_link_list(raw: &str) -> Vec<String> {
    let mut links: Vec<String> = raw.split(',').map(|l| l.trim().to_string()).collect();
    while links.last().is_some_and(|l| l.is_empty()) {
        links.pop();
    }
    links
}

#[derive(Debug, Clone)]
pub struct CategoryRow {
    pub order: i64,
    pub category: Category,
}

pub fn category_from_record(kind: CatalogKind, record: &RawRecord) -> Option<CategoryRow> {
    let raw_id = record.first(ID);
    let raw_name = record.first(&["name"]);
    if raw_id.is_empty() && raw_name.is_empty() {
        return None;
    }
    let id = if raw_id.is_empty() {
        slugify(&raw_name, shelf_core::DEFAULT_CATEGORY_SLUG)
    } else {
        raw_id
    };
    let name = if raw_name.is_empty() { id.clone() } else { raw_name };
    let mut icon = record.first(&["icon"]);
    if icon.is_empty() {
        icon = kind.default_icon().to_string();
    }
    let order = record.order();
    let mut category = Category::new(id, name, icon);
    category.order = order;
    Some(CategoryRow { order, category })
}

#[derive(Debug, Clone)]
pub struct ItemRow {
    pub order: i64,
    pub category_id: String,
    pub item: Item,
}

/// Builds an item from a record, or `None` when the record carries nothing
/// that could identify it.
pub fn item_from_record(kind: CatalogKind, record: &RawRecord) -> Option<ItemRow> {
    let id = record.first(ID);
    let title = record.first(TITLE);
    let primary_link = record.first(PRIMARY_LINK);
    let external_id = record.first(EXTERNAL_ID);
    let remote_record_id = record.first(REMOTE_RECORD_ID);

    let identifiable = match kind {
        CatalogKind::Projects => !id.is_empty() || !primary_link.is_empty(),
        CatalogKind::Papers => [
            &id,
            &title,
            &primary_link,
            &external_id,
            &remote_record_id,
            &record.first(&["doi"]),
        ]
        .iter()
        .any(|v| !v.is_empty()),
    };
    if !identifiable {
        return None;
    }

    let secondary_links = {
        let listed = record.first(SECONDARY_LINKS);
        if listed.is_empty() {
            POSITIONAL_LINKS
                .iter()
                .map(|column| record.first(&[*column]))
                .collect()
        } else {
            parse_link_list(&listed)
        }
    };

    let attributes: BTreeMap<String, String> = record
        .cells
        .iter()
        .filter(|(column, value)| !is_known_column(column) && !value.is_empty())
        .map(|(column, value)| (column.clone(), value.clone()))
        .collect();

    let mut item = Item {
        id,
        title,
        description: record.first(DESCRIPTION),
        primary_link,
        secondary_links,
        tags: parse_tag_list(&record.first(TAGS)),
        external_id,
        remote_record_id: normalize_record_id(&remote_record_id),
        attributes,
        order: record.order(),
    };
    item.normalize(kind);

    let mut category_id = record.first(CATEGORY_ID);
    if category_id.is_empty() {
        category_id = UNCATEGORIZED_ID.to_string();
    }
    Some(ItemRow {
        order: item.order,
        category_id,
        item,
    })
}

/// Sorts rows and nests items under their categories. Categories sort by
/// (order, name), items by (order, id); items pointing at an unknown category
/// synthesize it.
pub fn assemble(
    kind: CatalogKind,
    mut categories: Vec<CategoryRow>,
    mut items: Vec<ItemRow>,
) -> Vec<Category> {
    categories.sort_by(|a, b| {
        (a.order, &a.category.name).cmp(&(b.order, &b.category.name))
    });
    let mut out: Vec<Category> = categories.into_iter().map(|row| row.category).collect();
    if kind == CatalogKind::Papers && out.is_empty() {
        out.push(default_category(kind));
    }

    items.sort_by(|a, b| (a.order, &a.item.id).cmp(&(b.order, &b.item.id)));
    for row in items {
        let index = match out.iter().position(|c| c.id == row.category_id) {
            Some(index) => index,
            None => {
                let mut synthesized = if row.category_id == UNCATEGORIZED_ID {
                    default_category(kind)
                } else {
                    Category::new(row.category_id.clone(), row.category_id.clone(), kind.default_icon())
                };
                synthesized.order = UNSORTED_ORDER;
                out.push(synthesized);
                out.len() - 1
            }
        };
        out[index].items.push(row.item);
    }
    out
}

pub fn default_category(kind: CatalogKind) -> Category {
    Category::new(UNCATEGORIZED_ID, UNCATEGORIZED_NAME, kind.default_icon())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(pairs: &[(&str, &str)]) -> RawRecord {
        let mut record = RawRecord::default();
        for (k, v) in pairs {
            record.insert(k, v.to_string());
        }
        record
    }

    #[test]
    fn original_column_names_are_understood() {
        let row = item_from_record(
            CatalogKind::Projects,
            &record(&[
                ("category_id", "cli"),
                ("name", "ripgrep"),
                ("github", "https://github.com/BurntSushi/ripgrep"),
                ("topics", r#"["search", "grep"]"#),
                ("notion_page_id", "0F1E2D3C4B5A69788796A5B4C3D2E1F0"),
                ("order", "2"),
            ]),
        )
        .expect("row");
        assert_eq!(row.category_id, "cli");
        assert_eq!(row.order, 2);
        assert_eq!(row.item.id, "ripgrep");
        assert_eq!(row.item.title, "ripgrep");
        assert_eq!(row.item.tags, vec!["search", "grep"]);
        assert_eq!(row.item.remote_record_id, "0f1e2d3c-4b5a-6978-8796-a5b4c3d2e1f0");
    }

    #[test]
    fn paper_rows_keep_positional_links_and_attributes() {
        let row = item_from_record(
            CatalogKind::Papers,
            &record(&[
                ("title", "Some Paper"),
                ("pdf_url", ""),
                ("code_url", "https://github.com/x/y"),
                ("authors", "A, B"),
                ("doi", "10.1/abc"),
                ("order", "n/a"),
            ]),
        )
        .expect("row");
        assert_eq!(row.category_id, UNCATEGORIZED_ID);
        assert_eq!(row.order, UNSORTED_ORDER);
        assert_eq!(row.item.secondary_links, vec!["", "https://github.com/x/y"]);
        assert_eq!(row.item.attribute("authors"), "A, B");
        assert_eq!(row.item.id, "10-1-abc");
    }

    #[test]
    fn unidentifiable_rows_are_skipped() {
        assert!(item_from_record(CatalogKind::Projects, &record(&[("name", "x")])).is_none());
        assert!(item_from_record(CatalogKind::Papers, &record(&[("venue", "x")])).is_none());
    }

    #[test]
    fn assembly_sorts_and_synthesizes_missing_categories() {
        let categories = vec![
            category_from_record(CatalogKind::Projects, &record(&[("id", "b"), ("name", "B"), ("order", "1")]))
                .unwrap(),
            category_from_record(CatalogKind::Projects, &record(&[("id", "a"), ("name", "A"), ("order", "0")]))
                .unwrap(),
        ];
        let items = vec![
            item_from_record(CatalogKind::Projects, &record(&[("category_id", "a"), ("id", "z"), ("order", "0")]))
                .unwrap(),
            item_from_record(CatalogKind::Projects, &record(&[("category_id", "a"), ("id", "y"), ("order", "0")]))
                .unwrap(),
            item_from_record(CatalogKind::Projects, &record(&[("category_id", "ghost"), ("id", "g")]))
                .unwrap(),
        ];
        let out = assemble(CatalogKind::Projects, categories, items);
        let ids: Vec<_> = out.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "ghost"]);
        let first: Vec<_> = out[0].items.iter().map(|i| i.id.as_str()).collect();
        assert_eq!(first, vec!["y", "z"]);
        assert_eq!(out[2].name, "ghost");
    }
}
