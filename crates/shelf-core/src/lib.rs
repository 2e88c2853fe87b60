//! Core catalog model for shelfsync: categories, items, identity keys,
//! category alignment and field merging.

mod align;
mod catalog;
mod key;
mod merge;
mod model;

pub use align::{EnsuredCategory, MoveOutcome};
pub use catalog::{Catalog, CatalogError};
pub use key::{
    arxiv_urls, identity_keys, is_record_id, normalize_link, normalize_record_id, parse_arxiv_id,
    slugify, uniquify, KeyKind, NormalizedKey, DEFAULT_CATEGORY_SLUG,
};
pub use merge::{fill, override_title, ItemFields};
pub use model::{parse_tag_list, CatalogKind, Category, Item, ItemField, UNSORTED_ORDER};
