//! Remote record database access: typed properties, the `RemoteApi` seam,
//! its HTTP and in-memory implementations, property mapping and enrichers.

mod api;
mod enrich;
mod mapping;
mod memory;
mod notion;
mod property;

pub use api::{
    encode_properties, Properties, QueryFilter, QueryPage, RemoteApi, RemoteError, RemotePage,
    UpdateStatus,
};
pub use enrich::{
    github_repo, parse_abs_page, parse_repo, ArxivEnricher, EnrichError, Enricher, Enrichment,
    GitHubEnricher, ARXIV_BASE, GITHUB_API_BASE,
};
pub use mapping::{KeySpec, PropertyMap, PropertyMapOverride, RemoteRecord};
pub use memory::{CallCounts, InMemoryRemote};
pub use notion::{NotionClient, DEFAULT_API_BASE, MAX_PAGE_SIZE, NOTION_VERSION};
pub use property::{
    encode_for, parse_schema, EncodeLimits, FieldValue, PropertyType, PropertyValue, Schema,
};
