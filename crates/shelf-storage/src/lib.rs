//! Local catalog persistence and HTTP transport for shelfsync.

use std::path::PathBuf;

use thiserror::Error;

mod http;
mod legacy;
mod record;
mod store;
mod tabular;

pub use http::{
    classify_reqwest_error, proxy_env_present, HttpClientConfig, HttpResponse, HttpTransport,
    RetryDisposition, TransportError,
};
pub use legacy::parse_legacy;
pub use record::{UNCATEGORIZED_ID, UNCATEGORIZED_NAME};
pub use store::{migrate_legacy, CatalogStore, LoadedCatalog, XlsxCatalogStore};
pub use tabular::{CATEGORIES_SHEET, CATEGORY_HEADERS, ITEM_HEADERS};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("i/o on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("workbook {}: {message}", path.display())]
    Workbook { path: PathBuf, message: String },
    #[error("legacy catalog {} is not valid JSON: {source}", path.display())]
    Legacy {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}
