use std::path::{Path, PathBuf};

use shelf_core::{Catalog, CatalogKind};
use tracing::info;

use crate::legacy::read_legacy;
use crate::record::default_category;
use crate::tabular::{read_workbook, write_workbook};
use crate::StoreError;

#[derive(Debug, Clone)]
pub struct LoadedCatalog {
    pub catalog: Catalog,
    /// Workbook path the catalog is saved to.
    pub path: PathBuf,
    /// True when a legacy JSON file was converted during this load.
    pub migrated: bool,
}

/// Persistence seam for the local catalog.
pub trait CatalogStore: Send + Sync {
    fn load(&self) -> Result<LoadedCatalog, StoreError>;
    fn save(&self, catalog: &Catalog) -> Result<PathBuf, StoreError>;
}

fn empty_catalog(kind: CatalogKind) -> Catalog {
    match kind {
        CatalogKind::Papers => Catalog::from_categories(kind, vec![default_category(kind)]),
        CatalogKind::Projects => Catalog::new(kind),
    }
}

/// Two-sheet xlsx catalog. A `.json` target, or a missing `.xlsx` target with
/// a legacy JSON file beside it, is migrated and written as xlsx on load.
#[derive(Debug, Clone)]
pub struct XlsxCatalogStore {
    requested: PathBuf,
    kind: CatalogKind,
}

impl XlsxCatalogStore {
    pub fn new(path: impl Into<PathBuf>, kind: CatalogKind) -> Self {
        Self {
            requested: path.into(),
            kind,
        }
    }

    pub fn kind(&self) -> CatalogKind {
        self.kind
    }

    /// The `.xlsx` path saves go to.
    pub fn workbook_path(&self) -> PathBuf {
        if has_extension(&self.requested, "xlsx") {
            self.requested.clone()
        } else {
            self.requested.with_extension("xlsx")
        }
    }

    fn legacy_candidate(&self) -> Option<PathBuf> {
        if has_extension(&self.requested, "json") {
            return Some(self.requested.clone());
        }
        if has_extension(&self.requested, "xlsx") {
            return Some(self.requested.with_file_name(self.kind.legacy_file_name()));
        }
        None
    }
}

fn has_extension(path: &Path, ext: &str) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case(ext))
}

impl CatalogStore for XlsxCatalogStore {
    fn load(&self) -> Result<LoadedCatalog, StoreError> {
        let path = self.workbook_path();
        let legacy = self.legacy_candidate().filter(|p| p.exists());
        let json_requested = has_extension(&self.requested, "json");

        if path.exists() && !(json_requested && legacy.is_some()) {
            let categories = read_workbook(&path, self.kind)?;
            return Ok(LoadedCatalog {
                catalog: Catalog::from_categories(self.kind, categories),
                path,
                migrated: false,
            });
        }
        if let Some(legacy) = legacy {
            return migrate_legacy(&legacy, &path, self.kind);
        }
        Ok(LoadedCatalog {
            catalog: empty_catalog(self.kind),
            path,
            migrated: false,
        })
    }

    fn save(&self, catalog: &Catalog) -> Result<PathBuf, StoreError> {
        let path = self.workbook_path();
        write_workbook(&path, catalog)?;
        Ok(path)
    }
}

/// Converts a legacy JSON catalog and persists it as a workbook at `target`.
pub fn migrate_legacy(
    legacy: &Path,
    target: &Path,
    kind: CatalogKind,
) -> Result<LoadedCatalog, StoreError> {
    let categories = read_legacy(legacy, kind)?;
    let catalog = if categories.is_empty() {
        empty_catalog(kind)
    } else {
        Catalog::from_categories(kind, categories)
    };
    write_workbook(target, &catalog)?;
    info!(
        from = %legacy.display(),
        to = %target.display(),
        items = catalog.item_count(),
        "migrated legacy catalog"
    );
    Ok(LoadedCatalog {
        catalog,
        path: target.to_path_buf(),
        migrated: true,
    })
}
