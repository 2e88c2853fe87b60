use std::collections::BTreeSet;
use std::io::{Cursor, Read, Seek};
use std::path::Path;

use calamine::{open_workbook_auto, Data, Reader, Sheets};
use shelf_core::{Catalog, CatalogKind, Category};
use uuid::Uuid;

use crate::record::{assemble, category_from_record, item_from_record, RawRecord};
use crate::StoreError;

pub const CATEGORIES_SHEET: &str = "categories";
pub const CATEGORY_HEADERS: [&str; 4] = ["id", "name", "icon", "order"];
pub const ITEM_HEADERS: [&str; 10] = [
    "category_id",
    "id",
    "title",
    "description",
    "primary_link",
    "secondary_links",
    "tags",
    "external_id",
    "remote_record_id",
    "order",
];

fn cell_text(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        Data::String(s) => s.trim().to_string(),
        Data::Int(i) => i.to_string(),
        Data::Float(f) => {
            if f.fract() == 0.0 {
                format!("{f:.0}")
            } else {
                f.to_string()
            }
        }
        other => other.to_string(),
    }
}

fn sheet_records<RS>(
    workbook: &mut Sheets<RS>,
    sheet_names: &[String],
    name: &str,
    path: &Path,
) -> Result<Vec<RawRecord>, StoreError>
where
    RS: Read + Seek,
{
    if !sheet_names.iter().any(|n| n == name) {
        return Ok(Vec::new());
    }
    let range = workbook
        .worksheet_range(name)
        .map_err(|e| StoreError::Workbook {
            path: path.to_path_buf(),
            message: format!("reading sheet `{name}`: {e}"),
        })?;
    let mut rows = range.rows();
    let Some(header) = rows.next() else {
        return Ok(Vec::new());
    };
    let header: Vec<String> = header.iter().map(cell_text).collect();
    Ok(rows
        .map(|row| {
            let mut record = RawRecord::default();
            for (column, cell) in header.iter().zip(row.iter()) {
                record.insert(column, cell_text(cell));
            }
            record
        })
        .collect())
}

/// Reads the `categories` sheet and the kind's item sheet into nested
/// categories. Missing sheets read as empty.
pub fn read_workbook(path: &Path, kind: CatalogKind) -> Result<Vec<Category>, StoreError> {
    let mut workbook = open_workbook_auto(path).map_err(|e| StoreError::Workbook {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;
    let sheet_names = workbook.sheet_names().to_vec();

    let categories = sheet_records(&mut workbook, &sheet_names, CATEGORIES_SHEET, path)?
        .iter()
        .filter_map(|record| category_from_record(kind, record))
        .collect();
    let items = sheet_records(&mut workbook, &sheet_names, kind.items_sheet(), path)?
        .iter()
        .filter_map(|record| item_from_record(kind, record))
        .collect();
    Ok(assemble(kind, categories, items))
}

fn item_columns(catalog: &Catalog) -> Vec<String> {
    let mut columns: Vec<String> = ITEM_HEADERS.iter().map(|h| h.to_string()).collect();
    let fixed = catalog.kind().attribute_columns();
    columns.extend(fixed.iter().map(|c| c.to_string()));
    let extra: BTreeSet<&str> = catalog
        .items()
        .flat_map(|(_, item)| item.attributes.keys().map(String::as_str))
        .filter(|key| !fixed.contains(key))
        .collect();
    columns.extend(extra.into_iter().map(str::to_string));
    columns
}

/// Serializes the catalog to xlsx bytes. `order` columns are rewritten from
/// positions.
pub fn render_workbook(catalog: &Catalog) -> Result<Vec<u8>, String> {
    let mut book = umya_spreadsheet::new_file();
    {
        let sheet = book
            .get_sheet_mut(&0)
            .ok_or_else(|| "default worksheet missing".to_string())?;
        sheet.set_name(CATEGORIES_SHEET);
        for (col, header) in CATEGORY_HEADERS.iter().enumerate() {
            sheet.get_cell_mut((col as u32 + 1, 1)).set_value(*header);
        }
        for (index, category) in catalog.categories().iter().enumerate() {
            let row = index as u32 + 2;
            sheet.get_cell_mut((1, row)).set_value(category.id.as_str());
            sheet.get_cell_mut((2, row)).set_value(category.name.as_str());
            sheet.get_cell_mut((3, row)).set_value(category.icon.as_str());
            sheet.get_cell_mut((4, row)).set_value_number(index as f64);
        }
    }

    let columns = item_columns(catalog);
    let sheet = book
        .new_sheet(catalog.kind().items_sheet())
        .map_err(|e| format!("creating item sheet: {e}"))?;
    for (col, header) in columns.iter().enumerate() {
        sheet.get_cell_mut((col as u32 + 1, 1)).set_value(header.as_str());
    }
    let mut row = 2u32;
    for category in catalog.categories() {
        for (position, item) in category.items.iter().enumerate() {
            for (col, column) in columns.iter().enumerate() {
                let cell = (col as u32 + 1, row);
                let text = match column.as_str() {
                    "category_id" => category.id.clone(),
                    "id" => item.id.clone(),
                    "title" => item.title.clone(),
                    "description" => item.description.clone(),
                    "primary_link" => item.primary_link.clone(),
                    "secondary_links" => item.secondary_links.join(", "),
                    "tags" => item.tags.join(", "),
                    "external_id" => item.external_id.clone(),
                    "remote_record_id" => item.remote_record_id.clone(),
                    "order" => {
                        sheet.get_cell_mut(cell).set_value_number(position as f64);
                        continue;
                    }
                    attribute => item.attribute(attribute).to_string(),
                };
                if !text.is_empty() {
                    sheet.get_cell_mut(cell).set_value(text);
                }
            }
            row += 1;
        }
    }

    let mut buf = Cursor::new(Vec::new());
    umya_spreadsheet::writer::xlsx::write_writer(&book, &mut buf)
        .map_err(|e| format!("encoding workbook: {e}"))?;
    Ok(buf.into_inner())
}

/// Writes the workbook next to `path` under a temporary name, then renames it
/// over `path`.
pub fn write_workbook(path: &Path, catalog: &Catalog) -> Result<(), StoreError> {
    let bytes = render_workbook(catalog).map_err(|message| StoreError::Workbook {
        path: path.to_path_buf(),
        message,
    })?;
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => std::env::current_dir().map_err(|source| StoreError::Io {
            path: path.to_path_buf(),
            source,
        })?,
    };
    std::fs::create_dir_all(&parent).map_err(|source| StoreError::Io {
        path: parent.clone(),
        source,
    })?;

    let temp_path = parent.join(format!(".{}.xlsx.tmp", Uuid::new_v4()));
    std::fs::write(&temp_path, &bytes).map_err(|source| StoreError::Io {
        path: temp_path.clone(),
        source,
    })?;
    if let Err(source) = std::fs::rename(&temp_path, path) {
        let _ = std::fs::remove_file(&temp_path);
        return Err(StoreError::Io {
            path: path.to_path_buf(),
            source,
        });
    }
    Ok(())
}
