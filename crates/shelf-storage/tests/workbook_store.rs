use shelf_core::{Catalog, CatalogKind, Category, Item};
use shelf_storage::{CatalogStore, XlsxCatalogStore};
use tempfile::tempdir;

fn project(id: &str, link: &str, reference: &str) -> Item {
    Item {
        id: id.into(),
        title: id.into(),
        description: format!("{id} description"),
        primary_link: link.into(),
        tags: vec!["rust".into(), "cli".into()],
        remote_record_id: reference.into(),
        ..Default::default()
    }
}

#[test]
fn saved_workbook_loads_back_in_catalog_order() {
    let dir = tempdir().expect("tempdir");
    let path = dir.path().join("nested").join("projects.xlsx");
    let store = XlsxCatalogStore::new(&path, CatalogKind::Projects);

    let mut tools = Category::new("tools", "Dev Tools", "🛠");
    tools.items = vec![
        project("zoxide", "https://github.com/ajeetdsouza/zoxide", ""),
        project("bat", "https://github.com/sharkdp/bat", "0f1e2d3c-4b5a-6978-8796-a5b4c3d2e1f0"),
    ];
    let mut infra = Category::new("infra", "Infra", "📁");
    infra.items = vec![project("tokio", "https://github.com/tokio-rs/tokio", "")];
    let catalog = Catalog::from_categories(CatalogKind::Projects, vec![tools, infra]);

    let saved = store.save(&catalog).expect("save");
    assert_eq!(saved, path);
    assert!(path.exists());
    let leftovers: Vec<_> = std::fs::read_dir(path.parent().unwrap())
        .unwrap()
        .filter_map(Result::ok)
        .filter(|e| e.file_name().to_string_lossy().ends_with(".tmp"))
        .collect();
    assert!(leftovers.is_empty());

    let loaded = store.load().expect("load");
    assert!(!loaded.migrated);
    let ids: Vec<_> = loaded.catalog.categories().iter().map(|c| c.id.as_str()).collect();
    assert_eq!(ids, vec!["tools", "infra"]);
    assert_eq!(loaded.catalog.item_ids(), vec!["zoxide", "bat", "tokio"]);
    let bat = loaded.catalog.item("bat").expect("bat");
    assert_eq!(bat.tags, vec!["rust", "cli"]);
    assert_eq!(bat.remote_record_id, "0f1e2d3c-4b5a-6978-8796-a5b4c3d2e1f0");
    assert_eq!(bat.order, 1);
    assert_eq!(loaded.catalog.categories()[0].icon, "🛠");
}

#[test]
fn legacy_json_beside_missing_workbook_is_migrated() {
    let dir = tempdir().expect("tempdir");
    std::fs::write(
        dir.path().join("papers.json"),
        r#"{"categories":[{"id":"nlp","name":"NLP","papers":[
            {"title":"Attention Is All You Need","arxiv_id":"1706.03762v5","authors":["Vaswani"]}
        ]}]}"#,
    )
    .unwrap();
    let path = dir.path().join("papers.xlsx");
    let store = XlsxCatalogStore::new(&path, CatalogKind::Papers);

    let loaded = store.load().expect("load");
    assert!(loaded.migrated);
    assert!(path.exists());
    let paper = loaded.catalog.item("1706-03762").expect("paper");
    assert_eq!(paper.external_id, "1706.03762");
    assert_eq!(paper.attribute("authors"), "Vaswani");

    let again = store.load().expect("reload");
    assert!(!again.migrated);
    assert_eq!(again.catalog.item_ids(), vec!["1706-03762"]);
    assert_eq!(again.catalog.item("1706-03762").unwrap().attribute("authors"), "Vaswani");
}

#[test]
fn absent_catalog_is_empty_and_papers_get_a_default_category() {
    let dir = tempdir().expect("tempdir");
    let projects = XlsxCatalogStore::new(dir.path().join("projects.xlsx"), CatalogKind::Projects)
        .load()
        .expect("load");
    assert_eq!(projects.catalog.item_count(), 0);
    assert!(projects.catalog.categories().is_empty());

    let papers = XlsxCatalogStore::new(dir.path().join("papers.xlsx"), CatalogKind::Papers)
        .load()
        .expect("load");
    assert_eq!(papers.catalog.categories().len(), 1);
    assert_eq!(papers.catalog.categories()[0].id, "uncategorized");
}
