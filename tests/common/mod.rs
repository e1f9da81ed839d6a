//! Shared fixtures for the integration suites.

#![allow(dead_code)]

use tag_catalog::database::repo::{ItemRecord, TagAssignment};
use tag_catalog::model::TagCategory;
use tag_catalog::{Catalog, CatalogConfig};
use tempfile::TempDir;

/// A catalog on a real file in a temporary directory.
pub struct TestCatalog {
    pub catalog: Catalog,
    pub dir: TempDir,
}

impl TestCatalog {
    pub fn new() -> Self {
        Self::with_config(CatalogConfig::default())
    }

    pub fn with_config(config: CatalogConfig) -> Self {
        let dir = tempfile::tempdir().expect("temp dir");
        let config = CatalogConfig {
            db_path: dir.path().join("catalog.db"),
            ..config
        };
        let catalog = Catalog::open(config).expect("open catalog");
        Self { catalog, dir }
    }

    pub fn insert(&self, records: Vec<ItemRecord>) {
        let mut writer = self.catalog.writer();
        for record in records {
            writer.add(record).expect("valid record");
        }
        writer.flush().expect("flush");
    }

    /// Drops the catalog and opens the same file again.
    pub fn reopen(self) -> Self {
        let TestCatalog { catalog, dir } = self;
        let config = catalog.config().clone();
        drop(catalog);
        let catalog = Catalog::open(config).expect("reopen catalog");
        Self { catalog, dir }
    }
}

pub fn item(path: &str, tags: &[&str]) -> ItemRecord {
    ItemRecord {
        filepath: path.to_string(),
        content_hash: format!("hash:{path}"),
        tags: tags
            .iter()
            .map(|name| TagAssignment::new(*name, TagCategory::General))
            .collect(),
        ..ItemRecord::default()
    }
}

pub fn paths(catalog: &Catalog, query: &str) -> Vec<String> {
    let mut paths: Vec<String> = catalog
        .search(query)
        .hits
        .into_iter()
        .map(|hit| hit.filepath)
        .collect();
    paths.sort();
    paths
}
