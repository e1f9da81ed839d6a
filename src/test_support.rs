//! Fixtures shared by the unit tests.

use std::sync::Arc;

use crate::catalog::Catalog;
use crate::database::repo::{ItemRecord, TagAssignment};
use crate::database::Database;
use crate::model::TagCategory;
use crate::similarity::SimilarityPolicy;
use crate::utils::CatalogConfig;

/// A record at `path` carrying `tags` as general tags. `rating:*` names end
/// up in the rating category on write.
pub(crate) fn item(path: &str, tags: &[&str]) -> ItemRecord {
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

pub(crate) fn catalog_with(records: Vec<ItemRecord>) -> Catalog {
    catalog_with_policy(records, SimilarityPolicy::Weighted)
}

/// In-memory catalog holding `records`, flushed in one batch.
pub(crate) fn catalog_with_policy(records: Vec<ItemRecord>, policy: SimilarityPolicy) -> Catalog {
    let db = Arc::new(Database::open_in_memory().expect("in-memory database"));
    let config = CatalogConfig {
        similarity: policy,
        ..CatalogConfig::default()
    };
    let catalog = Catalog::new(db, config);

    let mut writer = catalog.writer();
    for record in records {
        writer.add(record).expect("valid fixture record");
    }
    writer.flush().expect("fixture flush");
    catalog
}
