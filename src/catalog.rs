//! Composition root: one database, one invalidation bus, and every cache
//! built on top of them.

use std::sync::Arc;

use tracing::info;

use crate::cache::{CatalogStats, InvalidationBus, StatsCache, TagDirectory};
use crate::database::repo::CatalogWriter;
use crate::database::Database;
use crate::error::Result;
use crate::model::{ItemId, TagId};
use crate::search::{SearchEngine, SearchResults};
use crate::similarity::{RelatedFinder, RelatedItem, WeightCache, WeightOptions};
use crate::utils::CatalogConfig;

/// Tags listed by [`Catalog::stats`].
const TOP_TAGS: usize = 20;

pub struct Catalog {
    config: CatalogConfig,
    db: Arc<Database>,
    bus: Arc<InvalidationBus>,
    directory: Arc<TagDirectory>,
    weights: Arc<WeightCache>,
    related: Arc<RelatedFinder>,
    stats: Arc<StatsCache>,
    engine: SearchEngine,
}

impl Catalog {
    /// Opens (or creates) the database at `config.db_path`.
    pub fn open(config: CatalogConfig) -> Result<Self> {
        let db = Arc::new(Database::open(&config.db_path)?);
        Ok(Self::new(db, config))
    }

    pub fn new(db: Arc<Database>, config: CatalogConfig) -> Self {
        let bus = Arc::new(InvalidationBus::new());
        let directory = Arc::new(TagDirectory::new(Arc::clone(&db)));
        let weights = Arc::new(WeightCache::new(
            Arc::clone(&db),
            Arc::clone(&directory),
            WeightOptions {
                idf: config.idf,
                extended_categories: config.extended_categories,
            },
        ));
        let related = Arc::new(RelatedFinder::new(
            Arc::clone(&db),
            Arc::clone(&weights),
            config.similarity,
            config.related_cache_capacity,
        ));
        let stats = Arc::new(StatsCache::new(Arc::clone(&db), TOP_TAGS));

        // The directory goes first: the weight cache resolves names through it.
        bus.register(directory.clone());
        bus.register(weights.clone());
        bus.register(related.clone());
        bus.register(stats.clone());
        info!(
            "Catalog ready ({} similarity, {} idf, {} cache listeners)",
            config.similarity.as_str(),
            config.idf.as_str(),
            bus.len()
        );

        let engine = SearchEngine::new(Arc::clone(&db), Arc::clone(&directory));
        Self {
            config,
            db,
            bus,
            directory,
            weights,
            related,
            stats,
            engine,
        }
    }

    pub fn config(&self) -> &CatalogConfig {
        &self.config
    }

    pub fn database(&self) -> &Arc<Database> {
        &self.db
    }

    pub fn bus(&self) -> &Arc<InvalidationBus> {
        &self.bus
    }

    pub fn directory(&self) -> &Arc<TagDirectory> {
        &self.directory
    }

    /// A writer whose commits invalidate this catalog's caches.
    pub fn writer(&self) -> CatalogWriter {
        CatalogWriter::new(Arc::clone(&self.db), Arc::clone(&self.bus))
    }

    pub fn search(&self, raw_query: &str) -> SearchResults {
        self.engine.search(raw_query)
    }

    pub fn related(&self, item_id: ItemId, limit: usize) -> Arc<Vec<RelatedItem>> {
        self.related.find_related(item_id, limit)
    }

    pub fn get_tag_id(&self, name: &str) -> Option<TagId> {
        self.directory.get_id(name)
    }

    pub fn get_tag_name(&self, id: TagId) -> Option<Arc<str>> {
        self.directory.get_name(id)
    }

    pub fn weight_for(&self, tag: &str) -> f64 {
        self.weights.weight_for(tag)
    }

    /// Similarity of two space-separated tag strings under the configured
    /// policy.
    pub fn similarity(&self, a: &str, b: &str) -> f64 {
        let a = a.split_whitespace().collect();
        let b = b.split_whitespace().collect();
        self.related.policy().score(&a, &b, &self.weights)
    }

    pub fn stats(&self) -> Result<Arc<CatalogStats>> {
        self.stats.get()
    }
}

#[cfg(test)]
mod tests {
    use crate::similarity::SimilarityPolicy;
    use crate::test_support::{catalog_with, catalog_with_policy, item};

    #[test]
    fn every_cache_listens_on_the_bus() {
        let catalog = catalog_with(vec![]);
        assert_eq!(catalog.bus().len(), 4);
        assert!(catalog.bus().trigger().is_clean());
    }

    #[test]
    fn similarity_uses_the_configured_policy() {
        let records = vec![item("a.png", &["a", "b", "c"]), item("b.png", &["a"])];
        let plain = catalog_with_policy(records.clone(), SimilarityPolicy::Jaccard);
        assert!((plain.similarity("a b", "a c") - 1.0 / 3.0).abs() < 1e-12);
        assert_eq!(plain.similarity("", "a"), 0.0);

        let weighted = catalog_with_policy(records, SimilarityPolicy::Weighted);
        assert_eq!(weighted.similarity("a b", "a b"), 1.0);
        // "a" is the more common tag, so sharing it counts for less.
        assert!(weighted.similarity("a b", "a c") < weighted.similarity("b a", "b c"));
    }

    #[test]
    fn tag_names_resolve_both_ways() {
        let catalog = catalog_with(vec![item("a.png", &["sky"])]);
        let id = catalog.get_tag_id("sky").unwrap();
        assert_eq!(catalog.get_tag_name(id).as_deref(), Some("sky"));
        assert_eq!(catalog.get_tag_id("SKY"), None);
    }
}
