use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::RwLock;
use serde::Serialize;
use tracing::debug;

use crate::cache::bus::CacheListener;
use crate::cache::epoch::Epoch;
use crate::database::{queries, Database};
use crate::error::Result;
use crate::model::TagCategory;

/// Corpus-wide counters shown by the statistics page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CatalogStats {
    pub total_items: u64,
    pub total_tags: u64,
    pub tags_by_category: BTreeMap<TagCategory, u64>,
    pub top_tags: Vec<(String, u64)>,
}

/// Memoized [`CatalogStats`], dropped whenever the bus fires.
pub struct StatsCache {
    db: Arc<Database>,
    top_n: usize,
    current: RwLock<Option<Arc<CatalogStats>>>,
    epoch: Epoch,
}

impl StatsCache {
    pub fn new(db: Arc<Database>, top_n: usize) -> Self {
        Self {
            db,
            top_n,
            current: RwLock::new(None),
            epoch: Epoch::default(),
        }
    }

    pub fn get(&self) -> Result<Arc<CatalogStats>> {
        if let Some(stats) = self.current.read().as_ref() {
            return Ok(Arc::clone(stats));
        }

        let epoch = self.epoch.current();
        let stats = self.compute()?;
        Ok(self.install(epoch, Arc::new(stats)))
    }

    fn compute(&self) -> Result<CatalogStats> {
        let stats = {
            let conn = self.db.conn();
            let tags_by_category = queries::tag_counts_by_category(&conn)?;
            CatalogStats {
                total_items: queries::item_count(&conn)?,
                total_tags: tags_by_category.values().sum(),
                tags_by_category,
                top_tags: queries::top_tags(&conn, self.top_n)?,
            }
        };
        debug!("Computed catalog stats for {} items", stats.total_items);
        Ok(stats)
    }

    /// Keeps `stats` only if nothing invalidated the cache since `epoch`.
    fn install(&self, epoch: u64, stats: Arc<CatalogStats>) -> Arc<CatalogStats> {
        let mut slot = self.current.write();
        if self.epoch.is_current(epoch) {
            *slot = Some(Arc::clone(&stats));
        }
        stats
    }

    pub fn invalidate(&self) {
        let mut slot = self.current.write();
        self.epoch.advance();
        *slot = None;
    }
}

impl CacheListener for StatsCache {
    fn name(&self) -> &str {
        "catalog_stats"
    }

    fn on_invalidate(&self) -> anyhow::Result<()> {
        self.invalidate();
        Ok(())
    }
}
