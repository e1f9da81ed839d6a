//! Per-tag similarity weights.
//!
//! weight(tag) = idf(frequency of tag) × category multiplier
//!
//! The default idf is `1 / ln(freq + 1)`. Its range is narrower
//! than classic TF-IDF so common tags still contribute; the classic formula is
//! kept as a separate, opt-in policy.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{error, info};

use crate::cache::{CacheListener, Epoch, TagDirectory};
use crate::database::{queries, Database};
use crate::error::Result;
use crate::model::{ExtendedCategory, TagCategory, TagId};

/// Weight of a name that does not resolve to a known tag.
pub const UNKNOWN_TAG_WEIGHT: f64 = 0.1;

/// Lower bound for the classic formula, which goes negative once a tag is on
/// nearly every item.
const MIN_CLASSIC_WEIGHT: f64 = 0.01;

/// Coarse multipliers. Categories not listed weigh 1.0.
const BASE_CATEGORY_WEIGHTS: &[(TagCategory, f64)] = &[
    (TagCategory::Artist, 3.0),
    (TagCategory::Character, 2.5),
    (TagCategory::Copyright, 2.0),
    (TagCategory::Species, 1.5),
    (TagCategory::Meta, 0.5),
    (TagCategory::Rating, 0.2),
];

/// Fine-grained multipliers; anything missing falls back to the coarse table.
const EXTENDED_CATEGORY_WEIGHTS: &[(ExtendedCategory, f64)] = &[
    (ExtendedCategory::SubjectCount, 0.6),
    (ExtendedCategory::Body, 1.2),
    (ExtendedCategory::Attire, 1.4),
    (ExtendedCategory::Expression, 0.8),
    (ExtendedCategory::Action, 1.1),
    (ExtendedCategory::Pose, 0.9),
    (ExtendedCategory::Object, 1.3),
    (ExtendedCategory::Setting, 1.2),
    (ExtendedCategory::Composition, 0.7),
    (ExtendedCategory::Style, 1.5),
    (ExtendedCategory::Technical, 0.3),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IdfFormula {
    /// `1 / ln(freq + 1)`
    #[default]
    Compressed,
    /// `ln(N / (freq + 1)) + 1`
    Classic,
}

impl IdfFormula {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "compressed" => Some(IdfFormula::Compressed),
            "classic" | "tfidf" => Some(IdfFormula::Classic),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            IdfFormula::Compressed => "compressed",
            IdfFormula::Classic => "classic",
        }
    }

    /// Zero frequencies (orphan tags) are treated as one.
    pub fn weight(self, frequency: u64, total_items: u64) -> f64 {
        let freq = frequency.max(1) as f64;
        match self {
            IdfFormula::Compressed => 1.0 / (freq + 1.0).ln(),
            IdfFormula::Classic => {
                let total = total_items.max(1) as f64;
                ((total / (freq + 1.0)).ln() + 1.0).max(MIN_CLASSIC_WEIGHT)
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct WeightOptions {
    pub idf: IdfFormula,
    /// Use the fine-grained category table when a tag has one.
    pub extended_categories: bool,
}

pub fn base_category_weight(category: TagCategory) -> f64 {
    BASE_CATEGORY_WEIGHTS
        .iter()
        .find(|(c, _)| *c == category)
        .map_or(1.0, |(_, w)| *w)
}

pub fn category_weight(
    category: TagCategory,
    extended: Option<ExtendedCategory>,
    use_extended: bool,
) -> f64 {
    if use_extended {
        if let Some(weight) = extended.and_then(|ext| {
            EXTENDED_CATEGORY_WEIGHTS
                .iter()
                .find(|(e, _)| *e == ext)
                .map(|(_, w)| *w)
        }) {
            return weight;
        }
    }
    base_category_weight(category)
}

#[derive(Default)]
struct Snapshot {
    frequencies: HashMap<TagId, u64>,
    categories: HashMap<TagId, (TagCategory, Option<ExtendedCategory>)>,
    total_items: u64,
}

/// One cache generation: the corpus snapshot plus the weights memoized
/// against it. Invalidation drops the whole generation.
struct Generation {
    snapshot: Snapshot,
    memo: RwLock<HashMap<Box<str>, f64>>,
}

pub struct WeightCache {
    db: Arc<Database>,
    directory: Arc<TagDirectory>,
    options: WeightOptions,
    current: RwLock<Option<Arc<Generation>>>,
    epoch: Epoch,
}

impl WeightCache {
    pub fn new(db: Arc<Database>, directory: Arc<TagDirectory>, options: WeightOptions) -> Self {
        Self {
            db,
            directory,
            options,
            current: RwLock::new(None),
            epoch: Epoch::default(),
        }
    }

    pub fn options(&self) -> WeightOptions {
        self.options
    }

    fn generation(&self) -> Arc<Generation> {
        if let Some(generation) = self.current.read().as_ref() {
            return Arc::clone(generation);
        }
        let epoch = self.epoch.current();
        match self.load() {
            Ok(generation) => self.install(epoch, generation),
            Err(e) => {
                error!("Failed to snapshot tag frequencies: {}", e);
                Arc::new(Generation {
                    snapshot: Snapshot::default(),
                    memo: RwLock::new(HashMap::new()),
                })
            }
        }
    }

    /// Stores `generation` unless an invalidation happened since `epoch` was
    /// read, in which case it is returned to the caller but not kept.
    fn install(&self, epoch: u64, generation: Arc<Generation>) -> Arc<Generation> {
        let mut slot = self.current.write();
        if !self.epoch.is_current(epoch) {
            return generation;
        }
        Arc::clone(slot.get_or_insert(generation))
    }

    fn load(&self) -> Result<Arc<Generation>> {
        let snapshot = {
            let conn = self.db.conn();
            let categories = queries::load_tags(&conn)?
                .into_iter()
                .map(|row| (row.id, (row.category, row.extended_category)))
                .collect();
            Snapshot {
                frequencies: queries::tag_frequencies(&conn)?,
                categories,
                total_items: queries::item_count(&conn)?,
            }
        };
        info!(
            "Snapshotted frequencies for {} tags over {} items",
            snapshot.frequencies.len(),
            snapshot.total_items
        );
        Ok(Arc::new(Generation {
            snapshot,
            memo: RwLock::new(HashMap::new()),
        }))
    }

    /// Loads the snapshot (and the tag directory) ahead of parallel scoring.
    pub fn prime(&self) {
        self.directory.ensure_loaded();
        let _ = self.generation();
    }

    /// Combined weight of `tag`, memoized for the current generation.
    pub fn weight_for(&self, tag: &str) -> f64 {
        let Some(tag_id) = self.directory.get_id(tag) else {
            return UNKNOWN_TAG_WEIGHT;
        };

        let generation = self.generation();
        if let Some(weight) = generation.memo.read().get(tag) {
            return *weight;
        }

        let snapshot = &generation.snapshot;
        let frequency = snapshot.frequencies.get(&tag_id).copied().unwrap_or(0);
        let idf = self.options.idf.weight(frequency, snapshot.total_items);
        let multiplier = snapshot
            .categories
            .get(&tag_id)
            .map_or(1.0, |(category, extended)| {
                category_weight(*category, *extended, self.options.extended_categories)
            });
        let weight = idf * multiplier;

        generation.memo.write().insert(Box::from(tag), weight);
        weight
    }

    /// Drops the memoized weights together with the snapshots they were
    /// computed from.
    pub fn invalidate(&self) {
        let mut slot = self.current.write();
        self.epoch.advance();
        *slot = None;
    }
}

impl CacheListener for WeightCache {
    fn name(&self) -> &str {
        "similarity_weights"
    }

    fn on_invalidate(&self) -> anyhow::Result<()> {
        self.invalidate();
        Ok(())
    }
}
