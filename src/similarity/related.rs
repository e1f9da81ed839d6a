use std::cmp::Ordering;
use std::num::NonZeroUsize;
use std::sync::Arc;

use lru::LruCache;
use parking_lot::Mutex;
use rayon::prelude::*;
use serde::Serialize;
use tracing::{debug, error};

use crate::cache::{CacheListener, Epoch};
use crate::database::{queries, Database};
use crate::error::Result;
use crate::model::{ItemId, SearchHit};
use crate::similarity::{SimilarityPolicy, WeightCache};

/// Upper bound on candidates scored per lookup; long-tail tags can otherwise
/// pull in most of the corpus.
pub const RELATED_CANDIDATE_CEILING: usize = 500;

/// Candidates scoring below this are dropped.
pub const MIN_RELATED_SCORE: f64 = 0.05;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RelatedItem {
    pub item: SearchHit,
    pub score: f64,
}

/// "Similar images" lookup, memoized per (item, limit).
pub struct RelatedFinder {
    db: Arc<Database>,
    weights: Arc<WeightCache>,
    policy: SimilarityPolicy,
    memo: Mutex<LruCache<(ItemId, usize), Arc<Vec<RelatedItem>>>>,
    epoch: Epoch,
}

impl RelatedFinder {
    pub fn new(
        db: Arc<Database>,
        weights: Arc<WeightCache>,
        policy: SimilarityPolicy,
        capacity: usize,
    ) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            db,
            weights,
            policy,
            memo: Mutex::new(LruCache::new(capacity)),
            epoch: Epoch::default(),
        }
    }

    pub fn policy(&self) -> SimilarityPolicy {
        self.policy
    }

    /// Items most similar to `item_id`, best first. Failures are logged and
    /// yield an empty list.
    pub fn find_related(&self, item_id: ItemId, limit: usize) -> Arc<Vec<RelatedItem>> {
        if let Some(hit) = self.memo.lock().get(&(item_id, limit)) {
            return Arc::clone(hit);
        }

        let epoch = self.epoch.current();
        match self.compute(item_id, limit) {
            Ok(related) => self.remember(epoch, (item_id, limit), Arc::new(related)),
            Err(e) => {
                error!("Related lookup for item {} failed: {}", item_id, e);
                Arc::new(Vec::new())
            }
        }
    }

    fn compute(&self, item_id: ItemId, limit: usize) -> Result<Vec<RelatedItem>> {
        if limit == 0 {
            return Ok(Vec::new());
        }

        let (reference, candidates) = {
            let conn = self.db.conn();
            let Some(reference) = queries::item_by_id(&conn, item_id)? else {
                return Ok(Vec::new());
            };
            if reference.tags.concatenated().is_empty() {
                return Ok(Vec::new());
            }
            let candidates =
                queries::related_candidates(&conn, item_id, RELATED_CANDIDATE_CEILING)?;
            (reference, candidates)
        };

        if self.policy == SimilarityPolicy::Weighted {
            self.weights.prime();
        }

        let reference_tags = reference.tags.tag_set();
        let mut related: Vec<RelatedItem> = candidates
            .par_iter()
            .filter_map(|candidate| {
                let score =
                    self.policy
                        .score(&reference_tags, &candidate.tags.tag_set(), &self.weights);
                (score >= MIN_RELATED_SCORE).then(|| RelatedItem {
                    item: SearchHit::from(candidate),
                    score,
                })
            })
            .collect();

        related.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(Ordering::Equal)
                .then(a.item.id.cmp(&b.item.id))
        });
        related.truncate(limit);
        debug!(
            "Scored {} candidates for item {}, kept {}",
            candidates.len(),
            item_id,
            related.len()
        );
        Ok(related)
    }

    /// Memoizes `related` unless the memo was cleared after `epoch` was read.
    fn remember(
        &self,
        epoch: u64,
        key: (ItemId, usize),
        related: Arc<Vec<RelatedItem>>,
    ) -> Arc<Vec<RelatedItem>> {
        let mut memo = self.memo.lock();
        if self.epoch.is_current(epoch) {
            memo.put(key, Arc::clone(&related));
        }
        related
    }

    pub fn invalidate(&self) {
        let mut memo = self.memo.lock();
        self.epoch.advance();
        memo.clear();
    }
}

impl CacheListener for RelatedFinder {
    fn name(&self) -> &str {
        "related_items"
    }

    fn on_invalidate(&self) -> anyhow::Result<()> {
        self.invalidate();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::RelatedFinder;
    use crate::database::queries;
    use crate::similarity::{SimilarityPolicy, WeightCache, WeightOptions};
    use crate::test_support::{catalog_with, catalog_with_policy, item};

    fn id_of(catalog: &crate::Catalog, path: &str) -> i64 {
        queries::item_id_by_path(&catalog.database().conn(), path)
            .unwrap()
            .unwrap()
    }

    #[test]
    fn ranks_by_overlap_and_excludes_reference() {
        let catalog = catalog_with_policy(
            vec![
                item("ref.png", &["a", "b", "c", "d"]),
                item("close.png", &["a", "b", "c"]),
                item("far.png", &["a", "x", "y", "z"]),
                item("none.png", &["q"]),
            ],
            SimilarityPolicy::Jaccard,
        );
        let reference = id_of(&catalog, "ref.png");

        let related = catalog.related(reference, 10);
        let paths: Vec<&str> = related.iter().map(|r| r.item.filepath.as_str()).collect();
        assert_eq!(paths, vec!["close.png", "far.png"]);
        assert!((related[0].score - 0.75).abs() < 1e-12);
        assert!(related.iter().all(|r| r.item.id != reference));
    }

    #[test]
    fn truncates_and_drops_weak_matches() {
        let mut items = vec![item("ref.png", &["shared", "t1", "t2", "t3"])];
        for n in 0..30 {
            let own = format!("own{n}");
            let extra: Vec<String> = (0..40).map(|k| format!("noise{n}_{k}")).collect();
            let mut tags: Vec<&str> = vec!["shared", own.as_str()];
            tags.extend(extra.iter().map(String::as_str));
            items.push(item(&format!("c{n}.png"), &tags));
        }
        items.push(item("good.png", &["shared", "t1", "t2"]));
        let catalog = catalog_with_policy(items, SimilarityPolicy::Jaccard);
        let reference = id_of(&catalog, "ref.png");

        let related = catalog.related(reference, 5);
        assert_eq!(related.len(), 1);
        assert_eq!(related[0].item.filepath, "good.png");
    }

    #[test]
    fn untagged_or_missing_reference_is_empty() {
        let catalog = catalog_with(vec![item("bare.png", &[]), item("b.png", &["a"])]);
        assert!(catalog.related(id_of(&catalog, "bare.png"), 5).is_empty());
        assert!(catalog.related(424_242, 5).is_empty());
        assert!(catalog.related(id_of(&catalog, "b.png"), 0).is_empty());
    }

    #[test]
    fn memo_is_dropped_on_tag_changes() -> anyhow::Result<()> {
        let catalog = catalog_with(vec![
            item("ref.png", &["a", "b"]),
            item("one.png", &["a", "b"]),
        ]);
        let reference = id_of(&catalog, "ref.png");
        assert_eq!(catalog.related(reference, 10).len(), 1);

        let mut writer = catalog.writer();
        writer.add(item("two.png", &["a", "b"]))?;
        writer.flush()?;

        assert_eq!(catalog.related(reference, 10).len(), 2);
        Ok(())
    }

    #[test]
    fn result_computed_across_an_invalidation_is_not_memoized() -> anyhow::Result<()> {
        let catalog = catalog_with(vec![
            item("ref.png", &["a", "b"]),
            item("one.png", &["a", "b"]),
        ]);
        let reference = id_of(&catalog, "ref.png");
        let finder = RelatedFinder::new(
            Arc::clone(catalog.database()),
            Arc::new(WeightCache::new(
                Arc::clone(catalog.database()),
                Arc::clone(catalog.directory()),
                WeightOptions::default(),
            )),
            SimilarityPolicy::Jaccard,
            8,
        );

        let epoch = finder.epoch.current();
        let stale = Arc::new(finder.compute(reference, 10)?);
        finder.invalidate();
        finder.remember(epoch, (reference, 10), stale);
        assert!(finder.memo.lock().is_empty());

        let epoch = finder.epoch.current();
        let fresh = Arc::new(finder.compute(reference, 10)?);
        finder.remember(epoch, (reference, 10), fresh);
        assert_eq!(finder.memo.lock().len(), 1);
        Ok(())
    }

    #[test]
    fn weighted_policy_prefers_rare_shared_tags() {
        let mut items = vec![
            item("ref.png", &["common", "rare"]),
            item("shares_rare.png", &["rare", "x"]),
            item("shares_common.png", &["common", "y"]),
        ];
        for n in 0..20 {
            items.push(item(&format!("filler{n}.png"), &["common"]));
        }
        let catalog = catalog_with_policy(items, SimilarityPolicy::Weighted);
        let reference = id_of(&catalog, "ref.png");

        let related = catalog.related(reference, 3);
        assert_eq!(related[0].item.filepath, "shares_rare.png");
    }
}
