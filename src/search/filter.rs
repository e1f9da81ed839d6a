//! In-memory post-filter and orderer.
//!
//! Every executor hands its candidates through here. Checks the executor
//! already enforced in SQL are skipped; the rest are applied to each row.

use std::collections::{HashMap, HashSet};

use rusqlite::Connection;

use crate::database::queries;
use crate::error::Result;
use crate::model::{ItemId, ItemRow, TagCategory, AI_TAGGER_SOURCE};
use crate::search::query::{
    MetadataFilter, OrderKey, ParsedQuery, PoolFilter, RelationshipFilter, UpscaledFilter,
};

/// Side tables the row-level checks need, loaded once per search.
#[derive(Debug, Default)]
pub struct FilterContext {
    pool_members: Option<HashSet<ItemId>>,
    favorites: Option<HashSet<ItemId>>,
    sources: Option<HashMap<ItemId, Vec<String>>>,
}

impl FilterContext {
    /// Loads only what `query` will actually consult. With `structural_in_sql`
    /// the pool, favorite and source filters were handled by the executor.
    pub fn load(conn: &Connection, query: &ParsedQuery, structural_in_sql: bool) -> Result<Self> {
        let mut context = FilterContext::default();

        if !structural_in_sql {
            context.pool_members = match &query.pool {
                Some(PoolFilter::Named(name)) => Some(queries::pool_members(conn, Some(name))?),
                Some(PoolFilter::Any) => Some(queries::pool_members(conn, None)?),
                None => None,
            };
            if query.favorite {
                context.favorites = Some(queries::favorite_ids(conn)?);
            }
        }

        let needs_sources =
            query.metadata.is_some() || (!structural_in_sql && !query.sources.is_empty());
        if needs_sources {
            context.sources = Some(queries::item_sources(conn)?);
        }
        Ok(context)
    }

    fn sources_of(&self, id: ItemId) -> &[String] {
        self.sources
            .as_ref()
            .and_then(|all| all.get(&id))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }
}

pub struct PostFilter<'q> {
    query: &'q ParsedQuery,
    structural: bool,
    context: FilterContext,
}

impl<'q> PostFilter<'q> {
    /// `structural` selects whether source/extension/filename/pool/
    /// relationship/favorite/upscaled checks run here.
    pub fn new(query: &'q ParsedQuery, structural: bool, context: FilterContext) -> Self {
        Self {
            query,
            structural,
            context,
        }
    }

    pub fn retain(&self, mut rows: Vec<ItemRow>) -> Vec<ItemRow> {
        rows.retain(|row| self.accepts(row));
        rows
    }

    pub fn accepts(&self, row: &ItemRow) -> bool {
        (!self.structural || self.structural_ok(row))
            && self.metadata_ok(row)
            && self.categories_ok(row)
            && self.ratings_ok(row)
            && self.terms_ok(row)
    }

    fn structural_ok(&self, row: &ItemRow) -> bool {
        let query = self.query;

        if !query.sources.is_empty() {
            let sources = self.context.sources_of(row.id);
            if !sources.iter().any(|s| query.sources.contains(s)) {
                return false;
            }
        }

        if !query.extensions.is_empty() {
            let path = row.filepath.to_lowercase();
            if !query.extensions.iter().any(|ext| path.ends_with(ext.as_str())) {
                return false;
            }
        }

        if let Some(fragment) = &query.filename {
            if !row.filename.to_lowercase().contains(fragment.as_str()) {
                return false;
            }
        }

        if query.pool.is_some() {
            let member = self
                .context
                .pool_members
                .as_ref()
                .is_some_and(|members| members.contains(&row.id));
            if !member {
                return false;
            }
        }

        let related_ok = match query.relationship {
            Some(RelationshipFilter::HasParent) => row.parent_id.is_some(),
            Some(RelationshipFilter::HasChildren) => row.has_children,
            Some(RelationshipFilter::Any) => row.parent_id.is_some() || row.has_children,
            None => true,
        };
        if !related_ok {
            return false;
        }

        if query.favorite
            && !self
                .context
                .favorites
                .as_ref()
                .is_some_and(|favs| favs.contains(&row.id))
        {
            return false;
        }

        match query.upscaled() {
            Some(UpscaledFilter::Present) => row.upscaled,
            Some(UpscaledFilter::Absent) => !row.upscaled,
            None => true,
        }
    }

    fn metadata_ok(&self, row: &ItemRow) -> bool {
        let Some(filter) = self.query.metadata else {
            return true;
        };
        let has_external = self
            .context
            .sources_of(row.id)
            .iter()
            .any(|s| s != AI_TAGGER_SOURCE);
        match filter {
            MetadataFilter::Missing => !has_external,
            MetadataFilter::Present => has_external,
        }
    }

    fn categories_ok(&self, row: &ItemRow) -> bool {
        self.query.categories.iter().all(|(category, terms)| {
            let lowered = row.tags.get(*category).to_lowercase();
            let present: HashSet<&str> = lowered.split_whitespace().collect();
            terms.iter().all(|term| present.contains(term.as_str()))
        })
    }

    /// The item's rating set must equal the requested set exactly.
    fn ratings_ok(&self, row: &ItemRow) -> bool {
        if self.query.ratings.is_empty() {
            return true;
        }
        let requested: HashSet<&str> = self.query.ratings.iter().map(String::as_str).collect();
        let lowered = row.tags.get(TagCategory::Rating).to_lowercase();
        let held: HashSet<&str> = lowered.split_whitespace().collect();
        let matched = held.intersection(&requested).count();
        matched == requested.len() && matched == held.len()
    }

    fn terms_ok(&self, row: &ItemRow) -> bool {
        if !self.query.has_terms() {
            return true;
        }
        let all_tags = row.tags.concatenated().to_lowercase();
        let tag_set: HashSet<&str> = all_tags.split_whitespace().collect();
        let path = row.filepath.to_lowercase();

        let contains = |term: &str| {
            tag_set.contains(term) || all_tags.contains(term) || path.contains(term)
        };
        let excluded = |term: &str| tag_set.contains(term) || path.contains(term);

        self.query.general.iter().all(|term| contains(term.as_str()))
            && !self.query.negative.iter().any(|term| excluded(term.as_str()))
    }
}

/// Stable in-memory sort by `key`. Unset facets sort as the lowest value.
pub fn sort_rows(rows: &mut [ItemRow], key: OrderKey) {
    match key {
        OrderKey::Newest => rows.sort_by(|a, b| b.ingested_at.cmp(&a.ingested_at)),
        OrderKey::Oldest => rows.sort_by(|a, b| a.ingested_at.cmp(&b.ingested_at)),
        OrderKey::Score => rows.sort_by(|a, b| b.score.cmp(&a.score)),
        OrderKey::Favorites => rows.sort_by(|a, b| b.fav_count.cmp(&a.fav_count)),
        OrderKey::Random => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::CategoryTags;
    use crate::search::query::parse;

    fn row(id: ItemId, path: &str, general: &str) -> ItemRow {
        let mut tags = CategoryTags::default();
        tags.set(TagCategory::General, general);
        ItemRow {
            id,
            filepath: path.to_string(),
            filename: path.rsplit('/').next().unwrap_or(path).to_string(),
            tags,
            score: None,
            fav_count: None,
            ingested_at: None,
            parent_id: None,
            has_children: false,
            upscaled: false,
        }
    }

    fn filter(query: &ParsedQuery) -> PostFilter<'_> {
        PostFilter::new(query, true, FilterContext::default())
    }

    #[test]
    fn terms_match_tags_or_path() {
        let query = parse("beach");
        let f = filter(&query);
        assert!(f.accepts(&row(1, "/pics/sunset_beach.png", "")));
        assert!(f.accepts(&row(2, "/pics/a.png", "beach sky")));
        assert!(!f.accepts(&row(3, "/pics/a.png", "sky")));
    }

    #[test]
    fn negative_terms_exclude_on_tag_or_path() {
        let query = parse("sky -beach");
        let f = filter(&query);
        assert!(f.accepts(&row(1, "/pics/a.png", "sky")));
        assert!(!f.accepts(&row(2, "/pics/a.png", "sky beach")));
        assert!(!f.accepts(&row(3, "/beach/a.png", "sky")));
        // Substring of a longer tag does not exclude.
        assert!(f.accepts(&row(4, "/pics/a.png", "sky beachball")));
    }

    #[test]
    fn rating_sets_must_match_exactly() {
        let mut both = row(1, "a.png", "x");
        both.tags.set(TagCategory::Rating, "rating:general rating:explicit");
        let mut single = row(2, "b.png", "x");
        single.tags.set(TagCategory::Rating, "rating:explicit");

        let query = parse("rating:e");
        let f = filter(&query);
        assert!(!f.accepts(&both));
        assert!(f.accepts(&single));

        let query = parse("rating:e rating:g");
        let f = filter(&query);
        assert!(f.accepts(&both));
        assert!(!f.accepts(&single));
    }

    #[test]
    fn category_scope_is_respected() {
        let mut miku = row(1, "a.png", "smile");
        miku.tags.set(TagCategory::Character, "hatsune_miku");
        let general_only = row(2, "b.png", "hatsune_miku");

        let query = parse("character:hatsune_miku");
        let f = filter(&query);
        assert!(f.accepts(&miku));
        assert!(!f.accepts(&general_only));
    }

    #[test]
    fn structural_checks_can_be_skipped() {
        let query = parse("has:upscaled .png");
        let jpg = row(1, "a.jpg", "");
        assert!(!filter(&query).accepts(&jpg));
        assert!(PostFilter::new(&query, false, FilterContext::default()).accepts(&jpg));
    }

    #[test]
    fn metadata_ignores_the_ai_tagger() {
        let mut sources = HashMap::new();
        sources.insert(1, vec![AI_TAGGER_SOURCE.to_string()]);
        sources.insert(2, vec![AI_TAGGER_SOURCE.to_string(), "danbooru".to_string()]);
        let context = || FilterContext {
            sources: Some(sources.clone()),
            ..FilterContext::default()
        };

        let missing = parse("metadata:missing");
        let f = PostFilter::new(&missing, true, context());
        assert!(f.accepts(&row(1, "a.png", "")));
        assert!(!f.accepts(&row(2, "b.png", "")));
        assert!(f.accepts(&row(3, "c.png", "")));

        let present = parse("metadata:present");
        let f = PostFilter::new(&present, true, context());
        assert!(f.accepts(&row(2, "b.png", "")));
        assert!(!f.accepts(&row(3, "c.png", "")));
    }

    #[test]
    fn unset_values_sort_lowest_and_ties_keep_order() {
        let mut rows: Vec<ItemRow> = (1..=4).map(|id| row(id, "x.png", "")).collect();
        rows[0].score = Some(5);
        rows[1].score = None;
        rows[2].score = Some(9);
        rows[3].score = Some(5);

        sort_rows(&mut rows, OrderKey::Score);
        let ids: Vec<ItemId> = rows.iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![3, 1, 4, 2]);

        rows.iter_mut().for_each(|r| r.ingested_at = r.score);
        sort_rows(&mut rows, OrderKey::Oldest);
        assert_eq!(rows[0].id, 2);
    }
}
