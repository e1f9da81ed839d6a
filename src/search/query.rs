//! Query language.
//!
//! A query is split on whitespace and case-folded. Each token is classified
//! into exactly one [`QueryToken`]; anything the classifier does not
//! recognise becomes [`QueryToken::General`], so no query is ever rejected.
//!
//! ```text
//! 1girl -solo character:hatsune_miku rating:e source:danbooru .png order:score
//! "blue sky" has:pool -has:upscaled is:favorite metadata:missing
//! ```

use std::collections::BTreeMap;

use crate::model::{RatingLevel, TagCategory};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PoolFilter {
    Any,
    Named(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelationshipFilter {
    HasParent,
    HasChildren,
    Any,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderKey {
    Newest,
    Oldest,
    Score,
    Favorites,
    Random,
}

impl OrderKey {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "new" | "newest" | "recent" | "date" => Some(OrderKey::Newest),
            "old" | "oldest" | "date_asc" => Some(OrderKey::Oldest),
            "score" | "score_desc" => Some(OrderKey::Score),
            "fav" | "favs" | "favorites" | "favourites" => Some(OrderKey::Favorites),
            "random" | "shuffle" => Some(OrderKey::Random),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetadataFilter {
    /// No source other than the local AI tagger.
    Missing,
    Present,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpscaledFilter {
    Present,
    Absent,
}

/// One classified query token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryToken {
    /// Fallthrough for everything not matched below.
    General(String),
    /// Quoted run of words; switches the query to freetext mode.
    Phrase(String),
    Negative(String),
    Category { category: TagCategory, term: String },
    Rating(RatingLevel),
    Source(String),
    Filename(String),
    Extensions(Vec<String>),
    Pool(PoolFilter),
    Relationship(RelationshipFilter),
    Order(OrderKey),
    Favorite,
    Metadata(MetadataFilter),
    Upscaled(UpscaledFilter),
}

/// Structured form of a raw query string.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedQuery {
    pub general: Vec<String>,
    pub negative: Vec<String>,
    pub categories: BTreeMap<TagCategory, Vec<String>>,
    /// Canonical `rating:<level>` tag names.
    pub ratings: Vec<String>,
    pub sources: Vec<String>,
    pub filename: Option<String>,
    /// Lowercase, dot-prefixed.
    pub extensions: Vec<String>,
    pub pool: Option<PoolFilter>,
    pub relationship: Option<RelationshipFilter>,
    pub order: Option<OrderKey>,
    pub favorite: bool,
    pub metadata: Option<MetadataFilter>,
    pub upscaled_present: bool,
    pub upscaled_absent: bool,
    /// Set by any quoted phrase; forces text-index execution.
    pub freetext: bool,
}

impl ParsedQuery {
    fn apply(&mut self, token: QueryToken) {
        match token {
            QueryToken::General(term) => self.general.push(term),
            QueryToken::Phrase(phrase) => {
                self.freetext = true;
                self.general.push(phrase);
            }
            QueryToken::Negative(term) => self.negative.push(term),
            QueryToken::Category { category, term } => {
                self.categories.entry(category).or_default().push(term)
            }
            QueryToken::Rating(level) => self.ratings.push(level.tag_name()),
            QueryToken::Source(source) => self.sources.push(source),
            QueryToken::Filename(fragment) => self.filename = Some(fragment),
            QueryToken::Extensions(exts) => self.extensions.extend(exts),
            QueryToken::Pool(pool) => self.pool = Some(pool),
            QueryToken::Relationship(kind) => self.relationship = Some(kind),
            QueryToken::Order(key) => self.order = Some(key),
            QueryToken::Favorite => self.favorite = true,
            QueryToken::Metadata(filter) => self.metadata = Some(filter),
            QueryToken::Upscaled(UpscaledFilter::Present) => self.upscaled_present = true,
            QueryToken::Upscaled(UpscaledFilter::Absent) => self.upscaled_absent = true,
        }
    }

    /// Quoted run, kept whole. Empty phrases are dropped.
    fn apply_phrase(&mut self, negated: bool, phrase: String) {
        if phrase.is_empty() {
            return;
        }
        if negated {
            self.negative.push(phrase);
        } else {
            self.apply(QueryToken::Phrase(phrase));
        }
    }

    /// Effective upscaled filter; absent wins when both were given.
    pub fn upscaled(&self) -> Option<UpscaledFilter> {
        if self.upscaled_absent {
            Some(UpscaledFilter::Absent)
        } else if self.upscaled_present {
            Some(UpscaledFilter::Present)
        } else {
            None
        }
    }

    /// General or negative terms present.
    pub fn has_terms(&self) -> bool {
        !self.general.is_empty() || !self.negative.is_empty()
    }

    /// Category-scoped or rating terms present.
    pub fn has_scoped_terms(&self) -> bool {
        !self.categories.is_empty() || !self.ratings.is_empty()
    }

    /// Filters that can be expressed directly against the item tables.
    pub fn has_structural_filters(&self) -> bool {
        !self.sources.is_empty()
            || self.filename.is_some()
            || !self.extensions.is_empty()
            || self.pool.is_some()
            || self.relationship.is_some()
            || self.favorite
            || self.upscaled().is_some()
    }

    pub fn is_empty(&self) -> bool {
        !self.has_terms()
            && !self.has_scoped_terms()
            && !self.has_structural_filters()
            && self.metadata.is_none()
            && self.order.is_none()
            && !self.freetext
    }
}

/// Parses a raw query. Never fails.
pub fn parse(raw_query: &str) -> ParsedQuery {
    let lowered = raw_query.to_lowercase();
    let mut query = ParsedQuery::default();
    // Words of a quoted run that has been opened but not closed yet, and
    // whether the run was negated with a leading `-`.
    let mut open_phrase: Option<(bool, Vec<&str>)> = None;

    for raw in lowered.split_whitespace() {
        if let Some((negated, words)) = open_phrase.as_mut() {
            match raw.strip_suffix('"') {
                Some(last) => {
                    push_word(words, last);
                    query.apply_phrase(*negated, words.join(" "));
                    open_phrase = None;
                }
                None => push_word(words, raw),
            }
            continue;
        }

        let (negated, quoted) = match raw.strip_prefix("-\"") {
            Some(rest) => (true, Some(rest)),
            None => (false, raw.strip_prefix('"')),
        };
        if let Some(rest) = quoted {
            query.freetext = true;
            match rest.strip_suffix('"') {
                Some(inner) => query.apply_phrase(negated, inner.trim_matches('"').to_string()),
                None => {
                    let mut words = Vec::new();
                    push_word(&mut words, rest);
                    open_phrase = Some((negated, words));
                }
            }
            continue;
        }

        query.apply(classify(raw));
    }

    // An unclosed quote swallows the rest of the query.
    if let Some((negated, words)) = open_phrase {
        query.apply_phrase(negated, words.join(" "));
    }

    query
}

fn push_word<'a>(words: &mut Vec<&'a str>, word: &'a str) {
    let word = word.trim_matches('"');
    if !word.is_empty() {
        words.push(word);
    }
}

/// Classifies a single lowercase token.
pub fn classify(token: &str) -> QueryToken {
    if token == "-has:upscaled" {
        return QueryToken::Upscaled(UpscaledFilter::Absent);
    }
    if let Some(rest) = token.strip_prefix('-') {
        if !rest.is_empty() {
            return QueryToken::Negative(negative_term(rest));
        }
    }

    if let Some((prefix, value)) = token.split_once(':') {
        if let Some(classified) = classify_prefixed(prefix, value) {
            return classified;
        }
    }

    if let Some(level) = token.strip_prefix("rating_").and_then(RatingLevel::parse) {
        return QueryToken::Rating(level);
    }

    if token.len() > 1 && token.starts_with('.') && !token[1..].contains('.') {
        return QueryToken::Extensions(vec![token.to_string()]);
    }

    QueryToken::General(token.to_string())
}

/// Negated ratings use the canonical tag name so `-rating:e` excludes the
/// same items as `-rating:explicit`.
fn negative_term(term: &str) -> String {
    let level = term
        .strip_prefix("rating:")
        .or_else(|| term.strip_prefix("rating_"))
        .and_then(RatingLevel::parse);
    match level {
        Some(level) => level.tag_name(),
        None => term.to_string(),
    }
}

fn classify_prefixed(prefix: &str, value: &str) -> Option<QueryToken> {
    if value.is_empty() {
        return None;
    }
    let token = match prefix {
        "source" => QueryToken::Source(value.to_string()),
        "filename" => QueryToken::Filename(value.to_string()),
        "pool" => QueryToken::Pool(PoolFilter::Named(value.to_string())),
        "order" => QueryToken::Order(OrderKey::parse(value)?),
        "rating" => QueryToken::Rating(RatingLevel::parse(value)?),
        "metadata" => QueryToken::Metadata(match value {
            "missing" | "none" => MetadataFilter::Missing,
            "found" | "present" | "any" => MetadataFilter::Present,
            _ => return None,
        }),
        "has" => match value {
            "pool" => QueryToken::Pool(PoolFilter::Any),
            "video" => QueryToken::Extensions(vec![".mp4".to_string(), ".webm".to_string()]),
            "upscaled" => QueryToken::Upscaled(UpscaledFilter::Present),
            "parent" => QueryToken::Relationship(RelationshipFilter::HasParent),
            "child" | "children" => QueryToken::Relationship(RelationshipFilter::HasChildren),
            "relationship" | "relation" | "family" => {
                QueryToken::Relationship(RelationshipFilter::Any)
            }
            _ => return None,
        },
        "is" => match value {
            "favorite" | "favourite" | "fav" => QueryToken::Favorite,
            "upscaled" => QueryToken::Upscaled(UpscaledFilter::Present),
            _ => return None,
        },
        other => {
            let category = TagCategory::parse(other).filter(|c| c.is_query_scopable())?;
            QueryToken::Category {
                category,
                term: value.to_string(),
            }
        }
    };
    Some(token)
}
