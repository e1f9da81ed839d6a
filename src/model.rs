//! Core catalog types shared by the caches, the search engine and the writer.

use std::collections::HashSet;
use std::fmt;

use serde::{Deserialize, Serialize};

pub type TagId = i64;
pub type ItemId = i64;

/// Source label the local AI tagger writes for the items it annotated.
pub const AI_TAGGER_SOURCE: &str = "local_tagger";

/// Coarse tag classification. Every tag carries exactly one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TagCategory {
    General,
    Character,
    Copyright,
    Artist,
    Species,
    Meta,
    Rating,
}

impl TagCategory {
    pub const ALL: [TagCategory; 7] = [
        TagCategory::General,
        TagCategory::Character,
        TagCategory::Copyright,
        TagCategory::Artist,
        TagCategory::Species,
        TagCategory::Meta,
        TagCategory::Rating,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            TagCategory::General => "general",
            TagCategory::Character => "character",
            TagCategory::Copyright => "copyright",
            TagCategory::Artist => "artist",
            TagCategory::Species => "species",
            TagCategory::Meta => "meta",
            TagCategory::Rating => "rating",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.as_str() == value)
    }

    /// Name of the denormalized tag-string column on `items`.
    pub fn column(self) -> &'static str {
        match self {
            TagCategory::General => "tags_general",
            TagCategory::Character => "tags_character",
            TagCategory::Copyright => "tags_copyright",
            TagCategory::Artist => "tags_artist",
            TagCategory::Species => "tags_species",
            TagCategory::Meta => "tags_meta",
            TagCategory::Rating => "tags_rating",
        }
    }

    /// Only general and meta tags may carry an extended category.
    pub fn allows_extended(self) -> bool {
        matches!(self, TagCategory::General | TagCategory::Meta)
    }

    /// Categories a user may scope a term to with `category:term`.
    pub fn is_query_scopable(self) -> bool {
        !matches!(self, TagCategory::Rating)
    }

    fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for TagCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Finer-grained classification for general and meta tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtendedCategory {
    SubjectCount,
    Body,
    Attire,
    Expression,
    Action,
    Pose,
    Object,
    Setting,
    Composition,
    Style,
    Technical,
    Text,
}

impl ExtendedCategory {
    pub const ALL: [ExtendedCategory; 12] = [
        ExtendedCategory::SubjectCount,
        ExtendedCategory::Body,
        ExtendedCategory::Attire,
        ExtendedCategory::Expression,
        ExtendedCategory::Action,
        ExtendedCategory::Pose,
        ExtendedCategory::Object,
        ExtendedCategory::Setting,
        ExtendedCategory::Composition,
        ExtendedCategory::Style,
        ExtendedCategory::Technical,
        ExtendedCategory::Text,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ExtendedCategory::SubjectCount => "subject_count",
            ExtendedCategory::Body => "body",
            ExtendedCategory::Attire => "attire",
            ExtendedCategory::Expression => "expression",
            ExtendedCategory::Action => "action",
            ExtendedCategory::Pose => "pose",
            ExtendedCategory::Object => "object",
            ExtendedCategory::Setting => "setting",
            ExtendedCategory::Composition => "composition",
            ExtendedCategory::Style => "style",
            ExtendedCategory::Technical => "technical",
            ExtendedCategory::Text => "text",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.as_str() == value)
    }
}

/// Origin marker on an item↔tag edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Provenance {
    #[default]
    Original,
    User,
    AiInference,
    Implication,
}

impl Provenance {
    pub fn as_str(self) -> &'static str {
        match self {
            Provenance::Original => "original",
            Provenance::User => "user",
            Provenance::AiInference => "ai_inference",
            Provenance::Implication => "implication",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RatingLevel {
    General,
    Sensitive,
    Questionable,
    Explicit,
}

impl RatingLevel {
    /// Accepts full level names and their single-letter abbreviations.
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "general" | "g" => Some(RatingLevel::General),
            "sensitive" | "s" => Some(RatingLevel::Sensitive),
            "questionable" | "q" => Some(RatingLevel::Questionable),
            "explicit" | "e" => Some(RatingLevel::Explicit),
            _ => None,
        }
    }

    /// Canonical tag name, e.g. `rating:explicit`.
    pub fn tag_name(self) -> String {
        let level = match self {
            RatingLevel::General => "general",
            RatingLevel::Sensitive => "sensitive",
            RatingLevel::Questionable => "questionable",
            RatingLevel::Explicit => "explicit",
        };
        format!("rating:{level}")
    }
}

/// One row of the `tags` table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagRow {
    pub id: TagId,
    pub name: String,
    pub category: TagCategory,
    pub extended_category: Option<ExtendedCategory>,
}

/// The seven denormalized, space-joined tag strings of an item, indexed by
/// base category.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryTags([String; 7]);

impl CategoryTags {
    pub fn get(&self, category: TagCategory) -> &str {
        &self.0[category.index()]
    }

    pub fn set(&mut self, category: TagCategory, tags: impl Into<String>) {
        self.0[category.index()] = tags.into();
    }

    /// Every tag of the item joined by single spaces, in category order.
    pub fn concatenated(&self) -> String {
        self.0
            .iter()
            .filter(|s| !s.is_empty())
            .map(String::as_str)
            .collect::<Vec<_>>()
            .join(" ")
    }

    pub fn tag_set(&self) -> HashSet<&str> {
        self.0.iter().flat_map(|s| s.split_whitespace()).collect()
    }

    pub fn category_set(&self, category: TagCategory) -> HashSet<&str> {
        self.get(category).split_whitespace().collect()
    }
}

/// An item as read back from the persistence layer, with the facets the
/// post-filter and orderer need.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemRow {
    pub id: ItemId,
    pub filepath: String,
    pub filename: String,
    pub tags: CategoryTags,
    pub score: Option<i64>,
    pub fav_count: Option<i64>,
    pub ingested_at: Option<i64>,
    pub parent_id: Option<ItemId>,
    pub has_children: bool,
    pub upscaled: bool,
}

/// What a search hands back to the presentation layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchHit {
    pub id: ItemId,
    pub filepath: String,
    pub tags: String,
}

impl From<&ItemRow> for SearchHit {
    fn from(row: &ItemRow) -> Self {
        SearchHit {
            id: row.id,
            filepath: row.filepath.clone(),
            tags: row.tags.concatenated(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn category_tags_concatenate_in_category_order() {
        let mut tags = CategoryTags::default();
        tags.set(TagCategory::Rating, "rating:general");
        tags.set(TagCategory::General, "1girl solo");
        tags.set(TagCategory::Artist, "someone");

        assert_eq!(tags.concatenated(), "1girl solo someone rating:general");
        assert!(tags.tag_set().contains("solo"));
        assert!(!tags.category_set(TagCategory::General).contains("someone"));
    }

    #[test]
    fn rating_levels_accept_abbreviations() {
        assert_eq!(RatingLevel::parse("e"), Some(RatingLevel::Explicit));
        assert_eq!(RatingLevel::parse("questionable"), Some(RatingLevel::Questionable));
        assert_eq!(RatingLevel::parse("nsfw"), None);
        assert_eq!(RatingLevel::Sensitive.tag_name(), "rating:sensitive");
    }

    #[test]
    fn only_general_and_meta_allow_extended() {
        assert!(TagCategory::General.allows_extended());
        assert!(TagCategory::Meta.allows_extended());
        assert!(!TagCategory::Artist.allows_extended());
    }
}
