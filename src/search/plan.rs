use serde::Serialize;

use crate::search::query::{OrderKey, ParsedQuery};

/// Execution strategy chosen for one query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchPath {
    /// Only an order key: one pre-sorted scan.
    SimpleOrder,
    /// Only structural filters: one joined, pre-sorted query.
    SimpleFilter,
    /// Some term is not a known tag, or the query is freetext.
    Hybrid,
    /// Every general term is a known tag.
    ExactTag,
    /// Nothing to narrow by: the whole corpus.
    Fallback,
}

/// Picks the strategy for `query`. `exact[i]` says whether
/// `query.general[i]` names an existing tag.
pub fn select_path(query: &ParsedQuery, exact: &[bool]) -> SearchPath {
    let bare = !query.has_terms() && !query.freetext;

    if bare
        && !query.has_scoped_terms()
        && !query.has_structural_filters()
        && query.metadata.is_none()
    {
        return match query.order {
            Some(_) => SearchPath::SimpleOrder,
            None => SearchPath::Fallback,
        };
    }

    if bare && query.has_structural_filters() && query.metadata.is_none() {
        return SearchPath::SimpleFilter;
    }

    if query.freetext || exact.iter().any(|is_exact| !is_exact) {
        return SearchPath::Hybrid;
    }

    if query.has_terms() {
        SearchPath::ExactTag
    } else {
        SearchPath::Fallback
    }
}

/// Whether the caller may present results of `path` in random order.
pub fn shuffle_eligible(path: SearchPath, query: &ParsedQuery) -> bool {
    let random = query.order == Some(OrderKey::Random);
    match path {
        SearchPath::Hybrid => false,
        SearchPath::SimpleOrder | SearchPath::SimpleFilter => random,
        SearchPath::ExactTag | SearchPath::Fallback => {
            !query.has_structural_filters() && (query.order.is_none() || random)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::search::query::parse;

    fn path_for(raw: &str, exact: &[bool]) -> SearchPath {
        select_path(&parse(raw), exact)
    }

    #[test]
    fn selection_order() {
        assert_eq!(path_for("order:new", &[]), SearchPath::SimpleOrder);
        assert_eq!(path_for("source:pixiv .png order:score", &[]), SearchPath::SimpleFilter);
        assert_eq!(path_for("source:pixiv metadata:missing", &[]), SearchPath::Fallback);
        assert_eq!(path_for("tag1 tag2", &[true, true]), SearchPath::ExactTag);
        assert_eq!(path_for("tag1 tagx", &[true, false]), SearchPath::Hybrid);
        assert_eq!(path_for("", &[]), SearchPath::Fallback);
        assert_eq!(path_for("-tag1", &[]), SearchPath::ExactTag);
        assert_eq!(path_for("character:miku", &[]), SearchPath::Fallback);
    }

    #[test]
    fn quoted_queries_go_hybrid_even_for_known_tags() {
        let query = parse(r#""exact phrase" -excluded"#);
        assert_eq!(select_path(&query, &[true]), SearchPath::Hybrid);
    }

    #[test]
    fn shuffle_rules() {
        let plain = parse("tag1");
        assert!(shuffle_eligible(SearchPath::ExactTag, &plain));
        assert!(!shuffle_eligible(SearchPath::ExactTag, &parse("tag1 pool:x")));
        assert!(!shuffle_eligible(SearchPath::ExactTag, &parse("tag1 order:new")));
        assert!(shuffle_eligible(SearchPath::Fallback, &parse("")));
        assert!(!shuffle_eligible(SearchPath::Hybrid, &parse("tag1 order:random")));
        assert!(shuffle_eligible(SearchPath::SimpleOrder, &parse("order:random")));
        assert!(!shuffle_eligible(SearchPath::SimpleOrder, &parse("order:new")));
    }
}
