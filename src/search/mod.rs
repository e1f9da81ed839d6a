//! Hybrid tag / full-text search.
//!
//! A raw query is parsed into a [`ParsedQuery`], routed to one of five
//! execution paths, post-filtered in memory and ordered. Searches never
//! fail: backend errors are logged and produce an empty result.

pub mod executor;
pub mod filter;
pub mod plan;
pub mod query;

use std::sync::Arc;

use rand::seq::SliceRandom;
use rand::Rng;
use rusqlite::Connection;
use serde::Serialize;
use tracing::{debug, error, warn};

use crate::cache::TagDirectory;
use crate::database::Database;
use crate::error::Result;
use crate::model::{ItemRow, SearchHit, TagId};

pub use filter::{sort_rows, FilterContext, PostFilter};
pub use plan::{select_path, shuffle_eligible, SearchPath};
pub use query::{parse, OrderKey, ParsedQuery, QueryToken};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchResults {
    pub hits: Vec<SearchHit>,
    /// The caller may present `hits` in random order.
    pub shuffle_eligible: bool,
    pub path: SearchPath,
}

impl SearchResults {
    pub fn empty(path: SearchPath) -> Self {
        Self {
            hits: Vec::new(),
            shuffle_eligible: false,
            path,
        }
    }

    pub fn len(&self) -> usize {
        self.hits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hits.is_empty()
    }

    /// Shuffles the hits in place when the result allows it.
    pub fn shuffle<R: Rng + ?Sized>(&mut self, rng: &mut R) -> bool {
        if self.shuffle_eligible {
            self.hits.shuffle(rng);
        }
        self.shuffle_eligible
    }

    /// One-based page of `per_page` hits; empty past the end.
    pub fn page(&self, page: usize, per_page: usize) -> &[SearchHit] {
        if page == 0 || per_page == 0 {
            return &[];
        }
        let start = (page - 1).saturating_mul(per_page);
        if start >= self.hits.len() {
            return &[];
        }
        let end = start.saturating_add(per_page).min(self.hits.len());
        &self.hits[start..end]
    }

    pub fn into_parts(self) -> (Vec<SearchHit>, bool) {
        (self.hits, self.shuffle_eligible)
    }
}

/// Rows from one executor plus what it already took care of.
struct Retrieved {
    rows: Vec<ItemRow>,
    ordered: bool,
    structural_in_sql: bool,
}

pub struct SearchEngine {
    db: Arc<Database>,
    directory: Arc<TagDirectory>,
}

impl SearchEngine {
    pub fn new(db: Arc<Database>, directory: Arc<TagDirectory>) -> Self {
        Self { db, directory }
    }

    pub fn search(&self, raw_query: &str) -> SearchResults {
        self.execute(&parse(raw_query))
    }

    pub fn execute(&self, query: &ParsedQuery) -> SearchResults {
        // Resolve everything the executors need from the directory before the
        // connection is locked.
        let exact: Vec<bool> = query
            .general
            .iter()
            .map(|term| self.directory.get_id(term).is_some())
            .collect();
        let path = select_path(query, &exact);
        let (include, exclude) = if path == SearchPath::ExactTag {
            (
                self.directory.ids_from_names(&query.general),
                self.directory.ids_from_names(&query.negative),
            )
        } else {
            (Vec::new(), Vec::new())
        };
        debug!("Query {:?} routed to {:?}", query, path);

        let conn = self.db.conn();
        match run_path(&conn, query, path, &exact, &include, &exclude) {
            Ok(Some(rows)) => {
                let hits: Vec<SearchHit> = rows.iter().map(SearchHit::from).collect();
                debug!("{:?} search returned {} hits", path, hits.len());
                SearchResults {
                    hits,
                    shuffle_eligible: shuffle_eligible(path, query),
                    path,
                }
            }
            Ok(None) => SearchResults::empty(path),
            Err(e) => {
                error!("{:?} search failed: {}", path, e);
                SearchResults::empty(path)
            }
        }
    }
}

/// `Ok(None)` means the text index rejected the query.
fn run_path(
    conn: &Connection,
    query: &ParsedQuery,
    path: SearchPath,
    exact: &[bool],
    include: &[TagId],
    exclude: &[TagId],
) -> Result<Option<Vec<ItemRow>>> {
    let retrieved = match path {
        SearchPath::SimpleOrder => {
            let rows = executor::scan_ordered(conn, query.order)?;
            return Ok(Some(rows));
        }
        SearchPath::SimpleFilter => Retrieved {
            rows: executor::scan_filtered(conn, query)?,
            ordered: true,
            structural_in_sql: true,
        },
        SearchPath::Hybrid => match executor::hybrid(conn, query, exact) {
            Ok(rows) => Retrieved {
                rows,
                ordered: false,
                structural_in_sql: false,
            },
            Err(e) => {
                warn!(
                    "Text index rejected {:?}: {}",
                    executor::match_expression(query, exact),
                    e
                );
                return Ok(None);
            }
        },
        SearchPath::ExactTag => Retrieved {
            rows: executor::exact_tags(conn, query, include, exclude)?,
            ordered: false,
            structural_in_sql: true,
        },
        SearchPath::Fallback => Retrieved {
            rows: executor::full_corpus(conn)?,
            ordered: false,
            structural_in_sql: false,
        },
    };

    let context = FilterContext::load(conn, query, retrieved.structural_in_sql)?;
    let mut rows =
        PostFilter::new(query, !retrieved.structural_in_sql, context).retain(retrieved.rows);
    if let (Some(key), false) = (query.order, retrieved.ordered) {
        sort_rows(&mut rows, key);
    }
    Ok(Some(rows))
}
