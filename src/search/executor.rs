//! Candidate retrieval, one function per [`SearchPath`](super::SearchPath).
//!
//! Executors run with the connection locked and must not call into the
//! caches; tag ids are resolved by the caller beforehand.

use std::collections::BTreeSet;

use rusqlite::types::Value;
use rusqlite::{params_from_iter, Connection};

use crate::database::queries::{read_item_row, ITEM_COLUMNS};
use crate::error::Result;
use crate::model::{ItemRow, TagCategory, TagId};
use crate::search::query::{
    OrderKey, ParsedQuery, PoolFilter, RelationshipFilter, UpscaledFilter,
};

/// Conjunctive WHERE clause with its positional parameters.
#[derive(Default)]
struct Conditions {
    clauses: Vec<String>,
    params: Vec<Value>,
}

impl Conditions {
    fn push(&mut self, clause: impl Into<String>, params: impl IntoIterator<Item = Value>) {
        self.clauses.push(clause.into());
        self.params.extend(params);
    }

    fn sql(&self) -> String {
        if self.clauses.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", self.clauses.join(" AND "))
        }
    }
}

fn placeholders(n: usize) -> String {
    vec!["?"; n].join(", ")
}

fn text(value: &str) -> Value {
    Value::Text(value.to_string())
}

fn escape_like(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        if matches!(c, '\\' | '%' | '_') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

/// ORDER BY body for `order`. SQLite sorts NULL lowest, which is the
/// sentinel we want for unset facets.
fn order_sql(order: Option<OrderKey>) -> &'static str {
    match order {
        Some(OrderKey::Newest) => "items.ingested_at DESC, items.id DESC",
        Some(OrderKey::Oldest) => "items.ingested_at ASC, items.id ASC",
        Some(OrderKey::Score) => "items.score DESC, items.id ASC",
        Some(OrderKey::Favorites) => "items.fav_count DESC, items.id ASC",
        Some(OrderKey::Random) | None => "items.id ASC",
    }
}

/// Source, extension, filename, pool, relationship, favorite and upscaled
/// filters as SQL. The metadata filter never reaches SQL.
fn push_structural(conditions: &mut Conditions, query: &ParsedQuery) {
    if !query.sources.is_empty() {
        conditions.push(
            format!(
                "EXISTS (SELECT 1 FROM item_sources s WHERE s.item_id = items.id AND s.source IN ({}))",
                placeholders(query.sources.len())
            ),
            query.sources.iter().map(|s| text(s)),
        );
    }

    if !query.extensions.is_empty() {
        let clause = vec!["lower(items.filepath) LIKE ? ESCAPE '\\'"; query.extensions.len()]
            .join(" OR ");
        conditions.push(
            format!("({clause})"),
            query
                .extensions
                .iter()
                .map(|ext| Value::Text(format!("%{}", escape_like(ext)))),
        );
    }

    if let Some(fragment) = &query.filename {
        conditions.push("instr(lower(items.filename), ?) > 0", [text(fragment)]);
    }

    match &query.pool {
        Some(PoolFilter::Named(name)) => conditions.push(
            "EXISTS (SELECT 1 FROM pool_items pi JOIN pools p ON p.id = pi.pool_id \
             WHERE pi.item_id = items.id AND lower(p.name) = ?)",
            [text(name)],
        ),
        Some(PoolFilter::Any) => conditions.push(
            "EXISTS (SELECT 1 FROM pool_items pi WHERE pi.item_id = items.id)",
            [],
        ),
        None => {}
    }

    match query.relationship {
        Some(RelationshipFilter::HasParent) => {
            conditions.push("items.parent_id IS NOT NULL", [])
        }
        Some(RelationshipFilter::HasChildren) => conditions.push("items.has_children = 1", []),
        Some(RelationshipFilter::Any) => conditions.push(
            "(items.parent_id IS NOT NULL OR items.has_children = 1)",
            [],
        ),
        None => {}
    }

    if query.favorite {
        conditions.push(
            "EXISTS (SELECT 1 FROM favorites f WHERE f.item_id = items.id)",
            [],
        );
    }

    match query.upscaled() {
        Some(UpscaledFilter::Present) => conditions.push("items.upscaled_width IS NOT NULL", []),
        Some(UpscaledFilter::Absent) => conditions.push("items.upscaled_width IS NULL", []),
        None => {}
    }
}

fn run(conn: &Connection, sql: &str, params: Vec<Value>) -> Result<Vec<ItemRow>> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt.query_map(params_from_iter(params), read_item_row)?;
    Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
}

/// Whole corpus, sorted by `order`.
pub fn scan_ordered(conn: &Connection, order: Option<OrderKey>) -> Result<Vec<ItemRow>> {
    let sql = format!("SELECT {ITEM_COLUMNS} FROM items ORDER BY {}", order_sql(order));
    run(conn, &sql, Vec::new())
}

/// Items passing the structural filters, sorted by the query's order key.
pub fn scan_filtered(conn: &Connection, query: &ParsedQuery) -> Result<Vec<ItemRow>> {
    let mut conditions = Conditions::default();
    push_structural(&mut conditions, query);
    let sql = format!(
        "SELECT {ITEM_COLUMNS} FROM items {} ORDER BY {}",
        conditions.sql(),
        order_sql(query.order)
    );
    run(conn, &sql, conditions.params)
}

/// Items carrying every tag in `include` and none in `exclude`, narrowed by
/// the structural filters. Matching goes through the `item_tags` relation.
pub fn exact_tags(
    conn: &Connection,
    query: &ParsedQuery,
    include: &[TagId],
    exclude: &[TagId],
) -> Result<Vec<ItemRow>> {
    let include: BTreeSet<TagId> = include.iter().copied().collect();
    let exclude: BTreeSet<TagId> = exclude.iter().copied().collect();
    let mut conditions = Conditions::default();

    if !include.is_empty() {
        let mut params: Vec<Value> = include.iter().map(|&id| Value::Integer(id)).collect();
        params.push(Value::Integer(include.len() as i64));
        conditions.push(
            format!(
                "items.id IN (SELECT item_id FROM item_tags WHERE tag_id IN ({}) \
                 GROUP BY item_id HAVING COUNT(*) = ?)",
                placeholders(include.len())
            ),
            params,
        );
    }

    if !exclude.is_empty() {
        conditions.push(
            format!(
                "NOT EXISTS (SELECT 1 FROM item_tags x WHERE x.item_id = items.id AND x.tag_id IN ({}))",
                placeholders(exclude.len())
            ),
            exclude.iter().map(|&id| Value::Integer(id)),
        );
    }

    push_structural(&mut conditions, query);

    let sql = format!(
        "SELECT {ITEM_COLUMNS} FROM items {} ORDER BY items.id ASC",
        conditions.sql()
    );
    run(conn, &sql, conditions.params)
}

/// Whole corpus in storage order.
pub fn full_corpus(conn: &Connection) -> Result<Vec<ItemRow>> {
    scan_ordered(conn, None)
}

fn fts_quote(term: &str) -> String {
    format!("\"{}\"", term.replace('"', "\"\""))
}

/// FTS5 expression for the general and negative terms: exact phrases for
/// known tags, prefix matches otherwise, `NOT` for exclusions. `None` when
/// there is no positive clause to anchor it.
pub fn match_expression(query: &ParsedQuery, exact: &[bool]) -> Option<String> {
    let positive: Vec<String> = query
        .general
        .iter()
        .zip(exact.iter().copied().chain(std::iter::repeat(false)))
        .map(|(term, is_exact)| {
            let quoted = fts_quote(term);
            if is_exact {
                quoted
            } else {
                format!("{quoted}*")
            }
        })
        .collect();
    if positive.is_empty() {
        return None;
    }

    let mut expression = format!("({})", positive.join(" AND "));
    for term in &query.negative {
        expression.push_str(" NOT ");
        expression.push_str(&fts_quote(term));
    }
    Some(expression)
}

/// Text-index retrieval with a literal substring fallback.
///
/// A row qualifies if it matches the FTS expression, or if every non-exact
/// term occurs as a substring of its filepath or one of its tag strings.
/// Rows come back in FTS rank order, substring-only rows last.
pub fn hybrid(conn: &Connection, query: &ParsedQuery, exact: &[bool]) -> Result<Vec<ItemRow>> {
    let expression = match_expression(query, exact);
    let loose_terms: Vec<&String> = query
        .general
        .iter()
        .zip(exact.iter().copied().chain(std::iter::repeat(false)))
        .filter(|(_, is_exact)| !is_exact)
        .map(|(term, _)| term)
        .collect();

    let mut params: Vec<Value> = Vec::new();
    let mut join = String::new();
    let mut alternatives: Vec<String> = Vec::new();

    if let Some(expression) = &expression {
        join = "LEFT JOIN (SELECT rowid AS fts_id, rank AS fts_rank FROM items_fts \
                WHERE items_fts MATCH ?) fts ON fts.fts_id = items.id"
            .to_string();
        params.push(text(expression));
        alternatives.push("fts.fts_id IS NOT NULL".to_string());
    }

    if !loose_terms.is_empty() {
        let columns: Vec<&str> = std::iter::once("filepath")
            .chain(TagCategory::ALL.iter().map(|c| c.column()))
            .collect();
        let per_term = columns
            .iter()
            .map(|col| format!("instr(lower(items.{col}), ?) > 0"))
            .collect::<Vec<_>>()
            .join(" OR ");
        let all_terms = vec![format!("({per_term})"); loose_terms.len()].join(" AND ");
        alternatives.push(format!("({all_terms})"));
        for term in &loose_terms {
            params.extend(columns.iter().map(|_| text(term)));
        }
    }

    let filter = if alternatives.is_empty() {
        String::new()
    } else {
        format!("WHERE {}", alternatives.join(" OR "))
    };
    let order = if expression.is_some() {
        "fts.fts_rank IS NULL, fts.fts_rank ASC, items.id ASC"
    } else {
        "items.id ASC"
    };

    let sql = format!("SELECT {ITEM_COLUMNS} FROM items {join} {filter} ORDER BY {order}");
    run(conn, &sql, params)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::search::query::parse;

    #[test]
    fn match_expression_shapes() {
        let query = parse("tag1 blu -bad");
        assert_eq!(
            match_expression(&query, &[true, false]).as_deref(),
            Some(r#"("tag1" AND "blu"*) NOT "bad""#)
        );
        assert_eq!(match_expression(&parse("-bad"), &[]), None);
    }

    #[test]
    fn quotes_inside_terms_are_escaped() {
        assert_eq!(fts_quote(r#"say"hi"#), r#""say""hi""#);
    }

    #[test]
    fn like_wildcards_are_escaped() {
        assert_eq!(escape_like("100%_a\\b"), "100\\%\\_a\\\\b");
    }
}
