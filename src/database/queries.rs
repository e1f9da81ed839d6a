//! Read-side queries the caches and the search engine run against the store.

use std::collections::{BTreeMap, HashMap, HashSet};

use rusqlite::{params, Connection, OptionalExtension, Row};

use crate::error::Result;
use crate::model::{
    CategoryTags, ExtendedCategory, ItemId, ItemRow, TagCategory, TagId, TagRow,
};

/// Column list matching [`read_item_row`]. Qualified so it survives joins.
pub const ITEM_COLUMNS: &str = "items.id, items.filepath, items.filename, \
     items.tags_general, items.tags_character, items.tags_copyright, items.tags_artist, \
     items.tags_species, items.tags_meta, items.tags_rating, \
     items.score, items.fav_count, items.ingested_at, items.parent_id, items.has_children, \
     items.upscaled_width";

pub fn read_item_row(row: &Row<'_>) -> rusqlite::Result<ItemRow> {
    let mut tags = CategoryTags::default();
    for (offset, category) in TagCategory::ALL.into_iter().enumerate() {
        tags.set(category, row.get::<_, String>(3 + offset)?);
    }
    Ok(ItemRow {
        id: row.get(0)?,
        filepath: row.get(1)?,
        filename: row.get(2)?,
        tags,
        score: row.get(10)?,
        fav_count: row.get(11)?,
        ingested_at: row.get(12)?,
        parent_id: row.get(13)?,
        has_children: row.get::<_, i64>(14)? != 0,
        upscaled: row.get::<_, Option<i64>>(15)?.is_some(),
    })
}

/// Full scan of the tag table, used to build a directory generation.
pub fn load_tags(conn: &Connection) -> Result<Vec<TagRow>> {
    let mut stmt =
        conn.prepare("SELECT id, name, category, extended_category FROM tags ORDER BY id")?;
    let rows = stmt.query_map([], |row| {
        let category: String = row.get(2)?;
        let extended: Option<String> = row.get(3)?;
        Ok(TagRow {
            id: row.get(0)?,
            name: row.get(1)?,
            category: TagCategory::parse(&category).unwrap_or(TagCategory::General),
            extended_category: extended.as_deref().and_then(ExtendedCategory::parse),
        })
    })?;
    Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
}

/// Number of items carrying each tag.
pub fn tag_frequencies(conn: &Connection) -> Result<HashMap<TagId, u64>> {
    let mut stmt = conn.prepare("SELECT tag_id, COUNT(*) FROM item_tags GROUP BY tag_id")?;
    let rows = stmt.query_map([], |row| Ok((row.get::<_, TagId>(0)?, row.get::<_, i64>(1)?)))?;
    let mut frequencies = HashMap::new();
    for row in rows {
        let (tag_id, count) = row?;
        frequencies.insert(tag_id, count.max(0) as u64);
    }
    Ok(frequencies)
}

pub fn item_count(conn: &Connection) -> Result<u64> {
    let count: i64 = conn.query_row("SELECT COUNT(*) FROM items", [], |row| row.get(0))?;
    Ok(count.max(0) as u64)
}

pub fn item_by_id(conn: &Connection, item_id: ItemId) -> Result<Option<ItemRow>> {
    let sql = format!("SELECT {ITEM_COLUMNS} FROM items WHERE items.id = ?1");
    Ok(conn
        .query_row(&sql, params![item_id], read_item_row)
        .optional()?)
}

pub fn item_id_by_path(conn: &Connection, filepath: &str) -> Result<Option<ItemId>> {
    Ok(conn
        .query_row(
            "SELECT id FROM items WHERE filepath = ?1",
            params![filepath],
            |row| row.get(0),
        )
        .optional()?)
}

/// Items sharing at least one tag with `item_id`, excluding the item itself,
/// capped at `ceiling` rows.
pub fn related_candidates(
    conn: &Connection,
    item_id: ItemId,
    ceiling: usize,
) -> Result<Vec<ItemRow>> {
    let sql = format!(
        "SELECT {ITEM_COLUMNS} FROM items
         WHERE items.id IN (
             SELECT DISTINCT other.item_id
             FROM item_tags AS mine
             JOIN item_tags AS other ON other.tag_id = mine.tag_id
             WHERE mine.item_id = ?1 AND other.item_id != ?1
             LIMIT ?2
         )
         ORDER BY items.id"
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params![item_id, ceiling as i64], read_item_row)?;
    Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
}

/// Members of the pool called `name` (case-insensitive), or of any pool when
/// `name` is `None`.
pub fn pool_members(conn: &Connection, name: Option<&str>) -> Result<HashSet<ItemId>> {
    let ids = match name {
        Some(name) => {
            let mut stmt = conn.prepare(
                "SELECT pi.item_id FROM pool_items pi
                 JOIN pools p ON p.id = pi.pool_id
                 WHERE lower(p.name) = lower(?1)",
            )?;
            let rows = stmt.query_map(params![name], |row| row.get(0))?;
            rows.collect::<rusqlite::Result<HashSet<_>>>()?
        }
        None => {
            let mut stmt = conn.prepare("SELECT DISTINCT item_id FROM pool_items")?;
            let rows = stmt.query_map([], |row| row.get(0))?;
            rows.collect::<rusqlite::Result<HashSet<_>>>()?
        }
    };
    Ok(ids)
}

pub fn favorite_ids(conn: &Connection) -> Result<HashSet<ItemId>> {
    let mut stmt = conn.prepare("SELECT item_id FROM favorites")?;
    let rows = stmt.query_map([], |row| row.get(0))?;
    Ok(rows.collect::<rusqlite::Result<HashSet<_>>>()?)
}

/// Source labels per item. Items without any source are absent.
pub fn item_sources(conn: &Connection) -> Result<HashMap<ItemId, Vec<String>>> {
    let mut stmt = conn.prepare("SELECT item_id, source FROM item_sources ORDER BY item_id")?;
    let rows = stmt.query_map([], |row| Ok((row.get::<_, ItemId>(0)?, row.get::<_, String>(1)?)))?;
    let mut sources: HashMap<ItemId, Vec<String>> = HashMap::new();
    for row in rows {
        let (item_id, source) = row?;
        sources.entry(item_id).or_default().push(source);
    }
    Ok(sources)
}

pub fn tag_counts_by_category(conn: &Connection) -> Result<BTreeMap<TagCategory, u64>> {
    let mut stmt = conn.prepare("SELECT category, COUNT(*) FROM tags GROUP BY category")?;
    let rows = stmt.query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)))?;
    let mut counts = BTreeMap::new();
    for row in rows {
        let (category, count) = row?;
        let category = TagCategory::parse(&category).unwrap_or(TagCategory::General);
        *counts.entry(category).or_insert(0) += count.max(0) as u64;
    }
    Ok(counts)
}

/// The `limit` most used tags, most frequent first, ties by name.
pub fn top_tags(conn: &Connection, limit: usize) -> Result<Vec<(String, u64)>> {
    let mut stmt = conn.prepare(
        "SELECT t.name, COUNT(*) AS uses FROM item_tags it
         JOIN tags t ON t.id = it.tag_id
         GROUP BY t.id
         ORDER BY uses DESC, t.name ASC
         LIMIT ?1",
    )?;
    let rows = stmt.query_map(params![limit as i64], |row| {
        Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?.max(0) as u64))
    })?;
    Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
}
