use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::cache::InvalidationBus;
use crate::database::Database;
use crate::error::CatalogError;
use crate::model::{CategoryTags, ExtendedCategory, ItemId, Provenance, TagCategory};

fn default_category() -> TagCategory {
    TagCategory::General
}

/// A tag as attached to an incoming item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagAssignment {
    pub name: String,
    #[serde(default = "default_category")]
    pub category: TagCategory,
    #[serde(default)]
    pub extended_category: Option<ExtendedCategory>,
    #[serde(default)]
    pub provenance: Provenance,
}

impl TagAssignment {
    pub fn new(name: impl Into<String>, category: TagCategory) -> Self {
        Self {
            name: name.into(),
            category,
            extended_category: None,
            provenance: Provenance::Original,
        }
    }
}

/// An item handed over by the ingestion side.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemRecord {
    pub filepath: String,
    pub content_hash: String,
    #[serde(default)]
    pub tags: Vec<TagAssignment>,
    #[serde(default)]
    pub sources: Vec<String>,
    #[serde(default)]
    pub score: Option<i64>,
    #[serde(default)]
    pub fav_count: Option<i64>,
    #[serde(default)]
    pub ingested_at: Option<i64>,
    /// Filepath of the parent item; it must already be stored or earlier in
    /// the same batch.
    #[serde(default)]
    pub parent: Option<String>,
    #[serde(default)]
    pub upscaled: Option<(u32, u32)>,
}

impl ItemRecord {
    fn validate(&self) -> Result<()> {
        if self.filepath.trim().is_empty() {
            return Err(CatalogError::InvalidRecord("empty filepath".to_string()).into());
        }
        if let Some(tag) = self
            .tags
            .iter()
            .find(|t| t.name.is_empty() || t.name.chars().any(char::is_whitespace))
        {
            return Err(CatalogError::InvalidRecord(format!(
                "tag {:?} on {} is empty or contains whitespace",
                tag.name, self.filepath
            ))
            .into());
        }
        Ok(())
    }
}

/// Buffered writer for the catalog store.
///
/// Every committed mutation fires the invalidation bus once the connection
/// has been released, so caches reloading from the store do not deadlock.
pub struct CatalogWriter {
    db: Arc<Database>,
    bus: Arc<InvalidationBus>,
    buffer: Vec<ItemRecord>,
    buffer_limit: usize,
}

impl CatalogWriter {
    pub fn new(db: Arc<Database>, bus: Arc<InvalidationBus>) -> Self {
        Self {
            db,
            bus,
            buffer: Vec::new(),
            buffer_limit: 1000,
        }
    }

    pub fn with_buffer_limit(mut self, limit: usize) -> Self {
        self.buffer_limit = limit.max(1);
        self
    }

    pub fn add(&mut self, record: ItemRecord) -> Result<()> {
        record.validate()?;
        self.buffer.push(record);
        if self.buffer.len() >= self.buffer_limit {
            self.flush()?;
        }
        Ok(())
    }

    pub fn flush(&mut self) -> Result<()> {
        if self.buffer.is_empty() {
            return Ok(());
        }

        {
            let mut conn = self.db.conn();
            let tx = conn.transaction().context("Failed to begin transaction")?;

            {
                let mut stmt_item = tx.prepare(
                    "INSERT INTO items (filepath, filename, content_hash, score, fav_count,
                                        ingested_at, upscaled_width, upscaled_height)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                     ON CONFLICT(filepath) DO UPDATE SET
                         content_hash = excluded.content_hash,
                         score = excluded.score,
                         fav_count = excluded.fav_count,
                         ingested_at = COALESCE(excluded.ingested_at, items.ingested_at),
                         upscaled_width = excluded.upscaled_width,
                         upscaled_height = excluded.upscaled_height
                     RETURNING id",
                )?;

                let mut stmt_tag = tx.prepare(
                    "INSERT INTO tags (name, category, extended_category) VALUES (?1, ?2, ?3)
                     ON CONFLICT(name) DO NOTHING",
                )?;

                let mut stmt_get_tag_id = tx.prepare("SELECT id FROM tags WHERE name = ?1")?;

                let mut stmt_item_tag = tx.prepare(
                    "INSERT OR IGNORE INTO item_tags (item_id, tag_id, provenance) VALUES (?1, ?2, ?3)",
                )?;

                let mut stmt_source = tx.prepare(
                    "INSERT OR IGNORE INTO item_sources (item_id, source) VALUES (?1, ?2)",
                )?;

                for record in &self.buffer {
                    let filename = Path::new(&record.filepath)
                        .file_name()
                        .map(|f| f.to_string_lossy().into_owned())
                        .unwrap_or_else(|| record.filepath.clone());
                    let (upscaled_width, upscaled_height) = record.upscaled.unzip();

                    let item_id: ItemId = stmt_item
                        .query_row(
                            params![
                                record.filepath,
                                filename,
                                record.content_hash,
                                record.score,
                                record.fav_count,
                                record.ingested_at,
                                upscaled_width,
                                upscaled_height
                            ],
                            |row| row.get(0),
                        )
                        .with_context(|| format!("Failed to insert item {}", record.filepath))?;

                    if let Some(parent) = &record.parent {
                        link_parent(&tx, item_id, parent)?;
                    }

                    for tag in &record.tags {
                        let category = effective_category(&tag.name, tag.category);
                        let extended = match tag.extended_category {
                            Some(ext) if !category.allows_extended() => {
                                warn!(
                                    "Dropping extended category {} on {} tag {}",
                                    ext.as_str(),
                                    category,
                                    tag.name
                                );
                                None
                            }
                            other => other,
                        };
                        stmt_tag.execute(params![
                            tag.name,
                            category.as_str(),
                            extended.map(ExtendedCategory::as_str)
                        ])?;

                        let tag_id: i64 = stmt_get_tag_id
                            .query_row(params![tag.name], |row| row.get(0))
                            .context("Failed to get tag id after insert")?;

                        stmt_item_tag.execute(params![item_id, tag_id, tag.provenance.as_str()])?;
                    }

                    for source in &record.sources {
                        stmt_source.execute(params![item_id, source.trim().to_lowercase()])?;
                    }

                    refresh_tag_strings(&tx, item_id)?;
                }
            }

            tx.commit().context("Failed to commit transaction")?;
        }

        info!("Flushed {} item records", self.buffer.len());
        self.buffer.clear();
        self.bus.trigger();
        Ok(())
    }

    /// Recategorizes an existing tag and rewrites the tag strings of every
    /// item carrying it. Returns `false` if the tag does not exist.
    pub fn set_tag_category(
        &self,
        name: &str,
        category: TagCategory,
        extended: Option<ExtendedCategory>,
    ) -> Result<bool> {
        let extended = extended.filter(|_| category.allows_extended());
        let changed = {
            let mut conn = self.db.conn();
            let tx = conn.transaction()?;
            let updated = tx.execute(
                "UPDATE tags SET category = ?2, extended_category = ?3 WHERE name = ?1",
                params![name, category.as_str(), extended.map(ExtendedCategory::as_str)],
            )?;
            if updated > 0 {
                let item_ids: Vec<ItemId> = {
                    let mut stmt = tx.prepare(
                        "SELECT it.item_id FROM item_tags it JOIN tags t ON t.id = it.tag_id
                         WHERE t.name = ?1",
                    )?;
                    let rows = stmt.query_map(params![name], |row| row.get(0))?;
                    rows.collect::<rusqlite::Result<Vec<_>>>()?
                };
                for item_id in item_ids {
                    refresh_tag_strings(&tx, item_id)?;
                }
            }
            tx.commit()?;
            updated > 0
        };
        if changed {
            self.bus.trigger();
        }
        Ok(changed)
    }

    /// Detaches `tag` from the item at `filepath`.
    pub fn remove_tag(&self, filepath: &str, tag: &str) -> Result<bool> {
        let removed = {
            let mut conn = self.db.conn();
            let tx = conn.transaction()?;
            let item_id = item_id_for(&tx, filepath)?;
            let removed = tx.execute(
                "DELETE FROM item_tags WHERE item_id = ?1
                 AND tag_id = (SELECT id FROM tags WHERE name = ?2)",
                params![item_id, tag],
            )?;
            if removed > 0 {
                refresh_tag_strings(&tx, item_id)?;
            }
            tx.commit()?;
            removed > 0
        };
        if removed {
            self.bus.trigger();
        }
        Ok(removed)
    }

    /// Appends the item at `filepath` to the pool `pool`, creating the pool
    /// on first use.
    pub fn add_to_pool(&self, pool: &str, filepath: &str) -> Result<()> {
        {
            let mut conn = self.db.conn();
            let tx = conn.transaction()?;
            let item_id = item_id_for(&tx, filepath)?;
            tx.execute("INSERT OR IGNORE INTO pools (name) VALUES (?1)", params![pool])?;
            tx.execute(
                "INSERT OR IGNORE INTO pool_items (pool_id, item_id, position)
                 SELECT p.id, ?2, (SELECT COUNT(*) FROM pool_items WHERE pool_id = p.id)
                 FROM pools p WHERE p.name = ?1",
                params![pool, item_id],
            )?;
            tx.commit()?;
        }
        self.bus.trigger();
        Ok(())
    }

    pub fn set_favorite(&self, filepath: &str, favorite: bool) -> Result<()> {
        {
            let conn = self.db.conn();
            let item_id = item_id_for(&conn, filepath)?;
            if favorite {
                conn.execute(
                    "INSERT OR IGNORE INTO favorites (item_id) VALUES (?1)",
                    params![item_id],
                )?;
            } else {
                conn.execute("DELETE FROM favorites WHERE item_id = ?1", params![item_id])?;
            }
        }
        self.bus.trigger();
        Ok(())
    }

    /// Deletes tags no item carries any more.
    pub fn delete_orphan_tags(&self) -> Result<usize> {
        let deleted = self.db.conn().execute(
            "DELETE FROM tags WHERE id NOT IN (SELECT DISTINCT tag_id FROM item_tags)",
            [],
        )?;
        if deleted > 0 {
            info!("Deleted {} orphan tags", deleted);
            self.bus.trigger();
        }
        Ok(deleted)
    }
}

/// Rating tags always live in the rating category, whatever the source said.
fn effective_category(name: &str, declared: TagCategory) -> TagCategory {
    if name.starts_with("rating:") {
        TagCategory::Rating
    } else {
        declared
    }
}

fn item_id_for(conn: &Connection, filepath: &str) -> Result<ItemId> {
    conn.query_row(
        "SELECT id FROM items WHERE filepath = ?1",
        params![filepath],
        |row| row.get(0),
    )
    .optional()?
    .with_context(|| format!("No item stored at {}", filepath))
}

fn link_parent(conn: &Connection, item_id: ItemId, parent: &str) -> Result<()> {
    let parent_id = item_id_for(conn, parent)?;
    conn.execute(
        "UPDATE items SET parent_id = ?2 WHERE id = ?1",
        params![item_id, parent_id],
    )?;
    conn.execute(
        "UPDATE items SET has_children = 1 WHERE id = ?1",
        params![parent_id],
    )?;
    Ok(())
}

/// Rebuilds the per-category tag strings of one item from `item_tags`. The
/// FTS triggers carry the change into the shadow index.
fn refresh_tag_strings(conn: &Connection, item_id: ItemId) -> Result<()> {
    let mut tags = CategoryTags::default();
    {
        let mut stmt = conn.prepare(
            "SELECT t.name, t.category FROM item_tags it
             JOIN tags t ON t.id = it.tag_id
             WHERE it.item_id = ?1
             ORDER BY t.name",
        )?;
        let rows = stmt.query_map(params![item_id], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;

        let mut grouped: [Vec<String>; 7] = Default::default();
        for row in rows {
            let (name, category) = row?;
            let category = TagCategory::parse(&category).unwrap_or(TagCategory::General);
            let slot = TagCategory::ALL
                .iter()
                .position(|c| *c == category)
                .unwrap_or(0);
            grouped[slot].push(name);
        }
        for (category, names) in TagCategory::ALL.into_iter().zip(grouped) {
            tags.set(category, names.join(" "));
        }
    }

    conn.execute(
        "UPDATE items SET tags_general = ?2, tags_character = ?3, tags_copyright = ?4,
             tags_artist = ?5, tags_species = ?6, tags_meta = ?7, tags_rating = ?8
         WHERE id = ?1",
        params![
            item_id,
            tags.get(TagCategory::General),
            tags.get(TagCategory::Character),
            tags.get(TagCategory::Copyright),
            tags.get(TagCategory::Artist),
            tags.get(TagCategory::Species),
            tags.get(TagCategory::Meta),
            tags.get(TagCategory::Rating)
        ],
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::queries;
    use crate::test_support::{catalog_with, item};

    #[test]
    fn malformed_records_are_rejected_before_buffering() {
        let catalog = catalog_with(vec![]);
        let mut writer = catalog.writer();

        for record in [item("  ", &["ok"]), item("a.png", &["two words"]), item("b.png", &[""])] {
            let err = writer.add(record).unwrap_err();
            assert!(matches!(
                err.downcast_ref::<CatalogError>(),
                Some(CatalogError::InvalidRecord(_))
            ));
        }
        assert!(writer.flush().is_ok());
        assert_eq!(queries::item_count(&catalog.database().conn()).unwrap(), 0);
    }

    #[test]
    fn denormalized_strings_follow_relation() -> Result<()> {
        let catalog = catalog_with(vec![]);
        let mut writer = catalog.writer();

        let mut record = item("art/one.png", &["smile", "rating:safe_word"]);
        record.tags.push(TagAssignment::new("someone", TagCategory::Artist));
        writer.add(record)?;
        writer.flush()?;

        let conn = catalog.database().conn();
        let id = queries::item_id_by_path(&conn, "art/one.png")?.unwrap();
        let row = queries::item_by_id(&conn, id)?.unwrap();
        assert_eq!(row.filename, "one.png");
        assert_eq!(row.tags.get(TagCategory::General), "smile");
        assert_eq!(row.tags.get(TagCategory::Artist), "someone");
        assert_eq!(row.tags.get(TagCategory::Rating), "rating:safe_word");

        let fts_hits: i64 = conn.query_row(
            "SELECT COUNT(*) FROM items_fts WHERE items_fts MATCH '\"someone\"'",
            [],
            |r| r.get(0),
        )?;
        assert_eq!(fts_hits, 1);
        Ok(())
    }

    #[test]
    fn recategorizing_moves_tag_between_strings() -> Result<()> {
        let catalog = catalog_with(vec![item("a.png", &["hatsune_miku", "smile"])]);
        let writer = catalog.writer();

        assert!(writer.set_tag_category("hatsune_miku", TagCategory::Character, None)?);
        assert!(!writer.set_tag_category("no_such_tag", TagCategory::Meta, None)?);

        let conn = catalog.database().conn();
        let id = queries::item_id_by_path(&conn, "a.png")?.unwrap();
        let row = queries::item_by_id(&conn, id)?.unwrap();
        assert_eq!(row.tags.get(TagCategory::General), "smile");
        assert_eq!(row.tags.get(TagCategory::Character), "hatsune_miku");
        Ok(())
    }

    #[test]
    fn parents_are_flagged() -> Result<()> {
        let mut child = item("child.png", &["tag1"]);
        child.parent = Some("parent.png".to_string());
        let catalog = catalog_with(vec![item("parent.png", &["tag1"]), child]);

        let conn = catalog.database().conn();
        let parent_id = queries::item_id_by_path(&conn, "parent.png")?.unwrap();
        let child_id = queries::item_id_by_path(&conn, "child.png")?.unwrap();
        assert!(queries::item_by_id(&conn, parent_id)?.unwrap().has_children);
        assert_eq!(queries::item_by_id(&conn, child_id)?.unwrap().parent_id, Some(parent_id));
        Ok(())
    }

    #[test]
    fn rejects_whitespace_in_tag_names() {
        let catalog = catalog_with(vec![]);
        let mut writer = catalog.writer();
        assert!(writer.add(item("a.png", &["two words"])).is_err());
        assert!(writer.add(item("  ", &["tag"])).is_err());
    }

    #[test]
    fn orphan_tags_are_removed() -> Result<()> {
        let catalog = catalog_with(vec![item("a.png", &["keep", "drop"])]);
        let writer = catalog.writer();

        assert!(writer.remove_tag("a.png", "drop")?);
        assert_eq!(writer.delete_orphan_tags()?, 1);
        assert_eq!(catalog.get_tag_id("drop"), None);
        assert!(catalog.get_tag_id("keep").is_some());
        Ok(())
    }
}
