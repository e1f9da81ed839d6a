//! Bidirectional tag name ↔ tag id cache.
//!
//! One generation is an immutable snapshot of the `tags` table. Names are
//! interned once as `Arc<str>` and shared by both directions. `reload` builds
//! the next generation off-lock and swaps a single `Arc`, so readers see
//! either the old or the new generation, never a mix.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{error, info};

use crate::cache::bus::CacheListener;
use crate::database::{queries, Database};
use crate::error::Result;
use crate::model::{TagId, TagRow};

#[derive(Default)]
struct Generation {
    ids: HashMap<Arc<str>, TagId>,
    names: HashMap<TagId, Arc<str>>,
}

impl Generation {
    fn build(rows: Vec<TagRow>) -> Self {
        let mut generation = Generation {
            ids: HashMap::with_capacity(rows.len()),
            names: HashMap::with_capacity(rows.len()),
        };
        for row in rows {
            let name: Arc<str> = Arc::from(row.name);
            generation.names.insert(row.id, Arc::clone(&name));
            generation.ids.insert(name, row.id);
        }
        generation
    }

    fn name(&self, id: TagId) -> Option<&Arc<str>> {
        self.names.get(&id)
    }
}

pub struct TagDirectory {
    db: Arc<Database>,
    current: RwLock<Option<Arc<Generation>>>,
}

impl TagDirectory {
    pub fn new(db: Arc<Database>) -> Self {
        Self {
            db,
            current: RwLock::new(None),
        }
    }

    fn generation(&self) -> Arc<Generation> {
        if let Some(generation) = self.current.read().as_ref() {
            return Arc::clone(generation);
        }
        match self.load() {
            Ok(generation) => {
                let mut slot = self.current.write();
                // Another reader may have won the race; keep the first.
                Arc::clone(slot.get_or_insert(generation))
            }
            Err(e) => {
                // Not stored: the next access retries the load.
                error!("Failed to load tag directory: {}", e);
                Arc::new(Generation::default())
            }
        }
    }

    fn load(&self) -> Result<Arc<Generation>> {
        let rows = {
            let conn = self.db.conn();
            queries::load_tags(&conn)?
        };
        let generation = Generation::build(rows);
        info!("Loaded tag directory with {} tags", generation.ids.len());
        Ok(Arc::new(generation))
    }

    /// Forces the first load if it has not happened yet.
    pub fn ensure_loaded(&self) {
        let _ = self.generation();
    }

    pub fn get_id(&self, name: &str) -> Option<TagId> {
        self.generation().ids.get(name).copied()
    }

    pub fn get_name(&self, id: TagId) -> Option<Arc<str>> {
        self.generation().name(id).cloned()
    }

    /// Resolves names to ids, silently skipping unknown names.
    pub fn ids_from_names<I, S>(&self, names: I) -> Vec<TagId>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let generation = self.generation();
        names
            .into_iter()
            .filter_map(|name| generation.ids.get(name.as_ref()).copied())
            .collect()
    }

    /// Resolves ids to names, silently skipping unknown ids.
    pub fn names_from_ids(&self, ids: &[TagId]) -> Vec<Arc<str>> {
        let generation = self.generation();
        ids.iter()
            .filter_map(|&id| generation.name(id).cloned())
            .collect()
    }

    /// Re-reads the whole tag table and swaps in the new generation.
    pub fn reload(&self) -> Result<usize> {
        let generation = self.load()?;
        let count = generation.ids.len();
        *self.current.write() = Some(generation);
        Ok(count)
    }

    pub fn count(&self) -> usize {
        self.generation().ids.len()
    }
}

impl CacheListener for TagDirectory {
    fn name(&self) -> &str {
        "tag_directory"
    }

    fn on_invalidate(&self) -> anyhow::Result<()> {
        self.reload()?;
        Ok(())
    }
}
