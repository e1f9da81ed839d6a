pub const SCHEMA: &str = r#"
    PRAGMA foreign_keys = ON;

    CREATE TABLE IF NOT EXISTS tags (
        id INTEGER PRIMARY KEY,
        name TEXT UNIQUE NOT NULL,
        category TEXT NOT NULL DEFAULT 'general',
        extended_category TEXT
    );

    CREATE TABLE IF NOT EXISTS items (
        id INTEGER PRIMARY KEY,
        filepath TEXT UNIQUE NOT NULL,
        filename TEXT NOT NULL,
        content_hash TEXT NOT NULL,
        tags_general TEXT NOT NULL DEFAULT '',
        tags_character TEXT NOT NULL DEFAULT '',
        tags_copyright TEXT NOT NULL DEFAULT '',
        tags_artist TEXT NOT NULL DEFAULT '',
        tags_species TEXT NOT NULL DEFAULT '',
        tags_meta TEXT NOT NULL DEFAULT '',
        tags_rating TEXT NOT NULL DEFAULT '',
        score INTEGER,
        fav_count INTEGER,
        ingested_at INTEGER,
        parent_id INTEGER REFERENCES items(id) ON DELETE SET NULL,
        has_children INTEGER NOT NULL DEFAULT 0,
        upscaled_width INTEGER,
        upscaled_height INTEGER
    );

    CREATE TABLE IF NOT EXISTS item_tags (
        item_id INTEGER NOT NULL REFERENCES items(id) ON DELETE CASCADE,
        tag_id INTEGER NOT NULL REFERENCES tags(id) ON DELETE CASCADE,
        provenance TEXT NOT NULL DEFAULT 'original',
        PRIMARY KEY(item_id, tag_id)
    );
    CREATE INDEX IF NOT EXISTS idx_item_tags_tag ON item_tags(tag_id);

    CREATE TABLE IF NOT EXISTS item_sources (
        item_id INTEGER NOT NULL REFERENCES items(id) ON DELETE CASCADE,
        source TEXT NOT NULL,
        PRIMARY KEY(item_id, source)
    );

    CREATE TABLE IF NOT EXISTS pools (
        id INTEGER PRIMARY KEY,
        name TEXT UNIQUE NOT NULL
    );

    CREATE TABLE IF NOT EXISTS pool_items (
        pool_id INTEGER NOT NULL REFERENCES pools(id) ON DELETE CASCADE,
        item_id INTEGER NOT NULL REFERENCES items(id) ON DELETE CASCADE,
        position INTEGER NOT NULL DEFAULT 0,
        PRIMARY KEY(pool_id, item_id)
    );

    CREATE TABLE IF NOT EXISTS favorites (
        item_id INTEGER PRIMARY KEY REFERENCES items(id) ON DELETE CASCADE
    );

    CREATE VIRTUAL TABLE IF NOT EXISTS items_fts USING fts5(
        filepath,
        tags_general,
        tags_character,
        tags_copyright,
        tags_artist,
        tags_species,
        tags_meta,
        tags_rating,
        content='items',
        content_rowid='id',
        tokenize="unicode61 tokenchars '_-'"
    );

    CREATE TRIGGER IF NOT EXISTS items_fts_insert AFTER INSERT ON items BEGIN
        INSERT INTO items_fts(rowid, filepath, tags_general, tags_character, tags_copyright,
                              tags_artist, tags_species, tags_meta, tags_rating)
        VALUES (new.id, new.filepath, new.tags_general, new.tags_character, new.tags_copyright,
                new.tags_artist, new.tags_species, new.tags_meta, new.tags_rating);
    END;

    CREATE TRIGGER IF NOT EXISTS items_fts_delete AFTER DELETE ON items BEGIN
        INSERT INTO items_fts(items_fts, rowid, filepath, tags_general, tags_character, tags_copyright,
                              tags_artist, tags_species, tags_meta, tags_rating)
        VALUES ('delete', old.id, old.filepath, old.tags_general, old.tags_character, old.tags_copyright,
                old.tags_artist, old.tags_species, old.tags_meta, old.tags_rating);
    END;

    CREATE TRIGGER IF NOT EXISTS items_fts_update AFTER UPDATE ON items BEGIN
        INSERT INTO items_fts(items_fts, rowid, filepath, tags_general, tags_character, tags_copyright,
                              tags_artist, tags_species, tags_meta, tags_rating)
        VALUES ('delete', old.id, old.filepath, old.tags_general, old.tags_character, old.tags_copyright,
                old.tags_artist, old.tags_species, old.tags_meta, old.tags_rating);
        INSERT INTO items_fts(rowid, filepath, tags_general, tags_character, tags_copyright,
                              tags_artist, tags_species, tags_meta, tags_rating)
        VALUES (new.id, new.filepath, new.tags_general, new.tags_character, new.tags_copyright,
                new.tags_artist, new.tags_species, new.tags_meta, new.tags_rating);
    END;
"#;
