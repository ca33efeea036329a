//! SQLite-backed media catalog implementation.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;

use chrono::Utc;
use rusqlite::{params, Connection, OpenFlags, OptionalExtension};
use tracing::warn;

use super::{CatalogError, CatalogSession, CatalogStats, ImportTag, MediaCatalog};
use crate::media::{ArtMap, MediaItem, MediaType};

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// SQLite-backed media catalog.
///
/// Every session gets its own connection. The in-memory variant uses a
/// uniquely named shared-cache database and keeps one connection open for
/// the catalog's lifetime so the data survives between sessions; it suits
/// sequential use; concurrent writers should use a file database.
pub struct SqliteMediaCatalog {
    uri: String,
    flags: OpenFlags,
    _keepalive: Option<Mutex<Connection>>,
}

impl SqliteMediaCatalog {
    /// Create a new SQLite catalog, creating the database file and tables if needed.
    pub fn new(path: &Path) -> Result<Self, CatalogError> {
        let catalog = Self {
            uri: path.to_string_lossy().into_owned(),
            flags: OpenFlags::default(),
            _keepalive: None,
        };
        let conn = catalog.connect()?;
        conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| {
            row.get::<_, String>(0)
        })?;
        Self::initialize_schema(&conn)?;
        Ok(catalog)
    }

    /// Create an in-memory SQLite catalog (useful for testing).
    pub fn in_memory() -> Result<Self, CatalogError> {
        let mut catalog = Self {
            uri: format!(
                "file:mediaimport-catalog-{}?mode=memory&cache=shared",
                uuid::Uuid::new_v4()
            ),
            flags: OpenFlags::default() | OpenFlags::SQLITE_OPEN_URI,
            _keepalive: None,
        };
        let conn = catalog.connect()?;
        Self::initialize_schema(&conn)?;
        catalog._keepalive = Some(Mutex::new(conn));
        Ok(catalog)
    }

    fn connect(&self) -> Result<Connection, CatalogError> {
        let conn = Connection::open_with_flags(&self.uri, self.flags)?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        Ok(conn)
    }

    fn initialize_schema(conn: &Connection) -> Result<(), CatalogError> {
        conn.execute_batch(
            r#"
            -- One row per catalog record; details holds the typed record as JSON
            CREATE TABLE IF NOT EXISTS items (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                media_type TEXT NOT NULL,
                source_id TEXT NOT NULL,
                import_path TEXT NOT NULL,
                label TEXT NOT NULL,
                file_path TEXT,
                enabled INTEGER NOT NULL DEFAULT 1,
                details TEXT NOT NULL,
                date_added TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_items_import
                ON items(media_type, source_id, import_path);

            -- Child to container links (episode -> show, song -> album, ...)
            CREATE TABLE IF NOT EXISTS item_links (
                child_id INTEGER NOT NULL REFERENCES items(id) ON DELETE CASCADE,
                parent_id INTEGER NOT NULL REFERENCES items(id) ON DELETE CASCADE,
                PRIMARY KEY (child_id, parent_id)
            );

            CREATE INDEX IF NOT EXISTS idx_item_links_parent ON item_links(parent_id);

            CREATE TABLE IF NOT EXISTS item_art (
                item_id INTEGER NOT NULL REFERENCES items(id) ON DELETE CASCADE,
                art_type TEXT NOT NULL,
                url TEXT NOT NULL,
                PRIMARY KEY (item_id, art_type)
            );

            CREATE TABLE IF NOT EXISTS paths (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                path TEXT NOT NULL UNIQUE
            );

            CREATE TABLE IF NOT EXISTS item_paths (
                item_id INTEGER NOT NULL REFERENCES items(id) ON DELETE CASCADE,
                path_id INTEGER NOT NULL REFERENCES paths(id) ON DELETE CASCADE,
                PRIMARY KEY (item_id, path_id)
            );
            "#,
        )?;

        Ok(())
    }
}

impl MediaCatalog for SqliteMediaCatalog {
    fn open(&self) -> Result<Box<dyn CatalogSession>, CatalogError> {
        Ok(Box::new(SqliteCatalogSession {
            conn: self.connect()?,
        }))
    }
}

struct SqliteCatalogSession {
    conn: Connection,
}

impl SqliteCatalogSession {
    /// Parse a details column back into a typed record.
    fn decode_item(
        media_type: MediaType,
        id: i64,
        details: &str,
    ) -> Result<MediaItem, CatalogError> {
        let mut item: MediaItem = serde_json::from_str(details)?;
        if item.media_type() != media_type {
            return Err(CatalogError::InvalidItem(format!(
                "item {} is stored as {} but decodes as {}",
                id,
                media_type,
                item.media_type()
            )));
        }
        item.set_id(Some(id));
        Ok(item)
    }

    /// Details column: the record without id and art, which live elsewhere.
    fn encode_item(item: &MediaItem) -> Result<String, CatalogError> {
        let mut stripped = item.clone();
        stripped.set_id(None);
        stripped.art_mut().clear();
        Ok(serde_json::to_string(&stripped)?)
    }

    fn load_art(&self, item_id: i64) -> Result<ArtMap, CatalogError> {
        let mut stmt = self
            .conn
            .prepare("SELECT art_type, url FROM item_art WHERE item_id = ?")?;
        let rows = stmt.query_map(params![item_id], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;

        let mut art = ArtMap::new();
        for row in rows {
            let (art_type, url) = row?;
            art.insert(art_type, url);
        }
        Ok(art)
    }
}

impl CatalogSession for SqliteCatalogSession {
    fn begin_transaction(&self) -> Result<(), CatalogError> {
        if self.in_transaction() {
            return Err(CatalogError::Transaction(
                "a transaction is already open".to_string(),
            ));
        }
        self.conn
            .execute_batch("BEGIN IMMEDIATE")
            .map_err(|e| CatalogError::Transaction(e.to_string()))
    }

    fn commit_transaction(&self) -> Result<(), CatalogError> {
        if !self.in_transaction() {
            return Err(CatalogError::Transaction(
                "no transaction to commit".to_string(),
            ));
        }
        self.conn
            .execute_batch("COMMIT")
            .map_err(|e| CatalogError::Transaction(e.to_string()))
    }

    fn rollback_transaction(&self) -> Result<(), CatalogError> {
        if !self.in_transaction() {
            return Ok(());
        }
        self.conn
            .execute_batch("ROLLBACK")
            .map_err(|e| CatalogError::Transaction(e.to_string()))
    }

    fn in_transaction(&self) -> bool {
        !self.conn.is_autocommit()
    }

    fn get_items(
        &self,
        media_type: MediaType,
        tag: &ImportTag,
    ) -> Result<Vec<MediaItem>, CatalogError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, details FROM items
             WHERE media_type = ? AND source_id = ? AND import_path = ?
             ORDER BY id",
        )?;
        let rows = stmt.query_map(
            params![media_type.as_str(), &tag.source_id, &tag.import_path],
            |row| Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?)),
        )?;

        let mut items = Vec::new();
        for row in rows {
            let (id, details) = row?;
            items.push(Self::decode_item(media_type, id, &details)?);
        }
        Ok(items)
    }

    fn get_item(&self, media_type: MediaType, id: i64) -> Result<Option<MediaItem>, CatalogError> {
        let details: Option<String> = self
            .conn
            .query_row(
                "SELECT details FROM items WHERE id = ? AND media_type = ?",
                params![id, media_type.as_str()],
                |row| row.get(0),
            )
            .optional()?;

        match details {
            Some(details) => {
                let mut item = Self::decode_item(media_type, id, &details)?;
                *item.art_mut() = self.load_art(id)?;
                Ok(Some(item))
            }
            None => Ok(None),
        }
    }

    fn get_art_for_import(
        &self,
        media_type: MediaType,
        tag: &ImportTag,
    ) -> Result<HashMap<i64, ArtMap>, CatalogError> {
        let mut stmt = self.conn.prepare(
            "SELECT a.item_id, a.art_type, a.url
             FROM item_art a
             JOIN items i ON i.id = a.item_id
             WHERE i.media_type = ? AND i.source_id = ? AND i.import_path = ?",
        )?;
        let rows = stmt.query_map(
            params![media_type.as_str(), &tag.source_id, &tag.import_path],
            |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                ))
            },
        )?;

        let mut art: HashMap<i64, ArtMap> = HashMap::new();
        for row in rows {
            let (item_id, art_type, url) = row?;
            art.entry(item_id).or_default().insert(art_type, url);
        }
        Ok(art)
    }

    fn set_details(&self, item: &MediaItem, tag: &ImportTag) -> Result<i64, CatalogError> {
        let label = item.label();
        if label.trim().is_empty() {
            return Err(CatalogError::InvalidItem(format!(
                "{} without identifying fields",
                item.media_type()
            )));
        }

        let details = Self::encode_item(item)?;
        let now = Utc::now().to_rfc3339();
        let media_type = item.media_type();

        let id = match item.id() {
            None => {
                self.conn.execute(
                    "INSERT INTO items (media_type, source_id, import_path, label, file_path,
                                        enabled, details, date_added, updated_at)
                     VALUES (?, ?, ?, ?, ?, 1, ?, ?, ?)",
                    params![
                        media_type.as_str(),
                        &tag.source_id,
                        &tag.import_path,
                        &label,
                        item.file_path(),
                        &details,
                        &now,
                        &now,
                    ],
                )?;
                self.conn.last_insert_rowid()
            }
            Some(id) => {
                let updated = self.conn.execute(
                    "UPDATE items SET source_id = ?, import_path = ?, label = ?, file_path = ?,
                                      details = ?, updated_at = ?
                     WHERE id = ? AND media_type = ?",
                    params![
                        &tag.source_id,
                        &tag.import_path,
                        &label,
                        item.file_path(),
                        &details,
                        &now,
                        id,
                        media_type.as_str(),
                    ],
                )?;
                if updated == 0 {
                    return Err(CatalogError::NotFound(media_type, id));
                }
                id
            }
        };

        self.conn
            .execute("DELETE FROM item_links WHERE child_id = ?", params![id])?;
        for parent_id in item.parent_ids() {
            self.conn.execute(
                "INSERT OR IGNORE INTO item_links (child_id, parent_id) VALUES (?, ?)",
                params![id, parent_id],
            )?;
        }

        self.conn
            .execute("DELETE FROM item_art WHERE item_id = ?", params![id])?;
        for (art_type, url) in item.art() {
            self.conn.execute(
                "INSERT INTO item_art (item_id, art_type, url) VALUES (?, ?, ?)",
                params![id, art_type, url],
            )?;
        }

        Ok(id)
    }

    fn delete_item(&self, media_type: MediaType, id: i64) -> Result<bool, CatalogError> {
        let deleted = self.conn.execute(
            "DELETE FROM items WHERE id = ? AND media_type = ?",
            params![id, media_type.as_str()],
        )?;
        Ok(deleted > 0)
    }

    fn add_path(&self, path: &str) -> Result<i64, CatalogError> {
        self.conn.execute(
            "INSERT OR IGNORE INTO paths (path) VALUES (?)",
            params![path],
        )?;
        let id = self
            .conn
            .query_row("SELECT id FROM paths WHERE path = ?", params![path], |row| {
                row.get(0)
            })?;
        Ok(id)
    }

    fn link_path(&self, item_id: i64, path_id: i64) -> Result<(), CatalogError> {
        self.conn.execute(
            "INSERT OR IGNORE INTO item_paths (item_id, path_id) VALUES (?, ?)",
            params![item_id, path_id],
        )?;
        Ok(())
    }

    /// Detach every path from the item and delete the detached paths no
    /// other item still references.
    fn remove_path_from_item(&self, item_id: i64) -> Result<(), CatalogError> {
        let path_ids = {
            let mut stmt = self
                .conn
                .prepare("SELECT path_id FROM item_paths WHERE item_id = ?")?;
            let rows = stmt.query_map(params![item_id], |row| row.get::<_, i64>(0))?;
            rows.collect::<Result<Vec<_>, _>>()?
        };

        self.conn
            .execute("DELETE FROM item_paths WHERE item_id = ?", params![item_id])?;
        for path_id in path_ids {
            self.conn.execute(
                "DELETE FROM paths WHERE id = ?1
                 AND NOT EXISTS (SELECT 1 FROM item_paths WHERE path_id = ?1)",
                params![path_id],
            )?;
        }
        Ok(())
    }

    fn get_paths_for_item(&self, item_id: i64) -> Result<Vec<String>, CatalogError> {
        let mut stmt = self.conn.prepare(
            "SELECT p.path FROM paths p
             JOIN item_paths ip ON ip.path_id = p.id
             WHERE ip.item_id = ?
             ORDER BY p.path",
        )?;
        let rows = stmt.query_map(params![item_id], |row| row.get::<_, String>(0))?;

        let mut paths = Vec::new();
        for row in rows {
            paths.push(row?);
        }
        Ok(paths)
    }

    fn count_children(
        &self,
        parent_id: i64,
        child_types: &[MediaType],
    ) -> Result<u64, CatalogError> {
        let mut count = 0u64;
        for child_type in child_types {
            let n: i64 = self.conn.query_row(
                "SELECT COUNT(*) FROM item_links l
                 JOIN items i ON i.id = l.child_id
                 WHERE l.parent_id = ? AND i.media_type = ?",
                params![parent_id, child_type.as_str()],
                |row| row.get(0),
            )?;
            count += n as u64;
        }
        Ok(count)
    }

    fn set_import_items_enabled(
        &self,
        media_type: MediaType,
        tag: &ImportTag,
        enabled: bool,
    ) -> Result<usize, CatalogError> {
        let changed = self.conn.execute(
            "UPDATE items SET enabled = ?
             WHERE media_type = ? AND source_id = ? AND import_path = ? AND enabled != ?",
            params![
                enabled,
                media_type.as_str(),
                &tag.source_id,
                &tag.import_path,
                enabled
            ],
        )?;
        Ok(changed)
    }

    fn is_item_enabled(&self, id: i64) -> Result<Option<bool>, CatalogError> {
        let enabled = self
            .conn
            .query_row(
                "SELECT enabled FROM items WHERE id = ?",
                params![id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(enabled)
    }

    fn stats(&self) -> Result<CatalogStats, CatalogError> {
        let (items, enabled_items): (i64, i64) = self.conn.query_row(
            "SELECT COUNT(*), COALESCE(SUM(enabled), 0) FROM items",
            [],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;
        let paths: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM paths", [], |row| row.get(0))?;

        Ok(CatalogStats {
            items: items as u64,
            enabled_items: enabled_items as u64,
            paths: paths as u64,
        })
    }
}

impl Drop for SqliteCatalogSession {
    fn drop(&mut self) {
        if self.in_transaction() {
            warn!("Catalog session closed with an open transaction, rolling back");
            if let Err(e) = self.conn.execute_batch("ROLLBACK") {
                warn!(error = %e, "Failed to roll back abandoned transaction");
            }
        }
    }
}
