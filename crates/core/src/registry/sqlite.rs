//! SQLite-backed registry store implementation.

use std::collections::BTreeSet;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection};

use super::{Import, ImportSettings, RegistryError, RegistrySession, RegistryStore, Source};
use crate::media::{GroupedMediaTypes, MediaType};

/// SQLite-backed registry store.
pub struct SqliteRegistryStore {
    conn: Mutex<Connection>,
}

impl SqliteRegistryStore {
    /// Create a new SQLite registry store, creating the database file and tables if needed.
    pub fn new(path: &Path) -> Result<Self, RegistryError> {
        let conn = Connection::open(path).map_err(|e| RegistryError::Store(e.to_string()))?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Create an in-memory SQLite registry store (useful for testing).
    pub fn in_memory() -> Result<Self, RegistryError> {
        let conn =
            Connection::open_in_memory().map_err(|e| RegistryError::Store(e.to_string()))?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn initialize_schema(conn: &Connection) -> Result<(), RegistryError> {
        conn.execute_batch(
            r#"
            PRAGMA foreign_keys = ON;

            CREATE TABLE IF NOT EXISTS sources (
                identifier TEXT PRIMARY KEY,
                friendly_name TEXT NOT NULL,
                media_types TEXT NOT NULL,
                last_synced TEXT
            );

            -- One row per reconciliation stream, keyed by (path, grouped media types)
            CREATE TABLE IF NOT EXISTS imports (
                path TEXT NOT NULL,
                media_types TEXT NOT NULL,
                source_id TEXT NOT NULL REFERENCES sources(identifier) ON DELETE CASCADE,
                update_imported_items INTEGER NOT NULL DEFAULT 1,
                update_playback_metadata INTEGER NOT NULL DEFAULT 1,
                allow_removal INTEGER NOT NULL DEFAULT 1,
                last_synced TEXT,
                PRIMARY KEY (path, media_types)
            );

            CREATE INDEX IF NOT EXISTS idx_imports_source ON imports(source_id);
            "#,
        )
        .map_err(|e| RegistryError::Store(e.to_string()))?;

        Ok(())
    }

    fn parse_timestamp(value: Option<String>) -> Option<DateTime<Utc>> {
        value
            .and_then(|s| DateTime::parse_from_rfc3339(&s).ok())
            .map(|dt| dt.with_timezone(&Utc))
    }

    fn parse_media_types(idx: usize, joined: &str) -> rusqlite::Result<GroupedMediaTypes> {
        GroupedMediaTypes::parse(joined)
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
    }

    fn join_source_types(types: &BTreeSet<MediaType>) -> String {
        types
            .iter()
            .map(MediaType::as_str)
            .collect::<Vec<_>>()
            .join(";")
    }

    fn row_to_source(row: &rusqlite::Row) -> rusqlite::Result<Source> {
        let media_types: String = row.get(2)?;
        Ok(Source {
            identifier: row.get(0)?,
            friendly_name: row.get(1)?,
            media_types: Self::parse_media_types(2, &media_types)?.iter().collect(),
            last_synced: Self::parse_timestamp(row.get(3)?),
        })
    }

    /// Columns: path, media_types, update_imported_items, update_playback_metadata,
    /// allow_removal, last_synced, then the four source columns.
    fn row_to_import(row: &rusqlite::Row) -> rusqlite::Result<Import> {
        let media_types: String = row.get(1)?;
        let source_types: String = row.get(8)?;

        Ok(Import {
            path: row.get(0)?,
            media_types: Self::parse_media_types(1, &media_types)?,
            settings: ImportSettings {
                update_imported_items: row.get(2)?,
                update_playback_metadata_from_source: row.get(3)?,
                allow_removal: row.get(4)?,
            },
            last_synced: Self::parse_timestamp(row.get(5)?),
            source: Source {
                identifier: row.get(6)?,
                friendly_name: row.get(7)?,
                media_types: Self::parse_media_types(8, &source_types)?.iter().collect(),
                last_synced: Self::parse_timestamp(row.get(9)?),
            },
        })
    }
}

impl RegistryStore for SqliteRegistryStore {
    fn open(&self) -> Result<Box<dyn RegistrySession + '_>, RegistryError> {
        let conn = self
            .conn
            .lock()
            .map_err(|_| RegistryError::Store("registry database handle poisoned".to_string()))?;
        Ok(Box::new(SqliteRegistrySession { conn }))
    }
}

/// An open SQLite registry session; the connection is released on drop.
struct SqliteRegistrySession<'a> {
    conn: MutexGuard<'a, Connection>,
}

impl RegistrySession for SqliteRegistrySession<'_> {
    fn get_sources(&self) -> Result<Vec<Source>, RegistryError> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT identifier, friendly_name, media_types, last_synced
                 FROM sources ORDER BY identifier",
            )
            .map_err(|e| RegistryError::Store(e.to_string()))?;

        let rows = stmt
            .query_map([], SqliteRegistryStore::row_to_source)
            .map_err(|e| RegistryError::Store(e.to_string()))?;

        let mut sources = Vec::new();
        for row in rows {
            sources.push(row.map_err(|e| RegistryError::Store(e.to_string()))?);
        }
        Ok(sources)
    }

    fn add_source(&self, source: &Source) -> Result<(), RegistryError> {
        self.conn
            .execute(
                "INSERT INTO sources (identifier, friendly_name, media_types, last_synced)
                 VALUES (?, ?, ?, ?)
                 ON CONFLICT(identifier) DO UPDATE SET
                    friendly_name = excluded.friendly_name,
                    media_types = excluded.media_types,
                    last_synced = excluded.last_synced",
                params![
                    &source.identifier,
                    &source.friendly_name,
                    SqliteRegistryStore::join_source_types(&source.media_types),
                    source.last_synced.map(|t| t.to_rfc3339()),
                ],
            )
            .map_err(|e| RegistryError::Store(e.to_string()))?;
        Ok(())
    }

    fn update_source(&self, source: &Source) -> Result<bool, RegistryError> {
        let changed = self
            .conn
            .execute(
                "UPDATE sources SET friendly_name = ?, media_types = ?, last_synced = ?
                 WHERE identifier = ?",
                params![
                    &source.friendly_name,
                    SqliteRegistryStore::join_source_types(&source.media_types),
                    source.last_synced.map(|t| t.to_rfc3339()),
                    &source.identifier,
                ],
            )
            .map_err(|e| RegistryError::Store(e.to_string()))?;
        Ok(changed > 0)
    }

    fn remove_source(&self, identifier: &str) -> Result<bool, RegistryError> {
        let removed = self
            .conn
            .execute("DELETE FROM sources WHERE identifier = ?", params![identifier])
            .map_err(|e| RegistryError::Store(e.to_string()))?;
        Ok(removed > 0)
    }

    fn get_imports(&self) -> Result<Vec<Import>, RegistryError> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT i.path, i.media_types, i.update_imported_items, i.update_playback_metadata,
                        i.allow_removal, i.last_synced,
                        s.identifier, s.friendly_name, s.media_types, s.last_synced
                 FROM imports i
                 JOIN sources s ON s.identifier = i.source_id
                 ORDER BY i.path, i.media_types",
            )
            .map_err(|e| RegistryError::Store(e.to_string()))?;

        let rows = stmt
            .query_map([], SqliteRegistryStore::row_to_import)
            .map_err(|e| RegistryError::Store(e.to_string()))?;

        let mut imports = Vec::new();
        for row in rows {
            imports.push(row.map_err(|e| RegistryError::Store(e.to_string()))?);
        }
        Ok(imports)
    }

    fn add_import(&self, import: &Import) -> Result<(), RegistryError> {
        self.conn
            .execute(
                "INSERT INTO imports (path, media_types, source_id, update_imported_items,
                                      update_playback_metadata, allow_removal, last_synced)
                 VALUES (?, ?, ?, ?, ?, ?, ?)
                 ON CONFLICT(path, media_types) DO UPDATE SET
                    source_id = excluded.source_id,
                    update_imported_items = excluded.update_imported_items,
                    update_playback_metadata = excluded.update_playback_metadata,
                    allow_removal = excluded.allow_removal,
                    last_synced = excluded.last_synced",
                params![
                    &import.path,
                    import.media_types.to_tag_string(),
                    &import.source.identifier,
                    import.settings.update_imported_items,
                    import.settings.update_playback_metadata_from_source,
                    import.settings.allow_removal,
                    import.last_synced.map(|t| t.to_rfc3339()),
                ],
            )
            .map_err(|e| RegistryError::Store(e.to_string()))?;
        Ok(())
    }

    fn update_import(&self, import: &Import) -> Result<bool, RegistryError> {
        let changed = self
            .conn
            .execute(
                "UPDATE imports SET source_id = ?, update_imported_items = ?,
                        update_playback_metadata = ?, allow_removal = ?, last_synced = ?
                 WHERE path = ? AND media_types = ?",
                params![
                    &import.source.identifier,
                    import.settings.update_imported_items,
                    import.settings.update_playback_metadata_from_source,
                    import.settings.allow_removal,
                    import.last_synced.map(|t| t.to_rfc3339()),
                    &import.path,
                    import.media_types.to_tag_string(),
                ],
            )
            .map_err(|e| RegistryError::Store(e.to_string()))?;
        Ok(changed > 0)
    }

    fn remove_import(
        &self,
        path: &str,
        media_types: &GroupedMediaTypes,
    ) -> Result<bool, RegistryError> {
        let removed = self
            .conn
            .execute(
                "DELETE FROM imports WHERE path = ? AND media_types = ?",
                params![path, media_types.to_tag_string()],
            )
            .map_err(|e| RegistryError::Store(e.to_string()))?;
        Ok(removed > 0)
    }

    fn update_last_sync(&self, import: &Import, at: DateTime<Utc>) -> Result<(), RegistryError> {
        let at = at.to_rfc3339();

        // Import and source rows change together or not at all
        let tx = self
            .conn
            .unchecked_transaction()
            .map_err(|e| RegistryError::Store(e.to_string()))?;

        let changed = tx
            .execute(
                "UPDATE imports SET last_synced = ? WHERE path = ? AND media_types = ?",
                params![&at, &import.path, import.media_types.to_tag_string()],
            )
            .map_err(|e| RegistryError::Store(e.to_string()))?;
        if changed == 0 {
            return Err(RegistryError::NotFound(import.describe()));
        }

        tx.execute(
            "UPDATE sources SET last_synced = ? WHERE identifier = ?",
            params![&at, &import.source.identifier],
        )
        .map_err(|e| RegistryError::Store(e.to_string()))?;

        tx.commit()
            .map_err(|e| RegistryError::Store(e.to_string()))?;
        Ok(())
    }
}
