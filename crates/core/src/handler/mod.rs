//! Media import handlers.
//!
//! One handler per media type encapsulates how items of that type are
//! matched against the catalog, compared and written. The trait's default
//! methods carry the behaviour every handler shares; concrete handlers mostly
//! declare their descriptors, their identity rule and how their parents are
//! resolved.
//!
//! A pass over one import drives each handler through
//! `start_changeset` / `determine_changeset`* / `finish_changeset`, then
//! `start_synchronisation` / mutations / `finish_synchronisation`, and
//! finally `cleanup_imported_items` for container types.

mod album;
mod artist;
pub mod compare;
mod context;
mod episode;
mod lookup;
mod movie;
mod movieset;
mod musicvideo;
mod parents;
mod season;
mod song;
mod tvshow;

pub use album::AlbumHandler;
pub use artist::ArtistHandler;
pub use context::{ChangesetContext, SyncTransaction};
pub use episode::EpisodeHandler;
pub use lookup::HandlerSet;
pub use movie::MovieHandler;
pub use movieset::MovieSetHandler;
pub use musicvideo::MusicVideoHandler;
pub use season::SeasonHandler;
pub use song::SongHandler;
pub use tvshow::TvShowHandler;

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::catalog::{CatalogError, ImportTag, MediaCatalog};
use crate::media::{MediaItem, MediaType};
use crate::registry::Import;

/// Movies and their collections.
pub const MOVIE_GROUP: &[MediaType] = &[MediaType::Movie, MediaType::MovieSet];

/// Shows, seasons and episodes.
pub const TV_GROUP: &[MediaType] = &[MediaType::TvShow, MediaType::Season, MediaType::Episode];

pub const MUSIC_VIDEO_GROUP: &[MediaType] = &[MediaType::MusicVideo];

/// Artists, albums and songs.
pub const MUSIC_GROUP: &[MediaType] = &[MediaType::Artist, MediaType::Album, MediaType::Song];

/// Outcome of comparing one remote item against the local items.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangesetVerdict {
    Added,
    Changed,
    /// Nothing to do: unchanged, ignored or not to be updated.
    #[serde(rename = "none")]
    Unchanged,
    Removed,
}

impl ChangesetVerdict {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChangesetVerdict::Added => "added",
            ChangesetVerdict::Changed => "changed",
            ChangesetVerdict::Unchanged => "none",
            ChangesetVerdict::Removed => "removed",
        }
    }
}

impl fmt::Display for ChangesetVerdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors for handler operations.
#[derive(Debug, Error)]
pub enum HandlerError {
    #[error("Catalog error: {0}")]
    Catalog(#[from] CatalogError),

    #[error("{handler} handler cannot process a {got} item")]
    WrongMediaType { handler: MediaType, got: MediaType },

    #[error("{0} has no database id")]
    MissingId(String),

    #[error("Cannot resolve {parent} \"{name}\" for {item}")]
    MissingParent {
        item: String,
        parent: MediaType,
        name: String,
    },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Local items still waiting for a remote counterpart, keyed by database id.
///
/// Matching an item takes it out of the set; whatever is left after the last
/// remote item of a batch has no remote counterpart.
#[derive(Debug, Clone, Default)]
pub struct LocalItems {
    items: BTreeMap<i64, MediaItem>,
}

impl LocalItems {
    /// Build the set. Items without a database id are not local items and
    /// are skipped.
    pub fn new(items: impl IntoIterator<Item = MediaItem>) -> Self {
        Self {
            items: items
                .into_iter()
                .filter_map(|item| item.id().map(|id| (id, item)))
                .collect(),
        }
    }

    pub fn get(&self, id: i64) -> Option<&MediaItem> {
        self.items.get(&id)
    }

    /// Remove and return the item with the given id.
    pub fn take(&mut self, id: i64) -> Option<MediaItem> {
        self.items.remove(&id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &MediaItem> {
        self.items.values()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn into_items(self) -> Vec<MediaItem> {
        self.items.into_values().collect()
    }
}

/// Synchronization semantics of one media type.
pub trait MediaImportHandler: Send + Sync {
    // =========================================================================
    // Descriptors
    // =========================================================================

    fn media_type(&self) -> MediaType;

    /// The unit of work this handler is part of.
    fn grouped_media_types(&self) -> &'static [MediaType];

    /// Types that must be fully synchronised before this handler runs in the
    /// same pass.
    fn required_media_types(&self) -> &'static [MediaType] {
        &[]
    }

    /// Types needed to interpret this handler's items. When they are part
    /// of the pass they run first; they are not required to be.
    fn dependencies(&self) -> &'static [MediaType] {
        &[]
    }

    /// Child types for container handlers. A container with no children of
    /// these types left is removed during cleanup.
    fn child_media_types(&self) -> &'static [MediaType] {
        &[]
    }

    fn is_container(&self) -> bool {
        !self.child_media_types().is_empty()
    }

    /// Whether removing a container also removes its children from the same
    /// import.
    fn removes_children(&self) -> bool {
        self.is_container()
    }

    /// Catalog-owned fields: skipped during comparison and carried forward
    /// from the local item on change.
    fn ignore_differences(&self) -> &'static [&'static str] {
        &["id"]
    }

    fn catalog(&self) -> &dyn MediaCatalog;

    // =========================================================================
    // Identity
    // =========================================================================

    /// Whether the item carries enough identity data to be matched and stored.
    fn has_identity(&self, item: &MediaItem) -> bool;

    /// The local item the remote item corresponds to, if any.
    fn find_matching_local_item<'a>(
        &self,
        import: &Import,
        item: &MediaItem,
        local_items: &'a LocalItems,
    ) -> Option<&'a MediaItem>;

    /// Resolve the item's linkage ids before it is stored.
    fn prepare_item(
        &self,
        _tx: &SyncTransaction,
        _import: &Import,
        _item: &mut MediaItem,
    ) -> Result<(), HandlerError> {
        Ok(())
    }

    /// Hook run after an item was stored.
    fn after_store(
        &self,
        _tx: &SyncTransaction,
        _import: &Import,
        _item: &MediaItem,
    ) -> Result<(), HandlerError> {
        Ok(())
    }

    // =========================================================================
    // Changeset
    // =========================================================================

    /// Items of this type previously imported through `import`.
    fn get_local_items(&self, import: &Import) -> Result<Vec<MediaItem>, HandlerError> {
        let session = self.catalog().open()?;
        Ok(session.get_items(self.media_type(), &ImportTag::from(import))?)
    }

    fn start_changeset(&self, import: &Import) -> Result<ChangesetContext, HandlerError> {
        let session = self.catalog().open()?;
        Ok(ChangesetContext::new(
            session,
            self.media_type(),
            ImportTag::from(import),
        ))
    }

    /// Decide what to do with one remote item.
    ///
    /// A matched local item is taken out of `local_items`. On `Changed`, the
    /// remote item comes back carrying the local database id and every field
    /// the catalog owns.
    fn determine_changeset(
        &self,
        ctx: &mut ChangesetContext,
        import: &Import,
        item: &mut MediaItem,
        local_items: &mut LocalItems,
    ) -> Result<ChangesetVerdict, HandlerError> {
        check_media_type(self.media_type(), item)?;

        if !self.has_identity(item) {
            debug!(item = %item.label(), "Ignoring remote item without identity");
            return Ok(ChangesetVerdict::Unchanged);
        }

        let matched = self
            .find_matching_local_item(import, item, local_items)
            .and_then(MediaItem::id);
        let Some(mut local) = matched.and_then(|id| local_items.take(id)) else {
            return Ok(ChangesetVerdict::Added);
        };

        if !import.settings.update_imported_items {
            return Ok(ChangesetVerdict::Unchanged);
        }

        ctx.load_details(&mut local)?;

        let fields = compare::ignored_fields(self.ignore_differences(), import, item);
        compare::carry_forward(item, &local, &fields)?;
        let changed = compare::differences(item, &local, &fields)?;

        if changed.is_empty() {
            Ok(ChangesetVerdict::Unchanged)
        } else {
            debug!(item = %item.label(), fields = ?changed, "Remote item changed");
            Ok(ChangesetVerdict::Changed)
        }
    }

    fn finish_changeset(&self, ctx: ChangesetContext) -> Result<(), HandlerError> {
        drop(ctx);
        Ok(())
    }

    // =========================================================================
    // Synchronisation
    // =========================================================================

    fn start_synchronisation(&self, import: &Import) -> Result<SyncTransaction, HandlerError> {
        let session = self.catalog().open()?;
        Ok(SyncTransaction::begin(session, ImportTag::from(import))?)
    }

    /// Insert a new item. Returns its database id, which is also set on `item`.
    fn add_imported_item(
        &self,
        tx: &SyncTransaction,
        import: &Import,
        item: &mut MediaItem,
    ) -> Result<i64, HandlerError> {
        check_media_type(self.media_type(), item)?;

        item.set_id(None);
        self.prepare_item(tx, import, item)?;
        let id = tx.session().set_details(item, tx.tag())?;
        tx.forget_containers(self.media_type());
        item.set_id(Some(id));
        register_path(tx, item, id)?;
        self.after_store(tx, import, item)?;
        Ok(id)
    }

    fn update_imported_item(
        &self,
        tx: &SyncTransaction,
        import: &Import,
        item: &mut MediaItem,
    ) -> Result<(), HandlerError> {
        check_media_type(self.media_type(), item)?;
        let id = item
            .id()
            .ok_or_else(|| HandlerError::MissingId(item.label()))?;

        self.prepare_item(tx, import, item)?;
        tx.session().set_details(item, tx.tag())?;
        tx.forget_containers(self.media_type());
        tx.session().remove_path_from_item(id)?;
        register_path(tx, item, id)?;
        self.after_store(tx, import, item)?;
        Ok(())
    }

    /// Delete an item and release its path bookkeeping. Containers take their
    /// children from the same import with them.
    fn remove_imported_item(
        &self,
        tx: &SyncTransaction,
        _import: &Import,
        item: &MediaItem,
    ) -> Result<(), HandlerError> {
        check_media_type(self.media_type(), item)?;
        let id = item
            .id()
            .ok_or_else(|| HandlerError::MissingId(item.label()))?;

        let child_types = if self.removes_children() {
            self.child_media_types()
        } else {
            &[]
        };
        for child_type in child_types {
            for child in tx.session().get_items(*child_type, tx.tag())? {
                let Some(child_id) = child.id() else { continue };
                if child.parent_ids().contains(&id) {
                    tx.session().remove_path_from_item(child_id)?;
                    tx.session().delete_item(*child_type, child_id)?;
                }
            }
        }

        tx.session().remove_path_from_item(id)?;
        tx.forget_containers(self.media_type());
        if !tx.session().delete_item(self.media_type(), id)? {
            return Err(CatalogError::NotFound(self.media_type(), id).into());
        }
        Ok(())
    }

    /// Re-enable items a previous run left disabled, then commit.
    fn finish_synchronisation(
        &self,
        tx: SyncTransaction,
        import: &Import,
    ) -> Result<(), HandlerError> {
        let enabled = tx
            .session()
            .set_import_items_enabled(self.media_type(), tx.tag(), true)?;
        if enabled > 0 {
            debug!(
                import = %import.describe(),
                media_type = %self.media_type(),
                enabled,
                "Re-enabled imported items"
            );
        }
        tx.commit()?;
        Ok(())
    }

    fn rollback_synchronisation(&self, tx: SyncTransaction) -> Result<(), HandlerError> {
        tx.rollback()?;
        Ok(())
    }

    /// Remove this import's containers that no longer have children from any
    /// import. Returns how many were removed; always zero for non-containers.
    fn cleanup_imported_items(&self, import: &Import) -> Result<usize, HandlerError> {
        if !self.is_container() {
            return Ok(0);
        }

        let tx = self.start_synchronisation(import)?;
        let mut removed = 0;
        for item in tx.session().get_items(self.media_type(), tx.tag())? {
            let Some(id) = item.id() else { continue };
            if tx.session().count_children(id, self.child_media_types())? == 0 {
                debug!(item = %item.label(), "Removing empty container");
                tx.session().remove_path_from_item(id)?;
                tx.session().delete_item(self.media_type(), id)?;
                removed += 1;
            }
        }
        tx.commit()?;
        Ok(removed)
    }

    /// Soft-enable or disable every item of this type imported through
    /// `import`. Returns the number of items whose state changed.
    fn set_items_enabled(&self, import: &Import, enabled: bool) -> Result<usize, HandlerError> {
        let tx = self.start_synchronisation(import)?;
        let changed = tx
            .session()
            .set_import_items_enabled(self.media_type(), tx.tag(), enabled)?;
        tx.commit()?;
        Ok(changed)
    }
}

fn check_media_type(expected: MediaType, item: &MediaItem) -> Result<(), HandlerError> {
    if item.media_type() == expected {
        Ok(())
    } else {
        Err(HandlerError::WrongMediaType {
            handler: expected,
            got: item.media_type(),
        })
    }
}

fn register_path(tx: &SyncTransaction, item: &MediaItem, id: i64) -> Result<(), HandlerError> {
    if let Some(path) = item.bookkeeping_path() {
        let path_id = tx.session().add_path(&path)?;
        tx.session().link_path(id, path_id)?;
    }
    Ok(())
}

/// Match a file-based item: by database id when it has one, else by file path.
pub(crate) fn match_file_based<'a>(
    item: &MediaItem,
    local_items: &'a LocalItems,
) -> Option<&'a MediaItem> {
    if let Some(local) = item.id().and_then(|id| local_items.get(id)) {
        return Some(local);
    }
    let path = item.file_path()?;
    local_items
        .iter()
        .find(|local| local.file_path() == Some(path))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::Movie;

    fn movie(id: Option<i64>, path: &str) -> MediaItem {
        MediaItem::Movie(Movie {
            id,
            title: "Heat".to_string(),
            file_path: path.to_string(),
            ..Default::default()
        })
    }

    #[test]
    fn test_local_items_skip_unpersisted() {
        let items = LocalItems::new([movie(Some(1), "a.mkv"), movie(None, "b.mkv")]);
        assert_eq!(items.len(), 1);
    }

    #[test]
    fn test_take_removes_by_id() {
        let mut items = LocalItems::new([movie(Some(1), "a.mkv"), movie(Some(2), "b.mkv")]);
        assert!(items.take(1).is_some());
        assert!(items.take(1).is_none());
        assert_eq!(items.len(), 1);
    }

    #[test]
    fn test_match_file_based_prefers_id() {
        let items = LocalItems::new([movie(Some(1), "a.mkv"), movie(Some(2), "b.mkv")]);

        let by_id = match_file_based(&movie(Some(2), "a.mkv"), &items).unwrap();
        assert_eq!(by_id.id(), Some(2));

        let by_path = match_file_based(&movie(None, "a.mkv"), &items).unwrap();
        assert_eq!(by_path.id(), Some(1));

        assert!(match_file_based(&movie(None, "c.mkv"), &items).is_none());
    }

    #[test]
    fn test_verdict_tags() {
        assert_eq!(ChangesetVerdict::Unchanged.as_str(), "none");
        assert_eq!(
            serde_json::to_string(&ChangesetVerdict::Unchanged).unwrap(),
            "\"none\""
        );
    }
}
