//! Mock importer for testing.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

use crate::importer::{ImporterError, MediaImporter};
use crate::media::{MediaItem, MediaType};
use crate::registry::Import;

/// A recorded retrieval for test assertions.
#[derive(Debug, Clone)]
pub struct RecordedRetrieval {
    /// Import the batch was retrieved for.
    pub import: Import,
    pub media_type: MediaType,
    pub timestamp: Instant,
}

/// A recorded update pushed to a source.
#[derive(Debug, Clone)]
pub struct RecordedUpdate {
    pub import: Import,
    pub item: MediaItem,
}

/// Mock implementation of the MediaImporter trait.
///
/// Provides controllable behavior for testing:
/// - Return batches primed per media type, optionally per import path
/// - Track retrievals and pushed updates for assertions
/// - Simulate failures and slow sources
///
/// # Example
///
/// ```rust,ignore
/// use mediaimport_core::testing::{MockImporter, fixtures};
///
/// let importer = MockImporter::new();
/// importer.set_items(MediaType::Movie, vec![
///     fixtures::movie("Heat", "smb://nas/heat.mkv"),
/// ]).await;
///
/// let items = importer.retrieve(&import, MediaType::Movie).await?;
/// assert_eq!(items.len(), 1);
/// assert_eq!(importer.recorded_retrievals().await.len(), 1);
/// ```
pub struct MockImporter {
    /// Batches returned for any import.
    items: Arc<RwLock<HashMap<MediaType, Vec<MediaItem>>>>,
    /// Batches returned for one import path, taking precedence.
    import_items: Arc<RwLock<HashMap<(String, MediaType), Vec<MediaItem>>>>,
    retrievals: Arc<RwLock<Vec<RecordedRetrieval>>>,
    updates: Arc<RwLock<Vec<RecordedUpdate>>>,
    /// If set, the next call will fail with this error.
    next_error: Arc<RwLock<Option<ImporterError>>>,
    /// Simulated latency per retrieval.
    delay: Arc<RwLock<Option<Duration>>>,
    supports_updates: Arc<RwLock<bool>>,
}

impl std::fmt::Debug for MockImporter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockImporter")
            .field("items", &"<items>")
            .field("retrievals", &"<retrievals>")
            .field("updates", &"<updates>")
            .finish()
    }
}

impl Default for MockImporter {
    fn default() -> Self {
        Self::new()
    }
}

impl MockImporter {
    /// Create a new mock importer returning empty batches.
    pub fn new() -> Self {
        Self {
            items: Arc::new(RwLock::new(HashMap::new())),
            import_items: Arc::new(RwLock::new(HashMap::new())),
            retrievals: Arc::new(RwLock::new(Vec::new())),
            updates: Arc::new(RwLock::new(Vec::new())),
            next_error: Arc::new(RwLock::new(None)),
            delay: Arc::new(RwLock::new(None)),
            supports_updates: Arc::new(RwLock::new(true)),
        }
    }

    /// Set the batch returned for `media_type`.
    pub async fn set_items(&self, media_type: MediaType, items: Vec<MediaItem>) {
        self.items.write().await.insert(media_type, items);
    }

    /// Set the batch returned for `media_type` of the import at `path`.
    pub async fn set_import_items(&self, path: &str, media_type: MediaType, items: Vec<MediaItem>) {
        self.import_items
            .write()
            .await
            .insert((path.to_string(), media_type), items);
    }

    /// Make the next retrieval or update fail.
    pub async fn set_next_error(&self, error: ImporterError) {
        *self.next_error.write().await = Some(error);
    }

    /// Delay every retrieval.
    pub async fn set_delay(&self, delay: Duration) {
        *self.delay.write().await = Some(delay);
    }

    /// Whether `update_on_source` succeeds or reports `Unsupported`.
    pub async fn set_supports_updates(&self, supported: bool) {
        *self.supports_updates.write().await = supported;
    }

    pub async fn recorded_retrievals(&self) -> Vec<RecordedRetrieval> {
        self.retrievals.read().await.clone()
    }

    pub async fn recorded_updates(&self) -> Vec<RecordedUpdate> {
        self.updates.read().await.clone()
    }

    pub async fn clear_recorded(&self) {
        self.retrievals.write().await.clear();
        self.updates.write().await.clear();
    }
}

#[async_trait]
impl MediaImporter for MockImporter {
    fn name(&self) -> &str {
        "mock"
    }

    async fn retrieve(
        &self,
        import: &Import,
        media_type: MediaType,
    ) -> Result<Vec<MediaItem>, ImporterError> {
        self.retrievals.write().await.push(RecordedRetrieval {
            import: import.clone(),
            media_type,
            timestamp: Instant::now(),
        });

        let delay = *self.delay.read().await;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        if let Some(error) = self.next_error.write().await.take() {
            return Err(error);
        }

        let key = (import.path.clone(), media_type);
        if let Some(items) = self.import_items.read().await.get(&key) {
            return Ok(items.clone());
        }
        Ok(self
            .items
            .read()
            .await
            .get(&media_type)
            .cloned()
            .unwrap_or_default())
    }

    async fn update_on_source(
        &self,
        import: &Import,
        item: &MediaItem,
    ) -> Result<(), ImporterError> {
        if let Some(error) = self.next_error.write().await.take() {
            return Err(error);
        }
        if !*self.supports_updates.read().await {
            return Err(ImporterError::Unsupported("mock"));
        }

        self.updates.write().await.push(RecordedUpdate {
            import: import.clone(),
            item: item.clone(),
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::fixtures;

    #[tokio::test]
    async fn test_import_items_take_precedence() {
        let importer = MockImporter::new();
        let import = fixtures::movie_import();
        importer
            .set_items(MediaType::Movie, vec![fixtures::movie("Heat", "a.mkv")])
            .await;
        importer
            .set_import_items(
                &import.path,
                MediaType::Movie,
                vec![
                    fixtures::movie("Ronin", "b.mkv"),
                    fixtures::movie("Thief", "c.mkv"),
                ],
            )
            .await;

        let items = importer.retrieve(&import, MediaType::Movie).await.unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(importer.recorded_retrievals().await.len(), 1);
    }

    #[tokio::test]
    async fn test_next_error_is_consumed() {
        let importer = MockImporter::new();
        let import = fixtures::movie_import();
        importer
            .set_next_error(ImporterError::Unavailable("offline".to_string()))
            .await;

        assert!(importer.retrieve(&import, MediaType::Movie).await.is_err());
        assert!(importer.retrieve(&import, MediaType::Movie).await.is_ok());
    }

    #[tokio::test]
    async fn test_updates_recorded_or_unsupported() {
        let importer = MockImporter::new();
        let import = fixtures::movie_import();
        let item = fixtures::movie("Heat", "a.mkv");

        importer.update_on_source(&import, &item).await.unwrap();
        assert_eq!(importer.recorded_updates().await.len(), 1);

        importer.set_supports_updates(false).await;
        assert!(matches!(
            importer.update_on_source(&import, &item).await,
            Err(ImporterError::Unsupported(_))
        ));
    }
}
