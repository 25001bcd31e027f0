//! Category-tree synchronization.
//!
//! Fetches a platform's remote taxonomy, flattens it depth-first and
//! writes only what changed against the stored tree.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{info, warn};

use crate::error::Result;
use crate::traits::{PlatformAdapter, Storage};
use crate::types::{Category, Platform, RemoteCategory};

/// Counts of category rows written by one sync run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SyncOutcome {
    pub inserted: u64,
    pub updated: u64,
}

/// Synchronizes one platform's category tree into storage.
///
/// Remote roots with no natural parent are attached under a configured
/// major-category mapping keyed by trimmed node name; unmapped roots
/// stay parentless and are flagged in the log.
pub struct CategorySynchronizer<S> {
    storage: Arc<S>,
    root_map: HashMap<String, String>,
}

impl<S: Storage> CategorySynchronizer<S> {
    pub fn new(storage: Arc<S>) -> Self {
        Self {
            storage,
            root_map: HashMap::new(),
        }
    }

    /// Map a root node name (trimmed) to the category id it roots under.
    pub fn with_root_mapping(
        mut self,
        name: impl Into<String>,
        category_id: impl Into<String>,
    ) -> Self {
        self.root_map.insert(name.into(), category_id.into());
        self
    }

    pub fn with_root_map(mut self, map: HashMap<String, String>) -> Self {
        self.root_map = map;
        self
    }

    /// Fetch the adapter's remote tree and sync it.
    ///
    /// Any fetch error aborts the platform's sync before the first
    /// write; the next scheduled run retries from scratch.
    pub async fn run(&self, adapter: &dyn PlatformAdapter) -> Result<SyncOutcome> {
        let platform = adapter.platform();
        let remote = adapter.fetch_category_tree().await?;
        self.sync(&platform, &remote).await
    }

    /// Sync an already-fetched remote tree for a platform.
    ///
    /// Empty stored set takes the bootstrap path (bulk insert of the
    /// full remote set); otherwise only the delta against the stored
    /// tuples is written, in a single upsert call.
    pub async fn sync(
        &self,
        platform: &Platform,
        remote: &[RemoteCategory],
    ) -> Result<SyncOutcome> {
        let remote_rows = self.flatten(platform, remote);
        let stored = self.storage.categories_for_platform(platform).await?;

        if stored.is_empty() {
            let inserted = remote_rows.len() as u64;
            if !remote_rows.is_empty() {
                self.storage.upsert_categories(&remote_rows).await?;
            }
            info!(platform = %platform, inserted, "Category bootstrap completed");
            return Ok(SyncOutcome {
                inserted,
                updated: 0,
            });
        }

        let stored_by_id: HashMap<&str, &Category> = stored
            .iter()
            .map(|c| (c.category_id.as_str(), c))
            .collect();

        let mut delta = Vec::new();
        let mut outcome = SyncOutcome::default();
        for row in &remote_rows {
            match stored_by_id.get(row.category_id.as_str()) {
                None => {
                    outcome.inserted += 1;
                    delta.push(row.clone());
                }
                Some(existing) if *existing != row => {
                    outcome.updated += 1;
                    delta.push(row.clone());
                }
                Some(_) => {}
            }
        }

        if !delta.is_empty() {
            self.storage.upsert_categories(&delta).await?;
        }
        info!(
            platform = %platform,
            inserted = outcome.inserted,
            updated = outcome.updated,
            unchanged = remote_rows.len() as u64 - outcome.inserted - outcome.updated,
            "Category sync completed"
        );
        Ok(outcome)
    }

    /// Depth-first flatten of the remote tree into storable rows.
    fn flatten(&self, platform: &Platform, remote: &[RemoteCategory]) -> Vec<Category> {
        let mut rows = Vec::new();
        let mut stack: Vec<(&RemoteCategory, Option<String>)> = Vec::new();

        for root in remote.iter().rev() {
            let parent = self.root_map.get(root.name.trim()).cloned();
            if parent.is_none() {
                warn!(
                    platform = %platform,
                    category_id = %root.id,
                    name = %root.name,
                    "Remote root has no major-category mapping, left unrooted"
                );
            }
            stack.push((root, parent));
        }

        while let Some((node, parent_id)) = stack.pop() {
            rows.push(Category {
                platform: platform.clone(),
                category_id: node.id.clone(),
                name: node.name.trim().to_string(),
                parent_id,
            });
            for child in node.children.iter().rev() {
                stack.push((child, Some(node.id.clone())));
            }
        }
        rows
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stores::MemoryStore;

    fn platform() -> Platform {
        Platform::new("boardone")
    }

    fn two_node_tree() -> Vec<RemoteCategory> {
        vec![RemoteCategory::new("A", "Engineering")
            .with_child(RemoteCategory::new("B", "Backend"))]
    }

    #[tokio::test]
    async fn bootstrap_inserts_the_full_remote_set() {
        let store = Arc::new(MemoryStore::new());
        let sync = CategorySynchronizer::new(store.clone());

        let outcome = sync.sync(&platform(), &two_node_tree()).await.unwrap();

        assert_eq!(outcome, SyncOutcome { inserted: 2, updated: 0 });
        let stored = store.categories_for_platform(&platform()).await.unwrap();
        assert_eq!(stored.len(), 2);
        let b = stored.iter().find(|c| c.category_id == "B").unwrap();
        assert_eq!(b.parent_id.as_deref(), Some("A"));
    }

    #[tokio::test]
    async fn incremental_sync_writes_only_the_delta() {
        let store = Arc::new(MemoryStore::new());
        let sync = CategorySynchronizer::new(store.clone());
        sync.sync(&platform(), &two_node_tree()).await.unwrap();

        // Same tree again: nothing to write.
        let unchanged = sync.sync(&platform(), &two_node_tree()).await.unwrap();
        assert_eq!(unchanged, SyncOutcome::default());

        // One rename, one new node.
        let tree = vec![RemoteCategory::new("A", "Engineering")
            .with_child(RemoteCategory::new("B", "Platform"))
            .with_child(RemoteCategory::new("C", "Data"))];
        let outcome = sync.sync(&platform(), &tree).await.unwrap();
        assert_eq!(outcome, SyncOutcome { inserted: 1, updated: 1 });

        let stored = store.categories_for_platform(&platform()).await.unwrap();
        assert_eq!(stored.len(), 3);
        let b = stored.iter().find(|c| c.category_id == "B").unwrap();
        assert_eq!(b.name, "Platform");
    }

    #[tokio::test]
    async fn roots_are_attached_through_the_major_category_map() {
        let store = Arc::new(MemoryStore::new());
        let sync = CategorySynchronizer::new(store.clone())
            .with_root_mapping("Engineering", "major-eng");

        // Name carries stray whitespace; the lookup trims it first.
        let tree = vec![
            RemoteCategory::new("A", "  Engineering "),
            RemoteCategory::new("X", "Unheard Of"),
        ];
        sync.sync(&platform(), &tree).await.unwrap();

        let stored = store.categories_for_platform(&platform()).await.unwrap();
        let a = stored.iter().find(|c| c.category_id == "A").unwrap();
        let x = stored.iter().find(|c| c.category_id == "X").unwrap();
        assert_eq!(a.parent_id.as_deref(), Some("major-eng"));
        assert_eq!(x.parent_id, None);
    }

    #[tokio::test]
    async fn flatten_is_depth_first() {
        let store = Arc::new(MemoryStore::new());
        let sync = CategorySynchronizer::new(store);
        let tree = vec![
            RemoteCategory::new("A", "First")
                .with_child(RemoteCategory::new("A1", "First Child")),
            RemoteCategory::new("B", "Second"),
        ];

        let rows = sync.flatten(&platform(), &tree);
        let ids: Vec<&str> = rows.iter().map(|c| c.category_id.as_str()).collect();
        assert_eq!(ids, vec!["A", "A1", "B"]);
    }
}
