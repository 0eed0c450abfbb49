//! Persistence layer: a key-value store boundary plus tree-level
//! save/load/backup and import/export on top of it.
//!
//! The browser original reached for localStorage as an ambient global; here
//! the store is an explicit injected dependency so the app and its tests can
//! run against an in-memory fake.

mod file;
mod memory;

pub use file::FileStore;
pub use memory::MemoryStore;

use crate::cli::Args;
use crate::models::tree::ConversationTree;
use crate::tree::invariant_violations;
use async_trait::async_trait;
use log::info;
use std::error::Error as StdError;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("storage backend failure: {0}")] Backend(String),
    #[error("malformed tree data: {0}")] Malformed(#[from] serde_json::Error),
    #[error("import missing required field: {0}")] MissingField(&'static str),
    #[error("imported tree violates structural invariants: {0}")] InvalidTree(String),
}

#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;
    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError>;
    async fn remove(&self, key: &str) -> Result<(), StoreError>;
}

pub fn create_store(args: &Args) -> Result<Arc<dyn KeyValueStore>, Box<dyn StdError + Send + Sync>> {
    match args.store_type.to_lowercase().as_str() {
        "memory" => Ok(Arc::new(MemoryStore::new())),
        "file" => Ok(Arc::new(FileStore::new(args.store_path.clone()))),
        _ =>
            Err(
                Box::new(
                    std::io::Error::new(
                        std::io::ErrorKind::InvalidInput,
                        format!("Unsupported store type: {}", args.store_type)
                    )
                )
            ),
    }
}

pub fn initialize_store(args: &Args) -> Result<Arc<dyn KeyValueStore>, Box<dyn StdError + Send + Sync>> {
    info!("Trees will be stored in: {} ({})", args.store_type, args.store_path);
    create_store(args)
}

/// Workspace-scoped tree persistence over any [`KeyValueStore`].
pub struct TreeStore {
    store: Arc<dyn KeyValueStore>,
}

impl TreeStore {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    fn tree_key(workspace: &str) -> String {
        format!("tree:{}", workspace)
    }

    fn backup_key(workspace: &str) -> String {
        format!("backup:{}", workspace)
    }

    pub async fn save(&self, workspace: &str, tree: &ConversationTree) -> Result<(), StoreError> {
        let encoded = serde_json::to_string(tree)?;
        self.store.set(&Self::tree_key(workspace), &encoded).await
    }

    /// Loads the workspace tree, or None when nothing was saved yet. A saved
    /// value goes through the same validation as an import: state written by
    /// an older or foreign build must not smuggle in a broken tree.
    pub async fn load(&self, workspace: &str) -> Result<Option<ConversationTree>, StoreError> {
        match self.store.get(&Self::tree_key(workspace)).await? {
            Some(encoded) => Ok(Some(import_tree(&encoded)?)),
            None => Ok(None),
        }
    }

    pub async fn delete(&self, workspace: &str) -> Result<(), StoreError> {
        self.store.remove(&Self::tree_key(workspace)).await
    }

    /// One backup slot per workspace; scheduling policy belongs to the
    /// caller.
    pub async fn write_backup(
        &self,
        workspace: &str,
        tree: &ConversationTree
    ) -> Result<(), StoreError> {
        let encoded = serde_json::to_string(tree)?;
        self.store.set(&Self::backup_key(workspace), &encoded).await
    }

    pub async fn load_backup(&self, workspace: &str) -> Result<Option<ConversationTree>, StoreError> {
        match self.store.get(&Self::backup_key(workspace)).await? {
            Some(encoded) => Ok(Some(import_tree(&encoded)?)),
            None => Ok(None),
        }
    }
}

pub fn export_tree(tree: &ConversationTree) -> Result<String, StoreError> {
    Ok(serde_json::to_string_pretty(tree)?)
}

/// Decodes a serialized tree and validates it: the minimal required fields
/// first (root id, active id, root present in the node map, all carried by
/// deserialization), then the full set of structural invariants. Trees that
/// fail validation are rejected rather than repaired.
pub fn import_tree(encoded: &str) -> Result<ConversationTree, StoreError> {
    let tree: ConversationTree = serde_json::from_str(encoded)?;
    if tree.root_id.is_empty() {
        return Err(StoreError::MissingField("rootId"));
    }
    if tree.active_node_id.is_empty() {
        return Err(StoreError::MissingField("activeNodeId"));
    }
    if !tree.nodes.contains_key(&tree.root_id) {
        return Err(StoreError::MissingField("nodes[rootId]"));
    }
    let violations = invariant_violations(&tree);
    if !violations.is_empty() {
        return Err(StoreError::InvalidTree(violations.join("; ")));
    }
    Ok(tree)
}
