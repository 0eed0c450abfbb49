use crate::cli::Args;
use crate::filter::{ visible_ids, FilterCriteria };
use crate::llm::chat::{ collect_stream, new_client, ChatClient };
use crate::llm::{ to_chat_turns, LlmConfig, LlmType };
use crate::models::tree::{ ConversationTree, DeletedSnapshot, Role };
use crate::store::{ export_tree, initialize_store, StoreError, TreeStore };
use crate::tree;
use crate::views::render_outline;

use log::{ info, warn };
use std::error::Error;
use std::sync::Arc;

/// The single state slot over the immutable tree: every operation consumes
/// the current tree value, produces the next one, and replaces the slot
/// before the next operation is applied. Mutations are persisted through the
/// tree store as they land.
pub struct ChatApp {
    tree: ConversationTree,
    workspace: String,
    store: TreeStore,
    chat_client: Arc<dyn ChatClient>,
    undo_stack: Vec<DeletedSnapshot>,
}

impl ChatApp {
    pub async fn new(args: &Args) -> Result<Self, Box<dyn Error + Send + Sync>> {
        let llm_type: LlmType = args.chat_llm_type.parse()?;
        let api_key = if !args.chat_api_key.is_empty() {
            Some(args.chat_api_key.clone())
        } else {
            None
        };
        let chat_config = LlmConfig {
            llm_type,
            api_key,
            model: args.chat_model.clone(),
            base_url: args.chat_base_url.clone(),
        };
        let chat_client = new_client(&chat_config)?;
        info!(
            "Chat client configured: Type={}, Model={:?}, BaseURL={:?}",
            args.chat_llm_type,
            chat_config.model.as_deref().unwrap_or("adapter default"),
            chat_config.base_url.as_deref().unwrap_or("adapter default")
        );

        let store = TreeStore::new(initialize_store(args)?);
        let tree = match store.load(&args.workspace).await? {
            Some(tree) => {
                info!("Loaded workspace '{}' with {} node(s)", args.workspace, tree.nodes.len());
                tree
            }
            None => {
                let mut tree = tree::create_empty();
                if let Some(prompt) = args.system_prompt.as_deref() {
                    tree = tree::append_message(&tree, &tree.root_id.clone(), Role::System, prompt);
                }
                store.save(&args.workspace, &tree).await?;
                info!("Created fresh tree for workspace '{}'", args.workspace);
                tree
            }
        };

        Ok(Self {
            tree,
            workspace: args.workspace.clone(),
            store,
            chat_client,
            undo_stack: Vec::new(),
        })
    }

    pub fn tree(&self) -> &ConversationTree {
        &self.tree
    }

    pub fn workspace(&self) -> &str {
        &self.workspace
    }

    /// Replaces the state slot and persists, skipping both when the
    /// operation degraded to a no-op.
    async fn commit(&mut self, next: ConversationTree) -> Result<bool, StoreError> {
        if next == self.tree {
            return Ok(false);
        }
        self.store.save(&self.workspace, &next).await?;
        self.tree = next;
        Ok(true)
    }

    /// Resolves a node reference the terminal user typed: a full id, or a
    /// prefix that matches exactly one node.
    pub fn resolve_id(&self, reference: &str) -> Option<String> {
        if self.tree.nodes.contains_key(reference) {
            return Some(reference.to_string());
        }
        let mut matches = self.tree.nodes.keys().filter(|id| id.starts_with(reference));
        let candidate = matches.next()?.clone();
        if matches.next().is_some() {
            return None;
        }
        Some(candidate)
    }

    /// Creates a new branch under the referenced node (active node when no
    /// reference is given) and focuses it.
    pub async fn branch(&mut self, parent: Option<&str>) -> Result<bool, StoreError> {
        let parent_id = match parent {
            Some(reference) => {
                match self.resolve_id(reference) {
                    Some(id) => id,
                    None => {
                        return Ok(false);
                    }
                }
            }
            None => self.tree.active_node_id.clone(),
        };
        let next = tree::add_child(&self.tree, &parent_id);
        self.commit(next).await
    }

    pub async fn switch(&mut self, reference: &str) -> Result<bool, StoreError> {
        let Some(id) = self.resolve_id(reference) else {
            return Ok(false);
        };
        let next = tree::set_active_node(&self.tree, &id);
        self.commit(next).await
    }

    /// Renames the active node.
    pub async fn rename(&mut self, title: &str) -> Result<bool, StoreError> {
        let id = self.tree.active_node_id.clone();
        let next = tree::rename_node(&self.tree, &id, title);
        self.commit(next).await
    }

    pub async fn toggle_collapse(&mut self, reference: &str) -> Result<bool, StoreError> {
        let Some(id) = self.resolve_id(reference) else {
            return Ok(false);
        };
        let next = tree::toggle_collapse(&self.tree, &id);
        self.commit(next).await
    }

    /// Deletes the referenced subtree, capturing an undo snapshot first.
    /// The root is protected; deleting it reports false.
    pub async fn delete(&mut self, reference: &str) -> Result<bool, StoreError> {
        let Some(id) = self.resolve_id(reference) else {
            return Ok(false);
        };
        let snapshot = tree::capture_snapshot(&self.tree, &id);
        let next = tree::delete_subtree(&self.tree, &id);
        let deleted = self.commit(next).await?;
        if deleted {
            if let Some(snapshot) = snapshot {
                self.undo_stack.push(snapshot);
            }
        }
        Ok(deleted)
    }

    /// Undoes the most recent delete. Restoring against a vanished parent is
    /// a documented no-op; the snapshot is consumed either way.
    pub async fn undo(&mut self) -> Result<bool, StoreError> {
        let Some(snapshot) = self.undo_stack.pop() else {
            return Ok(false);
        };
        let next = tree::restore_deleted_subtree(&self.tree, &snapshot);
        let restored = self.commit(next).await?;
        if !restored {
            warn!("Undo skipped: parent {:?} of deleted subtree no longer exists", snapshot.parent_id);
        }
        Ok(restored)
    }

    /// Appends the user's message to the active thread, asks the chat
    /// provider for a reply over the full root-to-node context, and appends
    /// the reply. A provider failure leaves the user message in place and
    /// appends nothing else.
    pub async fn send_message(&mut self, text: &str) -> Result<String, Box<dyn Error + Send + Sync>> {
        let node_id = self.tree.active_node_id.clone();
        let next = tree::append_message(&self.tree, &node_id, Role::User, text);
        self.commit(next).await?;

        let turns = to_chat_turns(&tree::thread_messages(&self.tree, &node_id));
        let stream = self.chat_client.complete_stream(&turns).await?;
        let response = collect_stream(stream).await?;

        let next = tree::append_message(&self.tree, &node_id, Role::Assistant, &response);
        self.commit(next).await?;
        Ok(response)
    }

    pub fn outline(&self) -> String {
        render_outline(&self.tree, None)
    }

    /// Outline restricted to nodes matching the query (plus their
    /// ancestors).
    pub fn search(&self, query: &str) -> String {
        let criteria = FilterCriteria {
            query: Some(query.to_string()),
            ..Default::default()
        };
        let visible = visible_ids(&self.tree, &criteria);
        render_outline(&self.tree, Some(&visible))
    }

    pub fn export(&self) -> Result<String, StoreError> {
        export_tree(&self.tree)
    }

    pub async fn backup(&self) -> Result<(), StoreError> {
        self.store.write_backup(&self.workspace, &self.tree).await
    }
}
