//! Pure, immutable operations over the conversation tree.
//!
//! Every function takes a tree value by reference and returns a new tree
//! value; the input is never mutated. Operations are fail-soft: an id that
//! does not resolve degrades to a no-op returning the input unchanged, never
//! an error. The tree is driven interactively from the UI layer and a crash
//! there must not lose user data.
//!
//! Untouched node records are shared between the old and new value through
//! the `Arc`s in the node map; only nodes actually changed are reallocated.

use crate::models::tree::{ ConversationNode, ConversationTree, DeletedSnapshot, Message, Role };
use chrono::Utc;
use std::collections::{ HashMap, HashSet };
use std::sync::Arc;
use uuid::Uuid;

/// Title assigned at node creation, overwritten by inference or rename.
pub const DEFAULT_TITLE: &str = "New Chat";

/// Fallback when a rename would store blank text.
pub const UNTITLED: &str = "Untitled";

/// Max characters carried from the first user message into an inferred title.
const TITLE_INFER_LEN: usize = 30;

fn new_id() -> String {
    Uuid::new_v4().to_string()
}

fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

fn blank_node(id: String, parent_id: Option<String>, now: i64) -> ConversationNode {
    ConversationNode {
        id,
        title: DEFAULT_TITLE.to_string(),
        parent_id,
        children_ids: Vec::new(),
        is_collapsed: false,
        messages: Vec::new(),
        created_at: now,
        updated_at: now,
    }
}

/// Produces a fresh tree holding only a root node, which is also active.
pub fn create_empty() -> ConversationTree {
    let id = new_id();
    let now = now_ms();
    let mut nodes = HashMap::new();
    nodes.insert(id.clone(), Arc::new(blank_node(id.clone(), None, now)));
    ConversationTree {
        root_id: id.clone(),
        active_node_id: id,
        nodes,
    }
}

/// Rebuilds one node through `apply` and returns the tree carrying it.
/// No-op when `node_id` does not resolve. `updated_at` is refreshed.
fn update_node<F>(tree: &ConversationTree, node_id: &str, apply: F) -> ConversationTree
    where F: FnOnce(&mut ConversationNode)
{
    let Some(existing) = tree.nodes.get(node_id) else {
        return tree.clone();
    };
    let mut node = ConversationNode::clone(existing);
    apply(&mut node);
    node.updated_at = now_ms();
    let mut nodes = tree.nodes.clone();
    nodes.insert(node_id.to_string(), Arc::new(node));
    ConversationTree {
        root_id: tree.root_id.clone(),
        active_node_id: tree.active_node_id.clone(),
        nodes,
    }
}

/// Creates a new empty node under `parent_id` and makes it active. The new
/// child is appended last, preserving the parent's prior child order.
pub fn add_child(tree: &ConversationTree, parent_id: &str) -> ConversationTree {
    let Some(parent) = tree.nodes.get(parent_id) else {
        return tree.clone();
    };
    let now = now_ms();
    let child_id = new_id();
    let child = blank_node(child_id.clone(), Some(parent_id.to_string()), now);

    let mut parent = ConversationNode::clone(parent);
    parent.children_ids.push(child_id.clone());
    parent.updated_at = now;

    let mut nodes = tree.nodes.clone();
    nodes.insert(parent_id.to_string(), Arc::new(parent));
    nodes.insert(child_id.clone(), Arc::new(child));
    ConversationTree {
        root_id: tree.root_id.clone(),
        active_node_id: child_id,
        nodes,
    }
}

/// Flips the per-node collapse flag. Does not cascade to descendants.
pub fn toggle_collapse(tree: &ConversationTree, node_id: &str) -> ConversationTree {
    update_node(tree, node_id, |node| {
        node.is_collapsed = !node.is_collapsed;
    })
}

/// Moves focus to `node_id`. The sole way to change the active node.
pub fn set_active_node(tree: &ConversationTree, node_id: &str) -> ConversationTree {
    if !tree.nodes.contains_key(node_id) {
        return tree.clone();
    }
    ConversationTree {
        root_id: tree.root_id.clone(),
        active_node_id: node_id.to_string(),
        nodes: tree.nodes.clone(),
    }
}

/// Appends a message to the node's sequence. While the node still carries the
/// default placeholder title, the first user message donates a truncated copy
/// of its content as the title; once the title differs from the placeholder
/// the heuristic never reapplies.
pub fn append_message(
    tree: &ConversationTree,
    node_id: &str,
    role: Role,
    content: &str
) -> ConversationTree {
    update_node(tree, node_id, |node| {
        if node.title == DEFAULT_TITLE && role == Role::User {
            let inferred: String = content.chars().take(TITLE_INFER_LEN).collect();
            let inferred = inferred.trim().to_string();
            if !inferred.is_empty() {
                node.title = inferred;
            }
        }
        node.messages.push(Message {
            id: new_id(),
            role,
            content: content.to_string(),
            created_at: now_ms(),
        });
    })
}

/// Renames a node. Whitespace-only titles fall back to [`UNTITLED`] rather
/// than storing blank text.
pub fn rename_node(tree: &ConversationTree, node_id: &str, title: &str) -> ConversationTree {
    update_node(tree, node_id, |node| {
        let trimmed = title.trim();
        node.title = if trimmed.is_empty() {
            UNTITLED.to_string()
        } else {
            trimmed.to_string()
        };
    })
}

/// Collects `node_id` and every descendant reachable through child links.
/// Explicit worklist, no recursion; the visited set guards against repeated
/// references so the walk terminates even over a malformed graph.
fn collect_subtree_ids(tree: &ConversationTree, node_id: &str) -> HashSet<String> {
    let mut collected = HashSet::new();
    let mut work = vec![node_id.to_string()];
    while let Some(id) = work.pop() {
        if !collected.insert(id.clone()) {
            continue;
        }
        if let Some(node) = tree.nodes.get(&id) {
            work.extend(node.children_ids.iter().cloned());
        }
    }
    collected
}

/// Removes a node and its entire subtree. The root can never be deleted.
/// If the active node falls inside the deleted set, focus is repaired to the
/// deleted node's former parent, or the root when no parent exists.
pub fn delete_subtree(tree: &ConversationTree, node_id: &str) -> ConversationTree {
    if node_id == tree.root_id {
        return tree.clone();
    }
    let Some(target) = tree.nodes.get(node_id) else {
        return tree.clone();
    };
    let parent_id = target.parent_id.clone();

    let doomed = collect_subtree_ids(tree, node_id);
    let mut nodes = tree.nodes.clone();
    for id in &doomed {
        nodes.remove(id);
    }

    if let Some(pid) = parent_id.as_deref() {
        if let Some(parent) = tree.nodes.get(pid) {
            let mut parent = ConversationNode::clone(parent);
            parent.children_ids.retain(|child| child != node_id);
            parent.updated_at = now_ms();
            nodes.insert(pid.to_string(), Arc::new(parent));
        }
    }

    let active_node_id = if doomed.contains(&tree.active_node_id) {
        parent_id.unwrap_or_else(|| tree.root_id.clone())
    } else {
        tree.active_node_id.clone()
    };

    ConversationTree {
        root_id: tree.root_id.clone(),
        active_node_id,
        nodes,
    }
}

/// Captures the undo snapshot for a pending delete of `node_id`: the subtree
/// by value plus the attachment point (parent id and child position) it will
/// have to be re-inserted at. `None` when the node does not resolve.
pub fn capture_snapshot(tree: &ConversationTree, node_id: &str) -> Option<DeletedSnapshot> {
    let target = tree.nodes.get(node_id)?;
    let parent_id = target.parent_id.clone();
    let index = parent_id
        .as_deref()
        .and_then(|pid| tree.nodes.get(pid))
        .and_then(|parent| parent.children_ids.iter().position(|child| child == node_id));

    let ids = collect_subtree_ids(tree, node_id);
    let mut nodes = HashMap::new();
    for id in ids {
        if let Some(node) = tree.nodes.get(&id) {
            nodes.insert(id, node.clone());
        }
    }

    Some(DeletedSnapshot {
        root_id: node_id.to_string(),
        parent_id,
        index,
        nodes,
    })
}

/// Re-inserts a previously captured subtree and focuses its root.
///
/// The snapshot root goes back into the recorded parent's children at the
/// recorded index, clamped into bounds if the children list changed shape in
/// the meantime. If the parent no longer exists the restore is a silent
/// no-op: undo is only valid against the same tree the snapshot was taken
/// from, and only while the immediate parent survives.
pub fn restore_deleted_subtree(
    tree: &ConversationTree,
    snapshot: &DeletedSnapshot
) -> ConversationTree {
    let Some(parent_id) = snapshot.parent_id.as_deref() else {
        return tree.clone();
    };
    let Some(parent) = tree.nodes.get(parent_id) else {
        return tree.clone();
    };

    let mut nodes = tree.nodes.clone();
    for (id, node) in &snapshot.nodes {
        nodes.insert(id.clone(), node.clone());
    }

    if !parent.children_ids.iter().any(|child| child == &snapshot.root_id) {
        let mut parent = ConversationNode::clone(parent);
        let at = snapshot.index
            .unwrap_or(parent.children_ids.len())
            .min(parent.children_ids.len());
        parent.children_ids.insert(at, snapshot.root_id.clone());
        parent.updated_at = now_ms();
        nodes.insert(parent_id.to_string(), Arc::new(parent));
    }

    ConversationTree {
        root_id: tree.root_id.clone(),
        active_node_id: snapshot.root_id.clone(),
        nodes,
    }
}

/// Ordered message sequence for a node's full thread: every message along
/// the root→node path, ancestors first, finishing with the node's own.
/// Empty when the node does not resolve.
pub fn thread_messages(tree: &ConversationTree, node_id: &str) -> Vec<Message> {
    if !tree.nodes.contains_key(node_id) {
        return Vec::new();
    }
    let mut chain = Vec::new();
    let mut seen = HashSet::new();
    let mut cursor = Some(node_id.to_string());
    while let Some(id) = cursor {
        if !seen.insert(id.clone()) {
            break;
        }
        let Some(node) = tree.nodes.get(&id) else {
            break;
        };
        chain.push(id);
        cursor = node.parent_id.clone();
    }
    chain.reverse();

    let mut messages = Vec::new();
    for id in &chain {
        if let Some(node) = tree.nodes.get(id) {
            messages.extend(node.messages.iter().cloned());
        }
    }
    messages
}

/// Checks the six structural invariants. An empty result means the tree is
/// valid; otherwise each entry describes one violation. Import validation
/// and the test suite both go through here.
pub fn invariant_violations(tree: &ConversationTree) -> Vec<String> {
    let mut violations = Vec::new();

    match tree.nodes.get(&tree.root_id) {
        None => violations.push(format!("root node {} missing from nodes", tree.root_id)),
        Some(root) => {
            if root.parent_id.is_some() {
                violations.push(format!("root node {} has a parent", tree.root_id));
            }
        }
    }
    for (id, node) in &tree.nodes {
        if node.id != *id {
            violations.push(format!("node keyed {} carries id {}", id, node.id));
        }
        if node.parent_id.is_none() && *id != tree.root_id {
            violations.push(format!("non-root node {} has no parent", id));
        }
        for child_id in &node.children_ids {
            match tree.nodes.get(child_id) {
                None => violations.push(format!("child {} of {} missing from nodes", child_id, id)),
                Some(child) => {
                    if child.parent_id.as_deref() != Some(id.as_str()) {
                        violations.push(
                            format!("child {} does not point back to parent {}", child_id, id)
                        );
                    }
                }
            }
        }
        if let Some(pid) = node.parent_id.as_deref() {
            match tree.nodes.get(pid) {
                None => violations.push(format!("parent {} of {} missing from nodes", pid, id)),
                Some(parent) => {
                    if !parent.children_ids.iter().any(|child| child == id) {
                        violations.push(format!("node {} absent from children of {}", id, pid));
                    }
                }
            }
        }
    }

    let reachable = collect_subtree_ids(tree, &tree.root_id);
    for id in tree.nodes.keys() {
        if !reachable.contains(id) {
            violations.push(format!("node {} unreachable from root", id));
        }
    }

    if !tree.nodes.contains_key(&tree.active_node_id) {
        violations.push(format!("active node {} missing from nodes", tree.active_node_id));
    }

    violations
}
