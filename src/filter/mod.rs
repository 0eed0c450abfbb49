//! Computes the "visible id set" the views consume: nodes matching a search
//! query and/or an update-time range, widened with their ancestors so the
//! result always forms a connected subtree hanging off the root.

use crate::models::tree::ConversationTree;
use std::collections::HashSet;

#[derive(Debug, Clone, Default)]
pub struct FilterCriteria {
    /// Case-insensitive substring matched against titles and message bodies.
    pub query: Option<String>,
    /// Inclusive lower bound on `updated_at`, wall-clock milliseconds.
    pub since_ms: Option<i64>,
    /// Inclusive upper bound on `updated_at`.
    pub until_ms: Option<i64>,
}

impl FilterCriteria {
    pub fn is_empty(&self) -> bool {
        self.query.is_none() && self.since_ms.is_none() && self.until_ms.is_none()
    }
}

/// Ids of the nodes that pass `criteria`, plus every ancestor of a passing
/// node. With empty criteria every node is visible.
pub fn visible_ids(tree: &ConversationTree, criteria: &FilterCriteria) -> HashSet<String> {
    if criteria.is_empty() {
        return tree.nodes.keys().cloned().collect();
    }

    let needle = criteria.query.as_deref().map(|q| q.to_lowercase());
    let mut visible = HashSet::new();

    for (id, node) in &tree.nodes {
        if let Some(since) = criteria.since_ms {
            if node.updated_at < since {
                continue;
            }
        }
        if let Some(until) = criteria.until_ms {
            if node.updated_at > until {
                continue;
            }
        }
        if let Some(needle) = needle.as_deref() {
            let title_hit = node.title.to_lowercase().contains(needle);
            let message_hit = node.messages
                .iter()
                .any(|m| m.content.to_lowercase().contains(needle));
            if !title_hit && !message_hit {
                continue;
            }
        }
        visible.insert(id.clone());
    }

    // Widen with ancestors so matches stay attached to the root. The seen
    // guard terminates the climb even over a malformed parent chain.
    let matched: Vec<String> = visible.iter().cloned().collect();
    for id in matched {
        let mut cursor = tree.nodes.get(&id).and_then(|n| n.parent_id.clone());
        while let Some(pid) = cursor {
            if !visible.insert(pid.clone()) {
                break;
            }
            cursor = tree.nodes.get(&pid).and_then(|n| n.parent_id.clone());
        }
    }

    visible
}
