//! Text outline view over a conversation tree.
//!
//! Consumes a tree value plus an optional pre-filtered visible id set and
//! renders one line per visible node: indentation by depth, an active-node
//! marker, the title, and the node's message count. Children of a collapsed
//! node are not rendered; the collapse flag hides nothing from the data,
//! only from this rendering.

use crate::models::tree::ConversationTree;
use std::collections::HashSet;

pub fn render_outline(tree: &ConversationTree, visible: Option<&HashSet<String>>) -> String {
    let mut out = String::new();
    // Depth-first with an explicit stack; children pushed in reverse so the
    // first child renders first.
    let mut stack: Vec<(String, usize)> = vec![(tree.root_id.clone(), 0)];
    let mut seen = HashSet::new();
    while let Some((id, depth)) = stack.pop() {
        if !seen.insert(id.clone()) {
            continue;
        }
        let Some(node) = tree.nodes.get(&id) else {
            continue;
        };
        if let Some(visible) = visible {
            if !visible.contains(&id) {
                continue;
            }
        }

        let marker = if id == tree.active_node_id { "*" } else { " " };
        let collapse = if node.is_collapsed { " [+]" } else { "" };
        let short_id: String = node.id.chars().take(8).collect();
        out.push_str(
            &format!(
                "{}{} [{}] {} ({}){}\n",
                "  ".repeat(depth),
                marker,
                short_id,
                node.title,
                node.messages.len(),
                collapse
            )
        );

        if !node.is_collapsed {
            for child_id in node.children_ids.iter().rev() {
                stack.push((child_id.clone(), depth + 1));
            }
        }
    }
    out
}
