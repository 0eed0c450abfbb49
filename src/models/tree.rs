use serde::{ Serialize, Deserialize };
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// Role of a single utterance within a conversation thread.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, PartialEq, Eq)]
pub struct ParseRoleError {
    message: String,
}

impl fmt::Display for ParseRoleError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for ParseRoleError {}

impl FromStr for Role {
    type Err = ParseRoleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "system" => Ok(Role::System),
            "user" => Ok(Role::User),
            "assistant" => Ok(Role::Assistant),
            _ =>
                Err(ParseRoleError {
                    message: format!("Invalid role: '{}'", s),
                }),
        }
    }
}

/// An atomic utterance. Created once by the append operation, never mutated
/// or deleted individually (only as part of subtree deletion).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: String,
    pub role: Role,
    pub content: String,
    /// Wall-clock milliseconds. Display/sorting only, never identity.
    pub created_at: i64,
}

/// A single conversation thread / branch point in the tree.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationNode {
    pub id: String,
    pub title: String,
    /// None only for the root node.
    pub parent_id: Option<String>,
    /// Ordered; controls display order and undo re-insertion position.
    pub children_ids: Vec<String>,
    /// Display-state flag only; does not affect data visibility.
    pub is_collapsed: bool,
    /// Insertion order = chronological order.
    pub messages: Vec<Message>,
    pub created_at: i64,
    pub updated_at: i64,
}

/// The aggregate root. Node records are shared via `Arc` so that operations
/// can return a new tree value that reallocates only the nodes they changed.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationTree {
    pub root_id: String,
    pub active_node_id: String,
    pub nodes: HashMap<String, Arc<ConversationNode>>,
}

/// Captured copy of a deleted subtree and its former attachment point,
/// taken before a delete so the delete can be undone.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeletedSnapshot {
    /// Id of the deleted subtree's own root node.
    pub root_id: String,
    /// Parent the subtree hung off; None is only possible for the tree root.
    pub parent_id: Option<String>,
    /// Position within the former parent's children, None if it was absent.
    pub index: Option<usize>,
    /// Every node of the deleted subtree, by value at time of capture.
    pub nodes: HashMap<String, Arc<ConversationNode>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_parses_case_insensitively() {
        assert_eq!("User".parse::<Role>().unwrap(), Role::User);
        assert_eq!("ASSISTANT".parse::<Role>().unwrap(), Role::Assistant);
        assert!("moderator".parse::<Role>().is_err());
    }

    #[test]
    fn node_serializes_with_camel_case_keys() {
        let node = ConversationNode {
            id: "n1".to_string(),
            title: "New Chat".to_string(),
            parent_id: None,
            children_ids: vec![],
            is_collapsed: false,
            messages: vec![],
            created_at: 1,
            updated_at: 1,
        };
        let json = serde_json::to_string(&node).unwrap();
        assert!(json.contains("\"parentId\""));
        assert!(json.contains("\"childrenIds\""));
        assert!(json.contains("\"isCollapsed\""));
        assert!(json.contains("\"createdAt\""));
    }

    #[test]
    fn message_role_round_trips_as_lowercase() {
        let msg = Message {
            id: "m1".to_string(),
            role: Role::Assistant,
            content: "hi".to_string(),
            created_at: 5,
        };
        let json = serde_json::to_string(&msg).unwrap();
        assert!(json.contains("\"assistant\""));
        let back: Message = serde_json::from_str(&json).unwrap();
        assert_eq!(back, msg);
    }
}
