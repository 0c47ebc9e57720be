//! Domain DTOs for the Mini App API.
//!
//! # Design
//! These mirror the mock-server's schema but are defined independently;
//! integration tests catch drift between the two crates. Items and user
//! profiles are owned by the server, so every struct keeps unknown fields in
//! an `extra` map instead of rejecting them, and a restored profile compares
//! equal to the one the server handed out.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Identifier of an item. The backend issues integers, but any JSON string
/// is accepted too and re-serialized in the shape it arrived in.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ItemId {
    Int(i64),
    Str(String),
}

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ItemId::Int(id) => write!(f, "{id}"),
            ItemId::Str(id) => f.write_str(id),
        }
    }
}

impl From<i64> for ItemId {
    fn from(id: i64) -> Self {
        ItemId::Int(id)
    }
}

impl From<&str> for ItemId {
    fn from(id: &str) -> Self {
        ItemId::Str(id.to_string())
    }
}

impl From<String> for ItemId {
    fn from(id: String) -> Self {
        ItemId::Str(id)
    }
}

/// Profile of the authenticated user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    #[serde(default)]
    pub telegram_id: i64,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// A single item returned by the API.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Item {
    pub id: ItemId,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub status: String,
    /// Server-defined fields such as `user_id` or `created_at`.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Request payload for creating a new item.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateItem {
    pub title: String,
    #[serde(default)]
    pub description: String,
}

/// Partial update for an item. Only the fields present in the JSON are
/// applied; omitted fields remain unchanged on the server.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateItem {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
}

/// Body returned by a successful delete.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteResult {
    #[serde(default)]
    pub message: String,
}

/// Body of the authentication exchange.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthRequest {
    pub init_data: String,
}

/// Successful authentication response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthResponse {
    pub token: String,
    pub user: User,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn item_id_keeps_its_json_shape() {
        let int: ItemId = serde_json::from_str("7").unwrap();
        assert_eq!(int, ItemId::Int(7));
        assert_eq!(serde_json::to_string(&int).unwrap(), "7");

        let text: ItemId = serde_json::from_str(r#""abc""#).unwrap();
        assert_eq!(text, ItemId::from("abc"));
        assert_eq!(serde_json::to_string(&text).unwrap(), r#""abc""#);
        assert_eq!(text.to_string(), "abc");
    }

    #[test]
    fn item_keeps_server_defined_fields() {
        let item: Item = serde_json::from_str(
            r#"{"id":3,"user_id":9,"title":"T","description":"D","status":"active","created_at":"2024-01-01T00:00:00Z"}"#,
        )
        .unwrap();
        assert_eq!(item.id, ItemId::Int(3));
        assert_eq!(item.status, "active");
        assert_eq!(item.extra["user_id"], 9);
        assert_eq!(item.extra["created_at"], "2024-01-01T00:00:00Z");
    }

    #[test]
    fn item_tolerates_missing_conventional_fields() {
        let item: Item = serde_json::from_str(r#"{"id":"1","title":"T"}"#).unwrap();
        assert_eq!(item.description, "");
        assert_eq!(item.status, "");
        assert!(item.extra.is_empty());
    }

    #[test]
    fn update_item_omits_absent_fields() {
        let patch = UpdateItem {
            status: Some("completed".to_string()),
            ..Default::default()
        };
        let body = serde_json::to_value(&patch).unwrap();
        assert_eq!(body, serde_json::json!({"status": "completed"}));
    }

    #[test]
    fn create_item_defaults_description() {
        let input: CreateItem = serde_json::from_str(r#"{"title":"Only title"}"#).unwrap();
        assert_eq!(input.description, "");
    }

    #[test]
    fn user_survives_serialization_with_extra_fields() {
        let raw = r#"{"id":1,"telegram_id":42,"username":"neo","first_name":"Thomas","last_name":"Anderson","created_at":"2024-01-01T00:00:00Z","updated_at":"2024-01-01T00:00:00Z","language_code":"en"}"#;
        let user: User = serde_json::from_str(raw).unwrap();
        assert_eq!(user.extra["language_code"], "en");
        let back: User = serde_json::from_str(&serde_json::to_string(&user).unwrap()).unwrap();
        assert_eq!(back, user);
    }
}
