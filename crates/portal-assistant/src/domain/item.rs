//! Portal content records and item payload handling.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Metadata of one portal item as returned by item and search endpoints.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ItemMetadata {
    pub id: String,
    pub owner: String,
    pub title: String,
    #[serde(rename = "type")]
    pub item_type: String,
    pub type_keywords: Vec<String>,
    pub tags: Vec<String>,
    pub description: Option<String>,
    pub snippet: Option<String>,
    pub url: Option<String>,
    pub access: Option<String>,
    pub owner_folder: Option<String>,
    /// Creation time in epoch milliseconds.
    pub created: i64,
    /// Last modification time in epoch milliseconds.
    pub modified: i64,
}

/// A content folder owned by a portal user.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(default)]
pub struct FolderInfo {
    pub id: String,
    pub title: String,
    pub username: String,
}

/// A portal group a user belongs to.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(default)]
pub struct GroupInfo {
    pub id: String,
    pub title: String,
    pub owner: String,
}

/// A portal user profile.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(default, rename_all = "camelCase")]
pub struct UserProfile {
    pub username: String,
    pub full_name: Option<String>,
    pub org_id: Option<String>,
    pub groups: Vec<GroupInfo>,
}

/// Parsed item payload.
#[derive(Clone, Debug, PartialEq)]
pub enum ItemContent {
    /// The payload parsed as JSON.
    Json(Value),
    /// The payload is opaque text.
    Text(String),
}

impl ItemContent {
    /// Parses raw item data, preferring JSON.
    pub fn parse(raw: &str) -> Self {
        match serde_json::from_str(raw) {
            Ok(value) => Self::Json(value),
            Err(_) => Self::Text(raw.to_string()),
        }
    }

    /// Returns whether the payload carries nothing worth editing.
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Json(value) => value.is_null(),
            Self::Text(text) => text.trim().is_empty(),
        }
    }

    /// Serializes the payload for upload.
    ///
    /// JSON values are written compactly. Text is re-serialized when it
    /// itself parses as JSON, which normalizes its formatting, and passed
    /// through verbatim otherwise.
    pub fn to_upload_text(&self) -> String {
        match self {
            Self::Json(value) => value.to_string(),
            Self::Text(text) => serialize_text(text),
        }
    }
}

/// Item metadata together with its fetched payload.
#[derive(Clone, Debug, PartialEq)]
pub struct PortalItemData {
    pub item: ItemMetadata,
    /// Payload exactly as the portal returned it.
    pub raw: String,
    pub content: ItemContent,
}

impl PortalItemData {
    /// Builds item data from metadata and the raw payload text.
    pub fn new(item: ItemMetadata, raw: String) -> Self {
        let content = ItemContent::parse(&raw);

        Self { item, raw, content }
    }

    /// Returns whether the item has a payload that can be edited.
    pub fn has_content(&self) -> bool {
        !self.content.is_empty()
    }
}

/// Normalizes text for upload, compacting it when it parses as JSON.
pub fn serialize_text(text: &str) -> String {
    match serde_json::from_str::<Value>(text) {
        Ok(value) => value.to_string(),
        Err(_) => text.to_string(),
    }
}

/// Returns whether `text` is a well-formed JSON document.
pub fn is_valid_json(text: &str) -> bool {
    serde_json::from_str::<Value>(text).is_ok()
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_item_content_parse_prefers_json() {
        // Arrange
        let raw = r#"{"a": 1}"#;

        // Act
        let content = ItemContent::parse(raw);

        // Assert
        assert_eq!(content, ItemContent::Json(json!({"a": 1})));
    }

    #[test]
    fn test_item_content_parse_falls_back_to_text() {
        // Arrange
        let raw = "not json";

        // Act
        let content = ItemContent::parse(raw);

        // Assert
        assert_eq!(content, ItemContent::Text("not json".to_string()));
    }

    #[test]
    fn test_to_upload_text_compacts_json_text() {
        // Arrange
        let content = ItemContent::Text("{\n  \"a\": [1, 2]\n}".to_string());

        // Act
        let text = content.to_upload_text();

        // Assert
        assert_eq!(text, r#"{"a":[1,2]}"#);
    }

    #[test]
    fn test_to_upload_text_keeps_plain_text_verbatim() {
        // Arrange
        let content = ItemContent::Text("line one\nline two".to_string());

        // Act
        let text = content.to_upload_text();

        // Assert
        assert_eq!(text, "line one\nline two");
    }

    #[test]
    fn test_has_content_is_false_for_blank_and_null_payloads() {
        // Arrange
        let blank = PortalItemData::new(ItemMetadata::default(), "  ".to_string());
        let null = PortalItemData::new(ItemMetadata::default(), "null".to_string());
        let object = PortalItemData::new(ItemMetadata::default(), "{}".to_string());

        // Act / Assert
        assert!(!blank.has_content());
        assert!(!null.has_content());
        assert!(object.has_content());
    }

    #[test]
    fn test_item_metadata_deserializes_portal_field_names() {
        // Arrange
        let payload = r#"{
            "id": "abc",
            "owner": "gis_admin",
            "title": "Roads",
            "type": "Web Map",
            "typeKeywords": ["ArcGIS Online"],
            "ownerFolder": "f1",
            "numViews": 12
        }"#;

        // Act
        let item: ItemMetadata = serde_json::from_str(payload).expect("failed to parse item");

        // Assert
        assert_eq!(item.item_type, "Web Map");
        assert_eq!(item.type_keywords, vec!["ArcGIS Online".to_string()]);
        assert_eq!(item.owner_folder.as_deref(), Some("f1"));
    }

    #[test]
    fn test_is_valid_json_rejects_truncated_object() {
        // Arrange
        let text = r#"{"a":}"#;

        // Act
        let is_valid = is_valid_json(text);

        // Assert
        assert!(!is_valid);
    }
}
