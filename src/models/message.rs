use mongodb::bson::{oid::ObjectId, DateTime as BsonDateTime};
use serde::{Deserialize, Serialize};

use super::format_datetime;

pub const MESSAGES_COLLECTION: &str = "inbox";

pub const MAX_MESSAGE_LENGTH: usize = 280;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MessageStatus {
    Delivered,
    Read,
}

impl MessageStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageStatus::Delivered => "DELIVERED",
            MessageStatus::Read => "READ",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    /// Receiver.
    pub user_id: String,
    pub submitter_id: String,
    pub submitter_name: Option<String>,
    pub text: String,
    pub status: MessageStatus,
    #[serde(default)]
    pub custom: bool,
    pub create_date_time: BsonDateTime,
    pub update_date_time: BsonDateTime,
}

#[derive(Debug, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct MessageResponse {
    pub id: String,
    pub user_id: String,
    pub submitter_id: String,
    pub submitter_name: Option<String>,
    pub text: String,
    pub status: MessageStatus,
    pub custom: bool,
    pub create_date_time: String,
    pub update_date_time: String,
}

impl From<Message> for MessageResponse {
    fn from(m: Message) -> Self {
        MessageResponse {
            id: m.id.map(|id| id.to_hex()).unwrap_or_default(),
            user_id: m.user_id,
            submitter_id: m.submitter_id,
            submitter_name: m.submitter_name,
            text: m.text,
            status: m.status,
            custom: m.custom,
            create_date_time: format_datetime(&m.create_date_time),
            update_date_time: format_datetime(&m.update_date_time),
        }
    }
}

#[derive(Debug, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SendMessageRequest {
    pub text: String,
    #[serde(default)]
    pub custom: bool,
    pub submitter_name: Option<String>,
}

#[derive(Debug, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SendMessageToUserListRequest {
    pub user_ids: Vec<String>,
    pub text: String,
    #[serde(default)]
    pub custom: bool,
    pub submitter_name: Option<String>,
}

#[derive(Debug, Default, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SearchMessagesRequest {
    pub submitter_id: Option<String>,
    pub skip: Option<u64>,
    pub limit: Option<i64>,
    pub custom: Option<bool>,
}

#[derive(Debug, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ConfirmMessagesRequest {
    pub message_ids: Vec<String>,
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct MessageSummary {
    pub submitter_id: String,
    pub custom: bool,
    pub unread_message_count: i64,
    pub latest_message: MessageResponse,
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct MessageSummaryResponse {
    pub messages: Vec<MessageSummary>,
}

/// Trims and length-checks message text.
pub fn normalize_text(text: &str) -> Option<String> {
    let trimmed = text.trim();
    let len = trimmed.chars().count();
    if len == 0 || len > MAX_MESSAGE_LENGTH {
        return None;
    }
    Some(trimmed.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_text_bounds() {
        assert_eq!(normalize_text("  hi  ").as_deref(), Some("hi"));
        assert!(normalize_text("   ").is_none());
        assert!(normalize_text(&"a".repeat(280)).is_some());
        assert!(normalize_text(&"a".repeat(281)).is_none());
        // multi-byte characters count once
        assert!(normalize_text(&"é".repeat(280)).is_some());
    }

    #[test]
    fn test_status_serializes_upper_case() {
        assert_eq!(serde_json::to_value(MessageStatus::Delivered).unwrap(), "DELIVERED");
        assert_eq!(MessageStatus::Read.as_str(), "READ");
    }
}
