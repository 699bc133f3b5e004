use mongodb::bson::{oid::ObjectId, DateTime as BsonDateTime};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::format_datetime;

pub const DEVICES_COLLECTION: &str = "device";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PushIdType {
    AndroidFcm,
    IosApns,
    IosVoip,
    AliCloud,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Device {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    pub user_id: String,
    pub device_push_id: String,
    pub device_push_id_type: PushIdType,
    pub device_details: Option<String>,
    pub create_date_time: BsonDateTime,
    pub update_date_time: BsonDateTime,
}

#[derive(Debug, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RegisterDeviceRequest {
    pub device_push_id: String,
    pub device_push_id_type: PushIdType,
    pub device_details: Option<String>,
}

#[derive(Debug, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UnregisterDeviceRequest {
    pub device_push_id: String,
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct DeviceResponse {
    pub id: String,
    pub device_push_id: String,
    pub device_push_id_type: PushIdType,
    pub device_details: Option<String>,
    pub create_date_time: String,
}

impl From<Device> for DeviceResponse {
    fn from(d: Device) -> Self {
        DeviceResponse {
            id: d.id.map(|id| id.to_hex()).unwrap_or_default(),
            device_push_id: d.device_push_id,
            device_push_id_type: d.device_push_id_type,
            device_details: d.device_details,
            create_date_time: format_datetime(&d.create_date_time),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PushMessage {
    pub title: String,
    pub body: String,
    pub action: String,
    pub data: HashMap<String, String>,
    pub badge: Option<i64>,
}

impl PushMessage {
    pub const OPEN_MESSAGING: &'static str = "OPEN_MESSAGING";
    pub const VERIFICATION_RESULTS: &'static str = "VERIFICATION_RESULTS";

    pub fn new(title: &str, body: &str, action: &str) -> Self {
        PushMessage {
            title: title.to_string(),
            body: body.to_string(),
            action: action.to_string(),
            data: HashMap::new(),
            badge: None,
        }
    }

    pub fn with_data(mut self, key: &str, value: impl Into<String>) -> Self {
        self.data.insert(key.to_string(), value.into());
        self
    }

    pub fn with_badge(mut self, badge: i64) -> Self {
        self.badge = Some(badge);
        self
    }
}
