use async_trait::async_trait;
use futures::stream::TryStreamExt;
use mongodb::bson::{doc, DateTime as BsonDateTime};
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::database::MongoDB;
use crate::events::{DeleteUserEvent, EventHandler};
use crate::models::{
    Device, DeviceResponse, PushIdType, PushMessage, RegisterDeviceRequest, DEVICES_COLLECTION,
};
use crate::utils::error::{AppError, AppResult};

/// Delivers one message to a batch of device tokens of the same type.
#[async_trait]
pub trait PushAdapter: Send + Sync {
    /// Returns the tokens the provider rejected as invalid.
    async fn send(&self, push_type: PushIdType, tokens: &[String], message: &PushMessage) -> AppResult<Vec<String>>;
}

/// Writes pushes to the log instead of a provider.
pub struct LoggingPushAdapter;

#[async_trait]
impl PushAdapter for LoggingPushAdapter {
    async fn send(&self, push_type: PushIdType, tokens: &[String], message: &PushMessage) -> AppResult<Vec<String>> {
        let (valid, invalid): (Vec<&String>, Vec<&String>) =
            tokens.iter().partition(|t| !t.trim().is_empty());

        log::info!(
            "📨 Push {:?} '{}' ({}) to {} device(s)",
            push_type,
            message.title,
            message.action,
            valid.len()
        );

        Ok(invalid.into_iter().cloned().collect())
    }
}

pub fn group_devices(devices: &[Device]) -> BTreeMap<String, (PushIdType, Vec<String>)> {
    let mut groups: BTreeMap<String, (PushIdType, Vec<String>)> = BTreeMap::new();
    for device in devices {
        let key = format!("{:?}", device.device_push_id_type);
        groups
            .entry(key)
            .or_insert_with(|| (device.device_push_id_type, Vec::new()))
            .1
            .push(device.device_push_id.clone());
    }
    groups
}

/// Sends `message` to every device, one adapter call per push type.
///
/// A failing group does not stop the others. Returns the invalid tokens.
pub async fn dispatch_to_devices(
    push: &dyn PushAdapter,
    devices: &[Device],
    message: &PushMessage,
) -> Vec<String> {
    let mut invalid = Vec::new();
    for (_, (push_type, tokens)) in group_devices(devices) {
        match push.send(push_type, &tokens, message).await {
            Ok(rejected) => invalid.extend(rejected),
            Err(e) => log::error!("❌ Push to {:?} devices failed: {}", push_type, e),
        }
    }
    invalid
}

async fn push_now(db: &MongoDB, push: &dyn PushAdapter, user_id: &str, message: &PushMessage) -> AppResult<usize> {
    let devices = retrieve_device_records(db, user_id).await?;
    if devices.is_empty() {
        log::debug!("No devices registered for user {}", user_id);
        return Ok(0);
    }

    let invalid = dispatch_to_devices(push, &devices, message).await;
    if !invalid.is_empty() {
        let removed = db
            .collection::<Device>(DEVICES_COLLECTION)
            .delete_many(doc! { "userId": user_id, "devicePushId": { "$in": invalid.clone() } })
            .await?;
        log::info!("🧹 Unregistered {} invalid device(s) of user {}", removed.deleted_count, user_id);
    }

    Ok(devices.len().saturating_sub(invalid.len()))
}

/// Pushes to all devices of a user, optionally on a background task.
pub async fn push_for_user(
    db: &MongoDB,
    push: &Arc<dyn PushAdapter>,
    user_id: &str,
    message: PushMessage,
    run_async: bool,
) -> AppResult<()> {
    if run_async {
        let db = db.clone();
        let push = push.clone();
        let user_id = user_id.to_string();
        tokio::spawn(async move {
            if let Err(e) = push_now(&db, push.as_ref(), &user_id, &message).await {
                log::error!("❌ Background push for user {} failed: {}", user_id, e);
            }
        });
        return Ok(());
    }

    push_now(db, push.as_ref(), user_id, &message).await.map(|_| ())
}

pub async fn register_device(db: &MongoDB, user_id: &str, request: &RegisterDeviceRequest) -> AppResult<()> {
    let push_id = request.device_push_id.trim();
    if push_id.is_empty() {
        return Err(AppError::invalid_request("devicePushId is required"));
    }

    let now = BsonDateTime::now();
    db.collection::<Device>(DEVICES_COLLECTION)
        .update_one(
            doc! { "userId": user_id, "devicePushId": push_id },
            doc! {
                "$set": {
                    "devicePushIdType": mongodb::bson::to_bson(&request.device_push_id_type)?,
                    "deviceDetails": request.device_details.clone(),
                    "updateDateTime": now,
                },
                "$setOnInsert": { "createDateTime": now },
            },
        )
        .upsert(true)
        .await?;

    log::info!("📱 Device registered for user {}", user_id);
    Ok(())
}

pub async fn unregister_device(db: &MongoDB, user_id: &str, device_push_id: &str) -> AppResult<()> {
    let result = db
        .collection::<Device>(DEVICES_COLLECTION)
        .delete_one(doc! { "userId": user_id, "devicePushId": device_push_id })
        .await?;

    if result.deleted_count == 0 {
        return Err(AppError::not_found("Device is not registered"));
    }
    Ok(())
}

async fn retrieve_device_records(db: &MongoDB, user_id: &str) -> AppResult<Vec<Device>> {
    Ok(db
        .collection::<Device>(DEVICES_COLLECTION)
        .find(doc! { "userId": user_id })
        .await?
        .try_collect()
        .await?)
}

pub async fn retrieve_devices(db: &MongoDB, user_id: &str) -> AppResult<Vec<DeviceResponse>> {
    let devices = retrieve_device_records(db, user_id).await?;
    Ok(devices.into_iter().map(DeviceResponse::from).collect())
}

pub struct DeleteUserDevicesHandler {
    pub db: MongoDB,
}

#[async_trait]
impl EventHandler<DeleteUserEvent> for DeleteUserDevicesHandler {
    async fn handle(&self, event: &DeleteUserEvent) -> Result<(), AppError> {
        self.db
            .collection::<Device>(DEVICES_COLLECTION)
            .delete_many(doc! { "userId": &event.user_id })
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    fn device(push_id: &str, push_type: PushIdType) -> Device {
        Device {
            id: None,
            user_id: "u1".to_string(),
            device_push_id: push_id.to_string(),
            device_push_id_type: push_type,
            device_details: None,
            create_date_time: BsonDateTime::now(),
            update_date_time: BsonDateTime::now(),
        }
    }

    struct RecordingAdapter {
        calls: Mutex<Vec<(PushIdType, Vec<String>)>>,
        reject: Vec<String>,
        fail_for: Option<PushIdType>,
    }

    #[async_trait]
    impl PushAdapter for RecordingAdapter {
        async fn send(&self, push_type: PushIdType, tokens: &[String], _: &PushMessage) -> AppResult<Vec<String>> {
            self.calls.lock().unwrap().push((push_type, tokens.to_vec()));
            if self.fail_for == Some(push_type) {
                return Err(AppError::Internal("provider down".into()));
            }
            Ok(tokens.iter().filter(|t| self.reject.contains(*t)).cloned().collect())
        }
    }

    #[test]
    fn test_devices_grouped_by_push_type() {
        let devices = vec![
            device("a", PushIdType::AndroidFcm),
            device("b", PushIdType::IosApns),
            device("c", PushIdType::AndroidFcm),
        ];
        let groups = group_devices(&devices);

        assert_eq!(groups.len(), 2);
        assert_eq!(groups["AndroidFcm"].1, vec!["a", "c"]);
        assert_eq!(groups["IosApns"].1, vec!["b"]);
    }

    #[tokio::test]
    async fn test_dispatch_collects_invalid_tokens_and_survives_failures() {
        let adapter = RecordingAdapter {
            calls: Mutex::new(vec![]),
            reject: vec!["c".to_string()],
            fail_for: Some(PushIdType::IosApns),
        };
        let devices = vec![
            device("a", PushIdType::AndroidFcm),
            device("b", PushIdType::IosApns),
            device("c", PushIdType::AndroidFcm),
        ];

        let invalid = dispatch_to_devices(&adapter, &devices, &PushMessage::new("t", "b", "OPEN_MESSAGING")).await;

        assert_eq!(invalid, vec!["c"]);
        assert_eq!(adapter.calls.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_logging_adapter_rejects_blank_tokens() {
        let invalid = LoggingPushAdapter
            .send(
                PushIdType::AndroidFcm,
                &["tok".to_string(), " ".to_string()],
                &PushMessage::new("t", "b", "a"),
            )
            .await
            .unwrap();
        assert_eq!(invalid, vec![" "]);
    }
}
