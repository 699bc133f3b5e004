use async_trait::async_trait;
use futures::stream::TryStreamExt;
use mongodb::bson::{doc, oid::ObjectId, DateTime as BsonDateTime, Document};
use serde::Deserialize;

use crate::database::MongoDB;
use crate::events::{
    DeleteUserEvent, EventHandler, InboxAction, InboxAuthEvent, PreCreateMessageEvent,
};
use crate::models::{
    normalize_text, AuthorizedUser, ConfirmMessagesRequest, Deployment, Message, MessageResponse,
    MessageStatus, MessageSummary, PolicyType, PushMessage, SearchMessagesRequest,
    SendMessageRequest, SendMessageToUserListRequest, User, DEPLOYMENTS_COLLECTION,
    MAX_MESSAGE_LENGTH, MESSAGES_COLLECTION, USERS_COLLECTION,
};
use crate::services::authorization_service::user_deployment_ids;
use crate::services::auth_service::get_user;
use crate::services::notification_service::push_for_user;
use crate::state::AppContext;
use crate::utils::error::{AppError, AppResult};
use crate::utils::validators::{clamp_limit, clamp_skip, parse_object_id};

async fn authorize(ctx: &AppContext, caller: &AuthorizedUser, action: InboxAction, target: Option<&str>) -> AppResult<()> {
    ctx.events
        .emit(
            &InboxAuthEvent {
                action,
                caller: caller.clone(),
                target_user_id: target.map(str::to_string),
            },
            true,
        )
        .await?;
    Ok(())
}

fn validated_text(text: &str) -> AppResult<String> {
    normalize_text(text).ok_or_else(|| {
        AppError::invalid_request(format!(
            "Message text must be between 1 and {} characters",
            MAX_MESSAGE_LENGTH
        ))
    })
}

fn sender_name(sender: &AuthorizedUser, requested: &Option<String>) -> Option<String> {
    requested
        .clone()
        .filter(|n| !n.trim().is_empty())
        .or_else(|| sender.user.display_name.clone())
}

fn new_message(receiver_id: &str, sender: &AuthorizedUser, submitter_name: Option<String>, text: &str, custom: bool) -> Message {
    let now = BsonDateTime::now();
    Message {
        id: None,
        user_id: receiver_id.to_string(),
        submitter_id: sender.id(),
        submitter_name,
        text: text.to_string(),
        status: MessageStatus::Delivered,
        custom,
        create_date_time: now,
        update_date_time: now,
    }
}

fn message_push(submitter_id: &str, custom: bool, unread: i64) -> PushMessage {
    PushMessage::new("New message", "You have a new message", PushMessage::OPEN_MESSAGING)
        .with_data("submitterId", submitter_id)
        .with_data("isCustom", custom.to_string())
        .with_badge(unread)
}

async fn notify_receiver(ctx: &AppContext, receiver_id: &str, submitter_id: &str, custom: bool) -> AppResult<()> {
    let unread = retrieve_unread_count(&ctx.db, receiver_id).await?;
    push_for_user(
        &ctx.db,
        &ctx.push,
        receiver_id,
        message_push(submitter_id, custom, unread),
        true,
    )
    .await
}

pub async fn send_message(
    ctx: &AppContext,
    sender: &AuthorizedUser,
    receiver_id: &str,
    request: &SendMessageRequest,
) -> AppResult<String> {
    authorize(ctx, sender, InboxAction::SendMessage, Some(receiver_id)).await?;
    let text = validated_text(&request.text)?;

    ctx.events
        .emit(
            &PreCreateMessageEvent {
                text: text.clone(),
                custom: request.custom,
                submitter_id: sender.id(),
                receiver_id: receiver_id.to_string(),
            },
            true,
        )
        .await?;

    let message = new_message(
        receiver_id,
        sender,
        sender_name(sender, &request.submitter_name),
        &text,
        request.custom,
    );
    let inserted = ctx
        .db
        .collection::<Message>(MESSAGES_COLLECTION)
        .insert_one(&message)
        .await?;
    let message_id = inserted
        .inserted_id
        .as_object_id()
        .map(|id| id.to_hex())
        .unwrap_or_default();

    notify_receiver(ctx, receiver_id, &sender.id(), request.custom).await?;

    log::info!("✉️  Message {} sent by {} to {}", message_id, sender.id(), receiver_id);
    Ok(message_id)
}

pub async fn send_message_to_user_list(
    ctx: &AppContext,
    sender: &AuthorizedUser,
    request: &SendMessageToUserListRequest,
) -> AppResult<u64> {
    authorize(ctx, sender, InboxAction::SendMessageToUserList, None).await?;
    let text = validated_text(&request.text)?;

    let ids: Vec<ObjectId> = request
        .user_ids
        .iter()
        .filter_map(|id| ObjectId::parse_str(id).ok())
        .collect();
    if ids.is_empty() {
        return Err(AppError::invalid_request("userIds must contain at least one valid id"));
    }

    let users: Vec<User> = ctx
        .db
        .collection::<User>(USERS_COLLECTION)
        .find(doc! { "_id": { "$in": ids } })
        .await?
        .try_collect()
        .await?;

    let mut receivers: Vec<User> = Vec::with_capacity(users.len());
    for user in users {
        let deployment_ids = user_deployment_ids(&ctx.db, &user).await?;
        if sender.has_policy_in_any_deployment(&deployment_ids, PolicyType::SendPatientMessage) {
            receivers.push(user);
        } else {
            log::warn!("⚠️  Skipping user {}: not reachable by {}", user.id_hex(), sender.id());
        }
    }
    if receivers.is_empty() {
        return Ok(0);
    }

    for receiver in &receivers {
        ctx.events
            .emit(
                &PreCreateMessageEvent {
                    text: text.clone(),
                    custom: request.custom,
                    submitter_id: sender.id(),
                    receiver_id: receiver.id_hex(),
                },
                true,
            )
            .await?;
    }

    let name = sender_name(sender, &request.submitter_name);
    let messages: Vec<Message> = receivers
        .iter()
        .map(|receiver| new_message(&receiver.id_hex(), sender, name.clone(), &text, request.custom))
        .collect();

    let collection = ctx.db.collection::<Message>(MESSAGES_COLLECTION);
    let mut session = ctx.db.client().start_session().await?;
    session.start_transaction().await?;

    let inserted = match collection.insert_many(&messages).session(&mut session).await {
        Ok(result) => result.inserted_ids.len(),
        Err(e) => {
            session.abort_transaction().await?;
            return Err(e.into());
        }
    };
    if inserted != messages.len() {
        session.abort_transaction().await?;
        return Err(AppError::Internal(format!(
            "Inserted {} of {} messages",
            inserted,
            messages.len()
        )));
    }
    session.commit_transaction().await?;

    for receiver in &receivers {
        notify_receiver(ctx, &receiver.id_hex(), &sender.id(), request.custom).await?;
    }

    log::info!("✉️  {} messages sent by {}", inserted, sender.id());
    Ok(inserted as u64)
}

pub fn search_filter(user_id: &str, request: &SearchMessagesRequest) -> Document {
    let mut filter = doc! { "userId": user_id };
    if let Some(submitter_id) = &request.submitter_id {
        filter.insert("submitterId", submitter_id.as_str());
    }
    if let Some(custom) = request.custom {
        filter.insert("custom", custom);
    }
    filter
}

pub async fn retrieve_messages(
    ctx: &AppContext,
    caller: &AuthorizedUser,
    user_id: &str,
    request: &SearchMessagesRequest,
) -> AppResult<Vec<MessageResponse>> {
    authorize(ctx, caller, InboxAction::SearchMessages, Some(user_id)).await?;

    let messages: Vec<Message> = ctx
        .db
        .collection::<Message>(MESSAGES_COLLECTION)
        .find(search_filter(user_id, request))
        .sort(doc! { "createDateTime": -1 })
        .skip(clamp_skip(request.skip))
        .limit(clamp_limit(request.limit))
        .await?
        .try_collect()
        .await?;

    Ok(messages.into_iter().map(MessageResponse::from).collect())
}

pub fn summary_pipeline(user_id: &str) -> Vec<Document> {
    vec![
        doc! { "$match": { "userId": user_id } },
        doc! { "$sort": { "createDateTime": -1 } },
        doc! { "$addFields": { "custom": { "$ifNull": ["$custom", false] } } },
        doc! { "$group": {
            "_id": { "submitterId": "$submitterId", "custom": "$custom" },
            "unreadMessageCount": {
                "$sum": { "$cond": [{ "$eq": ["$status", MessageStatus::Delivered.as_str()] }, 1, 0] }
            },
            "latestMessage": { "$first": "$$ROOT" },
        } },
        doc! { "$sort": { "latestMessage.createDateTime": -1 } },
    ]
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SummaryKey {
    submitter_id: String,
    custom: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SummaryGroup {
    #[serde(rename = "_id")]
    key: SummaryKey,
    unread_message_count: i64,
    latest_message: Message,
}

pub async fn retrieve_submitters_first_messages(
    ctx: &AppContext,
    caller: &AuthorizedUser,
    user_id: &str,
) -> AppResult<Vec<MessageSummary>> {
    authorize(ctx, caller, InboxAction::SummaryMessages, Some(user_id)).await?;

    let groups: Vec<Document> = ctx
        .db
        .collection::<Message>(MESSAGES_COLLECTION)
        .aggregate(summary_pipeline(user_id))
        .await?
        .try_collect()
        .await?;

    groups
        .into_iter()
        .map(|group| -> AppResult<MessageSummary> {
            let group: SummaryGroup = mongodb::bson::from_document(group)?;
            Ok(MessageSummary {
                submitter_id: group.key.submitter_id,
                custom: group.key.custom,
                unread_message_count: group.unread_message_count,
                latest_message: MessageResponse::from(group.latest_message),
            })
        })
        .collect()
}

pub async fn confirm_messages(
    ctx: &AppContext,
    caller: &AuthorizedUser,
    request: &ConfirmMessagesRequest,
) -> AppResult<u64> {
    authorize(ctx, caller, InboxAction::ConfirmMessages, None).await?;

    let ids = request
        .message_ids
        .iter()
        .map(|id| parse_object_id(id, "messageId"))
        .collect::<AppResult<Vec<ObjectId>>>()?;
    if ids.is_empty() {
        return Ok(0);
    }

    let collection = ctx.db.collection::<Message>(MESSAGES_COLLECTION);
    let foreign = collection
        .count_documents(doc! { "_id": { "$in": ids.clone() }, "userId": { "$ne": caller.id() } })
        .await?;
    if foreign > 0 {
        return Err(AppError::permission_denied());
    }

    let result = collection
        .update_many(
            doc! { "_id": { "$in": ids }, "userId": caller.id() },
            doc! { "$set": {
                "status": MessageStatus::Read.as_str(),
                "updateDateTime": BsonDateTime::now(),
            } },
        )
        .await?;

    Ok(result.modified_count)
}

pub async fn retrieve_unread_count(db: &MongoDB, user_id: &str) -> AppResult<i64> {
    let count = db
        .collection::<Message>(MESSAGES_COLLECTION)
        .count_documents(doc! { "userId": user_id, "status": MessageStatus::Delivered.as_str() })
        .await?;
    Ok(count as i64)
}

pub fn check_message_allowed(deployments: &[Deployment], text: &str, custom: bool) -> AppResult<()> {
    if custom {
        if deployments.iter().any(|d| d.features.messaging.allow_custom_message) {
            return Ok(());
        }
        return Err(AppError::invalid_request("Custom messages are not allowed"));
    }

    if deployments.iter().any(|d| d.is_predefined_message(text)) {
        Ok(())
    } else {
        Err(AppError::invalid_request("Message is not one of the predefined messages"))
    }
}

/// Validates message text against the receiver's deployment messaging settings.
pub struct MessageTextValidator {
    pub db: MongoDB,
}

#[async_trait]
impl EventHandler<PreCreateMessageEvent> for MessageTextValidator {
    async fn handle(&self, event: &PreCreateMessageEvent) -> Result<(), AppError> {
        let receiver = get_user(&self.db, &event.receiver_id).await?;
        let ids: Vec<ObjectId> = user_deployment_ids(&self.db, &receiver)
            .await?
            .iter()
            .filter_map(|id| ObjectId::parse_str(id).ok())
            .collect();

        let deployments: Vec<Deployment> = self
            .db
            .collection::<Deployment>(DEPLOYMENTS_COLLECTION)
            .find(doc! { "_id": { "$in": ids } })
            .await?
            .try_collect()
            .await?;

        check_message_allowed(&deployments, &event.text, event.custom)
    }
}

pub struct DeleteUserMessagesHandler {
    pub db: MongoDB,
}

#[async_trait]
impl EventHandler<DeleteUserEvent> for DeleteUserMessagesHandler {
    async fn handle(&self, event: &DeleteUserEvent) -> Result<(), AppError> {
        let deleted = self
            .db
            .collection::<Message>(MESSAGES_COLLECTION)
            .delete_many(doc! { "userId": &event.user_id })
            .await?;
        log::info!("🗑️  Removed {} messages of user {}", deleted.deleted_count, event.user_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::deployment::test_deployment;

    #[test]
    fn test_predefined_message_rules() {
        let deployment = test_deployment();
        let deployments = vec![deployment];

        assert!(check_message_allowed(&deployments, "Please complete your questionnaire", false).is_ok());
        assert!(check_message_allowed(&deployments, "Free text", false).is_err());
        assert!(check_message_allowed(&deployments, "Free text", true).is_err());
    }

    #[test]
    fn test_custom_message_allowed_by_flag() {
        let mut deployment = test_deployment();
        deployment.features.messaging.allow_custom_message = true;

        assert!(check_message_allowed(&[deployment], "Anything at all", true).is_ok());
    }

    #[test]
    fn test_no_deployment_means_no_messages() {
        assert!(check_message_allowed(&[], "Please complete your questionnaire", false).is_err());
    }

    #[test]
    fn test_text_validation() {
        assert_eq!(validated_text("  hello ").unwrap(), "hello");
        assert!(matches!(validated_text(""), Err(AppError::InvalidRequest(_))));
        assert!(validated_text(&"x".repeat(281)).is_err());
    }

    #[test]
    fn test_search_filter() {
        let filter = search_filter(
            "u1",
            &SearchMessagesRequest {
                submitter_id: Some("s1".into()),
                custom: Some(true),
                ..Default::default()
            },
        );
        assert_eq!(filter.get_str("userId").unwrap(), "u1");
        assert_eq!(filter.get_str("submitterId").unwrap(), "s1");
        assert!(filter.get_bool("custom").unwrap());

        let filter = search_filter("u1", &SearchMessagesRequest::default());
        assert!(!filter.contains_key("submitterId"));
        assert!(!filter.contains_key("custom"));
    }

    #[test]
    fn test_summary_pipeline_groups_by_submitter_and_custom() {
        let pipeline = summary_pipeline("u1");
        assert_eq!(pipeline.len(), 5);

        let group = pipeline[3].get_document("$group").unwrap();
        let key = group.get_document("_id").unwrap();
        assert_eq!(key.get_str("submitterId").unwrap(), "$submitterId");
        assert_eq!(key.get_str("custom").unwrap(), "$custom");

        let last_sort = pipeline[4].get_document("$sort").unwrap();
        assert_eq!(last_sort.get_i32("latestMessage.createDateTime").unwrap(), -1);
    }

    #[test]
    fn test_push_payload_carries_badge_and_submitter() {
        let push = message_push("s1", true, 4);
        assert_eq!(push.action, "OPEN_MESSAGING");
        assert_eq!(push.data["submitterId"], "s1");
        assert_eq!(push.data["isCustom"], "true");
        assert_eq!(push.badge, Some(4));
    }
}
