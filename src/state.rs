use std::sync::Arc;

use crate::config::ServerConfig;
use crate::database::MongoDB;
use crate::events::{DeleteUserEvent, EventBus, InboxAuthEvent, PreCreateMessageEvent, StorageAuthEvent};
use crate::services::authorization_service::{InboxAuthHandler, StorageAuthHandler};
use crate::services::identity_verification_service::DeleteUserVerificationHandler;
use crate::services::inbox_service::{DeleteUserMessagesHandler, MessageTextValidator};
use crate::services::notification_service::{DeleteUserDevicesHandler, PushAdapter};
use crate::services::storage_service::{DeleteUserFilesHandler, FileStorageAdapter};

/// Components built once at startup and shared with every handler.
#[derive(Clone)]
pub struct AppContext {
    pub db: MongoDB,
    pub config: Arc<ServerConfig>,
    pub events: Arc<EventBus>,
    pub storage: Arc<dyn FileStorageAdapter>,
    pub push: Arc<dyn PushAdapter>,
}

impl AppContext {
    /// Builds the context and subscribes the cross-component event handlers.
    pub fn new(
        db: MongoDB,
        config: ServerConfig,
        storage: Arc<dyn FileStorageAdapter>,
        push: Arc<dyn PushAdapter>,
    ) -> Self {
        let events = EventBus::new();

        events.subscribe::<InboxAuthEvent, _>(InboxAuthHandler { db: db.clone() });
        events.subscribe::<StorageAuthEvent, _>(StorageAuthHandler { db: db.clone() });
        events.subscribe::<PreCreateMessageEvent, _>(MessageTextValidator { db: db.clone() });

        events.subscribe::<DeleteUserEvent, _>(DeleteUserMessagesHandler { db: db.clone() });
        events.subscribe::<DeleteUserEvent, _>(DeleteUserFilesHandler {
            db: db.clone(),
            storage: storage.clone(),
            bucket: config.storage.default_bucket.clone(),
        });
        events.subscribe::<DeleteUserEvent, _>(DeleteUserDevicesHandler { db: db.clone() });
        events.subscribe::<DeleteUserEvent, _>(DeleteUserVerificationHandler { db: db.clone() });

        log::info!(
            "📡 Event handlers registered ({} on user deletion)",
            events.subscriber_count::<DeleteUserEvent>()
        );

        Self {
            db,
            config: Arc::new(config),
            events: Arc::new(events),
            storage,
            push,
        }
    }
}
