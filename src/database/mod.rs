use mongodb::{Client, Collection, Database};
use std::error::Error;

use crate::models::{
    DEVICES_COLLECTION, FILES_COLLECTION, MESSAGES_COLLECTION, MODULE_RESULTS_COLLECTION,
    SESSIONS_COLLECTION, USERS_COLLECTION, VERIFICATION_LOGS_COLLECTION,
};

#[derive(Clone)]
pub struct MongoDB {
    client: Client,
    db: Database,
}

impl MongoDB {
    pub async fn new(uri: &str, db_name: &str) -> Result<Self, Box<dyn Error>> {
        let mut client_options = mongodb::options::ClientOptions::parse(uri).await?;

        client_options.max_pool_size = Some(20);
        client_options.min_pool_size = Some(5);
        client_options.max_idle_time = Some(std::time::Duration::from_secs(300));

        client_options.connect_timeout = Some(std::time::Duration::from_secs(5));
        client_options.server_selection_timeout = Some(std::time::Duration::from_secs(5));

        let client = Client::with_options(client_options)?;
        let db = client.database(db_name);

        // Fail fast when the server is unreachable
        db.list_collection_names().await?;

        let mongodb = Self { client, db };
        mongodb.ensure_indexes().await?;

        Ok(mongodb)
    }

    /// Creates the indexes every query path relies on.
    async fn ensure_indexes(&self) -> Result<(), Box<dyn Error>> {
        use mongodb::bson::doc;
        use mongodb::options::IndexOptions;
        use mongodb::IndexModel;

        log::info!("🔧 Creating database indexes...");

        let unique = || IndexOptions::builder().unique(true).build();

        let indexes: Vec<(&str, IndexModel)> = vec![
            (
                USERS_COLLECTION,
                IndexModel::builder().keys(doc! { "email": 1 }).options(unique()).build(),
            ),
            (
                USERS_COLLECTION,
                IndexModel::builder()
                    .keys(doc! { "onfidoApplicantId": 1 })
                    .options(
                        IndexOptions::builder()
                            .unique(true)
                            .partial_filter_expression(doc! { "onfidoApplicantId": { "$type": "string" } })
                            .build(),
                    )
                    .build(),
            ),
            (
                SESSIONS_COLLECTION,
                IndexModel::builder().keys(doc! { "refreshJti": 1 }).options(unique()).build(),
            ),
            (
                SESSIONS_COLLECTION,
                IndexModel::builder().keys(doc! { "userId": 1, "createdAt": -1 }).build(),
            ),
            (
                MESSAGES_COLLECTION,
                IndexModel::builder()
                    .keys(doc! { "userId": 1, "createDateTime": -1 })
                    .build(),
            ),
            (
                MESSAGES_COLLECTION,
                IndexModel::builder().keys(doc! { "userId": 1, "status": 1 }).build(),
            ),
            (
                FILES_COLLECTION,
                IndexModel::builder().keys(doc! { "userId": 1 }).build(),
            ),
            (
                DEVICES_COLLECTION,
                IndexModel::builder()
                    .keys(doc! { "userId": 1, "devicePushId": 1 })
                    .options(unique())
                    .build(),
            ),
            (
                VERIFICATION_LOGS_COLLECTION,
                IndexModel::builder().keys(doc! { "userId": 1 }).options(unique()).build(),
            ),
            (
                MODULE_RESULTS_COLLECTION,
                IndexModel::builder()
                    .keys(doc! { "userId": 1, "moduleId": 1, "createDateTime": -1 })
                    .build(),
            ),
        ];

        for (collection, index) in indexes {
            let keys = index.keys.clone();
            match self
                .database()
                .collection::<mongodb::bson::Document>(collection)
                .create_index(index)
                .await
            {
                Ok(_) => log::info!("   ✅ Index created: {}({})", collection, keys),
                Err(e) => log::debug!("   ℹ️  Index already exists: {}", e),
            }
        }

        log::info!("✅ Database indexes ready");

        Ok(())
    }

    pub fn collection<T: Send + Sync>(&self, name: &str) -> Collection<T> {
        self.db.collection(name)
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    pub fn client(&self) -> &Client {
        &self.client
    }
}
