use async_trait::async_trait;
use chrono::{Duration, Utc};
use futures::stream::TryStreamExt;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use mongodb::bson::{doc, oid::ObjectId, DateTime as BsonDateTime};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::config::ServerConfig;
use crate::database::MongoDB;
use crate::events::{DeleteUserEvent, EventHandler, StorageAction, StorageAuthEvent};
use crate::models::{
    AuthorizedUser, FileStorage, FileStorageResponse, SignedUrlResponse, FILES_COLLECTION,
};
use crate::state::AppContext;
use crate::utils::error::{AppError, AppResult};
use crate::utils::validators::{parse_object_id, sanitize_object_name};

pub const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

/// Bytes of a stored object together with its metadata.
#[derive(Debug, Clone)]
pub struct StoredObject {
    pub data: Vec<u8>,
    pub length: usize,
    pub content_type: String,
}

#[async_trait]
pub trait FileStorageAdapter: Send + Sync {
    async fn upload_file(&self, bucket: &str, key: &str, data: &[u8], content_type: &str) -> AppResult<()>;

    async fn download_file(&self, bucket: &str, key: &str) -> AppResult<StoredObject>;

    async fn file_exist(&self, bucket: &str, key: &str) -> AppResult<bool>;

    async fn delete_file(&self, bucket: &str, key: &str) -> AppResult<()>;
}

/// Objects live under `<root>/<bucket>/<key>`; content types under
/// `<root>/.meta/<bucket>/<key>`.
pub struct LocalFileStorage {
    root: PathBuf,
}

impl LocalFileStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn object_path(&self, bucket: &str, key: &str) -> AppResult<PathBuf> {
        let bucket = sanitize_object_name(bucket)?;
        let key = sanitize_object_name(key)?;
        Ok(self.root.join(bucket).join(key))
    }

    fn meta_path(&self, bucket: &str, key: &str) -> AppResult<PathBuf> {
        let bucket = sanitize_object_name(bucket)?;
        let key = sanitize_object_name(key)?;
        Ok(self.root.join(".meta").join(bucket).join(key))
    }

    async fn ensure_parent(path: &Path) -> AppResult<()> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        Ok(())
    }
}

#[async_trait]
impl FileStorageAdapter for LocalFileStorage {
    async fn upload_file(&self, bucket: &str, key: &str, data: &[u8], content_type: &str) -> AppResult<()> {
        let path = self.object_path(bucket, key)?;
        let meta = self.meta_path(bucket, key)?;

        Self::ensure_parent(&path).await?;
        Self::ensure_parent(&meta).await?;
        tokio::fs::write(&path, data).await?;
        tokio::fs::write(&meta, content_type.as_bytes()).await?;

        log::debug!("💾 Stored {}/{} ({} bytes)", bucket, key, data.len());
        Ok(())
    }

    async fn download_file(&self, bucket: &str, key: &str) -> AppResult<StoredObject> {
        let path = self.object_path(bucket, key)?;
        let data = match tokio::fs::read(&path).await {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(AppError::BucketFileDoesNotExist)
            }
            Err(e) => return Err(e.into()),
        };

        let content_type = match tokio::fs::read_to_string(self.meta_path(bucket, key)?).await {
            Ok(content_type) if !content_type.trim().is_empty() => content_type.trim().to_string(),
            _ => DEFAULT_CONTENT_TYPE.to_string(),
        };

        Ok(StoredObject {
            length: data.len(),
            data,
            content_type,
        })
    }

    async fn file_exist(&self, bucket: &str, key: &str) -> AppResult<bool> {
        let path = self.object_path(bucket, key)?;
        Ok(tokio::fs::metadata(&path).await.map(|m| m.is_file()).unwrap_or(false))
    }

    async fn delete_file(&self, bucket: &str, key: &str) -> AppResult<()> {
        for path in [self.object_path(bucket, key)?, self.meta_path(bucket, key)?] {
            match tokio::fs::remove_file(&path).await {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct SignedUrlClaims {
    bucket: String,
    key: String,
    exp: usize,
}

pub fn generate_signed_url(config: &ServerConfig, bucket: &str, key: &str) -> AppResult<String> {
    let exp = (Utc::now() + Duration::seconds(config.storage.signed_url_expires_secs)).timestamp() as usize;
    let claims = SignedUrlClaims {
        bucket: bucket.to_string(),
        key: key.to_string(),
        exp,
    };
    let token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(config.jwt.secret.as_ref()),
    )?;

    Ok(format!(
        "{}/api/storage/v1/signed/{}",
        config.public_base_url.trim_end_matches('/'),
        token
    ))
}

/// Returns `(bucket, key)` for a valid signed-URL token.
pub fn verify_signed_token(config: &ServerConfig, token: &str) -> AppResult<(String, String)> {
    let validation = Validation::new(Algorithm::HS256);
    let claims = decode::<SignedUrlClaims>(
        token,
        &DecodingKey::from_secret(config.jwt.secret.as_ref()),
        &validation,
    )?
    .claims;
    Ok((claims.bucket, claims.key))
}

fn check_bucket(config: &ServerConfig, bucket: &str) -> AppResult<()> {
    if !config.storage.is_bucket_allowed(bucket) {
        return Err(AppError::BucketNotAllowed(format!("Bucket {} is not allowed", bucket)));
    }
    Ok(())
}

/// Resolves a raw bucket object key. Keys of user files in the default bucket
/// are only reachable through the v1 API, which checks the owner.
fn bucket_object_key(config: &ServerConfig, bucket: &str, filename: &str) -> AppResult<String> {
    check_bucket(config, bucket)?;
    let key = sanitize_object_name(filename)?;
    if bucket == config.storage.default_bucket && key.starts_with(FileStorage::KEY_PREFIX) {
        return Err(AppError::permission_denied());
    }
    Ok(key)
}

fn check_size(config: &ServerConfig, size: usize) -> AppResult<()> {
    if size == 0 {
        return Err(AppError::invalid_request("File is empty"));
    }
    if size > config.storage.max_file_size {
        return Err(AppError::invalid_request(format!(
            "File exceeds the maximum size of {} bytes",
            config.storage.max_file_size
        )));
    }
    Ok(())
}

pub async fn upload_to_bucket(
    ctx: &AppContext,
    bucket: &str,
    filename: &str,
    data: &[u8],
    content_type: Option<&str>,
) -> AppResult<()> {
    let key = bucket_object_key(&ctx.config, bucket, filename)?;
    check_size(&ctx.config, data.len())?;

    ctx.storage
        .upload_file(bucket, &key, data, content_type.unwrap_or(DEFAULT_CONTENT_TYPE))
        .await?;
    log::info!("📤 Uploaded {}/{}", bucket, key);
    Ok(())
}

pub async fn download_from_bucket(ctx: &AppContext, bucket: &str, filename: &str) -> AppResult<StoredObject> {
    let key = bucket_object_key(&ctx.config, bucket, filename)?;
    ctx.storage.download_file(bucket, &key).await
}

pub async fn signed_url_for_bucket(ctx: &AppContext, bucket: &str, filename: &str) -> AppResult<SignedUrlResponse> {
    let key = bucket_object_key(&ctx.config, bucket, filename)?;
    if !ctx.storage.file_exist(bucket, &key).await? {
        return Err(AppError::BucketFileDoesNotExist);
    }

    Ok(SignedUrlResponse {
        url: generate_signed_url(&ctx.config, bucket, &key)?,
        expires_in: ctx.config.storage.signed_url_expires_secs,
        metadata: None,
    })
}

pub async fn download_signed(ctx: &AppContext, token: &str) -> AppResult<StoredObject> {
    let (bucket, key) = verify_signed_token(&ctx.config, token)?;
    ctx.storage.download_file(&bucket, &key).await
}

/// Drops an object whose metadata record could not be written.
async fn remove_orphan(storage: &dyn FileStorageAdapter, bucket: &str, key: &str) -> bool {
    match storage.delete_file(bucket, key).await {
        Ok(()) => true,
        Err(e) => {
            log::warn!("⚠️  Could not remove orphaned object {}/{}: {}", bucket, key, e);
            false
        }
    }
}

pub async fn upload_file(
    ctx: &AppContext,
    user_id: &str,
    file_name: &str,
    data: &[u8],
    content_type: Option<&str>,
) -> AppResult<String> {
    let file_name = file_name.rsplit('/').next().unwrap_or(file_name).trim();
    if file_name.is_empty() {
        return Err(AppError::invalid_request("File name is required"));
    }
    check_size(&ctx.config, data.len())?;

    let file_id = ObjectId::new();
    let bucket = &ctx.config.storage.default_bucket;
    let key = FileStorage::build_key(user_id, &file_id.to_hex(), file_name);
    let content_type = content_type.unwrap_or(DEFAULT_CONTENT_TYPE).to_string();

    ctx.storage.upload_file(bucket, &key, data, &content_type).await?;

    let record = FileStorage {
        id: Some(file_id),
        file_name: file_name.to_string(),
        file_size: data.len() as i64,
        content_type,
        user_id: user_id.to_string(),
        key,
        created_at: BsonDateTime::now(),
    };
    if let Err(e) = ctx.db.collection::<FileStorage>(FILES_COLLECTION).insert_one(&record).await {
        remove_orphan(ctx.storage.as_ref(), bucket, &record.key).await;
        return Err(e.into());
    }

    log::info!("📤 File {} uploaded by {}", file_id.to_hex(), user_id);
    Ok(file_id.to_hex())
}

async fn authorized_file(
    ctx: &AppContext,
    caller: &AuthorizedUser,
    file_id: &str,
    action: StorageAction,
) -> AppResult<FileStorage> {
    let oid = parse_object_id(file_id, "fileId")?;
    let record = ctx
        .db
        .collection::<FileStorage>(FILES_COLLECTION)
        .find_one(doc! { "_id": oid })
        .await?
        .ok_or(AppError::BucketFileDoesNotExist)?;

    ctx.events
        .emit(
            &StorageAuthEvent {
                action,
                caller: caller.clone(),
                owner_id: record.user_id.clone(),
            },
            true,
        )
        .await?;

    Ok(record)
}

pub async fn download_file(
    ctx: &AppContext,
    caller: &AuthorizedUser,
    file_id: &str,
) -> AppResult<(FileStorage, StoredObject)> {
    let record = authorized_file(ctx, caller, file_id, StorageAction::Download).await?;
    let object = ctx
        .storage
        .download_file(&ctx.config.storage.default_bucket, &record.key)
        .await?;
    Ok((record, object))
}

pub async fn retrieve_signed_url(
    ctx: &AppContext,
    caller: &AuthorizedUser,
    file_id: &str,
) -> AppResult<SignedUrlResponse> {
    let record = authorized_file(ctx, caller, file_id, StorageAction::SignedUrl).await?;
    let url = generate_signed_url(&ctx.config, &ctx.config.storage.default_bucket, &record.key)?;

    Ok(SignedUrlResponse {
        url,
        expires_in: ctx.config.storage.signed_url_expires_secs,
        metadata: Some(FileStorageResponse::from(record)),
    })
}

/// Removes a deleted user's file records and objects.
pub struct DeleteUserFilesHandler {
    pub db: MongoDB,
    pub storage: Arc<dyn FileStorageAdapter>,
    pub bucket: String,
}

#[async_trait]
impl EventHandler<DeleteUserEvent> for DeleteUserFilesHandler {
    async fn handle(&self, event: &DeleteUserEvent) -> Result<(), AppError> {
        let collection = self.db.collection::<FileStorage>(FILES_COLLECTION);
        let files: Vec<FileStorage> = collection
            .find(doc! { "userId": &event.user_id })
            .await?
            .try_collect()
            .await?;

        for file in &files {
            self.storage.delete_file(&self.bucket, &file.key).await?;
        }
        let deleted = collection.delete_many(doc! { "userId": &event.user_id }).await?;

        log::info!("🗑️  Removed {} files of user {}", deleted.deleted_count, event.user_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::test_config;

    #[tokio::test]
    async fn test_local_storage_roundtrip_keeps_content_type() {
        let dir = tempfile::tempdir().unwrap();
        let storage = LocalFileStorage::new(dir.path());

        storage
            .upload_file("phoenix-files", "files/user/u1/a.png", b"png-bytes", "image/png")
            .await
            .unwrap();

        assert!(storage.file_exist("phoenix-files", "files/user/u1/a.png").await.unwrap());
        let object = storage.download_file("phoenix-files", "files/user/u1/a.png").await.unwrap();
        assert_eq!(object.data, b"png-bytes");
        assert_eq!(object.length, 9);
        assert_eq!(object.content_type, "image/png");
    }

    #[tokio::test]
    async fn test_missing_object_is_bucket_file_does_not_exist() {
        let dir = tempfile::tempdir().unwrap();
        let storage = LocalFileStorage::new(dir.path());

        let result = storage.download_file("phoenix-files", "nope.txt").await;
        assert!(matches!(result, Err(AppError::BucketFileDoesNotExist)));
        assert!(!storage.file_exist("phoenix-files", "nope.txt").await.unwrap());
    }

    #[tokio::test]
    async fn test_delete_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let storage = LocalFileStorage::new(dir.path());

        storage.upload_file("b", "k.txt", b"x", "text/plain").await.unwrap();
        storage.delete_file("b", "k.txt").await.unwrap();
        storage.delete_file("b", "k.txt").await.unwrap();
        assert!(!storage.file_exist("b", "k.txt").await.unwrap());
    }

    #[tokio::test]
    async fn test_traversal_keys_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let storage = LocalFileStorage::new(dir.path());

        let result = storage.upload_file("b", "../escape.txt", b"x", "text/plain").await;
        assert!(matches!(result, Err(AppError::InvalidRequest(_))));
    }

    #[test]
    fn test_signed_url_roundtrip() {
        let config = test_config();
        let url = generate_signed_url(&config, "phoenix-files", "files/user/u1/f.pdf").unwrap();

        assert!(url.starts_with("http://localhost:3002/api/storage/v1/signed/"));
        let token = url.rsplit('/').next().unwrap();
        let (bucket, key) = verify_signed_token(&config, token).unwrap();
        assert_eq!(bucket, "phoenix-files");
        assert_eq!(key, "files/user/u1/f.pdf");
    }

    #[test]
    fn test_expired_signed_url() {
        let mut config = test_config();
        config.storage.signed_url_expires_secs = -3600;
        let url = generate_signed_url(&config, "phoenix-files", "a.txt").unwrap();
        let token = url.rsplit('/').next().unwrap();

        assert!(matches!(verify_signed_token(&config, token), Err(AppError::TokenExpired)));
    }

    #[test]
    fn test_tampered_signed_url() {
        let config = test_config();
        let url = generate_signed_url(&config, "phoenix-files", "a.txt").unwrap();
        let token = format!("{}x", url.rsplit('/').next().unwrap());

        assert!(matches!(verify_signed_token(&config, &token), Err(AppError::WrongToken)));
    }

    #[test]
    fn test_bucket_and_size_checks() {
        let config = test_config();
        assert!(check_bucket(&config, "public-assets").is_ok());
        assert!(matches!(check_bucket(&config, "secret"), Err(AppError::BucketNotAllowed(_))));

        assert!(check_size(&config, 10).is_ok());
        assert!(check_size(&config, 0).is_err());
        assert!(check_size(&config, config.storage.max_file_size + 1).is_err());
    }

    #[test]
    fn test_user_file_keys_are_closed_to_bucket_api() {
        let config = test_config();
        let bucket = config.storage.default_bucket.clone();
        let user_key = FileStorage::build_key("5e8f0c74b50aa9656c34789c", "65f0a1b2c3d4e5f601020301", "scan.pdf");

        assert!(matches!(
            bucket_object_key(&config, &bucket, &user_key),
            Err(AppError::PermissionDenied(_))
        ));
        assert_eq!(
            bucket_object_key(&config, &bucket, "shared/leaflet.pdf").unwrap(),
            "shared/leaflet.pdf"
        );
        assert_eq!(
            bucket_object_key(&config, "public-assets", &user_key).unwrap(),
            user_key
        );
    }

    struct ReadOnlyStorage;

    #[async_trait]
    impl FileStorageAdapter for ReadOnlyStorage {
        async fn upload_file(&self, _: &str, _: &str, _: &[u8], _: &str) -> AppResult<()> {
            Err(AppError::Internal("read-only".to_string()))
        }

        async fn download_file(&self, _: &str, _: &str) -> AppResult<StoredObject> {
            Err(AppError::BucketFileDoesNotExist)
        }

        async fn file_exist(&self, _: &str, _: &str) -> AppResult<bool> {
            Ok(true)
        }

        async fn delete_file(&self, _: &str, _: &str) -> AppResult<()> {
            Err(AppError::Internal("read-only".to_string()))
        }
    }

    #[tokio::test]
    async fn test_remove_orphan_reports_cleanup_failure() {
        let dir = tempfile::tempdir().unwrap();
        let storage = LocalFileStorage::new(dir.path());
        storage.upload_file("b", "files/user/u1/x.txt", b"x", "text/plain").await.unwrap();

        assert!(remove_orphan(&storage, "b", "files/user/u1/x.txt").await);
        assert!(!storage.file_exist("b", "files/user/u1/x.txt").await.unwrap());

        assert!(!remove_orphan(&ReadOnlyStorage, "b", "files/user/u1/x.txt").await);
    }
}
