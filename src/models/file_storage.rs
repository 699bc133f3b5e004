use mongodb::bson::{oid::ObjectId, DateTime as BsonDateTime};
use serde::{Deserialize, Serialize};

use super::format_datetime;

pub const FILES_COLLECTION: &str = "filestorage";

/// Metadata of a file uploaded through the v1 storage API.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileStorage {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    pub file_name: String,
    pub file_size: i64,
    pub content_type: String,
    pub user_id: String,
    pub key: String,
    pub created_at: BsonDateTime,
}

impl FileStorage {
    /// Prefix of every key owned by a `FileStorage` record in the default bucket.
    pub const KEY_PREFIX: &'static str = "files/";

    pub fn build_key(user_id: &str, file_id: &str, file_name: &str) -> String {
        format!("{}user/{}/{}{}", Self::KEY_PREFIX, user_id, file_id, extension_of(file_name))
    }
}

/// Extension including the leading dot, or empty.
pub fn extension_of(file_name: &str) -> String {
    let base = file_name.rsplit('/').next().unwrap_or(file_name);
    match base.rfind('.') {
        Some(idx) if idx > 0 && idx < base.len() - 1 => base[idx..].to_lowercase(),
        _ => String::new(),
    }
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct FileStorageResponse {
    pub id: String,
    pub file_name: String,
    pub file_size: i64,
    pub content_type: String,
    pub user_id: String,
    pub created_at: String,
}

impl From<FileStorage> for FileStorageResponse {
    fn from(f: FileStorage) -> Self {
        FileStorageResponse {
            id: f.id.map(|id| id.to_hex()).unwrap_or_default(),
            file_name: f.file_name,
            file_size: f.file_size,
            content_type: f.content_type,
            user_id: f.user_id,
            created_at: format_datetime(&f.created_at),
        }
    }
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SignedUrlResponse {
    pub url: String,
    pub expires_in: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<FileStorageResponse>,
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UploadResponse {
    pub id: String,
}

#[derive(Debug, Deserialize)]
pub struct UploadQuery {
    pub filename: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_key_keeps_extension() {
        assert_eq!(
            FileStorage::build_key("u1", "f1", "scan.PNG"),
            "files/user/u1/f1.png"
        );
        assert_eq!(FileStorage::build_key("u1", "f1", "README"), "files/user/u1/f1");
    }

    #[test]
    fn test_extension_of_edge_cases() {
        assert_eq!(extension_of(".bashrc"), "");
        assert_eq!(extension_of("archive.tar.gz"), ".gz");
        assert_eq!(extension_of("trailing."), "");
        assert_eq!(extension_of("dir.v2/report"), "");
    }
}
