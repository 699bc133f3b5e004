use std::env;
use std::str::FromStr;

/// JWT settings shared by the auth and storage components.
#[derive(Debug, Clone)]
pub struct JwtConfig {
    pub secret: String,
    pub issuer: String,
    pub audience: String,
    pub access_token_expires_secs: i64,
    pub refresh_token_expires_secs: i64,
}

#[derive(Debug, Clone)]
pub struct StorageConfig {
    pub root: String,
    pub default_bucket: String,
    pub allowed_buckets: Vec<String>,
    pub signed_url_expires_secs: i64,
    pub max_file_size: usize,
}

impl StorageConfig {
    pub fn is_bucket_allowed(&self, bucket: &str) -> bool {
        bucket == self.default_bucket || self.allowed_buckets.iter().any(|b| b == bucket)
    }
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub mongodb_uri: String,
    pub mongodb_database: String,
    pub public_base_url: String,
    pub cors_allowed_origins: Vec<String>,
    pub onfido_webhook_token: Option<String>,
    pub jwt: JwtConfig,
    pub storage: StorageConfig,
}

impl ServerConfig {
    /// Reads the configuration from the process environment.
    pub fn from_env() -> Result<Self, String> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, String>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());

        let mongodb_uri = lookup("MONGODB_URI").ok_or_else(|| "MONGODB_URI must be set".to_string())?;

        let host = get("HOST", "0.0.0.0");
        let port: u16 = parse_or_default(&lookup, "PORT", 3002);

        let jwt_secret = lookup("JWT_SECRET").unwrap_or_else(|| {
            log::warn!("⚠️  JWT_SECRET not set, using an insecure development secret");
            "default-secret-change-me".to_string()
        });

        let default_bucket = get("STORAGE_DEFAULT_BUCKET", "phoenix-files");

        Ok(Self {
            public_base_url: get("PUBLIC_BASE_URL", &format!("http://localhost:{}", port)),
            host,
            port,
            mongodb_uri,
            mongodb_database: get("MONGODB_DATABASE", "phoenix"),
            cors_allowed_origins: split_list(&get("CORS_ALLOWED_ORIGINS", "http://localhost:3000")),
            onfido_webhook_token: lookup("ONFIDO_WEBHOOK_TOKEN").filter(|t| !t.is_empty()),
            jwt: JwtConfig {
                secret: jwt_secret,
                issuer: get("JWT_ISSUER", "phoenix"),
                audience: get("JWT_AUDIENCE", "phoenix-api"),
                access_token_expires_secs: parse_or_default(&lookup, "ACCESS_TOKEN_EXPIRES_SECS", 3600),
                refresh_token_expires_secs: parse_or_default(
                    &lookup,
                    "REFRESH_TOKEN_EXPIRES_SECS",
                    30 * 24 * 3600,
                ),
            },
            storage: StorageConfig {
                root: get("STORAGE_ROOT", "./storage"),
                allowed_buckets: split_list(&get("STORAGE_ALLOWED_BUCKETS", &default_bucket)),
                default_bucket,
                signed_url_expires_secs: parse_or_default(
                    &lookup,
                    "STORAGE_SIGNED_URL_EXPIRES_SECS",
                    24 * 3600,
                ),
                max_file_size: parse_or_default(&lookup, "STORAGE_MAX_FILE_SIZE", 50 * 1024 * 1024),
            },
        })
    }
}

fn parse_or_default<F, T>(lookup: &F, key: &str, default: T) -> T
where
    F: Fn(&str) -> Option<String>,
    T: FromStr + std::fmt::Display + Copy,
{
    match lookup(key) {
        Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
            log::warn!("⚠️  Invalid value for {}: '{}', using default {}", key, raw, default);
            default
        }),
        None => default,
    }
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

#[cfg(test)]
pub fn test_config() -> ServerConfig {
    ServerConfig::from_lookup(|key| match key {
        "MONGODB_URI" => Some("mongodb://localhost:27017".to_string()),
        "JWT_SECRET" => Some("test-secret".to_string()),
        "STORAGE_ALLOWED_BUCKETS" => Some("phoenix-files,public-assets".to_string()),
        _ => None,
    })
    .unwrap()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_mongodb_uri_is_required() {
        let result = ServerConfig::from_lookup(lookup_from(&[]));
        assert!(result.is_err());
    }

    #[test]
    fn test_defaults() {
        let config = ServerConfig::from_lookup(lookup_from(&[("MONGODB_URI", "mongodb://db")])).unwrap();

        assert_eq!(config.port, 3002);
        assert_eq!(config.mongodb_database, "phoenix");
        assert_eq!(config.jwt.access_token_expires_secs, 3600);
        assert_eq!(config.storage.default_bucket, "phoenix-files");
        assert!(config.storage.is_bucket_allowed("phoenix-files"));
        assert!(!config.storage.is_bucket_allowed("other"));
        assert!(config.onfido_webhook_token.is_none());
    }

    #[test]
    fn test_invalid_number_falls_back_to_default() {
        let config = ServerConfig::from_lookup(lookup_from(&[
            ("MONGODB_URI", "mongodb://db"),
            ("PORT", "not-a-port"),
            ("ACCESS_TOKEN_EXPIRES_SECS", "120"),
        ]))
        .unwrap();

        assert_eq!(config.port, 3002);
        assert_eq!(config.jwt.access_token_expires_secs, 120);
    }

    #[test]
    fn test_bucket_list_parsing() {
        let config = ServerConfig::from_lookup(lookup_from(&[
            ("MONGODB_URI", "mongodb://db"),
            ("STORAGE_ALLOWED_BUCKETS", " a , b,,c "),
        ]))
        .unwrap();

        assert_eq!(config.storage.allowed_buckets, vec!["a", "b", "c"]);
        assert!(config.storage.is_bucket_allowed("b"));
        assert!(config.storage.is_bucket_allowed("phoenix-files"));
    }
}
