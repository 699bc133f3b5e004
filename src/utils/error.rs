use actix_web::{http::StatusCode, HttpResponse, ResponseError};
use serde::Serialize;
use thiserror::Error;

/// Numeric error codes returned in every error body.
pub struct ErrorCodes;

impl ErrorCodes {
    pub const TOKEN_EXPIRED: u32 = 10001;
    pub const WRONG_TOKEN: u32 = 10002;
    pub const INVALID_REQUEST: u32 = 100003;
    pub const FORBIDDEN_ID: u32 = 100004;
    pub const UNAUTHORIZED: u32 = 100006;
    pub const BUCKET_NOT_ALLOWED: u32 = 100007;
    pub const BUCKET_OR_FILE_DOES_NOT_EXIST: u32 = 100008;
    pub const DUPLICATED_USER_ID: u32 = 100010;
    pub const INVALID_USERNAME_OR_PASSWORD: u32 = 100012;
    pub const USER_ALREADY_SIGNED_OUT: u32 = 100014;
    pub const INVALID_ROLE_ID: u32 = 100034;
    pub const ID_VERIFICATION_IN_PROGRESS: u32 = 100040;
    pub const ID_VERIFICATION_NEEDED: u32 = 100041;
    pub const ID_VERIFICATION_FAILED: u32 = 100042;
    pub const INVALID_MODULE_CONFIG_BODY: u32 = 100044;
    pub const ROLE_DOES_NOT_EXIST: u32 = 100046;
    pub const INTERNAL_SERVER_ERROR: u32 = 13001;

    // extensions
    pub const NOT_ALL_REQUIRED_QUESTIONS_ANSWERED: u32 = 300002;
    pub const OBJECT_DOES_NOT_EXIST: u32 = 300012;
    pub const DUPLICATE_ROLE_NAME: u32 = 300016;
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error("{0}")]
    InvalidRequest(String),

    #[error("{0}")]
    Unauthorized(String),

    #[error("Token expired")]
    TokenExpired,

    #[error("Wrong Token")]
    WrongToken,

    #[error("{0}")]
    PermissionDenied(String),

    #[error("Invalid Username or Password")]
    InvalidUsernameOrPassword,

    #[error("User already exists")]
    UserAlreadyExists,

    #[error("User is already signed out")]
    UserAlreadySignedOut,

    #[error("{0}")]
    BucketNotAllowed(String),

    #[error("Bucket or file does not exist")]
    BucketFileDoesNotExist,

    #[error("Role does not exist")]
    RoleDoesNotExist,

    #[error("{0}")]
    InvalidRole(String),

    #[error("Identity verification is required")]
    IdVerificationNeeded,

    #[error("Identity verification is in progress")]
    IdVerificationInProgress,

    #[error("Identity verification failed")]
    IdVerificationFailed,

    #[error("{0}")]
    InvalidModuleConfigBody(String),

    #[error("{0}")]
    NotAllRequiredQuestionsAnswered(String),

    #[error("{0}")]
    ObjectDoesNotExist(String),

    #[error("Role with the same name already exists")]
    DuplicateRoleName,

    #[error("Database error: {0}")]
    Database(String),

    #[error("{0}")]
    Internal(String),
}

impl AppError {
    pub fn code(&self) -> u32 {
        match self {
            AppError::InvalidRequest(_) => ErrorCodes::INVALID_REQUEST,
            AppError::Unauthorized(_) => ErrorCodes::UNAUTHORIZED,
            AppError::TokenExpired => ErrorCodes::TOKEN_EXPIRED,
            AppError::WrongToken => ErrorCodes::WRONG_TOKEN,
            AppError::PermissionDenied(_) => ErrorCodes::FORBIDDEN_ID,
            AppError::InvalidUsernameOrPassword => ErrorCodes::INVALID_USERNAME_OR_PASSWORD,
            AppError::UserAlreadyExists => ErrorCodes::DUPLICATED_USER_ID,
            AppError::UserAlreadySignedOut => ErrorCodes::USER_ALREADY_SIGNED_OUT,
            AppError::BucketNotAllowed(_) => ErrorCodes::BUCKET_NOT_ALLOWED,
            AppError::BucketFileDoesNotExist => ErrorCodes::BUCKET_OR_FILE_DOES_NOT_EXIST,
            AppError::RoleDoesNotExist => ErrorCodes::ROLE_DOES_NOT_EXIST,
            AppError::InvalidRole(_) => ErrorCodes::INVALID_ROLE_ID,
            AppError::IdVerificationNeeded => ErrorCodes::ID_VERIFICATION_NEEDED,
            AppError::IdVerificationInProgress => ErrorCodes::ID_VERIFICATION_IN_PROGRESS,
            AppError::IdVerificationFailed => ErrorCodes::ID_VERIFICATION_FAILED,
            AppError::InvalidModuleConfigBody(_) => ErrorCodes::INVALID_MODULE_CONFIG_BODY,
            AppError::NotAllRequiredQuestionsAnswered(_) => {
                ErrorCodes::NOT_ALL_REQUIRED_QUESTIONS_ANSWERED
            }
            AppError::ObjectDoesNotExist(_) => ErrorCodes::OBJECT_DOES_NOT_EXIST,
            AppError::DuplicateRoleName => ErrorCodes::DUPLICATE_ROLE_NAME,
            AppError::Database(_) | AppError::Internal(_) => ErrorCodes::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn invalid_request(msg: impl Into<String>) -> Self {
        AppError::InvalidRequest(msg.into())
    }

    pub fn permission_denied() -> Self {
        AppError::PermissionDenied("Action not allowed for current user.".to_string())
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        AppError::ObjectDoesNotExist(what.into())
    }
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub code: u32,
    pub message: String,
}

impl ResponseError for AppError {
    fn status_code(&self) -> StatusCode {
        match self {
            AppError::InvalidRequest(_)
            | AppError::UserAlreadyExists
            | AppError::BucketNotAllowed(_)
            | AppError::InvalidRole(_)
            | AppError::InvalidModuleConfigBody(_)
            | AppError::NotAllRequiredQuestionsAnswered(_)
            | AppError::DuplicateRoleName => StatusCode::BAD_REQUEST,
            AppError::Unauthorized(_) | AppError::TokenExpired | AppError::WrongToken => {
                StatusCode::UNAUTHORIZED
            }
            AppError::PermissionDenied(_)
            | AppError::InvalidUsernameOrPassword
            | AppError::UserAlreadySignedOut => StatusCode::FORBIDDEN,
            AppError::BucketFileDoesNotExist
            | AppError::RoleDoesNotExist
            | AppError::ObjectDoesNotExist(_) => StatusCode::NOT_FOUND,
            AppError::IdVerificationNeeded
            | AppError::IdVerificationInProgress
            | AppError::IdVerificationFailed => StatusCode::PRECONDITION_REQUIRED,
            AppError::Database(_) | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let status = self.status_code();
        if status.is_server_error() {
            log::error!("❌ {} (code {})", self, self.code());
        } else {
            log::warn!("⚠️  {} (code {})", self, self.code());
        }
        crate::api::metrics::increment_error_count();

        // Internal details never leave the server
        let message = if status.is_server_error() {
            "Internal server error".to_string()
        } else {
            self.to_string()
        };

        HttpResponse::build(status).json(ErrorBody {
            code: self.code(),
            message,
        })
    }
}

impl From<mongodb::error::Error> for AppError {
    fn from(e: mongodb::error::Error) -> Self {
        AppError::Database(e.to_string())
    }
}

impl From<mongodb::bson::ser::Error> for AppError {
    fn from(e: mongodb::bson::ser::Error) -> Self {
        AppError::Internal(format!("Serialization error: {}", e))
    }
}

impl From<mongodb::bson::de::Error> for AppError {
    fn from(e: mongodb::bson::de::Error) -> Self {
        AppError::Internal(format!("Deserialization error: {}", e))
    }
}

impl From<bcrypt::BcryptError> for AppError {
    fn from(e: bcrypt::BcryptError) -> Self {
        AppError::Internal(format!("Password hashing error: {}", e))
    }
}

impl From<jsonwebtoken::errors::Error> for AppError {
    fn from(e: jsonwebtoken::errors::Error) -> Self {
        match e.kind() {
            jsonwebtoken::errors::ErrorKind::ExpiredSignature => AppError::TokenExpired,
            _ => AppError::WrongToken,
        }
    }
}

impl From<std::io::Error> for AppError {
    fn from(e: std::io::Error) -> Self {
        AppError::Internal(format!("IO error: {}", e))
    }
}

pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::body::to_bytes;

    #[test]
    fn test_status_and_code_mapping() {
        let cases = vec![
            (AppError::invalid_request("bad"), 400, 100003),
            (AppError::TokenExpired, 401, 10001),
            (AppError::permission_denied(), 403, 100004),
            (AppError::InvalidUsernameOrPassword, 403, 100012),
            (AppError::BucketFileDoesNotExist, 404, 100008),
            (AppError::IdVerificationInProgress, 428, 100040),
            (AppError::Database("boom".into()), 500, 13001),
        ];

        for (error, status, code) in cases {
            assert_eq!(error.status_code().as_u16(), status, "{:?}", error);
            assert_eq!(error.code(), code, "{:?}", error);
        }
    }

    #[actix_web::test]
    async fn test_error_body_hides_internal_details() {
        let response = AppError::Database("connection refused".into()).error_response();
        let body = to_bytes(response.into_body()).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();

        assert_eq!(json["code"], 13001);
        assert_eq!(json["message"], "Internal server error");
    }

    #[actix_web::test]
    async fn test_error_body_keeps_client_message() {
        let response = AppError::invalid_request("Text is too long").error_response();
        let body = to_bytes(response.into_body()).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();

        assert_eq!(json["code"], 100003);
        assert_eq!(json["message"], "Text is too long");
    }

    #[test]
    fn test_expired_jwt_maps_to_token_expired() {
        let error: jsonwebtoken::errors::Error =
            jsonwebtoken::errors::ErrorKind::ExpiredSignature.into();
        assert!(matches!(AppError::from(error), AppError::TokenExpired));

        let error: jsonwebtoken::errors::Error =
            jsonwebtoken::errors::ErrorKind::InvalidSignature.into();
        assert!(matches!(AppError::from(error), AppError::WrongToken));
    }
}
