use lazy_static::lazy_static;
use mongodb::bson::oid::ObjectId;
use regex::Regex;

use crate::utils::error::{AppError, AppResult};

lazy_static! {
    static ref EMAIL_RE: Regex =
        Regex::new(r"^[A-Za-z0-9._%+\-]+@[A-Za-z0-9.\-]+\.[A-Za-z]{2,}$").expect("valid regex");
}

pub const DEFAULT_PAGE_LIMIT: i64 = 20;
pub const MAX_PAGE_LIMIT: i64 = 100;

pub fn parse_object_id(value: &str, field: &str) -> AppResult<ObjectId> {
    ObjectId::parse_str(value)
        .map_err(|_| AppError::invalid_request(format!("Invalid {}: {}", field, value)))
}

pub fn validate_object_id(value: &str, field: &str) -> AppResult<()> {
    parse_object_id(value, field).map(|_| ())
}

pub fn validate_email(email: &str) -> AppResult<String> {
    let email = email.trim().to_lowercase();
    if !EMAIL_RE.is_match(&email) {
        return Err(AppError::invalid_request(format!("Invalid email: {}", email)));
    }
    Ok(email)
}

/// At least 8 characters with upper case, lower case and a digit.
pub fn validate_password(password: &str) -> AppResult<()> {
    let long_enough = password.chars().count() >= 8;
    let has_upper = password.chars().any(|c| c.is_ascii_uppercase());
    let has_lower = password.chars().any(|c| c.is_ascii_lowercase());
    let has_digit = password.chars().any(|c| c.is_ascii_digit());

    if long_enough && has_upper && has_lower && has_digit {
        Ok(())
    } else {
        Err(AppError::invalid_request(
            "Password must be at least 8 characters long and contain upper case, lower case and digits",
        ))
    }
}

pub fn validate_entity_name(name: &str, max_len: usize) -> AppResult<String> {
    let name = name.trim();
    if name.is_empty() || name.chars().count() > max_len {
        return Err(AppError::invalid_request(format!(
            "Name must be between 1 and {} characters",
            max_len
        )));
    }
    Ok(name.to_string())
}

/// Rejects object names that could escape their bucket.
pub fn sanitize_object_name(name: &str) -> AppResult<String> {
    let invalid = name.is_empty()
        || name.starts_with('/')
        || name.contains('\\')
        || name.contains('\0')
        || name.split('/').any(|segment| segment.is_empty() || segment == "." || segment == "..");

    if invalid {
        return Err(AppError::invalid_request(format!("Invalid file name: {}", name)));
    }
    Ok(name.to_string())
}

pub fn clamp_limit(limit: Option<i64>) -> i64 {
    limit.unwrap_or(DEFAULT_PAGE_LIMIT).clamp(1, MAX_PAGE_LIMIT)
}

pub fn clamp_skip(skip: Option<u64>) -> u64 {
    skip.unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_email() {
        assert_eq!(validate_email(" John@Example.com ").unwrap(), "john@example.com");
        assert!(validate_email("not-an-email").is_err());
        assert!(validate_email("a@b").is_err());
    }

    #[test]
    fn test_validate_password() {
        assert!(validate_password("Passw0rdStrong").is_ok());
        assert!(validate_password("short1A").is_err());
        assert!(validate_password("alllowercase1").is_err());
        assert!(validate_password("NoDigitsHere").is_err());
    }

    #[test]
    fn test_sanitize_object_name() {
        assert!(sanitize_object_name("reports/2024/summary.pdf").is_ok());
        assert!(sanitize_object_name("../etc/passwd").is_err());
        assert!(sanitize_object_name("/absolute.txt").is_err());
        assert!(sanitize_object_name("a//b.txt").is_err());
        assert!(sanitize_object_name("").is_err());
    }

    #[test]
    fn test_clamp_limit() {
        assert_eq!(clamp_limit(None), 20);
        assert_eq!(clamp_limit(Some(0)), 1);
        assert_eq!(clamp_limit(Some(500)), 100);
        assert_eq!(clamp_limit(Some(42)), 42);
    }

    #[test]
    fn test_parse_object_id() {
        assert!(parse_object_id("5e8f0c74b50aa9656c34789c", "userId").is_ok());
        assert!(matches!(
            parse_object_id("nope", "userId"),
            Err(AppError::InvalidRequest(_))
        ));
    }
}
