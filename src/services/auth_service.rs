use bcrypt::{hash, verify, DEFAULT_COST};
use chrono::{Duration, Utc};
use futures::stream::TryStreamExt;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use mongodb::bson::{doc, oid::ObjectId, DateTime as BsonDateTime};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use uuid::Uuid;

use crate::config::JwtConfig;
use crate::database::MongoDB;
use crate::events::{DeleteUserEvent, PostSignOutEvent, PostSignUpEvent, PreSignUpEvent};
use crate::models::{
    RoleAssignment, RoleName, Session, SessionResponse, User, UserProfile, SESSIONS_COLLECTION,
    USERS_COLLECTION,
};
use crate::state::AppContext;
use crate::utils::error::{AppError, AppResult};
use crate::utils::validators::{parse_object_id, validate_email, validate_password};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenType {
    Access,
    Refresh,
}

// JWT Claims
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    pub sub: String, // user id
    pub email: String,
    pub roles: Vec<String>,
    pub token_type: TokenType,
    pub iat: usize,
    pub exp: usize,
    pub jti: String,
    pub aud: String,
    pub iss: String,
}

#[derive(Debug, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SignUpRequest {
    pub email: String,
    pub password: String,
    pub display_name: Option<String>,
    pub language: Option<String>,
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SignUpResponse {
    pub uid: String,
}

#[derive(Debug, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SignInRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RefreshTokenRequest {
    pub refresh_token: String,
}

#[derive(Debug, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SignOutRequest {
    pub refresh_token: String,
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AuthResponse {
    pub uid: String,
    pub auth_token: String,
    pub expires_in: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_token_expires_in: Option<i64>,
}

/// Signs a token for `user`. Returns the token and its claims.
pub fn generate_token(config: &JwtConfig, user: &User, token_type: TokenType) -> AppResult<(String, Claims)> {
    let now = Utc::now();
    let lifetime = match token_type {
        TokenType::Access => config.access_token_expires_secs,
        TokenType::Refresh => config.refresh_token_expires_secs,
    };

    let claims = Claims {
        sub: user.id_hex(),
        email: user.email.clone(),
        roles: user.role_ids(),
        token_type,
        iat: now.timestamp() as usize,
        exp: (now + Duration::seconds(lifetime)).timestamp() as usize,
        jti: Uuid::new_v4().to_string(),
        aud: config.audience.clone(),
        iss: config.issuer.clone(),
    };

    let token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(config.secret.as_ref()),
    )?;
    Ok((token, claims))
}

/// Verifies signature, expiry, audience, issuer and the token type.
pub fn verify_token(config: &JwtConfig, token: &str, expected: TokenType) -> AppResult<Claims> {
    decode_token(config, token, expected, true)
}

/// Like `verify_token` but accepts an expired refresh token, so it can
/// still end the session it belongs to.
pub fn verify_refresh_token_for_sign_out(config: &JwtConfig, token: &str) -> AppResult<Claims> {
    decode_token(config, token, TokenType::Refresh, false)
}

fn decode_token(config: &JwtConfig, token: &str, expected: TokenType, check_expiry: bool) -> AppResult<Claims> {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.validate_exp = check_expiry;
    validation.set_audience(&[config.audience.as_str()]);

    let mut issuers = HashSet::new();
    issuers.insert(config.issuer.clone());
    validation.iss = Some(issuers);

    let claims = decode::<Claims>(
        token,
        &DecodingKey::from_secret(config.secret.as_ref()),
        &validation,
    )?
    .claims;

    if claims.token_type != expected {
        return Err(AppError::WrongToken);
    }
    Ok(claims)
}

pub async fn get_user(db: &MongoDB, user_id: &str) -> AppResult<User> {
    let oid = parse_object_id(user_id, "userId")?;
    db.collection::<User>(USERS_COLLECTION)
        .find_one(doc! { "_id": oid })
        .await?
        .ok_or_else(|| AppError::not_found(format!("User {} does not exist", user_id)))
}

/// A freshly signed-up user holds the `User` role on their own record.
fn new_user(id: ObjectId, email: String, password_hash: String, request: &SignUpRequest) -> User {
    let now = BsonDateTime::now();
    User {
        id: Some(id),
        email,
        password_hash,
        display_name: request.display_name.clone(),
        language: request.language.clone(),
        phone_number: None,
        roles: vec![RoleAssignment::for_user(RoleName::USER, &id.to_hex())],
        verification_status: None,
        onfido_applicant_id: None,
        last_sign_in: None,
        create_date_time: now,
        update_date_time: now,
    }
}

pub async fn sign_up(ctx: &AppContext, request: &SignUpRequest) -> AppResult<String> {
    let email = validate_email(&request.email)?;

    ctx.events
        .emit(
            &PreSignUpEvent {
                email: email.clone(),
                display_name: request.display_name.clone(),
            },
            true,
        )
        .await?;

    let collection = ctx.db.collection::<User>(USERS_COLLECTION);
    if collection.find_one(doc! { "email": &email }).await?.is_some() {
        return Err(AppError::UserAlreadyExists);
    }

    validate_password(&request.password)?;
    let password_hash = hash(&request.password, DEFAULT_COST)?;

    let user_id = ObjectId::new();
    let user = new_user(user_id, email.clone(), password_hash, request);
    collection.insert_one(&user).await?;

    let post_event = PostSignUpEvent {
        user_id: user_id.to_hex(),
        email: email.clone(),
    };
    if let Err(e) = ctx.events.emit(&post_event, true).await {
        log::warn!("⚠️  Post sign-up handlers failed, removing user {}: {}", email, e);
        collection.delete_one(doc! { "_id": user_id }).await?;
        return Err(e);
    }

    log::info!("✅ User signed up: {}", email);
    Ok(user_id.to_hex())
}

pub async fn sign_in(
    ctx: &AppContext,
    request: &SignInRequest,
    device_agent: Option<String>,
) -> AppResult<AuthResponse> {
    let email = request.email.trim().to_lowercase();
    let users = ctx.db.collection::<User>(USERS_COLLECTION);

    let user = users
        .find_one(doc! { "email": &email })
        .await?
        .ok_or(AppError::InvalidUsernameOrPassword)?;

    if !verify(&request.password, &user.password_hash)? {
        return Err(AppError::InvalidUsernameOrPassword);
    }

    let jwt = &ctx.config.jwt;
    let (auth_token, _) = generate_token(jwt, &user, TokenType::Access)?;
    let (refresh_token, refresh_claims) = generate_token(jwt, &user, TokenType::Refresh)?;

    let session = Session {
        id: None,
        user_id: user.id_hex(),
        refresh_jti: refresh_claims.jti,
        device_agent,
        created_at: BsonDateTime::now(),
        expires_at: BsonDateTime::from_millis(refresh_claims.exp as i64 * 1000),
    };
    ctx.db
        .collection::<Session>(SESSIONS_COLLECTION)
        .insert_one(&session)
        .await?;

    users
        .update_one(
            doc! { "_id": user.id },
            doc! { "$set": { "lastSignIn": BsonDateTime::now() } },
        )
        .await?;

    log::info!("🔐 User signed in: {}", email);

    Ok(AuthResponse {
        uid: user.id_hex(),
        auth_token,
        expires_in: jwt.access_token_expires_secs,
        refresh_token: Some(refresh_token),
        refresh_token_expires_in: Some(jwt.refresh_token_expires_secs),
    })
}

/// True once less than half of the refresh token lifetime is left.
pub fn should_rotate_refresh_token(claims: &Claims, now: i64) -> bool {
    let lifetime = claims.exp as i64 - claims.iat as i64;
    let remaining = claims.exp as i64 - now;
    remaining * 2 < lifetime
}

pub async fn refresh_token(ctx: &AppContext, request: &RefreshTokenRequest) -> AppResult<AuthResponse> {
    let jwt = &ctx.config.jwt;
    let claims = verify_token(jwt, &request.refresh_token, TokenType::Refresh)?;

    let sessions = ctx.db.collection::<Session>(SESSIONS_COLLECTION);
    let session = sessions
        .find_one(doc! { "refreshJti": &claims.jti, "userId": &claims.sub })
        .await?
        .ok_or(AppError::WrongToken)?;

    let user = get_user(&ctx.db, &claims.sub).await?;
    let (auth_token, _) = generate_token(jwt, &user, TokenType::Access)?;

    let mut response = AuthResponse {
        uid: user.id_hex(),
        auth_token,
        expires_in: jwt.access_token_expires_secs,
        refresh_token: None,
        refresh_token_expires_in: None,
    };

    if should_rotate_refresh_token(&claims, Utc::now().timestamp()) {
        let (new_refresh, new_claims) = generate_token(jwt, &user, TokenType::Refresh)?;
        sessions
            .update_one(
                doc! { "_id": session.id },
                doc! { "$set": {
                    "refreshJti": &new_claims.jti,
                    "expiresAt": BsonDateTime::from_millis(new_claims.exp as i64 * 1000),
                } },
            )
            .await?;
        log::info!("🔄 Refresh token rotated for user {}", user.id_hex());
        response.refresh_token = Some(new_refresh);
        response.refresh_token_expires_in = Some(jwt.refresh_token_expires_secs);
    }

    Ok(response)
}

pub async fn sign_out(ctx: &AppContext, user_id: &str, refresh_token: &str) -> AppResult<()> {
    let claims = verify_refresh_token_for_sign_out(&ctx.config.jwt, refresh_token)?;
    if claims.sub != user_id {
        return Err(AppError::permission_denied());
    }

    let sessions = ctx.db.collection::<Session>(SESSIONS_COLLECTION);
    let session = sessions
        .find_one_and_delete(doc! { "refreshJti": &claims.jti, "userId": user_id })
        .await?
        .ok_or(AppError::UserAlreadySignedOut)?;

    ctx.events
        .emit(
            &PostSignOutEvent {
                user_id: user_id.to_string(),
                device_agent: session.device_agent,
            },
            false,
        )
        .await?;

    log::info!("👋 User signed out: {}", user_id);
    Ok(())
}

pub async fn auth_profile(db: &MongoDB, user_id: &str) -> AppResult<UserProfile> {
    Ok(UserProfile::from(get_user(db, user_id).await?))
}

pub async fn retrieve_sessions(db: &MongoDB, user_id: &str) -> AppResult<Vec<SessionResponse>> {
    let now = BsonDateTime::now();
    let sessions: Vec<Session> = db
        .collection::<Session>(SESSIONS_COLLECTION)
        .find(doc! { "userId": user_id, "expiresAt": { "$gt": now } })
        .sort(doc! { "createdAt": -1 })
        .await?
        .try_collect()
        .await?;

    Ok(sessions.into_iter().map(SessionResponse::from).collect())
}

pub async fn delete_user(ctx: &AppContext, user_id: &str) -> AppResult<()> {
    let oid: ObjectId = parse_object_id(user_id, "userId")?;
    get_user(&ctx.db, user_id).await?;

    ctx.events
        .emit(
            &DeleteUserEvent {
                user_id: user_id.to_string(),
            },
            true,
        )
        .await?;

    ctx.db
        .collection::<Session>(SESSIONS_COLLECTION)
        .delete_many(doc! { "userId": user_id })
        .await?;
    ctx.db
        .collection::<User>(USERS_COLLECTION)
        .delete_one(doc! { "_id": oid })
        .await?;

    log::info!("🗑️  User deleted: {}", user_id);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::test_config;
    use crate::models::user::test_user;

    #[test]
    fn test_access_token_roundtrip() {
        let config = test_config();
        let user = test_user(vec![]);

        let (token, issued) = generate_token(&config.jwt, &user, TokenType::Access).unwrap();
        let claims = verify_token(&config.jwt, &token, TokenType::Access).unwrap();

        assert_eq!(claims.sub, user.id_hex());
        assert_eq!(claims.jti, issued.jti);
        assert_eq!(claims.roles, vec!["User"]);
        assert_eq!(claims.aud, "phoenix-api");
    }

    #[test]
    fn test_refresh_token_rejected_as_access_token() {
        let config = test_config();
        let (token, _) = generate_token(&config.jwt, &test_user(vec![]), TokenType::Refresh).unwrap();

        let result = verify_token(&config.jwt, &token, TokenType::Access);
        assert!(matches!(result, Err(AppError::WrongToken)));
    }

    #[test]
    fn test_expired_token() {
        let mut config = test_config();
        config.jwt.access_token_expires_secs = -3600;
        let (token, _) = generate_token(&config.jwt, &test_user(vec![]), TokenType::Access).unwrap();

        let result = verify_token(&config.jwt, &token, TokenType::Access);
        assert!(matches!(result, Err(AppError::TokenExpired)));
    }

    #[test]
    fn test_tampered_secret_is_wrong_token() {
        let config = test_config();
        let (token, _) = generate_token(&config.jwt, &test_user(vec![]), TokenType::Access).unwrap();

        let mut other = config.jwt.clone();
        other.secret = "another-secret".to_string();
        assert!(matches!(
            verify_token(&other, &token, TokenType::Access),
            Err(AppError::WrongToken)
        ));
    }

    #[test]
    fn test_refresh_rotation_threshold() {
        let claims = Claims {
            sub: "u".into(),
            email: "e".into(),
            roles: vec![],
            token_type: TokenType::Refresh,
            iat: 1_000,
            exp: 2_000,
            jti: "j".into(),
            aud: "a".into(),
            iss: "i".into(),
        };

        assert!(!should_rotate_refresh_token(&claims, 1_400));
        assert!(!should_rotate_refresh_token(&claims, 1_500));
        assert!(should_rotate_refresh_token(&claims, 1_501));
    }

    #[test]
    fn test_expired_refresh_token_still_identifies_its_session() {
        let mut config = test_config();
        config.jwt.refresh_token_expires_secs = -3600;
        let user = test_user(vec![]);
        let (token, issued) = generate_token(&config.jwt, &user, TokenType::Refresh).unwrap();

        assert!(matches!(
            verify_token(&config.jwt, &token, TokenType::Refresh),
            Err(AppError::TokenExpired)
        ));
        let claims = verify_refresh_token_for_sign_out(&config.jwt, &token).unwrap();
        assert_eq!(claims.jti, issued.jti);
        assert_eq!(claims.sub, user.id_hex());

        let (access, _) = generate_token(&config.jwt, &user, TokenType::Access).unwrap();
        assert!(matches!(
            verify_refresh_token_for_sign_out(&config.jwt, &access),
            Err(AppError::WrongToken)
        ));
    }

    #[test]
    fn test_new_user_holds_user_role_on_own_record() {
        let id = ObjectId::new();
        let request = SignUpRequest {
            email: "new@example.com".to_string(),
            password: "Secret123".to_string(),
            display_name: None,
            language: Some("en".to_string()),
        };
        let user = new_user(id, "new@example.com".to_string(), "hash".to_string(), &request);

        assert_eq!(user.id, Some(id));
        assert_eq!(user.roles, vec![RoleAssignment::for_user(RoleName::USER, &id.to_hex())]);
        assert_eq!(user.role_ids(), vec!["User"]);
        assert!(user.deployment_ids().is_empty());
        assert!(user.verification_status.is_none());
    }
}
