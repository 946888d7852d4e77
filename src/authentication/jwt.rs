use std::ops::Deref;

use actix_web::body::MessageBody;
use actix_web::dev::ServiceRequest;
use actix_web::dev::ServiceResponse;
use actix_web::http::header;
use actix_web::web;
use actix_web::HttpMessage;
use actix_web_lab::middleware::Next;
use chrono::Duration;
use chrono::Utc;
use secrecy::ExposeSecret;
use secrecy::Secret;
use serde::Deserialize;
use serde::Serialize;
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::AppError;

/// The id of the authenticated caller, inserted into request extensions by
/// `authenticate` and extracted by protected handlers.
#[derive(Clone, Copy)]
pub struct CurrentUserId(Uuid);

impl Deref for CurrentUserId {
    type Target = Uuid;
    fn deref(&self) -> &Self::Target { &self.0 }
}

#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    /// Subject: the authenticated user's id.
    sub: Uuid,
    iat: i64,
    exp: i64,
}

/// Mint a bearer token for `user_id`, signed with `secret` under `alg`,
/// valid for `ttl_seconds` from now.
pub fn create_access_token(
    user_id: Uuid,
    secret: &Secret<String>,
    alg: jsonwebtoken::Algorithm,
    ttl_seconds: i64,
) -> Result<String, anyhow::Error> {
    let now = Utc::now();
    let claims = Claims {
        sub: user_id,
        iat: now.timestamp(),
        exp: (now + Duration::seconds(ttl_seconds)).timestamp(),
    };
    let header = jsonwebtoken::Header::new(alg);
    let key = jsonwebtoken::EncodingKey::from_secret(secret.expose_secret().as_bytes());
    jsonwebtoken::encode(&header, &claims, &key).map_err(|e| anyhow::anyhow!("failed to sign token: {e}"))
}

fn decode_token(
    token: &str,
    secret: &Secret<String>,
    alg: jsonwebtoken::Algorithm,
) -> Result<Uuid, AppError> {
    let key = jsonwebtoken::DecodingKey::from_secret(secret.expose_secret().as_bytes());
    let validation = jsonwebtoken::Validation::new(alg);
    let data = jsonwebtoken::decode::<Claims>(token, &key, &validation).map_err(|_| AppError::Unauthorized)?;
    Ok(data.claims.sub)
}

/// `actix_web_lab::middleware::from_fn` guard: decodes the bearer token,
/// verifies its signature and expiry, and confirms the subject still exists
/// in `users` (a token for a deleted user is indistinguishable from a bad
/// token — both are 401). On success, stashes a `CurrentUserId` in request
/// extensions for handlers to pull out with `web::ReqData`.
pub async fn authenticate(
    req: ServiceRequest,
    next: Next<impl MessageBody>,
) -> Result<ServiceResponse<impl MessageBody>, actix_web::Error> {
    let settings = req
        .app_data::<web::Data<crate::configuration::JwtSettings>>()
        .expect("JwtSettings must be registered as app_data")
        .clone();
    let pool = req
        .app_data::<web::Data<PgPool>>()
        .expect("PgPool must be registered as app_data")
        .clone();

    let token = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .ok_or(AppError::Unauthorized)?;

    let user_id = decode_token(token, &settings.secret, settings.algorithm())?;

    let exists = sqlx::query_scalar!("SELECT EXISTS(SELECT 1 FROM users WHERE id = $1)", user_id)
        .fetch_one(pool.get_ref())
        .await
        .map_err(|e| AppError::Internal(e.into()))?
        .unwrap_or(false);
    if !exists {
        return Err(AppError::Unauthorized.into());
    }

    req.extensions_mut().insert(CurrentUserId(user_id));
    next.call(req).await
}
