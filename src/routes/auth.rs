use actix_web::web;
use actix_web::HttpResponse;
use secrecy::Secret;
use serde::Deserialize;
use serde::Serialize;
use sqlx::PgPool;

use crate::authentication;
use crate::authentication::jwt;
use crate::authentication::AuthError;
use crate::authentication::Credentials;
use crate::configuration::JwtSettings;
use crate::domain::Email;
use crate::error::AppError;
use crate::repository::UserRepoError;
use crate::repository::UserRepository;

#[derive(Deserialize)]
pub struct RegisterRequest {
    pub email: String,
    pub password: Secret<String>,
}

#[derive(Serialize)]
pub struct RegisterResponse {
    pub id: uuid::Uuid,
    pub email: String,
}

#[tracing::instrument(name = "Registering a new user", skip(body, pool))]
pub async fn register(body: web::Json<RegisterRequest>, pool: web::Data<PgPool>) -> Result<HttpResponse, AppError> {
    let email = Email::parse(body.email.clone()).map_err(AppError::BadRequest)?;
    let hashed = authentication::hash_password(body.password.clone()).map_err(AppError::Internal)?;

    let users = UserRepository::new(pool.get_ref().clone());
    let id = users.create(email.as_ref(), &hashed).await.map_err(|e| match e {
        UserRepoError::DuplicateEmail => AppError::Conflict("a user with this email already exists".to_string()),
        UserRepoError::Other(e) => AppError::Internal(e.into()),
    })?;

    Ok(HttpResponse::Created().json(RegisterResponse { id, email: email.into() }))
}

#[derive(Deserialize)]
pub struct TokenRequest {
    pub email: String,
    pub password: Secret<String>,
}

#[derive(Serialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub token_type: &'static str,
}

#[tracing::instrument(name = "Issuing an access token", skip(body, pool, jwt_settings))]
pub async fn token(
    body: web::Json<TokenRequest>,
    pool: web::Data<PgPool>,
    jwt_settings: web::Data<JwtSettings>,
) -> Result<HttpResponse, AppError> {
    let credentials = Credentials { email: body.email.clone(), password: body.password.clone() };

    let user_id = authentication::validate_credentials(credentials, pool.get_ref()).await.map_err(|e| match e {
        AuthError::InvalidCredentials(_) => AppError::Unauthorized,
        AuthError::UnexpectedError(e) => AppError::Internal(e),
    })?;

    let access_token = jwt::create_access_token(user_id, &jwt_settings.secret, jwt_settings.algorithm(), jwt_settings.access_ttl_seconds)
        .map_err(AppError::Internal)?;

    Ok(HttpResponse::Ok().json(TokenResponse { access_token, token_type: "bearer" }))
}
