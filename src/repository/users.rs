use secrecy::ExposeSecret;
use secrecy::Secret;
use sqlx::PgPool;
use uuid::Uuid;

#[derive(thiserror::Error, Debug)]
pub enum UserRepoError {
    #[error("a user with this email already exists")]
    DuplicateEmail,
    #[error(transparent)]
    Other(#[from] sqlx::Error),
}

fn is_unique_violation(e: &sqlx::Error) -> bool {
    matches!(e, sqlx::Error::Database(db_err) if db_err.is_unique_violation())
}

#[derive(Clone)]
pub struct UserRepository {
    pool: PgPool,
}

impl UserRepository {
    pub fn new(pool: PgPool) -> Self { Self { pool } }

    /// Registers a new user. `email` must already be lowercased and
    /// `hashed_password` an Argon2id PHC string — both are the caller's
    /// responsibility (see `authentication::hash_password`).
    pub async fn create(&self, email: &str, hashed_password: &Secret<String>) -> Result<Uuid, UserRepoError> {
        let id = Uuid::new_v4();
        sqlx::query!(
            "INSERT INTO users (id, email, hashed_password, created_at) VALUES ($1, $2, $3, now())",
            id,
            email,
            hashed_password.expose_secret(),
        )
        .execute(&self.pool)
        .await
        .map_err(|e| if is_unique_violation(&e) { UserRepoError::DuplicateEmail } else { UserRepoError::Other(e) })?;
        Ok(id)
    }
}
