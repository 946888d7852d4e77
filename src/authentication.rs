use anyhow::Context;
use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::SaltString;
use argon2::Algorithm;
use argon2::Argon2;
use argon2::Params;
use argon2::PasswordHash;
use argon2::PasswordHasher;
use argon2::PasswordVerifier;
use argon2::Version;
use secrecy::ExposeSecret;
use secrecy::Secret;
use sqlx::PgPool;
use tokio::task::JoinHandle;
use uuid::Uuid;

pub mod jwt;

pub struct Credentials {
    pub email: String,
    pub password: Secret<String>,
}

#[derive(thiserror::Error, Debug)]
pub enum AuthError {
    #[error("Invalid credentials")]
    InvalidCredentials(#[source] anyhow::Error),
    #[error(transparent)]
    UnexpectedError(#[from] anyhow::Error),
}

/// OWASP-recommended Argon2id parameters (19 MiB, 2 iterations, 1 lane).
/// These must match between `hash_password` and the dummy hash used in
/// `validate_credentials`'s user-enumeration guard below.
fn argon2() -> Argon2<'static> {
    Argon2::new(Algorithm::Argon2id, Version::V0x13, Params::new(19456, 2, 1, None).expect("valid argon2 params"))
}

/// Hash a plaintext password into a PHC string, ready for `users.hashed_password`.
/// Always hashes the supplied password, never a literal of the function's own name.
pub fn hash_password(password: Secret<String>) -> Result<Secret<String>, anyhow::Error> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = argon2()
        .hash_password(password.expose_secret().as_bytes(), &salt)
        .map_err(|e| anyhow::anyhow!("failed to hash password: {e}"))?
        .to_string();
    Ok(Secret::new(hash))
}

/// `users.email` is stored lowercased at registration; lookups lowercase the
/// supplied address so comparison is case-insensitive on the email but
/// case-sensitive on the password hash (verified via Argon2's own
/// constant-time comparator, never by string equality).
pub async fn get_stored_credentials(
    email: String,
    pool: &PgPool,
) -> Result<(Uuid, Secret<String>), AuthError> {
    let email = email.trim().to_lowercase();
    let row = sqlx::query!(
        "SELECT id, hashed_password FROM users WHERE email = $1",
        email,
    )
    .fetch_optional(pool)
    .await
    .context("Failed to query db")
    .map_err(AuthError::UnexpectedError)?
    .context("No user with the supplied email was found in users table")
    .map_err(AuthError::InvalidCredentials)?;
    Ok((row.id, Secret::new(row.hashed_password)))
}

/// Note that verification is a CPU-bound operation that is fairly slow (by
/// design).
fn verify_password(
    supplied_password: Secret<String>,
    stored_password: Secret<String>,
) -> Result<(), AuthError> {
    let stored_password = &PasswordHash::new(stored_password.expose_secret())
        .context("Failed to read stored PHC string")
        .map_err(AuthError::UnexpectedError)?;
    Argon2::default()
        .verify_password(supplied_password.expose_secret().as_bytes(), stored_password)
        .context("Invalid password")
        .map_err(AuthError::InvalidCredentials)?;
    Ok(())
}

/// Wrapper for `spawn_blocking` with `tracing`.
pub fn spawn_blocking_with_tracing<F, R>(f: F) -> JoinHandle<R>
where
    F: FnOnce() -> R + Send + 'static,
    R: Send + 'static,
{
    let span = tracing::Span::current();
    tokio::task::spawn_blocking(move || span.in_scope(f))
}

/// Validate supplied credentials (email/password) against the `users` table,
/// returning the user's `Uuid` on success.
#[tracing::instrument(name = "Validating credentials", skip(creds, pool))]
pub async fn validate_credentials(creds: Credentials, pool: &PgPool) -> Result<Uuid, AuthError> {
    let (user_id, stored_password) = match get_stored_credentials(creds.email, pool).await {
        Ok((i, p)) => (i, p),
        // Returning early here would skip the (slow) hash verification, leaking via timing
        // whether the supplied email exists. Fall back to a dummy hash with the same Argon2
        // params so verification still takes the usual amount of time.
        Err(_) => (
            Uuid::new_v4(),
            Secret::new(
                "$argon2id$v=19$m=19456,t=2,p=1\
                $gZiV/M1gPc22ElAH/Jh1Hw\
                $CWOrkoo7oJBQ/iyh7uJ0LO2aLEfrHwTWllSAxT0zRno"
                    .to_string(),
            ),
        ),
    };

    spawn_blocking_with_tracing(move || verify_password(creds.password, stored_password))
        .await
        .context("Failed to spawn blocking thread")
        .map_err(AuthError::UnexpectedError)?
        .context("Invalid password")
        .map_err(AuthError::InvalidCredentials)?;

    Ok(user_id)
}
