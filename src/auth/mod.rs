//! Account flows: registration, login, identity resolution and password change.
//!
//! Flow Overview:
//! 1) Emails are normalized (trim + lowercase) before every lookup and insert.
//! 2) Passwords are checked against [`policy::check_password`] and stored as Argon2id hashes.
//! 3) Login issues a bearer token whose subject is the normalized email.
//! 4) Every protected operation calls [`resolve_identity`]: token -> subject is
//!    pure ([`token::TokenSigner::resolve`]), subject -> user is a repository lookup.
//!
//! Credential failures are uniform: an unknown email and a wrong password both
//! return [`Error::Unauthorized`].

pub mod password;
pub mod policy;
pub mod token;

use anyhow::Context;
use secrecy::SecretString;
use tracing::{debug, info, instrument};

use crate::{
    error::{Error, FieldError, Result},
    store::{StoreError, User, UserRepository},
};

pub use token::TokenSigner;

const DEFAULT_TOKEN_TTL_MINUTES: i64 = 60;

#[derive(Clone, Debug)]
pub struct AuthConfig {
    token_ttl_minutes: i64,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            token_ttl_minutes: DEFAULT_TOKEN_TTL_MINUTES,
        }
    }
}

impl AuthConfig {
    #[must_use]
    pub fn with_token_ttl_minutes(mut self, minutes: i64) -> Self {
        self.token_ttl_minutes = minutes;
        self
    }

    #[must_use]
    pub fn token_ttl_minutes(&self) -> i64 {
        self.token_ttl_minutes
    }
}

/// Token signer plus the settings the flows need.
#[derive(Debug)]
pub struct AuthState {
    config: AuthConfig,
    tokens: TokenSigner,
}

impl AuthState {
    #[must_use]
    pub fn new(config: AuthConfig, secret_key: SecretString) -> Self {
        Self {
            config,
            tokens: TokenSigner::new(secret_key),
        }
    }

    #[must_use]
    pub fn config(&self) -> &AuthConfig {
        &self.config
    }

    #[must_use]
    pub fn tokens(&self) -> &TokenSigner {
        &self.tokens
    }
}

async fn hash_blocking(password: &str) -> Result<String> {
    let password = password.to_string();
    let hashed = tokio::task::spawn_blocking(move || password::hash(&password))
        .await
        .context("password hashing task failed")??;
    Ok(hashed)
}

async fn verify_blocking(password: &str, hashed: &str) -> Result<bool> {
    let password = password.to_string();
    let hashed = hashed.to_string();
    let matches = tokio::task::spawn_blocking(move || password::verify(&password, &hashed))
        .await
        .context("password verification task failed")?;
    Ok(matches)
}

/// Create an account. Returns the stored user.
///
/// # Errors
/// - [`Error::Validation`] for a malformed email or weak password (all failing fields reported).
/// - [`Error::Conflict`] if the normalized email is already registered.
#[instrument(skip(users, password))]
pub async fn register(users: &dyn UserRepository, email: &str, password: &str) -> Result<User> {
    let email = policy::normalize_email(email);

    let mut problems = Vec::new();
    if let Err(message) = policy::check_email(&email) {
        problems.push(FieldError::new("email", message));
    }
    if let Err(message) = policy::check_password(password) {
        problems.push(FieldError::new("password", message));
    }
    if !problems.is_empty() {
        return Err(Error::Validation(problems));
    }

    if users.find_by_email(&email).await?.is_some() {
        return Err(Error::Conflict("Email already registered"));
    }

    let hashed = hash_blocking(password).await?;

    // The unique constraint still decides when two registrations race.
    let user = match users.insert(&email, &hashed).await {
        Ok(user) => user,
        Err(StoreError::Duplicate) => return Err(Error::Conflict("Email already registered")),
        Err(err) => return Err(err.into()),
    };

    info!(user_id = user.id, "user registered");

    Ok(user)
}

/// Check credentials and issue a bearer token.
///
/// # Errors
/// Returns [`Error::Unauthorized`] for an unknown email or wrong password.
#[instrument(skip(auth, users, password))]
pub async fn login(
    auth: &AuthState,
    users: &dyn UserRepository,
    username: &str,
    password: &str,
) -> Result<String> {
    let email = policy::normalize_email(username);

    let Some(user) = users.find_by_email(&email).await? else {
        debug!("login for unknown email");
        return Err(Error::Unauthorized);
    };

    if !verify_blocking(password, &user.hashed_password).await? {
        debug!(user_id = user.id, "login with wrong password");
        return Err(Error::Unauthorized);
    }

    let token = auth
        .tokens()
        .issue(&user.email, auth.config().token_ttl_minutes())
        .context("failed to issue access token")?;

    Ok(token)
}

/// Resolve a bearer token to the user it was issued for.
///
/// # Errors
/// Returns [`Error::Unauthorized`] if the token is invalid or expired, or its
/// subject no longer matches a user.
#[instrument(skip_all)]
pub async fn resolve_identity(
    auth: &AuthState,
    users: &dyn UserRepository,
    token: &str,
) -> Result<User> {
    let subject = auth.tokens().resolve(token).map_err(|err| {
        debug!("rejected bearer token: {err}");
        Error::Unauthorized
    })?;

    users
        .find_by_email(&subject)
        .await?
        .ok_or(Error::Unauthorized)
}

/// Replace the password of an already-resolved user.
///
/// # Errors
/// - [`Error::Validation`] if the new password is weak.
/// - [`Error::BadRequest`] if `old_password` does not match.
#[instrument(skip(users, user, old_password, new_password), fields(user_id = user.id))]
pub async fn change_password(
    users: &dyn UserRepository,
    user: &User,
    old_password: &str,
    new_password: &str,
) -> Result<()> {
    if let Err(message) = policy::check_password(new_password) {
        return Err(Error::field("new_password", message));
    }

    if !verify_blocking(old_password, &user.hashed_password).await? {
        return Err(Error::BadRequest("Old password is incorrect"));
    }

    let hashed = hash_blocking(new_password).await?;
    if !users.update_password(user.id, &hashed).await? {
        return Err(Error::Unauthorized);
    }

    info!("password changed");

    Ok(())
}
