//! Registration, login and bearer-token authentication.

mod password;

pub use password::{DEFAULT_ITERATIONS, PasswordHasher, generate_token_key, validate_password};

use chrono::Utc;
use common::UserId;
use serde::Serialize;
use store::{AuthToken, IdentityRepository, NewUser, Store, StoreError, Transaction, User};

use crate::error::{DomainError, FieldErrors};

const REQUIRED: &str = "This field is required.";
const BLANK: &str = "This field may not be blank.";
const MAX_USERNAME_LEN: usize = 150;

/// Public view of a user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UserProfile {
    pub id: UserId,
    pub username: String,
    pub email: String,
}

impl From<User> for UserProfile {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            username: user.username,
            email: user.email,
        }
    }
}

/// Command to register a new account. Absent fields are `None`.
#[derive(Debug, Clone, Default)]
pub struct RegisterUser {
    pub username: Option<String>,
    pub email: Option<String>,
    pub password: Option<String>,
    pub password2: Option<String>,
}

/// Command to log in with a username and password.
#[derive(Debug, Clone, Default)]
pub struct Login {
    pub username: Option<String>,
    pub password: Option<String>,
}

/// Service owning user accounts and their tokens.
#[derive(Clone)]
pub struct IdentityService<S: Store> {
    store: S,
    hasher: PasswordHasher,
}

impl<S: Store> IdentityService<S> {
    pub fn new(store: S, hasher: PasswordHasher) -> Self {
        Self { store, hasher }
    }

    /// Creates a user and its token. Returns the token key.
    ///
    /// All field problems are collected before failing.
    #[tracing::instrument(
        skip(self, cmd),
        fields(username = cmd.username.as_deref().unwrap_or_default())
    )]
    pub async fn register(&self, cmd: RegisterUser) -> Result<String, DomainError> {
        let mut errors = FieldErrors::new();
        let username = required(&mut errors, "username", cmd.username.as_deref());
        let email = required(&mut errors, "email", cmd.email.as_deref());
        let password = required(&mut errors, "password", cmd.password.as_deref());
        let password2 = required(&mut errors, "password2", cmd.password2.as_deref());

        if let Some(username) = username
            && !is_valid_username(username)
        {
            errors.add(
                "username",
                "Enter a valid username. This value may contain only letters, numbers, and @/./+/-/_ characters.",
            );
        }
        if let Some(email) = email
            && !is_valid_email(email)
        {
            errors.add("email", "Enter a valid email address.");
        }
        if let Some(password) = password {
            let problems = validate_password(
                password,
                username.unwrap_or_default(),
                email.unwrap_or_default(),
            );
            if !problems.is_empty() {
                errors.add("password", problems.join(" "));
            }
            if let Some(password2) = password2
                && password != password2
            {
                errors.add("password", "Passwords do not match.");
            }
        }

        {
            let mut tx = self.store.begin().await?;
            if let Some(username) = username
                && tx.find_user_by_username(username).await?.is_some()
            {
                errors.add("username", "This username is already taken.");
            }
            if let Some(email) = email
                && tx.find_user_by_email(email).await?.is_some()
            {
                errors.add("email", "This email address is already registered.");
            }
            tx.commit().await?;
        }

        let (Some(username), Some(email), Some(password)) = (username, email, password) else {
            return Err(errors.into());
        };
        errors.into_result()?;

        let hasher = self.hasher;
        let plain = password.to_string();
        let password_hash = off_executor(move || hasher.hash(&plain)).await?;

        let mut tx = self.store.begin().await?;
        let user = tx
            .insert_user(NewUser {
                username: username.to_string(),
                email: email.to_string(),
                password_hash,
            })
            .await
            .map_err(conflict_to_validation)?;
        let token = tx
            .insert_token(AuthToken {
                key: generate_token_key(),
                user_id: user.id,
                created_at: Utc::now(),
            })
            .await?;
        tx.commit().await?;

        metrics::counter!("users_registered_total").increment(1);
        tracing::info!(user_id = %user.id, "User registered");
        Ok(token.key)
    }

    /// Verifies credentials and returns the user's token, creating it if absent.
    #[tracing::instrument(
        skip(self, cmd),
        fields(username = cmd.username.as_deref().unwrap_or_default())
    )]
    pub async fn login(&self, cmd: Login) -> Result<String, DomainError> {
        let mut errors = FieldErrors::new();
        let username = required(&mut errors, "username", cmd.username.as_deref());
        let password = required(&mut errors, "password", cmd.password.as_deref());
        let (Some(username), Some(password)) = (username, password) else {
            return Err(errors.into());
        };

        let user = {
            let mut tx = self.store.begin().await?;
            let user = tx.find_user_by_username(username).await?;
            tx.commit().await?;
            user
        };

        let verified = match &user {
            Some(user) => {
                let hasher = self.hasher;
                let plain = password.to_string();
                let encoded = user.password_hash.clone();
                off_executor(move || hasher.verify(&plain, &encoded)).await?
            }
            None => false,
        };
        let Some(user) = user.filter(|_| verified) else {
            metrics::counter!("auth_login_failures_total").increment(1);
            tracing::info!("Login failed");
            return Err(DomainError::InvalidCredentials);
        };

        let token = self.token_for(user.id).await?;

        metrics::counter!("auth_logins_total").increment(1);
        Ok(token.key)
    }

    /// Returns the user's token, creating it if absent.
    ///
    /// A concurrent login may create the token first; its token is returned.
    async fn token_for(&self, user_id: UserId) -> Result<AuthToken, DomainError> {
        let mut tx = self.store.begin().await?;
        if let Some(token) = tx.find_token_for_user(user_id).await? {
            tx.commit().await?;
            return Ok(token);
        }

        let inserted = tx
            .insert_token(AuthToken {
                key: generate_token_key(),
                user_id,
                created_at: Utc::now(),
            })
            .await;
        match inserted {
            Ok(token) => {
                tx.commit().await?;
                Ok(token)
            }
            Err(StoreError::Conflict { constraint }) => {
                drop(tx);
                let mut tx = self.store.begin().await?;
                let token = tx
                    .find_token_for_user(user_id)
                    .await?
                    .ok_or(StoreError::Conflict { constraint })?;
                tx.commit().await?;
                Ok(token)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Resolves a token key to its user.
    #[tracing::instrument(skip_all)]
    pub async fn authenticate(&self, key: &str) -> Result<UserProfile, DomainError> {
        if key.is_empty() {
            return Err(DomainError::Unauthenticated);
        }
        let mut tx = self.store.begin().await?;
        let user = tx
            .find_user_by_token(key)
            .await?
            .ok_or(DomainError::Unauthenticated)?;
        tx.commit().await?;
        Ok(user.into())
    }

    /// Returns the profile of an authenticated user.
    #[tracing::instrument(skip(self))]
    pub async fn who_am_i(&self, id: UserId) -> Result<UserProfile, DomainError> {
        let mut tx = self.store.begin().await?;
        let user = tx
            .find_user(id)
            .await?
            .ok_or(DomainError::Unauthenticated)?;
        tx.commit().await?;
        Ok(user.into())
    }
}

/// Runs CPU-bound password work on the blocking thread pool.
async fn off_executor<T, F>(work: F) -> Result<T, DomainError>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    Ok(tokio::task::spawn_blocking(work).await?)
}

fn required<'a>(errors: &mut FieldErrors, field: &str, value: Option<&'a str>) -> Option<&'a str> {
    match value.map(str::trim) {
        None => {
            errors.add(field, REQUIRED);
            None
        }
        Some("") => {
            errors.add(field, BLANK);
            None
        }
        Some(_) => value,
    }
}

/// A concurrent registration may pass the uniqueness checks and still hit
/// the constraint on insert.
fn conflict_to_validation(e: StoreError) -> DomainError {
    match e {
        StoreError::Conflict { constraint } if constraint == "unique_username" => {
            FieldErrors::single("username", "This username is already taken.").into()
        }
        StoreError::Conflict { constraint } if constraint == "unique_email" => {
            FieldErrors::single("email", "This email address is already registered.").into()
        }
        other => other.into(),
    }
}

fn is_valid_username(username: &str) -> bool {
    username.chars().count() <= MAX_USERNAME_LEN
        && username
            .chars()
            .all(|c| c.is_alphanumeric() || matches!(c, '@' | '.' | '+' | '-' | '_'))
}

fn is_valid_email(email: &str) -> bool {
    let Some((local, domain)) = email.rsplit_once('@') else {
        return false;
    };
    !local.is_empty()
        && !email.chars().any(char::is_whitespace)
        && !domain.starts_with('.')
        && !domain.ends_with('.')
        && domain.contains('.')
        && !domain.contains('@')
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use store::{AdminRepository, InMemoryStore, NewRestaurant};

    use super::*;

    fn service() -> IdentityService<InMemoryStore> {
        IdentityService::new(InMemoryStore::new(), PasswordHasher::new(10))
    }

    fn registration(username: &str, email: &str) -> RegisterUser {
        RegisterUser {
            username: Some(username.to_string()),
            email: Some(email.to_string()),
            password: Some("testpassword".to_string()),
            password2: Some("testpassword".to_string()),
        }
    }

    fn login(username: &str, password: &str) -> Login {
        Login {
            username: Some(username.to_string()),
            password: Some(password.to_string()),
        }
    }

    fn field_errors(err: DomainError) -> FieldErrors {
        match err {
            DomainError::Validation(errors) => errors,
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_register_then_login_returns_same_token() {
        let identity = service();
        let registered = identity
            .register(registration("testuser", "test@example.com"))
            .await
            .unwrap();
        assert_eq!(registered.len(), 40);

        let logged_in = identity.login(login("testuser", "testpassword")).await.unwrap();
        assert_eq!(registered, logged_in);

        let profile = identity.authenticate(&logged_in).await.unwrap();
        assert_eq!(profile.username, "testuser");
        assert_eq!(profile.email, "test@example.com");
        assert_eq!(identity.who_am_i(profile.id).await.unwrap(), profile);
    }

    #[tokio::test]
    async fn test_login_proceeds_while_a_writer_is_open() {
        let store = InMemoryStore::new();
        let identity = IdentityService::new(store.clone(), PasswordHasher::new(10));
        let registered = identity
            .register(registration("testuser", "test@example.com"))
            .await
            .unwrap();

        let mut writer = store.begin().await.unwrap();
        writer
            .insert_restaurant(NewRestaurant::new("Luigi's", "1 Main St"))
            .await
            .unwrap();

        let logged_in = tokio::time::timeout(
            Duration::from_secs(1),
            identity.login(login("testuser", "testpassword")),
        )
        .await
        .expect("login waited on an unrelated writer")
        .unwrap();
        assert_eq!(logged_in, registered);

        writer.commit().await.unwrap();
    }

    #[tokio::test]
    async fn test_concurrent_first_logins_share_a_token() {
        let store = InMemoryStore::new();
        let hasher = PasswordHasher::new(10);
        let identity = IdentityService::new(store.clone(), hasher);

        let mut tx = store.begin().await.unwrap();
        tx.insert_user(NewUser {
            username: "testuser".to_string(),
            email: "test@example.com".to_string(),
            password_hash: hasher.hash("testpassword"),
        })
        .await
        .unwrap();
        tx.commit().await.unwrap();

        let (first, second) = tokio::join!(
            identity.login(login("testuser", "testpassword")),
            identity.login(login("testuser", "testpassword")),
        );
        assert_eq!(first.unwrap(), second.unwrap());
    }

    #[tokio::test]
    async fn test_register_rejects_duplicates() {
        let identity = service();
        identity
            .register(registration("testuser", "test@example.com"))
            .await
            .unwrap();

        let errors = field_errors(
            identity
                .register(registration("testuser", "test@example.com"))
                .await
                .unwrap_err(),
        );
        assert_eq!(errors.get("username"), Some("This username is already taken."));
        assert_eq!(
            errors.get("email"),
            Some("This email address is already registered.")
        );
    }

    #[tokio::test]
    async fn test_register_collects_field_errors() {
        let identity = service();
        let errors = field_errors(
            identity
                .register(RegisterUser {
                    username: Some("   ".to_string()),
                    email: Some("not-an-email".to_string()),
                    password: Some("short".to_string()),
                    password2: None,
                })
                .await
                .unwrap_err(),
        );
        assert_eq!(errors.get("username"), Some(BLANK));
        assert_eq!(errors.get("email"), Some("Enter a valid email address."));
        assert_eq!(
            errors.get("password"),
            Some("This password is too short. It must contain at least 8 characters.")
        );
        assert_eq!(errors.get("password2"), Some(REQUIRED));
    }

    #[tokio::test]
    async fn test_register_rejects_mismatched_passwords() {
        let identity = service();
        let mut cmd = registration("testuser", "test@example.com");
        cmd.password2 = Some("different-password".to_string());
        let errors = field_errors(identity.register(cmd).await.unwrap_err());
        assert_eq!(errors.get("password"), Some("Passwords do not match."));
    }

    #[tokio::test]
    async fn test_login_with_wrong_password_fails() {
        let identity = service();
        identity
            .register(registration("testuser", "test@example.com"))
            .await
            .unwrap();
        assert!(matches!(
            identity.login(login("testuser", "wrongpassword")).await,
            Err(DomainError::InvalidCredentials)
        ));
        assert!(matches!(
            identity.login(login("nobody", "testpassword")).await,
            Err(DomainError::InvalidCredentials)
        ));
    }

    #[tokio::test]
    async fn test_login_requires_fields() {
        let errors = field_errors(service().login(Login::default()).await.unwrap_err());
        assert_eq!(errors.get("username"), Some(REQUIRED));
        assert_eq!(errors.get("password"), Some(REQUIRED));
    }

    #[tokio::test]
    async fn test_unknown_token_is_unauthenticated() {
        let identity = service();
        assert!(matches!(
            identity.authenticate("0123456789abcdef").await,
            Err(DomainError::Unauthenticated)
        ));
        assert!(matches!(
            identity.authenticate("").await,
            Err(DomainError::Unauthenticated)
        ));
    }

    #[test]
    fn test_email_and_username_shapes() {
        assert!(is_valid_email("test@example.com"));
        assert!(!is_valid_email("test@example"));
        assert!(!is_valid_email("@example.com"));
        assert!(!is_valid_email("te st@example.com"));
        assert!(is_valid_username("test.user+1@x"));
        assert!(!is_valid_username("test user"));
    }
}
