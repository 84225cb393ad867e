//! Authentication backend for axum-login.
//!
//! Accounts live in the trade store; passwords are argon2 hashes.

use std::sync::Arc;

use argon2::password_hash::SaltString;
use argon2::{Argon2, PasswordHash, PasswordHasher, PasswordVerifier};
use axum_login::{AuthUser, AuthnBackend, UserId};
use rand::rngs::OsRng;

use crate::domain::account::{normalize_email, Account};
use crate::domain::error::SentinelError;
use crate::ports::trade_store::TradeStore;

/// Authenticated user.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct User {
    pub id: String,
    pub email: String,
    pub name: String,
    /// The password hash string as bytes, used by axum-login to validate sessions.
    pw_hash_bytes: Vec<u8>,
}

impl From<Account> for User {
    fn from(account: Account) -> Self {
        Self {
            id: account.id,
            email: account.email,
            name: account.name,
            pw_hash_bytes: account.password_hash.into_bytes(),
        }
    }
}

impl AuthUser for User {
    type Id = String;

    fn id(&self) -> String {
        self.id.clone()
    }

    fn session_auth_hash(&self) -> &[u8] {
        &self.pw_hash_bytes
    }
}

/// Login credentials submitted via the login form.
#[derive(Clone, serde::Deserialize)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

pub fn hash_password(password: &str) -> Result<String, SentinelError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|h| h.to_string())
        .map_err(|e| SentinelError::invalid("password", e.to_string()))
}

fn verify_password(password: &str, hash: &str) -> bool {
    let Ok(parsed_hash) = PasswordHash::new(hash) else {
        return false;
    };
    Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .is_ok()
}

/// Authentication backend that verifies against stored accounts.
#[derive(Clone)]
pub struct Backend {
    store: Arc<dyn TradeStore + Send + Sync>,
}

impl Backend {
    pub fn new(store: Arc<dyn TradeStore + Send + Sync>) -> Self {
        Self { store }
    }
}

impl AuthnBackend for Backend {
    type User = User;
    type Credentials = Credentials;
    type Error = SentinelError;

    async fn authenticate(
        &self,
        creds: Self::Credentials,
    ) -> Result<Option<Self::User>, Self::Error> {
        let Ok(email) = normalize_email(&creds.email) else {
            return Ok(None);
        };
        let Some(account) = self.store.find_account_by_email(&email)? else {
            return Ok(None);
        };

        if verify_password(&creds.password, &account.password_hash) {
            Ok(Some(account.into()))
        } else {
            Ok(None)
        }
    }

    async fn get_user(&self, user_id: &UserId<Self>) -> Result<Option<Self::User>, Self::Error> {
        Ok(self.store.find_account(user_id)?.map(User::from))
    }
}
