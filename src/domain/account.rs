//! Trader accounts for email/password sign-in.

use chrono::{DateTime, Utc};

use super::error::SentinelError;

const MIN_PASSWORD_LEN: usize = 8;

#[derive(Debug, Clone, PartialEq)]
pub struct Account {
    pub id: String,
    pub email: String,
    pub name: String,
    pub password_hash: String,
    pub created_at: DateTime<Utc>,
}

impl Account {
    /// A new account with a random id. `password_hash` must already be hashed.
    pub fn new(email: &str, name: &str, password_hash: String) -> Result<Self, SentinelError> {
        let email = normalize_email(email)?;
        let name = match name.trim() {
            "" => email.split('@').next().unwrap_or_default().to_string(),
            n => n.to_string(),
        };
        Ok(Self {
            id: uuid::Uuid::new_v4().to_string(),
            email,
            name,
            password_hash,
            created_at: Utc::now(),
        })
    }
}

pub fn normalize_email(raw: &str) -> Result<String, SentinelError> {
    let email = raw.trim().to_lowercase();
    match email.split_once('@') {
        Some((local, domain)) if !local.is_empty() && domain.contains('.') => Ok(email),
        _ => Err(SentinelError::invalid("email", "is not a valid address")),
    }
}

pub fn check_password_strength(password: &str) -> Result<(), SentinelError> {
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(SentinelError::invalid(
            "password",
            format!("must be at least {MIN_PASSWORD_LEN} characters"),
        ));
    }
    Ok(())
}
