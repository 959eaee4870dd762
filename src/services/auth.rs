use std::sync::Arc;
use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};
use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{header::AUTHORIZATION, request::Parts},
};
use once_cell::sync::Lazy;
use regex::Regex;
use uuid::Uuid;
use crate::{error::AppError, models::{Role, User}, AppState};

pub const MIN_PASSWORD_LENGTH: usize = 6;

static EMAIL_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("email pattern is valid")
});

/// Hashes a password with Argon2id and a random salt.
pub fn hash_password(password: &str) -> Result<String, AppError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| AppError::Internal(format!("Password hashing failed: {}", e)))
}

/// Checks a plaintext password against a stored hash.
pub fn verify_password(password: &str, hash: &str) -> Result<bool, AppError> {
    let parsed_hash = PasswordHash::new(hash)
        .map_err(|e| AppError::Internal(format!("Invalid password hash format: {}", e)))?;

    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .is_ok())
}

pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

pub fn is_valid_email(email: &str) -> bool {
    EMAIL_PATTERN.is_match(email)
}

pub fn validate_password(password: &str, label: &str) -> Result<(), AppError> {
    if password.chars().count() < MIN_PASSWORD_LENGTH {
        return Err(AppError::InvalidInput(format!(
            "{} must be at least {} characters long",
            label, MIN_PASSWORD_LENGTH
        )));
    }
    Ok(())
}

/// The account behind a valid `Authorization: Bearer <token>` header.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user: User,
    pub token: Uuid,
}

impl AuthUser {
    pub fn id(&self) -> Uuid {
        self.user.id
    }

    pub fn require_admin(&self) -> Result<(), AppError> {
        if self.user.role == Role::Admin {
            Ok(())
        } else {
            Err(AppError::Forbidden("Access denied. Admin privileges required.".to_string()))
        }
    }
}

fn bearer_token(parts: &Parts) -> Option<&str> {
    let value = parts.headers.get(AUTHORIZATION)?.to_str().ok()?;
    if !value.starts_with("Bearer") {
        return None;
    }
    value.split_whitespace().nth(1)
}

#[async_trait]
impl FromRequestParts<Arc<AppState>> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &Arc<AppState>) -> Result<Self, Self::Rejection> {
        let raw = bearer_token(parts)
            .ok_or_else(|| AppError::Unauthorized("Not authorized, no token".to_string()))?;

        let token = Uuid::parse_str(raw).map_err(|_| {
            tracing::warn!("Rejected malformed bearer token");
            AppError::Unauthorized("Not authorized, token failed".to_string())
        })?;

        let session = state
            .store
            .find_session(token)?
            .ok_or_else(|| AppError::Unauthorized("Not authorized, token failed".to_string()))?;

        if session.is_expired() {
            state.store.delete_session(token)?;
            return Err(AppError::Unauthorized("Not authorized, token expired".to_string()));
        }

        let user = state
            .store
            .find_user(session.user_id)?
            .ok_or_else(|| AppError::Unauthorized("Not authorized, user not found".to_string()))?;

        if !user.is_active {
            tracing::warn!("Deactivated user {} attempted access", user.id);
            return Err(AppError::Unauthorized(
                "Account is deactivated. Please contact support.".to_string(),
            ));
        }

        Ok(AuthUser { user, token })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hashes_verify_only_the_original_password() {
        let hash = hash_password("hunter22").unwrap();
        assert_ne!(hash, "hunter22");
        assert!(verify_password("hunter22", &hash).unwrap());
        assert!(!verify_password("hunter23", &hash).unwrap());
        assert!(verify_password("hunter22", "not-a-hash").is_err());
    }

    #[test]
    fn validates_emails_and_passwords() {
        assert!(is_valid_email("ada@example.com"));
        assert!(!is_valid_email("ada@example"));
        assert!(!is_valid_email("ada example@x.io"));
        assert_eq!(normalize_email("  Ada@Example.COM "), "ada@example.com");

        assert!(validate_password("123456", "Password").is_ok());
        assert!(matches!(
            validate_password("12345", "Password"),
            Err(AppError::InvalidInput(msg)) if msg == "Password must be at least 6 characters long"
        ));
    }
}
