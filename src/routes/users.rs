use std::sync::Arc;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, patch, post, put},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use crate::{
    AppState,
    error::AppError,
    models::{NewUser, Role, User},
    services::auth::{self, AuthUser},
};

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(list_users))
        .route("/register", post(register))
        .route("/login", post(login))
        .route("/logout", post(logout))
        .route("/profile", get(get_profile).put(update_profile))
        .route("/change-password", put(change_password))
        .route("/:id/status", patch(set_user_status))
}

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    #[serde(default)]
    name: String,
    #[serde(default)]
    email: String,
    #[serde(default)]
    password: String,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    #[serde(default)]
    email: String,
    #[serde(default)]
    password: String,
}

#[derive(Debug, Deserialize)]
pub struct ProfileRequest {
    #[serde(default)]
    name: String,
    #[serde(default)]
    email: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangePasswordRequest {
    #[serde(default)]
    current_password: String,
    #[serde(default)]
    new_password: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserStatusRequest {
    is_active: bool,
}

#[derive(Debug, Serialize)]
pub struct AuthResponse {
    message: &'static str,
    token: Uuid,
    user: User,
}

#[derive(Debug, Serialize)]
pub struct UserResponse {
    message: &'static str,
    user: User,
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    message: &'static str,
}

#[derive(Debug, Serialize)]
pub struct UserListResponse {
    count: usize,
    users: Vec<User>,
}

/// Opens a session for `user` and stamps the login time on it.
fn start_session(state: &AppState, mut user: User) -> Result<(Uuid, User), AppError> {
    user.last_login = Some(state.store.record_login(user.id)?);
    let ttl = chrono::Duration::hours(state.config.session_ttl_hours);
    let session = state.store.create_session(user.id, ttl)?;
    Ok((session.token, user))
}

async fn register(
    State(state): State<Arc<AppState>>,
    Json(request): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<AuthResponse>), AppError> {
    let name = request.name.trim();
    let email = auth::normalize_email(&request.email);

    if name.is_empty() || email.is_empty() || request.password.is_empty() {
        return Err(AppError::InvalidInput("Please provide name, email, and password".to_string()));
    }
    if !auth::is_valid_email(&email) {
        return Err(AppError::InvalidInput("Please provide a valid email".to_string()));
    }
    auth::validate_password(&request.password, "Password")?;

    if state.store.find_user_by_email(&email)?.is_some() {
        return Err(AppError::InvalidInput("User already exists with this email".to_string()));
    }

    let role = match &state.config.admin_email {
        Some(admin) if *admin == email => Role::Admin,
        _ => Role::User,
    };

    let user = state.store.create_user(NewUser {
        name: name.to_string(),
        email,
        password_hash: auth::hash_password(&request.password)?,
        role,
    })?;
    tracing::info!("Registered user {}", user.id);

    let (token, user) = start_session(&state, user)?;

    Ok((
        StatusCode::CREATED,
        Json(AuthResponse {
            message: "User registered successfully",
            token,
            user,
        }),
    ))
}

async fn login(
    State(state): State<Arc<AppState>>,
    Json(request): Json<LoginRequest>,
) -> Result<Json<AuthResponse>, AppError> {
    let email = auth::normalize_email(&request.email);
    if email.is_empty() || request.password.is_empty() {
        return Err(AppError::InvalidInput("Please provide email and password".to_string()));
    }

    let invalid = || AppError::Unauthorized("Invalid email or password".to_string());

    let user = state.store.find_user_by_email(&email)?.ok_or_else(invalid)?;

    if !user.is_active {
        return Err(AppError::Unauthorized(
            "Account is deactivated. Please contact support.".to_string(),
        ));
    }

    if !auth::verify_password(&request.password, &user.password_hash)? {
        tracing::warn!("Failed login for user {}", user.id);
        return Err(invalid());
    }

    state.store.purge_expired_sessions()?;
    let (token, user) = start_session(&state, user)?;
    tracing::info!("User {} logged in", user.id);

    Ok(Json(AuthResponse {
        message: "Login successful",
        token,
        user,
    }))
}

async fn logout(
    State(state): State<Arc<AppState>>,
    auth_user: AuthUser,
) -> Result<Json<MessageResponse>, AppError> {
    state.store.delete_session(auth_user.token)?;
    Ok(Json(MessageResponse {
        message: "Logged out successfully",
    }))
}

async fn get_profile(auth_user: AuthUser) -> Json<User> {
    Json(auth_user.user)
}

async fn update_profile(
    State(state): State<Arc<AppState>>,
    auth_user: AuthUser,
    Json(request): Json<ProfileRequest>,
) -> Result<Json<UserResponse>, AppError> {
    let name = request.name.trim();
    let email = auth::normalize_email(&request.email);

    if name.is_empty() || email.is_empty() {
        return Err(AppError::InvalidInput("Please provide name and email".to_string()));
    }
    if !auth::is_valid_email(&email) {
        return Err(AppError::InvalidInput("Please provide a valid email".to_string()));
    }
    if state.store.email_taken(&email, Some(auth_user.id()))? {
        return Err(AppError::InvalidInput("Email is already taken by another user".to_string()));
    }

    let user = state
        .store
        .update_profile(auth_user.id(), name, &email)?
        .ok_or_else(|| AppError::NotFound("User not found".to_string()))?;

    Ok(Json(UserResponse {
        message: "Profile updated successfully",
        user,
    }))
}

async fn change_password(
    State(state): State<Arc<AppState>>,
    auth_user: AuthUser,
    Json(request): Json<ChangePasswordRequest>,
) -> Result<Json<MessageResponse>, AppError> {
    if request.current_password.is_empty() || request.new_password.is_empty() {
        return Err(AppError::InvalidInput(
            "Please provide current password and new password".to_string(),
        ));
    }
    auth::validate_password(&request.new_password, "New password")?;

    if !auth::verify_password(&request.current_password, &auth_user.user.password_hash)? {
        return Err(AppError::InvalidInput("Current password is incorrect".to_string()));
    }

    let hash = auth::hash_password(&request.new_password)?;
    state.store.update_password(auth_user.id(), &hash)?;
    tracing::info!("User {} changed password", auth_user.id());

    Ok(Json(MessageResponse {
        message: "Password changed successfully",
    }))
}

async fn list_users(
    State(state): State<Arc<AppState>>,
    auth_user: AuthUser,
) -> Result<Json<UserListResponse>, AppError> {
    auth_user.require_admin()?;

    let users = state.store.list_users()?;
    Ok(Json(UserListResponse {
        count: users.len(),
        users,
    }))
}

async fn set_user_status(
    State(state): State<Arc<AppState>>,
    auth_user: AuthUser,
    Path(id): Path<Uuid>,
    Json(request): Json<UserStatusRequest>,
) -> Result<Json<UserResponse>, AppError> {
    auth_user.require_admin()?;
    if id == auth_user.id() && !request.is_active {
        return Err(AppError::InvalidInput("You cannot deactivate your own account".to_string()));
    }

    state
        .store
        .find_user(id)?
        .ok_or_else(|| AppError::NotFound("User not found".to_string()))?;
    state.store.set_active(id, request.is_active)?;
    let user = state
        .store
        .find_user(id)?
        .ok_or_else(|| AppError::NotFound("User not found".to_string()))?;
    tracing::info!("User {} set active={} by {}", id, request.is_active, auth_user.id());

    Ok(Json(UserResponse {
        message: "User status updated",
        user,
    }))
}
