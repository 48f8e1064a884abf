use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use validator::Validate;

use super::{error::ApiError, extract::AppJson};
use crate::{
    auth::{hash_password, verify_password, AuthUser},
    domain::{LoginRequest, NewUser, RegisterRequest, UserProfile},
    state::AppState,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/register", post(register))
        .route("/login", post(login))
        .route("/me", get(me))
}

#[derive(Debug, Serialize)]
pub struct TokenResponse {
    pub token: String,
    pub user: UserProfile,
}

/// POST /api/auth/register
pub async fn register(
    State(state): State<AppState>,
    AppJson(request): AppJson<RegisterRequest>,
) -> Result<(StatusCode, Json<TokenResponse>), ApiError> {
    request.validate()?;
    let password = request.password;
    let password_hash = tokio::task::spawn_blocking(move || hash_password(&password))
        .await
        .map_err(|e| ApiError::InternalError(e.to_string()))??;

    let user = state
        .store
        .create_user(&NewUser {
            email: request.email.trim().to_lowercase(),
            full_name: request.full_name,
            password_hash,
        })
        .await?;
    let token = state.auth.issue(&user)?;
    tracing::info!(user_id = user.user_id, "user registered");

    Ok((
        StatusCode::CREATED,
        Json(TokenResponse {
            token,
            user: UserProfile::from(&user),
        }),
    ))
}

/// POST /api/auth/login
pub async fn login(
    State(state): State<AppState>,
    AppJson(request): AppJson<LoginRequest>,
) -> Result<Json<TokenResponse>, ApiError> {
    request.validate()?;
    let user = state
        .store
        .find_user_by_email(request.email.trim())
        .await?
        .ok_or(ApiError::Unauthorized)?;

    let hash = user.password_hash.clone();
    let password = request.password;
    let valid = tokio::task::spawn_blocking(move || verify_password(&password, &hash))
        .await
        .map_err(|e| ApiError::InternalError(e.to_string()))?;
    if !valid {
        tracing::debug!(user_id = user.user_id, "login rejected");
        return Err(ApiError::Unauthorized);
    }

    let token = state.auth.issue(&user)?;
    Ok(Json(TokenResponse {
        token,
        user: UserProfile::from(&user),
    }))
}

/// GET /api/auth/me
pub async fn me(
    State(state): State<AppState>,
    AuthUser(claims): AuthUser,
) -> Result<Json<UserProfile>, ApiError> {
    let user_id = claims.user_id().ok_or(ApiError::Unauthorized)?;
    let user = state
        .store
        .find_user(user_id)
        .await?
        .ok_or(ApiError::Unauthorized)?;
    Ok(Json(UserProfile::from(&user)))
}
