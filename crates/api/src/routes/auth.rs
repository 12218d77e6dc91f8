//! Registration, login and who-am-i endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use domain::{Login, RegisterUser, UserProfile};
use serde::{Deserialize, Serialize};
use store::Store;

use super::JsonBody;
use crate::auth::AuthUser;
use crate::error::ApiError;
use crate::state::AppState;

// -- Request types --

#[derive(Deserialize)]
pub struct RegisterRequest {
    pub username: Option<String>,
    pub email: Option<String>,
    pub password: Option<String>,
    pub password2: Option<String>,
}

#[derive(Deserialize)]
pub struct LoginRequest {
    pub username: Option<String>,
    pub password: Option<String>,
}

// -- Response types --

#[derive(Serialize)]
pub struct TokenResponse {
    pub token: String,
}

// -- Handlers --

/// POST /auth/register/: create an account and return its token.
#[tracing::instrument(skip_all)]
pub async fn register<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    JsonBody(req): JsonBody<RegisterRequest>,
) -> Result<(StatusCode, Json<TokenResponse>), ApiError> {
    let token = state
        .identity
        .register(RegisterUser {
            username: req.username,
            email: req.email,
            password: req.password,
            password2: req.password2,
        })
        .await?;

    Ok((StatusCode::CREATED, Json(TokenResponse { token })))
}

/// POST /auth/login/: exchange credentials for the account's token.
#[tracing::instrument(skip_all)]
pub async fn login<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    JsonBody(req): JsonBody<LoginRequest>,
) -> Result<Json<TokenResponse>, ApiError> {
    let token = state
        .identity
        .login(Login {
            username: req.username,
            password: req.password,
        })
        .await?;

    Ok(Json(TokenResponse { token }))
}

/// GET /auth/who-am-i/: the authenticated caller's profile.
#[tracing::instrument(skip_all, fields(user_id = %user.id))]
pub async fn who_am_i<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    AuthUser(user): AuthUser,
) -> Result<Json<UserProfile>, ApiError> {
    Ok(Json(state.identity.who_am_i(user.id).await?))
}
