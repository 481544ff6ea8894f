//! Session handlers, proxied to the backing store's auth API

use axum::{extract::State, http::StatusCode, Json};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use validator::Validate;

use crate::AppState;
use sectorsite_common::{
    auth::{AuthContext, AuthSession, AuthUser, SignUpOutcome},
    errors::{AppError, Result},
};

#[derive(Debug, Deserialize, Validate)]
pub struct SignUpRequest {
    #[validate(email)]
    pub email: String,

    #[validate(length(min = 8, max = 128))]
    pub password: String,

    #[serde(default)]
    pub first_name: Option<String>,

    #[serde(default)]
    pub last_name: Option<String>,

    #[serde(default)]
    pub company: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct SignInRequest {
    #[validate(email)]
    pub email: String,

    #[validate(length(min = 1))]
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct RefreshRequest {
    pub refresh_token: String,
}

#[derive(Serialize)]
pub struct SignUpResponse {
    pub user: AuthUser,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session: Option<AuthSession>,
    pub confirmation_required: bool,
}

fn validation_error(e: validator::ValidationErrors) -> AppError {
    AppError::Validation {
        message: e.to_string(),
        field: None,
    }
}

pub async fn sign_up(
    State(state): State<AppState>,
    Json(request): Json<SignUpRequest>,
) -> Result<(StatusCode, Json<SignUpResponse>)> {
    request.validate().map_err(validation_error)?;

    let metadata = json!({
        "first_name": request.first_name,
        "last_name": request.last_name,
        "company": request.company,
    });

    let response = match state.auth.sign_up(&request.email, &request.password, metadata).await? {
        SignUpOutcome::Session(session) => SignUpResponse {
            user: session.user.clone(),
            session: Some(session),
            confirmation_required: false,
        },
        SignUpOutcome::ConfirmationPending(user) => SignUpResponse {
            user,
            session: None,
            confirmation_required: true,
        },
    };
    Ok((StatusCode::CREATED, Json(response)))
}

pub async fn sign_in(
    State(state): State<AppState>,
    Json(request): Json<SignInRequest>,
) -> Result<Json<AuthSession>> {
    request.validate().map_err(validation_error)?;
    Ok(Json(state.auth.sign_in(&request.email, &request.password).await?))
}

pub async fn refresh(
    State(state): State<AppState>,
    Json(request): Json<RefreshRequest>,
) -> Result<Json<AuthSession>> {
    if request.refresh_token.is_empty() {
        return Err(AppError::MissingField {
            field: "refresh_token".to_string(),
        });
    }
    Ok(Json(state.auth.refresh(&request.refresh_token).await?))
}

pub async fn sign_out(State(state): State<AppState>, auth: AuthContext) -> Result<StatusCode> {
    state.auth.sign_out(&auth.access_token).await?;
    tracing::info!(user_id = %auth.user_id, "User signed out");
    Ok(StatusCode::NO_CONTENT)
}

/// The caller's identity and profile
pub async fn current_user(State(state): State<AppState>, auth: AuthContext) -> Result<Json<Value>> {
    let profile = state
        .repo
        .for_session(&auth.access_token)
        .find_profile(auth.user_id)
        .await?;

    Ok(Json(json!({
        "id": auth.user_id,
        "email": auth.email,
        "role": auth.role,
        "profile": profile,
    })))
}
