//! Encrypted vault handlers

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use super::resolve_owner;
use crate::AppState;
use sectorsite_common::{
    auth::AuthContext,
    db::{models::EncryptedRecord, ListOptions},
    errors::{AppError, Result},
    subscription::{SubscriptionService, UsageAction},
    vault::{DecryptedRecord, SaveRecord, UsageStats},
    Vault,
};

/// Columns a listing may be ordered by
const SORTABLE_COLUMNS: &[&str] = &["created_at", "updated_at", "title", "data_type"];

/// Maximum page size
const MAX_PAGE_SIZE: u64 = 200;

#[derive(Debug, Deserialize, Validate)]
pub struct CreateRecordRequest {
    #[validate(length(min = 1, max = 64))]
    pub data_type: String,

    #[validate(length(max = 100000))]
    pub content: String,

    #[validate(length(max = 200))]
    #[serde(default)]
    pub title: Option<String>,

    #[validate(length(max = 2000))]
    #[serde(default)]
    pub description: Option<String>,

    #[serde(default)]
    pub tenant_id: Option<Uuid>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateRecordRequest {
    #[validate(length(max = 100000))]
    pub content: String,

    #[validate(length(max = 200))]
    #[serde(default)]
    pub title: Option<String>,

    #[validate(length(max = 2000))]
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct FavoriteRequest {
    pub is_favorite: bool,
}

#[derive(Debug, Default, Deserialize)]
pub struct ListParams {
    pub data_type: Option<String>,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
    pub order_by: Option<String>,
    #[serde(default)]
    pub ascending: bool,
}

impl ListParams {
    fn options(&self) -> Result<ListOptions> {
        let mut options = ListOptions {
            limit: Some(self.limit.unwrap_or(MAX_PAGE_SIZE).min(MAX_PAGE_SIZE)),
            offset: self.offset,
            ascending: self.ascending,
            ..Default::default()
        };
        if let Some(ref column) = self.order_by {
            if !SORTABLE_COLUMNS.contains(&column.as_str()) {
                return Err(AppError::Validation {
                    message: format!("cannot order by '{}'", column),
                    field: Some("order_by".to_string()),
                });
            }
            options.order_by = column.clone();
        }
        Ok(options)
    }
}

#[derive(Serialize)]
pub struct RecordListResponse {
    pub records: Vec<DecryptedRecord>,
}

fn vault(state: &AppState, auth: &AuthContext) -> Vault {
    Vault::new(
        state.repo.for_session(&auth.access_token),
        state.codec.clone(),
        auth.user_id,
    )
}

fn validation_error(e: validator::ValidationErrors) -> AppError {
    AppError::Validation {
        message: e.to_string(),
        field: None,
    }
}

/// Encrypt and store a record after the item limit admits it
pub async fn create_record(
    State(state): State<AppState>,
    auth: AuthContext,
    Json(request): Json<CreateRecordRequest>,
) -> Result<(StatusCode, Json<EncryptedRecord>)> {
    request.validate().map_err(validation_error)?;

    let repo = state.repo.for_session(&auth.access_token);
    let owner = resolve_owner(&repo, &auth, request.tenant_id, false).await?;
    SubscriptionService::new(repo)
        .load(owner)
        .await?
        .check(UsageAction::CreateItem)
        .into_result()?;

    let record = vault(&state, &auth)
        .save(SaveRecord {
            data_type: request.data_type,
            content: request.content,
            title: request.title,
            description: request.description,
            tenant_id: request.tenant_id,
        })
        .await?;

    tracing::info!(
        record_id = %record.id,
        user_id = %auth.user_id,
        request_id = %auth.request_id,
        "Record created"
    );

    Ok((StatusCode::CREATED, Json(record)))
}

pub async fn list_records(
    State(state): State<AppState>,
    auth: AuthContext,
    Query(params): Query<ListParams>,
) -> Result<Json<RecordListResponse>> {
    let options = params.options()?;
    let records = vault(&state, &auth)
        .list(params.data_type.as_deref(), &options)
        .await?;
    Ok(Json(RecordListResponse { records }))
}

pub async fn update_record(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(record_id): Path<Uuid>,
    Json(request): Json<UpdateRecordRequest>,
) -> Result<Json<EncryptedRecord>> {
    request.validate().map_err(validation_error)?;

    let record = vault(&state, &auth)
        .update(record_id, &request.content, request.title, request.description)
        .await?;
    Ok(Json(record))
}

pub async fn delete_record(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(record_id): Path<Uuid>,
) -> Result<StatusCode> {
    vault(&state, &auth).delete(record_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn set_favorite(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(record_id): Path<Uuid>,
    Json(request): Json<FavoriteRequest>,
) -> Result<Json<EncryptedRecord>> {
    let record = vault(&state, &auth)
        .toggle_favorite(record_id, request.is_favorite)
        .await?;
    Ok(Json(record))
}

pub async fn usage_stats(
    State(state): State<AppState>,
    auth: AuthContext,
) -> Result<Json<UsageStats>> {
    Ok(Json(vault(&state, &auth).usage_stats().await?))
}
