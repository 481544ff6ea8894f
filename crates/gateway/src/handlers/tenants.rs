//! Tenant provisioning handlers

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use url::Url;
use uuid::Uuid;

use super::require_membership;
use crate::AppState;
use sectorsite_common::{
    auth::AuthContext,
    db::models::{Tenant, TenantUpdate},
    errors::{AppError, Result},
    tenancy::{tenant_url, NewTenant, ProvisioningService},
};

#[derive(Serialize)]
pub struct TenantListResponse {
    pub tenants: Vec<Tenant>,
}

#[derive(Debug, Default, Deserialize)]
pub struct LinkParams {
    /// Origin the link is built for; defaults to the main domain
    pub origin: Option<String>,
    #[serde(default)]
    pub path: String,
}

#[derive(Serialize)]
pub struct LinkResponse {
    pub url: String,
}

fn service(state: &AppState, auth: &AuthContext) -> ProvisioningService {
    ProvisioningService::new(state.repo.for_session(&auth.access_token))
}

/// Provision a tenant owned by the caller
pub async fn create_tenant(
    State(state): State<AppState>,
    auth: AuthContext,
    Json(request): Json<NewTenant>,
) -> Result<(StatusCode, Json<Tenant>)> {
    let tenant = service(&state, &auth).create_tenant(auth.user_id, request).await?;
    Ok((StatusCode::CREATED, Json(tenant)))
}

pub async fn list_my_tenants(
    State(state): State<AppState>,
    auth: AuthContext,
) -> Result<Json<TenantListResponse>> {
    let tenants = service(&state, &auth).list_user_tenants(auth.user_id).await?;
    Ok(Json(TenantListResponse { tenants }))
}

pub async fn get_tenant(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(tenant_id): Path<Uuid>,
) -> Result<Json<Tenant>> {
    let repo = state.repo.for_session(&auth.access_token);
    require_membership(&repo, &auth, tenant_id, false).await?;

    repo.find_tenant_by_id(tenant_id)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::NotFound {
            resource_type: "tenant".to_string(),
            id: tenant_id.to_string(),
        })
}

pub async fn update_tenant(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(tenant_id): Path<Uuid>,
    Json(update): Json<TenantUpdate>,
) -> Result<Json<Tenant>> {
    let repo = state.repo.for_session(&auth.access_token);
    require_membership(&repo, &auth, tenant_id, true).await?;

    let tenant = ProvisioningService::new(repo).update_tenant(tenant_id, update).await?;
    Ok(Json(tenant))
}

/// Soft delete: the tenant stops resolving but its rows stay
pub async fn deactivate_tenant(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(tenant_id): Path<Uuid>,
) -> Result<StatusCode> {
    let repo = state.repo.for_session(&auth.access_token);
    require_membership(&repo, &auth, tenant_id, true).await?;

    ProvisioningService::new(repo).deactivate_tenant(tenant_id).await?;
    tracing::info!(tenant_id = %tenant_id, user_id = %auth.user_id, "Tenant deactivated by owner");
    Ok(StatusCode::NO_CONTENT)
}

/// Public link to a tenant page for the given origin
pub async fn tenant_link(
    State(state): State<AppState>,
    Path(tenant_id): Path<Uuid>,
    Query(params): Query<LinkParams>,
) -> Result<Json<LinkResponse>> {
    let tenant = state
        .repo
        .find_tenant_by_id(tenant_id)
        .await?
        .filter(Tenant::is_active)
        .ok_or_else(|| AppError::NotFound {
            resource_type: "tenant".to_string(),
            id: tenant_id.to_string(),
        })?;

    let origin = params
        .origin
        .unwrap_or_else(|| format!("https://www.{}", state.config.tenancy.main_domain));
    let origin = Url::parse(&origin).map_err(|e| AppError::InvalidFormat {
        message: format!("invalid origin '{}': {}", origin, e),
    })?;

    let url = tenant_url(&origin, &tenant.sector, &tenant.slug, &params.path)?;
    Ok(Json(LinkResponse { url }))
}
