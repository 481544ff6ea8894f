//! Subscription and usage-limit handlers
//!
//! The gate is advisory: a check and the write it guards are separate
//! requests, so concurrent callers can both pass.

use axum::{
    extract::{Query, State},
    Json,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::resolve_owner;
use crate::AppState;
use sectorsite_common::{
    auth::AuthContext,
    errors::Result,
    sectors::SubscriptionPlan,
    subscription::{SubscriptionInfo, SubscriptionService, UsageAction},
};

#[derive(Debug, Default, Deserialize)]
pub struct OwnerParams {
    pub tenant_id: Option<Uuid>,
}

#[derive(Debug, Deserialize)]
pub struct CheckRequest {
    #[serde(default)]
    pub tenant_id: Option<Uuid>,
    #[serde(flatten)]
    pub action: UsageAction,
}

#[derive(Serialize)]
pub struct CheckResponse {
    pub allowed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpgradeRequest {
    #[serde(default)]
    pub tenant_id: Option<Uuid>,
    pub plan: SubscriptionPlan,
    #[serde(default)]
    pub payment_method: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct CancelRequest {
    #[serde(default)]
    pub tenant_id: Option<Uuid>,
}

fn service(state: &AppState, auth: &AuthContext) -> SubscriptionService {
    SubscriptionService::new(state.repo.for_session(&auth.access_token))
}

pub async fn get_subscription(
    State(state): State<AppState>,
    auth: AuthContext,
    Query(params): Query<OwnerParams>,
) -> Result<Json<SubscriptionInfo>> {
    let owner = resolve_owner(&state.repo, &auth, params.tenant_id, false).await?;
    let gate = service(&state, &auth).load(owner).await?;
    Ok(Json(gate.into_info()))
}

/// Ask whether an action would currently be admitted
pub async fn check_action(
    State(state): State<AppState>,
    auth: AuthContext,
    Json(request): Json<CheckRequest>,
) -> Result<Json<CheckResponse>> {
    let owner = resolve_owner(&state.repo, &auth, request.tenant_id, false).await?;
    let decision = service(&state, &auth).load(owner).await?.check(request.action);

    Ok(Json(CheckResponse {
        allowed: decision.is_allowed(),
        reason: decision.reason().map(String::from),
    }))
}

pub async fn upgrade(
    State(state): State<AppState>,
    auth: AuthContext,
    Json(request): Json<UpgradeRequest>,
) -> Result<Json<SubscriptionInfo>> {
    let owner = resolve_owner(&state.repo, &auth, request.tenant_id, true).await?;
    let gate = service(&state, &auth)
        .upgrade_plan(auth.user_id, owner, request.plan, request.payment_method.as_deref())
        .await?;
    Ok(Json(gate.into_info()))
}

pub async fn cancel(
    State(state): State<AppState>,
    auth: AuthContext,
    Json(request): Json<CancelRequest>,
) -> Result<Json<SubscriptionInfo>> {
    let owner = resolve_owner(&state.repo, &auth, request.tenant_id, true).await?;
    let gate = service(&state, &auth).cancel(owner).await?;
    Ok(Json(gate.into_info()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_check_request_shape() {
        let request: CheckRequest =
            serde_json::from_value(json!({ "action": "upload_file", "size_bytes": 2_097_152 })).unwrap();
        assert_eq!(request.tenant_id, None);
        assert_eq!(request.action, UsageAction::UploadFile { size_bytes: 2_097_152 });

        let request: CheckRequest = serde_json::from_value(json!({
            "tenant_id": "7f6a3c1e-9a53-4d5e-8b9e-2a0f4b1c7d11",
            "action": "create_item"
        }))
        .unwrap();
        assert!(request.tenant_id.is_some());
        assert_eq!(request.action, UsageAction::CreateItem);
    }
}
