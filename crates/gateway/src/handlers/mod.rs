//! API handlers module

pub mod auth;
pub mod health;
pub mod records;
pub mod resolve;
pub mod sectors;
pub mod subscription;
pub mod tenants;

use sectorsite_common::{
    auth::AuthContext,
    db::{models::ProfileRole, Repository},
    errors::{AppError, Result},
    subscription::SubscriptionOwner,
};
use uuid::Uuid;

/// Ensure the caller belongs to `tenant_id`, optionally with a managing role
pub(crate) async fn require_membership(
    repo: &Repository,
    auth: &AuthContext,
    tenant_id: Uuid,
    manage: bool,
) -> Result<()> {
    let profile = repo.find_profile(auth.user_id).await?.ok_or(AppError::TenantMismatch)?;
    if profile.tenant_id != Some(tenant_id) {
        return Err(AppError::TenantMismatch);
    }
    if manage && !matches!(profile.role, ProfileRole::Owner | ProfileRole::Admin) {
        return Err(AppError::Forbidden {
            message: "Only tenant owners and admins can do this".to_string(),
        });
    }
    Ok(())
}

/// Subscription holder for a request: the tenant when given, else the caller
pub(crate) async fn resolve_owner(
    repo: &Repository,
    auth: &AuthContext,
    tenant_id: Option<Uuid>,
    manage: bool,
) -> Result<SubscriptionOwner> {
    match tenant_id {
        Some(id) => {
            require_membership(repo, auth, id, manage).await?;
            Ok(SubscriptionOwner::Tenant(id))
        }
        None => Ok(SubscriptionOwner::Personal(auth.user_id)),
    }
}
