//! Tenant provisioning and management

use crate::db::models::{ProfileRole, Tenant, TenantStatus, TenantUpdate, NewTenantRow};
use crate::db::Repository;
use crate::errors::{AppError, Result};
use crate::sectors::{self, SubscriptionPlan};
use crate::tenancy::urls::is_valid_slug;
use chrono::Utc;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::info;
use uuid::Uuid;
use validator::{Validate, ValidationError};

/// Sign-up request for a new tenant
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct NewTenant {
    #[validate(length(min = 1, max = 120))]
    pub name: String,

    #[validate(length(min = 1, max = 60), custom(function = "validate_slug"))]
    pub slug: String,

    #[validate(length(min = 1))]
    pub sector: String,

    #[serde(default)]
    pub domain: Option<String>,

    #[serde(default)]
    pub subdomain: Option<String>,
}

fn validate_slug(slug: &str) -> std::result::Result<(), ValidationError> {
    if is_valid_slug(slug) {
        Ok(())
    } else {
        Err(ValidationError::new("slug_format"))
    }
}

#[derive(Clone)]
pub struct ProvisioningService {
    repo: Repository,
}

impl ProvisioningService {
    pub fn new(repo: Repository) -> Self {
        Self { repo }
    }

    /// Create a tenant on the free plan and make `user_id` its owner
    pub async fn create_tenant(&self, user_id: Uuid, request: NewTenant) -> Result<Tenant> {
        request.validate().map_err(|e| AppError::Validation {
            message: e.to_string(),
            field: None,
        })?;

        let sector = sectors::sector_config(&request.sector).ok_or_else(|| AppError::SectorUnknown {
            sector: request.sector.clone(),
        })?;

        // slugs are unique per sector, not globally
        if self.repo.tenant_slug_taken(sector.id, &request.slug).await? {
            return Err(AppError::SlugTaken {
                sector: sector.id.to_string(),
                slug: request.slug,
            });
        }

        let limits = sector.limits(SubscriptionPlan::Free);
        let tenant = self
            .repo
            .create_tenant(&NewTenantRow {
                name: request.name,
                slug: request.slug,
                sector: sector.id.to_string(),
                domain: request.domain.filter(|d| !d.is_empty()),
                subdomain: request.subdomain.filter(|d| !d.is_empty()),
                subscription_plan: SubscriptionPlan::Free,
                max_users: limits.max_users,
                max_encrypted_items: limits.max_items,
                max_storage_mb: limits.max_storage_mb,
                status: TenantStatus::Active,
            })
            .await?;

        self.repo
            .update_profile(
                user_id,
                json!({ "tenant_id": tenant.id, "role": ProfileRole::Owner }),
            )
            .await?;

        info!(
            tenant_id = %tenant.id,
            sector = %tenant.sector,
            slug = %tenant.slug,
            owner = %user_id,
            "Tenant provisioned"
        );

        Ok(tenant)
    }

    /// Apply a partial update
    pub async fn update_tenant(&self, id: Uuid, update: TenantUpdate) -> Result<Tenant> {
        if update.is_empty() {
            return Err(AppError::Validation {
                message: "no fields to update".to_string(),
                field: None,
            });
        }

        let mut patch = serde_json::to_value(&update)?;
        if let Value::Object(ref mut map) = patch {
            map.insert("updated_at".to_string(), json!(Utc::now()));
        }

        self.repo
            .update_tenant(id, patch)
            .await?
            .ok_or_else(|| AppError::NotFound {
                resource_type: "tenant".to_string(),
                id: id.to_string(),
            })
    }

    /// Flip status to inactive. Tenants are never hard-deleted.
    pub async fn deactivate_tenant(&self, id: Uuid) -> Result<Tenant> {
        let tenant = self
            .update_tenant(
                id,
                TenantUpdate {
                    status: Some(TenantStatus::Inactive),
                    ..Default::default()
                },
            )
            .await?;
        info!(tenant_id = %id, "Tenant deactivated");
        Ok(tenant)
    }

    /// Active tenants owned by `user_id`
    pub async fn list_user_tenants(&self, user_id: Uuid) -> Result<Vec<Tenant>> {
        let Some(profile) = self.repo.find_profile(user_id).await? else {
            return Ok(Vec::new());
        };
        match profile.tenant_id {
            Some(tenant_id) => self.repo.list_active_tenants(&[tenant_id]).await,
            None => Ok(Vec::new()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::MemoryStore;
    use std::sync::Arc;

    fn request(sector: &str, slug: &str) -> NewTenant {
        NewTenant {
            name: "Clinic A".to_string(),
            slug: slug.to_string(),
            sector: sector.to_string(),
            domain: None,
            subdomain: Some(String::new()),
        }
    }

    async fn service_with_profile(user_id: Uuid) -> (ProvisioningService, MemoryStore) {
        let store = MemoryStore::new();
        store
            .seed(
                "profiles",
                json!({
                    "id": user_id,
                    "role": "member",
                    "created_at": "2025-01-01T00:00:00Z",
                    "updated_at": "2025-01-01T00:00:00Z",
                }),
            )
            .await;
        let repo = Repository::new(Arc::new(store.clone()));
        (ProvisioningService::new(repo), store)
    }

    #[tokio::test]
    async fn test_create_tenant_uses_free_limits_and_sets_owner() {
        let user_id = Uuid::new_v4();
        let (service, store) = service_with_profile(user_id).await;

        let tenant = service.create_tenant(user_id, request("beauty", "salon-b")).await.unwrap();
        assert_eq!(tenant.subscription_plan, SubscriptionPlan::Free);
        assert_eq!(tenant.max_users, 1);
        assert_eq!(tenant.max_encrypted_items, 10);
        assert_eq!(tenant.max_storage_mb, 100);
        assert!(tenant.subdomain.is_none());
        assert!(tenant.is_active());

        let profile = &store.rows("profiles").await[0];
        assert_eq!(profile["role"], "owner");
        assert_eq!(profile["tenant_id"], json!(tenant.id));

        let owned = service.list_user_tenants(user_id).await.unwrap();
        assert_eq!(owned.len(), 1);
        assert_eq!(owned[0].id, tenant.id);
    }

    #[tokio::test]
    async fn test_slug_unique_per_sector_only() {
        let user_id = Uuid::new_v4();
        let (service, _) = service_with_profile(user_id).await;

        service.create_tenant(user_id, request("dentist", "smile")).await.unwrap();
        assert!(matches!(
            service.create_tenant(user_id, request("dentist", "smile")).await,
            Err(AppError::SlugTaken { .. })
        ));
        assert!(service.create_tenant(user_id, request("beauty", "smile")).await.is_ok());
    }

    #[tokio::test]
    async fn test_create_tenant_rejects_bad_input() {
        let user_id = Uuid::new_v4();
        let (service, _) = service_with_profile(user_id).await;

        assert!(matches!(
            service.create_tenant(user_id, request("dentist", "Not A Slug")).await,
            Err(AppError::Validation { .. })
        ));
        assert!(matches!(
            service.create_tenant(user_id, request("plumbing", "pipes")).await,
            Err(AppError::SectorUnknown { .. })
        ));
    }

    #[tokio::test]
    async fn test_deactivate_hides_tenant() {
        let user_id = Uuid::new_v4();
        let (service, store) = service_with_profile(user_id).await;
        let tenant = service.create_tenant(user_id, request("retail", "shop")).await.unwrap();

        let tenant = service.deactivate_tenant(tenant.id).await.unwrap();
        assert_eq!(tenant.status, TenantStatus::Inactive);
        assert_eq!(store.rows("tenants").await.len(), 1);
        assert!(service.list_user_tenants(user_id).await.unwrap().is_empty());

        assert!(matches!(
            service.update_tenant(tenant.id, TenantUpdate::default()).await,
            Err(AppError::Validation { .. })
        ));
        assert!(matches!(
            service.deactivate_tenant(Uuid::new_v4()).await,
            Err(AppError::NotFound { .. })
        ));
    }
}
