//! Tenant row

use crate::sectors::{PlanLimits, SubscriptionPlan};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Operational status. Tenants are never hard-deleted, only set to `Inactive`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TenantStatus {
    #[default]
    Active,
    Suspended,
    Inactive,
}

impl TenantStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TenantStatus::Active => "active",
            TenantStatus::Suspended => "suspended",
            TenantStatus::Inactive => "inactive",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Model {
    pub id: Uuid,

    pub name: String,

    /// Unique within `sector`, not globally
    pub slug: String,

    pub sector: String,

    #[serde(default)]
    pub domain: Option<String>,

    #[serde(default)]
    pub subdomain: Option<String>,

    #[serde(default)]
    pub subscription_plan: SubscriptionPlan,

    #[serde(default = "default_subscription_status")]
    pub subscription_status: String,

    #[serde(default)]
    pub subscription_expires_at: Option<DateTime<Utc>>,

    #[serde(default)]
    pub max_users: i64,

    #[serde(default)]
    pub max_encrypted_items: i64,

    #[serde(default)]
    pub max_storage_mb: i64,

    #[serde(default)]
    pub current_users: i64,

    #[serde(default)]
    pub current_encrypted_items: i64,

    #[serde(default)]
    pub current_storage_mb: i64,

    #[serde(default)]
    pub settings: serde_json::Value,

    #[serde(default)]
    pub branding: serde_json::Value,

    #[serde(default)]
    pub status: TenantStatus,

    pub created_at: DateTime<Utc>,

    pub updated_at: DateTime<Utc>,
}

fn default_subscription_status() -> String {
    "active".to_string()
}

impl Model {
    pub fn is_active(&self) -> bool {
        self.status == TenantStatus::Active
    }

    /// Limits recorded on the row at provisioning / upgrade time
    pub fn stored_limits(&self) -> PlanLimits {
        PlanLimits::new(self.max_users, self.max_encrypted_items, self.max_storage_mb)
    }
}

/// Insert payload for a new tenant
#[derive(Clone, Debug, Serialize)]
pub struct NewTenantRow {
    pub name: String,
    pub slug: String,
    pub sector: String,
    pub domain: Option<String>,
    pub subdomain: Option<String>,
    pub subscription_plan: SubscriptionPlan,
    pub max_users: i64,
    pub max_encrypted_items: i64,
    pub max_storage_mb: i64,
    pub status: TenantStatus,
}

/// Partial update; `None` fields are left untouched
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct TenantUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub subdomain: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub settings: Option<serde_json::Value>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub branding: Option<serde_json::Value>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<TenantStatus>,
}

impl TenantUpdate {
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.domain.is_none()
            && self.subdomain.is_none()
            && self.settings.is_none()
            && self.branding.is_none()
            && self.status.is_none()
    }
}
