//! User profile row (personal subscription holder)

use crate::sectors::SubscriptionPlan;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProfileRole {
    Owner,
    Admin,
    #[default]
    Member,
    Viewer,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Model {
    pub id: Uuid,

    #[serde(default)]
    pub tenant_id: Option<Uuid>,

    #[serde(default)]
    pub first_name: Option<String>,

    #[serde(default)]
    pub last_name: Option<String>,

    #[serde(default)]
    pub email: Option<String>,

    #[serde(default)]
    pub company: Option<String>,

    #[serde(default)]
    pub role: ProfileRole,

    #[serde(default)]
    pub subscription_plan: SubscriptionPlan,

    #[serde(default)]
    pub subscription_status: Option<String>,

    #[serde(default)]
    pub subscription_expires_at: Option<DateTime<Utc>>,

    #[serde(default = "default_true")]
    pub is_active: bool,

    pub created_at: DateTime<Utc>,

    pub updated_at: DateTime<Utc>,
}

fn default_true() -> bool {
    true
}
