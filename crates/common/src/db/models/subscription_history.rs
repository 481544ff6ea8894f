//! Subscription history row, one per plan change

use crate::sectors::SubscriptionPlan;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NewSubscriptionHistory {
    pub user_id: Uuid,
    pub tenant_id: Option<Uuid>,
    pub plan: SubscriptionPlan,
    pub status: String,
    pub amount: u32,
    pub currency: String,
    pub payment_method: String,
    pub payment_provider: String,
    pub period_start: DateTime<Utc>,
    pub period_end: DateTime<Utc>,
    pub metadata: serde_json::Value,
}
