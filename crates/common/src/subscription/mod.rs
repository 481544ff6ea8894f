//! Subscription and usage-limit gate
//!
//! A [`UsageGate`] is built from the owner's plan and a usage snapshot read
//! once at load time. Checks never re-fetch.
//!
//! The gate is advisory. Nothing serializes "check, then create" across
//! sessions: two sessions of the same tenant may both pass a check and both
//! write, ending above the nominal limit. This is a known limitation; the
//! counters are not transactionally guarded.

use crate::db::models::NewSubscriptionHistory;
use crate::db::{Repository, TenantUsage};
use crate::errors::{AppError, Result};
use crate::metrics;
use crate::sectors::{self, PlanLimits, SubscriptionPlan};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::fmt;
use std::str::FromStr;
use tracing::{info, warn};
use uuid::Uuid;

/// Length of one paid billing period
pub const BILLING_PERIOD_DAYS: i64 = 30;

const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    #[default]
    Active,
    Canceled,
    PastDue,
    Trialing,
}

impl SubscriptionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubscriptionStatus::Active => "active",
            SubscriptionStatus::Canceled => "canceled",
            SubscriptionStatus::PastDue => "past_due",
            SubscriptionStatus::Trialing => "trialing",
        }
    }
}

impl fmt::Display for SubscriptionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SubscriptionStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "active" => Ok(SubscriptionStatus::Active),
            "canceled" => Ok(SubscriptionStatus::Canceled),
            "past_due" => Ok(SubscriptionStatus::PastDue),
            "trialing" => Ok(SubscriptionStatus::Trialing),
            other => Err(format!("unknown subscription status '{}'", other)),
        }
    }
}

/// Who holds the subscription
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum SubscriptionOwner {
    Tenant(Uuid),
    Personal(Uuid),
}

/// Action to admit or deny
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum UsageAction {
    CreateItem,
    AddUser,
    UploadFile {
        #[serde(default)]
        size_bytes: u64,
    },
}

/// Usage counters captured at load time
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Usage {
    pub current_users: i64,
    pub current_items: i64,
    pub current_storage_mb: i64,
}

impl From<TenantUsage> for Usage {
    fn from(usage: TenantUsage) -> Self {
        Self {
            current_users: usage.current_users,
            current_items: usage.current_encrypted_items,
            current_storage_mb: usage.current_storage_mb,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct UsagePercentage {
    pub users: i64,
    pub items: i64,
    pub storage: i64,
}

fn percentage(current: i64, max: i64) -> i64 {
    if max <= 0 {
        return if current > 0 { 100 } else { 0 };
    }
    ((current as f64 / max as f64) * 100.0).round() as i64
}

/// Plan, status and usage of one owner
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SubscriptionInfo {
    pub owner: SubscriptionOwner,
    pub sector: Option<String>,
    pub plan: SubscriptionPlan,
    pub status: SubscriptionStatus,
    pub expires_at: Option<DateTime<Utc>>,
    pub usage: Usage,
    pub limits: PlanLimits,
    pub features: &'static [&'static str],
    pub usage_percentage: UsagePercentage,
    pub can_upgrade: bool,
    pub can_downgrade: bool,
}

impl SubscriptionInfo {
    fn new(
        owner: SubscriptionOwner,
        sector: Option<String>,
        plan: SubscriptionPlan,
        status: SubscriptionStatus,
        expires_at: Option<DateTime<Utc>>,
        usage: Usage,
    ) -> Self {
        let limits = limits_for(sector.as_deref(), plan);
        Self {
            owner,
            sector,
            plan,
            status,
            expires_at,
            usage,
            limits,
            features: plan_features(plan),
            usage_percentage: UsagePercentage {
                users: percentage(usage.current_users, limits.max_users),
                items: percentage(usage.current_items, limits.max_items),
                storage: percentage(usage.current_storage_mb, limits.max_storage_mb),
            },
            can_upgrade: plan != SubscriptionPlan::Enterprise,
            can_downgrade: plan != SubscriptionPlan::Free,
        }
    }
}

/// Limits of `plan` in `sector`, or the fallback table without a sector
pub fn limits_for(sector: Option<&str>, plan: SubscriptionPlan) -> PlanLimits {
    sector
        .and_then(sectors::sector_config)
        .map(|config| config.limits(plan))
        .unwrap_or(PlanLimits::FALLBACK)
}

/// Result of a gate check
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum Decision {
    Allowed,
    Denied {
        resource: &'static str,
        limit: i64,
        reason: String,
    },
}

impl Decision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Decision::Allowed)
    }

    pub fn reason(&self) -> Option<&str> {
        match self {
            Decision::Allowed => None,
            Decision::Denied { reason, .. } => Some(reason),
        }
    }

    /// Convert a denial into `LimitExceeded`
    pub fn into_result(self) -> Result<()> {
        match self {
            Decision::Allowed => Ok(()),
            Decision::Denied {
                resource,
                limit,
                reason,
            } => Err(AppError::LimitExceeded {
                resource: resource.to_string(),
                limit,
                reason,
            }),
        }
    }
}

/// Admit/deny actions against a usage snapshot
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UsageGate {
    info: SubscriptionInfo,
}

impl UsageGate {
    pub fn new(info: SubscriptionInfo) -> Self {
        Self { info }
    }

    pub fn info(&self) -> &SubscriptionInfo {
        &self.info
    }

    pub fn into_info(self) -> SubscriptionInfo {
        self.info
    }

    pub fn check(&self, action: UsageAction) -> Decision {
        let usage = &self.info.usage;
        let limits = &self.info.limits;

        let decision = match action {
            UsageAction::CreateItem if usage.current_items >= limits.max_items => Decision::Denied {
                resource: "items",
                limit: limits.max_items,
                reason: format!(
                    "Maximum {} item limit reached. Upgrade your plan to create more items.",
                    limits.max_items
                ),
            },
            UsageAction::AddUser if usage.current_users >= limits.max_users => Decision::Denied {
                resource: "users",
                limit: limits.max_users,
                reason: format!(
                    "Maximum {} user limit reached. Upgrade your plan to add more users.",
                    limits.max_users
                ),
            },
            UsageAction::UploadFile { size_bytes } => {
                let size_mb = (size_bytes as f64 / BYTES_PER_MB).round() as i64;
                if usage.current_storage_mb + size_mb > limits.max_storage_mb {
                    Decision::Denied {
                        resource: "storage",
                        limit: limits.max_storage_mb,
                        reason: format!(
                            "Storage limit exceeded. You have {}MB available.",
                            limits.max_storage_mb
                        ),
                    }
                } else {
                    Decision::Allowed
                }
            }
            _ => Decision::Allowed,
        };

        if let Decision::Denied { resource, .. } = &decision {
            metrics::record_limit_denial(resource);
        }
        decision
    }
}

/// Public price sheet entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlanDetails {
    pub id: SubscriptionPlan,
    pub name: &'static str,
    pub price: u32,
    pub currency: &'static str,
    pub billing: &'static str,
    pub limits: PlanLimits,
    pub popular: bool,
    pub features: &'static [&'static str],
}

pub fn plan_features(plan: SubscriptionPlan) -> &'static [&'static str] {
    match plan {
        SubscriptionPlan::Free => &["Basic encryption", "Personal use only", "Community support"],
        SubscriptionPlan::Basic => &[
            "Advanced encryption",
            "Team collaboration",
            "Email support",
            "Basic analytics",
        ],
        SubscriptionPlan::Premium => &[
            "Enterprise encryption",
            "Advanced team features",
            "Priority support",
            "Advanced analytics",
            "Custom integrations",
        ],
        SubscriptionPlan::Enterprise => &[
            "Custom encryption",
            "Unlimited team features",
            "Dedicated support",
            "Custom analytics",
            "White-label options",
            "SLA guarantee",
        ],
    }
}

pub fn plan_details(plan: SubscriptionPlan) -> PlanDetails {
    let (name, price, limits, popular) = match plan {
        SubscriptionPlan::Free => ("Free", 0, PlanLimits::new(1, 10, 100), false),
        SubscriptionPlan::Basic => ("Basic", 29, PlanLimits::new(5, 100, 1000), false),
        SubscriptionPlan::Premium => ("Premium", 99, PlanLimits::new(20, 500, 5000), true),
        SubscriptionPlan::Enterprise => ("Enterprise", 299, PlanLimits::new(100, 2000, 20000), false),
    };
    PlanDetails {
        id: plan,
        name,
        price,
        currency: "USD",
        billing: "monthly",
        limits,
        popular,
        features: plan_features(plan),
    }
}

/// Loads gates and applies plan changes
#[derive(Clone)]
pub struct SubscriptionService {
    repo: Repository,
}

impl SubscriptionService {
    pub fn new(repo: Repository) -> Self {
        Self { repo }
    }

    /// Read plan and usage for `owner` and build a gate over them
    pub async fn load(&self, owner: SubscriptionOwner) -> Result<UsageGate> {
        let info = match owner {
            SubscriptionOwner::Tenant(id) => {
                let tenant = self.repo.find_tenant_by_id(id).await?.ok_or_else(|| AppError::NotFound {
                    resource_type: "tenant".to_string(),
                    id: id.to_string(),
                })?;
                let usage = self.repo.tenant_usage(id).await?.unwrap_or_default();

                SubscriptionInfo::new(
                    owner,
                    Some(tenant.sector),
                    tenant.subscription_plan,
                    parse_status(Some(&tenant.subscription_status)),
                    tenant.subscription_expires_at,
                    usage.into(),
                )
            }
            SubscriptionOwner::Personal(user_id) => {
                let profile = self.repo.find_profile(user_id).await?;
                let items = self.repo.count_records(user_id, None).await?;
                let usage = Usage {
                    current_users: 1,
                    current_items: items as i64,
                    current_storage_mb: 0,
                };

                let (plan, status, expires_at) = match profile {
                    Some(p) => (
                        p.subscription_plan,
                        parse_status(p.subscription_status.as_deref()),
                        p.subscription_expires_at,
                    ),
                    None => (SubscriptionPlan::Free, SubscriptionStatus::Active, None),
                };
                SubscriptionInfo::new(owner, None, plan, status, expires_at, usage)
            }
        };

        Ok(UsageGate::new(info))
    }

    /// Move `owner` to `plan` for one billing period
    ///
    /// Writes a history row first, then updates the holder. Tenants get the
    /// limits of their own sector's plan table.
    pub async fn upgrade_plan(
        &self,
        actor: Uuid,
        owner: SubscriptionOwner,
        plan: SubscriptionPlan,
        payment_method: Option<&str>,
    ) -> Result<UsageGate> {
        let current = self.load(owner).await?.into_info();
        let details = plan_details(plan);
        let now = Utc::now();
        let period_end = now + Duration::days(BILLING_PERIOD_DAYS);

        let tenant_id = match owner {
            SubscriptionOwner::Tenant(id) => Some(id),
            SubscriptionOwner::Personal(_) => None,
        };

        self.repo
            .insert_subscription_history(&NewSubscriptionHistory {
                user_id: actor,
                tenant_id,
                plan,
                status: SubscriptionStatus::Active.to_string(),
                amount: details.price,
                currency: details.currency.to_string(),
                payment_method: payment_method.unwrap_or("stripe").to_string(),
                payment_provider: "stripe".to_string(),
                period_start: now,
                period_end,
                metadata: json!({ "upgraded_from": current.plan }),
            })
            .await?;

        match owner {
            SubscriptionOwner::Tenant(id) => {
                let limits = limits_for(current.sector.as_deref(), plan);
                self.repo
                    .update_tenant(
                        id,
                        json!({
                            "subscription_plan": plan,
                            "subscription_status": SubscriptionStatus::Active,
                            "subscription_expires_at": period_end,
                            "max_users": limits.max_users,
                            "max_encrypted_items": limits.max_items,
                            "max_storage_mb": limits.max_storage_mb,
                            "updated_at": now,
                        }),
                    )
                    .await?;
            }
            SubscriptionOwner::Personal(user_id) => {
                self.repo
                    .update_profile(
                        user_id,
                        json!({
                            "subscription_plan": plan,
                            "subscription_status": SubscriptionStatus::Active,
                            "subscription_expires_at": period_end,
                        }),
                    )
                    .await?;
            }
        }

        info!(
            owner = ?owner,
            from = %current.plan,
            to = %plan,
            amount = details.price,
            "Subscription plan changed"
        );

        self.load(owner).await
    }

    /// Mark the subscription canceled; the plan stays until expiry
    pub async fn cancel(&self, owner: SubscriptionOwner) -> Result<UsageGate> {
        let patch = json!({ "subscription_status": SubscriptionStatus::Canceled });
        match owner {
            SubscriptionOwner::Tenant(id) => {
                self.repo.update_tenant(id, patch).await?;
            }
            SubscriptionOwner::Personal(user_id) => {
                self.repo.update_profile(user_id, patch).await?;
            }
        }
        info!(owner = ?owner, "Subscription canceled");
        self.load(owner).await
    }
}

fn parse_status(raw: Option<&str>) -> SubscriptionStatus {
    match raw {
        None => SubscriptionStatus::Active,
        Some(s) => s.parse().unwrap_or_else(|e: String| {
            warn!(error = %e, "Treating unknown subscription status as active");
            SubscriptionStatus::Active
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{MemoryStore, RowStore};
    use std::sync::Arc;

    fn gate(plan: SubscriptionPlan, sector: Option<&str>, usage: Usage) -> UsageGate {
        UsageGate::new(SubscriptionInfo::new(
            SubscriptionOwner::Tenant(Uuid::new_v4()),
            sector.map(String::from),
            plan,
            SubscriptionStatus::Active,
            None,
            usage,
        ))
    }

    fn items(n: i64) -> Usage {
        Usage {
            current_items: n,
            ..Default::default()
        }
    }

    #[test]
    fn test_free_plan_item_limit() {
        let full = gate(SubscriptionPlan::Free, Some("dentist"), items(10));
        let decision = full.check(UsageAction::CreateItem);
        assert!(!decision.is_allowed());
        assert!(decision.reason().unwrap().contains("10"));
        assert_eq!(
            decision.reason(),
            Some("Maximum 10 item limit reached. Upgrade your plan to create more items.")
        );

        let almost = gate(SubscriptionPlan::Free, Some("dentist"), items(9));
        assert!(almost.check(UsageAction::CreateItem).is_allowed());
    }

    #[test]
    fn test_user_limit_uses_sector_table() {
        let usage = Usage {
            current_users: 3,
            ..Default::default()
        };
        // dentist basic allows 3 users, beauty basic allows 5
        assert!(!gate(SubscriptionPlan::Basic, Some("dentist"), usage)
            .check(UsageAction::AddUser)
            .is_allowed());
        assert!(gate(SubscriptionPlan::Basic, Some("beauty"), usage)
            .check(UsageAction::AddUser)
            .is_allowed());
    }

    #[test]
    fn test_upload_rounds_to_megabytes() {
        let usage = Usage {
            current_storage_mb: 99,
            ..Default::default()
        };
        let gate = gate(SubscriptionPlan::Free, None, usage);

        // 1.4 MiB rounds to 1 MB, 99 + 1 fits in 100
        assert!(gate
            .check(UsageAction::UploadFile { size_bytes: 1_468_006 })
            .is_allowed());
        // 1.6 MiB rounds to 2 MB
        let denied = gate.check(UsageAction::UploadFile { size_bytes: 1_677_722 });
        assert_eq!(
            denied.reason(),
            Some("Storage limit exceeded. You have 100MB available.")
        );
        assert!(matches!(
            denied.into_result(),
            Err(AppError::LimitExceeded { limit: 100, .. })
        ));
    }

    #[test]
    fn test_info_flags_and_percentages() {
        let info = gate(SubscriptionPlan::Free, Some("retail"), items(3)).into_info();
        assert_eq!(info.usage_percentage.items, 30);
        assert!(info.can_upgrade);
        assert!(!info.can_downgrade);

        let info = gate(SubscriptionPlan::Enterprise, None, items(0)).into_info();
        assert_eq!(info.limits, PlanLimits::FALLBACK);
        assert!(!info.can_upgrade);
        assert!(info.can_downgrade);
    }

    #[test]
    fn test_plan_details() {
        assert_eq!(plan_details(SubscriptionPlan::Basic).price, 29);
        assert!(plan_details(SubscriptionPlan::Premium).popular);
        assert_eq!(plan_details(SubscriptionPlan::Enterprise).currency, "USD");
        assert_eq!(plan_details(SubscriptionPlan::Free).features.len(), 3);
    }

    #[test]
    fn test_action_wire_format() {
        let action: UsageAction =
            serde_json::from_value(json!({ "action": "upload_file", "size_bytes": 42 })).unwrap();
        assert_eq!(action, UsageAction::UploadFile { size_bytes: 42 });
        let action: UsageAction = serde_json::from_value(json!({ "action": "create_item" })).unwrap();
        assert_eq!(action, UsageAction::CreateItem);
    }

    async fn seeded() -> (SubscriptionService, MemoryStore, Uuid) {
        let store = MemoryStore::new();
        let tenant_id = Uuid::new_v4();
        store
            .seed(
                "tenants",
                json!({
                    "id": tenant_id,
                    "name": "Salon B",
                    "slug": "salon-b",
                    "sector": "beauty",
                    "subscription_plan": "free",
                    "subscription_status": "active",
                    "current_users": 1,
                    "current_encrypted_items": 10,
                    "current_storage_mb": 5,
                    "status": "active",
                    "created_at": "2025-01-01T00:00:00Z",
                    "updated_at": "2025-01-01T00:00:00Z",
                }),
            )
            .await;
        let service = SubscriptionService::new(Repository::new(Arc::new(store.clone())));
        (service, store, tenant_id)
    }

    #[tokio::test]
    async fn test_load_tenant_gate() {
        let (service, _, tenant_id) = seeded().await;
        let gate = service.load(SubscriptionOwner::Tenant(tenant_id)).await.unwrap();

        assert_eq!(gate.info().usage.current_items, 10);
        assert_eq!(gate.info().sector.as_deref(), Some("beauty"));
        assert!(!gate.check(UsageAction::CreateItem).is_allowed());
        assert!(matches!(
            service.load(SubscriptionOwner::Tenant(Uuid::new_v4())).await,
            Err(AppError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_gate_uses_snapshot() {
        let (service, store, tenant_id) = seeded().await;
        let gate = service.load(SubscriptionOwner::Tenant(tenant_id)).await.unwrap();

        store
            .update(
                &crate::db::Query::table("tenants").eq("id", tenant_id),
                json!({ "current_encrypted_items": 0 }),
            )
            .await
            .unwrap();

        // no re-fetch until a new gate is loaded
        assert!(!gate.check(UsageAction::CreateItem).is_allowed());
        let fresh = service.load(SubscriptionOwner::Tenant(tenant_id)).await.unwrap();
        assert!(fresh.check(UsageAction::CreateItem).is_allowed());
    }

    #[tokio::test]
    async fn test_personal_usage_counts_records() {
        let store = MemoryStore::new();
        let user_id = Uuid::new_v4();
        for _ in 0..4 {
            store
                .seed("encrypted_data", json!({ "user_id": user_id, "data_type": "notes" }))
                .await;
        }
        let service = SubscriptionService::new(Repository::new(Arc::new(store)));

        let info = service.load(SubscriptionOwner::Personal(user_id)).await.unwrap().into_info();
        assert_eq!(info.plan, SubscriptionPlan::Free);
        assert_eq!(info.usage.current_users, 1);
        assert_eq!(info.usage.current_items, 4);
        assert_eq!(info.limits, PlanLimits::FALLBACK);
    }

    #[tokio::test]
    async fn test_upgrade_uses_own_sector_limits() {
        let (service, store, tenant_id) = seeded().await;
        let actor = Uuid::new_v4();

        let gate = service
            .upgrade_plan(actor, SubscriptionOwner::Tenant(tenant_id), SubscriptionPlan::Basic, None)
            .await
            .unwrap();
        let info = gate.info();
        assert_eq!(info.plan, SubscriptionPlan::Basic);
        assert!(info.expires_at.is_some());
        assert!(gate.check(UsageAction::CreateItem).is_allowed());

        let tenant = &store.rows("tenants").await[0];
        // beauty basic, not dentist basic
        assert_eq!(tenant["max_users"], 5);
        assert_eq!(tenant["max_encrypted_items"], 150);

        let history = store.rows("subscription_history").await;
        assert_eq!(history.len(), 1);
        assert_eq!(history[0]["amount"], 29);
        assert_eq!(history[0]["metadata"]["upgraded_from"], "free");
        assert_eq!(history[0]["payment_method"], "stripe");
    }

    #[tokio::test]
    async fn test_cancel_keeps_plan() {
        let (service, _, tenant_id) = seeded().await;
        let owner = SubscriptionOwner::Tenant(tenant_id);
        service
            .upgrade_plan(Uuid::new_v4(), owner, SubscriptionPlan::Premium, Some("card"))
            .await
            .unwrap();

        let info = service.cancel(owner).await.unwrap().into_info();
        assert_eq!(info.status, SubscriptionStatus::Canceled);
        assert_eq!(info.plan, SubscriptionPlan::Premium);
    }
}
