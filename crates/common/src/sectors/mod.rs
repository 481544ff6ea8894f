//! Static sector catalog
//!
//! Each sector (dentistry, beauty, restaurant, ...) carries its own branding,
//! feature list and per-plan resource limits. The catalog is compiled in and
//! never reloaded.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Subscription plan tiers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubscriptionPlan {
    #[default]
    Free,
    Basic,
    Premium,
    Enterprise,
}

impl SubscriptionPlan {
    pub const ALL: [SubscriptionPlan; 4] = [
        SubscriptionPlan::Free,
        SubscriptionPlan::Basic,
        SubscriptionPlan::Premium,
        SubscriptionPlan::Enterprise,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SubscriptionPlan::Free => "free",
            SubscriptionPlan::Basic => "basic",
            SubscriptionPlan::Premium => "premium",
            SubscriptionPlan::Enterprise => "enterprise",
        }
    }
}

impl fmt::Display for SubscriptionPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SubscriptionPlan {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "free" => Ok(SubscriptionPlan::Free),
            "basic" => Ok(SubscriptionPlan::Basic),
            "premium" => Ok(SubscriptionPlan::Premium),
            "enterprise" => Ok(SubscriptionPlan::Enterprise),
            other => Err(format!("unknown subscription plan '{}'", other)),
        }
    }
}

/// Page layout family used by tenant sites
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Layout {
    Clinic,
    Salon,
    Restaurant,
    Retail,
    Service,
}

/// Resource limits for one plan
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanLimits {
    pub max_users: i64,
    pub max_items: i64,
    pub max_storage_mb: i64,
}

impl PlanLimits {
    /// Limits used when no sector is known (personal accounts)
    pub const FALLBACK: PlanLimits = PlanLimits::new(1, 10, 100);

    pub const fn new(max_users: i64, max_items: i64, max_storage_mb: i64) -> Self {
        Self {
            max_users,
            max_items,
            max_storage_mb,
        }
    }
}

/// Per-plan limit table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PlanTable {
    pub free: PlanLimits,
    pub basic: PlanLimits,
    pub premium: PlanLimits,
    pub enterprise: PlanLimits,
}

impl PlanTable {
    pub fn get(&self, plan: SubscriptionPlan) -> PlanLimits {
        match plan {
            SubscriptionPlan::Free => self.free,
            SubscriptionPlan::Basic => self.basic,
            SubscriptionPlan::Premium => self.premium,
            SubscriptionPlan::Enterprise => self.enterprise,
        }
    }
}

/// Static configuration for one business sector
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SectorConfig {
    pub id: &'static str,
    pub name: &'static str,
    pub display_name: &'static str,
    pub primary_color: &'static str,
    pub secondary_color: &'static str,
    pub icon: &'static str,
    pub features: &'static [&'static str],
    pub default_layout: Layout,
    /// Short subdomain label, e.g. `dent` for dentist
    pub subdomain: &'static str,
    pub plans: PlanTable,
}

impl SectorConfig {
    /// Limits for the given plan in this sector
    pub fn limits(&self, plan: SubscriptionPlan) -> PlanLimits {
        self.plans.get(plan)
    }

    pub fn has_feature(&self, feature: &str) -> bool {
        self.features.contains(&feature)
    }
}

static SECTORS: [SectorConfig; 5] = [
    SectorConfig {
        id: "dentist",
        name: "dentist",
        display_name: "Diş Hekimliği",
        primary_color: "#0ea5e9",
        secondary_color: "#e0f2fe",
        icon: "🦷",
        features: &["appointments", "patient-records", "treatments", "billing"],
        default_layout: Layout::Clinic,
        subdomain: "dent",
        plans: PlanTable {
            free: PlanLimits::new(1, 10, 100),
            basic: PlanLimits::new(3, 100, 1000),
            premium: PlanLimits::new(10, 500, 5000),
            enterprise: PlanLimits::new(50, 2000, 20000),
        },
    },
    SectorConfig {
        id: "beauty",
        name: "beauty",
        display_name: "Güzellik & Estetik",
        primary_color: "#ec4899",
        secondary_color: "#fdf2f8",
        icon: "💄",
        features: &["appointments", "services", "products", "gallery"],
        default_layout: Layout::Salon,
        subdomain: "beauty",
        plans: PlanTable {
            free: PlanLimits::new(1, 10, 100),
            basic: PlanLimits::new(5, 150, 1500),
            premium: PlanLimits::new(15, 750, 7500),
            enterprise: PlanLimits::new(75, 3000, 30000),
        },
    },
    SectorConfig {
        id: "restaurant",
        name: "restaurant",
        display_name: "Restoran & Cafe",
        primary_color: "#f59e0b",
        secondary_color: "#fffbeb",
        icon: "🍽️",
        features: &["menu", "orders", "reservations", "delivery"],
        default_layout: Layout::Restaurant,
        subdomain: "rest",
        plans: PlanTable {
            free: PlanLimits::new(1, 10, 100),
            basic: PlanLimits::new(5, 200, 2000),
            premium: PlanLimits::new(20, 1000, 10000),
            enterprise: PlanLimits::new(100, 5000, 50000),
        },
    },
    SectorConfig {
        id: "fitness",
        name: "fitness",
        display_name: "Fitness & Spor",
        primary_color: "#10b981",
        secondary_color: "#ecfdf5",
        icon: "💪",
        features: &["memberships", "classes", "trainers", "equipment"],
        default_layout: Layout::Service,
        subdomain: "fit",
        plans: PlanTable {
            free: PlanLimits::new(1, 10, 100),
            basic: PlanLimits::new(5, 100, 1000),
            premium: PlanLimits::new(15, 500, 5000),
            enterprise: PlanLimits::new(50, 2000, 20000),
        },
    },
    SectorConfig {
        id: "retail",
        name: "retail",
        display_name: "Perakende & Mağaza",
        primary_color: "#8b5cf6",
        secondary_color: "#f5f3ff",
        icon: "🛍️",
        features: &["inventory", "sales", "customers", "analytics"],
        default_layout: Layout::Retail,
        subdomain: "retail",
        plans: PlanTable {
            free: PlanLimits::new(1, 10, 100),
            basic: PlanLimits::new(3, 100, 1000),
            premium: PlanLimits::new(10, 500, 5000),
            enterprise: PlanLimits::new(30, 2000, 20000),
        },
    },
];

/// Look up a sector by identifier
pub fn sector_config(id: &str) -> Option<&'static SectorConfig> {
    SECTORS.iter().find(|s| s.id == id)
}

/// All sectors in catalog order
pub fn sector_list() -> &'static [SectorConfig] {
    &SECTORS
}

pub fn is_known_sector(id: &str) -> bool {
    sector_config(id).is_some()
}

/// Short subdomain label for a sector, `app` when unknown
pub fn sector_subdomain(sector: &str) -> &'static str {
    sector_config(sector).map(|s| s.subdomain).unwrap_or("app")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_catalog_order_and_lookup() {
        let ids: Vec<_> = sector_list().iter().map(|s| s.id).collect();
        assert_eq!(ids, ["dentist", "beauty", "restaurant", "fitness", "retail"]);
        assert!(is_known_sector("beauty"));
        assert!(!is_known_sector("cozumler"));
        assert!(sector_config("Dentist").is_none());
    }

    #[test]
    fn test_plan_limits() {
        let dentist = sector_config("dentist").unwrap();
        assert_eq!(dentist.limits(SubscriptionPlan::Free), PlanLimits::new(1, 10, 100));
        assert_eq!(dentist.limits(SubscriptionPlan::Enterprise).max_users, 50);

        let restaurant = sector_config("restaurant").unwrap();
        assert_eq!(restaurant.limits(SubscriptionPlan::Premium).max_items, 1000);
    }

    #[test]
    fn test_subdomains() {
        assert_eq!(sector_subdomain("dentist"), "dent");
        assert_eq!(sector_subdomain("fitness"), "fit");
        assert_eq!(sector_subdomain("unknown"), "app");
    }

    #[test]
    fn test_plan_parsing() {
        assert_eq!("premium".parse::<SubscriptionPlan>(), Ok(SubscriptionPlan::Premium));
        assert!("gold".parse::<SubscriptionPlan>().is_err());
        assert_eq!(SubscriptionPlan::Basic.to_string(), "basic");
    }
}
