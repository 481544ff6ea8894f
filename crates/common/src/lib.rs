//! SectorSite Common Library
//!
//! Shared code for the SectorSite services including:
//! - Sector catalogue and plan limits
//! - Tenant resolution from request locations
//! - Field encryption for at-rest user data
//! - Subscription and usage-limit gating
//! - Backing store access and authentication
//! - Error types, configuration and metrics

pub mod auth;
pub mod config;
pub mod crypto;
pub mod db;
pub mod errors;
pub mod metrics;
pub mod sectors;
pub mod subscription;
pub mod tenancy;
pub mod vault;

// Re-export commonly used types
pub use config::AppConfig;
pub use crypto::FieldCodec;
pub use db::{Repository, RowStore};
pub use errors::{AppError, Result};
pub use subscription::{SubscriptionService, UsageGate};
pub use tenancy::{ResolutionSession, TenantResolver, TenantView};
pub use vault::Vault;

/// Application version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
