//! Row models for the backing store
//!
//! Rows are exchanged as JSON with the remote store and decoded with serde.

mod encrypted_record;
mod profile;
mod subscription_history;
mod tenant;

pub use tenant::{
    Model as Tenant,
    NewTenantRow,
    TenantStatus,
    TenantUpdate,
};

pub use encrypted_record::{
    AccessLevel,
    Model as EncryptedRecord,
    NewEncryptedRecord,
};

pub use profile::{
    Model as Profile,
    ProfileRole,
};

pub use subscription_history::NewSubscriptionHistory;

/// Table names
pub mod tables {
    pub const TENANTS: &str = "tenants";
    pub const PROFILES: &str = "profiles";
    pub const ENCRYPTED_DATA: &str = "encrypted_data";
    pub const SUBSCRIPTION_HISTORY: &str = "subscription_history";
}
