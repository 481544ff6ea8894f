//! Repository pattern for backing-store operations
//!
//! Provides typed access to tenants, profiles, encrypted records and
//! subscription history on top of any [`RowStore`].

use crate::db::models::*;
use crate::db::store::{Query, RowStore};
use crate::errors::{AppError, Result};
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use uuid::Uuid;

/// Usage counters of one tenant
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TenantUsage {
    #[serde(default)]
    pub current_users: i64,
    #[serde(default)]
    pub current_encrypted_items: i64,
    #[serde(default)]
    pub current_storage_mb: i64,
}

/// Listing options for encrypted records
#[derive(Debug, Clone, Deserialize)]
pub struct ListOptions {
    #[serde(default)]
    pub limit: Option<u64>,
    #[serde(default)]
    pub offset: Option<u64>,
    #[serde(default = "default_order_by")]
    pub order_by: String,
    #[serde(default)]
    pub ascending: bool,
}

fn default_order_by() -> String {
    "created_at".to_string()
}

impl Default for ListOptions {
    fn default() -> Self {
        Self {
            limit: None,
            offset: None,
            order_by: default_order_by(),
            ascending: false,
        }
    }
}

/// Repository for data access operations
#[derive(Clone)]
pub struct Repository {
    store: Arc<dyn RowStore>,
    tenant_table: String,
}

impl Repository {
    /// Create a new repository over the given store
    pub fn new(store: Arc<dyn RowStore>) -> Self {
        Self {
            store,
            tenant_table: tables::TENANTS.to_string(),
        }
    }

    /// Use a non-default tenants table name
    pub fn with_tenant_table(mut self, table: impl Into<String>) -> Self {
        self.tenant_table = table.into();
        self
    }

    /// Same repository acting on behalf of a user session
    pub fn for_session(&self, access_token: &str) -> Self {
        Self {
            store: self.store.with_access_token(access_token),
            tenant_table: self.tenant_table.clone(),
        }
    }

    /// Underlying store
    pub fn store(&self) -> &Arc<dyn RowStore> {
        &self.store
    }

    // ========================================================================
    // Health Check
    // ========================================================================

    /// Ping the store
    pub async fn ping(&self) -> Result<()> {
        self.store.ping().await
    }

    // ========================================================================
    // Row decoding helpers
    // ========================================================================

    fn decode<T: DeserializeOwned>(row: Value) -> Result<T> {
        serde_json::from_value(row).map_err(Into::into)
    }

    fn decode_all<T: DeserializeOwned>(rows: Vec<Value>) -> Result<Vec<T>> {
        rows.into_iter().map(Self::decode).collect()
    }

    /// Exactly one row, or `None` for zero or several matches
    async fn fetch_single<T: DeserializeOwned>(&self, query: Query) -> Result<Option<T>> {
        let table = query.table.clone();
        let mut rows = self.store.select(&query.limit(2)).await?;
        match rows.len() {
            1 => Self::decode(rows.remove(0)).map(Some),
            0 => Ok(None),
            n => {
                tracing::warn!(table = %table, matches = n, "Expected a single row, treating as not found");
                Ok(None)
            }
        }
    }

    // ========================================================================
    // Tenant Operations
    // ========================================================================

    /// Find the active tenant with `slug` in `sector`
    pub async fn find_active_tenant(&self, sector: &str, slug: &str) -> Result<Option<Tenant>> {
        let query = Query::table(&self.tenant_table)
            .eq("sector", sector)
            .eq("slug", slug)
            .eq("status", TenantStatus::Active.as_str());
        self.fetch_single(query).await
    }

    /// Find tenant by ID
    pub async fn find_tenant_by_id(&self, id: Uuid) -> Result<Option<Tenant>> {
        self.fetch_single(Query::table(&self.tenant_table).eq("id", id)).await
    }

    /// Whether `slug` is already used in `sector` (any status)
    pub async fn tenant_slug_taken(&self, sector: &str, slug: &str) -> Result<bool> {
        let query = Query::table(&self.tenant_table)
            .eq("sector", sector)
            .eq("slug", slug);
        Ok(self.store.count(&query).await? > 0)
    }

    /// Current usage counters of a tenant
    pub async fn tenant_usage(&self, id: Uuid) -> Result<Option<TenantUsage>> {
        let query = Query::table(&self.tenant_table)
            .columns("current_users,current_encrypted_items,current_storage_mb")
            .eq("id", id);
        self.fetch_single(query).await
    }

    /// Active tenants with the given ids
    pub async fn list_active_tenants(&self, ids: &[Uuid]) -> Result<Vec<Tenant>> {
        let mut tenants = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(tenant) = self.find_tenant_by_id(*id).await? {
                if tenant.is_active() {
                    tenants.push(tenant);
                }
            }
        }
        Ok(tenants)
    }

    /// Create a new tenant
    pub async fn create_tenant(&self, row: &NewTenantRow) -> Result<Tenant> {
        let row = self
            .store
            .insert(&self.tenant_table, serde_json::to_value(row)?)
            .await?;
        Self::decode(row)
    }

    /// Apply a partial update to a tenant
    pub async fn update_tenant(&self, id: Uuid, patch: Value) -> Result<Option<Tenant>> {
        let rows = self
            .store
            .update(&Query::table(&self.tenant_table).eq("id", id), patch)
            .await?;
        Self::decode_all::<Tenant>(rows).map(|mut v| v.pop())
    }

    // ========================================================================
    // Profile Operations
    // ========================================================================

    /// Find profile by user ID
    pub async fn find_profile(&self, user_id: Uuid) -> Result<Option<Profile>> {
        self.fetch_single(Query::table(tables::PROFILES).eq("id", user_id)).await
    }

    /// Apply a partial update to a profile
    pub async fn update_profile(&self, user_id: Uuid, mut patch: Value) -> Result<Option<Profile>> {
        if let Value::Object(ref mut map) = patch {
            map.insert("updated_at".to_string(), Value::String(Utc::now().to_rfc3339()));
        }
        let rows = self
            .store
            .update(&Query::table(tables::PROFILES).eq("id", user_id), patch)
            .await?;
        Self::decode_all::<Profile>(rows).map(|mut v| v.pop())
    }

    // ========================================================================
    // Encrypted Record Operations
    // ========================================================================

    /// Store a new encrypted record
    pub async fn insert_record(&self, record: &NewEncryptedRecord) -> Result<EncryptedRecord> {
        let row = self
            .store
            .insert(tables::ENCRYPTED_DATA, serde_json::to_value(record)?)
            .await?;
        Self::decode(row)
    }

    /// List a user's records, optionally of one data type
    pub async fn list_records(
        &self,
        user_id: Uuid,
        data_type: Option<&str>,
        options: &ListOptions,
    ) -> Result<Vec<EncryptedRecord>> {
        let mut query = Query::table(tables::ENCRYPTED_DATA)
            .eq("user_id", user_id)
            .order(&options.order_by, options.ascending);
        if let Some(data_type) = data_type {
            query = query.eq("data_type", data_type);
        }
        if let Some(offset) = options.offset {
            query = query.offset(offset).limit(options.limit.unwrap_or(10));
        } else if let Some(limit) = options.limit {
            query = query.limit(limit);
        }

        let rows = self.store.select(&query).await?;
        Self::decode_all(rows)
    }

    /// Patch a record owned by `user_id`
    pub async fn update_record(
        &self,
        user_id: Uuid,
        id: Uuid,
        mut patch: Value,
    ) -> Result<EncryptedRecord> {
        if let Value::Object(ref mut map) = patch {
            map.insert("updated_at".to_string(), Value::String(Utc::now().to_rfc3339()));
        }
        let query = Query::table(tables::ENCRYPTED_DATA)
            .eq("id", id)
            .eq("user_id", user_id);
        let rows = self.store.update(&query, patch).await?;
        Self::decode_all::<EncryptedRecord>(rows)?
            .pop()
            .ok_or_else(|| AppError::RecordNotFound { id: id.to_string() })
    }

    /// Delete a record owned by `user_id`
    pub async fn delete_record(&self, user_id: Uuid, id: Uuid) -> Result<bool> {
        let query = Query::table(tables::ENCRYPTED_DATA)
            .eq("id", id)
            .eq("user_id", user_id);
        Ok(self.store.delete(&query).await? > 0)
    }

    /// Number of records owned by `user_id`, optionally created since a time
    pub async fn count_records(&self, user_id: Uuid, since: Option<DateTime<Utc>>) -> Result<u64> {
        let mut query = Query::table(tables::ENCRYPTED_DATA).eq("user_id", user_id);
        if let Some(since) = since {
            query = query.gte("created_at", since.to_rfc3339());
        }
        self.store.count(&query).await
    }

    /// Data types of every record owned by `user_id`
    pub async fn record_data_types(&self, user_id: Uuid) -> Result<Vec<String>> {
        let query = Query::table(tables::ENCRYPTED_DATA)
            .columns("data_type")
            .eq("user_id", user_id);
        let rows = self.store.select(&query).await?;
        Ok(rows
            .into_iter()
            .filter_map(|r| r.get("data_type").and_then(Value::as_str).map(String::from))
            .collect())
    }

    // ========================================================================
    // Subscription History
    // ========================================================================

    /// Record a plan change
    pub async fn insert_subscription_history(&self, entry: &NewSubscriptionHistory) -> Result<()> {
        self.store
            .insert(tables::SUBSCRIPTION_HISTORY, serde_json::to_value(entry)?)
            .await?;
        Ok(())
    }
}
