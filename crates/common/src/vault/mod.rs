//! Encrypted record vault
//!
//! Per-user save/load of private records. Content is encrypted with the
//! user's derived key before it is written and decrypted after it is read;
//! plaintext never reaches the store.

use crate::crypto::{FieldCodec, UserKey};
use crate::db::models::{AccessLevel, EncryptedRecord, NewEncryptedRecord};
use crate::db::{ListOptions, Repository};
use crate::errors::{AppError, Result};
use crate::metrics;
use chrono::{Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;
use tracing::{info, warn};
use uuid::Uuid;

/// Shown in place of content that could not be decrypted
pub const DECRYPTION_PLACEHOLDER: &str = "[decryption failed]";

/// Window for `recent_activity` in [`UsageStats`]
pub const RECENT_ACTIVITY_DAYS: i64 = 7;

/// Content to store
#[derive(Debug, Clone, Deserialize)]
pub struct SaveRecord {
    pub data_type: String,
    pub content: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub tenant_id: Option<Uuid>,
}

/// A record with its content decrypted, or the placeholder
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DecryptedRecord {
    #[serde(flatten)]
    pub record: EncryptedRecord,
    pub decrypted_content: String,
    pub decrypt_ok: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct UsageStats {
    pub total_items: u64,
    pub items_by_type: BTreeMap<String, u64>,
    pub recent_activity: u64,
}

/// Title used when none is given: `api_keys` becomes `API KEYS`
pub fn default_title(data_type: &str) -> String {
    data_type.replacen('_', " ", 1).to_uppercase()
}

/// Vault of one user
pub struct Vault {
    repo: Repository,
    codec: FieldCodec,
    user_id: Uuid,
    key: UserKey,
}

impl Vault {
    pub fn new(repo: Repository, codec: FieldCodec, user_id: Uuid) -> Self {
        let key = codec.derive_user_key(&user_id.to_string());
        Self {
            repo,
            codec,
            user_id,
            key,
        }
    }

    pub fn user_id(&self) -> Uuid {
        self.user_id
    }

    fn seal(&self, content: &str) -> Result<String> {
        self.codec.encrypt(content, &self.key).map_err(|e| {
            tracing::error!(user_id = %self.user_id, error = %e, "Encryption failed");
            e
        })
    }

    /// Encrypt and store a new private record
    pub async fn save(&self, request: SaveRecord) -> Result<EncryptedRecord> {
        if request.data_type.trim().is_empty() {
            return Err(AppError::MissingField {
                field: "data_type".to_string(),
            });
        }

        let title = request
            .title
            .filter(|t| !t.is_empty())
            .unwrap_or_else(|| default_title(&request.data_type));

        let record = self
            .repo
            .insert_record(&NewEncryptedRecord {
                user_id: self.user_id,
                tenant_id: request.tenant_id,
                encrypted_content: self.seal(&request.content)?,
                data_type: request.data_type,
                title,
                description: request.description.filter(|d| !d.is_empty()),
                access_level: AccessLevel::Private,
            })
            .await?;

        info!(user_id = %self.user_id, record_id = %record.id, data_type = %record.data_type, "Encrypted record saved");
        Ok(record)
    }

    /// Replace the full content of a record, re-encrypting it
    pub async fn update(
        &self,
        id: Uuid,
        content: &str,
        title: Option<String>,
        description: Option<String>,
    ) -> Result<EncryptedRecord> {
        let mut patch = Map::new();
        patch.insert("encrypted_content".to_string(), Value::String(self.seal(content)?));
        if let Some(title) = title {
            patch.insert("title".to_string(), Value::String(title));
        }
        if let Some(description) = description {
            patch.insert("description".to_string(), Value::String(description));
        }

        self.repo.update_record(self.user_id, id, Value::Object(patch)).await
    }

    /// List records, decrypting each one independently
    ///
    /// A record that fails to decrypt is returned with the placeholder and
    /// `decrypt_ok = false`; the rest of the batch is unaffected.
    pub async fn list(
        &self,
        data_type: Option<&str>,
        options: &ListOptions,
    ) -> Result<Vec<DecryptedRecord>> {
        let records = self.repo.list_records(self.user_id, data_type, options).await?;

        Ok(records
            .into_iter()
            .map(|record| match self.codec.decrypt(&record.encrypted_content, &self.key) {
                Ok(plaintext) => DecryptedRecord {
                    record,
                    decrypted_content: plaintext,
                    decrypt_ok: true,
                },
                Err(e) => {
                    warn!(record_id = %record.id, error = %e, "Failed to decrypt record");
                    metrics::record_decrypt_failure();
                    DecryptedRecord {
                        record,
                        decrypted_content: DECRYPTION_PLACEHOLDER.to_string(),
                        decrypt_ok: false,
                    }
                }
            })
            .collect())
    }

    pub async fn delete(&self, id: Uuid) -> Result<()> {
        if !self.repo.delete_record(self.user_id, id).await? {
            return Err(AppError::RecordNotFound { id: id.to_string() });
        }
        info!(user_id = %self.user_id, record_id = %id, "Encrypted record deleted");
        Ok(())
    }

    pub async fn toggle_favorite(&self, id: Uuid, is_favorite: bool) -> Result<EncryptedRecord> {
        self.repo
            .update_record(self.user_id, id, json!({ "is_favorite": is_favorite }))
            .await
    }

    pub async fn usage_stats(&self) -> Result<UsageStats> {
        let total_items = self.repo.count_records(self.user_id, None).await?;

        let mut items_by_type = BTreeMap::new();
        for data_type in self.repo.record_data_types(self.user_id).await? {
            *items_by_type.entry(data_type).or_insert(0) += 1;
        }

        let since = Utc::now() - Duration::days(RECENT_ACTIVITY_DAYS);
        let recent_activity = self.repo.count_records(self.user_id, Some(since)).await?;

        Ok(UsageStats {
            total_items,
            items_by_type,
            recent_activity,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::MemoryStore;
    use std::sync::Arc;

    const SECRET: &str = "vault-test-secret-vault-test-secret";

    fn vault(store: &MemoryStore, user_id: Uuid) -> Vault {
        Vault::new(
            Repository::new(Arc::new(store.clone())),
            FieldCodec::new(SECRET),
            user_id,
        )
    }

    fn save(data_type: &str, content: &str) -> SaveRecord {
        SaveRecord {
            data_type: data_type.to_string(),
            content: content.to_string(),
            title: None,
            description: None,
            tenant_id: None,
        }
    }

    #[test]
    fn test_default_title() {
        assert_eq!(default_title("api_keys"), "API KEYS");
        assert_eq!(default_title("personal_notes_old"), "PERSONAL NOTES_OLD");
        assert_eq!(default_title("notes"), "NOTES");
    }

    #[tokio::test]
    async fn test_save_stores_ciphertext_only() {
        let store = MemoryStore::new();
        let vault = vault(&store, Uuid::new_v4());

        let record = vault.save(save("api_keys", "sk-live-123")).await.unwrap();
        assert_eq!(record.title.as_deref(), Some("API KEYS"));
        assert_eq!(record.access_level, AccessLevel::Private);

        let raw = store.rows("encrypted_data").await;
        let stored = raw[0]["encrypted_content"].as_str().unwrap();
        assert!(!stored.contains("sk-live-123"));

        let listed = vault.list(None, &ListOptions::default()).await.unwrap();
        assert_eq!(listed[0].decrypted_content, "sk-live-123");
        assert!(listed[0].decrypt_ok);
    }

    #[tokio::test]
    async fn test_undecryptable_record_does_not_abort_batch() {
        let store = MemoryStore::new();
        let user_id = Uuid::new_v4();
        let vault = vault(&store, user_id);
        vault.save(save("notes", "first")).await.unwrap();

        // a record written under a different secret
        let rotated = Vault::new(
            Repository::new(Arc::new(store.clone())),
            FieldCodec::new("a-completely-different-secret-value"),
            user_id,
        );
        rotated.save(save("notes", "second")).await.unwrap();

        let listed = vault.list(Some("notes"), &ListOptions::default()).await.unwrap();
        assert_eq!(listed.len(), 2);
        let ok: Vec<_> = listed.iter().filter(|r| r.decrypt_ok).collect();
        let failed: Vec<_> = listed.iter().filter(|r| !r.decrypt_ok).collect();
        assert_eq!(ok.len(), 1);
        assert_eq!(ok[0].decrypted_content, "first");
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].decrypted_content, DECRYPTION_PLACEHOLDER);
    }

    #[tokio::test]
    async fn test_update_reencrypts_full_content() {
        let store = MemoryStore::new();
        let vault = vault(&store, Uuid::new_v4());
        let record = vault.save(save("notes", "v1")).await.unwrap();

        let updated = vault
            .update(record.id, "v2", Some("Renamed".to_string()), None)
            .await
            .unwrap();
        assert_ne!(updated.encrypted_content, record.encrypted_content);
        assert_eq!(updated.title.as_deref(), Some("Renamed"));

        let listed = vault.list(None, &ListOptions::default()).await.unwrap();
        assert_eq!(listed[0].decrypted_content, "v2");
    }

    #[tokio::test]
    async fn test_other_users_cannot_touch_records() {
        let store = MemoryStore::new();
        let owner = vault(&store, Uuid::new_v4());
        let other = vault(&store, Uuid::new_v4());
        let record = owner.save(save("notes", "mine")).await.unwrap();

        assert!(other.list(None, &ListOptions::default()).await.unwrap().is_empty());
        assert!(matches!(
            other.delete(record.id).await,
            Err(AppError::RecordNotFound { .. })
        ));
        assert!(other.toggle_favorite(record.id, true).await.is_err());

        let favorite = owner.toggle_favorite(record.id, true).await.unwrap();
        assert!(favorite.is_favorite);
        owner.delete(record.id).await.unwrap();
    }

    #[tokio::test]
    async fn test_usage_stats() {
        let store = MemoryStore::new();
        let user_id = Uuid::new_v4();
        let vault = vault(&store, user_id);
        vault.save(save("notes", "a")).await.unwrap();
        vault.save(save("notes", "b")).await.unwrap();
        vault.save(save("api_keys", "c")).await.unwrap();
        store
            .seed(
                "encrypted_data",
                json!({
                    "id": Uuid::new_v4(),
                    "user_id": user_id,
                    "data_type": "notes",
                    "encrypted_content": "x",
                    "created_at": "2020-01-01T00:00:00Z",
                    "updated_at": "2020-01-01T00:00:00Z",
                }),
            )
            .await;

        let stats = vault.usage_stats().await.unwrap();
        assert_eq!(stats.total_items, 4);
        assert_eq!(stats.items_by_type.get("notes"), Some(&3));
        assert_eq!(stats.items_by_type.get("api_keys"), Some(&1));
        assert_eq!(stats.recent_activity, 3);
    }

    #[tokio::test]
    async fn test_list_paging() {
        let store = MemoryStore::new();
        let vault = vault(&store, Uuid::new_v4());
        for i in 0..5 {
            vault.save(save("notes", &format!("note {}", i))).await.unwrap();
        }

        let options = ListOptions {
            limit: Some(2),
            ..Default::default()
        };
        assert_eq!(vault.list(None, &options).await.unwrap().len(), 2);
    }
}
