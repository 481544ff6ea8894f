//! Encrypted record row
//!
//! Title and description are plaintext metadata; `encrypted_content` is the
//! self-describing ciphertext blob produced by [`crate::crypto::FieldCodec`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessLevel {
    #[default]
    Private,
    Shared,
    Team,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Model {
    pub id: Uuid,

    pub user_id: Uuid,

    #[serde(default)]
    pub tenant_id: Option<Uuid>,

    /// Free-form tag, e.g. "api_keys", "personal_notes"
    pub data_type: String,

    #[serde(default)]
    pub title: Option<String>,

    #[serde(default)]
    pub description: Option<String>,

    pub encrypted_content: String,

    #[serde(default)]
    pub tags: Option<Vec<String>>,

    #[serde(default)]
    pub category: Option<String>,

    #[serde(default)]
    pub is_favorite: bool,

    #[serde(default)]
    pub is_shared: bool,

    #[serde(default)]
    pub shared_with: Option<Vec<Uuid>>,

    #[serde(default)]
    pub access_level: AccessLevel,

    #[serde(default)]
    pub file_name: Option<String>,

    #[serde(default)]
    pub file_size: Option<i64>,

    #[serde(default)]
    pub file_type: Option<String>,

    pub created_at: DateTime<Utc>,

    pub updated_at: DateTime<Utc>,

    #[serde(default)]
    pub last_accessed_at: Option<DateTime<Utc>>,
}

/// Insert payload; the content is already encrypted
#[derive(Clone, Debug, Serialize)]
pub struct NewEncryptedRecord {
    pub user_id: Uuid,
    pub tenant_id: Option<Uuid>,
    pub data_type: String,
    pub title: String,
    pub description: Option<String>,
    pub encrypted_content: String,
    pub access_level: AccessLevel,
}
