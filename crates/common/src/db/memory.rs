//! In-process row store for tests and local development

use crate::db::store::{Filter, FilterOp, Query, RowStore};
use crate::errors::{AppError, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering as AtomicOrdering};
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Default)]
struct Inner {
    tables: RwLock<HashMap<String, Vec<Value>>>,
    unavailable: AtomicBool,
}

/// Row store kept in memory. Clones share the same tables.
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a row directly, bypassing id/timestamp defaults
    pub async fn seed(&self, table: &str, row: Value) {
        self.inner
            .tables
            .write()
            .await
            .entry(table.to_string())
            .or_default()
            .push(row);
    }

    /// All rows of a table
    pub async fn rows(&self, table: &str) -> Vec<Value> {
        self.inner
            .tables
            .read()
            .await
            .get(table)
            .cloned()
            .unwrap_or_default()
    }

    /// Make every operation fail as if the remote store were down
    pub fn set_unavailable(&self, unavailable: bool) {
        self.inner.unavailable.store(unavailable, AtomicOrdering::SeqCst);
    }

    fn ensure_available(&self) -> Result<()> {
        if self.inner.unavailable.load(AtomicOrdering::SeqCst) {
            return Err(AppError::Store {
                status: 503,
                message: "memory store marked unavailable".to_string(),
            });
        }
        Ok(())
    }
}

fn cell_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => "null".to_string(),
        other => other.to_string(),
    }
}

fn compare_text(left: &str, right: &str) -> Ordering {
    if let (Ok(l), Ok(r)) = (left.parse::<f64>(), right.parse::<f64>()) {
        return l.partial_cmp(&r).unwrap_or(Ordering::Equal);
    }
    if let (Ok(l), Ok(r)) = (
        DateTime::parse_from_rfc3339(left),
        DateTime::parse_from_rfc3339(right),
    ) {
        return l.cmp(&r);
    }
    left.cmp(right)
}

fn matches(row: &Value, filter: &Filter) -> bool {
    let cell = row.get(&filter.column).map(cell_text).unwrap_or_else(|| "null".to_string());
    match filter.op {
        FilterOp::Eq => cell == filter.value,
        FilterOp::Gte => compare_text(&cell, &filter.value) != Ordering::Less,
    }
}

fn matches_all(row: &Value, query: &Query) -> bool {
    query.filters.iter().all(|f| matches(row, f))
}

#[async_trait]
impl RowStore for MemoryStore {
    async fn select(&self, query: &Query) -> Result<Vec<Value>> {
        self.ensure_available()?;
        let tables = self.inner.tables.read().await;
        let mut rows: Vec<Value> = tables
            .get(&query.table)
            .map(|rows| rows.iter().filter(|r| matches_all(r, query)).cloned().collect())
            .unwrap_or_default();

        if let Some(ref order) = query.order {
            rows.sort_by(|a, b| {
                let left = a.get(&order.column).map(cell_text).unwrap_or_default();
                let right = b.get(&order.column).map(cell_text).unwrap_or_default();
                let ord = compare_text(&left, &right);
                if order.ascending { ord } else { ord.reverse() }
            });
        }

        let offset = query.offset.unwrap_or(0) as usize;
        let limit = query.limit.map(|l| l as usize).unwrap_or(usize::MAX);
        Ok(rows.into_iter().skip(offset).take(limit).collect())
    }

    async fn count(&self, query: &Query) -> Result<u64> {
        self.ensure_available()?;
        let tables = self.inner.tables.read().await;
        Ok(tables
            .get(&query.table)
            .map(|rows| rows.iter().filter(|r| matches_all(r, query)).count() as u64)
            .unwrap_or(0))
    }

    async fn insert(&self, table: &str, row: Value) -> Result<Value> {
        self.ensure_available()?;
        let Value::Object(mut object) = row else {
            return Err(AppError::Store {
                status: 400,
                message: "row must be a JSON object".to_string(),
            });
        };

        let now = Value::String(Utc::now().to_rfc3339());
        object
            .entry("id")
            .or_insert_with(|| Value::String(Uuid::new_v4().to_string()));
        object.entry("created_at").or_insert_with(|| now.clone());
        object.entry("updated_at").or_insert(now);

        let row = Value::Object(object);
        self.inner
            .tables
            .write()
            .await
            .entry(table.to_string())
            .or_default()
            .push(row.clone());
        Ok(row)
    }

    async fn update(&self, query: &Query, patch: Value) -> Result<Vec<Value>> {
        self.ensure_available()?;
        let patch: Map<String, Value> = match patch {
            Value::Object(map) => map,
            _ => {
                return Err(AppError::Store {
                    status: 400,
                    message: "patch must be a JSON object".to_string(),
                })
            }
        };

        let mut tables = self.inner.tables.write().await;
        let mut updated = Vec::new();
        if let Some(rows) = tables.get_mut(&query.table) {
            for row in rows.iter_mut().filter(|r| matches_all(r, query)) {
                if let Value::Object(object) = row {
                    for (key, value) in &patch {
                        object.insert(key.clone(), value.clone());
                    }
                }
                updated.push(row.clone());
            }
        }
        Ok(updated)
    }

    async fn delete(&self, query: &Query) -> Result<u64> {
        self.ensure_available()?;
        let mut tables = self.inner.tables.write().await;
        let Some(rows) = tables.get_mut(&query.table) else {
            return Ok(0);
        };
        let before = rows.len();
        rows.retain(|r| !matches_all(r, query));
        Ok((before - rows.len()) as u64)
    }

    async fn ping(&self) -> Result<()> {
        self.ensure_available()
    }

    fn with_access_token(&self, _access_token: &str) -> Arc<dyn RowStore> {
        Arc::new(self.clone())
    }

    fn backend_name(&self) -> &str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_insert_fills_defaults() {
        let store = MemoryStore::new();
        let row = store.insert("tenants", json!({ "slug": "clinic-a" })).await.unwrap();
        assert!(row["id"].is_string());
        assert!(row["created_at"].is_string());
    }

    #[tokio::test]
    async fn test_filters_order_and_paging() {
        let store = MemoryStore::new();
        for (slug, n) in [("a", 3), ("b", 1), ("c", 2)] {
            store
                .seed("t", json!({ "slug": slug, "n": n, "sector": "dentist" }))
                .await;
        }
        store.seed("t", json!({ "slug": "z", "n": 9, "sector": "beauty" })).await;

        let query = Query::table("t").eq("sector", "dentist").order("n", true).limit(2);
        let rows = store.select(&query).await.unwrap();
        let slugs: Vec<_> = rows.iter().map(|r| r["slug"].as_str().unwrap()).collect();
        assert_eq!(slugs, ["b", "c"]);

        let count = store.count(&Query::table("t").gte("n", 2)).await.unwrap();
        assert_eq!(count, 3);
    }

    #[tokio::test]
    async fn test_update_and_delete() {
        let store = MemoryStore::new();
        store.seed("t", json!({ "id": "1", "flag": false })).await;
        store.seed("t", json!({ "id": "2", "flag": false })).await;

        let updated = store
            .update(&Query::table("t").eq("id", "1"), json!({ "flag": true }))
            .await
            .unwrap();
        assert_eq!(updated.len(), 1);
        assert_eq!(updated[0]["flag"], true);

        let deleted = store.delete(&Query::table("t").eq("id", "2")).await.unwrap();
        assert_eq!(deleted, 1);
        assert_eq!(store.rows("t").await.len(), 1);
    }

    #[tokio::test]
    async fn test_unavailable_store_fails() {
        let store = MemoryStore::new();
        store.set_unavailable(true);
        assert!(matches!(
            store.ping().await,
            Err(AppError::Store { status: 503, .. })
        ));
    }
}
