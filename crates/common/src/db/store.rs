//! Backing-store contract
//!
//! The row store is remote and authenticated. Reads are equality/range
//! filtered selects; writes are insert/update/delete. Rows travel as JSON.

use crate::errors::Result;
use async_trait::async_trait;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

/// Filter operator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterOp {
    Eq,
    Gte,
}

impl FilterOp {
    pub fn as_str(&self) -> &'static str {
        match self {
            FilterOp::Eq => "eq",
            FilterOp::Gte => "gte",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Filter {
    pub column: String,
    pub op: FilterOp,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Order {
    pub column: String,
    pub ascending: bool,
}

/// Filtered read against one table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Query {
    pub table: String,
    pub columns: Option<String>,
    pub filters: Vec<Filter>,
    pub order: Option<Order>,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
}

impl Query {
    pub fn table(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            columns: None,
            filters: Vec::new(),
            order: None,
            limit: None,
            offset: None,
        }
    }

    pub fn columns(mut self, columns: impl Into<String>) -> Self {
        self.columns = Some(columns.into());
        self
    }

    pub fn eq(mut self, column: impl Into<String>, value: impl fmt::Display) -> Self {
        self.filters.push(Filter {
            column: column.into(),
            op: FilterOp::Eq,
            value: value.to_string(),
        });
        self
    }

    pub fn gte(mut self, column: impl Into<String>, value: impl fmt::Display) -> Self {
        self.filters.push(Filter {
            column: column.into(),
            op: FilterOp::Gte,
            value: value.to_string(),
        });
        self
    }

    pub fn order(mut self, column: impl Into<String>, ascending: bool) -> Self {
        self.order = Some(Order {
            column: column.into(),
            ascending,
        });
        self
    }

    pub fn limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn offset(mut self, offset: u64) -> Self {
        self.offset = Some(offset);
        self
    }
}

/// Remote row store
#[async_trait]
pub trait RowStore: Send + Sync {
    /// Rows matching the query
    async fn select(&self, query: &Query) -> Result<Vec<Value>>;

    /// Exact number of rows matching the query's filters
    async fn count(&self, query: &Query) -> Result<u64>;

    /// Insert one row, returning it as stored
    async fn insert(&self, table: &str, row: Value) -> Result<Value>;

    /// Patch every row matching the query, returning the updated rows
    async fn update(&self, query: &Query, patch: Value) -> Result<Vec<Value>>;

    /// Delete every row matching the query, returning how many were removed
    async fn delete(&self, query: &Query) -> Result<u64>;

    /// Connectivity probe
    async fn ping(&self) -> Result<()>;

    /// A handle that acts on behalf of the given user session
    fn with_access_token(&self, access_token: &str) -> Arc<dyn RowStore>;

    /// Backend name for logs and health output
    fn backend_name(&self) -> &str;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_builder() {
        let query = Query::table("tenants")
            .eq("sector", "dentist")
            .eq("slug", "clinic-a")
            .order("created_at", false)
            .limit(2);

        assert_eq!(query.table, "tenants");
        assert_eq!(query.filters.len(), 2);
        assert_eq!(query.filters[1].value, "clinic-a");
        assert_eq!(query.order.as_ref().map(|o| o.ascending), Some(false));
        assert_eq!(query.limit, Some(2));
    }
}
