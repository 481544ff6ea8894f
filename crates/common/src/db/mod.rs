//! Data access layer for SectorSite
//!
//! Provides:
//! - Row models exchanged with the backing store
//! - The [`RowStore`] contract and its HTTPS / in-memory implementations
//! - Repository pattern for typed data access

pub mod models;
mod memory;
mod repository;
mod rest;
mod store;

pub use memory::MemoryStore;
pub use repository::{ListOptions, Repository, TenantUsage};
pub use rest::RestStore;
pub use store::{Filter, FilterOp, Order, Query, RowStore};

use crate::config::StoreConfig;
use crate::errors::Result;
use std::sync::Arc;
use tracing::info;

/// Build the shared store handle from configuration
pub fn connect(config: &StoreConfig) -> Result<Arc<dyn RowStore>> {
    info!(url = %config.url, "Configuring backing store client...");
    let store = RestStore::new(config)?;
    Ok(Arc::new(store))
}
