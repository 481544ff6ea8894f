//! Resolution session
//!
//! Holds the tenant view of one client and re-resolves it on every
//! navigation. Each navigation takes a generation number when dispatched;
//! a result is published only if no newer navigation has been dispatched
//! since. Superseded reads still run to completion, their result is dropped.

use crate::metrics;
use crate::tenancy::resolver::{RequestLocation, TenantResolver, TenantView};
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::watch;
use tracing::debug;

pub struct ResolutionSession {
    resolver: TenantResolver,
    generation: AtomicU64,
    view: watch::Sender<TenantView>,
}

impl ResolutionSession {
    pub fn new(resolver: TenantResolver) -> Self {
        let (view, _) = watch::channel(TenantView::initial());
        Self {
            resolver,
            generation: AtomicU64::new(0),
            view,
        }
    }

    /// Resolve `location` and publish the result unless a newer navigation
    /// was dispatched meanwhile.
    ///
    /// Returns the published view, or `None` when the result was discarded.
    pub async fn navigate(&self, location: RequestLocation) -> Option<TenantView> {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;

        self.view.send_if_modified(|view| {
            if !self.is_latest(generation) {
                return false;
            }
            view.loading = true;
            view.error = None;
            view.failure = None;
            true
        });

        let resolved = self.resolver.resolve(&location).await;

        // The generation check runs under the channel's write lock, so a
        // stale completion cannot interleave with a newer publish.
        let published = self.view.send_if_modified(|view| {
            if !self.is_latest(generation) {
                return false;
            }
            *view = resolved.clone();
            true
        });

        if published {
            Some(resolved)
        } else {
            debug!(
                generation,
                latest = self.generation.load(Ordering::SeqCst),
                path = %location.path,
                "Discarding stale tenant resolution"
            );
            metrics::record_stale_discard();
            None
        }
    }

    fn is_latest(&self, generation: u64) -> bool {
        self.generation.load(Ordering::SeqCst) == generation
    }

    /// Observe published views
    pub fn subscribe(&self) -> watch::Receiver<TenantView> {
        self.view.subscribe()
    }

    /// Snapshot of the current view
    pub fn current(&self) -> TenantView {
        self.view.borrow().clone()
    }

    /// Number of navigations dispatched so far
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{MemoryStore, Query, Repository, RowStore};
    use crate::errors::Result;
    use async_trait::async_trait;
    use serde_json::{json, Value};
    use std::sync::Arc;
    use tokio::sync::Notify;

    /// Holds reads for one slug until released
    struct GatedStore {
        inner: MemoryStore,
        held_slug: &'static str,
        entered: Notify,
        release: Notify,
    }

    #[async_trait]
    impl RowStore for GatedStore {
        async fn select(&self, query: &Query) -> Result<Vec<Value>> {
            if query.filters.iter().any(|f| f.column == "slug" && f.value == self.held_slug) {
                self.entered.notify_one();
                self.release.notified().await;
            }
            self.inner.select(query).await
        }

        async fn count(&self, query: &Query) -> Result<u64> {
            self.inner.count(query).await
        }

        async fn insert(&self, table: &str, row: Value) -> Result<Value> {
            self.inner.insert(table, row).await
        }

        async fn update(&self, query: &Query, patch: Value) -> Result<Vec<Value>> {
            self.inner.update(query, patch).await
        }

        async fn delete(&self, query: &Query) -> Result<u64> {
            self.inner.delete(query).await
        }

        async fn ping(&self) -> Result<()> {
            Ok(())
        }

        fn with_access_token(&self, _access_token: &str) -> Arc<dyn RowStore> {
            Arc::new(self.inner.clone())
        }

        fn backend_name(&self) -> &str {
            "gated"
        }
    }

    async fn seeded_store() -> MemoryStore {
        let store = MemoryStore::new();
        for (sector, slug) in [("dentist", "clinic-a"), ("beauty", "salon-b")] {
            store
                .seed(
                    "tenants",
                    json!({
                        "id": uuid::Uuid::new_v4(),
                        "name": slug,
                        "slug": slug,
                        "sector": sector,
                        "status": "active",
                        "created_at": "2025-01-01T00:00:00Z",
                        "updated_at": "2025-01-01T00:00:00Z",
                    }),
                )
                .await;
        }
        store
    }

    fn loc(url: &str) -> RequestLocation {
        RequestLocation::parse(url).unwrap()
    }

    #[tokio::test]
    async fn test_navigate_publishes_view() {
        let repo = Repository::new(Arc::new(seeded_store().await));
        let session = ResolutionSession::new(TenantResolver::new(repo));
        let mut rx = session.subscribe();
        assert!(session.current().loading);

        let view = session
            .navigate(loc("http://localhost/dentist/clinic-a"))
            .await
            .unwrap();
        assert_eq!(view.tenant_slug.as_deref(), Some("clinic-a"));

        assert!(rx.has_changed().unwrap());
        let seen = rx.borrow_and_update().clone();
        assert_eq!(seen, view);
        assert_eq!(session.generation(), 1);
    }

    #[tokio::test]
    async fn test_stale_resolution_never_overwrites_newer_navigation() {
        let gated = Arc::new(GatedStore {
            inner: seeded_store().await,
            held_slug: "clinic-a",
            entered: Notify::new(),
            release: Notify::new(),
        });
        let store: Arc<dyn RowStore> = gated.clone();
        let session = Arc::new(ResolutionSession::new(TenantResolver::new(Repository::new(store))));

        let first = tokio::spawn({
            let session = session.clone();
            async move { session.navigate(loc("http://localhost/dentist/clinic-a")).await }
        });

        // first read is in flight when the second navigation starts
        gated.entered.notified().await;
        let second = session
            .navigate(loc("http://localhost/beauty/salon-b"))
            .await;
        assert!(second.is_some());

        gated.release.notify_one();
        let first = first.await.unwrap();
        assert!(first.is_none());

        let current = session.current();
        assert_eq!(current.sector.as_deref(), Some("beauty"));
        assert_eq!(current.tenant_slug.as_deref(), Some("salon-b"));
        assert_eq!(current.tenant.map(|t| t.slug), Some("salon-b".to_string()));
        assert!(!current.loading);
    }

    #[tokio::test]
    async fn test_last_dispatched_navigation_wins() {
        let repo = Repository::new(Arc::new(seeded_store().await));
        let session = ResolutionSession::new(TenantResolver::new(repo));

        session.navigate(loc("http://localhost/beauty/salon-b")).await;
        session.navigate(loc("http://localhost/cozumler")).await;

        let current = session.current();
        assert!(!current.is_tenant);
        assert!(current.tenant.is_none());
        assert_eq!(session.generation(), 2);
    }
}
