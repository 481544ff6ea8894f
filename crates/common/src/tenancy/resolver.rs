//! Tenant resolution
//!
//! Maps a request location (host, path, query) to a `(sector, slug)` pair
//! and then to the active tenant row addressed by that pair.
//!
//! Detection rules, first match wins:
//! 1. Loopback hosts: `?sector=..&tenant=..`, else `/{sector}/{slug}/..` when
//!    the first segment is a known sector.
//! 2. Other hosts with more than two labels: a first label naming a known
//!    sector selects it, and the first path segment is the slug.
//! 3. Anything else is not a tenant context.

use crate::db::models::Tenant;
use crate::db::Repository;
use crate::errors::{AppError, Result};
use crate::metrics;
use crate::sectors::{self, SectorConfig};
use crate::tenancy::urls::is_loopback;
use serde::Serialize;
use tracing::{debug, warn};
use url::Url;

/// Host, path and query of one navigation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestLocation {
    /// Hostname without port
    pub host: String,
    pub path: String,
    /// Raw query string without the leading `?`
    pub query: String,
}

impl RequestLocation {
    pub fn new(host: &str, path: &str, query: Option<&str>) -> Self {
        Self {
            host: strip_port(host).to_ascii_lowercase(),
            path: if path.is_empty() { "/".to_string() } else { path.to_string() },
            query: query.unwrap_or_default().trim_start_matches('?').to_string(),
        }
    }

    /// Build from a full URL such as `https://dentist.example.com/clinic-a`
    pub fn parse(url: &str) -> Result<Self> {
        let url = Url::parse(url).map_err(|e| AppError::InvalidFormat {
            message: format!("invalid url '{}': {}", url, e),
        })?;
        let host = url.host_str().ok_or_else(|| AppError::InvalidFormat {
            message: "url has no host".to_string(),
        })?;
        Ok(Self::new(host, url.path(), url.query()))
    }

    /// First value of a query parameter, ignoring empty values
    pub fn query_param(&self, name: &str) -> Option<String> {
        url::form_urlencoded::parse(self.query.as_bytes())
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.into_owned())
            .filter(|value| !value.is_empty())
    }

    /// Non-empty path segments
    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.path.split('/').filter(|s| !s.is_empty())
    }
}

fn strip_port(host: &str) -> &str {
    if let Some(rest) = host.strip_prefix('[') {
        // bracketed IPv6, possibly with a port
        return rest.split_once(']').map(|(addr, _)| addr).unwrap_or(rest);
    }
    match host.rsplit_once(':') {
        Some((name, port)) if !name.contains(':') && port.chars().all(|c| c.is_ascii_digit()) => name,
        _ => host,
    }
}

/// Outcome of URL inspection, before any store read
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Detection {
    NotTenant,
    Candidate { sector: String, slug: String },
}

/// Inspect a location for a `(sector, slug)` pair
pub fn detect(location: &RequestLocation) -> Detection {
    if is_loopback(&location.host) {
        if let (Some(sector), Some(slug)) = (
            location.query_param("sector"),
            location.query_param("tenant"),
        ) {
            return Detection::Candidate { sector, slug };
        }

        let mut segments = location.segments();
        if let (Some(sector), Some(slug)) = (segments.next(), segments.next()) {
            if sectors::is_known_sector(sector) {
                return Detection::Candidate {
                    sector: sector.to_string(),
                    slug: slug.to_string(),
                };
            }
        }
        return Detection::NotTenant;
    }

    let labels: Vec<&str> = location.host.split('.').collect();
    if labels.len() > 2 && sectors::is_known_sector(labels[0]) {
        if let Some(slug) = location.segments().next() {
            return Detection::Candidate {
                sector: labels[0].to_string(),
                slug: slug.to_string(),
            };
        }
    }

    Detection::NotTenant
}

/// Why a tenant context could not be resolved
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionFailure {
    SectorUnknown,
    NotFound,
    StoreUnavailable,
}

impl ResolutionFailure {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResolutionFailure::SectorUnknown => "sector_unknown",
            ResolutionFailure::NotFound => "not_found",
            ResolutionFailure::StoreUnavailable => "store_unavailable",
        }
    }
}

/// Consolidated, loading-aware view published to consumers
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TenantView {
    pub sector: Option<String>,
    pub tenant_slug: Option<String>,
    pub full_domain: String,
    pub is_tenant: bool,
    pub sector_config: Option<&'static SectorConfig>,
    pub tenant: Option<Tenant>,
    pub loading: bool,
    pub error: Option<String>,
    pub failure: Option<ResolutionFailure>,
}

impl TenantView {
    /// State before the first navigation completes
    pub fn initial() -> Self {
        Self {
            sector: None,
            tenant_slug: None,
            full_domain: String::new(),
            is_tenant: false,
            sector_config: None,
            tenant: None,
            loading: true,
            error: None,
            failure: None,
        }
    }

    fn not_tenant(host: &str) -> Self {
        Self {
            full_domain: host.to_string(),
            loading: false,
            ..Self::initial()
        }
    }

    fn candidate(host: &str, sector: &str, slug: &str) -> Self {
        Self {
            sector: Some(sector.to_string()),
            tenant_slug: Some(slug.to_string()),
            full_domain: host.to_string(),
            is_tenant: true,
            sector_config: sectors::sector_config(sector),
            loading: false,
            ..Self::initial()
        }
    }

    fn failed(mut self, failure: ResolutionFailure, error: &AppError) -> Self {
        self.failure = Some(failure);
        self.error = Some(error.to_string());
        self
    }

    /// A tenant context whose sector is in the catalog
    pub fn is_valid_tenant(&self) -> bool {
        self.is_tenant && self.sector_config.is_some()
    }

    /// A tenant context that named a tenant which does not exist
    pub fn is_not_found(&self) -> bool {
        self.failure == Some(ResolutionFailure::NotFound)
    }

    /// The view's failure as an application error, if any
    pub fn to_error(&self) -> Option<AppError> {
        let sector = self.sector.clone().unwrap_or_default();
        match self.failure? {
            ResolutionFailure::SectorUnknown => Some(AppError::SectorUnknown { sector }),
            ResolutionFailure::NotFound => Some(AppError::TenantNotFound {
                sector,
                slug: self.tenant_slug.clone().unwrap_or_default(),
            }),
            ResolutionFailure::StoreUnavailable => Some(AppError::ServiceUnavailable {
                message: self.error.clone().unwrap_or_default(),
            }),
        }
    }
}

/// Resolves locations against the tenants table
#[derive(Clone)]
pub struct TenantResolver {
    repo: Repository,
}

impl TenantResolver {
    pub fn new(repo: Repository) -> Self {
        Self { repo }
    }

    /// Resolve a location to a view. Store errors become an error view.
    #[tracing::instrument(skip(self, location), fields(host = %location.host, path = %location.path))]
    pub async fn resolve(&self, location: &RequestLocation) -> TenantView {
        let (sector, slug) = match detect(location) {
            Detection::NotTenant => {
                metrics::record_resolution("not_tenant");
                return TenantView::not_tenant(&location.host);
            }
            Detection::Candidate { sector, slug } => (sector, slug),
        };

        let view = TenantView::candidate(&location.host, &sector, &slug);
        if view.sector_config.is_none() {
            debug!(sector = %sector, "Sector not in catalog");
            metrics::record_resolution(ResolutionFailure::SectorUnknown.as_str());
            return view.failed(
                ResolutionFailure::SectorUnknown,
                &AppError::SectorUnknown { sector },
            );
        }

        match self.repo.find_active_tenant(&sector, &slug).await {
            Ok(Some(tenant)) => {
                debug!(sector = %sector, slug = %slug, tenant_id = %tenant.id, "Tenant resolved");
                metrics::record_resolution("resolved");
                TenantView {
                    tenant: Some(tenant),
                    ..view
                }
            }
            Ok(None) => {
                metrics::record_resolution(ResolutionFailure::NotFound.as_str());
                view.failed(
                    ResolutionFailure::NotFound,
                    &AppError::TenantNotFound { sector, slug },
                )
            }
            Err(e) => {
                warn!(sector = %sector, slug = %slug, error = %e, "Tenant lookup failed");
                metrics::record_resolution(ResolutionFailure::StoreUnavailable.as_str());
                view.failed(ResolutionFailure::StoreUnavailable, &e)
            }
        }
    }
}
