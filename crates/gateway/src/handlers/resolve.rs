//! Tenant resolution handler

use axum::{
    extract::{Query, State},
    http::{header, HeaderMap, StatusCode},
    Json,
};
use serde::{Deserialize, Serialize};

use crate::AppState;
use sectorsite_common::{
    errors::{AppError, Result},
    tenancy::{RequestLocation, ResolutionFailure, TenantView},
};

/// Location to resolve: a full `url`, or `host` / `path` / `query` parts.
/// Without either, the request's own Host header is used.
#[derive(Debug, Default, Deserialize)]
pub struct ResolveParams {
    pub url: Option<String>,
    pub host: Option<String>,
    pub path: Option<String>,
    pub query: Option<String>,
}

#[derive(Serialize)]
pub struct ResolveResponse {
    pub view: TenantView,
    pub valid_tenant: bool,
    pub not_found: bool,
}

fn location(params: &ResolveParams, headers: &HeaderMap) -> Result<RequestLocation> {
    if let Some(ref url) = params.url {
        return RequestLocation::parse(url);
    }

    let host = match params.host {
        Some(ref host) => host.clone(),
        None => headers
            .get(header::HOST)
            .and_then(|v| v.to_str().ok())
            .map(String::from)
            .ok_or_else(|| AppError::MissingField {
                field: "host".to_string(),
            })?,
    };

    Ok(RequestLocation::new(
        &host,
        params.path.as_deref().unwrap_or("/"),
        params.query.as_deref(),
    ))
}

/// Resolve a location into a tenant view
pub async fn resolve(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<ResolveParams>,
) -> Result<(StatusCode, Json<ResolveResponse>)> {
    let location = location(&params, &headers)?;
    let view = state.resolver.resolve(&location).await;

    let status = match view.failure {
        None => StatusCode::OK,
        Some(ResolutionFailure::SectorUnknown) | Some(ResolutionFailure::NotFound) => StatusCode::NOT_FOUND,
        Some(ResolutionFailure::StoreUnavailable) => StatusCode::SERVICE_UNAVAILABLE,
    };

    Ok((
        status,
        Json(ResolveResponse {
            valid_tenant: view.is_valid_tenant(),
            not_found: view.is_not_found(),
            view,
        }),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_location_from_url() {
        let params = ResolveParams {
            url: Some("https://dentist.sitem.com/smile-clinic?x=1".to_string()),
            ..Default::default()
        };
        let loc = location(&params, &HeaderMap::new()).unwrap();
        assert_eq!(loc.host, "dentist.sitem.com");
        assert_eq!(loc.path, "/smile-clinic");
        assert_eq!(loc.query, "x=1");
    }

    #[test]
    fn test_location_from_host_header() {
        let mut headers = HeaderMap::new();
        headers.insert(header::HOST, HeaderValue::from_static("localhost:3000"));
        let params = ResolveParams {
            path: Some("/beauty/glow".to_string()),
            ..Default::default()
        };
        let loc = location(&params, &headers).unwrap();
        assert_eq!(loc.host, "localhost");
        assert_eq!(loc.path, "/beauty/glow");
    }

    #[test]
    fn test_location_requires_host() {
        assert!(matches!(
            location(&ResolveParams::default(), &HeaderMap::new()),
            Err(AppError::MissingField { .. })
        ));
    }
}
