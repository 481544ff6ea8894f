//! Authentication utilities
//!
//! Provides:
//! - Client for the backing store's session sub-API (GoTrue dialect)
//! - Access token verification
//! - Authenticated user context extraction

use crate::config::StoreConfig;
use crate::errors::{AppError, Result};
use axum::{extract::FromRef, http::request::Parts};
use axum::extract::FromRequestParts;
use chrono::{DateTime, Utc};
use jsonwebtoken::{decode, DecodingKey, Validation};
use reqwest::{Client, RequestBuilder, Response};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::time::Duration;
use uuid::Uuid;

/// Tokens expiring within this window count as expired
pub const EXPIRY_BUFFER_SECS: i64 = 5 * 60;

/// Audience of store-issued user tokens
const TOKEN_AUDIENCE: &str = "authenticated";

/// User as returned by the session API
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthUser {
    pub id: Uuid,

    #[serde(default)]
    pub email: Option<String>,

    #[serde(default)]
    pub role: Option<String>,

    #[serde(default)]
    pub user_metadata: Value,

    #[serde(default)]
    pub email_confirmed_at: Option<DateTime<Utc>>,

    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

/// Signed-in session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthSession {
    pub access_token: String,
    pub refresh_token: String,

    #[serde(default = "default_token_type")]
    pub token_type: String,

    #[serde(default)]
    pub expires_in: i64,

    /// Unix timestamp; derived from `expires_in` when the server omits it
    #[serde(default)]
    pub expires_at: Option<i64>,

    pub user: AuthUser,
}

fn default_token_type() -> String {
    "bearer".to_string()
}

impl AuthSession {
    /// True when the access token expires within [`EXPIRY_BUFFER_SECS`]
    pub fn is_token_expired(&self, now: DateTime<Utc>) -> bool {
        match self.expires_at {
            Some(expires_at) => expires_at <= now.timestamp() + EXPIRY_BUFFER_SECS,
            None => true,
        }
    }
}

/// Result of a sign-up
#[derive(Debug, Clone, PartialEq)]
pub enum SignUpOutcome {
    /// Account created and signed in
    Session(AuthSession),
    /// Account created, email confirmation pending
    ConfirmationPending(AuthUser),
}

/// Session sub-API client
#[derive(Clone)]
pub struct AuthClient {
    client: Client,
    base_url: String,
    anon_key: String,
}

impl AuthClient {
    pub fn new(config: &StoreConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| AppError::Configuration {
                message: format!("Failed to create HTTP client: {}", e),
            })?;

        Ok(Self {
            client,
            base_url: format!("{}/auth/v1", config.url.trim_end_matches('/')),
            anon_key: config.anon_key.clone(),
        })
    }

    fn request(&self, method: reqwest::Method, path: &str) -> RequestBuilder {
        self.client
            .request(method, format!("{}{}", self.base_url, path))
            .header("apikey", &self.anon_key)
    }

    /// Map error responses: 4xx become `Unauthorized`, the rest `AuthService`
    async fn check(response: Response) -> Result<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<Value>(&body)
            .ok()
            .and_then(|v| {
                ["msg", "error_description", "message", "error"]
                    .iter()
                    .find_map(|k| v.get(*k).and_then(Value::as_str).map(String::from))
            })
            .unwrap_or(body);

        if status.is_client_error() {
            Err(AppError::Unauthorized { message })
        } else {
            Err(AppError::AuthService {
                status: status.as_u16(),
                message,
            })
        }
    }

    async fn session_from(response: Response) -> Result<AuthSession> {
        let mut session: AuthSession = Self::check(response).await?.json().await?;
        if session.expires_at.is_none() && session.expires_in > 0 {
            session.expires_at = Some(Utc::now().timestamp() + session.expires_in);
        }
        Ok(session)
    }

    pub async fn sign_up(&self, email: &str, password: &str, metadata: Value) -> Result<SignUpOutcome> {
        let response = self
            .request(reqwest::Method::POST, "/signup")
            .json(&json!({ "email": email, "password": password, "data": metadata }))
            .send()
            .await?;
        let body: Value = Self::check(response).await?.json().await?;

        let outcome = if body.get("access_token").is_some() {
            SignUpOutcome::Session(serde_json::from_value(body)?)
        } else {
            // the user may be wrapped in `user` or returned bare
            let user = body
                .get("user")
                .filter(|u| u.is_object())
                .cloned()
                .unwrap_or(body);
            SignUpOutcome::ConfirmationPending(serde_json::from_value(user)?)
        };
        tracing::info!(email = %email, "User signed up");
        Ok(outcome)
    }

    pub async fn sign_in(&self, email: &str, password: &str) -> Result<AuthSession> {
        let response = self
            .request(reqwest::Method::POST, "/token")
            .query(&[("grant_type", "password")])
            .json(&json!({ "email": email, "password": password }))
            .send()
            .await?;
        Self::session_from(response).await
    }

    pub async fn sign_out(&self, access_token: &str) -> Result<()> {
        let response = self
            .request(reqwest::Method::POST, "/logout")
            .bearer_auth(access_token)
            .send()
            .await?;
        Self::check(response).await.map(|_| ())
    }

    pub async fn get_user(&self, access_token: &str) -> Result<AuthUser> {
        let response = self
            .request(reqwest::Method::GET, "/user")
            .bearer_auth(access_token)
            .send()
            .await?;
        Ok(Self::check(response).await?.json().await?)
    }

    pub async fn refresh(&self, refresh_token: &str) -> Result<AuthSession> {
        let response = self
            .request(reqwest::Method::POST, "/token")
            .query(&[("grant_type", "refresh_token")])
            .json(&json!({ "refresh_token": refresh_token }))
            .send()
            .await?;
        Self::session_from(response).await
    }
}

/// Claims of a store-issued access token
#[derive(Debug, Serialize, Deserialize)]
pub struct JwtClaims {
    /// Subject (user ID)
    pub sub: String,

    #[serde(default)]
    pub email: Option<String>,

    #[serde(default)]
    pub role: Option<String>,

    /// Expiration time (Unix timestamp)
    pub exp: i64,

    #[serde(default)]
    pub aud: Option<String>,
}

/// Extracted authentication context available to handlers
#[derive(Debug, Clone)]
pub struct AuthContext {
    pub user_id: Uuid,
    pub email: Option<String>,
    pub role: String,

    /// Raw token, forwarded to the store so row-level policies apply
    pub access_token: String,

    /// Request ID for tracing
    pub request_id: String,
}

/// Verifies access tokens
///
/// With the store's JWT secret, tokens are checked locally (HS256).
/// Without it, the session API is asked for the token's user.
#[derive(Clone)]
pub struct JwtVerifier {
    decoding_key: Option<DecodingKey>,
    client: AuthClient,
}

impl JwtVerifier {
    pub fn new(config: &StoreConfig) -> Result<Self> {
        Ok(Self {
            decoding_key: config
                .jwt_secret
                .as_deref()
                .filter(|s| !s.is_empty())
                .map(|s| DecodingKey::from_secret(s.as_bytes())),
            client: AuthClient::new(config)?,
        })
    }

    /// Validate and decode a token into the caller's context
    pub async fn verify(&self, token: &str) -> Result<AuthContext> {
        match self.decoding_key {
            Some(ref key) => {
                let mut validation = Validation::default();
                validation.set_audience(&[TOKEN_AUDIENCE]);

                let claims = decode::<JwtClaims>(token, key, &validation)
                    .map(|data| data.claims)
                    .map_err(|e| match e.kind() {
                        jsonwebtoken::errors::ErrorKind::ExpiredSignature => AppError::ExpiredToken,
                        _ => AppError::InvalidToken,
                    })?;
                let user_id = Uuid::parse_str(&claims.sub).map_err(|_| AppError::InvalidToken)?;

                Ok(AuthContext {
                    user_id,
                    email: claims.email,
                    role: claims.role.unwrap_or_else(|| TOKEN_AUDIENCE.to_string()),
                    access_token: token.to_string(),
                    request_id: String::new(),
                })
            }
            None => {
                let user = self.client.get_user(token).await.map_err(|e| match e {
                    AppError::Unauthorized { .. } => AppError::InvalidToken,
                    other => other,
                })?;
                Ok(AuthContext {
                    user_id: user.id,
                    email: user.email,
                    role: user.role.unwrap_or_else(|| TOKEN_AUDIENCE.to_string()),
                    access_token: token.to_string(),
                    request_id: String::new(),
                })
            }
        }
    }
}

/// Extract the token from an `Authorization: Bearer` header value
pub fn extract_bearer(auth_header: &str) -> Option<&str> {
    auth_header
        .strip_prefix("Bearer ")
        .or_else(|| auth_header.strip_prefix("bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

/// Axum extractor for AuthContext
impl<S> FromRequestParts<S> for AuthContext
where
    S: Send + Sync,
    JwtVerifier: FromRef<S>,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self> {
        let request_id = parts
            .headers
            .get("x-request-id")
            .and_then(|v| v.to_str().ok())
            .map(String::from)
            .unwrap_or_else(|| Uuid::new_v4().to_string());

        let auth_header = parts
            .headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| AppError::Unauthorized {
                message: "Missing Authorization header".to_string(),
            })?;

        let token = extract_bearer(auth_header).ok_or_else(|| AppError::Unauthorized {
            message: "Authorization header must be a bearer token".to_string(),
        })?;

        let verifier = JwtVerifier::from_ref(state);
        let mut context = verifier.verify(token).await?;
        context.request_id = request_id;
        Ok(context)
    }
}
