//! Signed client for the remote tenant admin API.
//!
//! One signed HTTP call per administrative operation, no retry and no
//! backoff — these calls are rare, and retry decisions belong to the caller.

use std::time::Duration;

use reqwest::Method;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::config::AdminCredentials;
use crate::signing;

const INIT_USER_REGISTRATION: &str = "api/v4/admin/user/init-user-registration";
const VALIDATE_USER_REGISTRATION: &str = "api/v4/admin/user/validate-user-registration";
const APPROVE_TRESOR_CREATION: &str = "api/v4/admin/tresor/approve-tresor-creation";
const APPROVE_SHARE: &str = "api/v4/admin/tresor/approve-share";

#[derive(Debug, Error)]
pub enum ApiError {
    /// Non-2xx response from the admin API, carried unmodified.
    #[error("admin api returned {status}: {body}")]
    Remote {
        status: reqwest::StatusCode,
        body: String,
    },
    /// Network-level failure reaching the admin API.
    #[error("admin api request failed: {0}")]
    Transport(#[from] reqwest::Error),
    /// Request body could not be serialized; fails before any network I/O.
    #[error("could not encode request body: {0}")]
    Encode(#[source] serde_json::Error),
    /// 2xx response whose body was not the expected JSON shape.
    #[error("could not parse admin api response: {0}")]
    Decode(#[source] serde_json::Error),
}

/// Identifiers issued by `init-user-registration`. `reg_session_verifier` is
/// a server-side secret and must never reach the client device.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct RegistrationSession {
    pub user_id: String,
    pub reg_session_id: String,
    pub reg_session_verifier: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct ValidateUserRequest<'a> {
    reg_session_id: &'a str,
    reg_session_verifier: &'a str,
    reg_validation_verifier: &'a str,
    user_id: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct ApproveTresorCreationRequest<'a> {
    tresor_id: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct ApproveShareRequest<'a> {
    operation_id: &'a str,
}

/// Client for the tenant admin endpoints. Credentials and addressing are
/// constructor arguments, so tests and multi-tenant setups can substitute
/// them freely.
#[derive(Clone)]
pub struct AdminApi {
    http: reqwest::Client,
    /// Base URL, always with a trailing slash.
    api_base: String,
    /// Tenant root prefix, empty or `tenant-<id>/`.
    tenant_root: String,
    credentials: AdminCredentials,
}

impl AdminApi {
    pub fn new(
        api_base: impl Into<String>,
        tenant_root: impl Into<String>,
        credentials: AdminCredentials,
    ) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .expect("build admin api reqwest client");

        Self {
            http,
            api_base: crate::config::normalize_api_base(&api_base.into()),
            tenant_root: crate::config::normalize_tenant_root(&tenant_root.into()),
            credentials,
        }
    }

    /// Phase 1 of registration: ask the tenant for a fresh user id and the
    /// session identifiers that make the registration transactional.
    pub async fn init_user_registration(&self) -> Result<RegistrationSession, ApiError> {
        let value = self
            .call(INIT_USER_REGISTRATION, Some(&serde_json::json!({})))
            .await?;
        serde_json::from_value(value).map_err(ApiError::Decode)
    }

    /// Phase 2 (commit) of registration: enables the user for login.
    pub async fn validate_user(
        &self,
        user_id: &str,
        reg_session_id: &str,
        reg_session_verifier: &str,
        reg_validation_verifier: &str,
    ) -> Result<(), ApiError> {
        self.call(
            VALIDATE_USER_REGISTRATION,
            Some(&ValidateUserRequest {
                reg_session_id,
                reg_session_verifier,
                reg_validation_verifier,
                user_id,
            }),
        )
        .await?;
        Ok(())
    }

    /// Commit a tresor creation; before this call the tresor is unusable.
    pub async fn approve_tresor_creation(&self, tresor_id: &str) -> Result<(), ApiError> {
        self.call(
            APPROVE_TRESOR_CREATION,
            Some(&ApproveTresorCreationRequest { tresor_id }),
        )
        .await?;
        Ok(())
    }

    /// Commit a share operation and return the remote response for the
    /// caller to echo.
    pub async fn approve_share(&self, invite_id: &str) -> Result<serde_json::Value, ApiError> {
        self.call(
            &format!("{APPROVE_SHARE}?inviteId={invite_id}"),
            Some(&ApproveShareRequest {
                operation_id: invite_id,
            }),
        )
        .await
    }

    /// Issue one signed call. `body` present means POST, absent means GET.
    /// A 2xx with an empty body normalizes to an empty JSON object.
    async fn call<B: Serialize>(
        &self,
        path_suffix: &str,
        body: Option<&B>,
    ) -> Result<serde_json::Value, ApiError> {
        let path = format!("{}{}", self.tenant_root, path_suffix);

        let body_bytes = match body {
            Some(b) => Some(serde_json::to_vec(b).map_err(ApiError::Encode)?),
            None => None,
        };
        let method = if body_bytes.is_some() {
            Method::POST
        } else {
            Method::GET
        };

        let headers = signing::sign(&path, body_bytes.as_deref(), &self.credentials);

        let url = format!("{}{}", self.api_base, path);
        debug!(%method, %url, "calling admin api");

        let mut request = self.http.request(method, url);
        for (name, value) in &headers {
            request = request.header(*name, value);
        }
        if let Some(bytes) = body_bytes {
            request = request.body(bytes);
        }

        let response = request.send().await?;
        let status = response.status();
        let text = response.text().await?;

        if !status.is_success() {
            return Err(ApiError::Remote { status, body: text });
        }
        if text.is_empty() {
            return Ok(serde_json::Value::Object(serde_json::Map::new()));
        }
        serde_json::from_str(&text).map_err(ApiError::Decode)
    }
}
