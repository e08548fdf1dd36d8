//! Coordinates the two-phase flows against the tenant admin API.
//!
//! The ordering rule all flows share: the local record write completes
//! before the remote commit is issued. Local writes are cheap to retry;
//! the remote commit is the only externally-irreversible step. A crash (or
//! rejected commit) between the two leaves a record that can be re-driven by
//! simply retrying the same request — at-least-once commit, relying on the
//! tenant treating commits as idempotent per operation id.

use serde::Serialize;
use thiserror::Error;
use tracing::info;

use crate::client::{AdminApi, ApiError};
use crate::store::RegStore;

#[derive(Debug, Error)]
pub enum RegistrarError {
    /// Local lookup miss — never reaches the remote API.
    #[error("user not found")]
    UserNotFound,
    /// The alias is already bound to a registration.
    #[error("alias '{0}' is already registered")]
    AliasTaken(String),
    #[error(transparent)]
    Api(#[from] ApiError),
    #[error(transparent)]
    Store(#[from] anyhow::Error),
}

/// Client-side data returned from a freshly initiated registration. The
/// session verifier deliberately stays out of this struct — it is a
/// server-side secret.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingRegistration {
    pub user_id: String,
    pub reg_session_id: String,
}

#[derive(Clone)]
pub struct Registrar {
    api: AdminApi,
    store: RegStore,
}

impl Registrar {
    pub fn new(api: AdminApi, store: RegStore) -> Self {
        Self { api, store }
    }

    /// Alias → tenant user id lookup. Purely local.
    pub fn user_id_for_alias(&self, alias: &str) -> Result<String, RegistrarError> {
        match self.store.find_by_alias(alias)? {
            Some(record) => Ok(record.user_id),
            None => Err(RegistrarError::UserNotFound),
        }
    }

    /// Phase 1 of registration: ask the tenant for a user id and session
    /// identifiers, persist them keyed by alias, and only then hand the
    /// client-side part back to the caller.
    pub async fn init_registration(
        &self,
        alias: &str,
    ) -> Result<PendingRegistration, RegistrarError> {
        if self.store.find_by_alias(alias)?.is_some() {
            return Err(RegistrarError::AliasTaken(alias.to_owned()));
        }

        let session = self.api.init_user_registration().await?;
        let record = self.store.insert(
            alias,
            &session.user_id,
            &session.reg_session_id,
            &session.reg_session_verifier,
        )?;

        info!(alias, user_id = %record.user_id, "registration initiated");
        Ok(PendingRegistration {
            user_id: record.user_id,
            reg_session_id: record.reg_session_id,
        })
    }

    /// Phase 2 of registration: attach the validation verifier to the local
    /// record (durably, before any remote I/O), then commit on the tenant to
    /// enable the login. An unknown user id fails locally without touching
    /// the network.
    pub async fn finish_registration(
        &self,
        user_id: &str,
        reg_validation_verifier: &str,
    ) -> Result<(), RegistrarError> {
        let record = self
            .store
            .attach_validation_verifier(user_id, reg_validation_verifier)?
            .ok_or(RegistrarError::UserNotFound)?;

        self.api
            .validate_user(
                &record.user_id,
                &record.reg_session_id,
                &record.reg_session_verifier,
                reg_validation_verifier,
            )
            .await?;

        info!(user_id, alias = %record.alias, "registration validated");
        Ok(())
    }

    /// Commit a tresor created on the client side. No local state — the
    /// tresor id lives with the tenant.
    pub async fn create_tresor(&self, tresor_id: &str) -> Result<(), RegistrarError> {
        self.api.approve_tresor_creation(tresor_id).await?;
        info!(tresor_id, "tresor creation approved");
        Ok(())
    }

    /// Commit a share initiated on the client side; the remote response is
    /// echoed back to the caller.
    pub async fn share_tresor(
        &self,
        invite_id: &str,
    ) -> Result<serde_json::Value, RegistrarError> {
        let response = self.api.approve_share(invite_id).await?;
        info!(invite_id, "share approved");
        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use crate::config::AdminCredentials;
    use crate::store::crypto;

    fn make_store() -> (RegStore, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let store = RegStore::open(&dir.path().join("test.db"), crypto::generate_key()).unwrap();
        (store, dir)
    }

    fn make_registrar(mock_uri: &str, store: RegStore) -> Registrar {
        let creds =
            AdminCredentials::new("admin@t1.example.io", "00112233445566778899aabbccddeeff")
                .unwrap();
        Registrar::new(AdminApi::new(mock_uri, "", creds), store)
    }

    async fn mount_init(mock: &MockServer) {
        Mock::given(method("POST"))
            .and(path("/api/v4/admin/user/init-user-registration"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "UserId": "u-123",
                "RegSessionId": "rs-1",
                "RegSessionVerifier": "sv-secret"
            })))
            .mount(mock)
            .await;
    }

    #[tokio::test]
    async fn init_persists_all_identifiers_before_returning() {
        let mock = MockServer::start().await;
        mount_init(&mock).await;

        let (store, _dir) = make_store();
        let registrar = make_registrar(&mock.uri(), store.clone());

        let pending = registrar.init_registration("alice").await.unwrap();
        assert_eq!(pending.user_id, "u-123");
        assert_eq!(pending.reg_session_id, "rs-1");

        // All three identifiers are on disk, keyed by the alias.
        let record = store.find_by_alias("alice").unwrap().unwrap();
        assert_eq!(record.user_id, "u-123");
        assert_eq!(record.reg_session_id, "rs-1");
        assert_eq!(record.reg_session_verifier, "sv-secret");
    }

    #[tokio::test]
    async fn init_rejects_taken_alias_without_remote_call() {
        let mock = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v4/admin/user/init-user-registration"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "UserId": "u-123",
                "RegSessionId": "rs-1",
                "RegSessionVerifier": "sv"
            })))
            .expect(1) // only the first init may hit the tenant
            .mount(&mock)
            .await;

        let (store, _dir) = make_store();
        let registrar = make_registrar(&mock.uri(), store);

        registrar.init_registration("alice").await.unwrap();
        let err = registrar.init_registration("alice").await.unwrap_err();
        assert!(matches!(err, RegistrarError::AliasTaken(_)));
    }

    #[tokio::test]
    async fn finish_for_unknown_user_never_calls_the_tenant() {
        let mock = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v4/admin/user/validate-user-registration"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&mock)
            .await;

        let (store, _dir) = make_store();
        let registrar = make_registrar(&mock.uri(), store);

        let err = registrar
            .finish_registration("u-unknown", "vv")
            .await
            .unwrap_err();
        assert!(matches!(err, RegistrarError::UserNotFound));
    }

    #[tokio::test]
    async fn finish_sends_accumulated_identifiers() {
        let mock = MockServer::start().await;
        mount_init(&mock).await;
        Mock::given(method("POST"))
            .and(path("/api/v4/admin/user/validate-user-registration"))
            .and(body_json(serde_json::json!({
                "RegSessionId": "rs-1",
                "RegSessionVerifier": "sv-secret",
                "RegValidationVerifier": "vv-1",
                "UserId": "u-123"
            })))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&mock)
            .await;

        let (store, _dir) = make_store();
        let registrar = make_registrar(&mock.uri(), store.clone());

        registrar.init_registration("alice").await.unwrap();
        registrar.finish_registration("u-123", "vv-1").await.unwrap();

        let record = store.find_by_user_id("u-123").unwrap().unwrap();
        assert_eq!(record.reg_validation_verifier.as_deref(), Some("vv-1"));
    }

    #[tokio::test]
    async fn rejected_commit_propagates_and_stays_redrivable() {
        let mock = MockServer::start().await;
        mount_init(&mock).await;
        Mock::given(method("POST"))
            .and(path("/api/v4/admin/user/validate-user-registration"))
            .respond_with(ResponseTemplate::new(500).set_body_string("tenant unavailable"))
            .mount(&mock)
            .await;

        let (store, _dir) = make_store();
        let registrar = make_registrar(&mock.uri(), store.clone());
        registrar.init_registration("alice").await.unwrap();

        let before = store.find_by_user_id("u-123").unwrap().unwrap();
        let err = registrar
            .finish_registration("u-123", "vv-1")
            .await
            .unwrap_err();
        match err {
            RegistrarError::Api(ApiError::Remote { status, body }) => {
                assert_eq!(status.as_u16(), 500);
                assert_eq!(body, "tenant unavailable");
            }
            other => panic!("expected remote error, got {other:?}"),
        }

        // The record still holds everything needed to retry the commit.
        let after = store.find_by_user_id("u-123").unwrap().unwrap();
        assert_eq!(after.user_id, before.user_id);
        assert_eq!(after.reg_session_id, before.reg_session_id);
        assert_eq!(after.reg_session_verifier, before.reg_session_verifier);
        assert_eq!(after.reg_validation_verifier.as_deref(), Some("vv-1"));
    }

    #[tokio::test]
    async fn commit_can_be_reissued_after_a_dropped_response() {
        let mock = MockServer::start().await;
        mount_init(&mock).await;
        Mock::given(method("POST"))
            .and(path("/api/v4/admin/user/validate-user-registration"))
            .respond_with(ResponseTemplate::new(200))
            .expect(2)
            .mount(&mock)
            .await;

        let (store, _dir) = make_store();
        let registrar = make_registrar(&mock.uri(), store);
        registrar.init_registration("alice").await.unwrap();

        // Simulates a retry after the first response was lost in transit;
        // both attempts succeed, side effects rest on remote idempotence.
        registrar.finish_registration("u-123", "vv-1").await.unwrap();
        registrar.finish_registration("u-123", "vv-1").await.unwrap();
    }

    #[tokio::test]
    async fn user_id_lookup_is_local_only() {
        let mock = MockServer::start().await;
        mount_init(&mock).await;

        let (store, _dir) = make_store();
        let registrar = make_registrar(&mock.uri(), store);
        registrar.init_registration("alice").await.unwrap();

        assert_eq!(registrar.user_id_for_alias("alice").unwrap(), "u-123");
        assert!(matches!(
            registrar.user_id_for_alias("nobody").unwrap_err(),
            RegistrarError::UserNotFound
        ));
    }

    #[tokio::test]
    async fn share_echoes_remote_response() {
        let mock = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v4/admin/tresor/approve-share"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({"Ok": true})),
            )
            .mount(&mock)
            .await;

        let (store, _dir) = make_store();
        let registrar = make_registrar(&mock.uri(), store);
        let echoed = registrar.share_tresor("inv-1").await.unwrap();
        assert_eq!(echoed, serde_json::json!({"Ok": true}));
    }
}
