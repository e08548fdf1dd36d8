use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::{Context, Result};
use axum::{response::Redirect, routing::get, routing::post, Router};
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::{
    client::AdminApi,
    config::AdminCredentials,
    handlers::{finished_registration, get_user_id, init_user_reg, new_tresor, shared_tresor},
    registrar::Registrar,
    store::{crypto, RegStore},
    AppState,
};

pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Tenant admin user, e.g. `admin@<tenant>.tresorit.io`.
    pub admin_user_id: String,
    /// Hex-encoded admin key.
    pub admin_key: String,
    /// Tenant API base URL, e.g. `https://<host>.api.tresorit.io`.
    pub api_base: String,
    /// Tenant root path prefix; empty for single-tenant hosts.
    pub tenant_root: String,
    pub data_dir: Option<PathBuf>,
    /// Directory served for the browser-side demo pages.
    pub static_dir: PathBuf,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: std::env::var("ZKIT_HOST").unwrap_or_else(|_| "0.0.0.0".into()),
            port: std::env::var("ZKIT_PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(3000),
            admin_user_id: std::env::var("ZKIT_ADMIN_USER_ID").unwrap_or_default(),
            admin_key: std::env::var("ZKIT_ADMIN_KEY").unwrap_or_default(),
            api_base: std::env::var("ZKIT_API_BASE").unwrap_or_default(),
            tenant_root: std::env::var("ZKIT_TENANT_ROOT").unwrap_or_default(),
            data_dir: std::env::var("ZKIT_DATA_DIR").ok().map(PathBuf::from),
            static_dir: std::env::var("ZKIT_STATIC_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("static")),
        }
    }
}

/// Resolve the data directory and make sure it exists.
pub fn resolve_data_dir(data_dir: Option<&PathBuf>) -> Result<PathBuf> {
    match data_dir {
        Some(d) => {
            std::fs::create_dir_all(d).context("create data dir")?;
            Ok(d.clone())
        }
        None => crate::dirs::data_dir(),
    }
}

pub async fn run(cfg: ServerConfig) -> Result<()> {
    if cfg.api_base.is_empty() {
        anyhow::bail!("ZKIT_API_BASE is required");
    }
    if cfg.admin_user_id.is_empty() {
        anyhow::bail!("ZKIT_ADMIN_USER_ID is required");
    }

    let credentials = AdminCredentials::new(&cfg.admin_user_id, &cfg.admin_key)
        .context("invalid ZKIT_ADMIN_KEY")?;

    let data_dir = resolve_data_dir(cfg.data_dir.as_ref())?;
    info!(data_dir = %data_dir.display(), "using data directory");

    let key = load_or_create_key(&data_dir)?;
    let store = RegStore::open(&data_dir.join("registrations.db"), key).context("open store")?;

    let api = AdminApi::new(cfg.api_base.as_str(), cfg.tenant_root.as_str(), credentials);
    let state = AppState {
        registrar: Registrar::new(api, store),
    };

    let api_routes = Router::new()
        .route("/get-user-id", post(get_user_id))
        .route("/init-user-reg", post(init_user_reg))
        .route("/finished-registration", post(finished_registration))
        .route("/new-tresor", post(new_tresor))
        .route("/shared-tresor", post(shared_tresor));

    let app = Router::new()
        .nest("/api", api_routes)
        .route("/", get(|| async { Redirect::to("/login.html") }))
        .fallback_service(ServeDir::new(&cfg.static_dir))
        .with_state(state)
        .layer(TraceLayer::new_for_http());

    let addr: SocketAddr = format!("{}:{}", cfg.host, cfg.port)
        .parse()
        .context("invalid host/port")?;

    info!(%addr, "zkit demo server listening");
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("bind listener")?;

    axum::serve(listener, app).await.context("server error")
}

/// Load the at-rest encryption key from the data dir, generating one on
/// first start.
fn load_or_create_key(data_dir: &std::path::Path) -> Result<crypto::EncryptionKey> {
    let key_path = data_dir.join("zkit.key");
    if key_path.exists() {
        let bytes = std::fs::read(&key_path).context("read zkit.key")?;
        crypto::load_key(&bytes).ok_or_else(|| {
            anyhow::anyhow!("zkit.key is corrupt (expected 32 bytes, got {})", bytes.len())
        })
    } else {
        let key = crypto::generate_key();
        std::fs::write(&key_path, key.as_bytes()).context("write zkit.key")?;
        info!("generated new encryption key");
        Ok(key)
    }
}
