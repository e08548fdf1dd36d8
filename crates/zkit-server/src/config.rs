use thiserror::Error;
use zeroize::ZeroizeOnDrop;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("admin key must not be empty")]
    EmptyAdminKey,
    #[error("admin key is not valid hex: {0}")]
    AdminKeyNotHex(#[from] hex::FromHexError),
}

/// Tenant admin credentials, fixed at process start.
///
/// The admin key is configured as a hex string but used as raw bytes when
/// keying the request HMAC, so it is decoded once here. The decoded bytes are
/// wiped on drop.
#[derive(Clone, ZeroizeOnDrop)]
pub struct AdminCredentials {
    #[zeroize(skip)]
    user_id: String,
    key: Vec<u8>,
}

impl AdminCredentials {
    /// Build credentials from the configured admin user id and hex-encoded
    /// admin key.
    pub fn new(user_id: impl Into<String>, admin_key_hex: &str) -> Result<Self, ConfigError> {
        if admin_key_hex.is_empty() {
            return Err(ConfigError::EmptyAdminKey);
        }
        let key = hex::decode(admin_key_hex)?;
        Ok(Self {
            user_id: user_id.into(),
            key,
        })
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    /// Raw HMAC key bytes (hex-decoded admin key).
    pub(crate) fn key_bytes(&self) -> &[u8] {
        &self.key
    }
}

impl std::fmt::Debug for AdminCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdminCredentials")
            .field("user_id", &self.user_id)
            .field("key", &"<redacted>")
            .finish()
    }
}

/// Normalize a tenant root path into the form the signer and client expect:
/// empty, or a relative prefix with a trailing slash (`tenant-<id>/`).
pub fn normalize_tenant_root(root: &str) -> String {
    let trimmed = root.trim_matches('/');
    if trimmed.is_empty() {
        String::new()
    } else {
        format!("{trimmed}/")
    }
}

/// Normalize an API base URL to always end with a slash.
pub fn normalize_api_base(base: &str) -> String {
    let trimmed = base.trim_end_matches('/');
    format!("{trimmed}/")
}
