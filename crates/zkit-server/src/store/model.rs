use serde::{Deserialize, Serialize};
use zeroize::ZeroizeOnDrop;

/// Stored in redb as bincode-encoded bytes.
/// The verifier pair is ChaCha20Poly1305 ciphertext; lookup metadata stays
/// plaintext so alias/user-id lookups never decrypt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredRegistration {
    pub alias: String,
    pub user_id: String,
    pub reg_session_id: String,
    /// ChaCha20Poly1305 ciphertext over the bincode-encoded [`Verifiers`].
    pub verifiers_encrypted: Vec<u8>,
    /// Per-record random 12-byte nonce.
    pub nonce: [u8; 12],
    /// Unix timestamp (seconds) when the registration was initiated.
    pub created_at: i64,
}

/// The server-side registration secrets, encrypted at rest.
/// `reg_session_verifier` must never reach the client device;
/// `reg_validation_verifier` is attached once the client finishes.
#[derive(Debug, Clone, Serialize, Deserialize, ZeroizeOnDrop)]
pub(crate) struct Verifiers {
    pub reg_session_verifier: String,
    pub reg_validation_verifier: Option<String>,
}

/// A registration record as the coordinator sees it, verifiers decrypted.
#[derive(Debug, Clone, PartialEq)]
pub struct RegistrationRecord {
    /// Caller-supplied business key, unique per registration.
    pub alias: String,
    /// Opaque id issued by the tenant.
    pub user_id: String,
    pub reg_session_id: String,
    pub reg_session_verifier: String,
    pub reg_validation_verifier: Option<String>,
    pub created_at: i64,
}
