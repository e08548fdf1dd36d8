//! Canonical request signing for the tenant admin API.
//!
//! Every administrative call carries an `Authorization: AdminKey <mac>`
//! header the remote side recomputes from the method, the path, and a fixed
//! set of headers. The `HMACHeaders` header names exactly which headers went
//! into the MAC, in order, so insertion order is load-bearing here: the
//! header list is never sorted.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use chrono::Utc;
use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};

use crate::config::AdminCredentials;

type HmacSha256 = Hmac<Sha256>;

/// Compute the full signed header set for a request to `path` (the resolved
/// path, tenant root included, without the API base). `body` is the exact
/// byte sequence that will be sent; `None` means a GET.
pub fn sign(path: &str, body: Option<&[u8]>, creds: &AdminCredentials) -> Vec<(&'static str, String)> {
    sign_at(path, body, &timestamp(), creds)
}

/// Like [`sign`] but with an explicit timestamp, so the clock is injectable.
/// `date` must already be in `YYYY-MM-DDTHH:MM:SSZ` form.
pub fn sign_at(
    path: &str,
    body: Option<&[u8]>,
    date: &str,
    creds: &AdminCredentials,
) -> Vec<(&'static str, String)> {
    let mut headers: Vec<(&'static str, String)> = vec![
        ("UserId", creds.user_id().to_owned()),
        ("TresoritDate", date.to_owned()),
        ("Content-Type", "application/json".to_owned()),
    ];

    if let Some(bytes) = body {
        if !bytes.is_empty() {
            headers.push(("Content-SHA256", sha256_hex(bytes)));
        }
    }

    let hmac_header_names: Vec<&str> = headers
        .iter()
        .map(|(name, _)| *name)
        .chain(std::iter::once("HMACHeaders"))
        .collect();
    headers.push(("HMACHeaders", hmac_header_names.join(",")));

    let method = if body.is_some() { "POST" } else { "GET" };
    let string_to_sign = canonical_string(method, path, &headers);

    headers.push((
        "Authorization",
        format!("AdminKey {}", hmac_sha256_base64(creds.key_bytes(), &string_to_sign)),
    ));
    headers
}

/// The canonical string the MAC is computed over: method, path, then one
/// `name:value` line per header, in the order they were added.
pub(crate) fn canonical_string(method: &str, path: &str, headers: &[(&'static str, String)]) -> String {
    let mut out = format!("{method}\n{path}");
    for (name, value) in headers {
        out.push('\n');
        out.push_str(name);
        out.push(':');
        out.push_str(value);
    }
    out
}

/// Current UTC time as `YYYY-MM-DDTHH:MM:SSZ` — second precision, no
/// fractional part, regardless of host clock resolution.
fn timestamp() -> String {
    Utc::now().format("%Y-%m-%dT%H:%M:%SZ").to_string()
}

/// Lowercase hex SHA-256 digest.
pub(crate) fn sha256_hex(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

fn hmac_sha256_base64(key: &[u8], message: &str) -> String {
    let mut mac = HmacSha256::new_from_slice(key).expect("HMAC accepts any key length");
    mac.update(message.as_bytes());
    BASE64.encode(mac.finalize().into_bytes())
}
