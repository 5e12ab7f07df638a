//! HMAC-SHA256 request signing for Binance signed endpoints.
//!
//! The signature is computed over the exact URL-encoded query string that is
//! sent, then appended as the last `signature` parameter.

use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Lowercase hex HMAC-SHA256 of `message` keyed with `secret`.
pub fn hmac_sha256_sign(secret: &str, message: &str) -> String {
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC accepts any key length");
    mac.update(message.as_bytes());
    hex::encode(mac.finalize().into_bytes())
}

/// URL-encode `params` in order and join them with `&`.
pub fn encode_query(params: &[(&str, String)]) -> String {
    params
        .iter()
        .map(|(k, v)| format!("{}={}", urlencoding::encode(k), urlencoding::encode(v)))
        .collect::<Vec<_>>()
        .join("&")
}

/// Encoded query with `&signature=<hex>` appended.
///
/// `params` must already carry `timestamp` and `recvWindow`.
pub fn build_signed_query(params: &[(&str, String)], secret: &str) -> String {
    let query = encode_query(params);
    let signature = hmac_sha256_sign(secret, &query);
    format!("{query}&signature={signature}")
}
