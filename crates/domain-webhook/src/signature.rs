use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Verifies a `sha256=<hex>`-style signature header against the raw
/// request body using the configured webhook secret. Constant-time
/// comparison so the check itself doesn't leak timing information
/// about how much of the signature matched.
pub fn verify_signature(secret: &str, payload: &[u8], signature: &str) -> bool {
    let Some(expected) = compute_signature(secret, payload) else {
        return false;
    };
    constant_time_eq(expected.as_bytes(), signature.as_bytes())
}

fn compute_signature(secret: &str, payload: &[u8]) -> Option<String> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).ok()?;
    mac.update(payload);
    Some(format!("sha256={}", hex::encode(mac.finalize().into_bytes())))
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut diff = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        diff |= x ^ y;
    }
    diff == 0
}
