use base64::{Engine, engine::general_purpose::STANDARD};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;

type HmacSha256 = Hmac<Sha256>;

/// HMAC-SHA256 of `payload` keyed with `secret`, base64 (standard alphabet, padded).
pub fn hmac_sha256_base64(secret: &[u8], payload: &[u8]) -> Result<String, anyhow::Error> {
    let mut mac = HmacSha256::new_from_slice(secret)
        .map_err(|e| anyhow::anyhow!("Invalid key length: {}", e))?;
    mac.update(payload);
    Ok(STANDARD.encode(mac.finalize().into_bytes()))
}

/// Constant time comparison of two secrets.
pub fn secure_compare(expected: &str, actual: &str) -> bool {
    let expected_bytes = expected.as_bytes();
    let actual_bytes = actual.as_bytes();

    if expected_bytes.len() != actual_bytes.len() {
        return false;
    }

    expected_bytes.ct_eq(actual_bytes).into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_vector() {
        assert_eq!(
            hmac_sha256_base64(b"secret", b"a=b&c=d").unwrap(),
            "dteWgtm+Tl2TM7dYXTCS9c6atObKTQpGtEk6b+vpVKY="
        );
    }

    #[test]
    fn empty_payload_vector() {
        assert_eq!(
            hmac_sha256_base64(b"secret", b"").unwrap(),
            "+eZuF5tnR65UEI+C+K3os8Jddv0wr95sOVgixTAZYWk="
        );
    }

    #[test]
    fn compare_matches_only_identical_values() {
        assert!(secure_compare("webhook-secret-value", "webhook-secret-value"));
        assert!(!secure_compare("webhook-secret-value", "webhook-secret-valuf"));
        assert!(!secure_compare("webhook-secret-value", "webhook"));
        assert!(!secure_compare("webhook-secret-value", ""));
    }
}
