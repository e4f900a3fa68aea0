//! Webhook payload signing.
//!
//! Receivers verify `X-Ledger-Signature: sha256=<hex>` against the exact
//! raw body bytes with the tenant's shared secret.

use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// hex(HMAC-SHA256(secret, payload)).
pub fn sign(secret: &str, payload: &[u8]) -> String {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .expect("hmac accepts keys of any length");
    mac.update(payload);
    hex::encode(mac.finalize().into_bytes())
}

/// The full header value for a signed body.
pub fn header_value(secret: &str, payload: &[u8]) -> String {
    format!("sha256={}", sign(secret, payload))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_vector() {
        // RFC 4231 test case 2.
        let signature = sign("Jefe", b"what do ya want for nothing?");
        assert_eq!(
            signature,
            "5bdcc146bf60754e6a042426089575c75a003f089d2739839dec58b964ec3843"
        );
    }

    #[test]
    fn identical_bytes_produce_identical_signatures() {
        let body = br#"{"id":"evt_1","type":"transaction.posted"}"#;
        assert_eq!(sign("secret", body), sign("secret", body));
        assert_ne!(sign("secret", body), sign("other", body));
        assert_ne!(sign("secret", body), sign("secret", b"{}"));
    }

    #[test]
    fn header_carries_scheme_prefix() {
        let value = header_value("secret", b"payload");
        assert!(value.starts_with("sha256="));
        assert_eq!(value.len(), "sha256=".len() + 64);
    }
}
