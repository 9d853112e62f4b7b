//! Request authentication.
//!
//! Player routes carry an identity-integrity header: a form-urlencoded
//! payload signed by the host platform with HMAC-SHA256 over the sorted
//! `key=value` lines. Verification here is a one-shot integrity check; the
//! signing side lives with the platform. Service routes carry a shared API
//! key compared by SHA-256 hash.

use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::{Digest, Sha256};
use url::form_urlencoded;

type HmacSha256 = Hmac<Sha256>;

pub const IDENTITY_HEADER: &str = "x-identity-token";
pub const SERVICE_KEY_HEADER: &str = "x-api-key";

/// The authenticated caller of a player route.
#[derive(Debug, Clone, PartialEq)]
pub struct PlayerIdentity {
    pub id: u64,
    pub username: Option<String>,
    pub display_name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct UserPayload {
    id: u64,
    #[serde(default)]
    username: Option<String>,
    #[serde(default)]
    first_name: Option<String>,
}

#[derive(Clone)]
pub struct IdentityVerifier {
    key: Vec<u8>,
}

impl IdentityVerifier {
    /// Derive the signing key from the shared application secret the way
    /// the platform's web-app flow does: HMAC("WebAppData", secret).
    pub fn new(secret: &str) -> Self {
        let mut mac = HmacSha256::new_from_slice(b"WebAppData")
            .expect("HMAC can take key of any size");
        mac.update(secret.as_bytes());
        Self {
            key: mac.finalize().into_bytes().to_vec(),
        }
    }

    /// Validate the raw header value and extract the caller identity.
    /// Any defect — missing hash, bad signature, malformed user payload —
    /// reads as unauthenticated; callers turn `None` into a uniform 401.
    pub fn verify(&self, raw: &str) -> Option<PlayerIdentity> {
        let mut pairs: Vec<(String, String)> = form_urlencoded::parse(raw.as_bytes())
            .into_owned()
            .collect();
        let hash_pos = pairs.iter().position(|(key, _)| key == "hash")?;
        let (_, presented) = pairs.remove(hash_pos);
        let presented = hex::decode(presented).ok()?;

        pairs.sort_by(|a, b| a.0.cmp(&b.0));
        let check_string = pairs
            .iter()
            .map(|(key, value)| format!("{key}={value}"))
            .collect::<Vec<_>>()
            .join("\n");

        let mut mac = HmacSha256::new_from_slice(&self.key)
            .expect("HMAC can take key of any size");
        mac.update(check_string.as_bytes());
        mac.verify_slice(&presented).ok()?;

        let user_raw = pairs.iter().find(|(key, _)| key == "user").map(|(_, v)| v)?;
        let user: UserPayload = serde_json::from_str(user_raw).ok()?;
        Some(PlayerIdentity {
            id: user.id,
            username: user.username,
            display_name: user.first_name,
        })
    }
}

/// Compare a presented service key against the configured SHA-256 hash.
/// An unconfigured hash rejects everything rather than allowing everything.
pub fn service_key_matches(expected_hash_hex: &str, presented: &str) -> bool {
    if expected_hash_hex.is_empty() {
        return false;
    }
    let digest = Sha256::digest(presented.as_bytes());
    hex::encode(digest) == expected_hash_hex.to_ascii_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Build a signed header value the way the platform would.
    fn sign(secret: &str, fields: &[(&str, &str)]) -> String {
        let verifier = IdentityVerifier::new(secret);
        let mut sorted: Vec<_> = fields.to_vec();
        sorted.sort_by_key(|(key, _)| *key);
        let check_string = sorted
            .iter()
            .map(|(key, value)| format!("{key}={value}"))
            .collect::<Vec<_>>()
            .join("\n");
        let mut mac = HmacSha256::new_from_slice(&verifier.key).unwrap();
        mac.update(check_string.as_bytes());
        let hash = hex::encode(mac.finalize().into_bytes());

        let mut serializer = form_urlencoded::Serializer::new(String::new());
        for (key, value) in fields {
            serializer.append_pair(key, value);
        }
        serializer.append_pair("hash", &hash);
        serializer.finish()
    }

    #[test]
    fn valid_signature_yields_the_identity() {
        let verifier = IdentityVerifier::new("app-secret");
        let header = sign(
            "app-secret",
            &[
                ("auth_date", "1722470400"),
                ("user", r#"{"id":42,"username":"ada","first_name":"Ada"}"#),
            ],
        );
        let identity = verifier.verify(&header).expect("identity");
        assert_eq!(identity.id, 42);
        assert_eq!(identity.username.as_deref(), Some("ada"));
        assert_eq!(identity.display_name.as_deref(), Some("Ada"));
    }

    #[test]
    fn tampered_payload_is_rejected() {
        let verifier = IdentityVerifier::new("app-secret");
        let header = sign(
            "app-secret",
            &[("auth_date", "1722470400"), ("user", r#"{"id":42}"#)],
        );
        let tampered = header.replace("42", "43");
        assert!(verifier.verify(&tampered).is_none());
    }

    #[test]
    fn wrong_secret_is_rejected() {
        let verifier = IdentityVerifier::new("app-secret");
        let header = sign(
            "other-secret",
            &[("auth_date", "1722470400"), ("user", r#"{"id":42}"#)],
        );
        assert!(verifier.verify(&header).is_none());
    }

    #[test]
    fn missing_hash_is_rejected() {
        let verifier = IdentityVerifier::new("app-secret");
        assert!(verifier.verify("user=%7B%22id%22%3A42%7D").is_none());
    }

    #[test]
    fn service_key_hash_comparison() {
        let hash = hex::encode(Sha256::digest(b"svc-key"));
        assert!(service_key_matches(&hash, "svc-key"));
        assert!(!service_key_matches(&hash, "wrong"));
        assert!(!service_key_matches("", "anything"));
    }
}
