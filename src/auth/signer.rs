use crate::error::ConfigError;
use base64::{engine::general_purpose, Engine as _};
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Request path signed by the websocket login handshake
pub const LOGIN_PATH: &str = "/users/self/verify";

/// Computes venue request signatures.
///
/// The canonical string is `timestamp + METHOD + path + body`; the signature is
/// the base64 encoded HMAC-SHA256 of it keyed with the secret key.
#[derive(Clone)]
pub struct Signer {
    mac: HmacSha256,
}

impl Signer {
    /// Fails when the secret key is empty
    pub fn new(secret_key: &str) -> Result<Self, ConfigError> {
        if secret_key.is_empty() {
            return Err(ConfigError::MissingSecret);
        }
        let mac = HmacSha256::new_from_slice(secret_key.as_bytes())
            .map_err(|_| ConfigError::MissingSecret)?;
        Ok(Self { mac })
    }

    pub fn sign(&self, method: &str, path: &str, body: &str, timestamp: &str) -> String {
        let mut mac = self.mac.clone();
        mac.update(timestamp.as_bytes());
        mac.update(method.to_uppercase().as_bytes());
        mac.update(path.as_bytes());
        mac.update(body.as_bytes());
        general_purpose::STANDARD.encode(mac.finalize().into_bytes())
    }

    /// Signature for the websocket login frame at the given Unix-seconds timestamp
    pub fn sign_login(&self, timestamp: &str) -> String {
        self.sign("GET", LOGIN_PATH, "", timestamp)
    }
}

impl std::fmt::Debug for Signer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Signer { .. }")
    }
}

/// REST timestamp: ISO-8601, millisecond precision, `Z` suffix
pub fn rest_timestamp(now: DateTime<Utc>) -> String {
    now.format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string()
}

/// Login timestamp: Unix seconds
pub fn login_timestamp(now: DateTime<Utc>) -> String {
    now.timestamp().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    const SECRET: &str = "22582BD0CFF14C41EDBF1AB98506286D";

    #[test]
    fn test_sign_known_vector() {
        let signer = Signer::new(SECRET).unwrap();
        let signature = signer.sign(
            "GET",
            "/api/v5/account/balance?ccy=BTC",
            "",
            "2020-12-08T09:08:57.715Z",
        );
        assert_eq!(signature, "HiZhvSfMtWJA3uUIVXV3a/bSXNPCWvYFXoGCVS8V4zY=");
    }

    #[test]
    fn test_sign_login() {
        let signer = Signer::new(SECRET).unwrap();
        assert_eq!(
            signer.sign_login("1538054050"),
            "+LdIr8lkkvhr5hoA3g9TMC0+uQJ849ftAcocA/ouu4M="
        );
    }

    #[test]
    fn test_method_is_uppercased() {
        let signer = Signer::new(SECRET).unwrap();
        assert_eq!(
            signer.sign("get", "/a", "", "1"),
            signer.sign("GET", "/a", "", "1")
        );
    }

    #[test]
    fn test_empty_secret_rejected() {
        assert!(matches!(Signer::new(""), Err(ConfigError::MissingSecret)));
    }

    #[test]
    fn test_timestamps() {
        let now = Utc.timestamp_millis_opt(1_607_418_537_715).unwrap();
        assert_eq!(rest_timestamp(now), "2020-12-08T09:08:57.715Z");
        assert_eq!(login_timestamp(now), "1607418537");
    }
}
