use crate::error::ConfigError;
use serde::Deserialize;
use std::env;
use std::fmt;

pub const API_KEY_ENV: &str = "OKX_API_KEY";
pub const SECRET_KEY_ENV: &str = "OKX_SECRET_KEY";
pub const PASSPHRASE_ENV: &str = "OKX_PASSPHRASE";

/// Secret string that never prints its value
#[derive(Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(transparent)]
pub struct Secret(String);

impl Secret {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Get the raw value (use with caution)
    pub fn expose(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Mask for logging (first 4 and last 4 characters only)
    pub fn mask(&self) -> String {
        if self.0.len() <= 8 {
            "****".to_string()
        } else {
            format!("{}...{}", &self.0[..4], &self.0[self.0.len() - 4..])
        }
    }

    fn from_env(var_name: &str) -> Result<Self, ConfigError> {
        let value = env::var(var_name).map_err(|_| ConfigError::MissingEnv(var_name.to_string()))?;
        if value.is_empty() {
            return Err(ConfigError::MissingEnv(var_name.to_string()));
        }
        Ok(Self(value))
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.mask())
    }
}

impl fmt::Display for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.mask())
    }
}

impl From<&str> for Secret {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// API credentials for the private channels and signed REST calls
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct Credentials {
    pub api_key: Secret,
    pub secret_key: Secret,
    pub passphrase: Secret,
}

impl Credentials {
    pub fn new(
        api_key: impl Into<String>,
        secret_key: impl Into<String>,
        passphrase: impl Into<String>,
    ) -> Self {
        Self {
            api_key: Secret::new(api_key),
            secret_key: Secret::new(secret_key),
            passphrase: Secret::new(passphrase),
        }
    }

    /// Load from `OKX_API_KEY`, `OKX_SECRET_KEY` and `OKX_PASSPHRASE`
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            api_key: Secret::from_env(API_KEY_ENV)?,
            secret_key: Secret::from_env(SECRET_KEY_ENV)?,
            passphrase: Secret::from_env(PASSPHRASE_ENV)?,
        })
    }

    /// Check that every field is present
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.api_key.is_empty() {
            return Err(ConfigError::Empty("api_key"));
        }
        if self.secret_key.is_empty() {
            return Err(ConfigError::MissingSecret);
        }
        if self.passphrase.is_empty() {
            return Err(ConfigError::Empty("passphrase"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_secret_masking() {
        let secret = Secret::new("abcdefghijklmnopqrstuvwxyz");
        assert_eq!(secret.mask(), "abcd...wxyz");
        assert_eq!(Secret::new("short").mask(), "****");
    }

    #[test]
    fn test_debug_never_prints_secret() {
        let creds = Credentials::new("key-1234567890", "super-secret-value", "my-passphrase");
        let printed = format!("{:?}", creds);

        assert!(!printed.contains("super-secret-value"));
        assert!(!printed.contains("my-passphrase"));
        assert!(printed.contains("supe...alue"));
    }

    #[test]
    fn test_validate() {
        assert!(Credentials::new("k", "s", "p").validate().is_ok());
        assert!(matches!(
            Credentials::new("k", "", "p").validate(),
            Err(ConfigError::MissingSecret)
        ));
        assert!(matches!(
            Credentials::default().validate(),
            Err(ConfigError::Empty("api_key"))
        ));
    }

    #[test]
    fn test_deserialize_transparent() {
        let creds: Credentials = serde_json::from_str(
            r#"{"api_key":"k","secret_key":"s","passphrase":"p"}"#,
        )
        .unwrap();
        assert_eq!(creds.secret_key.expose(), "s");
    }
}
