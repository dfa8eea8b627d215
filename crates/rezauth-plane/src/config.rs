//! Token service configuration.

use rezauth_core::error::{CoreError, CoreResult};

/// Minimum accepted signing key length, in characters.
pub const MIN_SIGNING_KEY_LEN: usize = 32;

/// Configuration for the token service.
#[derive(Debug, Clone)]
pub struct TokenConfig {
    /// Issuer (`iss` claim).
    pub issuer: String,
    /// HMAC-SHA256 signing key; at least [`MIN_SIGNING_KEY_LEN`] chars.
    pub signing_key: String,
    /// Access token lifetime in seconds (default: 300 = 5 minutes).
    pub token_ttl_seconds: u64,
    /// Accepted clock skew when checking expiry (default: 60).
    pub token_clock_skew_seconds: u64,
    /// Grace window for in-flight refresh attempts while the control
    /// plane is in outage mode (default: 420 = 7 minutes).
    pub outage_grace_window_seconds: u64,
}

impl Default for TokenConfig {
    fn default() -> Self {
        Self {
            issuer: "rezilient-auth".into(),
            signing_key: String::new(),
            token_ttl_seconds: 300,
            token_clock_skew_seconds: 60,
            outage_grace_window_seconds: 420,
        }
    }
}

impl TokenConfig {
    pub fn validate(&self) -> CoreResult<()> {
        if self.signing_key.chars().count() < MIN_SIGNING_KEY_LEN {
            return Err(CoreError::Validation {
                message: format!("signing key must be at least {MIN_SIGNING_KEY_LEN} characters"),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_signing_keys_are_rejected() {
        let config = TokenConfig {
            signing_key: "too-short".into(),
            ..TokenConfig::default()
        };
        assert!(config.validate().is_err());

        let config = TokenConfig {
            signing_key: "0123456789abcdef0123456789abcdef".into(),
            ..TokenConfig::default()
        };
        assert!(config.validate().is_ok());
    }
}
