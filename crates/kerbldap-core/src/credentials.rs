//! Bind credentials for a legacy domain.
//!
//! The legacy configuration stores a SASL principal (`user@REALM`) and its password. The same
//! password is reused for the final simple bind unless the operator overrides it.

use secrecy::{ExposeSecret, SecretString};

/// Credentials used to reach a domain's directory.
#[derive(Debug, Clone)]
pub struct DomainCredentials {
    /// SASL/Kerberos principal, usually `user@REALM`
    pub sasl_user: String,

    /// Password for the principal
    pub password: SecretString,
}

impl DomainCredentials {
    /// Create new domain credentials.
    #[must_use]
    pub fn new(sasl_user: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            sasl_user: sasl_user.into(),
            password: SecretString::from(password.into()),
        }
    }

    /// The principal without its realm.
    #[must_use]
    pub fn short_name(&self) -> &str {
        self.sasl_user
            .split_once('@')
            .map_or(self.sasl_user.as_str(), |(user, _)| user)
    }

    /// Get the password in clear text.
    #[must_use]
    pub fn password(&self) -> &str {
        self.password.expose_secret()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_name() {
        let creds = DomainCredentials::new("admin@EXAMPLE.COM", "secret");
        assert_eq!(creds.short_name(), "admin");

        let bare = DomainCredentials::new("admin", "secret");
        assert_eq!(bare.short_name(), "admin");
    }

    #[test]
    fn test_debug_redacts_password() {
        let creds = DomainCredentials::new("admin@EXAMPLE.COM", "secret");
        assert!(!format!("{creds:?}").contains("secret"));
    }
}
