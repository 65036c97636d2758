//! Validated options of one migration run.

use kerbldap_core::{Error, Protocol, Result};
use secrecy::SecretString;
use std::path::{Path, PathBuf};
use validator::Validate;

/// Options of one migration run, with every derived default applied.
#[derive(Debug, Clone, Validate)]
pub struct MigrationOptions {
    /// Legacy domain to convert.
    #[validate(length(min = 1))]
    pub domain: String,

    /// Transport protocol.
    pub protocol: Protocol,

    /// CA certificate validating the directory; `None` disables validation.
    pub ca_cert: Option<PathBuf>,

    /// New profile name.
    #[validate(length(min = 1))]
    pub profile: String,

    /// Authn extension name.
    #[validate(length(min = 1))]
    pub authn_name: String,

    /// Authz extension name, also the domain tag of migrated records.
    #[validate(length(min = 1))]
    pub authz_name: String,

    /// Bind DN overriding discovery.
    pub bind_user: Option<String>,

    /// Bind password overriding the stored one.
    pub bind_password: Option<SecretString>,

    /// Explicit servers overriding the stored list and DNS discovery.
    pub ldap_servers: Option<Vec<String>>,

    /// Port override.
    #[validate(range(min = 1))]
    pub port: Option<u16>,

    /// Alternate Kerberos configuration.
    pub krb5_conf: Option<PathBuf>,

    /// Commit the run instead of rolling it back.
    pub apply: bool,

    /// Installation prefix.
    pub prefix: PathBuf,

    /// Database URL overriding the engine configuration.
    pub database_url: Option<SecretString>,
}

impl MigrationOptions {
    /// Options for `domain` with every other setting at its default.
    #[must_use]
    pub fn new(domain: impl Into<String>) -> Self {
        let domain = domain.into();
        let profile = default_profile(&domain);
        Self {
            authn_name: format!("{profile}-authn"),
            authz_name: format!("{profile}-authz"),
            profile,
            domain,
            protocol: Protocol::default(),
            ca_cert: None,
            bind_user: None,
            bind_password: None,
            ldap_servers: None,
            port: None,
            krb5_conf: None,
            apply: false,
            prefix: PathBuf::from("/"),
            database_url: None,
        }
    }

    /// Sets the profile name; extension names not set explicitly follow it.
    #[must_use]
    pub fn with_profile(mut self, profile: impl Into<String>) -> Self {
        let profile = profile.into();
        if self.authn_name == format!("{}-authn", self.profile) {
            self.authn_name = format!("{profile}-authn");
        }
        if self.authz_name == format!("{}-authz", self.profile) {
            self.authz_name = format!("{profile}-authz");
        }
        self.profile = profile;
        self
    }

    /// Sets the authn extension name.
    #[must_use]
    pub fn with_authn_name(mut self, name: impl Into<String>) -> Self {
        self.authn_name = name.into();
        self
    }

    /// Sets the authz extension name.
    #[must_use]
    pub fn with_authz_name(mut self, name: impl Into<String>) -> Self {
        self.authz_name = name.into();
        self
    }

    /// Sets the transport protocol.
    #[must_use]
    pub const fn with_protocol(mut self, protocol: Protocol) -> Self {
        self.protocol = protocol;
        self
    }

    /// Sets the CA certificate.
    #[must_use]
    pub fn with_ca_cert(mut self, path: impl Into<PathBuf>) -> Self {
        self.ca_cert = Some(path.into());
        self
    }

    /// Sets the bind DN.
    #[must_use]
    pub fn with_bind_user(mut self, bind_user: impl Into<String>) -> Self {
        self.bind_user = Some(bind_user.into());
        self
    }

    /// Sets the bind password.
    #[must_use]
    pub fn with_bind_password(mut self, password: impl Into<String>) -> Self {
        self.bind_password = Some(SecretString::from(password.into()));
        self
    }

    /// Sets explicit servers.
    #[must_use]
    pub fn with_ldap_servers(mut self, servers: Vec<String>) -> Self {
        self.ldap_servers = Some(servers);
        self
    }

    /// Sets the port override.
    #[must_use]
    pub const fn with_port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    /// Sets the Kerberos configuration.
    #[must_use]
    pub fn with_krb5_conf(mut self, path: impl Into<PathBuf>) -> Self {
        self.krb5_conf = Some(path.into());
        self
    }

    /// Sets the apply flag.
    #[must_use]
    pub const fn with_apply(mut self, apply: bool) -> Self {
        self.apply = apply;
        self
    }

    /// Sets the installation prefix.
    #[must_use]
    pub fn with_prefix(mut self, prefix: impl Into<PathBuf>) -> Self {
        self.prefix = prefix.into();
        self
    }

    /// Sets the database URL override.
    #[must_use]
    pub fn with_database_url(mut self, url: impl Into<String>) -> Self {
        self.database_url = Some(SecretString::from(url.into()));
        self
    }

    /// Checks the options.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] when the profile equals the domain or a field is out of
    /// range.
    pub fn validated(self) -> Result<Self> {
        if self.profile == self.domain {
            return Err(Error::Configuration(
                "Profile cannot be the same as domain".to_string(),
            ));
        }
        self.validate()
            .map_err(|err| Error::Configuration(format!("Invalid options: {err}")))?;
        Ok(self)
    }

    /// Directory holding the engine configuration and the staged artifacts.
    #[must_use]
    pub fn engine_etc(&self) -> PathBuf {
        self.prefix.join("etc/ovirt-engine")
    }

    /// Installation prefix.
    #[must_use]
    pub fn prefix(&self) -> &Path {
        &self.prefix
    }
}

fn default_profile(domain: &str) -> String {
    format!("{domain}-new")
}
