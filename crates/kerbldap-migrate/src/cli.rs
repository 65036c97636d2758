//! Command line surface.

use crate::options::MigrationOptions;
use clap::Parser;
use kerbldap_core::{Protocol, Result};
use std::path::PathBuf;

const NO_CA_CERT: &str = "NONE";

/// Migrate legacy users and groups with their permissions into a new LDAP profile.
#[derive(Debug, Parser)]
#[command(name = "kerbldap-migrate", version, about, long_about = None)]
pub struct Cli {
    /// Installation prefix.
    #[arg(long, default_value = "/", hide = true)]
    pub prefix: PathBuf,

    /// Enable debug log.
    #[arg(long)]
    pub debug: bool,

    /// Write log into file.
    #[arg(long, value_name = "FILE")]
    pub log: Option<PathBuf>,

    /// Apply settings; without it every change is rolled back.
    #[arg(long)]
    pub apply: bool,

    /// Domain name to convert.
    #[arg(long)]
    pub domain: String,

    /// Protocol used to talk to the directory: plain, startTLS or ldaps.
    #[arg(long, value_name = "PROTOCOL", default_value = "startTLS")]
    pub protocol: Protocol,

    /// Certificate chain used for TLS, or NONE for no validation.
    #[arg(long, value_name = "FILE")]
    pub cacert: String,

    /// New profile name [default: <domain>-new].
    #[arg(long, value_name = "NAME")]
    pub profile: Option<String>,

    /// Authn extension name [default: <profile>-authn].
    #[arg(long = "authn-name", value_name = "NAME")]
    pub authn_name: Option<String>,

    /// Authz extension name [default: <profile>-authz].
    #[arg(long = "authz-name", value_name = "NAME")]
    pub authz_name: Option<String>,

    /// Bind with this DN instead of detecting it.
    #[arg(long = "bind-user", value_name = "DN")]
    pub bind_user: Option<String>,

    /// Bind with this password instead of the stored SASL password.
    #[arg(long = "bind-password", value_name = "PASSWORD")]
    pub bind_password: Option<String>,

    /// Directory servers, comma separated, instead of DNS discovery.
    #[arg(long = "ldap-server", value_name = "DNS", value_delimiter = ',')]
    pub ldap_servers: Vec<String>,

    /// Port override.
    #[arg(long, value_name = "PORT")]
    pub port: Option<u16>,

    /// Kerberos configuration to use instead of the system default.
    #[arg(long, value_name = "FILE")]
    pub krb5conf: Option<PathBuf>,

    /// Engine database URL instead of the engine configuration.
    #[arg(long = "database-url", value_name = "URL", env = "KERBLDAP_DATABASE_URL", hide_env_values = true)]
    pub database_url: Option<String>,
}

impl Cli {
    /// Applies defaults and validates.
    ///
    /// # Errors
    ///
    /// Returns [`kerbldap_core::Error::Configuration`] for inconsistent options.
    pub fn into_options(self) -> Result<MigrationOptions> {
        let mut options = MigrationOptions::new(self.domain)
            .with_protocol(self.protocol)
            .with_apply(self.apply)
            .with_prefix(self.prefix);

        if let Some(profile) = self.profile {
            options = options.with_profile(profile);
        }
        if let Some(name) = self.authn_name {
            options = options.with_authn_name(name);
        }
        if let Some(name) = self.authz_name {
            options = options.with_authz_name(name);
        }
        if self.cacert != NO_CA_CERT {
            options = options.with_ca_cert(self.cacert);
        }
        if let Some(bind_user) = self.bind_user {
            options = options.with_bind_user(bind_user);
        }
        if let Some(password) = self.bind_password {
            options = options.with_bind_password(password);
        }
        let servers: Vec<String> = self
            .ldap_servers
            .into_iter()
            .map(|server| server.trim().to_string())
            .filter(|server| !server.is_empty())
            .collect();
        if !servers.is_empty() {
            options = options.with_ldap_servers(servers);
        }
        if let Some(port) = self.port {
            options = options.with_port(port);
        }
        if let Some(path) = self.krb5conf {
            options = options.with_krb5_conf(path);
        }
        if let Some(url) = self.database_url {
            options = options.with_database_url(url);
        }

        options.validated()
    }
}
