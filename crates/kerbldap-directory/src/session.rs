//! LDAP session abstraction and its `ldap3` implementation.

use crate::entry::LdapEntry;
use async_trait::async_trait;
use kerbldap_core::{Error, Protocol, Result};
use ldap3::{LdapConnAsync, LdapConnSettings, Scope, SearchEntry};
use native_tls::{Certificate, TlsConnector};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Represents the search scope for LDAP queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchScope {
    /// Base object only.
    Base,
    /// Entire subtree.
    Subtree,
}

impl From<SearchScope> for Scope {
    fn from(scope: SearchScope) -> Self {
        match scope {
            SearchScope::Base => Scope::Base,
            SearchScope::Subtree => Scope::Subtree,
        }
    }
}

/// Transport settings applied to every session opened during negotiation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSettings {
    protocol: Protocol,
    ca_cert: Option<PathBuf>,
    start_tls: bool,
}

impl SessionSettings {
    /// Settings for `protocol`, validating against `ca_cert` when one is given.
    #[must_use]
    pub fn new(protocol: Protocol, ca_cert: Option<PathBuf>) -> Self {
        Self {
            protocol,
            ca_cert,
            start_tls: protocol == Protocol::StartTls,
        }
    }

    /// Same settings without the in-band StartTLS upgrade.
    ///
    /// Liveness probes only need the root DSE, which is readable before the upgrade.
    #[must_use]
    pub fn without_start_tls(mut self) -> Self {
        self.start_tls = false;
        self
    }

    /// The negotiated protocol.
    #[must_use]
    pub const fn protocol(&self) -> Protocol {
        self.protocol
    }

    /// CA certificate used to validate the server, if any.
    #[must_use]
    pub fn ca_cert(&self) -> Option<&Path> {
        self.ca_cert.as_deref()
    }

    /// Whether the session issues StartTLS right after connecting.
    #[must_use]
    pub const fn start_tls(&self) -> bool {
        self.start_tls
    }

    /// True when the session is encrypted but the server certificate is not validated.
    #[must_use]
    pub fn is_insecure(&self) -> bool {
        self.protocol.is_secure() && self.ca_cert.is_none()
    }
}

/// One open LDAP session.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait LdapSession: Send {
    /// Simple (DN + password) bind.
    async fn simple_bind(&mut self, dn: &str, password: &str) -> Result<()>;

    /// SASL GSSAPI bind using the Kerberos ticket currently in the credential cache.
    async fn sasl_gssapi_bind(&mut self, server_fqdn: &str) -> Result<()>;

    /// Search; referrals and intermediate messages are dropped.
    async fn search(
        &mut self,
        base_dn: &str,
        scope: SearchScope,
        filter: &str,
        attributes: &[&'static str],
    ) -> Result<Vec<LdapEntry>>;

    /// Closes the session.
    async fn unbind(&mut self) -> Result<()>;
}

/// Opens sessions to a URI.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait LdapConnector: Send + Sync {
    /// Opens a new, unbound session.
    async fn connect(&self, uri: &str, settings: &SessionSettings) -> Result<Box<dyn LdapSession>>;
}

/// Real LDAP connector backed by `ldap3`.
#[derive(Debug, Default, Clone, Copy)]
pub struct Ldap3Connector;

#[async_trait]
impl LdapConnector for Ldap3Connector {
    async fn connect(&self, uri: &str, settings: &SessionSettings) -> Result<Box<dyn LdapSession>> {
        debug!(uri, start_tls = settings.start_tls(), "opening LDAP session");
        let ldap_settings = build_ldap_settings(settings)?;
        // ldap3 speaks protocol version 3 only and never chases referrals.
        let (conn, ldap) = LdapConnAsync::with_settings(ldap_settings, uri)
            .await
            .map_err(|err| Error::Connection(format!("{uri}: {err}")))?;
        ldap3::drive!(conn);
        Ok(Box::new(Ldap3Session { inner: ldap }))
    }
}

struct Ldap3Session {
    inner: ldap3::Ldap,
}

#[async_trait]
impl LdapSession for Ldap3Session {
    async fn simple_bind(&mut self, dn: &str, password: &str) -> Result<()> {
        self.inner
            .simple_bind(dn, password)
            .await
            .map_err(map_ldap_error)?
            .success()
            .map_err(map_ldap_error)?;
        Ok(())
    }

    async fn sasl_gssapi_bind(&mut self, server_fqdn: &str) -> Result<()> {
        self.inner
            .sasl_gssapi_bind(server_fqdn)
            .await
            .map_err(map_ldap_error)?
            .success()
            .map_err(map_ldap_error)?;
        Ok(())
    }

    async fn search(
        &mut self,
        base_dn: &str,
        scope: SearchScope,
        filter: &str,
        attributes: &[&'static str],
    ) -> Result<Vec<LdapEntry>> {
        debug!(base_dn, ?scope, filter, ?attributes, "search");
        let (entries, _) = self
            .inner
            .search(base_dn, scope.into(), filter, attributes.to_vec())
            .await
            .map_err(map_ldap_error)?
            .success()
            .map_err(map_ldap_error)?;
        let entries: Vec<LdapEntry> = entries
            .into_iter()
            .filter(|entry| !entry.is_ref() && !entry.is_intermediate())
            .map(SearchEntry::construct)
            .map(|entry| LdapEntry {
                dn: entry.dn,
                attributes: entry.attrs,
                binary_attributes: entry.bin_attrs,
            })
            .collect();
        debug!(count = entries.len(), "search result");
        Ok(entries)
    }

    async fn unbind(&mut self) -> Result<()> {
        self.inner.unbind().await.map_err(map_ldap_error)
    }
}

fn build_ldap_settings(settings: &SessionSettings) -> Result<LdapConnSettings> {
    let mut ldap_settings = LdapConnSettings::new().set_starttls(settings.start_tls());

    if !settings.protocol().is_secure() {
        return Ok(ldap_settings);
    }

    if let Some(cert_path) = settings.ca_cert() {
        let pem = fs::read(cert_path).map_err(|err| {
            Error::Configuration(format!(
                "failed to read CA certificate {}: {err}",
                cert_path.display()
            ))
        })?;
        let certificate = Certificate::from_pem(&pem)
            .map_err(|err| Error::Configuration(format!("invalid CA certificate: {err}")))?;
        let connector = TlsConnector::builder()
            .add_root_certificate(certificate)
            .build()
            .map_err(|err| Error::Configuration(format!("failed to load CA certificate: {err}")))?;
        ldap_settings = ldap_settings.set_connector(connector);
    } else {
        let connector = TlsConnector::builder()
            .danger_accept_invalid_certs(true)
            .danger_accept_invalid_hostnames(true)
            .build()
            .map_err(|err| {
                Error::Configuration(format!("failed to construct TLS connector: {err}"))
            })?;
        ldap_settings = ldap_settings.set_connector(connector).set_no_tls_verify(true);
    }

    Ok(ldap_settings)
}

pub(crate) fn map_ldap_error(err: ldap3::LdapError) -> Error {
    Error::Ldap(err.to_string())
}
