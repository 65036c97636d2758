//! Legacy domain settings stored in `vdc_options`.
//!
//! Each multi-domain option holds `domain:value` pairs separated by commas.

use crate::store::AaaStore;
use kerbldap_core::{Error, Result};
use kerbldap_directory::ProviderKind;

const PROVIDER_TYPES: &str = "LDAPProviderTypes";
const LDAP_SERVERS: &str = "LdapServers";
const USER_NAME: &str = "AdUserName";
const USER_PASSWORD: &str = "AdUserPassword";

/// Settings of one legacy domain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DomainEntry {
    /// Provider flavour.
    pub provider: ProviderKind,
    /// Explicit servers; empty means DNS discovery.
    pub servers: Vec<String>,
    /// SASL principal.
    pub sasl_user: String,
    /// Password as stored, still encrypted.
    pub encrypted_password: String,
}

/// Loads the settings of `domain`.
///
/// # Errors
///
/// Returns [`Error::Configuration`] when the domain has no provider, user or password, or
/// uses an unsupported provider.
pub async fn load_domain_entry(store: &mut dyn AaaStore, domain: &str) -> Result<DomainEntry> {
    let provider = domain_option(store, PROVIDER_TYPES, domain).await?;
    let servers = domain_option(store, LDAP_SERVERS, domain).await?;
    let sasl_user = domain_option(store, USER_NAME, domain).await?;
    let encrypted_password = domain_option(store, USER_PASSWORD, domain).await?;

    let (Some(provider), Some(sasl_user), Some(encrypted_password)) =
        (provider, sasl_user, encrypted_password)
    else {
        return Err(Error::Configuration(format!(
            "Domain '{domain}' does not exist. Exiting."
        )));
    };

    Ok(DomainEntry {
        provider: ProviderKind::from_tag(&provider)?,
        servers: servers.as_deref().map(split_servers).unwrap_or_default(),
        sasl_user,
        encrypted_password,
    })
}

async fn domain_option(
    store: &mut dyn AaaStore,
    option: &str,
    domain: &str,
) -> Result<Option<String>> {
    Ok(store
        .vdc_option(option)
        .await?
        .and_then(|raw| domain_value(&raw, domain)))
}

/// Value for `domain` within a `domain:value,domain:value` option.
#[must_use]
pub fn domain_value(raw: &str, domain: &str) -> Option<String> {
    raw.split(',')
        .filter_map(|pair| pair.split_once(':'))
        .find(|(name, _)| name.trim().eq_ignore_ascii_case(domain))
        .map(|(_, value)| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn split_servers(servers: &str) -> Vec<String> {
    servers
        .split(';')
        .map(str::trim)
        .filter(|server| !server.is_empty())
        .map(str::to_string)
        .collect()
}
