//! Directory access for the legacy Kerberos/LDAP domains.
//!
//! This crate negotiates a bound connection to one legacy domain (endpoint discovery, liveness
//! probing, bind identity derivation and namespace discovery), looks users and groups up by
//! their legacy-stored ids and renders the provider configuration for the new profile.

#![deny(missing_docs)]

mod client;
mod codec;
mod config;
mod dn;
mod endpoint;
mod entry;
mod kerberos;
mod provider;
mod session;
mod template;

pub use client::{Directory, DirectoryConnection, DirectoryConnector, Negotiator};
pub use codec::{
    guid_bytes_from_legacy, guid_bytes_from_persisted, legacy_from_guid_bytes,
    legacy_from_ns_unique_id, ns_unique_id_from_legacy, EntryIdCodec,
};
pub use config::ConnectionRequest;
pub use dn::{escape_filter_bytes, escape_filter_value, DistinguishedName, DistinguishedNameError};
pub use endpoint::{candidate_uris, srv_name, SrvResolver, SrvTarget, SystemSrvResolver};
pub use entry::{DirectoryEntry, LdapEntry};
pub use kerberos::{with_ticket, Kerberos, KerberosCli};
pub use provider::{
    AttributeMap, BindDiscovery, ConfigTemplate, NamespaceDiscovery, ProviderKind,
    ProviderProfile, ACTIVE_DIRECTORY, IPA, OPENLDAP, RHDS,
};
pub use session::{Ldap3Connector, LdapConnector, LdapSession, SearchScope, SessionSettings};
pub use template::TemplateContext;

/// Convenient result alias that reuses the core error type.
pub type Result<T> = kerbldap_core::Result<T>;
