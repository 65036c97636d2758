//! Provider profiles.
//!
//! Each supported directory flavour is one immutable [`ProviderProfile`]: the attributes read for
//! users and groups, how the search namespace is found, how the bind identity is derived, how
//! entry ids are encoded and which configuration template the new profile uses.

use crate::codec::EntryIdCodec;
use kerbldap_core::{Error, Result};
use std::fmt;

/// Supported directory flavours.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProviderKind {
    /// Microsoft Active Directory.
    ActiveDirectory,
    /// FreeIPA / IdM.
    Ipa,
    /// Red Hat Directory Server / 389-DS.
    Rhds,
    /// OpenLDAP.
    OpenLdap,
}

impl ProviderKind {
    /// Parses the provider tag stored in the legacy configuration.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] for an unknown tag.
    pub fn from_tag(tag: &str) -> Result<Self> {
        match tag.trim().to_ascii_lowercase().as_str() {
            "ad" | "activedirectory" => Ok(Self::ActiveDirectory),
            "ipa" => Ok(Self::Ipa),
            "rhds" => Ok(Self::Rhds),
            "openldap" => Ok(Self::OpenLdap),
            other => Err(Error::Configuration(format!(
                "Provider '{other}' is not supported"
            ))),
        }
    }

    /// Tag used in the generated `include = <tag.properties>` line.
    #[must_use]
    pub const fn tag(self) -> &'static str {
        match self {
            Self::ActiveDirectory => "ad",
            Self::Ipa => "ipa",
            Self::Rhds => "rhds",
            Self::OpenLdap => "openldap",
        }
    }

    /// The immutable profile for this provider.
    #[must_use]
    pub const fn profile(self) -> &'static ProviderProfile {
        match self {
            Self::ActiveDirectory => &ACTIVE_DIRECTORY,
            Self::Ipa => &IPA,
            Self::Rhds => &RHDS,
            Self::OpenLdap => &OPENLDAP,
        }
    }

    /// True for Active Directory, whose profile resolves servers through SRV records.
    #[must_use]
    pub const fn is_active_directory(self) -> bool {
        matches!(self, Self::ActiveDirectory)
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

/// Attributes read for one kind of entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttributeMap {
    /// Attribute holding the entry id.
    pub entry_id: &'static str,
    /// Given name for users, common name for groups.
    pub name: &'static str,
    /// Surname.
    pub surname: Option<&'static str>,
    /// Mail address.
    pub email: Option<&'static str>,
    /// Department.
    pub department: Option<&'static str>,
    /// Login name.
    pub username: Option<&'static str>,
    /// Description.
    pub description: Option<&'static str>,
}

impl AttributeMap {
    /// Attribute list requested from the server.
    #[must_use]
    pub fn attributes(&self) -> Vec<&'static str> {
        [
            Some(self.entry_id),
            Some(self.name),
            self.surname,
            self.email,
            self.department,
            self.username,
            self.description,
        ]
        .into_iter()
        .flatten()
        .collect()
    }

    const fn user(entry_id: &'static str, username: &'static str) -> Self {
        Self {
            entry_id,
            name: "givenName",
            surname: Some("sn"),
            email: Some("mail"),
            department: Some("department"),
            username: Some(username),
            description: None,
        }
    }

    const fn group(entry_id: &'static str, name: &'static str) -> Self {
        Self {
            entry_id,
            name,
            surname: None,
            email: None,
            department: None,
            username: None,
            description: Some("description"),
        }
    }
}

/// How the search namespace is discovered after binding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NamespaceDiscovery {
    /// Read one attribute of the root DSE.
    RootDse(&'static str),
    /// Look up the domain's naming context through the partitions container.
    CrossReference,
}

/// How the final bind identity is derived from the SASL principal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindDiscovery {
    /// `short@domain`.
    DomainSuffix,
    /// Kerberos bind, then search the namespace for the user's DN.
    SaslSearch {
        /// Filter matching user entries.
        user_filter: &'static str,
        /// Attribute holding the login name.
        login_attribute: &'static str,
    },
}

/// Shape of the generated configuration file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigTemplate {
    /// Servers resolved through DNS service records.
    SrvRecord,
    /// One fixed server, the one negotiation settled on.
    SingleServer,
}

/// Everything that differs between providers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProviderProfile {
    /// Which provider this is.
    pub kind: ProviderKind,
    /// User attributes.
    pub users: AttributeMap,
    /// Group attributes.
    pub groups: AttributeMap,
    /// Namespace discovery strategy.
    pub namespace: NamespaceDiscovery,
    /// Bind identity strategy.
    pub bind: BindDiscovery,
    /// Entry id encoding.
    pub codec: EntryIdCodec,
    /// Configuration template.
    pub template: ConfigTemplate,
}

/// Active Directory.
pub const ACTIVE_DIRECTORY: ProviderProfile = ProviderProfile {
    kind: ProviderKind::ActiveDirectory,
    users: AttributeMap::user("objectGUID", "userPrincipalName"),
    groups: AttributeMap::group("objectGUID", "name"),
    namespace: NamespaceDiscovery::CrossReference,
    bind: BindDiscovery::DomainSuffix,
    codec: EntryIdCodec::ObjectGuid,
    template: ConfigTemplate::SrvRecord,
};

/// FreeIPA.
pub const IPA: ProviderProfile = ProviderProfile {
    kind: ProviderKind::Ipa,
    users: AttributeMap::user("ipaUniqueID", "uid"),
    groups: AttributeMap::group("ipaUniqueID", "cn"),
    namespace: NamespaceDiscovery::RootDse("defaultNamingContext"),
    bind: BindDiscovery::SaslSearch {
        user_filter: "(objectClass=person)(ipaUniqueID=*)",
        login_attribute: "uid",
    },
    codec: EntryIdCodec::Verbatim,
    template: ConfigTemplate::SingleServer,
};

/// Red Hat Directory Server.
pub const RHDS: ProviderProfile = ProviderProfile {
    kind: ProviderKind::Rhds,
    users: AttributeMap::user("nsUniqueId", "uid"),
    groups: AttributeMap::group("nsUniqueId", "cn"),
    namespace: NamespaceDiscovery::RootDse("defaultNamingContext"),
    bind: BindDiscovery::SaslSearch {
        user_filter: "(objectClass=organizationalPerson)(uid=*)",
        login_attribute: "uid",
    },
    codec: EntryIdCodec::NsUniqueId,
    template: ConfigTemplate::SingleServer,
};

/// OpenLDAP.
pub const OPENLDAP: ProviderProfile = ProviderProfile {
    kind: ProviderKind::OpenLdap,
    users: AttributeMap::user("entryUUID", "uid"),
    groups: AttributeMap::group("entryUUID", "cn"),
    namespace: NamespaceDiscovery::RootDse("namingContexts"),
    bind: BindDiscovery::SaslSearch {
        user_filter: "(objectClass=uidObject)(uid=*)",
        login_attribute: "uid",
    },
    codec: EntryIdCodec::Verbatim,
    template: ConfigTemplate::SingleServer,
};
