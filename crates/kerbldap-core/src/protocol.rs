//! LDAP transport protocol selection.

use std::fmt;
use std::str::FromStr;

use crate::error::Error;

/// Default port for `ldap://` (plain and startTLS).
pub const LDAP_PORT: u16 = 389;
/// Default port for `ldaps://`.
pub const LDAPS_PORT: u16 = 636;

/// Transport used to reach the directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Protocol {
    /// Unencrypted LDAP.
    Plain,
    /// Plain LDAP upgraded in-band with the StartTLS extended operation.
    #[default]
    StartTls,
    /// LDAP over TLS from the first byte.
    Ldaps,
}

impl Protocol {
    /// URI scheme and service-record service name for this protocol.
    #[must_use]
    pub const fn scheme(self) -> &'static str {
        match self {
            Self::Ldaps => "ldaps",
            Self::Plain | Self::StartTls => "ldap",
        }
    }

    /// Port used when explicit servers are given without a port.
    #[must_use]
    pub const fn default_port(self) -> u16 {
        match self {
            Self::Ldaps => LDAPS_PORT,
            Self::Plain | Self::StartTls => LDAP_PORT,
        }
    }

    /// Whether the session is encrypted once negotiated.
    #[must_use]
    pub const fn is_secure(self) -> bool {
        matches!(self, Self::StartTls | Self::Ldaps)
    }

    /// Command-line spelling.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Plain => "plain",
            Self::StartTls => "startTLS",
            Self::Ldaps => "ldaps",
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Protocol {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "plain" => Ok(Self::Plain),
            "startTLS" => Ok(Self::StartTls),
            "ldaps" => Ok(Self::Ldaps),
            other => Err(Error::Configuration(format!(
                "unsupported protocol '{other}', expected plain, startTLS or ldaps"
            ))),
        }
    }
}
