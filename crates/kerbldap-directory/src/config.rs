//! Connection request handed to the negotiator.

use kerbldap_core::{DomainCredentials, Protocol};
use std::path::{Path, PathBuf};

/// Everything needed to reach and bind to one legacy domain.
#[derive(Debug, Clone)]
pub struct ConnectionRequest {
    domain: String,
    servers: Option<Vec<String>>,
    protocol: Protocol,
    port: Option<u16>,
    ca_cert: Option<PathBuf>,
    credentials: DomainCredentials,
    bind_user: Option<String>,
}

impl ConnectionRequest {
    /// Request for `domain` using the legacy SASL credentials.
    #[must_use]
    pub fn new(domain: impl Into<String>, credentials: DomainCredentials) -> Self {
        Self {
            domain: domain.into(),
            servers: None,
            protocol: Protocol::default(),
            port: None,
            ca_cert: None,
            credentials,
            bind_user: None,
        }
    }

    /// Explicit servers, tried in order instead of DNS discovery.
    #[must_use]
    pub fn with_servers(mut self, servers: Vec<String>) -> Self {
        self.servers = Some(servers).filter(|servers| !servers.is_empty());
        self
    }

    /// Transport protocol.
    #[must_use]
    pub fn with_protocol(mut self, protocol: Protocol) -> Self {
        self.protocol = protocol;
        self
    }

    /// Port override.
    #[must_use]
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    /// CA certificate validating the server.
    #[must_use]
    pub fn with_ca_cert(mut self, ca_cert: impl Into<PathBuf>) -> Self {
        self.ca_cert = Some(ca_cert.into());
        self
    }

    /// Bind DN to use instead of deriving one.
    #[must_use]
    pub fn with_bind_user(mut self, bind_user: impl Into<String>) -> Self {
        self.bind_user = Some(bind_user.into());
        self
    }

    /// Domain name.
    #[must_use]
    pub fn domain(&self) -> &str {
        &self.domain
    }

    /// Explicit servers, if any.
    #[must_use]
    pub fn servers(&self) -> Option<&[String]> {
        self.servers.as_deref()
    }

    /// Transport protocol.
    #[must_use]
    pub const fn protocol(&self) -> Protocol {
        self.protocol
    }

    /// Port override.
    #[must_use]
    pub const fn port(&self) -> Option<u16> {
        self.port
    }

    /// CA certificate path.
    #[must_use]
    pub fn ca_cert(&self) -> Option<&Path> {
        self.ca_cert.as_deref()
    }

    /// Credentials.
    #[must_use]
    pub const fn credentials(&self) -> &DomainCredentials {
        &self.credentials
    }

    /// Explicit bind DN.
    #[must_use]
    pub fn bind_user(&self) -> Option<&str> {
        self.bind_user.as_deref()
    }
}
