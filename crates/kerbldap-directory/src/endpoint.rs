//! Candidate endpoint discovery.
//!
//! Explicit servers are tried in the order given; otherwise the domain's `_ldap._tcp` (or
//! `_ldaps._tcp`) service records are resolved and ordered by priority, then weight.

use async_trait::async_trait;
use hickory_resolver::{
    config::ResolverConfig, name_server::TokioConnectionProvider, system_conf::read_system_conf,
    Resolver, TokioResolver,
};
use kerbldap_core::{Error, Protocol, Result};
use tracing::{debug, warn};

/// One DNS service record target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SrvTarget {
    /// Target host, without the trailing dot.
    pub host: String,
    /// Target port.
    pub port: u16,
    /// Record priority; lower is preferred.
    pub priority: u16,
    /// Record weight; higher is preferred among equal priorities.
    pub weight: u16,
}

/// Resolves DNS service records.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SrvResolver: Send + Sync {
    /// Returns the targets published under `name`, in no particular order.
    async fn lookup_srv(&self, name: &str) -> Result<Vec<SrvTarget>>;
}

/// Resolver using the system DNS configuration.
pub struct SystemSrvResolver {
    resolver: TokioResolver,
}

impl SystemSrvResolver {
    /// Creates a resolver from `/etc/resolv.conf`, falling back to the default upstreams.
    #[must_use]
    pub fn new() -> Self {
        let resolver = match read_system_conf() {
            Ok((config, opts)) => {
                Resolver::builder_with_config(config, TokioConnectionProvider::default())
                    .with_options(opts)
                    .build()
            }
            Err(err) => {
                warn!(error = %err, "Failed to read system DNS config, using default");
                Resolver::builder_with_config(
                    ResolverConfig::default(),
                    TokioConnectionProvider::default(),
                )
                .build()
            }
        };
        Self { resolver }
    }
}

impl Default for SystemSrvResolver {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SrvResolver for SystemSrvResolver {
    async fn lookup_srv(&self, name: &str) -> Result<Vec<SrvTarget>> {
        let response = self
            .resolver
            .srv_lookup(name)
            .await
            .map_err(|err| Error::Dns(format!("{name}: {err}")))?;

        Ok(response
            .iter()
            .map(|srv| SrvTarget {
                host: srv.target().to_utf8().trim_end_matches('.').to_string(),
                port: srv.port(),
                priority: srv.priority(),
                weight: srv.weight(),
            })
            .collect())
    }
}

/// Service record name for `domain` under `protocol`.
#[must_use]
pub fn srv_name(domain: &str, protocol: Protocol) -> String {
    format!("_{}._tcp.{}", protocol.scheme(), domain.trim_end_matches('.'))
}

/// Builds the ordered list of candidate URIs.
///
/// An explicit `port` overrides both the protocol default and the service record port.
///
/// # Errors
///
/// Returns [`Error::Dns`] when service records are needed and cannot be resolved.
pub async fn candidate_uris(
    domain: &str,
    servers: Option<&[String]>,
    protocol: Protocol,
    port: Option<u16>,
    resolver: &dyn SrvResolver,
) -> Result<Vec<String>> {
    let scheme = protocol.scheme();

    if let Some(servers) = servers.filter(|servers| !servers.is_empty()) {
        let port = port.unwrap_or_else(|| protocol.default_port());
        return Ok(servers
            .iter()
            .map(|server| format!("{scheme}://{server}:{port}"))
            .collect());
    }

    let name = srv_name(domain, protocol);
    let mut targets = resolver.lookup_srv(&name).await?;
    debug!(name, count = targets.len(), "resolved service records");
    targets.sort_by(|a, b| a.priority.cmp(&b.priority).then(b.weight.cmp(&a.weight)));

    Ok(targets
        .into_iter()
        .map(|target| {
            let port = port.unwrap_or(target.port);
            format!("{scheme}://{}:{port}", target.host)
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockall::predicate::eq;

    fn target(host: &str, port: u16, priority: u16, weight: u16) -> SrvTarget {
        SrvTarget {
            host: host.to_string(),
            port,
            priority,
            weight,
        }
    }

    #[test]
    fn srv_name_follows_protocol() {
        assert_eq!(srv_name("example.com", Protocol::StartTls), "_ldap._tcp.example.com");
        assert_eq!(srv_name("example.com.", Protocol::Ldaps), "_ldaps._tcp.example.com");
    }

    #[tokio::test]
    async fn explicit_servers_keep_order_and_default_port() {
        let resolver = MockSrvResolver::new();
        let servers = vec!["b.example.com".to_string(), "a.example.com".to_string()];

        let uris = candidate_uris("example.com", Some(servers.as_slice()), Protocol::Ldaps, None, &resolver)
            .await
            .unwrap();

        assert_eq!(
            uris,
            vec!["ldaps://b.example.com:636", "ldaps://a.example.com:636"]
        );
    }

    #[tokio::test]
    async fn explicit_port_overrides_default() {
        let resolver = MockSrvResolver::new();
        let servers = vec!["ds.example.com".to_string()];

        let uris = candidate_uris("example.com", Some(servers.as_slice()), Protocol::Plain, Some(3389), &resolver)
            .await
            .unwrap();

        assert_eq!(uris, vec!["ldap://ds.example.com:3389"]);
    }

    #[tokio::test]
    async fn srv_targets_sorted_by_priority_then_weight() {
        let mut resolver = MockSrvResolver::new();
        resolver
            .expect_lookup_srv()
            .with(eq("_ldap._tcp.example.com"))
            .times(1)
            .returning(|_| {
                Ok(vec![
                    target("c.example.com", 389, 10, 50),
                    target("a.example.com", 389, 0, 10),
                    target("b.example.com", 3268, 0, 90),
                ])
            });

        let uris = candidate_uris("example.com", None, Protocol::StartTls, None, &resolver)
            .await
            .unwrap();

        assert_eq!(
            uris,
            vec![
                "ldap://b.example.com:3268",
                "ldap://a.example.com:389",
                "ldap://c.example.com:389",
            ]
        );
    }

    #[tokio::test]
    async fn explicit_port_overrides_srv_port() {
        let mut resolver = MockSrvResolver::new();
        resolver
            .expect_lookup_srv()
            .returning(|_| Ok(vec![target("dc.example.com", 389, 0, 0)]));

        let uris = candidate_uris("example.com", None, Protocol::Ldaps, Some(10636), &resolver)
            .await
            .unwrap();

        assert_eq!(uris, vec!["ldaps://dc.example.com:10636"]);
    }

    #[tokio::test]
    async fn empty_server_list_falls_back_to_srv() {
        let mut resolver = MockSrvResolver::new();
        resolver.expect_lookup_srv().times(1).returning(|_| Ok(vec![]));

        let uris = candidate_uris("example.com", Some(&[][..]), Protocol::Plain, None, &resolver)
            .await
            .unwrap();

        assert!(uris.is_empty());
    }

    #[tokio::test]
    async fn resolver_failure_propagates() {
        let mut resolver = MockSrvResolver::new();
        resolver
            .expect_lookup_srv()
            .returning(|name| Err(Error::Dns(format!("{name}: NXDOMAIN"))));

        let err = candidate_uris("example.com", None, Protocol::Plain, None, &resolver)
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Dns(_)));
    }
}
