//! Connection negotiation and the negotiated directory connection.
//!
//! Negotiation walks the candidate URIs in order and keeps the first one answering a root DSE
//! probe. A fresh session is then opened on that URI, the bind identity is derived (for the
//! simple directories this needs a short-lived Kerberos session of its own), the final simple
//! bind is performed and the search namespace is discovered. Probe and discovery sessions are
//! always closed and never reused.

use crate::config::ConnectionRequest;
use crate::dn::{escape_filter_value, DistinguishedName};
use crate::endpoint::{candidate_uris, SrvResolver, SystemSrvResolver};
use crate::entry::{DirectoryEntry, LdapEntry};
use crate::kerberos::{with_ticket, Kerberos, KerberosCli};
use crate::provider::{AttributeMap, BindDiscovery, NamespaceDiscovery, ProviderKind, ProviderProfile};
use crate::session::{Ldap3Connector, LdapConnector, LdapSession, SearchScope, SessionSettings};
use crate::template::TemplateContext;
use async_trait::async_trait;
use kerbldap_core::{Error, Protocol, Result};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use url::Url;
use uuid::Uuid;

const ROOT_DSE_FILTER: &str = "(objectClass=*)";

/// A bound, namespace-aware view of a legacy directory.
#[async_trait]
pub trait Directory: Send {
    /// Provider behind this connection.
    fn provider(&self) -> ProviderKind;

    /// Transport protocol in use.
    fn protocol(&self) -> Protocol;

    /// CA certificate validating the server, if any.
    fn ca_cert(&self) -> Option<&Path>;

    /// URI negotiation settled on.
    fn bind_uri(&self) -> &str;

    /// Search namespace.
    fn namespace(&self) -> &str;

    /// Looks up a user by its legacy-stored id; `None` when the directory no longer has it.
    async fn get_user(&mut self, legacy_id: &str) -> Result<Option<DirectoryEntry>>;

    /// Looks up a group by its legacy-stored id; `None` when the directory no longer has it.
    async fn get_group(&mut self, legacy_id: &str) -> Result<Option<DirectoryEntry>>;

    /// Provider configuration text for the new profile, bind password included.
    fn config_text(&self) -> Result<String>;

    /// Closes the underlying session.
    async fn close(&mut self) -> Result<()>;

    /// Whether the transport is encrypted.
    fn is_secure(&self) -> bool {
        self.protocol().is_secure()
    }
}

/// Produces [`Directory`] connections.
#[async_trait]
pub trait DirectoryConnector: Send + Sync {
    /// Negotiates a connection to the domain described by `request`.
    async fn connect(
        &self,
        provider: ProviderKind,
        request: &ConnectionRequest,
    ) -> Result<Box<dyn Directory>>;
}

/// Negotiates directory connections.
pub struct Negotiator {
    connector: Box<dyn LdapConnector>,
    resolver: Box<dyn SrvResolver>,
    kerberos: Box<dyn Kerberos>,
}

impl Negotiator {
    /// Creates a negotiator using `ldap3`, the system resolver and the Kerberos tools.
    #[must_use]
    pub fn new(krb5_conf: Option<PathBuf>) -> Self {
        Self {
            connector: Box::new(Ldap3Connector),
            resolver: Box::new(SystemSrvResolver::new()),
            kerberos: Box::new(KerberosCli::new(krb5_conf)),
        }
    }

    #[cfg(test)]
    #[must_use]
    pub(crate) fn with_backends(
        connector: Box<dyn LdapConnector>,
        resolver: Box<dyn SrvResolver>,
        kerberos: Box<dyn Kerberos>,
    ) -> Self {
        Self {
            connector,
            resolver,
            kerberos,
        }
    }

    /// Negotiates a bound connection for `provider`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Connection`] when no candidate answers, the bind identity cannot be
    /// derived or the final bind is rejected, and [`Error::Dns`] when service records cannot be
    /// resolved.
    pub async fn negotiate(
        &self,
        provider: ProviderKind,
        request: &ConnectionRequest,
    ) -> Result<DirectoryConnection> {
        let profile = provider.profile();
        let settings = SessionSettings::new(request.protocol(), request.ca_cert().map(Path::to_path_buf));
        if settings.is_insecure() {
            warn!("TLS certificate of the directory server will not be validated");
        }

        let candidates = candidate_uris(
            request.domain(),
            request.servers(),
            request.protocol(),
            request.port(),
            self.resolver.as_ref(),
        )
        .await?;
        debug!(?candidates, "candidate URIs");

        let bind_uri = self.probe(&candidates, &settings).await?;
        info!("Using ldap URI: {bind_uri}");

        let bind_user = match request.bind_user() {
            Some(bind_user) => bind_user.to_string(),
            None => self.discover_bind_user(profile, request, &bind_uri, &settings).await?,
        };
        debug!(bind_user, "binding");

        let mut session = self.connector.connect(&bind_uri, &settings).await?;
        let bound = session
            .simple_bind(&bind_user, request.credentials().password())
            .await
            .map_err(|err| Error::Connection(format!("Cannot bind as '{bind_user}': {err}")));
        if let Err(err) = bound {
            discard(session.as_mut()).await;
            return Err(err);
        }

        let namespace = match self.discover_namespace(session.as_mut(), profile, request.domain()).await {
            Ok(namespace) => namespace,
            Err(err) => {
                discard(session.as_mut()).await;
                return Err(err);
            }
        };
        debug!(namespace, "namespace");

        Ok(DirectoryConnection {
            session,
            profile,
            namespace,
            bind_uri,
            bind_user,
            request: request.clone(),
        })
    }

    async fn probe(&self, candidates: &[String], settings: &SessionSettings) -> Result<String> {
        let settings = settings.clone().without_start_tls();
        for uri in candidates {
            match self.probe_one(uri, &settings).await {
                Ok(()) => return Ok(uri.clone()),
                Err(err) => {
                    warn!("URI {uri} is not connective. Trying other.");
                    debug!(error = %err, "probe failed");
                }
            }
        }
        Err(Error::Connection("No working ldap was found.".to_string()))
    }

    async fn probe_one(&self, uri: &str, settings: &SessionSettings) -> Result<()> {
        let mut session = self.connector.connect(uri, settings).await?;
        let found = session
            .search("", SearchScope::Base, ROOT_DSE_FILTER, &["supportedLDAPVersion"])
            .await;
        discard(session.as_mut()).await;
        if found?.is_empty() {
            return Err(Error::Connection(format!("{uri} did not return a root DSE")));
        }
        Ok(())
    }

    async fn discover_bind_user(
        &self,
        profile: &ProviderProfile,
        request: &ConnectionRequest,
        bind_uri: &str,
        settings: &SessionSettings,
    ) -> Result<String> {
        let credentials = request.credentials();
        match profile.bind {
            BindDiscovery::DomainSuffix => {
                Ok(format!("{}@{}", credentials.short_name(), request.domain()))
            }
            BindDiscovery::SaslSearch {
                user_filter,
                login_attribute,
            } => {
                let lookup = SaslLookup {
                    profile,
                    domain: request.domain(),
                    principal: &credentials.sasl_user,
                    login: credentials.short_name(),
                    user_filter,
                    login_attribute,
                };
                with_ticket(
                    self.kerberos.as_ref(),
                    &credentials.sasl_user,
                    credentials.password(),
                    self.resolve_user_dn(bind_uri, settings, &lookup),
                )
                .await
            }
        }
    }

    async fn resolve_user_dn(
        &self,
        bind_uri: &str,
        settings: &SessionSettings,
        lookup: &SaslLookup<'_>,
    ) -> Result<String> {
        let host = Url::parse(bind_uri)?
            .host_str()
            .map(str::to_string)
            .ok_or_else(|| Error::Configuration(format!("URI '{bind_uri}' has no host")))?;

        let mut session = self.connector.connect(bind_uri, settings).await?;
        let result = async {
            session.sasl_gssapi_bind(&host).await?;
            let namespace = self
                .discover_namespace(session.as_mut(), lookup.profile, lookup.domain)
                .await?;
            let filter = format!(
                "(&{}({}={}))",
                lookup.user_filter,
                lookup.login_attribute,
                escape_filter_value(lookup.login)
            );
            let entries = session
                .search(
                    &namespace,
                    SearchScope::Subtree,
                    &filter,
                    &[lookup.profile.users.entry_id],
                )
                .await?;
            entries
                .into_iter()
                .next()
                .map(|entry| entry.dn)
                .ok_or_else(|| {
                    Error::Connection(format!("Cannot resolve user '{}' into DN", lookup.principal))
                })
        }
        .await;
        discard(session.as_mut()).await;
        result
    }

    async fn discover_namespace(
        &self,
        session: &mut dyn LdapSession,
        profile: &ProviderProfile,
        domain: &str,
    ) -> Result<String> {
        match profile.namespace {
            NamespaceDiscovery::RootDse(attribute) => self.root_dse_value(session, attribute).await,
            NamespaceDiscovery::CrossReference => {
                let configuration = self
                    .root_dse_value(session, "configurationNamingContext")
                    .await?;
                let partitions = DistinguishedName::parse(&configuration)?.child("CN", "Partitions");
                let filter = format!(
                    "(&(objectClass=crossRef)(dnsRoot={})(nETBIOSName=*))",
                    escape_filter_value(domain)
                );
                let entries = session
                    .search(partitions.as_str(), SearchScope::Subtree, &filter, &["nCName"])
                    .await?;
                entries
                    .iter()
                    .find_map(|entry| entry.first("nCName"))
                    .map(str::to_string)
                    .ok_or_else(|| {
                        Error::Connection(format!("Cannot find naming context of domain '{domain}'"))
                    })
            }
        }
    }

    async fn root_dse_value(&self, session: &mut dyn LdapSession, attribute: &'static str) -> Result<String> {
        let entries = session
            .search("", SearchScope::Base, ROOT_DSE_FILTER, &[attribute])
            .await?;
        entries
            .iter()
            .find_map(|entry| entry.first(attribute))
            .map(str::to_string)
            .ok_or_else(|| Error::Connection(format!("Root DSE does not publish {attribute}")))
    }
}

#[async_trait]
impl DirectoryConnector for Negotiator {
    async fn connect(
        &self,
        provider: ProviderKind,
        request: &ConnectionRequest,
    ) -> Result<Box<dyn Directory>> {
        Ok(Box::new(self.negotiate(provider, request).await?))
    }
}

struct SaslLookup<'a> {
    profile: &'a ProviderProfile,
    domain: &'a str,
    principal: &'a str,
    login: &'a str,
    user_filter: &'static str,
    login_attribute: &'static str,
}

/// A bound session on the negotiated URI.
pub struct DirectoryConnection {
    session: Box<dyn LdapSession>,
    profile: &'static ProviderProfile,
    namespace: String,
    bind_uri: String,
    bind_user: String,
    request: ConnectionRequest,
}

impl DirectoryConnection {
    /// Bind DN or principal used for the final bind.
    #[must_use]
    pub fn bind_user(&self) -> &str {
        &self.bind_user
    }

    async fn fetch(&mut self, attributes: AttributeMap, legacy_id: &str) -> Result<Option<DirectoryEntry>> {
        let filter = format!(
            "({}={})",
            attributes.entry_id,
            self.profile.codec.filter_value(legacy_id)?
        );
        let requested = attributes.attributes();
        let entries = self
            .session
            .search(&self.namespace, SearchScope::Subtree, &filter, &requested)
            .await?;

        let Some(entry) = entries.into_iter().next() else {
            return Ok(None);
        };
        Ok(Some(self.materialize(&entry, attributes)))
    }

    fn materialize(&self, entry: &LdapEntry, attributes: AttributeMap) -> DirectoryEntry {
        let text = |attribute: Option<&str>| {
            attribute
                .and_then(|attribute| entry.first(attribute))
                .unwrap_or_default()
                .to_string()
        };
        DirectoryEntry {
            identity: Uuid::new_v4(),
            provider_entry_id: self
                .profile
                .codec
                .persisted_id(entry, attributes.entry_id)
                .unwrap_or_default(),
            name: text(Some(attributes.name)),
            surname: text(attributes.surname),
            email: text(attributes.email),
            department: text(attributes.department),
            username: text(attributes.username),
            description: text(attributes.description),
            namespace: self.namespace.clone(),
            distinguished_name: entry.dn.clone(),
        }
    }
}

#[async_trait]
impl Directory for DirectoryConnection {
    fn provider(&self) -> ProviderKind {
        self.profile.kind
    }

    fn protocol(&self) -> Protocol {
        self.request.protocol()
    }

    fn ca_cert(&self) -> Option<&Path> {
        self.request.ca_cert()
    }

    fn bind_uri(&self) -> &str {
        &self.bind_uri
    }

    fn namespace(&self) -> &str {
        &self.namespace
    }

    async fn get_user(&mut self, legacy_id: &str) -> Result<Option<DirectoryEntry>> {
        self.fetch(self.profile.users, legacy_id).await
    }

    async fn get_group(&mut self, legacy_id: &str) -> Result<Option<DirectoryEntry>> {
        self.fetch(self.profile.groups, legacy_id).await
    }

    fn config_text(&self) -> Result<String> {
        self.profile.template.render(&TemplateContext {
            provider: self.profile.kind,
            domain: self.request.domain(),
            bind_uri: &self.bind_uri,
            bind_user: &self.bind_user,
            password: self.request.credentials().password(),
            protocol: self.request.protocol(),
            port: self.request.port(),
        })
    }

    async fn close(&mut self) -> Result<()> {
        self.session.unbind().await
    }
}

async fn discard(session: &mut dyn LdapSession) {
    if let Err(err) = session.unbind().await {
        debug!(error = %err, "unbind failed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::endpoint::MockSrvResolver;
    use crate::kerberos::MockKerberos;
    use crate::session::{MockLdapConnector, MockLdapSession};
    use kerbldap_core::DomainCredentials;
    use mockall::Sequence;

    fn request(provider_servers: &[&str]) -> ConnectionRequest {
        ConnectionRequest::new(
            "example.com",
            DomainCredentials::new("admin@EXAMPLE.COM", "secret"),
        )
        .with_servers(provider_servers.iter().map(|s| (*s).to_string()).collect())
        .with_protocol(Protocol::Plain)
    }

    fn probe_session() -> MockLdapSession {
        let mut session = MockLdapSession::new();
        session
            .expect_search()
            .withf(|base, scope, _, attributes| {
                base.is_empty()
                    && *scope == SearchScope::Base
                    && attributes == ["supportedLDAPVersion"]
            })
            .returning(|_, _, _, _| Ok(vec![LdapEntry::new("").with_attribute("supportedLDAPVersion", "3")]));
        session.expect_unbind().returning(|| Ok(()));
        session
    }

    fn root_dse(attribute: &str, value: &str) -> Vec<LdapEntry> {
        vec![LdapEntry::new("").with_attribute(attribute, value)]
    }

    fn negotiator(connector: MockLdapConnector, kerberos: MockKerberos) -> Negotiator {
        Negotiator::with_backends(
            Box::new(connector),
            Box::new(MockSrvResolver::new()),
            Box::new(kerberos),
        )
    }

    #[tokio::test]
    async fn skips_unreachable_candidates() {
        let mut connector = MockLdapConnector::new();
        let mut sequence = Sequence::new();

        connector
            .expect_connect()
            .withf(|uri, _| uri == "ldap://down.example.com:389")
            .times(1)
            .in_sequence(&mut sequence)
            .returning(|uri, _| Err(Error::Connection(format!("{uri}: refused"))));
        let probe = probe_session();
        connector
            .expect_connect()
            .withf(|uri, _| uri == "ldap://up.example.com:389")
            .times(1)
            .in_sequence(&mut sequence)
            .return_once(move |_, _| Ok(Box::new(probe)));

        let mut bound = MockLdapSession::new();
        bound
            .expect_simple_bind()
            .withf(|dn, password| dn == "cn=Manager,dc=example,dc=com" && password == "secret")
            .times(1)
            .returning(|_, _| Ok(()));
        bound
            .expect_search()
            .returning(|_, _, _, _| Ok(root_dse("defaultNamingContext", "dc=example,dc=com")));
        connector
            .expect_connect()
            .withf(|uri, _| uri == "ldap://up.example.com:389")
            .times(1)
            .in_sequence(&mut sequence)
            .return_once(move |_, _| Ok(Box::new(bound)));

        let request = request(&["down.example.com", "up.example.com"])
            .with_bind_user("cn=Manager,dc=example,dc=com");
        let connection = negotiator(connector, MockKerberos::new())
            .negotiate(ProviderKind::Rhds, &request)
            .await
            .unwrap();

        assert_eq!(connection.bind_uri(), "ldap://up.example.com:389");
        assert_eq!(connection.namespace(), "dc=example,dc=com");
        assert_eq!(connection.bind_user(), "cn=Manager,dc=example,dc=com");
    }

    #[tokio::test]
    async fn fails_when_no_candidate_answers() {
        let mut connector = MockLdapConnector::new();
        connector
            .expect_connect()
            .times(2)
            .returning(|uri, _| Err(Error::Connection(format!("{uri}: refused"))));

        let result = negotiator(connector, MockKerberos::new())
            .negotiate(ProviderKind::Ipa, &request(&["a.example.com", "b.example.com"]))
            .await;

        assert_eq!(
            result.err(),
            Some(Error::Connection("No working ldap was found.".to_string()))
        );
    }

    #[tokio::test]
    async fn probe_skips_start_tls() {
        let mut connector = MockLdapConnector::new();
        connector
            .expect_connect()
            .withf(|_, settings| !settings.start_tls())
            .times(1)
            .returning(|_, _| Err(Error::Connection("refused".to_string())));

        let request = request(&["ds.example.com"]).with_protocol(Protocol::StartTls);
        let result = negotiator(connector, MockKerberos::new())
            .negotiate(ProviderKind::OpenLdap, &request)
            .await;

        assert!(result.is_err());
    }

    #[tokio::test]
    async fn active_directory_binds_with_domain_suffix_and_cross_reference() {
        let mut connector = MockLdapConnector::new();
        let mut sequence = Sequence::new();
        let probe = probe_session();
        connector
            .expect_connect()
            .times(1)
            .in_sequence(&mut sequence)
            .return_once(move |_, _| Ok(Box::new(probe)));

        let mut bound = MockLdapSession::new();
        bound
            .expect_simple_bind()
            .withf(|dn, _| dn == "admin@example.com")
            .times(1)
            .returning(|_, _| Ok(()));
        bound
            .expect_search()
            .returning(|base, _, filter, attributes| {
                if base.is_empty() {
                    assert_eq!(attributes, ["configurationNamingContext"]);
                    return Ok(root_dse(
                        "configurationNamingContext",
                        "CN=Configuration,DC=example,DC=com",
                    ));
                }
                assert_eq!(base, "CN=Partitions,CN=Configuration,DC=example,DC=com");
                assert_eq!(
                    filter,
                    "(&(objectClass=crossRef)(dnsRoot=example.com)(nETBIOSName=*))"
                );
                Ok(vec![LdapEntry::new("CN=EXAMPLE,CN=Partitions,CN=Configuration,DC=example,DC=com")
                    .with_attribute("nCName", "DC=example,DC=com")])
            });
        connector
            .expect_connect()
            .times(1)
            .in_sequence(&mut sequence)
            .return_once(move |_, _| Ok(Box::new(bound)));

        let connection = negotiator(connector, MockKerberos::new())
            .negotiate(ProviderKind::ActiveDirectory, &request(&["dc1.example.com"]))
            .await
            .unwrap();

        assert_eq!(connection.namespace(), "DC=example,DC=com");
        assert_eq!(connection.bind_user(), "admin@example.com");
    }

    #[tokio::test]
    async fn simple_directory_resolves_bind_dn_under_kerberos() {
        let mut connector = MockLdapConnector::new();
        let mut sequence = Sequence::new();
        let probe = probe_session();
        connector
            .expect_connect()
            .times(1)
            .in_sequence(&mut sequence)
            .return_once(move |_, _| Ok(Box::new(probe)));

        let mut sasl = MockLdapSession::new();
        sasl.expect_sasl_gssapi_bind()
            .withf(|host| host == "ldap.example.com")
            .times(1)
            .returning(|_| Ok(()));
        sasl.expect_search().returning(|base, _, filter, attributes| {
            if base.is_empty() {
                return Ok(root_dse("namingContexts", "dc=example,dc=com"));
            }
            assert_eq!(base, "dc=example,dc=com");
            assert_eq!(filter, "(&(objectClass=uidObject)(uid=*)(uid=admin))");
            assert_eq!(attributes, ["entryUUID"]);
            Ok(vec![LdapEntry::new("uid=admin,ou=people,dc=example,dc=com")])
        });
        sasl.expect_unbind().times(1).returning(|| Ok(()));
        connector
            .expect_connect()
            .times(1)
            .in_sequence(&mut sequence)
            .return_once(move |_, _| Ok(Box::new(sasl)));

        let mut bound = MockLdapSession::new();
        bound
            .expect_simple_bind()
            .withf(|dn, _| dn == "uid=admin,ou=people,dc=example,dc=com")
            .times(1)
            .returning(|_, _| Ok(()));
        bound
            .expect_search()
            .returning(|_, _, _, _| Ok(root_dse("namingContexts", "dc=example,dc=com")));
        connector
            .expect_connect()
            .times(1)
            .in_sequence(&mut sequence)
            .return_once(move |_, _| Ok(Box::new(bound)));

        let mut kerberos = MockKerberos::new();
        kerberos
            .expect_kinit()
            .withf(|principal, password| principal == "admin@EXAMPLE.COM" && password == "secret")
            .times(1)
            .returning(|_, _| Ok(()));
        kerberos.expect_kdestroy().times(1).returning(|| Ok(()));

        let connection = negotiator(connector, kerberos)
            .negotiate(ProviderKind::OpenLdap, &request(&["ldap.example.com"]))
            .await
            .unwrap();

        assert_eq!(connection.bind_user(), "uid=admin,ou=people,dc=example,dc=com");
    }

    #[tokio::test]
    async fn unresolvable_bind_user_destroys_ticket() {
        let mut connector = MockLdapConnector::new();
        let mut sequence = Sequence::new();
        let probe = probe_session();
        connector
            .expect_connect()
            .times(1)
            .in_sequence(&mut sequence)
            .return_once(move |_, _| Ok(Box::new(probe)));

        let mut sasl = MockLdapSession::new();
        sasl.expect_sasl_gssapi_bind().returning(|_| Ok(()));
        sasl.expect_search().returning(|base, _, _, _| {
            if base.is_empty() {
                Ok(root_dse("defaultNamingContext", "dc=example,dc=com"))
            } else {
                Ok(Vec::new())
            }
        });
        sasl.expect_unbind().times(1).returning(|| Ok(()));
        connector
            .expect_connect()
            .times(1)
            .in_sequence(&mut sequence)
            .return_once(move |_, _| Ok(Box::new(sasl)));

        let mut kerberos = MockKerberos::new();
        kerberos.expect_kinit().returning(|_, _| Ok(()));
        kerberos.expect_kdestroy().times(1).returning(|| Ok(()));

        let result = negotiator(connector, kerberos)
            .negotiate(ProviderKind::Ipa, &request(&["ipa.example.com"]))
            .await;

        assert_eq!(
            result.err(),
            Some(Error::Connection(
                "Cannot resolve user 'admin@EXAMPLE.COM' into DN".to_string()
            ))
        );
    }

    #[tokio::test]
    async fn rejected_bind_is_connection_error() {
        let mut connector = MockLdapConnector::new();
        let mut sequence = Sequence::new();
        let probe = probe_session();
        connector
            .expect_connect()
            .times(1)
            .in_sequence(&mut sequence)
            .return_once(move |_, _| Ok(Box::new(probe)));

        let mut bound = MockLdapSession::new();
        bound
            .expect_simple_bind()
            .returning(|_, _| Err(Error::Ldap("rc=49 invalidCredentials".to_string())));
        bound.expect_unbind().times(1).returning(|| Ok(()));
        connector
            .expect_connect()
            .times(1)
            .in_sequence(&mut sequence)
            .return_once(move |_, _| Ok(Box::new(bound)));

        let request = request(&["ds.example.com"]).with_bind_user("cn=Manager");
        let result = negotiator(connector, MockKerberos::new())
            .negotiate(ProviderKind::Rhds, &request)
            .await;

        assert!(matches!(result, Err(Error::Connection(message)) if message.contains("cn=Manager")));
    }

    fn connection(provider: ProviderKind, session: MockLdapSession) -> DirectoryConnection {
        DirectoryConnection {
            session: Box::new(session),
            profile: provider.profile(),
            namespace: "DC=example,DC=com".to_string(),
            bind_uri: "ldap://dc1.example.com:389".to_string(),
            bind_user: "admin@example.com".to_string(),
            request: request(&["dc1.example.com"]),
        }
    }

    #[tokio::test]
    async fn get_user_searches_by_encoded_guid() {
        let mut session = MockLdapSession::new();
        session
            .expect_search()
            .withf(|base, scope, filter, attributes| {
                base == "DC=example,DC=com"
                    && *scope == SearchScope::Subtree
                    && filter == "(objectGUID=\\ff\\19\\96\\6f\\86\\8b\\11\\d0\\b4\\2d\\00\\c0\\4f\\c9\\64\\ff)"
                    && attributes.contains(&"userPrincipalName")
            })
            .times(1)
            .returning(|_, _, _, _| {
                Ok(vec![LdapEntry::new("CN=John Doe,CN=Users,DC=example,DC=com")
                    .with_binary_attribute(
                        "objectGUID",
                        vec![
                            0xff, 0x19, 0x96, 0x6f, 0x86, 0x8b, 0x11, 0xd0, 0xb4, 0x2d, 0x00,
                            0xc0, 0x4f, 0xc9, 0x64, 0xff,
                        ],
                    )
                    .with_attribute("givenName", "John")
                    .with_attribute("sn", "Doe")
                    .with_attribute("mail", "jdoe@example.com")
                    .with_attribute("userPrincipalName", "jdoe@example.com")])
            });

        let mut connection = connection(ProviderKind::ActiveDirectory, session);
        let user = connection
            .get_user("6f9619ff-8b86-d011-b42d-00c04fc964ff")
            .await
            .unwrap()
            .unwrap();

        assert_eq!(user.provider_entry_id, "/xmWb4aLEdC0LQDAT8lk/w==");
        assert_eq!(user.name, "John");
        assert_eq!(user.surname, "Doe");
        assert_eq!(user.email, "jdoe@example.com");
        assert_eq!(user.department, "");
        assert_eq!(user.username, "jdoe@example.com");
        assert_eq!(user.namespace, "DC=example,DC=com");
        assert_eq!(user.distinguished_name, "CN=John Doe,CN=Users,DC=example,DC=com");
    }

    #[tokio::test]
    async fn missing_entry_is_none() {
        let mut session = MockLdapSession::new();
        session
            .expect_search()
            .returning(|_, _, _, _| Ok(Vec::new()));

        let mut connection = connection(ProviderKind::OpenLdap, session);
        let group = connection
            .get_group("1c0f9a5e-0a57-4e55-9d5f-0c1a1d1e2b3c")
            .await
            .unwrap();

        assert!(group.is_none());
    }

    #[tokio::test]
    async fn get_group_maps_description() {
        let mut session = MockLdapSession::new();
        session
            .expect_search()
            .withf(|_, _, filter, _| filter == "(nsUniqueId=1c0f9a5e-0a574e55-9d5f0c1a-1d1e2b3c)")
            .returning(|_, _, _, _| {
                Ok(vec![LdapEntry::new("cn=admins,ou=groups,dc=example,dc=com")
                    .with_attribute("nsUniqueId", "1c0f9a5e-0a574e55-9d5f0c1a-1d1e2b3c")
                    .with_attribute("cn", "admins")
                    .with_attribute("description", "Administrators")])
            });

        let mut connection = connection(ProviderKind::Rhds, session);
        let group = connection
            .get_group("1c0f9a5e-0a57-4e55-9d5f-0c1a1d1e2b3c")
            .await
            .unwrap()
            .unwrap();

        assert_eq!(group.provider_entry_id, "1c0f9a5e-0a574e55-9d5f0c1a-1d1e2b3c");
        assert_eq!(group.name, "admins");
        assert_eq!(group.description, "Administrators");
        assert_eq!(group.username, "");
    }

    #[tokio::test]
    async fn malformed_legacy_id_is_rejected() {
        let session = MockLdapSession::new();
        let mut connection = connection(ProviderKind::ActiveDirectory, session);
        let result = connection.get_user("not-a-guid").await;
        assert!(matches!(result, Err(Error::InvalidId(_))));
    }

    #[test]
    fn config_text_uses_negotiated_values() {
        let connection = connection(ProviderKind::ActiveDirectory, MockLdapSession::new());
        let text = connection.config_text().unwrap();
        assert!(text.contains("vars.domain = example.com\n"));
        assert!(text.contains("vars.user = admin@example.com\n"));
        assert!(text.contains("vars.password = secret\n"));
        assert!(text.contains("pool.default.serverset.srvrecord.service = ldap\n"));
        assert!(!connection.is_secure());
    }
}
