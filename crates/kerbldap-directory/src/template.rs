//! Provider configuration text for the new profile.

use crate::provider::{ConfigTemplate, ProviderKind};
use kerbldap_core::{Error, Protocol, Result};
use url::Url;

/// Values substituted into a [`ConfigTemplate`].
#[derive(Debug, Clone, Copy)]
pub struct TemplateContext<'a> {
    /// Provider the profile is for.
    pub provider: ProviderKind,
    /// Legacy domain name.
    pub domain: &'a str,
    /// URI negotiation settled on.
    pub bind_uri: &'a str,
    /// Bind DN or principal.
    pub bind_user: &'a str,
    /// Bind password.
    pub password: &'a str,
    /// Transport protocol.
    pub protocol: Protocol,
    /// Port override, if the operator gave one.
    pub port: Option<u16>,
}

impl ConfigTemplate {
    /// Renders the configuration text.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] when the bind URI has no host.
    pub fn render(self, ctx: &TemplateContext<'_>) -> Result<String> {
        match self {
            Self::SrvRecord => Ok(render_srv_record(ctx)),
            Self::SingleServer => render_single_server(ctx),
        }
    }
}

fn render_srv_record(ctx: &TemplateContext<'_>) -> String {
    format!(
        "include = <{provider}.properties>\n\
         \n\
         vars.domain = {domain}\n\
         vars.user = {user}\n\
         vars.password = {password}\n\
         \n\
         pool.default.serverset.type = srvrecord\n\
         pool.default.serverset.srvrecord.domain = ${{global:vars.domain}}\n\
         pool.default.serverset.srvrecord.service = {service}\n\
         pool.default.auth.simple.bindDN = ${{global:vars.user}}\n\
         pool.default.auth.simple.password = ${{global:vars.password}}\n",
        provider = ctx.provider.tag(),
        domain = ctx.domain,
        user = ctx.bind_user,
        password = ctx.password,
        service = ctx.protocol.scheme(),
    )
}

fn render_single_server(ctx: &TemplateContext<'_>) -> Result<String> {
    let uri = Url::parse(ctx.bind_uri)?;
    let server = uri
        .host_str()
        .ok_or_else(|| Error::Configuration(format!("URI '{}' has no host", ctx.bind_uri)))?;

    let mut text = format!(
        "include = <{provider}.properties>\n\
         \n\
         vars.server = {server}\n\
         vars.user = {user}\n\
         vars.password = {password}\n\
         \n",
        provider = ctx.provider.tag(),
        user = ctx.bind_user,
        password = ctx.password,
    );
    if let Some(port) = ctx.port {
        text.push_str(&format!("pool.default.serverset.single.port = {port}\n"));
    }
    text.push_str(
        "pool.default.serverset.single.server = ${global:vars.server}\n\
         pool.default.auth.simple.bindDN = ${global:vars.user}\n\
         pool.default.auth.simple.password = ${global:vars.password}\n",
    );
    Ok(text)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn context(provider: ProviderKind, protocol: Protocol, port: Option<u16>) -> TemplateContext<'static> {
        TemplateContext {
            provider,
            domain: "example.com",
            bind_uri: "ldap://ds1.example.com:389",
            bind_user: "uid=admin,cn=users,dc=example,dc=com",
            password: "secret",
            protocol,
            port,
        }
    }

    #[test]
    fn srv_record_template() {
        let ctx = context(ProviderKind::ActiveDirectory, Protocol::Ldaps, None);
        let text = ConfigTemplate::SrvRecord.render(&ctx).unwrap();
        assert_eq!(
            text,
            "include = <ad.properties>\n\
             \n\
             vars.domain = example.com\n\
             vars.user = uid=admin,cn=users,dc=example,dc=com\n\
             vars.password = secret\n\
             \n\
             pool.default.serverset.type = srvrecord\n\
             pool.default.serverset.srvrecord.domain = ${global:vars.domain}\n\
             pool.default.serverset.srvrecord.service = ldaps\n\
             pool.default.auth.simple.bindDN = ${global:vars.user}\n\
             pool.default.auth.simple.password = ${global:vars.password}\n"
        );
    }

    #[test]
    fn single_server_template_without_port() {
        let ctx = context(ProviderKind::Ipa, Protocol::StartTls, None);
        let text = ConfigTemplate::SingleServer.render(&ctx).unwrap();
        assert_eq!(
            text,
            "include = <ipa.properties>\n\
             \n\
             vars.server = ds1.example.com\n\
             vars.user = uid=admin,cn=users,dc=example,dc=com\n\
             vars.password = secret\n\
             \n\
             pool.default.serverset.single.server = ${global:vars.server}\n\
             pool.default.auth.simple.bindDN = ${global:vars.user}\n\
             pool.default.auth.simple.password = ${global:vars.password}\n"
        );
    }

    #[test]
    fn single_server_template_with_port() {
        let ctx = context(ProviderKind::OpenLdap, Protocol::Plain, Some(3389));
        let text = ConfigTemplate::SingleServer.render(&ctx).unwrap();
        assert!(text.starts_with("include = <openldap.properties>\n"));
        assert!(text.contains(
            "pool.default.serverset.single.port = 3389\n\
             pool.default.serverset.single.server = ${global:vars.server}\n"
        ));
    }

    #[test]
    fn uri_without_host_is_rejected() {
        let mut ctx = context(ProviderKind::Rhds, Protocol::Plain, None);
        ctx.bind_uri = "not a uri";
        assert!(ConfigTemplate::SingleServer.render(&ctx).is_err());
    }
}
