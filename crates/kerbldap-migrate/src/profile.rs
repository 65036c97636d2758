//! The new AAA profile: two extension descriptors, the provider configuration and an optional
//! trust store.

use async_trait::async_trait;
use kerbldap_core::{Error, Protocol, Result};
use kerbldap_directory::Directory;
use nix::unistd::{Group, Uid, User};
use regex::Regex;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::LazyLock;
use tokio::process::Command;
use tracing::debug;

use crate::files::{FileOwner, FileTransaction};
use crate::options::MigrationOptions;

const DESCRIPTOR_MODE: u32 = 0o644;
const CONFIG_MODE: u32 = 0o660;
const SERVICE_ACCOUNT: &str = "ovirt";
const TRUST_STORE_PASSWORD: &str = "changeit";

static SENSITIVE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^[ \t]*(vars\.password)[^\n]*$").expect("sensitive key pattern is valid")
});

/// Replaces the value of every bind password line with `***`.
#[must_use]
pub fn mask_sensitive(text: &str) -> String {
    SENSITIVE.replace_all(text, "$1 = ***").into_owned()
}

/// Imports a CA certificate into a new trust store.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TrustStoreTool: Send + Sync {
    /// Creates `store` holding `ca_cert`.
    async fn import(&self, ca_cert: &Path, store: &Path) -> Result<()>;
}

/// [`TrustStoreTool`] running the JDK `keytool`.
#[derive(Debug, Clone)]
pub struct Keytool {
    program: PathBuf,
}

impl Keytool {
    /// `$JAVA_HOME/bin/keytool`, or `keytool` from `PATH`.
    #[must_use]
    pub fn from_env() -> Self {
        let program = env::var_os("JAVA_HOME")
            .map_or_else(|| PathBuf::from("keytool"), |home| PathBuf::from(home).join("bin/keytool"));
        Self { program }
    }
}

#[async_trait]
impl TrustStoreTool for Keytool {
    async fn import(&self, ca_cert: &Path, store: &Path) -> Result<()> {
        let output = Command::new(&self.program)
            .args(["-importcert", "-noprompt", "-trustcacerts", "-storetype", "JKS", "-keystore"])
            .arg(store)
            .args(["-storepass", TRUST_STORE_PASSWORD, "-file"])
            .arg(ca_cert)
            .args(["-alias", "myca"])
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|err| keytool_failure(&err.to_string()))?;
        debug!(
            stdout = %String::from_utf8_lossy(&output.stdout),
            stderr = %String::from_utf8_lossy(&output.stderr),
            "keytool"
        );
        if output.status.success() {
            Ok(())
        } else {
            Err(keytool_failure("Failed to execute keytool"))
        }
    }
}

fn keytool_failure(message: &str) -> Error {
    Error::ExternalTool {
        tool: "keytool".to_string(),
        message: message.to_string(),
    }
}

/// Owner for the provider configuration when running as root.
///
/// # Errors
///
/// Returns [`Error::Configuration`] when running as root and the service account is missing.
pub fn service_account() -> Result<Option<FileOwner>> {
    if !Uid::effective().is_root() {
        return Ok(None);
    }
    let user = User::from_name(SERVICE_ACCOUNT)
        .map_err(|err| Error::Internal(err.to_string()))?
        .ok_or_else(|| missing_account("user"))?;
    let group = Group::from_name(SERVICE_ACCOUNT)
        .map_err(|err| Error::Internal(err.to_string()))?
        .ok_or_else(|| missing_account("group"))?;
    Ok(Some(FileOwner {
        uid: user.uid,
        gid: group.gid,
    }))
}

fn missing_account(kind: &str) -> Error {
    Error::Configuration(format!("Service {kind} '{SERVICE_ACCOUNT}' does not exist"))
}

/// Rendered contents of a profile.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProfileTexts {
    /// Authn extension descriptor.
    pub authn: String,
    /// Authz extension descriptor.
    pub authz: String,
    /// Provider configuration, bind password included.
    pub config: String,
    /// CA certificate to import into the trust store.
    pub ca_cert: Option<PathBuf>,
}

/// Names and locations of one AAA profile.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AaaProfile {
    profile: String,
    authn_name: String,
    authz_name: String,
    extensions_dir: PathBuf,
    aaa_dir: PathBuf,
}

impl AaaProfile {
    /// Profile described by the run options.
    #[must_use]
    pub fn new(options: &MigrationOptions) -> Self {
        let etc = options.engine_etc();
        Self {
            profile: options.profile.clone(),
            authn_name: options.authn_name.clone(),
            authz_name: options.authz_name.clone(),
            extensions_dir: etc.join("extensions.d"),
            aaa_dir: etc.join("aaa"),
        }
    }

    /// Authn descriptor path.
    #[must_use]
    pub fn authn_file(&self) -> PathBuf {
        self.extensions_dir.join(format!("{}.properties", self.authn_name))
    }

    /// Authz descriptor path.
    #[must_use]
    pub fn authz_file(&self) -> PathBuf {
        self.extensions_dir.join(format!("{}.properties", self.authz_name))
    }

    /// Provider configuration path.
    #[must_use]
    pub fn config_file(&self) -> PathBuf {
        self.aaa_dir.join(format!("{}.properties", self.profile))
    }

    /// Trust store path.
    #[must_use]
    pub fn trust_store(&self) -> PathBuf {
        self.aaa_dir.join(format!("{}.jks", self.profile))
    }

    /// Every artifact the profile may produce.
    #[must_use]
    pub fn artifacts(&self) -> [PathBuf; 4] {
        [
            self.config_file(),
            self.trust_store(),
            self.authz_file(),
            self.authn_file(),
        ]
    }

    /// Fails if any artifact already exists.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ArtifactCollision`].
    pub fn check_absent(&self) -> Result<()> {
        FileTransaction::check_absent(&self.artifacts())
    }

    fn config_reference(&self) -> String {
        format!("../aaa/{}.properties", self.profile)
    }

    /// Authz extension descriptor.
    #[must_use]
    pub fn authz_text(&self) -> String {
        format!(
            "ovirt.engine.extension.name = {authz}\n\
             ovirt.engine.extension.bindings.method = jbossmodule\n\
             ovirt.engine.extension.binding.jbossmodule.module = org.ovirt.engine-extensions.aaa.ldap\n\
             ovirt.engine.extension.binding.jbossmodule.class = org.ovirt.engineextensions.aaa.ldap.AuthzExtension\n\
             ovirt.engine.extension.provides = org.ovirt.engine.api.extensions.aaa.Authz\n\
             config.profile.file.1 = {config}\n",
            authz = self.authz_name,
            config = self.config_reference(),
        )
    }

    /// Authn extension descriptor.
    #[must_use]
    pub fn authn_text(&self) -> String {
        format!(
            "ovirt.engine.extension.name = {authn}\n\
             ovirt.engine.extension.bindings.method = jbossmodule\n\
             ovirt.engine.extension.binding.jbossmodule.module = org.ovirt.engine-extensions.aaa.ldap\n\
             ovirt.engine.extension.binding.jbossmodule.class = org.ovirt.engineextensions.aaa.ldap.AuthnExtension\n\
             ovirt.engine.extension.provides = org.ovirt.engine.api.extensions.aaa.Authn\n\
             ovirt.engine.aaa.authn.profile.name = {profile}\n\
             ovirt.engine.aaa.authn.authz.plugin = {authz}\n\
             config.profile.file.1 = {config}\n",
            authn = self.authn_name,
            profile = self.profile,
            authz = self.authz_name,
            config = self.config_reference(),
        )
    }

    /// Provider configuration: the provider template followed by the TLS pool settings.
    #[must_use]
    pub fn config_text(&self, provider_config: &str, protocol: Protocol, ca_cert: Option<&Path>) -> String {
        format!(
            "{provider_config}\n\
             pool.default.ssl.enable = {ssl}\n\
             pool.default.ssl.insecure = {insecure}\n\
             pool.default.ssl.startTLS = {start_tls}\n\
             pool.default.ssl.truststore.file = ${{local:_basedir}}/{profile}.jks\n\
             pool.default.ssl.truststore.password = {TRUST_STORE_PASSWORD}\n",
            ssl = protocol == Protocol::Ldaps,
            insecure = protocol.is_secure() && ca_cert.is_none(),
            start_tls = protocol == Protocol::StartTls,
            profile = self.profile,
        )
    }

    /// Renders every text of the profile for a negotiated directory.
    ///
    /// # Errors
    ///
    /// Propagates a failure to render the provider template.
    pub fn render(&self, directory: &dyn Directory) -> Result<ProfileTexts> {
        let provider_config = directory.config_text()?;
        Ok(ProfileTexts {
            authn: self.authn_text(),
            authz: self.authz_text(),
            config: self.config_text(&provider_config, directory.protocol(), directory.ca_cert()),
            ca_cert: directory.ca_cert().map(Path::to_path_buf),
        })
    }

    /// Stages the trust store and the three text artifacts.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ExternalTool`] when the trust store import fails and [`Error::Io`] when
    /// staging fails.
    pub async fn save(
        &self,
        files: &mut FileTransaction,
        texts: &ProfileTexts,
        trust_store: &dyn TrustStoreTool,
        owner: Option<FileOwner>,
    ) -> Result<()> {
        if let Some(ca_cert) = &texts.ca_cert {
            let store = files.stage(&self.trust_store());
            // keytool refuses to write into an existing empty file
            if store.exists() {
                fs::remove_file(&store)?;
            }
            trust_store.import(ca_cert, &store).await?;
        }

        for (target, text, mode) in [
            (self.authz_file(), &texts.authz, DESCRIPTOR_MODE),
            (self.authn_file(), &texts.authn, DESCRIPTOR_MODE),
            (self.config_file(), &texts.config, CONFIG_MODE),
        ] {
            debug!("Write '{}'\n{}", target.display(), mask_sensitive(text));
            let staged = files.write(&target, text, mode)?;
            if mode == CONFIG_MODE {
                if let Some(owner) = owner {
                    FileTransaction::set_owner(&staged, owner)?;
                }
            }
        }
        Ok(())
    }
}
