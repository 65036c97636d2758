//! The migration run.
//!
//! A run walks a fixed sequence of states. Database writes go into the store transaction and
//! files into a [`FileTransaction`]; both are committed together at the end, and only when the
//! apply flag is set. Any failure, and every run without the flag, rolls both back.

use kerbldap_core::{DomainCredentials, Error, Result};
use kerbldap_directory::{ConnectionRequest, Directory, DirectoryConnector};
use secrecy::{ExposeSecret, SecretString};
use std::fmt;
use std::path::PathBuf;
use tracing::{debug, info, warn};

use crate::decrypt::PasswordDecryptor;
use crate::files::{FileOwner, FileTransaction};
use crate::options::MigrationOptions;
use crate::profile::{AaaProfile, TrustStoreTool};
use crate::store::{AaaStore, Permission, Subscription};
use crate::translate::{
    remap_permissions, remap_subscriptions, translate_groups, translate_users, GroupMap, UserMap,
};
use crate::vdc_options::{load_domain_entry, DomainEntry};

const DRY_RUN_MESSAGE: &str = "Apply parameter was not specified rolling back";

/// Progress of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MigrationState {
    /// Nothing done yet.
    Init,
    /// Target authz and artifacts are free.
    SanityChecked,
    /// Legacy domain settings loaded.
    OptionsLoaded,
    /// Directory bound.
    DirectoryConnected,
    /// Users translated.
    UsersTranslated,
    /// Groups translated.
    GroupsTranslated,
    /// Permissions rewritten.
    PermissionsRemapped,
    /// Subscriptions rewritten.
    SubscriptionsRemapped,
    /// Rows written into the store transaction.
    Persisted,
    /// Artifacts staged.
    ConfigWritten,
    /// Everything made durable.
    Committed,
    /// Everything discarded.
    RolledBack,
}

impl fmt::Display for MigrationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Outcome of an applied run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MigrationReport {
    /// Users migrated.
    pub users: usize,
    /// Users no longer in the directory.
    pub skipped_users: usize,
    /// Groups migrated.
    pub groups: usize,
    /// Groups no longer in the directory.
    pub skipped_groups: usize,
    /// Permissions rewritten.
    pub permissions: usize,
    /// Permissions dropped.
    pub dropped_permissions: usize,
    /// Subscriptions rewritten.
    pub subscriptions: usize,
    /// Subscriptions dropped.
    pub dropped_subscriptions: usize,
    /// Artifacts written.
    pub files: Vec<PathBuf>,
}

/// One migration run and its collaborators.
pub struct Migration {
    options: MigrationOptions,
    store: Box<dyn AaaStore>,
    connector: Box<dyn DirectoryConnector>,
    decryptor: Option<Box<dyn PasswordDecryptor>>,
    trust_store: Box<dyn TrustStoreTool>,
    owner: Option<FileOwner>,
    state: MigrationState,
}

impl Migration {
    /// Prepares a run. `decryptor` may be `None` when a bind password is given.
    #[must_use]
    pub fn new(
        options: MigrationOptions,
        store: Box<dyn AaaStore>,
        connector: Box<dyn DirectoryConnector>,
        decryptor: Option<Box<dyn PasswordDecryptor>>,
        trust_store: Box<dyn TrustStoreTool>,
    ) -> Self {
        Self {
            options,
            store,
            connector,
            decryptor,
            trust_store,
            owner: None,
            state: MigrationState::Init,
        }
    }

    /// Hands the provider configuration to `owner`.
    #[must_use]
    pub fn with_owner(mut self, owner: Option<FileOwner>) -> Self {
        self.owner = owner;
        self
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> MigrationState {
        self.state
    }

    fn advance(&mut self, state: MigrationState) {
        debug!(from = %self.state, to = %state, "migration state");
        self.state = state;
    }

    /// Runs the migration.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DryRun`] when every step succeeded but the apply flag is unset, and the
    /// failing step's error otherwise. Nothing is persisted in either case.
    pub async fn run(&mut self) -> Result<MigrationReport> {
        if let Err(err) = self.options.clone().validated() {
            self.advance(MigrationState::RolledBack);
            return Err(err);
        }
        let profile = AaaProfile::new(&self.options);

        let staged = self.convert(&profile).await;
        let outcome = match staged {
            Ok((report, files)) if self.options.apply => self.commit(report, files).await,
            Ok(_) => Err(Error::DryRun(DRY_RUN_MESSAGE.to_string())),
            Err(err) => Err(err),
        };

        if outcome.is_err() {
            if let Err(err) = self.store.rollback().await {
                warn!("Rollback failed: {err}");
            }
            self.advance(MigrationState::RolledBack);
        }
        outcome
    }

    async fn commit(
        &mut self,
        mut report: MigrationReport,
        files: FileTransaction,
    ) -> Result<MigrationReport> {
        let committed = files.commit()?;
        if let Err(err) = self.store.commit().await {
            committed.revert();
            return Err(err);
        }
        report.files = committed.paths().to_vec();
        self.advance(MigrationState::Committed);
        Ok(report)
    }

    async fn convert(&mut self, profile: &AaaProfile) -> Result<(MigrationReport, FileTransaction)> {
        let authz = self.options.authz_name.clone();

        info!("Sanity checks");
        if self.store.authz_exists(&authz).await? {
            return Err(Error::PersistenceConflict(format!(
                "User/Group from domain '{authz}' exists in database"
            )));
        }
        profile.check_absent()?;
        let mut files = FileTransaction::new(&self.options.engine_etc())?;
        self.advance(MigrationState::SanityChecked);

        info!("Loading options");
        let entry = load_domain_entry(self.store.as_mut(), &self.options.domain).await?;
        let provider = entry.provider;
        let request = self.connection_request(entry)?;
        self.advance(MigrationState::OptionsLoaded);

        let mut directory = self.connector.connect(provider, &request).await?;
        self.advance(MigrationState::DirectoryConnected);

        let converted = self
            .convert_entities(directory.as_mut(), &authz)
            .await
            .and_then(|converted| Ok((converted, profile.render(directory.as_ref())?)));
        if let Err(err) = directory.close().await {
            warn!("Cannot close directory connection: {err}");
        }
        let (converted, texts) = converted?;

        self.persist(&converted).await?;
        self.advance(MigrationState::Persisted);

        info!("Creating new extensions configuration");
        profile
            .save(&mut files, &texts, self.trust_store.as_ref(), self.owner)
            .await?;
        self.advance(MigrationState::ConfigWritten);
        info!("Conversion completed");

        if texts.ca_cert.is_none() {
            warn!(
                "We strongly suggest to provide cacert, you can do this later, please refer to \
                 ovirt-engine-extension-aaa-ldap documentation"
            );
        }
        if !provider.is_active_directory() {
            info!(
                "Conversion was done using single server. Please refer to \
                 ovirt-engine-extension-aaa-ldap documentation if you would like to apply \
                 failover or other fallback policy."
            );
        }

        Ok((converted.report, files))
    }

    fn connection_request(&self, entry: DomainEntry) -> Result<ConnectionRequest> {
        let password: SecretString = match (&self.options.bind_password, &self.decryptor) {
            (Some(password), _) => password.clone(),
            (None, Some(decryptor)) => decryptor.decrypt(&entry.encrypted_password)?,
            (None, None) => {
                return Err(Error::Configuration(
                    "No bind password given and no way to decrypt the stored one".to_string(),
                ))
            }
        };
        let servers = self.options.ldap_servers.clone().unwrap_or(entry.servers);

        let credentials = DomainCredentials::new(entry.sasl_user, password.expose_secret());
        let mut request = ConnectionRequest::new(self.options.domain.as_str(), credentials)
            .with_protocol(self.options.protocol)
            .with_servers(servers);
        if let Some(port) = self.options.port {
            request = request.with_port(port);
        }
        if let Some(ca_cert) = &self.options.ca_cert {
            request = request.with_ca_cert(ca_cert.clone());
        }
        if let Some(bind_user) = &self.options.bind_user {
            request = request.with_bind_user(bind_user.clone());
        }
        Ok(request)
    }

    async fn convert_entities(
        &mut self,
        directory: &mut dyn Directory,
        authz: &str,
    ) -> Result<Converted> {
        let domain = self.options.domain.clone();

        info!("Converting users");
        let legacy_users = self.store.users(&domain).await?;
        let users = translate_users(directory, &legacy_users, authz).await?;
        self.advance(MigrationState::UsersTranslated);

        info!("Converting groups");
        let legacy_groups = self.store.groups(&domain).await?;
        let groups = translate_groups(directory, &legacy_groups, authz).await?;
        self.advance(MigrationState::GroupsTranslated);

        info!("Converting permissions");
        let legacy_permissions = self.store.permissions().await?;
        let permissions = remap_permissions(&legacy_permissions, &users, &groups);
        self.advance(MigrationState::PermissionsRemapped);

        info!("Converting event subscriptions");
        let legacy_subscriptions = self.store.subscriptions().await?;
        let subscriptions = remap_subscriptions(&legacy_subscriptions, &users);
        self.advance(MigrationState::SubscriptionsRemapped);

        let report = MigrationReport {
            users: users.len(),
            skipped_users: legacy_users.len() - users.len(),
            groups: groups.len(),
            skipped_groups: legacy_groups.len() - groups.len(),
            permissions: permissions.len(),
            dropped_permissions: legacy_permissions.len() - permissions.len(),
            subscriptions: subscriptions.len(),
            dropped_subscriptions: legacy_subscriptions.len() - subscriptions.len(),
            files: Vec::new(),
        };
        Ok(Converted {
            users,
            groups,
            permissions,
            subscriptions,
            report,
        })
    }

    async fn persist(&mut self, converted: &Converted) -> Result<()> {
        let authz = self.options.authz_name.clone();

        info!("Adding new users");
        for user in converted.users.values() {
            self.store.insert_user(user).await?;
        }
        let added = self.store.users(&authz).await?;
        debug!(count = added.len(), users = ?added, "users added");

        info!("Adding new groups");
        for group in converted.groups.values() {
            self.store.insert_group(group).await?;
        }
        let added = self.store.groups(&authz).await?;
        debug!(count = added.len(), groups = ?added, "groups added");

        info!("Adding new permissions");
        for permission in &converted.permissions {
            self.store.insert_permission(permission).await?;
        }
        debug!(permissions = ?converted.permissions, "permissions added");

        info!("Adding new event subscriptions");
        for subscription in &converted.subscriptions {
            self.store.insert_subscription(subscription).await?;
        }
        debug!(subscriptions = ?converted.subscriptions, "subscriptions added");
        Ok(())
    }
}

/// Everything translated, ready to be written.
struct Converted {
    users: UserMap,
    groups: GroupMap,
    permissions: Vec<Permission>,
    subscriptions: Vec<Subscription>,
    report: MigrationReport,
}
