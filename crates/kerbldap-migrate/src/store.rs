//! Engine database access.
//!
//! Everything a run reads or writes goes through one [`AaaStore`]; the PostgreSQL
//! implementation holds a single transaction for the whole run, so nothing becomes visible
//! until [`AaaStore::commit`].

use async_trait::async_trait;
use kerbldap_core::ids::{ElementId, GroupId, ObjectId, PermissionId, RoleId, UserId};
use kerbldap_core::{Error, Result};
use secrecy::ExposeSecret;
use sqlx::postgres::{PgConnectOptions, PgPoolOptions, PgSslMode};
use sqlx::{FromRow, PgConnection, Postgres, Transaction};
use std::str::FromStr;
use tracing::debug;
use uuid::Uuid;

use crate::engine_config::DatabaseSettings;

/// Optional legacy `users` columns and the value written into each when present.
const LEGACY_USER_COLUMNS: [(&str, &str); 4] = [
    ("active", "true"),
    ("group_ids", "''"),
    ("groups", "''"),
    ("role", "''"),
];

/// A user row of the legacy domain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LegacyUser {
    /// Row identity.
    pub user_id: UserId,
    /// Login name.
    pub username: String,
    /// Directory id in the legacy encoding.
    pub external_id: String,
    /// Cached admin flag, carried over unchanged.
    pub last_admin_check_status: Option<bool>,
}

/// A group row of the legacy domain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LegacyGroup {
    /// Row identity.
    pub id: GroupId,
    /// Group name.
    pub name: String,
    /// Directory id in the legacy encoding.
    pub external_id: String,
}

/// A permission grant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Permission {
    /// Row identity.
    pub id: PermissionId,
    /// Granted role.
    pub role_id: RoleId,
    /// User or group the role is granted to.
    pub ad_element_id: ElementId,
    /// Object the grant applies to.
    pub object_id: ObjectId,
    /// Type of that object.
    pub object_type_id: i32,
}

/// An event subscription.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subscription {
    /// Subscribed user.
    pub subscriber_id: UserId,
    /// Event name.
    pub event_up_name: String,
    /// Notification address.
    pub method_address: Option<String>,
    /// Tag filter.
    pub tag_name: Option<String>,
    /// Notification method.
    pub notification_method: String,
}

/// A user row to create in the target domain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewUser {
    /// Fresh identity.
    pub user_id: UserId,
    /// Provider entry id in persisted form.
    pub external_id: String,
    /// Target authz name.
    pub domain: String,
    /// Search namespace.
    pub namespace: String,
    /// Given name.
    pub name: String,
    /// Surname.
    pub surname: String,
    /// Mail address.
    pub email: String,
    /// Department.
    pub department: String,
    /// Login name.
    pub username: String,
    /// Carried over from the legacy row.
    pub last_admin_check_status: Option<bool>,
}

/// A group row to create in the target domain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewGroup {
    /// Fresh identity.
    pub id: GroupId,
    /// Provider entry id in persisted form.
    pub external_id: String,
    /// Target authz name.
    pub domain: String,
    /// Search namespace.
    pub namespace: String,
    /// Group name.
    pub name: String,
}

/// Engine tables used by a run.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AaaStore: Send {
    /// Whether any user or group already carries `authz` as its domain.
    async fn authz_exists(&mut self, authz: &str) -> Result<bool>;

    /// Raw value of a `vdc_options` entry.
    async fn vdc_option(&mut self, name: &str) -> Result<Option<String>>;

    /// Users of `domain`.
    async fn users(&mut self, domain: &str) -> Result<Vec<LegacyUser>>;

    /// Groups of `domain`.
    async fn groups(&mut self, domain: &str) -> Result<Vec<LegacyGroup>>;

    /// Every permission.
    async fn permissions(&mut self) -> Result<Vec<Permission>>;

    /// Every event subscription.
    async fn subscriptions(&mut self) -> Result<Vec<Subscription>>;

    /// Inserts a user.
    async fn insert_user(&mut self, user: &NewUser) -> Result<()>;

    /// Inserts a group.
    async fn insert_group(&mut self, group: &NewGroup) -> Result<()>;

    /// Inserts a permission.
    async fn insert_permission(&mut self, permission: &Permission) -> Result<()>;

    /// Inserts an event subscription.
    async fn insert_subscription(&mut self, subscription: &Subscription) -> Result<()>;

    /// Makes every write of the run durable.
    async fn commit(&mut self) -> Result<()>;

    /// Discards every write of the run.
    async fn rollback(&mut self) -> Result<()>;
}

#[derive(Debug, FromRow)]
struct LegacyUserRow {
    user_id: Uuid,
    username: String,
    external_id: String,
    last_admin_check_status: Option<bool>,
}

impl From<LegacyUserRow> for LegacyUser {
    fn from(row: LegacyUserRow) -> Self {
        Self {
            user_id: row.user_id.into(),
            username: row.username,
            external_id: row.external_id,
            last_admin_check_status: row.last_admin_check_status,
        }
    }
}

#[derive(Debug, FromRow)]
struct LegacyGroupRow {
    id: Uuid,
    name: String,
    external_id: String,
}

impl From<LegacyGroupRow> for LegacyGroup {
    fn from(row: LegacyGroupRow) -> Self {
        Self {
            id: row.id.into(),
            name: row.name,
            external_id: row.external_id,
        }
    }
}

#[derive(Debug, FromRow)]
struct PermissionRow {
    id: Uuid,
    role_id: Uuid,
    ad_element_id: Uuid,
    object_id: Uuid,
    object_type_id: i32,
}

impl From<PermissionRow> for Permission {
    fn from(row: PermissionRow) -> Self {
        Self {
            id: row.id.into(),
            role_id: row.role_id.into(),
            ad_element_id: row.ad_element_id.into(),
            object_id: row.object_id.into(),
            object_type_id: row.object_type_id,
        }
    }
}

#[derive(Debug, FromRow)]
struct SubscriptionRow {
    subscriber_id: Uuid,
    event_up_name: String,
    method_address: Option<String>,
    tag_name: Option<String>,
    notification_method: String,
}

impl From<SubscriptionRow> for Subscription {
    fn from(row: SubscriptionRow) -> Self {
        Self {
            subscriber_id: row.subscriber_id.into(),
            event_up_name: row.event_up_name,
            method_address: row.method_address,
            tag_name: row.tag_name,
            notification_method: row.notification_method,
        }
    }
}

/// Builds connection options from the engine configuration.
#[must_use]
pub fn connect_options(settings: &DatabaseSettings) -> PgConnectOptions {
    PgConnectOptions::new()
        .host(&settings.host)
        .port(settings.port)
        .username(&settings.user)
        .password(settings.password.expose_secret())
        .database(&settings.database)
        .ssl_mode(if settings.secured {
            PgSslMode::Require
        } else {
            PgSslMode::Prefer
        })
}

/// Parses a `postgres://` URL.
///
/// # Errors
///
/// Returns [`Error::Configuration`] for a malformed URL.
pub fn connect_options_from_url(url: &str) -> Result<PgConnectOptions> {
    PgConnectOptions::from_str(url)
        .map_err(|err| Error::Configuration(format!("invalid database URL: {err}")))
}

/// [`AaaStore`] over one PostgreSQL transaction.
pub struct PgAaaStore {
    tx: Option<Transaction<'static, Postgres>>,
    legacy_columns: Vec<(&'static str, &'static str)>,
}

impl PgAaaStore {
    /// Connects, opens the run transaction and probes the optional legacy columns.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Database`] when the database is unreachable.
    pub async fn connect(options: PgConnectOptions) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await
            .map_err(map_sqlx_error)?;
        let tx = pool.begin().await.map_err(map_sqlx_error)?;
        let mut store = Self {
            tx: Some(tx),
            legacy_columns: Vec::new(),
        };
        store.legacy_columns = store.probe_legacy_columns().await?;
        debug!(columns = ?store.legacy_columns, "legacy user columns");
        Ok(store)
    }

    fn conn(&mut self) -> Result<&mut PgConnection> {
        self.tx
            .as_deref_mut()
            .ok_or_else(|| Error::Database("transaction already finished".to_string()))
    }

    async fn probe_legacy_columns(&mut self) -> Result<Vec<(&'static str, &'static str)>> {
        let names: Vec<String> = LEGACY_USER_COLUMNS
            .iter()
            .map(|(name, _)| (*name).to_string())
            .collect();
        let present: Vec<(String,)> = sqlx::query_as(
            r"SELECT pg_attribute.attname::text
              FROM pg_class, pg_attribute
              WHERE pg_attribute.attrelid = pg_class.oid
                AND pg_class.relname = 'users'
                AND pg_attribute.attname::text = ANY($1)",
        )
        .bind(&names)
        .fetch_all(self.conn()?)
        .await
        .map_err(map_sqlx_error)?;

        Ok(LEGACY_USER_COLUMNS
            .into_iter()
            .filter(|(name, _)| present.iter().any(|(found,)| found.as_str() == *name))
            .collect())
    }
}

#[async_trait]
impl AaaStore for PgAaaStore {
    async fn authz_exists(&mut self, authz: &str) -> Result<bool> {
        let found: Option<(i32,)> = sqlx::query_as(
            r"SELECT 1 FROM users WHERE domain = $1
              UNION
              SELECT 1 FROM ad_groups WHERE domain = $1",
        )
        .bind(authz)
        .fetch_optional(self.conn()?)
        .await
        .map_err(map_sqlx_error)?;
        Ok(found.is_some())
    }

    async fn vdc_option(&mut self, name: &str) -> Result<Option<String>> {
        let row: Option<(String,)> = sqlx::query_as(
            "SELECT option_value FROM vdc_options WHERE option_name = $1 LIMIT 1",
        )
        .bind(name)
        .fetch_optional(self.conn()?)
        .await
        .map_err(map_sqlx_error)?;
        Ok(row.map(|(value,)| value))
    }

    async fn users(&mut self, domain: &str) -> Result<Vec<LegacyUser>> {
        let rows: Vec<LegacyUserRow> = sqlx::query_as(
            r"SELECT user_id, username, external_id, last_admin_check_status
              FROM users WHERE domain = $1",
        )
        .bind(domain)
        .fetch_all(self.conn()?)
        .await
        .map_err(map_sqlx_error)?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn groups(&mut self, domain: &str) -> Result<Vec<LegacyGroup>> {
        let rows: Vec<LegacyGroupRow> =
            sqlx::query_as("SELECT id, name, external_id FROM ad_groups WHERE domain = $1")
                .bind(domain)
                .fetch_all(self.conn()?)
                .await
                .map_err(map_sqlx_error)?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn permissions(&mut self) -> Result<Vec<Permission>> {
        let rows: Vec<PermissionRow> = sqlx::query_as(
            "SELECT id, role_id, ad_element_id, object_id, object_type_id FROM permissions",
        )
        .fetch_all(self.conn()?)
        .await
        .map_err(map_sqlx_error)?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn subscriptions(&mut self) -> Result<Vec<Subscription>> {
        let rows: Vec<SubscriptionRow> = sqlx::query_as(
            r"SELECT subscriber_id, event_up_name, method_address, tag_name, notification_method
              FROM event_subscriber",
        )
        .fetch_all(self.conn()?)
        .await
        .map_err(map_sqlx_error)?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn insert_user(&mut self, user: &NewUser) -> Result<()> {
        let statement = insert_user_statement(&self.legacy_columns);
        sqlx::query(&statement)
            .bind(&user.department)
            .bind(&user.domain)
            .bind(&user.email)
            .bind(&user.external_id)
            .bind(user.last_admin_check_status)
            .bind(&user.name)
            .bind(&user.namespace)
            .bind(&user.surname)
            .bind(user.user_id.into_uuid())
            .bind(&user.username)
            .execute(self.conn()?)
            .await
            .map_err(map_sqlx_error)?;
        Ok(())
    }

    async fn insert_group(&mut self, group: &NewGroup) -> Result<()> {
        sqlx::query(
            r"INSERT INTO ad_groups (
                distinguishedname, domain, external_id, id, name, namespace
            ) VALUES ('', $1, $2, $3, $4, $5)",
        )
        .bind(&group.domain)
        .bind(&group.external_id)
        .bind(group.id.into_uuid())
        .bind(&group.name)
        .bind(&group.namespace)
        .execute(self.conn()?)
        .await
        .map_err(map_sqlx_error)?;
        Ok(())
    }

    async fn insert_permission(&mut self, permission: &Permission) -> Result<()> {
        sqlx::query(
            r"INSERT INTO permissions (
                id, role_id, ad_element_id, object_id, object_type_id
            ) VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(permission.id.into_uuid())
        .bind(permission.role_id.into_uuid())
        .bind(permission.ad_element_id.into_uuid())
        .bind(permission.object_id.into_uuid())
        .bind(permission.object_type_id)
        .execute(self.conn()?)
        .await
        .map_err(map_sqlx_error)?;
        Ok(())
    }

    async fn insert_subscription(&mut self, subscription: &Subscription) -> Result<()> {
        sqlx::query(
            r"INSERT INTO event_subscriber (
                subscriber_id, event_up_name, method_address, tag_name, notification_method
            ) VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(subscription.subscriber_id.into_uuid())
        .bind(&subscription.event_up_name)
        .bind(&subscription.method_address)
        .bind(&subscription.tag_name)
        .bind(&subscription.notification_method)
        .execute(self.conn()?)
        .await
        .map_err(map_sqlx_error)?;
        Ok(())
    }

    async fn commit(&mut self) -> Result<()> {
        match self.tx.take() {
            Some(tx) => tx.commit().await.map_err(map_sqlx_error),
            None => Err(Error::Database("transaction already finished".to_string())),
        }
    }

    async fn rollback(&mut self) -> Result<()> {
        match self.tx.take() {
            Some(tx) => tx.rollback().await.map_err(map_sqlx_error),
            None => Ok(()),
        }
    }
}

fn insert_user_statement(legacy_columns: &[(&str, &str)]) -> String {
    let mut names = String::new();
    let mut values = String::new();
    for (name, value) in legacy_columns {
        names.push_str(name);
        names.push_str(", ");
        values.push_str(value);
        values.push_str(", ");
    }
    format!(
        "INSERT INTO users (\
            {names}_create_date, _update_date, department, domain, email, external_id, \
            last_admin_check_status, name, namespace, note, surname, user_id, username\
        ) VALUES (\
            {values}now(), now(), $1, $2, $3, $4, $5, $6, $7, '', $8, $9, $10\
        )"
    )
}

#[allow(clippy::needless_pass_by_value)]
fn map_sqlx_error(err: sqlx::Error) -> Error {
    match err {
        sqlx::Error::Database(db_err) => Error::Database(db_err.to_string()),
        sqlx::Error::PoolTimedOut => Error::Database("connection pool timeout".to_string()),
        sqlx::Error::Io(io) => Error::Database(format!("database connection failed: {io}")),
        other => Error::Database(other.to_string()),
    }
}
