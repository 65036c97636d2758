//! Legacy users and groups into directory-backed records, and the foreign keys that follow them.
//!
//! Legacy users and groups share one id space, so permissions are resolved against the
//! migrated groups first and the migrated users second. Remapping therefore needs both
//! translations complete; the functions take the finished maps to make that ordering explicit.

use kerbldap_core::ids::{ElementId, GroupId, PermissionId, UserId};
use kerbldap_core::{Error, Result};
use kerbldap_directory::{Directory, DirectoryEntry};
use std::collections::BTreeMap;
use tracing::{debug, warn};

use crate::store::{LegacyGroup, LegacyUser, NewGroup, NewUser, Permission, Subscription};

/// Migrated users keyed by their legacy id.
pub type UserMap = BTreeMap<UserId, NewUser>;

/// Migrated groups keyed by their legacy id.
pub type GroupMap = BTreeMap<GroupId, NewGroup>;

/// Looks every legacy user up and builds its new record under `authz`.
///
/// Users the directory no longer knows are logged and left out.
///
/// # Errors
///
/// Propagates directory failures other than a miss or a malformed legacy id.
pub async fn translate_users(
    directory: &mut dyn Directory,
    legacy: &[LegacyUser],
    authz: &str,
) -> Result<UserMap> {
    let mut users = UserMap::new();
    for user in legacy {
        debug!(user = %user.username, id = %user.user_id, "looking up user");
        let found = soft(directory.get_user(&user.external_id).await)?;
        let Some(entry) = found else {
            warn!(
                "User '{}' id '{}' could not be found, probably deleted from directory",
                user.username, user.external_id
            );
            continue;
        };
        users.insert(user.user_id, new_user(entry, user, authz));
    }
    Ok(users)
}

/// Looks every legacy group up and builds its new record under `authz`.
///
/// # Errors
///
/// Propagates directory failures other than a miss or a malformed legacy id.
pub async fn translate_groups(
    directory: &mut dyn Directory,
    legacy: &[LegacyGroup],
    authz: &str,
) -> Result<GroupMap> {
    let mut groups = GroupMap::new();
    for group in legacy {
        debug!(group = %group.name, id = %group.id, "looking up group");
        let found = soft(directory.get_group(&group.external_id).await)?;
        let Some(entry) = found else {
            warn!(
                "Group '{}' id '{}' could not be found, probably deleted from directory",
                group.name, group.external_id
            );
            continue;
        };
        groups.insert(
            group.id,
            NewGroup {
                id: GroupId::new(entry.identity),
                external_id: entry.provider_entry_id,
                domain: authz.to_string(),
                namespace: entry.namespace,
                name: entry.name,
            },
        );
    }
    Ok(groups)
}

fn new_user(entry: DirectoryEntry, legacy: &LegacyUser, authz: &str) -> NewUser {
    NewUser {
        user_id: UserId::new(entry.identity),
        external_id: entry.provider_entry_id,
        domain: authz.to_string(),
        namespace: entry.namespace,
        name: entry.name,
        surname: entry.surname,
        email: entry.email,
        department: entry.department,
        username: entry.username,
        last_admin_check_status: legacy.last_admin_check_status,
    }
}

/// A malformed legacy id or a failed single lookup counts as a miss.
fn soft(result: Result<Option<DirectoryEntry>>) -> Result<Option<DirectoryEntry>> {
    match result {
        Err(Error::InvalidId(message) | Error::DirectoryLookup(message)) => {
            warn!("Directory lookup failed: {message}");
            Ok(None)
        }
        other => other,
    }
}

/// Rewrites permissions onto the migrated records; each survivor gets a new id.
///
/// Permissions whose element was not migrated are dropped.
#[must_use]
pub fn remap_permissions(
    permissions: &[Permission],
    users: &UserMap,
    groups: &GroupMap,
) -> Vec<Permission> {
    permissions
        .iter()
        .filter_map(|permission| {
            let element = permission.ad_element_id;
            let target = groups
                .get(&element.as_group())
                .map(|group| ElementId::from(group.id))
                .or_else(|| users.get(&element.as_user()).map(|user| ElementId::from(user.user_id)));
            match target {
                Some(ad_element_id) => Some(Permission {
                    id: PermissionId::new_v4(),
                    ad_element_id,
                    ..permission.clone()
                }),
                None => {
                    debug!(permission = %permission.id, element = %element, "dropping permission");
                    None
                }
            }
        })
        .collect()
}

/// Rewrites event subscriptions onto the migrated users.
#[must_use]
pub fn remap_subscriptions(subscriptions: &[Subscription], users: &UserMap) -> Vec<Subscription> {
    subscriptions
        .iter()
        .filter_map(|subscription| match users.get(&subscription.subscriber_id) {
            Some(user) => Some(Subscription {
                subscriber_id: user.user_id,
                ..subscription.clone()
            }),
            None => {
                debug!(
                    subscriber = %subscription.subscriber_id,
                    event = %subscription.event_up_name,
                    "dropping subscription"
                );
                None
            }
        })
        .collect()
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use async_trait::async_trait;
    use kerbldap_core::ids::{ObjectId, RoleId};
    use kerbldap_core::Protocol;
    use kerbldap_directory::ProviderKind;
    use std::collections::HashMap;
    use std::path::Path;
    use uuid::Uuid;

    /// In-memory directory keyed by legacy external id.
    #[derive(Default, Clone)]
    pub(crate) struct FakeDirectory {
        pub users: HashMap<String, DirectoryEntry>,
        pub groups: HashMap<String, DirectoryEntry>,
        pub failing: Option<Error>,
        pub closed: bool,
    }

    impl FakeDirectory {
        pub fn entry(name: &str) -> DirectoryEntry {
            DirectoryEntry {
                identity: Uuid::new_v4(),
                provider_entry_id: format!("{name}-entry"),
                name: name.to_string(),
                surname: format!("{name} surname"),
                email: format!("{name}@legacy.example"),
                department: String::new(),
                username: format!("{name}@legacy.example"),
                description: String::new(),
                namespace: "dc=legacy,dc=example".to_string(),
                distinguished_name: format!("uid={name},cn=users,dc=legacy,dc=example"),
            }
        }

        fn lookup(
            &self,
            entries: &HashMap<String, DirectoryEntry>,
            legacy_id: &str,
        ) -> Result<Option<DirectoryEntry>> {
            if let Some(err) = &self.failing {
                return Err(err.clone());
            }
            if legacy_id.starts_with("bad") {
                return Err(Error::InvalidId(format!("'{legacy_id}' is malformed")));
            }
            Ok(entries.get(legacy_id).cloned())
        }
    }

    #[async_trait]
    impl Directory for FakeDirectory {
        fn provider(&self) -> ProviderKind {
            ProviderKind::OpenLdap
        }

        fn protocol(&self) -> Protocol {
            Protocol::StartTls
        }

        fn ca_cert(&self) -> Option<&Path> {
            None
        }

        fn bind_uri(&self) -> &str {
            "ldap://ldap.legacy.example:389"
        }

        fn namespace(&self) -> &str {
            "dc=legacy,dc=example"
        }

        async fn get_user(&mut self, legacy_id: &str) -> Result<Option<DirectoryEntry>> {
            self.lookup(&self.users, legacy_id)
        }

        async fn get_group(&mut self, legacy_id: &str) -> Result<Option<DirectoryEntry>> {
            self.lookup(&self.groups, legacy_id)
        }

        fn config_text(&self) -> Result<String> {
            Ok("include = <openldap.properties>\n\
                vars.server = ldap.legacy.example\n\
                vars.user = uid=admin,dc=legacy,dc=example\n\
                vars.password = s3cret\n"
                .to_string())
        }

        async fn close(&mut self) -> Result<()> {
            self.closed = true;
            Ok(())
        }
    }

    fn legacy_user(name: &str, external_id: &str) -> LegacyUser {
        LegacyUser {
            user_id: UserId::new_v4(),
            username: name.to_string(),
            external_id: external_id.to_string(),
            last_admin_check_status: Some(true),
        }
    }

    fn legacy_group(name: &str, external_id: &str) -> LegacyGroup {
        LegacyGroup {
            id: GroupId::new_v4(),
            name: name.to_string(),
            external_id: external_id.to_string(),
        }
    }

    fn permission(element: ElementId) -> Permission {
        Permission {
            id: PermissionId::new_v4(),
            role_id: RoleId::new_v4(),
            ad_element_id: element,
            object_id: ObjectId::new_v4(),
            object_type_id: 1,
        }
    }

    #[tokio::test]
    async fn resolvable_users_get_fresh_identities() {
        let mut directory = FakeDirectory::default();
        directory.users.insert("ext-1".into(), FakeDirectory::entry("u1"));
        directory.users.insert("ext-3".into(), FakeDirectory::entry("u3"));
        let legacy = vec![
            legacy_user("u1", "ext-1"),
            legacy_user("u2", "ext-2"),
            legacy_user("u3", "ext-3"),
        ];

        let users = translate_users(&mut directory, &legacy, "legacy.example-new-authz")
            .await
            .unwrap();

        assert_eq!(users.len(), 2);
        assert!(!users.contains_key(&legacy[1].user_id));
        let u1 = &users[&legacy[0].user_id];
        assert_ne!(u1.user_id, legacy[0].user_id);
        assert_ne!(u1.user_id, users[&legacy[2].user_id].user_id);
        assert_eq!(u1.external_id, "u1-entry");
        assert_eq!(u1.domain, "legacy.example-new-authz");
        assert_eq!(u1.namespace, "dc=legacy,dc=example");
        assert_eq!(u1.last_admin_check_status, Some(true));
    }

    #[tokio::test]
    async fn malformed_ids_are_skipped() {
        let mut directory = FakeDirectory::default();
        directory.groups.insert("ext-g".into(), FakeDirectory::entry("admins"));
        let legacy = vec![legacy_group("broken", "bad-id"), legacy_group("admins", "ext-g")];

        let groups = translate_groups(&mut directory, &legacy, "authz").await.unwrap();

        assert_eq!(groups.len(), 1);
        assert_eq!(groups[&legacy[1].id].name, "admins");
    }

    #[tokio::test]
    async fn connection_failures_abort_translation() {
        let mut directory = FakeDirectory {
            failing: Some(Error::Ldap("connection reset".to_string())),
            ..FakeDirectory::default()
        };
        let legacy = vec![legacy_user("u1", "ext-1")];

        let err = translate_users(&mut directory, &legacy, "authz").await.unwrap_err();

        assert_eq!(err, Error::Ldap("connection reset".to_string()));
    }

    #[tokio::test]
    async fn permissions_follow_groups_before_users() {
        let mut directory = FakeDirectory::default();
        directory.users.insert("ext-1".into(), FakeDirectory::entry("u1"));
        directory.groups.insert("ext-g".into(), FakeDirectory::entry("admins"));

        // A group and a user sharing one legacy id.
        let shared = Uuid::new_v4();
        let mut user = legacy_user("u1", "ext-1");
        user.user_id = UserId::new(shared);
        let mut group = legacy_group("admins", "ext-g");
        group.id = GroupId::new(shared);

        let users = translate_users(&mut directory, &[user], "authz").await.unwrap();
        let groups = translate_groups(&mut directory, &[group], "authz").await.unwrap();

        let original = permission(ElementId::new(shared));
        let remapped = remap_permissions(std::slice::from_ref(&original), &users, &groups);

        assert_eq!(remapped.len(), 1);
        assert_eq!(
            remapped[0].ad_element_id,
            ElementId::from(groups[&GroupId::new(shared)].id)
        );
        assert_ne!(remapped[0].id, original.id);
        assert_eq!(remapped[0].role_id, original.role_id);
        assert_eq!(remapped[0].object_id, original.object_id);
    }

    #[tokio::test]
    async fn unresolved_permissions_and_subscriptions_are_dropped() {
        let mut directory = FakeDirectory::default();
        directory.users.insert("ext-1".into(), FakeDirectory::entry("u1"));
        let u1 = legacy_user("u1", "ext-1");
        let u2 = legacy_user("u2", "ext-2");
        let users = translate_users(&mut directory, &[u1.clone(), u2.clone()], "authz")
            .await
            .unwrap();

        let permissions = vec![permission(u1.user_id.into()), permission(u2.user_id.into())];
        let remapped = remap_permissions(&permissions, &users, &GroupMap::new());
        assert_eq!(remapped.len(), 1);
        assert_eq!(
            remapped[0].ad_element_id,
            ElementId::from(users[&u1.user_id].user_id)
        );

        let subscription = |subscriber_id| Subscription {
            subscriber_id,
            event_up_name: "VM_DOWN".to_string(),
            method_address: Some("u@legacy.example".to_string()),
            tag_name: None,
            notification_method: "EMAIL".to_string(),
        };
        let remapped = remap_subscriptions(
            &[subscription(u1.user_id), subscription(u2.user_id)],
            &users,
        );
        assert_eq!(remapped.len(), 1);
        assert_eq!(remapped[0].subscriber_id, users[&u1.user_id].user_id);
        assert_eq!(remapped[0].event_up_name, "VM_DOWN");
    }

    #[test]
    fn subscriptions_ignore_groups() {
        let group_id = GroupId::new_v4();
        let subscription = Subscription {
            subscriber_id: UserId::new(*group_id.as_uuid()),
            event_up_name: "VM_DOWN".to_string(),
            method_address: None,
            tag_name: None,
            notification_method: "EMAIL".to_string(),
        };

        assert!(remap_subscriptions(&[subscription], &UserMap::new()).is_empty());
    }
}
