//! Strongly-typed UUID wrappers for migrated records.
//!
//! Users and groups share one identifier space in the legacy schema (permissions reference
//! either through the same column), so [`ElementId`] exists to name that shared column while
//! [`UserId`] and [`GroupId`] keep the two tables apart at compile time.

use std::fmt;
use uuid::Uuid;

/// Declares `Copy` wrappers around [`Uuid`], one per record kind.
macro_rules! record_ids {
    ($($(#[$doc:meta])* $name:ident;)+) => {$(
        $(#[$doc])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(Uuid);

        impl $name {
            /// Wraps an existing identifier.
            #[must_use]
            pub const fn new(uuid: Uuid) -> Self {
                Self(uuid)
            }

            /// A fresh random identifier.
            #[must_use]
            pub fn new_v4() -> Self {
                Self(Uuid::new_v4())
            }

            /// The wrapped identifier.
            #[must_use]
            pub const fn as_uuid(&self) -> &Uuid {
                &self.0
            }

            /// Unwraps into the bare identifier, as bound into SQL.
            #[must_use]
            pub const fn into_uuid(self) -> Uuid {
                self.0
            }
        }

        impl From<Uuid> for $name {
            fn from(uuid: Uuid) -> Self {
                Self(uuid)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                fmt::Display::fmt(&self.0, f)
            }
        }
    )+};
}

record_ids! {
    /// User UUID (`users.user_id`).
    UserId;
    /// Group UUID (`ad_groups.id`).
    GroupId;
    /// User-or-group UUID referenced by a permission.
    ElementId;
    /// Permission UUID.
    PermissionId;
    /// Role UUID.
    RoleId;
    /// Managed object UUID a permission applies to.
    ObjectId;
}

impl From<UserId> for ElementId {
    fn from(id: UserId) -> Self {
        Self(id.0)
    }
}

impl From<GroupId> for ElementId {
    fn from(id: GroupId) -> Self {
        Self(id.0)
    }
}

impl ElementId {
    /// Reinterprets the element as a user identifier.
    #[must_use]
    pub const fn as_user(self) -> UserId {
        UserId(self.0)
    }

    /// Reinterprets the element as a group identifier.
    #[must_use]
    pub const fn as_group(self) -> GroupId {
        GroupId(self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const VALID_UUID: &str = "550e8400-e29b-41d4-a716-446655440000";

    #[test]
    fn test_display_is_hyphenated() {
        let id = UserId::new(Uuid::parse_str(VALID_UUID).unwrap());
        assert_eq!(id.to_string(), VALID_UUID);
    }

    #[test]
    fn test_new_v4_is_random() {
        let first = UserId::new_v4();
        let second = UserId::new_v4();
        assert_ne!(first, second);
        assert_eq!(first.as_uuid().get_version_num(), 4);
    }

    #[test]
    fn test_element_id_shares_key_space() {
        let uuid = Uuid::parse_str(VALID_UUID).unwrap();
        let user = UserId::new(uuid);
        let group = GroupId::new(uuid);

        let from_user: ElementId = user.into();
        let from_group: ElementId = group.into();
        assert_eq!(from_user, from_group);
        assert_eq!(from_user.as_user(), user);
        assert_eq!(from_group.as_group(), group);
    }
}
