//! Strongly-typed identifiers.
//!
//! Every entity id wraps a UUID v7 (time-sortable) so ids of different
//! entities cannot be mixed up at call sites.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

macro_rules! uuid_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub Uuid);

        impl $name {
            /// Create a new id using UUID v7.
            pub fn new() -> Self {
                Self(Uuid::now_v7())
            }

            /// Wrap an existing UUID.
            pub fn from_uuid(uuid: Uuid) -> Self {
                Self(uuid)
            }

            pub fn as_uuid(&self) -> &Uuid {
                &self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl FromStr for $name {
            type Err = uuid::Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Ok(Self(Uuid::parse_str(s)?))
            }
        }
    };
}

uuid_id!(
    /// Identifier of a workflow definition.
    DefinitionId
);
uuid_id!(
    /// Identifier of a running request instance.
    InstanceId
);
uuid_id!(
    /// Identifier of a user (requester or approver).
    UserId
);
uuid_id!(
    /// Identifier of a role.
    RoleId
);
uuid_id!(
    /// Identifier of a permission.
    PermissionId
);
uuid_id!(
    /// Identifier of an audit log entry.
    AuditId
);
