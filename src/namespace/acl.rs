//! Access control lists attached to created nodes.
//!
//! The executor never interprets an ACL. It is stored with each node so a
//! backend that enforces permissions can do so.

use serde::{Deserialize, Serialize};

/// Permission bits granted by an ACL entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Perms(pub u8);

impl Perms {
    pub const READ: Perms = Perms(1);
    pub const WRITE: Perms = Perms(1 << 1);
    pub const CREATE: Perms = Perms(1 << 2);
    pub const DELETE: Perms = Perms(1 << 3);
    pub const ADMIN: Perms = Perms(1 << 4);
    pub const ALL: Perms = Perms(0b1_1111);

    pub fn contains(self, other: Perms) -> bool {
        self.0 & other.0 == other.0
    }
}

impl std::ops::BitOr for Perms {
    type Output = Perms;

    fn bitor(self, rhs: Perms) -> Perms {
        Perms(self.0 | rhs.0)
    }
}

/// A single `scheme:id` grant.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AclEntry {
    pub scheme: String,
    pub id: String,
    pub perms: Perms,
}

impl AclEntry {
    pub fn new(scheme: &str, id: &str, perms: Perms) -> Self {
        Self {
            scheme: scheme.to_string(),
            id: id.to_string(),
            perms,
        }
    }
}

/// An access control list.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Acl(pub Vec<AclEntry>);

impl Acl {
    /// Anyone may do anything.
    pub fn open_unsafe() -> Self {
        Acl(vec![AclEntry::new("world", "anyone", Perms::ALL)])
    }

    /// Anyone may read.
    pub fn read_unsafe() -> Self {
        Acl(vec![AclEntry::new("world", "anyone", Perms::READ)])
    }

    /// Full rights for the authenticated creator only.
    pub fn creator_all() -> Self {
        Acl(vec![AclEntry::new("auth", "", Perms::ALL)])
    }

    pub fn entries(&self) -> &[AclEntry] {
        &self.0
    }
}
