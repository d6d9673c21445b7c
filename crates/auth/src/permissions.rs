use std::borrow::Cow;
use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

/// Permission key.
///
/// Permissions are modeled as opaque `action:resource` strings (e.g.
/// `write:courses`). There are no wildcards and no hierarchy: a key is granted
/// only when some assigned role grants exactly that key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PermissionKey(Cow<'static, str>);

impl PermissionKey {
    pub fn new(key: impl Into<Cow<'static, str>>) -> Self {
        Self(key.into())
    }

    pub const fn from_static(key: &'static str) -> Self {
        Self(Cow::Borrowed(key))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl core::fmt::Display for PermissionKey {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Well-known permission keys.
pub mod keys {
    use super::PermissionKey;

    pub const READ_USERS: PermissionKey = PermissionKey::from_static("read:users");
    pub const WRITE_USERS: PermissionKey = PermissionKey::from_static("write:users");
    pub const READ_ROLES: PermissionKey = PermissionKey::from_static("read:roles");
    pub const WRITE_ROLES: PermissionKey = PermissionKey::from_static("write:roles");
    pub const READ_PERMISSIONS: PermissionKey = PermissionKey::from_static("read:permissions");
    pub const WRITE_PERMISSIONS: PermissionKey = PermissionKey::from_static("write:permissions");
    pub const READ_ORGANIZATIONS: PermissionKey = PermissionKey::from_static("read:organizations");
    pub const WRITE_ORGANIZATIONS: PermissionKey =
        PermissionKey::from_static("write:organizations");
    pub const WRITE_COURSES: PermissionKey = PermissionKey::from_static("write:courses");
    pub const WRITE_CATEGORIES: PermissionKey = PermissionKey::from_static("write:categories");

    /// Every key the bootstrap seed knows about, with a display name.
    pub const ALL: &[(PermissionKey, &str)] = &[
        (READ_USERS, "Read users"),
        (WRITE_USERS, "Write users"),
        (READ_ROLES, "Read roles"),
        (WRITE_ROLES, "Write roles"),
        (READ_PERMISSIONS, "Read permissions"),
        (WRITE_PERMISSIONS, "Write permissions"),
        (READ_ORGANIZATIONS, "Read organizations"),
        (WRITE_ORGANIZATIONS, "Write organizations"),
        (WRITE_COURSES, "Write courses"),
        (WRITE_CATEGORIES, "Write categories"),
    ];
}

/// The effective permissions of a user within one organization.
///
/// Built as the union of the keys granted by every role assigned there.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PermissionSet(BTreeSet<PermissionKey>);

impl PermissionSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: PermissionKey) -> bool {
        self.0.insert(key)
    }

    pub fn contains(&self, key: &PermissionKey) -> bool {
        self.0.contains(key)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &PermissionKey> {
        self.0.iter()
    }

    /// Keys from `required` this set does not hold, in the order given.
    pub fn missing<'a>(&self, required: &'a [PermissionKey]) -> Vec<&'a PermissionKey> {
        required.iter().filter(|k| !self.contains(k)).collect()
    }
}

impl FromIterator<PermissionKey> for PermissionSet {
    fn from_iter<I: IntoIterator<Item = PermissionKey>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl Extend<PermissionKey> for PermissionSet {
    fn extend<I: IntoIterator<Item = PermissionKey>>(&mut self, iter: I) {
        self.0.extend(iter)
    }
}
