use std::borrow::Cow;

use serde::{Deserialize, Serialize};

/// Unique role key (e.g. `super-admin`, `teacher`).
///
/// Roles are bundles of permission keys; which keys a role grants lives in the
/// store, never in code. `super-admin` is not special-cased anywhere.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoleKey(Cow<'static, str>);

impl RoleKey {
    pub const SUPER_ADMIN: RoleKey = RoleKey::from_static("super-admin");
    pub const TEACHER: RoleKey = RoleKey::from_static("teacher");
    pub const STUDENT: RoleKey = RoleKey::from_static("student");

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

impl core::fmt::Display for RoleKey {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}
