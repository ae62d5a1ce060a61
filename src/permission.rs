//! Role bit-flags and the guard that checks them.

use std::fmt;
use std::ops::{BitAnd, BitOr, BitOrAssign};

use serde::{Deserialize, Serialize};

/// A bitmask of roles. Routes declare the bits allowed to reach them and
/// callers carry the bits granted by their token.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Permissions(u32);

impl Permissions {
    /// The resource has no permission set
    pub const NO_PERMISSION: Permissions = Permissions(1 << 0);
    /// Anyone can access the resource
    pub const ANONYMOUS: Permissions = Permissions(1 << 1);
    /// Callers holding basic permissions
    pub const BASIC: Permissions = Permissions(1 << 2);
    /// Callers holding admin permissions
    pub const ADMIN: Permissions = Permissions(1 << 3);
    /// Callers holding super permissions
    pub const SUPER: Permissions = Permissions(1 << 4);

    pub const fn from_bits(bits: u32) -> Self {
        Permissions(bits)
    }

    pub const fn bits(&self) -> u32 {
        self.0
    }

    pub const fn is_empty(&self) -> bool {
        self.0 == 0
    }

    pub const fn intersects(&self, other: Permissions) -> bool {
        self.0 & other.0 != 0
    }
}

impl BitOr for Permissions {
    type Output = Permissions;

    fn bitor(self, rhs: Permissions) -> Permissions {
        Permissions(self.0 | rhs.0)
    }
}

impl BitOrAssign for Permissions {
    fn bitor_assign(&mut self, rhs: Permissions) {
        self.0 |= rhs.0;
    }
}

impl BitAnd for Permissions {
    type Output = Permissions;

    fn bitand(self, rhs: Permissions) -> Permissions {
        Permissions(self.0 & rhs.0)
    }
}

impl fmt::Display for Permissions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#b}", self.0)
    }
}

/// Returns true when `have` shares at least one bit with `need`
pub fn guard(have: Permissions, need: Permissions) -> bool {
    have.intersects(need)
}

/// The role bits a token may carry. Built once at startup and then only read.
#[derive(Debug, Clone)]
pub struct PermissionRegistry {
    supported: Vec<Permissions>,
}

impl Default for PermissionRegistry {
    fn default() -> Self {
        Self {
            supported: vec![
                Permissions::ANONYMOUS,
                Permissions::BASIC,
                Permissions::ADMIN,
                Permissions::SUPER,
            ],
        }
    }
}

impl PermissionRegistry {
    /// Register a custom role bit on top of the defaults
    pub fn with(mut self, permission: Permissions) -> Self {
        if !self.supported.contains(&permission) {
            self.supported.push(permission);
        }
        self
    }

    /// A mask is valid only when it is exactly one of the registered roles
    pub fn is_valid(&self, permission: Permissions) -> bool {
        self.supported.contains(&permission)
    }

    pub fn supported(&self) -> &[Permissions] {
        &self.supported
    }
}
