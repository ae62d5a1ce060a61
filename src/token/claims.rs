use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::AuthError;
use crate::permission::{PermissionRegistry, Permissions};

/// Name of the claim holding the caller's permission mask
pub const PERMISSIONS_CLAIM: &str = "permissions";
/// Name of the expiry claim, seconds since the epoch
pub const EXPIRY_CLAIM: &str = "exp";

/// Claims decoded from a verified token
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Claims(Map<String, Value>);

impl Claims {
    pub fn new(claims: Map<String, Value>) -> Self {
        Self(claims)
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.0.get(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    pub fn into_inner(self) -> Map<String, Value> {
        self.0
    }

    pub fn expires_at(&self) -> Option<i64> {
        let exp = self.0.get(EXPIRY_CLAIM)?;
        exp.as_i64().or_else(|| exp.as_f64().map(|secs| secs as i64))
    }

    /// The permission claim coerced into a mask, if it is a whole number that fits
    pub fn permissions(&self) -> Option<Permissions> {
        let raw = self.0.get(PERMISSIONS_CLAIM)?;
        let bits = match raw.as_u64() {
            Some(bits) => bits,
            None => {
                let float = raw.as_f64()?;
                if float < 0.0 || float.fract() != 0.0 {
                    return None;
                }
                float as u64
            }
        };
        u32::try_from(bits).ok().map(Permissions::from_bits)
    }

    /// Check the expiry and permission claims, returning the caller's mask
    pub fn validate(
        &self,
        registry: &PermissionRegistry,
        now: i64,
        leeway: i64,
    ) -> Result<Permissions, AuthError> {
        if !self.0.contains_key(EXPIRY_CLAIM) {
            return Err(AuthError::MissingExpiry);
        }
        match self.expires_at() {
            Some(exp) if exp.saturating_add(leeway) > now => {}
            _ => return Err(AuthError::Expired),
        }

        if !self.0.contains_key(PERMISSIONS_CLAIM) {
            return Err(AuthError::MissingPermissions);
        }
        match self.permissions() {
            Some(permissions) if registry.is_valid(permissions) => Ok(permissions),
            _ => Err(AuthError::InvalidPermissions),
        }
    }
}

impl From<Map<String, Value>> for Claims {
    fn from(claims: Map<String, Value>) -> Self {
        Self(claims)
    }
}
