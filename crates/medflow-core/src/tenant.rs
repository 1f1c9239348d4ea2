use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};

/// One hospital's isolated data partition.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TenantId(String);

impl TenantId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Build a tenant id from untrusted input, rejecting blank values.
    pub fn parse(id: &str) -> Result<Self> {
        let trimmed = id.trim();
        if trimmed.is_empty() {
            return Err(CoreError::invalid_tenant(id));
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TenantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TenantId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for TenantId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl AsRef<str> for TenantId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Staff role carried by an authenticated session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Doctor,
    Reception,
    Pharmacy,
    Lab,
    Admin,
    #[serde(other)]
    Other,
}

impl Role {
    /// Broadcast group this role listens on, if any.
    pub fn group(self) -> Option<RoleGroup> {
        match self {
            Self::Doctor => Some(RoleGroup::Doctors),
            Self::Reception => Some(RoleGroup::Reception),
            Self::Pharmacy => Some(RoleGroup::Pharmacy),
            Self::Lab => Some(RoleGroup::Lab),
            Self::Admin | Self::Other => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Doctor => "doctor",
            Self::Reception => "reception",
            Self::Pharmacy => "pharmacy",
            Self::Lab => "lab",
            Self::Admin => "admin",
            Self::Other => "other",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-role broadcast scopes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RoleGroup {
    Doctors,
    Reception,
    Pharmacy,
    Lab,
}

impl fmt::Display for RoleGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Doctors => "doctors",
            Self::Reception => "reception",
            Self::Pharmacy => "pharmacy",
            Self::Lab => "lab",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_groups() {
        assert_eq!(Role::Doctor.group(), Some(RoleGroup::Doctors));
        assert_eq!(Role::Lab.group(), Some(RoleGroup::Lab));
        assert_eq!(Role::Admin.group(), None);
    }

    #[test]
    fn test_unknown_role_deserializes_as_other() {
        let role: Role = serde_json::from_str("\"superadmin\"").unwrap();
        assert_eq!(role, Role::Other);
        let role: Role = serde_json::from_str("\"reception\"").unwrap();
        assert_eq!(role, Role::Reception);
    }

    #[test]
    fn test_tenant_parse() {
        assert_eq!(TenantId::parse(" h1 ").unwrap().as_str(), "h1");
        assert!(TenantId::parse("   ").is_err());
    }
}
