//! Verified caller identity.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::UserId;

/// Role of an authenticated caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    Customer,
    SalonOwner,
    Admin,
}

impl Role {
    /// Returns the role name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Customer => "CUSTOMER",
            Role::SalonOwner => "SALON_OWNER",
            Role::Admin => "ADMIN",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// An unrecognised role name.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown role: {0}")]
pub struct ParseRoleError(pub String);

impl std::str::FromStr for Role {
    type Err = ParseRoleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "CUSTOMER" => Ok(Role::Customer),
            "SALON_OWNER" => Ok(Role::SalonOwner),
            "ADMIN" => Ok(Role::Admin),
            _ => Err(ParseRoleError(s.to_string())),
        }
    }
}

/// The authenticated identity a request carries.
///
/// Constructed once where requests enter the system and passed explicitly to
/// every booking operation. Nothing downstream re-reads raw headers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub user_id: UserId,
    pub role: Role,
}

impl Identity {
    pub fn new(user_id: UserId, role: Role) -> Self {
        Self { user_id, role }
    }

    pub fn customer(user_id: UserId) -> Self {
        Self::new(user_id, Role::Customer)
    }

    /// Salon owners and admins may view and cancel bookings they do not own.
    pub fn can_manage_bookings(&self) -> bool {
        matches!(self.role, Role::SalonOwner | Role::Admin)
    }

    /// Returns true if this identity may act on a booking owned by `owner`.
    pub fn may_act_for(&self, owner: UserId) -> bool {
        self.user_id == owner || self.can_manage_bookings()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_parsing() {
        assert_eq!("CUSTOMER".parse::<Role>().unwrap(), Role::Customer);
        assert_eq!("salon_owner".parse::<Role>().unwrap(), Role::SalonOwner);
        assert_eq!(" ADMIN ".parse::<Role>().unwrap(), Role::Admin);
        assert!("STAFF".parse::<Role>().is_err());
    }

    #[test]
    fn test_role_display_roundtrips() {
        for role in [Role::Customer, Role::SalonOwner, Role::Admin] {
            assert_eq!(role.to_string().parse::<Role>().unwrap(), role);
        }
    }

    #[test]
    fn test_customer_may_only_act_for_self() {
        let me = UserId::new();
        let identity = Identity::customer(me);
        assert!(identity.may_act_for(me));
        assert!(!identity.may_act_for(UserId::new()));
        assert!(!identity.can_manage_bookings());
    }

    #[test]
    fn test_owner_may_act_for_anyone() {
        let identity = Identity::new(UserId::new(), Role::SalonOwner);
        assert!(identity.may_act_for(UserId::new()));
    }
}
