use std::fmt;

use serde::{Deserialize, Serialize};

pub const ROLE_CUSTOMER: &str = "customer";
pub const ROLE_GROOMER: &str = "groomer";
pub const ROLE_ADMIN: &str = "admin";

/// Actor role carried inside session tokens. Every account holds exactly one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Customer,
    Groomer,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Customer => ROLE_CUSTOMER,
            Role::Groomer => ROLE_GROOMER,
            Role::Admin => ROLE_ADMIN,
        }
    }

    pub fn parse(value: &str) -> Option<Role> {
        match value {
            ROLE_CUSTOMER => Some(Role::Customer),
            ROLE_GROOMER => Some(Role::Groomer),
            ROLE_ADMIN => Some(Role::Admin),
            _ => None,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_round_trips_known_roles() {
        for role in [Role::Customer, Role::Groomer, Role::Admin] {
            assert_eq!(Role::parse(role.as_str()), Some(role));
        }
    }

    #[test]
    fn parse_rejects_unknown_role() {
        assert_eq!(Role::parse("manager"), None);
        assert_eq!(Role::parse(""), None);
        assert_eq!(Role::parse("Admin"), None);
    }
}
