//! Who is calling: the identity attached by the authentication layer.

use common::UserId;
use serde::{Deserialize, Serialize};

use crate::BookingError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    #[default]
    #[serde(alias = "user", alias = "cliente")]
    Customer,
    #[serde(alias = "administrador")]
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Customer => "customer",
            Role::Admin => "admin",
        }
    }
}

impl std::str::FromStr for Role {
    type Err = common::UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "customer" | "user" | "cliente" => Ok(Role::Customer),
            "admin" | "administrador" => Ok(Role::Admin),
            _ => Err(common::UnknownStatus {
                kind: "role",
                value: s.to_string(),
            }),
        }
    }
}

/// An authenticated caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Actor {
    pub user_id: UserId,
    pub role: Role,
}

impl Actor {
    pub fn customer(user_id: UserId) -> Self {
        Self {
            user_id,
            role: Role::Customer,
        }
    }

    pub fn admin(user_id: UserId) -> Self {
        Self {
            user_id,
            role: Role::Admin,
        }
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    /// Fails with `Forbidden` unless the actor is an admin.
    pub fn require_admin(&self) -> Result<(), BookingError> {
        if self.is_admin() {
            Ok(())
        } else {
            Err(BookingError::Forbidden(
                "administrator role required".to_string(),
            ))
        }
    }

    /// Owners see their own records; admins see everything.
    pub fn can_view(&self, owner: UserId) -> bool {
        self.is_admin() || self.user_id == owner
    }
}
