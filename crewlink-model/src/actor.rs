use std::fmt::{self, Display};
use std::str::FromStr;

use crate::error::ModelError;
use crate::ids::UserId;

/// Marketplace role of an authenticated account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "SCREAMING_SNAKE_CASE"))]
pub enum ActorRole {
    Customer,
    Contractor,
}

impl ActorRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActorRole::Customer => "CUSTOMER",
            ActorRole::Contractor => "CONTRACTOR",
        }
    }
}

impl Display for ActorRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ActorRole {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "CUSTOMER" | "USER" => Ok(ActorRole::Customer),
            "CONTRACTOR" => Ok(ActorRole::Contractor),
            other => Err(ModelError::UnknownVariant {
                kind: "actor role",
                value: other.to_string(),
            }),
        }
    }
}

/// An authenticated caller, as resolved by the session layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Actor {
    pub id: UserId,
    pub role: ActorRole,
}

impl Actor {
    pub fn customer(id: UserId) -> Self {
        Self {
            id,
            role: ActorRole::Customer,
        }
    }

    pub fn contractor(id: UserId) -> Self {
        Self {
            id,
            role: ActorRole::Contractor,
        }
    }

    pub fn is_customer(&self) -> bool {
        self.role == ActorRole::Customer
    }

    pub fn is_contractor(&self) -> bool {
        self.role == ActorRole::Contractor
    }
}
