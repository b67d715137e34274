//! Trusted actor identity supplied by the external auth layer.

use common::ActorId;
use serde::{Deserialize, Serialize};

/// Role of the acting identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// A purchasing customer; may only touch their own orders.
    Customer,

    /// Back-office staff; may touch any order.
    Staff,
}

/// The identity behind a request.
///
/// Authentication happens outside the core; this input is trusted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    /// The actor's identifier.
    pub id: ActorId,

    /// The actor's role.
    pub role: Role,
}

impl Actor {
    /// Creates a customer actor.
    pub fn customer(id: ActorId) -> Self {
        Self {
            id,
            role: Role::Customer,
        }
    }

    /// Creates a staff actor.
    pub fn staff(id: ActorId) -> Self {
        Self {
            id,
            role: Role::Staff,
        }
    }

    /// Returns true if this actor may act on an order owned by `owner_id`.
    pub fn can_access(&self, owner_id: ActorId) -> bool {
        self.role == Role::Staff || self.id == owner_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_customer_can_only_access_own_orders() {
        let owner = ActorId::new();
        let actor = Actor::customer(owner);
        assert!(actor.can_access(owner));
        assert!(!actor.can_access(ActorId::new()));
    }

    #[test]
    fn test_staff_can_access_any_order() {
        let actor = Actor::staff(ActorId::new());
        assert!(actor.can_access(ActorId::new()));
    }
}
