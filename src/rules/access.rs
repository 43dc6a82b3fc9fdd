//! Static role-based access matrix
//!
//! role → entity → permitted actions. Built once, read-only afterwards.
//! A missing role, entity or action is a denial, never an error.
//! Row-level scoping (a user touching only their own record) is not
//! enforced here.

use crate::core::types::{Action, Command, Entity};
use std::collections::{HashMap, HashSet};

pub const ROLE_ADMIN: &str = "admin";
pub const ROLE_USER: &str = "user";
pub const ROLE_GUEST: &str = "guest";

type EntityPermissions = HashMap<Entity, HashSet<Action>>;

/// Role-based access policy evaluator
#[derive(Debug, Clone)]
pub struct AccessPolicy {
    matrix: HashMap<String, EntityPermissions>,
}

impl AccessPolicy {
    /// The built-in three-role matrix
    pub fn builtin() -> Self {
        use Action::*;
        use Entity::*;

        let all = [Create, Read, Update, Delete];

        Self::empty()
            .grant(ROLE_ADMIN, User, &all)
            .grant(ROLE_ADMIN, Product, &all)
            .grant(ROLE_ADMIN, Order, &all)
            .grant(ROLE_USER, User, &[Read, Update])
            .grant(ROLE_USER, Product, &[Read])
            .grant(ROLE_USER, Order, &[Create, Read])
            .grant(ROLE_GUEST, Product, &[Read])
    }

    /// A policy that denies everything
    pub fn empty() -> Self {
        Self {
            matrix: HashMap::new(),
        }
    }

    fn grant(mut self, role: &str, entity: Entity, actions: &[Action]) -> Self {
        self.matrix
            .entry(role.to_string())
            .or_default()
            .entry(entity)
            .or_default()
            .extend(actions.iter().copied());
        self
    }

    /// Whether the command's bound role may perform its action on its entity
    pub fn check_access(&self, command: &Command) -> bool {
        self.allows(&command.user_role, command.entity, command.action)
    }

    pub fn allows(&self, role: &str, entity: Entity, action: Action) -> bool {
        self.allowed_actions(role, entity)
            .is_some_and(|actions| actions.contains(&action))
    }

    pub fn allowed_actions(&self, role: &str, entity: Entity) -> Option<&HashSet<Action>> {
        self.matrix.get(role)?.get(&entity)
    }
}

impl Default for AccessPolicy {
    fn default() -> Self {
        Self::builtin()
    }
}
