//! Capability resolution and gating. A request's identity is reduced to an
//! immutable set of Needs, rebuilt from store state on every request so
//! revocations take effect immediately.

pub mod gate;
pub mod resolver;

use std::collections::HashSet;
use std::str::FromStr;

/// Action half of an entity permission. Closed set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityAction {
    Create,
    Edit,
}

impl EntityAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityAction::Create => "create",
            EntityAction::Edit => "edit",
        }
    }
}

impl FromStr for EntityAction {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "create" => Ok(EntityAction::Create),
            "edit" => Ok(EntityAction::Edit),
            _ => Err(()),
        }
    }
}

impl std::fmt::Display for EntityAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One granted permission facet.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Need {
    /// The identity itself.
    User(i64),
    /// Membership of a named role.
    Role(String),
    /// A create/edit grant on a named entity.
    Entity { name: String, action: EntityAction },
    /// Affiliation with a named organization.
    Organization(String),
}

/// Projection of one permission row, direct or role-derived. Records are
/// unioned as whole rows across the two sources; flags are never OR-merged
/// between rows for the same entity.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PermissionRecord {
    pub entity_name: String,
    pub can_create: bool,
    pub can_edit: bool,
}

/// The full set of Needs granted to an identity for one request.
/// Immutable once resolved; never cached across requests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapabilitySet {
    needs: HashSet<Need>,
}

impl CapabilitySet {
    pub fn from_needs(needs: HashSet<Need>) -> Self {
        Self { needs }
    }

    pub fn contains(&self, need: &Need) -> bool {
        self.needs.contains(need)
    }

    pub fn is_user(&self, user_id: i64) -> bool {
        self.needs.contains(&Need::User(user_id))
    }

    pub fn has_role(&self, role: &str) -> bool {
        self.needs.contains(&Need::Role(role.to_string()))
    }

    pub fn can(&self, entity: &str, action: EntityAction) -> bool {
        self.needs.contains(&Need::Entity {
            name: entity.to_string(),
            action,
        })
    }

    pub fn in_organization(&self, org: &str) -> bool {
        self.needs.contains(&Need::Organization(org.to_string()))
    }

    pub fn iter(&self) -> impl Iterator<Item = &Need> {
        self.needs.iter()
    }

    pub fn len(&self) -> usize {
        self.needs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.needs.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entity_action_parse() {
        assert_eq!("create".parse::<EntityAction>(), Ok(EntityAction::Create));
        assert_eq!("edit".parse::<EntityAction>(), Ok(EntityAction::Edit));
        assert!("delete".parse::<EntityAction>().is_err());
    }

    #[test]
    fn test_capability_set_queries() {
        let mut needs = HashSet::new();
        needs.insert(Need::User(7));
        needs.insert(Need::Role("editor".to_string()));
        needs.insert(Need::Entity {
            name: "invoice".to_string(),
            action: EntityAction::Edit,
        });
        needs.insert(Need::Organization("acme".to_string()));
        let caps = CapabilitySet::from_needs(needs);

        assert!(caps.is_user(7));
        assert!(!caps.is_user(8));
        assert!(caps.has_role("editor"));
        assert!(!caps.has_role("admin"));
        assert!(caps.can("invoice", EntityAction::Edit));
        assert!(!caps.can("invoice", EntityAction::Create));
        assert!(caps.in_organization("acme"));
        assert_eq!(caps.len(), 4);
    }

    #[test]
    fn test_permission_records_union_as_rows() {
        // Two rows for the same entity with different flags stay distinct
        let mut set = HashSet::new();
        set.insert(PermissionRecord {
            entity_name: "invoice".to_string(),
            can_create: true,
            can_edit: false,
        });
        set.insert(PermissionRecord {
            entity_name: "invoice".to_string(),
            can_create: false,
            can_edit: true,
        });
        assert_eq!(set.len(), 2);

        // Identical rows collapse
        set.insert(PermissionRecord {
            entity_name: "invoice".to_string(),
            can_create: true,
            can_edit: false,
        });
        assert_eq!(set.len(), 2);
    }
}
