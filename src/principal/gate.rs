//! Capability gate: declarative requirement expressions evaluated against a
//! resolved capability set before protected operations run.

use crate::errors::CadreError;
use crate::principal::{CapabilitySet, EntityAction, Need};

/// One node of a requirement expression. A plain `Need` must be present in
/// the capability set; `AnyOf` is a group satisfied by any one of its
/// alternatives.
#[derive(Debug, Clone)]
pub enum Requirement {
    Need(Need),
    AnyOf(Vec<Requirement>),
}

impl Requirement {
    fn satisfied_by(&self, caps: &CapabilitySet) -> bool {
        match self {
            Requirement::Need(need) => caps.contains(need),
            // A nested group is an "optional" evaluation: any member passing
            // satisfies the group.
            Requirement::AnyOf(group) => check(caps, group, true),
        }
    }
}

/// Evaluate a list of requirements. Success needs at least one satisfied
/// requirement, and either all of them satisfied or `optional` set. This is
/// the uniform rule behind "role A AND (role B OR role C)" style gates.
pub fn check(caps: &CapabilitySet, requirements: &[Requirement], optional: bool) -> bool {
    let satisfied = requirements
        .iter()
        .filter(|req| req.satisfied_by(caps))
        .count();

    satisfied > 0 && (satisfied == requirements.len() || optional)
}

/// Gate a protected operation: pass, or fail with a generic authorization
/// error that does not reveal which capability was missing.
pub fn require(caps: &CapabilitySet, requirements: &[Requirement]) -> Result<(), CadreError> {
    if check(caps, requirements, false) {
        Ok(())
    } else {
        Err(CadreError::Authorization)
    }
}

// Constructors, so call sites read like the rule they enforce.

pub fn role(name: &str) -> Requirement {
    Requirement::Need(Need::Role(name.to_string()))
}

pub fn user(user_id: i64) -> Requirement {
    Requirement::Need(Need::User(user_id))
}

pub fn entity(name: &str, action: EntityAction) -> Requirement {
    Requirement::Need(Need::Entity {
        name: name.to_string(),
        action,
    })
}

pub fn organization(name: &str) -> Requirement {
    Requirement::Need(Need::Organization(name.to_string()))
}

pub fn any_of(group: Vec<Requirement>) -> Requirement {
    Requirement::AnyOf(group)
}
