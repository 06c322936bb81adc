use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Links a user to an organization, an optional department, and a position.
/// One affiliation per user.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "affiliations")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    #[sea_orm(unique)]
    pub user_id: i64,
    pub org_id: i64,
    pub department_id: Option<i64>,
    pub position: String,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

/// Closed set of positions a user may hold within an organization.
/// Stored as the canonical uppercase string; input is validated on parse.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Position {
    Ceo,
    Manager,
    AssistantManager,
    Employee,
    Trainee,
}

impl Position {
    pub const ALL: [Position; 5] = [
        Position::Ceo,
        Position::Manager,
        Position::AssistantManager,
        Position::Employee,
        Position::Trainee,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Position::Ceo => "CEO",
            Position::Manager => "MANAGER",
            Position::AssistantManager => "ASSISTANT MANAGER",
            Position::Employee => "EMPLOYEE",
            Position::Trainee => "TRAINEE",
        }
    }
}

impl FromStr for Position {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Position::ALL
            .iter()
            .find(|p| p.as_str().eq_ignore_ascii_case(s.trim()))
            .copied()
            .ok_or(())
    }
}

impl std::fmt::Display for Position {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
