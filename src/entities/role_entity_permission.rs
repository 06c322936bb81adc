use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Role-scoped grant: create/edit flags every holder of the role inherits.
/// At most one row per (role, entity) pair.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "role_entity_permissions")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub role_id: i64,
    pub entity_id: i64,
    pub can_create: i64,
    pub can_edit: i64,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
