use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// One row per login event, keyed by the token's embedded jti.
/// Rows are marked inactive on logout/revocation, never deleted.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "sessions")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub jti: String,
    pub user_id: i64,
    pub created_at: i64,
    pub ip_address: Option<String>,
    pub platform: Option<String>,
    pub browser: Option<String>,
    pub active: i64,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
