//! Permission resolver: computes the capability set for an identity from
//! current store state. Runs inside a single transaction so a concurrent
//! grant change is either fully visible or not at all.

use std::collections::{HashMap, HashSet};

use sea_orm::{ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait, QueryFilter,
    TransactionTrait};

use crate::entities;
use crate::errors::CadreError;
use crate::principal::{CapabilitySet, EntityAction, Need, PermissionRecord};

/// Resolve the capability set for `user`. Rebuilt fresh per request; no
/// caching, so a revoked role disappears on the very next call.
pub async fn resolve(
    db: &DatabaseConnection,
    user: &entities::user::Model,
) -> Result<CapabilitySet, CadreError> {
    let txn = db.begin().await?;
    let caps = resolve_in(&txn, user).await?;
    txn.commit().await?;
    Ok(caps)
}

async fn resolve_in<C: ConnectionTrait>(
    db: &C,
    user: &entities::user::Model,
) -> Result<CapabilitySet, CadreError> {
    let mut needs = HashSet::new();
    needs.insert(Need::User(user.id));

    // Role memberships
    let role_ids: Vec<i64> = entities::UserRole::find()
        .filter(entities::user_role::Column::UserId.eq(user.id))
        .all(db)
        .await?
        .into_iter()
        .map(|m| m.role_id)
        .collect();

    if !role_ids.is_empty() {
        let roles = entities::Role::find()
            .filter(entities::role::Column::Id.is_in(role_ids.clone()))
            .all(db)
            .await?;
        for role in roles {
            needs.insert(Need::Role(role.name));
        }
    }

    // Entity-id -> name map, loaded once for both grant sources
    let entity_names: HashMap<i64, String> = entities::EntityDef::find()
        .all(db)
        .await?
        .into_iter()
        .map(|e| (e.id, e.name))
        .collect();

    // Union of rows from the two grant sources. A row present in only one
    // source still contributes its true-valued actions; rows for the same
    // entity with different flags both survive.
    let mut records: HashSet<PermissionRecord> = HashSet::new();

    let direct = entities::UserEntityPermission::find()
        .filter(entities::user_entity_permission::Column::UserId.eq(user.id))
        .all(db)
        .await?;
    for grant in direct {
        if let Some(name) = entity_names.get(&grant.entity_id) {
            records.insert(PermissionRecord {
                entity_name: name.clone(),
                can_create: grant.can_create != 0,
                can_edit: grant.can_edit != 0,
            });
        }
    }

    if !role_ids.is_empty() {
        let inherited = entities::RoleEntityPermission::find()
            .filter(entities::role_entity_permission::Column::RoleId.is_in(role_ids))
            .all(db)
            .await?;
        for grant in inherited {
            if let Some(name) = entity_names.get(&grant.entity_id) {
                records.insert(PermissionRecord {
                    entity_name: name.clone(),
                    can_create: grant.can_create != 0,
                    can_edit: grant.can_edit != 0,
                });
            }
        }
    }

    for record in records {
        if record.can_create {
            needs.insert(Need::Entity {
                name: record.entity_name.clone(),
                action: EntityAction::Create,
            });
        }
        if record.can_edit {
            needs.insert(Need::Entity {
                name: record.entity_name,
                action: EntityAction::Edit,
            });
        }
    }

    // Organizational affiliation, if any. No affiliation is not an error.
    if let Some(affiliation) = entities::Affiliation::find()
        .filter(entities::affiliation::Column::UserId.eq(user.id))
        .one(db)
        .await?
    {
        if let Some(org) = entities::Organization::find_by_id(affiliation.org_id)
            .one(db)
            .await?
        {
            needs.insert(Need::Organization(org.name));
        }
    }

    Ok(CapabilitySet::from_needs(needs))
}
