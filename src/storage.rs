//! Repository functions over the backing store. Each function is a thin
//! single-table query; multi-step writes take a transaction from the caller
//! or open their own.

use crate::credentials::{self, PasswordPolicy};
use crate::entities;
use crate::errors::CadreError;
use crate::settings::Database as DbCfg;
use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, Database, DatabaseConnection, EntityTrait,
    NotSet, PaginatorTrait, QueryFilter, QueryOrder, QuerySelect, Set, TransactionTrait,
};

pub async fn init(cfg: &DbCfg) -> Result<DatabaseConnection, CadreError> {
    let db = Database::connect(&cfg.url).await?;
    Ok(db)
}

// User functions

#[derive(Debug, Clone, Default)]
pub struct NewUser {
    pub username: String,
    pub password: String,
    pub email: Option<String>,
    pub first_name: String,
    pub last_name: String,
    pub phone: Option<String>,
}

/// Usernames and emails are stored lowercased so the case-insensitive login
/// lookup holds no matter who inserted the row.
pub async fn create_user<C: ConnectionTrait>(
    db: &C,
    policy: &PasswordPolicy,
    input: NewUser,
) -> Result<entities::user::Model, CadreError> {
    use entities::user::Column;

    let username = input.username.to_lowercase();
    let email = input.email.map(|e| e.to_lowercase());

    if entities::User::find()
        .filter(Column::Username.eq(username.clone()))
        .count(db)
        .await?
        > 0
    {
        return Err(CadreError::Validation(format!(
            "Username '{username}' is taken"
        )));
    }
    if let Some(email) = &email {
        if entities::User::find()
            .filter(Column::Email.eq(email.clone()))
            .count(db)
            .await?
            > 0
        {
            return Err(CadreError::Validation(format!(
                "Email '{email}' is already registered"
            )));
        }
    }

    let password_hash = credentials::hash_password(policy, &input.password)?;

    let user = entities::user::ActiveModel {
        id: NotSet,
        username: Set(username),
        password_hash: Set(password_hash),
        email: Set(email),
        first_name: Set(input.first_name),
        last_name: Set(input.last_name),
        phone: Set(input.phone),
        photo_url: Set(None),
        active: Set(1),
        created_at: Set(Utc::now().timestamp()),
    };

    Ok(user.insert(db).await?)
}

pub async fn get_user<C: ConnectionTrait>(
    db: &C,
    user_id: i64,
) -> Result<Option<entities::user::Model>, CadreError> {
    Ok(entities::User::find_by_id(user_id).one(db).await?)
}

/// Login lookup: matches username or email, case-insensitively.
pub async fn get_user_by_login<C: ConnectionTrait>(
    db: &C,
    login: &str,
) -> Result<Option<entities::user::Model>, CadreError> {
    use entities::user::Column;

    let login = login.to_lowercase();
    let user = entities::User::find()
        .filter(
            Column::Username
                .eq(login.clone())
                .or(Column::Email.eq(login)),
        )
        .one(db)
        .await?;
    Ok(user)
}

pub async fn list_users<C: ConnectionTrait>(
    db: &C,
    active: bool,
) -> Result<Vec<entities::user::Model>, CadreError> {
    use entities::user::Column;

    Ok(entities::User::find()
        .filter(Column::Active.eq(if active { 1 } else { 0 }))
        .order_by_asc(Column::Id)
        .all(db)
        .await?)
}

/// Explicit password setter: validates against the policy, then writes the
/// new hash. Replaces any implicit attribute interception.
pub async fn set_user_password<C: ConnectionTrait>(
    db: &C,
    policy: &PasswordPolicy,
    user_id: i64,
    new_password: &str,
) -> Result<(), CadreError> {
    let user = get_user(db, user_id)
        .await?
        .ok_or_else(|| CadreError::NotFound("User".to_string()))?;

    let hash = credentials::hash_password(policy, new_password)?;
    let mut active: entities::user::ActiveModel = user.into();
    active.password_hash = Set(hash);
    active.update(db).await?;
    Ok(())
}

pub async fn set_user_photo<C: ConnectionTrait>(
    db: &C,
    user_id: i64,
    photo_url: Option<String>,
) -> Result<(), CadreError> {
    let user = get_user(db, user_id)
        .await?
        .ok_or_else(|| CadreError::NotFound("User".to_string()))?;

    let mut active: entities::user::ActiveModel = user.into();
    active.photo_url = Set(photo_url);
    active.update(db).await?;
    Ok(())
}

#[derive(Debug, Clone, Default)]
pub struct UserUpdate {
    pub email: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub phone: Option<String>,
}

pub async fn update_user<C: ConnectionTrait>(
    db: &C,
    user_id: i64,
    update: UserUpdate,
) -> Result<entities::user::Model, CadreError> {
    use entities::user::Column;

    let user = get_user(db, user_id)
        .await?
        .ok_or_else(|| CadreError::NotFound("User".to_string()))?;

    let mut active: entities::user::ActiveModel = user.into();
    if let Some(email) = update.email {
        let email = email.to_lowercase();
        if entities::User::find()
            .filter(Column::Email.eq(email.clone()))
            .filter(Column::Id.ne(user_id))
            .count(db)
            .await?
            > 0
        {
            return Err(CadreError::Validation(format!(
                "Email '{email}' is already registered"
            )));
        }
        active.email = Set(Some(email));
    }
    if let Some(first_name) = update.first_name {
        active.first_name = Set(first_name);
    }
    if let Some(last_name) = update.last_name {
        active.last_name = Set(last_name);
    }
    if let Some(phone) = update.phone {
        active.phone = Set(Some(phone));
    }
    Ok(active.update(db).await?)
}

/// Soft-deactivation: most flows disable rather than delete.
pub async fn set_user_active<C: ConnectionTrait>(
    db: &C,
    user_id: i64,
    active: bool,
) -> Result<(), CadreError> {
    let user = get_user(db, user_id)
        .await?
        .ok_or_else(|| CadreError::NotFound("User".to_string()))?;

    let mut model: entities::user::ActiveModel = user.into();
    model.active = Set(if active { 1 } else { 0 });
    model.update(db).await?;
    Ok(())
}

/// Hard delete for explicit account removal. Dependent rows go first so the
/// whole removal commits or none of it does.
pub async fn delete_user(db: &DatabaseConnection, user_id: i64) -> Result<(), CadreError> {
    let txn = db.begin().await?;

    entities::Session::delete_many()
        .filter(entities::session::Column::UserId.eq(user_id))
        .exec(&txn)
        .await?;
    entities::UserRole::delete_many()
        .filter(entities::user_role::Column::UserId.eq(user_id))
        .exec(&txn)
        .await?;
    entities::UserEntityPermission::delete_many()
        .filter(entities::user_entity_permission::Column::UserId.eq(user_id))
        .exec(&txn)
        .await?;
    entities::Affiliation::delete_many()
        .filter(entities::affiliation::Column::UserId.eq(user_id))
        .exec(&txn)
        .await?;
    entities::User::delete_by_id(user_id).exec(&txn).await?;

    txn.commit().await?;
    Ok(())
}

// Role functions

pub async fn create_role<C: ConnectionTrait>(
    db: &C,
    name: &str,
    description: &str,
) -> Result<entities::role::Model, CadreError> {
    use entities::role::Column;

    // Role names are unique
    if entities::Role::find()
        .filter(Column::Name.eq(name))
        .count(db)
        .await?
        > 0
    {
        return Err(CadreError::Validation(format!(
            "Role '{name}' already exists"
        )));
    }

    let role = entities::role::ActiveModel {
        id: NotSet,
        name: Set(name.to_string()),
        description: Set(description.to_string()),
    };
    Ok(role.insert(db).await?)
}

pub async fn get_role_by_name<C: ConnectionTrait>(
    db: &C,
    name: &str,
) -> Result<Option<entities::role::Model>, CadreError> {
    Ok(entities::Role::find()
        .filter(entities::role::Column::Name.eq(name))
        .one(db)
        .await?)
}

pub async fn list_roles<C: ConnectionTrait>(
    db: &C,
) -> Result<Vec<entities::role::Model>, CadreError> {
    Ok(entities::Role::find()
        .order_by_asc(entities::role::Column::Id)
        .all(db)
        .await?)
}

pub async fn add_user_role<C: ConnectionTrait>(
    db: &C,
    user_id: i64,
    role_id: i64,
) -> Result<(), CadreError> {
    use entities::user_role::Column;

    if entities::Role::find_by_id(role_id).one(db).await?.is_none() {
        return Err(CadreError::NotFound("Role".to_string()));
    }
    if get_user(db, user_id).await?.is_none() {
        return Err(CadreError::NotFound("User".to_string()));
    }
    if entities::UserRole::find()
        .filter(Column::UserId.eq(user_id))
        .filter(Column::RoleId.eq(role_id))
        .count(db)
        .await?
        > 0
    {
        return Err(CadreError::Validation(
            "User already holds this role".to_string(),
        ));
    }

    let membership = entities::user_role::ActiveModel {
        id: NotSet,
        user_id: Set(user_id),
        role_id: Set(role_id),
    };
    membership.insert(db).await?;
    Ok(())
}

pub async fn remove_user_role<C: ConnectionTrait>(
    db: &C,
    user_id: i64,
    role_id: i64,
) -> Result<(), CadreError> {
    use entities::user_role::Column;

    entities::UserRole::delete_many()
        .filter(Column::UserId.eq(user_id))
        .filter(Column::RoleId.eq(role_id))
        .exec(db)
        .await?;
    Ok(())
}

/// Roles held by a user, resolved through the membership junction.
pub async fn get_user_roles<C: ConnectionTrait>(
    db: &C,
    user_id: i64,
) -> Result<Vec<entities::role::Model>, CadreError> {
    let role_ids: Vec<i64> = entities::UserRole::find()
        .filter(entities::user_role::Column::UserId.eq(user_id))
        .all(db)
        .await?
        .into_iter()
        .map(|m| m.role_id)
        .collect();

    if role_ids.is_empty() {
        return Ok(Vec::new());
    }

    Ok(entities::Role::find()
        .filter(entities::role::Column::Id.is_in(role_ids))
        .order_by_asc(entities::role::Column::Id)
        .all(db)
        .await?)
}

// Entity registry functions

pub async fn create_entity<C: ConnectionTrait>(
    db: &C,
    name: &str,
) -> Result<entities::entity::Model, CadreError> {
    use entities::entity::Column;

    if entities::EntityDef::find()
        .filter(Column::Name.eq(name))
        .count(db)
        .await?
        > 0
    {
        return Err(CadreError::Validation(format!(
            "Entity '{name}' already registered"
        )));
    }

    let entity = entities::entity::ActiveModel {
        id: NotSet,
        name: Set(name.to_string()),
    };
    Ok(entity.insert(db).await?)
}

pub async fn get_entity_by_name<C: ConnectionTrait>(
    db: &C,
    name: &str,
) -> Result<Option<entities::entity::Model>, CadreError> {
    Ok(entities::EntityDef::find()
        .filter(entities::entity::Column::Name.eq(name))
        .one(db)
        .await?)
}

pub async fn list_entities<C: ConnectionTrait>(
    db: &C,
) -> Result<Vec<entities::entity::Model>, CadreError> {
    Ok(entities::EntityDef::find()
        .order_by_asc(entities::entity::Column::Id)
        .all(db)
        .await?)
}

// Permission grant functions

pub async fn grant_user_permission<C: ConnectionTrait>(
    db: &C,
    user_id: i64,
    entity_id: i64,
    can_create: bool,
    can_edit: bool,
) -> Result<entities::user_entity_permission::Model, CadreError> {
    use entities::user_entity_permission::Column;

    if entities::EntityDef::find_by_id(entity_id)
        .one(db)
        .await?
        .is_none()
    {
        return Err(CadreError::NotFound("Entity".to_string()));
    }
    // Duplicate (user, entity) rows are an error, not silently merged
    if entities::UserEntityPermission::find()
        .filter(Column::UserId.eq(user_id))
        .filter(Column::EntityId.eq(entity_id))
        .count(db)
        .await?
        > 0
    {
        return Err(CadreError::Validation(
            "A direct grant for this user and entity already exists".to_string(),
        ));
    }

    let grant = entities::user_entity_permission::ActiveModel {
        id: NotSet,
        user_id: Set(user_id),
        entity_id: Set(entity_id),
        can_create: Set(if can_create { 1 } else { 0 }),
        can_edit: Set(if can_edit { 1 } else { 0 }),
    };
    Ok(grant.insert(db).await?)
}

pub async fn grant_role_permission<C: ConnectionTrait>(
    db: &C,
    role_id: i64,
    entity_id: i64,
    can_create: bool,
    can_edit: bool,
) -> Result<entities::role_entity_permission::Model, CadreError> {
    use entities::role_entity_permission::Column;

    if entities::EntityDef::find_by_id(entity_id)
        .one(db)
        .await?
        .is_none()
    {
        return Err(CadreError::NotFound("Entity".to_string()));
    }
    if entities::RoleEntityPermission::find()
        .filter(Column::RoleId.eq(role_id))
        .filter(Column::EntityId.eq(entity_id))
        .count(db)
        .await?
        > 0
    {
        return Err(CadreError::Validation(
            "A grant for this role and entity already exists".to_string(),
        ));
    }

    let grant = entities::role_entity_permission::ActiveModel {
        id: NotSet,
        role_id: Set(role_id),
        entity_id: Set(entity_id),
        can_create: Set(if can_create { 1 } else { 0 }),
        can_edit: Set(if can_edit { 1 } else { 0 }),
    };
    Ok(grant.insert(db).await?)
}

// Organization functions

pub async fn create_organization<C: ConnectionTrait>(
    db: &C,
    name: &str,
    email: Option<String>,
    phone: Option<String>,
    contact_user_id: i64,
) -> Result<entities::organization::Model, CadreError> {
    use entities::organization::Column;

    if entities::Organization::find()
        .filter(Column::Name.eq(name.to_lowercase()))
        .count(db)
        .await?
        > 0
    {
        return Err(CadreError::Validation(
            "Organization already registered, kindly contact the responsible person".to_string(),
        ));
    }

    let org = entities::organization::ActiveModel {
        id: NotSet,
        name: Set(name.to_lowercase()),
        email: Set(email),
        phone: Set(phone),
        contact_user_id: Set(contact_user_id),
        created_at: Set(Utc::now().timestamp()),
    };
    Ok(org.insert(db).await?)
}

pub async fn get_organization<C: ConnectionTrait>(
    db: &C,
    org_id: i64,
) -> Result<Option<entities::organization::Model>, CadreError> {
    Ok(entities::Organization::find_by_id(org_id).one(db).await?)
}

pub async fn create_department<C: ConnectionTrait>(
    db: &C,
    org_id: i64,
    name: &str,
) -> Result<entities::department::Model, CadreError> {
    let department = entities::department::ActiveModel {
        id: NotSet,
        org_id: Set(org_id),
        name: Set(name.to_string()),
    };
    Ok(department.insert(db).await?)
}

pub async fn list_departments<C: ConnectionTrait>(
    db: &C,
    org_id: i64,
) -> Result<Vec<entities::department::Model>, CadreError> {
    use entities::department::Column;

    Ok(entities::Department::find()
        .filter(Column::OrgId.eq(org_id))
        .order_by_asc(Column::Id)
        .all(db)
        .await?)
}

pub async fn create_affiliation<C: ConnectionTrait>(
    db: &C,
    user_id: i64,
    org_id: i64,
    department_id: Option<i64>,
    position: entities::affiliation::Position,
) -> Result<entities::affiliation::Model, CadreError> {
    let affiliation = entities::affiliation::ActiveModel {
        id: NotSet,
        user_id: Set(user_id),
        org_id: Set(org_id),
        department_id: Set(department_id),
        position: Set(position.as_str().to_string()),
    };
    Ok(affiliation.insert(db).await?)
}

pub async fn get_affiliation<C: ConnectionTrait>(
    db: &C,
    user_id: i64,
) -> Result<Option<entities::affiliation::Model>, CadreError> {
    Ok(entities::Affiliation::find()
        .filter(entities::affiliation::Column::UserId.eq(user_id))
        .one(db)
        .await?)
}

// Session functions

#[derive(Debug, Clone, Default)]
pub struct ClientMeta {
    pub ip_address: Option<String>,
    pub platform: Option<String>,
    pub browser: Option<String>,
}

pub async fn create_session<C: ConnectionTrait>(
    db: &C,
    user_id: i64,
    jti: &str,
    meta: ClientMeta,
) -> Result<entities::session::Model, CadreError> {
    if get_user(db, user_id).await?.is_none() {
        return Err(CadreError::NotFound("User".to_string()));
    }

    let session = entities::session::ActiveModel {
        jti: Set(jti.to_string()),
        user_id: Set(user_id),
        created_at: Set(Utc::now().timestamp()),
        ip_address: Set(meta.ip_address),
        platform: Set(meta.platform),
        browser: Set(meta.browser),
        active: Set(1),
    };
    Ok(session.insert(db).await?)
}

/// Lookup by token id scoped to its owner. Absence is not an error here;
/// callers decide whether that fails authentication.
pub async fn get_session<C: ConnectionTrait>(
    db: &C,
    jti: &str,
    user_id: i64,
) -> Result<Option<entities::session::Model>, CadreError> {
    use entities::session::Column;

    Ok(entities::Session::find()
        .filter(Column::Jti.eq(jti))
        .filter(Column::UserId.eq(user_id))
        .one(db)
        .await?)
}

/// Sessions for a user ordered by creation ascending. Restartable per call;
/// no cursor state is retained.
pub async fn list_sessions<C: ConnectionTrait>(
    db: &C,
    user_id: i64,
    offset: u64,
    limit: u64,
) -> Result<Vec<entities::session::Model>, CadreError> {
    use entities::session::Column;

    Ok(entities::Session::find()
        .filter(Column::UserId.eq(user_id))
        .order_by_asc(Column::CreatedAt)
        .order_by_asc(Column::Jti)
        .offset(offset)
        .limit(limit)
        .all(db)
        .await?)
}

/// Mark a session inactive. Revoking twice is a no-op, not an error.
pub async fn revoke_session<C: ConnectionTrait>(db: &C, jti: &str) -> Result<(), CadreError> {
    use entities::session::Column;

    if let Some(session) = entities::Session::find()
        .filter(Column::Jti.eq(jti))
        .one(db)
        .await?
    {
        if session.active != 0 {
            let mut active: entities::session::ActiveModel = session.into();
            active.active = Set(0);
            active.update(db).await?;
        }
    }
    Ok(())
}

/// Bulk "log out everywhere else": revoke every active session for the user
/// except the one matching `keep_jti`. Runs in one transaction and returns
/// the sessions that were revoked.
pub async fn revoke_all_except(
    db: &DatabaseConnection,
    user_id: i64,
    keep_jti: &str,
) -> Result<Vec<entities::session::Model>, CadreError> {
    use entities::session::Column;

    let txn = db.begin().await?;

    let victims = entities::Session::find()
        .filter(Column::UserId.eq(user_id))
        .filter(Column::Active.eq(1))
        .filter(Column::Jti.ne(keep_jti))
        .order_by_asc(Column::CreatedAt)
        .all(&txn)
        .await?;

    let mut revoked = Vec::with_capacity(victims.len());
    for session in victims {
        let mut active: entities::session::ActiveModel = session.clone().into();
        active.active = Set(0);
        let updated = active.update(&txn).await?;
        revoked.push(updated);
    }

    txn.commit().await?;
    Ok(revoked)
}
