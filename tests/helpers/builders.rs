use cadre::entities;
use cadre::storage;
use sea_orm::DatabaseConnection;

use super::db::test_policy;

/// Builder for creating test users
pub struct UserBuilder {
    username: String,
    password: String,
    email: Option<String>,
    active: bool,
}

impl UserBuilder {
    pub fn new(username: &str) -> Self {
        Self {
            username: username.to_string(),
            password: "password123".to_string(),
            email: None,
            active: true,
        }
    }

    pub fn with_password(mut self, password: &str) -> Self {
        self.password = password.to_string();
        self
    }

    pub fn with_email(mut self, email: &str) -> Self {
        self.email = Some(email.to_string());
        self
    }

    pub fn disabled(mut self) -> Self {
        self.active = false;
        self
    }

    pub async fn create(self, db: &DatabaseConnection) -> entities::user::Model {
        let user = storage::create_user(
            db,
            &test_policy(),
            storage::NewUser {
                username: self.username,
                password: self.password,
                email: self.email,
                first_name: "Test".to_string(),
                last_name: "User".to_string(),
                phone: None,
            },
        )
        .await
        .expect("Failed to create test user");

        if !self.active {
            storage::set_user_active(db, user.id, false)
                .await
                .expect("Failed to deactivate test user");
            storage::get_user(db, user.id)
                .await
                .expect("Failed to reload test user")
                .expect("Test user not found")
        } else {
            user
        }
    }
}

/// Builder for creating test roles
pub struct RoleBuilder {
    name: String,
    description: String,
}

impl RoleBuilder {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            description: format!("Test role {name}"),
        }
    }

    pub fn with_description(mut self, description: &str) -> Self {
        self.description = description.to_string();
        self
    }

    pub async fn create(self, db: &DatabaseConnection) -> entities::role::Model {
        storage::create_role(db, &self.name, &self.description)
            .await
            .expect("Failed to create test role")
    }
}

/// Assign a role to a user, creating the role if it does not exist yet.
pub async fn assign_role(db: &DatabaseConnection, user_id: i64, role_name: &str) -> i64 {
    let role = match storage::get_role_by_name(db, role_name)
        .await
        .expect("Failed to look up role")
    {
        Some(role) => role,
        None => RoleBuilder::new(role_name).create(db).await,
    };
    storage::add_user_role(db, user_id, role.id)
        .await
        .expect("Failed to assign role");
    role.id
}

/// Register an entity name, returning its id (idempotent across tests).
pub async fn ensure_entity(db: &DatabaseConnection, name: &str) -> i64 {
    match storage::get_entity_by_name(db, name)
        .await
        .expect("Failed to look up entity")
    {
        Some(entity) => entity.id,
        None => {
            storage::create_entity(db, name)
                .await
                .expect("Failed to create entity")
                .id
        }
    }
}

pub async fn grant_to_user(
    db: &DatabaseConnection,
    user_id: i64,
    entity: &str,
    can_create: bool,
    can_edit: bool,
) {
    let entity_id = ensure_entity(db, entity).await;
    storage::grant_user_permission(db, user_id, entity_id, can_create, can_edit)
        .await
        .expect("Failed to grant user permission");
}

pub async fn grant_to_role(
    db: &DatabaseConnection,
    role_id: i64,
    entity: &str,
    can_create: bool,
    can_edit: bool,
) {
    let entity_id = ensure_entity(db, entity).await;
    storage::grant_role_permission(db, role_id, entity_id, can_create, can_edit)
        .await
        .expect("Failed to grant role permission");
}
