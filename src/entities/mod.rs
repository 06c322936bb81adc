pub mod affiliation;
pub mod department;
pub mod entity;
pub mod organization;
pub mod role;
pub mod role_entity_permission;
pub mod session;
pub mod user;
pub mod user_entity_permission;
pub mod user_role;

pub use affiliation::Entity as Affiliation;
pub use department::Entity as Department;
pub use entity::Entity as EntityDef;
pub use organization::Entity as Organization;
pub use role::Entity as Role;
pub use role_entity_permission::Entity as RoleEntityPermission;
pub use session::Entity as Session;
pub use user::Entity as User;
pub use user_entity_permission::Entity as UserEntityPermission;
pub use user_role::Entity as UserRole;
