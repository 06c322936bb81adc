use sea_orm_migration::{prelude::*, schema::*};

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // Enable foreign keys for SQLite
        if manager.get_database_backend() == sea_orm::DatabaseBackend::Sqlite {
            manager
                .get_connection()
                .execute_unprepared("PRAGMA foreign_keys = ON")
                .await?;
        }

        manager
            .create_table(
                Table::create()
                    .table(Users::Table)
                    .if_not_exists()
                    .col(pk_auto_big(manager, Users::Id))
                    .col(
                        ColumnDef::new(Users::Username)
                            .string()
                            .not_null()
                            .unique_key(),
                    )
                    .col(string(Users::PasswordHash))
                    .col(
                        ColumnDef::new(Users::Email)
                            .string()
                            .null()
                            .unique_key(),
                    )
                    .col(string(Users::FirstName))
                    .col(
                        ColumnDef::new(Users::LastName)
                            .string()
                            .not_null()
                            .default(""),
                    )
                    .col(string_null(Users::Phone))
                    .col(string_null(Users::PhotoUrl))
                    .col(
                        ColumnDef::new(Users::Active)
                            .big_integer()
                            .not_null()
                            .default(1),
                    )
                    .col(big_integer(Users::CreatedAt))
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(Roles::Table)
                    .if_not_exists()
                    .col(pk_auto_big(manager, Roles::Id))
                    .col(
                        ColumnDef::new(Roles::Name)
                            .string()
                            .not_null()
                            .unique_key(),
                    )
                    .col(
                        ColumnDef::new(Roles::Description)
                            .string()
                            .not_null()
                            .default(""),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(UserRoles::Table)
                    .if_not_exists()
                    .col(pk_auto_big(manager, UserRoles::Id))
                    .col(big_integer(UserRoles::UserId))
                    .col(big_integer(UserRoles::RoleId))
                    .foreign_key(
                        ForeignKey::create()
                            .from(UserRoles::Table, UserRoles::UserId)
                            .to(Users::Table, Users::Id),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .from(UserRoles::Table, UserRoles::RoleId)
                            .to(Roles::Table, Roles::Id),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_user_roles_unique")
                    .table(UserRoles::Table)
                    .col(UserRoles::UserId)
                    .col(UserRoles::RoleId)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(Entities::Table)
                    .if_not_exists()
                    .col(pk_auto_big(manager, Entities::Id))
                    .col(
                        ColumnDef::new(Entities::Name)
                            .string()
                            .not_null()
                            .unique_key(),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(UserEntityPermissions::Table)
                    .if_not_exists()
                    .col(pk_auto_big(manager, UserEntityPermissions::Id))
                    .col(big_integer(UserEntityPermissions::UserId))
                    .col(big_integer(UserEntityPermissions::EntityId))
                    .col(
                        ColumnDef::new(UserEntityPermissions::CanCreate)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(UserEntityPermissions::CanEdit)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .from(UserEntityPermissions::Table, UserEntityPermissions::UserId)
                            .to(Users::Table, Users::Id),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .from(
                                UserEntityPermissions::Table,
                                UserEntityPermissions::EntityId,
                            )
                            .to(Entities::Table, Entities::Id),
                    )
                    .to_owned(),
            )
            .await?;

        // One direct grant row per (user, entity) pair
        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_user_entity_permissions_unique")
                    .table(UserEntityPermissions::Table)
                    .col(UserEntityPermissions::UserId)
                    .col(UserEntityPermissions::EntityId)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(RoleEntityPermissions::Table)
                    .if_not_exists()
                    .col(pk_auto_big(manager, RoleEntityPermissions::Id))
                    .col(big_integer(RoleEntityPermissions::RoleId))
                    .col(big_integer(RoleEntityPermissions::EntityId))
                    .col(
                        ColumnDef::new(RoleEntityPermissions::CanCreate)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(RoleEntityPermissions::CanEdit)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .from(RoleEntityPermissions::Table, RoleEntityPermissions::RoleId)
                            .to(Roles::Table, Roles::Id),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .from(
                                RoleEntityPermissions::Table,
                                RoleEntityPermissions::EntityId,
                            )
                            .to(Entities::Table, Entities::Id),
                    )
                    .to_owned(),
            )
            .await?;

        // One role grant row per (role, entity) pair
        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_role_entity_permissions_unique")
                    .table(RoleEntityPermissions::Table)
                    .col(RoleEntityPermissions::RoleId)
                    .col(RoleEntityPermissions::EntityId)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(Organizations::Table)
                    .if_not_exists()
                    .col(pk_auto_big(manager, Organizations::Id))
                    .col(
                        ColumnDef::new(Organizations::Name)
                            .string()
                            .not_null()
                            .unique_key(),
                    )
                    .col(string_null(Organizations::Email))
                    .col(string_null(Organizations::Phone))
                    .col(big_integer(Organizations::ContactUserId))
                    .col(big_integer(Organizations::CreatedAt))
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(Departments::Table)
                    .if_not_exists()
                    .col(pk_auto_big(manager, Departments::Id))
                    .col(big_integer(Departments::OrgId))
                    .col(string(Departments::Name))
                    .foreign_key(
                        ForeignKey::create()
                            .from(Departments::Table, Departments::OrgId)
                            .to(Organizations::Table, Organizations::Id),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(Affiliations::Table)
                    .if_not_exists()
                    .col(pk_auto_big(manager, Affiliations::Id))
                    .col(
                        ColumnDef::new(Affiliations::UserId)
                            .big_integer()
                            .not_null()
                            .unique_key(),
                    )
                    .col(big_integer(Affiliations::OrgId))
                    .col(big_integer_null(Affiliations::DepartmentId))
                    .col(string(Affiliations::Position))
                    .foreign_key(
                        ForeignKey::create()
                            .from(Affiliations::Table, Affiliations::UserId)
                            .to(Users::Table, Users::Id),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .from(Affiliations::Table, Affiliations::OrgId)
                            .to(Organizations::Table, Organizations::Id),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(Sessions::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Sessions::Jti)
                            .string()
                            .not_null()
                            .primary_key(),
                    )
                    .col(big_integer(Sessions::UserId))
                    .col(big_integer(Sessions::CreatedAt))
                    .col(string_null(Sessions::IpAddress))
                    .col(string_null(Sessions::Platform))
                    .col(string_null(Sessions::Browser))
                    .col(
                        ColumnDef::new(Sessions::Active)
                            .big_integer()
                            .not_null()
                            .default(1),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .from(Sessions::Table, Sessions::UserId)
                            .to(Users::Table, Users::Id),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_sessions_user_created")
                    .table(Sessions::Table)
                    .col(Sessions::UserId)
                    .col(Sessions::CreatedAt)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Sessions::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Affiliations::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Departments::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Organizations::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(RoleEntityPermissions::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(UserEntityPermissions::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Entities::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(UserRoles::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Roles::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Users::Table).to_owned())
            .await?;
        Ok(())
    }
}

/// Autoincrement primary key with a backend-appropriate integer width.
fn pk_auto_big<T: IntoIden>(manager: &SchemaManager, col: T) -> ColumnDef {
    match manager.get_database_backend() {
        sea_orm::DatabaseBackend::Postgres => ColumnDef::new(col)
            .big_integer()
            .not_null()
            .auto_increment()
            .primary_key()
            .to_owned(),
        _ => ColumnDef::new(col)
            .integer()
            .not_null()
            .auto_increment()
            .primary_key()
            .to_owned(),
    }
}

#[derive(DeriveIden)]
enum Users {
    Table,
    Id,
    Username,
    PasswordHash,
    Email,
    FirstName,
    LastName,
    Phone,
    PhotoUrl,
    Active,
    CreatedAt,
}

#[derive(DeriveIden)]
enum Roles {
    Table,
    Id,
    Name,
    Description,
}

#[derive(DeriveIden)]
enum UserRoles {
    Table,
    Id,
    UserId,
    RoleId,
}

#[derive(DeriveIden)]
enum Entities {
    Table,
    Id,
    Name,
}

#[derive(DeriveIden)]
enum UserEntityPermissions {
    Table,
    Id,
    UserId,
    EntityId,
    CanCreate,
    CanEdit,
}

#[derive(DeriveIden)]
enum RoleEntityPermissions {
    Table,
    Id,
    RoleId,
    EntityId,
    CanCreate,
    CanEdit,
}

#[derive(DeriveIden)]
enum Organizations {
    Table,
    Id,
    Name,
    Email,
    Phone,
    ContactUserId,
    CreatedAt,
}

#[derive(DeriveIden)]
enum Departments {
    Table,
    Id,
    OrgId,
    Name,
}

#[derive(DeriveIden)]
enum Affiliations {
    Table,
    Id,
    UserId,
    OrgId,
    DepartmentId,
    Position,
}

#[derive(DeriveIden)]
enum Sessions {
    Table,
    Jti,
    UserId,
    CreatedAt,
    IpAddress,
    Platform,
    Browser,
    Active,
}
