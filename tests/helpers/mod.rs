pub mod builders;
pub mod db;

pub use builders::{RoleBuilder, UserBuilder};
pub use db::TestDb;
