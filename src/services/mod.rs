pub mod commands;
pub mod query;
pub mod tables;
pub mod users;

pub use commands::CommandRequest;
pub use tables::{TableRequest, TableService};
pub use users::{bootstrap_admin, UserRequest, UserService};
