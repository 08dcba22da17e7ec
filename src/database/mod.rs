pub mod descriptor;
pub mod dialect;
pub mod manager;
pub mod row;
pub mod tables;
pub mod users;

pub use descriptor::{ColumnSpec, ColumnType, TableDescriptor};
pub use dialect::Dialect;
pub use manager::{DatabaseError, DatabaseManager};
pub use tables::TableRepository;
pub use users::{User, UserRepository};
