// One handler per route; policy lives in crate::services
pub mod cmd;
pub mod fallback;
pub mod query;
pub mod table;
pub mod user;

pub use cmd::command;
pub use fallback::fallback;
pub use query::raw_query;
pub use table::table_action;
pub use user::user_action;
