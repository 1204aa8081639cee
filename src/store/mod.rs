//! Message store: tag queries and mutations, libSQL-backed.

pub mod libsql_backend;
pub mod migrations;
pub mod query;
pub mod traits;

pub use libsql_backend::LibSqlStore;
pub use query::Query;
pub use traits::{StoreMode, StoredMessage, TagOp, TagStore};
