//! Database module: SQLite for the local replica, PostgreSQL for the remote one.

mod cursors;
mod pool;
mod records;

pub use cursors::*;
pub use pool::*;
pub use records::*;
