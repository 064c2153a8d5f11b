//! SQLite-Backend

pub mod pool;
pub mod raeume;

pub use pool::SqliteDb;
