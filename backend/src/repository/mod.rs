//! Repository Layer
//!
//! Data access abstractions and the SQLite implementation.

mod traits;
mod db;
mod table_repo;

#[cfg(test)]
mod tests;

pub use traits::Repository;
pub use db::{init_db, DbState, SharedConnection};
pub use table_repo::TableRepository;
