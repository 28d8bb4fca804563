//! Domain Layer
//!
//! Entities and events of the table service.
//! No storage concerns live here.

mod entity;
mod row;
mod change;

pub use entity::{Entity, DomainError, DomainResult};
pub use row::Row;
pub use change::{ChangeKind, RowChange};
