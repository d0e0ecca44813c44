#![doc = include_str!("../README.md")]
#![deny(unsafe_code)]
#![doc(test(attr(deny(warnings))))]

mod alias;
mod column;
mod executor;
mod expression;
mod join;
mod memory;
mod relation;
mod render;

pub use crate::alias::{Alias, AliasError, AliasMap};
pub use crate::column::{ColumnRef, ParseColumnError, TableName};
pub use crate::executor::{ResultRow, SqlCursor, SqlExecutor};
pub use crate::expression::SqlExpression;
pub use crate::join::{InvalidJoinError, JoinCondition};
pub use crate::memory::{MemoryCursor, MemoryDatabase, MemoryDatabaseError};
pub use crate::relation::{Database, OrderDirection, Relation, RelationError, combine_limits};
pub use crate::render::SelectQuery;
