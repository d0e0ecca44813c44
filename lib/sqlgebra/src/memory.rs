use crate::column::{ColumnRef, ParseColumnError, TableName};
use crate::executor::{ResultRow, SqlCursor, SqlExecutor};
use crate::expression::SqlExpression;
use crate::relation::OrderDirection;
use crate::render::SelectQuery;
use rustc_hash::FxHashSet;
use std::cmp::Ordering;
use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};
use std::sync::{Arc, Mutex, PoisonError};
use tracing::trace;

/// A [`SqlExecutor`] evaluating queries against tables held in memory.
///
/// It implements the subset of SQL produced by [`SelectQuery`] with the usual three valued
/// logic for `NULL`s. Every executed query is logged and the open cursors are counted,
/// which makes it handy to check how a query is translated.
///
/// Clones share the same tables, log and counter.
///
/// ```
/// use sqlgebra::{ColumnRef, Database, MemoryDatabase, Relation, SelectQuery, SqlCursor, SqlExecutor, SqlExpression};
///
/// let db = MemoryDatabase::new().with_table(
///     "people",
///     &["id", "name"],
///     &[&[Some("1"), Some("Alice")], &[Some("2"), Some("Bob")]],
/// )?;
/// let name = ColumnRef::parse("people.name")?;
/// let relation = Relation::new(Database::new("db"))
///     .select(SqlExpression::column_equals_value(ColumnRef::parse("people.id")?, "2"))
///     .project([name.clone()]);
/// let mut cursor = db.execute(&SelectQuery::new(relation))?;
/// let row = cursor.next_row().transpose()?;
/// assert_eq!(row.as_ref().and_then(|r| r.get(&name)), Some("Bob"));
/// assert!(cursor.next_row().is_none());
/// cursor.close()?;
/// assert_eq!(db.open_cursors(), 0);
/// # Result::<_, Box<dyn std::error::Error>>::Ok(())
/// ```
#[derive(Debug, Clone, Default)]
pub struct MemoryDatabase {
    tables: Arc<BTreeMap<TableName, MemoryTable>>,
    executed: Arc<Mutex<Vec<String>>>,
    open_cursors: Arc<AtomicUsize>,
    fail_on_close: bool,
}

#[derive(Debug, Clone)]
struct MemoryTable {
    columns: Vec<String>,
    rows: Vec<Vec<Option<String>>>,
}

impl MemoryDatabase {
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a table. Each row must have one value per column.
    pub fn with_table(
        mut self,
        name: &str,
        columns: &[&str],
        rows: &[&[Option<&str>]],
    ) -> Result<Self, MemoryDatabaseError> {
        let name = TableName::parse(name)?;
        let mut table = MemoryTable {
            columns: columns.iter().map(|c| (*c).to_owned()).collect(),
            rows: Vec::with_capacity(rows.len()),
        };
        for row in rows {
            if row.len() != columns.len() {
                return Err(MemoryDatabaseError::InvalidRow {
                    table: name,
                    expected: columns.len(),
                    actual: row.len(),
                });
            }
            table
                .rows
                .push(row.iter().map(|v| v.map(ToOwned::to_owned)).collect());
        }
        Arc::make_mut(&mut self.tables).insert(name, table);
        Ok(self)
    }

    /// Makes [`SqlCursor::close`] fail on the cursors returned from now on.
    #[must_use]
    pub fn with_failing_close(mut self) -> Self {
        self.fail_on_close = true;
        self
    }

    /// The SQL of all the queries executed so far, in order.
    pub fn executed_queries(&self) -> Vec<String> {
        self.executed
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// The number of cursors returned by [`execute`](SqlExecutor::execute) that have not been closed yet.
    pub fn open_cursors(&self) -> usize {
        self.open_cursors.load(AtomicOrdering::SeqCst)
    }

    fn evaluate(&self, query: &SelectQuery) -> Result<Vec<Vec<Option<String>>>, MemoryDatabaseError> {
        let relation = query.relation();
        let mut rows = vec![BTreeMap::<ColumnRef, Option<String>>::new()];
        for name in relation.tables() {
            let original = relation.aliases().original_of(&name);
            let table = self
                .tables
                .get(original)
                .ok_or_else(|| MemoryDatabaseError::UnknownTable(original.clone()))?;
            let mut new_rows = Vec::with_capacity(rows.len() * table.rows.len());
            for row in &rows {
                for values in &table.rows {
                    let mut new_row = row.clone();
                    for (column, value) in table.columns.iter().zip(values) {
                        new_row.insert(ColumnRef::new(name.clone(), column.as_str()), value.clone());
                    }
                    new_rows.push(new_row);
                }
            }
            rows = new_rows;
        }
        let condition = SqlExpression::and_all(
            relation
                .joins()
                .iter()
                .map(|j| j.to_expression())
                .chain([relation.condition().clone()]),
        );
        let mut selected = Vec::new();
        for row in rows {
            if evaluate_expression(&condition, &row)?.into_bool()? == Some(true) {
                selected.push(row);
            }
        }
        let (order, limit) = query.order_and_limit();
        if let Some((column, direction)) = order {
            for row in &selected {
                lookup(column, row)?;
            }
            selected.sort_by(|a, b| {
                let ordering = compare_nullable(a.get(column), b.get(column));
                match direction {
                    OrderDirection::Ascending => ordering,
                    OrderDirection::Descending => ordering.reverse(),
                }
            });
        }
        let mut result = Vec::with_capacity(selected.len());
        let mut seen = FxHashSet::default();
        for row in &selected {
            let values = query
                .columns()
                .iter()
                .map(|c| lookup(c, row))
                .collect::<Result<Vec<_>, _>>()?;
            if query.is_distinct() && !seen.insert(values.clone()) {
                continue;
            }
            result.push(values);
        }
        if let Some(limit) = limit {
            result.truncate(limit);
        }
        Ok(result)
    }
}

impl SqlExecutor for MemoryDatabase {
    type Error = MemoryDatabaseError;
    type Cursor = MemoryCursor;

    fn execute(&self, query: &SelectQuery) -> Result<MemoryCursor, MemoryDatabaseError> {
        let sql = query.to_sql();
        trace!("Executing {sql}");
        self.executed
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(sql);
        let rows = self.evaluate(query)?;
        let columns: Arc<[ColumnRef]> = query.columns().into();
        self.open_cursors.fetch_add(1, AtomicOrdering::SeqCst);
        Ok(MemoryCursor {
            rows: rows
                .into_iter()
                .map(|values| ResultRow::new(Arc::clone(&columns), values))
                .collect(),
            open_cursors: Arc::clone(&self.open_cursors),
            closed: false,
            fail_on_close: self.fail_on_close,
        })
    }
}

/// The cursor of a [`MemoryDatabase`].
///
/// A cursor dropped without being closed stays counted in [`MemoryDatabase::open_cursors`].
#[derive(Debug)]
pub struct MemoryCursor {
    rows: VecDeque<ResultRow>,
    open_cursors: Arc<AtomicUsize>,
    closed: bool,
    fail_on_close: bool,
}

impl SqlCursor for MemoryCursor {
    type Error = MemoryDatabaseError;

    fn next_row(&mut self) -> Option<Result<ResultRow, MemoryDatabaseError>> {
        if self.closed {
            return Some(Err(MemoryDatabaseError::CursorClosed));
        }
        Some(Ok(self.rows.pop_front()?))
    }

    fn close(&mut self) -> Result<(), MemoryDatabaseError> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.rows.clear();
        self.open_cursors.fetch_sub(1, AtomicOrdering::SeqCst);
        if self.fail_on_close {
            return Err(MemoryDatabaseError::CloseFailed);
        }
        Ok(())
    }
}

enum SqlValue {
    Boolean(Option<bool>),
    String(Option<String>),
}

impl SqlValue {
    fn into_bool(self) -> Result<Option<bool>, MemoryDatabaseError> {
        match self {
            Self::Boolean(value) => Ok(value),
            Self::String(_) => Err(MemoryDatabaseError::TypeError(
                "a string is used as a condition",
            )),
        }
    }

    fn into_string(self) -> Result<Option<String>, MemoryDatabaseError> {
        match self {
            Self::String(value) => Ok(value),
            Self::Boolean(_) => Err(MemoryDatabaseError::TypeError(
                "a condition is used as a string",
            )),
        }
    }
}

fn lookup(
    column: &ColumnRef,
    row: &BTreeMap<ColumnRef, Option<String>>,
) -> Result<Option<String>, MemoryDatabaseError> {
    row.get(column)
        .cloned()
        .ok_or_else(|| MemoryDatabaseError::UnknownColumn(column.clone()))
}

fn evaluate_expression(
    expression: &SqlExpression,
    row: &BTreeMap<ColumnRef, Option<String>>,
) -> Result<SqlValue, MemoryDatabaseError> {
    Ok(match expression {
        SqlExpression::True => SqlValue::Boolean(Some(true)),
        SqlExpression::False => SqlValue::Boolean(Some(false)),
        SqlExpression::Column(column) => SqlValue::String(lookup(column, row)?),
        SqlExpression::Constant(value) => SqlValue::String(Some(value.clone())),
        SqlExpression::Concat(parts) => {
            let mut result = String::new();
            for part in parts {
                let Some(value) = evaluate_expression(part, row)?.into_string()? else {
                    return Ok(SqlValue::String(None));
                };
                result.push_str(&value);
            }
            SqlValue::String(Some(result))
        }
        SqlExpression::And(inner) => {
            let mut result = Some(true);
            for i in inner {
                match evaluate_expression(i, row)?.into_bool()? {
                    Some(true) => (),
                    Some(false) => return Ok(SqlValue::Boolean(Some(false))),
                    None => result = None,
                }
            }
            SqlValue::Boolean(result)
        }
        SqlExpression::Or(inner) => {
            let mut result = Some(false);
            for i in inner {
                match evaluate_expression(i, row)?.into_bool()? {
                    Some(false) => (),
                    Some(true) => return Ok(SqlValue::Boolean(Some(true))),
                    None => result = None,
                }
            }
            SqlValue::Boolean(result)
        }
        SqlExpression::Not(inner) => {
            SqlValue::Boolean(evaluate_expression(inner, row)?.into_bool()?.map(|v| !v))
        }
        SqlExpression::Equal(left, right) => {
            match (evaluate_expression(left, row)?, evaluate_expression(right, row)?) {
                (SqlValue::String(left), SqlValue::String(right)) => {
                    SqlValue::Boolean(left.zip(right).map(|(l, r)| l == r))
                }
                (SqlValue::Boolean(left), SqlValue::Boolean(right)) => {
                    SqlValue::Boolean(left.zip(right).map(|(l, r)| l == r))
                }
                _ => {
                    return Err(MemoryDatabaseError::TypeError(
                        "a string is compared to a condition",
                    ));
                }
            }
        }
        SqlExpression::IsNotNull(inner) => SqlValue::Boolean(Some(
            evaluate_expression(inner, row)?.into_string()?.is_some(),
        )),
    })
}

/// `NULL`s first.
fn compare_nullable(a: Option<&Option<String>>, b: Option<&Option<String>>) -> Ordering {
    a.cloned().flatten().cmp(&b.cloned().flatten())
}

/// An error raised by [`MemoryDatabase`].
#[derive(Debug, thiserror::Error)]
pub enum MemoryDatabaseError {
    #[error("The table {0} does not exist")]
    UnknownTable(TableName),
    #[error("The column {0} does not exist")]
    UnknownColumn(ColumnRef),
    #[error("The table {table} has {expected} columns but a row with {actual} values was given")]
    InvalidRow {
        table: TableName,
        expected: usize,
        actual: usize,
    },
    #[error("Invalid SQL expression: {0}")]
    TypeError(&'static str),
    #[error("The cursor is already closed")]
    CursorClosed,
    #[error("Failed to close the cursor")]
    CloseFailed,
    #[error(transparent)]
    InvalidName(#[from] ParseColumnError),
}
