use crate::column::ColumnRef;
use crate::render::SelectQuery;
use std::error::Error;
use std::sync::Arc;

/// Something able to run [`SelectQuery`]s, usually a connection to a relational database.
///
/// Implementations are free to route the query according to
/// [`Relation::database`](crate::Relation::database).
pub trait SqlExecutor {
    /// Error returned by the database.
    type Error: Error + Send + Sync + 'static;

    /// A cursor over the rows of one query.
    type Cursor: SqlCursor<Error = Self::Error>;

    /// Starts the execution of a query.
    ///
    /// The returned cursor must be [closed](SqlCursor::close) by the caller once it is not
    /// needed anymore, even if it has not been fully consumed.
    fn execute(&self, query: &SelectQuery) -> Result<Self::Cursor, Self::Error>;
}

impl<T: SqlExecutor + ?Sized> SqlExecutor for &T {
    type Error = T::Error;
    type Cursor = T::Cursor;

    #[inline]
    fn execute(&self, query: &SelectQuery) -> Result<Self::Cursor, Self::Error> {
        (*self).execute(query)
    }
}

/// A forward only cursor over the rows returned by a [`SqlExecutor`].
pub trait SqlCursor {
    type Error: Error + Send + Sync + 'static;

    /// The next row, `None` once the result set is exhausted.
    fn next_row(&mut self) -> Option<Result<ResultRow, Self::Error>>;

    /// Releases the resources held by the cursor.
    ///
    /// Calling it more than once must be harmless.
    fn close(&mut self) -> Result<(), Self::Error>;
}

/// One row returned by a query: the value (or `NULL`) of each projected column.
///
/// ```
/// use sqlgebra::{ColumnRef, ResultRow};
/// use std::sync::Arc;
///
/// let name = ColumnRef::parse("people.name")?;
/// let row = ResultRow::new(Arc::from([name.clone()]), vec![Some("Bob".into())]);
/// assert_eq!(row.get(&name), Some("Bob"));
/// assert_eq!(row.get(&ColumnRef::parse("people.id")?), None);
/// # Result::<_, Box<dyn std::error::Error>>::Ok(())
/// ```
#[derive(Eq, PartialEq, Debug, Clone, Hash)]
pub struct ResultRow {
    columns: Arc<[ColumnRef]>,
    values: Vec<Option<String>>,
}

impl ResultRow {
    /// `columns` must be sorted and have the same length as `values`.
    pub fn new(columns: Arc<[ColumnRef]>, values: Vec<Option<String>>) -> Self {
        debug_assert!(columns.is_sorted(), "the row columns must be sorted");
        debug_assert_eq!(columns.len(), values.len(), "one value per column");
        Self { columns, values }
    }

    /// The value of a column, `None` if it is `NULL` or not part of the row.
    pub fn get(&self, column: &ColumnRef) -> Option<&str> {
        let i = self.columns.binary_search(column).ok()?;
        self.values.get(i)?.as_deref()
    }

    #[inline]
    pub fn columns(&self) -> &[ColumnRef] {
        &self.columns
    }

    #[inline]
    pub fn values(&self) -> &[Option<String>] {
        &self.values
    }

    pub fn iter(&self) -> impl Iterator<Item = (&ColumnRef, Option<&str>)> {
        self.columns
            .iter()
            .zip(self.values.iter().map(Option::as_deref))
    }
}
