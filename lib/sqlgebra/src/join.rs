use crate::column::{ColumnRef, TableName};
use crate::expression::SqlExpression;
use std::fmt;

/// An equi-join between two tables on one or more column pairs.
///
/// The pairs are normalized so that the lexicographically smaller table is always on the
/// left side: `a.x = b.y` and `b.y = a.x` are the same join.
#[derive(Eq, PartialEq, Ord, PartialOrd, Debug, Clone, Hash)]
pub struct JoinCondition {
    pairs: Vec<(ColumnRef, ColumnRef)>,
}

impl JoinCondition {
    /// Builds a join from `(left, right)` column pairs.
    ///
    /// All left columns must belong to one table and all right columns to another.
    pub fn new(
        pairs: impl IntoIterator<Item = (ColumnRef, ColumnRef)>,
    ) -> Result<Self, InvalidJoinError> {
        let pairs = pairs.into_iter().collect::<Vec<_>>();
        let Some((first_left, first_right)) = pairs.first() else {
            return Err(InvalidJoinError::NoColumns);
        };
        let left_table = first_left.table().clone();
        let right_table = first_right.table().clone();
        if left_table == right_table {
            return Err(InvalidJoinError::SelfJoin(left_table));
        }
        for (left, right) in &pairs {
            if *left.table() != left_table || *right.table() != right_table {
                return Err(InvalidJoinError::MixedTables {
                    left: left_table,
                    right: right_table,
                });
            }
        }
        let mut pairs = if left_table <= right_table {
            pairs
        } else {
            pairs.into_iter().map(|(l, r)| (r, l)).collect()
        };
        pairs.sort_unstable();
        pairs.dedup();
        Ok(Self { pairs })
    }

    #[inline]
    pub fn pairs(&self) -> &[(ColumnRef, ColumnRef)] {
        &self.pairs
    }

    pub fn tables(&self) -> impl Iterator<Item = &TableName> {
        self.pairs
            .first()
            .into_iter()
            .flat_map(|(l, r)| [l.table(), r.table()])
    }

    pub fn columns(&self) -> impl Iterator<Item = &ColumnRef> {
        self.pairs.iter().flat_map(|(l, r)| [l, r])
    }

    /// The equivalent boolean expression.
    pub fn to_expression(&self) -> SqlExpression {
        SqlExpression::and_all(
            self.pairs
                .iter()
                .map(|(l, r)| SqlExpression::column_equality(l.clone(), r.clone())),
        )
    }

    #[must_use]
    pub fn rename_columns(&self, rename: &impl Fn(&ColumnRef) -> ColumnRef) -> Self {
        let mut pairs = self
            .pairs
            .iter()
            .map(|(l, r)| {
                let (l, r) = (rename(l), rename(r));
                if l.table() <= r.table() { (l, r) } else { (r, l) }
            })
            .collect::<Vec<_>>();
        pairs.sort_unstable();
        pairs.dedup();
        Self { pairs }
    }
}

impl fmt::Display for JoinCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (l, r)) in self.pairs.iter().enumerate() {
            if i > 0 {
                f.write_str(" AND ")?;
            }
            write!(f, "{l} = {r}")?;
        }
        Ok(())
    }
}

/// An error raised when a [`JoinCondition`] is malformed.
#[derive(Debug, Clone, thiserror::Error)]
pub enum InvalidJoinError {
    #[error("A join must relate at least one pair of columns")]
    NoColumns,
    #[error("The table {0} can not be joined with itself without an alias")]
    SelfJoin(TableName),
    #[error("All columns of a join must be between {left} and {right}")]
    MixedTables { left: TableName, right: TableName },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn join_direction_is_normalized() {
        let a = ColumnRef::parse("friends.b").unwrap();
        let b = ColumnRef::parse("people.id").unwrap();
        let forward = JoinCondition::new([(a.clone(), b.clone())]).unwrap();
        let backward = JoinCondition::new([(b, a)]).unwrap();
        assert_eq!(forward, backward);
        assert_eq!(forward.to_string(), "friends.b = people.id");
    }

    #[test]
    fn malformed_joins_are_rejected() {
        let a = ColumnRef::parse("friends.a").unwrap();
        let b = ColumnRef::parse("friends.b").unwrap();
        let c = ColumnRef::parse("people.id").unwrap();
        assert!(JoinCondition::new([]).is_err());
        assert!(JoinCondition::new([(a.clone(), b)]).is_err());
        assert!(JoinCondition::new([(a.clone(), c.clone()), (c, a)]).is_err());
    }
}
