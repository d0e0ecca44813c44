use crate::column::ColumnRef;
use crate::expression::SqlExpression;
use crate::relation::{OrderDirection, Relation};
use std::fmt;

/// A [`Relation`] ready to be sent to a database.
///
/// The projected columns are returned in a stable (sorted) order and `DISTINCT` is added
/// if the relation is not known to be duplicate free.
#[derive(Eq, PartialEq, Debug, Clone, Hash)]
pub struct SelectQuery {
    relation: Relation,
    columns: Vec<ColumnRef>,
    distinct: bool,
}

impl SelectQuery {
    pub fn new(relation: Relation) -> Self {
        Self {
            columns: relation.projections().iter().cloned().collect(),
            distinct: !relation.is_unique(),
            relation,
        }
    }

    #[inline]
    pub fn relation(&self) -> &Relation {
        &self.relation
    }

    /// The columns of the result rows, in order.
    #[inline]
    pub fn columns(&self) -> &[ColumnRef] {
        &self.columns
    }

    #[inline]
    pub fn is_distinct(&self) -> bool {
        self.distinct
    }

    /// The ordering and limit actually applied.
    ///
    /// A limit from the bottom is expressed by reversing the ordering.
    pub fn order_and_limit(&self) -> (Option<(&ColumnRef, OrderDirection)>, Option<usize>) {
        let order = self.relation.order().map(|(c, d)| (c, *d));
        if let Some(limit) = self.relation.limit() {
            (order, Some(limit))
        } else if let Some(limit) = self.relation.limit_inverse() {
            (order.map(|(c, d)| (c, d.reverse())), Some(limit))
        } else {
            (order, None)
        }
    }

    /// Renders the query as SQL-92 with a trailing `LIMIT`.
    ///
    /// ```
    /// use sqlgebra::{ColumnRef, Database, Relation, SelectQuery, SqlExpression};
    ///
    /// let relation = Relation::new(Database::new("db"))
    ///     .select(SqlExpression::column_equality(
    ///         ColumnRef::parse("friends.b")?,
    ///         ColumnRef::parse("people.id")?,
    ///     ))
    ///     .project([ColumnRef::parse("friends.a")?, ColumnRef::parse("people.name")?]);
    /// assert_eq!(
    ///     SelectQuery::new(relation).to_sql(),
    ///     "SELECT DISTINCT friends.a, people.name FROM friends, people WHERE friends.b = people.id"
    /// );
    /// # Result::<_, Box<dyn std::error::Error>>::Ok(())
    /// ```
    pub fn to_sql(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for SelectQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SELECT ")?;
        if self.distinct {
            f.write_str("DISTINCT ")?;
        }
        if self.columns.is_empty() {
            f.write_str("1")?;
        }
        for (i, column) in self.columns.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{column}")?;
        }
        let aliases = self.relation.aliases();
        for (i, table) in self.relation.tables().iter().enumerate() {
            f.write_str(if i == 0 { " FROM " } else { ", " })?;
            if aliases.is_alias(table) {
                write!(f, "{} AS {table}", aliases.original_of(table))?;
            } else {
                write!(f, "{table}")?;
            }
        }
        let mut conditions = self
            .relation
            .joins()
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>();
        match self.relation.condition() {
            SqlExpression::True => (),
            SqlExpression::And(inner) => conditions.extend(inner.iter().map(ToString::to_string)),
            condition => conditions.push(condition.to_string()),
        }
        if !conditions.is_empty() {
            write!(f, " WHERE {}", conditions.join(" AND "))?;
        }
        let (order, limit) = self.order_and_limit();
        if let Some((column, direction)) = order {
            let direction = match direction {
                OrderDirection::Ascending => "ASC",
                OrderDirection::Descending => "DESC",
            };
            write!(f, " ORDER BY {column} {direction}")?;
        }
        if let Some(limit) = limit {
            write!(f, " LIMIT {limit}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alias::{Alias, AliasMap};
    use crate::column::TableName;
    use crate::relation::Database;

    fn column(name: &str) -> ColumnRef {
        ColumnRef::parse(name).unwrap()
    }

    #[test]
    fn aliases_are_rendered_in_from() {
        let aliases = AliasMap::new([Alias::new(
            TableName::parse("people").unwrap(),
            TableName::parse("p2").unwrap(),
        )])
        .unwrap();
        let relation = Relation::new(Database::new("db"))
            .unique()
            .with_aliases(aliases)
            .select(SqlExpression::column_equality(
                column("people.id"),
                column("p2.id"),
            ))
            .project([column("people.name"), column("p2.name")]);
        assert_eq!(
            SelectQuery::new(relation).to_sql(),
            "SELECT p2.name, people.name FROM people AS p2, people WHERE p2.id = people.id"
        );
    }

    #[test]
    fn limit_inverse_reverses_the_order() {
        let relation = Relation::new(Database::new("db"))
            .unique()
            .project([column("t.a")])
            .with_order(column("t.a"), OrderDirection::Ascending)
            .with_limit_inverse(3);
        assert_eq!(
            SelectQuery::new(relation).to_sql(),
            "SELECT t.a FROM t ORDER BY t.a DESC LIMIT 3"
        );
    }

    #[test]
    fn no_projection_selects_a_constant() {
        let relation = Relation::new(Database::new("db"))
            .select(SqlExpression::column_equals_value(column("t.a"), "x"));
        assert_eq!(
            SelectQuery::new(relation).to_sql(),
            "SELECT DISTINCT 1 FROM t WHERE t.a = 'x'"
        );
    }
}
