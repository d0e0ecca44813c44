use crate::alias::{Alias, AliasError, AliasMap};
use crate::column::{ColumnRef, TableName};
use crate::expression::SqlExpression;
use crate::join::JoinCondition;
use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

/// A handle on the database a [`Relation`] is evaluated against.
///
/// Relations can only be joined if they target the same database.
#[derive(Eq, PartialEq, Ord, PartialOrd, Debug, Clone, Hash)]
pub struct Database {
    name: Arc<str>,
}

impl Database {
    #[inline]
    pub fn new(name: impl Into<Arc<str>>) -> Self {
        Self { name: name.into() }
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Display for Database {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

#[derive(Eq, PartialEq, Ord, PartialOrd, Debug, Clone, Copy, Hash)]
pub enum OrderDirection {
    Ascending,
    Descending,
}

impl OrderDirection {
    #[inline]
    #[must_use]
    pub fn reverse(self) -> Self {
        match self {
            Self::Ascending => Self::Descending,
            Self::Descending => Self::Ascending,
        }
    }
}

/// The description of one SQL `SELECT` query before it is rendered.
///
/// A relation is made of a database handle, an [`AliasMap`] for the tables used under
/// another name, a `WHERE` condition, a set of equi-joins, the projected columns,
/// a uniqueness flag (`true` if the projected rows are known to be distinct), an optional
/// single column ordering and two optional limits: `limit` bounds the number of rows read
/// from the top of the ordering and `limit_inverse` from the bottom.
///
/// Relations are immutable: every operation returns a new value.
/// [`Relation::empty`] is the only relation with a `FALSE` condition.
///
/// ```
/// use sqlgebra::{ColumnRef, Database, Relation, SqlExpression};
///
/// let db = Database::new("db");
/// let friends = Relation::new(db.clone())
///     .project([ColumnRef::parse("friends.a")?, ColumnRef::parse("friends.b")?]);
/// let people = Relation::new(db)
///     .unique()
///     .project([ColumnRef::parse("people.id")?, ColumnRef::parse("people.name")?]);
/// let joined = Relation::join_all([friends, people])?.select(SqlExpression::column_equality(
///     ColumnRef::parse("friends.b")?,
///     ColumnRef::parse("people.id")?,
/// ));
/// assert_eq!(joined.tables().len(), 2);
/// assert!(!joined.is_unique());
/// # Result::<_, Box<dyn std::error::Error>>::Ok(())
/// ```
#[derive(Eq, PartialEq, Debug, Clone, Hash)]
pub struct Relation {
    database: Option<Database>,
    aliases: AliasMap,
    condition: SqlExpression,
    joins: BTreeSet<JoinCondition>,
    projections: BTreeSet<ColumnRef>,
    is_unique: bool,
    order: Option<(ColumnRef, OrderDirection)>,
    limit: Option<usize>,
    limit_inverse: Option<usize>,
}

impl Relation {
    /// A relation over `database` without any restriction yet.
    pub fn new(database: Database) -> Self {
        Self {
            database: Some(database),
            is_unique: false,
            ..Self::trivial()
        }
    }

    /// The relation with no table and a single empty row.
    pub fn trivial() -> Self {
        Self {
            database: None,
            aliases: AliasMap::default(),
            condition: SqlExpression::True,
            joins: BTreeSet::new(),
            projections: BTreeSet::new(),
            is_unique: true,
            order: None,
            limit: None,
            limit_inverse: None,
        }
    }

    /// The relation with no row.
    pub fn empty() -> Self {
        Self {
            condition: SqlExpression::False,
            ..Self::trivial()
        }
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.condition.is_false()
    }

    #[inline]
    pub fn is_trivial(&self) -> bool {
        *self == Self::trivial()
    }

    #[inline]
    pub fn database(&self) -> Option<&Database> {
        self.database.as_ref()
    }

    #[inline]
    pub fn aliases(&self) -> &AliasMap {
        &self.aliases
    }

    #[inline]
    pub fn condition(&self) -> &SqlExpression {
        &self.condition
    }

    #[inline]
    pub fn joins(&self) -> &BTreeSet<JoinCondition> {
        &self.joins
    }

    #[inline]
    pub fn projections(&self) -> &BTreeSet<ColumnRef> {
        &self.projections
    }

    #[inline]
    pub fn is_unique(&self) -> bool {
        self.is_unique
    }

    #[inline]
    pub fn order(&self) -> Option<&(ColumnRef, OrderDirection)> {
        self.order.as_ref()
    }

    #[inline]
    pub fn limit(&self) -> Option<usize> {
        self.limit
    }

    #[inline]
    pub fn limit_inverse(&self) -> Option<usize> {
        self.limit_inverse
    }

    #[must_use]
    pub fn with_aliases(mut self, aliases: AliasMap) -> Self {
        if !self.is_empty() {
            self.aliases = aliases;
        }
        self
    }

    #[must_use]
    pub fn with_joins(mut self, joins: impl IntoIterator<Item = JoinCondition>) -> Self {
        if !self.is_empty() {
            self.joins.extend(joins);
        }
        self
    }

    /// Declares that the rows of this relation are distinct.
    #[must_use]
    pub fn unique(mut self) -> Self {
        self.is_unique = true;
        self
    }

    #[must_use]
    pub fn with_order(mut self, column: ColumnRef, direction: OrderDirection) -> Self {
        if !self.is_empty() {
            self.order = Some((column, direction));
        }
        self
    }

    /// Restricts the number of rows, keeping the smallest of the existing and new limits.
    #[must_use]
    pub fn with_limit(mut self, limit: usize) -> Self {
        if !self.is_empty() {
            self.limit = combine_limits(self.limit, Some(limit));
        }
        self
    }

    #[must_use]
    pub fn with_limit_inverse(mut self, limit: usize) -> Self {
        if !self.is_empty() {
            self.limit_inverse = combine_limits(self.limit_inverse, Some(limit));
        }
        self
    }

    /// Conjoins a condition to the `WHERE` clause.
    ///
    /// Returns [`Relation::empty`] if the result is unsatisfiable.
    pub fn select(&self, condition: SqlExpression) -> Self {
        if condition.is_true() {
            return self.clone();
        }
        let condition = SqlExpression::and_all([self.condition.clone(), condition]);
        if condition.is_false() {
            return Self::empty();
        }
        Self {
            condition,
            ..self.clone()
        }
    }

    /// Replaces the projected columns.
    pub fn project(&self, columns: impl IntoIterator<Item = ColumnRef>) -> Self {
        if self.is_empty() {
            return Self::empty();
        }
        Self {
            projections: columns.into_iter().collect(),
            ..self.clone()
        }
    }

    /// The names of all the tables referenced by this relation, as written in its
    /// expressions, i.e. aliases for the aliased tables.
    pub fn tables(&self) -> BTreeSet<TableName> {
        let mut tables = self
            .aliases
            .iter()
            .map(|Alias { alias, .. }| alias)
            .collect::<BTreeSet<_>>();
        for join in &self.joins {
            tables.extend(join.tables().cloned());
        }
        self.condition.lookup_columns(&mut |c| {
            tables.insert(c.table().clone());
        });
        for column in &self.projections {
            tables.insert(column.table().clone());
        }
        if let Some((column, _)) = &self.order {
            tables.insert(column.table().clone());
        }
        tables
    }

    /// Renames the tables according to `renames` (that maps current names to new names),
    /// keeping track of the actual tables in the alias map.
    pub fn rename_tables(&self, renames: &AliasMap) -> Result<Self, AliasError> {
        if self.is_empty() {
            return Ok(Self::empty());
        }
        let rename = |c: &ColumnRef| renames.apply_to_column(c);
        Ok(Self {
            database: self.database.clone(),
            aliases: renames.compose(&self.aliases)?,
            condition: self.condition.rename_columns(&rename),
            joins: self
                .joins
                .iter()
                .map(|j| j.rename_columns(&rename))
                .collect(),
            projections: self.projections.iter().map(rename).collect(),
            is_unique: self.is_unique,
            order: self.order.as_ref().map(|(c, d)| (rename(c), *d)),
            limit: self.limit,
            limit_inverse: self.limit_inverse,
        })
    }

    /// The renaming that gives every table of this relation the `T{index}_` prefix.
    pub fn prefix_renames(&self, index: usize) -> Result<AliasMap, AliasError> {
        AliasMap::new(
            self.tables()
                .into_iter()
                .map(|t| {
                    let prefixed = t.with_prefix(index);
                    Alias::new(t, prefixed)
                }),
        )
    }

    /// Joins relations of the same database together.
    ///
    /// Conditions are conjoined, joins and projections united, alias maps merged, the result
    /// is unique only if all inputs are and each limit is the minimum of the input ones.
    /// The result is [`Relation::empty`] if any input is.
    pub fn join_all(relations: impl IntoIterator<Item = Self>) -> Result<Self, RelationError> {
        let mut result = Self::trivial();
        for relation in relations {
            if relation.is_empty() {
                return Ok(Self::empty());
            }
            if let Some(database) = relation.database {
                match &result.database {
                    Some(existing) if *existing != database => {
                        return Err(RelationError::DifferentDatabases(
                            existing.clone(),
                            database,
                        ));
                    }
                    Some(_) => (),
                    None => result.database = Some(database),
                }
            }
            result.aliases = result.aliases.merge(&relation.aliases)?;
            result.condition = SqlExpression::and_all([result.condition, relation.condition]);
            result.joins.extend(relation.joins);
            result.projections.extend(relation.projections);
            result.is_unique &= relation.is_unique;
            if result.order.is_none() {
                result.order = relation.order;
            }
            result.limit = combine_limits(result.limit, relation.limit);
            result.limit_inverse = combine_limits(result.limit_inverse, relation.limit_inverse);
        }
        if result.condition.is_false() {
            return Ok(Self::empty());
        }
        Ok(result)
    }
}

/// The smallest of two optional limits.
pub fn combine_limits(a: Option<usize>, b: Option<usize>) -> Option<usize> {
    match (a, b) {
        (Some(a), Some(b)) => Some(a.min(b)),
        (a, None) => a,
        (None, b) => b,
    }
}

/// An error raised while building a [`Relation`].
#[derive(Debug, Clone, thiserror::Error)]
pub enum RelationError {
    #[error("Relations from the databases {0} and {1} can not be joined")]
    DifferentDatabases(Database, Database),
    #[error(transparent)]
    Alias(#[from] AliasError),
}
