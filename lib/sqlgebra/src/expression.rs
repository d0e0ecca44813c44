use crate::column::ColumnRef;
use std::collections::BTreeSet;
use std::fmt;

/// A boolean or string valued SQL expression used in `WHERE` clauses.
///
/// Values are normalized by the smart constructors ([`and_all`](Self::and_all),
/// [`equal`](Self::equal)...) so that structural equality is a cheap and useful
/// approximation of logical equivalence:
/// conjunctions absorb `TRUE`, collapse to `FALSE` as soon as one member is `FALSE`
/// and have their members sorted and deduplicated.
#[derive(Eq, PartialEq, Ord, PartialOrd, Debug, Clone, Hash)]
pub enum SqlExpression {
    True,
    False,
    Column(ColumnRef),
    /// A string constant.
    Constant(String),
    /// String concatenation.
    Concat(Vec<Self>),
    And(Vec<Self>),
    Or(Vec<Self>),
    Not(Box<Self>),
    Equal(Box<Self>, Box<Self>),
    IsNotNull(Box<Self>),
}

impl SqlExpression {
    #[inline]
    pub fn constant(value: impl Into<String>) -> Self {
        Self::Constant(value.into())
    }

    pub fn and_all(args: impl IntoIterator<Item = Self>) -> Self {
        let mut all = Vec::new();
        for arg in args {
            match arg {
                Self::True => (),
                Self::False => return Self::False,
                Self::And(inner) => all.extend(inner),
                arg => all.push(arg),
            }
        }
        all.sort_unstable();
        all.dedup();
        match all.len() {
            0 => Self::True,
            1 => all.pop().unwrap_or(Self::True),
            _ => Self::And(all),
        }
    }

    pub fn or_all(args: impl IntoIterator<Item = Self>) -> Self {
        let mut all = Vec::new();
        for arg in args {
            match arg {
                Self::False => (),
                Self::True => return Self::True,
                Self::Or(inner) => all.extend(inner),
                arg => all.push(arg),
            }
        }
        all.sort_unstable();
        all.dedup();
        match all.len() {
            0 => Self::False,
            1 => all.pop().unwrap_or(Self::False),
            _ => Self::Or(all),
        }
    }

    pub fn not(inner: Self) -> Self {
        match inner {
            Self::True => Self::False,
            Self::False => Self::True,
            Self::Not(inner) => *inner,
            inner => Self::Not(Box::new(inner)),
        }
    }

    pub fn equal(left: Self, right: Self) -> Self {
        match (left, right) {
            (Self::Constant(left), Self::Constant(right)) => {
                if left == right {
                    Self::True
                } else {
                    Self::False
                }
            }
            (left, right) if left == right => Self::True,
            (left, right) => {
                let (left, right) = if left <= right {
                    (left, right)
                } else {
                    (right, left)
                };
                Self::Equal(Box::new(left), Box::new(right))
            }
        }
    }

    #[inline]
    pub fn column_equality(left: ColumnRef, right: ColumnRef) -> Self {
        Self::equal(Self::Column(left), Self::Column(right))
    }

    #[inline]
    pub fn column_equals_value(column: ColumnRef, value: impl Into<String>) -> Self {
        Self::equal(Self::Column(column), Self::Constant(value.into()))
    }

    #[inline]
    pub fn is_not_null(inner: Self) -> Self {
        Self::IsNotNull(Box::new(inner))
    }

    pub fn concat(parts: impl IntoIterator<Item = Self>) -> Self {
        let parts = parts
            .into_iter()
            .filter(|p| !matches!(p, Self::Constant(c) if c.is_empty()))
            .collect::<Vec<_>>();
        match parts.len() {
            0 => Self::Constant(String::new()),
            1 => parts.into_iter().next().unwrap_or(Self::Constant(String::new())),
            _ => Self::Concat(parts),
        }
    }

    #[inline]
    pub fn is_true(&self) -> bool {
        matches!(self, Self::True)
    }

    #[inline]
    pub fn is_false(&self) -> bool {
        matches!(self, Self::False)
    }

    /// The columns this expression reads.
    pub fn columns(&self) -> BTreeSet<ColumnRef> {
        let mut columns = BTreeSet::new();
        self.lookup_columns(&mut |c| {
            columns.insert(c.clone());
        });
        columns
    }

    pub fn lookup_columns<'a>(&'a self, callback: &mut impl FnMut(&'a ColumnRef)) {
        match self {
            Self::True | Self::False | Self::Constant(_) => (),
            Self::Column(c) => callback(c),
            Self::Concat(inner) | Self::And(inner) | Self::Or(inner) => {
                for i in inner {
                    i.lookup_columns(callback);
                }
            }
            Self::Not(i) | Self::IsNotNull(i) => i.lookup_columns(callback),
            Self::Equal(a, b) => {
                a.lookup_columns(callback);
                b.lookup_columns(callback);
            }
        }
    }

    /// Rewrites every column reference, normalizing the result again.
    #[must_use]
    pub fn rename_columns(&self, rename: &impl Fn(&ColumnRef) -> ColumnRef) -> Self {
        match self {
            Self::True => Self::True,
            Self::False => Self::False,
            Self::Constant(c) => Self::Constant(c.clone()),
            Self::Column(c) => Self::Column(rename(c)),
            Self::Concat(inner) => Self::concat(inner.iter().map(|i| i.rename_columns(rename))),
            Self::And(inner) => Self::and_all(inner.iter().map(|i| i.rename_columns(rename))),
            Self::Or(inner) => Self::or_all(inner.iter().map(|i| i.rename_columns(rename))),
            Self::Not(inner) => Self::not(inner.rename_columns(rename)),
            Self::Equal(a, b) => Self::equal(a.rename_columns(rename), b.rename_columns(rename)),
            Self::IsNotNull(inner) => Self::is_not_null(inner.rename_columns(rename)),
        }
    }
}

impl Default for SqlExpression {
    #[inline]
    fn default() -> Self {
        Self::True
    }
}

impl From<bool> for SqlExpression {
    #[inline]
    fn from(value: bool) -> Self {
        if value { Self::True } else { Self::False }
    }
}

/// Formats as SQL-92.
impl fmt::Display for SqlExpression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::True => f.write_str("1 = 1"),
            Self::False => f.write_str("1 = 0"),
            Self::Constant(value) => write!(f, "'{}'", value.replace('\'', "''")),
            Self::Column(column) => column.fmt(f),
            Self::Concat(parts) => {
                f.write_str("(")?;
                for (i, part) in parts.iter().enumerate() {
                    if i > 0 {
                        f.write_str(" || ")?;
                    }
                    part.fmt(f)?;
                }
                f.write_str(")")
            }
            Self::And(inner) => fmt_nary(f, inner, " AND "),
            Self::Or(inner) => fmt_nary(f, inner, " OR "),
            Self::Not(inner) => write!(f, "NOT ({inner})"),
            Self::Equal(a, b) => write!(f, "{a} = {b}"),
            Self::IsNotNull(inner) => write!(f, "{inner} IS NOT NULL"),
        }
    }
}

fn fmt_nary(f: &mut fmt::Formatter<'_>, inner: &[SqlExpression], separator: &str) -> fmt::Result {
    f.write_str("(")?;
    for (i, e) in inner.iter().enumerate() {
        if i > 0 {
            f.write_str(separator)?;
        }
        fmt::Display::fmt(e, f)?;
    }
    f.write_str(")")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn column(name: &str) -> SqlExpression {
        SqlExpression::Column(ColumnRef::parse(name).unwrap())
    }

    #[test]
    fn conjunction_absorbs_true_and_short_circuits_on_false() {
        let a = SqlExpression::equal(column("t.a"), SqlExpression::constant("1"));
        assert_eq!(
            SqlExpression::and_all([SqlExpression::True, a.clone(), SqlExpression::True]),
            a
        );
        assert_eq!(
            SqlExpression::and_all([a.clone(), SqlExpression::False]),
            SqlExpression::False
        );
        assert_eq!(SqlExpression::and_all([]), SqlExpression::True);
    }

    #[test]
    fn conjunction_is_order_independent() {
        let a = SqlExpression::equal(column("t.a"), SqlExpression::constant("1"));
        let b = SqlExpression::equal(column("t.b"), column("u.b"));
        assert_eq!(
            SqlExpression::and_all([a.clone(), b.clone()]),
            SqlExpression::and_all([b, a])
        );
    }

    #[test]
    fn equality_of_identical_columns_is_true() {
        assert_eq!(
            SqlExpression::equal(column("t.a"), column("t.a")),
            SqlExpression::True
        );
        assert_eq!(
            SqlExpression::equal(column("t.a"), column("u.b")),
            SqlExpression::equal(column("u.b"), column("t.a"))
        );
        assert_eq!(
            SqlExpression::equal(SqlExpression::constant("a"), SqlExpression::constant("b")),
            SqlExpression::False
        );
    }

    #[test]
    fn sql_rendering() {
        let e = SqlExpression::and_all([
            SqlExpression::equal(column("t.a"), SqlExpression::constant("O'Hara")),
            SqlExpression::not(SqlExpression::is_not_null(column("t.b"))),
        ]);
        assert_eq!(
            e.to_string(),
            "(NOT (t.b IS NOT NULL) AND t.a = 'O''Hara')"
        );
    }
}
