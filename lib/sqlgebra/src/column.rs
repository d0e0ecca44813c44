use std::fmt;

/// A possibly schema-qualified SQL table name like `people` or `hr.people`.
///
/// It is also used for table aliases: a table appearing twice in a query is referenced
/// under two different aliased names.
#[derive(Eq, PartialEq, Ord, PartialOrd, Debug, Clone, Hash)]
pub struct TableName {
    schema: Option<String>,
    table: String,
}

impl TableName {
    #[inline]
    pub fn new(schema: Option<impl Into<String>>, table: impl Into<String>) -> Self {
        Self {
            schema: schema.map(Into::into),
            table: table.into(),
        }
    }

    /// Parses `table` or `schema.table`.
    pub fn parse(name: &str) -> Result<Self, ParseColumnError> {
        let mut parts = name.split('.');
        match (parts.next(), parts.next(), parts.next()) {
            (Some(table), None, None) if is_identifier(table) => Ok(Self::new(None::<String>, table)),
            (Some(schema), Some(table), None) if is_identifier(schema) && is_identifier(table) => {
                Ok(Self::new(Some(schema), table))
            }
            _ => Err(ParseColumnError::InvalidTableName(name.into())),
        }
    }

    #[inline]
    pub fn schema(&self) -> Option<&str> {
        self.schema.as_deref()
    }

    #[inline]
    pub fn table(&self) -> &str {
        &self.table
    }

    /// The name used for this table when it is the `index`th copy of itself in a query.
    ///
    /// The schema is folded into the table name so that the result is unqualified.
    pub fn with_prefix(&self, index: usize) -> Self {
        let table = if let Some(schema) = &self.schema {
            format!("T{index}_{schema}_{}", self.table)
        } else {
            format!("T{index}_{}", self.table)
        };
        Self {
            schema: None,
            table,
        }
    }
}

impl fmt::Display for TableName {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(schema) = &self.schema {
            write!(f, "{schema}.")?;
        }
        f.write_str(&self.table)
    }
}

/// A column qualified by its table, like `people.name` or `hr.people.name`.
#[derive(Eq, PartialEq, Ord, PartialOrd, Debug, Clone, Hash)]
pub struct ColumnRef {
    table: TableName,
    column: String,
}

impl ColumnRef {
    #[inline]
    pub fn new(table: TableName, column: impl Into<String>) -> Self {
        Self {
            table,
            column: column.into(),
        }
    }

    /// Parses `table.column` or `schema.table.column`.
    ///
    /// ```
    /// use sqlgebra::ColumnRef;
    ///
    /// let column = ColumnRef::parse("hr.people.name")?;
    /// assert_eq!(column.table().schema(), Some("hr"));
    /// assert_eq!(column.table().table(), "people");
    /// assert_eq!(column.column(), "name");
    /// # Result::<_, sqlgebra::ParseColumnError>::Ok(())
    /// ```
    pub fn parse(name: &str) -> Result<Self, ParseColumnError> {
        let Some((table, column)) = name.rsplit_once('.') else {
            return Err(ParseColumnError::InvalidColumnName(name.into()));
        };
        if !is_identifier(column) {
            return Err(ParseColumnError::InvalidColumnName(name.into()));
        }
        let table = TableName::parse(table)
            .map_err(|_| ParseColumnError::InvalidColumnName(name.into()))?;
        Ok(Self::new(table, column))
    }

    #[inline]
    pub fn table(&self) -> &TableName {
        &self.table
    }

    #[inline]
    pub fn column(&self) -> &str {
        &self.column
    }

    /// The same column read from another table.
    #[inline]
    #[must_use]
    pub fn with_table(&self, table: TableName) -> Self {
        Self {
            table,
            column: self.column.clone(),
        }
    }
}

impl fmt::Display for ColumnRef {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.table, self.column)
    }
}

fn is_identifier(s: &str) -> bool {
    !s.is_empty()
        && s.chars()
            .all(|c| c.is_alphanumeric() || matches!(c, '_' | '$' | '-' | ' '))
}

/// An error raised while parsing a table or column name.
#[derive(Debug, thiserror::Error)]
pub enum ParseColumnError {
    #[error("{0} is not a valid table name, expected table or schema.table")]
    InvalidTableName(String),
    #[error("{0} is not a valid column name, expected table.column or schema.table.column")]
    InvalidColumnName(String),
}

#[cfg(test)]
#[expect(clippy::panic_in_result_fn)]
mod tests {
    use super::*;

    #[test]
    fn parse_unqualified_column() -> Result<(), ParseColumnError> {
        let column = ColumnRef::parse("people.id")?;
        assert_eq!(column.table(), &TableName::new(None::<String>, "people"));
        assert_eq!(column.to_string(), "people.id");
        Ok(())
    }

    #[test]
    fn reject_bad_names() {
        assert!(ColumnRef::parse("people").is_err());
        assert!(ColumnRef::parse("a.b.c.d").is_err());
        assert!(ColumnRef::parse(".id").is_err());
        assert!(TableName::parse("").is_err());
    }

    #[test]
    fn prefix_folds_schema() -> Result<(), ParseColumnError> {
        assert_eq!(TableName::parse("hr.people")?.with_prefix(3).to_string(), "T3_hr_people");
        assert_eq!(TableName::parse("people")?.with_prefix(1).to_string(), "T1_people");
        Ok(())
    }
}
