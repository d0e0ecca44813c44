use crate::column::{ColumnRef, TableName};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// A `original AS alias` table declaration.
#[derive(Eq, PartialEq, Ord, PartialOrd, Debug, Clone, Hash)]
pub struct Alias {
    pub original: TableName,
    pub alias: TableName,
}

impl Alias {
    #[inline]
    pub fn new(original: TableName, alias: TableName) -> Self {
        Self { original, alias }
    }
}

impl fmt::Display for Alias {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} AS {}", self.original, self.alias)
    }
}

/// A mapping from aliased table names to the tables they stand for.
///
/// Tables without an entry are their own alias. Maps built with [`AliasMap::new`] are
/// bijective; a relation joining several copies of one table carries one alias per copy.
///
/// ```
/// use sqlgebra::{Alias, AliasMap, TableName};
///
/// let people = TableName::parse("people")?;
/// let friend = TableName::parse("friend")?;
/// let aliases = AliasMap::new([Alias::new(people.clone(), friend.clone())])?;
/// assert_eq!(aliases.apply_to(&people), friend);
/// assert_eq!(aliases.original_of(&friend), &people);
/// # Result::<_, Box<dyn std::error::Error>>::Ok(())
/// ```
#[derive(Eq, PartialEq, Ord, PartialOrd, Debug, Clone, Hash, Default)]
pub struct AliasMap {
    aliases_to_originals: BTreeMap<TableName, TableName>,
    originals_to_aliases: BTreeMap<TableName, BTreeSet<TableName>>,
}

impl AliasMap {
    /// A bijective map: a table may get at most one alias.
    pub fn new(aliases: impl IntoIterator<Item = Alias>) -> Result<Self, AliasError> {
        let mut map = Self::default();
        for alias in aliases {
            if let Some(existing) = map
                .originals_to_aliases
                .get(&alias.original)
                .and_then(|aliases| aliases.iter().find(|a| **a != alias.alias))
            {
                return Err(AliasError::DuplicateOriginal {
                    first: existing.clone(),
                    original: alias.original,
                    second: alias.alias,
                });
            }
            map.insert(alias)?;
        }
        Ok(map)
    }

    fn insert(&mut self, alias: Alias) -> Result<(), AliasError> {
        if let Some(existing) = self.aliases_to_originals.get(&alias.alias) {
            if *existing == alias.original {
                return Ok(());
            }
            return Err(AliasError::DuplicateAlias {
                alias: alias.alias,
                first: existing.clone(),
                second: alias.original,
            });
        }
        self.originals_to_aliases
            .entry(alias.original.clone())
            .or_default()
            .insert(alias.alias.clone());
        self.aliases_to_originals.insert(alias.alias, alias.original);
        Ok(())
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.aliases_to_originals.is_empty()
    }

    #[inline]
    pub fn is_alias(&self, name: &TableName) -> bool {
        self.aliases_to_originals.contains_key(name)
    }

    #[inline]
    pub fn has_alias(&self, original: &TableName) -> bool {
        self.originals_to_aliases.contains_key(original)
    }

    /// The name under which `original` is referenced.
    ///
    /// A table with several aliases keeps its own name.
    pub fn apply_to(&self, original: &TableName) -> TableName {
        match self.originals_to_aliases.get(original) {
            Some(aliases) if aliases.len() == 1 => aliases.first().unwrap_or(original).clone(),
            _ => original.clone(),
        }
    }

    /// The table a (possibly aliased) name stands for.
    pub fn original_of<'a>(&'a self, name: &'a TableName) -> &'a TableName {
        self.aliases_to_originals.get(name).unwrap_or(name)
    }

    pub fn apply_to_column(&self, column: &ColumnRef) -> ColumnRef {
        if self.has_alias(column.table()) {
            column.with_table(self.apply_to(column.table()))
        } else {
            column.clone()
        }
    }

    pub fn original_of_column(&self, column: &ColumnRef) -> ColumnRef {
        if self.is_alias(column.table()) {
            column.with_table(self.original_of(column.table()).clone())
        } else {
            column.clone()
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = Alias> + '_ {
        self.aliases_to_originals
            .iter()
            .map(|(alias, original)| Alias::new(original.clone(), alias.clone()))
    }

    /// Renames the tables of a relation whose aliases are `inner` using `self`.
    ///
    /// `self` maps the names used by the relation to new names. The result maps every new
    /// name to the actual table it stands for.
    pub fn compose(&self, inner: &Self) -> Result<Self, AliasError> {
        let mut result = Self::default();
        for (alias, original) in &self.aliases_to_originals {
            result.insert(Alias::new(inner.original_of(original).clone(), alias.clone()))?;
        }
        for (alias, original) in &inner.aliases_to_originals {
            if !self.has_alias(alias) {
                result.insert(Alias::new(original.clone(), alias.clone()))?;
            }
        }
        Ok(result)
    }

    /// Union of two alias maps of relations that are joined together.
    ///
    /// Only an alias standing for two different tables is an error.
    pub fn merge(&self, other: &Self) -> Result<Self, AliasError> {
        let mut result = self.clone();
        for alias in other.iter() {
            result.insert(alias)?;
        }
        Ok(result)
    }
}

/// An error raised when an alias would stand for two tables, or when a bijective
/// [`AliasMap`] would give two aliases to one table.
#[derive(Debug, Clone, thiserror::Error)]
pub enum AliasError {
    #[error("The alias {alias} is used both for {first} and {second}")]
    DuplicateAlias {
        alias: TableName,
        first: TableName,
        second: TableName,
    },
    #[error("The table {original} is aliased both as {first} and {second}")]
    DuplicateOriginal {
        original: TableName,
        first: TableName,
        second: TableName,
    },
}
