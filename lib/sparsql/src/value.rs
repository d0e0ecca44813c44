use crate::error::BridgeError;
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, percent_decode_str, utf8_percent_encode};
use regex::Regex;
use sqlgebra::{ColumnRef, ResultRow, SqlExpression};
use std::fmt;
use std::str::FromStr;
use url::form_urlencoded;

/// Characters kept as is by the `encode` function: the IRI unreserved set.
const IRI_UNRESERVED: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~');

const TEMPLATE_DELIMITER: &str = "@@";

/// A transformation applied to a column value when it is inserted into a [`Template`].
#[derive(Eq, PartialEq, Ord, PartialOrd, Debug, Clone, Copy, Hash, Default)]
pub enum ColumnFunction {
    #[default]
    Identity,
    /// `application/x-www-form-urlencoded` encoding, spaces become `+`.
    UrlEncode,
    /// Like [`UrlEncode`](Self::UrlEncode) but spaces become `_` (and `_` is escaped).
    Urlify,
    /// IRI percent encoding of everything but the unreserved characters.
    Encode,
}

impl ColumnFunction {
    pub fn encode(self, value: &str) -> String {
        match self {
            Self::Identity => value.to_owned(),
            Self::UrlEncode => form_urlencoded::byte_serialize(value.as_bytes()).collect(),
            Self::Urlify => form_urlencoded::byte_serialize(value.as_bytes())
                .collect::<String>()
                .replace('_', "%5F")
                .replace('+', "_"),
            Self::Encode => utf8_percent_encode(value, IRI_UNRESERVED).to_string(),
        }
    }

    /// The value `encoded` was produced from, if any.
    ///
    /// Only the canonical encoding of a value is accepted.
    pub fn decode(self, encoded: &str) -> Option<String> {
        let decoded = match self {
            Self::Identity => return Some(encoded.to_owned()),
            Self::UrlEncode => percent_decode_str(&encoded.replace('+', " "))
                .decode_utf8()
                .ok()?
                .into_owned(),
            Self::Urlify => percent_decode_str(&encoded.replace('_', " "))
                .decode_utf8()
                .ok()?
                .into_owned(),
            Self::Encode => percent_decode_str(encoded).decode_utf8().ok()?.into_owned(),
        };
        (self.encode(&decoded) == encoded).then_some(decoded)
    }

    fn name(self) -> Option<&'static str> {
        match self {
            Self::Identity => None,
            Self::UrlEncode => Some("urlencode"),
            Self::Urlify => Some("urlify"),
            Self::Encode => Some("encode"),
        }
    }
}

impl FromStr for ColumnFunction {
    type Err = BridgeError;

    fn from_str(name: &str) -> Result<Self, BridgeError> {
        match name {
            "urlencode" => Ok(Self::UrlEncode),
            "urlify" => Ok(Self::Urlify),
            "encode" => Ok(Self::Encode),
            _ => Err(BridgeError::UnknownFunction(name.into())),
        }
    }
}

/// A string pattern with column placeholders like `http://example.com/person/@@people.id@@`.
///
/// Each placeholder is `@@[schema.]table.column[|function]@@` with `function` one of
/// `urlencode`, `urlify` or `encode`.
///
/// ```
/// use sparsql::Template;
/// use sqlgebra::{ColumnRef, ResultRow, SqlExpression};
/// use std::sync::Arc;
///
/// let template = Template::parse("http://example.com/person/@@people.name|urlify@@")?;
/// let name = ColumnRef::parse("people.name")?;
/// let row = ResultRow::new(Arc::from([name.clone()]), vec![Some("Ann Lee".into())]);
/// assert_eq!(
///     template.make_value(&row).as_deref(),
///     Some("http://example.com/person/Ann_Lee")
/// );
/// assert_eq!(
///     template.value_expression("http://example.com/person/Ann_Lee"),
///     SqlExpression::column_equals_value(name, "Ann Lee")
/// );
/// # Result::<_, Box<dyn std::error::Error>>::Ok(())
/// ```
#[derive(Eq, PartialEq, Ord, PartialOrd, Debug, Clone, Hash)]
pub struct Template {
    /// Always one more than `columns`.
    literals: Vec<String>,
    columns: Vec<(ColumnRef, ColumnFunction)>,
}

impl Template {
    pub fn parse(pattern: &str) -> Result<Self, BridgeError> {
        let mut parts = pattern.split(TEMPLATE_DELIMITER);
        let mut literals = vec![parts.next().unwrap_or_default().to_owned()];
        let mut columns = Vec::new();
        while let Some(placeholder) = parts.next() {
            let Some(literal) = parts.next() else {
                return Err(BridgeError::InvalidTemplate {
                    template: pattern.into(),
                    message: "the @@ delimiters are not balanced".into(),
                });
            };
            let (column, function) = match placeholder.split_once('|') {
                Some((column, function)) => (column, function.parse()?),
                None => (placeholder, ColumnFunction::Identity),
            };
            columns.push((ColumnRef::parse(column)?, function));
            literals.push(literal.to_owned());
        }
        Ok(Self { literals, columns })
    }

    pub fn columns(&self) -> impl Iterator<Item = &ColumnRef> {
        self.columns.iter().map(|(c, _)| c)
    }

    /// The rendered value, `None` if one of the columns is `NULL`.
    pub fn make_value(&self, row: &ResultRow) -> Option<String> {
        let mut value = self.literals.first().cloned().unwrap_or_default();
        for ((column, function), literal) in self.columns.iter().zip(self.literals.iter().skip(1))
        {
            value.push_str(&function.encode(row.get(column)?));
            value.push_str(literal);
        }
        Some(value)
    }

    /// The condition on the columns under which the template renders `value`.
    pub fn value_expression(&self, value: &str) -> SqlExpression {
        if self.columns.is_empty() {
            return (self.literals.first().map(String::as_str) == Some(value)).into();
        }
        let mut pattern = String::from("(?s)^");
        for (i, literal) in self.literals.iter().enumerate() {
            if i > 0 {
                pattern.push_str("(.*?)");
            }
            pattern.push_str(&regex::escape(literal));
        }
        pattern.push('$');
        let Ok(regex) = Regex::new(&pattern) else {
            return SqlExpression::False;
        };
        let Some(captures) = regex.captures(value) else {
            return SqlExpression::False;
        };
        SqlExpression::and_all(self.columns.iter().zip(captures.iter().skip(1)).map(
            |((column, function), capture)| {
                capture
                    .and_then(|c| function.decode(c.as_str()))
                    .map_or(SqlExpression::False, |v| {
                        SqlExpression::column_equals_value(column.clone(), v)
                    })
            },
        ))
    }

    /// Both templates have the same literal parts and functions, only the columns differ.
    pub fn is_equivalent_to(&self, other: &Self) -> bool {
        self.literals == other.literals
            && self.columns.len() == other.columns.len()
            && self
                .columns
                .iter()
                .zip(&other.columns)
                .all(|((_, f1), (_, f2))| f1 == f2)
    }

    /// Equalities between the aligned columns of two equivalent templates.
    pub fn column_equalities(&self, other: &Self) -> SqlExpression {
        SqlExpression::and_all(
            self.columns
                .iter()
                .zip(&other.columns)
                .map(|((c1, _), (c2, _))| SqlExpression::column_equality(c1.clone(), c2.clone())),
        )
    }

    #[must_use]
    pub fn rename_columns(&self, rename: &impl Fn(&ColumnRef) -> ColumnRef) -> Self {
        Self {
            literals: self.literals.clone(),
            columns: self
                .columns
                .iter()
                .map(|(c, f)| (rename(c), *f))
                .collect(),
        }
    }
}

impl fmt::Display for Template {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.literals.first().map_or("", String::as_str))?;
        for ((column, function), literal) in self.columns.iter().zip(self.literals.iter().skip(1))
        {
            write!(f, "{TEMPLATE_DELIMITER}{column}")?;
            if let Some(name) = function.name() {
                write!(f, "|{name}")?;
            }
            write!(f, "{TEMPLATE_DELIMITER}{literal}")?;
        }
        Ok(())
    }
}

/// Blank node labels made of a class identifier and the values of some columns,
/// joined by `@@`.
#[derive(Eq, PartialEq, Ord, PartialOrd, Debug, Clone, Hash)]
pub struct BlankNodeId {
    class_id: String,
    columns: Vec<ColumnRef>,
}

impl BlankNodeId {
    pub fn new(class_id: impl Into<String>, columns: impl IntoIterator<Item = ColumnRef>) -> Self {
        Self {
            class_id: class_id.into(),
            columns: columns.into_iter().collect(),
        }
    }

    #[inline]
    pub fn class_id(&self) -> &str {
        &self.class_id
    }

    #[inline]
    pub fn columns(&self) -> &[ColumnRef] {
        &self.columns
    }

    pub fn make_value(&self, row: &ResultRow) -> Option<String> {
        let mut value = self.class_id.clone();
        for column in &self.columns {
            value.push_str(TEMPLATE_DELIMITER);
            value.push_str(row.get(column)?);
        }
        Some(value)
    }

    pub fn value_expression(&self, value: &str) -> SqlExpression {
        let mut parts = value.split(TEMPLATE_DELIMITER);
        if parts.next() != Some(self.class_id.as_str()) {
            return SqlExpression::False;
        }
        let parts = parts.collect::<Vec<_>>();
        if parts.len() != self.columns.len() {
            return SqlExpression::False;
        }
        SqlExpression::and_all(
            self.columns
                .iter()
                .zip(parts)
                .map(|(c, v)| SqlExpression::column_equals_value(c.clone(), v)),
        )
    }

    /// Same class and same number of columns.
    pub fn is_compatible_with(&self, other: &Self) -> bool {
        self.class_id == other.class_id && self.columns.len() == other.columns.len()
    }

    pub fn column_equalities(&self, other: &Self) -> SqlExpression {
        SqlExpression::and_all(
            self.columns
                .iter()
                .zip(&other.columns)
                .map(|(c1, c2)| SqlExpression::column_equality(c1.clone(), c2.clone())),
        )
    }

    #[must_use]
    pub fn rename_columns(&self, rename: &impl Fn(&ColumnRef) -> ColumnRef) -> Self {
        Self {
            class_id: self.class_id.clone(),
            columns: self.columns.iter().map(rename).collect(),
        }
    }
}

/// Builds the lexical value of an RDF term from a database row.
#[derive(Eq, PartialEq, Ord, PartialOrd, Debug, Clone, Hash)]
pub enum ValueMaker {
    /// The value of a single column.
    Column(ColumnRef),
    Template(Template),
    BlankNodeId(BlankNodeId),
}

impl ValueMaker {
    pub fn make_value(&self, row: &ResultRow) -> Option<String> {
        match self {
            Self::Column(column) => row.get(column).map(ToOwned::to_owned),
            Self::Template(template) => template.make_value(row),
            Self::BlankNodeId(id) => id.make_value(row),
        }
    }

    /// The condition under which this maker produces `value`, `FALSE` if it never does.
    pub fn value_expression(&self, value: &str) -> SqlExpression {
        match self {
            Self::Column(column) => SqlExpression::column_equals_value(column.clone(), value),
            Self::Template(template) => template.value_expression(value),
            Self::BlankNodeId(id) => id.value_expression(value),
        }
    }

    pub fn columns(&self) -> Vec<&ColumnRef> {
        match self {
            Self::Column(column) => vec![column],
            Self::Template(template) => template.columns().collect(),
            Self::BlankNodeId(id) => id.columns().iter().collect(),
        }
    }

    #[must_use]
    pub fn rename_columns(&self, rename: &impl Fn(&ColumnRef) -> ColumnRef) -> Self {
        match self {
            Self::Column(column) => Self::Column(rename(column)),
            Self::Template(template) => Self::Template(template.rename_columns(rename)),
            Self::BlankNodeId(id) => Self::BlankNodeId(id.rename_columns(rename)),
        }
    }
}

impl From<ColumnRef> for ValueMaker {
    #[inline]
    fn from(column: ColumnRef) -> Self {
        Self::Column(column)
    }
}

impl From<Template> for ValueMaker {
    #[inline]
    fn from(template: Template) -> Self {
        Self::Template(template)
    }
}

impl From<BlankNodeId> for ValueMaker {
    #[inline]
    fn from(id: BlankNodeId) -> Self {
        Self::BlankNodeId(id)
    }
}
