use crate::constraint::ConstraintCollector;
use crate::value::ValueMaker;
use oxrdf::vocab::{rdf, xsd};
use oxrdf::{BlankNode, Literal, NamedNode, NamedNodeRef, Term};
use oxsdatatypes::{Date, DateTime, Decimal, Double, Integer};
use sqlgebra::{ColumnRef, ResultRow, SqlExpression};
use std::str::FromStr;

/// The kind of RDF term a [`NodeMaker`] builds from a database value.
#[derive(Eq, PartialEq, Ord, PartialOrd, Debug, Clone, Hash)]
pub enum NodeType {
    Iri,
    BlankNode,
    Literal {
        datatype: NamedNode,
        /// Lowercase language tag, only set for `rdf:langString`.
        language: Option<String>,
    },
}

impl NodeType {
    /// `xsd:string` literals.
    pub fn plain_literal() -> Self {
        Self::typed_literal(xsd::STRING.into_owned())
    }

    pub fn language_literal(language: &str) -> Self {
        Self::Literal {
            datatype: rdf::LANG_STRING.into_owned(),
            language: Some(language.to_ascii_lowercase()),
        }
    }

    pub fn typed_literal(datatype: NamedNode) -> Self {
        Self::Literal {
            datatype,
            language: None,
        }
    }

    /// Builds the term for a database value.
    ///
    /// `xsd:boolean` values `0` and `1` and SQL timestamps (`2001-02-03 04:05:06`) for
    /// `xsd:dateTime` are normalized. Returns `None` if the value is not valid for the type.
    pub fn make_node(&self, value: &str) -> Option<Term> {
        match self {
            Self::Iri => NamedNode::new(value).ok().map(Into::into),
            Self::BlankNode => BlankNode::new(escape_blank_node_label(value))
                .ok()
                .map(Into::into),
            Self::Literal {
                datatype,
                language: Some(language),
            } => {
                if datatype.as_ref() != rdf::LANG_STRING {
                    return None;
                }
                Literal::new_language_tagged_literal(value, language)
                    .ok()
                    .map(Into::into)
            }
            Self::Literal {
                datatype,
                language: None,
            } => Some(
                Literal::new_typed_literal(
                    normalize_lexical_form(datatype.as_ref(), value)?,
                    datatype.clone(),
                )
                .into(),
            ),
        }
    }

    /// The database values this type maps to `term`, empty if there are none.
    pub fn extract_values(&self, term: &Term) -> Vec<String> {
        let candidates = match (self, term) {
            (Self::Iri, Term::NamedNode(node)) => vec![node.as_str().to_owned()],
            (Self::BlankNode, Term::BlankNode(node)) => {
                unescape_blank_node_label(node.as_str()).into_iter().collect()
            }
            (Self::Literal { datatype, language }, Term::Literal(literal))
                if literal.datatype() == datatype.as_ref()
                    && literal.language() == language.as_deref() =>
            {
                let value = literal.value();
                match literal.datatype() {
                    xsd::BOOLEAN => match value {
                        "true" => vec!["1".into(), "true".into()],
                        "false" => vec!["0".into(), "false".into()],
                        _ => Vec::new(),
                    },
                    xsd::DATE_TIME => vec![value.replacen('T', " ", 1), value.to_owned()],
                    _ => vec![value.to_owned()],
                }
            }
            _ => Vec::new(),
        };
        candidates
            .into_iter()
            .filter(|c| self.make_node(c).as_ref() == Some(term))
            .collect()
    }

    /// Distinct database values always map to distinct terms.
    pub fn is_injective(&self) -> bool {
        match self {
            Self::Iri | Self::BlankNode => true,
            Self::Literal { datatype, .. } => {
                !matches!(datatype.as_ref(), xsd::BOOLEAN | xsd::DATE_TIME)
            }
        }
    }

    /// All the terms of this type when there are finitely many of them.
    pub fn finite_terms(&self) -> Option<Vec<Term>> {
        match self {
            Self::Literal {
                datatype,
                language: None,
            } if datatype.as_ref() == xsd::BOOLEAN => {
                Some(vec![Literal::from(true).into(), Literal::from(false).into()])
            }
            _ => None,
        }
    }

    /// Is a `xsd:string` or `rdf:langString` literal.
    pub fn is_string_literal(&self) -> bool {
        matches!(self, Self::Literal { datatype, .. } if datatype.as_ref() == xsd::STRING || datatype.as_ref() == rdf::LANG_STRING)
    }

    /// Returns `true` if terms of this type may be equal to `term`.
    fn accepts(&self, term: &Term) -> bool {
        match (self, term) {
            (Self::Iri, Term::NamedNode(_)) | (Self::BlankNode, Term::BlankNode(_)) => true,
            (Self::Literal { datatype, language }, Term::Literal(literal)) => {
                literal.datatype() == datatype.as_ref() && literal.language() == language.as_deref()
            }
            _ => false,
        }
    }
}

fn normalize_lexical_form(datatype: NamedNodeRef<'_>, value: &str) -> Option<String> {
    Some(match datatype {
        xsd::BOOLEAN => match value {
            "true" | "1" => "true".into(),
            "false" | "0" => "false".into(),
            _ => return None,
        },
        xsd::DATE_TIME => {
            let value = value.replacen(' ', "T", 1);
            DateTime::from_str(&value).ok()?;
            value
        }
        xsd::DATE => {
            Date::from_str(value).ok()?;
            value.into()
        }
        xsd::INTEGER => {
            Integer::from_str(value).ok()?;
            value.into()
        }
        xsd::DECIMAL => {
            Decimal::from_str(value).ok()?;
            value.into()
        }
        xsd::DOUBLE => {
            Double::from_str(value).ok()?;
            value.into()
        }
        _ => value.into(),
    })
}

const HEX_DIGITS: &[u8; 16] = b"0123456789ABCDEF";

/// Maps any string to a valid blank node identifier, injectively.
///
/// ASCII letters and digits are kept, every other byte is written `_XX` in hexadecimal.
pub(crate) fn escape_blank_node_label(value: &str) -> String {
    let mut label = String::with_capacity(value.len());
    for b in value.bytes() {
        if b.is_ascii_alphanumeric() {
            label.push(char::from(b));
        } else {
            label.push('_');
            label.push(char::from(HEX_DIGITS[usize::from(b >> 4)]));
            label.push(char::from(HEX_DIGITS[usize::from(b & 0xF)]));
        }
    }
    label
}

pub(crate) fn unescape_blank_node_label(label: &str) -> Option<String> {
    let mut value = Vec::with_capacity(label.len());
    let mut bytes = label.bytes();
    while let Some(b) = bytes.next() {
        if b == b'_' {
            let high = char::from(bytes.next()?).to_digit(16)?;
            let low = char::from(bytes.next()?).to_digit(16)?;
            value.push(u8::try_from(high * 16 + low).ok()?);
        } else if b.is_ascii_alphanumeric() {
            value.push(b);
        } else {
            return None;
        }
    }
    let value = String::from_utf8(value).ok()?;
    (escape_blank_node_label(&value) == label).then_some(value)
}

/// Builds the RDF term of one position of a bridge from a database row.
///
/// ```
/// use oxrdf::{Literal, NamedNode};
/// use sparsql::{NodeMaker, NodeType};
/// use sqlgebra::{ColumnRef, ResultRow, SqlExpression};
/// use std::sync::Arc;
///
/// let name = ColumnRef::parse("people.name")?;
/// let maker = NodeMaker::typed(NodeType::plain_literal(), name.clone());
/// let row = ResultRow::new(Arc::from([name.clone()]), vec![Some("Bob".into())]);
/// assert_eq!(maker.make_node(&row), Some(Literal::new_simple_literal("Bob").into()));
///
/// let (fixed, condition) = maker
///     .select_node(&Literal::new_simple_literal("Bob").into())
///     .ok_or("no match")?;
/// assert_eq!(condition, SqlExpression::column_equals_value(name, "Bob"));
/// assert_eq!(fixed, NodeMaker::Fixed(Literal::new_simple_literal("Bob").into()));
/// assert!(maker.select_node(&NamedNode::new("http://example.com")?.into()).is_none());
/// # Result::<_, Box<dyn std::error::Error>>::Ok(())
/// ```
#[derive(Eq, PartialEq, Debug, Clone, Hash)]
pub enum NodeMaker {
    /// Always the same term, whatever the row.
    Fixed(Term),
    Typed {
        node_type: NodeType,
        value: ValueMaker,
    },
}

impl NodeMaker {
    #[inline]
    pub fn typed(node_type: NodeType, value: impl Into<ValueMaker>) -> Self {
        Self::Typed {
            node_type,
            value: value.into(),
        }
    }

    /// The term for a row, `None` if the row does not give a valid term.
    pub fn make_node(&self, row: &ResultRow) -> Option<Term> {
        match self {
            Self::Fixed(term) => Some(term.clone()),
            Self::Typed { node_type, value } => node_type.make_node(&value.make_value(row)?),
        }
    }

    /// Registers what this maker can produce.
    pub fn describe_self(&self, collector: &mut ConstraintCollector) {
        match self {
            Self::Fixed(term) => collector.add_fixed_term(term),
            Self::Typed { node_type, value } => collector.add_typed(node_type, value),
        }
    }

    /// Restricts this maker to `term`.
    ///
    /// Returns the fixed maker and the condition rows must fulfill to produce `term`,
    /// `None` if `term` is never produced.
    pub fn select_node(&self, term: &Term) -> Option<(Self, SqlExpression)> {
        let condition = self.condition_for(term);
        if condition.is_false() {
            return None;
        }
        Some((Self::Fixed(term.clone()), condition))
    }

    /// The condition under which this maker produces `term`, `FALSE` if it never does.
    pub fn condition_for(&self, term: &Term) -> SqlExpression {
        match self {
            Self::Fixed(fixed) => (fixed == term).into(),
            Self::Typed { node_type, value } => {
                if !node_type.accepts(term) {
                    return SqlExpression::False;
                }
                SqlExpression::or_all(
                    node_type
                        .extract_values(term)
                        .iter()
                        .map(|v| value.value_expression(v)),
                )
            }
        }
    }

    pub fn columns(&self) -> Vec<&ColumnRef> {
        match self {
            Self::Fixed(_) => Vec::new(),
            Self::Typed { value, .. } => value.columns(),
        }
    }

    #[must_use]
    pub fn rename_columns(&self, rename: &impl Fn(&ColumnRef) -> ColumnRef) -> Self {
        match self {
            Self::Fixed(term) => Self::Fixed(term.clone()),
            Self::Typed { node_type, value } => Self::Typed {
                node_type: node_type.clone(),
                value: value.rename_columns(rename),
            },
        }
    }

    pub fn is_iri(&self) -> bool {
        match self {
            Self::Fixed(term) => term.is_named_node(),
            Self::Typed { node_type, .. } => *node_type == NodeType::Iri,
        }
    }

    pub fn is_blank_node(&self) -> bool {
        match self {
            Self::Fixed(term) => term.is_blank_node(),
            Self::Typed { node_type, .. } => *node_type == NodeType::BlankNode,
        }
    }

    pub fn is_literal(&self) -> bool {
        match self {
            Self::Fixed(term) => term.is_literal(),
            Self::Typed { node_type, .. } => matches!(node_type, NodeType::Literal { .. }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Template;
    use std::sync::Arc;

    fn row(column: &ColumnRef, value: &str) -> ResultRow {
        ResultRow::new(Arc::from([column.clone()]), vec![Some(value.into())])
    }

    #[test]
    fn boolean_columns_are_normalized() {
        let column = ColumnRef::parse("t.flag").unwrap();
        let maker = NodeMaker::typed(NodeType::typed_literal(xsd::BOOLEAN.into_owned()), column.clone());
        let true_literal = Term::from(Literal::new_typed_literal("true", xsd::BOOLEAN));
        assert_eq!(maker.make_node(&row(&column, "1")), Some(true_literal.clone()));
        assert_eq!(maker.make_node(&row(&column, "true")), Some(true_literal.clone()));
        assert_eq!(maker.make_node(&row(&column, "yes")), None);
        assert_eq!(
            maker.condition_for(&true_literal),
            SqlExpression::or_all([
                SqlExpression::column_equals_value(column.clone(), "1"),
                SqlExpression::column_equals_value(column, "true"),
            ])
        );
    }

    #[test]
    fn sql_timestamps_become_date_times() {
        let column = ColumnRef::parse("t.created").unwrap();
        let maker = NodeMaker::typed(
            NodeType::typed_literal(xsd::DATE_TIME.into_owned()),
            column.clone(),
        );
        assert_eq!(
            maker.make_node(&row(&column, "2008-04-01 12:30:00")),
            Some(Literal::new_typed_literal("2008-04-01T12:30:00", xsd::DATE_TIME).into())
        );
        assert_eq!(maker.make_node(&row(&column, "yesterday")), None);
    }

    #[test]
    fn language_literals() {
        let column = ColumnRef::parse("t.label").unwrap();
        let maker = NodeMaker::typed(NodeType::language_literal("EN"), column.clone());
        let term = Term::from(Literal::new_language_tagged_literal_unchecked("chat", "en"));
        assert_eq!(maker.make_node(&row(&column, "chat")), Some(term.clone()));
        assert!(maker.select_node(&term).is_some());
        assert!(
            maker
                .select_node(&Literal::new_simple_literal("chat").into())
                .is_none()
        );
    }

    #[test]
    fn blank_node_labels_are_escaped_injectively() {
        for value in ["Person@@1", "a_b", "é", "_41"] {
            let label = escape_blank_node_label(value);
            assert!(BlankNode::new(&label).is_ok(), "{label} is not a valid label");
            assert_eq!(unescape_blank_node_label(&label).as_deref(), Some(value));
        }
        assert_ne!(escape_blank_node_label("a_41"), escape_blank_node_label("aA"));
        assert_eq!(unescape_blank_node_label("a-b"), None);
    }

    #[test]
    fn select_node_on_template() {
        let template = Template::parse("http://ex.com/@@t.id@@").unwrap();
        let maker = NodeMaker::typed(NodeType::Iri, template);
        let (fixed, condition) = maker
            .select_node(&NamedNode::new_unchecked("http://ex.com/12").into())
            .unwrap();
        assert_eq!(fixed, NodeMaker::Fixed(NamedNode::new_unchecked("http://ex.com/12").into()));
        assert_eq!(
            condition,
            SqlExpression::column_equals_value(ColumnRef::parse("t.id").unwrap(), "12")
        );
        assert!(
            maker
                .select_node(&NamedNode::new_unchecked("http://other.com/12").into())
                .is_none()
        );
        assert!(
            maker
                .select_node(&Literal::new_simple_literal("http://ex.com/12").into())
                .is_none()
        );
    }
}
