use crate::algebra::TriplePattern;
use crate::node::NodeMaker;
use oxrdf::{Term, Triple};
use sqlgebra::{AliasError, ColumnRef, Relation, ResultRow, SqlExpression};

/// A bridge: the rows of a relation, each giving one RDF triple.
///
/// ```
/// use oxrdf::{Literal, NamedNode, Triple};
/// use sparsql::{NodeMaker, NodeType, Template, TripleRelation};
/// use sqlgebra::{ColumnRef, Database, Relation, ResultRow};
///
/// let name = TripleRelation::new(
///     Relation::new(Database::new("db")),
///     NodeMaker::typed(NodeType::Iri, Template::parse("http://ex.com/p/@@people.id@@")?),
///     NodeMaker::Fixed(NamedNode::new("http://xmlns.com/foaf/0.1/name")?.into()),
///     NodeMaker::typed(NodeType::plain_literal(), ColumnRef::parse("people.name")?),
/// );
/// let row = ResultRow::new(
///     name.relation().projections().iter().cloned().collect::<Vec<_>>().into(),
///     vec![Some("2".into()), Some("Bob".into())],
/// );
/// assert_eq!(
///     name.make_triple(&row),
///     Some(Triple::new(
///         NamedNode::new("http://ex.com/p/2")?,
///         NamedNode::new("http://xmlns.com/foaf/0.1/name")?,
///         Literal::new_simple_literal("Bob"),
///     ))
/// );
/// # Result::<_, Box<dyn std::error::Error>>::Ok(())
/// ```
#[derive(Eq, PartialEq, Debug, Clone, Hash)]
pub struct TripleRelation {
    relation: Relation,
    subject: NodeMaker,
    predicate: NodeMaker,
    object: NodeMaker,
}

impl TripleRelation {
    /// Builds a bridge, projecting the columns used by the node makers.
    pub fn new(
        relation: Relation,
        subject: NodeMaker,
        predicate: NodeMaker,
        object: NodeMaker,
    ) -> Self {
        let columns = [&subject, &predicate, &object]
            .into_iter()
            .flat_map(NodeMaker::columns)
            .cloned()
            .collect::<Vec<_>>();
        Self {
            relation: relation.project(columns),
            subject,
            predicate,
            object,
        }
    }

    #[inline]
    pub fn relation(&self) -> &Relation {
        &self.relation
    }

    #[inline]
    pub fn subject(&self) -> &NodeMaker {
        &self.subject
    }

    #[inline]
    pub fn predicate(&self) -> &NodeMaker {
        &self.predicate
    }

    #[inline]
    pub fn object(&self) -> &NodeMaker {
        &self.object
    }

    /// The node makers in subject, predicate, object order.
    #[inline]
    pub fn node_makers(&self) -> [&NodeMaker; 3] {
        [&self.subject, &self.predicate, &self.object]
    }

    /// Restricts the bridge to the triples with the given terms.
    ///
    /// Returns `None` if the bridge never produces such a triple.
    pub fn select_terms(
        &self,
        subject: Option<&Term>,
        predicate: Option<&Term>,
        object: Option<&Term>,
    ) -> Option<Self> {
        let mut conditions = Vec::new();
        let mut select = |maker: &NodeMaker, term: Option<&Term>| {
            let Some(term) = term else {
                return Some(maker.clone());
            };
            let (fixed, condition) = maker.select_node(term)?;
            conditions.push(condition);
            Some(fixed)
        };
        let subject = select(&self.subject, subject)?;
        let predicate = select(&self.predicate, predicate)?;
        let object = select(&self.object, object)?;
        let relation = self.relation.select(SqlExpression::and_all(conditions));
        if relation.is_empty() {
            return None;
        }
        Some(Self::new(relation, subject, predicate, object))
    }

    /// Restricts the bridge to the triples matching the constant positions of `pattern`.
    pub fn select_triple(&self, pattern: &TriplePattern) -> Option<Self> {
        self.select_terms(
            pattern.subject.as_term(),
            pattern.predicate.as_term(),
            pattern.object.as_term(),
        )
    }

    /// Renames the tables of the bridge with the `T{index}_` prefix so it can be joined with
    /// other copies of itself.
    pub fn with_prefix(&self, index: usize) -> Result<Self, AliasError> {
        let renames = self.relation.prefix_renames(index)?;
        let rename = |c: &ColumnRef| renames.apply_to_column(c);
        Ok(Self {
            relation: self.relation.rename_tables(&renames)?,
            subject: self.subject.rename_columns(&rename),
            predicate: self.predicate.rename_columns(&rename),
            object: self.object.rename_columns(&rename),
        })
    }

    /// The triple of a row, `None` if the row does not give a valid triple.
    pub fn make_triple(&self, row: &ResultRow) -> Option<Triple> {
        let Term::NamedNode(predicate) = self.predicate.make_node(row)? else {
            return None;
        };
        let object = self.object.make_node(row)?;
        match self.subject.make_node(row)? {
            Term::NamedNode(subject) => Some(Triple::new(subject, predicate, object)),
            Term::BlankNode(subject) => Some(Triple::new(subject, predicate, object)),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::NodeType;
    use crate::value::Template;
    use oxrdf::{Literal, NamedNode};
    use sqlgebra::{Database, TableName};
    use std::sync::Arc;

    fn people_name() -> TripleRelation {
        TripleRelation::new(
            Relation::new(Database::new("db")),
            NodeMaker::typed(
                NodeType::Iri,
                Template::parse("http://ex.com/p/@@people.id@@").unwrap(),
            ),
            NodeMaker::Fixed(NamedNode::new_unchecked("http://ex.com/name").into()),
            NodeMaker::typed(
                NodeType::plain_literal(),
                ColumnRef::parse("people.name").unwrap(),
            ),
        )
    }

    #[test]
    fn select_constant_subject() {
        let selected = people_name()
            .select_terms(
                Some(&NamedNode::new_unchecked("http://ex.com/p/2").into()),
                None,
                None,
            )
            .unwrap();
        assert_eq!(
            selected.relation().condition(),
            &SqlExpression::column_equals_value(ColumnRef::parse("people.id").unwrap(), "2")
        );
        assert_eq!(
            selected.subject(),
            &NodeMaker::Fixed(NamedNode::new_unchecked("http://ex.com/p/2").into())
        );
        assert_eq!(
            selected.relation().projections().iter().collect::<Vec<_>>(),
            [&ColumnRef::parse("people.name").unwrap()]
        );
    }

    #[test]
    fn select_mismatching_terms() {
        let bridge = people_name();
        assert!(
            bridge
                .select_terms(
                    None,
                    Some(&NamedNode::new_unchecked("http://ex.com/knows").into()),
                    None
                )
                .is_none()
        );
        assert!(
            bridge
                .select_terms(
                    Some(&NamedNode::new_unchecked("http://other.com/p/2").into()),
                    None,
                    None
                )
                .is_none()
        );
        assert!(
            bridge
                .select_terms(
                    None,
                    None,
                    Some(&NamedNode::new_unchecked("http://ex.com/Bob").into())
                )
                .is_none()
        );
    }

    #[test]
    fn prefix_renames_everything() {
        let prefixed = people_name().with_prefix(3).unwrap();
        let table = TableName::parse("T3_people").unwrap();
        assert!(
            prefixed
                .relation()
                .projections()
                .iter()
                .all(|c| *c.table() == table)
        );
        assert!(
            prefixed
                .node_makers()
                .iter()
                .flat_map(|m| m.columns())
                .all(|c| *c.table() == table)
        );
        assert_eq!(
            prefixed.relation().aliases().original_of(&table),
            &TableName::parse("people").unwrap()
        );
    }

    #[test]
    fn literal_subjects_are_skipped() {
        let column = ColumnRef::parse("t.v").unwrap();
        let bridge = TripleRelation::new(
            Relation::new(Database::new("db")),
            NodeMaker::typed(NodeType::plain_literal(), column.clone()),
            NodeMaker::Fixed(NamedNode::new_unchecked("http://ex.com/p").into()),
            NodeMaker::Fixed(Literal::new_simple_literal("o").into()),
        );
        let row = ResultRow::new(Arc::from([column]), vec![Some("s".into())]);
        assert_eq!(bridge.make_triple(&row), None);
    }
}
