use crate::node::NodeType;
use crate::value::ValueMaker;
use oxrdf::Term;
use sqlgebra::SqlExpression;
use std::collections::BTreeSet;

/// Accumulates what the occurrences of one variable in a join can produce and decides if
/// they can all produce the same term.
///
/// The verdict only depends on the set of registered occurrences, not on their order.
///
/// ```
/// use sparsql::{Constraint, ConstraintCollector, NodeMaker, NodeType};
/// use sqlgebra::{ColumnRef, SqlExpression};
///
/// let friends_b = ColumnRef::parse("friends.b")?;
/// let people_id = ColumnRef::parse("people.id")?;
/// let mut collector = ConstraintCollector::default();
/// NodeMaker::typed(NodeType::Iri, friends_b.clone()).describe_self(&mut collector);
/// NodeMaker::typed(NodeType::Iri, people_id.clone()).describe_self(&mut collector);
/// assert_eq!(
///     collector.finish(),
///     Constraint::Satisfiable(SqlExpression::column_equality(friends_b, people_id))
/// );
///
/// NodeMaker::typed(NodeType::plain_literal(), ColumnRef::parse("people.name")?)
///     .describe_self(&mut collector);
/// assert_eq!(collector.finish(), Constraint::Unsatisfiable);
/// # Result::<_, Box<dyn std::error::Error>>::Ok(())
/// ```
#[derive(Debug, Clone, Default)]
pub struct ConstraintCollector {
    fixed_terms: Vec<Term>,
    typed: BTreeSet<(NodeType, ValueMaker)>,
}

/// The verdict of a [`ConstraintCollector`].
#[derive(Eq, PartialEq, Debug, Clone, Hash)]
pub enum Constraint {
    Unsatisfiable,
    /// The occurrences produce the same term exactly when the condition holds.
    Satisfiable(SqlExpression),
    /// The occurrences may only produce the same term when the condition holds, the terms
    /// they produce still have to be compared.
    NeedsComparison(SqlExpression),
}

impl ConstraintCollector {
    pub fn add_fixed_term(&mut self, term: &Term) {
        if !self.fixed_terms.contains(term) {
            self.fixed_terms.push(term.clone());
        }
    }

    pub fn add_typed(&mut self, node_type: &NodeType, value: &ValueMaker) {
        self.typed.insert((node_type.clone(), value.clone()));
    }

    pub fn finish(&self) -> Constraint {
        if self.fixed_terms.len() > 1 {
            return Constraint::Unsatisfiable;
        }
        let Some((node_type, _)) = self.typed.first() else {
            return Constraint::Satisfiable(SqlExpression::True);
        };
        if self.typed.iter().any(|(t, _)| t != node_type) {
            return Constraint::Unsatisfiable;
        }
        let makers = self.typed.iter().map(|(_, maker)| maker);
        let condition = if let Some(term) = self.fixed_terms.first() {
            // Every occurrence must produce the fixed term.
            all_produce(node_type, makers, term)
        } else if self.typed.len() == 1 {
            SqlExpression::True
        } else if node_type.is_injective() {
            value_makers_equality(makers)
        } else if let Some(terms) = node_type.finite_terms() {
            SqlExpression::or_all(
                terms
                    .iter()
                    .map(|term| all_produce(node_type, makers.clone(), term)),
            )
        } else {
            if value_makers_equality(makers).is_false() {
                return Constraint::Unsatisfiable;
            }
            // Distinct database values may give the same term.
            return Constraint::NeedsComparison(SqlExpression::True);
        };
        if condition.is_false() {
            Constraint::Unsatisfiable
        } else {
            Constraint::Satisfiable(condition)
        }
    }
}

/// The condition under which all makers produce `term`.
fn all_produce<'a>(
    node_type: &NodeType,
    makers: impl Iterator<Item = &'a ValueMaker>,
    term: &Term,
) -> SqlExpression {
    let values = node_type.extract_values(term);
    SqlExpression::and_all(
        makers.map(|maker| SqlExpression::or_all(values.iter().map(|v| maker.value_expression(v)))),
    )
}

/// Equalities making all makers produce the same value, `FALSE` if they never do.
///
/// Column and template makers are never reconciled.
fn value_makers_equality<'a>(mut makers: impl Iterator<Item = &'a ValueMaker>) -> SqlExpression {
    let Some(first) = makers.next() else {
        return SqlExpression::True;
    };
    SqlExpression::and_all(makers.map(|other| match (first, other) {
        (ValueMaker::Column(a), ValueMaker::Column(b)) => {
            SqlExpression::column_equality(a.clone(), b.clone())
        }
        (ValueMaker::Template(a), ValueMaker::Template(b)) if a.is_equivalent_to(b) => {
            a.column_equalities(b)
        }
        (ValueMaker::BlankNodeId(a), ValueMaker::BlankNodeId(b)) if a.is_compatible_with(b) => {
            a.column_equalities(b)
        }
        _ => SqlExpression::False,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::NodeMaker;
    use crate::value::{BlankNodeId, Template};
    use oxrdf::NamedNode;
    use oxrdf::vocab::xsd;
    use sqlgebra::ColumnRef;

    fn column(name: &str) -> ColumnRef {
        ColumnRef::parse(name).unwrap()
    }

    fn finish(makers: &[&NodeMaker]) -> Constraint {
        let mut collector = ConstraintCollector::default();
        for maker in makers {
            maker.describe_self(&mut collector);
        }
        collector.finish()
    }

    fn all_orders(makers: &[NodeMaker]) -> Vec<Constraint> {
        let mut results = Vec::new();
        let n = makers.len();
        let mut order = (0..n).collect::<Vec<_>>();
        // Heap's algorithm
        let mut c = vec![0; n];
        results.push(finish(&order.iter().map(|j| &makers[*j]).collect::<Vec<_>>()));
        let mut i = 0;
        while i < n {
            if c[i] < i {
                if i % 2 == 0 {
                    order.swap(0, i);
                } else {
                    order.swap(c[i], i);
                }
                results.push(finish(&order.iter().map(|j| &makers[*j]).collect::<Vec<_>>()));
                c[i] += 1;
                i = 0;
            } else {
                c[i] = 0;
                i += 1;
            }
        }
        results
    }

    #[test]
    fn verdict_is_order_independent() {
        let cases = [
            vec![
                NodeMaker::typed(NodeType::Iri, column("a.x")),
                NodeMaker::typed(NodeType::Iri, column("b.y")),
                NodeMaker::typed(NodeType::Iri, column("c.z")),
            ],
            vec![
                NodeMaker::typed(NodeType::Iri, column("a.x")),
                NodeMaker::Fixed(NamedNode::new_unchecked("http://ex.com/1").into()),
                NodeMaker::typed(NodeType::Iri, Template::parse("http://ex.com/@@b.y@@").unwrap()),
            ],
            vec![
                NodeMaker::typed(NodeType::Iri, column("a.x")),
                NodeMaker::typed(NodeType::Iri, Template::parse("http://ex.com/@@b.y@@").unwrap()),
                NodeMaker::typed(NodeType::Iri, column("c.z")),
            ],
            vec![
                NodeMaker::typed(NodeType::Iri, Template::parse("http://ex.com/@@a.x@@").unwrap()),
                NodeMaker::typed(NodeType::Iri, Template::parse("http://ex.com/@@b.y@@").unwrap()),
                NodeMaker::typed(NodeType::plain_literal(), column("c.z")),
            ],
        ];
        for makers in cases {
            let results = all_orders(&makers);
            assert_eq!(results.len(), 6);
            for result in &results {
                assert_eq!(result, &results[0]);
            }
        }
    }

    #[test]
    fn columns_are_equated_pairwise_with_the_first() {
        let makers = [
            NodeMaker::typed(NodeType::Iri, column("a.x")),
            NodeMaker::typed(NodeType::Iri, column("b.y")),
            NodeMaker::typed(NodeType::Iri, column("c.z")),
        ];
        assert_eq!(
            finish(&makers.iter().collect::<Vec<_>>()),
            Constraint::Satisfiable(SqlExpression::and_all([
                SqlExpression::column_equality(column("a.x"), column("b.y")),
                SqlExpression::column_equality(column("a.x"), column("c.z")),
            ]))
        );
    }

    #[test]
    fn column_and_template_never_match() {
        let makers = [
            NodeMaker::typed(NodeType::Iri, column("a.x")),
            NodeMaker::typed(NodeType::Iri, Template::parse("@@b.y@@").unwrap()),
        ];
        assert_eq!(
            finish(&makers.iter().collect::<Vec<_>>()),
            Constraint::Unsatisfiable
        );
    }

    #[test]
    fn templates_must_be_equivalent() {
        let a = NodeMaker::typed(NodeType::Iri, Template::parse("http://ex.com/p/@@a.x@@").unwrap());
        let b = NodeMaker::typed(NodeType::Iri, Template::parse("http://ex.com/p/@@b.y@@").unwrap());
        let c = NodeMaker::typed(NodeType::Iri, Template::parse("http://ex.com/q/@@c.z@@").unwrap());
        assert_eq!(
            finish(&[&a, &b]),
            Constraint::Satisfiable(SqlExpression::column_equality(column("a.x"), column("b.y")))
        );
        assert_eq!(finish(&[&a, &c]), Constraint::Unsatisfiable);
    }

    #[test]
    fn fixed_terms() {
        let one = NodeMaker::Fixed(NamedNode::new_unchecked("http://ex.com/1").into());
        let two = NodeMaker::Fixed(NamedNode::new_unchecked("http://ex.com/2").into());
        let template = NodeMaker::typed(NodeType::Iri, Template::parse("http://ex.com/@@a.x@@").unwrap());
        let literal = NodeMaker::typed(NodeType::plain_literal(), column("a.x"));
        assert_eq!(finish(&[&one, &one]), Constraint::Satisfiable(SqlExpression::True));
        assert_eq!(finish(&[&one, &two]), Constraint::Unsatisfiable);
        assert_eq!(
            finish(&[&one, &template]),
            Constraint::Satisfiable(SqlExpression::column_equals_value(column("a.x"), "1"))
        );
        assert_eq!(finish(&[&one, &literal]), Constraint::Unsatisfiable);
    }

    #[test]
    fn booleans_are_equated_by_value() {
        let boolean = NodeType::typed_literal(xsd::BOOLEAN.into_owned());
        let a = NodeMaker::typed(boolean.clone(), column("a.f"));
        let b = NodeMaker::typed(boolean, column("b.f"));
        let same_class = |value: &str, other: &str| {
            SqlExpression::and_all([
                SqlExpression::or_all([
                    SqlExpression::column_equals_value(column("a.f"), value),
                    SqlExpression::column_equals_value(column("a.f"), other),
                ]),
                SqlExpression::or_all([
                    SqlExpression::column_equals_value(column("b.f"), value),
                    SqlExpression::column_equals_value(column("b.f"), other),
                ]),
            ])
        };
        assert_eq!(
            finish(&[&a, &b]),
            Constraint::Satisfiable(SqlExpression::or_all([
                same_class("1", "true"),
                same_class("0", "false"),
            ]))
        );
    }

    #[test]
    fn date_times_are_compared_after_the_query() {
        let date_time = NodeType::typed_literal(xsd::DATE_TIME.into_owned());
        let a = NodeMaker::typed(date_time.clone(), column("a.d"));
        let b = NodeMaker::typed(date_time.clone(), column("b.d"));
        let c = NodeMaker::typed(date_time, Template::parse("@@c.d@@Z").unwrap());
        assert_eq!(
            finish(&[&a, &b]),
            Constraint::NeedsComparison(SqlExpression::True)
        );
        assert_eq!(finish(&[&a, &c]), Constraint::Unsatisfiable);
    }

    #[test]
    fn blank_node_ids_need_the_same_class() {
        let a = NodeMaker::typed(NodeType::BlankNode, BlankNodeId::new("A", [column("a.x")]));
        let b = NodeMaker::typed(NodeType::BlankNode, BlankNodeId::new("A", [column("b.y")]));
        let c = NodeMaker::typed(NodeType::BlankNode, BlankNodeId::new("C", [column("c.z")]));
        assert_eq!(
            finish(&[&a, &b]),
            Constraint::Satisfiable(SqlExpression::column_equality(column("a.x"), column("b.y")))
        );
        assert_eq!(finish(&[&a, &c]), Constraint::Unsatisfiable);
    }
}
