//! Physical plans: graph patterns whose basic graph patterns are replaced by the node
//! relations answering them.

use crate::algebra::{Expression, GraphPattern, OrderExpression};
use crate::binding::Binding;
use crate::error::EvaluationError;
use crate::group::group_relations;
use crate::node_relation::NodeRelation;
use crate::planner::translate_bgp;
use crate::sql_filter::to_sql;
use crate::triple::TripleRelation;
use oxrdf::Variable;
use sqlgebra::SelectQuery;
use std::fmt;
use tracing::debug;

#[derive(Eq, PartialEq, Debug, Clone)]
pub(crate) enum PlanNode {
    /// The disjoint union of the bindings of some node relations.
    Relations {
        relations: Vec<NodeRelation>,
    },
    Join {
        left: Box<Self>,
        right: Box<Self>,
    },
    /// Evaluated as a nested loop: the right plan is narrowed for each left binding.
    LeftJoin {
        left: Box<Self>,
        right: Box<Self>,
        expression: Expression,
    },
    Filter {
        inner: Box<Self>,
        expression: Expression,
    },
    Union {
        inner: Vec<Self>,
    },
    Minus {
        left: Box<Self>,
        right: Box<Self>,
    },
    Extend {
        inner: Box<Self>,
        variable: Variable,
        expression: Expression,
    },
    Values {
        bindings: Vec<Binding>,
    },
    OrderBy {
        inner: Box<Self>,
        expression: Vec<OrderExpression>,
    },
    Project {
        inner: Box<Self>,
        variables: Vec<Variable>,
    },
    Distinct {
        inner: Box<Self>,
    },
    Reduced {
        inner: Box<Self>,
    },
    Slice {
        inner: Box<Self>,
        start: usize,
        length: Option<usize>,
    },
}

/// Builds the plan of a pattern.
///
/// With `convert_filters`, the filter conjuncts directly above a basic graph pattern are
/// converted to SQL conditions where possible.
pub(crate) fn translate(
    pattern: &GraphPattern,
    bridges: &[TripleRelation],
    convert_filters: bool,
) -> Result<PlanNode, EvaluationError> {
    Ok(match pattern {
        GraphPattern::Bgp { patterns } => PlanNode::Relations {
            relations: translate_bgp(patterns, bridges)?,
        },
        GraphPattern::Filter { expression, inner } => match &**inner {
            GraphPattern::Bgp { patterns } if convert_filters => {
                let relations = translate_bgp(patterns, bridges)?;
                filter_relations(relations, expression)
            }
            _ => PlanNode::Filter {
                inner: Box::new(translate(inner, bridges, convert_filters)?),
                expression: expression.clone(),
            },
        },
        GraphPattern::Join { left, right } => PlanNode::Join {
            left: Box::new(translate(left, bridges, convert_filters)?),
            right: Box::new(translate(right, bridges, convert_filters)?),
        },
        GraphPattern::LeftJoin {
            left,
            right,
            expression,
        } => PlanNode::LeftJoin {
            left: Box::new(translate(left, bridges, convert_filters)?),
            right: Box::new(translate(right, bridges, convert_filters)?),
            expression: expression.clone(),
        },
        GraphPattern::Union { inner } => PlanNode::Union {
            inner: inner
                .iter()
                .map(|p| translate(p, bridges, convert_filters))
                .collect::<Result<_, _>>()?,
        },
        GraphPattern::Minus { left, right } => PlanNode::Minus {
            left: Box::new(translate(left, bridges, convert_filters)?),
            right: Box::new(translate(right, bridges, convert_filters)?),
        },
        GraphPattern::Extend {
            inner,
            variable,
            expression,
        } => PlanNode::Extend {
            inner: Box::new(translate(inner, bridges, convert_filters)?),
            variable: variable.clone(),
            expression: expression.clone(),
        },
        GraphPattern::Values {
            variables,
            bindings,
        } => PlanNode::Values {
            bindings: bindings
                .iter()
                .map(|row| {
                    variables
                        .iter()
                        .zip(row)
                        .filter_map(|(v, t)| Some((v.clone(), t.clone()?)))
                        .collect()
                })
                .collect(),
        },
        GraphPattern::OrderBy { inner, expression } => PlanNode::OrderBy {
            inner: Box::new(translate(inner, bridges, convert_filters)?),
            expression: expression.clone(),
        },
        GraphPattern::Project { inner, variables } => PlanNode::Project {
            inner: Box::new(translate(inner, bridges, convert_filters)?),
            variables: variables.clone(),
        },
        GraphPattern::Distinct { inner } => PlanNode::Distinct {
            inner: Box::new(translate(inner, bridges, convert_filters)?),
        },
        GraphPattern::Reduced { inner } => PlanNode::Reduced {
            inner: Box::new(translate(inner, bridges, convert_filters)?),
        },
        GraphPattern::Slice {
            inner,
            start,
            length,
        } => PlanNode::Slice {
            inner: Box::new(translate(inner, bridges, convert_filters)?),
            start: *start,
            length: *length,
        },
    })
}

/// Adds the SQL form of each conjunct to the relations where it converts.
///
/// A conjunct is only removed from the in-process filter if it converts for all relations.
fn filter_relations(relations: Vec<NodeRelation>, expression: &Expression) -> PlanNode {
    let mut relations = relations;
    let mut remaining = Vec::new();
    for conjunct in expression.clone().into_conjuncts() {
        let mut converted_everywhere = true;
        relations = relations
            .into_iter()
            .map(|relation| {
                if let Some(condition) = to_sql(&conjunct, &relation) {
                    relation.select(condition)
                } else {
                    converted_everywhere = false;
                    relation
                }
            })
            .collect();
        if !converted_everywhere {
            debug!("The filter {conjunct:?} is evaluated in process");
            remaining.push(conjunct);
        }
    }
    let before = relations.len();
    relations.retain(|r| !r.is_empty());
    debug!(
        "{} relations out of {before} remain after the SQL filter conversion",
        relations.len()
    );
    let node = PlanNode::Relations { relations };
    let remaining = Expression::and_all(remaining);
    if remaining.effective_boolean_value() == Some(true) {
        node
    } else {
        PlanNode::Filter {
            inner: Box::new(node),
            expression: remaining,
        }
    }
}

impl PlanNode {
    /// Narrows the plan to the solutions compatible with `binding`.
    ///
    /// The returned plan gives all the solutions of this plan compatible with `binding`,
    /// maybe with some incompatible ones.
    #[must_use]
    pub(crate) fn substitute(&self, binding: &Binding) -> Self {
        match self {
            Self::Relations { relations } => Self::Relations {
                relations: relations
                    .iter()
                    .filter_map(|r| r.substitute(binding))
                    .collect(),
            },
            Self::Join { left, right } => Self::Join {
                left: Box::new(left.substitute(binding)),
                right: Box::new(right.substitute(binding)),
            },
            // Narrowing the optional or the removed side would change which left solutions
            // are kept
            Self::LeftJoin {
                left,
                right,
                expression,
            } => Self::LeftJoin {
                left: Box::new(left.substitute(binding)),
                right: right.clone(),
                expression: expression.clone(),
            },
            Self::Minus { left, right } => Self::Minus {
                left: Box::new(left.substitute(binding)),
                right: right.clone(),
            },
            Self::Filter { inner, expression } => Self::Filter {
                inner: Box::new(inner.substitute(binding)),
                expression: expression.clone(),
            },
            Self::Union { inner } => Self::Union {
                inner: inner.iter().map(|p| p.substitute(binding)).collect(),
            },
            Self::Extend {
                inner,
                variable,
                expression,
            } => {
                let mut binding = binding.clone();
                binding.remove(variable);
                Self::Extend {
                    inner: Box::new(inner.substitute(&binding)),
                    variable: variable.clone(),
                    expression: expression.clone(),
                }
            }
            Self::Values { bindings } => Self::Values {
                bindings: bindings
                    .iter()
                    .filter(|b| b.is_compatible_with(binding))
                    .cloned()
                    .collect(),
            },
            Self::OrderBy { inner, expression } => Self::OrderBy {
                inner: Box::new(inner.substitute(binding)),
                expression: expression.clone(),
            },
            Self::Project { inner, variables } => Self::Project {
                inner: Box::new(inner.substitute(&binding.project(variables))),
                variables: variables.clone(),
            },
            Self::Distinct { inner } => Self::Distinct {
                inner: Box::new(inner.substitute(binding)),
            },
            Self::Reduced { inner } => Self::Reduced {
                inner: Box::new(inner.substitute(binding)),
            },
            // The slice bounds apply to all the solutions
            Self::Slice { .. } => self.clone(),
        }
    }

    fn fmt_indented(&self, f: &mut fmt::Formatter<'_>, depth: usize) -> fmt::Result {
        let indent = "  ".repeat(depth);
        match self {
            Self::Relations { relations } => {
                writeln!(f, "{indent}Relations")?;
                for group in group_relations(relations.iter().cloned()) {
                    writeln!(
                        f,
                        "{indent}  {} ({} bindings)",
                        SelectQuery::new(group.relation().clone()),
                        group.members().len()
                    )?;
                }
                Ok(())
            }
            Self::Join { left, right } => {
                writeln!(f, "{indent}Join")?;
                left.fmt_indented(f, depth + 1)?;
                right.fmt_indented(f, depth + 1)
            }
            Self::LeftJoin {
                left,
                right,
                expression,
            } => {
                writeln!(f, "{indent}LeftJoin {expression:?}")?;
                left.fmt_indented(f, depth + 1)?;
                right.fmt_indented(f, depth + 1)
            }
            Self::Minus { left, right } => {
                writeln!(f, "{indent}Minus")?;
                left.fmt_indented(f, depth + 1)?;
                right.fmt_indented(f, depth + 1)
            }
            Self::Filter { inner, expression } => {
                writeln!(f, "{indent}Filter {expression:?}")?;
                inner.fmt_indented(f, depth + 1)
            }
            Self::Union { inner } => {
                writeln!(f, "{indent}Union")?;
                for child in inner {
                    child.fmt_indented(f, depth + 1)?;
                }
                Ok(())
            }
            Self::Extend {
                inner,
                variable,
                expression,
            } => {
                writeln!(f, "{indent}Extend {variable} := {expression:?}")?;
                inner.fmt_indented(f, depth + 1)
            }
            Self::Values { bindings } => writeln!(f, "{indent}Values ({} rows)", bindings.len()),
            Self::OrderBy { inner, expression } => {
                writeln!(f, "{indent}OrderBy {expression:?}")?;
                inner.fmt_indented(f, depth + 1)
            }
            Self::Project { inner, variables } => {
                write!(f, "{indent}Project")?;
                for variable in variables {
                    write!(f, " {variable}")?;
                }
                writeln!(f)?;
                inner.fmt_indented(f, depth + 1)
            }
            Self::Distinct { inner } => {
                writeln!(f, "{indent}Distinct")?;
                inner.fmt_indented(f, depth + 1)
            }
            Self::Reduced { inner } => {
                writeln!(f, "{indent}Reduced")?;
                inner.fmt_indented(f, depth + 1)
            }
            Self::Slice {
                inner,
                start,
                length,
            } => {
                write!(f, "{indent}Slice from {start}")?;
                if let Some(length) = length {
                    write!(f, " length {length}")?;
                }
                writeln!(f)?;
                inner.fmt_indented(f, depth + 1)
            }
        }
    }
}

impl fmt::Display for PlanNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.fmt_indented(f, 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algebra::TriplePattern;
    use crate::node::{NodeMaker, NodeType};
    use crate::value::Template;
    use oxrdf::{Literal, NamedNode, Term};
    use sqlgebra::{ColumnRef, Database, Relation, SqlExpression};

    fn var(name: &str) -> Variable {
        Variable::new_unchecked(name)
    }

    fn bridges() -> Vec<TripleRelation> {
        vec![
            TripleRelation::new(
                Relation::new(Database::new("db")),
                NodeMaker::typed(
                    NodeType::Iri,
                    Template::parse("http://ex.com/p/@@people.id@@").unwrap(),
                ),
                NodeMaker::Fixed(NamedNode::new_unchecked("http://ex.com/name").into()),
                NodeMaker::typed(NodeType::plain_literal(), ColumnRef::parse("people.name").unwrap()),
            ),
            TripleRelation::new(
                Relation::new(Database::new("db")),
                NodeMaker::typed(
                    NodeType::Iri,
                    Template::parse("http://ex.com/p/@@people.id@@").unwrap(),
                ),
                NodeMaker::Fixed(NamedNode::new_unchecked("http://ex.com/name").into()),
                NodeMaker::typed(
                    NodeType::language_literal("en"),
                    ColumnRef::parse("people.label").unwrap(),
                ),
            ),
        ]
    }

    fn bgp() -> GraphPattern {
        GraphPattern::Bgp {
            patterns: vec![TriplePattern::new(
                var("s"),
                NamedNode::new_unchecked("http://ex.com/name"),
                var("o"),
            )],
        }
    }

    fn equal(variable: &str, value: &str) -> Expression {
        Expression::Equal(
            Box::new(var(variable).into()),
            Box::new(Literal::new_simple_literal(value).into()),
        )
    }

    #[test]
    fn filters_converted_everywhere_are_removed() {
        let pattern = GraphPattern::filter(
            bgp(),
            Expression::SameTerm(
                Box::new(var("o").into()),
                Box::new(Literal::new_simple_literal("Bob").into()),
            ),
        );
        // The language tagged literals can not be "Bob"
        let PlanNode::Relations { relations } = translate(&pattern, &bridges(), true).unwrap()
        else {
            panic!("the filter must be removed")
        };
        assert_eq!(relations.len(), 1);
        assert_eq!(
            relations[0].relation().condition(),
            &SqlExpression::column_equals_value(ColumnRef::parse("people.name").unwrap(), "Bob")
        );
    }

    #[test]
    fn filters_partially_converted_are_kept() {
        // "=" with a language tagged literal may be an error
        let pattern = GraphPattern::filter(bgp(), equal("o", "Bob"));
        let PlanNode::Filter { inner, expression } = translate(&pattern, &bridges(), true).unwrap()
        else {
            panic!("the filter must be kept")
        };
        assert_eq!(expression, equal("o", "Bob"));
        let PlanNode::Relations { relations } = *inner else {
            panic!("expected relations")
        };
        assert_eq!(relations.len(), 2);
        assert_eq!(
            relations[0].relation().condition(),
            &SqlExpression::column_equals_value(ColumnRef::parse("people.name").unwrap(), "Bob")
        );
        assert!(relations[1].relation().condition().is_true());
    }

    #[test]
    fn conservative_mode_keeps_filters() {
        let pattern = GraphPattern::filter(bgp(), equal("o", "Bob"));
        let PlanNode::Filter { inner, .. } = translate(&pattern, &bridges(), false).unwrap() else {
            panic!("the filter must be kept")
        };
        let PlanNode::Relations { relations } = *inner else {
            panic!("expected relations")
        };
        assert!(relations.iter().all(|r| r.relation().condition().is_true()));
    }

    #[test]
    fn substitution_narrows_relations() {
        let plan = translate(&bgp(), &bridges(), false).unwrap();
        let binding = Binding::from_iter([(
            var("o"),
            Term::from(Literal::new_language_tagged_literal_unchecked("Bob", "en")),
        )]);
        let PlanNode::Relations { relations } = plan.substitute(&binding) else {
            panic!("expected relations")
        };
        assert_eq!(relations.len(), 1);
        assert_eq!(
            relations[0].relation().condition(),
            &SqlExpression::column_equals_value(ColumnRef::parse("people.label").unwrap(), "Bob")
        );
    }

    #[test]
    fn substitution_stops_at_slices() {
        let plan = PlanNode::Slice {
            inner: Box::new(translate(&bgp(), &bridges(), false).unwrap()),
            start: 0,
            length: Some(1),
        };
        let binding = Binding::from_iter([(
            var("o"),
            Term::from(Literal::new_simple_literal("Bob")),
        )]);
        assert_eq!(plan.substitute(&binding), plan);
    }
}
