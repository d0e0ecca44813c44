use crate::algebra::{Expression, GraphPattern};
use crate::cnf::to_conjuncts;
use oxrdf::Variable;
use std::collections::BTreeSet;

/// Moves the filters as close as possible to the basic graph patterns.
///
/// A filter conjunct only enters a child whose solutions always bind all the variables
/// it uses. The rewritten pattern has the same solutions as the original one.
pub fn push_filters(pattern: GraphPattern) -> GraphPattern {
    push(pattern, Vec::new())
}

fn push(pattern: GraphPattern, mut filters: Vec<Expression>) -> GraphPattern {
    match pattern {
        GraphPattern::Bgp { .. } | GraphPattern::Values { .. } => {
            GraphPattern::filter(pattern, Expression::and_all(filters))
        }
        GraphPattern::Filter { expression, inner } => {
            filters.extend(to_conjuncts(expression));
            push(*inner, filters)
        }
        GraphPattern::Join { left, right } => {
            let left_variables = left.certain_variables();
            let right_variables = right.certain_variables();
            let mut left_filters = Vec::new();
            let mut right_filters = Vec::new();
            let mut final_filters = Vec::new();
            for filter in filters {
                let push_left = are_all_variables_bound(&filter, &left_variables);
                let push_right = are_all_variables_bound(&filter, &right_variables);
                if push_left {
                    if push_right {
                        left_filters.push(filter.clone());
                        right_filters.push(filter);
                    } else {
                        left_filters.push(filter);
                    }
                } else if push_right {
                    right_filters.push(filter);
                } else {
                    final_filters.push(filter);
                }
            }
            GraphPattern::filter(
                GraphPattern::Join {
                    left: Box::new(push(*left, left_filters)),
                    right: Box::new(push(*right, right_filters)),
                },
                Expression::and_all(final_filters),
            )
        }
        GraphPattern::LeftJoin {
            left,
            right,
            expression,
        } => {
            let left_variables = left.certain_variables();
            let right_variables = right.certain_variables();
            let mut left_filters = Vec::new();
            let mut right_filters = Vec::new();
            let mut final_filters = Vec::new();
            for filter in filters {
                // The optional side only gets what the required side already checks
                if are_all_variables_bound(&filter, &left_variables) {
                    if are_all_variables_bound(&filter, &right_variables) {
                        right_filters.push(filter.clone());
                    }
                    left_filters.push(filter);
                } else {
                    final_filters.push(filter);
                }
            }
            let expression = if expression.effective_boolean_value().is_none()
                && (are_all_variables_bound(&expression, &right_variables)
                    || are_no_variables_possible(&expression, &left.possible_variables()))
            {
                right_filters.extend(to_conjuncts(expression));
                true.into()
            } else {
                expression
            };
            GraphPattern::filter(
                GraphPattern::LeftJoin {
                    left: Box::new(push(*left, left_filters)),
                    right: Box::new(push(*right, right_filters)),
                    expression,
                },
                Expression::and_all(final_filters),
            )
        }
        GraphPattern::Union { inner } => GraphPattern::union_all(
            inner
                .into_iter()
                .map(|branch| push(branch, filters.clone())),
        ),
        GraphPattern::Minus { left, right } => GraphPattern::Minus {
            left: Box::new(push(*left, filters)),
            right: Box::new(push(*right, Vec::new())),
        },
        GraphPattern::Extend {
            inner,
            variable,
            expression,
        } => {
            let (final_filters, inner_filters) = filters
                .into_iter()
                .partition::<Vec<_>, _>(|f| f.used_variables().contains(&variable));
            GraphPattern::filter(
                GraphPattern::Extend {
                    inner: Box::new(push(*inner, inner_filters)),
                    variable,
                    expression,
                },
                Expression::and_all(final_filters),
            )
        }
        GraphPattern::OrderBy { inner, expression } => GraphPattern::filter(
            GraphPattern::OrderBy {
                inner: Box::new(push(*inner, Vec::new())),
                expression,
            },
            Expression::and_all(filters),
        ),
        GraphPattern::Project { inner, variables } => GraphPattern::filter(
            GraphPattern::Project {
                inner: Box::new(push(*inner, Vec::new())),
                variables,
            },
            Expression::and_all(filters),
        ),
        GraphPattern::Distinct { inner } => GraphPattern::filter(
            GraphPattern::Distinct {
                inner: Box::new(push(*inner, Vec::new())),
            },
            Expression::and_all(filters),
        ),
        GraphPattern::Reduced { inner } => GraphPattern::filter(
            GraphPattern::Reduced {
                inner: Box::new(push(*inner, Vec::new())),
            },
            Expression::and_all(filters),
        ),
        GraphPattern::Slice {
            inner,
            start,
            length,
        } => GraphPattern::filter(
            GraphPattern::Slice {
                inner: Box::new(push(*inner, Vec::new())),
                start,
                length,
            },
            Expression::and_all(filters),
        ),
    }
}

fn are_all_variables_bound(expression: &Expression, bound: &BTreeSet<&Variable>) -> bool {
    expression
        .used_variables()
        .into_iter()
        .all(|v| bound.contains(v))
}

fn are_no_variables_possible(expression: &Expression, possible: &BTreeSet<&Variable>) -> bool {
    expression
        .used_variables()
        .into_iter()
        .all(|v| !possible.contains(v))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algebra::TriplePattern;
    use oxrdf::{Literal, NamedNode, Term};

    fn var(name: &str) -> Variable {
        Variable::new_unchecked(name)
    }

    fn equal(variable: &str, value: i64) -> Expression {
        Expression::Equal(
            Box::new(var(variable).into()),
            Box::new(Literal::from(value).into()),
        )
    }

    fn values(variables: &[&str], rows: &[&[i64]]) -> GraphPattern {
        GraphPattern::Values {
            variables: variables.iter().map(|v| var(v)).collect(),
            bindings: rows
                .iter()
                .map(|row| {
                    row.iter()
                        .map(|v| Some(Term::from(Literal::from(*v))))
                        .collect()
                })
                .collect(),
        }
    }

    fn bgp(subject: &str, object: &str) -> GraphPattern {
        GraphPattern::Bgp {
            patterns: vec![TriplePattern::new(
                var(subject),
                NamedNode::new_unchecked("http://ex.com/p"),
                var(object),
            )],
        }
    }

    #[test]
    fn optional_only_filter_stays_above_the_left_join() {
        let left_join = GraphPattern::LeftJoin {
            left: Box::new(values(&["x"], &[&[1], &[2]])),
            right: Box::new(values(&["x", "y"], &[&[1, 9]])),
            expression: true.into(),
        };
        let pattern = GraphPattern::Filter {
            expression: equal("y", 9),
            inner: Box::new(left_join.clone()),
        };
        assert_eq!(
            push_filters(pattern),
            GraphPattern::Filter {
                expression: equal("y", 9),
                inner: Box::new(left_join),
            }
        );
    }

    #[test]
    fn required_filter_is_copied_to_the_optional_side() {
        let pattern = GraphPattern::Filter {
            expression: equal("x", 1),
            inner: Box::new(GraphPattern::LeftJoin {
                left: Box::new(bgp("x", "y")),
                right: Box::new(bgp("x", "z")),
                expression: true.into(),
            }),
        };
        assert_eq!(
            push_filters(pattern),
            GraphPattern::LeftJoin {
                left: Box::new(GraphPattern::filter(bgp("x", "y"), equal("x", 1))),
                right: Box::new(GraphPattern::filter(bgp("x", "z"), equal("x", 1))),
                expression: true.into(),
            }
        );
    }

    #[test]
    fn join_filters_go_where_their_variables_are() {
        let both = Expression::Equal(Box::new(var("y").into()), Box::new(var("z").into()));
        let pattern = GraphPattern::Filter {
            expression: Expression::And(vec![equal("x", 1), equal("a", 2), both.clone()]),
            inner: Box::new(GraphPattern::Join {
                left: Box::new(bgp("x", "y")),
                right: Box::new(bgp("y", "z")),
            }),
        };
        assert_eq!(
            push_filters(pattern),
            GraphPattern::filter(
                GraphPattern::Join {
                    left: Box::new(GraphPattern::filter(bgp("x", "y"), equal("x", 1))),
                    right: Box::new(GraphPattern::filter(bgp("y", "z"), both)),
                },
                equal("a", 2),
            )
        );
    }

    #[test]
    fn union_branches_all_get_the_filters() {
        let pattern = GraphPattern::Filter {
            expression: equal("x", 1),
            inner: Box::new(GraphPattern::Union {
                inner: vec![bgp("x", "y"), bgp("z", "y")],
            }),
        };
        assert_eq!(
            push_filters(pattern),
            GraphPattern::Union {
                inner: vec![
                    GraphPattern::filter(bgp("x", "y"), equal("x", 1)),
                    GraphPattern::filter(bgp("z", "y"), equal("x", 1)),
                ]
            }
        );
    }

    #[test]
    fn cnf_conjuncts_are_pushed_separately() {
        // (?x = 1 || (?y = 2 && ?z = 3)) splits into (?x = 1 || ?y = 2) && (?x = 1 || ?z = 3)
        let pattern = GraphPattern::Filter {
            expression: Expression::Or(vec![
                equal("x", 1),
                Expression::And(vec![equal("y", 2), equal("z", 3)]),
            ]),
            inner: Box::new(GraphPattern::Join {
                left: Box::new(bgp("x", "y")),
                right: Box::new(bgp("y", "z")),
            }),
        };
        let GraphPattern::Filter { expression, inner } = push_filters(pattern) else {
            panic!("expected a filter on top")
        };
        assert_eq!(
            expression,
            Expression::Or(vec![equal("x", 1), equal("z", 3)])
        );
        let GraphPattern::Join { left, .. } = *inner else {
            panic!("expected a join")
        };
        assert_eq!(
            *left,
            GraphPattern::filter(
                bgp("x", "y"),
                Expression::Or(vec![equal("x", 1), equal("y", 2)])
            )
        );
    }

    #[test]
    fn filters_stay_above_slices() {
        let slice = GraphPattern::Slice {
            inner: Box::new(bgp("x", "y")),
            start: 0,
            length: Some(1),
        };
        let pattern = GraphPattern::Filter {
            expression: equal("x", 1),
            inner: Box::new(slice.clone()),
        };
        assert_eq!(
            push_filters(pattern),
            GraphPattern::filter(slice, equal("x", 1))
        );
    }
}
