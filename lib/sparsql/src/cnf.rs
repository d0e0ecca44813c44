//! Conjunctive normal form of filter expressions, to push their parts independently.

use crate::algebra::Expression;

/// Bound on the number of clauses created by distributing disjunctions.
const MAX_CLAUSES: usize = 64;

/// Splits a filter expression into conjuncts.
///
/// The expression is rewritten in conjunctive normal form and the rewrite is only kept if it
/// gives strictly more conjuncts than splitting the original top-level conjunction.
///
/// `NOT(a AND b)` is kept as is and the distribution is abandoned once it would create more
/// than a fixed number of clauses.
pub fn to_conjuncts(expression: Expression) -> Vec<Expression> {
    let naive = expression.clone().into_conjuncts();
    let cnf = conjuncts(distribute(push_negations(expression)));
    if cnf.len() > naive.len() { cnf } else { naive }
}

/// De Morgan laws, bottom-up.
fn push_negations(expression: Expression) -> Expression {
    match expression {
        Expression::Not(inner) => negate(push_negations(*inner)),
        Expression::And(inner) => Expression::And(inner.into_iter().map(push_negations).collect()),
        Expression::Or(inner) => Expression::Or(inner.into_iter().map(push_negations).collect()),
        e => e,
    }
}

/// Negates an expression on which the negations are already pushed.
fn negate(expression: Expression) -> Expression {
    match expression {
        Expression::Not(inner) => *inner,
        Expression::Or(inner) => Expression::And(inner.into_iter().map(negate).collect()),
        e => Expression::Not(Box::new(e)),
    }
}

/// `a OR (b AND c)` into `(a OR b) AND (a OR c)`, bottom-up.
fn distribute(expression: Expression) -> Expression {
    match expression {
        Expression::And(inner) => Expression::And(
            inner
                .into_iter()
                .flat_map(|e| conjuncts(distribute(e)))
                .collect(),
        ),
        Expression::Or(inner) => {
            let inner = inner.into_iter().map(distribute).collect::<Vec<_>>();
            let mut clauses = vec![Vec::new()];
            for arg in &inner {
                let arg_clauses = conjuncts(arg.clone());
                if clauses.len() * arg_clauses.len() > MAX_CLAUSES {
                    return Expression::Or(inner);
                }
                clauses = clauses
                    .iter()
                    .flat_map(|clause| {
                        arg_clauses.iter().map(move |arg_clause| {
                            let mut clause = clause.clone();
                            clause.extend(disjuncts(arg_clause.clone()));
                            clause
                        })
                    })
                    .collect();
            }
            Expression::And(clauses.into_iter().map(clause).collect())
        }
        e => e,
    }
}

fn conjuncts(expression: Expression) -> Vec<Expression> {
    match expression {
        Expression::And(inner) => inner.into_iter().flat_map(conjuncts).collect(),
        e => vec![e],
    }
}

fn disjuncts(expression: Expression) -> Vec<Expression> {
    match expression {
        Expression::Or(inner) => inner.into_iter().flat_map(disjuncts).collect(),
        e => vec![e],
    }
}

fn clause(mut disjuncts: Vec<Expression>) -> Expression {
    if disjuncts.len() == 1 {
        if let Some(single) = disjuncts.pop() {
            return single;
        }
    }
    Expression::Or(disjuncts)
}
