//! Conversion of filter expressions into SQL conditions.
//!
//! Only the expressions that never raise an evaluation error on the bindings of a relation
//! are converted, so that `NOT` and `OR` keep the same meaning on both sides.

use crate::algebra::{Expression, Function};
use crate::node::{NodeMaker, NodeType};
use crate::node_relation::NodeRelation;
use crate::value::ValueMaker;
use oxrdf::vocab::xsd;
use oxrdf::{Term, Variable};
use sqlgebra::SqlExpression;

/// The SQL condition selecting the rows of `relation` whose binding passes the filter.
///
/// Returns `None` if the expression can not be converted.
pub fn to_sql(expression: &Expression, relation: &NodeRelation) -> Option<SqlExpression> {
    match expression {
        Expression::And(inner) => Some(SqlExpression::and_all(
            inner
                .iter()
                .map(|e| to_sql(e, relation))
                .collect::<Option<Vec<_>>>()?,
        )),
        Expression::Or(inner) => Some(SqlExpression::or_all(
            inner
                .iter()
                .map(|e| to_sql(e, relation))
                .collect::<Option<Vec<_>>>()?,
        )),
        Expression::Not(inner) => Some(SqlExpression::not(to_sql(inner, relation)?)),
        Expression::Literal(_) => expression.effective_boolean_value().map(Into::into),
        Expression::Bound(variable) => Some(relation.node_maker(variable).is_some().into()),
        Expression::SameTerm(left, right) => same_term(left, right, relation),
        Expression::Equal(left, right) => equal(left, right, relation),
        Expression::FunctionCall(function, args) => {
            let [Expression::Variable(variable)] = args.as_slice() else {
                return None;
            };
            let maker = relation.node_maker(variable)?;
            match function {
                Function::IsIri => Some(maker.is_iri().into()),
                Function::IsBlank => Some(maker.is_blank_node().into()),
                Function::IsLiteral => Some(maker.is_literal().into()),
                _ => None,
            }
        }
        _ => None,
    }
}

fn same_term(
    left: &Expression,
    right: &Expression,
    relation: &NodeRelation,
) -> Option<SqlExpression> {
    match (left, right) {
        (Expression::Variable(a), Expression::Variable(b)) => {
            let (node_type, a, b) = column_pair(a, b, relation)?;
            node_type.is_injective().then(|| SqlExpression::column_equality(a, b))
        }
        (Expression::Variable(variable), constant) | (constant, Expression::Variable(variable)) => {
            Some(relation.node_maker(variable)?.condition_for(&constant_term(constant)?))
        }
        _ => None,
    }
}

fn equal(left: &Expression, right: &Expression, relation: &NodeRelation) -> Option<SqlExpression> {
    match (left, right) {
        (Expression::Variable(a), Expression::Variable(b)) => {
            let (node_type, a, b) = column_pair(a, b, relation)?;
            (node_type.is_injective()
                && (matches!(node_type, NodeType::Iri | NodeType::BlankNode)
                    || *node_type == NodeType::plain_literal()))
            .then(|| SqlExpression::column_equality(a, b))
        }
        (Expression::Variable(variable), constant) | (constant, Expression::Variable(variable)) => {
            let maker = relation.node_maker(variable)?;
            let term = constant_term(constant)?;
            // RDF term equality only fails on literals it can not compare
            let never_fails = term.is_named_node()
                || (is_plain_string(&term) && produces_plain_strings_or_resources(maker));
            never_fails.then(|| maker.condition_for(&term))
        }
        _ => None,
    }
}

/// The node type and the columns of two variables both made from a single column.
fn column_pair<'a>(
    a: &Variable,
    b: &Variable,
    relation: &'a NodeRelation,
) -> Option<(&'a NodeType, sqlgebra::ColumnRef, sqlgebra::ColumnRef)> {
    let (
        NodeMaker::Typed {
            node_type: type_a,
            value: ValueMaker::Column(column_a),
        },
        NodeMaker::Typed {
            node_type: type_b,
            value: ValueMaker::Column(column_b),
        },
    ) = (relation.node_maker(a)?, relation.node_maker(b)?)
    else {
        return None;
    };
    (type_a == type_b).then(|| (type_a, column_a.clone(), column_b.clone()))
}

fn constant_term(expression: &Expression) -> Option<Term> {
    match expression {
        Expression::NamedNode(node) => Some(node.clone().into()),
        Expression::Literal(literal) => Some(literal.clone().into()),
        _ => None,
    }
}

fn is_plain_string(term: &Term) -> bool {
    matches!(term, Term::Literal(literal) if literal.datatype() == xsd::STRING)
}

fn produces_plain_strings_or_resources(maker: &NodeMaker) -> bool {
    match maker {
        NodeMaker::Fixed(term) => !term.is_literal() || is_plain_string(term),
        NodeMaker::Typed { node_type, .. } => {
            matches!(node_type, NodeType::Iri | NodeType::BlankNode)
                || *node_type == NodeType::plain_literal()
        }
    }
}
