//! [SPARQL 1.1 Query Algebra](https://www.w3.org/TR/sparql11-query/#sparqlQuery) subset evaluated against the bridges.

use crate::error::EvaluationError;
use oxrdf::vocab::xsd;
use oxrdf::{BlankNode, Literal, NamedNode, Term, Variable};
use spargebra::algebra::{
    Expression as AlExpression, Function as AlFunction, GraphPattern as AlGraphPattern,
    OrderExpression as AlOrderExpression,
};
use spargebra::term::{
    GroundTerm, GroundTermPattern, NamedNodePattern, TermPattern as AlTermPattern,
    TriplePattern as AlTriplePattern,
};
use std::collections::{BTreeSet, HashMap};
use std::fmt;

/// A position of a [`TriplePattern`]: a constant term or a variable.
#[derive(Eq, PartialEq, Debug, Clone, Hash)]
pub enum PatternTerm {
    Term(Term),
    Variable(Variable),
}

impl PatternTerm {
    #[inline]
    pub fn as_term(&self) -> Option<&Term> {
        match self {
            Self::Term(term) => Some(term),
            Self::Variable(_) => None,
        }
    }

    #[inline]
    pub fn as_variable(&self) -> Option<&Variable> {
        match self {
            Self::Term(_) => None,
            Self::Variable(variable) => Some(variable),
        }
    }
}

impl fmt::Display for PatternTerm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Term(term) => term.fmt(f),
            Self::Variable(variable) => variable.fmt(f),
        }
    }
}

impl From<Variable> for PatternTerm {
    #[inline]
    fn from(variable: Variable) -> Self {
        Self::Variable(variable)
    }
}

impl From<NamedNode> for PatternTerm {
    #[inline]
    fn from(node: NamedNode) -> Self {
        Self::Term(node.into())
    }
}

impl From<Literal> for PatternTerm {
    #[inline]
    fn from(literal: Literal) -> Self {
        Self::Term(literal.into())
    }
}

impl From<Term> for PatternTerm {
    #[inline]
    fn from(term: Term) -> Self {
        Self::Term(term)
    }
}

/// A triple pattern. Blank nodes of the query are already replaced by variables.
#[derive(Eq, PartialEq, Debug, Clone, Hash)]
pub struct TriplePattern {
    pub subject: PatternTerm,
    pub predicate: PatternTerm,
    pub object: PatternTerm,
}

impl TriplePattern {
    pub fn new(
        subject: impl Into<PatternTerm>,
        predicate: impl Into<PatternTerm>,
        object: impl Into<PatternTerm>,
    ) -> Self {
        Self {
            subject: subject.into(),
            predicate: predicate.into(),
            object: object.into(),
        }
    }

    /// The positions of the pattern, in subject, predicate, object order.
    #[inline]
    pub fn positions(&self) -> [&PatternTerm; 3] {
        [&self.subject, &self.predicate, &self.object]
    }

    pub fn variables(&self) -> impl Iterator<Item = &Variable> {
        self.positions()
            .into_iter()
            .filter_map(PatternTerm::as_variable)
    }

    fn from_sparql_algebra(
        pattern: &AlTriplePattern,
        blank_nodes: &mut HashMap<BlankNode, Variable>,
    ) -> Result<Self, EvaluationError> {
        Ok(Self {
            subject: term_pattern_from_algebra(&pattern.subject, blank_nodes)?,
            predicate: match &pattern.predicate {
                NamedNodePattern::NamedNode(node) => node.clone().into(),
                NamedNodePattern::Variable(variable) => variable.clone().into(),
            },
            object: term_pattern_from_algebra(&pattern.object, blank_nodes)?,
        })
    }
}

impl fmt::Display for TriplePattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.subject, self.predicate, self.object)
    }
}

fn term_pattern_from_algebra(
    pattern: &AlTermPattern,
    blank_nodes: &mut HashMap<BlankNode, Variable>,
) -> Result<PatternTerm, EvaluationError> {
    match pattern {
        AlTermPattern::Variable(variable) => Ok(variable.clone().into()),
        AlTermPattern::BlankNode(node) => Ok(blank_nodes
            .entry(node.clone())
            .or_insert_with(|| blank_node_variable(node))
            .clone()
            .into()),
        pattern => Term::try_from(pattern.clone())
            .map(PatternTerm::Term)
            .map_err(|()| EvaluationError::Unsupported(format!("The term pattern {pattern}"))),
    }
}

/// The variable standing for a blank node of the query.
///
/// The name is not a valid SPARQL variable name so it never clashes with a query variable.
pub(crate) fn blank_node_variable(node: &BlankNode) -> Variable {
    Variable::new_unchecked(format!("_:{}", node.as_str()))
}

fn ground_term_from_algebra(term: &GroundTerm) -> Result<Term, EvaluationError> {
    Term::try_from(AlTermPattern::from(GroundTermPattern::from(term.clone())))
        .map_err(|()| EvaluationError::Unsupported(format!("The term {term}")))
}

/// The functions that can be evaluated in-process.
#[derive(Eq, PartialEq, Debug, Clone, Copy, Hash)]
pub enum Function {
    Str,
    Lang,
    LangMatches,
    Datatype,
    Iri,
    StrLen,
    UCase,
    LCase,
    Contains,
    StrStarts,
    StrEnds,
    IsIri,
    IsBlank,
    IsLiteral,
    IsNumeric,
    Regex,
}

impl Function {
    fn from_sparql_algebra(function: &AlFunction) -> Result<Self, EvaluationError> {
        Ok(match function {
            AlFunction::Str => Self::Str,
            AlFunction::Lang => Self::Lang,
            AlFunction::LangMatches => Self::LangMatches,
            AlFunction::Datatype => Self::Datatype,
            AlFunction::Iri => Self::Iri,
            AlFunction::StrLen => Self::StrLen,
            AlFunction::UCase => Self::UCase,
            AlFunction::LCase => Self::LCase,
            AlFunction::Contains => Self::Contains,
            AlFunction::StrStarts => Self::StrStarts,
            AlFunction::StrEnds => Self::StrEnds,
            AlFunction::IsIri => Self::IsIri,
            AlFunction::IsBlank => Self::IsBlank,
            AlFunction::IsLiteral => Self::IsLiteral,
            AlFunction::IsNumeric => Self::IsNumeric,
            AlFunction::Regex => Self::Regex,
            _ => {
                return Err(EvaluationError::Unsupported(format!(
                    "The function {function}"
                )));
            }
        })
    }
}

/// An [expression](https://www.w3.org/TR/sparql11-query/#expressions).
#[derive(Eq, PartialEq, Debug, Clone, Hash)]
pub enum Expression {
    NamedNode(NamedNode),
    Literal(Literal),
    Variable(Variable),
    /// [Logical-or](https://www.w3.org/TR/sparql11-query/#func-logical-or).
    Or(Vec<Self>),
    /// [Logical-and](https://www.w3.org/TR/sparql11-query/#func-logical-and).
    And(Vec<Self>),
    /// [RDFterm-equal](https://www.w3.org/TR/sparql11-query/#func-RDFterm-equal) and all the XSD equalities.
    Equal(Box<Self>, Box<Self>),
    /// [sameTerm](https://www.w3.org/TR/sparql11-query/#func-sameTerm).
    SameTerm(Box<Self>, Box<Self>),
    Greater(Box<Self>, Box<Self>),
    GreaterOrEqual(Box<Self>, Box<Self>),
    Less(Box<Self>, Box<Self>),
    LessOrEqual(Box<Self>, Box<Self>),
    Add(Box<Self>, Box<Self>),
    Subtract(Box<Self>, Box<Self>),
    Multiply(Box<Self>, Box<Self>),
    Divide(Box<Self>, Box<Self>),
    UnaryPlus(Box<Self>),
    UnaryMinus(Box<Self>),
    /// [fn:not](https://www.w3.org/TR/xpath-functions-31/#func-not).
    Not(Box<Self>),
    /// [BOUND](https://www.w3.org/TR/sparql11-query/#func-bound).
    Bound(Variable),
    /// [IF](https://www.w3.org/TR/sparql11-query/#func-if).
    If(Box<Self>, Box<Self>, Box<Self>),
    /// [COALESCE](https://www.w3.org/TR/sparql11-query/#func-coalesce).
    Coalesce(Vec<Self>),
    FunctionCall(Function, Vec<Self>),
}

impl Expression {
    pub fn or_all(args: impl IntoIterator<Item = Self>) -> Self {
        let mut all = Vec::new();
        for arg in args {
            match arg.effective_boolean_value() {
                Some(true) => return true.into(),
                Some(false) => (),
                None => {
                    if let Self::Or(args) = arg {
                        all.extend(args);
                    } else {
                        all.push(arg);
                    }
                }
            }
        }
        match all.pop() {
            None => false.into(),
            Some(result) if all.is_empty() => result.into_boolean(),
            Some(last) => {
                all.push(last);
                Self::Or(all)
            }
        }
    }

    pub fn and_all(args: impl IntoIterator<Item = Self>) -> Self {
        let mut all = Vec::new();
        for arg in args {
            match arg.effective_boolean_value() {
                Some(false) => return false.into(),
                Some(true) => (),
                None => {
                    if let Self::And(args) = arg {
                        all.extend(args);
                    } else {
                        all.push(arg);
                    }
                }
            }
        }
        match all.pop() {
            None => true.into(),
            Some(result) if all.is_empty() => result.into_boolean(),
            Some(last) => {
                all.push(last);
                Self::And(all)
            }
        }
    }

    /// The top-level conjuncts of the expression.
    pub fn into_conjuncts(self) -> Vec<Self> {
        match self {
            Self::And(inner) => inner.into_iter().flat_map(Self::into_conjuncts).collect(),
            e if e.effective_boolean_value() == Some(true) => Vec::new(),
            e => vec![e],
        }
    }

    pub fn negate(inner: Self) -> Self {
        match inner.effective_boolean_value() {
            Some(value) => (!value).into(),
            None => Self::Not(Box::new(inner)),
        }
    }

    /// The value of a constant boolean expression.
    pub fn effective_boolean_value(&self) -> Option<bool> {
        let Self::Literal(literal) = self else {
            return None;
        };
        match literal.datatype() {
            xsd::BOOLEAN => match literal.value() {
                "true" | "1" => Some(true),
                "false" | "0" => Some(false),
                _ => None,
            },
            xsd::STRING => Some(!literal.value().is_empty()),
            _ => None,
        }
    }

    pub fn used_variables(&self) -> BTreeSet<&Variable> {
        let mut variables = BTreeSet::new();
        self.lookup_used_variables(&mut |v| {
            variables.insert(v);
        });
        variables
    }

    pub fn lookup_used_variables<'a>(&'a self, callback: &mut impl FnMut(&'a Variable)) {
        match self {
            Self::NamedNode(_) | Self::Literal(_) => {}
            Self::Variable(v) | Self::Bound(v) => callback(v),
            Self::Or(inner) | Self::And(inner) | Self::Coalesce(inner) | Self::FunctionCall(_, inner) => {
                for i in inner {
                    i.lookup_used_variables(callback);
                }
            }
            Self::Equal(a, b)
            | Self::SameTerm(a, b)
            | Self::Greater(a, b)
            | Self::GreaterOrEqual(a, b)
            | Self::Less(a, b)
            | Self::LessOrEqual(a, b)
            | Self::Add(a, b)
            | Self::Subtract(a, b)
            | Self::Multiply(a, b)
            | Self::Divide(a, b) => {
                a.lookup_used_variables(callback);
                b.lookup_used_variables(callback);
            }
            Self::UnaryPlus(i) | Self::UnaryMinus(i) | Self::Not(i) => {
                i.lookup_used_variables(callback)
            }
            Self::If(a, b, c) => {
                a.lookup_used_variables(callback);
                b.lookup_used_variables(callback);
                c.lookup_used_variables(callback);
            }
        }
    }

    /// Makes sure the expression is evaluated to its effective boolean value.
    fn into_boolean(self) -> Self {
        if self.returns_boolean() {
            self
        } else {
            Self::And(vec![self])
        }
    }

    fn returns_boolean(&self) -> bool {
        match self {
            Self::Or(_)
            | Self::And(_)
            | Self::Equal(_, _)
            | Self::SameTerm(_, _)
            | Self::Greater(_, _)
            | Self::GreaterOrEqual(_, _)
            | Self::Less(_, _)
            | Self::LessOrEqual(_, _)
            | Self::Not(_)
            | Self::Bound(_)
            | Self::FunctionCall(
                Function::IsBlank
                | Function::IsIri
                | Function::IsLiteral
                | Function::IsNumeric
                | Function::LangMatches
                | Function::Contains
                | Function::StrStarts
                | Function::StrEnds
                | Function::Regex,
                _,
            ) => true,
            Self::Literal(literal) => literal.datatype() == xsd::BOOLEAN,
            Self::If(_, a, b) => a.returns_boolean() && b.returns_boolean(),
            _ => false,
        }
    }

    fn from_sparql_algebra(expression: &AlExpression) -> Result<Self, EvaluationError> {
        let binary = |left: &AlExpression, right: &AlExpression| {
            Ok::<_, EvaluationError>((
                Box::new(Self::from_sparql_algebra(left)?),
                Box::new(Self::from_sparql_algebra(right)?),
            ))
        };
        Ok(match expression {
            AlExpression::NamedNode(node) => Self::NamedNode(node.clone()),
            AlExpression::Literal(literal) => Self::Literal(literal.clone()),
            AlExpression::Variable(variable) => Self::Variable(variable.clone()),
            AlExpression::Or(left, right) => Self::Or(vec![
                Self::from_sparql_algebra(left)?,
                Self::from_sparql_algebra(right)?,
            ]),
            AlExpression::And(left, right) => Self::And(vec![
                Self::from_sparql_algebra(left)?,
                Self::from_sparql_algebra(right)?,
            ]),
            AlExpression::Equal(left, right) => {
                let (left, right) = binary(left, right)?;
                Self::Equal(left, right)
            }
            AlExpression::SameTerm(left, right) => {
                let (left, right) = binary(left, right)?;
                Self::SameTerm(left, right)
            }
            AlExpression::Greater(left, right) => {
                let (left, right) = binary(left, right)?;
                Self::Greater(left, right)
            }
            AlExpression::GreaterOrEqual(left, right) => {
                let (left, right) = binary(left, right)?;
                Self::GreaterOrEqual(left, right)
            }
            AlExpression::Less(left, right) => {
                let (left, right) = binary(left, right)?;
                Self::Less(left, right)
            }
            AlExpression::LessOrEqual(left, right) => {
                let (left, right) = binary(left, right)?;
                Self::LessOrEqual(left, right)
            }
            AlExpression::In(left, right) => {
                let left = Self::from_sparql_algebra(left)?;
                if right.is_empty() {
                    // Keeps the error if the left side fails
                    Self::If(
                        Box::new(left),
                        Box::new(false.into()),
                        Box::new(false.into()),
                    )
                } else {
                    Self::Or(
                        right
                            .iter()
                            .map(|e| {
                                Ok(Self::Equal(
                                    Box::new(left.clone()),
                                    Box::new(Self::from_sparql_algebra(e)?),
                                ))
                            })
                            .collect::<Result<_, EvaluationError>>()?,
                    )
                }
            }
            AlExpression::Add(left, right) => {
                let (left, right) = binary(left, right)?;
                Self::Add(left, right)
            }
            AlExpression::Subtract(left, right) => {
                let (left, right) = binary(left, right)?;
                Self::Subtract(left, right)
            }
            AlExpression::Multiply(left, right) => {
                let (left, right) = binary(left, right)?;
                Self::Multiply(left, right)
            }
            AlExpression::Divide(left, right) => {
                let (left, right) = binary(left, right)?;
                Self::Divide(left, right)
            }
            AlExpression::UnaryPlus(inner) => {
                Self::UnaryPlus(Box::new(Self::from_sparql_algebra(inner)?))
            }
            AlExpression::UnaryMinus(inner) => {
                Self::UnaryMinus(Box::new(Self::from_sparql_algebra(inner)?))
            }
            AlExpression::Not(inner) => Self::Not(Box::new(Self::from_sparql_algebra(inner)?)),
            AlExpression::Exists(_) => {
                return Err(EvaluationError::Unsupported("EXISTS".into()));
            }
            AlExpression::Bound(variable) => Self::Bound(variable.clone()),
            AlExpression::If(cond, yes, no) => Self::If(
                Box::new(Self::from_sparql_algebra(cond)?),
                Box::new(Self::from_sparql_algebra(yes)?),
                Box::new(Self::from_sparql_algebra(no)?),
            ),
            AlExpression::Coalesce(inner) => Self::Coalesce(
                inner
                    .iter()
                    .map(Self::from_sparql_algebra)
                    .collect::<Result<_, _>>()?,
            ),
            AlExpression::FunctionCall(name, args) => Self::FunctionCall(
                Function::from_sparql_algebra(name)?,
                args.iter()
                    .map(Self::from_sparql_algebra)
                    .collect::<Result<_, _>>()?,
            ),
        })
    }
}

impl From<NamedNode> for Expression {
    #[inline]
    fn from(value: NamedNode) -> Self {
        Self::NamedNode(value)
    }
}

impl From<Literal> for Expression {
    #[inline]
    fn from(value: Literal) -> Self {
        Self::Literal(value)
    }
}

impl From<Variable> for Expression {
    #[inline]
    fn from(value: Variable) -> Self {
        Self::Variable(value)
    }
}

impl From<bool> for Expression {
    #[inline]
    fn from(value: bool) -> Self {
        Literal::from(value).into()
    }
}

/// An ordering comparator used by [`GraphPattern::OrderBy`].
#[derive(Eq, PartialEq, Debug, Clone, Hash)]
pub enum OrderExpression {
    Asc(Expression),
    Desc(Expression),
}

impl OrderExpression {
    fn from_sparql_algebra(expression: &AlOrderExpression) -> Result<Self, EvaluationError> {
        Ok(match expression {
            AlOrderExpression::Asc(e) => Self::Asc(Expression::from_sparql_algebra(e)?),
            AlOrderExpression::Desc(e) => Self::Desc(Expression::from_sparql_algebra(e)?),
        })
    }
}

/// A SPARQL query [graph pattern](https://www.w3.org/TR/sparql11-query/#sparqlQuery).
#[derive(Eq, PartialEq, Debug, Clone, Hash)]
pub enum GraphPattern {
    /// A [basic graph pattern](https://www.w3.org/TR/sparql11-query/#defn_BasicGraphPattern).
    Bgp { patterns: Vec<TriplePattern> },
    /// [Join](https://www.w3.org/TR/sparql11-query/#defn_algJoin).
    Join { left: Box<Self>, right: Box<Self> },
    /// [LeftJoin](https://www.w3.org/TR/sparql11-query/#defn_algLeftJoin).
    LeftJoin {
        left: Box<Self>,
        right: Box<Self>,
        expression: Expression,
    },
    /// [Filter](https://www.w3.org/TR/sparql11-query/#defn_algFilter).
    Filter {
        expression: Expression,
        inner: Box<Self>,
    },
    /// [Union](https://www.w3.org/TR/sparql11-query/#defn_algUnion).
    Union { inner: Vec<Self> },
    /// [Minus](https://www.w3.org/TR/sparql11-query/#defn_algMinus).
    Minus { left: Box<Self>, right: Box<Self> },
    /// [Extend](https://www.w3.org/TR/sparql11-query/#defn_extend).
    Extend {
        inner: Box<Self>,
        variable: Variable,
        expression: Expression,
    },
    /// A table used to provide inline values
    Values {
        variables: Vec<Variable>,
        bindings: Vec<Vec<Option<Term>>>,
    },
    /// [OrderBy](https://www.w3.org/TR/sparql11-query/#defn_algOrdered).
    OrderBy {
        inner: Box<Self>,
        expression: Vec<OrderExpression>,
    },
    /// [Project](https://www.w3.org/TR/sparql11-query/#defn_algProjection).
    Project {
        inner: Box<Self>,
        variables: Vec<Variable>,
    },
    /// [Distinct](https://www.w3.org/TR/sparql11-query/#defn_algDistinct).
    Distinct { inner: Box<Self> },
    /// [Reduced](https://www.w3.org/TR/sparql11-query/#defn_algReduced).
    Reduced { inner: Box<Self> },
    /// [Slice](https://www.w3.org/TR/sparql11-query/#defn_algSlice).
    Slice {
        inner: Box<Self>,
        start: usize,
        length: Option<usize>,
    },
}

impl GraphPattern {
    pub fn filter(inner: Self, expression: Expression) -> Self {
        match expression.effective_boolean_value() {
            Some(true) => inner,
            _ => Self::Filter {
                inner: Box::new(inner),
                expression,
            },
        }
    }

    pub fn union_all(args: impl IntoIterator<Item = Self>) -> Self {
        let mut all = Vec::new();
        for arg in args {
            if let Self::Union { inner } = arg {
                all.extend(inner);
            } else {
                all.push(arg);
            }
        }
        if all.len() == 1 {
            if let Some(single) = all.pop() {
                return single;
            }
        }
        Self::Union { inner: all }
    }

    /// The variables bound in every solution of the pattern.
    pub fn certain_variables(&self) -> BTreeSet<&Variable> {
        match self {
            Self::Bgp { patterns } => patterns.iter().flat_map(TriplePattern::variables).collect(),
            Self::Join { left, right } => {
                let mut variables = left.certain_variables();
                variables.extend(right.certain_variables());
                variables
            }
            Self::LeftJoin { left, .. } | Self::Minus { left, .. } => left.certain_variables(),
            Self::Filter { inner, .. }
            | Self::Extend { inner, .. }
            | Self::OrderBy { inner, .. }
            | Self::Distinct { inner }
            | Self::Reduced { inner }
            | Self::Slice { inner, .. } => inner.certain_variables(),
            Self::Union { inner } => {
                let mut branches = inner.iter().map(Self::certain_variables);
                let first = branches.next().unwrap_or_default();
                branches.fold(first, |acc, b| acc.intersection(&b).copied().collect())
            }
            Self::Values {
                variables,
                bindings,
            } => variables
                .iter()
                .enumerate()
                .filter(|(i, _)| bindings.iter().all(|b| matches!(b.get(*i), Some(Some(_)))))
                .map(|(_, v)| v)
                .collect(),
            Self::Project { inner, variables } => {
                let certain = inner.certain_variables();
                variables.iter().filter(|v| certain.contains(v)).collect()
            }
        }
    }

    /// The variables that may be bound in a solution of the pattern.
    pub fn possible_variables(&self) -> BTreeSet<&Variable> {
        match self {
            Self::Bgp { patterns } => patterns.iter().flat_map(TriplePattern::variables).collect(),
            Self::Join { left, right } | Self::LeftJoin { left, right, .. } => {
                let mut variables = left.possible_variables();
                variables.extend(right.possible_variables());
                variables
            }
            Self::Minus { left, .. } => left.possible_variables(),
            Self::Filter { inner, .. }
            | Self::OrderBy { inner, .. }
            | Self::Distinct { inner }
            | Self::Reduced { inner }
            | Self::Slice { inner, .. } => inner.possible_variables(),
            Self::Extend {
                inner, variable, ..
            } => {
                let mut variables = inner.possible_variables();
                variables.insert(variable);
                variables
            }
            Self::Union { inner } => inner.iter().flat_map(Self::possible_variables).collect(),
            Self::Values { variables, .. } | Self::Project { variables, .. } => {
                variables.iter().collect()
            }
        }
    }

    /// Converts a parsed SPARQL pattern, rejecting the features that can not be evaluated.
    pub fn from_sparql_algebra(pattern: &AlGraphPattern) -> Result<Self, EvaluationError> {
        Self::convert(pattern, &mut HashMap::new())
    }

    fn convert(
        pattern: &AlGraphPattern,
        blank_nodes: &mut HashMap<BlankNode, Variable>,
    ) -> Result<Self, EvaluationError> {
        Ok(match pattern {
            AlGraphPattern::Bgp { patterns } => Self::Bgp {
                patterns: patterns
                    .iter()
                    .map(|p| TriplePattern::from_sparql_algebra(p, blank_nodes))
                    .collect::<Result<_, _>>()?,
            },
            AlGraphPattern::Join { left, right } => Self::Join {
                left: Box::new(Self::convert(left, blank_nodes)?),
                right: Box::new(Self::convert(right, blank_nodes)?),
            },
            AlGraphPattern::LeftJoin {
                left,
                right,
                expression,
            } => Self::LeftJoin {
                left: Box::new(Self::convert(left, blank_nodes)?),
                right: Box::new(Self::convert(right, blank_nodes)?),
                expression: expression
                    .as_ref()
                    .map_or(Ok(true.into()), Expression::from_sparql_algebra)?,
            },
            AlGraphPattern::Filter { expr, inner } => Self::Filter {
                expression: Expression::from_sparql_algebra(expr)?,
                inner: Box::new(Self::convert(inner, blank_nodes)?),
            },
            AlGraphPattern::Union { left, right } => Self::union_all([
                Self::convert(left, blank_nodes)?,
                Self::convert(right, blank_nodes)?,
            ]),
            AlGraphPattern::Extend {
                inner,
                variable,
                expression,
            } => Self::Extend {
                inner: Box::new(Self::convert(inner, blank_nodes)?),
                variable: variable.clone(),
                expression: Expression::from_sparql_algebra(expression)?,
            },
            AlGraphPattern::Minus { left, right } => Self::Minus {
                left: Box::new(Self::convert(left, blank_nodes)?),
                right: Box::new(Self::convert(right, blank_nodes)?),
            },
            AlGraphPattern::Values {
                variables,
                bindings,
            } => Self::Values {
                variables: variables.clone(),
                bindings: bindings
                    .iter()
                    .map(|row| {
                        row.iter()
                            .map(|v| v.as_ref().map(ground_term_from_algebra).transpose())
                            .collect::<Result<_, _>>()
                    })
                    .collect::<Result<_, _>>()?,
            },
            AlGraphPattern::OrderBy { inner, expression } => Self::OrderBy {
                inner: Box::new(Self::convert(inner, blank_nodes)?),
                expression: expression
                    .iter()
                    .map(OrderExpression::from_sparql_algebra)
                    .collect::<Result<_, _>>()?,
            },
            AlGraphPattern::Project { inner, variables } => Self::Project {
                inner: Box::new(Self::convert(inner, &mut HashMap::new())?),
                variables: variables.clone(),
            },
            AlGraphPattern::Distinct { inner } => Self::Distinct {
                inner: Box::new(Self::convert(inner, blank_nodes)?),
            },
            AlGraphPattern::Reduced { inner } => Self::Reduced {
                inner: Box::new(Self::convert(inner, blank_nodes)?),
            },
            AlGraphPattern::Slice {
                inner,
                start,
                length,
            } => Self::Slice {
                inner: Box::new(Self::convert(inner, blank_nodes)?),
                start: *start,
                length: *length,
            },
            AlGraphPattern::Path { .. } => {
                return Err(EvaluationError::Unsupported("Property paths".into()));
            }
            AlGraphPattern::Group { .. } => {
                return Err(EvaluationError::Unsupported("Aggregation".into()));
            }
            AlGraphPattern::Graph { .. } => {
                return Err(EvaluationError::Unsupported("GRAPH".into()));
            }
            AlGraphPattern::Service { .. } => {
                return Err(EvaluationError::Unsupported("SERVICE".into()));
            }
        })
    }
}
