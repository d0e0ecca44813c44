#![doc = include_str!("../README.md")]
#![deny(unsafe_code)]
#![doc(test(attr(deny(warnings))))]
#![cfg_attr(docsrs, feature(doc_auto_cfg))]

mod algebra;
mod binding;
mod cnf;
mod constraint;
mod error;
mod eval;
mod expression;
mod group;
mod model;
mod node;
mod node_relation;
mod optimizer;
mod plan;
mod planner;
mod sql_filter;
mod triple;
mod value;

pub use crate::algebra::{
    Expression, Function, GraphPattern, OrderExpression, PatternTerm, TriplePattern,
};
pub use crate::binding::Binding;
pub use crate::cnf::to_conjuncts;
pub use crate::constraint::{Constraint, ConstraintCollector};
pub use crate::error::{BridgeError, EvaluationError};
pub use crate::eval::CancellationToken;
use crate::eval::{
    BindingIter, CancellableIterator, ConstructIterator, SimpleEvaluator, TripleTemplate,
};
pub use crate::model::{
    QueryBindingIter, QueryResults, QuerySolution, QuerySolutionIter, QueryTripleIter,
};
pub use crate::node::{NodeMaker, NodeType};
pub use crate::node_relation::NodeRelation;
pub use crate::optimizer::push_filters;
use crate::plan::{PlanNode, translate};
pub use crate::planner::translate_bgp;
pub use crate::sql_filter::to_sql;
pub use crate::triple::TripleRelation;
pub use crate::value::{BlankNodeId, ColumnFunction, Template, ValueMaker};
use oxrdf::{NamedNode, Term, Variable};
use spargebra::Query;
use sqlgebra::SqlExecutor;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

const DEFAULT_FETCH_SIZE: usize = 1000;

/// Evaluates SPARQL queries against relational databases exposed as RDF by some bridges.
///
/// The basic graph patterns are translated to SQL queries run by a [`SqlExecutor`], the
/// rest of the query is evaluated in memory.
///
/// ```
/// use oxrdf::NamedNode;
/// use sparsql::{NodeMaker, NodeType, QueryEngine, QueryResults, Template, TripleRelation};
/// use spargebra::SparqlParser;
/// use sqlgebra::{ColumnRef, Database, MemoryDatabase, Relation};
///
/// let database = MemoryDatabase::new().with_table(
///     "people",
///     &["id", "name"],
///     &[&[Some("1"), Some("Alice")], &[Some("2"), Some("Bob")]],
/// )?;
/// let engine = QueryEngine::new(vec![TripleRelation::new(
///     Relation::new(Database::new("db")),
///     NodeMaker::typed(NodeType::Iri, Template::parse("http://ex.com/p/@@people.id@@")?),
///     NodeMaker::Fixed(NamedNode::new("http://xmlns.com/foaf/0.1/name")?.into()),
///     NodeMaker::typed(NodeType::plain_literal(), ColumnRef::parse("people.name")?),
/// )]);
/// let query = SparqlParser::new().parse_query(
///     "SELECT ?p WHERE { ?p <http://xmlns.com/foaf/0.1/name> \"Bob\" }",
/// )?;
/// if let QueryResults::Solutions(solutions) = engine.execute(&database, &query)? {
///     let solutions = solutions.collect::<Result<Vec<_>, _>>()?;
///     assert_eq!(solutions.len(), 1);
///     assert_eq!(solutions[0]["p"], NamedNode::new("http://ex.com/p/2")?.into());
/// }
/// # Result::<_, Box<dyn std::error::Error>>::Ok(())
/// ```
#[derive(Clone)]
pub struct QueryEngine {
    bridges: Arc<[TripleRelation]>,
    all_optimizations: bool,
    without_filter_pushdown: bool,
    fetch_size: usize,
    cancellation_token: Option<CancellationToken>,
}

impl QueryEngine {
    /// An engine over the triples produced by `bridges`.
    pub fn new(bridges: Vec<TripleRelation>) -> Self {
        Self {
            bridges: bridges.into(),
            all_optimizations: false,
            without_filter_pushdown: false,
            fetch_size: DEFAULT_FETCH_SIZE,
            cancellation_token: None,
        }
    }

    /// Evaluates a query.
    ///
    /// Nothing is sent to the database before the results are read, except for ASK queries.
    /// `DESCRIBE` queries and `FROM` clauses are not supported.
    pub fn execute<'a, E: SqlExecutor + ?Sized>(
        &self,
        executor: &'a E,
        query: &Query,
    ) -> Result<QueryResults<'a>, EvaluationError> {
        match query {
            Query::Select {
                dataset, pattern, ..
            } => {
                check_dataset(dataset.is_some())?;
                let pattern = GraphPattern::from_sparql_algebra(pattern)?;
                let variables = solution_variables(&pattern);
                let solutions = self.evaluate(executor, &self.plan(pattern)?);
                Ok(QuerySolutionIter::from_bindings(variables.into(), solutions).into())
            }
            Query::Ask {
                dataset, pattern, ..
            } => {
                check_dataset(dataset.is_some())?;
                let pattern = GraphPattern::from_sparql_algebra(pattern)?;
                let mut solutions = self.evaluate(executor, &self.plan(pattern)?);
                match solutions.next() {
                    Some(Ok(_)) => Ok(true.into()),
                    Some(Err(e)) => Err(e),
                    None => Ok(false.into()),
                }
            }
            Query::Construct {
                template,
                dataset,
                pattern,
                ..
            } => {
                check_dataset(dataset.is_some())?;
                let template = template
                    .iter()
                    .filter_map(TripleTemplate::from_sparql_algebra)
                    .collect();
                let pattern = GraphPattern::from_sparql_algebra(pattern)?;
                let solutions = self.evaluate(executor, &self.plan(pattern)?);
                Ok(QueryTripleIter::new(ConstructIterator::new(Box::new(solutions), template)).into())
            }
            Query::Describe { .. } => Err(EvaluationError::Unsupported("DESCRIBE".into())),
        }
    }

    /// The bindings of a basic graph pattern with some filters.
    ///
    /// ```
    /// use oxrdf::{NamedNode, Variable};
    /// use sparsql::{NodeMaker, NodeType, QueryEngine, Template, TriplePattern, TripleRelation};
    /// use sqlgebra::{ColumnRef, Database, MemoryDatabase, Relation};
    ///
    /// let database = MemoryDatabase::new().with_table(
    ///     "people",
    ///     &["id", "name"],
    ///     &[&[Some("1"), Some("Alice")], &[Some("2"), None]],
    /// )?;
    /// let name = NamedNode::new("http://xmlns.com/foaf/0.1/name")?;
    /// let engine = QueryEngine::new(vec![TripleRelation::new(
    ///     Relation::new(Database::new("db")),
    ///     NodeMaker::typed(NodeType::Iri, Template::parse("http://ex.com/p/@@people.id@@")?),
    ///     NodeMaker::Fixed(name.clone().into()),
    ///     NodeMaker::typed(NodeType::plain_literal(), ColumnRef::parse("people.name")?),
    /// )]);
    /// let pattern = TriplePattern::new(Variable::new("p")?, name, Variable::new("n")?);
    /// let bindings = engine
    ///     .evaluate_bgp(&database, &[pattern], None)?
    ///     .collect::<Result<Vec<_>, _>>()?;
    /// assert_eq!(bindings.len(), 1);
    /// # Result::<_, Box<dyn std::error::Error>>::Ok(())
    /// ```
    pub fn evaluate_bgp<'a, E: SqlExecutor + ?Sized>(
        &self,
        executor: &'a E,
        patterns: &[TriplePattern],
        filter: Option<&Expression>,
    ) -> Result<QueryBindingIter<'a>, EvaluationError> {
        let pattern = GraphPattern::Bgp {
            patterns: patterns.to_vec(),
        };
        let pattern = if let Some(filter) = filter {
            GraphPattern::filter(pattern, filter.clone())
        } else {
            pattern
        };
        Ok(QueryBindingIter::new(
            self.evaluate(executor, &self.plan(pattern)?),
        ))
    }

    /// The distinct triples matching a triple pattern, `None` standing for any term.
    ///
    /// ```
    /// use oxrdf::{Literal, NamedNode};
    /// use sparsql::{NodeMaker, NodeType, QueryEngine, Template, TripleRelation};
    /// use sqlgebra::{ColumnRef, Database, MemoryDatabase, Relation};
    ///
    /// let database = MemoryDatabase::new().with_table(
    ///     "people",
    ///     &["id", "name"],
    ///     &[&[Some("1"), Some("Alice")], &[Some("2"), Some("Bob")]],
    /// )?;
    /// let engine = QueryEngine::new(vec![TripleRelation::new(
    ///     Relation::new(Database::new("db")),
    ///     NodeMaker::typed(NodeType::Iri, Template::parse("http://ex.com/p/@@people.id@@")?),
    ///     NodeMaker::Fixed(NamedNode::new("http://xmlns.com/foaf/0.1/name")?.into()),
    ///     NodeMaker::typed(NodeType::plain_literal(), ColumnRef::parse("people.name")?),
    /// )]);
    /// let triples = engine
    ///     .find(
    ///         &database,
    ///         Some(&NamedNode::new("http://ex.com/p/1")?.into()),
    ///         None,
    ///         None,
    ///     )
    ///     .collect::<Result<Vec<_>, _>>()?;
    /// assert_eq!(triples.len(), 1);
    /// assert_eq!(triples[0].object, Literal::new_simple_literal("Alice").into());
    /// # Result::<_, Box<dyn std::error::Error>>::Ok(())
    /// ```
    pub fn find<'a, E: SqlExecutor + ?Sized>(
        &self,
        executor: &'a E,
        subject: Option<&Term>,
        predicate: Option<&NamedNode>,
        object: Option<&Term>,
    ) -> QueryTripleIter<'a> {
        let predicate = predicate.map(|p| Term::from(p.clone()));
        let relations = self
            .bridges
            .iter()
            .filter_map(|bridge| bridge.select_terms(subject, predicate.as_ref(), object))
            .collect::<Vec<_>>();
        debug!("{} bridges may produce the requested triples", relations.len());
        let token = self.cancellation_token.clone().unwrap_or_default();
        QueryTripleIter::new(CancellableIterator::new(
            SimpleEvaluator::new(executor, self.fetch_size, token.clone())
                .evaluate_triples(relations),
            token,
        ))
    }

    /// Describes how a query would be evaluated, including the SQL queries it would send.
    ///
    /// ```
    /// use sparsql::QueryEngine;
    /// use spargebra::SparqlParser;
    ///
    /// let query = SparqlParser::new().parse_query("SELECT * WHERE { ?s ?p ?o }")?;
    /// let explanation = QueryEngine::new(Vec::new()).explain(&query)?;
    /// assert!(explanation.to_string().contains("Relations"));
    /// # Result::<_, Box<dyn std::error::Error>>::Ok(())
    /// ```
    pub fn explain(&self, query: &Query) -> Result<QueryExplanation, EvaluationError> {
        let (dataset, pattern) = match query {
            Query::Select {
                dataset, pattern, ..
            }
            | Query::Ask {
                dataset, pattern, ..
            }
            | Query::Construct {
                dataset, pattern, ..
            } => (dataset, pattern),
            Query::Describe { .. } => {
                return Err(EvaluationError::Unsupported("DESCRIBE".into()));
            }
        };
        check_dataset(dataset.is_some())?;
        Ok(QueryExplanation {
            plan: self.plan(GraphPattern::from_sparql_algebra(pattern)?)?,
        })
    }

    /// Converts the filter conjuncts that can be converted into SQL conditions and drops
    /// the relations they make empty.
    ///
    /// By default all filters are evaluated after the rows are fetched.
    #[inline]
    #[must_use]
    pub fn with_all_optimizations(mut self) -> Self {
        self.all_optimizations = true;
        self
    }

    /// Keeps the filters where the query writes them instead of moving them next to the
    /// basic graph patterns.
    #[inline]
    #[must_use]
    pub fn without_filter_pushdown(mut self) -> Self {
        self.without_filter_pushdown = true;
        self
    }

    /// The maximal number of rows read from a cursor at once (1000 by default).
    #[inline]
    #[must_use]
    pub fn with_fetch_size(mut self, fetch_size: usize) -> Self {
        self.fetch_size = fetch_size.max(1);
        self
    }

    /// Allows to cancel the evaluation of the queries.
    ///
    /// ```
    /// use sparsql::{CancellationToken, EvaluationError, QueryEngine, QueryResults};
    /// use spargebra::SparqlParser;
    /// use sqlgebra::MemoryDatabase;
    ///
    /// let cancellation_token = CancellationToken::new();
    /// let engine = QueryEngine::new(Vec::new()).with_cancellation_token(cancellation_token.clone());
    /// let query = SparqlParser::new().parse_query("SELECT * WHERE { VALUES ?x { 1 2 } }")?;
    /// if let QueryResults::Solutions(mut solutions) = engine.execute(&MemoryDatabase::new(), &query)? {
    ///     cancellation_token.cancel();
    ///     assert!(matches!(
    ///         solutions.next(),
    ///         Some(Err(EvaluationError::Cancelled))
    ///     ));
    /// }
    /// # Result::<_, Box<dyn std::error::Error>>::Ok(())
    /// ```
    #[inline]
    #[must_use]
    pub fn with_cancellation_token(mut self, cancellation_token: CancellationToken) -> Self {
        self.cancellation_token = Some(cancellation_token);
        self
    }

    fn plan(&self, mut pattern: GraphPattern) -> Result<PlanNode, EvaluationError> {
        if !self.without_filter_pushdown {
            pattern = push_filters(pattern);
        }
        let plan = translate(&pattern, &self.bridges, self.all_optimizations)?;
        debug!("Evaluation plan:\n{plan}");
        Ok(plan)
    }

    fn evaluate<'a, E: SqlExecutor + ?Sized>(
        &self,
        executor: &'a E,
        plan: &PlanNode,
    ) -> CancellableIterator<BindingIter<'a>> {
        let token = self.cancellation_token.clone().unwrap_or_default();
        CancellableIterator::new(
            SimpleEvaluator::new(executor, self.fetch_size, token.clone()).evaluate(plan),
            token,
        )
    }
}

/// The evaluation plan of a query, returned by [`QueryEngine::explain`].
///
/// Its [`Display`](fmt::Display) gives a tree of the operations with the SQL of each
/// physical query.
pub struct QueryExplanation {
    plan: PlanNode,
}

impl fmt::Display for QueryExplanation {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.plan, f)
    }
}

impl fmt::Debug for QueryExplanation {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

fn check_dataset(has_dataset: bool) -> Result<(), EvaluationError> {
    if has_dataset {
        return Err(EvaluationError::Unsupported("FROM and FROM NAMED".into()));
    }
    Ok(())
}

/// The variables of the solutions of a pattern, in the order of the `SELECT` clause.
fn solution_variables(pattern: &GraphPattern) -> Vec<Variable> {
    match pattern {
        GraphPattern::Project { variables, .. } => variables.clone(),
        GraphPattern::Distinct { inner }
        | GraphPattern::Reduced { inner }
        | GraphPattern::Slice { inner, .. }
        | GraphPattern::OrderBy { inner, .. }
        | GraphPattern::Filter { inner, .. } => solution_variables(inner),
        _ => pattern
            .possible_variables()
            .into_iter()
            .filter(|v| !v.as_str().starts_with("_:"))
            .cloned()
            .collect(),
    }
}
