use crate::binding::Binding;
use crate::error::EvaluationError;
use oxrdf::{Term, Triple, Variable};
pub use sparesults::QuerySolution;
use std::sync::Arc;

/// Results of a [SPARQL query](https://www.w3.org/TR/sparql11-query/).
pub enum QueryResults<'a> {
    /// Results of a [SELECT](https://www.w3.org/TR/sparql11-query/#select) query.
    Solutions(QuerySolutionIter<'a>),
    /// Result of a [ASK](https://www.w3.org/TR/sparql11-query/#ask) query.
    Boolean(bool),
    /// Results of a [CONSTRUCT](https://www.w3.org/TR/sparql11-query/#construct) query.
    Graph(QueryTripleIter<'a>),
}

impl<'a> From<QuerySolutionIter<'a>> for QueryResults<'a> {
    #[inline]
    fn from(value: QuerySolutionIter<'a>) -> Self {
        Self::Solutions(value)
    }
}

impl From<bool> for QueryResults<'_> {
    #[inline]
    fn from(value: bool) -> Self {
        Self::Boolean(value)
    }
}

impl<'a> From<QueryTripleIter<'a>> for QueryResults<'a> {
    #[inline]
    fn from(value: QueryTripleIter<'a>) -> Self {
        Self::Graph(value)
    }
}

/// An iterator over [`QuerySolution`]s.
///
/// ```
/// use sparsql::{QueryEngine, QueryResults};
/// use spargebra::SparqlParser;
/// use sqlgebra::MemoryDatabase;
///
/// let query = SparqlParser::new().parse_query("SELECT ?s ?o WHERE { ?s ?p ?o }")?;
/// if let QueryResults::Solutions(solutions) =
///     QueryEngine::new(Vec::new()).execute(&MemoryDatabase::new(), &query)?
/// {
///     assert_eq!(solutions.variables().len(), 2);
///     assert_eq!(solutions.count(), 0);
/// }
/// # Result::<_, Box<dyn std::error::Error>>::Ok(())
/// ```
pub struct QuerySolutionIter<'a> {
    variables: Arc<[Variable]>,
    iter: Box<dyn Iterator<Item = Result<QuerySolution, EvaluationError>> + 'a>,
}

impl<'a> QuerySolutionIter<'a> {
    /// Construct a new iterator of solutions from an ordered list of solution variables and an iterator of solutions
    pub fn new(
        variables: Arc<[Variable]>,
        iter: impl IntoIterator<Item = Result<QuerySolution, EvaluationError>> + 'a,
    ) -> Self {
        Self {
            variables,
            iter: Box::new(iter.into_iter()),
        }
    }

    /// Lays the bindings out following the order of `variables`.
    pub(crate) fn from_bindings(
        variables: Arc<[Variable]>,
        iter: impl IntoIterator<Item = Result<Binding, EvaluationError>> + 'a,
    ) -> Self {
        Self::new(
            Arc::clone(&variables),
            iter.into_iter().map(move |binding| {
                let binding = binding?;
                let values = variables
                    .iter()
                    .map(|v| binding.get(v).cloned())
                    .collect::<Vec<Option<Term>>>();
                Ok((Arc::clone(&variables), values).into())
            }),
        )
    }

    /// The variables used in the solutions.
    #[inline]
    pub fn variables(&self) -> &[Variable] {
        &self.variables
    }
}

impl Iterator for QuerySolutionIter<'_> {
    type Item = Result<QuerySolution, EvaluationError>;

    #[inline]
    fn next(&mut self) -> Option<Self::Item> {
        self.iter.next()
    }

    #[inline]
    fn size_hint(&self) -> (usize, Option<usize>) {
        self.iter.size_hint()
    }
}

/// An iterator over triples: the result of a CONSTRUCT query or of [`QueryEngine::find`](crate::QueryEngine::find).
pub struct QueryTripleIter<'a> {
    iter: Box<dyn Iterator<Item = Result<Triple, EvaluationError>> + 'a>,
}

impl<'a> QueryTripleIter<'a> {
    pub(crate) fn new(iter: impl Iterator<Item = Result<Triple, EvaluationError>> + 'a) -> Self {
        Self {
            iter: Box::new(iter),
        }
    }
}

impl Iterator for QueryTripleIter<'_> {
    type Item = Result<Triple, EvaluationError>;

    #[inline]
    fn next(&mut self) -> Option<Self::Item> {
        self.iter.next()
    }

    #[inline]
    fn size_hint(&self) -> (usize, Option<usize>) {
        self.iter.size_hint()
    }
}

/// An iterator over the [`Binding`]s of a basic graph pattern.
pub struct QueryBindingIter<'a> {
    iter: Box<dyn Iterator<Item = Result<Binding, EvaluationError>> + 'a>,
}

impl<'a> QueryBindingIter<'a> {
    pub(crate) fn new(iter: impl Iterator<Item = Result<Binding, EvaluationError>> + 'a) -> Self {
        Self {
            iter: Box::new(iter),
        }
    }
}

impl Iterator for QueryBindingIter<'_> {
    type Item = Result<Binding, EvaluationError>;

    #[inline]
    fn next(&mut self) -> Option<Self::Item> {
        self.iter.next()
    }
}
