use crate::algebra::OrderExpression;
use crate::binding::Binding;
use crate::error::EvaluationError;
use crate::expression::{build_expression_evaluator, build_filter_evaluator, cmp_terms};
use crate::group::{GroupMember, RelationGroup, group_relations};
use crate::plan::PlanNode;
use crate::triple::TripleRelation;
use oxrdf::{BlankNode, Term, Triple, Variable};
use rustc_hash::{FxHashMap, FxHashSet};
use spargebra::term::{NamedNodePattern, TermPattern, TriplePattern as AlTriplePattern};
use sqlgebra::{ResultRow, SelectQuery, SqlCursor, SqlExecutor};
use std::cmp::Ordering;
use std::collections::VecDeque;
use std::iter::once;
use std::mem::take;
use std::rc::Rc;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering as AtomicOrdering};
use tracing::{debug, trace, warn};

pub(crate) type BindingIter<'a> = Box<dyn Iterator<Item = Result<Binding, EvaluationError>> + 'a>;

/// A token that can be used to stop a running query.
///
/// The running query stops at the next row pull and releases all its open cursors.
///
/// ```
/// use sparsql::CancellationToken;
///
/// let token = CancellationToken::new();
/// let shared = token.clone();
/// shared.cancel();
/// assert!(token.is_cancelled());
/// ```
#[derive(Clone, Default, Debug)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Cancels the queries using this token. Calling it again has no effect.
    pub fn cancel(&self) {
        self.cancelled.store(true, AtomicOrdering::Relaxed);
    }

    #[inline]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(AtomicOrdering::Relaxed)
    }
}

pub(crate) struct SimpleEvaluator<'a, E: ?Sized> {
    executor: &'a E,
    fetch_size: usize,
    cancellation_token: CancellationToken,
}

impl<E: ?Sized> Clone for SimpleEvaluator<'_, E> {
    fn clone(&self) -> Self {
        Self {
            executor: self.executor,
            fetch_size: self.fetch_size,
            cancellation_token: self.cancellation_token.clone(),
        }
    }
}

impl<'a, E: SqlExecutor + ?Sized + 'a> SimpleEvaluator<'a, E> {
    pub(crate) fn new(
        executor: &'a E,
        fetch_size: usize,
        cancellation_token: CancellationToken,
    ) -> Self {
        Self {
            executor,
            fetch_size: fetch_size.max(1),
            cancellation_token,
        }
    }

    /// The solutions of a plan, computed lazily.
    pub(crate) fn evaluate(&self, node: &PlanNode) -> BindingIter<'a> {
        match node {
            PlanNode::Relations { relations } => self.evaluate_members(relations.clone()),
            PlanNode::Join { left, right } => {
                let left = self.evaluate(left);
                // The right side is materialized once the left side produced something
                let mut right = Some(self.evaluate(right));
                let mut right_values = Vec::new();
                Box::new(left.flat_map(move |left| {
                    let left = match left {
                        Ok(left) => left,
                        Err(e) => return vec![Err(e)],
                    };
                    if let Some(right) = right.take() {
                        match right.collect::<Result<Vec<_>, _>>() {
                            Ok(values) => right_values = values,
                            Err(e) => return vec![Err(e)],
                        }
                    }
                    right_values
                        .iter()
                        .filter_map(|right| left.merge(right))
                        .map(Ok)
                        .collect()
                }))
            }
            PlanNode::LeftJoin {
                left,
                right,
                expression,
            } => {
                let this = self.clone();
                let right = (**right).clone();
                let filter = build_filter_evaluator(expression);
                Box::new(self.evaluate(left).flat_map(move |left| -> BindingIter<'a> {
                    match left {
                        Ok(left) => {
                            let right = this.evaluate(&right.substitute(&left));
                            Box::new(LeftJoinIterator {
                                left,
                                right,
                                filter: Rc::clone(&filter),
                                has_matched: false,
                            })
                        }
                        Err(e) => Box::new(once(Err(e))),
                    }
                }))
            }
            PlanNode::Filter { inner, expression } => {
                let filter = build_filter_evaluator(expression);
                Box::new(self.evaluate(inner).filter(move |binding| match binding {
                    Ok(binding) => filter(binding),
                    Err(_) => true,
                }))
            }
            PlanNode::Union { inner } => {
                let this = self.clone();
                let children = inner.clone();
                Box::new(
                    children
                        .into_iter()
                        .flat_map(move |child| this.evaluate(&child)),
                )
            }
            PlanNode::Minus { left, right } => {
                let left = self.evaluate(left);
                let mut right = Some(self.evaluate(right));
                let mut right_values = Vec::new();
                Box::new(left.filter_map(move |left| {
                    let left = match left {
                        Ok(left) => left,
                        Err(e) => return Some(Err(e)),
                    };
                    if let Some(right) = right.take() {
                        match right.collect::<Result<Vec<_>, _>>() {
                            Ok(values) => right_values = values,
                            Err(e) => return Some(Err(e)),
                        }
                    }
                    right_values
                        .iter()
                        .all(|right| {
                            !left.shares_variable_with(right) || !left.is_compatible_with(right)
                        })
                        .then_some(Ok(left))
                }))
            }
            PlanNode::Extend {
                inner,
                variable,
                expression,
            } => {
                let variable = variable.clone();
                let expression = build_expression_evaluator(expression);
                Box::new(self.evaluate(inner).map(move |binding| {
                    let mut binding = binding?;
                    if let Some(value) = expression(&binding) {
                        binding.insert(variable.clone(), value.into());
                    }
                    Ok(binding)
                }))
            }
            PlanNode::Values { bindings } => Box::new(bindings.clone().into_iter().map(Ok)),
            PlanNode::OrderBy { inner, expression } => {
                let this = self.clone();
                let inner = (**inner).clone();
                let comparators = expression
                    .iter()
                    .map(|e| match e {
                        OrderExpression::Asc(e) => (build_expression_evaluator(e), true),
                        OrderExpression::Desc(e) => (build_expression_evaluator(e), false),
                    })
                    .collect::<Vec<_>>();
                // Sorting needs all the solutions: they are only computed on the first pull
                Box::new(once(()).flat_map(move |()| -> BindingIter<'a> {
                    let mut values = match this.evaluate(&inner).collect::<Result<Vec<_>, _>>() {
                        Ok(values) => values,
                        Err(e) => return Box::new(once(Err(e))),
                    };
                    values.sort_by(|a, b| {
                        for (expression, is_ascending) in &comparators {
                            let ordering = cmp_terms(expression(a).as_ref(), expression(b).as_ref());
                            let ordering = if *is_ascending {
                                ordering
                            } else {
                                ordering.reverse()
                            };
                            if ordering != Ordering::Equal {
                                return ordering;
                            }
                        }
                        Ordering::Equal
                    });
                    Box::new(values.into_iter().map(Ok))
                }))
            }
            PlanNode::Project { inner, variables } => {
                let variables = variables.clone();
                Box::new(
                    self.evaluate(inner)
                        .map(move |binding| Ok(binding?.project(&variables))),
                )
            }
            PlanNode::Distinct { inner } => {
                let mut seen = FxHashSet::default();
                Box::new(self.evaluate(inner).filter(move |binding| match binding {
                    Ok(binding) => seen.insert(binding.clone()),
                    Err(_) => true,
                }))
            }
            PlanNode::Reduced { inner } => Box::new(ConsecutiveDeduplication {
                inner: self.evaluate(inner),
                current: None,
            }),
            PlanNode::Slice {
                inner,
                start,
                length,
            } => {
                let mut iter = self.evaluate(inner);
                if *start > 0 {
                    iter = Box::new(iter.skip(*start));
                }
                if let Some(length) = length {
                    iter = Box::new(iter.take(*length));
                }
                iter
            }
        }
    }

    /// The distinct triples produced by some triple relations.
    pub(crate) fn evaluate_triples(
        &self,
        relations: Vec<TripleRelation>,
    ) -> Box<dyn Iterator<Item = Result<Triple, EvaluationError>> + 'a> {
        let mut seen = FxHashSet::default();
        Box::new(
            self.evaluate_members(relations)
                .filter(move |triple| match triple {
                    Ok(triple) => seen.insert(triple.clone()),
                    Err(_) => true,
                }),
        )
    }

    /// Runs one physical query per group, one group after the other.
    fn evaluate_members<T: GroupMember + 'a>(
        &self,
        members: Vec<T>,
    ) -> Box<dyn Iterator<Item = Result<T::Item, EvaluationError>> + 'a>
    where
        T::Item: 'a,
    {
        let member_count = members.len();
        let groups = group_relations(members);
        debug!(
            "{} physical queries for {member_count} relations",
            groups.len()
        );
        let this = self.clone();
        Box::new(groups.into_iter().flat_map(move |group| GroupIterator {
            executor: this.executor,
            group,
            state: CursorState::NotStarted,
            buffer: VecDeque::new(),
            fetch_size: this.fetch_size,
            cancellation_token: this.cancellation_token.clone(),
        }))
    }
}

enum CursorState<C> {
    NotStarted,
    Open(C),
    Finished,
}

/// The items of a [`RelationGroup`], read from a single cursor.
///
/// The query is only sent on the first pull. The cursor is closed as soon as it is
/// exhausted, fails, gets cancelled or the iterator is dropped.
struct GroupIterator<'a, E: SqlExecutor + ?Sized, T: GroupMember> {
    executor: &'a E,
    group: RelationGroup<T>,
    state: CursorState<E::Cursor>,
    buffer: VecDeque<T::Item>,
    fetch_size: usize,
    cancellation_token: CancellationToken,
}

impl<E: SqlExecutor + ?Sized, T: GroupMember> GroupIterator<'_, E, T> {
    fn push_row(&mut self, row: &ResultRow) {
        trace!("Received row {row:?}");
        for member in self.group.members() {
            if let Some(item) = member.make_item(row) {
                self.buffer.push_back(item);
            }
        }
    }

    fn start(&mut self) -> Result<(), EvaluationError> {
        let relation = self.group.relation();
        if relation.is_empty() {
            self.state = CursorState::Finished;
            return Ok(());
        }
        if relation.database().is_none() {
            // No table to read: the single empty row
            self.state = CursorState::Finished;
            let row = ResultRow::new(Arc::from([]), Vec::new());
            self.push_row(&row);
            return Ok(());
        }
        let query = SelectQuery::new(relation.clone());
        debug!("Executing {query}");
        match self.executor.execute(&query) {
            Ok(cursor) => {
                self.state = CursorState::Open(cursor);
                Ok(())
            }
            Err(e) => {
                self.state = CursorState::Finished;
                Err(EvaluationError::Database(Box::new(e)))
            }
        }
    }

    /// Reads up to `fetch_size` rows into the buffer.
    fn fill(&mut self) -> Result<(), EvaluationError> {
        for _ in 0..self.fetch_size {
            let CursorState::Open(cursor) = &mut self.state else {
                return Ok(());
            };
            match cursor.next_row() {
                Some(Ok(row)) => self.push_row(&row),
                Some(Err(e)) => {
                    self.close();
                    return Err(EvaluationError::Database(Box::new(e)));
                }
                None => self.close(),
            }
        }
        Ok(())
    }

    fn close(&mut self) {
        if let CursorState::Open(mut cursor) =
            std::mem::replace(&mut self.state, CursorState::Finished)
        {
            if let Err(e) = cursor.close() {
                warn!("Failed to close a SQL cursor: {e}");
            }
        }
    }
}

impl<E: SqlExecutor + ?Sized, T: GroupMember> Iterator for GroupIterator<'_, E, T> {
    type Item = Result<T::Item, EvaluationError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if self.cancellation_token.is_cancelled() {
                let was_running = !matches!(self.state, CursorState::Finished)
                    || !self.buffer.is_empty();
                self.close();
                self.buffer.clear();
                return was_running.then_some(Err(EvaluationError::Cancelled));
            }
            if let Some(item) = self.buffer.pop_front() {
                return Some(Ok(item));
            }
            let result = match self.state {
                CursorState::NotStarted => self.start(),
                CursorState::Open(_) => self.fill(),
                CursorState::Finished => return None,
            };
            if let Err(e) = result {
                return Some(Err(e));
            }
        }
    }
}

impl<E: SqlExecutor + ?Sized, T: GroupMember> Drop for GroupIterator<'_, E, T> {
    fn drop(&mut self) {
        self.close();
    }
}

/// The merges of a left binding with the right solutions, or the left binding alone.
struct LeftJoinIterator<'a> {
    left: Binding,
    right: BindingIter<'a>,
    filter: Rc<dyn Fn(&Binding) -> bool>,
    has_matched: bool,
}

impl Iterator for LeftJoinIterator<'_> {
    type Item = Result<Binding, EvaluationError>;

    fn next(&mut self) -> Option<Self::Item> {
        for right in &mut self.right {
            let right = match right {
                Ok(right) => right,
                Err(e) => return Some(Err(e)),
            };
            if let Some(merged) = self.left.merge(&right) {
                if (self.filter)(&merged) {
                    self.has_matched = true;
                    return Some(Ok(merged));
                }
            }
        }
        if self.has_matched {
            None
        } else {
            self.has_matched = true;
            Some(Ok(take(&mut self.left)))
        }
    }
}

struct ConsecutiveDeduplication<'a> {
    inner: BindingIter<'a>,
    current: Option<Binding>,
}

impl Iterator for ConsecutiveDeduplication<'_> {
    type Item = Result<Binding, EvaluationError>;

    fn next(&mut self) -> Option<Self::Item> {
        // The previous solution is only emitted once a different one shows up
        loop {
            let Some(next) = self.inner.next() else {
                return self.current.take().map(Ok);
            };
            match next {
                Ok(next) => match self.current.take() {
                    Some(current) if current != next => {
                        self.current = Some(next);
                        return Some(Ok(current));
                    }
                    _ => self.current = Some(next),
                },
                Err(e) => return Some(Err(e)),
            }
        }
    }
}

/// A triple of a CONSTRUCT template.
pub(crate) struct TripleTemplate {
    subject: TemplateValue,
    predicate: TemplateValue,
    object: TemplateValue,
}

enum TemplateValue {
    Constant(Term),
    BlankNode(BlankNode),
    Variable(Variable),
}

impl TripleTemplate {
    pub(crate) fn from_sparql_algebra(pattern: &AlTriplePattern) -> Option<Self> {
        Some(Self {
            subject: TemplateValue::from_sparql_algebra(&pattern.subject)?,
            predicate: match &pattern.predicate {
                NamedNodePattern::NamedNode(node) => TemplateValue::Constant(node.clone().into()),
                NamedNodePattern::Variable(variable) => TemplateValue::Variable(variable.clone()),
            },
            object: TemplateValue::from_sparql_algebra(&pattern.object)?,
        })
    }

    fn instantiate(
        &self,
        binding: &Binding,
        blank_nodes: &mut FxHashMap<BlankNode, BlankNode>,
    ) -> Option<Triple> {
        let Term::NamedNode(predicate) = self.predicate.instantiate(binding, blank_nodes)? else {
            return None;
        };
        let object = self.object.instantiate(binding, blank_nodes)?;
        match self.subject.instantiate(binding, blank_nodes)? {
            Term::NamedNode(subject) => Some(Triple::new(subject, predicate, object)),
            Term::BlankNode(subject) => Some(Triple::new(subject, predicate, object)),
            _ => None,
        }
    }
}

impl TemplateValue {
    fn from_sparql_algebra(pattern: &TermPattern) -> Option<Self> {
        Some(match pattern {
            TermPattern::Variable(variable) => Self::Variable(variable.clone()),
            TermPattern::BlankNode(node) => Self::BlankNode(node.clone()),
            pattern => Self::Constant(Term::try_from(pattern.clone()).ok()?),
        })
    }

    fn instantiate(
        &self,
        binding: &Binding,
        blank_nodes: &mut FxHashMap<BlankNode, BlankNode>,
    ) -> Option<Term> {
        match self {
            Self::Constant(term) => Some(term.clone()),
            Self::Variable(variable) => binding.get(variable).cloned(),
            Self::BlankNode(node) => Some(blank_nodes.entry(node.clone()).or_default().clone().into()),
        }
    }
}

/// The triples built by applying a CONSTRUCT template to each solution.
pub(crate) struct ConstructIterator<'a> {
    iter: BindingIter<'a>,
    template: Vec<TripleTemplate>,
    buffered_results: Vec<Triple>,
    already_emitted_results: FxHashSet<Triple>,
}

impl<'a> ConstructIterator<'a> {
    pub(crate) fn new(iter: BindingIter<'a>, template: Vec<TripleTemplate>) -> Self {
        Self {
            iter,
            template,
            buffered_results: Vec::new(),
            already_emitted_results: FxHashSet::default(),
        }
    }
}

impl Iterator for ConstructIterator<'_> {
    type Item = Result<Triple, EvaluationError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(triple) = self.buffered_results.pop() {
                return Some(Ok(triple));
            }
            let binding = match self.iter.next()? {
                Ok(binding) => binding,
                Err(e) => return Some(Err(e)),
            };
            // Fresh blank nodes for each solution
            let mut blank_nodes = FxHashMap::default();
            for template in &self.template {
                let Some(triple) = template.instantiate(&binding, &mut blank_nodes) else {
                    continue;
                };
                let is_new = triple.subject.is_blank_node()
                    || triple.object.is_blank_node()
                    || self.already_emitted_results.insert(triple.clone());
                if is_new {
                    self.buffered_results.push(triple);
                }
            }
            // Output order inside a solution follows the template
            self.buffered_results.reverse();
        }
    }
}

/// Stops a solution sequence once its token is cancelled, dropping (and so closing)
/// everything it still holds.
pub(crate) struct CancellableIterator<I> {
    inner: Option<I>,
    cancellation_token: CancellationToken,
}

impl<I> CancellableIterator<I> {
    pub(crate) fn new(inner: I, cancellation_token: CancellationToken) -> Self {
        Self {
            inner: Some(inner),
            cancellation_token,
        }
    }
}

impl<T, I: Iterator<Item = Result<T, EvaluationError>>> Iterator for CancellableIterator<I> {
    type Item = Result<T, EvaluationError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.cancellation_token.is_cancelled() {
            return self.inner.take().map(|_| Err(EvaluationError::Cancelled));
        }
        self.inner.as_mut()?.next()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::{NodeMaker, NodeType};
    use crate::node_relation::NodeRelation;
    use oxrdf::{Literal, Term, Variable};
    use sqlgebra::{ColumnRef, Database, MemoryDatabase, Relation};

    fn var(name: &str) -> Variable {
        Variable::new_unchecked(name)
    }

    fn people() -> MemoryDatabase {
        MemoryDatabase::new()
            .with_table(
                "people",
                &["id", "name"],
                &[
                    &[Some("1"), Some("Alice")],
                    &[Some("2"), Some("Bob")],
                    &[Some("3"), Some("Carol")],
                ],
            )
            .unwrap()
    }

    fn names() -> PlanNode {
        PlanNode::Relations {
            relations: vec![NodeRelation::new(
                Relation::new(Database::new("db")),
                [(
                    var("name"),
                    NodeMaker::typed(
                        NodeType::plain_literal(),
                        ColumnRef::parse("people.name").unwrap(),
                    ),
                )],
            )],
        }
    }

    fn name(value: &str) -> Binding {
        [(var("name"), Term::from(Literal::new_simple_literal(value)))]
            .into_iter()
            .collect()
    }

    #[test]
    fn rows_are_fetched_in_small_batches() {
        let database = people();
        let evaluator = SimpleEvaluator::new(&database, 1, CancellationToken::new());
        let mut solutions = evaluator.evaluate(&names());
        assert!(database.executed_queries().is_empty());
        assert_eq!(solutions.next().unwrap().unwrap(), name("Alice"));
        assert_eq!(database.executed_queries().len(), 1);
        assert_eq!(database.open_cursors(), 1);
        drop(solutions);
        assert_eq!(database.open_cursors(), 0);
    }

    #[test]
    fn exhausted_cursors_are_closed() {
        let database = people();
        let evaluator = SimpleEvaluator::new(&database, 1000, CancellationToken::new());
        let solutions = evaluator
            .evaluate(&names())
            .collect::<Result<Vec<_>, _>>()
            .unwrap();
        assert_eq!(solutions, [name("Alice"), name("Bob"), name("Carol")]);
        assert_eq!(database.open_cursors(), 0);
    }

    #[test]
    fn trivial_relations_do_not_query() {
        let database = people();
        let evaluator = SimpleEvaluator::new(&database, 10, CancellationToken::new());
        let solutions = evaluator
            .evaluate(&PlanNode::Relations {
                relations: vec![NodeRelation::trivial()],
            })
            .collect::<Result<Vec<_>, _>>()
            .unwrap();
        assert_eq!(solutions, [Binding::new()]);
        assert!(database.executed_queries().is_empty());
    }

    #[test]
    fn order_and_slice() {
        let database = people();
        let evaluator = SimpleEvaluator::new(&database, 10, CancellationToken::new());
        let plan = PlanNode::Slice {
            inner: Box::new(PlanNode::OrderBy {
                inner: Box::new(names()),
                expression: vec![OrderExpression::Desc(var("name").into())],
            }),
            start: 1,
            length: Some(1),
        };
        let solutions = evaluator
            .evaluate(&plan)
            .collect::<Result<Vec<_>, _>>()
            .unwrap();
        assert_eq!(solutions, [name("Bob")]);
    }

    #[test]
    fn cancellation_closes_the_cursor() {
        let database = people();
        let token = CancellationToken::new();
        let evaluator = SimpleEvaluator::new(&database, 1, token.clone());
        let mut solutions = evaluator.evaluate(&names());
        assert!(solutions.next().unwrap().is_ok());
        token.cancel();
        assert!(matches!(
            solutions.next(),
            Some(Err(EvaluationError::Cancelled))
        ));
        assert_eq!(database.open_cursors(), 0);
        assert!(solutions.next().is_none());
    }

    #[test]
    fn reduced_removes_consecutive_duplicates() {
        let database = MemoryDatabase::new();
        let evaluator = SimpleEvaluator::new(&database, 10, CancellationToken::new());
        let plan = PlanNode::Reduced {
            inner: Box::new(PlanNode::Values {
                bindings: vec![name("a"), name("a"), name("b"), name("a")],
            }),
        };
        let solutions = evaluator
            .evaluate(&plan)
            .collect::<Result<Vec<_>, _>>()
            .unwrap();
        assert_eq!(solutions, [name("a"), name("b"), name("a")]);
    }
}
