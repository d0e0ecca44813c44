//! Translation of basic graph patterns into [`NodeRelation`]s.

use crate::algebra::{PatternTerm, TriplePattern};
use crate::constraint::{Constraint, ConstraintCollector};
use crate::error::EvaluationError;
use crate::node::NodeMaker;
use crate::node_relation::NodeRelation;
use crate::triple::TripleRelation;
use oxrdf::Variable;
use sqlgebra::{Relation, SqlExpression};
use std::collections::BTreeMap;
use std::collections::btree_map::Entry;
use tracing::debug;

/// Finds all the ways the bridges can produce the triples of `patterns` together.
///
/// Each returned relation is one combination of bridges, one bridge per pattern, and the
/// solutions of the patterns are the disjoint union of the bindings of all the relations.
/// No relation is returned if one of the patterns matches no bridge.
pub fn translate_bgp(
    patterns: &[TriplePattern],
    bridges: &[TripleRelation],
) -> Result<Vec<NodeRelation>, EvaluationError> {
    if patterns.is_empty() {
        return Ok(vec![NodeRelation::trivial()]);
    }
    let use_prefixes = patterns.len() > 1;
    let mut next_prefix = 0;
    let mut candidates = Vec::with_capacity(patterns.len());
    for pattern in patterns {
        let mut matching = Vec::new();
        for bridge in bridges {
            let Some(selected) = bridge.select_triple(pattern) else {
                continue;
            };
            matching.push(if use_prefixes {
                next_prefix += 1;
                selected.with_prefix(next_prefix)?
            } else {
                selected
            });
        }
        debug!("{} candidate bridges for {pattern}", matching.len());
        if matching.is_empty() {
            return Ok(Vec::new());
        }
        candidates.push((pattern, matching));
    }
    // Stable: patterns with the same number of candidates keep their order.
    candidates.sort_by_key(|(_, matching)| matching.len());

    let mut joiners = vec![Joiner::default()];
    for (pattern, matching) in &candidates {
        joiners = joiners
            .iter()
            .flat_map(|joiner| {
                matching
                    .iter()
                    .filter_map(move |candidate| joiner.join(pattern, candidate))
            })
            .collect();
        if joiners.is_empty() {
            break;
        }
    }
    debug!("{} bridge combinations are satisfiable", joiners.len());

    let mut relations = Vec::with_capacity(joiners.len());
    for joiner in joiners {
        let relation = joiner.to_node_relation()?;
        // Conditions can be unsatisfiable together while pairwise satisfiable.
        if !relation.is_empty() {
            relations.push(relation);
        }
    }
    Ok(relations)
}

/// A partial assignment of bridges to patterns.
#[derive(Default, Clone)]
struct Joiner<'a> {
    history: Vec<(&'a TriplePattern, &'a TripleRelation)>,
    condition: SqlExpression,
    /// Shared variables whose occurrences are compared on each row.
    compared: Vec<Variable>,
}

impl<'a> Joiner<'a> {
    /// Adds an assignment, `None` if a shared variable can not be produced by all its
    /// occurrences.
    fn join(&self, pattern: &'a TriplePattern, relation: &'a TripleRelation) -> Option<Self> {
        let mut history = self.history.clone();
        history.push((pattern, relation));
        let mut occurrences = BTreeMap::<&Variable, Vec<&NodeMaker>>::new();
        for (pattern, relation) in &history {
            for (position, maker) in pattern.positions().into_iter().zip(relation.node_makers()) {
                if let PatternTerm::Variable(variable) = position {
                    occurrences.entry(variable).or_default().push(maker);
                }
            }
        }
        let mut conditions = Vec::new();
        let mut compared = Vec::new();
        for (variable, makers) in occurrences.into_iter().filter(|(_, m)| m.len() > 1) {
            let mut collector = ConstraintCollector::default();
            for maker in makers {
                maker.describe_self(&mut collector);
            }
            match collector.finish() {
                Constraint::Unsatisfiable => return None,
                Constraint::Satisfiable(condition) => conditions.push(condition),
                Constraint::NeedsComparison(condition) => {
                    conditions.push(condition);
                    compared.push(variable.clone());
                }
            }
        }
        Some(Self {
            history,
            condition: SqlExpression::and_all(conditions),
            compared,
        })
    }

    fn to_node_relation(&self) -> Result<NodeRelation, EvaluationError> {
        let relation = Relation::join_all(self.history.iter().map(|(_, r)| r.relation().clone()))?
            .select(self.condition.clone());
        let mut bindings = BTreeMap::new();
        let mut equal_terms = Vec::new();
        for (pattern, relation) in &self.history {
            for (position, maker) in pattern.positions().into_iter().zip(relation.node_makers()) {
                if let PatternTerm::Variable(variable) = position {
                    match bindings.entry(variable.clone()) {
                        Entry::Vacant(e) => {
                            e.insert(maker.clone());
                        }
                        Entry::Occupied(_) if self.compared.contains(variable) => {
                            equal_terms.push((variable.clone(), maker.clone()));
                        }
                        Entry::Occupied(_) => (),
                    }
                }
            }
        }
        Ok(NodeRelation::new(relation, bindings).with_equal_terms(equal_terms))
    }
}
