use crate::binding::Binding;
use crate::node::NodeMaker;
use oxrdf::Variable;
use sqlgebra::{Relation, ResultRow, SqlExpression};
use std::collections::BTreeMap;

/// A relation whose rows give a [`Binding`] of some variables.
///
/// Rows where one of the `equal_terms` makers does not give the term bound to its variable
/// are skipped.
#[derive(Eq, PartialEq, Debug, Clone, Hash)]
pub struct NodeRelation {
    relation: Relation,
    bindings: BTreeMap<Variable, NodeMaker>,
    equal_terms: Vec<(Variable, NodeMaker)>,
}

impl NodeRelation {
    /// Builds the node relation, projecting the columns used by the node makers.
    pub fn new(relation: Relation, bindings: impl IntoIterator<Item = (Variable, NodeMaker)>) -> Self {
        Self::build(relation, bindings.into_iter().collect(), Vec::new())
    }

    fn build(
        relation: Relation,
        bindings: BTreeMap<Variable, NodeMaker>,
        equal_terms: Vec<(Variable, NodeMaker)>,
    ) -> Self {
        let columns = bindings
            .values()
            .chain(equal_terms.iter().map(|(_, maker)| maker))
            .flat_map(NodeMaker::columns)
            .cloned()
            .collect::<Vec<_>>();
        Self {
            relation: relation.project(columns),
            bindings,
            equal_terms,
        }
    }

    /// Requires every `(variable, maker)` pair to give the term bound to `variable`.
    #[must_use]
    pub fn with_equal_terms(
        self,
        equal_terms: impl IntoIterator<Item = (Variable, NodeMaker)>,
    ) -> Self {
        let mut all = self.equal_terms;
        all.extend(equal_terms);
        Self::build(self.relation, self.bindings, all)
    }

    /// The relation with a single empty binding.
    pub fn trivial() -> Self {
        Self {
            relation: Relation::trivial(),
            bindings: BTreeMap::new(),
            equal_terms: Vec::new(),
        }
    }

    #[inline]
    pub fn relation(&self) -> &Relation {
        &self.relation
    }

    #[inline]
    pub fn bindings(&self) -> &BTreeMap<Variable, NodeMaker> {
        &self.bindings
    }

    #[inline]
    pub fn equal_terms(&self) -> &[(Variable, NodeMaker)] {
        &self.equal_terms
    }

    #[inline]
    pub fn node_maker(&self, variable: &Variable) -> Option<&NodeMaker> {
        self.bindings.get(variable)
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.relation.is_empty()
    }

    /// Conjoins a condition to the relation.
    #[must_use]
    pub fn select(&self, condition: SqlExpression) -> Self {
        Self {
            relation: self.relation.select(condition),
            bindings: self.bindings.clone(),
            equal_terms: self.equal_terms.clone(),
        }
    }

    /// Fixes the variables bound in `binding` to their value.
    ///
    /// Returns `None` if the relation can not produce a compatible binding.
    pub fn substitute(&self, binding: &Binding) -> Option<Self> {
        let mut conditions = Vec::new();
        let mut bindings = self.bindings.clone();
        for (variable, maker) in &mut bindings {
            if let Some(term) = binding.get(variable) {
                let (fixed, condition) = maker.select_node(term)?;
                *maker = fixed;
                conditions.push(condition);
            }
        }
        let mut equal_terms = Vec::with_capacity(self.equal_terms.len());
        for (variable, maker) in &self.equal_terms {
            if let Some(term) = binding.get(variable) {
                conditions.push(maker.select_node(term)?.1);
            } else {
                equal_terms.push((variable.clone(), maker.clone()));
            }
        }
        let relation = self.relation.select(SqlExpression::and_all(conditions));
        if relation.is_empty() {
            return None;
        }
        Some(Self::build(relation, bindings, equal_terms))
    }

    /// The binding of a row, `None` if a node maker does not give a valid term for it.
    pub fn make_binding(&self, row: &ResultRow) -> Option<Binding> {
        let binding = self
            .bindings
            .iter()
            .map(|(variable, maker)| Some((variable.clone(), maker.make_node(row)?)))
            .collect::<Option<Binding>>()?;
        for (variable, maker) in &self.equal_terms {
            if binding.get(variable) != maker.make_node(row).as_ref() {
                return None;
            }
        }
        Some(binding)
    }
}
