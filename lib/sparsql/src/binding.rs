use oxrdf::{Term, Variable};
use std::collections::BTreeMap;
use std::collections::btree_map::Entry;

/// A solution mapping: the terms bound to some variables.
///
/// ```
/// use oxrdf::{Literal, Variable};
/// use sparsql::Binding;
///
/// let x = Variable::new("x")?;
/// let y = Variable::new("y")?;
/// let a = Binding::from_iter([(x.clone(), Literal::from(1).into())]);
/// let b = Binding::from_iter([(y.clone(), Literal::from(2).into())]);
/// let merged = a.merge(&b).ok_or("incompatible")?;
/// assert_eq!(merged.len(), 2);
/// assert!(a.merge(&Binding::from_iter([(x, Literal::from(3).into())])).is_none());
/// # Result::<_, Box<dyn std::error::Error>>::Ok(())
/// ```
#[derive(Eq, PartialEq, Debug, Clone, Hash, Default)]
pub struct Binding {
    values: BTreeMap<Variable, Term>,
}

impl Binding {
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn get(&self, variable: &Variable) -> Option<&Term> {
        self.values.get(variable)
    }

    #[inline]
    pub fn contains(&self, variable: &Variable) -> bool {
        self.values.contains_key(variable)
    }

    /// Binds `variable` if it is not already bound.
    pub fn insert(&mut self, variable: Variable, term: Term) {
        self.values.entry(variable).or_insert(term);
    }

    pub fn remove(&mut self, variable: &Variable) -> Option<Term> {
        self.values.remove(variable)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Variable, &Term)> {
        self.values.iter()
    }

    /// The union of two compatible bindings, `None` if they bind a variable to different terms.
    pub fn merge(&self, other: &Self) -> Option<Self> {
        let mut result = self.clone();
        for (variable, term) in &other.values {
            match result.values.entry(variable.clone()) {
                Entry::Occupied(e) => {
                    if e.get() != term {
                        return None;
                    }
                }
                Entry::Vacant(e) => {
                    e.insert(term.clone());
                }
            }
        }
        Some(result)
    }

    pub fn is_compatible_with(&self, other: &Self) -> bool {
        self.values
            .iter()
            .all(|(v, t)| other.values.get(v).is_none_or(|o| o == t))
    }

    pub fn shares_variable_with(&self, other: &Self) -> bool {
        self.values.keys().any(|v| other.values.contains_key(v))
    }

    /// Keeps only the given variables.
    #[must_use]
    pub fn project<'a>(&self, variables: impl IntoIterator<Item = &'a Variable>) -> Self {
        variables
            .into_iter()
            .filter_map(|v| Some((v.clone(), self.values.get(v)?.clone())))
            .collect()
    }
}

impl FromIterator<(Variable, Term)> for Binding {
    fn from_iter<I: IntoIterator<Item = (Variable, Term)>>(iter: I) -> Self {
        Self {
            values: iter.into_iter().collect(),
        }
    }
}

impl IntoIterator for Binding {
    type Item = (Variable, Term);
    type IntoIter = std::collections::btree_map::IntoIter<Variable, Term>;

    #[inline]
    fn into_iter(self) -> Self::IntoIter {
        self.values.into_iter()
    }
}
