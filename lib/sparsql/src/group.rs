//! Grouping of relations that can be answered by a single SQL query.

use crate::binding::Binding;
use crate::node_relation::NodeRelation;
use crate::triple::TripleRelation;
use oxrdf::Triple;
use sqlgebra::{Relation, ResultRow};

/// Something produced from the rows of a [`Relation`].
pub(crate) trait GroupMember {
    type Item;

    fn base_relation(&self) -> &Relation;

    /// `None` if the row does not give a valid item.
    fn make_item(&self, row: &ResultRow) -> Option<Self::Item>;
}

impl GroupMember for NodeRelation {
    type Item = Binding;

    fn base_relation(&self) -> &Relation {
        self.relation()
    }

    fn make_item(&self, row: &ResultRow) -> Option<Binding> {
        self.make_binding(row)
    }
}

impl GroupMember for TripleRelation {
    type Item = Triple;

    fn base_relation(&self) -> &Relation {
        self.relation()
    }

    fn make_item(&self, row: &ResultRow) -> Option<Triple> {
        self.make_triple(row)
    }
}

/// Members sharing one physical query.
///
/// Every row of [`RelationGroup::relation`] is given to every member.
#[derive(Debug, Clone)]
pub(crate) struct RelationGroup<T> {
    relation: Relation,
    members: Vec<T>,
}

impl<T: GroupMember> RelationGroup<T> {
    fn new(member: T) -> Self {
        Self {
            relation: member.base_relation().clone(),
            members: vec![member],
        }
    }

    /// Two relations can share a query if they only differ by their projections.
    ///
    /// Merging is restricted to duplicate-free relations: a member with duplicate rows
    /// would see the rows of the merged query in a different number.
    fn accepts(&self, other: &Relation) -> bool {
        let first = &self.relation;
        if first.database().is_none() || first.database() != other.database() {
            return false;
        }
        if !first.is_unique() || !other.is_unique() {
            return false;
        }
        if first.joins() != other.joins()
            || first.condition() != other.condition()
            || first.order() != other.order()
            || first.limit() != other.limit()
            || first.limit_inverse() != other.limit_inverse()
        {
            return false;
        }
        let tables = first.tables();
        tables == other.tables()
            && tables.iter().all(|table| {
                first.aliases().original_of(table) == other.aliases().original_of(table)
            })
    }

    fn add(&mut self, member: T) {
        self.relation = self.relation.project(
            self.relation
                .projections()
                .iter()
                .chain(member.base_relation().projections())
                .cloned()
                .collect::<Vec<_>>(),
        );
        self.members.push(member);
    }

    #[inline]
    pub(crate) fn relation(&self) -> &Relation {
        &self.relation
    }

    #[inline]
    pub(crate) fn members(&self) -> &[T] {
        &self.members
    }
}

/// Groups the members in the order they are given, each one going to the first group
/// accepting it.
pub(crate) fn group_relations<T: GroupMember>(
    members: impl IntoIterator<Item = T>,
) -> Vec<RelationGroup<T>> {
    let mut groups = Vec::<RelationGroup<T>>::new();
    for member in members {
        if let Some(group) = groups
            .iter_mut()
            .find(|g| g.accepts(member.base_relation()))
        {
            group.add(member);
        } else {
            groups.push(RelationGroup::new(member));
        }
    }
    groups
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::{NodeMaker, NodeType};
    use oxrdf::Variable;
    use sqlgebra::{ColumnRef, Database, SqlExpression};

    fn relation(column: &str, unique: bool) -> NodeRelation {
        let base = Relation::new(Database::new("db"));
        NodeRelation::new(
            if unique { base.unique() } else { base },
            [(
                Variable::new_unchecked(column),
                NodeMaker::typed(
                    NodeType::plain_literal(),
                    ColumnRef::parse(&format!("people.{column}")).unwrap(),
                ),
            )],
        )
    }

    #[test]
    fn unique_relations_are_merged() {
        let groups = group_relations([relation("name", true), relation("age", true)]);
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].members().len(), 2);
        assert_eq!(groups[0].relation().projections().len(), 2);
        assert!(groups[0].relation().is_unique());
    }

    #[test]
    fn a_duplicated_member_is_never_merged() {
        let groups = group_relations([relation("name", true), relation("age", false)]);
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].relation(), relation("name", true).relation());
    }

    #[test]
    fn different_conditions_are_not_merged() {
        let filtered = relation("age", true).select(SqlExpression::column_equals_value(
            ColumnRef::parse("people.age").unwrap(),
            "42",
        ));
        assert_eq!(
            group_relations([relation("name", true), filtered]).len(),
            2
        );
    }

    #[test]
    fn trivial_relations_are_not_merged() {
        assert_eq!(
            group_relations([NodeRelation::trivial(), NodeRelation::trivial()]).len(),
            2
        );
    }
}
