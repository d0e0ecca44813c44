use sqlgebra::{
    ColumnRef, Database, JoinCondition, MemoryDatabase, MemoryDatabaseError, Relation,
    SelectQuery, SqlCursor, SqlExecutor, SqlExpression,
};

fn column(name: &str) -> ColumnRef {
    ColumnRef::parse(name).unwrap()
}

fn database() -> MemoryDatabase {
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
        .with_table(
            "friends",
            &["a", "b"],
            &[&[Some("1"), Some("2")], &[Some("1"), Some("3")], &[Some("2"), Some("3")]],
        )
        .unwrap()
}

fn collect(
    db: &MemoryDatabase,
    relation: Relation,
) -> Result<Vec<Vec<Option<String>>>, MemoryDatabaseError> {
    let mut cursor = db.execute(&SelectQuery::new(relation))?;
    let mut rows = Vec::new();
    while let Some(row) = cursor.next_row() {
        rows.push(row?.values().to_vec());
    }
    cursor.close()?;
    Ok(rows)
}

fn values(rows: &[&[&str]]) -> Vec<Vec<Option<String>>> {
    rows.iter()
        .map(|r| r.iter().map(|v| Some((*v).to_owned())).collect())
        .collect()
}

#[test]
fn join_through_prefixed_copies() -> Result<(), Box<dyn std::error::Error>> {
    let db = Database::new("db");
    let friends = Relation::new(db.clone())
        .select(SqlExpression::column_equals_value(column("friends.a"), "1"))
        .project([column("friends.b")]);
    let friends = friends.rename_tables(&friends.prefix_renames(1)?)?;
    let people = Relation::new(db).unique().project([column("people.name")]);
    let people = people.rename_tables(&people.prefix_renames(2)?)?;
    let joined = Relation::join_all([friends, people])?
        .with_joins([JoinCondition::new([(
            column("T1_friends.b"),
            column("T2_people.id"),
        )])?])
        .project([column("T2_people.name")]);
    let query = SelectQuery::new(joined.clone());
    assert_eq!(
        query.to_sql(),
        "SELECT DISTINCT T2_people.name FROM friends AS T1_friends, people AS T2_people WHERE T1_friends.b = T2_people.id AND T1_friends.a = '1'"
    );
    let mut rows = collect(&database(), joined)?;
    rows.sort();
    assert_eq!(rows, values(&[&["Bob"], &["Carol"]]));
    Ok(())
}

#[test]
fn self_join_of_one_table() -> Result<(), Box<dyn std::error::Error>> {
    let friends =
        Relation::new(Database::new("db")).project([column("friends.a"), column("friends.b")]);
    let first = friends.rename_tables(&friends.prefix_renames(1)?)?;
    let second = friends.rename_tables(&friends.prefix_renames(2)?)?;
    let joined = Relation::join_all([first, second])?
        .with_joins([JoinCondition::new([(
            column("T1_friends.b"),
            column("T2_friends.a"),
        )])?])
        .project([column("T1_friends.a"), column("T2_friends.b")]);
    assert_eq!(
        SelectQuery::new(joined.clone()).to_sql(),
        "SELECT DISTINCT T1_friends.a, T2_friends.b FROM friends AS T1_friends, friends AS T2_friends WHERE T1_friends.b = T2_friends.a"
    );
    assert_eq!(collect(&database(), joined)?, values(&[&["1", "3"]]));
    Ok(())
}

#[test]
fn trivial_relation_has_one_empty_row() -> Result<(), Box<dyn std::error::Error>> {
    let db = database();
    assert_eq!(collect(&db, Relation::trivial())?, vec![Vec::<Option<String>>::new()]);
    assert_eq!(db.executed_queries(), ["SELECT 1"]);
    Ok(())
}

#[test]
fn failing_close_is_reported() {
    let db = database().with_failing_close();
    let relation = Relation::new(Database::new("db")).project([column("people.id")]);
    let mut cursor = db.execute(&SelectQuery::new(relation)).unwrap();
    assert!(matches!(cursor.close(), Err(MemoryDatabaseError::CloseFailed)));
    assert_eq!(db.open_cursors(), 0);
}
