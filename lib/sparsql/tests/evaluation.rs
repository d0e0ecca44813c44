use oxrdf::vocab::xsd;
use oxrdf::{Literal, NamedNode, Term, Triple, Variable};
use sparsql::{
    Binding, CancellationToken, EvaluationError, NodeMaker, NodeType, PatternTerm, QueryEngine,
    QueryResults, QuerySolution, Template, TriplePattern, TripleRelation,
};
use spargebra::SparqlParser;
use sqlgebra::{ColumnRef, Database, MemoryDatabase, Relation};
use std::collections::{HashMap, HashSet};
use tracing_subscriber::filter::LevelFilter;

const EX: &str = "http://example.com/";

fn iri(name: &str) -> NamedNode {
    NamedNode::new_unchecked(format!("{EX}{name}"))
}

fn column(name: &str) -> ColumnRef {
    ColumnRef::parse(name).unwrap()
}

fn template(value: &str) -> Template {
    Template::parse(&format!("{EX}{value}")).unwrap()
}

fn bridge(
    unique: bool,
    subject: NodeMaker,
    predicate: &str,
    object: NodeMaker,
) -> TripleRelation {
    let relation = Relation::new(Database::new("db"));
    TripleRelation::new(
        if unique { relation.unique() } else { relation },
        subject,
        NodeMaker::Fixed(iri(predicate).into()),
        object,
    )
}

fn person(column_name: &str) -> NodeMaker {
    NodeMaker::typed(NodeType::Iri, template(&format!("person/@@{column_name}@@")))
}

fn string(column_name: &str) -> NodeMaker {
    NodeMaker::typed(NodeType::plain_literal(), column(column_name))
}

fn boolean(column_name: &str) -> NodeMaker {
    NodeMaker::typed(NodeType::typed_literal(xsd::BOOLEAN.into_owned()), column(column_name))
}

fn date_time(column_name: &str) -> NodeMaker {
    NodeMaker::typed(NodeType::typed_literal(xsd::DATE_TIME.into_owned()), column(column_name))
}

fn database() -> MemoryDatabase {
    MemoryDatabase::new()
        .with_table(
            "people",
            &["id", "name", "team"],
            &[
                &[Some("1"), Some("Alice"), Some("10")],
                &[Some("2"), Some("Bob"), Some("10")],
                &[Some("3"), None, Some("20")],
            ],
        )
        .unwrap()
        .with_table(
            "friends",
            &["a", "b"],
            &[&[Some("1"), Some("2")], &[Some("2"), Some("3")]],
        )
        .unwrap()
        .with_table(
            "teams",
            &["id", "label"],
            &[&[Some("10"), Some("Blue")], &[Some("20"), Some("Bob")]],
        )
        .unwrap()
        .with_table("nicks", &["id", "nick"], &[&[Some("2"), Some("Bobby")]])
        .unwrap()
        .with_table(
            "active",
            &["id", "flag"],
            &[
                &[Some("1"), Some("1")],
                &[Some("2"), Some("true")],
                &[Some("3"), Some("0")],
            ],
        )
        .unwrap()
        .with_table(
            "verified",
            &["id", "flag"],
            &[&[Some("1"), Some("true")], &[Some("3"), Some("false")]],
        )
        .unwrap()
        .with_table("born", &["id", "at"], &[&[Some("1"), Some("2001-02-03 04:05:06")]])
        .unwrap()
        .with_table("joined", &["id", "at"], &[&[Some("2"), Some("2001-02-03T04:05:06")]])
        .unwrap()
}

fn select(
    engine: &QueryEngine,
    database: &MemoryDatabase,
    query: &str,
) -> Result<Vec<QuerySolution>, EvaluationError> {
    let query = SparqlParser::new().parse_query(query)?;
    let QueryResults::Solutions(solutions) = engine.execute(database, &query)? else {
        panic!("expected solutions")
    };
    solutions.collect()
}

/// Prints the SQL queries and cursor warnings of the test.
fn init_logging() {
    tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(LevelFilter::DEBUG)
        .try_init()
        .ok();
}

fn literal(value: &str) -> Term {
    Literal::new_simple_literal(value).into()
}

#[test]
fn friends_of_friends_in_a_single_query() -> Result<(), EvaluationError> {
    init_logging();
    let database = database();
    let engine = QueryEngine::new(vec![
        bridge(
            false,
            string("friends.a"),
            "knows",
            person("friends.b"),
        ),
        bridge(false, person("people.id"), "name", string("people.name")),
    ]);
    let solutions = select(
        &engine,
        &database,
        "SELECT ?person ?name WHERE { ?person <http://example.com/knows> ?other . ?other <http://example.com/name> ?name }",
    )?;
    assert_eq!(solutions.len(), 1);
    assert_eq!(solutions[0].get("person"), Some(&literal("1")));
    assert_eq!(solutions[0].get("name"), Some(&literal("Bob")));
    assert_eq!(solutions[0].get("other"), None);
    assert_eq!(
        database.executed_queries(),
        [
            "SELECT DISTINCT T1_friends.a, T1_friends.b, T2_people.name FROM friends AS T1_friends, people AS T2_people WHERE T1_friends.b = T2_people.id"
        ]
    );
    assert_eq!(database.open_cursors(), 0);
    Ok(())
}

#[test]
fn patterns_without_bridges_send_no_query() -> Result<(), EvaluationError> {
    let database = database();
    let engine = QueryEngine::new(vec![bridge(
        true,
        person("people.id"),
        "name",
        string("people.name"),
    )]);
    let solutions = select(
        &engine,
        &database,
        "SELECT * WHERE { ?p <http://example.com/name> ?n . ?p <http://example.com/unknown> ?o }",
    )?;
    assert!(solutions.is_empty());
    assert!(database.executed_queries().is_empty());
    Ok(())
}

#[test]
fn filters_on_optional_variables_stay_above_the_optional() -> Result<(), EvaluationError> {
    let database = MemoryDatabase::new();
    let query = "SELECT ?x ?y WHERE { VALUES ?x { 1 2 } OPTIONAL { VALUES (?x ?y) { (1 9) } } FILTER(?y = 9) }";
    for engine in [
        QueryEngine::new(Vec::new()),
        QueryEngine::new(Vec::new()).with_all_optimizations(),
        QueryEngine::new(Vec::new()).without_filter_pushdown(),
    ] {
        let solutions = select(&engine, &database, query)?;
        assert_eq!(solutions.len(), 1);
        assert_eq!(solutions[0].get("x"), Some(&Literal::from(1).into()));
        assert_eq!(solutions[0].get("y"), Some(&Literal::from(9).into()));
    }
    Ok(())
}

#[test]
fn optional_parts_are_queried_for_each_solution() -> Result<(), EvaluationError> {
    let database = database();
    let engine = QueryEngine::new(vec![
        bridge(true, person("people.id"), "name", string("people.name")),
        bridge(true, person("nicks.id"), "nick", string("nicks.nick")),
    ]);
    let solutions = select(
        &engine,
        &database,
        "SELECT ?name ?nick WHERE { ?p <http://example.com/name> ?name OPTIONAL { ?p <http://example.com/nick> ?nick } } ORDER BY ?name",
    )?;
    assert_eq!(solutions.len(), 2);
    assert_eq!(solutions[0].get("name"), Some(&literal("Alice")));
    assert_eq!(solutions[0].get("nick"), None);
    assert_eq!(solutions[1].get("name"), Some(&literal("Bob")));
    assert_eq!(solutions[1].get("nick"), Some(&literal("Bobby")));
    let queries = database.executed_queries();
    assert_eq!(queries.len(), 3);
    assert!(queries[1..].iter().all(|q| q.contains("nicks.id = ")));
    assert_eq!(database.open_cursors(), 0);
    Ok(())
}

#[test]
fn converted_filters_are_sent_to_the_database() -> Result<(), EvaluationError> {
    let bridges = vec![bridge(
        true,
        person("people.id"),
        "name",
        string("people.name"),
    )];
    let query = "SELECT ?p WHERE { ?p <http://example.com/name> ?name FILTER(?name = \"Bob\") }";

    let conservative = database();
    let solutions = select(&QueryEngine::new(bridges.clone()), &conservative, query)?;
    assert_eq!(solutions.len(), 1);
    assert!(!conservative.executed_queries()[0].contains("Bob"));

    let aggressive = database();
    let solutions = select(
        &QueryEngine::new(bridges).with_all_optimizations(),
        &aggressive,
        query,
    )?;
    assert_eq!(solutions.len(), 1);
    assert_eq!(solutions[0].get("p"), Some(&iri("person/2").into()));
    assert!(aggressive.executed_queries()[0].contains("people.name = 'Bob'"));
    Ok(())
}

#[test]
fn unique_relations_share_a_query() -> Result<(), EvaluationError> {
    let database = database();
    let engine = QueryEngine::new(vec![
        bridge(true, person("people.id"), "name", string("people.name")),
        bridge(true, person("people.id"), "team", string("people.team")),
    ]);
    let solutions = select(&engine, &database, "SELECT * WHERE { ?s ?p ?o }")?;
    assert_eq!(solutions.len(), 5);
    assert_eq!(database.executed_queries().len(), 1);
    Ok(())
}

#[test]
fn relations_with_duplicates_are_never_merged() -> Result<(), EvaluationError> {
    let database = database();
    let engine = QueryEngine::new(vec![
        bridge(true, person("people.id"), "name", string("people.name")),
        bridge(false, person("people.id"), "team", string("people.team")),
    ]);
    let solutions = select(&engine, &database, "SELECT * WHERE { ?s ?p ?o }")?;
    assert_eq!(solutions.len(), 5);
    assert_eq!(database.executed_queries().len(), 2);
    Ok(())
}

#[test]
fn cursors_are_released_when_reading_stops() -> Result<(), Box<dyn std::error::Error>> {
    let database = database();
    let engine = QueryEngine::new(vec![bridge(
        true,
        person("people.id"),
        "name",
        string("people.name"),
    )])
    .with_fetch_size(1);
    let query = SparqlParser::new().parse_query("SELECT * WHERE { ?s ?p ?o }")?;
    let QueryResults::Solutions(mut solutions) = engine.execute(&database, &query)? else {
        panic!("expected solutions")
    };
    assert!(solutions.next().is_some());
    assert_eq!(database.open_cursors(), 1);
    drop(solutions);
    assert_eq!(database.open_cursors(), 0);

    let query = SparqlParser::new().parse_query("ASK { ?s ?p ?o }")?;
    assert!(matches!(
        engine.execute(&database, &query)?,
        QueryResults::Boolean(true)
    ));
    assert_eq!(database.open_cursors(), 0);
    Ok(())
}

#[test]
fn close_failures_do_not_hide_results() -> Result<(), EvaluationError> {
    init_logging();
    let database = database().with_failing_close();
    let engine = QueryEngine::new(vec![bridge(
        true,
        person("people.id"),
        "name",
        string("people.name"),
    )]);
    let solutions = select(&engine, &database, "SELECT * WHERE { ?s ?p ?o }")?;
    assert_eq!(solutions.len(), 2);
    assert_eq!(database.open_cursors(), 0);
    Ok(())
}

#[test]
fn cancellation_stops_the_evaluation() -> Result<(), Box<dyn std::error::Error>> {
    let database = database();
    let token = CancellationToken::new();
    let engine = QueryEngine::new(vec![bridge(
        true,
        person("people.id"),
        "name",
        string("people.name"),
    )])
    .with_fetch_size(1)
    .with_cancellation_token(token.clone());
    let query = SparqlParser::new().parse_query("SELECT * WHERE { ?s ?p ?o }")?;
    let QueryResults::Solutions(mut solutions) = engine.execute(&database, &query)? else {
        panic!("expected solutions")
    };
    assert!(solutions.next().is_some());
    token.cancel();
    assert!(matches!(
        solutions.next(),
        Some(Err(EvaluationError::Cancelled))
    ));
    assert!(solutions.next().is_none());
    assert_eq!(database.open_cursors(), 0);
    Ok(())
}

#[test]
fn database_errors_are_reported() -> Result<(), Box<dyn std::error::Error>> {
    let engine = QueryEngine::new(vec![bridge(
        true,
        person("missing.id"),
        "name",
        string("missing.name"),
    )]);
    let database = database();
    let query = SparqlParser::new().parse_query("SELECT * WHERE { ?s ?p ?o }")?;
    let QueryResults::Solutions(mut solutions) = engine.execute(&database, &query)? else {
        panic!("expected solutions")
    };
    assert!(matches!(
        solutions.next(),
        Some(Err(EvaluationError::Database(_)))
    ));
    Ok(())
}

#[test]
fn unsupported_features_are_rejected() -> Result<(), Box<dyn std::error::Error>> {
    let database = database();
    let engine = QueryEngine::new(Vec::new());
    for query in [
        "SELECT (COUNT(*) AS ?c) WHERE { ?s ?p ?o }",
        "SELECT * WHERE { ?s <http://example.com/p>* ?o }",
        "DESCRIBE <http://example.com/s>",
        "SELECT * FROM <http://example.com/g> WHERE { ?s ?p ?o }",
    ] {
        let query = SparqlParser::new().parse_query(query)?;
        assert!(matches!(
            engine.execute(&database, &query),
            Err(EvaluationError::Unsupported(_))
        ));
    }
    Ok(())
}

#[test]
fn construct_and_find() -> Result<(), Box<dyn std::error::Error>> {
    let database = database();
    let engine = QueryEngine::new(vec![
        bridge(true, person("people.id"), "name", string("people.name")),
        bridge(true, person("nicks.id"), "name", string("nicks.nick")),
    ]);
    let query = SparqlParser::new().parse_query(
        "CONSTRUCT { ?p <http://example.com/label> ?n } WHERE { ?p <http://example.com/name> ?n }",
    )?;
    let QueryResults::Graph(triples) = engine.execute(&database, &query)? else {
        panic!("expected triples")
    };
    assert_eq!(triples.collect::<Result<Vec<_>, _>>()?.len(), 3);

    let bob = Term::from(iri("person/2"));
    let triples = engine
        .find(&database, Some(&bob), None, None)
        .collect::<Result<HashSet<_>, _>>()?;
    assert_eq!(
        triples,
        HashSet::from([
            Triple::new(iri("person/2"), iri("name"), Literal::new_simple_literal("Bob")),
            Triple::new(iri("person/2"), iri("name"), Literal::new_simple_literal("Bobby")),
        ])
    );
    Ok(())
}

/// Bindings of the patterns computed from all the triples of the bridges.
fn brute_force(triples: &[Triple], patterns: &[TriplePattern]) -> Vec<Binding> {
    let mut solutions = vec![Binding::new()];
    for pattern in patterns {
        let mut new_solutions = Vec::new();
        for triple in triples {
            let terms = [
                Term::from(triple.subject.clone()),
                triple.predicate.clone().into(),
                triple.object.clone(),
            ];
            let mut binding = Binding::new();
            let mut matches = true;
            for (position, term) in pattern.positions().into_iter().zip(terms) {
                match position {
                    PatternTerm::Term(constant) => matches &= *constant == term,
                    PatternTerm::Variable(variable) => {
                        if let Some(bound) = binding.get(variable) {
                            matches &= *bound == term;
                        }
                        binding.insert(variable.clone(), term);
                    }
                }
            }
            if matches {
                new_solutions.extend(solutions.iter().filter_map(|s| s.merge(&binding)));
            }
        }
        solutions = new_solutions;
    }
    solutions
}

/// The number of times each binding occurs.
fn counts(bindings: impl IntoIterator<Item = Binding>) -> HashMap<Binding, usize> {
    let mut counts = HashMap::new();
    for binding in bindings {
        *counts.entry(binding).or_default() += 1;
    }
    counts
}

#[test]
fn translated_patterns_give_the_same_bindings_as_brute_force()
-> Result<(), Box<dyn std::error::Error>> {
    let database = database();
    let team = NodeMaker::typed(NodeType::Iri, template("team/@@teams.id@@"));
    let engine = QueryEngine::new(vec![
        bridge(true, person("people.id"), "name", string("people.name")),
        bridge(true, person("people.id"), "label", string("people.name")),
        bridge(
            false,
            person("people.id"),
            "memberOf",
            NodeMaker::typed(NodeType::Iri, template("team/@@people.team@@")),
        ),
        bridge(true, team, "label", string("teams.label")),
        bridge(false, person("friends.a"), "knows", person("friends.b")),
        bridge(true, person("active.id"), "active", boolean("active.flag")),
        bridge(true, person("verified.id"), "verified", boolean("verified.flag")),
        bridge(true, person("born.id"), "born", date_time("born.at")),
        bridge(true, person("joined.id"), "joined", date_time("joined.at")),
    ]);
    let triples = engine
        .find(&database, None, None, None)
        .collect::<Result<Vec<_>, _>>()?;
    assert_eq!(triples.len(), 18);

    let var = |name: &str| PatternTerm::from(Variable::new_unchecked(name));
    let constant = |name: &str| PatternTerm::from(iri(name));
    let bgps = [
        vec![
            TriplePattern::new(var("p"), constant("memberOf"), var("t")),
            TriplePattern::new(var("t"), constant("label"), var("l")),
        ],
        vec![
            TriplePattern::new(var("x"), constant("label"), var("l")),
            TriplePattern::new(var("y"), constant("name"), var("l")),
        ],
        vec![
            TriplePattern::new(var("s"), var("pred"), var("o")),
            TriplePattern::new(var("o"), constant("label"), var("l")),
        ],
        vec![
            TriplePattern::new(var("a"), constant("knows"), var("b")),
            TriplePattern::new(var("b"), var("pred"), var("v")),
            TriplePattern::new(var("b"), constant("memberOf"), var("t")),
        ],
        vec![TriplePattern::new(
            var("s"),
            constant("label"),
            PatternTerm::from(Literal::new_simple_literal("Bob")),
        )],
        vec![TriplePattern::new(var("s"), var("s"), var("o"))],
        vec![
            TriplePattern::new(var("a"), constant("knows"), var("b")),
            TriplePattern::new(var("b"), constant("knows"), var("c")),
        ],
        vec![
            TriplePattern::new(var("a"), constant("knows"), var("b")),
            TriplePattern::new(var("a"), constant("memberOf"), var("t")),
            TriplePattern::new(var("b"), constant("memberOf"), var("t")),
        ],
        vec![
            TriplePattern::new(var("x"), constant("active"), var("f")),
            TriplePattern::new(var("y"), constant("verified"), var("f")),
        ],
        vec![
            TriplePattern::new(var("x"), constant("born"), var("d")),
            TriplePattern::new(var("y"), constant("joined"), var("d")),
        ],
    ];
    for patterns in bgps {
        let expected = brute_force(&triples, &patterns);
        let actual = engine
            .evaluate_bgp(&database, &patterns, None)?
            .collect::<Result<Vec<_>, _>>()?;
        assert_eq!(actual.len(), expected.len(), "for {patterns:?}");
        assert_eq!(counts(actual), counts(expected), "for {patterns:?}");
    }
    assert_eq!(database.open_cursors(), 0);
    Ok(())
}
