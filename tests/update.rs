use pretty_assertions::assert_eq;

use tabledb::{
    error::{Error, Result},
    sql::{
        engine::{Engine, KVEngine, Session, Transaction},
        plan::{Expression, Node},
        schema::{Column, Table},
        types::{DataType, Row, Value},
    },
    storage::memory::MemoryEngine,
};

fn setup() -> Result<Session<KVEngine<MemoryEngine>>> {
    let s = KVEngine::new(MemoryEngine::new()).session();
    let subjects = ["math", "chinese", "english"].iter().map(|s| Expression::constant(*s)).collect();
    s.create_table(
        Table::new(
            "grades",
            vec![
                Column::new("id", DataType::Integer).primary_key(),
                Column::new("name", DataType::Text).not_null(),
                Column::new("subject", DataType::Text)
                    .check(Expression::field("subject").in_list(subjects)),
                Column::new("grade", DataType::Integer).not_null(),
            ],
        ),
        false,
    )?;
    let rows = [
        ("Alice", "chinese", 98),
        ("Alice", "math", 100),
        ("Alice", "english", 100),
        ("Blob", "chinese", 77),
        ("Blob", "math", 89),
        ("Blob", "english", 92),
    ]
    .into_iter()
    .map(|(name, subject, grade)| vec![name.into(), subject.into(), Value::Integer(grade)])
    .collect();
    s.insert("grades", &["name", "subject", "grade"], rows)?;
    Ok(s)
}

fn by_name_subject(name: &str, subject: &str) -> Expression {
    Expression::field("name")
        .equal(Expression::constant(name))
        .and(Expression::field("subject").equal(Expression::constant(subject)))
}

fn update(name: &str, subject: &str, grade: i64) -> Node {
    Node::update("grades", vec![("grade", Expression::constant(grade))], Some(by_name_subject(name, subject)))
}

fn query(s: &Session<KVEngine<MemoryEngine>>, name: &str, subject: &str) -> Result<Option<Row>> {
    let result = s.execute(Node::scan("grades").filter(by_name_subject(name, subject)))?;
    Ok(result.into_rows().into_iter().next())
}

#[test]
fn test_basic_update() -> Result<()> {
    let s = setup()?;
    assert_eq!(s.execute(update("Alice", "chinese", 99))?.changes(), 1);
    let row = query(&s, "Alice", "chinese")?;
    assert_eq!(row.map(|r| r[3].clone()), Some(Value::Integer(99)));
    Ok(())
}

#[test]
fn test_update_nonexistent() -> Result<()> {
    let s = setup()?;
    assert_eq!(s.execute(update("jack", "math", 85))?.changes(), 0);
    Ok(())
}

#[test]
fn test_update_like() -> Result<()> {
    let s = setup()?;
    let predicate = Expression::field("name")
        .like(Expression::constant("%e"))
        .and(Expression::field("subject").equal(Expression::constant("math")));
    let result =
        s.update("grades", vec![("grade", Expression::constant(77i64))], Some(predicate.clone()))?;
    assert_eq!(result.changes(), 1);

    let rows = s.execute(Node::scan("grades").filter(predicate).select(&["name", "grade"]))?;
    assert_eq!(rows.into_rows(), vec![vec![Value::from("Alice"), 77i64.into()]]);
    Ok(())
}

#[test]
fn test_update_from_row() -> Result<()> {
    let s = setup()?;
    let bonus = Expression::Add(Box::new(Expression::field("grade")), Box::new(Expression::constant(5i64)));
    let result = s.update(
        "grades",
        vec![("grade", bonus)],
        Some(Expression::field("name").equal(Expression::constant("Blob"))),
    )?;
    assert_eq!(result.changes(), 3);

    let grades = s.execute(
        Node::scan("grades")
            .filter(Expression::field("name").equal(Expression::constant("Blob")))
            .select(&["grade"]),
    )?;
    assert_eq!(
        grades.into_rows(),
        vec![vec![Value::Integer(82)], vec![Value::Integer(94)], vec![Value::Integer(97)]]
    );
    Ok(())
}

#[test]
fn test_check_constraint() -> Result<()> {
    let s = setup()?;
    let insert = s.insert(
        "grades",
        &["name", "subject", "grade"],
        vec![vec!["Alice".into(), "art".into(), 90i64.into()]],
    );
    assert!(matches!(insert, Err(Error::Constraint(_))));

    let update = s.update(
        "grades",
        vec![("subject", Expression::constant("history"))],
        Some(by_name_subject("Alice", "math")),
    );
    assert!(matches!(update, Err(Error::Constraint(_))));

    // Failed statements leave nothing behind
    assert_eq!(s.execute(Node::scan("grades"))?.rows().len(), 6);
    assert!(query(&s, "Alice", "math")?.is_some());
    Ok(())
}

#[test]
fn test_not_null_and_types() -> Result<()> {
    let s = setup()?;
    let missing_grade = s.insert("grades", &["name", "subject"], vec![vec!["Eve".into(), "math".into()]]);
    assert_eq!(missing_grade, Err(Error::Constraint("NOT NULL constraint failed: grades.grade".into())));

    let text_grade = s.insert(
        "grades",
        &["name", "subject", "grade"],
        vec![vec!["Eve".into(), "math".into(), "ninety".into()]],
    );
    assert!(matches!(text_grade, Err(Error::Constraint(_))));

    // Numeric text is stored as an integer
    s.insert(
        "grades",
        &["name", "subject", "grade"],
        vec![vec!["Eve".into(), "math".into(), "90".into()]],
    )?;
    assert_eq!(query(&s, "Eve", "math")?.map(|r| r[3].clone()), Some(Value::Integer(90)));
    Ok(())
}

#[test]
fn test_update_in_transaction() -> Result<()> {
    let s = setup()?;
    s.transaction(|txn| {
        txn.execute(update("Alice", "math", 100))?;
        txn.execute(update("Alice", "math", 60))
    })?;
    assert_eq!(query(&s, "Alice", "math")?.map(|r| r[3].clone()), Some(Value::Integer(60)));

    let failed: Result<()> = s.transaction(|txn| {
        txn.execute(update("Alice", "math", 100))?;
        Err(Error::Query("unexpected".into()))
    });
    assert!(failed.is_err());
    assert_eq!(query(&s, "Alice", "math")?.map(|r| r[3].clone()), Some(Value::Integer(60)));
    Ok(())
}
