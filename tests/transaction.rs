use pretty_assertions::assert_eq;

use tabledb::{
    error::{Error, Result},
    sql::{
        engine::{Engine, KVEngine, Session, Transaction},
        executor::ResultSet,
        plan::{Expression, JoinType, Node},
        schema::{Column, Table},
        types::{DataType, Value},
    },
    storage::{memory::MemoryEngine, txn::TransactionState},
};

fn setup() -> Result<Session<KVEngine<MemoryEngine>>> {
    let s = KVEngine::new(MemoryEngine::new()).session();
    s.create_table(
        Table::new(
            "accounts",
            vec![
                Column::new("id", DataType::Integer).primary_key(),
                Column::new("owner", DataType::Text).not_null(),
                Column::new("balance", DataType::Integer)
                    .not_null()
                    .check(Expression::field("balance").gte(Expression::constant(0i64))),
            ],
        ),
        false,
    )?;
    s.insert(
        "accounts",
        &["owner", "balance"],
        vec![vec!["Alice".into(), 100i64.into()], vec!["Bob".into(), 50i64.into()]],
    )?;
    Ok(s)
}

fn snapshot(s: &Session<KVEngine<MemoryEngine>>) -> Result<ResultSet> {
    s.execute(Node::scan("accounts"))
}

fn transfer(from: i64, to: i64, amount: i64) -> Vec<Node> {
    let adjust = |id: i64, delta: i64| {
        Node::update(
            "accounts",
            vec![(
                "balance",
                Expression::Add(Box::new(Expression::field("balance")), Box::new(Expression::constant(delta))),
            )],
            Some(Expression::field("id").equal(Expression::constant(id))),
        )
    };
    vec![adjust(to, amount), adjust(from, -amount)]
}

#[test]
fn test_commit() -> Result<()> {
    let s = setup()?;
    let mut txn = s.begin()?;
    for node in transfer(1, 2, 30) {
        txn.execute(node)?;
    }

    // Not visible outside the transaction until commit
    assert_eq!(
        snapshot(&s)?.rows()[0],
        vec![Value::Integer(1), "Alice".into(), 100i64.into()]
    );
    txn.commit()?;
    assert_eq!(txn.state(), TransactionState::Committed);

    let balances: Vec<Value> = snapshot(&s)?.into_rows().into_iter().map(|r| r[2].clone()).collect();
    assert_eq!(balances, vec![Value::Integer(70), Value::Integer(80)]);
    Ok(())
}

#[test]
fn test_rollback() -> Result<()> {
    let s = setup()?;
    let before = snapshot(&s)?;
    let mut txn = s.begin()?;
    txn.execute(Node::insert("accounts", &["owner", "balance"], vec![vec!["Carol".into(), 10i64.into()]]))?;
    txn.execute(Node::delete("accounts", Some(Expression::field("owner").equal(Expression::constant("Bob")))))?;
    txn.execute(Node::drop_table("accounts", false))?;
    txn.rollback()?;

    assert_eq!(snapshot(&s)?, before);
    assert!(matches!(txn.commit(), Err(Error::Transaction(_))));
    assert!(matches!(txn.rollback(), Err(Error::Transaction(_))));
    Ok(())
}

#[test]
fn test_failure_rolls_back() -> Result<()> {
    let s = setup()?;
    let before = snapshot(&s)?;
    let mut txn = s.begin()?;
    let mut result = Ok(ResultSet::Update { count: 0 });
    // Bob can't go below zero, the first update has already been applied
    for node in transfer(2, 1, 80) {
        result = txn.execute(node);
        if result.is_err() {
            break;
        }
    }
    assert!(matches!(result, Err(Error::Constraint(_))));
    assert_eq!(txn.state(), TransactionState::Aborted);
    assert!(matches!(txn.execute(Node::scan("accounts")), Err(Error::Transaction(_))));

    assert_eq!(snapshot(&s)?, before);
    // The slot is free again
    s.begin()?.commit()?;
    Ok(())
}

#[test]
fn test_single_writer() -> Result<()> {
    let s = setup()?;
    let txn = s.begin()?;
    assert!(matches!(s.begin(), Err(Error::Transaction(_))));

    // Standalone writes need the slot, standalone reads don't
    let insert = s.insert("accounts", &["owner", "balance"], vec![vec!["Dan".into(), 1i64.into()]]);
    assert!(matches!(insert, Err(Error::Transaction(_))));
    assert_eq!(snapshot(&s)?.rows().len(), 2);

    // Dropping an active transaction rolls it back and frees the slot
    drop(txn);
    let mut txn = s.begin()?;
    txn.rollback()?;
    Ok(())
}

#[test]
fn test_transaction_closure() -> Result<()> {
    let s = setup()?;
    let moved = s.transaction(|txn| {
        let mut count = 0;
        for node in transfer(1, 2, 100) {
            count += txn.execute(node)?.changes();
        }
        Ok(count)
    })?;
    assert_eq!(moved, 2);

    let failed = s.transaction(|txn| {
        for node in transfer(1, 2, 1) {
            txn.execute(node)?;
        }
        Ok(())
    });
    assert!(matches!(failed, Err(Error::Constraint(_))));

    let balances: Vec<Value> = snapshot(&s)?.into_rows().into_iter().map(|r| r[2].clone()).collect();
    assert_eq!(balances, vec![Value::Integer(0), Value::Integer(150)]);
    Ok(())
}

#[test]
fn test_readers_never_see_partial_commits() -> Result<()> {
    let s = KVEngine::new(MemoryEngine::new()).session();
    for name in ["a", "b"] {
        s.create_table(
            Table::new(
                name,
                vec![
                    Column::new("id", DataType::Integer).primary_key(),
                    Column::new("v", DataType::Integer).not_null(),
                ],
            ),
            false,
        )?;
        s.insert(name, &["v"], vec![vec![0i64.into()]])?;
    }

    let writer = s.clone();
    let handle = std::thread::spawn(move || -> Result<()> {
        for i in 1..=500i64 {
            writer.transaction(|txn| {
                for name in ["a", "b"] {
                    txn.execute(Node::update(name, vec![("v", Expression::constant(i))], None))?;
                }
                Ok(())
            })?;
        }
        Ok(())
    });

    let both = Node::scan("a")
        .join(Node::scan("b"), JoinType::Cross, None)
        .select(&["a.v", "b.v"]);
    while !handle.is_finished() {
        let rows = s.execute(both.clone())?.into_rows();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0][0], rows[0][1]);
    }
    handle.join().map_err(|_| Error::Internal("writer panicked".into()))??;

    let rows = s.execute(both)?.into_rows();
    assert_eq!(rows, vec![vec![Value::Integer(500), Value::Integer(500)]]);
    Ok(())
}

#[test]
fn test_transaction_closure_commits_itself() -> Result<()> {
    let s = setup()?;
    let count = s.transaction(|txn| {
        let result = txn.execute(Node::delete("accounts", None))?;
        txn.commit()?;
        Ok(result.changes())
    })?;
    assert_eq!(count, 2);
    assert!(snapshot(&s)?.rows().is_empty());
    Ok(())
}
