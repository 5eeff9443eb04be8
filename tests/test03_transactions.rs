use sqlite_middleware::prelude::*;

fn ledger() -> Result<Database, SqliteDbError> {
    let db = Database::open_in_memory()?;
    db.execute_statements("CREATE TABLE ledger (id INTEGER PRIMARY KEY, amount INTEGER NOT NULL)")?;
    Ok(db)
}

fn total(db: &Database) -> Result<i64, SqliteDbError> {
    Ok(db
        .long_for_query("SELECT coalesce(sum(amount), 0) FROM ledger", &[])?
        .unwrap_or_default())
}

#[test]
fn begin_commit_and_rollback() -> Result<(), Box<dyn std::error::Error>> {
    let db = ledger()?;
    assert!(!db.in_transaction());

    db.begin_transaction()?;
    assert!(db.in_transaction());
    db.execute_update("INSERT INTO ledger (amount) VALUES (?)", &[SqlValue::Int(10)])?;
    db.commit()?;
    assert!(!db.in_transaction());
    assert_eq!(total(&db)?, 10);

    db.begin_deferred_transaction()?;
    db.execute_update("INSERT INTO ledger (amount) VALUES (?)", &[SqlValue::Int(5)])?;
    db.rollback()?;
    assert!(!db.in_transaction());
    assert_eq!(total(&db)?, 10);

    db.begin(TransactionKind::Immediate)?;
    assert!(db.in_transaction());
    db.commit()?;
    Ok(())
}

#[test]
fn nested_begin_and_stray_commit_fail() -> Result<(), Box<dyn std::error::Error>> {
    let db = ledger()?;
    db.begin_immediate_transaction()?;
    assert!(db.begin_transaction().is_err());
    assert!(db.in_transaction());
    db.rollback()?;

    assert!(db.commit().is_err());
    assert!(db.rollback().is_err());
    assert!(db.had_error());
    Ok(())
}

#[test]
fn run_transaction_follows_the_outcome() -> Result<(), Box<dyn std::error::Error>> {
    let mut db = ledger()?;

    let id = db.run_transaction(TransactionKind::Deferred, |db| {
        db.execute_update("INSERT INTO ledger (amount) VALUES (?)", &[SqlValue::Int(7)])?;
        Ok(TxOutcome::Commit(db.last_insert_rowid()?))
    })?;
    assert_eq!(id, 1);
    assert_eq!(total(&db)?, 7);

    let skipped = db.run_transaction(TransactionKind::Exclusive, |db| {
        db.execute_update("INSERT INTO ledger (amount) VALUES (?)", &[SqlValue::Int(100)])?;
        Ok(TxOutcome::Rollback("skipped"))
    })?;
    assert_eq!(skipped, "skipped");
    assert_eq!(total(&db)?, 7);

    let failed: Result<(), _> = db.run_transaction(TransactionKind::Immediate, |db| {
        db.execute_update("INSERT INTO ledger (amount) VALUES (?)", &[SqlValue::Int(50)])?;
        db.execute_update("INSERT INTO ledger (amount) VALUES (NULL)", &[])?;
        Ok(TxOutcome::Commit(()))
    });
    assert!(matches!(failed, Err(SqliteDbError::SqliteError(_))));
    assert!(!db.in_transaction());
    assert_eq!(total(&db)?, 7);
    Ok(())
}

#[test]
fn savepoints_roll_back_partial_work() -> Result<(), Box<dyn std::error::Error>> {
    let mut db = ledger()?;
    db.begin_transaction()?;
    db.execute_update("INSERT INTO ledger (amount) VALUES (?)", &[SqlValue::Int(1)])?;

    let inner = db.in_savepoint(|db| {
        db.execute_update("INSERT INTO ledger (amount) VALUES (?)", &[SqlValue::Int(2)])?;
        Ok(TxOutcome::Rollback(total(db)?))
    })?;
    assert_eq!(inner, 3);
    assert_eq!(total(&db)?, 1);

    db.in_savepoint(|db| {
        db.execute_update("INSERT INTO ledger (amount) VALUES (?)", &[SqlValue::Int(4)])?;
        Ok(TxOutcome::Commit(()))
    })?;
    assert!(db.in_transaction());
    db.commit()?;
    assert_eq!(total(&db)?, 5);
    Ok(())
}

#[test]
fn savepoint_errors_undo_the_savepoint_only() -> Result<(), Box<dyn std::error::Error>> {
    let mut db = ledger()?;
    db.execute_update("INSERT INTO ledger (amount) VALUES (?)", &[SqlValue::Int(1)])?;

    let res: Result<(), _> = db.in_savepoint(|db| {
        db.execute_update("INSERT INTO ledger (amount) VALUES (?)", &[SqlValue::Int(2)])?;
        Err(SqliteDbError::Aborted)
    });
    assert!(matches!(res, Err(SqliteDbError::Aborted)));
    assert!(!db.in_transaction());
    assert_eq!(total(&db)?, 1);
    Ok(())
}

#[test]
fn savepoint_names_are_quoted() -> Result<(), Box<dyn std::error::Error>> {
    let db = ledger()?;
    let name = "it's mine";
    db.start_savepoint(name)?;
    assert!(db.in_transaction());
    db.execute_update("INSERT INTO ledger (amount) VALUES (?)", &[SqlValue::Int(9)])?;
    db.rollback_to_savepoint(name)?;
    db.release_savepoint(name)?;
    assert!(!db.in_transaction());
    assert_eq!(total(&db)?, 0);

    assert!(db.release_savepoint("never started").is_err());
    Ok(())
}

#[test]
fn closed_database_cannot_start_transactions() -> Result<(), Box<dyn std::error::Error>> {
    let mut db = ledger()?;
    db.close()?;
    assert!(matches!(
        db.begin_transaction(),
        Err(SqliteDbError::DatabaseClosed)
    ));
    assert!(!db.in_transaction());
    Ok(())
}
