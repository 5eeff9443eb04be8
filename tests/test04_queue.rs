use sqlite_middleware::prelude::*;
use tempfile::TempDir;

fn counter(db: &Database) -> Result<i64, SqliteDbError> {
    Ok(db
        .long_for_query("SELECT n FROM counter WHERE id = 1", &[])?
        .unwrap_or_default())
}

async fn counter_queue() -> Result<DatabaseQueue, SqliteDbError> {
    let queue = DatabaseQueue::open(DatabaseOptions::new(DatabasePath::Memory))?;
    queue
        .in_database(|db| {
            db.execute_statements(
                "CREATE TABLE counter (id INTEGER PRIMARY KEY, n INTEGER NOT NULL);
                 INSERT INTO counter (id, n) VALUES (1, 0);",
            )
        })
        .await?;
    Ok(queue)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_callers_are_serialized() -> Result<(), Box<dyn std::error::Error>> {
    let queue = counter_queue().await?;

    let mut tasks = Vec::new();
    for _ in 0..8 {
        let queue = queue.clone();
        tasks.push(tokio::spawn(async move {
            for _ in 0..10 {
                queue
                    .in_database(|db| {
                        let n = counter(db)?;
                        db.execute_update(
                            "UPDATE counter SET n = ? WHERE id = 1",
                            &[SqlValue::Int(n + 1)],
                        )?;
                        Ok(())
                    })
                    .await?;
            }
            Ok::<(), SqliteDbError>(())
        }));
    }
    for task in tasks {
        task.await??;
    }

    let n = queue.in_database(|db| counter(db)).await?;
    assert_eq!(n, 80);
    Ok(())
}

#[tokio::test]
async fn nested_calls_are_rejected() -> Result<(), Box<dyn std::error::Error>> {
    let queue = counter_queue().await?;
    let inner = queue.clone();
    let nested = queue
        .in_database(move |_db| Ok(inner.in_database_blocking(|db| db.changes())))
        .await?;
    assert!(matches!(nested, Err(SqliteDbError::ReentrantQueue)));

    // The queue keeps working afterwards.
    let n = queue.in_database(|db| counter(db)).await?;
    assert_eq!(n, 0);
    Ok(())
}

#[tokio::test]
async fn transactions_commit_or_roll_back() -> Result<(), Box<dyn std::error::Error>> {
    let queue = counter_queue().await?;

    queue
        .in_transaction(|db| {
            db.execute_update("UPDATE counter SET n = 5", &[])?;
            Ok(TxOutcome::Commit(()))
        })
        .await?;

    let rolled_back = queue
        .in_immediate_transaction(|db| {
            db.execute_update("UPDATE counter SET n = 99", &[])?;
            Ok(TxOutcome::Rollback(counter(db)?))
        })
        .await?;
    assert_eq!(rolled_back, 99);

    let failed: Result<(), _> = queue
        .in_deferred_transaction(|db| {
            db.execute_update("UPDATE counter SET n = 42", &[])?;
            Err(SqliteDbError::Aborted)
        })
        .await;
    assert!(matches!(failed, Err(SqliteDbError::Aborted)));

    queue
        .in_savepoint(|db| {
            db.execute_update("UPDATE counter SET n = 7", &[])?;
            Ok(TxOutcome::Rollback(()))
        })
        .await?;

    let (n, in_tx) = queue
        .in_database(|db| Ok((counter(db)?, db.in_transaction())))
        .await?;
    assert_eq!(n, 5);
    assert!(!in_tx);
    Ok(())
}

#[tokio::test]
async fn panicking_closures_leave_the_queue_usable() -> Result<(), Box<dyn std::error::Error>> {
    let queue = counter_queue().await?;
    let res: Result<(), _> = queue
        .in_database(|db| {
            db.begin_transaction()?;
            db.execute_update("UPDATE counter SET n = 13", &[])?;
            panic!("boom");
        })
        .await;
    assert!(matches!(res, Err(SqliteDbError::ExecutionError(msg)) if msg.contains("boom")));

    let (n, in_tx) = queue
        .in_database(|db| Ok((counter(db)?, db.in_transaction())))
        .await?;
    assert_eq!(n, 0);
    assert!(!in_tx);
    Ok(())
}

#[tokio::test]
async fn close_then_reuse_reopens_the_file() -> Result<(), Box<dyn std::error::Error>> {
    let dir = TempDir::new()?;
    let path = dir.path().join("queue.db");
    let queue = DatabaseQueue::open_path(path.as_path())?;
    assert!(!queue.interrupt());

    queue
        .in_database(|db| {
            db.execute_statements("CREATE TABLE notes (body TEXT); INSERT INTO notes VALUES ('kept');")
        })
        .await?;
    assert!(queue.interrupt());

    queue.close().await?;
    assert!(!queue.interrupt());

    let body = queue
        .in_database(|db| db.string_for_query("SELECT body FROM notes", &[]))
        .await?;
    assert_eq!(body.as_deref(), Some("kept"));
    assert_eq!(queue.path(), &DatabasePath::from(path.as_path()));
    Ok(())
}

#[test]
fn blocking_calls_work_without_a_runtime() -> Result<(), Box<dyn std::error::Error>> {
    let queue = DatabaseQueue::open_path(DatabasePath::Memory)?;
    queue.in_database_blocking(|db| db.execute_statements("CREATE TABLE t (v INTEGER)"))?;
    let inserted = queue.in_transaction_blocking(|db| {
        db.execute_update("INSERT INTO t (v) VALUES (?)", &[SqlValue::Int(1)])?;
        db.execute_update("INSERT INTO t (v) VALUES (?)", &[SqlValue::Int(2)])?;
        Ok(TxOutcome::Commit(db.changes()?))
    })?;
    assert_eq!(inserted, 1);
    let count = queue.in_database_blocking(|db| db.long_for_query("SELECT count(*) FROM t", &[]))?;
    assert_eq!(count, Some(2));
    queue.close_blocking()?;
    Ok(())
}
