use std::ops::ControlFlow;

use chrono::NaiveDate;
use sqlite_middleware::prelude::*;

fn users_db() -> Result<Database, SqliteDbError> {
    let db = Database::open_in_memory()?;
    db.execute_statements(
        "CREATE TABLE users (id INTEGER PRIMARY KEY, name TEXT NOT NULL, score REAL, avatar BLOB);
         INSERT INTO users (name, score) VALUES ('alice', 9.5);
         INSERT INTO users (name, score) VALUES ('bob', NULL);",
    )?;
    Ok(db)
}

#[test]
fn updates_and_scalar_helpers() -> Result<(), Box<dyn std::error::Error>> {
    let db = users_db()?;

    let changed = db.execute_update(
        "INSERT INTO users (name, score, avatar) VALUES (?, ?, ?)",
        &[
            SqlValue::from("carol"),
            SqlValue::Float(7.25),
            SqlValue::Blob(vec![1, 2, 3]),
        ],
    )?;
    assert_eq!(changed, 1);
    assert_eq!(db.last_insert_rowid()?, 3);
    assert_eq!(db.changes()?, 1);

    assert_eq!(db.long_for_query("SELECT count(*) FROM users", &[])?, Some(3));
    assert_eq!(db.int_for_query("SELECT count(*) FROM users", &[])?, Some(3));
    assert_eq!(
        db.string_for_query("SELECT name FROM users WHERE id = ?", &[SqlValue::Int(2)])?,
        Some("bob".to_owned())
    );
    assert_eq!(
        db.double_for_query("SELECT score FROM users WHERE id = 3", &[])?,
        Some(7.25)
    );
    assert_eq!(
        db.data_for_query("SELECT avatar FROM users WHERE id = 3", &[])?,
        Some(vec![1, 2, 3])
    );
    assert_eq!(db.bool_for_query("SELECT 1", &[])?, Some(true));

    // NULL and missing rows both read as None
    assert_eq!(db.double_for_query("SELECT score FROM users WHERE id = 2", &[])?, None);
    assert_eq!(db.value_for_query("SELECT name FROM users WHERE id = 99", &[])?, None);
    Ok(())
}

#[test]
fn named_parameters_bind_by_name() -> Result<(), Box<dyn std::error::Error>> {
    let db = users_db()?;
    let params = NamedParams::new().with("name", "dave").with("@score", 3.5);
    db.execute_update_named("INSERT INTO users (name, score) VALUES (:name, @score)", &params)?;

    let score = db.query_named(
        "SELECT score FROM users WHERE name = $who",
        &NamedParams::new().with("$who", "dave"),
        |rs| {
            assert!(rs.next()?);
            rs.double("score")
        },
    )?;
    assert!((score - 3.5).abs() < f64::EPSILON);

    let unknown = db.execute_update_named(
        "INSERT INTO users (name) VALUES (:name)",
        &NamedParams::new().with("nope", "x"),
    );
    assert!(unknown.is_err());
    Ok(())
}

#[test]
fn named_parameter_counts_must_match() -> Result<(), Box<dyn std::error::Error>> {
    let db = users_db()?;
    db.execute_statements("CREATE TABLE pairs (a INTEGER, b INTEGER)")?;

    let missing = db.execute_update_named(
        "INSERT INTO pairs (a, b) VALUES (:a, :b)",
        &NamedParams::new().with("a", 1),
    );
    assert!(matches!(missing, Err(SqliteDbError::ParameterError(_))));
    assert!(db.had_error());

    let extra = db.query_named(
        "SELECT a FROM pairs WHERE a = :a",
        &NamedParams::new().with("a", 1).with("b", 2),
        |rs| rs.next(),
    );
    assert!(matches!(extra, Err(SqliteDbError::ParameterError(_))));

    assert_eq!(
        db.long_for_query("SELECT count(*) FROM pairs", &[])?,
        Some(0)
    );
    Ok(())
}

#[test]
fn errors_are_recorded_and_cleared() -> Result<(), Box<dyn std::error::Error>> {
    let db = users_db()?;
    assert!(!db.had_error());
    assert_eq!(db.last_error_message(), "not an error");

    let res = db.execute_update("INSERT INTO users (name) VALUES (?)", &[]);
    assert!(matches!(res, Err(SqliteDbError::ParameterError(_))));
    assert!(db.had_error());
    assert_eq!(db.last_error_code(), 1);

    let res = db.execute_update("SELECT * FROM no_such_table", &[]);
    assert!(res.is_err());
    assert!(db.last_error_message().contains("no_such_table"));

    // statements that produce rows are not updates
    assert!(db.execute_update("SELECT 1", &[]).is_err());

    db.execute_update("DELETE FROM users WHERE id = ?", &[SqlValue::Int(1)])?;
    assert!(!db.had_error());
    assert_eq!(db.last_error_code(), 0);
    Ok(())
}

#[test]
fn result_set_is_a_forward_only_cursor() -> Result<(), Box<dyn std::error::Error>> {
    let db = users_db()?;
    db.query("SELECT id, name AS Name, score FROM users ORDER BY id", &[], |rs| {
        assert_eq!(rs.column_count(), 3);
        assert_eq!(rs.column_index("name"), Some(1));
        assert!(matches!(rs.long(0), Err(SqliteDbError::NoCurrentRow)));

        assert!(rs.next()?);
        assert_eq!(rs.long("id")?, 1);
        assert_eq!(rs.string("NAME")?, Some("alice".to_owned()));
        assert_eq!(rs.column_type("score")?, ValueType::Float);
        assert!(matches!(
            rs.value("missing"),
            Err(SqliteDbError::ColumnNotFound(_))
        ));
        assert!(matches!(
            rs.value(7_usize),
            Err(SqliteDbError::ColumnIndexOutOfRange { index: 7, count: 3 })
        ));

        let row = rs.row()?;
        assert_eq!(row.get("name"), Some(&SqlValue::Text("alice".into())));
        let dict = rs.result_dictionary()?;
        assert_eq!(dict.get("id"), Some(&SqlValue::Int(1)));

        assert!(rs.next()?);
        assert!(rs.is_null("score")?);
        assert!((rs.double("score")? - 0.0).abs() < f64::EPSILON);

        assert!(!rs.next()?);
        assert!(!rs.next()?);
        assert!(rs.is_closed());
        assert!(matches!(rs.long(0), Err(SqliteDbError::NoCurrentRow)));
        Ok(())
    })?;
    assert!(!db.has_open_result_sets());
    Ok(())
}

#[test]
fn closing_result_sets_stops_iteration() -> Result<(), Box<dyn std::error::Error>> {
    let db = users_db()?;
    db.query("SELECT id FROM users", &[], |rs| {
        assert!(rs.next()?);
        assert!(db.has_open_result_sets());
        db.close_open_result_sets();
        assert!(!db.has_open_result_sets());
        assert!(!rs.next()?);
        Ok(())
    })?;

    let rows = db.query_rows("SELECT name FROM users ORDER BY id", &[])?;
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[1].get_by_index(0), Some(&SqlValue::Text("bob".into())));
    Ok(())
}

#[test]
fn batches_report_rows_and_can_abort() -> Result<(), Box<dyn std::error::Error>> {
    let db = users_db()?;
    let mut seen = Vec::new();
    db.execute_statements_with(
        "UPDATE users SET score = 1 WHERE id = 2; SELECT name, score FROM users ORDER BY id;",
        |row| {
            seen.push((row["name"].clone(), row["score"].clone()));
            ControlFlow::Continue(())
        },
    )?;
    assert_eq!(
        seen,
        vec![
            (Some("alice".to_owned()), Some("9.5".to_owned())),
            (Some("bob".to_owned()), Some("1".to_owned())),
        ]
    );

    let mut calls = 0;
    let res = db.execute_statements_with("SELECT 1; SELECT 2; SELECT 3;", |_| {
        calls += 1;
        ControlFlow::Break(())
    });
    assert!(matches!(res, Err(SqliteDbError::Aborted)));
    assert_eq!(calls, 1);
    Ok(())
}

#[test]
fn close_and_reopen_file_database() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("people.db");
    let mut db = Database::open_path(path.as_path())?;
    assert!(db.good_connection());
    assert_eq!(db.wal_path(), Some(dir.path().join("people.db-wal")));

    db.execute_statements("CREATE TABLE t (x INTEGER); INSERT INTO t VALUES (42);")?;
    db.close()?;
    db.close()?;
    assert!(!db.is_open());
    assert!(!db.good_connection());
    assert!(matches!(
        db.execute_statements("SELECT 1"),
        Err(SqliteDbError::DatabaseClosed)
    ));

    db.open()?;
    assert_eq!(db.long_for_query("SELECT x FROM t", &[])?, Some(42));
    Ok(())
}

#[test]
fn journal_mode_is_applied_on_open() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempfile::tempdir()?;
    let options = DatabaseOptions::builder(dir.path().join("wal.db"))
        .journal_mode(JournalMode::Wal)
        .finish()?;
    let db = Database::open_with(options)?;
    assert_eq!(
        db.string_for_query("PRAGMA journal_mode", &[])?,
        Some("wal".to_owned())
    );
    Ok(())
}

#[test]
fn read_only_databases_reject_writes() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("ro.db");
    let db = Database::open_path(path.as_path())?;
    db.execute_statements("CREATE TABLE t (x INTEGER)")?;
    drop(db);

    let read_only = DatabaseOptions::builder(path.as_path()).read_only().finish()?;
    let db = Database::open_with(read_only)?;
    assert_eq!(db.long_for_query("SELECT count(*) FROM t", &[])?, Some(0));
    assert!(db.execute_statements("INSERT INTO t VALUES (1)").is_err());
    Ok(())
}

#[test]
fn schema_and_header_pragmas() -> Result<(), Box<dyn std::error::Error>> {
    let db = users_db()?;
    assert!(db.table_exists("USERS")?);
    assert!(!db.table_exists("ghosts")?);
    assert!(db.column_exists("Score", "users")?);
    assert!(!db.column_exists("age", "users")?);

    let columns = db.table_schema("users")?;
    assert_eq!(columns.len(), 4);
    assert_eq!(columns[0].get("name"), Some(&SqlValue::Text("id".into())));

    db.execute_statements("CREATE INDEX users_name ON users (name)")?;
    let schema = db.schema()?;
    let names: Vec<_> = schema
        .iter()
        .filter_map(|row| row.get("name").and_then(SqlValue::as_text).map(str::to_owned))
        .collect();
    assert!(names.contains(&"users".to_owned()));
    assert!(names.contains(&"users_name".to_owned()));

    assert!(db.validate_sql("SELECT name FROM users").is_ok());
    assert!(db.validate_sql("SELEKT 1").is_err());

    db.set_user_version(7)?;
    assert_eq!(db.user_version()?, 7);
    db.set_application_id_string("ABCD")?;
    assert_eq!(db.application_id()?, 0x4142_4344);
    assert_eq!(db.application_id_string()?, "ABCD");
    db.set_application_id(u32::MAX)?;
    assert_eq!(db.application_id()?, u32::MAX);
    assert!(db.set_application_id_string("TOOLONG").is_err());
    Ok(())
}

#[test]
fn custom_functions() -> Result<(), Box<dyn std::error::Error>> {
    let db = Database::open_in_memory()?;
    db.make_function("shout", 1, |args| match &args[0] {
        SqlValue::Text(s) => Ok(SqlValue::Text(s.to_uppercase())),
        _ => Err("shout expects text".to_owned()),
    })?;
    assert_eq!(
        db.string_for_query("SELECT shout('hey')", &[])?,
        Some("HEY".to_owned())
    );
    assert!(db.string_for_query("SELECT shout(1)", &[]).is_err());
    assert!(db.last_error_message().contains("shout expects text"));

    db.make_function("total", -1, |args| {
        Ok(SqlValue::Int(args.iter().filter_map(SqlValue::as_int).sum()))
    })?;
    assert_eq!(db.long_for_query("SELECT total(1, 2, 3)", &[])?, Some(6));
    Ok(())
}

#[test]
fn timestamps_follow_the_date_format() -> Result<(), Box<dyn std::error::Error>> {
    let when = NaiveDate::from_ymd_opt(2024, 5, 17)
        .and_then(|d| d.and_hms_opt(8, 30, 0))
        .ok_or("bad date")?;

    let mut db = Database::open_in_memory()?;
    db.execute_statements("CREATE TABLE events (at)")?;
    db.execute_update("INSERT INTO events VALUES (?)", &[SqlValue::Timestamp(when)])?;
    assert_eq!(
        db.string_for_query("SELECT typeof(at) FROM events", &[])?,
        Some("real".to_owned())
    );
    assert_eq!(db.date_for_query("SELECT at FROM events", &[])?, Some(when));
    assert!(!db.has_date_format());

    db.set_date_format(Some("%Y-%m-%d %H:%M".to_owned()));
    assert!(db.has_date_format());
    db.execute_statements("DELETE FROM events")?;
    db.execute_update("INSERT INTO events VALUES (?)", &[SqlValue::Timestamp(when)])?;
    assert_eq!(
        db.string_for_query("SELECT at FROM events", &[])?,
        Some("2024-05-17 08:30".to_owned())
    );
    assert_eq!(db.date_for_query("SELECT at FROM events", &[])?, Some(when));
    assert_eq!(db.date_from_string("2024-05-17 08:30"), Some(when));
    assert_eq!(db.string_from_date(&when).as_deref(), Some("2024-05-17 08:30"));
    Ok(())
}

#[test]
fn busy_timeout_is_adjustable() -> Result<(), Box<dyn std::error::Error>> {
    let mut db = Database::open_in_memory()?;
    assert_eq!(db.max_busy_retry_time(), std::time::Duration::from_secs(2));
    db.set_max_busy_retry_time(std::time::Duration::ZERO)?;
    assert_eq!(db.max_busy_retry_time(), std::time::Duration::ZERO);
    assert!(!Database::sqlite_lib_version().is_empty());
    Ok(())
}
