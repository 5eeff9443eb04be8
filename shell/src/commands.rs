use std::io::{self, Write};
use std::path::Path;

use serde_json::{Map, Value as JsonValue};
use sqlite_middleware::prelude::*;

use crate::args::Command;

pub(crate) async fn run(
    command: Command,
    configure: impl Fn(&Path) -> DatabaseOptions,
) -> Result<(), SqliteDbError> {
    match command {
        Command::Exec { db, sql } => {
            let db = Database::open_with(configure(&db))?;
            db.execute_statements(&sql)?;
            tracing::info!(changes = db.changes()?, "statements executed");
            Ok(())
        }
        Command::Query { db, sql } => {
            let db = Database::open_with(configure(&db))?;
            let rows = db.query_rows(&sql, &[])?;
            print_rows(&rows)
        }
        Command::Schema { db } => {
            let db = Database::open_with(configure(&db))?;
            print_rows(&db.schema()?)
        }
        Command::KvGet {
            db,
            key,
            collection,
        } => {
            let store = KeyValueStore::open(configure(&db)).await?;
            match store.object_in::<JsonValue>(&collection, &key).await? {
                Some(value) => print_line(&value.to_string()),
                None => {
                    tracing::info!(%collection, %key, "no value stored");
                    Ok(())
                }
            }
        }
        Command::KvSet {
            db,
            key,
            json,
            collection,
            text,
        } => {
            let value: JsonValue = serde_json::from_str(&json)?;
            let mut store = KeyValueStore::open(configure(&db)).await?;
            if text {
                store.set_format(ValueFormat::JsonText);
            }
            store
                .set_object_in(&collection, &key, &value, None::<&()>)
                .await
        }
    }
}

fn print_rows(rows: &[Row]) -> Result<(), SqliteDbError> {
    for row in rows {
        let object: Map<String, JsonValue> = row
            .column_names
            .iter()
            .zip(&row.values)
            .map(|(name, value)| (name.clone(), to_json(value)))
            .collect();
        print_line(&JsonValue::Object(object).to_string())?;
    }
    Ok(())
}

fn print_line(line: &str) -> Result<(), SqliteDbError> {
    writeln!(io::stdout().lock(), "{line}")
        .map_err(|err| SqliteDbError::ExecutionError(format!("failed to write output: {err}")))
}

fn to_json(value: &SqlValue) -> JsonValue {
    match value {
        SqlValue::Int(i) => JsonValue::from(*i),
        SqlValue::Float(f) => JsonValue::from(*f),
        SqlValue::Text(s) => JsonValue::from(s.as_str()),
        SqlValue::Bool(b) => JsonValue::from(*b),
        SqlValue::Timestamp(ts) => JsonValue::from(ts.to_string()),
        SqlValue::Null => JsonValue::Null,
        SqlValue::Json(json) => json.clone(),
        SqlValue::Blob(bytes) => JsonValue::from(
            bytes.iter().map(|b| format!("{b:02x}")).collect::<String>(),
        ),
    }
}
