use serde::{Deserialize, Serialize};
use sqlite_middleware::prelude::*;
use tempfile::TempDir;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Profile {
    name: String,
    karma: i64,
    tags: Vec<String>,
}

#[derive(Debug, PartialEq, Serialize, Deserialize)]
struct Stamp {
    revision: u32,
}

fn profile(name: &str, karma: i64) -> Profile {
    Profile {
        name: name.to_owned(),
        karma,
        tags: vec!["rust".to_owned()],
    }
}

async fn memory_store() -> Result<KeyValueStore, SqliteDbError> {
    KeyValueStore::open(DatabaseOptions::new(DatabasePath::Memory)).await
}

#[tokio::test]
async fn objects_round_trip_through_the_default_collection() -> Result<(), Box<dyn std::error::Error>> {
    let store = memory_store().await?;
    assert_eq!(store.object_for_key::<Profile>("ada").await?, None);

    store.set_object("ada", &profile("Ada", 10)).await?;
    assert_eq!(
        store.object_for_key::<Profile>("ada").await?,
        Some(profile("Ada", 10))
    );

    store.set_object("ada", &profile("Ada", 11)).await?;
    assert_eq!(
        store.object_for_key::<Profile>("ada").await?,
        Some(profile("Ada", 11))
    );
    assert_eq!(store.count_in(DEFAULT_COLLECTION).await?, 1);

    assert!(store.remove("ada").await?);
    assert!(!store.remove("ada").await?);
    assert_eq!(store.object_for_key::<Profile>("ada").await?, None);
    Ok(())
}

#[tokio::test]
async fn collections_keep_keys_apart() -> Result<(), Box<dyn std::error::Error>> {
    let store = memory_store().await?;
    for (idx, key) in ["zeta", "alpha", "mu"].iter().enumerate() {
        let stamp = Stamp {
            revision: u32::try_from(idx)?,
        };
        store
            .set_object_in("users", key, &profile(key, 0), Some(&stamp))
            .await?;
    }
    store.set_object_in("settings", "theme", "dark", None::<&()>).await?;

    assert_eq!(store.keys_in("users").await?, vec!["zeta", "alpha", "mu"]);
    assert_eq!(store.count_in("users").await?, 3);
    assert_eq!(store.count_in("missing").await?, 0);
    assert_eq!(
        store.metadata_in::<Stamp>("users", "mu").await?,
        Some(Stamp { revision: 2 })
    );
    assert_eq!(store.metadata_in::<Stamp>("settings", "theme").await?, None);
    assert_eq!(
        store.object_in::<String>("settings", "theme").await?.as_deref(),
        Some("dark")
    );
    assert_eq!(store.object_in::<String>("users", "theme").await?, None);
    assert_eq!(store.collections().await?, vec!["settings", "users"]);

    assert_eq!(store.remove_all_in("users").await?, 3);
    assert_eq!(store.collections().await?, vec!["settings"]);
    Ok(())
}

#[tokio::test]
async fn text_format_is_stored_as_text() -> Result<(), Box<dyn std::error::Error>> {
    let mut store = memory_store().await?;
    assert_eq!(store.format(), ValueFormat::Json);
    store.set_object("blob", &[1, 2, 3]).await?;

    store.set_format(ValueFormat::JsonText);
    store.set_object("text", &[4, 5]).await?;

    let kinds = store
        .queue()
        .in_database(|db| {
            db.query(
                "SELECT key, typeof(data) AS kind FROM kv_store ORDER BY key",
                &[],
                |rs| {
                    let mut kinds = Vec::new();
                    while rs.next()? {
                        kinds.push((rs.string("key")?, rs.string("kind")?));
                    }
                    Ok(kinds)
                },
            )
        })
        .await?;
    assert_eq!(
        kinds,
        vec![
            (Some("blob".to_owned()), Some("blob".to_owned())),
            (Some("text".to_owned()), Some("text".to_owned())),
        ]
    );

    // Rows written in either format stay readable.
    assert_eq!(store.object_for_key::<Vec<i32>>("blob").await?, Some(vec![1, 2, 3]));
    assert_eq!(store.object_for_key::<Vec<i32>>("text").await?, Some(vec![4, 5]));
    Ok(())
}

#[tokio::test]
async fn stores_persist_in_files() -> Result<(), Box<dyn std::error::Error>> {
    let dir = TempDir::new()?;
    let path = dir.path().join("kv.db");
    {
        let store = KeyValueStore::open(DatabaseOptions::new(path.as_path())).await?;
        store.set_object("answer", &42).await?;
        store.queue().close().await?;
    }

    let queue = DatabaseQueue::open_path(path.as_path())?;
    let store = KeyValueStore::with_queue(queue).await?;
    assert_eq!(store.object_for_key::<i32>("answer").await?, Some(42));
    assert!(
        store
            .queue()
            .in_database(|db| db.table_exists("KV_STORE"))
            .await?
    );
    Ok(())
}
