use keel::{Driver, Engine, Entity, LruRowCache, RowCache};
use std::sync::Arc;

#[derive(Entity, Debug, Default, Clone, PartialEq)]
pub struct Note {
    #[keel("pk autoincr")]
    pub id: i64,
    pub body: String,
}

pub async fn cache<D: Driver>(engine: &Engine<D>) {
    // Setup
    let rows = Arc::new(LruRowCache::new(16));
    let cached = engine
        .clone()
        .with_cache(rows.clone() as Arc<dyn RowCache>);
    engine.drop_table::<Note>().await.expect("Failed to drop Note");
    engine.create_table::<Note>().await.expect("Failed to create Note");
    let mut note = Note {
        body: "first".into(),
        ..Default::default()
    };
    cached.insert(&mut note).await.expect("Failed to insert");
    assert!(rows.is_empty());

    // A lookup by key fills the cache
    let mut loaded = Note {
        id: note.id,
        ..Default::default()
    };
    assert!(cached.get(&mut loaded).await.expect("Failed to get"));
    assert_eq!(loaded, note);
    assert_eq!(rows.len(), 1);

    // Other lookups do not
    let mut by_body = Note {
        body: "first".into(),
        ..Default::default()
    };
    assert!(cached.get(&mut by_body).await.expect("Failed to get"));
    assert_eq!(rows.len(), 1);

    // Writes that bypass the cache leave it stale
    engine
        .update(&mut Note {
            id: note.id,
            body: "second".into(),
        })
        .await
        .expect("Failed to update");
    let mut loaded = Note {
        id: note.id,
        ..Default::default()
    };
    assert!(cached.get(&mut loaded).await.expect("Failed to get"));
    assert_eq!(loaded.body, "first");
    let mut fresh = Note {
        id: note.id,
        ..Default::default()
    };
    assert!(cached.no_cache().get(&mut fresh).await.expect("Failed to get"));
    assert_eq!(fresh.body, "second");

    // Writes through the cached engine invalidate
    cached
        .update(&mut Note {
            id: note.id,
            body: "third".into(),
        })
        .await
        .expect("Failed to update");
    assert!(rows.is_empty());
    let mut loaded = Note {
        id: note.id,
        ..Default::default()
    };
    assert!(cached.get(&mut loaded).await.expect("Failed to get"));
    assert_eq!(loaded.body, "third");
    assert_eq!(rows.len(), 1);

    // Raw statements clear everything
    cached
        .exec("UPDATE note SET body = ? WHERE id = ?", ("fourth", note.id))
        .await
        .expect("Failed to exec");
    assert!(rows.is_empty());

    // Reads inside a transaction are not stored, its writes invalidate on commit
    let mut session = cached.new_session();
    session.begin().await.expect("Failed to begin");
    let mut loaded = Note {
        id: note.id,
        ..Default::default()
    };
    assert!(session.get(&mut loaded).await.expect("Failed to get"));
    assert_eq!(loaded.body, "fourth");
    assert!(rows.is_empty());
    session
        .update(&mut Note {
            id: note.id,
            body: "fifth".into(),
        })
        .await
        .expect("Failed to update");
    let mut loaded = Note {
        id: note.id,
        ..Default::default()
    };
    assert!(session.get(&mut loaded).await.expect("Failed to get"));
    assert_eq!(loaded.body, "fifth");
    session.commit().await.expect("Failed to commit");
    let mut loaded = Note {
        id: note.id,
        ..Default::default()
    };
    assert!(session.get(&mut loaded).await.expect("Failed to get"));
    assert_eq!(loaded.body, "fifth");
    assert_eq!(rows.len(), 1);
    session.close().await.expect("Failed to close");

    // Deleting evicts the row
    cached
        .delete(&Note {
            id: note.id,
            ..Default::default()
        })
        .await
        .expect("Failed to delete");
    assert!(rows.is_empty());
    let mut missing = Note {
        id: note.id,
        ..Default::default()
    };
    assert!(!cached.get(&mut missing).await.expect("Failed to get"));

    engine.drop_table::<Note>().await.expect("Failed to drop Note");
}
