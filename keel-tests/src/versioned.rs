use keel::{Driver, Engine, Entity};
use time::PrimitiveDateTime;

#[derive(Entity, Debug, Default, Clone, PartialEq)]
pub struct Audit {
    #[keel("created")]
    pub created_at: Option<PrimitiveDateTime>,
    #[keel("updated")]
    pub updated_at: Option<PrimitiveDateTime>,
}

#[derive(Entity, Debug, Default, Clone, PartialEq)]
pub struct Document {
    #[keel("pk autoincr")]
    pub id: i64,
    pub title: String,
    #[keel("version")]
    pub revision: i32,
    #[keel("extends")]
    pub audit: Audit,
}

pub async fn versioned<D: Driver>(engine: &Engine<D>) {
    // Setup
    engine.drop_table::<Document>().await.expect("Failed to drop Document");
    engine.create_table::<Document>().await.expect("Failed to create Document");

    // Insert sets the version and the timestamps
    let mut document = Document {
        title: "draft".into(),
        ..Default::default()
    };
    engine.insert(&mut document).await.expect("Failed to insert");
    assert_eq!(document.revision, 1);
    let created_at = document.audit.created_at.expect("created_at must be set");
    assert_eq!(document.audit.updated_at, Some(created_at));
    let mut stored = Document {
        id: document.id,
        ..Default::default()
    };
    assert!(engine.get(&mut stored).await.expect("Failed to get"));
    assert_eq!(stored, document);

    // Two copies of the same row
    let mut first = stored.clone();
    let mut second = stored.clone();

    first.title = "first".into();
    let result = engine.update(&mut first).await.expect("Failed to update");
    assert_eq!(result.rows_affected, 1);
    assert!(!result.conflict);
    assert_eq!(first.revision, 2);
    assert!(first.audit.updated_at.is_some_and(|v| v >= created_at));
    assert_eq!(first.audit.created_at, Some(created_at));

    // The stale copy loses
    second.title = "second".into();
    let result = engine.update(&mut second).await.expect("Failed to update");
    assert_eq!(result.rows_affected, 0);
    assert!(result.conflict);
    assert_eq!(second.revision, 1);

    let mut stored = Document {
        id: document.id,
        ..Default::default()
    };
    assert!(engine.get(&mut stored).await.expect("Failed to get"));
    assert_eq!(stored.title, "first");
    assert_eq!(stored.revision, 2);
    assert_eq!(stored.audit.created_at, Some(created_at));

    // Reload and retry
    let mut second = stored.clone();
    second.title = "second".into();
    let result = engine.update(&mut second).await.expect("Failed to update");
    assert_eq!(result.rows_affected, 1);
    assert_eq!(second.revision, 3);

    // Without a version in memory the row is updated unconditionally
    let result = engine
        .id([document.id])
        .update(&mut Document {
            title: "forced".into(),
            ..Default::default()
        })
        .await
        .expect("Failed to update");
    assert_eq!(result.rows_affected, 1);
    assert!(!result.conflict);
    let mut stored = Document {
        id: document.id,
        ..Default::default()
    };
    engine.get(&mut stored).await.expect("Failed to get");
    assert_eq!(stored.title, "forced");
    assert_eq!(stored.revision, 4);

    // An unchecked version stays unset, the same value can be used again
    let mut unversioned = Document {
        id: document.id,
        title: "again".into(),
        ..Default::default()
    };
    for expected in [5, 6] {
        let result = engine
            .update(&mut unversioned)
            .await
            .expect("Failed to update");
        assert_eq!(result.rows_affected, 1);
        assert!(!result.conflict);
        assert_eq!(unversioned.revision, 0);
        let mut stored = Document {
            id: document.id,
            ..Default::default()
        };
        engine.get(&mut stored).await.expect("Failed to get");
        assert_eq!(stored.revision, expected);
    }

    // Timestamps left alone on request
    let mut manual = Document {
        title: "manual".into(),
        ..Default::default()
    };
    engine
        .no_auto_time()
        .insert(&mut manual)
        .await
        .expect("Failed to insert");
    assert_eq!(manual.revision, 1);
    let mut stored = Document {
        id: manual.id,
        ..Default::default()
    };
    engine.get(&mut stored).await.expect("Failed to get");
    assert_eq!(stored.audit, Audit::default());

    engine.drop_table::<Document>().await.expect("Failed to drop Document");
}
