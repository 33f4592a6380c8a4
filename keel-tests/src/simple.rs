use keel::{Driver, Engine, Entity, SameMapper};
use std::sync::Arc;

#[derive(Entity, Debug, Default, Clone, PartialEq)]
pub struct Person {
    #[keel("pk autoincr")]
    pub id: i64,
    pub name: String,
    pub height: f64,
}

pub async fn simple<D: Driver>(engine: &Engine<D>) {
    // Cleanup
    let result = engine.drop_table::<Person>().await;
    assert!(result.is_ok(), "Failed to drop Person: {:?}", result.unwrap_err());

    // Setup
    let result = engine.create_table::<Person>().await;
    assert!(result.is_ok(), "Failed to create Person: {:?}", result.unwrap_err());

    // Insert
    let mut person = Person {
        name: "a".into(),
        height: 1.5,
        ..Default::default()
    };
    let result = engine.insert(&mut person).await.expect("Failed to insert");
    assert_eq!(result.rows_affected, 1);
    assert!(person.id > 0, "The generated key must be written back");

    // Get
    let mut loaded = Person {
        id: person.id,
        ..Default::default()
    };
    let found = engine.get(&mut loaded).await.expect("Failed to get");
    assert!(found);
    assert_eq!(loaded, person);

    // Update, the zero height stays out of the SET clause
    let result = engine
        .id([person.id])
        .update(&mut Person {
            name: "b".into(),
            ..Default::default()
        })
        .await
        .expect("Failed to update");
    assert_eq!(result.rows_affected, 1);
    assert!(!result.conflict);
    let mut loaded = Person {
        id: person.id,
        ..Default::default()
    };
    assert!(engine.get(&mut loaded).await.expect("Failed to get"));
    assert_eq!(loaded.name, "b");
    assert_eq!(loaded.height, 1.5);

    // Update by primary key of the value itself
    loaded.height = 1.75;
    let result = engine.update(&mut loaded).await.expect("Failed to update");
    assert_eq!(result.rows_affected, 1);
    let mut reloaded = Person {
        id: person.id,
        ..Default::default()
    };
    assert!(engine.get(&mut reloaded).await.expect("Failed to get"));
    assert_eq!(reloaded, loaded);

    // Missing row
    let mut missing = Person {
        id: person.id + 1000,
        ..Default::default()
    };
    let found = engine.get(&mut missing).await.expect("Failed to get");
    assert!(!found);
    assert_eq!(missing.name, "");

    // Get by a non key field
    let mut by_name = Person {
        name: "b".into(),
        ..Default::default()
    };
    assert!(engine.get(&mut by_name).await.expect("Failed to get"));
    assert_eq!(by_name.id, person.id);

    // Another row gets another key
    let mut second = Person {
        name: "c".into(),
        height: 2.0,
        ..Default::default()
    };
    engine.insert(&mut second).await.expect("Failed to insert");
    assert!(second.id > person.id);
    assert_eq!(engine.count(&Person::default()).await.expect("Failed to count"), 2);

    // Delete by key
    let result = engine
        .delete(&Person {
            id: person.id,
            ..Default::default()
        })
        .await
        .expect("Failed to delete");
    assert_eq!(result.rows_affected, 1);
    assert_eq!(engine.count(&Person::default()).await.expect("Failed to count"), 1);

    // The name mapper decides the table name
    let same = engine.clone().with_mapper(Arc::new(SameMapper));
    let table = same.describe::<Person>().expect("Failed to describe Person");
    assert_eq!(table.name, "Person");
    assert_eq!(engine.describe::<Person>().expect("Failed to describe Person").name, "person");

    engine.drop_table::<Person>().await.expect("Failed to drop Person");
}
