use crate::silent_logs;
use keel::{Driver, Engine, Entity, MappingError};

#[derive(Entity, Debug, Default, Clone, PartialEq)]
#[keel(table = "accounts")]
pub struct Account {
    #[keel("pk autoincr")]
    pub id: i64,
    #[keel("varchar(40) unique not null")]
    pub username: String,
    pub active: bool,
    pub karma: i32,
}

/// Shares the username column with `Account`.
#[derive(Entity, Debug, Default, Clone, PartialEq)]
pub struct Handle {
    #[keel("varchar(40)")]
    pub username: String,
}

fn account(username: &str, active: bool, karma: i32) -> Account {
    Account {
        username: username.into(),
        active,
        karma,
        ..Default::default()
    }
}

pub async fn users<D: Driver>(engine: &Engine<D>) {
    // Setup
    engine.drop_table::<Account>().await.expect("Failed to drop Account");
    engine.create_table::<Account>().await.expect("Failed to create Account");

    // Unique column
    let mut alice = account("alice", true, 7);
    let result = engine.insert(&mut alice).await.expect("Failed to insert alice");
    assert_eq!(result.rows_affected, 1);
    let mut duplicate = account("alice", false, 1);
    let result = silent_logs! { engine.insert(&mut duplicate).await };
    let error = result.expect_err("A duplicate username must be rejected");
    assert!(
        MappingError::of(&error).is_none(),
        "The driver error must be passed through: {error:#}"
    );
    assert_eq!(duplicate.id, 0);
    assert_eq!(engine.count(&Account::default()).await.expect("Failed to count"), 1);

    // Count with a condition struct
    let mut others = vec![
        account("bob", true, 7),
        account("carol", false, 7),
        account("dave", false, 3),
        account("erin", true, 3),
    ];
    let inserted = engine.insert_many(&mut others).await.expect("Failed to insert");
    assert_eq!(inserted, 4);
    assert!(others.iter().all(|v| v.id > 0));
    let count = engine
        .count(&Account {
            karma: 7,
            ..Default::default()
        })
        .await
        .expect("Failed to count");
    assert_eq!(count, 3);
    let count = engine
        .count(&Account {
            karma: 100,
            ..Default::default()
        })
        .await
        .expect("Failed to count");
    assert_eq!(count, 0);

    // Booleans only filter when true, unless requested
    let count = engine
        .count(&Account::default())
        .await
        .expect("Failed to count");
    assert_eq!(count, 5);
    let count = engine
        .use_bool()
        .count(&Account::default())
        .await
        .expect("Failed to count");
    assert_eq!(count, 2);
    let count = engine
        .count(&account("", true, 0))
        .await
        .expect("Failed to count");
    assert_eq!(count, 3);

    // Raw conditions combine with the struct
    let count = engine
        .filter("karma < ?", (5,))
        .count(&account("", true, 0))
        .await
        .expect("Failed to count");
    assert_eq!(count, 1);

    // Delete without any condition is refused before reaching the database
    let error = engine
        .delete(&Account::default())
        .await
        .expect_err("An unconditional delete must fail");
    assert!(matches!(
        MappingError::of(&error),
        Some(MappingError::Validation(..))
    ));
    assert_eq!(engine.count(&Account::default()).await.expect("Failed to count"), 5);

    // Delete by condition
    let result = engine
        .filter("karma = ?", (3,))
        .delete(&Account::default())
        .await
        .expect("Failed to delete");
    assert_eq!(result.rows_affected, 2);
    let result = engine
        .delete(&account("bob", false, 0))
        .await
        .expect("Failed to delete");
    assert_eq!(result.rows_affected, 1);
    assert_eq!(engine.count(&Account::default()).await.expect("Failed to count"), 2);

    // Update without condition nor key is refused
    let error = engine
        .update(&mut account("zed", false, 0))
        .await
        .expect_err("An update without condition must fail");
    assert!(matches!(
        MappingError::of(&error),
        Some(MappingError::Validation(..))
    ));

    // Unless use_bool or cols says otherwise
    let result = engine
        .use_bool()
        .update(&mut account("", false, 0))
        .await
        .expect("Failed to update");
    assert_eq!(result.rows_affected, 2);
    let count = engine
        .count(&account("", true, 0))
        .await
        .expect("Failed to count");
    assert_eq!(count, 0);
    let result = engine
        .cols(["karma"])
        .update(&mut account("", false, 1))
        .await
        .expect("Failed to update");
    assert_eq!(result.rows_affected, 2);
    let count = engine
        .count(&account("", false, 1))
        .await
        .expect("Failed to count");
    assert_eq!(count, 2);

    // update_by takes the condition from a second struct
    let result = engine
        .update_by(
            &mut account("", false, 42),
            &Account {
                username: "carol".into(),
                ..Default::default()
            },
        )
        .await
        .expect("Failed to update");
    assert_eq!(result.rows_affected, 1);
    let mut carol = Account {
        username: "carol".into(),
        ..Default::default()
    };
    assert!(engine.get(&mut carol).await.expect("Failed to get"));
    assert_eq!(carol.karma, 42);
    assert!(!carol.active);

    // The condition struct may be of another entity type
    let result = engine
        .update_by(
            &mut account("", false, 9),
            &Handle {
                username: "alice".into(),
            },
        )
        .await
        .expect("Failed to update");
    assert_eq!(result.rows_affected, 1);
    let mut alice = Account {
        username: "alice".into(),
        ..Default::default()
    };
    assert!(engine.get(&mut alice).await.expect("Failed to get"));
    assert_eq!(alice.karma, 9);
    assert_eq!(carol.karma, 42);

    engine.drop_table::<Account>().await.expect("Failed to drop Account");
}
