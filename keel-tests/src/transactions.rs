use crate::silent_logs;
use keel::{Driver, Engine, Entity, MappingError, SessionState};

#[derive(Entity, Debug, Default, Clone, PartialEq)]
pub struct Ledger {
    #[keel("pk autoincr")]
    pub id: i64,
    #[keel("unique not null")]
    pub code: String,
    pub amount: i64,
}

fn entry(code: &str, amount: i64) -> Ledger {
    Ledger {
        code: code.into(),
        amount,
        ..Default::default()
    }
}

fn is_session_error(error: &keel::Error) -> bool {
    matches!(MappingError::of(error), Some(MappingError::Session(..)))
}

pub async fn transactions<D: Driver>(engine: &Engine<D>) {
    // Setup
    engine.drop_table::<Ledger>().await.expect("Failed to drop Ledger");
    engine.create_table::<Ledger>().await.expect("Failed to create Ledger");

    // State checks
    let mut session = engine.new_session();
    assert_eq!(session.state(), SessionState::Idle);
    let error = session.commit().await.expect_err("Nothing to commit");
    assert!(is_session_error(&error));
    let error = session.rollback().await.expect_err("Nothing to roll back");
    assert!(is_session_error(&error));
    session.begin().await.expect("Failed to begin");
    assert_eq!(session.state(), SessionState::Active);
    let error = session.begin().await.expect_err("Nested transactions are refused");
    assert!(is_session_error(&error));
    assert_eq!(session.state(), SessionState::Active);

    // Rollback discards
    session
        .insert(&mut entry("A-1", 100))
        .await
        .expect("Failed to insert");
    session
        .insert(&mut entry("A-2", -40))
        .await
        .expect("Failed to insert");
    assert_eq!(
        session.count(&Ledger::default()).await.expect("Failed to count"),
        2
    );
    session.rollback().await.expect("Failed to roll back");
    assert_eq!(session.state(), SessionState::Idle);
    assert_eq!(
        session.count(&Ledger::default()).await.expect("Failed to count"),
        0
    );

    // Commit keeps
    session.begin().await.expect("Failed to begin");
    let mut kept = entry("B-1", 25);
    session.insert(&mut kept).await.expect("Failed to insert");
    assert!(kept.id > 0);
    session.commit().await.expect("Failed to commit");
    assert_eq!(session.state(), SessionState::Idle);
    assert_eq!(
        engine.count(&Ledger::default()).await.expect("Failed to count"),
        1
    );

    // Closing an active session rolls back
    session.begin().await.expect("Failed to begin");
    session
        .insert(&mut entry("C-1", 5))
        .await
        .expect("Failed to insert");
    session.close().await.expect("Failed to close");
    assert_eq!(session.state(), SessionState::Closed);
    let error = session
        .insert(&mut entry("C-2", 5))
        .await
        .expect_err("A closed session must refuse operations");
    assert!(is_session_error(&error));
    let error = session.begin().await.expect_err("A closed session cannot begin");
    assert!(is_session_error(&error));
    session.close().await.expect("Closing twice is fine");
    assert_eq!(
        engine.count(&Ledger::default()).await.expect("Failed to count"),
        1
    );

    // insert_many stops at the first failure, earlier rows stay
    let mut batch = vec![
        entry("D-1", 1),
        entry("D-2", 2),
        entry("B-1", 3),
        entry("D-3", 4),
    ];
    let result = silent_logs! { engine.insert_many(&mut batch).await };
    assert!(result.is_err());
    assert!(batch[0].id > 0 && batch[1].id > 0);
    assert_eq!(batch[2].id, 0);
    assert_eq!(batch[3].id, 0);
    assert_eq!(
        engine.count(&Ledger::default()).await.expect("Failed to count"),
        3
    );

    // Inside a transaction the whole batch can be discarded
    let mut session = engine.new_session();
    session.begin().await.expect("Failed to begin");
    let mut batch = vec![entry("E-1", 1), entry("E-1", 2)];
    let result = silent_logs! { session.insert_many(&mut batch).await };
    assert!(result.is_err());
    assert_eq!(session.state(), SessionState::Active);
    session.rollback().await.expect("Failed to roll back");
    session.close().await.expect("Failed to close");
    assert_eq!(
        engine.count(&Ledger::default()).await.expect("Failed to count"),
        3
    );
    let mut codes: Vec<Ledger> = Vec::new();
    engine
        .asc(["code"])
        .find(&mut codes)
        .await
        .expect("Failed to find");
    let codes: Vec<_> = codes.iter().map(|v| v.code.as_str()).collect();
    assert_eq!(codes, ["B-1", "D-1", "D-2"]);

    engine.drop_table::<Ledger>().await.expect("Failed to drop Ledger");
}
