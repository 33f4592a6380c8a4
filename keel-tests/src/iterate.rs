use keel::{Driver, Engine, Entity, Error};

#[derive(Entity, Debug, Default, Clone, PartialEq)]
pub struct Reading {
    #[keel("pk autoincr")]
    pub id: i64,
    pub sensor: String,
    pub celsius: f64,
}

pub async fn iterate<D: Driver>(engine: &Engine<D>) {
    // Setup
    engine.drop_table::<Reading>().await.expect("Failed to drop Reading");
    engine.create_table::<Reading>().await.expect("Failed to create Reading");
    let mut readings: Vec<_> = [12.5, 17.25, -3.0]
        .into_iter()
        .map(|celsius| Reading {
            sensor: "north".into(),
            celsius,
            ..Default::default()
        })
        .collect();
    engine
        .insert_many(&mut readings)
        .await
        .expect("Failed to insert");

    // Visit everything in order
    let mut visited = Vec::new();
    engine
        .asc(["id"])
        .iterate(&Reading::default(), |position, reading| {
            visited.push((position, reading));
            Ok(())
        })
        .await
        .expect("Failed to iterate");
    assert_eq!(visited.len(), 3);
    for (i, (position, reading)) in visited.iter().enumerate() {
        assert_eq!(*position, i);
        assert_eq!(*reading, readings[i]);
    }

    // The visitor stops the iteration
    let mut positions = Vec::new();
    let error = engine
        .asc(["id"])
        .iterate(&Reading::default(), |position, _: Reading| {
            positions.push(position);
            if position == 1 {
                return Err(Error::msg("enough"));
            }
            Ok(())
        })
        .await
        .expect_err("The visitor error must be returned");
    assert_eq!(positions, [0, 1]);
    assert_eq!(error.to_string(), "enough");

    // Filtered
    let mut count = 0;
    engine
        .filter("celsius > ?", (0,))
        .iterate(
            &Reading {
                sensor: "north".into(),
                ..Default::default()
            },
            |_, _| {
                count += 1;
                Ok(())
            },
        )
        .await
        .expect("Failed to iterate");
    assert_eq!(count, 2);

    engine.drop_table::<Reading>().await.expect("Failed to drop Reading");
}
