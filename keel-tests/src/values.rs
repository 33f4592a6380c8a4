use keel::{Driver, Engine, Entity, Scalar};
use rust_decimal::Decimal;
use std::{collections::BTreeMap, str::FromStr};
use time::{
    Date, OffsetDateTime, PrimitiveDateTime, Time,
    macros::{date, datetime, time},
};
use uuid::Uuid;

#[derive(Scalar, Debug, Default, Clone, PartialEq)]
pub struct Email(pub String);

#[derive(Entity, Debug, Default, Clone, PartialEq)]
#[keel(table = "samples")]
pub struct Sample {
    #[keel("pk")]
    pub id: Uuid,
    pub tiny: i8,
    pub small: i16,
    pub int: i32,
    pub big: i64,
    pub ubyte: u8,
    pub ushort: u16,
    pub uint: u32,
    pub ubig: u64,
    pub ratio: f32,
    pub precise: f64,
    pub amount: Decimal,
    pub letter: char,
    pub text: String,
    pub flag: bool,
    pub payload: Vec<u8>,
    pub day: Option<Date>,
    pub clock: Option<Time>,
    pub moment: Option<PrimitiveDateTime>,
    pub instant: Option<OffsetDateTime>,
    pub numbers: Vec<i32>,
    pub labels: BTreeMap<String, String>,
    pub email: Email,
    pub nickname: Option<String>,
}

pub async fn values<D: Driver>(engine: &Engine<D>) {
    // Setup
    engine.drop_table::<Sample>().await.expect("Failed to drop Sample");
    engine.create_table::<Sample>().await.expect("Failed to create Sample");

    // Every field set
    let full = Sample {
        id: Uuid::from_u128(0x5a5a_0000_0000_0000_0000_0000_0000_0001),
        tiny: -8,
        small: -1600,
        int: 320_000,
        big: -64_000_000_000,
        ubyte: 200,
        ushort: 60_000,
        uint: 4_000_000_000,
        ubig: 9_000_000_000_000,
        ratio: 1.25,
        precise: -0.000123,
        amount: Decimal::from_str("1234.56").expect("Invalid decimal"),
        letter: 'k',
        text: "it's a 'quoted' text".into(),
        flag: true,
        payload: vec![0, 1, 2, 254, 255],
        day: Some(date!(2025 - 03 - 14)),
        clock: Some(time!(09:26:53.589)),
        moment: Some(datetime!(2025-03-14 09:26:53.589793)),
        instant: Some(datetime!(2025-03-14 09:26:53 +02:00)),
        numbers: vec![3, 1, 4, 1, 5],
        labels: BTreeMap::from_iter([
            ("color".into(), "blue".into()),
            ("quote".into(), "don't".into()),
        ]),
        email: Email("someone@example.com".into()),
        nickname: Some("sam".into()),
    };
    engine
        .insert(&mut full.clone())
        .await
        .expect("Failed to insert the full sample");
    let mut loaded = Sample {
        id: full.id,
        ..Default::default()
    };
    assert!(engine.get(&mut loaded).await.expect("Failed to get"));
    assert_eq!(loaded, full);

    // Every field zero or absent
    let empty = Sample {
        id: Uuid::from_u128(0x5a5a_0000_0000_0000_0000_0000_0000_0002),
        ..Default::default()
    };
    engine
        .insert(&mut empty.clone())
        .await
        .expect("Failed to insert the empty sample");
    let mut loaded = Sample {
        id: empty.id,
        ..Default::default()
    };
    assert!(engine.get(&mut loaded).await.expect("Failed to get"));
    assert_eq!(loaded, empty);

    // Filter on a newtype and a byte buffer
    let mut found: Vec<Sample> = Vec::new();
    engine
        .find_by(
            &mut found,
            &Sample {
                email: Email("someone@example.com".into()),
                payload: vec![0, 1, 2, 254, 255],
                ..Default::default()
            },
        )
        .await
        .expect("Failed to find");
    assert_eq!(found, [full.clone()]);

    // Booleans written explicitly
    let result = engine
        .id([full.id])
        .cols(["flag"])
        .update(&mut Sample::default())
        .await
        .expect("Failed to update");
    assert_eq!(result.rows_affected, 1);
    let mut loaded = Sample {
        id: full.id,
        ..Default::default()
    };
    engine.get(&mut loaded).await.expect("Failed to get");
    assert!(!loaded.flag);
    assert_eq!(loaded.text, full.text);

    engine.drop_table::<Sample>().await.expect("Failed to drop Sample");
}
