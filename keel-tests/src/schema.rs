use crate::silent_logs;
use keel::{Driver, Engine, Entity};

#[derive(Entity, Debug, Default, Clone, PartialEq)]
#[keel(table = "article")]
pub struct ArticleV1 {
    #[keel("pk autoincr")]
    pub id: i64,
    pub title: String,
}

#[derive(Entity, Debug, Default, Clone, PartialEq)]
#[keel(table = "article")]
pub struct ArticleV2 {
    #[keel("pk autoincr")]
    pub id: i64,
    pub title: String,
    #[keel("index")]
    pub author: Option<String>,
    #[keel("not null default 0")]
    pub views: i64,
}

#[derive(Entity, Debug, Default, Clone, PartialEq)]
pub struct Seat {
    #[keel("pk autoincr")]
    pub id: i64,
    #[keel("unique(place) not null")]
    pub row: String,
    #[keel("unique(place) not null")]
    pub number: i32,
}

pub async fn schema<D: Driver>(engine: &Engine<D>) {
    // Setup
    engine.drop_table::<ArticleV1>().await.expect("Failed to drop article");
    engine.drop_table::<Seat>().await.expect("Failed to drop Seat");

    // sync creates the missing table
    engine
        .sync(&[ArticleV1::declaration()])
        .await
        .expect("Failed to sync");
    let mut first = ArticleV1 {
        title: "Hello".into(),
        ..Default::default()
    };
    engine.insert(&mut first).await.expect("Failed to insert");

    // sync adds the new columns and the index, rows stay
    engine
        .sync(&[ArticleV2::declaration()])
        .await
        .expect("Failed to sync");
    let metas = engine.db_metas().await.expect("Failed to read the metadata");
    let article = metas
        .iter()
        .find(|v| v.name == "article")
        .expect("The table article must exist");
    let columns: Vec<_> = article.columns.iter().map(|v| v.name.as_str()).collect();
    assert_eq!(columns, ["id", "title", "author", "views"]);
    assert!(article.column("id").is_some_and(|v| v.primary_key));
    let views = article.column("views").expect("The column views must exist");
    assert!(!views.nullable);
    assert_eq!(views.default.as_deref(), Some("0"));
    let index = article
        .index("IDX_article_author")
        .expect("The index must exist");
    assert_eq!(index.columns, ["author"]);
    assert!(!index.unique);

    let mut loaded = ArticleV2 {
        id: first.id,
        ..Default::default()
    };
    assert!(engine.get(&mut loaded).await.expect("Failed to get"));
    assert_eq!(loaded.title, "Hello");
    assert_eq!(loaded.author, None);
    assert_eq!(loaded.views, 0);

    // Running it again changes nothing
    engine
        .sync(&[ArticleV2::declaration()])
        .await
        .expect("Failed to sync again");
    let again = engine.db_metas().await.expect("Failed to read the metadata");
    assert_eq!(
        again.iter().find(|v| v.name == "article"),
        Some(article)
    );

    // create_table does not tolerate an existing table, drop_table does
    let result = silent_logs! { engine.create_table::<ArticleV2>().await };
    assert!(result.is_err());
    engine.drop_table::<ArticleV2>().await.expect("Failed to drop");
    engine.drop_table::<ArticleV2>().await.expect("Failed to drop twice");
    let metas = engine.db_metas().await.expect("Failed to read the metadata");
    assert!(metas.iter().all(|v| v.name != "article"));

    // Composite unique group
    engine.create_table::<Seat>().await.expect("Failed to create Seat");
    engine.create_indexes::<Seat>().await.expect("Failed to create the indexes");
    engine.create_uniques::<Seat>().await.expect("Failed to create the uniques");
    let metas = engine.db_metas().await.expect("Failed to read the metadata");
    let seat = metas
        .iter()
        .find(|v| v.name == "seat")
        .expect("The table seat must exist");
    let unique = seat.index("UQE_seat_place").expect("The unique must exist");
    assert!(unique.unique);
    assert_eq!(unique.columns, ["row", "number"]);
    let mut a1 = Seat {
        row: "A".into(),
        number: 1,
        ..Default::default()
    };
    engine.insert(&mut a1).await.expect("Failed to insert");
    let mut a2 = Seat {
        row: "A".into(),
        number: 2,
        ..Default::default()
    };
    engine.insert(&mut a2).await.expect("Failed to insert");
    let mut again = Seat {
        row: "A".into(),
        number: 1,
        ..Default::default()
    };
    let result = silent_logs! { engine.insert(&mut again).await };
    assert!(result.is_err());

    engine.drop_table::<Seat>().await.expect("Failed to drop Seat");
}
