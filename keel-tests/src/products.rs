use keel::{Driver, Engine, Entity, MappingError, Value};
use rust_decimal::Decimal;
use std::collections::{BTreeMap, HashMap};

#[derive(Entity, Debug, Default, Clone, PartialEq)]
pub struct Product {
    #[keel("pk autoincr")]
    pub id: i64,
    #[keel("not null")]
    pub name: String,
    #[keel("index")]
    pub category: String,
    pub price: Decimal,
    pub stock: i32,
}

fn product(name: &str, category: &str, price: i64, stock: i32) -> Product {
    Product {
        name: name.into(),
        category: category.into(),
        price: Decimal::new(price, 2),
        stock,
        ..Default::default()
    }
}

pub async fn products<D: Driver>(engine: &Engine<D>) {
    // Setup
    engine.drop_table::<Product>().await.expect("Failed to drop Product");
    engine.create_table::<Product>().await.expect("Failed to create Product");
    engine.create_indexes::<Product>().await.expect("Failed to create the indexes");
    let mut items = vec![
        product("hammer", "tools", 1599, 4),
        product("saw", "tools", 2450, 1),
        product("drill", "tools", 8900, 0),
        product("apple", "food", 45, 120),
        product("bread", "food", 230, 8),
    ];
    let inserted = engine.insert_many(&mut items).await.expect("Failed to insert");
    assert_eq!(inserted, 5);

    // Same rows whatever the destination
    let mut list: Vec<Product> = Vec::new();
    engine
        .asc(["id"])
        .find(&mut list)
        .await
        .expect("Failed to find into a Vec");
    assert_eq!(list, items);
    let mut hash: HashMap<i64, Product> = HashMap::new();
    engine.find(&mut hash).await.expect("Failed to find into a HashMap");
    assert_eq!(hash.len(), list.len());
    for item in &list {
        assert_eq!(hash.get(&item.id), Some(item));
    }
    let mut tree: BTreeMap<i64, Product> = BTreeMap::new();
    engine
        .find_by(
            &mut tree,
            &Product {
                category: "tools".into(),
                ..Default::default()
            },
        )
        .await
        .expect("Failed to find into a BTreeMap");
    let mut tools: Vec<Product> = Vec::new();
    engine
        .asc(["id"])
        .find_by(
            &mut tools,
            &Product {
                category: "tools".into(),
                ..Default::default()
            },
        )
        .await
        .expect("Failed to find");
    assert_eq!(tree.into_values().collect::<Vec<_>>(), tools);
    assert_eq!(tools.len(), 3);

    // A map needs the key in the projection
    let mut names: HashMap<i64, Product> = HashMap::new();
    let error = engine
        .cols(["name"])
        .find(&mut names)
        .await
        .expect_err("The key is not selected");
    assert!(matches!(
        MappingError::of(&error),
        Some(MappingError::Validation(..))
    ));

    // IN list
    let mut found: Vec<Product> = Vec::new();
    engine
        .in_list("name", ["saw", "apple", "missing"])
        .asc(["name"])
        .find(&mut found)
        .await
        .expect("Failed to find");
    let names: Vec<_> = found.iter().map(|v| v.name.as_str()).collect();
    assert_eq!(names, ["apple", "saw"]);
    let error = engine
        .in_list("name", Vec::<String>::new())
        .find(&mut found)
        .await
        .expect_err("An empty IN list must fail");
    assert!(matches!(
        MappingError::of(&error),
        Some(MappingError::Validation(..))
    ));

    // OR conditions and ordering
    let mut found: Vec<Product> = Vec::new();
    engine
        .filter("stock < ?", (2,))
        .or("category = ?", ("food",))
        .desc(["stock"])
        .find(&mut found)
        .await
        .expect("Failed to find");
    let names: Vec<_> = found.iter().map(|v| v.name.as_str()).collect();
    assert_eq!(names, ["apple", "bread", "saw", "drill"]);

    // Pagination
    let mut page: Vec<Product> = Vec::new();
    engine
        .order_by("name ASC")
        .limit(2)
        .offset(1)
        .find(&mut page)
        .await
        .expect("Failed to find");
    let names: Vec<_> = page.iter().map(|v| v.name.as_str()).collect();
    assert_eq!(names, ["bread", "drill"]);

    // Projection
    let mut partial: Vec<Product> = Vec::new();
    engine
        .cols(["id", "name"])
        .asc(["id"])
        .find(&mut partial)
        .await
        .expect("Failed to find");
    assert_eq!(partial.len(), 5);
    assert!(partial.iter().all(|v| v.price.is_zero() && v.stock == 0 && v.category.is_empty()));
    let mut partial: Vec<Product> = Vec::new();
    engine
        .omit(["price"])
        .asc(["id"])
        .find(&mut partial)
        .await
        .expect("Failed to find");
    assert!(partial.iter().all(|v| v.price.is_zero() && !v.name.is_empty()));

    // Distinct
    let count = engine
        .distinct()
        .cols(["category"])
        .count(&Product::default())
        .await
        .expect("Failed to count");
    assert_eq!(count, 2);

    // Raw queries
    let rows = engine
        .query(
            "SELECT category, COUNT(*) AS total FROM product GROUP BY category ORDER BY category",
            (),
        )
        .await
        .expect("Failed to query");
    assert_eq!(rows.len(), 2);
    assert_eq!(
        rows[0].get_column("category"),
        Some(&Value::Varchar(Some("food".into())))
    );
    assert_eq!(rows[1].get_column("total"), Some(&Value::Int64(Some(3))));
    let result = engine
        .exec(
            "UPDATE product SET stock = stock + ? WHERE category = ?",
            (10, "tools"),
        )
        .await
        .expect("Failed to exec");
    assert_eq!(result.rows_affected, 3);
    let restocked = engine
        .query_entities::<Product>(
            "SELECT id, name, stock FROM product WHERE stock >= ? ORDER BY id",
            (10,),
        )
        .await
        .expect("Failed to query entities");
    let stocks: Vec<_> = restocked.iter().map(|v| (v.name.as_str(), v.stock)).collect();
    assert_eq!(
        stocks,
        [("hammer", 14), ("saw", 11), ("drill", 10), ("apple", 120)]
    );
    assert!(restocked.iter().all(|v| v.id > 0 && v.category.is_empty()));

    // Group by with having, through the builder
    let mut grouped: Vec<Product> = Vec::new();
    engine
        .cols(["category"])
        .group_by("category")
        .having("COUNT(*) > ?", (2,))
        .find(&mut grouped)
        .await
        .expect("Failed to find");
    assert_eq!(grouped.len(), 1);
    assert_eq!(grouped[0].category, "tools");

    // Explicit table name
    let count = engine
        .table("product")
        .count(&Product::default())
        .await
        .expect("Failed to count");
    assert_eq!(count, 5);

    engine.drop_table::<Product>().await.expect("Failed to drop Product");
}
