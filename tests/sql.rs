#[cfg(test)]
mod tests {
    use indoc::indoc;
    use keel::{
        AsValue, Codec, Entity, GenericSqlWriter, MappingError, Planner, Reflector, Scalar,
        SnakeMapper, Sql, SqlWriter, Statement, TableDescriptor, Value, render_select,
    };
    use rust_decimal::Decimal;
    use std::sync::Arc;
    use time::{OffsetDateTime, PrimitiveDateTime, macros::datetime};

    const WRITER: GenericSqlWriter = GenericSqlWriter;

    #[derive(Entity, Debug, Default, Clone, PartialEq)]
    struct Stamps {
        #[keel("created")]
        created_at: Option<PrimitiveDateTime>,
        #[keel("updated")]
        updated_at: Option<PrimitiveDateTime>,
    }

    #[derive(Scalar, Debug, Default, Clone, PartialEq)]
    struct Sku(String);

    #[derive(Entity, Debug, Default, Clone, PartialEq)]
    struct Warehouse {
        #[keel("pk autoincr")]
        id: i64,
        #[keel("varchar(80) not null unique")]
        name: String,
    }

    #[derive(Entity, Debug, Default, Clone, PartialEq)]
    #[keel(table = "stock_items")]
    struct StockItem {
        #[keel("pk autoincr")]
        id: i64,
        #[keel("'item_code' varchar(12) not null index")]
        sku: Sku,
        #[keel("index(place) not null")]
        aisle: i16,
        #[keel("index(place) not null")]
        shelf: i16,
        #[keel("decimal(10,2) default 0")]
        price: Decimal,
        quantity: u32,
        #[keel("cascade")]
        warehouse: Warehouse,
        #[keel("version")]
        revision: i32,
        #[keel("extends")]
        stamps: Stamps,
        #[keel("-")]
        note: String,
    }

    fn describe<E: Entity>() -> Arc<TableDescriptor> {
        Reflector::new(Arc::new(SnakeMapper))
            .describe::<E>()
            .expect("Failed to describe")
    }

    fn now() -> OffsetDateTime {
        datetime!(2025-01-02 03:04:05 UTC)
    }

    fn slots(item: &StockItem) -> Vec<Value> {
        let mut slots = Vec::new();
        item.write_fields(&mut slots);
        // Filled from the association key by the session
        slots[6] = Value::Int64(Some(item.warehouse.id));
        slots
    }

    #[test]
    fn derived_declaration() {
        let declaration = StockItem::declaration();
        assert_eq!(declaration.name, "StockItem");
        assert_eq!(declaration.table, "stock_items");
        assert_eq!(declaration.fields.len(), 10);
        assert_eq!(Warehouse::declaration().table, "");

        let table = describe::<StockItem>();
        assert_eq!(table.name, "stock_items");
        assert_eq!(table.slots, 11);
        assert_eq!(table.extends, ["Stamps"]);
        let columns: Vec<_> = table.columns.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(
            columns,
            [
                "id",
                "item_code",
                "aisle",
                "shelf",
                "price",
                "quantity",
                "warehouse_id",
                "revision",
                "created_at",
                "updated_at",
            ]
        );
        assert_eq!(table.column("sku").map(|c| c.name.as_str()), Some("item_code"));
        assert!(table.column("note").is_none());
        let warehouse = table.column("warehouse_id").expect("Missing the association");
        assert_eq!(warehouse.prototype, Value::Int64(None));
        assert!(warehouse.nullable);
        assert_eq!(
            warehouse.association.as_ref().map(|a| a.table.name.as_str()),
            Some("warehouse")
        );
        let indexes: Vec<_> = table
            .indexes
            .iter()
            .map(|i| (i.name.as_str(), i.columns.clone()))
            .collect();
        assert_eq!(
            indexes,
            [
                ("IDX_stock_items_item_code", vec!["item_code".to_string()]),
                (
                    "IDX_stock_items_place",
                    vec!["aisle".to_string(), "shelf".to_string()]
                ),
            ]
        );
        assert!(table.uniques.is_empty());
    }

    #[test]
    fn derived_fields() {
        let item = StockItem {
            id: 9,
            sku: Sku("B-2".into()),
            aisle: 4,
            shelf: 1,
            price: Decimal::new(1250, 2),
            quantity: 30,
            warehouse: Warehouse {
                id: 3,
                name: "North".into(),
            },
            revision: 2,
            stamps: Stamps {
                created_at: Some(datetime!(2024-12-31 23:59:59)),
                updated_at: None,
            },
            note: "scratch".into(),
        };
        let mut values = Vec::new();
        item.write_fields(&mut values);
        assert_eq!(values.len(), 11);
        assert_eq!(values[1], Value::Varchar(Some("B-2".into())));
        assert_eq!(values[2], Value::Int16(Some(4)));
        assert_eq!(values[6], Value::Null);
        assert_eq!(values[9], Value::Timestamp(None));
        assert_eq!(values[10], Value::Null);
        assert_eq!(item.associations().len(), 1);

        let mut loaded = StockItem::default();
        loaded
            .read_fields(&mut values.clone().into_iter().map(Some))
            .expect("Failed to read the fields");
        assert_eq!(
            loaded,
            StockItem {
                warehouse: Warehouse::default(),
                note: String::new(),
                ..item.clone()
            }
        );

        // Missing slots leave the fields untouched
        let mut partial = item.clone();
        let mut only_quantity = (0..11).map(|i| (i == 5).then(|| Value::Int64(Some(31))));
        partial
            .read_fields(&mut only_quantity)
            .expect("Failed to read the fields");
        assert_eq!(partial.quantity, 31);
        assert_eq!(partial.sku, item.sku);

        let mut wrong = (0..11).map(|i| (i == 2).then(|| Value::Int64(Some(100_000))));
        let error = StockItem::default()
            .read_fields(&mut wrong)
            .expect_err("The value does not fit");
        match MappingError::of(&error) {
            Some(MappingError::TypeMismatch { column, .. }) => assert_eq!(column, "aisle"),
            other => panic!("Unexpected error {other:?}: {error:#}"),
        }

        assert_eq!(Sku::as_empty_value(), Value::Varchar(None));
        assert_eq!(
            Sku::try_from_value(Value::Varchar(Some("C-3".into()))).expect("Failed to convert"),
            Sku("C-3".into())
        );
    }

    #[test]
    fn create_table() {
        let table = describe::<StockItem>();
        let mut out = String::new();
        WRITER.write_create_table(&mut out, &table, &table.name, false);
        assert_eq!(
            out,
            indoc! {r#"
                CREATE TABLE "stock_items" (
                "id" BIGINT PRIMARY KEY AUTOINCREMENT,
                "item_code" VARCHAR(12) NOT NULL,
                "aisle" SMALLINT NOT NULL,
                "shelf" SMALLINT NOT NULL,
                "price" DECIMAL(10,2) DEFAULT 0,
                "quantity" BIGINT,
                "warehouse_id" BIGINT,
                "revision" INTEGER,
                "created_at" TIMESTAMP,
                "updated_at" TIMESTAMP
                );"#}
        );
        let mut out = String::new();
        for index in &table.indexes {
            WRITER.write_create_index(&mut out, &table.name, index, true);
            out.push('\n');
        }
        assert_eq!(
            out,
            indoc! {r#"
                CREATE INDEX IF NOT EXISTS "IDX_stock_items_item_code" ON "stock_items" ("item_code");
                CREATE INDEX IF NOT EXISTS "IDX_stock_items_place" ON "stock_items" ("aisle", "shelf");
            "#}
        );

        let table = describe::<Warehouse>();
        let mut out = String::new();
        WRITER.write_create_table(&mut out, &table, &table.name, true);
        assert_eq!(
            out,
            indoc! {r#"
                CREATE TABLE IF NOT EXISTS "warehouse" (
                "id" BIGINT PRIMARY KEY AUTOINCREMENT,
                "name" VARCHAR(80) NOT NULL UNIQUE
                );"#}
        );
    }

    #[test]
    fn insert_and_update() {
        let table = describe::<StockItem>();
        let statement = Statement::new();
        let planner = Planner::new(&table, &table.name, &statement, Codec::default());
        let item = StockItem {
            sku: Sku("A-1".into()),
            aisle: 2,
            quantity: 5,
            warehouse: Warehouse {
                id: 3,
                ..Default::default()
            },
            ..Default::default()
        };
        let mut values = slots(&item);
        let insert = planner.insert(&mut values, now()).expect("Failed to plan");
        let mut sql = Sql::new();
        WRITER.write_insert(&mut sql, &insert);
        assert_eq!(
            sql.text,
            concat!(
                r#"INSERT INTO "stock_items" ("item_code", "aisle", "shelf", "quantity", "warehouse_id", "revision", "created_at", "updated_at") "#,
                r#"VALUES (?, ?, ?, ?, ?, ?, ?, ?);"#
            )
        );
        assert_eq!(sql.params[2], Value::Int16(Some(0)));
        assert_eq!(sql.params[4], Value::Int64(Some(3)));
        assert_eq!(sql.params[5], Value::Int32(Some(1)));
        assert_eq!(values[8], Value::Timestamp(Some(datetime!(2025-01-02 03:04:05))));
        assert_eq!(values[8], values[9]);

        let mut statement = Statement::new();
        statement.no_auto_time();
        let planner = Planner::new(&table, &table.name, &statement, Codec::default());
        let item = StockItem {
            id: 9,
            quantity: 7,
            revision: 2,
            ..Default::default()
        };
        let mut values = slots(&item);
        let update = planner
            .update(&mut values, Vec::new(), now())
            .expect("Failed to plan");
        let mut sql = Sql::new();
        WRITER.write_update(&mut sql, &update);
        assert_eq!(
            sql.text,
            r#"UPDATE "stock_items" SET "quantity" = ?, "revision" = "revision" + 1 WHERE "id" = ? AND "revision" = ?;"#
        );
        assert_eq!(
            sql.params,
            [
                Value::UInt32(Some(7)),
                Value::Int64(Some(9)),
                Value::Int32(Some(2)),
            ]
        );
    }

    #[test]
    fn select_by_example() {
        let table = describe::<StockItem>();
        let mut statement = Statement::new();
        statement
            .filter("quantity > ?", (10,))
            .desc(["quantity"])
            .limit(10);
        let planner = Planner::new(&table, &table.name, &statement, Codec::default());
        let example = StockItem {
            aisle: 4,
            stamps: Stamps {
                created_at: Some(datetime!(2025-01-01 00:00:00)),
                updated_at: None,
            },
            ..Default::default()
        };
        let mut filter = planner.conditions().expect("Failed to plan");
        filter.extend(planner.derived(&slots(&example)).expect("Failed to plan"));
        let (select, plan) = planner.select(filter).expect("Failed to plan");
        assert_eq!(plan.positions.len(), 10);
        let sql = render_select(&WRITER, &select);
        assert_eq!(
            sql.text,
            concat!(
                r#"SELECT "id", "item_code", "aisle", "shelf", "price", "quantity", "warehouse_id", "revision", "created_at", "updated_at" "#,
                r#"FROM "stock_items" WHERE (quantity > ?) AND "aisle" = ? ORDER BY "quantity" DESC LIMIT 10;"#
            )
        );
        assert_eq!(sql.params, [Value::Int32(Some(10)), Value::Int16(Some(4))]);
    }
}
