#[cfg(test)]
mod tests {
    use keel_core::{
        AsValue, Codec, Declaration, FieldDeclaration, FieldKind, GenericSqlWriter, JoinType,
        MappingError, Planner, Reflector, SetValue, SnakeMapper, Sql, SqlWriter, Statement,
        TableDescriptor, Value, render_select,
    };
    use std::sync::Arc;
    use time::{OffsetDateTime, PrimitiveDateTime, macros::datetime};

    macro_rules! scalar {
        ($name:literal, $tag:literal, Option<$ty:ty>) => {
            FieldDeclaration {
                name: $name,
                tag: $tag,
                kind: FieldKind::Scalar {
                    prototype: <$ty as AsValue>::as_empty_value,
                    optional: true,
                },
            }
        };
        ($name:literal, $tag:literal, $ty:ty) => {
            FieldDeclaration {
                name: $name,
                tag: $tag,
                kind: FieldKind::Scalar {
                    prototype: <$ty as AsValue>::as_empty_value,
                    optional: false,
                },
            }
        };
    }

    static ARTICLE: Declaration = Declaration {
        name: "Article",
        table: "",
        fields: &[
            scalar!("id", "pk autoincr", i64),
            scalar!("title", "not null", String),
            scalar!("body", "", Option<String>),
            scalar!("views", "", i32),
            scalar!("published", "", bool),
            scalar!("created_at", "created", PrimitiveDateTime),
            scalar!("updated_at", "updated", PrimitiveDateTime),
            scalar!("revision", "version", i32),
        ],
    };

    static MEMBERSHIP: Declaration = Declaration {
        name: "Membership",
        table: "",
        fields: &[
            scalar!("group_id", "pk", i32),
            scalar!("user_id", "pk", i32),
            scalar!("role", "", String),
        ],
    };

    const WRITER: GenericSqlWriter = GenericSqlWriter;

    fn describe(declaration: &'static Declaration) -> Arc<TableDescriptor> {
        Reflector::new(Arc::new(SnakeMapper))
            .describe_declaration(declaration)
            .unwrap()
    }

    fn now() -> OffsetDateTime {
        datetime!(2024-05-06 07:08:09 UTC)
    }

    fn article(
        id: i64,
        title: &str,
        views: i32,
        published: bool,
        revision: i32,
    ) -> Vec<Value> {
        vec![
            Value::Int64(Some(id)),
            Value::Varchar(Some(title.into())),
            Value::Varchar(None),
            Value::Int32(Some(views)),
            Value::Boolean(Some(published)),
            Value::Timestamp(None),
            Value::Timestamp(None),
            Value::Int32(Some(revision)),
        ]
    }

    fn validation(error: keel_core::Error) -> String {
        match MappingError::of(&error) {
            Some(MappingError::Validation(message)) => message.clone(),
            other => panic!("Unexpected error {other:?}: {error:#}"),
        }
    }

    #[test]
    fn plan_insert() {
        let table = describe(&ARTICLE);
        let statement = Statement::new();
        let planner = Planner::new(&table, &table.name, &statement, Codec::default());
        let mut slots = article(0, "", 0, false, 0);
        let insert = planner.insert(&mut slots, now()).unwrap();
        assert_eq!(
            insert.columns,
            ["title", "views", "published", "created_at", "updated_at", "revision"]
        );
        assert_eq!(slots[5], Value::Timestamp(Some(datetime!(2024-05-06 07:08:09))));
        assert_eq!(slots[7], Value::Int32(Some(1)));
        let mut sql = Sql::new();
        WRITER.write_insert(&mut sql, &insert);
        assert_eq!(
            sql.text,
            r#"INSERT INTO "article" ("title", "views", "published", "created_at", "updated_at", "revision") VALUES (?, ?, ?, ?, ?, ?);"#
        );
        assert_eq!(sql.params[0], Value::Varchar(Some(String::new())));
        assert_eq!(sql.params[1], Value::Int32(Some(0)));
        assert_eq!(sql.params[2], Value::Int32(Some(0)));
        assert_eq!(sql.params[5], Value::Int32(Some(1)));
    }

    #[test]
    fn plan_insert_explicit_columns() {
        let table = describe(&ARTICLE);
        let mut statement = Statement::new();
        statement.cols(["title", "views", "published"]).no_auto_time();
        let planner = Planner::new(&table, &table.name, &statement, Codec::default());
        let mut slots = article(0, "x", 0, false, 0);
        let insert = planner.insert(&mut slots, now()).unwrap();
        assert_eq!(insert.columns, ["title", "views", "published", "revision"]);
        assert_eq!(insert.values[2], Value::Int32(Some(0)));
        assert_eq!(slots[5], Value::Timestamp(None));
    }

    #[test]
    fn plan_update_by_key() {
        let table = describe(&ARTICLE);
        let statement = Statement::new();
        let planner = Planner::new(&table, &table.name, &statement, Codec::default());
        let mut slots = article(7, "New", 0, false, 3);
        let update = planner.update(&mut slots, Vec::new(), now()).unwrap();
        let mut sql = Sql::new();
        WRITER.write_update(&mut sql, &update);
        assert_eq!(
            sql.text,
            r#"UPDATE "article" SET "title" = ?, "updated_at" = ?, "revision" = "revision" + 1 WHERE "id" = ? AND "revision" = ?;"#
        );
        assert_eq!(
            sql.params,
            [
                Value::Varchar(Some("New".into())),
                Value::Timestamp(Some(datetime!(2024-05-06 07:08:09))),
                Value::Int64(Some(7)),
                Value::Int32(Some(3)),
            ]
        );
    }

    #[test]
    fn plan_update_use_bool() {
        let table = describe(&ARTICLE);
        let mut statement = Statement::new();
        statement.filter("views > ?", (10,)).use_bool().no_auto_time();
        let planner = Planner::new(&table, &table.name, &statement, Codec::default());
        let mut slots = article(0, "", 0, false, 0);
        let update = planner.update(&mut slots, Vec::new(), now()).unwrap();
        assert_eq!(update.set.len(), 2);
        assert_eq!(update.set[0].column, "published");
        assert_eq!(update.set[0].value, SetValue::Param(Value::Int32(Some(0))));
        assert_eq!(update.set[1].value, SetValue::Increment(1));
        let mut sql = Sql::new();
        WRITER.write_update(&mut sql, &update);
        assert_eq!(
            sql.text,
            r#"UPDATE "article" SET "published" = ?, "revision" = "revision" + 1 WHERE (views > ?);"#
        );
    }

    #[test]
    fn plan_insert_default_column() {
        static COUNTER: Declaration = Declaration {
            name: "Counter",
            table: "",
            fields: &[
                scalar!("id", "pk autoincr", i64),
                scalar!("hits", "default 5", i32),
                scalar!("misses", "", i32),
                scalar!("note", "", Option<String>),
            ],
        };
        let table = describe(&COUNTER);
        let statement = Statement::new();
        let planner = Planner::new(&table, &table.name, &statement, Codec::default());
        let mut slots = vec![
            Value::Int64(Some(0)),
            Value::Int32(Some(0)),
            Value::Int32(Some(0)),
            Value::Varchar(None),
        ];
        let insert = planner.insert(&mut slots, now()).unwrap();
        assert_eq!(insert.columns, ["misses"]);
        slots[1] = Value::Int32(Some(2));
        let insert = planner.insert(&mut slots, now()).unwrap();
        assert_eq!(insert.columns, ["hits", "misses"]);
    }

    #[test]
    fn plan_update_whole_table() {
        let table = describe(&ARTICLE);
        let mut statement = Statement::new();
        statement.use_bool().no_auto_time();
        let planner = Planner::new(&table, &table.name, &statement, Codec::default());
        let mut slots = article(0, "", 0, true, 0);
        let update = planner.update(&mut slots, Vec::new(), now()).unwrap();
        let mut sql = Sql::new();
        WRITER.write_update(&mut sql, &update);
        assert_eq!(
            sql.text,
            r#"UPDATE "article" SET "published" = ?, "revision" = "revision" + 1;"#
        );

        let mut statement = Statement::new();
        statement.cols(["views"]).no_auto_time();
        let planner = Planner::new(&table, &table.name, &statement, Codec::default());
        let mut slots = article(0, "", 0, false, 0);
        let update = planner.update(&mut slots, Vec::new(), now()).unwrap();
        assert!(update.filter.is_empty());
        assert_eq!(update.set[0].value, SetValue::Param(Value::Int32(Some(0))));
    }

    #[test]
    fn plan_update_filter_of_other_entity() {
        let table = describe(&ARTICLE);
        let members = describe(&MEMBERSHIP);
        let statement = Statement::new();
        let planner = Planner::new(&table, &table.name, &statement, Codec::default());
        let filter = Planner::new(&members, &table.name, &statement, Codec::default())
            .derived(&[
                Value::Int32(Some(0)),
                Value::Int32(Some(4)),
                Value::Varchar(Some("owner".into())),
            ])
            .unwrap();
        let mut slots = article(0, "Renamed", 0, false, 0);
        let update = planner.update(&mut slots, filter, now()).unwrap();
        let mut sql = Sql::new();
        WRITER.write_update(&mut sql, &update);
        assert_eq!(
            sql.text,
            r#"UPDATE "article" SET "title" = ?, "updated_at" = ?, "revision" = "revision" + 1 WHERE "user_id" = ? AND "role" = ?;"#
        );
    }

    #[test]
    fn plan_update_errors() {
        let table = describe(&ARTICLE);
        let statement = Statement::new();
        let planner = Planner::new(&table, &table.name, &statement, Codec::default());
        let mut slots = article(1, "", 0, false, 0);
        let message = validation(planner.update(&mut slots, Vec::new(), now()).unwrap_err());
        assert!(message.contains("Nothing to update"), "{message}");
        let mut slots = article(0, "title", 0, false, 0);
        let message = validation(planner.update(&mut slots, Vec::new(), now()).unwrap_err());
        assert!(message.contains("without a condition"), "{message}");

        let mut statement = Statement::new();
        statement.cols(["missing"]);
        let planner = Planner::new(&table, &table.name, &statement, Codec::default());
        let mut slots = article(1, "", 0, false, 0);
        let message = validation(planner.update(&mut slots, Vec::new(), now()).unwrap_err());
        assert!(message.contains("missing"), "{message}");
    }

    #[test]
    fn plan_delete() {
        let table = describe(&ARTICLE);
        let statement = Statement::new();
        let planner = Planner::new(&table, &table.name, &statement, Codec::default());
        let slots = article(0, "Old", 0, true, 0);
        let delete = planner.delete(&slots).unwrap();
        let mut sql = Sql::new();
        WRITER.write_delete(&mut sql, &delete);
        assert_eq!(
            sql.text,
            r#"DELETE FROM "article" WHERE "title" = ? AND "published" = ?;"#
        );
        assert_eq!(sql.params[1], Value::Int32(Some(1)));

        let slots = article(0, "", 0, false, 0);
        let message = validation(planner.delete(&slots).unwrap_err());
        assert!(message.contains("without any condition"), "{message}");
    }

    #[test]
    fn plan_select() {
        let table = describe(&ARTICLE);
        let mut statement = Statement::new();
        statement
            .filter("views > ?", (10,))
            .or("title LIKE ?", ("%rust%",))
            .and("published = ?", (true,))
            .omit(["body"])
            .desc(["created_at"])
            .limit(5)
            .offset(10);
        let planner = Planner::new(&table, &table.name, &statement, Codec::default());
        let filter = planner.conditions().unwrap();
        let (select, plan) = planner.select(filter).unwrap();
        assert_eq!(plan.positions.len(), 7);
        let sql = render_select(&WRITER, &select);
        assert_eq!(
            sql.text,
            concat!(
                r#"SELECT "id", "title", "views", "published", "created_at", "updated_at", "revision" "#,
                r#"FROM "article" WHERE ((views > ?) OR (title LIKE ?)) AND (published = ?) "#,
                r#"ORDER BY "created_at" DESC LIMIT 5 OFFSET 10;"#
            )
        );
        assert_eq!(
            sql.params,
            [
                Value::Int32(Some(10)),
                Value::Varchar(Some("%rust%".into())),
                Value::Int32(Some(1)),
            ]
        );
    }

    #[test]
    fn plan_select_columns_join() {
        let table = describe(&ARTICLE);
        let mut statement = Statement::new();
        statement
            .cols(["id", "title", "count(c.id) AS comments"])
            .join(JoinType::Left, "comment c", "c.article_id = article.id", ())
            .group_by("article.id")
            .having("count(c.id) > ?", (2,))
            .asc(["title"]);
        let planner = Planner::new(&table, &table.name, &statement, Codec::default());
        let (select, plan) = planner.select(Vec::new()).unwrap();
        assert_eq!(plan.positions, [Some(0), Some(1), None]);
        let sql = render_select(&WRITER, &select);
        assert_eq!(
            sql.text,
            concat!(
                r#"SELECT "article"."id", "article"."title", count(c.id) AS comments FROM "article" "#,
                r#"LEFT JOIN comment c ON c.article_id = article.id GROUP BY article.id "#,
                r#"HAVING count(c.id) > ? ORDER BY "article"."title" ASC;"#
            )
        );
        assert_eq!(sql.params, [Value::Int32(Some(2))]);
    }

    #[test]
    fn plan_count() {
        let table = describe(&ARTICLE);
        let mut statement = Statement::new();
        statement.filter("views > ?", (1,)).asc(["id"]).limit(3);
        let planner = Planner::new(&table, &table.name, &statement, Codec::default());
        let (select, _) = planner.select(planner.conditions().unwrap()).unwrap();
        let mut sql = Sql::new();
        WRITER.write_count(&mut sql, &select);
        assert_eq!(
            sql.text,
            r#"SELECT COUNT(*) FROM "article" WHERE (views > ?);"#
        );

        let mut statement = Statement::new();
        statement.distinct().cols(["title"]);
        let planner = Planner::new(&table, &table.name, &statement, Codec::default());
        let (select, _) = planner.select(Vec::new()).unwrap();
        let mut sql = Sql::new();
        WRITER.write_count(&mut sql, &select);
        assert_eq!(
            sql.text,
            r#"SELECT COUNT(*) FROM (SELECT DISTINCT "title" FROM "article") AS "counted";"#
        );
    }

    #[test]
    fn plan_composite_key() {
        let table = describe(&MEMBERSHIP);
        let mut statement = Statement::new();
        statement.id((1, 2));
        let planner = Planner::new(&table, &table.name, &statement, Codec::default());
        let filter = planner.conditions().unwrap();
        let (select, _) = planner.select(filter).unwrap();
        let sql = render_select(&WRITER, &select);
        assert_eq!(
            sql.text,
            r#"SELECT "group_id", "user_id", "role" FROM "membership" WHERE "group_id" = ? AND "user_id" = ?;"#
        );
        let slots = vec![Value::Int32(None), Value::Int32(None), Value::Varchar(None)];
        assert_eq!(planner.lookup_key(&slots).as_deref(), Some("1\u{1f}2"));

        let mut statement = Statement::new();
        statement.id((1,));
        let planner = Planner::new(&table, &table.name, &statement, Codec::default());
        let message = validation(planner.conditions().unwrap_err());
        assert!(message.contains("2 primary key columns"), "{message}");
    }

    #[test]
    fn plan_lookup_key() {
        let table = describe(&ARTICLE);
        let statement = Statement::new();
        let planner = Planner::new(&table, &table.name, &statement, Codec::default());
        assert_eq!(
            planner.lookup_key(&article(5, "", 0, false, 0)).as_deref(),
            Some("5")
        );
        assert_eq!(planner.lookup_key(&article(5, "t", 0, false, 0)), None);
        assert_eq!(planner.lookup_key(&article(0, "", 0, false, 0)), None);

        let mut statement = Statement::new();
        statement.no_cache();
        let planner = Planner::new(&table, &table.name, &statement, Codec::default());
        assert_eq!(planner.lookup_key(&article(5, "", 0, false, 0)), None);
    }

    #[test]
    fn plan_in_list_empty() {
        let mut statement = Statement::new();
        statement.in_list("id", Vec::<i32>::new());
        assert!(matches!(
            statement.pending_error,
            Some(MappingError::Validation(..))
        ));
        let mut statement = Statement::new();
        statement.in_list("id", [1, 2, 3]);
        assert_eq!(statement.conditions[0].fragment, "id IN (?, ?, ?)");
        assert_eq!(statement.conditions[0].params.len(), 3);
    }

    #[test]
    fn plan_ddl() {
        let table = describe(&ARTICLE);
        let mut out = String::new();
        WRITER.write_create_table(&mut out, &table, &table.name, true);
        assert_eq!(
            out,
            indoc::indoc! {r#"
                CREATE TABLE IF NOT EXISTS "article" (
                "id" BIGINT PRIMARY KEY AUTOINCREMENT,
                "title" VARCHAR NOT NULL,
                "body" VARCHAR,
                "views" INTEGER,
                "published" BOOLEAN,
                "created_at" TIMESTAMP,
                "updated_at" TIMESTAMP,
                "revision" INTEGER
                );"#}
        );
        let table = describe(&MEMBERSHIP);
        let mut out = String::new();
        WRITER.write_create_table(&mut out, &table, &table.name, false);
        assert_eq!(
            out,
            indoc::indoc! {r#"
                CREATE TABLE "membership" (
                "group_id" INTEGER NOT NULL,
                "user_id" INTEGER NOT NULL,
                "role" VARCHAR,
                PRIMARY KEY ("group_id", "user_id")
                );"#}
        );
        let mut out = String::new();
        WRITER.write_drop_table(&mut out, "membership", true);
        assert_eq!(out, r#"DROP TABLE IF EXISTS "membership";"#);
    }
}
