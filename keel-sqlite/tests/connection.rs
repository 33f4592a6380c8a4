#[cfg(test)]
mod tests {
    use keel::{Connection, Driver, Executor, Prepared, Query, Value, stream::TryStreamExt};
    use keel_sqlite::{SqliteConnection, SqliteDriver};
    use keel_tests::{init_logs, silent_logs};
    use std::{path::Path, sync::Mutex};
    use tokio::fs;

    static MUTEX: Mutex<()> = Mutex::new(());

    #[tokio::test]
    async fn create_database() {
        init_logs();
        const DB_PATH: &'static str = "../target/debug/creation.sqlite";
        let _guard = MUTEX.lock().unwrap();
        if let Some(parent) = Path::new(DB_PATH).parent() {
            fs::create_dir_all(parent)
                .await
                .expect("Failed to create the database directory");
        }
        if Path::new(DB_PATH).exists() {
            fs::remove_file(DB_PATH)
                .await
                .expect(format!("Failed to remove test database file {}", DB_PATH).as_str());
        }
        assert!(
            !Path::new(DB_PATH).exists(),
            "Database file should not exist before test"
        );
        SqliteConnection::connect(&format!("sqlite://{}?mode=rwc", DB_PATH))
            .await
            .expect("Could not open the database");
        assert!(
            Path::new(DB_PATH).exists(),
            "Database file should be created after connection"
        );
        SqliteConnection::connect(&format!("sqlite://{}?mode=ro", DB_PATH))
            .await
            .expect("Could not open the database");
        fs::remove_file(DB_PATH)
            .await
            .expect(format!("Failed to remove existing test database file {}", DB_PATH).as_str());
        silent_logs! {
            assert!(
                SqliteConnection::connect(&format!("sqlite://{}?mode=ro", DB_PATH))
                    .await
                    .is_err(),
                "Should not be able to open in read only unexisting database"
            );
        }
    }

    #[tokio::test]
    async fn wrong_url() {
        silent_logs! {
            assert!(
                SqliteConnection::connect("postgres://some_value")
                    .await
                    .is_err()
            );
        };
    }

    #[tokio::test]
    async fn script_and_prepared() {
        init_logs();
        let mut connection = SqliteConnection::connect("sqlite://:memory:")
            .await
            .expect("Could not open the database");
        let result = connection
            .execute(Query::Raw(
                "CREATE TABLE pair (a INTEGER NOT NULL, b TEXT);\n\
                 INSERT INTO pair VALUES (1, 'x');\n\
                 -- comments are skipped\n\
                 INSERT INTO pair VALUES (2, 'y');"
                    .into(),
            ))
            .await
            .expect("Failed to run the script");
        assert_eq!(result.rows_affected, 2);
        assert_eq!(result.last_affected_id, Some(2));

        let mut query = connection
            .prepare("SELECT b FROM pair WHERE a = ?".into())
            .await
            .expect("Failed to prepare");
        assert!(query.is_prepared());
        let mut raw = Query::<SqliteDriver>::Raw("SELECT 1".into());
        assert!(raw.bind(1).is_err(), "Raw SQL takes no parameters");
        query.bind(2).expect("Failed to bind");
        let rows: Vec<_> = connection
            .fetch(query)
            .try_collect()
            .await
            .expect("Failed to fetch");
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].get_column("b"), Some(&Value::Varchar(Some("y".into()))));

        let mut query = connection
            .prepare("INSERT INTO pair (a, b) VALUES (?, ?)".into())
            .await
            .expect("Failed to prepare");
        query.bind(10).and_then(|q| q.bind("z")).expect("Failed to bind");
        let prepared = query.prepared().expect("The query is prepared");
        prepared.clear_bindings().expect("Failed to clear the bindings");
        prepared
            .bind_index("w".into(), 1)
            .and_then(|p| p.bind_index(3.into(), 0))
            .expect("Failed to bind");
        let result = connection.execute(query).await.expect("Failed to insert");
        assert_eq!(result.rows_affected, 1);
        assert_eq!(result.last_affected_id, Some(3));

        let rows: Vec<_> = connection
            .fetch(Query::Raw("SELECT a, b FROM pair ORDER BY a".into()))
            .try_collect()
            .await
            .expect("Failed to fetch");
        let values: Vec<_> = rows.iter().map(|r| r.values().to_vec()).collect();
        assert_eq!(
            values,
            [
                [Value::Int64(Some(1)), Value::Varchar(Some("x".into()))],
                [Value::Int64(Some(2)), Value::Varchar(Some("y".into()))],
                [Value::Int64(Some(3)), Value::Varchar(Some("w".into()))],
            ]
        );

        let result = silent_logs! {
            connection
                .prepare("SELECT 1; SELECT 2;".into())
                .await
        };
        assert!(result.is_err(), "Only one statement can be prepared");
        let result = silent_logs! {
            connection
                .execute(Query::Raw("INSERT INTO pair (b) VALUES ('no a');".into()))
                .await
        };
        assert!(result.is_err(), "The NOT NULL constraint must fail");
    }

    #[tokio::test]
    async fn metadata() {
        init_logs();
        let mut connection = SqliteConnection::connect("sqlite://:memory:")
            .await
            .expect("Could not open the database");
        connection
            .execute(Query::Raw(
                "CREATE TABLE \"shelf\" (\n\
                 \"id\" INTEGER PRIMARY KEY AUTOINCREMENT,\n\
                 \"label\" TEXT NOT NULL DEFAULT 'none',\n\
                 \"level\" INTEGER\n\
                 );\n\
                 CREATE UNIQUE INDEX \"UQE_shelf_place\" ON \"shelf\" (\"label\", \"level\");"
                    .into(),
            ))
            .await
            .expect("Failed to create the table");
        let metas = connection.db_metas().await.expect("Failed to read the metadata");
        assert_eq!(metas.len(), 1);
        let shelf = &metas[0];
        assert_eq!(shelf.name, "shelf");
        let columns: Vec<_> = shelf.columns.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(columns, ["id", "label", "level"]);
        let id = shelf.column("id").expect("Missing id");
        assert!(id.primary_key);
        assert_eq!(id.sql_type, "INTEGER");
        let label = shelf.column("label").expect("Missing label");
        assert!(!label.nullable);
        assert_eq!(label.default.as_deref(), Some("'none'"));
        assert!(shelf.column("level").is_some_and(|c| c.nullable));
        assert_eq!(shelf.indexes.len(), 1);
        let unique = shelf.index("UQE_shelf_place").expect("Missing index");
        assert!(unique.unique);
        assert_eq!(unique.columns, ["label", "level"]);
        assert_eq!(SqliteDriver::NAME, "sqlite");
    }
}
