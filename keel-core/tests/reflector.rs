#[cfg(test)]
mod tests {
    use keel_core::{
        AsValue, Declaration, FieldDeclaration, FieldKind, MappingError, Reflector, SameMapper,
        SnakeMapper, Value,
    };
    use std::sync::Arc;
    use time::PrimitiveDateTime;

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

    fn reflector() -> Reflector {
        Reflector::new(Arc::new(SnakeMapper))
    }

    fn configuration_error(result: keel_core::Result<impl std::fmt::Debug>) -> String {
        let error = result.expect_err("Expected a configuration error");
        match MappingError::of(&error) {
            Some(MappingError::Configuration { message, .. }) => message.clone(),
            other => panic!("Unexpected error {other:?}: {error:#}"),
        }
    }

    static AUDIT: Declaration = Declaration {
        name: "Audit",
        table: "",
        fields: &[
            scalar!("created_at", "created", PrimitiveDateTime),
            scalar!("updated_at", "updated", PrimitiveDateTime),
            scalar!("revision", "version", i32),
        ],
    };

    fn audit() -> &'static Declaration {
        &AUDIT
    }

    static USER_INFO: Declaration = Declaration {
        name: "UserInfo",
        table: "",
        fields: &[
            scalar!("id", "pk autoincr", i64),
            scalar!("login", "varchar(40) unique not null", String),
            scalar!("nick_name", "", Option<String>),
            scalar!("scratch", "-", String),
            FieldDeclaration {
                name: "audit",
                tag: "",
                kind: FieldKind::Extends(audit),
            },
            scalar!("age", "index(by_age)", i32),
            scalar!("city", "index(by_age) unique(home)", String),
            scalar!("street", "unique(home) index", String),
            scalar!("active", "default 1", bool),
        ],
    };

    #[test]
    fn reflector_columns() {
        let reflector = reflector();
        let table = reflector.describe_declaration(&USER_INFO).unwrap();
        assert_eq!(table.name, "user_info");
        assert_eq!(table.type_name, "UserInfo");
        let names: Vec<_> = table.columns.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(
            names,
            [
                "id",
                "login",
                "nick_name",
                "created_at",
                "updated_at",
                "revision",
                "age",
                "city",
                "street",
                "active"
            ]
        );
        assert_eq!(table.slots, 11);
        assert_eq!(table.extends, ["Audit"]);
        assert_eq!(table.primary_key, [0]);
        assert_eq!(table.auto_increment, Some(0));
        assert_eq!(table.version, Some(5));

        let id = &table.columns[0];
        assert!(id.primary_key && id.auto_increment && !id.nullable);
        assert_eq!(id.prototype, Value::Int64(None));

        let login = table.column("login").unwrap();
        assert!(login.unique);
        assert!(!login.nullable);
        assert_eq!(login.sql_type.as_ref().unwrap().to_string(), "VARCHAR(40)");

        let nick = table.column("nick_name").unwrap();
        assert!(nick.optional && nick.nullable);

        assert!(table.column("scratch").is_none());
        let created = table.column("created_at").unwrap();
        assert!(created.created && created.is_automatic());
        assert_eq!(created.slot, 4);
        let active = table.column("active").unwrap();
        assert_eq!(active.slot, 10);
        assert_eq!(active.default.as_deref(), Some("1"));
        assert!(active.is_boolean());
    }

    #[test]
    fn reflector_indexes() {
        let reflector = reflector();
        let table = reflector.describe_declaration(&USER_INFO).unwrap();
        let indexes: Vec<_> = table
            .indexes
            .iter()
            .map(|i| (i.name.as_str(), i.columns.clone(), i.unique))
            .collect();
        assert_eq!(
            indexes,
            [
                (
                    "IDX_user_info_by_age",
                    vec!["age".to_string(), "city".to_string()],
                    false
                ),
                ("IDX_user_info_street", vec!["street".to_string()], false),
            ]
        );
        assert_eq!(table.uniques.len(), 1);
        assert_eq!(table.uniques[0].name, "UQE_user_info_home");
        assert_eq!(table.uniques[0].columns, ["city", "street"]);
        assert!(table.uniques[0].unique);
    }

    #[test]
    fn reflector_memoized() {
        let reflector = reflector();
        let first = reflector.describe_declaration(&USER_INFO).unwrap();
        let second = reflector.describe_declaration(&USER_INFO).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
    }

    static RENAMED: Declaration = Declaration {
        name: "Renamed",
        table: "legacy_table",
        fields: &[
            scalar!("UserId", "pk", i32),
            scalar!("Name", "'Full Name'", String),
        ],
    };

    #[test]
    fn reflector_names() {
        let table = Reflector::new(Arc::new(SameMapper))
            .describe_declaration(&RENAMED)
            .unwrap();
        assert_eq!(table.name, "legacy_table");
        assert_eq!(table.columns[0].name, "UserId");
        assert_eq!(table.columns[1].name, "Full Name");
        assert_eq!(table.column_index("Name"), Some(1));
    }

    static ACCOUNT: Declaration = Declaration {
        name: "Account",
        table: "",
        fields: &[scalar!("code", "pk", String), scalar!("owner", "", String)],
    };

    fn account() -> &'static Declaration {
        &ACCOUNT
    }

    static ORDER: Declaration = Declaration {
        name: "Order",
        table: "",
        fields: &[
            scalar!("id", "pk autoincr", i64),
            FieldDeclaration {
                name: "account",
                tag: "cascade",
                kind: FieldKind::Cascade(account),
            },
            FieldDeclaration {
                name: "payer",
                tag: "cascade paid_by",
                kind: FieldKind::Cascade(account),
            },
        ],
    };

    #[test]
    fn reflector_cascade() {
        let table = reflector().describe_declaration(&ORDER).unwrap();
        assert_eq!(table.cascades, [1, 2]);
        let account = &table.columns[1];
        assert_eq!(account.name, "account_id");
        assert_eq!(account.prototype, Value::Varchar(None));
        assert!(account.optional);
        let association = account.association.as_ref().unwrap();
        assert_eq!(association.index, 0);
        assert_eq!(association.table.name, "account");
        let payer = &table.columns[2];
        assert_eq!(payer.name, "paid_by");
        assert_eq!(payer.association.as_ref().unwrap().index, 1);
    }

    fn first() -> &'static Declaration {
        &FIRST
    }

    fn second() -> &'static Declaration {
        &SECOND
    }

    static FIRST: Declaration = Declaration {
        name: "First",
        table: "",
        fields: &[
            scalar!("id", "pk", i32),
            FieldDeclaration {
                name: "other",
                tag: "cascade",
                kind: FieldKind::Cascade(second),
            },
        ],
    };

    static SECOND: Declaration = Declaration {
        name: "Second",
        table: "",
        fields: &[
            scalar!("id", "pk", i32),
            FieldDeclaration {
                name: "other",
                tag: "cascade",
                kind: FieldKind::Cascade(first),
            },
        ],
    };

    #[test]
    fn reflector_cyclic_cascade() {
        let message = configuration_error(reflector().describe_declaration(&FIRST));
        assert!(message.contains("cyclic"), "{message}");
    }

    static NESTED: Declaration = Declaration {
        name: "Nested",
        table: "",
        fields: &[
            scalar!("id", "pk", i32),
            FieldDeclaration {
                name: "inner",
                tag: "",
                kind: FieldKind::Extends(with_audit),
            },
        ],
    };

    static WITH_AUDIT: Declaration = Declaration {
        name: "WithAudit",
        table: "",
        fields: &[FieldDeclaration {
            name: "audit",
            tag: "",
            kind: FieldKind::Extends(audit),
        }],
    };

    fn with_audit() -> &'static Declaration {
        &WITH_AUDIT
    }

    #[test]
    fn reflector_nested_extends() {
        let message = configuration_error(reflector().describe_declaration(&NESTED));
        assert!(message.contains("one level"), "{message}");
    }

    static TWO_VERSIONS: Declaration = Declaration {
        name: "TwoVersions",
        table: "",
        fields: &[
            scalar!("a", "version", i32),
            scalar!("b", "version", i64),
        ],
    };

    static TEXT_VERSION: Declaration = Declaration {
        name: "TextVersion",
        table: "",
        fields: &[scalar!("a", "version", String)],
    };

    static TEXT_AUTOINCR: Declaration = Declaration {
        name: "TextAutoincr",
        table: "",
        fields: &[scalar!("a", "pk autoincr", String)],
    };

    static DUPLICATE: Declaration = Declaration {
        name: "Duplicate",
        table: "",
        fields: &[scalar!("a", "", i32), scalar!("b", "a", i32)],
    };

    static BAD_TOKEN: Declaration = Declaration {
        name: "BadToken",
        table: "",
        fields: &[scalar!("a", "pk whatever else", i32)],
    };

    static SKIPPED_ONLY: Declaration = Declaration {
        name: "SkippedOnly",
        table: "",
        fields: &[scalar!("a", "- pk", i32)],
    };

    #[test]
    fn reflector_configuration_errors() {
        let reflector = reflector();
        assert!(configuration_error(reflector.describe_declaration(&TWO_VERSIONS)).contains("version"));
        assert!(configuration_error(reflector.describe_declaration(&TEXT_VERSION)).contains("integer"));
        assert!(configuration_error(reflector.describe_declaration(&TEXT_AUTOINCR)).contains("integer"));
        assert!(configuration_error(reflector.describe_declaration(&DUPLICATE)).contains("duplicate"));
        assert!(configuration_error(reflector.describe_declaration(&BAD_TOKEN)).contains("else"));
        assert!(configuration_error(reflector.describe_declaration(&SKIPPED_ONLY)).contains("no persisted"));
    }
}
