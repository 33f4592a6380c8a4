#[cfg(test)]
mod tests {
    use keel_core::{FieldTag, SqlType};

    #[test]
    fn tag_empty() {
        assert_eq!(FieldTag::parse("").unwrap(), FieldTag::default());
        assert_eq!(FieldTag::parse("   ").unwrap(), FieldTag::default());
    }

    #[test]
    fn tag_flags() {
        let tag = FieldTag::parse("pk autoincr").unwrap();
        assert!(tag.primary_key);
        assert!(tag.auto_increment);
        assert_eq!(tag.column, None);

        let tag = FieldTag::parse("CREATED").unwrap();
        assert!(tag.created);
        let tag = FieldTag::parse("updated version").unwrap();
        assert!(tag.updated);
        assert!(tag.version);
        let tag = FieldTag::parse("-").unwrap();
        assert!(tag.skip);
        let tag = FieldTag::parse("extends").unwrap();
        assert!(tag.extends);
        let tag = FieldTag::parse("cascade owner").unwrap();
        assert!(tag.cascade);
        assert_eq!(tag.column.as_deref(), Some("owner"));
    }

    #[test]
    fn tag_nullability() {
        assert_eq!(FieldTag::parse("not null").unwrap().not_null, Some(true));
        assert_eq!(FieldTag::parse("NOT NULL").unwrap().not_null, Some(true));
        assert_eq!(FieldTag::parse("notnull").unwrap().not_null, Some(true));
        assert_eq!(FieldTag::parse("null").unwrap().not_null, Some(false));
        assert!(FieldTag::parse("not").is_err());
        assert!(FieldTag::parse("not empty").is_err());
    }

    #[test]
    fn tag_groups() {
        let tag = FieldTag::parse("unique index").unwrap();
        assert_eq!(tag.uniques, vec![String::new()]);
        assert_eq!(tag.indexes, vec![String::new()]);

        let tag = FieldTag::parse("unique(name_age) index(by_age) index").unwrap();
        assert_eq!(tag.uniques, vec!["name_age".to_string()]);
        assert_eq!(tag.indexes, vec!["by_age".to_string(), String::new()]);

        assert!(FieldTag::parse("index(bad group)").is_err());
        assert!(FieldTag::parse("unique(").is_err());
    }

    #[test]
    fn tag_types() {
        let tag = FieldTag::parse("varchar(25) not null").unwrap();
        assert_eq!(
            tag.sql_type,
            Some(SqlType {
                name: "VARCHAR".into(),
                arguments: vec![25],
            })
        );
        assert_eq!(tag.sql_type.unwrap().to_string(), "VARCHAR(25)");

        let tag = FieldTag::parse("Decimal(10, 2)").unwrap();
        assert_eq!(tag.sql_type.unwrap().to_string(), "DECIMAL(10,2)");

        let tag = FieldTag::parse("TEXT").unwrap();
        assert_eq!(tag.sql_type.unwrap().to_string(), "TEXT");

        assert!(FieldTag::parse("varchar(x)").is_err());
        assert!(FieldTag::parse("int bigint").is_err());
    }

    #[test]
    fn tag_column_name() {
        let tag = FieldTag::parse("'user name' pk").unwrap();
        assert_eq!(tag.column.as_deref(), Some("user name"));
        assert!(tag.primary_key);

        let tag = FieldTag::parse("'it''s'").unwrap();
        assert_eq!(tag.column.as_deref(), Some("it's"));

        let tag = FieldTag::parse("login unique").unwrap();
        assert_eq!(tag.column.as_deref(), Some("login"));

        assert!(FieldTag::parse("one two").is_err());
        assert!(FieldTag::parse("'unterminated").is_err());
        assert!(FieldTag::parse("#bad").is_err());
    }

    #[test]
    fn tag_default() {
        let tag = FieldTag::parse("default 0 not null").unwrap();
        assert_eq!(tag.default.as_deref(), Some("0"));
        assert_eq!(tag.not_null, Some(true));

        let tag = FieldTag::parse("default 'none'").unwrap();
        assert_eq!(tag.default.as_deref(), Some("'none'"));

        assert!(FieldTag::parse("default").is_err());
    }
}
