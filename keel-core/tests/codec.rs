#[cfg(test)]
mod tests {
    use keel_core::{AsValue, Codec, ColumnDescriptor, MappingError, Value, write_compound};
    use std::collections::BTreeMap;
    use time::macros::{date, datetime};

    fn column(prototype: Value, optional: bool) -> ColumnDescriptor {
        ColumnDescriptor {
            field: "field",
            name: "field".into(),
            slot: 0,
            prototype,
            sql_type: None,
            optional,
            nullable: optional,
            default: None,
            primary_key: false,
            auto_increment: false,
            unique: false,
            indexed: false,
            version: false,
            created: false,
            updated: false,
            association: None,
        }
    }

    fn roundtrip<T: AsValue + Clone>(codec: Codec, value: T) -> T {
        let column = column(T::as_empty_value(), false);
        let encoded = codec.encode(&column, value.as_value()).unwrap();
        let decoded = codec.decode(&column, encoded).unwrap();
        T::try_from_value(decoded).unwrap()
    }

    #[test]
    fn codec_bool() {
        let codec = Codec::default();
        let column = column(Value::Boolean(None), false);
        assert_eq!(
            codec.encode(&column, Value::Boolean(Some(true))).unwrap(),
            Value::Int32(Some(1))
        );
        assert_eq!(
            codec.encode(&column, Value::Boolean(Some(false))).unwrap(),
            Value::Int32(Some(0))
        );
        assert!(roundtrip(codec, true));
        assert!(!roundtrip(codec, false));

        let native = Codec::new(true);
        assert_eq!(
            native.encode(&column, Value::Boolean(Some(true))).unwrap(),
            Value::Boolean(Some(true))
        );
        let decoded = codec
            .decode(&column, Value::Varchar(Some("true".into())))
            .unwrap();
        assert!(bool::try_from_value(decoded).unwrap());
    }

    #[test]
    fn codec_compound() {
        let codec = Codec::default();
        let list = column(Vec::<i32>::as_empty_value(), false);
        assert_eq!(
            codec.encode(&list, vec![1, 2].as_value()).unwrap(),
            Value::Varchar(Some("[1,2]".into()))
        );
        assert_eq!(
            codec.encode(&list, Vec::<i32>::new().as_value()).unwrap(),
            Value::Varchar(Some("[]".into()))
        );
        assert_eq!(roundtrip(codec, vec![3, 4, 5]), vec![3, 4, 5]);
        assert_eq!(
            roundtrip(codec, vec!["a'b".to_string(), "c".into()]),
            vec!["a'b".to_string(), "c".into()]
        );

        let mut map = BTreeMap::new();
        map.insert("k".to_string(), "v".to_string());
        map.insert("x".to_string(), String::new());
        let mut out = String::new();
        write_compound(&mut out, &map.clone().as_value()).unwrap();
        assert_eq!(out, "{'k':'v','x':''}");
        assert_eq!(roundtrip(codec, map.clone()), map);

        let decoded = codec.decode(&list, Value::Varchar(Some(String::new()))).unwrap();
        assert_eq!(Vec::<i32>::try_from_value(decoded).unwrap(), Vec::<i32>::new());
    }

    #[test]
    fn codec_bytes() {
        let codec = Codec::default();
        let bytes = column(Vec::<u8>::as_empty_value(), false);
        assert_eq!(
            codec.encode(&bytes, vec![1_u8, 2, 255].as_value()).unwrap(),
            Value::Blob(Some(Box::new([1, 2, 255])))
        );
        assert_eq!(roundtrip(codec, vec![0_u8, 7, 9]), vec![0, 7, 9]);
        let error = codec
            .decode(&bytes, Value::Varchar(Some("0102".into())))
            .unwrap_err();
        assert!(matches!(
            MappingError::of(&error),
            Some(MappingError::TypeMismatch { .. })
        ));
    }

    #[test]
    fn codec_temporal() {
        let codec = Codec::default();
        assert_eq!(
            roundtrip(codec, datetime!(2025-06-01 12:30:00)),
            datetime!(2025-06-01 12:30:00)
        );
        let date = column(Value::Date(None), false);
        let decoded = codec
            .decode(&date, Value::Varchar(Some("2020-02-29".into())))
            .unwrap();
        assert_eq!(time::Date::try_from_value(decoded).unwrap(), date!(2020 - 02 - 29));
    }

    #[test]
    fn codec_null() {
        let codec = Codec::default();
        let text = column(Value::Varchar(None), false);
        assert_eq!(
            codec.decode(&text, Value::Null).unwrap(),
            Value::Varchar(Some(String::new()))
        );
        let number = column(Value::Int64(None), true);
        assert_eq!(codec.decode(&number, Value::Null).unwrap(), Value::Null);
        let number = column(Value::Int64(None), false);
        assert_eq!(codec.decode(&number, Value::Null).unwrap(), Value::Int64(Some(0)));
        let list = column(Vec::<String>::as_empty_value(), false);
        assert_eq!(
            Vec::<String>::try_from_value(codec.decode(&list, Value::Null).unwrap()).unwrap(),
            Vec::<String>::new()
        );
        let timestamp = column(Value::Timestamp(None), false);
        let error = codec.decode(&timestamp, Value::Null).unwrap_err();
        assert!(matches!(
            MappingError::of(&error),
            Some(MappingError::TypeMismatch { .. })
        ));
        let timestamp = column(Value::Timestamp(None), true);
        assert_eq!(codec.decode(&timestamp, Value::Null).unwrap(), Value::Null);
    }
}
