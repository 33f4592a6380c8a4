#[cfg(test)]
mod tests {
    use keel_core::{NameMapper, SameMapper, SnakeMapper};

    #[test]
    fn same_mapper() {
        let mapper = SameMapper;
        assert_eq!(mapper.table_name("UserInfo"), "UserInfo");
        assert_eq!(mapper.column_name("created_at"), "created_at");
        assert_eq!(mapper.type_name("UserInfo"), "UserInfo");
        assert_eq!(mapper.field_name("Name"), "Name");
    }

    #[test]
    fn snake_mapper() {
        let mapper = SnakeMapper;
        assert_eq!(mapper.table_name("UserInfo"), "user_info");
        assert_eq!(mapper.table_name("Order"), "order");
        assert_eq!(mapper.column_name("first_name"), "first_name");
        assert_eq!(mapper.type_name("user_info"), "UserInfo");
        assert_eq!(mapper.field_name("last_login"), "last_login");
    }

    #[test]
    fn snake_mapper_symmetric() {
        let mapper = SnakeMapper;
        for name in ["UserInfo", "Account", "TradeExecution"] {
            let table = mapper.table_name(name);
            assert_eq!(mapper.table_name(&mapper.type_name(&table)), table);
            assert_eq!(mapper.type_name(&table), name);
        }
        for name in ["id", "created_at", "price_2"] {
            let column = mapper.column_name(name);
            assert_eq!(mapper.column_name(&mapper.field_name(&column)), column);
        }
    }
}
