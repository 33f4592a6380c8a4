use convert_case::{Case, Casing};

/// Maps Rust identifiers to database identifiers and back.
///
/// The inverse functions are used to match the labels of a raw result set to entity fields.
/// For any identifier `x` produced by a mapper, `column_name(&field_name(x)) == x` and
/// `table_name(&type_name(x)) == x`.
pub trait NameMapper: Send + Sync {
    fn table_name(&self, type_name: &str) -> String;
    fn column_name(&self, field_name: &str) -> String;
    fn type_name(&self, table_name: &str) -> String;
    fn field_name(&self, column_name: &str) -> String;
}

/// Keeps identifiers verbatim.
#[derive(Debug, Default, Clone, Copy)]
pub struct SameMapper;

impl NameMapper for SameMapper {
    fn table_name(&self, type_name: &str) -> String {
        type_name.into()
    }
    fn column_name(&self, field_name: &str) -> String {
        field_name.into()
    }
    fn type_name(&self, table_name: &str) -> String {
        table_name.into()
    }
    fn field_name(&self, column_name: &str) -> String {
        column_name.into()
    }
}

/// `UserInfo` becomes `user_info`, fields are lower snake case both ways.
#[derive(Debug, Default, Clone, Copy)]
pub struct SnakeMapper;

impl NameMapper for SnakeMapper {
    fn table_name(&self, type_name: &str) -> String {
        type_name.to_case(Case::Snake)
    }
    fn column_name(&self, field_name: &str) -> String {
        field_name.from_case(Case::Snake).to_case(Case::Snake)
    }
    fn type_name(&self, table_name: &str) -> String {
        table_name.from_case(Case::Snake).to_case(Case::Pascal)
    }
    fn field_name(&self, column_name: &str) -> String {
        column_name.from_case(Case::Snake).to_case(Case::Snake)
    }
}
