use crate::{Result, Value};

/// Static description of a mapped struct, generated by `#[derive(Entity)]`.
///
/// It only carries what the compiler knows (names, types, raw annotations). The
/// [`Reflector`](crate::Reflector) turns it into a [`TableDescriptor`](crate::TableDescriptor)
/// the first time the type is used.
#[derive(Debug)]
pub struct Declaration {
    /// Rust type name, mapped to the table name unless `table` is set.
    pub name: &'static str,
    /// Explicit table name from `#[keel(table = "...")]`, empty otherwise.
    pub table: &'static str,
    pub fields: &'static [FieldDeclaration],
}

#[derive(Debug)]
pub struct FieldDeclaration {
    pub name: &'static str,
    /// Raw annotation from `#[keel("...")]`.
    pub tag: &'static str,
    pub kind: FieldKind,
}

#[derive(Debug)]
pub enum FieldKind {
    /// A value stored in one column.
    Scalar {
        prototype: fn() -> Value,
        /// The Rust type is an `Option`.
        optional: bool,
    },
    /// Marked `-`, occupies a slot but is never persisted.
    Skip,
    /// Columns of the embedded entity spliced in place.
    Extends(fn() -> &'static Declaration),
    /// Another entity referenced through its primary key.
    Cascade(fn() -> &'static Declaration),
}

/// A struct mapped to a table.
///
/// Implemented by `#[derive(Entity)]`. Field values travel as slots: one slot per declared
/// field in declaration order, with `extends` fields expanded in place. Skipped fields and
/// cascade fields still take their slot, the session fills cascade slots from the associated
/// entities.
pub trait Entity: Send + Sync {
    fn declaration() -> &'static Declaration
    where
        Self: Sized;

    /// Same as [`Entity::declaration`], callable on trait objects.
    fn declaration_of(&self) -> &'static Declaration;

    /// Append one value per slot.
    fn write_fields(&self, out: &mut Vec<Value>);

    /// Consume one item per slot, `None` leaves the field untouched.
    fn read_fields(&mut self, values: &mut dyn Iterator<Item = Option<Value>>) -> Result<()>;

    /// Associated entities, in the order of the cascade fields.
    fn associations(&self) -> Vec<&dyn Entity>;

    fn associations_mut(&mut self) -> Vec<&mut dyn Entity>;
}
