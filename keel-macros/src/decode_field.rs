use keel_core::FieldTag;
use syn::{Field, Ident, LitStr, Type};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Kind {
    Scalar { optional: bool },
    Skip,
    Extends,
    Cascade,
}

pub(crate) struct FieldMetadata {
    pub(crate) ident: Ident,
    pub(crate) ty: Type,
    pub(crate) tag: String,
    pub(crate) kind: Kind,
}

/// `Option<T>`, written with any path to `Option`.
fn is_option(ty: &Type) -> bool {
    let Type::Path(path) = ty else {
        return false;
    };
    path.qself.is_none()
        && path
            .path
            .segments
            .last()
            .is_some_and(|v| v.ident == "Option")
}

pub(crate) fn decode_field(field: &Field) -> FieldMetadata {
    let ident = field
        .ident
        .clone()
        .expect("Entity fields are expected to have a name");
    let mut tag = String::new();
    for attr in field.attrs.iter().filter(|v| v.path().is_ident("keel")) {
        let Ok(v) = attr.meta.require_list().and_then(|v| v.parse_args::<LitStr>()) else {
            panic!(
                "Error while parsing `keel` on field `{ident}`, use it like #[keel(\"pk autoincr\")]"
            );
        };
        if !tag.is_empty() {
            tag.push(' ');
        }
        tag.push_str(&v.value());
    }
    // Malformed annotations stay scalars, the reflector reports them with the type name.
    let kind = match FieldTag::parse(&tag) {
        Ok(parsed) if parsed.skip => Kind::Skip,
        Ok(parsed) if parsed.extends => Kind::Extends,
        Ok(parsed) if parsed.cascade => Kind::Cascade,
        _ => Kind::Scalar {
            optional: is_option(&field.ty),
        },
    };
    FieldMetadata {
        ident,
        ty: field.ty.clone(),
        tag,
        kind,
    }
}
