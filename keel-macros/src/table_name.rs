use syn::{ItemStruct, LitStr};

/// Explicit table name from `#[keel(table = "...")]`, empty when the name mapper decides.
pub(crate) fn table_name(item: &ItemStruct) -> String {
    let mut result = String::new();
    for attr in item.attrs.iter().filter(|v| v.path().is_ident("keel")) {
        let parsed = attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("table") {
                result = meta.value()?.parse::<LitStr>()?.value();
                Ok(())
            } else {
                Err(meta.error("unsupported keel attribute"))
            }
        });
        if let Err(e) = parsed {
            panic!(
                "Error while parsing `keel` on `{}`: {e}, use it like #[keel(table = \"{}_table\")]",
                item.ident, item.ident
            );
        }
    }
    result
}
