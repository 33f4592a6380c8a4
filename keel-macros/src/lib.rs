mod decode_field;
mod scalar;
mod table_name;

use decode_field::{Kind, decode_field};
use proc_macro::TokenStream;
use quote::quote;
use scalar::derive_scalar_impl;
use syn::{Fields, ItemStruct, parse_macro_input};
use table_name::table_name;

/// Implements `keel::Entity` for a struct with named fields.
///
/// ```ignore
/// #[derive(Entity, Default)]
/// #[keel(table = "users")]
/// struct User {
///     #[keel("pk autoincr")]
///     id: i64,
///     #[keel("varchar(40) unique not null")]
///     login: String,
///     #[keel("extends")]
///     audit: Audit,
///     #[keel("cascade")]
///     team: Team,
/// }
/// ```
///
/// Every field type must be `Clone` and convertible through `keel::AsValue`, except `extends`
/// and `cascade` fields (entities) and `-` fields (`Default`, never persisted).
#[proc_macro_derive(Entity, attributes(keel))]
pub fn derive_entity(input: TokenStream) -> TokenStream {
    let item: ItemStruct = parse_macro_input!(input as ItemStruct);
    let name = &item.ident;
    if !item.generics.params.is_empty() {
        panic!("Entity `{name}` cannot be generic");
    }
    if !matches!(item.fields, Fields::Named(..)) {
        panic!("Entity `{name}` must have named fields");
    }
    let type_name = name.to_string();
    let table = table_name(&item);
    let fields: Vec<_> = item.fields.iter().map(decode_field).collect();

    let declarations = fields.iter().map(|f| {
        let field = f.ident.to_string();
        let tag = &f.tag;
        let ty = &f.ty;
        let kind = match f.kind {
            Kind::Scalar { optional } => quote! {
                ::keel::FieldKind::Scalar {
                    prototype: <#ty as ::keel::AsValue>::as_empty_value,
                    optional: #optional,
                }
            },
            Kind::Skip => quote!(::keel::FieldKind::Skip),
            Kind::Extends => {
                quote!(::keel::FieldKind::Extends(<#ty as ::keel::Entity>::declaration))
            }
            Kind::Cascade => {
                quote!(::keel::FieldKind::Cascade(<#ty as ::keel::Entity>::declaration))
            }
        };
        quote! {
            ::keel::FieldDeclaration {
                name: #field,
                tag: #tag,
                kind: #kind,
            }
        }
    });

    let write_fields = fields.iter().map(|f| {
        let ident = &f.ident;
        match f.kind {
            Kind::Scalar { .. } => quote! {
                out.push(::keel::AsValue::as_value(::std::clone::Clone::clone(&self.#ident)));
            },
            Kind::Extends => quote! {
                ::keel::Entity::write_fields(&self.#ident, out);
            },
            Kind::Skip | Kind::Cascade => quote! {
                out.push(::keel::Value::Null);
            },
        }
    });

    let read_fields = fields.iter().map(|f| {
        let ident = &f.ident;
        let field = ident.to_string();
        match f.kind {
            Kind::Scalar { .. } => quote! {
                if let Some(Some(value)) = values.next() {
                    self.#ident = ::keel::AsValue::try_from_value(value).map_err(|e| {
                        ::keel::MappingError::type_mismatch(#field, format!("{e:#}"))
                    })?;
                }
            },
            Kind::Extends => quote! {
                ::keel::Entity::read_fields(&mut self.#ident, values)?;
            },
            Kind::Skip | Kind::Cascade => quote! {
                values.next();
            },
        }
    });

    let cascades: Vec<_> = fields
        .iter()
        .filter(|f| f.kind == Kind::Cascade)
        .map(|f| &f.ident)
        .collect();

    quote! {
        impl ::keel::Entity for #name {
            fn declaration() -> &'static ::keel::Declaration {
                static DECLARATION: ::keel::Declaration = ::keel::Declaration {
                    name: #type_name,
                    table: #table,
                    fields: &[#(#declarations),*],
                };
                &DECLARATION
            }

            fn declaration_of(&self) -> &'static ::keel::Declaration {
                <Self as ::keel::Entity>::declaration()
            }

            fn write_fields(&self, out: &mut Vec<::keel::Value>) {
                #(#write_fields)*
            }

            fn read_fields(
                &mut self,
                values: &mut dyn Iterator<Item = Option<::keel::Value>>,
            ) -> ::keel::Result<()> {
                #(#read_fields)*
                Ok(())
            }

            fn associations(&self) -> Vec<&dyn ::keel::Entity> {
                vec![#(&self.#cascades as &dyn ::keel::Entity),*]
            }

            fn associations_mut(&mut self) -> Vec<&mut dyn ::keel::Entity> {
                vec![#(&mut self.#cascades as &mut dyn ::keel::Entity),*]
            }
        }
    }
    .into()
}

/// Implements `keel::AsValue` for a newtype by delegating to the wrapped type, so the
/// newtype is stored like its inner value.
///
/// ```ignore
/// #[derive(Scalar, Clone, Default)]
/// struct Email(String);
/// ```
#[proc_macro_derive(Scalar)]
pub fn derive_scalar(input: TokenStream) -> TokenStream {
    let item: ItemStruct = parse_macro_input!(input as ItemStruct);
    derive_scalar_impl(&item).into()
}
