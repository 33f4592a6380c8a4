use proc_macro2::TokenStream;
use quote::quote;
use syn::{Fields, ItemStruct};

pub(crate) fn derive_scalar_impl(item: &ItemStruct) -> TokenStream {
    let name = &item.ident;
    let (impl_generics, ty_generics, where_clause) = item.generics.split_for_impl();
    let mut fields = item.fields.iter();
    let (Some(field), None) = (fields.next(), fields.next()) else {
        panic!("Scalar `{name}` must have exactly one field");
    };
    let inner = &field.ty;
    let (access, build) = match &item.fields {
        Fields::Named(..) => {
            let ident = &field.ident;
            (quote!(self.#ident), quote!(|v| Self { #ident: v }))
        }
        _ => (quote!(self.0), quote!(Self)),
    };
    quote! {
        impl #impl_generics ::keel::AsValue for #name #ty_generics #where_clause {
            fn as_empty_value() -> ::keel::Value {
                <#inner as ::keel::AsValue>::as_empty_value()
            }

            fn as_value(self) -> ::keel::Value {
                ::keel::AsValue::as_value(#access)
            }

            fn try_from_value(value: ::keel::Value) -> ::keel::Result<Self> {
                <#inner as ::keel::AsValue>::try_from_value(value).map(#build)
            }

            fn extract(input: &mut &str) -> ::keel::Result<Self> {
                <#inner as ::keel::AsValue>::extract(input).map(#build)
            }
        }
    }
}
