use syn::ext::IdentExt;
use syn::parse::{Parse, ParseStream};

use super::*;
use crate::utils::{parse_flag, parse_key_value, snake_case};

mod kw {
    syn::custom_keyword!(name);
    syn::custom_keyword!(singleton);
    syn::custom_keyword!(rename);
}

/// Derive the `Entity` trait for a struct.
pub fn expand(item: &syn::DeriveInput) -> Result<proc_macro2::TokenStream> {
    let syn::Data::Struct(data) = &item.data else {
        bail!(item, "only structs can be entities");
    };

    let syn::Fields::Named(named) = &data.fields else {
        bail!(item, "entities must have named fields");
    };

    if let Some(param) = item.generics.params.first() {
        bail!(param, "entities cannot be generic");
    }

    let mut meta = TypeMeta::default();
    for attr in &item.attrs {
        if attr.path().is_ident("entity") {
            meta = attr.parse_args()?;
        }
    }

    let ty = &item.ident;
    let name = match meta.name {
        Some(lit) => lit.value(),
        None => snake_case(&ty.unraw().to_string()),
    };

    let key = if meta.singleton {
        quote! { ::tagstore::KeyStrategy::Singleton }
    } else {
        quote! { ::tagstore::KeyStrategy::Generated }
    };

    let fields = named.named.iter().map(prepare_field).collect::<Result<Vec<_>>>()?;
    let inserts = fields.iter().map(|Field { ident, key }| {
        quote! {
            properties.insert(
                ::std::string::String::from(#key),
                ::tagstore::Value::from(self.#ident),
            );
        }
    });
    let reads = fields.iter().map(|Field { ident, key }| {
        quote! { #ident: ::tagstore::internal::field(properties, #name, #key)? }
    });

    Ok(quote! {
        impl ::tagstore::Entity for #ty {
            const NAME: &'static str = #name;
            const KEY: ::tagstore::KeyStrategy = #key;

            #[allow(unused_mut)]
            fn into_properties(self) -> ::tagstore::Properties {
                let mut properties = ::tagstore::Properties::new();
                #(#inserts)*
                properties
            }

            #[allow(unused_variables)]
            fn from_properties(
                properties: &::tagstore::Properties,
            ) -> ::tagstore::Result<Self> {
                ::std::result::Result::Ok(Self { #(#reads,)* })
            }
        }
    })
}

/// Type-level `#[entity(..)]` options.
#[derive(Default)]
struct TypeMeta {
    name: Option<syn::LitStr>,
    singleton: bool,
}

impl Parse for TypeMeta {
    fn parse(input: ParseStream) -> Result<Self> {
        let mut meta = Self::default();
        while !input.is_empty() {
            if let Some(name) = parse_key_value::<kw::name, syn::LitStr>(input)? {
                meta.name = Some(name);
            } else if parse_flag::<kw::singleton>(input)? {
                meta.singleton = true;
            } else {
                return Err(input.error("expected `name = \"..\"` or `singleton`"));
            }
        }
        Ok(meta)
    }
}

/// Field-level `#[entity(..)]` options.
#[derive(Default)]
struct FieldMeta {
    rename: Option<syn::LitStr>,
}

impl Parse for FieldMeta {
    fn parse(input: ParseStream) -> Result<Self> {
        let mut meta = Self::default();
        while !input.is_empty() {
            match parse_key_value::<kw::rename, syn::LitStr>(input)? {
                Some(rename) => meta.rename = Some(rename),
                None => return Err(input.error("expected `rename = \"..\"`")),
            }
        }
        Ok(meta)
    }
}

/// A field that maps onto a property.
struct Field {
    ident: syn::Ident,
    key: String,
}

/// Preprocess and validate a field.
fn prepare_field(field: &syn::Field) -> Result<Field> {
    let Some(ident) = field.ident.clone() else {
        bail!(field, "entity fields must be named");
    };

    let mut meta = FieldMeta::default();
    for attr in &field.attrs {
        if attr.path().is_ident("entity") {
            meta = attr.parse_args()?;
        }
    }

    let key = match meta.rename {
        Some(lit) => lit.value(),
        None => ident.unraw().to_string(),
    };

    if key.is_empty() {
        bail!(field, "property names cannot be empty");
    }

    Ok(Field { ident, key })
}
