extern crate proc_macro;

macro_rules! bail {
    ($item:expr, $fmt:literal $($tts:tt)*) => {
        return Err(Error::new_spanned(
            &$item,
            format!(concat!("tagstore: ", $fmt) $($tts)*)
        ))
    }
}

mod entity;
mod utils;

use proc_macro::TokenStream;
use quote::quote;
use syn::{Error, Result};

/// Map a struct with named fields onto an entity type.
///
/// Every field becomes a property of the same name. Field types must convert
/// into a `tagstore::Value` and back.
///
/// ```ignore
/// #[derive(Entity)]
/// #[entity(name = "article")]
/// struct Article {
///     title: String,
///     #[entity(rename = "by")]
///     author: Option<EntityRef>,
/// }
///
/// #[derive(Entity)]
/// #[entity(singleton)]
/// struct Settings {
///     theme: String,
/// }
/// ```
///
/// Without an explicit `name`, the type name converted to snake case is used.
/// With `singleton`, the type uses a single fixed key instead of generated
/// ones.
#[proc_macro_derive(Entity, attributes(entity))]
pub fn entity(stream: TokenStream) -> TokenStream {
    let item = syn::parse_macro_input!(stream as syn::DeriveInput);
    entity::expand(&item)
        .unwrap_or_else(|err| err.to_compile_error())
        .into()
}
