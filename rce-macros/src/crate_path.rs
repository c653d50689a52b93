//! Crate path resolution for generated code.
//!
//! Detects whether the user depends on `rce` (facade) or `rce-core` directly,
//! and returns the appropriate path prefix for generated code.

use proc_macro2::TokenStream;
use proc_macro_crate::{crate_name, FoundCrate};
use quote::quote;

/// Returns the token stream for accessing `rce_core` types.
///
/// If the user depends on `rce`, returns `::rce`.
/// Otherwise returns `::rce_core`.
pub fn rce_core_path() -> TokenStream {
    if let Ok(found) = crate_name("rce") {
        match found {
            FoundCrate::Itself => quote!(crate),
            FoundCrate::Name(name) => {
                let ident = syn::Ident::new(&name, proc_macro2::Span::call_site());
                quote!(::#ident)
            }
        }
    } else if let Ok(found) = crate_name("rce-core") {
        match found {
            FoundCrate::Itself => quote!(crate),
            FoundCrate::Name(name) => {
                let ident = syn::Ident::new(&name, proc_macro2::Span::call_site());
                quote!(::#ident)
            }
        }
    } else {
        // Fallback - assume rce_core is available (for error messages)
        quote!(::rce_core)
    }
}

/// Returns the token stream for accessing `rce_rpc` types.
///
/// If the user depends on `rce`, returns `::rce::rce_rpc`.
/// Otherwise returns `::rce_rpc`.
pub fn rce_rpc_path() -> TokenStream {
    if let Ok(found) = crate_name("rce") {
        match found {
            FoundCrate::Itself => quote!(crate::rce_rpc),
            FoundCrate::Name(name) => {
                let ident = syn::Ident::new(&name, proc_macro2::Span::call_site());
                quote!(::#ident::rce_rpc)
            }
        }
    } else if let Ok(found) = crate_name("rce-rpc") {
        match found {
            FoundCrate::Itself => quote!(crate),
            FoundCrate::Name(name) => {
                let ident = syn::Ident::new(&name, proc_macro2::Span::call_site());
                quote!(::#ident)
            }
        }
    } else {
        quote!(::rce_rpc)
    }
}
