//! `#[extension_point]` / `#[adaptive]` expansion.
//!
//! Adaptive methods must return `Result<_, CoreError>` — the generated body
//! forwards both `resolve_adaptive_name` and `loader.get` through `?`.

use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use quote::{format_ident, quote};
use syn::parse::Parser;
use syn::{parse_macro_input, FnArg, ItemTrait, Lit, Meta, Pat, PatType, TraitItem, Type};

use crate::crate_path::rce_core_path;

pub fn expand(args: TokenStream, input: TokenStream) -> TokenStream {
    let item_trait = parse_macro_input!(input as ItemTrait);
    let default_name = match parse_default_arg(args.into()) {
        Ok(name) => name,
        Err(err) => return err.to_compile_error().into(),
    };

    match generate(&item_trait, default_name.as_deref()) {
        Ok(generated) => {
            let output = quote! {
                #item_trait
                #generated
            };
            output.into()
        }
        Err(err) => err.to_compile_error().into(),
    }
}

fn parse_default_arg(args: TokenStream2) -> syn::Result<Option<String>> {
    if args.is_empty() {
        return Ok(None);
    }
    let parser = syn::punctuated::Punctuated::<Meta, syn::Token![,]>::parse_terminated;
    let nested = parser.parse2(args)?;
    for meta in nested {
        if let Meta::NameValue(nv) = meta {
            if nv.path.is_ident("default") {
                if let syn::Expr::Lit(expr_lit) = &nv.value {
                    if let Lit::Str(lit_str) = &expr_lit.lit {
                        return Ok(Some(lit_str.value()));
                    }
                }
            }
        }
    }
    Ok(None)
}

/// Split `PascalCase` into lowercase, dot-joined words (`LoadBalance` -> `load.balance`).
fn default_key_for(trait_name: &str) -> String {
    let mut out = String::new();
    for (i, ch) in trait_name.chars().enumerate() {
        if ch.is_uppercase() && i > 0 {
            out.push('.');
        }
        out.extend(ch.to_lowercase());
    }
    out
}

fn is_rce_url_type(ty: &Type) -> bool {
    let (inner, _) = match ty {
        Type::Reference(r) => (r.elem.as_ref(), true),
        other => (other, false),
    };
    if let Type::Path(tp) = inner {
        return tp
            .path
            .segments
            .last()
            .map(|s| s.ident == "RceUrl")
            .unwrap_or(false);
    }
    false
}

struct UrlArg {
    expr: TokenStream2,
}

fn find_url_arg(inputs: &syn::punctuated::Punctuated<FnArg, syn::Token![,]>) -> Option<UrlArg> {
    let mut first_non_url: Option<TokenStream2> = None;

    for arg in inputs {
        if let FnArg::Typed(PatType { pat, ty, .. }) = arg {
            let ident = match pat.as_ref() {
                Pat::Ident(pi) => &pi.ident,
                _ => continue,
            };
            if is_rce_url_type(ty) {
                let expr = match ty.as_ref() {
                    Type::Reference(_) => quote! { #ident },
                    _ => quote! { &#ident },
                };
                return Some(UrlArg { expr });
            }
            if first_non_url.is_none() {
                first_non_url = Some(quote! { #ident.url() });
            }
        }
    }

    first_non_url.map(|expr| UrlArg { expr })
}

fn generate(item_trait: &ItemTrait, default_name: Option<&str>) -> syn::Result<TokenStream2> {
    let trait_ident = &item_trait.ident;
    let adaptive_ident = format_ident!("{}Adaptive", trait_ident);
    let krate = rce_core_path();
    let default_key = default_key_for(&trait_ident.to_string());

    let mut methods = Vec::new();
    let mut adaptive_count = 0usize;

    for item in &item_trait.items {
        let method = match item {
            TraitItem::Fn(m) => m,
            _ => continue,
        };

        let sig = &method.sig;
        let fn_name = &sig.ident;

        let adaptive_attr = method.attrs.iter().find(|a| a.path().is_ident("adaptive"));

        if let Some(attr) = adaptive_attr {
            adaptive_count += 1;
            let keys = parse_adaptive_keys(attr)?;
            let key_lits = keys.iter().map(|k| quote! { #k });

            let url_arg = find_url_arg(&sig.inputs);

            let call_args: Vec<TokenStream2> = sig
                .inputs
                .iter()
                .filter_map(|arg| match arg {
                    FnArg::Typed(PatType { pat, .. }) => match pat.as_ref() {
                        Pat::Ident(pi) => Some(quote! { #pi }),
                        _ => None,
                    },
                    FnArg::Receiver(_) => None,
                })
                .collect();

            let fn_name_str = fn_name.to_string();

            let body = match url_arg {
                Some(UrlArg { expr }) => quote! {
                    let __url = #expr;
                    let __name = #krate::extension::resolve_adaptive_name(
                        __url,
                        #fn_name_str,
                        &[#(#key_lits),*],
                        #default_key,
                        self.__loader.default_name().as_deref(),
                    )?;
                    self.__loader.get(&__name)?.#fn_name(#(#call_args),*)
                },
                None => quote! {
                    return Err(#krate::CoreError::AdaptiveUrlMissing {
                        method: #fn_name_str.to_string(),
                    });
                },
            };

            methods.push(quote! {
                #sig {
                    #body
                }
            });
        } else {
            let fn_name_str = fn_name.to_string();
            methods.push(quote! {
                #sig {
                    Err(#krate::CoreError::NonAdaptiveMethod { method: #fn_name_str.to_string() })
                }
            });
        }
    }

    if adaptive_count == 0 {
        return Err(syn::Error::new_spanned(
            trait_ident,
            "#[extension_point] requires at least one #[adaptive(keys = \"...\")] method",
        ));
    }

    let default_registration = match default_name {
        Some(name) => quote! {
            fn register_default(loader: &#krate::extension::ExtensionLoader<dyn #trait_ident>) {
                loader.register_default(#name);
            }
        },
        None => quote! {},
    };

    Ok(quote! {
        impl #krate::extension::ExtensionPoint for dyn #trait_ident {}

        /// Generated adaptive dispatcher for this extension point.
        ///
        /// Resolves the concrete implementation per call from the URL carried
        /// by each `#[adaptive]` method's arguments.
        pub struct #adaptive_ident {
            __loader: std::sync::Arc<#krate::extension::ExtensionLoader<dyn #trait_ident>>,
        }

        impl #adaptive_ident {
            pub fn new(loader: std::sync::Arc<#krate::extension::ExtensionLoader<dyn #trait_ident>>) -> Self {
                Self { __loader: loader }
            }

            #default_registration
        }

        impl #trait_ident for #adaptive_ident {
            #(#methods)*
        }
    })
}

fn parse_adaptive_keys(attr: &syn::Attribute) -> syn::Result<Vec<String>> {
    let meta = &attr.meta;
    let list = match meta {
        Meta::List(list) => list,
        _ => {
            return Err(syn::Error::new_spanned(
                attr,
                "#[adaptive(keys = \"a,b\")] requires a `keys` argument",
            ))
        }
    };
    let nested: syn::punctuated::Punctuated<Meta, syn::Token![,]> =
        list.parse_args_with(syn::punctuated::Punctuated::parse_terminated)?;
    for meta in nested {
        if let Meta::NameValue(nv) = meta {
            if nv.path.is_ident("keys") {
                if let syn::Expr::Lit(expr_lit) = &nv.value {
                    if let Lit::Str(lit_str) = &expr_lit.lit {
                        return Ok(lit_str
                            .value()
                            .split(',')
                            .map(|s| s.trim().to_string())
                            .filter(|s| !s.is_empty())
                            .collect());
                    }
                }
            }
        }
    }
    Err(syn::Error::new_spanned(
        attr,
        "#[adaptive(keys = \"a,b\")] requires a string-literal `keys` argument",
    ))
}
