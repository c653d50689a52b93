use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use quote::quote;
use syn::{parse_macro_input, FnArg, ImplItem, ItemImpl, ReturnType};

use crate::crate_path::rce_core_path;

pub fn expand(input: TokenStream) -> TokenStream {
    let item_impl = parse_macro_input!(input as ItemImpl);
    match generate(&item_impl) {
        Ok(generated) => {
            let output = quote! {
                #item_impl
                #generated
            };
            output.into()
        }
        Err(err) => err.to_compile_error().into(),
    }
}

struct Method<'a> {
    name: String,
    ident: &'a syn::Ident,
    args: Vec<&'a syn::Type>,
    returns_unit: bool,
}

struct Setter<'a> {
    property: String,
    ident: &'a syn::Ident,
    ty: &'a syn::Type,
}

/// Scans a `&self` inherent impl block and generates a [`Dispatcher`] whose
/// dispatch table is resolved at macro-expansion time — one entry per
/// `pub fn(&self, ...)` method, plus bean-convention property accessors
/// (`foo(&self) -> T` as getter, `set_foo(&mut self, T)` as setter).
fn generate(item_impl: &ItemImpl) -> syn::Result<TokenStream2> {
    let self_ty = &item_impl.self_ty;
    let type_name = quote!(#self_ty).to_string();

    let mut methods = Vec::new();
    let mut setters = Vec::new();

    for item in &item_impl.items {
        let method = match item {
            ImplItem::Fn(m) => m,
            _ => continue,
        };
        if !matches!(method.vis, syn::Visibility::Public(_)) {
            continue;
        }

        let mut inputs = method.sig.inputs.iter();
        let receiver = match inputs.next() {
            Some(FnArg::Receiver(recv)) => recv,
            _ => {
                return Err(syn::Error::new_spanned(
                    &method.sig,
                    "#[derive_dispatch] only supports methods taking &self or &mut self",
                ))
            }
        };

        let args: Vec<&syn::Type> = inputs
            .filter_map(|arg| match arg {
                FnArg::Typed(pat_type) => Some(pat_type.ty.as_ref()),
                FnArg::Receiver(_) => None,
            })
            .collect();

        let name = method.sig.ident.to_string();

        if receiver.mutability.is_some() {
            if let Some(property) = name.strip_prefix("set_") {
                if args.len() == 1 {
                    setters.push(Setter { property: property.to_string(), ident: &method.sig.ident, ty: args[0] });
                }
            }
            continue;
        }

        let returns_unit = matches!(method.sig.output, ReturnType::Default);
        methods.push(Method { name, ident: &method.sig.ident, args, returns_unit });
    }

    if methods.is_empty() && setters.is_empty() {
        return Err(syn::Error::new_spanned(
            self_ty,
            "#[derive_dispatch] found no public &self/&mut self methods to dispatch to",
        ));
    }

    let krate = rce_core_path();
    let dispatcher_ident = syn::Ident::new(
        &format!("__{}Dispatcher", type_name.replace([':', ' ', '<', '>'], "")),
        proc_macro2::Span::call_site(),
    );

    let method_names: Vec<&str> = methods.iter().map(|m| m.name.as_str()).collect();

    let invoke_arms = methods.iter().map(|m| {
        let name = &m.name;
        let ident = m.ident;
        let arg_idents: Vec<_> = (0..m.args.len())
            .map(|i| syn::Ident::new(&format!("__a{}", i), proc_macro2::Span::call_site()))
            .collect();
        let downcasts = m.args.iter().zip(arg_idents.iter()).map(|(ty, ident)| {
            quote! {
                let #ident: #ty = *args_iter
                    .next()
                    .ok_or_else(|| #krate::dispatch::no_such_method(#type_name, #name))?
                    .downcast::<#ty>()
                    .map_err(|_| #krate::dispatch::no_such_method(#type_name, #name))?;
            }
        });

        let call = quote! { target.#ident(#(#arg_idents),*) };
        let wrap = if m.returns_unit {
            quote! { #call; Ok(Box::new(()) as Box<dyn std::any::Any + Send>) }
        } else {
            quote! { Ok(Box::new(#call) as Box<dyn std::any::Any + Send>) }
        };

        quote! {
            #name => {
                let target = target
                    .downcast_ref::<#self_ty>()
                    .ok_or_else(|| #krate::dispatch::no_such_method(#type_name, #name))?;
                let mut args_iter = args.into_iter();
                #(#downcasts)*
                #wrap
            }
        }
    });

    let getter_arms = methods.iter().filter(|m| m.args.is_empty() && !m.returns_unit).map(|m| {
        let name = &m.name;
        let ident = m.ident;
        quote! {
            #name => {
                let target = target
                    .downcast_ref::<#self_ty>()
                    .ok_or_else(|| #krate::dispatch::no_such_property(#type_name, #name))?;
                Ok(Box::new(target.#ident()) as Box<dyn std::any::Any>)
            }
        }
    });

    let setter_arms = setters.iter().map(|s| {
        let property = &s.property;
        let ident = s.ident;
        let ty = s.ty;
        quote! {
            #property => {
                let target = target
                    .downcast_mut::<#self_ty>()
                    .ok_or_else(|| #krate::dispatch::no_such_property(#type_name, #property))?;
                let value = *value
                    .downcast::<#ty>()
                    .map_err(|_| #krate::dispatch::no_such_property(#type_name, #property))?;
                target.#ident(value);
                Ok(())
            }
        }
    });

    Ok(quote! {
        #[doc(hidden)]
        struct #dispatcher_ident;

        impl #krate::dispatch::Dispatcher for #dispatcher_ident {
            fn declared_methods(&self) -> &'static [&'static str] {
                &[#(#method_names),*]
            }

            fn all_methods(&self) -> &'static [&'static str] {
                &[#(#method_names),*]
            }

            fn get_property(&self, target: &dyn std::any::Any, name: &str) -> Result<Box<dyn std::any::Any>, #krate::CoreError> {
                match name {
                    #(#getter_arms,)*
                    other => Err(#krate::dispatch::no_such_property(#type_name, other)),
                }
            }

            fn set_property(&self, target: &mut dyn std::any::Any, name: &str, value: Box<dyn std::any::Any>) -> Result<(), #krate::CoreError> {
                match name {
                    #(#setter_arms,)*
                    other => Err(#krate::dispatch::no_such_property(#type_name, other)),
                }
            }

            fn invoke_method(
                &self,
                target: &dyn std::any::Any,
                name: &str,
                args: Vec<Box<dyn std::any::Any + Send>>,
            ) -> Result<Box<dyn std::any::Any + Send>, #krate::CoreError> {
                match name {
                    #(#invoke_arms,)*
                    other => Err(#krate::dispatch::no_such_method(#type_name, other)),
                }
            }
        }

        impl #krate::dispatch::Dispatched for #self_ty {
            fn dispatcher() -> std::sync::Arc<dyn #krate::dispatch::Dispatcher> {
                std::sync::Arc::new(#dispatcher_ident)
            }
        }
    })
}
