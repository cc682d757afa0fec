//! Derive macro for error types.
//!
//! Generates `std::fmt::Display` and `std::error::Error` implementations
//! for enums. Replacement for the `thiserror` crate.
//!
//! # Usage
//!
//! ```ignore
//! use ls8_derive::Error;
//!
//! #[derive(Debug, Error)]
//! pub enum MyError {
//!     #[error("not found: {0}")]
//!     NotFound(String),
//!
//!     #[error("invalid value: expected {expected}, got {actual}")]
//!     InvalidValue { expected: u32, actual: u32 },
//!
//!     #[error("unknown error")]
//!     Unknown,
//! }
//! ```
//!
//! Every variant must carry an `#[error("...")]` attribute. Tuple fields
//! interpolate positionally (`{0}`, `{1}`); struct fields interpolate by
//! name (`{field}`); format specs like `{opcode:#010b}` pass through.

use proc_macro::TokenStream;
use quote::{format_ident, quote};
use syn::{Data, DeriveInput, Fields, Lit, Meta, parse_macro_input};

/// Derives `Display` and `Error` for an enum.
pub fn derive_error(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);

    match expand(&input) {
        Ok(tokens) => TokenStream::from(tokens),
        Err(err) => err.to_compile_error().into(),
    }
}

fn expand(input: &DeriveInput) -> syn::Result<proc_macro2::TokenStream> {
    let name = &input.ident;
    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();

    let Data::Enum(data) = &input.data else {
        return Err(syn::Error::new_spanned(
            input,
            "Error derive only supports enums",
        ));
    };

    let display_arms = data
        .variants
        .iter()
        .map(display_arm)
        .collect::<syn::Result<Vec<_>>>()?;

    Ok(quote! {
        impl #impl_generics ::std::fmt::Display for #name #ty_generics #where_clause {
            fn fmt(&self, f: &mut ::std::fmt::Formatter<'_>) -> ::std::fmt::Result {
                match self {
                    #(#display_arms)*
                }
            }
        }

        impl #impl_generics ::std::error::Error for #name #ty_generics #where_clause {}
    })
}

/// Builds the `Display` match arm for one variant.
fn display_arm(variant: &syn::Variant) -> syn::Result<proc_macro2::TokenStream> {
    let variant_name = &variant.ident;
    let message = error_message(variant)?;

    let arm = match &variant.fields {
        Fields::Unit => quote! {
            Self::#variant_name => write!(f, #message),
        },
        Fields::Unnamed(fields) => {
            let bindings: Vec<_> = (0..fields.unnamed.len())
                .map(|i| format_ident!("f{}", i))
                .collect();
            let message = positional_to_named(&message, fields.unnamed.len());
            quote! {
                Self::#variant_name(#(#bindings),*) =>
                    write!(f, #message, #(#bindings = #bindings),*),
            }
        }
        Fields::Named(fields) => {
            let bindings: Vec<_> = fields.named.iter().map(|f| &f.ident).collect();
            quote! {
                Self::#variant_name { #(#bindings),* } =>
                    write!(f, #message, #(#bindings = #bindings),*),
            }
        }
    };

    Ok(arm)
}

/// Extracts the string from a variant's `#[error("...")]` attribute.
fn error_message(variant: &syn::Variant) -> syn::Result<String> {
    for attr in &variant.attrs {
        if !attr.path().is_ident("error") {
            continue;
        }

        let Meta::List(meta_list) = &attr.meta else {
            return Err(syn::Error::new_spanned(
                &attr.meta,
                "invalid #[error] attribute; use #[error(\"message\")] to describe the error",
            ));
        };

        let lit = syn::parse2::<Lit>(meta_list.tokens.clone()).map_err(|_| {
            syn::Error::new_spanned(
                &attr.meta,
                "failed to parse #[error] attribute; expected a string literal like #[error(\"unknown opcode {0}\")]",
            )
        })?;

        let Lit::Str(lit_str) = lit else {
            return Err(syn::Error::new_spanned(
                &attr.meta,
                "invalid #[error] attribute: message must be a string literal",
            ));
        };

        return Ok(lit_str.value());
    }

    Err(syn::Error::new_spanned(
        variant,
        format!(
            "missing #[error(\"...\")] attribute on variant `{}`; every error variant must declare a display message",
            variant.ident
        ),
    ))
}

/// Converts positional format args `{0}`, `{1}` to named args `{f0}`, `{f1}`
/// so tuple fields can be bound by identifier in the match arm.
fn positional_to_named(format_str: &str, field_count: usize) -> String {
    let mut result = format_str.to_string();
    for i in (0..field_count).rev() {
        // Handles both `{N}` and `{N:spec}`.
        result = result.replace(&format!("{{{i}}}"), &format!("{{f{i}}}"));
        result = result.replace(&format!("{{{i}:"), &format!("{{f{i}:"));
    }
    result
}
