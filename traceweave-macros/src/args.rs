// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Argument checks for the marker attributes.

use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use syn::{
    parse::{Parse, ParseStream, Parser},
    punctuated::Punctuated,
    Error, LitStr, Path, Token,
};

/// Arguments of `#[traced(..)]`.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct TracedArgs {
    pub skip: bool,
    pub name: Option<String>,
}

enum TracedArg {
    Skip,
    Name(LitStr),
}

impl Parse for TracedArg {
    fn parse(input: ParseStream) -> syn::Result<Self> {
        let key: syn::Ident = input.parse()?;
        match key.to_string().as_str() {
            "skip" => Ok(Self::Skip),
            "name" => {
                input.parse::<Token![=]>()?;
                Ok(Self::Name(input.parse()?))
            }
            other => Err(Error::new(
                key.span(),
                format!("unknown traced argument `{other}`, expected `skip` or `name = \"..\"`"),
            )),
        }
    }
}

pub fn parse_traced(attr: TokenStream2) -> syn::Result<TracedArgs> {
    let list = Punctuated::<TracedArg, Token![,]>::parse_terminated.parse2(attr)?;
    let mut args = TracedArgs::default();
    for arg in list {
        match arg {
            TracedArg::Skip => args.skip = true,
            TracedArg::Name(name) if args.name.is_some() => {
                return Err(Error::new(name.span(), "duplicate `name` argument"));
            }
            TracedArg::Name(name) => args.name = Some(name.value()),
        }
    }
    Ok(args)
}

/// The decorated trait path of `#[decorates(..)]`.
pub fn parse_decorates(attr: TokenStream2) -> syn::Result<Path> {
    if attr.is_empty() {
        return Err(Error::new(
            proc_macro2::Span::call_site(),
            "decorates requires the decorated trait, e.g. #[decorates(Orders)]",
        ));
    }
    Path::parse_mod_style.parse2(attr)
}

/// The item unchanged, or the argument error in its place.
pub fn passthrough<T>(args: syn::Result<T>, item: TokenStream) -> TokenStream {
    match args {
        Ok(_) => item,
        Err(err) => {
            let mut out: TokenStream = err.to_compile_error().into();
            out.extend(item);
            out
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quote::quote;

    #[test]
    fn test_traced_arguments() {
        assert_eq!(parse_traced(quote!()).unwrap(), TracedArgs::default());
        assert!(parse_traced(quote!(skip)).unwrap().skip);
        assert_eq!(
            parse_traced(quote!(name = "Shop")).unwrap(),
            TracedArgs {
                skip: false,
                name: Some("Shop".to_string())
            }
        );
        assert!(parse_traced(quote!(skip, name = "Shop",)).unwrap().skip);
    }

    #[test]
    fn test_traced_rejects_unknown_arguments() {
        let err = parse_traced(quote!(level = "debug")).unwrap_err();
        assert!(err.to_string().contains("unknown traced argument `level`"));
        assert!(parse_traced(quote!(name = "a", name = "b")).is_err());
        assert!(parse_traced(quote!(name)).is_err());
    }

    #[test]
    fn test_decorates_takes_a_trait_path() {
        let path = parse_decorates(quote!(crate::shop::Orders)).unwrap();
        assert_eq!(path.segments.len(), 3);
        assert!(parse_decorates(quote!()).is_err());
        assert!(parse_decorates(quote!("Orders")).is_err());
    }
}
