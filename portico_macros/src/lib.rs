//! `#[request_mapping]`: declare a handler's mapping rule next to the
//! handler function.

use proc_macro::TokenStream;
use proc_macro2::Span;
use quote::{format_ident, quote};
use syn::{
    parse_macro_input, punctuated::Punctuated, Expr, ExprLit, Ident, ItemFn, Lit, LitStr,
    MetaNameValue, Result as SynResult, Token,
};

#[derive(Default)]
struct MappingArgs {
    paths: Vec<LitStr>,
    methods: Vec<LitStr>,
    params: Vec<LitStr>,
    headers: Vec<LitStr>,
    consumes: Vec<LitStr>,
    produces: Vec<LitStr>,
}

impl MappingArgs {
    fn from_meta(metas: Punctuated<MetaNameValue, Token![,]>) -> SynResult<Self> {
        let mut args = MappingArgs::default();
        for meta in metas {
            let key = meta
                .path
                .get_ident()
                .map(Ident::to_string)
                .unwrap_or_default();
            let value = match &meta.value {
                Expr::Lit(ExprLit {
                    lit: Lit::Str(s), ..
                }) => s.clone(),
                other => {
                    return Err(syn::Error::new_spanned(other, "expected a string literal"));
                }
            };
            let items = split_list(&value);
            match key.as_str() {
                "path" => args.paths.extend(items),
                "method" => args.methods.extend(items),
                "params" => args.params.extend(items),
                "headers" => args.headers.extend(items),
                "consumes" => args.consumes.extend(items),
                "produces" => args.produces.extend(items),
                _ => {
                    return Err(syn::Error::new_spanned(
                        &meta.path,
                        "expected one of: path, method, params, headers, consumes, produces",
                    ));
                }
            }
        }

        if args.paths.is_empty() {
            return Err(syn::Error::new(
                Span::call_site(),
                "request_mapping requires `path = \"...\"`",
            ));
        }
        for path in &args.paths {
            if !path.value().starts_with('/') {
                return Err(syn::Error::new_spanned(path, "path must start with '/'"));
            }
        }
        for method in &args.methods {
            let name = method.value();
            if !name.bytes().all(|b| b.is_ascii_uppercase()) {
                return Err(syn::Error::new_spanned(
                    method,
                    format!("invalid HTTP method `{name}`"),
                ));
            }
        }
        Ok(args)
    }
}

/// Comma-separated list inside one literal, keeping the literal's span
fn split_list(lit: &LitStr) -> Vec<LitStr> {
    lit.value()
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| LitStr::new(s, lit.span()))
        .collect()
}

fn camel_case(name: &str) -> String {
    name.split('_')
        .filter(|part| !part.is_empty())
        .map(|part| {
            let mut chars = part.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect()
}

/// Attach a mapping rule to a handler function.
///
/// ```rust,ignore
/// #[request_mapping(path = "/users/{id}", method = "GET, HEAD", produces = "application/json")]
/// fn get_user(req: &mut Request, res: &mut Response, ctx: &Context) -> portico::Result<()> {
///     // ...
/// }
///
/// builder.register_mapped(GetUser)?;
/// ```
///
/// Keys: `path`, `method`, `params`, `headers`, `consumes`, `produces`.
/// Every value is a string; lists are comma-separated. The function is
/// kept as written and a unit struct named after it in CamelCase is
/// generated implementing `RequestHandler` and `MappedHandler`.
#[proc_macro_attribute]
pub fn request_mapping(attr: TokenStream, item: TokenStream) -> TokenStream {
    let metas = parse_macro_input!(attr with Punctuated::<MetaNameValue, Token![,]>::parse_terminated);
    let input = parse_macro_input!(item as ItemFn);
    let args = match MappingArgs::from_meta(metas) {
        Ok(args) => args,
        Err(e) => return e.to_compile_error().into(),
    };

    let fn_name = &input.sig.ident;
    let vis = &input.vis;
    let struct_name = format_ident!("{}", camel_case(&fn_name.to_string()));

    let paths = &args.paths;
    let methods = args.methods.iter().map(|m| {
        let bytes = syn::LitByteStr::new(m.value().as_bytes(), m.span());
        quote! {
            .method(
                ::portico::__private::Method::from_bytes(#bytes)
                    .map_err(|e| ::portico::Error::InvalidMapping(e.to_string()))?,
            )
        }
    });
    let params = &args.params;
    let headers = &args.headers;
    let consumes = &args.consumes;
    let produces = &args.produces;

    let expanded = quote! {
        #input

        #[derive(Debug, Clone, Copy, Default)]
        #vis struct #struct_name;

        impl ::portico::RequestHandler for #struct_name {
            fn handle(
                &self,
                req: &mut ::portico::server::Request,
                res: &mut ::portico::server::Response,
                ctx: &::portico::server::Context,
            ) -> ::portico::Result<()> {
                #fn_name(req, res, ctx)
            }
        }

        impl ::portico::MappedHandler for #struct_name {
            fn mapping(&self) -> ::portico::Result<::portico::router::Mapping> {
                ::portico::router::Mapping::builder()
                    #(.path(#paths))*
                    #(#methods)*
                    #(.param(#params))*
                    #(.header(#headers))*
                    #(.consumes(#consumes))*
                    #(.produces(#produces))*
                    .build()
            }
        }
    };
    TokenStream::from(expanded)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_camel_case() {
        assert_eq!(camel_case("get_user"), "GetUser");
        assert_eq!(camel_case("health"), "Health");
        assert_eq!(camel_case("list__all_items_"), "ListAllItems");
    }

    #[test]
    fn test_split_list() {
        let lit = LitStr::new("GET, POST ,,HEAD", Span::call_site());
        let items: Vec<String> = split_list(&lit).iter().map(LitStr::value).collect();
        assert_eq!(items, vec!["GET", "POST", "HEAD"]);
    }
}
