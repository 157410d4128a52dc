use crate::derive_utils::apply_derives;
use proc_macro::TokenStream;
use quote::quote;
use std::collections::HashMap;
use syn::punctuated::Punctuated;
use syn::spanned::Spanned;
use syn::{Expr, Ident, Item, LitStr, Result, Token, parse::Parse, parse::ParseStream};

/// #[domain_event] 宏实现
/// - 枚举：变体形态不限（单元/元组/具名字段），事件类型默认 `Enum.Variant`，
///   变体可通过 `#[event(event_type = "...")]` 覆写
/// - 结构体：事件类型默认为结构体名，可通过 `#[domain_event(event_type = "...")]` 覆写
/// - 合并默认派生：Debug, Clone, PartialEq, Serialize, Deserialize
/// - 生成 `::eventflow::domain_event::DomainEvent` 实现
pub(crate) fn expand(attr: TokenStream, item: TokenStream) -> TokenStream {
    match expand_item(attr.into(), item.into()) {
        Ok(ts) => ts.into(),
        Err(err) => err.to_compile_error().into(),
    }
}

fn expand_item(
    attr: proc_macro2::TokenStream,
    item: proc_macro2::TokenStream,
) -> Result<proc_macro2::TokenStream> {
    let item_type = if attr.is_empty() {
        None
    } else {
        syn::parse2::<EventTypeAttr>(attr)?.event_type
    };
    let mut input: Item = syn::parse2(item)?;

    let required: Vec<syn::Path> = vec![
        syn::parse_quote!(Debug),
        syn::parse_quote!(Clone),
        syn::parse_quote!(PartialEq),
        syn::parse_quote!(serde::Serialize),
        syn::parse_quote!(serde::Deserialize),
    ];

    match &mut input {
        Item::Enum(enum_item) => {
            if let Some(lit) = item_type {
                return Err(syn::Error::new(
                    lit.span(),
                    "'event_type' on an enum is not supported; use #[event(event_type = ...)] on variants",
                ));
            }
            apply_derives(&mut enum_item.attrs, required);

            let mut variant_types: HashMap<String, LitStr> = HashMap::new();
            for v in &mut enum_item.variants {
                let mut retained_attrs = Vec::new();
                for attr in &v.attrs {
                    if attr.path().is_ident("event") {
                        let cfg: EventTypeAttr = attr.parse_args()?;
                        if let Some(lit) = cfg.event_type {
                            if variant_types.insert(v.ident.to_string(), lit).is_some() {
                                return Err(syn::Error::new(
                                    attr.span(),
                                    "duplicate 'event_type' specified for this variant",
                                ));
                            }
                        }
                    } else {
                        retained_attrs.push(attr.clone());
                    }
                }
                v.attrs = retained_attrs;
            }

            let enum_ident = &enum_item.ident;
            let enum_name = enum_ident.to_string();
            let type_match_arms = enum_item.variants.iter().map(|v| {
                let v_ident = &v.ident;
                let lit = variant_types.get(&v_ident.to_string()).cloned().unwrap_or_else(|| {
                    LitStr::new(&format!("{enum_name}.{v_ident}"), v_ident.span())
                });
                quote! { Self::#v_ident { .. } => #lit }
            });

            let (impl_generics, ty_generics, where_clause) = enum_item.generics.split_for_impl();
            let arms: Vec<_> = type_match_arms.collect();
            let body = if arms.is_empty() {
                quote! { match *self {} }
            } else {
                quote! { match self { #( #arms, )* } }
            };

            Ok(quote! {
                #enum_item

                impl #impl_generics ::eventflow::domain_event::DomainEvent for #enum_ident #ty_generics #where_clause {
                    fn event_type(&self) -> &str { #body }
                }
            })
        }
        Item::Struct(st) => {
            apply_derives(&mut st.attrs, required);

            let ident = &st.ident;
            let lit = item_type.unwrap_or_else(|| LitStr::new(&ident.to_string(), ident.span()));
            let (impl_generics, ty_generics, where_clause) = st.generics.split_for_impl();

            Ok(quote! {
                #st

                impl #impl_generics ::eventflow::domain_event::DomainEvent for #ident #ty_generics #where_clause {
                    fn event_type(&self) -> &str { #lit }
                }
            })
        }
        other => Err(syn::Error::new(
            other.span(),
            "#[domain_event] can only be used on enum or struct types",
        )),
    }
}

// -------- parsing --------

// `event_type = "..."`
struct EventTypeAttr {
    event_type: Option<LitStr>,
}

impl Parse for EventTypeAttr {
    fn parse(input: ParseStream) -> Result<Self> {
        let mut event_type: Option<LitStr> = None;
        let pairs: Punctuated<EventAttrKv, Token![,]> =
            Punctuated::<EventAttrKv, Token![,]>::parse_terminated(input)?;

        for kv in pairs {
            match kv.key.to_string().as_str() {
                "event_type" => {
                    if event_type.is_some() {
                        return Err(syn::Error::new(
                            kv.key.span(),
                            "duplicate key 'event_type' in attribute",
                        ));
                    }
                    let lit = match kv.value {
                        Expr::Lit(syn::ExprLit {
                            lit: syn::Lit::Str(lit),
                            ..
                        }) => lit,
                        other => {
                            return Err(syn::Error::new(
                                other.span(),
                                "expected string literal for 'event_type'",
                            ));
                        }
                    };
                    event_type = Some(lit);
                }
                _ => {
                    return Err(syn::Error::new(
                        kv.key.span(),
                        "unknown key; expected 'event_type'",
                    ));
                }
            }
        }

        Ok(Self { event_type })
    }
}

struct EventAttrKv {
    key: Ident,
    value: Expr,
}

impl Parse for EventAttrKv {
    fn parse(input: ParseStream) -> Result<Self> {
        let key: Ident = input.parse()?;
        let _eq: Token![=] = input.parse()?;
        let value: Expr = input.parse()?;
        Ok(Self { key, value })
    }
}
