use crate::derive_utils::apply_derives;
use crate::field_utils::ensure_leading_field;
use proc_macro::TokenStream;
use quote::quote;
use syn::punctuated::Punctuated;
use syn::spanned::Spanned;
use syn::{Item, Result, Token, Type, parse::Parse, parse::ParseStream, parse_macro_input};

/// #[aggregate_root] 宏实现
/// - 在字段最前插入 `root: ::eventflow::aggregate::AggregateBase<Event>`（已存在则复用并前置）
/// - 自动实现 `::eventflow::aggregate::AggregateRoot`（Event/root/root_mut）
/// - 支持参数：`#[aggregate_root(event = EventType, debug = true|false)]`；
///   - `event` 必填
///   - `debug` 默认 `true`（派生 Debug）。当为 `false` 时不派生 Debug，便于用户自定义实现。
pub(crate) fn expand(attr: TokenStream, item: TokenStream) -> TokenStream {
    let cfg = parse_macro_input!(attr as AggregateAttrConfig);
    let input = parse_macro_input!(item as Item);

    let mut st = match input {
        Item::Struct(s) => s,
        other => {
            return syn::Error::new(other.span(), "#[aggregate_root] only on struct")
                .to_compile_error()
                .into();
        }
    };

    let Some(event_ty) = cfg.event_ty else {
        return syn::Error::new(
            proc_macro2::Span::call_site(),
            "missing key 'event', e.g. #[aggregate_root(event = OrderEvent)]",
        )
        .to_compile_error()
        .into();
    };

    // 仅支持具名字段结构体
    let fields_named = match &mut st.fields {
        syn::Fields::Named(f) => f,
        _ => {
            return syn::Error::new(st.span(), "only supports named-field struct")
                .to_compile_error()
                .into();
        }
    };

    let root_ident: syn::Ident = syn::parse_quote! { root };
    let root_ty: Type = syn::parse_quote! { ::eventflow::aggregate::AggregateBase<#event_ty> };
    ensure_leading_field(fields_named, &root_ident, &root_ty);

    // 合并/规范 derive：默认添加 Debug（可通过 debug=false 关闭）、Default、Serialize、Deserialize
    let mut required: Vec<syn::Path> = vec![
        syn::parse_quote!(Default),
        syn::parse_quote!(serde::Serialize),
        syn::parse_quote!(serde::Deserialize),
    ];
    if cfg.derive_debug.unwrap_or(true) {
        required.insert(0, syn::parse_quote!(Debug));
    }
    apply_derives(&mut st.attrs, required);

    let ident = &st.ident;
    let (impl_generics, ty_generics, where_clause) = st.generics.split_for_impl();

    let expanded = quote! {
        #st

        impl #impl_generics ::eventflow::aggregate::AggregateRoot for #ident #ty_generics #where_clause {
            type Event = #event_ty;

            fn root(&self) -> &::eventflow::aggregate::AggregateBase<Self::Event> { &self.root }

            fn root_mut(&mut self) -> &mut ::eventflow::aggregate::AggregateBase<Self::Event> {
                &mut self.root
            }
        }
    };

    TokenStream::from(expanded)
}

// -------- parsing --------

struct AggregateAttrConfig {
    event_ty: Option<Type>,
    derive_debug: Option<bool>,
}

impl Parse for AggregateAttrConfig {
    fn parse(input: ParseStream) -> Result<Self> {
        let mut event_ty: Option<Type> = None;
        let mut derive_debug: Option<bool> = None;

        let elems: Punctuated<AggregateAttrElem, Token![,]> =
            Punctuated::<AggregateAttrElem, Token![,]>::parse_terminated(input)?;

        for elem in elems {
            match elem {
                AggregateAttrElem::Event(ty) => {
                    if event_ty.is_some() {
                        return Err(syn::Error::new(
                            ty.span(),
                            "duplicate key 'event' in attribute",
                        ));
                    }
                    event_ty = Some(*ty);
                }
                AggregateAttrElem::Debug(b) => {
                    if derive_debug.is_some() {
                        return Err(syn::Error::new(
                            proc_macro2::Span::call_site(),
                            "duplicate key 'debug' in attribute",
                        ));
                    }
                    derive_debug = Some(b);
                }
            }
        }

        Ok(Self {
            event_ty,
            derive_debug,
        })
    }
}

enum AggregateAttrElem {
    Event(Box<Type>),
    Debug(bool),
}

impl Parse for AggregateAttrElem {
    fn parse(input: ParseStream) -> Result<Self> {
        let key: syn::Ident = input.parse()?;
        let _eq: Token![=] = input.parse()?;
        if key == "event" {
            let ty: Type = input.parse()?;
            Ok(AggregateAttrElem::Event(Box::new(ty)))
        } else if key == "debug" {
            match input.parse::<syn::Expr>()? {
                syn::Expr::Lit(syn::ExprLit {
                    lit: syn::Lit::Bool(b),
                    ..
                }) => Ok(AggregateAttrElem::Debug(b.value())),
                other => Err(syn::Error::new(
                    other.span(),
                    "expected boolean literal for 'debug'",
                )),
            }
        } else {
            Err(syn::Error::new(
                key.span(),
                "unknown key in attribute; expected 'event' or 'debug'",
            ))
        }
    }
}
