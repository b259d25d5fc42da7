use crate::utils::{apply_derives, ensure_leading_field, expect_str, parse_kvs};
use proc_macro::TokenStream;
use quote::quote;
use syn::spanned::Spanned;
use syn::{Field, Item, Result, parse::Parse, parse::ParseStream, parse_macro_input};

/// #[domain_event] 宏实现
/// - 结构体：缺失时追加 `occurred_at`，事件类型取属性或结构体名；
/// - 枚举：仅支持具名字段变体，每个变体缺失时追加 `occurred_at`，
///   事件类型默认 `Enum.Variant`，可用 `#[event(event_type = "...")]` 覆写；
/// - 生成 `::hybrid_repo_domain::domain_event::DomainEvent` 实现。
pub(crate) fn expand(attr: TokenStream, item: TokenStream) -> TokenStream {
    let cfg = parse_macro_input!(attr as EventAttrConfig);
    let mut input = parse_macro_input!(item as Item);

    let required: Vec<syn::Path> = vec![syn::parse_quote!(Debug), syn::parse_quote!(Clone)];

    let out = match &mut input {
        Item::Struct(st) => {
            let fields_named = match &mut st.fields {
                syn::Fields::Named(f) => f,
                _ => {
                    return syn::Error::new(st.span(), "only supports named-field struct")
                        .to_compile_error()
                        .into();
                }
            };
            ensure_leading_field(fields_named, "occurred_at", occurred_at_field());
            apply_derives(&mut st.attrs, required);

            let ident = &st.ident;
            let (impl_generics, ty_generics, where_clause) = st.generics.split_for_impl();
            let type_lit = cfg
                .event_type
                .unwrap_or_else(|| syn::LitStr::new(&ident.to_string(), ident.span()));

            quote! {
                #st

                impl #impl_generics ::hybrid_repo_domain::domain_event::DomainEvent for #ident #ty_generics #where_clause {
                    fn event_type(&self) -> &str { #type_lit }

                    fn occurred_at(&self) -> ::hybrid_repo_domain::chrono::DateTime<::hybrid_repo_domain::chrono::Utc> {
                        self.occurred_at
                    }

                    fn as_any(&self) -> &dyn ::std::any::Any { self }
                }
            }
        }
        Item::Enum(en) => {
            if let Some(lit) = &cfg.event_type {
                return syn::Error::new(
                    lit.span(),
                    "'event_type' is set per variant on enums; use #[event(event_type = \"...\")]",
                )
                .to_compile_error()
                .into();
            }
            apply_derives(&mut en.attrs, required);

            let enum_name = en.ident.to_string();
            let mut type_arms = Vec::new();
            let mut time_arms = Vec::new();

            for v in &mut en.variants {
                // 单元变体视为没有业务字段的具名变体
                if matches!(v.fields, syn::Fields::Unit) {
                    v.fields = syn::Fields::Named(syn::parse_quote!({}));
                }
                let fields_named = match &mut v.fields {
                    syn::Fields::Named(f) => f,
                    _ => {
                        return syn::Error::new(
                            v.span(),
                            "#[domain_event] supports only unit or named-field enum variants, e.g., Variant { x: T }",
                        )
                        .to_compile_error()
                        .into();
                    }
                };
                ensure_leading_field(fields_named, "occurred_at", occurred_at_field());

                let mut retained_attrs = Vec::new();
                let mut type_lit: Option<syn::LitStr> = None;
                for attr in v.attrs.iter() {
                    if attr.path().is_ident("event") {
                        match parse_variant_event_type(attr) {
                            Ok(lit) => type_lit = Some(lit),
                            Err(err) => return err.to_compile_error().into(),
                        }
                    } else {
                        retained_attrs.push(attr.clone());
                    }
                }
                v.attrs = retained_attrs;

                let v_ident = &v.ident;
                let lit = type_lit.unwrap_or_else(|| {
                    syn::LitStr::new(&format!("{enum_name}.{v_ident}"), v_ident.span())
                });
                type_arms.push(quote! { Self::#v_ident { .. } => #lit });
                time_arms.push(quote! { Self::#v_ident { occurred_at, .. } => *occurred_at });
            }

            let ident = &en.ident;
            let (impl_generics, ty_generics, where_clause) = en.generics.split_for_impl();

            quote! {
                #en

                impl #impl_generics ::hybrid_repo_domain::domain_event::DomainEvent for #ident #ty_generics #where_clause {
                    fn event_type(&self) -> &str {
                        match self { #( #type_arms, )* }
                    }

                    fn occurred_at(&self) -> ::hybrid_repo_domain::chrono::DateTime<::hybrid_repo_domain::chrono::Utc> {
                        match self { #( #time_arms, )* }
                    }

                    fn as_any(&self) -> &dyn ::std::any::Any { self }
                }
            }
        }
        other => {
            return syn::Error::new(
                other.span(),
                "#[domain_event] can only be used on struct or enum types",
            )
            .to_compile_error()
            .into();
        }
    };

    TokenStream::from(out)
}

fn occurred_at_field() -> Field {
    syn::parse_quote! {
        occurred_at: ::hybrid_repo_domain::chrono::DateTime<::hybrid_repo_domain::chrono::Utc>
    }
}

// -------- parsing --------

fn parse_variant_event_type(attr: &syn::Attribute) -> Result<syn::LitStr> {
    let kvs = attr.parse_args_with(parse_kvs)?;
    let mut ty = None;
    for kv in kvs {
        match kv.key.to_string().as_str() {
            "event_type" => ty = Some(expect_str(&kv)?),
            _ => {
                return Err(syn::Error::new(
                    kv.key.span(),
                    "unknown key; expected 'event_type'",
                ));
            }
        }
    }
    ty.ok_or_else(|| syn::Error::new(attr.span(), "expected #[event(event_type = \"...\")]"))
}

#[derive(Default)]
struct EventAttrConfig {
    event_type: Option<syn::LitStr>,
}

impl Parse for EventAttrConfig {
    fn parse(input: ParseStream) -> Result<Self> {
        let mut cfg = Self::default();
        if input.is_empty() {
            return Ok(cfg);
        }

        for kv in parse_kvs(input)? {
            match kv.key.to_string().as_str() {
                "event_type" => cfg.event_type = Some(expect_str(&kv)?),
                _ => {
                    return Err(syn::Error::new(
                        kv.key.span(),
                        "unknown key; expected 'event_type'",
                    ));
                }
            }
        }
        Ok(cfg)
    }
}
