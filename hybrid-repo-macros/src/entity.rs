use crate::utils::{
    apply_derives, ensure_leading_field, expect_bool, expect_path, expect_str, has_field_named,
    parse_kvs,
};
use proc_macro::TokenStream;
use quote::quote;
use syn::spanned::Spanned;
use syn::{Item, ItemStruct, Result, parse::Parse, parse::ParseStream, parse_macro_input};

/// #[entity] 宏实现
/// - `base = true`（默认）：缺失时在最前追加 `#[serde(flatten)] base: EntityBase`；
/// - `base = false`：要求结构体自带 `id` 字段；
/// - 合并派生 Debug（可关闭）、Clone、Serialize、Deserialize；
/// - 生成 `::hybrid_repo_domain::entity::Entity` 实现。
pub(crate) fn expand(attr: TokenStream, item: TokenStream) -> TokenStream {
    let cfg = parse_macro_input!(attr as EntityAttrConfig);
    let input = parse_macro_input!(item as Item);

    let mut st = match input {
        Item::Struct(s) => s,
        other => {
            return syn::Error::new(other.span(), "#[entity] only on struct")
                .to_compile_error()
                .into();
        }
    };

    let fields_named = match &mut st.fields {
        syn::Fields::Named(f) => f,
        _ => {
            return syn::Error::new(st.span(), "only supports named-field struct")
                .to_compile_error()
                .into();
        }
    };

    let with_base = cfg.base.unwrap_or(true);
    if with_base {
        ensure_leading_field(
            fields_named,
            "base",
            syn::parse_quote! {
                #[serde(flatten)]
                base: ::hybrid_repo_domain::entity::EntityBase
            },
        );
    } else if !has_field_named(fields_named, "id") {
        return syn::Error::new(
            st.span(),
            "#[entity(base = false)] requires an `id: EntityId` field",
        )
        .to_compile_error()
        .into();
    }

    let mut required: Vec<syn::Path> = vec![
        syn::parse_quote!(Clone),
        syn::parse_quote!(serde::Serialize),
        syn::parse_quote!(serde::Deserialize),
    ];
    if cfg.debug.unwrap_or(true) {
        required.insert(0, syn::parse_quote!(Debug));
    }
    apply_derives(&mut st.attrs, required);

    let out_struct = ItemStruct { ..st };

    let ident = &out_struct.ident;
    let generics = out_struct.generics.clone();
    let (impl_generics, ty_generics, where_clause) = generics.split_for_impl();

    let type_name = cfg
        .name
        .unwrap_or_else(|| syn::LitStr::new(&ident.to_string(), ident.span()));

    let identity = if with_base {
        quote! {
            fn id(&self) -> ::hybrid_repo_domain::entity::EntityId { self.base.id() }

            fn base(&self) -> ::std::option::Option<&::hybrid_repo_domain::entity::EntityBase> {
                ::std::option::Option::Some(&self.base)
            }

            fn base_mut(&mut self) -> ::std::option::Option<&mut ::hybrid_repo_domain::entity::EntityBase> {
                ::std::option::Option::Some(&mut self.base)
            }
        }
    } else {
        quote! {
            fn id(&self) -> ::hybrid_repo_domain::entity::EntityId { self.id }
        }
    };

    let auto_includes = cfg.auto_includes.map(|path| {
        quote! {
            fn auto_includes() -> ::std::vec::Vec<::hybrid_repo_domain::query::Include<Self>> {
                #path()
            }
        }
    });

    let expanded = quote! {
        #out_struct

        impl #impl_generics ::hybrid_repo_domain::entity::Entity for #ident #ty_generics #where_clause {
            const TYPE: &'static str = #type_name;

            #identity

            #auto_includes
        }
    };

    TokenStream::from(expanded)
}

// -------- parsing --------

#[derive(Default)]
struct EntityAttrConfig {
    name: Option<syn::LitStr>,
    base: Option<bool>,
    auto_includes: Option<syn::Path>,
    debug: Option<bool>,
}

impl Parse for EntityAttrConfig {
    fn parse(input: ParseStream) -> Result<Self> {
        let mut cfg = Self::default();
        if input.is_empty() {
            return Ok(cfg);
        }

        for kv in parse_kvs(input)? {
            match kv.key.to_string().as_str() {
                "name" => cfg.name = Some(expect_str(&kv)?),
                "base" => cfg.base = Some(expect_bool(&kv)?),
                "auto_includes" => cfg.auto_includes = Some(expect_path(&kv)?),
                "debug" => cfg.debug = Some(expect_bool(&kv)?),
                _ => {
                    return Err(syn::Error::new(
                        kv.key.span(),
                        "unknown key in attribute; expected 'name' | 'base' | 'auto_includes' | 'debug'",
                    ));
                }
            }
        }

        Ok(cfg)
    }
}
