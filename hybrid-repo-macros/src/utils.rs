use quote::ToTokens;
use syn::{Attribute, Expr, Field, FieldsNamed, Token, punctuated::Punctuated, spanned::Spanned};

// 提取非 derive 属性与已有 derive 列表
pub(crate) fn split_derives(attrs: &[Attribute]) -> (Vec<Attribute>, Vec<syn::Path>) {
    let mut retained = Vec::new();
    let mut existing = Vec::new();
    for attr in attrs.iter() {
        if attr.path().is_ident("derive") {
            if let Ok(list) =
                attr.parse_args_with(Punctuated::<syn::Path, Token![,]>::parse_terminated)
            {
                existing.extend(list);
            }
        } else {
            retained.push(attr.clone());
        }
    }
    (retained, existing)
}

// 合并默认与已有 derive（去重，优先保留 required）
pub(crate) fn merge_derives(existing: Vec<syn::Path>, required: Vec<syn::Path>) -> Attribute {
    let mut seen = std::collections::HashSet::<String>::new();
    let final_list: Vec<syn::Path> = required
        .into_iter()
        .chain(existing)
        .filter(|p| seen.insert(derive_key(p)))
        .collect();
    syn::parse_quote!(#[derive(#(#final_list),*)])
}

// 归一化 derive 的 key，避免 Serialize/serde::Serialize 重复
pub(crate) fn derive_key(p: &syn::Path) -> String {
    match p.segments.last() {
        Some(last) => {
            let last_ident = last.ident.to_string();
            match last_ident.as_str() {
                "Serialize" | "Deserialize" => format!("serde::{last_ident}"),
                _ => last_ident,
            }
        }
        None => p.to_token_stream().to_string(),
    }
}

pub(crate) fn apply_derives(attrs: &mut Vec<Attribute>, required: Vec<syn::Path>) {
    let (retained, existing) = split_derives(attrs);
    let merged = merge_derives(existing, required);
    *attrs = std::iter::once(merged).chain(retained).collect();
}

pub(crate) fn has_field_named(fields: &FieldsNamed, name: &str) -> bool {
    fields
        .named
        .iter()
        .any(|f| f.ident.as_ref().is_some_and(|i| i == name))
}

/// 缺失时在最前插入给定字段（模板字段可携带属性），已有字段保持原位
pub(crate) fn ensure_leading_field(fields: &mut FieldsNamed, name: &str, template: Field) {
    if has_field_named(fields, name) {
        return;
    }
    let mut new_named: Punctuated<Field, Token![,]> = Punctuated::new();
    new_named.push(template);
    for f in fields.named.iter() {
        new_named.push(f.clone());
    }
    fields.named = new_named;
}

/// `key = value` 形式的属性参数
pub(crate) struct AttrKv {
    pub(crate) key: syn::Ident,
    pub(crate) value: Expr,
}

impl syn::parse::Parse for AttrKv {
    fn parse(input: syn::parse::ParseStream) -> syn::Result<Self> {
        let key = input.parse()?;
        let _eq: Token![=] = input.parse()?;
        let value = input.parse()?;
        Ok(Self { key, value })
    }
}

pub(crate) fn parse_kvs(input: syn::parse::ParseStream) -> syn::Result<Vec<AttrKv>> {
    let pairs = Punctuated::<AttrKv, Token![,]>::parse_terminated(input)?;
    let mut seen = std::collections::HashSet::new();
    for kv in pairs.iter() {
        if !seen.insert(kv.key.to_string()) {
            return Err(syn::Error::new(
                kv.key.span(),
                format!("duplicate key '{}' in attribute", kv.key),
            ));
        }
    }
    Ok(pairs.into_iter().collect())
}

pub(crate) fn expect_str(kv: &AttrKv) -> syn::Result<syn::LitStr> {
    match &kv.value {
        Expr::Lit(syn::ExprLit {
            lit: syn::Lit::Str(lit),
            ..
        }) => Ok(lit.clone()),
        other => Err(syn::Error::new(
            other.span(),
            format!("expected string literal for '{}'", kv.key),
        )),
    }
}

pub(crate) fn expect_bool(kv: &AttrKv) -> syn::Result<bool> {
    match &kv.value {
        Expr::Lit(syn::ExprLit {
            lit: syn::Lit::Bool(b),
            ..
        }) => Ok(b.value()),
        other => Err(syn::Error::new(
            other.span(),
            format!("expected boolean literal for '{}'", kv.key),
        )),
    }
}

pub(crate) fn expect_path(kv: &AttrKv) -> syn::Result<syn::Path> {
    match &kv.value {
        Expr::Path(p) => Ok(p.path.clone()),
        other => Err(syn::Error::new(
            other.span(),
            format!("expected a path for '{}'", kv.key),
        )),
    }
}
