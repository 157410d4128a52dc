use syn::{Field, FieldsNamed, Ident, Token, Type, punctuated::Punctuated};

/// 确保具名字段结构体以指定字段开头：
/// 若已存在同名字段则复用原定义并移至最前，否则按给定类型新增。
pub(crate) fn ensure_leading_field(fields_named: &mut FieldsNamed, name: &Ident, ty: &Type) {
    let old_named = std::mem::take(&mut fields_named.named);
    let mut new_named: Punctuated<Field, Token![,]> = Punctuated::new();

    let is_target = |f: &Field| f.ident.as_ref().is_some_and(|i| i == name);

    match old_named.iter().find(|f| is_target(f)) {
        Some(existing) => new_named.push(existing.clone()),
        None => new_named.push(syn::parse_quote! { #name: #ty }),
    }

    for f in old_named.into_iter().filter(|f| !is_target(f)) {
        new_named.push(f);
    }

    fields_named.named = new_named;
}
