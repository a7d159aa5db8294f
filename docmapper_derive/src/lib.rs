use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use quote::quote;
use syn::{
    Data, DeriveInput, Fields, LitInt, LitStr, Token, Type, parse_macro_input, spanned::Spanned,
};

/// Generates `docmapper::schema::Entity` for a struct with named fields.
///
/// Member names follow the serialized field names, so `#[serde(rename)]` and
/// `#[serde(rename_all)]` are honored.
#[proc_macro_derive(Entity, attributes(entity, primary_key, attribute))]
pub fn derive_entity(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    match expand_entity(input) {
        Ok(tokens) => tokens.into(),
        Err(err) => err.to_compile_error().into(),
    }
}

#[derive(Default)]
struct EntityOptions {
    name: Option<String>,
    collection: Option<String>,
    table: Option<String>,
    repository: Option<syn::Path>,
    extendable: bool,
    data_source: Option<String>,
    secondary_source: Option<String>,
    version_source: Option<String>,
    trash_source: Option<String>,
    sync_source: Option<String>,
    cache: Option<String>,
    cache_ttl: Option<u64>,
    parents: Vec<(String, String)>,
}

#[derive(Default)]
struct ColumnArgs {
    column: Option<String>,
    not_null: bool,
    not_empty: bool,
    max_length: Option<usize>,
    large_object: bool,
}

#[derive(Default)]
struct FieldOptions {
    primary_key: Option<ColumnArgs>,
    mapped: ColumnArgs,
    sortable: bool,
    index: Option<String>,
    unique: Option<String>,
    searchable: bool,
    ignore: bool,
    ignore_if_null: bool,
    json: bool,
    date_as_string: bool,
}

#[derive(Default)]
struct SerdeFieldOptions {
    rename: Option<String>,
    skip: bool,
}

fn expand_entity(input: DeriveInput) -> syn::Result<TokenStream2> {
    let struct_name = input.ident;

    if !input.generics.params.is_empty() {
        return Err(syn::Error::new_spanned(
            input.generics,
            "Entity cannot be derived for generic structs",
        ));
    }

    let options = parse_entity_options(&input.attrs)?;
    let rename_all = parse_serde_rename_all(&input.attrs)?;

    let data_struct = match input.data {
        Data::Struct(data) => data,
        _ => {
            return Err(syn::Error::new(
                struct_name.span(),
                "Entity can only be derived for structs",
            ));
        }
    };

    let named_fields = match data_struct.fields {
        Fields::Named(fields) => fields,
        _ => {
            return Err(syn::Error::new(
                struct_name.span(),
                "Entity requires named fields",
            ));
        }
    };

    let mut attributes = Vec::<TokenStream2>::new();
    for field in named_fields.named {
        let ident = field
            .ident
            .clone()
            .ok_or_else(|| syn::Error::new(field.span(), "Entity requires named fields"))?;
        let field_options = parse_field_options(&field.attrs)?;
        let serde_options = parse_serde_field_options(&field.attrs)?;

        let raw_name = ident.to_string();
        let raw_name = raw_name.strip_prefix("r#").unwrap_or(&raw_name).to_string();
        let member = match serde_options.rename {
            Some(rename) => rename,
            None => match &rename_all {
                Some(rule) => apply_rename_rule(rule, &raw_name),
                None => raw_name,
            },
        };

        let declared_type = declared_type_tokens(&field.ty);
        let modifiers = attribute_modifiers(&field_options, serde_options.skip);
        attributes.push(quote! {
            .attribute(
                ::docmapper::schema::AttributeDef::new(#member, #declared_type)
                #(#modifiers)*
            )
        });
    }

    let entity_name = options.name.clone().unwrap_or_else(|| struct_name.to_string());
    let entity_modifiers = entity_modifiers(&options);

    Ok(quote! {
        impl ::docmapper::schema::Entity for #struct_name {
            fn entity_def() -> ::docmapper::schema::EntityDef {
                ::docmapper::schema::EntityDef::new(#entity_name)
                    #(#entity_modifiers)*
                    #(#attributes)*
            }
        }
    })
}

fn entity_modifiers(options: &EntityOptions) -> Vec<TokenStream2> {
    let mut out = Vec::new();
    if let Some(collection) = &options.collection {
        out.push(quote!(.collection(#collection)));
    }
    if let Some(table) = &options.table {
        out.push(quote!(.table(#table)));
    }
    if let Some(repository) = &options.repository {
        out.push(quote!(.repository::<#repository>()));
    }
    if options.extendable {
        out.push(quote!(.extendable()));
    }
    if let Some(name) = &options.data_source {
        out.push(quote!(.data_source(#name)));
    }
    if let Some(name) = &options.secondary_source {
        out.push(quote!(.secondary_source(#name)));
    }
    if let Some(name) = &options.version_source {
        out.push(quote!(.version_source(#name)));
    }
    if let Some(name) = &options.trash_source {
        out.push(quote!(.trash_source(#name)));
    }
    if let Some(name) = &options.sync_source {
        out.push(quote!(.sync_source(#name)));
    }
    if let Some(region) = &options.cache {
        let binding = match options.cache_ttl {
            Some(ttl) => quote!(::docmapper::schema::CacheBinding::new(#region).ttl_seconds(#ttl)),
            None => quote!(::docmapper::schema::CacheBinding::new(#region)),
        };
        out.push(quote!(.cache(#binding)));
    }
    for (entity, property) in &options.parents {
        out.push(quote!(.parent(#entity, #property)));
    }
    out
}

fn attribute_modifiers(options: &FieldOptions, serde_skip: bool) -> Vec<TokenStream2> {
    let mut out = Vec::new();

    if let Some(pk) = &options.primary_key {
        let column_options = column_options_tokens(pk);
        out.push(quote!(.primary_key_with(#column_options)));
    }

    let mapped = &options.mapped;
    if let Some(column) = &mapped.column {
        out.push(quote!(.column(#column)));
    }
    if mapped.not_null {
        out.push(quote!(.not_null()));
    }
    if mapped.not_empty {
        out.push(quote!(.not_empty()));
    }
    if let Some(max) = mapped.max_length {
        out.push(quote!(.max_length(#max)));
    }
    if mapped.large_object {
        out.push(quote!(.large_object()));
    }

    if options.sortable {
        out.push(quote!(.sortable()));
    }
    if let Some(index) = &options.index {
        out.push(quote!(.indexed(#index)));
    }
    if let Some(unique) = &options.unique {
        out.push(quote!(.unique_indexed(#unique)));
    }
    if options.searchable {
        out.push(quote!(.searchable()));
    }
    if options.ignore || serde_skip {
        out.push(quote!(.ignore()));
    }
    if options.ignore_if_null {
        out.push(quote!(.ignore_if_null()));
    }
    if options.json {
        out.push(quote!(.json()));
    }
    if options.date_as_string {
        out.push(quote!(.date_as_string()));
    }
    out
}

fn column_options_tokens(args: &ColumnArgs) -> TokenStream2 {
    let mut expr = quote!(::docmapper::schema::ColumnOptions::new());
    if let Some(column) = &args.column {
        expr = quote!(#expr.column(#column));
    }
    if args.not_null {
        expr = quote!(#expr.not_null());
    }
    if args.not_empty {
        expr = quote!(#expr.not_empty());
    }
    if let Some(max) = args.max_length {
        expr = quote!(#expr.max_length(#max));
    }
    if args.large_object {
        expr = quote!(#expr.large_object());
    }
    expr
}

// ========================================
// Attribute parsing
// ========================================

fn parse_entity_options(attrs: &[syn::Attribute]) -> syn::Result<EntityOptions> {
    let mut options = EntityOptions::default();

    for attr in attrs {
        if !attr.path().is_ident("entity") {
            continue;
        }

        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("extendable") {
                options.extendable = true;
                return Ok(());
            }

            if meta.path.is_ident("repository") {
                let value = meta.value()?;
                options.repository = Some(value.parse()?);
                return Ok(());
            }

            if meta.path.is_ident("cache_ttl") {
                let value = meta.value()?;
                let lit: LitInt = value.parse()?;
                options.cache_ttl = Some(lit.base10_parse::<u64>()?);
                return Ok(());
            }

            if meta.path.is_ident("parent") {
                let mut entity = None;
                let mut property = None;
                meta.parse_nested_meta(|inner| {
                    if inner.path.is_ident("entity") {
                        entity = Some(inner.value()?.parse::<LitStr>()?.value());
                        return Ok(());
                    }
                    if inner.path.is_ident("property") {
                        property = Some(inner.value()?.parse::<LitStr>()?.value());
                        return Ok(());
                    }
                    Err(inner.error("Unsupported parent option. Supported: entity = \"...\", property = \"...\""))
                })?;
                match (entity, property) {
                    (Some(entity), Some(property)) => options.parents.push((entity, property)),
                    _ => {
                        return Err(meta.error("parent(...) requires both entity and property"));
                    }
                }
                return Ok(());
            }

            let slot = if meta.path.is_ident("name") {
                &mut options.name
            } else if meta.path.is_ident("collection") {
                &mut options.collection
            } else if meta.path.is_ident("table") {
                &mut options.table
            } else if meta.path.is_ident("data_source") {
                &mut options.data_source
            } else if meta.path.is_ident("secondary_source") {
                &mut options.secondary_source
            } else if meta.path.is_ident("version_source") {
                &mut options.version_source
            } else if meta.path.is_ident("trash_source") {
                &mut options.trash_source
            } else if meta.path.is_ident("sync_source") {
                &mut options.sync_source
            } else if meta.path.is_ident("cache") {
                &mut options.cache
            } else {
                return Err(meta.error(
                    "Unsupported #[entity(...)] option. Supported: name, collection, table, repository, extendable, data_source, secondary_source, version_source, trash_source, sync_source, cache, cache_ttl, parent(...)",
                ));
            };
            let value = meta.value()?;
            let lit: LitStr = value.parse()?;
            *slot = Some(lit.value());
            Ok(())
        })?;
    }

    Ok(options)
}

fn parse_field_options(attrs: &[syn::Attribute]) -> syn::Result<FieldOptions> {
    let mut options = FieldOptions::default();

    for attr in attrs {
        if attr.path().is_ident("primary_key") {
            if options.primary_key.is_some() {
                return Err(syn::Error::new(
                    attr.span(),
                    "Duplicate #[primary_key] attribute on field",
                ));
            }
            let mut args = ColumnArgs::default();
            match &attr.meta {
                syn::Meta::Path(_) => {}
                syn::Meta::List(list) => {
                    list.parse_nested_meta(|meta| parse_column_arg(&mut args, &meta))?;
                }
                syn::Meta::NameValue(_) => {
                    return Err(syn::Error::new(
                        attr.span(),
                        "Unsupported #[primary_key = ...] syntax. Use #[primary_key] or #[primary_key(column = \"...\")]",
                    ));
                }
            }
            options.primary_key = Some(args);
            continue;
        }

        if !attr.path().is_ident("attribute") {
            continue;
        }

        attr.parse_nested_meta(|meta| {
            if is_column_arg(&meta.path) {
                return parse_column_arg(&mut options.mapped, &meta);
            }

            if meta.path.is_ident("sortable") {
                options.sortable = true;
                if meta.input.peek(syn::token::Paren) {
                    meta.parse_nested_meta(|inner| {
                        if inner.path.is_ident("index") {
                            options.index = Some(inner.value()?.parse::<LitStr>()?.value());
                            return Ok(());
                        }
                        if inner.path.is_ident("unique") {
                            options.unique = Some(inner.value()?.parse::<LitStr>()?.value());
                            return Ok(());
                        }
                        Err(inner.error(
                            "Unsupported sortable option. Supported: index = \"...\", unique = \"...\"",
                        ))
                    })?;
                }
                return Ok(());
            }

            let flag = if meta.path.is_ident("searchable") {
                &mut options.searchable
            } else if meta.path.is_ident("ignore") {
                &mut options.ignore
            } else if meta.path.is_ident("ignore_if_null") {
                &mut options.ignore_if_null
            } else if meta.path.is_ident("json") {
                &mut options.json
            } else if meta.path.is_ident("date_as_string") {
                &mut options.date_as_string
            } else {
                return Err(meta.error(
                    "Unsupported #[attribute(...)] option. Supported: column, not_null, not_empty, max_length, large_object, sortable, searchable, ignore, ignore_if_null, json, date_as_string",
                ));
            };
            *flag = true;
            Ok(())
        })?;
    }

    Ok(options)
}

fn is_column_arg(path: &syn::Path) -> bool {
    ["column", "max_length", "not_null", "not_empty", "large_object"]
        .iter()
        .any(|name| path.is_ident(name))
}

fn parse_column_arg(args: &mut ColumnArgs, meta: &syn::meta::ParseNestedMeta) -> syn::Result<()> {
    if meta.path.is_ident("column") {
        args.column = Some(meta.value()?.parse::<LitStr>()?.value());
        return Ok(());
    }
    if meta.path.is_ident("max_length") {
        let lit: LitInt = meta.value()?.parse()?;
        args.max_length = Some(lit.base10_parse::<usize>()?);
        return Ok(());
    }
    if meta.path.is_ident("not_null") {
        args.not_null = true;
        return Ok(());
    }
    if meta.path.is_ident("not_empty") {
        args.not_empty = true;
        return Ok(());
    }
    if meta.path.is_ident("large_object") {
        args.large_object = true;
        return Ok(());
    }
    Err(meta.error(
        "Unsupported column option. Supported: column = \"...\", max_length = N, not_null, not_empty, large_object",
    ))
}

fn parse_serde_rename_all(attrs: &[syn::Attribute]) -> syn::Result<Option<String>> {
    let mut rule = None;
    for attr in attrs {
        if !attr.path().is_ident("serde") {
            continue;
        }
        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("rename_all") {
                let lit: LitStr = meta.value()?.parse()?;
                let value = lit.value();
                if !is_known_rename_rule(&value) {
                    return Err(syn::Error::new(
                        lit.span(),
                        format!("Unsupported rename_all rule '{}' for Entity", value),
                    ));
                }
                rule = Some(value);
                return Ok(());
            }
            skip_meta_value(&meta)
        })?;
    }
    Ok(rule)
}

fn parse_serde_field_options(attrs: &[syn::Attribute]) -> syn::Result<SerdeFieldOptions> {
    let mut options = SerdeFieldOptions::default();
    let mut skip_serializing = false;
    let mut skip_deserializing = false;

    for attr in attrs {
        if !attr.path().is_ident("serde") {
            continue;
        }
        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("rename") {
                if meta.input.peek(Token![=]) {
                    options.rename = Some(meta.value()?.parse::<LitStr>()?.value());
                } else {
                    meta.parse_nested_meta(|inner| {
                        if inner.path.is_ident("serialize") {
                            options.rename = Some(inner.value()?.parse::<LitStr>()?.value());
                            return Ok(());
                        }
                        skip_meta_value(&inner)
                    })?;
                }
                return Ok(());
            }
            if meta.path.is_ident("skip") {
                options.skip = true;
                return Ok(());
            }
            if meta.path.is_ident("skip_serializing") {
                skip_serializing = true;
                return Ok(());
            }
            if meta.path.is_ident("skip_deserializing") {
                skip_deserializing = true;
                return Ok(());
            }
            skip_meta_value(&meta)
        })?;
    }

    options.skip |= skip_serializing && skip_deserializing;
    Ok(options)
}

fn skip_meta_value(meta: &syn::meta::ParseNestedMeta) -> syn::Result<()> {
    if meta.input.peek(Token![=]) {
        let _: syn::Expr = meta.value()?.parse()?;
    } else if meta.input.peek(syn::token::Paren) {
        let content;
        syn::parenthesized!(content in meta.input);
        let _: TokenStream2 = content.parse()?;
    }
    Ok(())
}

// ========================================
// Naming
// ========================================

fn is_known_rename_rule(rule: &str) -> bool {
    matches!(
        rule,
        "PascalCase"
            | "camelCase"
            | "snake_case"
            | "lowercase"
            | "UPPERCASE"
            | "SCREAMING_SNAKE_CASE"
            | "kebab-case"
            | "SCREAMING-KEBAB-CASE"
    )
}

fn apply_rename_rule(rule: &str, field: &str) -> String {
    match rule {
        "PascalCase" => to_pascal_case(field),
        "camelCase" => {
            let pascal = to_pascal_case(field);
            let mut chars = pascal.chars();
            match chars.next() {
                Some(first) => first.to_lowercase().chain(chars).collect(),
                None => pascal,
            }
        }
        "lowercase" => field.to_lowercase(),
        "UPPERCASE" | "SCREAMING_SNAKE_CASE" => field.to_uppercase(),
        "kebab-case" => field.replace('_', "-"),
        "SCREAMING-KEBAB-CASE" => field.replace('_', "-").to_uppercase(),
        _ => field.to_string(),
    }
}

fn to_pascal_case(value: &str) -> String {
    let mut out = String::new();
    for chunk in value.split('_').filter(|part| !part.is_empty()) {
        let mut chars = chunk.chars();
        if let Some(first) = chars.next() {
            out.extend(first.to_uppercase());
            out.push_str(chars.as_str());
        }
    }
    if out.is_empty() {
        value.to_string()
    } else {
        out
    }
}

// ========================================
// Declared types
// ========================================

fn declared_type_tokens(ty: &Type) -> TokenStream2 {
    match ty {
        Type::Reference(reference) => {
            return declared_type_tokens(reference.elem.as_ref());
        }
        Type::Paren(paren) => {
            return declared_type_tokens(paren.elem.as_ref());
        }
        Type::Slice(slice) => {
            let inner = declared_type_tokens(slice.elem.as_ref());
            return quote!(::docmapper::core::DeclaredType::array_of(#inner));
        }
        Type::Array(array) => {
            let inner = declared_type_tokens(array.elem.as_ref());
            return quote!(::docmapper::core::DeclaredType::array_of(#inner));
        }
        Type::Path(path) => {
            if let Some(segment) = path.path.segments.last() {
                let ident = segment.ident.to_string();
                match ident.as_str() {
                    "bool" => return quote!(::docmapper::core::DeclaredType::Boolean),
                    "i8" | "i16" | "i32" | "i64" | "i128" | "isize" | "u8" | "u16" | "u32"
                    | "u64" | "u128" | "usize" => {
                        return quote!(::docmapper::core::DeclaredType::Integer);
                    }
                    "f32" | "f64" => return quote!(::docmapper::core::DeclaredType::Float),
                    "String" | "str" | "char" => {
                        return quote!(::docmapper::core::DeclaredType::Text);
                    }
                    "DateTime" | "NaiveDateTime" | "NaiveDate" => {
                        return quote!(::docmapper::core::DeclaredType::DateTime);
                    }
                    "Uuid" => return quote!(::docmapper::core::DeclaredType::Uuid),
                    "Value" | "JsonValue" | "HashMap" | "BTreeMap" => {
                        return quote!(::docmapper::core::DeclaredType::Json);
                    }
                    "Option" | "Box" | "Arc" | "Rc" => {
                        if let Some(inner) = first_generic_type(segment) {
                            return declared_type_tokens(&inner);
                        }
                    }
                    "Vec" | "HashSet" | "BTreeSet" | "VecDeque" => {
                        if let Some(inner) = first_generic_type(segment) {
                            let inner = declared_type_tokens(&inner);
                            return quote!(::docmapper::core::DeclaredType::array_of(#inner));
                        }
                    }
                    _ => {}
                }
                return quote!(::docmapper::core::DeclaredType::object(#ident));
            }
        }
        _ => {}
    }

    quote!(::docmapper::core::DeclaredType::Json)
}

fn first_generic_type(segment: &syn::PathSegment) -> Option<Type> {
    let syn::PathArguments::AngleBracketed(arguments) = &segment.arguments else {
        return None;
    };

    for arg in &arguments.args {
        if let syn::GenericArgument::Type(ty) = arg {
            return Some(ty.clone());
        }
    }
    None
}
