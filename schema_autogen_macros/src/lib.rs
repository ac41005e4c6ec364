//! Procedural macros for schema_autogen
//!
//! `#[derive(Model)]` turns an annotated struct into a table definition:
//!
//! ```ignore
//! #[derive(Model)]
//! #[model(table = "user", schema = "app")]
//! struct User {
//!     #[column(primary_key)]
//!     id: i32,
//!     #[column(type = "String(50)", unique)]
//!     name: String,
//!     #[column(foreign_key = "org.id", index)]
//!     org_id: Option<i32>,
//! }
//! ```

use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use quote::quote;
use syn::{
    parse_macro_input, Data, DeriveInput, Fields, GenericArgument, LitBool, LitStr, PathArguments,
    Type,
};

/// Derive `schema_autogen::Model` for a struct with named fields
#[proc_macro_derive(Model, attributes(model, column))]
pub fn derive_model(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    expand_model(&input)
        .unwrap_or_else(syn::Error::into_compile_error)
        .into()
}

#[derive(Default)]
struct ModelArgs {
    table: Option<String>,
    schema: Option<String>,
    reference_only: bool,
}

#[derive(Default)]
struct ColumnArgs {
    name: Option<String>,
    sql_type: Option<String>,
    primary_key: bool,
    nullable: Option<bool>,
    server_default: Option<String>,
    foreign_key: Option<String>,
    index: bool,
    unique: bool,
    autoincrement: Option<bool>,
}

fn expand_model(input: &DeriveInput) -> syn::Result<TokenStream2> {
    let ident = &input.ident;
    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();

    let fields = match &input.data {
        Data::Struct(data) => match &data.fields {
            Fields::Named(fields) => &fields.named,
            _ => {
                return Err(syn::Error::new_spanned(
                    ident,
                    "Model only supports structs with named fields",
                ))
            }
        },
        _ => return Err(syn::Error::new_spanned(ident, "Model only supports structs")),
    };

    let model = parse_model_args(input)?;
    let table_name = model
        .table
        .clone()
        .unwrap_or_else(|| snake_case(&ident.to_string()));

    let mut statements = Vec::new();
    if let Some(schema) = &model.schema {
        statements.push(quote! { table = table.schema(#schema); });
    }
    if model.reference_only {
        statements.push(quote! { table = table.reference_only(); });
    }

    for field in fields {
        let Some(field_ident) = &field.ident else {
            continue;
        };
        let args = parse_column_args(field)?;
        let column_name = args
            .name
            .clone()
            .unwrap_or_else(|| field_ident.to_string().trim_start_matches("r#").to_string());

        let (inner, optional) = unwrap_option(&field.ty);
        let type_expr = match &args.sql_type {
            Some(spelling) => quote! {
                ::schema_autogen::schema::sqltype::SqlType::parse(#spelling)?
            },
            None => generic_type(inner).ok_or_else(|| {
                syn::Error::new_spanned(
                    &field.ty,
                    "no column type for this Rust type; add #[column(type = \"...\")]",
                )
            })?,
        };

        let mut column = quote! {
            ::schema_autogen::schema::types::Column::new(#column_name, #type_expr)
        };
        let nullable = args.nullable.unwrap_or(optional && !args.primary_key);
        if args.primary_key {
            column = quote! { #column.primary_key() };
        }
        column = quote! { #column.nullable(#nullable) };
        if let Some(default) = &args.server_default {
            column = quote! { #column.server_default(#default) };
        }
        if let Some(autoincrement) = args.autoincrement {
            column = quote! { #column.autoincrement(#autoincrement) };
        }
        statements.push(quote! { table.add_column(#column); });

        if args.index {
            let index_name = format!("ix_{}_{}", table_name, column_name);
            statements.push(quote! {
                table = table.index(::schema_autogen::schema::types::Index::new(#index_name, &[#column_name]));
            });
        }
        if args.unique {
            let constraint_name = format!("uq_{}_{}", table_name, column_name);
            statements.push(quote! {
                table = table.unique(::schema_autogen::schema::types::UniqueConstraint::new(
                    ::std::option::Option::Some(#constraint_name),
                    &[#column_name],
                ));
            });
        }
        if let Some(target) = &args.foreign_key {
            if !target.contains('.') {
                return Err(syn::Error::new_spanned(
                    field_ident,
                    "foreign_key must be \"table.column\" or \"schema.table.column\"",
                ));
            }
            statements.push(quote! {
                table = table.foreign_key(::schema_autogen::schema::types::ForeignKey::new(
                    &[#column_name],
                    &[#target],
                ));
            });
        }
    }

    Ok(quote! {
        #[automatically_derived]
        impl #impl_generics ::schema_autogen::models::Model for #ident #ty_generics #where_clause {
            fn table() -> ::schema_autogen::Result<::schema_autogen::schema::types::Table> {
                let mut table = ::schema_autogen::schema::types::Table::new(#table_name);
                #(#statements)*
                ::std::result::Result::Ok(table)
            }
        }
    })
}

fn parse_model_args(input: &DeriveInput) -> syn::Result<ModelArgs> {
    let mut args = ModelArgs::default();
    for attr in input.attrs.iter().filter(|a| a.path().is_ident("model")) {
        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("table") {
                args.table = Some(meta.value()?.parse::<LitStr>()?.value());
            } else if meta.path.is_ident("schema") {
                args.schema = Some(meta.value()?.parse::<LitStr>()?.value());
            } else if meta.path.is_ident("reference_only") {
                args.reference_only = true;
            } else {
                return Err(meta.error("unknown model attribute"));
            }
            Ok(())
        })?;
    }
    Ok(args)
}

fn parse_column_args(field: &syn::Field) -> syn::Result<ColumnArgs> {
    let mut args = ColumnArgs::default();
    for attr in field.attrs.iter().filter(|a| a.path().is_ident("column")) {
        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("name") {
                args.name = Some(meta.value()?.parse::<LitStr>()?.value());
            } else if meta.path.is_ident("type") {
                args.sql_type = Some(meta.value()?.parse::<LitStr>()?.value());
            } else if meta.path.is_ident("primary_key") {
                args.primary_key = true;
            } else if meta.path.is_ident("nullable") {
                args.nullable = Some(flag(&meta)?);
            } else if meta.path.is_ident("server_default") {
                args.server_default = Some(meta.value()?.parse::<LitStr>()?.value());
            } else if meta.path.is_ident("foreign_key") {
                args.foreign_key = Some(meta.value()?.parse::<LitStr>()?.value());
            } else if meta.path.is_ident("index") {
                args.index = true;
            } else if meta.path.is_ident("unique") {
                args.unique = true;
            } else if meta.path.is_ident("autoincrement") {
                args.autoincrement = Some(flag(&meta)?);
            } else {
                return Err(meta.error("unknown column attribute"));
            }
            Ok(())
        })?;
    }
    Ok(args)
}

/// `key` alone means true; `key = bool` sets it explicitly
fn flag(meta: &syn::meta::ParseNestedMeta<'_>) -> syn::Result<bool> {
    if meta.input.peek(syn::Token![=]) {
        Ok(meta.value()?.parse::<LitBool>()?.value)
    } else {
        Ok(true)
    }
}

/// Strip `Option<..>`, reporting whether it was present
fn unwrap_option(ty: &Type) -> (&Type, bool) {
    if let Type::Path(path) = ty {
        if let Some(segment) = path.path.segments.last() {
            if segment.ident == "Option" {
                if let PathArguments::AngleBracketed(args) = &segment.arguments {
                    if let Some(GenericArgument::Type(inner)) = args.args.first() {
                        return (inner, true);
                    }
                }
            }
        }
    }
    (ty, false)
}

fn generic_type(ty: &Type) -> Option<TokenStream2> {
    let Type::Path(path) = ty else {
        return None;
    };
    let segment = path.path.segments.last()?;
    let constructor = match segment.ident.to_string().as_str() {
        "i8" | "i16" | "u8" => quote!(small_integer()),
        "i32" | "u16" => quote!(integer()),
        "i64" | "u32" | "u64" | "isize" | "usize" => quote!(big_integer()),
        "f32" | "f64" => quote!(float()),
        "bool" => quote!(boolean()),
        "String" => quote!(string(::std::option::Option::None)),
        "Vec" => match &segment.arguments {
            PathArguments::AngleBracketed(args)
                if matches!(args.args.first(), Some(GenericArgument::Type(Type::Path(p))) if p.path.is_ident("u8")) =>
            {
                quote!(large_binary())
            }
            _ => return None,
        },
        _ => return None,
    };
    Some(quote! { ::schema_autogen::schema::sqltype::SqlType::#constructor })
}

fn snake_case(name: &str) -> String {
    let mut out = String::with_capacity(name.len() + 4);
    for (i, ch) in name.chars().enumerate() {
        if ch.is_uppercase() {
            if i > 0 {
                out.push('_');
            }
            out.extend(ch.to_lowercase());
        } else {
            out.push(ch);
        }
    }
    out
}
