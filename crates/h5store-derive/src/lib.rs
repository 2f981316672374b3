//! Proc macros for h5store.
//!
//! - `#[derive(H5Object)]` builds the member policy of a struct and the
//!   member walk used by object mapping.
//! - `#[derive(H5Record)]` describes a struct as a fixed-layout compound
//!   record for growable datasets.

use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use quote::quote;
use syn::{parse_macro_input, Data, DeriveInput, Expr, Field, Fields, LitStr, Type};

/// Derive object mapping for a struct with named fields.
///
/// Every field is a member. Field attributes under `#[h5(...)]`:
/// - `name = "..."` stores the member under another name
/// - `fallback = "..."` tries an older name when reading
/// - `read_only`, `write_only`, `skip` set the direction (default: both)
/// - `dataset` stores the member as a dataset instead of an attribute
/// - `group` stores a nested `H5Object` in a child group
/// - `mandatory` makes a missing member an error on read
#[proc_macro_derive(H5Object, attributes(h5))]
pub fn derive_h5object(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    match impl_h5object(&input) {
        Ok(ts) => ts.into(),
        Err(e) => e.to_compile_error().into(),
    }
}

/// Derive a compound record layout for a struct with named fields.
///
/// # Supported field types
/// - any `H5Scalar` with a fixed width (`i8`..`u64`, `f32`, `f64`, `bool`,
///   `DateTime<Utc>`)
/// - `[T; N]` arrays of those
/// - `String` with `#[h5(len = N)]`, stored in an `N`-byte cell
///
/// `#[h5(name = "...")]` renames the compound member.
#[proc_macro_derive(H5Record, attributes(h5))]
pub fn derive_h5record(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    match impl_h5record(&input) {
        Ok(ts) => ts.into(),
        Err(e) => e.to_compile_error().into(),
    }
}

fn named_fields<'a>(input: &'a DeriveInput, derive: &str) -> syn::Result<Vec<&'a Field>> {
    if !input.generics.params.is_empty() {
        return Err(syn::Error::new_spanned(
            &input.generics,
            format!("{derive} cannot be derived for generic structs"),
        ));
    }
    match &input.data {
        Data::Struct(data) => match &data.fields {
            Fields::Named(named) => Ok(named.named.iter().collect()),
            _ => Err(syn::Error::new_spanned(
                &input.ident,
                format!("{derive} can only be derived for structs with named fields"),
            )),
        },
        _ => Err(syn::Error::new_spanned(
            &input.ident,
            format!("{derive} can only be derived for structs"),
        )),
    }
}

#[derive(Clone, Copy, PartialEq)]
enum Direction {
    ReadWrite,
    ReadOnly,
    WriteOnly,
    Skip,
}

#[derive(Clone, Copy, PartialEq)]
enum Storage {
    Attribute,
    Dataset,
    Group,
}

#[derive(Default)]
struct FieldOptions {
    name: Option<LitStr>,
    fallback: Option<LitStr>,
    direction: Option<Direction>,
    storage: Option<Storage>,
    mandatory: bool,
    len: Option<Expr>,
}

fn field_options(field: &Field) -> syn::Result<FieldOptions> {
    let mut opts = FieldOptions::default();
    for attr in field.attrs.iter().filter(|a| a.path().is_ident("h5")) {
        attr.parse_nested_meta(|meta| {
            let set_direction = |opts: &mut FieldOptions, d: Direction| {
                if opts.direction.replace(d).is_some() {
                    Err(meta.error("direction given twice"))
                } else {
                    Ok(())
                }
            };
            let set_storage = |opts: &mut FieldOptions, s: Storage| {
                if opts.storage.replace(s).is_some() {
                    Err(meta.error("storage given twice"))
                } else {
                    Ok(())
                }
            };
            if meta.path.is_ident("name") {
                opts.name = Some(meta.value()?.parse()?);
                Ok(())
            } else if meta.path.is_ident("fallback") {
                opts.fallback = Some(meta.value()?.parse()?);
                Ok(())
            } else if meta.path.is_ident("len") {
                opts.len = Some(meta.value()?.parse()?);
                Ok(())
            } else if meta.path.is_ident("read_only") {
                set_direction(&mut opts, Direction::ReadOnly)
            } else if meta.path.is_ident("write_only") {
                set_direction(&mut opts, Direction::WriteOnly)
            } else if meta.path.is_ident("skip") {
                set_direction(&mut opts, Direction::Skip)
            } else if meta.path.is_ident("dataset") {
                set_storage(&mut opts, Storage::Dataset)
            } else if meta.path.is_ident("group") {
                set_storage(&mut opts, Storage::Group)
            } else if meta.path.is_ident("mandatory") {
                opts.mandatory = true;
                Ok(())
            } else {
                Err(meta.error("unsupported h5 attribute"))
            }
        })?;
    }
    Ok(opts)
}

fn option_str(lit: &Option<LitStr>) -> TokenStream2 {
    match lit {
        Some(s) => quote! { ::core::option::Option::Some(#s) },
        None => quote! { ::core::option::Option::None },
    }
}

fn impl_h5object(input: &DeriveInput) -> syn::Result<TokenStream2> {
    let name = &input.ident;
    let name_str = name.to_string();
    let fields = named_fields(input, "H5Object")?;

    let mut descriptors = Vec::new();
    let mut write_stmts = Vec::new();
    let mut read_stmts = Vec::new();

    for (index, field) in fields.iter().enumerate() {
        let ident = field.ident.as_ref().expect("named field");
        let canonical = ident.to_string();
        let opts = field_options(field)?;
        if let Some(len) = &opts.len {
            return Err(syn::Error::new_spanned(len, "`len` only applies to H5Record"));
        }
        let direction = opts.direction.unwrap_or(Direction::ReadWrite);
        let storage = opts.storage.unwrap_or(Storage::Attribute);
        if direction == Direction::Skip && opts.mandatory {
            return Err(syn::Error::new_spanned(ident, "a skipped member cannot be mandatory"));
        }

        let direction_tokens = match direction {
            Direction::ReadWrite => quote! { ::h5store::Direction::ReadWrite },
            Direction::ReadOnly => quote! { ::h5store::Direction::ReadOnly },
            Direction::WriteOnly => quote! { ::h5store::Direction::WriteOnly },
            Direction::Skip => quote! { ::h5store::Direction::Skip },
        };
        let storage_tokens = match storage {
            Storage::Attribute => quote! { ::h5store::Storage::Attribute },
            Storage::Dataset => quote! { ::h5store::Storage::Dataset },
            Storage::Group => quote! { ::h5store::Storage::Group },
        };
        let rename = option_str(&opts.name);
        let fallback = option_str(&opts.fallback);
        let mandatory = opts.mandatory;
        descriptors.push(quote! {
            ::h5store::MemberDescriptor {
                canonical: #canonical,
                rename: #rename,
                fallback: #fallback,
                direction: #direction_tokens,
                storage: #storage_tokens,
                mandatory: #mandatory,
            }
        });

        let writes = matches!(direction, Direction::ReadWrite | Direction::WriteOnly);
        let reads = matches!(direction, Direction::ReadWrite | Direction::ReadOnly);
        let is_group = storage == Storage::Group;
        if writes {
            write_stmts.push(if is_group {
                quote! { writer.object(#index, &self.#ident)?; }
            } else {
                quote! { writer.value(#index, &self.#ident)?; }
            });
        }
        if reads {
            read_stmts.push(if is_group {
                quote! { reader.object(#index, &mut self.#ident)?; }
            } else {
                quote! { reader.value(#index, &mut self.#ident)?; }
            });
        }
    }

    Ok(quote! {
        impl ::h5store::H5Object for #name {
            fn policy() -> &'static ::h5store::MemberPolicy {
                const MEMBERS: &[::h5store::MemberDescriptor] = &[#(#descriptors),*];
                static POLICY: ::h5store::MemberPolicy = ::h5store::MemberPolicy::new(#name_str, MEMBERS);
                &POLICY
            }

            #[allow(unused_variables)]
            fn write_members(&self, writer: &mut ::h5store::ObjectWriter<'_>) -> ::h5store::Result<()> {
                #(#write_stmts)*
                ::core::result::Result::Ok(())
            }

            #[allow(unused_variables)]
            fn read_members(&mut self, reader: &mut ::h5store::ObjectReader<'_>) -> ::h5store::Result<()> {
                #(#read_stmts)*
                ::core::result::Result::Ok(())
            }
        }
    })
}

fn is_string(ty: &Type) -> bool {
    match ty {
        Type::Path(p) => p
            .path
            .segments
            .last()
            .is_some_and(|seg| seg.ident == "String" && seg.arguments.is_empty()),
        _ => false,
    }
}

fn impl_h5record(input: &DeriveInput) -> syn::Result<TokenStream2> {
    let name = &input.ident;
    let fields = named_fields(input, "H5Record")?;

    let mut field_descs = Vec::new();
    let mut encode_stmts = Vec::new();
    let mut decode_fields = Vec::new();

    for field in fields {
        let ident = field.ident.as_ref().expect("named field");
        let opts = field_options(field)?;
        if opts.direction.is_some() || opts.storage.is_some() || opts.mandatory || opts.fallback.is_some() {
            return Err(syn::Error::new_spanned(
                ident,
                "H5Record fields accept only `name` and `len`",
            ));
        }
        let member_name = match &opts.name {
            Some(lit) => lit.value(),
            None => ident.to_string(),
        };
        let ty = &field.ty;

        let (semantic, shape, encode, decode) = match (ty, &opts.len) {
            (Type::Array(arr), None) => {
                let elem = &*arr.elem;
                let len = &arr.len;
                (
                    quote! { <#elem as ::h5store::H5Scalar>::SEMANTIC },
                    quote! { ::h5store::FieldShape::Array(#len) },
                    quote! { encoder.array(&self.#ident)?; },
                    quote! { #ident: decoder.array()? },
                )
            }
            (ty, Some(len)) if is_string(ty) => (
                quote! { ::h5store::SemanticType::String },
                quote! { ::h5store::FieldShape::FixedString(#len) },
                quote! { encoder.fixed_string(&self.#ident)?; },
                quote! { #ident: decoder.fixed_string()? },
            ),
            (ty, None) if is_string(ty) => {
                return Err(syn::Error::new_spanned(
                    ty,
                    "String fields in a record need a cell length: #[h5(len = N)]",
                ));
            }
            (_, Some(len)) => {
                return Err(syn::Error::new_spanned(len, "`len` only applies to String fields"));
            }
            (ty, None) => (
                quote! { <#ty as ::h5store::H5Scalar>::SEMANTIC },
                quote! { ::h5store::FieldShape::Scalar },
                quote! { encoder.scalar(&self.#ident)?; },
                quote! { #ident: decoder.scalar()? },
            ),
        };

        field_descs.push(quote! {
            ::h5store::RecordField {
                name: #member_name,
                semantic: #semantic,
                shape: #shape,
            }
        });
        encode_stmts.push(encode);
        decode_fields.push(decode);
    }

    Ok(quote! {
        impl ::h5store::H5Record for #name {
            fn fields() -> &'static [::h5store::RecordField] {
                static FIELDS: &[::h5store::RecordField] = &[#(#field_descs),*];
                FIELDS
            }

            #[allow(unused_variables)]
            fn encode_fields(&self, encoder: &mut ::h5store::RecordEncoder<'_>) -> ::h5store::Result<()> {
                #(#encode_stmts)*
                ::core::result::Result::Ok(())
            }

            #[allow(unused_variables)]
            fn decode_fields(decoder: &mut ::h5store::RecordDecoder<'_>) -> ::h5store::Result<Self> {
                ::core::result::Result::Ok(#name {
                    #(#decode_fields),*
                })
            }
        }
    })
}
