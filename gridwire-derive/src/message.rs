//! Derive macro implementation for `Message`.

use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use quote::quote;
use syn::spanned::Spanned;
use syn::{parse_macro_input, Data, DeriveInput, Error, Fields, Lit, Type};

/// How a field is framed.
enum FieldKind {
    Plain,
    Object,
    Nested(NestedShape),
}

enum NestedShape {
    Single,
    Array,
    Map,
}

#[derive(Default)]
struct FieldAttrs {
    skip: bool,
    nested: bool,
    object: bool,
}

pub fn derive_message_impl(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    expand(&input)
        .unwrap_or_else(Error::into_compile_error)
        .into()
}

fn expand(input: &DeriveInput) -> syn::Result<TokenStream2> {
    let name = &input.ident;
    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();

    let direct_type = parse_direct_type(&input.attrs)?.ok_or_else(|| {
        Error::new(
            name.span(),
            "Message requires #[message(direct_type = N)]",
        )
    })?;
    if direct_type == u8::MAX {
        return Err(Error::new(
            name.span(),
            "direct_type 255 is reserved for null messages",
        ));
    }

    let fields = match &input.data {
        Data::Struct(data) => match &data.fields {
            Fields::Named(fields) => fields.named.iter().collect::<Vec<_>>(),
            Fields::Unit => Vec::new(),
            Fields::Unnamed(_) => {
                return Err(Error::new(
                    name.span(),
                    "Message only supports structs with named fields",
                ))
            }
        },
        _ => {
            return Err(Error::new(
                name.span(),
                "Message can only be derived for structs",
            ))
        }
    };

    let mut write_stmts = Vec::new();
    let mut read_stmts = Vec::new();
    let mut index: u8 = 0;

    for field in fields {
        let Some(ident) = field.ident.as_ref() else {
            continue;
        };
        let attrs = parse_field_attrs(&field.attrs)?;
        if attrs.skip {
            continue;
        }
        let kind = field_kind(&attrs, &field.ty)?;
        let label = ident.to_string();

        let (write, read) = match kind {
            FieldKind::Plain => (
                quote! { writer.write_field(#index, #label, &self.#ident)? },
                quote! { reader.read_field(#index, #label, &mut self.#ident)? },
            ),
            FieldKind::Object => (
                quote! { writer.write_object(#index, #label, &self.#ident)? },
                quote! { reader.read_object(#index, #label, &mut self.#ident)? },
            ),
            FieldKind::Nested(NestedShape::Single) => (
                quote! { writer.write_message(#index, #label, self.#ident.as_ref())? },
                quote! { reader.read_message(#index, #label, &mut self.#ident)? },
            ),
            FieldKind::Nested(NestedShape::Array) => (
                quote! { writer.write_messages(#index, #label, Some(self.#ident.as_slice()))? },
                quote! { reader.read_messages(#index, #label, &mut self.#ident)? },
            ),
            FieldKind::Nested(NestedShape::Map) => (
                quote! { writer.write_message_map(#index, #label, Some(&self.#ident))? },
                quote! { reader.read_message_map(#index, #label, &mut self.#ident)? },
            ),
        };
        write_stmts.push(quote! {
            if !#write {
                return Ok(false);
            }
        });
        read_stmts.push(quote! {
            if !#read {
                return Ok(false);
            }
        });

        index = index
            .checked_add(1)
            .ok_or_else(|| Error::new(field.span(), "a message has at most 255 fields"))?;
    }

    let field_count = index;

    Ok(quote! {
        impl #impl_generics ::gridwire_core::protocol::Message for #name #ty_generics #where_clause {
            fn direct_type(&self) -> u8 {
                #direct_type
            }

            fn field_count(&self) -> u8 {
                #field_count
            }

            fn write_to(
                &self,
                writer: &mut ::gridwire_core::protocol::MessageWriter<'_, '_>,
            ) -> ::gridwire_core::Result<bool> {
                if !writer.write_header(self)? {
                    return Ok(false);
                }
                #(#write_stmts)*
                Ok(true)
            }

            #[allow(unused_variables)]
            fn read_from(
                &mut self,
                reader: &mut ::gridwire_core::protocol::MessageReader<'_, '_>,
            ) -> ::gridwire_core::Result<bool> {
                #(#read_stmts)*
                Ok(true)
            }
        }

        impl #impl_generics #name #ty_generics #where_clause {
            /// Wire type byte of this message.
            pub const DIRECT_TYPE: u8 = #direct_type;
        }
    })
}

fn field_kind(attrs: &FieldAttrs, ty: &Type) -> syn::Result<FieldKind> {
    if attrs.nested && attrs.object {
        return Err(Error::new(
            ty.span(),
            "a field cannot be both nested and object",
        ));
    }
    if attrs.object {
        return Ok(FieldKind::Object);
    }
    if !attrs.nested {
        return Ok(FieldKind::Plain);
    }
    let shape = match outer_type_name(ty).as_deref() {
        Some("Option") => NestedShape::Single,
        Some("Vec") => NestedShape::Array,
        Some("HashMap") => NestedShape::Map,
        _ => {
            return Err(Error::new(
                ty.span(),
                "nested fields must be Option<M>, Vec<M> or HashMap<K, M>",
            ))
        }
    };
    Ok(FieldKind::Nested(shape))
}

fn outer_type_name(ty: &Type) -> Option<String> {
    match ty {
        Type::Path(path) => path.path.segments.last().map(|s| s.ident.to_string()),
        _ => None,
    }
}

fn parse_direct_type(attrs: &[syn::Attribute]) -> syn::Result<Option<u8>> {
    let mut result = None;
    for attr in attrs {
        if !attr.path().is_ident("message") {
            continue;
        }
        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("direct_type") {
                let lit: Lit = meta.value()?.parse()?;
                match lit {
                    Lit::Int(int_lit) => result = Some(int_lit.base10_parse::<u8>()?),
                    other => return Err(Error::new(other.span(), "direct_type must be an integer")),
                }
                Ok(())
            } else {
                Err(meta.error("unsupported message attribute"))
            }
        })?;
    }
    Ok(result)
}

fn parse_field_attrs(attrs: &[syn::Attribute]) -> syn::Result<FieldAttrs> {
    let mut parsed = FieldAttrs::default();
    for attr in attrs {
        if !attr.path().is_ident("message") {
            continue;
        }
        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("skip") {
                parsed.skip = true;
            } else if meta.path.is_ident("nested") {
                parsed.nested = true;
            } else if meta.path.is_ident("object") {
                parsed.object = true;
            } else {
                return Err(meta.error("unsupported field attribute"));
            }
            Ok(())
        })?;
    }
    Ok(parsed)
}
