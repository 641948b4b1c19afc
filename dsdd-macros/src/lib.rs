//! Serialization helpers for the PCM container writers.
//!
//! - `#[derive(ToBytes)]` writes every field in declaration order through
//!   `crate::byteorder::{WriteBytesBe, WriteBytesLe}`.
//! - `#[caf_chunk_type(b"....")]` implements `crate::caf::CafChunk` for a
//!   struct whose body is its big-endian field layout.

use darling::Error;
use darling::ast::NestedMeta;
use proc_macro::{Span, TokenStream};
use quote::quote;
use syn::{Data, DeriveInput, ItemStruct, parse_macro_input};

#[proc_macro_derive(ToBytes)]
pub fn derive_to_bytes(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);

    let Data::Struct(data) = &input.data else {
        return syn::Error::new_spanned(&input.ident, "ToBytes can only be derived for structs")
            .to_compile_error()
            .into();
    };

    let name = &input.ident;
    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();
    let members: Vec<syn::Member> = data.fields.members().collect();

    quote! {
        impl #impl_generics crate::byteorder::WriteBytesBe for #name #ty_generics #where_clause {
            fn write_be(&self, dst: &mut Vec<u8>) {
                #( crate::byteorder::WriteBytesBe::write_be(&self.#members, dst); )*
            }
        }

        impl #impl_generics crate::byteorder::WriteBytesLe for #name #ty_generics #where_clause {
            fn write_le(&self, dst: &mut Vec<u8>) {
                #( crate::byteorder::WriteBytesLe::write_le(&self.#members, dst); )*
            }
        }
    }
    .into()
}

#[proc_macro_attribute]
pub fn caf_chunk_type(attr: TokenStream, item: TokenStream) -> TokenStream {
    let args = match NestedMeta::parse_meta_list(attr.into()) {
        Ok(args) => args,
        Err(e) => return Error::from(e).write_errors().into(),
    };

    let id = match args.as_slice() {
        [NestedMeta::Lit(syn::Lit::ByteStr(bs))] if bs.value().len() == 4 => bs.value(),
        _ => {
            return syn::Error::new(
                Span::call_site().into(),
                "caf_chunk_type expects a single 4 byte string, e.g. b\"desc\"",
            )
            .to_compile_error()
            .into();
        }
    };

    let input = parse_macro_input!(item as ItemStruct);
    let name = &input.ident;

    quote! {
        #input

        impl crate::caf::CafChunk for #name {
            fn chunk_type(&self) -> [u8; 4] {
                [#(#id),*]
            }

            fn chunk_data(&self) -> Vec<u8> {
                let mut data = Vec::new();
                crate::byteorder::WriteBytesBe::write_be(self, &mut data);
                data
            }
        }
    }
    .into()
}
