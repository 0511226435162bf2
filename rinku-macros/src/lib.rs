//! # **rinku** 宏
//!
//!

use proc_macro::TokenStream;
use quote::quote;
use syn::{DeriveInput, parse_macro_input};

/// 实现消息特征
///
/// 1. 实现 `rinku::Message` 特征，负载编解码采用 JSON。
///
/// 类型自身需实现 `serde::Serialize` 与 `serde::Deserialize`。
///
/// # Panics
///
/// 不支持带泛型参数的类型。
#[proc_macro_derive(Message)]
pub fn message(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    let name = &input.ident;

    if !input.generics.params.is_empty() {
        panic!("#[derive(Message)]不支持泛型类型`{}`", name);
    }

    let expanded = quote! {
        impl ::rinku::Message for #name {}
    };

    TokenStream::from(expanded)
}
