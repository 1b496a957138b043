//! Procedural macros used by the boot code.
use proc_macro::TokenStream;
use syn::{parse_macro_input, ItemFn};

/// A macro to indicate that a function is only used while the system is being brought up.
/// Functions with this attribute are put in a separate `.init` section when building for bare
/// metal, so the kernel can discard the section and reclaim its memory once every processor is
/// running.
///
/// On hosted targets the attribute does nothing: the `.init` section there belongs to the C
/// runtime and is executed at program startup.
///
/// # Safety
/// If a function with this attribute is called after the init section has been reclaimed, the
/// behavior is undefined.
#[proc_macro_attribute]
pub fn init(_: TokenStream, item: TokenStream) -> TokenStream {
    let mut input_fn = parse_macro_input!(item as ItemFn);
    input_fn
        .attrs
        .push(syn::parse_quote!(#[cfg_attr(target_os = "none", link_section = ".init")]));

    TokenStream::from(quote::quote!(
        #input_fn
    ))
}
