use proc_macro::TokenStream;
use quote::quote;
use syn::{parse_macro_input, ItemFn, LitStr, ReturnType};

/// Time an async client method and report the outcome to the `reporter` field of `self`.
///
/// The method must return a `Result`. The operation is reported under the name given by
/// `operation`, or under the method name if no name is given.
///
/// ```ignore
/// #[truapi_instrument(operation = "fetch test")]
/// pub async fn list_load_tests(&self) -> LaunchResult<Vec<TestResource>> { ... }
/// ```
#[proc_macro_attribute]
pub fn truapi_instrument(args: TokenStream, input: TokenStream) -> TokenStream {
    let mut operation: Option<LitStr> = None;
    let args_parser = syn::meta::parser(|meta| {
        if meta.path.is_ident("operation") {
            operation = Some(meta.value()?.parse()?);
            Ok(())
        } else {
            Err(meta.error("unsupported truapi_instrument property"))
        }
    });
    parse_macro_input!(args with args_parser);

    let mut input = parse_macro_input!(input as ItemFn);

    if input.sig.asyncness.is_none() {
        return syn::Error::new_spanned(&input.sig, "truapi_instrument requires an async fn")
            .to_compile_error()
            .into();
    }

    let response_type = match &input.sig.output {
        ReturnType::Type(_, ty) => ty.clone(),
        ReturnType::Default => {
            return syn::Error::new_spanned(&input.sig, "truapi_instrument requires a Result")
                .to_compile_error()
                .into();
        }
    };

    let operation = operation
        .map(|lit| lit.value())
        .unwrap_or_else(|| input.sig.ident.to_string());

    let block = &input.block;
    input.block = syn::parse_quote! {
        {
            let operation_record = truapi_instruments::OperationRecord::new(#operation.to_string());
            let response: #response_type = async move #block.await;
            truapi_instruments::report_operation(&self.reporter, operation_record, &response);
            response
        }
    };

    TokenStream::from(quote!(#input))
}
