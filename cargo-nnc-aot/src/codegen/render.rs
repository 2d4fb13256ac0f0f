//! Renders a `KernelPlan` into a `TokenStream`.
//!
//! This is the only codegen file that depends on proc_macro2/quote.

use proc_macro2::{Ident, Span, TokenStream};
use quote::quote;

use crate::error::BackendError;

use super::plan::*;
use super::tensor_expr::BufferExprWriter;
use super::RustBackendOptions;

pub fn render(plan: &KernelPlan, options: &RustBackendOptions) -> Result<TokenStream, BackendError> {
    let kernels: syn::Path = syn::parse_str(&options.kernel_module).map_err(|e| {
        BackendError::Render(format!("invalid kernel module `{}`: {e}", options.kernel_module))
    })?;
    let entry: Ident = syn::parse_str(&options.entry_point).map_err(|e| {
        BackendError::Render(format!("invalid entry point `{}`: {e}", options.entry_point))
    })?;
    let writer = BufferExprWriter::new(plan, &kernels);

    let params = render_params(plan, &writer);
    let checks = render_arg_checks(plan, &writer);
    let param_views = render_param_views(plan, &writer);
    let temp_allocs = render_temp_allocs(plan, &writer);
    let calls: Vec<TokenStream> = plan
        .calls
        .iter()
        .map(|call| render_kernel_call(call, &writer))
        .collect();
    let scalar_stores = render_scalar_stores(plan, &writer);

    let num_params = plan.constants.len();
    let doc = format!(" Generated kernel `{entry}`, specialized for fixed input shapes.");

    Ok(quote! {
        #![doc = #doc]

        pub const NUM_PARAMS: usize = #num_params;

        pub fn #entry(#params params: &[&[f32]]) {
            #checks

            #param_views

            #temp_allocs

            #(#calls)*

            #scalar_stores
        }
    })
}

// ---------------------------------------------------------------------------
// Signature
// ---------------------------------------------------------------------------

fn render_params(plan: &KernelPlan, writer: &BufferExprWriter) -> TokenStream {
    let inputs = plan.inputs.iter().map(|&id| {
        let ident = writer.ident(id);
        quote!(#ident: &[f32],)
    });
    let outputs = plan.outputs.iter().enumerate().map(|(j, out)| match out {
        OutputArg::Buffer(id) => {
            let ident = writer.ident(*id);
            quote!(#ident: &mut [f32],)
        }
        OutputArg::Scalar(_) => {
            let ident = scalar_output_ident(j);
            quote!(#ident: &mut f32,)
        }
    });
    quote!(#(#inputs)* #(#outputs)*)
}

fn scalar_output_ident(index: usize) -> Ident {
    Ident::new(&format!("out_{index}"), Span::call_site())
}

fn render_arg_checks(plan: &KernelPlan, writer: &BufferExprWriter) -> TokenStream {
    let buffers = plan
        .inputs
        .iter()
        .copied()
        .chain(plan.outputs.iter().filter_map(|out| match out {
            OutputArg::Buffer(id) => Some(*id),
            OutputArg::Scalar(_) => None,
        }))
        .map(|id| {
            let ident = writer.ident(id);
            let len = plan.buffer(id).numel();
            quote!(assert_eq!(#ident.len(), #len);)
        });
    quote! {
        assert_eq!(params.len(), NUM_PARAMS);
        #(#buffers)*
    }
}

// ---------------------------------------------------------------------------
// Parameter views and temporaries
// ---------------------------------------------------------------------------

fn render_param_views(plan: &KernelPlan, writer: &BufferExprWriter) -> TokenStream {
    let views = plan.constants.iter().enumerate().map(|(i, (id, _))| {
        let ident = writer.ident(*id);
        let len = plan.buffer(*id).numel();
        quote! {
            let #ident: &[f32] = params[#i];
            assert_eq!(#ident.len(), #len);
        }
    });
    quote!(#(#views)*)
}

fn render_temp_allocs(plan: &KernelPlan, writer: &BufferExprWriter) -> TokenStream {
    let allocs = plan
        .buffers
        .iter()
        .enumerate()
        .filter(|(_, b)| b.role == BufferRole::Temp)
        .map(|(id, b)| {
            let ident = writer.ident(id);
            let size = b.numel();
            quote!(let mut #ident = vec![0.0f32; #size];)
        });
    quote!(#(#allocs)*)
}

// ---------------------------------------------------------------------------
// Kernel call rendering
// ---------------------------------------------------------------------------

fn render_kernel_call(call: &KernelCall, writer: &BufferExprWriter) -> TokenStream {
    let k = writer.kernels();
    match call {
        KernelCall::Binary {
            kind,
            lhs,
            rhs,
            output,
        } => {
            let kind = variant(kind);
            let lhs = writer.arg(*lhs);
            let rhs = writer.arg(*rhs);
            let out = writer.write(*output);
            let shape = writer.shape(*output);
            quote! { #k::binary(#k::BinaryKind::#kind, #lhs, #rhs, #out, #shape); }
        }

        KernelCall::ScalarBinary {
            kind,
            lhs,
            rhs,
            output,
        } => {
            let kind = variant(kind);
            let lhs = writer.scalar(*lhs);
            let rhs = writer.scalar(*rhs);
            let slot = writer.slot(*output);
            quote! { let #slot: f32 = #k::BinaryKind::#kind.apply(#lhs, #rhs); }
        }

        KernelCall::Unary {
            kind,
            input,
            output,
        } => {
            let kind = variant(kind);
            let input = writer.read(*input);
            let out = writer.write(*output);
            quote! { #k::unary(#k::UnaryKind::#kind, #input, #out); }
        }

        KernelCall::ScalarUnary {
            kind,
            input,
            output,
        } => {
            let kind = variant(kind);
            let input = writer.scalar(*input);
            let slot = writer.slot(*output);
            quote! { let #slot: f32 = #k::UnaryKind::#kind.apply(#input); }
        }

        KernelCall::MatMul {
            lhs,
            rhs,
            output,
            m,
            k: depth,
            n,
        } => {
            let a = writer.read(*lhs);
            let b = writer.read(*rhs);
            let c = writer.write(*output);
            quote! { #k::matmul(#a, #b, #c, #m, #depth, #n); }
        }

        KernelCall::Transpose {
            input,
            output,
            rows,
            cols,
        } => {
            let input = writer.read(*input);
            let out = writer.write(*output);
            quote! { #k::transpose(#input, #out, #rows, #cols); }
        }

        KernelCall::Sum { input, output } => {
            let input = writer.read(*input);
            let out = writer.write(*output);
            quote! { #k::sum(#input, #out); }
        }

        KernelCall::Item { input, output } => {
            let value = writer.scalar(Operand::Buffer(*input));
            let slot = writer.slot(*output);
            quote! { let #slot: f32 = #value; }
        }

        KernelCall::Copy { input, output } => {
            let input = writer.read(*input);
            let out = writer.write(*output);
            quote! { #k::copy(#input, #out); }
        }
    }
}

fn render_scalar_stores(plan: &KernelPlan, writer: &BufferExprWriter) -> TokenStream {
    let stores = plan.outputs.iter().enumerate().filter_map(|(j, out)| match out {
        OutputArg::Scalar(value) => {
            let ident = scalar_output_ident(j);
            let value = writer.scalar(*value);
            Some(quote!(*#ident = #value;))
        }
        OutputArg::Buffer(_) => None,
    });
    quote!(#(#stores)*)
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Enum variant identifier from its `Debug` name (`Add`, `Relu`, ...).
fn variant(kind: &impl std::fmt::Debug) -> Ident {
    Ident::new(&format!("{kind:?}"), Span::call_site())
}
