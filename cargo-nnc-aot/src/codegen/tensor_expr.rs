use proc_macro2::{Ident, Literal, Span, TokenStream};
use quote::quote;

use super::plan::{BufId, KernelPlan, Operand, SlotId};

/**
 * Helper struct for generating buffer expressions for a given plan.
 */
pub struct BufferExprWriter<'a> {
    pub plan: &'a KernelPlan,
    kernels: &'a syn::Path,
}

impl<'a> BufferExprWriter<'a> {
    pub fn new(plan: &'a KernelPlan, kernels: &'a syn::Path) -> Self {
        Self { plan, kernels }
    }

    /// Path of the kernel module, e.g. `nnc_aot::kernels`.
    pub fn kernels(&self) -> &syn::Path {
        self.kernels
    }

    /// Variable identifier for a buffer: its handle name (`in_0`, `c_1`, `t_7`, `out_0`).
    pub fn ident(&self, id: BufId) -> Ident {
        Ident::new(&self.plan.buffer(id).handle.name, Span::call_site())
    }

    /// Scalar local: `s_{id}`.
    pub fn slot(&self, id: SlotId) -> Ident {
        Ident::new(&format!("s_{id}"), Span::call_site())
    }

    /// `&[f32]` expression. Works for slices, `&mut` slices and `Vec`s alike.
    pub fn read(&self, id: BufId) -> TokenStream {
        let ident = self.ident(id);
        quote!(&#ident[..])
    }

    /// `&mut [f32]` expression.
    pub fn write(&self, id: BufId) -> TokenStream {
        let ident = self.ident(id);
        quote!(&mut #ident[..])
    }

    /// Shape literal for a buffer: `&[dim0, dim1, ...]`.
    pub fn shape(&self, id: BufId) -> TokenStream {
        let dims = &self.plan.buffer(id).shape;
        quote!(&[#(#dims),*])
    }

    /// `f32` expression for a scalar operand.
    pub fn scalar(&self, operand: Operand) -> TokenStream {
        match operand {
            Operand::Literal(v) => f32_tokens(v),
            Operand::Slot(s) => {
                let ident = self.slot(s);
                quote!(#ident)
            }
            Operand::Buffer(b) => {
                let ident = self.ident(b);
                quote!(#ident[0])
            }
        }
    }

    /// `Arg` expression for a broadcasting kernel.
    pub fn arg(&self, operand: Operand) -> TokenStream {
        let k = self.kernels;
        match operand {
            Operand::Buffer(b) => {
                let data = self.read(b);
                let shape = self.shape(b);
                quote!(#k::Arg::Tensor(#data, #shape))
            }
            scalar => {
                let value = self.scalar(scalar);
                quote!(#k::Arg::Scalar(#value))
            }
        }
    }
}

/// An `f32` literal, spelled so that it survives a print/parse round trip.
pub fn f32_tokens(v: f32) -> TokenStream {
    if v.is_nan() {
        quote!(f32::NAN)
    } else if v == f32::INFINITY {
        quote!(f32::INFINITY)
    } else if v == f32::NEG_INFINITY {
        quote!(f32::NEG_INFINITY)
    } else if v.is_sign_negative() {
        let lit = Literal::f32_suffixed(-v);
        quote!(-#lit)
    } else {
        let lit = Literal::f32_suffixed(v);
        quote!(#lit)
    }
}
