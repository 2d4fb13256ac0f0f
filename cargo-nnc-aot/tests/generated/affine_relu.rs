//! Generated kernel `nnc_kernel`, specialized for fixed input shapes.
pub const NUM_PARAMS: usize = 2usize;
pub fn nnc_kernel(in_0: &[f32], out_0: &mut [f32], params: &[&[f32]]) {
    assert_eq!(params.len(), NUM_PARAMS);
    assert_eq!(in_0.len(), 10usize);
    assert_eq!(out_0.len(), 10usize);
    let c_0: &[f32] = params[0usize];
    assert_eq!(c_0.len(), 10usize);
    let c_1: &[f32] = params[1usize];
    assert_eq!(c_1.len(), 10usize);
    let mut t_3 = vec![0.0f32; 10usize];
    let mut t_4 = vec![0.0f32; 10usize];
    nnc_aot::kernels::binary(
        nnc_aot::kernels::BinaryKind::Mul,
        nnc_aot::kernels::Arg::Tensor(&c_0[..], &[10usize]),
        nnc_aot::kernels::Arg::Tensor(&in_0[..], &[1usize, 10usize]),
        &mut t_3[..],
        &[1usize, 10usize],
    );
    nnc_aot::kernels::binary(
        nnc_aot::kernels::BinaryKind::Add,
        nnc_aot::kernels::Arg::Tensor(&t_3[..], &[1usize, 10usize]),
        nnc_aot::kernels::Arg::Tensor(&c_1[..], &[10usize]),
        &mut t_4[..],
        &[1usize, 10usize],
    );
    nnc_aot::kernels::unary(nnc_aot::kernels::UnaryKind::Relu, &t_4[..], &mut out_0[..]);
}
