use crate::backend::LoweredKernel;
use crate::error::CompileError;
use crate::ir::HostTensor;

/// Copies every constant buffer of `kernel` into an owned tensor, in the
/// order the backend reports them.
///
/// The result never borrows from the kernel, which can be dropped afterwards.
pub fn extract_constants<K: LoweredKernel + ?Sized>(
    kernel: &K,
) -> Result<Vec<HostTensor>, CompileError> {
    kernel
        .constant_descriptors()
        .into_iter()
        .map(|desc| {
            let shape = desc.buf.concrete_shape().ok_or_else(|| {
                let dims: Vec<String> = desc.buf.dims.iter().map(|d| d.to_string()).collect();
                CompileError::ContractViolation(format!(
                    "constant buffer `{}` has non-concrete shape [{}]",
                    desc.buf.name,
                    dims.join(", ")
                ))
            })?;
            HostTensor::from_slice(&shape, desc.data).map_err(|e| {
                CompileError::ContractViolation(format!("constant buffer `{}`: {e}", desc.buf.name))
            })
        })
        .collect()
}
