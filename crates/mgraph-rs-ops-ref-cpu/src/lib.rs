//! Reference CPU kernels for the mgraph-rs operator set.
//!
//! Every operator here registers itself into [`mgraph_rs::ops::OPERATOR_DEFS`] at link time,
//! so linking this crate is enough for [`OperatorRegistry::builtin`] to know about it.
//! Kernels favour clarity over speed: inputs are copied out of their storage before the
//! output is written, which also makes in-place operators (output aliasing an input) safe.

pub mod activation;
pub mod broadcast;
pub mod elementwise;
pub mod feed_fetch;
pub mod scale;

use std::sync::Arc;

use mgraph_rs::error::Result;
use mgraph_rs::ops::{OperatorRegistry, OPERATOR_DEFS};
use mgraph_rs::scope::Scope;
use mgraph_rs::tensor::{Element, Lod, Tensor};

/// Expands `$body` once per dtype with `$E` bound to the matching element type.
macro_rules! dispatch_dtype {
    ($dtype:expr, $E:ident => $body:expr) => {
        match $dtype {
            mgraph_rs::tensor::DType::F32 => {
                type $E = f32;
                $body
            }
            mgraph_rs::tensor::DType::F64 => {
                type $E = f64;
                $body
            }
            mgraph_rs::tensor::DType::I32 => {
                type $E = i32;
                $body
            }
            mgraph_rs::tensor::DType::I64 => {
                type $E = i64;
                $body
            }
        }
    };
}
pub(crate) use dispatch_dtype;

/// Operator types contributed by this crate, sorted.
pub fn op_types() -> Vec<&'static str> {
    let module = module_path!();
    let mut types: Vec<&'static str> = OPERATOR_DEFS
        .iter()
        .filter(|def| def.module_path.starts_with(module))
        .map(|def| def.op_type)
        .collect();
    types.sort_unstable();
    types
}

/// The builtin registry, which includes every reference operator.
pub fn builtin_registry() -> Arc<OperatorRegistry> {
    let registry = OperatorRegistry::builtin();
    tracing::debug!(
        reference_ops = op_types().len(),
        total = registry.len(),
        "reference cpu operators linked"
    );
    registry
}

/// Adds every reference operator to `registry`.
pub fn register_reference_ops(registry: &mut OperatorRegistry) {
    let module = module_path!();
    for def in OPERATOR_DEFS
        .iter()
        .filter(|def| def.module_path.starts_with(module))
    {
        registry.register(def.op_type, def.build);
    }
}

/// Sizes the output variable `name` for `dims` and stores `values` into it.
///
/// The variable's current storage slot is reused when it already fits, so a fed tensor
/// bound as an output is updated in place and the caller observes the result.
pub(crate) fn write_output<E: Element>(
    scope: &mut Scope<'_>,
    name: &str,
    dims: &[usize],
    values: &[E],
    lod: &Lod,
) -> Result<()> {
    let out = scope.tensor_mut(name)?;
    out.mutable_data(dims, E::DTYPE);
    out.set_lod(lod.clone());
    out.copy_from_slice(values)
}

/// Reads an input tensor handle. The handle aliases the variable's storage.
pub(crate) fn read_input(scope: &Scope<'_>, name: &str) -> Result<Tensor> {
    scope.tensor(name).cloned()
}
