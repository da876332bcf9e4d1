use mgraph_rs::error::{Error, Result};
use mgraph_rs::ops::{Operator, OperatorBase, OperatorDef};
use mgraph_rs::scope::Scope;
use mgraph_rs::tensor::Element;

use crate::{dispatch_dtype, read_input, write_output};

/// `Out = scale * X + bias`, or `scale * (X + bias)` when `bias_after_scale` is false.
///
/// Floats are computed in `f64` and rounded back to the input dtype. Integers are computed
/// in their own type with `scale` and `bias` truncated to it; overflow is an error.
#[derive(Debug)]
pub struct ScaleOp {
    base: OperatorBase,
    scale: f32,
    bias: f32,
    bias_after_scale: bool,
    x: String,
    out: String,
}

impl ScaleOp {
    fn apply<E: Element>(&self, v: E) -> Option<E> {
        if E::DTYPE.is_float() {
            let (scale, bias, v) = (f64::from(self.scale), f64::from(self.bias), v.to_f64());
            return Some(if self.bias_after_scale {
                E::from_f64(scale * v + bias)
            } else {
                E::from_f64(scale * (v + bias))
            });
        }
        let scale = E::from_f64(f64::from(self.scale));
        let bias = E::from_f64(f64::from(self.bias));
        if self.bias_after_scale {
            v.checked_mul(scale)?.checked_add(bias)
        } else {
            v.checked_add(bias)?.checked_mul(scale)
        }
    }
}

impl Operator for ScaleOp {
    fn base(&self) -> &OperatorBase {
        &self.base
    }

    fn run(&self, scope: &mut Scope<'_>) -> Result<()> {
        let x = read_input(scope, &self.x)?;
        dispatch_dtype!(x.dtype(), E => {
            let values: Option<Vec<E>> =
                x.with_data(|xs: &[E]| xs.iter().map(|&v| self.apply(v)).collect())?;
            let values =
                values.ok_or_else(|| Error::compute(self.base.op_type(), "integer overflow"))?;
            write_output(scope, &self.out, x.dims(), &values, x.lod())
        })
    }
}

fn build_scale(base: OperatorBase, _scope: &Scope<'_>) -> Result<Box<dyn Operator>> {
    let x = base.input("X")?.to_string();
    let out = base.output("Out")?.to_string();
    let scale = base.attr_or("scale", 1.0f32)?;
    let bias = base.attr_or("bias", 0.0f32)?;
    let bias_after_scale = base.attr_or("bias_after_scale", true)?;
    for (name, value) in [("scale", scale), ("bias", bias)] {
        if !value.is_finite() {
            return Err(Error::invalid_attribute(
                base.op_type(),
                name,
                format!("must be finite, got {value}"),
            ));
        }
    }
    Ok(Box::new(ScaleOp {
        base,
        scale,
        bias,
        bias_after_scale,
        x,
        out,
    }))
}

#[mgraph_rs::linkme::distributed_slice(mgraph_rs::ops::OPERATOR_DEFS)]
static SCALE: OperatorDef = OperatorDef {
    op_type: "scale",
    module_path: module_path!(),
    build: build_scale,
};
