//! Binary elementwise operators with axis-aware broadcasting.

use mgraph_rs::error::{Error, Result};
use mgraph_rs::ops::{Operator, OperatorBase, OperatorDef};
use mgraph_rs::optimizer::FuseElementwiseAddRelu;
use mgraph_rs::scope::Scope;
use mgraph_rs::tensor::{DType, Element, Tensor};

use crate::broadcast::BroadcastPlan;
use crate::{dispatch_dtype, read_input, write_output};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryKind {
    Add,
    Sub,
    Mul,
    Div,
    Max,
    Min,
    Pow,
}

impl BinaryKind {
    pub const fn op_type(self) -> &'static str {
        match self {
            BinaryKind::Add => "elementwise_add",
            BinaryKind::Sub => "elementwise_sub",
            BinaryKind::Mul => "elementwise_mul",
            BinaryKind::Div => "elementwise_div",
            BinaryKind::Max => "elementwise_max",
            BinaryKind::Min => "elementwise_min",
            BinaryKind::Pow => "elementwise_pow",
        }
    }

    fn float_only(self) -> bool {
        matches!(self, BinaryKind::Pow)
    }

    /// `None` marks an undefined integer result: overflow or division by zero.
    fn apply<E: Element>(self, a: E, b: E) -> Option<E> {
        match self {
            BinaryKind::Add => a.checked_add(b),
            BinaryKind::Sub => a.checked_sub(b),
            BinaryKind::Mul => a.checked_mul(b),
            BinaryKind::Div => a.checked_div(b),
            BinaryKind::Max => Some(if a >= b { a } else { b }),
            BinaryKind::Min => Some(if a <= b { a } else { b }),
            BinaryKind::Pow => Some(E::from_f64(a.to_f64().powf(b.to_f64()))),
        }
    }

    fn undefined_reason<E: Element>(self, b: E) -> &'static str {
        if self == BinaryKind::Div && b == E::zero() {
            "integer division by zero"
        } else {
            "integer overflow"
        }
    }
}

/// `Out = X (op) Y`, optionally followed by relu.
#[derive(Debug)]
pub struct ElementwiseBinary {
    base: OperatorBase,
    kind: BinaryKind,
    fuse_relu: bool,
    axis: i64,
    x: String,
    y: String,
    out: String,
}

impl ElementwiseBinary {
    pub fn build(
        base: OperatorBase,
        kind: BinaryKind,
        fuse_relu: bool,
    ) -> Result<Box<dyn Operator>> {
        let x = base.input("X")?.to_string();
        let y = base.input("Y")?.to_string();
        let out = base.output("Out")?.to_string();
        let axis = base.attr_or("axis", -1i64)?;
        if axis < -1 {
            return Err(Error::invalid_attribute(
                base.op_type(),
                "axis",
                format!("must be -1 or a dimension index, got {axis}"),
            ));
        }
        Ok(Box::new(ElementwiseBinary {
            base,
            kind,
            fuse_relu,
            axis,
            x,
            y,
            out,
        }))
    }

    pub fn kind(&self) -> BinaryKind {
        self.kind
    }

    fn compute<E: Element>(
        &self,
        x: &Tensor,
        y: &Tensor,
        plan: &BroadcastPlan,
    ) -> Result<Vec<E>> {
        let xs = x.to_vec::<E>()?;
        let ys = y.to_vec::<E>()?;
        let xs = plan.expand(&xs, &plan.x_dims);
        let ys = plan.expand(&ys, &plan.y_dims);
        xs.iter()
            .zip(ys.iter())
            .map(|(&a, &b)| -> Result<E> {
                let value = self.kind.apply(a, b).ok_or_else(|| {
                    Error::compute(self.base.op_type(), self.kind.undefined_reason(b))
                })?;
                Ok(if self.fuse_relu && value < E::zero() {
                    E::zero()
                } else {
                    value
                })
            })
            .collect()
    }
}

impl Operator for ElementwiseBinary {
    fn base(&self) -> &OperatorBase {
        &self.base
    }

    fn run(&self, scope: &mut Scope<'_>) -> Result<()> {
        let x = read_input(scope, &self.x)?;
        let y = read_input(scope, &self.y)?;
        if x.dtype() != y.dtype() {
            return Err(Error::TypeMismatch {
                expected: x.dtype(),
                got: y.dtype(),
            });
        }
        if self.kind.float_only() && !x.dtype().is_float() {
            return Err(Error::TypeMismatch {
                expected: DType::F32,
                got: x.dtype(),
            });
        }
        let plan = BroadcastPlan::new(x.dims(), y.dims(), self.axis)?;
        dispatch_dtype!(x.dtype(), E => {
            let values = self.compute::<E>(&x, &y, &plan)?;
            write_output(scope, &self.out, &plan.out_dims, &values, x.lod())
        })
    }
}

macro_rules! register_binary {
    ($def:ident, $build:ident, $kind:expr) => {
        fn $build(base: OperatorBase, _scope: &Scope<'_>) -> Result<Box<dyn Operator>> {
            ElementwiseBinary::build(base, $kind, false)
        }

        #[mgraph_rs::linkme::distributed_slice(mgraph_rs::ops::OPERATOR_DEFS)]
        static $def: OperatorDef = OperatorDef {
            op_type: $kind.op_type(),
            module_path: module_path!(),
            build: $build,
        };
    };
}

register_binary!(ELEMENTWISE_ADD, build_add, BinaryKind::Add);
register_binary!(ELEMENTWISE_SUB, build_sub, BinaryKind::Sub);
register_binary!(ELEMENTWISE_MUL, build_mul, BinaryKind::Mul);
register_binary!(ELEMENTWISE_DIV, build_div, BinaryKind::Div);
register_binary!(ELEMENTWISE_MAX, build_max, BinaryKind::Max);
register_binary!(ELEMENTWISE_MIN, build_min, BinaryKind::Min);
register_binary!(ELEMENTWISE_POW, build_pow, BinaryKind::Pow);

fn build_fused_add_relu(base: OperatorBase, _scope: &Scope<'_>) -> Result<Box<dyn Operator>> {
    ElementwiseBinary::build(base, BinaryKind::Add, true)
}

#[mgraph_rs::linkme::distributed_slice(mgraph_rs::ops::OPERATOR_DEFS)]
static FUSION_ELEMENTWISE_ADD_RELU: OperatorDef = OperatorDef {
    op_type: FuseElementwiseAddRelu::FUSED_TYPE,
    module_path: module_path!(),
    build: build_fused_add_relu,
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn integer_division_by_zero_is_an_error() {
        assert_eq!(BinaryKind::Div.apply(7i32, 2), Some(3));
        assert_eq!(BinaryKind::Div.apply(7i32, 0), None);
        assert_eq!(BinaryKind::Div.undefined_reason(0i32), "integer division by zero");
        assert!(BinaryKind::Div.apply(1.0f32, 0.0).is_some_and(f32::is_infinite));
    }

    #[test]
    fn integer_overflow_is_an_error() {
        assert_eq!(BinaryKind::Div.apply(i32::MIN, -1), None);
        assert_eq!(BinaryKind::Div.undefined_reason(-1i32), "integer overflow");
        assert_eq!(BinaryKind::Add.apply(i32::MAX, 1), None);
        assert_eq!(BinaryKind::Sub.apply(i64::MIN, 1), None);
        assert_eq!(BinaryKind::Mul.apply(i64::MAX, 2), None);
        assert_eq!(BinaryKind::Add.apply(f32::MAX, f32::MAX), Some(f32::INFINITY));
    }

    #[test]
    fn max_min_pow() {
        assert_eq!(BinaryKind::Max.apply(-1i64, 3), Some(3));
        assert_eq!(BinaryKind::Min.apply(-1i64, 3), Some(-1));
        assert_eq!(BinaryKind::Pow.apply(2.0f64, 10.0), Some(1024.0));
    }
}
