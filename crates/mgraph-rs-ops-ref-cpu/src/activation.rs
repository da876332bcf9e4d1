use mgraph_rs::error::{Error, Result};
use mgraph_rs::ops::{Operator, OperatorBase, OperatorDef};
use mgraph_rs::scope::Scope;
use mgraph_rs::tensor::{DType, Element};

use crate::{dispatch_dtype, read_input, write_output};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Activation {
    Relu,
    Sigmoid,
    Tanh,
}

impl Activation {
    pub const fn op_type(self) -> &'static str {
        match self {
            Activation::Relu => "relu",
            Activation::Sigmoid => "sigmoid",
            Activation::Tanh => "tanh",
        }
    }

    fn apply<E: Element>(self, v: E) -> E {
        match self {
            Activation::Relu => {
                if v < E::zero() {
                    E::zero()
                } else {
                    v
                }
            }
            Activation::Sigmoid => E::from_f64(1.0 / (1.0 + (-v.to_f64()).exp())),
            Activation::Tanh => E::from_f64(v.to_f64().tanh()),
        }
    }
}

/// `Out = f(X)` with the shape and LoD of `X`.
#[derive(Debug)]
pub struct ActivationOp {
    base: OperatorBase,
    activation: Activation,
    x: String,
    out: String,
}

impl ActivationOp {
    pub fn build(base: OperatorBase, activation: Activation) -> Result<Box<dyn Operator>> {
        let x = base.input("X")?.to_string();
        let out = base.output("Out")?.to_string();
        Ok(Box::new(ActivationOp {
            base,
            activation,
            x,
            out,
        }))
    }
}

impl Operator for ActivationOp {
    fn base(&self) -> &OperatorBase {
        &self.base
    }

    fn run(&self, scope: &mut Scope<'_>) -> Result<()> {
        let x = read_input(scope, &self.x)?;
        if self.activation != Activation::Relu && !x.dtype().is_float() {
            return Err(Error::TypeMismatch {
                expected: DType::F32,
                got: x.dtype(),
            });
        }
        dispatch_dtype!(x.dtype(), E => {
            let values: Vec<E> = x.with_data(|xs: &[E]| {
                xs.iter().map(|&v| self.activation.apply(v)).collect()
            })?;
            write_output(scope, &self.out, x.dims(), &values, x.lod())
        })
    }
}

macro_rules! register_activation {
    ($def:ident, $build:ident, $activation:expr) => {
        fn $build(base: OperatorBase, _scope: &Scope<'_>) -> Result<Box<dyn Operator>> {
            ActivationOp::build(base, $activation)
        }

        #[mgraph_rs::linkme::distributed_slice(mgraph_rs::ops::OPERATOR_DEFS)]
        static $def: OperatorDef = OperatorDef {
            op_type: $activation.op_type(),
            module_path: module_path!(),
            build: $build,
        };
    };
}

register_activation!(RELU, build_relu, Activation::Relu);
register_activation!(SIGMOID, build_sigmoid, Activation::Sigmoid);
register_activation!(TANH, build_tanh, Activation::Tanh);
