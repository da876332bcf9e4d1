//! Operator trait, lifecycle and factory.

mod operator;
pub mod registry;

pub use operator::{Operator, OperatorBase, OperatorState, PreparedOp};
pub use registry::{BuildFn, OperatorDef, OperatorRegistry, OPERATOR_DEFS};
