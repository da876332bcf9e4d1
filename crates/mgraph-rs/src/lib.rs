extern crate self as mgraph_rs;

pub use linkme;

pub mod desc;
mod env;
pub mod error;
pub mod exec;
pub mod io;
pub mod ops;
pub mod optimizer;
pub mod scope;
pub mod tensor;

pub use desc::{BlockId, OpDesc, ProgramDesc};
pub use error::{Error, Result};
pub use exec::{Executor, ExecutorConfig, Program, ProgramVariant};
pub use scope::Scope;
pub use tensor::{DType, Shape, Tensor};
