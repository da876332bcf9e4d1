//! Immutable descriptor layer: programs, blocks, operators and attributes as parsed from a
//! model file. Pure data with structural accessors; declaration order is preserved
//! everywhere because it is the execution order.

pub mod attr;
mod block_desc;
mod op_desc;
mod program_desc;

pub use attr::{Attribute, AttributeMap, FromAttribute};
pub use block_desc::{BlockDesc, VarDesc};
pub use op_desc::{OpDesc, VariableNameMap};
pub use program_desc::{BlockId, ProgramDesc};
