//! Core tensor abstractions.
//!
//! The tensor module defines shapes, dtypes, typed element buffers and the host tensor
//! handle whose storage slot can be shared between variables without copying.

pub mod dtype;
mod host_tensor;
pub mod shape;
pub mod storage;

pub use dtype::DType;
pub use host_tensor::{Lod, Tensor};
pub use shape::Shape;
pub use storage::{Element, Storage, TensorData};

/// Ordered tensor list, the payload of feed/fetch column variables.
pub type TensorList = Vec<Tensor>;
