//! Enumerates the scalar element types a tensor buffer can hold.

use serde::{Deserialize, Serialize};

/// Logical dtype identifier shared between descriptors, tensors and archives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DType {
    /// 32-bit floating point following IEEE-754 semantics.
    F32,
    /// 64-bit floating point.
    F64,
    /// 32-bit signed integer.
    I32,
    /// 64-bit signed integer, used for index and shape tensors.
    I64,
}

impl DType {
    /// Returns the number of bytes required per scalar element.
    pub fn size_in_bytes(self) -> usize {
        match self {
            DType::F32 | DType::I32 => 4,
            DType::F64 | DType::I64 => 8,
        }
    }

    pub fn is_float(self) -> bool {
        matches!(self, DType::F32 | DType::F64)
    }

    /// Produces a stable tag used when serializing tensors to disk.
    pub fn tag(self) -> u32 {
        match self {
            DType::F32 => 0,
            DType::F64 => 1,
            DType::I32 => 2,
            DType::I64 => 3,
        }
    }

    /// Reconstructs a `DType` from its serialized tag representation.
    pub fn from_tag(tag: u32) -> Option<Self> {
        match tag {
            0 => Some(DType::F32),
            1 => Some(DType::F64),
            2 => Some(DType::I32),
            3 => Some(DType::I64),
            _ => None,
        }
    }
}
