//! Operator attribute values.
//!
//! Attributes are limited to a closed set of primitives, homogeneous arrays and block
//! references so they stay easy to serialize and validate. Typed lookups go through
//! [`FromAttribute`]; asking for the wrong kind is an error, never a coercion.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::program_desc::BlockId;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Attribute {
    Int(i64),
    Float(f32),
    Bool(bool),
    String(String),
    Ints(Vec<i64>),
    Floats(Vec<f32>),
    Bools(Vec<bool>),
    Strings(Vec<String>),
    Block(BlockId),
}

impl Attribute {
    /// Short kind name used in diagnostics.
    pub fn kind(&self) -> &'static str {
        match self {
            Attribute::Int(_) => "int",
            Attribute::Float(_) => "float",
            Attribute::Bool(_) => "bool",
            Attribute::String(_) => "string",
            Attribute::Ints(_) => "ints",
            Attribute::Floats(_) => "floats",
            Attribute::Bools(_) => "bools",
            Attribute::Strings(_) => "strings",
            Attribute::Block(_) => "block",
        }
    }
}

/// Attribute name to value, ordered by name.
pub type AttributeMap = BTreeMap<String, Attribute>;

/// Typed extraction from an [`Attribute`].
pub trait FromAttribute: Sized {
    const KIND: &'static str;

    fn from_attribute(attr: &Attribute) -> Option<Self>;
}

macro_rules! impl_from_attribute {
    ($ty:ty, $variant:ident, $kind:literal) => {
        impl FromAttribute for $ty {
            const KIND: &'static str = $kind;

            fn from_attribute(attr: &Attribute) -> Option<Self> {
                match attr {
                    Attribute::$variant(value) => Some(value.clone()),
                    _ => None,
                }
            }
        }

        impl From<$ty> for Attribute {
            fn from(value: $ty) -> Self {
                Attribute::$variant(value)
            }
        }
    };
}

impl_from_attribute!(i64, Int, "int");
impl_from_attribute!(f32, Float, "float");
impl_from_attribute!(bool, Bool, "bool");
impl_from_attribute!(String, String, "string");
impl_from_attribute!(Vec<i64>, Ints, "ints");
impl_from_attribute!(Vec<f32>, Floats, "floats");
impl_from_attribute!(Vec<bool>, Bools, "bools");
impl_from_attribute!(Vec<String>, Strings, "strings");
impl_from_attribute!(BlockId, Block, "block");

impl From<&str> for Attribute {
    fn from(value: &str) -> Self {
        Attribute::String(value.to_string())
    }
}
