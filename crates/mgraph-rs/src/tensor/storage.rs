//! Typed tensor buffers and the shared storage slot several tensor handles can alias.

use std::fmt;
use std::ops::{Add, Div, Mul, Sub};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use super::dtype::DType;

/// Owned, typed element buffer.
#[derive(Debug, Clone, PartialEq)]
pub enum TensorData {
    F32(Vec<f32>),
    F64(Vec<f64>),
    I32(Vec<i32>),
    I64(Vec<i64>),
}

impl TensorData {
    /// Allocates a zero-filled buffer of `len` elements.
    pub fn zeros(dtype: DType, len: usize) -> Self {
        match dtype {
            DType::F32 => TensorData::F32(vec![0.0; len]),
            DType::F64 => TensorData::F64(vec![0.0; len]),
            DType::I32 => TensorData::I32(vec![0; len]),
            DType::I64 => TensorData::I64(vec![0; len]),
        }
    }

    pub fn dtype(&self) -> DType {
        match self {
            TensorData::F32(_) => DType::F32,
            TensorData::F64(_) => DType::F64,
            TensorData::I32(_) => DType::I32,
            TensorData::I64(_) => DType::I64,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            TensorData::F32(v) => v.len(),
            TensorData::F64(v) => v.len(),
            TensorData::I32(v) => v.len(),
            TensorData::I64(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn byte_len(&self) -> usize {
        self.len() * self.dtype().size_in_bytes()
    }
}

/// Trait describing numeric behaviour required by tensor storages.
///
/// Every implementor maps to exactly one [`DType`] and knows how to view a [`TensorData`]
/// of that dtype as a typed slice.
pub trait Element:
    Copy
    + Default
    + PartialEq
    + PartialOrd
    + fmt::Debug
    + Send
    + Sync
    + 'static
    + Add<Output = Self>
    + Sub<Output = Self>
    + Mul<Output = Self>
    + Div<Output = Self>
{
    const DTYPE: DType;

    /// Returns the additive identity for the element type.
    fn zero() -> Self;
    /// Returns the multiplicative identity for the element type.
    fn one() -> Self;
    fn from_f64(v: f64) -> Self;
    fn to_f64(self) -> f64;

    /// Checked arithmetic. Floats always yield a value (IEEE semantics); integers yield
    /// `None` on overflow and on division by zero.
    fn checked_add(self, rhs: Self) -> Option<Self>;
    fn checked_sub(self, rhs: Self) -> Option<Self>;
    fn checked_mul(self, rhs: Self) -> Option<Self>;
    fn checked_div(self, rhs: Self) -> Option<Self>;

    fn slice(data: &TensorData) -> Option<&[Self]>;
    fn slice_mut(data: &mut TensorData) -> Option<&mut [Self]>;
    fn into_data(values: Vec<Self>) -> TensorData;
}

macro_rules! checked_ops {
    (float) => {
        fn checked_add(self, rhs: Self) -> Option<Self> {
            Some(self + rhs)
        }

        fn checked_sub(self, rhs: Self) -> Option<Self> {
            Some(self - rhs)
        }

        fn checked_mul(self, rhs: Self) -> Option<Self> {
            Some(self * rhs)
        }

        fn checked_div(self, rhs: Self) -> Option<Self> {
            Some(self / rhs)
        }
    };
    (int) => {
        fn checked_add(self, rhs: Self) -> Option<Self> {
            <Self>::checked_add(self, rhs)
        }

        fn checked_sub(self, rhs: Self) -> Option<Self> {
            <Self>::checked_sub(self, rhs)
        }

        fn checked_mul(self, rhs: Self) -> Option<Self> {
            <Self>::checked_mul(self, rhs)
        }

        fn checked_div(self, rhs: Self) -> Option<Self> {
            <Self>::checked_div(self, rhs)
        }
    };
}

macro_rules! impl_element {
    ($ty:ty, $variant:ident, $zero:expr, $one:expr, $arith:ident) => {
        impl Element for $ty {
            const DTYPE: DType = DType::$variant;

            fn zero() -> Self {
                $zero
            }

            fn one() -> Self {
                $one
            }

            fn from_f64(v: f64) -> Self {
                v as $ty
            }

            fn to_f64(self) -> f64 {
                self as f64
            }

            checked_ops!($arith);

            fn slice(data: &TensorData) -> Option<&[Self]> {
                match data {
                    TensorData::$variant(values) => Some(values),
                    _ => None,
                }
            }

            fn slice_mut(data: &mut TensorData) -> Option<&mut [Self]> {
                match data {
                    TensorData::$variant(values) => Some(values),
                    _ => None,
                }
            }

            fn into_data(values: Vec<Self>) -> TensorData {
                TensorData::$variant(values)
            }
        }
    };
}

impl_element!(f32, F32, 0.0, 1.0, float);
impl_element!(f64, F64, 0.0, 1.0, float);
impl_element!(i32, I32, 0, 1, int);
impl_element!(i64, I64, 0, 1, int);

/// Reference-counted storage slot.
///
/// The slot is the single owner of the element buffer; tensor handles hold clones of the
/// `Arc` and therefore observe each other's writes. Giving a tensor new storage swaps its
/// handle for a fresh slot and leaves the other handles untouched.
#[derive(Clone)]
pub struct Storage {
    slot: Arc<RwLock<TensorData>>,
}

impl Storage {
    pub fn new(data: TensorData) -> Self {
        Storage {
            slot: Arc::new(RwLock::new(data)),
        }
    }

    pub fn read(&self) -> RwLockReadGuard<'_, TensorData> {
        self.slot.read().expect("tensor storage poisoned")
    }

    pub fn write(&self) -> RwLockWriteGuard<'_, TensorData> {
        self.slot.write().expect("tensor storage poisoned")
    }

    /// Reports whether both handles point at the same slot.
    pub fn same_slot(&self, other: &Storage) -> bool {
        Arc::ptr_eq(&self.slot, &other.slot)
    }

    /// Number of tensor handles currently sharing this slot.
    pub fn handle_count(&self) -> usize {
        Arc::strong_count(&self.slot)
    }
}

impl fmt::Debug for Storage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let data = self.read();
        f.debug_struct("Storage")
            .field("dtype", &data.dtype())
            .field("len", &data.len())
            .field("handles", &self.handle_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn integer_arithmetic_reports_overflow() {
        assert_eq!(Element::checked_add(i32::MAX, 1), None);
        assert_eq!(Element::checked_sub(i64::MIN, 1), None);
        assert_eq!(Element::checked_mul(i32::MAX, 2), None);
        assert_eq!(Element::checked_div(i32::MIN, -1), None);
        assert_eq!(Element::checked_div(7i64, 0), None);
        assert_eq!(Element::checked_div(7i64, 2), Some(3));
    }

    #[test]
    fn float_arithmetic_follows_ieee() {
        assert_eq!(Element::checked_div(1.0f32, 0.0), Some(f32::INFINITY));
        assert_eq!(Element::checked_add(f64::MAX, f64::MAX), Some(f64::INFINITY));
    }
}
