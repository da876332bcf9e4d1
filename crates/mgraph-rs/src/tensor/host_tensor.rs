//! Host tensor handle with shareable storage.

use rand::Rng;

use super::dtype::DType;
use super::shape::Shape;
use super::storage::{Element, Storage, TensorData};
use crate::error::{Error, Result};

/// Level-of-detail offsets: one offset vector per sequence nesting level.
pub type Lod = Vec<Vec<usize>>;

/// Tensor handle: shape, dtype, sequence metadata and an optional storage slot.
///
/// Cloning a handle aliases the storage slot (as does [`Tensor::share_data_with`]); use
/// [`Tensor::deep_copy`] for an independent buffer.
#[derive(Debug, Clone)]
pub struct Tensor {
    shape: Shape,
    dtype: DType,
    storage: Option<Storage>,
    lod: Lod,
}

impl Default for Tensor {
    fn default() -> Self {
        Tensor::empty()
    }
}

impl Tensor {
    /// Creates a tensor without storage, the state a fresh variable starts in.
    pub fn empty() -> Self {
        Tensor {
            shape: Shape::scalar(),
            dtype: DType::F32,
            storage: None,
            lod: Lod::new(),
        }
    }

    /// Constructs a tensor from raw values, validating the length against the shape.
    pub fn from_vec<E: Element>(shape: impl Into<Shape>, data: Vec<E>) -> Result<Self> {
        Tensor::from_data(shape, E::into_data(data))
    }

    /// Wraps an owned buffer; its dtype becomes the tensor's dtype.
    pub fn from_data(shape: impl Into<Shape>, data: TensorData) -> Result<Self> {
        let shape = shape.into();
        if data.len() != shape.num_elements() {
            return Err(Error::shape_mismatch(
                &[data.len()],
                shape.dims(),
                "tensor data length does not match shape",
            ));
        }
        Ok(Tensor {
            shape,
            dtype: data.dtype(),
            storage: Some(Storage::new(data)),
            lod: Lod::new(),
        })
    }

    /// Returns a zero-initialized tensor of the requested shape.
    pub fn zeros(shape: impl Into<Shape>, dtype: DType) -> Self {
        let shape = shape.into();
        let len = shape.num_elements();
        Tensor {
            shape,
            dtype,
            storage: Some(Storage::new(TensorData::zeros(dtype, len))),
            lod: Lod::new(),
        }
    }

    /// Returns a tensor filled with `value`, converted to `dtype`.
    pub fn full(shape: impl Into<Shape>, dtype: DType, value: f64) -> Self {
        let tensor = Tensor::zeros(shape, dtype);
        tensor.fill(value);
        tensor
    }

    pub fn ones(shape: impl Into<Shape>, dtype: DType) -> Self {
        Tensor::full(shape, dtype, 1.0)
    }

    /// Samples `F32` values uniformly from `[low, high)`.
    pub fn rand_uniform(shape: impl Into<Shape>, low: f32, high: f32, rng: &mut impl Rng) -> Self {
        let shape = shape.into();
        let values: Vec<f32> = (0..shape.num_elements())
            .map(|_| rng.gen_range(low..high))
            .collect();
        Tensor {
            shape,
            dtype: DType::F32,
            storage: Some(Storage::new(TensorData::F32(values))),
            lod: Lod::new(),
        }
    }

    /// Provides access to the tensor shape.
    pub fn shape(&self) -> &Shape {
        &self.shape
    }

    pub fn dims(&self) -> &[usize] {
        self.shape.dims()
    }

    /// Returns the scalar dtype of the tensor payload.
    pub fn dtype(&self) -> DType {
        self.dtype
    }

    /// Returns the total number of elements implied by the shape.
    pub fn numel(&self) -> usize {
        self.shape.num_elements()
    }

    /// Reports whether storage has been allocated.
    pub fn is_initialized(&self) -> bool {
        self.storage.is_some()
    }

    pub fn storage(&self) -> Option<&Storage> {
        self.storage.as_ref()
    }

    pub fn lod(&self) -> &Lod {
        &self.lod
    }

    pub fn set_lod(&mut self, lod: Lod) {
        self.lod = lod;
    }

    /// Makes `self` alias the storage of `other`; shape, dtype and LoD follow `other`.
    pub fn share_data_with(&mut self, other: &Tensor) {
        self.shape = other.shape.clone();
        self.dtype = other.dtype;
        self.storage = other.storage.clone();
        self.lod = other.lod.clone();
    }

    /// Reports whether both tensors point at the same storage slot.
    pub fn shares_storage_with(&self, other: &Tensor) -> bool {
        match (&self.storage, &other.storage) {
            (Some(a), Some(b)) => a.same_slot(b),
            _ => false,
        }
    }

    /// Sizes the tensor for `shape`/`dtype` and returns its storage slot.
    ///
    /// The current slot is kept when it already holds `numel` elements of `dtype`, so
    /// aliases stay connected. Otherwise the tensor receives a new zero-filled slot and any
    /// previous aliases keep the old one.
    pub fn mutable_data(&mut self, shape: impl Into<Shape>, dtype: DType) -> &Storage {
        let shape = shape.into();
        let len = shape.num_elements();
        let reusable = self.storage.as_ref().is_some_and(|s| {
            let data = s.read();
            data.dtype() == dtype && data.len() == len
        });
        if !reusable {
            self.storage = Some(Storage::new(TensorData::zeros(dtype, len)));
        }
        self.shape = shape;
        self.dtype = dtype;
        self.storage.get_or_insert_with(|| Storage::new(TensorData::zeros(dtype, len)))
    }

    /// Runs `f` over the typed element slice.
    pub fn with_data<E: Element, R>(&self, f: impl FnOnce(&[E]) -> R) -> Result<R> {
        let storage = self.storage.as_ref().ok_or(Error::Unallocated)?;
        let data = storage.read();
        let values = E::slice(&data).ok_or(Error::TypeMismatch {
            expected: E::DTYPE,
            got: data.dtype(),
        })?;
        Ok(f(values))
    }

    /// Runs `f` over the mutable typed element slice. Writes are visible through every
    /// handle that shares this tensor's storage.
    pub fn with_data_mut<E: Element, R>(&self, f: impl FnOnce(&mut [E]) -> R) -> Result<R> {
        let storage = self.storage.as_ref().ok_or(Error::Unallocated)?;
        let mut data = storage.write();
        let got = data.dtype();
        let values = E::slice_mut(&mut data).ok_or(Error::TypeMismatch {
            expected: E::DTYPE,
            got,
        })?;
        Ok(f(values))
    }

    /// Copies the elements out into a fresh vector.
    pub fn to_vec<E: Element>(&self) -> Result<Vec<E>> {
        self.with_data(|values: &[E]| values.to_vec())
    }

    /// Overwrites the buffer contents with `values`.
    pub fn copy_from_slice<E: Element>(&self, values: &[E]) -> Result<()> {
        let numel = self.numel();
        self.with_data_mut(|dst: &mut [E]| {
            if dst.len() != values.len() {
                return Err(Error::shape_mismatch(
                    &[numel],
                    &[values.len()],
                    "copy source length does not match tensor",
                ));
            }
            dst.copy_from_slice(values);
            Ok(())
        })?
    }

    /// Fills the tensor with a constant value converted to its dtype. No-op without storage.
    pub fn fill(&self, value: f64) {
        if let Some(storage) = &self.storage {
            match &mut *storage.write() {
                TensorData::F32(v) => v.fill(value as f32),
                TensorData::F64(v) => v.fill(value),
                TensorData::I32(v) => v.fill(value as i32),
                TensorData::I64(v) => v.fill(value as i64),
            }
        }
    }

    /// Clones the buffer into an independent storage slot.
    pub fn deep_copy(&self) -> Tensor {
        Tensor {
            shape: self.shape.clone(),
            dtype: self.dtype,
            storage: self
                .storage
                .as_ref()
                .map(|s| Storage::new(s.read().clone())),
            lod: self.lod.clone(),
        }
    }
}
