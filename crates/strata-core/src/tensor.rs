use std::ops::{Deref, DerefMut};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::error::{Error, Result};
use crate::shape::Shape;

// Tensor — Host-side parameter storage shared with compiled kernels
//
// The host owns every edge weight matrix and node bias vector as a Tensor.
// A compiled graph either copies these values into its own flat state buffer
// or keeps a handle to the very same storage and reads/writes it in place.
//
// MEMORY MODEL:
//
//   The data lives behind Arc<RwLock<Vec<f64>>>:
//   - Cloning a Tensor is O(1) and shares storage (a handle, not a copy).
//   - Reference-mode kernels take one write lock per invocation.
//   - `deep_clone` produces an independent copy.
//   - The element count is fixed at construction. Write access hands out a
//     slice, never the Vec, so compiled offsets stay in bounds.

/// A dense `f64` vector or row-major matrix with shared storage.
#[derive(Debug, Clone)]
pub struct Tensor {
    shape: Shape,
    storage: Arc<RwLock<Vec<f64>>>,
}

impl Tensor {
    /// Create a tensor from a vec, checking the element count.
    pub fn from_vec(data: Vec<f64>, shape: impl Into<Shape>) -> Result<Self> {
        let shape = shape.into();
        let expected = shape.elem_count();
        if data.len() != expected {
            return Err(Error::ElementCountMismatch {
                shape,
                expected,
                got: data.len(),
            });
        }
        Ok(Tensor {
            shape,
            storage: Arc::new(RwLock::new(data)),
        })
    }

    /// Create a tensor by copying a slice.
    pub fn from_slice(data: &[f64], shape: impl Into<Shape>) -> Result<Self> {
        Self::from_vec(data.to_vec(), shape)
    }

    /// A 1-D tensor.
    pub fn vector(data: &[f64]) -> Self {
        Tensor {
            shape: Shape::from(data.len()),
            storage: Arc::new(RwLock::new(data.to_vec())),
        }
    }

    /// A row-major matrix from nested rows. All rows must have equal length.
    pub fn matrix(rows: &[&[f64]]) -> Result<Self> {
        let cols = rows.first().map_or(0, |r| r.len());
        let mut data = Vec::with_capacity(rows.len() * cols);
        for row in rows {
            if row.len() != cols {
                return Err(Error::msg(format!(
                    "ragged matrix: expected rows of length {cols}, got {}",
                    row.len()
                )));
            }
            data.extend_from_slice(row);
        }
        Self::from_vec(data, (rows.len(), cols))
    }

    /// A tensor filled with `value`.
    pub fn full(shape: impl Into<Shape>, value: f64) -> Self {
        let shape = shape.into();
        let n = shape.elem_count();
        Tensor {
            shape,
            storage: Arc::new(RwLock::new(vec![value; n])),
        }
    }

    /// A tensor filled with zeros.
    pub fn zeros(shape: impl Into<Shape>) -> Self {
        Self::full(shape, 0.0)
    }

    pub fn shape(&self) -> &Shape {
        &self.shape
    }

    pub fn dims(&self) -> &[usize] {
        self.shape.dims()
    }

    pub fn elem_count(&self) -> usize {
        self.shape.elem_count()
    }

    /// Read access to the underlying storage.
    pub fn read(&self) -> Result<RwLockReadGuard<'_, Vec<f64>>> {
        self.storage.read().map_err(|_| Error::LockPoisoned)
    }

    /// Write access to the elements. The length cannot change:
    ///
    /// ```compile_fail
    /// let t = strata_core::Tensor::vector(&[1.0, 2.0]);
    /// t.write().unwrap().clear();
    /// ```
    pub fn write(&self) -> Result<TensorWriteGuard<'_>> {
        self.storage
            .write()
            .map(TensorWriteGuard)
            .map_err(|_| Error::LockPoisoned)
    }

    /// Copy the current contents out.
    pub fn to_vec(&self) -> Result<Vec<f64>> {
        Ok(self.read()?.clone())
    }

    /// Overwrite the contents in place; every handle observes the change.
    pub fn assign(&self, values: &[f64]) -> Result<()> {
        let mut data = self.write()?;
        if values.len() != data.len() {
            return Err(Error::ElementCountMismatch {
                shape: self.shape.clone(),
                expected: data.len(),
                got: values.len(),
            });
        }
        data.copy_from_slice(values);
        Ok(())
    }

    /// An independent copy with its own storage.
    pub fn deep_clone(&self) -> Result<Self> {
        Self::from_vec(self.to_vec()?, self.shape.clone())
    }

    /// Whether two handles share the same storage.
    pub fn same_storage(&self, other: &Tensor) -> bool {
        Arc::ptr_eq(&self.storage, &other.storage)
    }
}

/// Exclusive access to a tensor's elements as a fixed-length slice.
pub struct TensorWriteGuard<'a>(RwLockWriteGuard<'a, Vec<f64>>);

impl Deref for TensorWriteGuard<'_> {
    type Target = [f64];

    fn deref(&self) -> &[f64] {
        &self.0
    }
}

impl DerefMut for TensorWriteGuard<'_> {
    fn deref_mut(&mut self) -> &mut [f64] {
        &mut self.0
    }
}
