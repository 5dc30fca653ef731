use std::fmt;

use crate::{
    dtype::{DType, DTypeValue},
    shape::Shape,
};

#[derive(Clone, PartialEq)]
pub enum TensorData {
    F32(Vec<f32>),
    I32(Vec<i32>),
}

impl fmt::Debug for TensorData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::F32(xs) => write!(f, "f32{xs:?}"),
            Self::I32(xs) => write!(f, "i32{xs:?}"),
        }
    }
}

impl TensorData {
    pub fn zeroed(dtype: DType, len: usize) -> Self {
        match dtype {
            DType::F32 => Self::F32(vec![0.0; len]),
            DType::I32 => Self::I32(vec![0; len]),
        }
    }

    pub fn dtype(&self) -> DType {
        match self {
            Self::F32(_) => DType::F32,
            Self::I32(_) => DType::I32,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Self::F32(xs) => xs.len(),
            Self::I32(xs) => xs.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn read(&self, idx: usize) -> DTypeValue {
        match self {
            Self::F32(xs) => DTypeValue::F32(xs[idx]),
            Self::I32(xs) => DTypeValue::I32(xs[idx]),
        }
    }

    pub fn write(&mut self, idx: usize, value: DTypeValue) {
        match (self, value) {
            (Self::F32(xs), DTypeValue::F32(x)) => xs[idx] = x,
            (Self::I32(xs), DTypeValue::I32(x)) => xs[idx] = x,
            _ => panic!("Mismatched dtype in TensorData::write!"),
        }
    }
}

/// A concrete tensor value: shape plus a backing buffer whose length equals
/// the shape's element count.
#[derive(Clone, PartialEq)]
pub struct Tensor {
    shape: Shape,
    data: TensorData,
}

impl fmt::Debug for Tensor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?} x {:?}", self.shape, self.data)
    }
}

impl Tensor {
    pub fn new(shape: impl Into<Shape>, data: TensorData) -> Self {
        let shape = shape.into();
        assert_eq!(shape.size(), data.len(), "Tensor data does not match shape!");
        Self { shape, data }
    }

    pub fn zeroed(shape: impl Into<Shape>, dtype: DType) -> Self {
        let shape = shape.into();
        let data = TensorData::zeroed(dtype, shape.size());
        Self { shape, data }
    }

    pub fn from_ints(shape: impl Into<Shape>, values: Vec<i32>) -> Self {
        Self::new(shape, TensorData::I32(values))
    }

    pub fn from_floats(shape: impl Into<Shape>, values: Vec<f32>) -> Self {
        Self::new(shape, TensorData::F32(values))
    }

    pub fn shape(&self) -> &Shape {
        &self.shape
    }

    pub fn dtype(&self) -> DType {
        self.data.dtype()
    }

    pub fn size(&self) -> usize {
        self.data.len()
    }

    pub fn data(&self) -> &TensorData {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut TensorData {
        &mut self.data
    }

    /// Reinterprets the buffer under a new shape of equal element count.
    pub fn reshaped(&self, shape: impl Into<Shape>) -> Option<Self> {
        let shape = shape.into();
        (shape.size() == self.size()).then(|| Self { shape, data: self.data.clone() })
    }

    pub fn ints(&self) -> Option<&[i32]> {
        if let TensorData::I32(xs) = &self.data {
            Some(xs)
        } else {
            None
        }
    }

    pub fn floats(&self) -> Option<&[f32]> {
        if let TensorData::F32(xs) = &self.data {
            Some(xs)
        } else {
            None
        }
    }
}
