use rand::{rngs::SmallRng, Rng, SeedableRng};
use rand_distr::{Distribution, Normal};

use crate::{
    dtype::{DType, DTypeValue},
    layer::{BinaryOp, Layer, LayerOp, UnaryOp},
    shape::Shape,
    tensor::{Tensor, TensorData},
};

#[derive(Clone, Debug, PartialEq)]
pub enum BackendError {
    InputArity { op: String, got: usize },
    DTypeMismatch { op: String },
    ShapeMismatch { op: String },
    Unsupported { op: String },
}

/// Executes a single layer on concrete input tensors.
///
/// Stateless per call: for a deterministic kind the result is a pure
/// function of `(op, inputs)`. Resource teardown is `Drop`.
pub trait Backend {
    fn execute(&self, layer: &Layer, inputs: &[&Tensor]) -> Result<Vec<Tensor>, BackendError>;
}

pub struct CpuBackend;

impl Backend for CpuBackend {
    fn execute(&self, layer: &Layer, inputs: &[&Tensor]) -> Result<Vec<Tensor>, BackendError> {
        let op = &layer.op;
        let (min, max) = op.input_arity();

        if !(min..=max).contains(&inputs.len()) {
            return Err(BackendError::InputArity { op: op.opname(), got: inputs.len() });
        }

        match op {
            LayerOp::Identity => Ok(vec![inputs[0].clone()]),
            LayerOp::Binary(bin) => binary(*bin, inputs[0], inputs[1]).map(|t| vec![t]),
            LayerOp::Unary(un) => unary(*un, inputs[0]).map(|t| vec![t]),
            LayerOp::Cast { to } => Ok(vec![cast(*to, inputs[0])]),
            LayerOp::Concat { axis } => concat(inputs, *axis).map(|t| vec![t]),
            LayerOp::Split { axis, parts } => split(inputs[0], *axis, *parts),
            LayerOp::Shape => Ok(vec![shape_of(inputs[0])]),
            LayerOp::Reshape => reshape(inputs[0], inputs[1]).map(|t| vec![t]),
            LayerOp::RandomUniform { shape, low, high, seed } => {
                Ok(vec![random_uniform(shape.clone().into(), *low, *high, *seed)])
            }
            LayerOp::RandomNormal { shape, mean, stddev, seed } => {
                random_normal(shape.clone().into(), *mean, *stddev, *seed).map(|t| vec![t])
            }
        }
    }
}

pub(crate) fn binary(op: BinaryOp, lhs: &Tensor, rhs: &Tensor) -> Result<Tensor, BackendError> {
    let opname = || format!("binary.{op:?}").to_lowercase();

    if lhs.dtype() != rhs.dtype() {
        return Err(BackendError::DTypeMismatch { op: opname() });
    }

    if lhs.shape() != rhs.shape() {
        return Err(BackendError::ShapeMismatch { op: opname() });
    }

    let mut out = Tensor::zeroed(lhs.shape().clone(), lhs.dtype());

    for idx in 0..lhs.size() {
        let value = op
            .evaluate(lhs.data().read(idx), rhs.data().read(idx))
            .ok_or_else(|| BackendError::DTypeMismatch { op: opname() })?;
        out.data_mut().write(idx, value);
    }

    Ok(out)
}

pub(crate) fn unary(op: UnaryOp, input: &Tensor) -> Result<Tensor, BackendError> {
    let mut out = Tensor::zeroed(input.shape().clone(), input.dtype());

    for idx in 0..input.size() {
        let value = op
            .evaluate(input.data().read(idx))
            .ok_or_else(|| BackendError::Unsupported { op: format!("unary.{op:?}").to_lowercase() })?;
        out.data_mut().write(idx, value);
    }

    Ok(out)
}

pub(crate) fn cast(to: DType, input: &Tensor) -> Tensor {
    let data = match (input.data(), to) {
        (TensorData::F32(xs), DType::I32) => TensorData::I32(xs.iter().map(|&x| x as i32).collect()),
        (TensorData::I32(xs), DType::F32) => TensorData::F32(xs.iter().map(|&x| x as f32).collect()),
        (data, _) => data.clone(),
    };

    Tensor::new(input.shape().clone(), data)
}

pub(crate) fn concat(inputs: &[&Tensor], axis: usize) -> Result<Tensor, BackendError> {
    let opname = || format!("concat<{axis}>");
    let first = inputs[0];
    let rank = first.shape().rank();

    if axis >= rank {
        return Err(BackendError::ShapeMismatch { op: opname() });
    }

    let mut axis_total = 0;

    for input in inputs {
        if input.dtype() != first.dtype() {
            return Err(BackendError::DTypeMismatch { op: opname() });
        }

        let dims = input.shape().dims();
        let same_outside = dims.len() == rank
            && dims.iter().zip(first.shape().dims()).enumerate().all(|(i, (a, b))| i == axis || a == b);

        if !same_outside {
            return Err(BackendError::ShapeMismatch { op: opname() });
        }

        axis_total += dims[axis];
    }

    let mut out_dims = first.shape().dims().to_vec();
    out_dims[axis] = axis_total;

    let outer: usize = out_dims[..axis].iter().product();
    let inner: usize = out_dims[axis + 1..].iter().product();
    let mut out = Tensor::zeroed(out_dims, first.dtype());

    let mut write_idx = 0;
    for o in 0..outer {
        for input in inputs {
            let chunk = input.shape().dims()[axis] * inner;
            for i in 0..chunk {
                out.data_mut().write(write_idx, input.data().read(o * chunk + i));
                write_idx += 1;
            }
        }
    }

    Ok(out)
}

pub(crate) fn split(input: &Tensor, axis: usize, parts: usize) -> Result<Vec<Tensor>, BackendError> {
    let opname = || format!("split<{axis}, {parts}>");
    let dims = input.shape().dims();

    if axis >= dims.len() || parts == 0 || dims[axis] % parts != 0 {
        return Err(BackendError::ShapeMismatch { op: opname() });
    }

    let part_extent = dims[axis] / parts;
    let outer: usize = dims[..axis].iter().product();
    let inner: usize = dims[axis + 1..].iter().product();
    let chunk = part_extent * inner;

    let mut part_dims = dims.to_vec();
    part_dims[axis] = part_extent;

    let mut outputs = vec![Tensor::zeroed(part_dims, input.dtype()); parts];

    let mut read_idx = 0;
    for o in 0..outer {
        for out in &mut outputs {
            for i in 0..chunk {
                out.data_mut().write(o * chunk + i, input.data().read(read_idx));
                read_idx += 1;
            }
        }
    }

    Ok(outputs)
}

pub(crate) fn shape_of(input: &Tensor) -> Tensor {
    let dims = input.shape().dims().iter().map(|&d| d as i32).collect::<Vec<_>>();
    Tensor::from_ints([dims.len()], dims)
}

pub(crate) fn reshape(data: &Tensor, dims: &Tensor) -> Result<Tensor, BackendError> {
    let opname = || "reshape".to_string();

    let dims = dims.ints().ok_or_else(|| BackendError::DTypeMismatch { op: opname() })?;
    let dims = dims
        .iter()
        .map(|&d| usize::try_from(d).ok())
        .collect::<Option<Vec<_>>>()
        .ok_or_else(|| BackendError::ShapeMismatch { op: opname() })?;

    data.reshaped(dims).ok_or_else(|| BackendError::ShapeMismatch { op: opname() })
}

fn random_uniform(shape: Shape, low: f32, high: f32, seed: u64) -> Tensor {
    let mut rng = SmallRng::seed_from_u64(seed);
    let values = (0..shape.size())
        .map(|_| if low < high { rng.gen_range(low..high) } else { low })
        .collect();

    Tensor::new(shape, TensorData::F32(values))
}

fn random_normal(shape: Shape, mean: f32, stddev: f32, seed: u64) -> Result<Tensor, BackendError> {
    let dist = Normal::new(mean, stddev).map_err(|_| BackendError::Unsupported { op: "random.normal".to_string() })?;
    let mut rng = SmallRng::seed_from_u64(seed);
    let values = (0..shape.size()).map(|_| dist.sample(&mut rng)).collect();

    Ok(Tensor::new(shape, TensorData::F32(values)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn binary_add() -> Result<(), BackendError> {
        let lhs = Tensor::from_ints([3], vec![1, 2, 3]);
        let rhs = Tensor::from_ints([3], vec![4, 5, 6]);
        let out = binary(BinaryOp::Add, &lhs, &rhs)?;
        assert_eq!(out, Tensor::from_ints([3], vec![5, 7, 9]));

        assert!(binary(BinaryOp::Add, &lhs, &Tensor::from_floats([3], vec![0.0; 3])).is_err());
        assert!(binary(BinaryOp::Add, &lhs, &Tensor::from_ints([2], vec![0, 0])).is_err());
        Ok(())
    }

    #[test]
    fn unary_kinds() -> Result<(), BackendError> {
        let input = Tensor::from_floats([4], vec![-1.0, 4.0, -9.0, 0.5]);
        assert_eq!(unary(UnaryOp::Neg, &input)?, Tensor::from_floats([4], vec![1.0, -4.0, 9.0, -0.5]));
        assert_eq!(unary(UnaryOp::Relu, &input)?, Tensor::from_floats([4], vec![0.0, 4.0, 0.0, 0.5]));

        // no integer square root kernel
        assert!(unary(UnaryOp::Sqrt, &Tensor::from_ints([1], vec![4])).is_err());
        Ok(())
    }

    #[test]
    fn cast_roundtrip() {
        let input = Tensor::from_floats([3], vec![1.5, -2.5, 3.0]);
        assert_eq!(cast(DType::I32, &input), Tensor::from_ints([3], vec![1, -2, 3]));
        assert_eq!(cast(DType::F32, &input), input);
    }

    #[test]
    fn concat_axis1() -> Result<(), BackendError> {
        let a = Tensor::from_ints([2, 2], vec![1, 2, 3, 4]);
        let b = Tensor::from_ints([2, 1], vec![5, 6]);
        let out = concat(&[&a, &b], 1)?;
        assert_eq!(out, Tensor::from_ints([2, 3], vec![1, 2, 5, 3, 4, 6]));

        assert!(concat(&[&a, &b], 0).is_err());
        Ok(())
    }

    #[test]
    fn split_inverts_concat() -> Result<(), BackendError> {
        let input = Tensor::from_ints([4, 2], vec![1, 2, 3, 4, 5, 6, 7, 8]);
        let parts = split(&input, 0, 2)?;
        assert_eq!(parts.len(), 2);
        assert_eq!(parts[0], Tensor::from_ints([2, 2], vec![1, 2, 3, 4]));
        assert_eq!(parts[1], Tensor::from_ints([2, 2], vec![5, 6, 7, 8]));
        assert_eq!(concat(&[&parts[0], &parts[1]], 0)?, input);

        assert!(split(&input, 0, 3).is_err());
        Ok(())
    }

    #[test]
    fn shape_and_reshape() -> Result<(), BackendError> {
        let data = Tensor::from_floats([2, 3], vec![1.0; 6]);
        assert_eq!(shape_of(&data), Tensor::from_ints([2], vec![2, 3]));

        let dims = Tensor::from_ints([2], vec![3, 2]);
        assert_eq!(reshape(&data, &dims)?.shape(), &Shape::from([3, 2]));

        let bad = Tensor::from_ints([2], vec![4, 2]);
        assert!(reshape(&data, &bad).is_err());
        Ok(())
    }

    #[test]
    fn random_is_seeded() {
        let a = random_uniform(Shape::from([8]), 0.0, 1.0, 42);
        let b = random_uniform(Shape::from([8]), 0.0, 1.0, 42);
        let c = random_uniform(Shape::from([8]), 0.0, 1.0, 43);

        // same seed reproduces, different seed does not
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert!(a.floats().unwrap().iter().all(|&x| (0.0..1.0).contains(&x)));
    }

    #[test]
    fn execute_checks_arity() {
        let layer = Layer::new(LayerOp::Binary(BinaryOp::Add), ["x", "y"], ["z"]);
        let t = Tensor::from_ints([1], vec![1]);

        assert_eq!(
            CpuBackend.execute(&layer, &[&t]),
            Err(BackendError::InputArity { op: "binary.add".to_string(), got: 1 })
        );

        assert_eq!(CpuBackend.execute(&layer, &[&t, &t]), Ok(vec![Tensor::from_ints([1], vec![2])]));
    }
}
