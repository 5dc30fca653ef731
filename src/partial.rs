use std::collections::HashMap;

use crate::{
    backend,
    dtype::DType,
    layer::{Layer, LayerOp},
    model::ModelError,
    shape::{Dim, SymbolicShape},
    tensor::Tensor,
};

/// Largest tensor carried as an inline value during partial inference.
/// Shape-arithmetic intermediates stay well below this; anything larger is
/// left to the folding pass proper, which has no such limit.
pub const MAX_INLINE_ELEMENTS: usize = 64;

/// Symbolic description of a tensor-valued quantity: dtype, a possibly
/// unresolved shape, and optionally a fully materialised value.
///
/// Invariant: if `value` is present, `shape` is the value's concrete shape
/// and `dtype` its dtype, so the partial is losslessly convertible back to
/// a [`Tensor`].
#[derive(Clone, Debug, PartialEq)]
pub struct PartialTensor {
    dtype: DType,
    shape: SymbolicShape,
    value: Option<Tensor>,
}

impl PartialTensor {
    pub fn new(dtype: DType, shape: impl Into<SymbolicShape>) -> Self {
        Self { dtype, shape: shape.into(), value: None }
    }

    pub fn from_tensor(tensor: &Tensor) -> Self {
        Self { dtype: tensor.dtype(), shape: tensor.shape().into(), value: Some(tensor.clone()) }
    }

    pub fn dtype(&self) -> DType {
        self.dtype
    }

    pub fn shape(&self) -> &SymbolicShape {
        &self.shape
    }

    pub fn is_fully_known(&self) -> bool {
        self.value.is_some()
    }

    pub fn to_tensor(&self) -> Option<Tensor> {
        self.value.clone()
    }
}

/// Forward-propagated symbolic state for one compilation: output identifier
/// to the best-known [`PartialTensor`] for it.
#[derive(Debug, Default)]
pub struct PartialInferenceContext {
    partials: HashMap<String, PartialTensor>,
}

impl PartialInferenceContext {
    pub fn add(&mut self, id: impl Into<String>, partial: PartialTensor) {
        self.partials.insert(id.into(), partial);
    }

    pub fn get(&self, id: &str) -> Result<&PartialTensor, ModelError> {
        self.partials.get(id).ok_or_else(|| ModelError::UnknownIdentifier(id.to_string()))
    }
}

impl Layer {
    /// Propagates this layer's output partials from its inputs' partials.
    ///
    /// Never fails on unknown dimensions or values, only on structural
    /// contract violations (bad arity, unresolved identifier, mismatched
    /// dtypes). Arity is judged on the non-empty input slots, since empty
    /// slots carry no value to propagate.
    pub fn infer_partial(&self, ctx: &mut PartialInferenceContext) -> Result<(), ModelError> {
        let used = self.used_inputs().count();
        let (min, max) = self.op.input_arity();

        if !(min..=max).contains(&used) {
            return Err(ModelError::InputArity {
                layer: self.primary_output().to_string(),
                op: self.op.opname(),
                got: used,
            });
        }

        if self.outputs.len() != self.op.output_arity() {
            return Err(ModelError::OutputArity {
                layer: self.primary_output().to_string(),
                op: self.op.opname(),
                got: self.outputs.len(),
            });
        }

        let inputs = self.used_inputs().map(|id| ctx.get(id).cloned()).collect::<Result<Vec<_>, _>>()?;
        let outputs = self.infer_outputs(&inputs)?;

        debug_assert_eq!(outputs.len(), self.op.output_arity());

        for (id, partial) in self.outputs.iter().zip(outputs) {
            if !id.is_empty() {
                ctx.add(id.clone(), partial);
            }
        }

        Ok(())
    }

    fn infer_outputs(&self, inputs: &[PartialTensor]) -> Result<Vec<PartialTensor>, ModelError> {
        let out = match &self.op {
            LayerOp::Identity => vec![inputs[0].clone()],

            LayerOp::Binary(op) => {
                let (a, b) = (&inputs[0], &inputs[1]);

                if a.dtype() != b.dtype() {
                    return Err(ModelError::TypeMismatch {
                        id: self.primary_output().to_string(),
                        expected: a.dtype(),
                        got: b.dtype(),
                    });
                }

                if let (Some(x), Some(y)) = (&a.value, &b.value) {
                    if let Some(value) = backend::binary(*op, x, y).ok().and_then(inline) {
                        return Ok(vec![PartialTensor::from_tensor(&value)]);
                    }
                }

                let shape = match (a.shape.dims(), b.shape.dims()) {
                    (Some(x), Some(y)) if x.len() == y.len() => {
                        SymbolicShape::from(x.iter().zip(y).map(|(p, q)| p.merge(q)).collect::<Vec<_>>())
                    }
                    (Some(x), None) => SymbolicShape::from(x.to_vec()),
                    (None, Some(y)) => SymbolicShape::from(y.to_vec()),
                    _ => SymbolicShape::unknown_rank(),
                };

                vec![PartialTensor::new(a.dtype(), shape)]
            }

            LayerOp::Unary(op) => {
                let input = &inputs[0];

                if let Some(value) = input.value.as_ref().and_then(|x| backend::unary(*op, x).ok()).and_then(inline) {
                    return Ok(vec![PartialTensor::from_tensor(&value)]);
                }

                vec![PartialTensor::new(input.dtype(), input.shape.clone())]
            }

            LayerOp::Cast { to } => {
                let input = &inputs[0];

                if let Some(value) = input.value.as_ref().map(|x| backend::cast(*to, x)).and_then(inline) {
                    return Ok(vec![PartialTensor::from_tensor(&value)]);
                }

                vec![PartialTensor::new(*to, input.shape.clone())]
            }

            LayerOp::Concat { axis } => {
                let dtype = inputs[0].dtype();

                let values = inputs.iter().map(|i| i.value.as_ref()).collect::<Option<Vec<_>>>();
                if let Some(values) = values {
                    if let Some(value) = backend::concat(&values, *axis).ok().and_then(inline) {
                        return Ok(vec![PartialTensor::from_tensor(&value)]);
                    }
                }

                vec![PartialTensor::new(dtype, concat_shape(inputs, *axis))]
            }

            LayerOp::Split { axis, parts } => {
                let input = &inputs[0];

                if let Some(value) = &input.value {
                    if let Ok(values) = backend::split(value, *axis, *parts) {
                        if values.iter().all(|v| v.size() <= MAX_INLINE_ELEMENTS) {
                            return Ok(values.iter().map(PartialTensor::from_tensor).collect());
                        }
                    }
                }

                let shape = split_shape(input, *axis, *parts);
                vec![PartialTensor::new(input.dtype(), shape); *parts]
            }

            LayerOp::Shape => {
                let input = &inputs[0];

                // the value is derivable from the shape alone, even when the
                // input's own value will only exist at runtime
                if let Some(shape) = input.shape.concrete() {
                    let dims = shape.dims().iter().map(|&d| d as i32).collect::<Vec<_>>();
                    return Ok(vec![PartialTensor::from_tensor(&Tensor::from_ints([dims.len()], dims))]);
                }

                let extent = input.shape.rank().map_or(Dim::Unknown, Dim::Known);
                vec![PartialTensor::new(DType::I32, vec![extent])]
            }

            LayerOp::Reshape => {
                let (data, dims) = (&inputs[0], &inputs[1]);

                if let Some(target) = dims.value.as_ref() {
                    if let Some(value) =
                        data.value.as_ref().and_then(|x| backend::reshape(x, target).ok()).and_then(inline)
                    {
                        return Ok(vec![PartialTensor::from_tensor(&value)]);
                    }

                    if let Some(target) = target.ints() {
                        if let Some(out) = target.iter().map(|&d| usize::try_from(d).ok()).collect::<Option<Vec<_>>>()
                        {
                            let dims = out.into_iter().map(Dim::Known).collect::<Vec<_>>();
                            return Ok(vec![PartialTensor::new(data.dtype(), dims)]);
                        }
                    }
                }

                let shape = match dims.shape.dims().and_then(|d| d.first()).and_then(Dim::known) {
                    Some(rank) => SymbolicShape::unknown(rank),
                    None => SymbolicShape::unknown_rank(),
                };

                vec![PartialTensor::new(data.dtype(), shape)]
            }

            LayerOp::RandomUniform { shape, .. } | LayerOp::RandomNormal { shape, .. } => {
                // concrete shape, but the value must remain dynamic
                let dims = shape.iter().map(|&d| Dim::Known(d)).collect::<Vec<_>>();
                vec![PartialTensor::new(DType::F32, dims)]
            }
        };

        Ok(out)
    }
}

fn inline(tensor: Tensor) -> Option<Tensor> {
    (tensor.size() <= MAX_INLINE_ELEMENTS).then_some(tensor)
}

fn concat_shape(inputs: &[PartialTensor], axis: usize) -> SymbolicShape {
    let Some(first) = inputs[0].shape.dims() else { return SymbolicShape::unknown_rank() };
    let rank = first.len();

    if axis >= rank || inputs.iter().any(|i| i.shape.rank() != Some(rank)) {
        return SymbolicShape::unknown_rank();
    }

    let mut dims = Vec::with_capacity(rank);

    for d in 0..rank {
        if d == axis {
            let total = inputs
                .iter()
                .map(|i| i.shape.dims().and_then(|dims| dims[d].known()))
                .sum::<Option<usize>>();
            dims.push(total.map_or(Dim::Unknown, Dim::Known));
        } else {
            let mut merged = Dim::Unknown;
            for input in inputs {
                if let Some(other) = input.shape.dims() {
                    merged = merged.merge(&other[d]);
                }
            }
            dims.push(merged);
        }
    }

    SymbolicShape::from(dims)
}

fn split_shape(input: &PartialTensor, axis: usize, parts: usize) -> SymbolicShape {
    let Some(dims) = input.shape.dims() else { return SymbolicShape::unknown_rank() };

    if axis >= dims.len() {
        return SymbolicShape::unknown_rank();
    }

    let mut dims = dims.to_vec();
    dims[axis] = match dims[axis].known() {
        Some(extent) if parts > 0 && extent % parts == 0 => Dim::Known(extent / parts),
        _ => Dim::Unknown,
    };

    SymbolicShape::from(dims)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layer::BinaryOp;

    fn known(tensor: Tensor) -> PartialTensor {
        PartialTensor::from_tensor(&tensor)
    }

    #[test]
    fn shape_of_symbolic_input() -> Result<(), ModelError> {
        let mut ctx = PartialInferenceContext::default();
        ctx.add("x", PartialTensor::new(DType::F32, vec![Dim::Known(2), Dim::Known(3)]));

        Layer::new(LayerOp::Shape, ["x"], ["s"]).infer_partial(&mut ctx)?;

        let s = ctx.get("s")?;
        assert!(s.is_fully_known());
        assert_eq!(s.to_tensor(), Some(Tensor::from_ints([2], vec![2, 3])));
        Ok(())
    }

    #[test]
    fn shape_of_unknown_dims_stays_symbolic() -> Result<(), ModelError> {
        let mut ctx = PartialInferenceContext::default();
        ctx.add("x", PartialTensor::new(DType::F32, vec![Dim::Sym("batch".to_string()), Dim::Known(3)]));

        Layer::new(LayerOp::Shape, ["x"], ["s"]).infer_partial(&mut ctx)?;

        let s = ctx.get("s")?;
        assert!(!s.is_fully_known());
        assert_eq!(s.shape().dims(), Some(&[Dim::Known(2)][..]));
        Ok(())
    }

    #[test]
    fn value_propagates_through_shape_arithmetic() -> Result<(), ModelError> {
        let mut ctx = PartialInferenceContext::default();
        ctx.add("x", PartialTensor::new(DType::F32, vec![Dim::Known(4), Dim::Known(6)]));
        ctx.add("two", known(Tensor::from_ints([2], vec![2, 2])));

        Layer::new(LayerOp::Shape, ["x"], ["s"]).infer_partial(&mut ctx)?;
        Layer::new(LayerOp::Binary(BinaryOp::Mul), ["s", "two"], ["d"]).infer_partial(&mut ctx)?;

        assert_eq!(ctx.get("d")?.to_tensor(), Some(Tensor::from_ints([2], vec![8, 12])));
        Ok(())
    }

    #[test]
    fn reshape_from_inferred_dims() -> Result<(), ModelError> {
        let mut ctx = PartialInferenceContext::default();
        ctx.add("x", PartialTensor::new(DType::F32, SymbolicShape::unknown(3)));
        ctx.add("dims", known(Tensor::from_ints([2], vec![6, 4])));

        Layer::new(LayerOp::Reshape, ["x", "dims"], ["y"]).infer_partial(&mut ctx)?;

        let y = ctx.get("y")?;
        assert!(!y.is_fully_known());
        assert_eq!(y.shape().dims(), Some(&[Dim::Known(6), Dim::Known(4)][..]));
        Ok(())
    }

    #[test]
    fn binary_merges_dims() -> Result<(), ModelError> {
        let mut ctx = PartialInferenceContext::default();
        ctx.add("a", PartialTensor::new(DType::F32, vec![Dim::Unknown, Dim::Known(3)]));
        ctx.add("b", PartialTensor::new(DType::F32, vec![Dim::Known(2), Dim::Unknown]));

        Layer::new(LayerOp::Binary(BinaryOp::Add), ["a", "b"], ["c"]).infer_partial(&mut ctx)?;

        assert_eq!(ctx.get("c")?.shape().dims(), Some(&[Dim::Known(2), Dim::Known(3)][..]));
        Ok(())
    }

    #[test]
    fn binary_dtype_mismatch_is_fatal() {
        let mut ctx = PartialInferenceContext::default();
        ctx.add("a", PartialTensor::new(DType::F32, SymbolicShape::unknown(1)));
        ctx.add("b", PartialTensor::new(DType::I32, SymbolicShape::unknown(1)));

        let result = Layer::new(LayerOp::Binary(BinaryOp::Add), ["a", "b"], ["c"]).infer_partial(&mut ctx);
        assert_eq!(
            result,
            Err(ModelError::TypeMismatch { id: "c".to_string(), expected: DType::F32, got: DType::I32 })
        );
    }

    #[test]
    fn random_shape_known_value_not() -> Result<(), ModelError> {
        let mut ctx = PartialInferenceContext::default();
        let layer = Layer::new(
            LayerOp::RandomUniform { shape: vec![2, 2], low: 0.0, high: 1.0, seed: 7 },
            Vec::<String>::new(),
            ["r"],
        );
        layer.infer_partial(&mut ctx)?;

        let r = ctx.get("r")?;
        assert!(r.shape().is_concrete());
        assert!(!r.is_fully_known());
        Ok(())
    }

    #[test]
    fn split_partial_shapes() -> Result<(), ModelError> {
        let mut ctx = PartialInferenceContext::default();
        ctx.add("x", PartialTensor::new(DType::F32, vec![Dim::Known(6), Dim::Sym("n".to_string())]));

        Layer::new(LayerOp::Split { axis: 0, parts: 3 }, ["x"], ["a", "b", "c"]).infer_partial(&mut ctx)?;

        for id in ["a", "b", "c"] {
            assert_eq!(
                ctx.get(id)?.shape().dims(),
                Some(&[Dim::Known(2), Dim::Sym("n".to_string())][..])
            );
        }
        Ok(())
    }

    #[test]
    fn empty_mandatory_slot_is_an_arity_error() {
        let mut ctx = PartialInferenceContext::default();
        ctx.add("x", PartialTensor::new(DType::I32, SymbolicShape::unknown(1)));

        // the empty slot does not count towards the binary kind's two inputs
        let result = Layer::new(LayerOp::Binary(BinaryOp::Add), ["x", ""], ["y"]).infer_partial(&mut ctx);
        assert_eq!(
            result,
            Err(ModelError::InputArity { layer: "y".to_string(), op: "binary.add".to_string(), got: 1 })
        );
    }

    #[test]
    fn unresolved_identifier() {
        let mut ctx = PartialInferenceContext::default();
        let result = Layer::new(LayerOp::Shape, ["ghost"], ["s"]).infer_partial(&mut ctx);
        assert_eq!(result, Err(ModelError::UnknownIdentifier("ghost".to_string())));
    }
}
