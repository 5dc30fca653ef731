use std::collections::HashMap;

use crate::{
    backend::{Backend, CpuBackend},
    model::{Constant, Model, ModelError},
    partial::{PartialInferenceContext, PartialTensor},
    passes::{ModelPass, PassError, RemoveUnused},
    tensor::Tensor,
};

/// Replaces every layer whose outputs are computable at compile time with
/// literal constants.
///
/// A layer is foldable when its kind is deterministic and every non-empty
/// input resolves to a known tensor, either a model constant or the output
/// of an already-folded layer. Foldable layers are executed eagerly on the
/// CPU backend. Everything else goes through partial inference, which can
/// still pin down values from shapes alone (`Shape` of an input whose
/// symbolic shape is fully concrete, and arithmetic downstream of it).
pub struct FoldConstants;

impl ModelPass for FoldConstants {
    fn run(&self, model: &mut Model) -> Result<(), PassError> {
        let backend = CpuBackend;
        let mut ctx = PartialInferenceContext::default();
        let mut known: HashMap<&str, &Tensor> = HashMap::new();
        let mut computed: HashMap<String, Tensor> = HashMap::new();
        let mut fold_order: Vec<String> = Vec::new();

        for constant in &model.constants {
            known.insert(&constant.id, &constant.tensor);
            ctx.add(constant.id.clone(), PartialTensor::from_tensor(&constant.tensor));
        }

        for input in &model.inputs {
            ctx.add(input.id.clone(), PartialTensor::new(input.dtype, input.shape.clone()));
        }

        for layer in &model.layers {
            let foldable = layer.op.is_deterministic()
                && layer.used_inputs().all(|id| computed.contains_key(id) || known.contains_key(id));

            if !foldable {
                layer.infer_partial(&mut ctx)?;

                for id in layer.used_outputs() {
                    if let Some(value) = ctx.get(id)?.to_tensor() {
                        fold_order.push(id.to_string());
                        computed.insert(id.to_string(), value);
                    }
                }

                continue;
            }

            let inputs = layer
                .used_inputs()
                .map(|id| {
                    computed
                        .get(id)
                        .or_else(|| known.get(id).copied())
                        .ok_or_else(|| ModelError::UnknownIdentifier(id.to_string()))
                })
                .collect::<Result<Vec<_>, _>>()?;

            let outputs = backend.execute(layer, &inputs)?;

            if outputs.len() != layer.outputs.len() {
                return Err(ModelError::OutputArity {
                    layer: layer.primary_output().to_string(),
                    op: layer.op.opname(),
                    got: layer.outputs.len(),
                }
                .into());
            }

            for (id, tensor) in layer.outputs.iter().zip(outputs) {
                if !id.is_empty() {
                    ctx.add(id.clone(), PartialTensor::from_tensor(&tensor));
                    fold_order.push(id.clone());
                    computed.insert(id.clone(), tensor);
                }
            }
        }

        drop(known);

        // a layer dies only once every one of its outputs is known
        model.layers.retain(|layer| !layer.used_outputs().all(|id| computed.contains_key(id)));

        // commit in sweep order, so repeated runs produce identical models
        for id in fold_order {
            if let Some(tensor) = computed.remove(&id) {
                model.add_constant(Constant::new(id, tensor));
            }
        }

        // folded layers leave their original inputs dangling
        RemoveUnused.run(model)
    }
}
