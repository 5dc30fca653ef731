use std::collections::{HashMap, HashSet};

use crate::{
    hash,
    layer::Layer,
    model::Model,
    passes::{ModelPass, PassError},
    shape::Shape,
    tensor::TensorData,
};

/// Merges structurally identical layers: same kind, same typed attributes,
/// same input identifiers (after earlier merges in the same sweep).
///
/// A single forward pass over the topologically ordered layer list. Each
/// layer's inputs are first rewritten through the accumulated remap table,
/// then the layer is matched against the canonical layers sharing its
/// structural hash. On a match the duplicate's primary output is remapped
/// to the canonical primary output; when the two layers agree on output
/// count, the remaining outputs are remapped pairwise as well. Declared
/// graph outputs that lose their producer are patched back in with a
/// synthetic `Identity` layer so the output set never changes.
pub struct RemoveDuplicateLayers;

impl ModelPass for RemoveDuplicateLayers {
    fn run(&self, model: &mut Model) -> Result<(), PassError> {
        let mut remap: HashMap<String, String> = HashMap::new();
        let mut removed: HashSet<String> = HashSet::new();
        let mut buckets: HashMap<u64, Vec<usize>> = HashMap::new();

        for idx in 0..model.layers.len() {
            rewrite_inputs(&mut model.layers[idx], &remap);

            let bucket = buckets.entry(model.layers[idx].structural_hash()).or_default();
            let layer = &model.layers[idx];

            let duplicate_of = bucket
                .iter()
                .map(|&i| &model.layers[i])
                .find(|canon| canon.op == layer.op && canon.inputs == layer.inputs);

            let Some(canon) = duplicate_of else {
                bucket.push(idx);
                continue;
            };

            remap.insert(layer.primary_output().to_string(), canon.primary_output().to_string());
            removed.insert(layer.primary_output().to_string());

            if layer.outputs.len() == canon.outputs.len() {
                for (dup, keep) in layer.outputs.iter().zip(&canon.outputs).skip(1) {
                    if !dup.is_empty() {
                        remap.insert(dup.clone(), keep.clone());
                    }
                }
            }
        }

        model.layers.retain(|layer| !removed.contains(layer.primary_output()));

        patch_outputs(model, &remap);

        Ok(())
    }
}

/// Merges integer constants with identical shape and identical contents.
/// Float constants are left alone.
///
/// Candidates are bucketed by exact shape, then by a content hash over the
/// element values; within a bucket equality is confirmed element by element
/// before merging, so a hash collision can at worst leave two distinct
/// hash-colliding constants unmerged together.
pub struct RemoveDuplicateConstants;

impl ModelPass for RemoveDuplicateConstants {
    fn run(&self, model: &mut Model) -> Result<(), PassError> {
        let mut remap: HashMap<String, String> = HashMap::new();
        let mut buckets: HashMap<(Shape, u64), Vec<usize>> = HashMap::new();

        for idx in 0..model.constants.len() {
            let constant = &model.constants[idx];

            let TensorData::I32(values) = constant.tensor.data() else {
                continue;
            };

            let mut content = 0;
            for value in values {
                hash::combine(&mut content, value);
            }

            let bucket = buckets.entry((constant.tensor.shape().clone(), content)).or_default();

            let duplicate_of = bucket
                .iter()
                .map(|&i| &model.constants[i])
                .find(|canon| canon.tensor.ints() == Some(values.as_slice()));

            match duplicate_of {
                Some(canon) => {
                    remap.insert(constant.id.clone(), canon.id.clone());
                }
                None => bucket.push(idx),
            }
        }

        model.constants.retain(|constant| !remap.contains_key(&constant.id));

        for layer in &mut model.layers {
            rewrite_inputs(layer, &remap);
        }

        patch_outputs(model, &remap);

        Ok(())
    }
}

fn rewrite_inputs(layer: &mut Layer, remap: &HashMap<String, String>) {
    for input in &mut layer.inputs {
        if let Some(canonical) = remap.get(input) {
            *input = canonical.clone();
        }
    }
}

/// Re-binds every declared output whose producer was merged away, keeping
/// the declared identifier alive via an `Identity` of the canonical one.
fn patch_outputs(model: &mut Model, remap: &HashMap<String, String>) {
    for i in 0..model.outputs.len() {
        let output = &model.outputs[i];

        if let Some(canonical) = remap.get(output) {
            let layer = Layer::identity(output.clone(), canonical.clone());
            model.add_layer(layer);
        }
    }
}
