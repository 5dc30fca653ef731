use std::collections::HashSet;

use crate::{
    model::Model,
    passes::{ModelPass, PassError},
};

/// Dead code elimination: drops every layer and constant that no declared
/// output transitively depends on.
///
/// One backward sweep over the topologically ordered layer list. The live
/// set starts as the declared outputs; a layer defining any live identifier
/// is kept and its inputs become live in turn. Graph inputs are declarative
/// and never removed, even when dead.
pub struct RemoveUnused;

impl ModelPass for RemoveUnused {
    fn run(&self, model: &mut Model) -> Result<(), PassError> {
        let mut live: HashSet<&str> = model.outputs.iter().map(String::as_str).collect();
        let mut keep = vec![false; model.layers.len()];

        for (idx, layer) in model.layers.iter().enumerate().rev() {
            if layer.used_outputs().any(|id| live.contains(id)) {
                keep[idx] = true;
                live.extend(layer.used_inputs());
            }
        }

        let live = live.into_iter().map(str::to_string).collect::<HashSet<_>>();

        let mut keep = keep.into_iter();
        model.layers.retain(|_| keep.next().unwrap_or(false));
        model.constants.retain(|constant| live.contains(&constant.id));

        Ok(())
    }
}
