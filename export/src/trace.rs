use crate::internal::*;

/// A model frozen to a static typed graph for one concrete input shape.
#[derive(Clone, Debug)]
pub struct TracedGraph {
    pub model: TypedModel,
    pub input_shape: TVec<usize>,
    pub output_shape: TVec<usize>,
}

impl TracedGraph {
    /// Number of classes scored per image.
    pub fn classes(&self) -> usize {
        let batch = self.output_shape.first().copied().unwrap_or(1).max(1);
        self.output_shape.iter().product::<usize>() / batch
    }
}

pub fn dummy_input(shape: &[usize]) -> TractResult<Tensor> {
    Tensor::zero::<f32>(shape)
}

/// Pin the input to `input_shape`, reduce the model to a decluttered typed
/// graph and execute it once on an all-zero image.
pub fn trace(model: EvalModel, input_shape: [usize; 4]) -> TractResult<TracedGraph> {
    info!("Tracing model with input shape {:?}", input_shape);
    let model = model
        .into_inner()
        .with_input_fact(0, f32::fact(input_shape).into())?
        .into_typed()
        .context("Analysing model")?
        .into_decluttered()
        .context("Decluttering model")?;

    let outputs = model
        .clone()
        .into_runnable()?
        .run(tvec!(dummy_input(&input_shape)?.into()))
        .context("Running model on dummy input")?;
    let output_shape: TVec<usize> = outputs[0].shape().into();
    debug!("Traced {} nodes, output shape {:?}", model.nodes().len(), output_shape);

    Ok(TracedGraph { model, input_shape: input_shape.iter().copied().collect(), output_shape })
}

/// Single-image classifier stand-in: three slices reduce a 1x3x224x224 image
/// to 1x1x5x200, i.e. 1000 scores in row-major order.
#[doc(hidden)]
pub fn stub_model() -> TractResult<InferenceModel> {
    use tract_hir::ops::array::Slice;
    let mut model = InferenceModel::default();
    let image = model.add_source("input", f32::fact([1, 3, 224, 224]).into())?;
    let wire = model.wire_node("channel", Slice::new(1, 0usize, 1usize), &[image])?;
    let wire = model.wire_node("rows", Slice::new(2, 0usize, 5usize), &wire)?;
    let wire = model.wire_node("scores", Slice::new(3, 0usize, 200usize), &wire)?;
    model.set_output_outlets(&wire)?;
    Ok(model)
}
