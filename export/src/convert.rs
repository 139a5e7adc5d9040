use serde::{Deserialize, Serialize};
use tract_core::ops::math::{add, mul};
use tract_nnef::internal::Nnef;
use tract_onnx_opl::WithOnnx;

use crate::internal::*;

pub const LABELS_FILENAME: &str = "labels.txt";
pub const METADATA_FILENAME: &str = "classifier.json";

/// Image input descriptor: tensor name, NCHW shape and the affine transform
/// mapping raw 0-255 pixels to the network range (`x * scale + bias[c]`).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ImageInput {
    pub name: String,
    pub shape: [usize; 4],
    pub scale: f32,
    pub bias: [f32; 3],
}

impl ImageInput {
    pub fn new(
        name: impl Into<String>,
        shape: [usize; 4],
        normalization: &ImageNormalization,
    ) -> ImageInput {
        ImageInput {
            name: name.into(),
            shape,
            scale: normalization.scale,
            bias: normalization.bias(),
        }
    }
}

/// Maps output positions to class names.
#[derive(Clone, Debug, PartialEq)]
pub struct ClassifierConfig {
    pub model_id: String,
    pub labels: ClassLabels,
}

/// Sidecar stored next to the graph in the archive.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ClassifierMetadata {
    pub model_id: String,
    pub input: ImageInput,
    pub labels: String,
    pub classes: usize,
    pub exporter: String,
}

impl ClassifierMetadata {
    pub fn new(input: &ImageInput, classifier: &ClassifierConfig) -> ClassifierMetadata {
        ClassifierMetadata {
            model_id: classifier.model_id.clone(),
            input: input.clone(),
            labels: LABELS_FILENAME.to_string(),
            classes: classifier.labels.len(),
            exporter: format!("{} {}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION")),
        }
    }
}

/// A deployable classifier: the normalized graph and its serialized archive.
#[derive(Clone, Debug)]
pub struct ConvertedModel {
    pub model: TypedModel,
    pub input: ImageInput,
    pub classifier: ClassifierConfig,
    pub metadata: ClassifierMetadata,
    pub archive: Vec<u8>,
}

pub trait Converter {
    fn convert(
        &self,
        graph: TracedGraph,
        input: &ImageInput,
        classifier: &ClassifierConfig,
    ) -> TractResult<ConvertedModel>;
}

pub struct NnefConverter {
    pub nnef: Nnef,
}

impl Default for NnefConverter {
    fn default() -> NnefConverter {
        NnefConverter { nnef: tract_nnef::nnef().with_onnx() }
    }
}

impl std::fmt::Debug for NnefConverter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "NnefConverter")
    }
}

impl Converter for NnefConverter {
    fn convert(
        &self,
        graph: TracedGraph,
        input: &ImageInput,
        classifier: &ClassifierConfig,
    ) -> TractResult<ConvertedModel> {
        info!("Converting to NNEF with {} classes", classifier.labels.len());
        ensure!(
            &*graph.input_shape == &input.shape[..],
            "Traced input shape {:?} does not match image input {:?}",
            graph.input_shape,
            input.shape
        );
        ensure!(
            graph.classes() == classifier.labels.len(),
            "Model scores {} classes but {} labels were given",
            graph.classes(),
            classifier.labels.len()
        );
        let model = embed_normalization(graph.model, input)?;
        let metadata = ClassifierMetadata::new(input, classifier);
        let archive = self.archive(&model, &metadata, &classifier.labels)?;
        debug!("Archive is {} bytes", archive.len());
        Ok(ConvertedModel {
            model,
            input: input.clone(),
            classifier: classifier.clone(),
            metadata,
            archive,
        })
    }
}

impl NnefConverter {
    fn archive(
        &self,
        model: &TypedModel,
        metadata: &ClassifierMetadata,
        labels: &ClassLabels,
    ) -> TractResult<Vec<u8>> {
        let graph = self.nnef.write_to_tar(model, vec![]).context("Serializing model to NNEF")?;
        let mut ar = tar::Builder::new(vec![]);
        let mut nnef = tar::Archive::new(&graph[..]);
        for entry in nnef.entries()? {
            let mut entry = entry?;
            let path = entry.path()?.into_owned();
            let mut header = entry.header().clone();
            ar.append_data(&mut header, &path, &mut entry)
                .with_context(|| format!("Repacking {path:?}"))?;
        }
        append_file(&mut ar, LABELS_FILENAME, labels.to_archive_text().as_bytes())?;
        append_file(&mut ar, METADATA_FILENAME, &serde_json::to_vec_pretty(metadata)?)?;
        ar.into_inner().context("Finalizing archive")
    }
}

fn append_file(ar: &mut tar::Builder<Vec<u8>>, name: &str, data: &[u8]) -> TractResult<()> {
    let now = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);
    let mut header = tar::Header::new_gnu();
    header.set_size(data.len() as u64);
    header.set_mode(0o644);
    header.set_mtime(now);
    header.set_cksum();
    ar.append_data(&mut header, name, data).with_context(|| format!("Appending {name}"))?;
    Ok(())
}

/// Insert `x * scale + bias` between the model source and its consumers, and
/// rename the source after the image input.
pub fn embed_normalization(mut model: TypedModel, input: &ImageInput) -> TractResult<TypedModel> {
    ensure!(input.shape[1] == 3, "Expected an RGB input, got shape {:?}", input.shape);
    let source = model.input_outlets()?[0];
    if let Some(clash) = model.nodes().iter().find(|n| n.name == input.name && n.id != source.node)
    {
        bail!("Can not name input {:?}: node #{} already uses this name", input.name, clash.id);
    }
    let name = &input.name;

    let mut patch = TypedModelPatch::default();
    let tap = patch.tap_model(&model, source)?;
    let scale = Tensor::from_shape(&[1, 1, 1, 1], &[input.scale])?;
    let bias = Tensor::from_shape(&[1, 3, 1, 1], &input.bias)?;
    let scale = patch.add_const(format!("{name}.scale"), scale)?;
    let bias = patch.add_const(format!("{name}.bias"), bias)?;
    let wire = patch.wire_node(format!("{name}.scaled"), mul(), &[tap, scale])?;
    let wire = patch.wire_node(format!("{name}.normalized"), add(), &[wire[0], bias])?;
    patch.shunt_outside(&model, source, wire[0])?;
    patch.apply(&mut model)?;

    model.node_mut(source.node).name = name.clone();
    model.into_compact()
}
