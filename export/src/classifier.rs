//! Consumer side of an exported archive: feed raw images, get class labels.

use std::io::Read;
use std::path::Path;

use tract_nnef::internal::Nnef;
use tract_nnef::prelude::Framework as _;
use tract_onnx_opl::WithOnnx;

use crate::convert::{LABELS_FILENAME, METADATA_FILENAME};
use crate::internal::*;

#[derive(Clone, Debug, PartialEq)]
pub struct Prediction {
    pub index: usize,
    pub class_label: String,
    pub probability: f32,
}

pub struct ExportedClassifier {
    pub metadata: ClassifierMetadata,
    pub labels: ClassLabels,
    plan: TypedRunnableModel<TypedModel>,
}

impl std::fmt::Debug for ExportedClassifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ExportedClassifier({}, {} classes)", self.metadata.model_id, self.labels.len())
    }
}

impl ExportedClassifier {
    pub fn load(path: impl AsRef<Path>) -> TractResult<ExportedClassifier> {
        let path = path.as_ref();
        let data = fs_err::read(path)?;
        Self::from_bytes(&data).with_context(|| format!("Loading classifier from {path:?}"))
    }

    /// Plain or gzipped archive bytes.
    pub fn from_bytes(data: &[u8]) -> TractResult<ExportedClassifier> {
        let bytes = if data.starts_with(&[0x1f, 0x8b]) {
            let mut bytes = vec![];
            flate2::read::GzDecoder::new(data).read_to_end(&mut bytes)?;
            bytes
        } else {
            data.to_vec()
        };

        let mut labels = None;
        let mut metadata = None;
        let mut archive = tar::Archive::new(&bytes[..]);
        for entry in archive.entries()? {
            let mut entry = entry?;
            let name = entry.path()?.to_string_lossy().into_owned();
            if name == LABELS_FILENAME {
                let mut text = String::new();
                entry.read_to_string(&mut text)?;
                labels = Some(ClassLabels::from_archive_text(&text));
            } else if name == METADATA_FILENAME {
                let parsed: ClassifierMetadata = serde_json::from_reader(&mut entry)
                    .with_context(|| format!("Parsing {METADATA_FILENAME}"))?;
                metadata = Some(parsed);
            }
        }
        let Some(labels) = labels else { bail!("Archive has no {LABELS_FILENAME}") };
        let Some(metadata) = metadata else { bail!("Archive has no {METADATA_FILENAME}") };
        ensure!(
            metadata.classes == labels.len(),
            "Metadata declares {} classes, {} has {}",
            metadata.classes,
            LABELS_FILENAME,
            labels.len()
        );

        let nnef: Nnef = tract_nnef::nnef().with_onnx();
        let model = nnef.model_for_read(&mut &bytes[..]).context("Loading NNEF graph")?;
        let plan = model.into_optimized()?.into_runnable()?;
        Ok(ExportedClassifier { metadata, labels, plan })
    }

    pub fn input(&self) -> &ImageInput {
        &self.metadata.input
    }

    /// Class probabilities for a raw-pixel NCHW image.
    pub fn probabilities(&self, image: Tensor) -> TractResult<Vec<f32>> {
        let outputs = self.plan.run(tvec!(image.into()))?;
        let scores = outputs[0].as_slice::<f32>()?;
        ensure!(
            scores.len() == self.labels.len(),
            "Model produced {} scores for {} labels",
            scores.len(),
            self.labels.len()
        );
        Ok(softmax(scores))
    }

    /// The `k` most likely classes, best first.
    pub fn top(&self, image: Tensor, k: usize) -> TractResult<Vec<Prediction>> {
        let probabilities = self.probabilities(image)?;
        let mut ranked: Vec<usize> = (0..probabilities.len()).collect();
        ranked.sort_by(|a, b| probabilities[*b].total_cmp(&probabilities[*a]));
        ranked
            .into_iter()
            .take(k)
            .map(|index| {
                let class_label = self
                    .labels
                    .get(index)
                    .ok_or_else(|| format_err!("No label for class {}", index))?
                    .to_string();
                Ok(Prediction { index, class_label, probability: probabilities[index] })
            })
            .collect()
    }

    pub fn predict(&self, image: Tensor) -> TractResult<Prediction> {
        self.top(image, 1)?.pop().context("Model produced no scores")
    }

    /// Decode an image file into the raw-pixel tensor this classifier expects.
    pub fn image_to_tensor(&self, path: impl AsRef<Path>) -> TractResult<Tensor> {
        let [_, _, height, width] = self.input().shape;
        image_to_tensor(path, height, width)
    }
}

/// Resize to `width x height` and lay out as a 1x3xHxW f32 tensor of raw
/// 0-255 values. Normalization happens inside the exported graph.
pub fn image_to_tensor(path: impl AsRef<Path>, height: usize, width: usize) -> TractResult<Tensor> {
    let path = path.as_ref();
    let image = image::open(path).with_context(|| format!("Opening image {path:?}"))?.to_rgb8();
    let resized = image::imageops::resize(
        &image,
        width as u32,
        height as u32,
        image::imageops::FilterType::Triangle,
    );
    Ok(tract_ndarray::Array4::from_shape_fn((1, 3, height, width), |(_, c, y, x)| {
        resized[(x as _, y as _)][c] as f32
    })
    .into_dyn()
    .into())
}

fn softmax(scores: &[f32]) -> Vec<f32> {
    let max = scores.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let exps: Vec<f32> = scores.iter().map(|s| (s - max).exp()).collect();
    let sum: f32 = exps.iter().sum();
    exps.into_iter().map(|e| e / sum).collect()
}
