use std::path::PathBuf;

use crate::internal::*;
use crate::labels::IMAGENET_CLASSES;

pub const DEFAULT_OUTPUT: &str = "MyModel.nnef.tar";
pub const DEFAULT_INPUT_NAME: &str = "image";

#[derive(Clone, Debug)]
pub struct ExportConfig {
    pub output: PathBuf,
    pub architecture: Architecture,
    pub expected_classes: usize,
    pub input_name: String,
    pub normalization: ImageNormalization,
}

impl Default for ExportConfig {
    fn default() -> ExportConfig {
        ExportConfig {
            output: DEFAULT_OUTPUT.into(),
            architecture: Architecture::default(),
            expected_classes: IMAGENET_CLASSES,
            input_name: DEFAULT_INPUT_NAME.to_string(),
            normalization: ImageNormalization::imagenet(),
        }
    }
}

/// Load, fetch labels, trace, convert, write. Each stage runs once, in order,
/// and the first failure aborts the export before anything is written.
#[derive(Debug)]
pub struct Exporter<M, L, C, W> {
    pub config: ExportConfig,
    pub model: M,
    pub labels: L,
    pub converter: C,
    pub writer: W,
}

impl Exporter<Pretrained, HttpLabels, NnefConverter, ArchiveWriter> {
    pub fn imagenet(config: ExportConfig) -> Self {
        let model = Pretrained::new(config.architecture.clone());
        Exporter {
            config,
            model,
            labels: HttpLabels::default(),
            converter: NnefConverter::default(),
            writer: ArchiveWriter,
        }
    }
}

impl<M, L, C, W> Exporter<M, L, C, W>
where
    M: ModelSource,
    L: LabelSource,
    C: Converter,
    W: ArtifactWriter,
{
    pub fn with_model<M2: ModelSource>(self, model: M2) -> Exporter<M2, L, C, W> {
        let Exporter { config, labels, converter, writer, .. } = self;
        Exporter { config, model, labels, converter, writer }
    }

    pub fn with_labels<L2: LabelSource>(self, labels: L2) -> Exporter<M, L2, C, W> {
        let Exporter { config, model, converter, writer, .. } = self;
        Exporter { config, model, labels, converter, writer }
    }

    pub fn run(&self) -> TractResult<ConvertedModel> {
        let architecture = &self.config.architecture;
        let model = self.model.load().context("Loading model")?;
        let model = EvalModel::new(model)?;

        let text = self.labels.fetch().context("Fetching class labels")?;
        let labels = ClassLabels::parse(&text, self.config.expected_classes)?;

        let graph = trace(model, architecture.input_shape()).context("Tracing model")?;

        let input = ImageInput::new(
            self.config.input_name.clone(),
            architecture.input_shape(),
            &self.config.normalization,
        );
        let classifier = ClassifierConfig { model_id: architecture.id.to_string(), labels };
        let converted =
            self.converter.convert(graph, &input, &classifier).context("Converting model")?;

        self.writer
            .write(&converted, &self.config.output)
            .with_context(|| format!("Writing {:?}", self.config.output))?;
        Ok(converted)
    }
}
