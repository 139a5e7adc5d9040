use anyhow::{Context, Result};
use std::path::PathBuf;
use structopt::StructOpt;
use tract_classifier_export::prelude::*;

fn main() {
    let cli_args = CliArgs::from_args();

    let level = match cli_args.verbosity {
        0 => log::LevelFilter::Info,
        1 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };
    env_logger::Builder::new().filter_level(level).parse_env("RUST_LOG").init();

    if let Err(e) = cli_args.run() {
        log::error!("{e:?}");
        std::process::exit(1)
    }
}

#[derive(Debug, StructOpt)]
#[structopt(
    name = "classifier-export",
    about = "Export a pretrained ImageNet classifier to an NNEF archive, or run one"
)]
pub struct CliArgs {
    #[structopt(short = "v", parse(from_occurrences))]
    pub verbosity: usize,
    #[structopt(subcommand)]
    pub command: Command,
}

#[derive(Debug, StructOpt)]
pub enum Command {
    /// Download, convert and write the classifier archive
    Export {
        /// Destination archive. A `.tgz` or `.gz` suffix turns on compression
        #[structopt(short = "o", long = "output", default_value = "MyModel.nnef.tar")]
        output: PathBuf,
        /// Fetch class labels from this URL
        #[structopt(long = "labels-url")]
        labels_url: Option<String>,
        /// Read class labels from a local file instead of downloading them
        #[structopt(long = "labels-file")]
        labels_file: Option<PathBuf>,
        /// Use a local ONNX model instead of the pretrained download
        #[structopt(long = "model")]
        model: Option<PathBuf>,
        /// Where pretrained weights are cached (defaults to $CACHEDIR or .cached)
        #[structopt(long = "cache-dir")]
        cache_dir: Option<PathBuf>,
    },
    /// Classify an image with an exported archive
    Classify {
        artifact: PathBuf,
        image: PathBuf,
        /// Number of classes to report
        #[structopt(short = "k", long = "top", default_value = "5")]
        top: usize,
    },
}

impl Command {
    /// Reject flag combinations where one flag would be silently ignored.
    pub fn check(&self) -> Result<()> {
        if let Command::Export { labels_url, labels_file, model, cache_dir, .. } = self {
            if labels_url.is_some() && labels_file.is_some() {
                anyhow::bail!("--labels-url and --labels-file are mutually exclusive");
            }
            if model.is_some() && cache_dir.is_some() {
                anyhow::bail!("--cache-dir only applies to the pretrained download, not --model");
            }
        }
        Ok(())
    }
}

impl CliArgs {
    pub fn run(&self) -> Result<()> {
        self.command.check()?;
        match &self.command {
            Command::Export { output, labels_url, labels_file, model, cache_dir } => {
                let config = ExportConfig { output: output.clone(), ..ExportConfig::default() };
                let mut exporter = Exporter::imagenet(config);
                if let Some(url) = labels_url {
                    exporter.labels = HttpLabels { url: url.clone() };
                }
                if let Some(dir) = cache_dir {
                    exporter.model.cache_dir = dir.clone();
                }
                let converted = match (model, labels_file) {
                    (Some(model), Some(labels)) => exporter
                        .with_model(LocalOnnx { path: model.clone() })
                        .with_labels(FileLabels { path: labels.clone() })
                        .run(),
                    (Some(model), None) => {
                        exporter.with_model(LocalOnnx { path: model.clone() }).run()
                    }
                    (None, Some(labels)) => {
                        exporter.with_labels(FileLabels { path: labels.clone() }).run()
                    }
                    (None, None) => exporter.run(),
                }
                .context("Export failed")?;
                log::info!(
                    "Exported {} ({} classes) to {:?}",
                    converted.metadata.model_id,
                    converted.metadata.classes,
                    output
                );
            }
            Command::Classify { artifact, image, top } => {
                let classifier = ExportedClassifier::load(artifact)?;
                let tensor = classifier.image_to_tensor(image)?;
                for prediction in classifier.top(tensor, *top)? {
                    println!(
                        "{:>4} {:.4} {}",
                        prediction.index, prediction.probability, prediction.class_label
                    );
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> CliArgs {
        CliArgs::from_iter_safe(std::iter::once("classifier-export").chain(args.iter().copied()))
            .unwrap()
    }

    #[test]
    fn export_defaults() {
        let args = parse(&["export"]);
        assert!(args.command.check().is_ok());
        match args.command {
            Command::Export { output, model, .. } => {
                assert_eq!(output, PathBuf::from("MyModel.nnef.tar"));
                assert!(model.is_none());
            }
            _ => panic!("expected export"),
        }
    }

    #[test]
    fn labels_url_and_file_conflict() {
        let args = parse(&["export", "--labels-url", "http://x/l.txt", "--labels-file", "l.txt"]);
        assert!(args.command.check().is_err());
    }

    #[test]
    fn cache_dir_with_local_model_conflicts() {
        let args = parse(&["export", "--model", "m.onnx", "--cache-dir", "cache"]);
        assert!(args.command.check().is_err());
        assert!(parse(&["export", "--cache-dir", "cache"]).command.check().is_ok());
        assert!(parse(&["export", "--model", "m.onnx"]).command.check().is_ok());
    }

    #[test]
    fn classify_top_k() {
        let args = parse(&["-v", "classify", "m.nnef.tar", "cat.png", "-k", "3"]);
        assert_eq!(args.verbosity, 1);
        assert!(matches!(args.command, Command::Classify { top: 3, .. }));
    }
}
