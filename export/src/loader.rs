use std::path::{Path, PathBuf};

use crate::internal::*;

/// A pretrained network the exporter knows how to fetch.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Architecture {
    pub id: &'static str,
    pub weights_url: &'static str,
    pub file_name: &'static str,
    pub channels: usize,
    pub height: usize,
    pub width: usize,
}

impl Architecture {
    pub const MOBILENET_V2: Architecture = Architecture {
        id: "mobilenet_v2",
        weights_url: "https://github.com/onnx/models/raw/main/validated/vision/classification/mobilenet/model/mobilenetv2-7.onnx",
        file_name: "mobilenetv2-7.onnx",
        channels: 3,
        height: 224,
        width: 224,
    };

    /// NCHW shape of a single-image batch.
    pub fn input_shape(&self) -> [usize; 4] {
        [1, self.channels, self.height, self.width]
    }
}

impl Default for Architecture {
    fn default() -> Architecture {
        Architecture::MOBILENET_V2
    }
}

pub fn cachedir() -> PathBuf {
    std::env::var("CACHEDIR").ok().unwrap_or_else(|| ".cached".to_string()).into()
}

pub trait ModelSource {
    fn load(&self) -> TractResult<InferenceModel>;
}

/// Pretrained weights, downloaded once into a cache directory.
#[derive(Clone, Debug)]
pub struct Pretrained {
    pub architecture: Architecture,
    pub cache_dir: PathBuf,
}

impl Pretrained {
    pub fn new(architecture: Architecture) -> Pretrained {
        Pretrained { architecture, cache_dir: cachedir() }
    }

    pub fn weights_path(&self) -> PathBuf {
        self.cache_dir.join(self.architecture.file_name)
    }

    fn download(&self) -> TractResult<PathBuf> {
        let path = self.weights_path();
        if path.is_file() {
            debug!("Found {} weights at {:?}", self.architecture.id, path);
            return Ok(path);
        }
        info!("Downloading {} weights to {:?}", self.architecture.id, path);
        fs_err::create_dir_all(&self.cache_dir)?;
        let partial = path.with_extension("partial");
        match self.fetch_to(&partial, &path) {
            Ok(len) => {
                debug!("Downloaded {len} bytes");
                Ok(path)
            }
            Err(e) => {
                let _ = fs_err::remove_file(&partial);
                Err(e)
            }
        }
    }

    fn fetch_to(&self, partial: &Path, path: &Path) -> TractResult<u64> {
        let url = self.architecture.weights_url;
        let mut response = reqwest::blocking::get(url)
            .and_then(|r| r.error_for_status())
            .with_context(|| format!("Downloading {url}"))?;
        let mut file = fs_err::File::create(partial)?;
        let len = std::io::copy(&mut response, &mut file)
            .with_context(|| format!("Writing weights to {partial:?}"))?;
        file.sync_all()?;
        drop(file);
        fs_err::rename(partial, path)?;
        Ok(len)
    }
}

impl Default for Pretrained {
    fn default() -> Pretrained {
        Pretrained::new(Architecture::default())
    }
}

impl ModelSource for Pretrained {
    fn load(&self) -> TractResult<InferenceModel> {
        let path = self.download()?;
        LocalOnnx { path }.load()
    }
}

/// An ONNX file already on disk.
#[derive(Clone, Debug)]
pub struct LocalOnnx {
    pub path: PathBuf,
}

impl ModelSource for LocalOnnx {
    fn load(&self) -> TractResult<InferenceModel> {
        load_onnx(&self.path)
    }
}

fn load_onnx(path: &Path) -> TractResult<InferenceModel> {
    info!("Loading ONNX model {:?}", path);
    tract_onnx::onnx()
        .model_for_path(path)
        .with_context(|| format!("Loading ONNX model from {path:?}"))
}

impl<F> ModelSource for F
where
    F: Fn() -> TractResult<InferenceModel>,
{
    fn load(&self) -> TractResult<InferenceModel> {
        self()
    }
}

/// A model switched to inference mode.
///
/// ONNX graphs are exported with inference semantics. Training-only
/// operators like dropout reduce to identities and go away when the graph
/// is decluttered.
#[derive(Clone, Debug)]
pub struct EvalModel(InferenceModel);

impl EvalModel {
    pub fn new(model: InferenceModel) -> TractResult<EvalModel> {
        let inputs = model.input_outlets()?.len();
        let outputs = model.output_outlets()?.len();
        ensure!(inputs == 1, "A classifier takes a single image input, found {} inputs", inputs);
        ensure!(outputs == 1, "A classifier has a single score output, found {} outputs", outputs);
        debug!("Model has {} nodes", model.nodes().len());
        Ok(EvalModel(model))
    }

    pub fn model(&self) -> &InferenceModel {
        &self.0
    }

    pub fn into_inner(self) -> InferenceModel {
        self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mobilenet_geometry() {
        let arch = Architecture::default();
        assert_eq!(arch.id, "mobilenet_v2");
        assert_eq!(arch.input_shape(), [1, 3, 224, 224]);
    }

    #[test]
    fn cached_weights_are_not_downloaded() -> TractResult<()> {
        let dir = temp_dir::TempDir::new()?;
        let pretrained =
            Pretrained { architecture: Architecture::default(), cache_dir: dir.path().into() };
        fs_err::write(pretrained.weights_path(), b"not really onnx")?;
        assert_eq!(pretrained.download()?, dir.path().join("mobilenetv2-7.onnx"));
        Ok(())
    }

    fn served(status: &str, body: &[u8], dir: &Path) -> Pretrained {
        let url = crate::serve_once(status, body.to_vec(), "mobilenetv2-7.onnx");
        let architecture =
            Architecture { weights_url: Box::leak(url.into_boxed_str()), ..Architecture::default() };
        Pretrained { architecture, cache_dir: dir.join("cache") }
    }

    #[test]
    fn downloads_into_fresh_cache() -> TractResult<()> {
        let dir = temp_dir::TempDir::new()?;
        let pretrained = served("200 OK", b"weights", dir.path());
        let path = pretrained.download()?;
        assert_eq!(path, pretrained.weights_path());
        assert_eq!(fs_err::read(&path)?, b"weights");
        assert!(!path.with_extension("partial").exists());
        Ok(())
    }

    #[test]
    fn failed_download_leaves_nothing() -> TractResult<()> {
        let dir = temp_dir::TempDir::new()?;
        let pretrained = served("404 Not Found", b"", dir.path());
        assert!(pretrained.download().is_err());
        let path = pretrained.weights_path();
        assert!(!path.exists());
        assert!(!path.with_extension("partial").exists());
        Ok(())
    }

    #[test]
    fn eval_rejects_multiple_outputs() -> TractResult<()> {
        let mut model = InferenceModel::default();
        let a = model.add_source("a", f32::fact([1, 3]).into())?;
        let b = model.add_source("b", f32::fact([1, 3]).into())?;
        model.set_output_outlets(&[a, b])?;
        model.set_input_outlets(&[a])?;
        assert!(EvalModel::new(model).is_err());
        Ok(())
    }
}
