//! Export a pretrained ImageNet classifier to a self-describing NNEF archive.
//!
//! The archive carries the network, the pixel normalization (folded into the
//! graph, so consumers feed raw 0-255 pixels) and the class labels.
//!
//! ```no_run
//! use tract_classifier_export::prelude::*;
//!
//! # fn main() -> TractResult<()> {
//! Exporter::imagenet(ExportConfig::default()).run()?;
//! # Ok(())
//! # }
//! ```

#[macro_use]
extern crate log;

pub mod classifier;
pub mod convert;
pub mod labels;
pub mod loader;
pub mod normalization;
pub mod pipeline;
pub mod trace;
pub mod writer;

pub use tract_nnef;
pub use tract_onnx;

pub mod prelude {
    pub use crate::classifier::{ExportedClassifier, Prediction};
    pub use crate::convert::{
        ClassifierConfig, ClassifierMetadata, ConvertedModel, Converter, ImageInput, NnefConverter,
    };
    pub use crate::labels::{ClassLabels, FileLabels, HttpLabels, LabelSource};
    pub use crate::loader::{Architecture, EvalModel, LocalOnnx, ModelSource, Pretrained};
    pub use crate::normalization::ImageNormalization;
    pub use crate::pipeline::{ExportConfig, Exporter};
    pub use crate::trace::{trace, TracedGraph};
    pub use crate::writer::{ArchiveWriter, ArtifactWriter};
    pub use tract_onnx::prelude::*;
}

pub(crate) mod internal {
    pub use crate::prelude::*;
    pub use tract_hir::internal::*;
}

#[cfg(test)]
#[allow(dead_code)]
pub(crate) fn setup_test_logger() {
    let _ = env_logger::Builder::from_env("TRACT_LOG").try_init();
}

/// Answer a single HTTP request on a loopback port, return the URL to hit.
#[cfg(test)]
pub(crate) fn serve_once(status: &str, body: Vec<u8>, file_name: &str) -> String {
    use std::io::{BufRead, BufReader, Write};
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    let status = status.to_string();
    std::thread::spawn(move || {
        let (stream, _) = listener.accept().unwrap();
        let mut reader = BufReader::new(stream);
        let mut line = String::new();
        while reader.read_line(&mut line).unwrap() > 0 && line != "\r\n" {
            line.clear();
        }
        let mut stream = reader.into_inner();
        write!(
            stream,
            "HTTP/1.1 {status}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
            body.len()
        )
        .unwrap();
        stream.write_all(&body).unwrap();
    });
    format!("http://{addr}/{file_name}")
}
