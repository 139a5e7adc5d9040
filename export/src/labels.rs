use std::path::PathBuf;

use crate::internal::*;

pub const IMAGENET_LABELS_URL: &str =
    "https://storage.googleapis.com/download.tensorflow.org/data/ImageNetLabels.txt";
pub const IMAGENET_CLASSES: usize = 1000;

/// Class names, index-aligned with the classifier output vector.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ClassLabels(Vec<String>);

impl ClassLabels {
    /// Parse a newline-delimited label list.
    ///
    /// The first line is a placeholder class (`background` in the ImageNet
    /// list) with no matching network output, and is dropped.
    pub fn parse(text: &str, expected: usize) -> TractResult<ClassLabels> {
        let labels: Vec<String> = split_lines(text).skip(1).map(|s| s.to_string()).collect();
        ensure!(
            labels.len() == expected,
            "Expected {} class labels after dropping the leading entry, got {}",
            expected,
            labels.len()
        );
        Ok(ClassLabels(labels))
    }

    /// Labels as written in an exported archive: one per line, no placeholder.
    pub fn from_archive_text(text: &str) -> ClassLabels {
        ClassLabels(split_lines(text).map(|s| s.to_string()).collect())
    }

    pub fn to_archive_text(&self) -> String {
        let mut text = self.0.join("\n");
        text.push('\n');
        text
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, ix: usize) -> Option<&str> {
        self.0.get(ix).map(|s| s.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(|s| s.as_str())
    }

    pub fn as_slice(&self) -> &[String] {
        &self.0
    }
}

/// Lines ended by `\n`, `\r\n` or a lone `\r`. A trailing terminator does not
/// start an extra line.
fn split_lines(text: &str) -> impl Iterator<Item = &str> {
    let mut rest = (!text.is_empty()).then(|| {
        text.strip_suffix("\r\n").or_else(|| text.strip_suffix(['\n', '\r'])).unwrap_or(text)
    });
    std::iter::from_fn(move || {
        let current = rest?;
        match current.find(['\n', '\r']) {
            Some(ix) => {
                let skip = if current[ix..].starts_with("\r\n") { 2 } else { 1 };
                rest = Some(&current[ix + skip..]);
                Some(&current[..ix])
            }
            None => {
                rest = None;
                Some(current)
            }
        }
    })
}

impl From<Vec<String>> for ClassLabels {
    fn from(labels: Vec<String>) -> ClassLabels {
        ClassLabels(labels)
    }
}

/// Where the raw label list comes from.
pub trait LabelSource {
    fn fetch(&self) -> TractResult<String>;
}

#[derive(Clone, Debug)]
pub struct HttpLabels {
    pub url: String,
}

impl Default for HttpLabels {
    fn default() -> HttpLabels {
        HttpLabels { url: IMAGENET_LABELS_URL.to_string() }
    }
}

impl LabelSource for HttpLabels {
    fn fetch(&self) -> TractResult<String> {
        info!("Fetching class labels from {}", self.url);
        let response = reqwest::blocking::get(&self.url)
            .and_then(|r| r.error_for_status())
            .with_context(|| format!("Fetching labels from {}", self.url))?;
        let bytes = response.bytes().with_context(|| format!("Reading labels from {}", self.url))?;
        let text = String::from_utf8(bytes.to_vec())
            .with_context(|| format!("Labels from {} are not valid UTF-8", self.url))?;
        debug!("Fetched {} bytes of labels", text.len());
        Ok(text)
    }
}

#[derive(Clone, Debug)]
pub struct FileLabels {
    pub path: PathBuf,
}

impl LabelSource for FileLabels {
    fn fetch(&self) -> TractResult<String> {
        info!("Reading class labels from {:?}", self.path);
        Ok(fs_err::read_to_string(&self.path)?)
    }
}

impl LabelSource for String {
    fn fetch(&self) -> TractResult<String> {
        Ok(self.clone())
    }
}

#[cfg(test)]
pub(crate) fn fixture(classes: usize) -> String {
    let mut text = "background\n".to_string();
    for ix in 0..classes {
        text.push_str(&format!("class {ix}\n"));
    }
    text
}
