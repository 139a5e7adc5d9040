use std::io::Write;
use std::path::{Path, PathBuf};

use crate::internal::*;

pub trait ArtifactWriter {
    fn write(&self, model: &ConvertedModel, path: &Path) -> TractResult<()>;
}

/// Writes the archive next to its destination, then renames it over any
/// existing file. Gzip-compressed when the destination ends in `.tgz` or `.gz`.
#[derive(Clone, Copy, Debug, Default)]
pub struct ArchiveWriter;

pub fn is_gzip_path(path: &Path) -> bool {
    path.file_name()
        .map(|s| [".tgz", ".gz"].iter().any(|ext| s.to_string_lossy().ends_with(ext)))
        .unwrap_or(false)
}

fn partial_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".partial");
    path.with_file_name(name)
}

impl ArtifactWriter for ArchiveWriter {
    fn write(&self, model: &ConvertedModel, path: &Path) -> TractResult<()> {
        if path.exists() {
            warn!("Overwriting {:?}", path);
        }
        let partial = partial_path(path);
        if let Err(e) = write_then_rename(&model.archive, &partial, path) {
            let _ = fs_err::remove_file(&partial);
            return Err(e);
        }
        info!("Wrote {:?}", path);
        Ok(())
    }
}

fn write_then_rename(archive: &[u8], partial: &Path, path: &Path) -> TractResult<()> {
    let file = fs_err::File::create(partial)?;
    if is_gzip_path(path) {
        let mut encoder = flate2::write::GzEncoder::new(file, flate2::Compression::default());
        encoder.write_all(archive)?;
        encoder.finish()?.sync_all()?;
    } else {
        let mut file = file;
        file.write_all(archive)?;
        file.sync_all()?;
    }
    fs_err::rename(partial, path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn converted(archive: Vec<u8>) -> ConvertedModel {
        ConvertedModel {
            model: TypedModel::default(),
            input: ImageInput::new("image", [1, 3, 224, 224], &ImageNormalization::imagenet()),
            classifier: ClassifierConfig {
                model_id: "stub".into(),
                labels: ClassLabels::from(vec![]),
            },
            metadata: ClassifierMetadata {
                model_id: "stub".into(),
                input: ImageInput::new("image", [1, 3, 224, 224], &ImageNormalization::imagenet()),
                labels: "labels.txt".into(),
                classes: 0,
                exporter: "test".into(),
            },
            archive,
        }
    }

    #[test]
    fn gzip_by_extension() {
        assert!(is_gzip_path(Path::new("MyModel.nnef.tgz")));
        assert!(is_gzip_path(Path::new("out/MyModel.nnef.tar.gz")));
        assert!(!is_gzip_path(Path::new("MyModel.nnef.tar")));
    }

    #[test]
    fn overwrites_existing() -> TractResult<()> {
        let dir = temp_dir::TempDir::new()?;
        let path = dir.path().join("MyModel.nnef.tar");
        fs_err::write(&path, b"previous")?;
        ArchiveWriter.write(&converted(b"archive".to_vec()), &path)?;
        assert_eq!(fs_err::read(&path)?, b"archive");
        assert!(!partial_path(&path).exists());
        Ok(())
    }

    #[test]
    fn gzipped() -> TractResult<()> {
        use std::io::Read;
        let dir = temp_dir::TempDir::new()?;
        let path = dir.path().join("MyModel.nnef.tgz");
        ArchiveWriter.write(&converted(b"archive".to_vec()), &path)?;
        let mut data = vec![];
        flate2::read::GzDecoder::new(fs_err::File::open(&path)?).read_to_end(&mut data)?;
        assert_eq!(data, b"archive");
        Ok(())
    }

    #[test]
    fn missing_directory_fails() -> TractResult<()> {
        let dir = temp_dir::TempDir::new()?;
        let path = dir.path().join("nope").join("MyModel.nnef.tar");
        assert!(ArchiveWriter.write(&converted(vec![]), &path).is_err());
        assert!(!path.exists());
        Ok(())
    }

    #[test]
    fn failed_rename_leaves_no_partial() -> TractResult<()> {
        let dir = temp_dir::TempDir::new()?;
        let path = dir.path().join("MyModel.nnef.tar");
        fs_err::create_dir(&path)?;
        fs_err::write(path.join("occupied"), b"")?;
        assert!(ArchiveWriter.write(&converted(b"archive".to_vec()), &path).is_err());
        assert!(!partial_path(&path).exists());
        assert!(path.join("occupied").exists());
        Ok(())
    }
}
