use tract_classifier_export::prelude::*;
use tract_classifier_export::trace::stub_model;

fn labels() -> String {
    let mut text = "background\n".to_string();
    for ix in 0..1000 {
        text.push_str(&format!("class {ix}\n"));
    }
    text
}

fn export(output: &std::path::Path) -> TractResult<ConvertedModel> {
    let config = ExportConfig { output: output.to_path_buf(), ..ExportConfig::default() };
    Exporter {
        config,
        model: stub_model,
        labels: labels(),
        converter: NnefConverter::default(),
        writer: ArchiveWriter,
    }
    .run()
}

/// Pixel values grow along rows then columns, so the last score wins.
fn gradient() -> TractResult<Tensor> {
    let image = tract_ndarray::Array4::from_shape_fn((1, 3, 224, 224), |(_, _, y, x)| {
        (y as f32 * 10.0 + x as f32 * 0.01).min(255.0)
    });
    Ok(image.into_dyn().into())
}

#[test]
fn export_and_classify() -> TractResult<()> {
    let _ = env_logger::Builder::from_env("TRACT_LOG").try_init();
    let dir = temp_dir::TempDir::new()?;
    let path = dir.path().join("MyModel.nnef.tar");
    let converted = export(&path)?;
    assert!(path.is_file());

    let classifier = ExportedClassifier::load(&path)?;
    assert_eq!(classifier.metadata, converted.metadata);
    assert_eq!(classifier.labels.len(), 1000);
    assert_eq!(classifier.labels.get(0), Some("class 0"));
    assert_eq!(classifier.labels.get(999), Some("class 999"));

    let input = classifier.input();
    let n = ImageNormalization::imagenet();
    assert_eq!(input.name, "image");
    assert_eq!(input.shape, [1, 3, 224, 224]);
    approx::assert_relative_eq!(input.scale, n.scale);
    approx::assert_relative_eq!(input.bias[0], n.red_bias);
    approx::assert_relative_eq!(input.bias[2], n.blue_bias);

    let prediction = classifier.predict(gradient()?)?;
    assert_eq!(prediction.index, 999);
    assert_eq!(prediction.class_label, "class 999");
    Ok(())
}

#[test]
fn gzipped_archive() -> TractResult<()> {
    let dir = temp_dir::TempDir::new()?;
    let path = dir.path().join("MyModel.nnef.tgz");
    export(&path)?;
    let classifier = ExportedClassifier::load(&path)?;
    let top = classifier.top(gradient()?, 3)?;
    let indices: Vec<usize> = top.iter().map(|p| p.index).collect();
    assert_eq!(indices, vec![999, 998, 997]);
    assert!(top[0].probability >= top[1].probability);
    Ok(())
}

#[test]
fn export_overwrites_previous_archive() -> TractResult<()> {
    let dir = temp_dir::TempDir::new()?;
    let path = dir.path().join("MyModel.nnef.tar");
    fs_err::write(&path, b"stale")?;
    export(&path)?;
    assert!(ExportedClassifier::load(&path).is_ok());
    Ok(())
}
