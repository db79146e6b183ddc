use burn::backend::ndarray::NdArray;
use burn::tensor::{Distribution, Tensor};
use burn_dataset::ImageShape;
use models::{Fcn, FcnConfig, Vgg16Config};
use training::checkpoint::{meta_path, read_meta, weights_path};
use training::{restore_checkpoint, save_checkpoint, CheckpointMeta};

type TestBackend = NdArray<f32>;

fn tiny_backbone() -> Vgg16Config {
    Vgg16Config {
        in_channels: 3,
        block_channels: [4, 4, 8, 8, 8],
        fc_channels: 16,
    }
}

fn tiny_model(num_classes: usize) -> Fcn<TestBackend> {
    FcnConfig::new(tiny_backbone(), num_classes).init(&Default::default())
}

fn shape() -> ImageShape {
    ImageShape::new(32, 64)
}

#[test]
fn restore_reproduces_saved_outputs() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    let model_path = tmp.path().join("model").join("model.ckpt");
    let device = Default::default();

    let saved = tiny_model(2);
    let meta = CheckpointMeta::describe(&saved, &tiny_backbone(), shape(), 4, 0.25);
    save_checkpoint(&saved, &model_path, &meta)?;
    assert!(weights_path(&model_path).is_file());
    assert!(meta_path(&model_path).is_file());
    assert!(!tmp.path().join("model/model.ckpt.tmp.bin").exists());
    assert!(!tmp.path().join("model/model.ckpt.tmp.json").exists());

    let stored = read_meta(&model_path)?;
    assert_eq!(stored.epoch, 4);
    assert_eq!(stored.loss, 0.25);
    assert_eq!(stored.num_params, meta.num_params);

    let fresh = tiny_model(2);
    let current = CheckpointMeta::describe(&fresh, &tiny_backbone(), shape(), 0, f32::NAN);
    let restored = restore_checkpoint(fresh, &model_path, &current, &device)?;

    let images =
        Tensor::<TestBackend, 4>::random([1, 3, 32, 64], Distribution::Uniform(0.0, 255.0), &device);
    let a = saved.forward(images.clone(), 1.0).into_data().to_vec::<f32>().unwrap();
    let b = restored.forward(images, 1.0).into_data().to_vec::<f32>().unwrap();
    assert_eq!(a.len(), b.len());
    let max_diff = a
        .iter()
        .zip(&b)
        .map(|(x, y)| (x - y).abs())
        .fold(0.0f32, f32::max);
    assert!(max_diff < 1e-5, "outputs differ by {max_diff}");
    Ok(())
}

#[test]
fn resave_replaces_weights_and_metadata_together() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    let model_path = tmp.path().join("model.ckpt");
    let first = tiny_model(2);
    save_checkpoint(
        &first,
        &model_path,
        &CheckpointMeta::describe(&first, &tiny_backbone(), shape(), 1, 0.9),
    )?;
    let second = tiny_model(2);
    save_checkpoint(
        &second,
        &model_path,
        &CheckpointMeta::describe(&second, &tiny_backbone(), shape(), 2, 0.4),
    )?;

    let stored = read_meta(&model_path)?;
    assert_eq!((stored.epoch, stored.loss), (2, 0.4));
    let leftovers: Vec<_> = std::fs::read_dir(tmp.path())?
        .filter_map(|e| e.ok())
        .map(|e| e.file_name().to_string_lossy().into_owned())
        .filter(|name| name.contains(".tmp"))
        .collect();
    assert!(leftovers.is_empty(), "{leftovers:?}");
    Ok(())
}

#[test]
fn missing_checkpoint_names_the_path() {
    let tmp = tempfile::tempdir().unwrap();
    let model_path = tmp.path().join("absent.ckpt");
    let model = tiny_model(2);
    let current = CheckpointMeta::describe(&model, &tiny_backbone(), shape(), 0, 0.0);
    let err = restore_checkpoint(model, &model_path, &current, &Default::default()).unwrap_err();
    assert!(err.to_string().contains("absent.ckpt.bin"), "{err}");
}

#[test]
fn mismatched_metadata_is_rejected() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    let model_path = tmp.path().join("model.ckpt");
    let saved = tiny_model(2);
    save_checkpoint(
        &saved,
        &model_path,
        &CheckpointMeta::describe(&saved, &tiny_backbone(), shape(), 1, 0.5),
    )?;

    let fresh = tiny_model(2);
    let other_shape = ImageShape::new(64, 64);
    let current = CheckpointMeta::describe(&fresh, &tiny_backbone(), other_shape, 0, 0.0);
    let err = restore_checkpoint(fresh, &model_path, &current, &Default::default()).unwrap_err();
    let msg = format!("{err:#}");
    assert!(msg.contains("32x64"), "{msg}");
    Ok(())
}
