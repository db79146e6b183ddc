//! End-to-end checks over a synthetic `data_road` tree:
//! 1. Layout verification
//! 2. Frame/mask pairing
//! 3. Batch iteration into Burn tensors

use burn::backend::ndarray::NdArray;
use burn_dataset::{
    index_split, verify_layout, BurnDatasetError, DatasetConfig, ImageShape, RoadDataset,
    ValidationOutcome, DEFAULT_BACKGROUND,
};
use image::{Rgb, RgbImage};
use std::fs;
use std::path::{Path, PathBuf};

type TestBackend = NdArray<f32>;

/// Write `count` frames (16x8) and their road masks. The left half of each mask
/// is background, the right half road.
fn create_split(split_dir: &Path, count: usize, with_labels: bool) -> anyhow::Result<()> {
    let images = split_dir.join("image_2");
    let labels = split_dir.join("gt_image_2");
    fs::create_dir_all(&images)?;
    fs::create_dir_all(&labels)?;
    for i in 0..count {
        let img = RgbImage::from_pixel(16, 8, Rgb([(i * 40) as u8, 90, 200]));
        img.save(images.join(format!("um_{i:06}.png")))?;
        if with_labels {
            let gt = RgbImage::from_fn(16, 8, |x, _| {
                if x < 8 {
                    Rgb(DEFAULT_BACKGROUND)
                } else {
                    Rgb([255, 0, 255])
                }
            });
            gt.save(labels.join(format!("um_road_{i:06}.png")))?;
            // Lane masks share the key but must be ignored.
            gt.save(labels.join(format!("um_lane_{i:06}.png")))?;
        }
    }
    Ok(())
}

fn create_data_dir(root: &Path, train: usize, test: usize) -> anyhow::Result<PathBuf> {
    let road = root.join("data_road");
    create_split(&road.join("training"), train, true)?;
    create_split(&road.join("testing"), test, false)?;
    Ok(root.to_path_buf())
}

#[test]
fn layout_fails_without_data_road() {
    let tmp = tempfile::tempdir().unwrap();
    let report = verify_layout(tmp.path());
    assert_eq!(report.outcome, ValidationOutcome::Fail);
    assert!(report.into_result().is_err());
}

#[test]
fn layout_warns_on_non_kitti_counts() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    let data_dir = create_data_dir(tmp.path(), 3, 2)?;
    let report = verify_layout(&data_dir);
    assert_eq!(report.outcome, ValidationOutcome::Warn);
    assert_eq!(report.training.images, 3);
    assert_eq!(report.training.labels, 3);
    assert_eq!(report.training.unlabeled, 0);
    assert_eq!(report.testing.images, 2);
    assert!(report.into_result().is_ok());
    Ok(())
}

#[test]
fn index_pairs_frames_with_road_masks() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    let data_dir = create_data_dir(tmp.path(), 3, 1)?;
    let pairs = index_split(&data_dir.join("data_road/training"))?;
    assert_eq!(pairs.len(), 3);
    for pair in &pairs {
        let label = pair.label.file_name().unwrap().to_str().unwrap();
        assert!(label.contains("_road_"), "unexpected label {label}");
    }
    Ok(())
}

#[test]
fn index_reports_frame_without_mask() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    let split = tmp.path().join("training");
    create_split(&split, 2, true)?;
    fs::remove_file(split.join("gt_image_2/um_road_000001.png"))?;
    match index_split(&split) {
        Err(BurnDatasetError::MissingLabel { key, .. }) => assert_eq!(key, "um_000001.png"),
        other => panic!("expected MissingLabel, got {other:?}"),
    }
    Ok(())
}

#[test]
fn batches_cover_every_sample_once_per_pass() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    let data_dir = create_data_dir(tmp.path(), 5, 1)?;
    let cfg = DatasetConfig {
        image_shape: ImageShape::new(8, 16),
        seed: Some(3),
        ..Default::default()
    };
    let dataset = RoadDataset::from_split(&data_dir.join("data_road/training"), cfg)?;
    let device = Default::default();

    for _pass in 0..2 {
        let mut iter = dataset.iter();
        let mut sizes = Vec::new();
        while let Some(batch) = iter.next_batch::<TestBackend>(2, &device)? {
            assert_eq!(batch.images.dims()[1..], [3, 8, 16]);
            assert_eq!(batch.labels.dims()[1..], [8, 16, 2]);
            assert!(!batch.is_empty());
            sizes.push(batch.len());
        }
        assert_eq!(sizes, vec![2, 2, 1]);
    }
    Ok(())
}

#[test]
fn labels_are_one_hot_and_follow_background_colour() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    let data_dir = create_data_dir(tmp.path(), 1, 1)?;
    let cfg = DatasetConfig {
        image_shape: ImageShape::new(8, 16),
        shuffle: false,
        ..Default::default()
    };
    let dataset = RoadDataset::from_split(&data_dir.join("data_road/training"), cfg)?;
    let device = Default::default();
    let batch = dataset
        .iter()
        .next_batch::<TestBackend>(4, &device)?
        .expect("one batch");

    let per_pixel = batch.labels.clone().sum_dim(3);
    let sums = per_pixel.into_data().to_vec::<f32>().unwrap();
    assert!(sums.iter().all(|s| (*s - 1.0).abs() < 1e-6));

    let labels = batch.labels.into_data().to_vec::<f32>().unwrap();
    // Row 0: x=0 is background, x=15 is road.
    assert_eq!(&labels[0..2], &[1.0, 0.0]);
    assert_eq!(&labels[15 * 2..15 * 2 + 2], &[0.0, 1.0]);
    Ok(())
}

#[test]
fn drop_last_discards_partial_batch() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    let data_dir = create_data_dir(tmp.path(), 3, 1)?;
    let cfg = DatasetConfig {
        image_shape: ImageShape::new(8, 16),
        drop_last: true,
        ..Default::default()
    };
    let dataset = RoadDataset::from_split(&data_dir.join("data_road/training"), cfg)?;
    let device = Default::default();
    let mut iter = dataset.iter();
    let mut count = 0;
    while iter.next_batch::<TestBackend>(2, &device)?.is_some() {
        count += 1;
    }
    assert_eq!(count, 1);
    Ok(())
}
