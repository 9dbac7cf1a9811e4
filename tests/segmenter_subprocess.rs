//! `RembgSegmenter` against shell scripts standing in for the Python interpreter

#![cfg(unix)]

mod common;

use common::{is_empty_dir, photo_document, write_script};
use image::{Rgba, RgbaImage};
use layer_bgremove::{
    BackgroundRemovalPipeline, BgRemovalError, ImageHost, PipelineConfig, RembgSegmenter,
    SegmentRequest, Segmenter, Workspace,
};
use std::time::Duration;
use tempfile::TempDir;

fn request(dir: &TempDir) -> SegmentRequest {
    let config = PipelineConfig::default();
    SegmentRequest::from_config(&config, &dir.path().join("in.jpg"), &dir.path().join("out.png"))
}

#[tokio::test]
async fn test_failure_carries_stderr() {
    let temp = TempDir::new().unwrap();
    let script = write_script(temp.path(), "python", "echo '  No module named rembg  ' >&2\nexit 2");

    let err = RembgSegmenter::new(script)
        .segment(&request(&temp))
        .await
        .unwrap_err();
    match err {
        BgRemovalError::SegmenterFailed(message) => assert_eq!(message, "No module named rembg"),
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn test_silent_failure_uses_generic_message() {
    let temp = TempDir::new().unwrap();
    let script = write_script(temp.path(), "python", "exit 1");

    let err = RembgSegmenter::new(script)
        .segment(&request(&temp))
        .await
        .unwrap_err();
    assert_eq!(err.to_string(), "Segmentation failed: rembg failed");
}

#[tokio::test]
async fn test_missing_executable() {
    let temp = TempDir::new().unwrap();
    let missing = temp.path().join("no-such-python");

    let err = RembgSegmenter::new(&missing)
        .segment(&request(&temp))
        .await
        .unwrap_err();
    assert!(matches!(err, BgRemovalError::ExecutableNotFound(path) if path == missing));
}

#[tokio::test]
async fn test_timeout_kills_segmenter() {
    let temp = TempDir::new().unwrap();
    let script = write_script(temp.path(), "python", "sleep 5");

    let started = std::time::Instant::now();
    let err = RembgSegmenter::new(script)
        .with_timeout(Some(Duration::from_millis(200)))
        .segment(&request(&temp))
        .await
        .unwrap_err();
    assert!(matches!(err, BgRemovalError::SegmenterTimedOut(_)));
    assert!(started.elapsed() < Duration::from_secs(4));
}

#[tokio::test]
async fn test_success_without_output_fails_pipeline() {
    let temp = TempDir::new().unwrap();
    let scratch = TempDir::new().unwrap();
    let script = write_script(temp.path(), "python", "exit 0");
    let pipeline = BackgroundRemovalPipeline::new(PipelineConfig::default(), RembgSegmenter::new(script))
        .unwrap()
        .with_scratch_dir(scratch.path());

    let mut ws = Workspace::new();
    let (doc, layer) = photo_document(&mut ws, 10, 10);

    let err = pipeline.process_document(&mut ws, doc, layer).await.unwrap_err();
    assert!(matches!(err, BgRemovalError::OutputNotProduced(_)));
    assert_eq!(ws.layers(doc).unwrap(), vec![layer]);
    assert!(is_empty_dir(scratch.path()));
}

#[tokio::test]
async fn test_pipeline_with_scripted_rembg() {
    let temp = TempDir::new().unwrap();
    let scratch = TempDir::new().unwrap();

    let fixture = temp.path().join("cutout.png");
    RgbaImage::from_fn(16, 8, |x, _| {
        if x < 8 {
            Rgba([0, 0, 0, 0])
        } else {
            Rgba([10, 20, 30, 255])
        }
    })
    .save(&fixture)
    .unwrap();

    let args_file = temp.path().join("args.txt");
    let body = format!(
        "echo \"$@\" > '{}'\nfor last; do :; done\ncp '{}' \"$last\"",
        args_file.display(),
        fixture.display()
    );
    let script = write_script(temp.path(), "python", &body);

    let config = PipelineConfig::builder()
        .alpha_matting(true)
        .matting_erode(12)
        .segmenter_executable(&script)
        .build()
        .unwrap();
    let pipeline = BackgroundRemovalPipeline::from_config(config)
        .unwrap()
        .with_scratch_dir(scratch.path());
    assert_eq!(pipeline.segmenter().executable(), script.as_path());

    let mut ws = Workspace::new();
    let (doc, layer) = photo_document(&mut ws, 16, 8);
    let outcome = pipeline.process_document(&mut ws, doc, layer).await.unwrap();

    let args = std::fs::read_to_string(&args_file).unwrap();
    assert!(args.starts_with("-m rembg.cli i -m u2net -a -ae 12 "));
    assert!(args.contains("Temp-bgremove-0000.jpg"));
    assert!(args.trim_end().ends_with("Temp-bgremove-0000.png"));

    assert_eq!(ws.layers(doc).unwrap(), vec![outcome.layer]);
    let pixels = &ws.layer(doc, outcome.layer).unwrap().pixels;
    assert_eq!(pixels.get_pixel(0, 0).0, [0, 0, 0, 0]);
    assert_eq!(pixels.get_pixel(12, 4).0, [10, 20, 30, 255]);
    assert!(is_empty_dir(scratch.path()));
}
