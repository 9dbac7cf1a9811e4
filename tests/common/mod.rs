//! Shared helpers for integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use image::{DynamicImage, Rgb, RgbImage, Rgba, RgbaImage};
use layer_bgremove::{
    BgRemovalError, DocumentId, LayerId, ProcessingStage, ProgressReporter, ProgressUpdate,
    Result, SegmentRequest, Segmenter, StageTimings, Workspace,
};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// Stand-in for rembg: keeps the central region of the input, makes the border transparent
#[derive(Default)]
pub struct FakeSegmenter {
    calls: AtomicUsize,
    /// Zero-based call index that fails with a segmentation error
    pub fail_on_call: Option<usize>,
    /// Exit "successfully" without writing the cutout
    pub skip_output: bool,
    pub requests: Mutex<Vec<SegmentRequest>>,
}

impl FakeSegmenter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_on(call: usize) -> Self {
        Self {
            fail_on_call: Some(call),
            ..Self::default()
        }
    }

    pub fn without_output() -> Self {
        Self {
            skip_output: true,
            ..Self::default()
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Segmenter for FakeSegmenter {
    async fn segment(&self, request: &SegmentRequest) -> Result<()> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().unwrap().push(request.clone());

        assert!(request.input.exists(), "export must exist before segmentation");

        if self.fail_on_call == Some(call) {
            return Err(BgRemovalError::segmenter_failed("fake segmenter failure"));
        }
        if self.skip_output {
            return Ok(());
        }

        let input = image::open(&request.input)?.to_rgba8();
        let cutout = center_cutout(&input);
        cutout.save(&request.output)?;
        Ok(())
    }
}

/// Keep pixels inside the central half of the image, clear the rest
pub fn center_cutout(input: &RgbaImage) -> RgbaImage {
    let (w, h) = input.dimensions();
    RgbaImage::from_fn(w, h, |x, y| {
        if is_center(x, y, w, h) {
            let p = input.get_pixel(x, y).0;
            Rgba([p[0], p[1], p[2], 255])
        } else {
            Rgba([0, 0, 0, 0])
        }
    })
}

pub fn is_center(x: u32, y: u32, w: u32, h: u32) -> bool {
    x >= w / 4 && x < w - w / 4 && y >= h / 4 && y < h - h / 4
}

/// Single-layer document filled with one opaque color
pub fn photo_document(ws: &mut Workspace, width: u32, height: u32) -> (DocumentId, LayerId) {
    let doc = ws.create_document("photo.jpg", width, height).unwrap();
    let image = DynamicImage::ImageRgb8(RgbImage::from_pixel(width, height, Rgb([200, 50, 50])));
    let layer = ws.add_layer_from_image(doc, "photo.jpg", &image, (0, 0)).unwrap();
    (doc, layer)
}

/// Whether a directory has no entries left
pub fn is_empty_dir(dir: &Path) -> bool {
    std::fs::read_dir(dir).unwrap().next().is_none()
}

/// Reporter that records every event it receives
#[derive(Default)]
pub struct RecordingReporter {
    pub stages: Mutex<Vec<(DocumentId, ProcessingStage)>>,
    pub errors: Mutex<Vec<(DocumentId, ProcessingStage, String)>>,
    pub completions: Mutex<Vec<(DocumentId, StageTimings)>>,
}

/// Handle passed to the pipeline while the test keeps the `Arc`
pub struct SharedReporter(pub Arc<RecordingReporter>);

impl ProgressReporter for SharedReporter {
    fn report_progress(&self, update: ProgressUpdate) {
        self.0.stages.lock().unwrap().push((update.document, update.stage));
    }

    fn report_completion(&self, document: DocumentId, timings: &StageTimings) {
        self.0.completions.lock().unwrap().push((document, *timings));
    }

    fn report_error(&self, document: DocumentId, stage: ProcessingStage, error: &str) {
        self.0
            .errors
            .lock()
            .unwrap()
            .push((document, stage, error.to_string()));
    }
}

/// Write an executable shell script standing in for the Python interpreter
#[cfg(unix)]
pub fn write_script(dir: &Path, name: &str, body: &str) -> PathBuf {
    use std::os::unix::fs::PermissionsExt;

    let path = dir.join(name);
    std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
    let mut permissions = std::fs::metadata(&path).unwrap().permissions();
    permissions.set_mode(0o755);
    std::fs::set_permissions(&path, permissions).unwrap();
    path
}
