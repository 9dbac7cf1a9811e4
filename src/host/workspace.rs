//! In-memory image host
//!
//! A small layered-document model backed by `image` buffers. It implements the
//! full [`ImageHost`] surface so the pipeline can run without an external editor.

use super::blend::{composite_onto, flatten_onto_white};
use super::{ColorMode, DocumentId, Fill, ImageHost, LayerId, MaskInit, MergePolicy};
use crate::error::{BgRemovalError, Result};
use crate::services::{ImageIOService, OutputFormat};
use image::{DynamicImage, GrayImage, Luma, Rgba, RgbaImage};
use std::path::Path;
use tracing::{debug, trace};

/// Optional host features
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HostCapabilities {
    /// Masks can be initialized from the layer's alpha channel
    pub mask_from_alpha: bool,
}

impl Default for HostCapabilities {
    fn default() -> Self {
        Self {
            mask_from_alpha: true,
        }
    }
}

/// Single-channel opacity buffer owned by a layer
#[derive(Debug, Clone, PartialEq)]
pub struct Mask {
    pub data: GrayImage,
}

/// Rectangular pixel buffer placed on a document canvas
#[derive(Debug, Clone)]
pub struct Layer {
    pub id: LayerId,
    pub name: String,
    /// Always RGBA8; for `ColorMode::Rgb` every alpha value is 255
    pub pixels: RgbaImage,
    pub mode: ColorMode,
    pub offset: (i32, i32),
    pub visible: bool,
    pub mask: Option<Mask>,
}

impl Layer {
    #[must_use]
    pub fn width(&self) -> u32 {
        self.pixels.width()
    }

    #[must_use]
    pub fn height(&self) -> u32 {
        self.pixels.height()
    }

    fn has_alpha(&self) -> bool {
        self.mode == ColorMode::Rgba
    }
}

#[derive(Debug, Clone)]
struct Snapshot {
    width: u32,
    height: u32,
    layers: Vec<Layer>,
    selected: Option<LayerId>,
}

/// Layered document
#[derive(Debug, Clone)]
pub struct Document {
    id: DocumentId,
    name: String,
    width: u32,
    height: u32,
    /// Index 0 is the top of the stack
    layers: Vec<Layer>,
    /// Layers created or loaded but not inserted yet
    detached: Vec<Layer>,
    selected: Option<LayerId>,
    undo_depth: u32,
    pending_snapshot: Option<Snapshot>,
    undo_stack: Vec<Snapshot>,
}

impl Document {
    #[must_use]
    pub fn id(&self) -> DocumentId {
        self.id
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn width(&self) -> u32 {
        self.width
    }

    #[must_use]
    pub fn height(&self) -> u32 {
        self.height
    }

    /// Layers top to bottom
    #[must_use]
    pub fn layers(&self) -> &[Layer] {
        &self.layers
    }

    #[must_use]
    pub fn layer(&self, id: LayerId) -> Option<&Layer> {
        self.layers.iter().find(|l| l.id == id)
    }

    #[must_use]
    pub fn undo_steps(&self) -> usize {
        self.undo_stack.len()
    }

    fn snapshot(&self) -> Snapshot {
        Snapshot {
            width: self.width,
            height: self.height,
            layers: self.layers.clone(),
            selected: self.selected,
        }
    }

    fn position(&self, layer: LayerId) -> Result<usize> {
        self.layers
            .iter()
            .position(|l| l.id == layer)
            .ok_or_else(|| {
                BgRemovalError::host(format!("{} is not in the stack of {}", layer, self.id))
            })
    }

    fn any_layer(&self, layer: LayerId) -> Result<&Layer> {
        self.layers
            .iter()
            .chain(self.detached.iter())
            .find(|l| l.id == layer)
            .ok_or_else(|| BgRemovalError::host(format!("{} not found in {}", layer, self.id)))
    }

    fn any_layer_mut(&mut self, layer: LayerId) -> Result<&mut Layer> {
        let id = self.id;
        self.layers
            .iter_mut()
            .chain(self.detached.iter_mut())
            .find(|l| l.id == layer)
            .ok_or_else(|| BgRemovalError::host(format!("{} not found in {}", layer, id)))
    }

    /// Composite `layers` (given bottom to top) into a buffer covering `bounds`
    fn composite_region<'a, I>(layers: I, bounds: (i32, i32, u32, u32)) -> RgbaImage
    where
        I: IntoIterator<Item = &'a Layer>,
    {
        let (bx, by, bw, bh) = bounds;
        let mut out = RgbaImage::new(bw, bh);
        for layer in layers {
            composite_onto(
                &mut out,
                &layer.pixels,
                layer.mask.as_ref().map(|m| &m.data),
                i64::from(layer.offset.0) - i64::from(bx),
                i64::from(layer.offset.1) - i64::from(by),
            );
        }
        out
    }

    /// Visible layers composited onto a transparent canvas
    #[must_use]
    pub fn flatten(&self) -> RgbaImage {
        Self::composite_region(
            self.layers.iter().rev().filter(|l| l.visible),
            (0, 0, self.width, self.height),
        )
    }
}

/// The set of open documents
#[derive(Debug, Default)]
pub struct Workspace {
    documents: Vec<Document>,
    next_document: u32,
    next_layer: u32,
    capabilities: HostCapabilities,
}

impl Workspace {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_capabilities(capabilities: HostCapabilities) -> Self {
        Self {
            capabilities,
            ..Self::default()
        }
    }

    fn alloc_layer_id(&mut self) -> LayerId {
        self.next_layer += 1;
        LayerId(self.next_layer)
    }

    /// Create an empty document
    pub fn create_document<S: Into<String>>(
        &mut self,
        name: S,
        width: u32,
        height: u32,
    ) -> Result<DocumentId> {
        if width == 0 || height == 0 {
            return Err(BgRemovalError::host(format!(
                "canvas size must be non-zero, got {}x{}",
                width, height
            )));
        }
        self.next_document += 1;
        let id = DocumentId(self.next_document);
        self.documents.push(Document {
            id,
            name: name.into(),
            width,
            height,
            layers: Vec::new(),
            detached: Vec::new(),
            selected: None,
            undo_depth: 0,
            pending_snapshot: None,
            undo_stack: Vec::new(),
        });
        debug!(document = %id, width, height, "Created document");
        Ok(id)
    }

    /// Add an image as the new top layer and select it
    pub fn add_layer_from_image<S: Into<String>>(
        &mut self,
        doc: DocumentId,
        name: S,
        image: &DynamicImage,
        offset: (i32, i32),
    ) -> Result<LayerId> {
        let id = self.alloc_layer_id();
        let layer = layer_from_image(id, name.into(), image, offset);
        let document = self.document_mut(doc)?;
        document.layers.insert(0, layer);
        document.selected = Some(id);
        Ok(id)
    }

    /// Open an image file as a new single-layer document
    pub fn open_image<P: AsRef<Path>>(&mut self, path: P) -> Result<DocumentId> {
        let path = path.as_ref();
        let image = ImageIOService::load_image(path)?;
        let name = file_name(path);
        let doc = self.create_document(name.clone(), image.width(), image.height())?;
        self.add_layer_from_image(doc, name, &image, (0, 0))?;
        Ok(doc)
    }

    pub fn document(&self, doc: DocumentId) -> Result<&Document> {
        self.documents
            .iter()
            .find(|d| d.id == doc)
            .ok_or_else(|| BgRemovalError::host(format!("{} is not open", doc)))
    }

    fn document_mut(&mut self, doc: DocumentId) -> Result<&mut Document> {
        self.documents
            .iter_mut()
            .find(|d| d.id == doc)
            .ok_or_else(|| BgRemovalError::host(format!("{} is not open", doc)))
    }

    pub fn layer(&self, doc: DocumentId, layer: LayerId) -> Result<&Layer> {
        self.document(doc)?.any_layer(layer)
    }

    pub fn select_layer(&mut self, doc: DocumentId, layer: LayerId) -> Result<()> {
        let document = self.document_mut(doc)?;
        document.position(layer)?;
        document.selected = Some(layer);
        Ok(())
    }

    /// Visible layers composited onto a transparent canvas
    pub fn flatten(&self, doc: DocumentId) -> Result<RgbaImage> {
        Ok(self.document(doc)?.flatten())
    }

    /// Save the flattened document as PNG, keeping transparency
    pub fn export_png<P: AsRef<Path>>(&self, doc: DocumentId, path: P) -> Result<()> {
        let flat = self.flatten(doc)?;
        ImageIOService::save_image(&DynamicImage::ImageRgba8(flat), path, OutputFormat::Png)
    }

    /// Restore the state captured by the most recent undo group
    ///
    /// Returns `false` when there is nothing to undo.
    pub fn undo(&mut self, doc: DocumentId) -> Result<bool> {
        let document = self.document_mut(doc)?;
        if document.undo_depth > 0 {
            return Err(BgRemovalError::host("cannot undo while an undo group is open"));
        }
        let Some(snapshot) = document.undo_stack.pop() else {
            return Ok(false);
        };
        document.width = snapshot.width;
        document.height = snapshot.height;
        document.layers = snapshot.layers;
        document.selected = snapshot.selected;
        document.detached.clear();
        Ok(true)
    }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map_or_else(|| "Untitled".to_string(), |n| n.to_string_lossy().into_owned())
}

fn layer_from_image(id: LayerId, name: String, image: &DynamicImage, offset: (i32, i32)) -> Layer {
    let mode = if image.color().has_alpha() {
        ColorMode::Rgba
    } else {
        ColorMode::Rgb
    };
    let mut pixels = image.to_rgba8();
    if mode == ColorMode::Rgb {
        force_opaque(&mut pixels);
    }
    Layer {
        id,
        name,
        pixels,
        mode,
        offset,
        visible: true,
        mask: None,
    }
}

fn force_opaque(pixels: &mut RgbaImage) {
    for px in pixels.pixels_mut() {
        px.0[3] = 255;
    }
}

impl ImageHost for Workspace {
    fn open_documents(&self) -> Vec<DocumentId> {
        self.documents.iter().map(|d| d.id).collect()
    }

    fn layers(&self, doc: DocumentId) -> Result<Vec<LayerId>> {
        Ok(self.document(doc)?.layers.iter().map(|l| l.id).collect())
    }

    fn selected_layers(&self, doc: DocumentId) -> Result<Vec<LayerId>> {
        let document = self.document(doc)?;
        Ok(document
            .selected
            .filter(|id| document.layer(*id).is_some())
            .into_iter()
            .collect())
    }

    fn canvas_size(&self, doc: DocumentId) -> Result<(u32, u32)> {
        let document = self.document(doc)?;
        Ok((document.width, document.height))
    }

    fn duplicate_document(&mut self, doc: DocumentId) -> Result<DocumentId> {
        let source = self.document(doc)?.clone();
        let copy_name = format!("{} (copy)", source.name);
        let copy = self.create_document(copy_name, source.width, source.height)?;

        let mut layers = Vec::with_capacity(source.layers.len());
        let mut selected = None;
        for layer in source.layers {
            let id = self.alloc_layer_id();
            if source.selected == Some(layer.id) {
                selected = Some(id);
            }
            layers.push(Layer { id, ..layer });
        }

        let document = self.document_mut(copy)?;
        document.layers = layers;
        document.selected = selected;
        trace!(source = %doc, copy = %copy, "Duplicated document");
        Ok(copy)
    }

    fn close_document(&mut self, doc: DocumentId) -> Result<()> {
        let before = self.documents.len();
        self.documents.retain(|d| d.id != doc);
        if self.documents.len() == before {
            return Err(BgRemovalError::host(format!("{} is not open", doc)));
        }
        Ok(())
    }

    fn item_position(&self, doc: DocumentId, layer: LayerId) -> Result<usize> {
        self.document(doc)?.position(layer)
    }

    fn set_visible(&mut self, doc: DocumentId, layer: LayerId, visible: bool) -> Result<()> {
        self.document_mut(doc)?.any_layer_mut(layer)?.visible = visible;
        Ok(())
    }

    fn merge_visible_layers(&mut self, doc: DocumentId, policy: MergePolicy) -> Result<LayerId> {
        let id = self.alloc_layer_id();
        let document = self.document_mut(doc)?;

        let top_visible = document
            .layers
            .iter()
            .position(|l| l.visible)
            .ok_or_else(|| BgRemovalError::host(format!("{} has no visible layers", doc)))?;

        let bounds = match policy {
            MergePolicy::ClipToImage => (0, 0, document.width, document.height),
            MergePolicy::ClipToBottomLayer => {
                let bottom = document
                    .layers
                    .iter()
                    .rev()
                    .find(|l| l.visible)
                    .ok_or_else(|| BgRemovalError::host("no visible layers"))?;
                (bottom.offset.0, bottom.offset.1, bottom.width(), bottom.height())
            },
        };

        let pixels =
            Document::composite_region(document.layers.iter().rev().filter(|l| l.visible), bounds);
        let name = document
            .layers
            .get(top_visible)
            .map_or_else(String::new, |l| l.name.clone());

        let merged = Layer {
            id,
            name,
            pixels,
            mode: ColorMode::Rgba,
            offset: (bounds.0, bounds.1),
            visible: true,
            mask: None,
        };

        // every layer above `top_visible` is hidden, so the index is unchanged by the retain
        document.layers.retain(|l| !l.visible);
        let insert_at = top_visible.min(document.layers.len());
        document.layers.insert(insert_at, merged);
        document.selected = Some(id);
        Ok(id)
    }

    fn save_document(&mut self, doc: DocumentId, path: &Path) -> Result<()> {
        let flat = self.flatten(doc)?;
        let format = OutputFormat::from_path(path)?;
        let image = if format.supports_alpha() {
            DynamicImage::ImageRgba8(flat)
        } else {
            DynamicImage::ImageRgb8(flatten_onto_white(&flat))
        };
        ImageIOService::save_image(&image, path, format)
    }

    fn load_layer(&mut self, doc: DocumentId, path: &Path) -> Result<LayerId> {
        let image = ImageIOService::load_image(path)?;
        let id = self.alloc_layer_id();
        let layer = layer_from_image(id, file_name(path), &image, (0, 0));
        self.document_mut(doc)?.detached.push(layer);
        Ok(id)
    }

    fn new_layer(
        &mut self,
        doc: DocumentId,
        name: &str,
        width: u32,
        height: u32,
        mode: ColorMode,
    ) -> Result<LayerId> {
        if width == 0 || height == 0 {
            return Err(BgRemovalError::host(format!(
                "layer size must be non-zero, got {}x{}",
                width, height
            )));
        }
        let id = self.alloc_layer_id();
        let fill = match mode {
            ColorMode::Rgb => Rgba([0, 0, 0, 255]),
            ColorMode::Rgba => Rgba([0, 0, 0, 0]),
        };
        let layer = Layer {
            id,
            name: name.to_string(),
            pixels: RgbaImage::from_pixel(width, height, fill),
            mode,
            offset: (0, 0),
            visible: true,
            mask: None,
        };
        self.document_mut(doc)?.detached.push(layer);
        Ok(id)
    }

    fn insert_layer(&mut self, doc: DocumentId, layer: LayerId, position: usize) -> Result<()> {
        let document = self.document_mut(doc)?;
        let index = document
            .detached
            .iter()
            .position(|l| l.id == layer)
            .ok_or_else(|| {
                BgRemovalError::host(format!("{} is not a detached layer of {}", layer, doc))
            })?;
        let layer = document.detached.remove(index);
        let position = position.min(document.layers.len());
        document.layers.insert(position, layer);
        Ok(())
    }

    fn remove_layer(&mut self, doc: DocumentId, layer: LayerId) -> Result<()> {
        let document = self.document_mut(doc)?;
        let index = document.position(layer)?;
        document.layers.remove(index);
        if document.selected == Some(layer) {
            document.selected = document.layers.first().map(|l| l.id);
        }
        Ok(())
    }

    fn offsets(&self, doc: DocumentId, layer: LayerId) -> Result<(i32, i32)> {
        Ok(self.layer(doc, layer)?.offset)
    }

    fn set_offsets(&mut self, doc: DocumentId, layer: LayerId, x: i32, y: i32) -> Result<()> {
        self.document_mut(doc)?.any_layer_mut(layer)?.offset = (x, y);
        Ok(())
    }

    fn layer_size(&self, doc: DocumentId, layer: LayerId) -> Result<(u32, u32)> {
        let layer = self.layer(doc, layer)?;
        Ok((layer.width(), layer.height()))
    }

    fn has_alpha(&self, doc: DocumentId, layer: LayerId) -> Result<bool> {
        Ok(self.layer(doc, layer)?.has_alpha())
    }

    fn has_mask(&self, doc: DocumentId, layer: LayerId) -> Result<bool> {
        Ok(self.layer(doc, layer)?.mask.is_some())
    }

    fn supports_mask_init(&self, init: MaskInit) -> bool {
        match init {
            MaskInit::Alpha => self.capabilities.mask_from_alpha,
            MaskInit::White => true,
        }
    }

    fn add_mask(&mut self, doc: DocumentId, layer: LayerId, init: MaskInit) -> Result<()> {
        if !self.supports_mask_init(init) {
            return Err(BgRemovalError::host(format!(
                "mask initialization {:?} is not supported",
                init
            )));
        }
        let target = self.document_mut(doc)?.any_layer_mut(layer)?;
        if target.mask.is_some() {
            return Err(BgRemovalError::host(format!("{} already has a mask", layer)));
        }
        let data = match init {
            MaskInit::Alpha => GrayImage::from_fn(target.width(), target.height(), |x, y| {
                Luma([target.pixels.get_pixel(x, y).0[3]])
            }),
            MaskInit::White => GrayImage::from_pixel(target.width(), target.height(), Luma([255])),
        };
        target.mask = Some(Mask { data });
        Ok(())
    }

    fn fill_layer(&mut self, doc: DocumentId, layer: LayerId, fill: Fill) -> Result<()> {
        let target = self.document_mut(doc)?.any_layer_mut(layer)?;
        let mut value = match fill {
            Fill::White => [255, 255, 255, 255],
            Fill::Black => [0, 0, 0, 255],
            Fill::Color(color) => color.to_rgba8(),
        };
        if target.mode == ColorMode::Rgb {
            value[3] = 255;
        }
        for px in target.pixels.pixels_mut() {
            px.0 = value;
        }
        Ok(())
    }

    fn raise_to_top(&mut self, doc: DocumentId, layer: LayerId) -> Result<()> {
        let document = self.document_mut(doc)?;
        let index = document.position(layer)?;
        let layer = document.layers.remove(index);
        document.layers.insert(0, layer);
        Ok(())
    }

    fn merge_down(
        &mut self,
        doc: DocumentId,
        layer: LayerId,
        policy: MergePolicy,
    ) -> Result<LayerId> {
        let id = self.alloc_layer_id();
        let document = self.document_mut(doc)?;
        let index = document.position(layer)?;
        let (Some(upper), Some(lower)) = (document.layers.get(index), document.layers.get(index + 1))
        else {
            return Err(BgRemovalError::host(format!(
                "{} has no layer beneath it to merge into",
                layer
            )));
        };

        let bounds = match policy {
            MergePolicy::ClipToImage => (0, 0, document.width, document.height),
            MergePolicy::ClipToBottomLayer => {
                (lower.offset.0, lower.offset.1, lower.width(), lower.height())
            },
        };

        let mut pixels = Document::composite_region([lower, upper], bounds);
        if lower.mode == ColorMode::Rgb {
            force_opaque(&mut pixels);
        }

        let merged = Layer {
            id,
            name: lower.name.clone(),
            pixels,
            mode: lower.mode,
            offset: (bounds.0, bounds.1),
            visible: lower.visible,
            mask: None,
        };

        document.layers.splice(index..=index + 1, [merged]);
        document.selected = Some(id);
        Ok(id)
    }

    fn resize_canvas(
        &mut self,
        doc: DocumentId,
        width: u32,
        height: u32,
        offset_x: i32,
        offset_y: i32,
    ) -> Result<()> {
        if width == 0 || height == 0 {
            return Err(BgRemovalError::host(format!(
                "canvas size must be non-zero, got {}x{}",
                width, height
            )));
        }
        let document = self.document_mut(doc)?;
        document.width = width;
        document.height = height;
        for layer in &mut document.layers {
            layer.offset.0 += offset_x;
            layer.offset.1 += offset_y;
        }
        Ok(())
    }

    fn undo_group_start(&mut self, doc: DocumentId) -> Result<()> {
        let document = self.document_mut(doc)?;
        if document.undo_depth == 0 {
            document.pending_snapshot = Some(document.snapshot());
        }
        document.undo_depth += 1;
        Ok(())
    }

    fn undo_group_end(&mut self, doc: DocumentId) -> Result<()> {
        let document = self.document_mut(doc)?;
        if document.undo_depth == 0 {
            return Err(BgRemovalError::host(format!(
                "undo group end without matching start on {}",
                doc
            )));
        }
        document.undo_depth -= 1;
        if document.undo_depth == 0 {
            if let Some(snapshot) = document.pending_snapshot.take() {
                document.undo_stack.push(snapshot);
            }
        }
        Ok(())
    }
}
