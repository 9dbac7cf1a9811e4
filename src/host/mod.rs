//! Host editor abstraction
//!
//! The pipeline only talks to an image editor through [`ImageHost`]. Documents
//! and layers are referred to by opaque ids; the host owns the actual object
//! graph. [`Workspace`] is the in-memory implementation shipped with the crate.

pub mod blend;
pub mod workspace;

use crate::error::Result;
use crate::utils::Rgba;
use std::fmt;
use std::path::Path;

pub use workspace::{Document, HostCapabilities, Layer, Mask, Workspace};

/// Identifier of an open document
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DocumentId(pub u32);

/// Identifier of a layer, unique across the host
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LayerId(pub u32);

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "document #{}", self.0)
    }
}

impl fmt::Display for LayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "layer #{}", self.0)
    }
}

/// Pixel layout of a layer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColorMode {
    /// Opaque color, no alpha channel
    Rgb,
    /// Color with alpha channel
    Rgba,
}

/// How a new layer mask is initialized
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MaskInit {
    /// Copy of the layer's alpha channel
    Alpha,
    /// Fully opaque
    White,
}

/// Bounds of a merged layer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergePolicy {
    /// Result is sized to the canvas
    ClipToImage,
    /// Result is sized to the lower layer
    ClipToBottomLayer,
}

/// Solid fill for a layer
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Fill {
    White,
    Black,
    Color(Rgba),
}

/// Capabilities the pipeline needs from an image editor.
///
/// Layer stacks are indexed top to bottom: position 0 is the topmost layer.
pub trait ImageHost {
    /// Open documents, in the order the host lists them
    fn open_documents(&self) -> Vec<DocumentId>;

    /// Layers of a document, top to bottom
    fn layers(&self, doc: DocumentId) -> Result<Vec<LayerId>>;

    /// Currently selected layers of a document
    fn selected_layers(&self, doc: DocumentId) -> Result<Vec<LayerId>>;

    /// Canvas width and height
    fn canvas_size(&self, doc: DocumentId) -> Result<(u32, u32)>;

    /// Create an independent copy of a document, including layer stack and canvas
    fn duplicate_document(&mut self, doc: DocumentId) -> Result<DocumentId>;

    /// Close a document and drop all of its layers
    fn close_document(&mut self, doc: DocumentId) -> Result<()>;

    /// Stack position of a layer
    fn item_position(&self, doc: DocumentId, layer: LayerId) -> Result<usize>;

    fn set_visible(&mut self, doc: DocumentId, layer: LayerId, visible: bool) -> Result<()>;

    /// Composite all visible layers into one layer that replaces them
    fn merge_visible_layers(&mut self, doc: DocumentId, policy: MergePolicy) -> Result<LayerId>;

    /// Write the document's visible composite to `path`, format chosen by extension
    fn save_document(&mut self, doc: DocumentId, path: &Path) -> Result<()>;

    /// Decode an image file into a new layer that is not yet part of the stack
    fn load_layer(&mut self, doc: DocumentId, path: &Path) -> Result<LayerId>;

    /// Create a new, transparent (or black for `Rgb`) layer that is not yet part of the stack
    fn new_layer(
        &mut self,
        doc: DocumentId,
        name: &str,
        width: u32,
        height: u32,
        mode: ColorMode,
    ) -> Result<LayerId>;

    /// Insert a detached layer at `position` (clamped to the stack length)
    fn insert_layer(&mut self, doc: DocumentId, layer: LayerId, position: usize) -> Result<()>;

    /// Permanently remove a layer from the stack
    fn remove_layer(&mut self, doc: DocumentId, layer: LayerId) -> Result<()>;

    fn offsets(&self, doc: DocumentId, layer: LayerId) -> Result<(i32, i32)>;

    fn set_offsets(&mut self, doc: DocumentId, layer: LayerId, x: i32, y: i32) -> Result<()>;

    /// Layer width and height
    fn layer_size(&self, doc: DocumentId, layer: LayerId) -> Result<(u32, u32)>;

    fn has_alpha(&self, doc: DocumentId, layer: LayerId) -> Result<bool>;

    fn has_mask(&self, doc: DocumentId, layer: LayerId) -> Result<bool>;

    /// Whether masks can be initialized with `init`
    fn supports_mask_init(&self, init: MaskInit) -> bool;

    /// Create and attach a mask to a layer
    fn add_mask(&mut self, doc: DocumentId, layer: LayerId, init: MaskInit) -> Result<()>;

    fn fill_layer(&mut self, doc: DocumentId, layer: LayerId, fill: Fill) -> Result<()>;

    fn raise_to_top(&mut self, doc: DocumentId, layer: LayerId) -> Result<()>;

    /// Merge a layer into the one directly beneath it
    fn merge_down(
        &mut self,
        doc: DocumentId,
        layer: LayerId,
        policy: MergePolicy,
    ) -> Result<LayerId>;

    /// Resize the canvas, moving every layer by (`offset_x`, `offset_y`)
    fn resize_canvas(
        &mut self,
        doc: DocumentId,
        width: u32,
        height: u32,
        offset_x: i32,
        offset_y: i32,
    ) -> Result<()>;

    fn undo_group_start(&mut self, doc: DocumentId) -> Result<()>;

    fn undo_group_end(&mut self, doc: DocumentId) -> Result<()>;
}
