//! Reintegrating the segmenter's cutout into the document

use crate::config::BackgroundSpec;
use crate::error::{BestEffort, BgRemovalError, Result};
use crate::host::{ColorMode, DocumentId, Fill, ImageHost, LayerId, MaskInit, MergePolicy};
use std::path::Path;
use tracing::{debug, instrument};

/// Name given to the generated background layer
pub const BACKGROUND_LAYER_NAME: &str = "Background";

/// Replace `original` with the cutout at `cutout_path` and apply `background`.
///
/// The cutout is placed at `offset`, which must be the original layer's offset
/// captured before export. Mask creation and removal of the original are
/// best-effort. Returns the layer that holds the result: the cutout itself for
/// a transparent background, otherwise the merged layer.
#[instrument(skip(host, cutout_path), fields(cutout = %cutout_path.display()))]
pub fn composite<H>(
    host: &mut H,
    doc: DocumentId,
    cutout_path: &Path,
    offset: (i32, i32),
    attach_mask: bool,
    background: &BackgroundSpec,
    original: LayerId,
) -> Result<LayerId>
where
    H: ImageHost + ?Sized,
{
    let cutout = host.load_layer(doc, cutout_path)?;
    host.insert_layer(doc, cutout, 0)?;
    host.set_offsets(doc, cutout, offset.0, offset.1)?;

    if attach_mask {
        attach_alpha_mask(host, doc, cutout).best_effort("attach mask");
    }

    host.remove_layer(doc, original)
        .map_err(|e| BgRemovalError::LayerRemoval(e.to_string()))
        .best_effort("remove original layer");

    let (fill, mode) = match *background {
        BackgroundSpec::Transparent => {
            debug!("Transparent background, keeping cutout as is");
            return Ok(cutout);
        },
        BackgroundSpec::White => (Fill::White, ColorMode::Rgb),
        BackgroundSpec::Black => (Fill::Black, ColorMode::Rgb),
        BackgroundSpec::Custom(color) => (Fill::Color(color), ColorMode::Rgba),
    };

    let (width, height) = host.canvas_size(doc)?;
    let background_layer = host.new_layer(doc, BACKGROUND_LAYER_NAME, width, height, mode)?;
    host.fill_layer(doc, background_layer, fill)?;

    let below_cutout = host.item_position(doc, cutout)? + 1;
    host.insert_layer(doc, background_layer, below_cutout)?;
    host.raise_to_top(doc, cutout)?;
    let merged = host.merge_down(doc, cutout, MergePolicy::ClipToBottomLayer)?;

    debug!(?fill, layer = %merged, "Merged cutout onto background");
    Ok(merged)
}

/// Mask from the cutout's alpha, or fully opaque when the host can't do that
fn attach_alpha_mask<H>(host: &mut H, doc: DocumentId, layer: LayerId) -> Result<()>
where
    H: ImageHost + ?Sized,
{
    let init = if host.supports_mask_init(MaskInit::Alpha) {
        MaskInit::Alpha
    } else {
        MaskInit::White
    };
    host.add_mask(doc, layer, init)
        .map_err(|e| BgRemovalError::MaskAttach(e.to_string()))
}
