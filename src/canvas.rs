//! Canvas squaring

use crate::error::Result;
use crate::host::{DocumentId, ImageHost};
use tracing::{debug, instrument};

/// Side length and content offset of the square canvas enclosing `width` x `height`
#[must_use]
pub fn square_geometry(width: u32, height: u32) -> (u32, i32, i32) {
    let side = width.max(height);
    let offset_x = (side - width) / 2;
    let offset_y = (side - height) / 2;
    (side, offset_x as i32, offset_y as i32)
}

/// Grow the canvas to a square, centering the existing content.
///
/// Returns `false` when the canvas was already square.
#[instrument(skip(host))]
pub fn squarify<H>(host: &mut H, doc: DocumentId) -> Result<bool>
where
    H: ImageHost + ?Sized,
{
    let (width, height) = host.canvas_size(doc)?;
    if width == height {
        return Ok(false);
    }

    let (side, offset_x, offset_y) = square_geometry(width, height);
    host.resize_canvas(doc, side, side, offset_x, offset_y)?;
    debug!(width, height, side, offset_x, offset_y, "Squared canvas");
    Ok(true)
}
