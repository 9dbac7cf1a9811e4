//! Isolating one layer for hand-off to the segmenter

use crate::error::{BestEffort, Result};
use crate::host::{DocumentId, ImageHost, LayerId, MergePolicy};
use std::path::{Path, PathBuf};
use tracing::{debug, instrument};

/// Write `layer` of `doc`, alone and clipped to the canvas, to `dest`.
///
/// Works on a throwaway duplicate so the source document is never touched.
/// The file format follows the extension of `dest`; the caller owns the file.
#[instrument(skip(host, dest), fields(dest = %dest.display()))]
pub fn export_isolated<H>(
    host: &mut H,
    doc: DocumentId,
    layer: LayerId,
    dest: &Path,
) -> Result<PathBuf>
where
    H: ImageHost + ?Sized,
{
    let position = host.item_position(doc, layer)?;
    let copy = host.duplicate_document(doc)?;

    let exported = export_position(host, copy, position, dest);
    host.close_document(copy).best_effort("close export copy");
    exported?;

    debug!(position, "Exported isolated layer");
    Ok(dest.to_path_buf())
}

fn export_position<H>(host: &mut H, copy: DocumentId, position: usize, dest: &Path) -> Result<()>
where
    H: ImageHost + ?Sized,
{
    // the copy has fresh layer ids, so the target is found by stack position
    for (i, item) in host.layers(copy)?.into_iter().enumerate() {
        host.set_visible(copy, item, i == position)?;
    }
    host.merge_visible_layers(copy, MergePolicy::ClipToImage)?;
    host.save_document(copy, dest)
}
