//! 8-bit straight-alpha compositing

use image::{GrayImage, RgbaImage};

pub type Rgba8 = [u8; 4];

/// Source-over with straight (non-premultiplied) alpha
#[must_use]
pub fn over(dst: Rgba8, src: Rgba8) -> Rgba8 {
    let sa = u32::from(src[3]);
    if sa == 0 {
        return dst;
    }
    if sa == 255 {
        return src;
    }

    let da = u32::from(dst[3]);
    // out_a = sa + da * (1 - sa), all scaled by 255
    let da_scaled = da * (255 - sa);
    let out_a255 = sa * 255 + da_scaled;
    if out_a255 == 0 {
        return [0, 0, 0, 0];
    }

    let mut out = [0u8; 4];
    for i in 0..3 {
        let sc = u32::from(src[i]);
        let dc = u32::from(dst[i]);
        let num = sc * sa * 255 + dc * da_scaled;
        out[i] = ((num + out_a255 / 2) / out_a255).min(255) as u8;
    }
    out[3] = ((out_a255 + 127) / 255).min(255) as u8;
    out
}

/// Scale a pixel's alpha by a mask value
#[must_use]
pub fn apply_mask(px: Rgba8, mask: u8) -> Rgba8 {
    let a = (u32::from(px[3]) * u32::from(mask) + 127) / 255;
    [px[0], px[1], px[2], a as u8]
}

/// Composite `src` (optionally masked) onto `dst` with `src`'s top-left at
/// (`dx`, `dy`) in `dst` coordinates; pixels falling outside `dst` are clipped.
pub fn composite_onto(
    dst: &mut RgbaImage,
    src: &RgbaImage,
    mask: Option<&GrayImage>,
    dx: i64,
    dy: i64,
) {
    let (dw, dh) = (i64::from(dst.width()), i64::from(dst.height()));
    let (sw, sh) = (i64::from(src.width()), i64::from(src.height()));

    let x0 = dx.max(0);
    let y0 = dy.max(0);
    let x1 = (dx + sw).min(dw);
    let y1 = (dy + sh).min(dh);
    if x0 >= x1 || y0 >= y1 {
        return;
    }

    for y in y0..y1 {
        for x in x0..x1 {
            let sx = (x - dx) as u32;
            let sy = (y - dy) as u32;
            let mut px = src.get_pixel(sx, sy).0;
            if let Some(mask) = mask {
                px = apply_mask(px, mask.get_pixel(sx, sy).0[0]);
            }
            let d = dst.get_pixel_mut(x as u32, y as u32);
            d.0 = over(d.0, px);
        }
    }
}

/// Composite `src` onto an opaque white backdrop, dropping alpha
#[must_use]
pub fn flatten_onto_white(src: &RgbaImage) -> image::RgbImage {
    image::RgbImage::from_fn(src.width(), src.height(), |x, y| {
        let [r, g, b, _] = over([255, 255, 255, 255], src.get_pixel(x, y).0);
        image::Rgb([r, g, b])
    })
}
