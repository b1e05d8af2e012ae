//! Nearest-neighbour scaling and source-over drawing for RGBA8 bitmaps.
//!
//! These mirror what a 2D canvas does with image smoothing disabled:
//! every destination pixel samples exactly one source pixel, and drawing
//! blends with the straight-alpha "source over" operator.

use ::image::imageops::{self, FilterType};
use ::image::{Rgba, RgbaImage};

use crate::image::PixelRect;
use crate::util::BlueMarbleResult;

/// Copies `src_rect` of `src` into a new bitmap magnified by `factor`.
///
/// Each source pixel becomes a `factor x factor` block.
pub fn magnify_region(
    src: &RgbaImage,
    src_rect: PixelRect,
    factor: u32,
) -> BlueMarbleResult<RgbaImage> {
    src_rect.check_within(src.width(), src.height())?;
    let factor = factor.max(1);
    let PixelRect {
        x,
        y,
        width,
        height,
    } = src_rect;
    let region = imageops::crop_imm(src, x, y, width, height).to_image();
    Ok(imageops::resize(
        &region,
        width * factor,
        height * factor,
        FilterType::Nearest,
    ))
}

/// Resamples `src` to `width x height` with nearest-neighbour sampling.
pub fn scale_to_fill(src: &RgbaImage, width: u32, height: u32) -> RgbaImage {
    if src.width() == 0 || src.height() == 0 {
        return RgbaImage::new(width, height);
    }
    imageops::resize(src, width, height, FilterType::Nearest)
}

/// Draws `src` onto `dst` with its top-left corner at `(x, y)`.
///
/// Pixels falling outside `dst` are clipped.
pub fn draw_over(dst: &mut RgbaImage, src: &RgbaImage, x: u32, y: u32) {
    let end_x = (u64::from(x) + u64::from(src.width())).min(u64::from(dst.width()));
    let end_y = (u64::from(y) + u64::from(src.height())).min(u64::from(dst.height()));
    for dy in u64::from(y)..end_y {
        for dx in u64::from(x)..end_x {
            let (dx, dy) = (dx as u32, dy as u32);
            let s = *src.get_pixel(dx - x, dy - y);
            let d = dst.get_pixel_mut(dx, dy);
            *d = over(*d, s);
        }
    }
}

/// Straight-alpha source-over blend of `src` on top of `dst`.
pub fn over(dst: Rgba<u8>, src: Rgba<u8>) -> Rgba<u8> {
    let sa = u32::from(src[3]);
    if sa == 255 {
        return src;
    }
    if sa == 0 {
        return dst;
    }
    let da = u32::from(dst[3]);
    let dst_weight = da * (255 - sa);
    let out_a = sa * 255 + dst_weight;
    if out_a == 0 {
        return Rgba([0, 0, 0, 0]);
    }

    let mut out = [0u8; 4];
    for i in 0..3 {
        let num = u32::from(src[i]) * sa * 255 + u32::from(dst[i]) * dst_weight;
        out[i] = ((num + out_a / 2) / out_a) as u8;
    }
    out[3] = ((out_a + 127) / 255) as u8;
    Rgba(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn over_opaque_replaces_and_transparent_keeps() {
        let dst = Rgba([10, 20, 30, 255]);
        assert_eq!(over(dst, Rgba([1, 2, 3, 255])), Rgba([1, 2, 3, 255]));
        assert_eq!(over(dst, Rgba([1, 2, 3, 0])), dst);
    }

    #[test]
    fn over_translucent_black_darkens() {
        let out = over(Rgba([255, 255, 255, 255]), Rgba([0, 0, 0, 32]));
        assert_eq!(out[3], 255);
        assert_eq!(out[0], 223);
    }

    #[test]
    fn magnify_replicates_blocks() {
        let mut src = RgbaImage::new(2, 2);
        src.put_pixel(1, 1, Rgba([9, 9, 9, 255]));
        let out = magnify_region(&src, PixelRect::new(1, 1, 1, 1), 3).unwrap();
        assert_eq!(out.dimensions(), (3, 3));
        assert!(out.pixels().all(|p| *p == Rgba([9, 9, 9, 255])));

        let wide = RgbaImage::from_fn(4, 3, |x, y| Rgba([x as u8, y as u8, 0, 255]));
        let out = magnify_region(&wide, PixelRect::new(1, 1, 3, 2), 5).unwrap();
        assert_eq!(out.dimensions(), (15, 10));
        for (x, y, px) in out.enumerate_pixels() {
            assert_eq!(px, wide.get_pixel(1 + x / 5, 1 + y / 5), "({x}, {y})");
        }
        assert!(magnify_region(&src, PixelRect::new(1, 1, 2, 1), 3).is_err());
    }

    #[test]
    fn draw_over_clips_to_destination() {
        let mut dst = RgbaImage::new(4, 4);
        let src = RgbaImage::from_pixel(3, 3, Rgba([7, 7, 7, 255]));
        draw_over(&mut dst, &src, 2, 2);
        assert_eq!(*dst.get_pixel(3, 3), Rgba([7, 7, 7, 255]));
        assert_eq!(*dst.get_pixel(1, 1), Rgba([0, 0, 0, 0]));
    }

    #[test]
    fn scale_to_fill_integer_factor_is_exact() {
        let mut src = RgbaImage::new(2, 1);
        src.put_pixel(1, 0, Rgba([5, 6, 7, 255]));
        let out = scale_to_fill(&src, 6, 3);
        assert_eq!(out.dimensions(), (6, 3));
        for (x, y, px) in out.enumerate_pixels() {
            assert_eq!(px, src.get_pixel(x / 3, 0), "({x}, {y})");
        }
    }
}
