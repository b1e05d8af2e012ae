//! Tile chunking: split one anchored source image into tile-aligned,
//! magnified and masked fragments.
//!
//! The source is walked in row-major bands. The first band and column may
//! be partial when the anchor's pixel offset is non-zero; every later cell is
//! clamped so it never overruns either the tile or the image. Each cell is
//! magnified by `M` with nearest-neighbour sampling, then every pixel except
//! the preserved sub-pixel of each `M x M` block is made transparent.
//! Sentinel-coloured pixels become a translucent checkerboard instead.

use std::collections::BTreeMap;

#[cfg(feature = "rayon")]
use rayon::prelude::*;

use crate::coords::{Anchor, TileKey};
use crate::image::io::encode_png;
use crate::image::scale::magnify_region;
use crate::image::{PixelRect, Rgba, RgbaImage};
use crate::template::config::{CountMode, EngineConfig};
use crate::template::Fragment;
use crate::trace::{trace_event, trace_span};
use crate::util::encoding::bytes_to_base64;
use crate::util::{BlueMarbleError, BlueMarbleResult};

/// Alpha of the dark squares of the sentinel checkerboard.
const CHECKER_ALPHA: u8 = 32;

/// Where one fragment comes from and where it goes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FragmentPlan {
    /// Destination tile and pixel offset within it.
    pub key: TileKey,
    /// Source rectangle in image-local coordinates.
    pub source: PixelRect,
}

/// Result of chunking one source image.
#[derive(Clone, Debug)]
pub struct ChunkedTemplate {
    pub fragments: BTreeMap<TileKey, Fragment>,
    pub pixel_count: u64,
}

/// Computes the tile-aligned partition of a `width x height` image.
///
/// Plans are produced in raster order: bands top to bottom, cells left to
/// right within a band.
pub fn plan_fragments(
    width: u32,
    height: u32,
    anchor: Anchor,
    tile_size: u32,
) -> BlueMarbleResult<Vec<FragmentPlan>> {
    if tile_size == 0 {
        return Err(BlueMarbleError::InvalidInput("tile_size must be positive"));
    }
    anchor.validate(tile_size)?;
    if width == 0 || height == 0 {
        return Err(BlueMarbleError::InvalidInput("source image must be non-empty"));
    }

    let size = u64::from(tile_size);
    let (start_x, start_y) = (u64::from(anchor.pixel_x), u64::from(anchor.pixel_y));
    let (end_x, end_y) = (start_x + u64::from(width), start_y + u64::from(height));

    let mut plans = Vec::new();
    let mut pixel_y = start_y;
    while pixel_y < end_y {
        let draw_y = (size - pixel_y % size).min(end_y - pixel_y);
        let mut pixel_x = start_x;
        while pixel_x < end_x {
            let draw_x = (size - pixel_x % size).min(end_x - pixel_x);
            let key = TileKey {
                tile_x: tile_index(anchor.tile_x, pixel_x / size)?,
                tile_y: tile_index(anchor.tile_y, pixel_y / size)?,
                pixel_x: (pixel_x % size) as u32,
                pixel_y: (pixel_y % size) as u32,
            };
            let source = PixelRect::new(
                (pixel_x - start_x) as u32,
                (pixel_y - start_y) as u32,
                draw_x as u32,
                draw_y as u32,
            );
            plans.push(FragmentPlan { key, source });
            pixel_x += draw_x;
        }
        pixel_y += draw_y;
    }
    Ok(plans)
}

fn tile_index(anchor_tile: u32, offset: u64) -> BlueMarbleResult<u32> {
    u32::try_from(offset)
        .ok()
        .and_then(|offset| anchor_tile.checked_add(offset))
        .ok_or(BlueMarbleError::InvalidInput("template extends past the tile grid"))
}

/// Chunks `source` anchored at `anchor` into masked fragments.
pub fn chunk_template(
    source: &RgbaImage,
    anchor: Anchor,
    cfg: &EngineConfig,
) -> BlueMarbleResult<ChunkedTemplate> {
    cfg.validate()?;
    let (width, height) = source.dimensions();
    let _span = trace_span!("chunk_template", width = width, height = height).entered();

    let pixel_count = count_pixels(source, cfg.count_mode);
    let plans = plan_fragments(width, height, anchor, cfg.tile_size)?;

    let mut rendered = Vec::with_capacity(plans.len());
    for plan in &plans {
        let mut bitmap = magnify_region(source, plan.source, cfg.magnification())?;
        shred(&mut bitmap, plan.key, cfg);
        rendered.push((plan.key, bitmap));
    }

    let fragments = encode_fragments(rendered, cfg.parallel)?;
    trace_event!(
        "chunked",
        fragments = fragments.len(),
        pixel_count = pixel_count
    );
    Ok(ChunkedTemplate {
        fragments,
        pixel_count,
    })
}

/// Applies the sparse-dot mask to a magnified fragment in place.
///
/// `key` positions the fragment inside its tile so the sentinel checkerboard
/// stays continuous across neighbouring fragments.
pub fn shred(bitmap: &mut RgbaImage, key: TileKey, cfg: &EngineConfig) {
    let m = cfg.magnification();
    let center = cfg.center_index();
    let [sr, sg, sb] = cfg.sentinel;
    let origin = u64::from(key.pixel_x) * u64::from(m) + u64::from(key.pixel_y) * u64::from(m);

    for (x, y, px) in bitmap.enumerate_pixels_mut() {
        let Rgba([r, g, b, a]) = *px;
        if a != 0 && r == sr && g == sg && b == sb {
            let parity = (origin + u64::from(x) + u64::from(y)) % 2;
            *px = if parity == 0 {
                Rgba([0, 0, 0, CHECKER_ALPHA])
            } else {
                Rgba([0, 0, 0, 0])
            };
        } else if x % m != center || y % m != center {
            px[3] = 0;
        }
    }
}

/// Counts template pixels according to `mode`.
pub fn count_pixels(source: &RgbaImage, mode: CountMode) -> u64 {
    match mode {
        CountMode::All => u64::from(source.width()) * u64::from(source.height()),
        CountMode::OpaqueOnly => source.pixels().filter(|p| p[3] != 0).count() as u64,
    }
}

/// Recovers a pixel count from an already magnified and masked fragment.
///
/// Used for stored templates that carry no count of their own. At `M = 1`
/// the odd cells of the sentinel checkerboard are indistinguishable from
/// transparent pixels, so `OpaqueOnly` undercounts them.
pub fn count_fragment_pixels(fragment: &RgbaImage, cfg: &EngineConfig) -> u64 {
    let m = cfg.magnification();
    let (blocks_x, blocks_y) = (fragment.width() / m, fragment.height() / m);
    match cfg.count_mode {
        CountMode::All => u64::from(blocks_x) * u64::from(blocks_y),
        CountMode::OpaqueOnly => {
            let mut count = 0u64;
            for by in 0..blocks_y {
                for bx in 0..blocks_x {
                    let visible = (0..m).any(|dy| {
                        (0..m).any(|dx| fragment.get_pixel(bx * m + dx, by * m + dy)[3] != 0)
                    });
                    if visible {
                        count += 1;
                    }
                }
            }
            count
        }
    }
}

fn encode_one(key: TileKey, bitmap: RgbaImage) -> BlueMarbleResult<(TileKey, Fragment)> {
    let encoded = bytes_to_base64(&encode_png(&bitmap)?);
    Ok((key, Fragment { bitmap, encoded }))
}

#[cfg(feature = "rayon")]
fn encode_fragments(
    rendered: Vec<(TileKey, RgbaImage)>,
    parallel: bool,
) -> BlueMarbleResult<BTreeMap<TileKey, Fragment>> {
    if parallel {
        return rendered
            .into_par_iter()
            .map(|(key, bitmap)| encode_one(key, bitmap))
            .collect::<BlueMarbleResult<Vec<_>>>()
            .map(|pairs| pairs.into_iter().collect());
    }
    rendered
        .into_iter()
        .map(|(key, bitmap)| encode_one(key, bitmap))
        .collect()
}

#[cfg(not(feature = "rayon"))]
fn encode_fragments(
    rendered: Vec<(TileKey, RgbaImage)>,
    _parallel: bool,
) -> BlueMarbleResult<BTreeMap<TileKey, Fragment>> {
    rendered
        .into_iter()
        .map(|(key, bitmap)| encode_one(key, bitmap))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn anchor(tx: u32, ty: u32, px: u32, py: u32) -> Anchor {
        Anchor {
            tile_x: tx,
            tile_y: ty,
            pixel_x: px,
            pixel_y: py,
        }
    }

    #[test]
    fn wide_strip_spans_three_tiles() {
        let plans = plan_fragments(1200, 1, anchor(0, 0, 950, 0), 1000).unwrap();
        let keys: Vec<String> = plans.iter().map(|p| p.key.to_string()).collect();
        assert_eq!(
            keys,
            ["0000,0000,950,000", "0001,0000,000,000", "0002,0000,000,000"]
        );
        let widths: Vec<u32> = plans.iter().map(|p| p.source.width).collect();
        assert_eq!(widths, [50, 1000, 150]);
    }

    #[test]
    fn aligned_image_is_one_fragment() {
        let plans = plan_fragments(10, 10, anchor(5, 6, 0, 0), 10).unwrap();
        assert_eq!(plans.len(), 1);
        assert_eq!(plans[0].source, PixelRect::new(0, 0, 10, 10));
        assert_eq!(plans[0].key.to_string(), "0005,0006,000,000");
    }

    #[test]
    fn shred_keeps_only_block_centers() {
        let cfg = EngineConfig::default();
        let mut bitmap = RgbaImage::from_pixel(6, 3, Rgba([10, 20, 30, 255]));
        shred(&mut bitmap, TileKey::default(), &cfg);
        let opaque: Vec<(u32, u32)> = bitmap
            .enumerate_pixels()
            .filter(|(_, _, p)| p[3] != 0)
            .map(|(x, y, _)| (x, y))
            .collect();
        assert_eq!(opaque, [(1, 1), (4, 1)]);
    }

    #[test]
    fn sentinel_becomes_checkerboard() {
        let cfg = EngineConfig::default();
        let mut bitmap = RgbaImage::from_pixel(3, 3, Rgba([222, 250, 206, 255]));
        shred(&mut bitmap, TileKey::default(), &cfg);
        assert_eq!(*bitmap.get_pixel(0, 0), Rgba([0, 0, 0, 32]));
        assert_eq!(*bitmap.get_pixel(1, 0), Rgba([0, 0, 0, 0]));
        assert_eq!(*bitmap.get_pixel(1, 1), Rgba([0, 0, 0, 32]));
    }

    #[test]
    fn opaque_only_counts_visible_pixels() {
        let mut img = RgbaImage::new(4, 2);
        img.put_pixel(0, 0, Rgba([1, 1, 1, 255]));
        img.put_pixel(3, 1, Rgba([1, 1, 1, 1]));
        assert_eq!(count_pixels(&img, CountMode::All), 8);
        assert_eq!(count_pixels(&img, CountMode::OpaqueOnly), 2);
    }
}
