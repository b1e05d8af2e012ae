//! Tile compositing: draw registered template fragments over a live tile.
//!
//! The live tile is resampled to `tile_size * M` so fragments can be drawn
//! at native magnification. Enabled templates are drawn in ascending
//! `sort_id` order, so the highest `sort_id` ends up on top. The input tile
//! is never modified; a fresh PNG is always produced.

use std::sync::Arc;

use crate::coords::TileAddress;
use crate::image::io::{decode_rgba, encode_png};
use crate::image::scale::{draw_over, scale_to_fill};
use crate::image::RgbaImage;
use crate::template::{EngineConfig, Template};
use crate::trace::{trace_event, trace_span, trace_warn};
use crate::util::BlueMarbleResult;

/// Output of one composite pass.
#[derive(Clone, Debug)]
pub struct CompositedTile {
    /// Composited bitmap at `tile_size * M` resolution.
    pub bitmap: RgbaImage,
    /// PNG encoding of `bitmap`.
    pub png: Vec<u8>,
    /// Sum of `pixel_count` over templates with a fragment on this tile.
    pub pixel_count: u64,
    /// Number of fragments drawn.
    pub fragments_drawn: usize,
}

/// Returns the enabled templates in draw order (lowest `sort_id` first).
pub fn draw_order(templates: &[Arc<Template>]) -> Vec<&Template> {
    let mut ordered: Vec<&Template> = templates
        .iter()
        .map(Arc::as_ref)
        .filter(|t| t.is_enabled())
        .collect();
    ordered.sort_by(|a, b| a.key().cmp(b.key()));
    ordered
}

/// Composites the fragments registered for `address` over `tile`.
pub fn composite_tile(
    tile: &RgbaImage,
    address: TileAddress,
    templates: &[Arc<Template>],
    cfg: &EngineConfig,
) -> BlueMarbleResult<CompositedTile> {
    cfg.validate()?;
    let _span = trace_span!("composite_tile", x = address.x, y = address.y).entered();

    let m = cfg.magnification();
    let edge = cfg.tile_size * m;
    let mut canvas = scale_to_fill(tile, edge, edge);

    let mut pixel_count = 0u64;
    let mut fragments_drawn = 0usize;
    for template in draw_order(templates) {
        if template.tile_size() != cfg.tile_size {
            trace_warn!(
                "tile_size_mismatch",
                template_tile_size = template.tile_size(),
                tile_size = cfg.tile_size
            );
            continue;
        }
        let mut covered = false;
        for (key, fragment) in template.fragments_on(address) {
            draw_over(&mut canvas, &fragment.bitmap, key.pixel_x * m, key.pixel_y * m);
            fragments_drawn += 1;
            covered = true;
        }
        if covered {
            pixel_count += template.pixel_count();
        }
    }

    trace_event!(
        "composited",
        fragments = fragments_drawn,
        pixel_count = pixel_count
    );
    let png = encode_png(&canvas)?;
    Ok(CompositedTile {
        bitmap: canvas,
        png,
        pixel_count,
        fragments_drawn,
    })
}

/// Decodes a live tile and composites it.
pub fn composite_tile_bytes(
    tile_bytes: &[u8],
    address: TileAddress,
    templates: &[Arc<Template>],
    cfg: &EngineConfig,
) -> BlueMarbleResult<CompositedTile> {
    let tile = decode_rgba(tile_bytes)?;
    composite_tile(&tile, address, templates, cfg)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coords::Anchor;
    use crate::image::Rgba;
    use crate::template::TemplateKey;

    fn small_cfg() -> EngineConfig {
        EngineConfig {
            tile_size: 4,
            ..EngineConfig::default()
        }
    }

    fn solid_template(sort_id: u32, color: [u8; 4], enabled: bool) -> Arc<Template> {
        let cfg = small_cfg();
        let source = RgbaImage::from_pixel(2, 2, Rgba(color));
        let anchor = Anchor::new(0, 0, 1, 1, cfg.tile_size).unwrap();
        let mut tpl =
            Template::create("t", TemplateKey::new(sort_id, "!"), &source, anchor, &cfg).unwrap();
        tpl.set_enabled(enabled);
        Arc::new(tpl)
    }

    #[test]
    fn draw_order_skips_disabled_and_sorts() {
        let templates = vec![
            solid_template(5, [1, 0, 0, 255], true),
            solid_template(2, [2, 0, 0, 255], true),
            solid_template(9, [3, 0, 0, 255], false),
        ];
        let order: Vec<u32> = draw_order(&templates).iter().map(|t| t.sort_id()).collect();
        assert_eq!(order, [2, 5]);
    }

    #[test]
    fn fragment_lands_at_magnified_offset() {
        let cfg = small_cfg();
        let tile = RgbaImage::from_pixel(4, 4, Rgba([255, 255, 255, 255]));
        let templates = vec![solid_template(0, [9, 8, 7, 255], true)];
        let out = composite_tile(&tile, TileAddress::new(0, 0), &templates, &cfg).unwrap();
        assert_eq!(out.bitmap.dimensions(), (12, 12));
        // Source pixel (0,0) of the template sits at tile pixel (1,1); its dot is at 3*1+1.
        assert_eq!(*out.bitmap.get_pixel(4, 4), Rgba([9, 8, 7, 255]));
        assert_eq!(*out.bitmap.get_pixel(3, 3), Rgba([255, 255, 255, 255]));
        assert_eq!(out.pixel_count, 4);
        assert_eq!(out.fragments_drawn, 1);
    }

    #[test]
    fn other_tiles_are_untouched() {
        let cfg = small_cfg();
        let tile = RgbaImage::from_pixel(4, 4, Rgba([1, 2, 3, 255]));
        let templates = vec![solid_template(0, [9, 8, 7, 255], true)];
        let out = composite_tile(&tile, TileAddress::new(1, 0), &templates, &cfg).unwrap();
        assert_eq!(out.pixel_count, 0);
        assert!(out.bitmap.pixels().all(|p| *p == Rgba([1, 2, 3, 255])));
    }
}
