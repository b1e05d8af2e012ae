use bluemarble::image::io::encode_png;
use bluemarble::image::{Rgba, RgbaImage};
use bluemarble::{chunk_template, Anchor, EngineConfig, TemplateRegistry, TileAddress};
use criterion::{criterion_group, criterion_main, Criterion};
use std::hint::black_box;

fn make_source(width: u32, height: u32) -> RgbaImage {
    RgbaImage::from_fn(width, height, |x, y| {
        let value = ((x * 13) ^ (y * 7) ^ (x * y)) & 0xFF;
        let alpha = if value % 5 == 0 { 0 } else { 255 };
        Rgba([value as u8, 255 - value as u8, (value / 3) as u8, alpha])
    })
}

fn bench_chunking(c: &mut Criterion) {
    let source = make_source(300, 200);
    let anchor = Anchor::new(100, 200, 850, 900, 1000).unwrap();
    let sequential = EngineConfig::default();

    c.bench_function("chunk_300x200_four_tiles", |b| {
        b.iter(|| black_box(chunk_template(&source, anchor, &sequential).unwrap()));
    });

    if cfg!(feature = "rayon") {
        let parallel = EngineConfig {
            parallel: true,
            ..EngineConfig::default()
        };
        c.bench_function("chunk_300x200_four_tiles_parallel", |b| {
            b.iter(|| black_box(chunk_template(&source, anchor, &parallel).unwrap()));
        });
    }
}

fn bench_composite(c: &mut Criterion) {
    let mut registry = TemplateRegistry::new(EngineConfig::default()).unwrap();
    for (i, coords) in ["5, 5, 0, 0", "5, 5, 400, 300", "4, 4, 900, 900"]
        .iter()
        .enumerate()
    {
        let source = make_source(200 + 50 * i as u32, 150);
        registry
            .create_template_at(&encode_png(&source).unwrap(), "bench", coords)
            .unwrap()
            .into_result()
            .unwrap();
    }
    let tile = encode_png(&RgbaImage::from_pixel(1000, 1000, Rgba([240, 240, 240, 255]))).unwrap();

    c.bench_function("composite_tile_three_templates", |b| {
        b.iter(|| {
            black_box(
                registry
                    .composite_tile(&tile, TileAddress::new(5, 5))
                    .unwrap(),
            )
        });
    });

    c.bench_function("composite_tile_empty", |b| {
        b.iter(|| {
            black_box(
                registry
                    .composite_tile(&tile, TileAddress::new(9, 9))
                    .unwrap(),
            )
        });
    });
}

criterion_group!(benches, bench_chunking, bench_composite);
criterion_main!(benches);
