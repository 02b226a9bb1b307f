/// Micro-benchmarks with function counter and hardware counter collection
/// Run with `--features profiling` to see where rasterizer work goes.
use criterion::{black_box, criterion_group, Criterion};
use glam::{Mat4, Vec3, Vec4};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use soft_occlusion::rendering::{compress, F32x8, HiZBuffer, RasterTable, HIZ_BLOCK_SIZE};
use soft_occlusion::{CounterSnapshot, Occluder, Rasterizer, FUNCTION_COUNTERS};
use std::sync::Mutex;

const SIZE: usize = 512;

// Thread-safe storage for collected statistics
lazy_static::lazy_static! {
    static ref COLLECTED_STATS: Mutex<Vec<(String, CounterSnapshot)>> = Mutex::new(Vec::new());
}

fn collect(label: String) {
    let snapshot = FUNCTION_COUNTERS.snapshot();
    if let Ok(mut stats) = COLLECTED_STATS.lock() {
        stats.push((label, snapshot));
    }
    FUNCTION_COUNTERS.reset();
}

/// Maps world x/y to pixels and z to depth `1 - z`
fn pixel_space() -> Mat4 {
    Mat4::from_cols(
        Vec4::new(2.0 / SIZE as f32, 0.0, 0.0, 0.0),
        Vec4::new(0.0, -2.0 / SIZE as f32, 0.0, 0.0),
        Vec4::new(0.0, 0.0, 1.0, 0.0),
        Vec4::new(-1.0, 1.0, 0.0, 1.0),
    )
}

fn random_soup(rng: &mut ChaCha8Rng, triangles: usize, max_edge: f32) -> Occluder {
    let vertices: Vec<Vec3> = (0..triangles)
        .flat_map(|_| {
            let anchor = Vec3::new(
                rng.gen_range(0.0..SIZE as f32),
                rng.gen_range(0.0..SIZE as f32),
                rng.gen_range(0.1..0.9),
            );
            let jitter: [Vec3; 3] = std::array::from_fn(|_| {
                Vec3::new(
                    rng.gen_range(-max_edge..max_edge),
                    rng.gen_range(-max_edge..max_edge),
                    rng.gen_range(-0.05..0.05),
                )
            });
            jitter.map(|j| anchor + j)
        })
        .collect();
    Occluder::bake(&vertices, Vec3::splat(-64.0), Vec3::new(SIZE as f32 + 64.0, SIZE as f32 + 64.0, 1.0))
}

/// Rasterization cost by triangle size, with block and Hi-Z counters
fn bench_triangle_sizes(c: &mut Criterion) {
    let mut group = c.benchmark_group("triangle_sizes");
    let mut rng = ChaCha8Rng::seed_from_u64(11);

    let sizes = [("tiny", 2.0f32), ("small", 12.0), ("medium", 48.0), ("large", 200.0)];
    for (name, edge) in sizes {
        let occluder = random_soup(&mut rng, 1024, edge);
        group.bench_function(name, |b| {
            let mut rasterizer = Rasterizer::new(SIZE, SIZE);
            rasterizer.set_model_view_projection(&pixel_space());
            b.iter(|| {
                FUNCTION_COUNTERS.reset();
                rasterizer.clear();
                rasterizer.rasterize::<false>(black_box(&occluder));
            });
        });
        collect(format!("triangle_sizes/{}", name));
    }

    group.finish();
}

fn bench_edge_masks(c: &mut Criterion) {
    let table = RasterTable::new();
    let mut rng = ChaCha8Rng::seed_from_u64(12);
    let edges: Vec<(f32, f32, f32)> = (0..4096)
        .map(|_| {
            let n = glam::Vec2::from_angle(rng.gen_range(0.0..std::f32::consts::TAU));
            (n.x, n.y, rng.gen_range(-6.0..6.0))
        })
        .collect();

    c.bench_function("raster_table_edge_mask_4096", |b| {
        b.iter(|| {
            edges
                .iter()
                .fold(0u64, |acc, &(nx, ny, offset)| acc ^ table.edge_mask(nx, ny, offset))
        });
    });
}

fn bench_hiz_block_writes(c: &mut Criterion) {
    let mut group = c.benchmark_group("hiz_block_writes");
    let mut rng = ChaCha8Rng::seed_from_u64(13);
    let blocks = (SIZE / HIZ_BLOCK_SIZE) * (SIZE / HIZ_BLOCK_SIZE);
    let writes: Vec<(usize, u64, u16)> = (0..8192)
        .map(|_| (rng.gen_range(0..blocks), rng.gen::<u64>(), compress(rng.gen_range(0.0..1.0))))
        .collect();

    group.bench_function("random_coverage", |b| {
        let mut hiz = HiZBuffer::new(SIZE, SIZE);
        b.iter(|| {
            hiz.clear();
            for &(index, coverage, depth) in &writes {
                hiz.write_block(index, coverage, &[[depth; HIZ_BLOCK_SIZE]; HIZ_BLOCK_SIZE]);
            }
        });
    });

    group.bench_function("full_screen_is_visible", |b| {
        let mut hiz = HiZBuffer::new(SIZE, SIZE);
        for &(index, coverage, depth) in &writes {
            hiz.write_block(index, coverage, &[[depth; HIZ_BLOCK_SIZE]; HIZ_BLOCK_SIZE]);
        }
        b.iter(|| hiz.is_visible(0, SIZE - 1, 0, SIZE - 1, black_box(0)));
    });

    group.finish();
}

fn bench_depth_ramp(c: &mut Criterion) {
    c.bench_function("depth_row_ramp_compress", |b| {
        b.iter(|| {
            let z = F32x8::ramp(black_box(0.25), black_box(0.001)).clamp(0.2, 0.3);
            z.0.map(compress)
        });
    });
}

/// Queries against a half-occluded screen
fn bench_queries(c: &mut Criterion) {
    let mut rng = ChaCha8Rng::seed_from_u64(14);
    let mut rasterizer = Rasterizer::new(SIZE, SIZE);
    rasterizer.set_model_view_projection(&pixel_space());
    rasterizer.clear();
    rasterizer.rasterize::<false>(&random_soup(&mut rng, 256, 64.0));

    let boxes: Vec<(Vec3, Vec3)> = (0..1024)
        .map(|_| {
            let min = Vec3::new(
                rng.gen_range(0.0..SIZE as f32 - 16.0),
                rng.gen_range(0.0..SIZE as f32 - 16.0),
                rng.gen_range(0.0..0.9),
            );
            (min, min + Vec3::new(16.0, 16.0, 0.1))
        })
        .collect();

    FUNCTION_COUNTERS.reset();
    c.bench_function("query_visibility_pixel_space", |b| {
        b.iter(|| {
            boxes
                .iter()
                .filter(|(min, max)| rasterizer.query_visibility(*min, *max).visible)
                .count()
        });
    });
    collect("query_visibility_pixel_space".to_string());
}

// Custom function to print summary after all benchmarks complete
fn print_profiling_summary() {
    let Ok(stats) = COLLECTED_STATS.lock() else {
        return;
    };
    if stats.iter().all(|(_, s)| s.blocks_tested == 0 && s.visibility_queries == 0) {
        return;
    }

    println!("\n");
    println!("═══════════════════════════════════════════════════════════════════════════");
    println!("                    PROFILING SUMMARY (--features profiling)");
    println!("═══════════════════════════════════════════════════════════════════════════");

    for (label, snapshot) in stats.iter() {
        println!("──────────────────────────────────────────────────────────────────────────");
        println!("  Benchmark: {}", label);
        println!("──────────────────────────────────────────────────────────────────────────");
        snapshot.print_report();
    }

    #[cfg(feature = "profiling")]
    {
        use soft_occlusion::perf::profiling::hardware::PerfCounters;

        let mut rng = ChaCha8Rng::seed_from_u64(15);
        let occluder = random_soup(&mut rng, 4096, 24.0);
        let mut rasterizer = Rasterizer::new(SIZE, SIZE);
        rasterizer.set_model_view_projection(&pixel_space());

        let mut counters = PerfCounters::new();
        counters.reset_all();
        counters.enable_all();
        for _ in 0..32 {
            rasterizer.clear();
            rasterizer.rasterize::<false>(&occluder);
        }
        counters.disable_all();
        println!("  32 frames of 4096 triangles:");
        counters.read_all().print_report();
    }

    println!("═══════════════════════════════════════════════════════════════════════════");
    println!("  Tip: Run without --features profiling for pure performance benchmarks");
    println!("═══════════════════════════════════════════════════════════════════════════");
    println!();
}

criterion_group! {
    name = benches;
    config = Criterion::default();
    targets =
    bench_triangle_sizes,
    bench_edge_masks,
    bench_hiz_block_writes,
    bench_depth_ramp,
    bench_queries
}

// Custom main to print summary after all benchmarks
fn main() {
    benches();
    print_profiling_summary();
}
