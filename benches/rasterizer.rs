/// Benchmark suite for the occlusion rasterizer
/// Measures depth rendering of a box city and the cost of visibility queries.
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use glam::Vec3;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use soft_occlusion::geometry::box_mesh;
use soft_occlusion::rendering::compress;
use soft_occlusion::{Aabb, Camera, Occluder, Rasterizer};

const WIDTH: usize = 1280;
const HEIGHT: usize = 720;

fn city(count: usize) -> Vec<Occluder> {
    let mut rng = ChaCha8Rng::seed_from_u64(17);
    (0..count)
        .map(|_| {
            let base = Vec3::new(rng.gen_range(-60.0..60.0), 0.0, rng.gen_range(-60.0..60.0));
            let size = Vec3::new(rng.gen_range(2.0..8.0), rng.gen_range(4.0..30.0), rng.gen_range(2.0..8.0));
            let bounds = Aabb::new(base, base + size);
            let (vertices, indices) = box_mesh(&bounds);
            let soup: Vec<Vec3> = indices.iter().map(|&i| vertices[i as usize]).collect();
            Occluder::bake(&soup, bounds.min, bounds.max)
        })
        .collect()
}

fn street_camera() -> Camera {
    let mut camera = Camera::new(Vec3::new(0.0, 2.0, 70.0), WIDTH as f32 / HEIGHT as f32);
    camera.look_at(Vec3::new(0.0, 4.0, 0.0));
    camera
}

fn rendered_rasterizer(occluders: &[Occluder]) -> Rasterizer {
    let mut rasterizer = Rasterizer::new(WIDTH, HEIGHT);
    rasterizer.set_model_view_projection(&street_camera().view_projection_matrix());
    rasterizer.clear();
    for occluder in occluders {
        rasterizer.rasterize::<false>(occluder);
    }
    rasterizer
}

fn bench_rasterize_city(c: &mut Criterion) {
    let mut group = c.benchmark_group("rasterize_city");
    for &count in &[16usize, 128, 512] {
        let occluders = city(count);
        group.bench_with_input(BenchmarkId::from_parameter(count), &occluders, |b, occluders| {
            let mut rasterizer = Rasterizer::new(WIDTH, HEIGHT);
            rasterizer.set_model_view_projection(&street_camera().view_projection_matrix());

            b.iter(|| {
                rasterizer.clear();
                for occluder in occluders {
                    rasterizer.rasterize::<false>(black_box(occluder));
                }
            });
        });
    }
    group.finish();
}

fn bench_rasterize_clipped_path(c: &mut Criterion) {
    let occluders = city(128);
    c.bench_function("rasterize_city_clipped_path", |b| {
        let mut rasterizer = Rasterizer::new(WIDTH, HEIGHT);
        rasterizer.set_model_view_projection(&street_camera().view_projection_matrix());

        b.iter(|| {
            rasterizer.clear();
            for occluder in &occluders {
                rasterizer.rasterize::<true>(black_box(occluder));
            }
        });
    });
}

fn bench_clear(c: &mut Criterion) {
    c.bench_function("clear_1280x720", |b| {
        let mut rasterizer = Rasterizer::new(WIDTH, HEIGHT);
        b.iter(|| rasterizer.clear());
    });
}

fn bench_query_visibility(c: &mut Criterion) {
    let rasterizer = rendered_rasterizer(&city(256));
    let mut rng = ChaCha8Rng::seed_from_u64(3);
    let boxes: Vec<(Vec3, Vec3)> = (0..1024)
        .map(|_| {
            let min = Vec3::new(rng.gen_range(-60.0..60.0), 0.0, rng.gen_range(-60.0..60.0));
            (min, min + Vec3::new(0.6, 1.5, 0.6))
        })
        .collect();

    c.bench_function("query_visibility_1024_boxes", |b| {
        b.iter(|| {
            boxes
                .iter()
                .filter(|(min, max)| rasterizer.query_visibility(black_box(*min), black_box(*max)).visible)
                .count()
        });
    });

    c.bench_function("query_2d_full_screen", |b| {
        let max_z = compress(0.001);
        b.iter(|| rasterizer.query_2d(0, WIDTH - 1, 0, HEIGHT - 1, black_box(max_z)));
    });
}

criterion_group!(
    benches,
    bench_rasterize_city,
    bench_rasterize_clipped_path,
    bench_clear,
    bench_query_visibility
);
criterion_main!(benches);
