/// Occlusion culling demo
/// Builds a seeded city of box buildings, flies a camera through it and
/// reports how many street-level props the occluders hide each frame
use glam::Vec3;
use mimalloc::MiMalloc;

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use soft_occlusion::geometry::box_mesh;
use soft_occlusion::perf::PerfStats;
use soft_occlusion::{perf_scope, *};
use std::sync::Arc;
use std::time::Instant;

const CITY_BLOCKS: i32 = 12;
const BLOCK_SPACING: f32 = 12.0;
const PROPS_PER_BLOCK: usize = 6;
const DEFAULT_FRAMES: u32 = 120;

struct City {
    buildings: Vec<Aabb>,
    props: Vec<Aabb>,
}

fn generate_city(seed: u64) -> City {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let mut buildings = Vec::new();
    let mut props = Vec::new();

    for bz in -CITY_BLOCKS / 2..CITY_BLOCKS / 2 {
        for bx in -CITY_BLOCKS / 2..CITY_BLOCKS / 2 {
            let origin = Vec3::new(bx as f32 * BLOCK_SPACING, 0.0, bz as f32 * BLOCK_SPACING);
            let half = Vec3::new(rng.gen_range(2.5..4.5), 0.0, rng.gen_range(2.5..4.5));
            let height = rng.gen_range(4.0..30.0);
            buildings.push(Aabb::new(origin - half, origin + half + Vec3::Y * height));

            for _ in 0..PROPS_PER_BLOCK {
                // Somewhere on the street around the building
                let offset = Vec3::new(rng.gen_range(-5.5..5.5), 0.0, rng.gen_range(-5.5..5.5));
                let p = origin + offset;
                props.push(Aabb::new(p - Vec3::new(0.3, 0.0, 0.3), p + Vec3::new(0.3, 1.5, 0.3)));
            }
        }
    }

    City { buildings, props }
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let frames = std::env::args()
        .nth(1)
        .and_then(|arg| arg.parse().ok())
        .unwrap_or(DEFAULT_FRAMES);

    println!("=== Soft Occlusion - Software Occlusion Culling ===");
    println!("Frames: {} (pass a number to change)", frames);
    println!();

    let config = CullerConfig::default();
    let mut culler = match OcclusionCuller::new(config) {
        Ok(culler) => culler,
        Err(err) => {
            log::error!("invalid culler configuration: {}", err);
            std::process::exit(1);
        }
    };

    // Bake every building in parallel
    let city = generate_city(0x0CC1_0DE5);
    {
        perf_scope!("bake city occluders");
        let occluders: Vec<Result<MeshOccluder, MeshValidationError>> = city
            .buildings
            .par_iter()
            .enumerate()
            .map(|(i, building)| {
                let (vertices, indices) = box_mesh(building);
                MeshOccluder::new(format!("building_{:03}", i), &vertices, &indices, &config.batching)
            })
            .collect();

        for occluder in occluders {
            match occluder {
                Ok(occluder) => {
                    culler.add_occluder(Arc::new(occluder));
                }
                Err(err) => log::warn!("skipping occluder: {}", err),
            }
        }
    }
    println!("Baked {} occluders", culler.occluder_count());

    let aspect_ratio = config.width as f32 / config.height as f32;
    let mut camera = Camera::new(Vec3::new(0.0, 2.0, 0.0), aspect_ratio);
    let radius = CITY_BLOCKS as f32 * BLOCK_SPACING * 0.35;

    let mut stats = PerfStats::new();
    let mut total_visible = 0usize;
    let mut last_render = RenderStats::default();

    for frame in 0..frames {
        // Orbit between the buildings at street level, looking at the centre
        let angle = frame as f32 / frames.max(1) as f32 * std::f32::consts::TAU;
        camera.position = Vec3::new(angle.cos() * radius, 2.0, angle.sin() * radius);
        camera.look_at(Vec3::new(0.0, 4.0, 0.0));
        culler.set_view_projection(&camera.view_matrix(), &camera.projection_matrix());

        let render_start = Instant::now();
        last_render = culler.render(camera.position);
        let render_time = render_start.elapsed();

        let query_start = Instant::now();
        let visible = city
            .props
            .iter()
            .filter(|prop| culler.query_box(prop.min, prop.max))
            .count();
        let query_time = query_start.elapsed();

        total_visible += visible;
        stats.record(render_time, query_time);
        log::debug!("frame {}: {}/{} props visible", frame, visible, city.props.len());
    }

    println!(
        "Last frame: {} batches, {} rasterized ({} clipped), {} occluded, {} outside frustum",
        last_render.batches_considered,
        last_render.batches_rasterized,
        last_render.batches_clipped,
        last_render.batches_occluded,
        last_render.batches_outside_frustum
    );
    println!(
        "Average visible props: {:.1} of {}",
        total_visible as f64 / frames.max(1) as f64,
        city.props.len()
    );

    stats.print_summary();

    #[cfg(feature = "profiling")]
    FUNCTION_COUNTERS.snapshot().print_report();
}
