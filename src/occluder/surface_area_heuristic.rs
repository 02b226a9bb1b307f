/// Surface area heuristic batching of occluder bounds
use crate::geometry::Aabb;

/// Partitions at least this large split their two halves on separate threads
const PARALLEL_THRESHOLD: usize = 4096;

/// Partition `aabbs` into spatially coherent batches of at most `target_size`
/// elements. Every index in `0..aabbs.len()` appears in exactly one batch.
///
/// Each partition is split along the axis of largest centroid extent, at the
/// candidate (every `split_granularity` elements in centroid order) with the
/// lowest `count * area` cost. Partitions that no candidate improves are cut
/// into consecutive chunks in input order.
pub fn generate_batches(aabbs: &[Aabb], target_size: usize, split_granularity: usize) -> Vec<Vec<u32>> {
    if aabbs.is_empty() {
        return Vec::new();
    }

    let target_size = target_size.max(1);
    let split_granularity = split_granularity.max(1);
    let indices: Vec<u32> = (0..aabbs.len() as u32).collect();

    let batches = split(aabbs, indices, target_size, split_granularity);
    log::debug!(
        "SAH batching: {} boxes -> {} batches (target {})",
        aabbs.len(),
        batches.len(),
        target_size
    );
    batches
}

fn split(aabbs: &[Aabb], mut indices: Vec<u32>, target_size: usize, granularity: usize) -> Vec<Vec<u32>> {
    let count = indices.len();
    if count <= target_size {
        return vec![indices];
    }

    let mut bounds = Aabb::EMPTY;
    let mut centroid_bounds = Aabb::EMPTY;
    for &i in &indices {
        let aabb = &aabbs[i as usize];
        bounds = bounds.union(aabb);
        centroid_bounds.include_point(aabb.center());
    }
    let axis = centroid_bounds.largest_axis();

    indices.sort_unstable_by(|&a, &b| {
        let ca = aabbs[a as usize].center()[axis];
        let cb = aabbs[b as usize].center()[axis];
        ca.total_cmp(&cb).then(a.cmp(&b))
    });

    // right_area[k] = area of indices[k..]
    let mut right_area = vec![0.0f32; count];
    let mut acc = Aabb::EMPTY;
    for k in (1..count).rev() {
        acc = acc.union(&aabbs[indices[k] as usize]);
        right_area[k] = acc.surface_area();
    }

    let mut best: Option<(f32, usize)> = None;
    let mut left = Aabb::EMPTY;
    for k in 1..count {
        left = left.union(&aabbs[indices[k - 1] as usize]);
        if k % granularity != 0 {
            continue;
        }
        let cost = k as f32 * left.surface_area() + (count - k) as f32 * right_area[k];
        if best.map_or(true, |(best_cost, _)| cost < best_cost) {
            best = Some((cost, k));
        }
    }

    let baseline = count as f32 * bounds.surface_area();
    match best {
        Some((cost, k)) if cost < baseline => {
            let right = indices.split_off(k);
            let left = indices;
            let (mut batches, right_batches) = if count >= PARALLEL_THRESHOLD {
                rayon::join(
                    || split(aabbs, left, target_size, granularity),
                    || split(aabbs, right, target_size, granularity),
                )
            } else {
                (
                    split(aabbs, left, target_size, granularity),
                    split(aabbs, right, target_size, granularity),
                )
            };
            batches.extend(right_batches);
            batches
        }
        _ => {
            // Coincident or degenerate boxes: nothing to gain from splitting
            indices.sort_unstable();
            indices.chunks(target_size).map(|c| c.to_vec()).collect()
        }
    }
}
