/// Merge adjacent coplanar triangle pairs into quads
///
/// Output is 4 indices per quad. A merged pair `[a, b, c, d]` stands for the
/// triangles `(a, b, c)` and `(a, c, d)`, both with their original winding;
/// `a`-`c` is the edge the two triangles shared. A triangle that found no
/// partner is written as `[a, b, c, c]`.
use crate::perf::FUNCTION_COUNTERS;
use crate::count_add;
use glam::Vec3;
use std::collections::HashMap;

/// Minimum cosine between the unit normals of a merged pair
pub const COPLANAR_COS: f32 = 0.999;

/// Index quads for `indices` (a triangle list over `vertices`).
///
/// Pairing is greedy in triangle order. Each unpaired triangle takes the
/// free neighbour with the most similar normal; equal candidates go to the
/// lower triangle index. The result only depends on the input order.
///
/// # Panics
/// If `indices.len()` is not a multiple of three or an index is out of range.
pub fn decompose(indices: &[u32], vertices: &[Vec3]) -> Vec<u32> {
    assert!(
        indices.len() % 3 == 0,
        "index count {} is not a whole number of triangles",
        indices.len()
    );

    let triangles: Vec<[u32; 3]> = indices
        .chunks_exact(3)
        .map(|t| [t[0], t[1], t[2]])
        .collect();
    let normals: Vec<Option<Vec3>> = triangles
        .iter()
        .map(|t| triangle_normal(t, vertices))
        .collect();

    // Undirected edge -> triangles using it, in triangle order
    let mut edges: HashMap<(u32, u32), Vec<usize>> = HashMap::with_capacity(indices.len());
    for (t, tri) in triangles.iter().enumerate() {
        if normals[t].is_none() {
            continue;
        }
        for e in 0..3 {
            edges
                .entry(edge_key(tri[e], tri[(e + 1) % 3]))
                .or_default()
                .push(t);
        }
    }

    let mut used = vec![false; triangles.len()];
    let mut quads = Vec::with_capacity(indices.len() / 3 * 4);
    let mut merged = 0usize;

    for t in 0..triangles.len() {
        if used[t] {
            continue;
        }
        used[t] = true;
        let tri = triangles[t];

        let Some(normal) = normals[t] else {
            quads.extend_from_slice(&[tri[0], tri[1], tri[2], tri[2]]);
            continue;
        };

        let mut best: Option<(f32, usize, [u32; 4])> = None;
        for e in 0..3 {
            let (p, q, r) = (tri[e], tri[(e + 1) % 3], tri[(e + 2) % 3]);
            let Some(neighbours) = edges.get(&edge_key(p, q)) else {
                continue;
            };

            for &u in neighbours {
                if used[u] {
                    continue;
                }
                let Some(other_normal) = normals[u] else {
                    continue;
                };
                // The neighbour must walk the shared edge as q -> p
                let Some(s) = opposite_vertex(&triangles[u], q, p) else {
                    continue;
                };

                let cos = normal.dot(other_normal);
                if cos < COPLANAR_COS {
                    continue;
                }

                let quad = [p, s, q, r];
                if !is_convex(&quad, vertices, normal + other_normal) {
                    continue;
                }

                let better = match best {
                    None => true,
                    Some((best_cos, best_u, _)) => cos > best_cos || (cos == best_cos && u < best_u),
                };
                if better {
                    best = Some((cos, u, quad));
                }
            }
        }

        match best {
            Some((_, u, quad)) => {
                used[u] = true;
                merged += 1;
                quads.extend_from_slice(&quad);
            }
            None => quads.extend_from_slice(&[tri[0], tri[1], tri[2], tri[2]]),
        }
    }

    count_add!(FUNCTION_COUNTERS.quads_merged, merged);
    log::trace!(
        "quad decomposition: {} triangles -> {} quads ({} merged pairs)",
        triangles.len(),
        quads.len() / 4,
        merged
    );

    quads
}

/// Triangle list equivalent to a quad list from `decompose`.
pub fn quads_to_triangles(quads: &[u32]) -> Vec<u32> {
    let mut triangles = Vec::with_capacity(quads.len() / 4 * 6);
    for quad in quads.chunks_exact(4) {
        let [a, b, c, d] = [quad[0], quad[1], quad[2], quad[3]];
        triangles.extend_from_slice(&[a, b, c]);
        if d != c {
            triangles.extend_from_slice(&[a, c, d]);
        }
    }
    triangles
}

#[inline]
fn edge_key(a: u32, b: u32) -> (u32, u32) {
    (a.min(b), a.max(b))
}

fn triangle_normal(tri: &[u32; 3], vertices: &[Vec3]) -> Option<Vec3> {
    let [a, b, c] = tri.map(|i| vertices[i as usize]);
    (b - a).cross(c - a).try_normalize()
}

/// Third vertex of `tri` if it contains the directed edge `from -> to`.
fn opposite_vertex(tri: &[u32; 3], from: u32, to: u32) -> Option<u32> {
    (0..3)
        .find(|&e| tri[e] == from && tri[(e + 1) % 3] == to)
        .map(|e| tri[(e + 2) % 3])
}

/// Strict convexity of the polygon `quad` seen along `normal`.
fn is_convex(quad: &[u32; 4], vertices: &[Vec3], normal: Vec3) -> bool {
    let v = quad.map(|i| vertices[i as usize]);
    (0..4).all(|i| {
        let a = v[i];
        let b = v[(i + 1) % 4];
        let c = v[(i + 2) % 4];
        (b - a).cross(c - b).dot(normal) > 0.0
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grid(n: u32) -> (Vec<Vec3>, Vec<u32>) {
        let mut vertices = Vec::new();
        for y in 0..=n {
            for x in 0..=n {
                vertices.push(Vec3::new(x as f32, y as f32, 0.0));
            }
        }
        let mut indices = Vec::new();
        let row = n + 1;
        for y in 0..n {
            for x in 0..n {
                let i = y * row + x;
                indices.extend_from_slice(&[i, i + 1, i + row + 1, i, i + row + 1, i + row]);
            }
        }
        (vertices, indices)
    }

    fn canonical(triangles: &[u32]) -> Vec<[u32; 3]> {
        // Rotate each triangle so its smallest index comes first, keeping winding
        let mut out: Vec<[u32; 3]> = triangles
            .chunks_exact(3)
            .map(|t| {
                let m = (0..3).min_by_key(|&i| t[i]).unwrap_or(0);
                [t[m], t[(m + 1) % 3], t[(m + 2) % 3]]
            })
            .collect();
        out.sort_unstable();
        out
    }

    #[test]
    fn empty_input_gives_empty_output() {
        assert!(decompose(&[], &[]).is_empty());
        assert!(quads_to_triangles(&[]).is_empty());
    }

    #[test]
    fn square_becomes_one_quad() {
        let (vertices, indices) = grid(1);
        let quads = decompose(&indices, &vertices);
        assert_eq!(quads.len(), 4);
        assert_ne!(quads[2], quads[3]);
        assert_eq!(canonical(&quads_to_triangles(&quads)), canonical(&indices));
    }

    #[test]
    fn grid_pairs_every_triangle() {
        let (vertices, indices) = grid(6);
        let quads = decompose(&indices, &vertices);
        assert_eq!(quads.len() / 4, 36);
        assert_eq!(canonical(&quads_to_triangles(&quads)), canonical(&indices));
    }

    #[test]
    fn folded_pair_stays_split() {
        let vertices = vec![
            Vec3::new(0.0, 0.0, 0.0),
            Vec3::new(1.0, 0.0, 0.0),
            Vec3::new(1.0, 1.0, 0.0),
            Vec3::new(0.0, 1.0, 1.0),
        ];
        let indices = vec![0, 1, 2, 0, 2, 3];
        let quads = decompose(&indices, &vertices);
        assert_eq!(quads, vec![0, 1, 2, 2, 0, 2, 3, 3]);
    }

    #[test]
    fn concave_union_stays_split() {
        // Shared edge 0-2; the union is a dart, not a convex quad
        let vertices = vec![
            Vec3::new(0.0, 0.0, 0.0),
            Vec3::new(2.0, 0.0, 0.0),
            Vec3::new(0.5, 0.5, 0.0),
            Vec3::new(0.0, 2.0, 0.0),
        ];
        let indices = vec![0, 1, 2, 0, 2, 3];
        let quads = decompose(&indices, &vertices);
        assert_eq!(quads.len(), 8);
        assert_eq!(canonical(&quads_to_triangles(&quads)), canonical(&indices));
    }

    #[test]
    fn mismatched_winding_is_not_merged() {
        let vertices = vec![
            Vec3::new(0.0, 0.0, 0.0),
            Vec3::new(1.0, 0.0, 0.0),
            Vec3::new(1.0, 1.0, 0.0),
            Vec3::new(0.0, 1.0, 0.0),
        ];
        // Second triangle flipped
        let indices = vec![0, 1, 2, 0, 3, 2];
        assert_eq!(decompose(&indices, &vertices).len(), 8);
    }

    #[test]
    fn degenerate_triangles_pass_through() {
        let (mut vertices, mut indices) = grid(1);
        vertices.push(Vec3::new(5.0, 5.0, 5.0));
        let extra = vertices.len() as u32 - 1;
        indices.extend_from_slice(&[extra, extra, 0]);

        let quads = decompose(&indices, &vertices);
        assert_eq!(quads.len(), 8);
        assert_eq!(&quads[4..], &[extra, extra, 0, 0]);
    }

    #[test]
    fn output_is_deterministic() {
        let (vertices, indices) = grid(9);
        let first = decompose(&indices, &vertices);
        for _ in 0..4 {
            assert_eq!(decompose(&indices, &vertices), first);
        }
    }
}
