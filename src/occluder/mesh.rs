/// Indexed meshes turned into a set of baked occluder batches
///
/// The mesh is validated, quad-decomposed and split into spatially coherent
/// batches with the surface area heuristic. Every batch is baked against the
/// same reference box (the mesh bounds), so all of them share one
/// quantization grid and neighbouring batches meet without cracks.
use super::quad_decomposition::{decompose, quads_to_triangles};
use super::surface_area_heuristic::generate_batches;
use super::Occluder;
use crate::geometry::Aabb;
use glam::Vec3;
use rayon::prelude::*;
use thiserror::Error;

/// How a mesh is cut into batches before baking
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchingConfig {
    /// Quads per batch the SAH split aims for
    pub target_size: usize,
    /// Candidate split positions are multiples of this many quads
    pub split_granularity: usize,
}

impl Default for BatchingConfig {
    fn default() -> Self {
        Self {
            target_size: 128,
            split_granularity: 4,
        }
    }
}

/// Error returned from mesh occluder construction.
#[derive(Debug, Error, PartialEq)]
pub enum MeshValidationError {
    #[error("Occluder mesh {name:?} has no triangles")]
    Empty { name: String },
    #[error("Occluder mesh has {count} indices which is not a multiple of three")]
    IndexCountNotMultipleOfThree { count: usize },
    #[error("Index at position {index} has the value {value} which is out of bounds for {max} vertices")]
    IndexOutOfBounds { index: usize, value: u32, max: usize },
    #[error("Vertex {index} has a non-finite coordinate {value:?}")]
    NonFiniteVertex { index: usize, value: Vec3 },
}

#[derive(Debug)]
pub struct MeshOccluder {
    name: String,
    batches: Vec<Occluder>,
    bound: Aabb,
    triangle_count: usize,
}

impl MeshOccluder {
    pub fn new(
        name: impl Into<String>,
        vertices: &[Vec3],
        indices: &[u32],
        config: &BatchingConfig,
    ) -> Result<Self, MeshValidationError> {
        let name = name.into();
        validate(&name, vertices, indices)?;

        let bound = Aabb::from_points(indices.iter().map(|&i| &vertices[i as usize]));

        let quads = decompose(indices, vertices);
        let quad_bounds: Vec<Aabb> = quads
            .chunks_exact(4)
            .map(|q| Aabb::from_points(q.iter().map(|&i| &vertices[i as usize])))
            .collect();
        let groups = generate_batches(&quad_bounds, config.target_size, config.split_granularity);

        let batches: Vec<Occluder> = groups
            .par_iter()
            .map(|group| {
                let group_quads: Vec<u32> = group
                    .iter()
                    .flat_map(|&q| quads[q as usize * 4..q as usize * 4 + 4].iter().copied())
                    .collect();
                let soup: Vec<Vec3> = quads_to_triangles(&group_quads)
                    .into_iter()
                    .map(|i| vertices[i as usize])
                    .collect();
                Occluder::bake(&soup, bound.min, bound.max)
            })
            .collect();

        let triangle_count = indices.len() / 3;
        log::debug!(
            "mesh occluder {:?}: {} triangles, {} quads, {} batches",
            name,
            triangle_count,
            quad_bounds.len(),
            batches.len()
        );

        Ok(Self {
            name,
            batches,
            bound,
            triangle_count,
        })
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn batches(&self) -> &[Occluder] {
        &self.batches
    }

    #[inline]
    pub fn bound(&self) -> Aabb {
        self.bound
    }

    #[inline]
    pub fn center(&self) -> Vec3 {
        self.bound.center()
    }

    #[inline]
    pub fn triangle_count(&self) -> usize {
        self.triangle_count
    }
}

fn validate(name: &str, vertices: &[Vec3], indices: &[u32]) -> Result<(), MeshValidationError> {
    if indices.is_empty() {
        return Err(MeshValidationError::Empty {
            name: name.to_string(),
        });
    }

    if indices.len() % 3 != 0 {
        return Err(MeshValidationError::IndexCountNotMultipleOfThree {
            count: indices.len(),
        });
    }

    for (index, &value) in indices.iter().enumerate() {
        if value as usize >= vertices.len() {
            return Err(MeshValidationError::IndexOutOfBounds {
                index,
                value,
                max: vertices.len(),
            });
        }
    }

    if let Some((index, &value)) = vertices.iter().enumerate().find(|(_, v)| !v.is_finite()) {
        return Err(MeshValidationError::NonFiniteVertex { index, value });
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plane(n: u32, size: f32) -> (Vec<Vec3>, Vec<u32>) {
        let mut vertices = Vec::new();
        for y in 0..=n {
            for x in 0..=n {
                vertices.push(Vec3::new(x as f32 * size, y as f32 * size, 0.0));
            }
        }
        let row = n + 1;
        let mut indices = Vec::new();
        for y in 0..n {
            for x in 0..n {
                let i = y * row + x;
                indices.extend_from_slice(&[i, i + 1, i + row + 1, i, i + row + 1, i + row]);
            }
        }
        (vertices, indices)
    }

    #[test]
    fn rejects_malformed_meshes() {
        let config = BatchingConfig::default();
        let v = [Vec3::ZERO, Vec3::X, Vec3::Y];

        assert!(matches!(
            MeshOccluder::new("empty", &v, &[], &config),
            Err(MeshValidationError::Empty { .. })
        ));
        assert_eq!(
            MeshOccluder::new("short", &v, &[0, 1], &config).unwrap_err(),
            MeshValidationError::IndexCountNotMultipleOfThree { count: 2 }
        );
        assert_eq!(
            MeshOccluder::new("oob", &v, &[0, 1, 3], &config).unwrap_err(),
            MeshValidationError::IndexOutOfBounds {
                index: 2,
                value: 3,
                max: 3
            }
        );
        let nan = [Vec3::ZERO, Vec3::new(f32::NAN, 0.0, 0.0), Vec3::Y];
        assert!(matches!(
            MeshOccluder::new("nan", &nan, &[0, 1, 2], &config),
            Err(MeshValidationError::NonFiniteVertex { index: 1, .. })
        ));
    }

    #[test]
    fn batches_keep_every_triangle() {
        let (vertices, indices) = plane(16, 0.5);
        let config = BatchingConfig {
            target_size: 32,
            split_granularity: 4,
        };
        let mesh = MeshOccluder::new("plane", &vertices, &indices, &config).unwrap();

        assert_eq!(mesh.name(), "plane");
        assert_eq!(mesh.triangle_count(), 512);
        assert_eq!(mesh.batches().iter().map(|b| b.triangle_count()).sum::<usize>(), 512);
        // 256 quads in batches of at most 32
        assert!(mesh.batches().len() >= 8);
        for batch in mesh.batches() {
            assert_eq!(batch.ref_min(), mesh.bound().min);
            assert_eq!(batch.ref_max(), mesh.bound().max);
            assert!(batch.triangle_count() <= 64);
        }
    }

    #[test]
    fn bound_covers_referenced_vertices_only() {
        let vertices = [Vec3::ZERO, Vec3::X, Vec3::Y, Vec3::splat(100.0)];
        let mesh = MeshOccluder::new("tri", &vertices, &[0, 1, 2], &BatchingConfig::default()).unwrap();
        assert_eq!(mesh.bound(), Aabb::new(Vec3::ZERO, Vec3::new(1.0, 1.0, 0.0)));
        assert_eq!(mesh.batches().len(), 1);
    }
}
