/// Frame-level occlusion culling over a set of mesh occluders
///
/// Every frame the culler clears its rasterizer, sorts all occluder batches
/// front to back from the camera, and rasterizes each batch that is not
/// already hidden by the ones drawn before it. Visibility of meshes and boxes
/// is then answered against the accumulated depth.
use crate::camera::Frustum;
use crate::occluder::{BatchingConfig, MeshOccluder, Occluder};
use crate::rendering::{NearPlanePolicy, Rasterizer};
use glam::{Mat4, Vec3};
use std::collections::BTreeMap;
use std::sync::Arc;
use thiserror::Error;

/// Construction-time settings of an `OcclusionCuller`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CullerConfig {
    pub width: usize,
    pub height: usize,
    pub near_plane_policy: NearPlanePolicy,
    /// Batching used by callers building mesh occluders for this culler
    pub batching: BatchingConfig,
}

impl Default for CullerConfig {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 720,
            near_plane_policy: NearPlanePolicy::Reject,
            batching: BatchingConfig::default(),
        }
    }
}

impl CullerConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.width == 0 || self.height == 0 {
            return Err(ConfigError::ZeroResolution {
                width: self.width,
                height: self.height,
            });
        }
        if self.batching.target_size == 0 {
            return Err(ConfigError::ZeroTargetSize);
        }
        if self.batching.split_granularity == 0 {
            return Err(ConfigError::ZeroSplitGranularity);
        }
        Ok(())
    }
}

/// Error returned from culler configuration validation.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Culler resolution {width}x{height} must be non-zero in both dimensions")]
    ZeroResolution { width: usize, height: usize },
    #[error("Batch target size must be at least one")]
    ZeroTargetSize,
    #[error("Batch split granularity must be at least one")]
    ZeroSplitGranularity,
}

/// What happened to the batches during one `render`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RenderStats {
    pub batches_considered: usize,
    pub batches_rasterized: usize,
    /// Rasterized through the near-clipping path
    pub batches_clipped: usize,
    /// Hidden by batches drawn earlier in the frame
    pub batches_occluded: usize,
    pub batches_outside_frustum: usize,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MeshVisibility {
    /// Visible batches over total batches (0 for a mesh without batches)
    pub fraction: f32,
    pub visible_batches: usize,
}

pub struct OcclusionCuller {
    config: CullerConfig,
    rasterizer: Rasterizer,
    occluders: BTreeMap<String, Arc<MeshOccluder>>,
    frustum: Option<Frustum>,
}

impl OcclusionCuller {
    pub fn new(config: CullerConfig) -> Result<Self, ConfigError> {
        config.validate()?;

        let mut rasterizer = Rasterizer::new(config.width, config.height);
        rasterizer.set_near_plane_policy(config.near_plane_policy);
        rasterizer.clear();

        Ok(Self {
            config,
            rasterizer,
            occluders: BTreeMap::new(),
            frustum: None,
        })
    }

    #[inline]
    pub fn config(&self) -> &CullerConfig {
        &self.config
    }

    /// Register an occluder under its name. Returns the occluder it replaced.
    pub fn add_occluder(&mut self, occluder: Arc<MeshOccluder>) -> Option<Arc<MeshOccluder>> {
        self.occluders.insert(occluder.name().to_string(), occluder)
    }

    pub fn remove_occluder(&mut self, name: &str) -> bool {
        self.occluders.remove(name).is_some()
    }

    pub fn remove_all_occluders(&mut self) {
        self.occluders.clear();
    }

    #[inline]
    pub fn occluder_count(&self) -> usize {
        self.occluders.len()
    }

    pub fn occluder(&self, name: &str) -> Option<&Arc<MeshOccluder>> {
        self.occluders.get(name)
    }

    pub fn set_view_projection(&mut self, view: &Mat4, projection: &Mat4) {
        let view_projection = *projection * *view;
        self.rasterizer.set_model_view_projection(&view_projection);
        self.frustum = Some(Frustum::from_view_projection(&view_projection));
    }

    /// Rebuild the depth buffer for this frame.
    pub fn render(&mut self, camera_position: Vec3) -> RenderStats {
        self.rasterizer.clear();

        let mut batches: Vec<(f32, &Occluder)> = self
            .occluders
            .values()
            .flat_map(|mesh| mesh.batches())
            .map(|batch| (batch.bounds().center().distance_squared(camera_position), batch))
            .collect();
        // Stable sort keeps name/batch order for equal distances
        batches.sort_by(|a, b| a.0.total_cmp(&b.0));

        let mut stats = RenderStats::default();
        for (_, batch) in batches {
            stats.batches_considered += 1;

            let visibility = self
                .rasterizer
                .query_visibility(batch.bounds_min(), batch.bounds_max());
            if !visibility.visible {
                stats.batches_occluded += 1;
                continue;
            }

            if visibility.needs_clipping {
                let inside = self
                    .frustum
                    .map_or(true, |f| f.intersects_aabb(batch.bounds_min(), batch.bounds_max()));
                if !inside {
                    stats.batches_outside_frustum += 1;
                    continue;
                }
                self.rasterizer.rasterize::<true>(batch);
                stats.batches_clipped += 1;
            } else {
                self.rasterizer.rasterize::<false>(batch);
            }
            stats.batches_rasterized += 1;
        }

        log::debug!(
            "occlusion render: {} batches, {} rasterized ({} clipped), {} occluded, {} outside frustum",
            stats.batches_considered,
            stats.batches_rasterized,
            stats.batches_clipped,
            stats.batches_occluded,
            stats.batches_outside_frustum
        );
        stats
    }

    /// Share of a mesh's batches that are visible against the current depth.
    pub fn query_visibility(&self, mesh: &MeshOccluder) -> MeshVisibility {
        let visible_batches = mesh
            .batches()
            .iter()
            .filter(|b| self.rasterizer.query_visibility(b.bounds_min(), b.bounds_max()).visible)
            .count();
        let fraction = if mesh.batches().is_empty() {
            0.0
        } else {
            visible_batches as f32 / mesh.batches().len() as f32
        };

        MeshVisibility {
            fraction,
            visible_batches,
        }
    }

    pub fn query_box(&self, min: Vec3, max: Vec3) -> bool {
        self.rasterizer.query_visibility(min, max).visible
    }

    pub fn read_back_depth(&self, target: &mut [f32]) {
        self.rasterizer.read_back_depth(target);
    }

    #[inline]
    pub fn rasterizer(&self) -> &Rasterizer {
        &self.rasterizer
    }
}
