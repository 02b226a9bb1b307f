/// Soft Occlusion - software occlusion culling for real-time renderers
/// Bakes meshes into quantized occluders, rasterizes them into a
/// hierarchical depth buffer and answers bounding-box visibility queries
pub mod camera;
pub mod culler;
pub mod geometry;
pub mod occluder;
pub mod perf;
pub mod rendering;

pub use camera::{Camera, Frustum, Projection};
pub use culler::{ConfigError, CullerConfig, MeshVisibility, OcclusionCuller, RenderStats};
pub use geometry::Aabb;
pub use occluder::{BatchingConfig, MeshOccluder, MeshValidationError, Occluder};
pub use perf::{CounterSnapshot, FunctionCounters, FUNCTION_COUNTERS};
pub use rendering::{BoxVisibility, NearPlanePolicy, Rasterizer};
