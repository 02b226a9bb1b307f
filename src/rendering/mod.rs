/// Software occlusion rasterization
/// Blocked 16-bit depth buffer with hierarchical Z and table-driven coverage
pub mod depth;
pub mod hiz_buffer;
pub mod lanes;
pub mod raster_table;
pub mod rasterizer;

pub use depth::{compress, decompress_float, DEPTH_CLEAR};
pub use hiz_buffer::{DepthBlock, HiZBuffer, HIZ_BLOCK_SIZE};
pub use lanes::{F32x4, F32x8, LaneGroup, LaneVec4};
pub use raster_table::RasterTable;
pub use rasterizer::{BoxVisibility, NearPlanePolicy, Rasterizer};
