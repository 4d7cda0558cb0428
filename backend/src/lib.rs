pub mod emptiness;
pub mod output_format;
pub mod partition;
pub mod patch_name;
pub mod pyramid;
pub mod run_log;
pub mod tile_grid;
pub mod tiler;

mod extent;
pub use extent::{Coords, Extent};
