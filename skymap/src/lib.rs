//! Fixed-resolution maps over the celestial sphere.
//!
//! Provides the pixel-map container shared by every map in a reduction run,
//! the direction-to-pixel projector, and a FITS codec for reading and writing
//! several co-indexed maps in a single file.

pub mod fits;
pub mod pixelmap;
pub mod projector;

pub use fits::{read_map, write_maps, MapIoError};
pub use pixelmap::{GeometryMismatch, PixelMap};
pub use projector::{ProjectorError, SkyProjector};
