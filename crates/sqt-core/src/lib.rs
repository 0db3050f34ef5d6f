#![forbid(unsafe_code)]

pub mod cache;
pub mod coords;
pub mod decompose;
pub mod error;
pub mod factors;
pub mod geom;
pub mod qgrid;
pub mod selection;
pub mod special;
pub mod traj;

pub use cache::{CoordCache, CoordEntry};
pub use coords::{CoordSet, Representation};
pub use decompose::{EvenDecomposition, ModuloDecomposition, PartitionPlan};
pub use error::{ScatterError, ScatterResult};
pub use factors::ScatterFactors;
pub use geom::Vec3;
pub use qgrid::{shells, QShell};
pub use selection::Selection;
pub use traj::{FrameSource, InMemoryFrames};
