//! Vehicle model definitions
//!
//! - [`state`]: 17-dimensional state and 8-dimensional control vectors
//! - [`geometry`]: Rotor placement, spin directions, physical parameters

pub mod state;
pub mod geometry;

pub use state::*;
pub use geometry::*;
