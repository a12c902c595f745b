//! Follow-path smoothing over navigation meshes
//!
//! A [`NaviProvider`] owns the mesh of one area and answers
//! [`NaviProvider::find_follow_path`] requests: it finds a polygon corridor
//! between two points and walks it in fixed steps, keeping the corridor in
//! sync with the walked position and crossing off-mesh connections on the
//! way. A [`NaviRegistry`] keeps one provider per area.

pub mod config;
pub mod corridor;
pub mod off_mesh;
pub mod provider;
pub mod registry;
pub mod smoother;
pub mod steering;


pub use config::{FilterConfig, NaviConfig, OffMeshDirection, SteerParams};
pub use corridor::Corridor;
pub use off_mesh::OffMeshConnectionHandler;
pub use provider::NaviProvider;
pub use registry::NaviRegistry;
pub use smoother::{PathSmoother, SmoothState};
pub use steering::SteerTarget;

/// Number of points requested from the straight path when steering
pub const MAX_STEER_POINTS: usize = 3;

/// Capacity of the visited list of one surface move
pub const MAX_VISITED: usize = 16;

/// Neighbours examined by the shortcut fixup
pub const MAX_NEIGHBOURS: usize = 16;

/// Corridor entries the shortcut fixup looks ahead
pub const MAX_LOOK_AHEAD: usize = 6;
