//! Tiled navigation mesh storage and polygon queries
//!
//! A [`NavMesh`] owns the tiles of one area: polygons, vertices, detail
//! triangles, bounding-volume trees, off-mesh connections and the runtime link
//! graph built when a tile is added. [`NavMeshQuery`] performs the searches
//! that run against a loaded mesh: nearest polygon, A* corridor search,
//! straight-path extraction, surface-constrained moves and height queries.

use bitflags::bitflags;

pub mod binary_format;
pub mod nav_mesh;
pub mod nav_mesh_query;
pub mod node_pool;
pub mod status;

#[cfg(any(test, feature = "test-helpers"))]
pub mod test_mesh_helpers;

#[cfg(test)]
mod nav_mesh_query_tests;
#[cfg(test)]
mod off_mesh_connection_tests;

pub use binary_format::{load_nav_mesh_set, read_nav_mesh_set};
pub use nav_mesh::{
    BVNode, Link, MeshTile, NavMesh, OffMeshConnection, Poly, PolyDetail, TileHeader,
};
pub use nav_mesh_query::{NavMeshQuery, StraightPathPoint};
pub use status::Status;

/// Maximum number of vertices per navigation polygon
pub const MAX_VERTS_PER_POLY: usize = 6;

/// Neighbour flag marking a polygon edge that is a portal to another tile
pub const EXT_LINK: u16 = 0x8000;

/// Link side value for links that stay inside one tile
pub const LINK_SIDE_INTERNAL: u8 = 0xff;

/// Off-mesh connection flag: traversable in both directions
pub const OFFMESH_CON_BIDIR: u8 = 1;

/// Number of distinct polygon area ids
pub const MAX_AREAS: usize = 64;

/// Reference to a polygon in the navigation mesh
///
/// Encodes the tile salt, tile index and polygon index. The bit layout depends
/// on the mesh parameters, see [`NavMesh::encode_poly_ref`]. Zero is the null
/// reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
#[cfg_attr(
    feature = "serialization",
    derive(serde::Serialize, serde::Deserialize)
)]
pub struct PolyRef(u32);

impl PolyRef {
    pub const NULL: PolyRef = PolyRef(0);

    /// Creates a new polygon reference
    pub fn new(id: u32) -> Self {
        Self(id)
    }

    /// Gets the raw id
    pub fn id(&self) -> u32 {
        self.0
    }

    /// Checks if the reference is non-null
    pub fn is_valid(&self) -> bool {
        self.0 != 0
    }
}

impl From<u32> for PolyRef {
    fn from(id: u32) -> Self {
        Self(id)
    }
}

impl std::fmt::Display for PolyRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:#010x}", self.0)
    }
}

bitflags! {
    /// Polygon flags tested by query filters
    ///
    /// The named bits are the conventional ones; assets may carry any 16-bit
    /// value and every bit is preserved.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    #[cfg_attr(
        feature = "serialization",
        derive(serde::Serialize, serde::Deserialize)
    )]
    pub struct PolyFlags: u16 {
        /// Ability to walk (ground, grass, road)
        const WALK = 0x01;
        /// Ability to swim (water)
        const SWIM = 0x02;
        /// Ability to move through doors
        const DOOR = 0x04;
        /// Ability to jump
        const JUMP = 0x08;
        /// Disabled polygon
        const DISABLED = 0x10;
        /// All abilities
        const ALL = 0xffff;
    }
}

/// Polygon type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(
    feature = "serialization",
    derive(serde::Serialize, serde::Deserialize)
)]
pub enum PolyType {
    /// Regular ground polygon
    Ground = 0,
    /// Two-vertex polygon standing for an off-mesh connection
    OffMeshConnection = 1,
}

bitflags! {
    /// Flags attached to points returned by straight-path extraction
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct StraightPathFlags: u8 {
        /// The point is the start of the path
        const START = 0x01;
        /// The point is the end of the path
        const END = 0x02;
        /// The point is the start of an off-mesh connection
        const OFFMESH_CONNECTION = 0x04;
    }
}

/// Configuration parameters for a tiled navigation mesh
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(
    feature = "serialization",
    derive(serde::Serialize, serde::Deserialize)
)]
pub struct NavMeshParams {
    /// World-space origin of the tile grid
    pub origin: [f32; 3],
    /// Width of each tile along the x-axis
    pub tile_width: f32,
    /// Depth of each tile along the z-axis
    pub tile_height: f32,
    /// Maximum number of tiles the mesh can hold
    pub max_tiles: i32,
    /// Maximum number of polygons each tile can hold
    pub max_polys_per_tile: i32,
}

/// Decides which polygons are traversable and what crossing them costs
#[derive(Debug, Clone)]
pub struct QueryFilter {
    /// A polygon must have at least one of these flags
    pub include_flags: PolyFlags,
    /// A polygon must have none of these flags
    pub exclude_flags: PolyFlags,
    /// Cost multiplier per area id
    pub area_cost: [f32; MAX_AREAS],
    /// Lets one-way off-mesh connections be taken from their end point
    pub reverse_one_way: bool,
}

impl Default for QueryFilter {
    fn default() -> Self {
        Self {
            include_flags: PolyFlags::ALL,
            exclude_flags: PolyFlags::empty(),
            area_cost: [1.0; MAX_AREAS],
            reverse_one_way: false,
        }
    }
}

impl QueryFilter {
    /// Creates a filter with the given include and exclude masks
    pub fn new(include_flags: PolyFlags, exclude_flags: PolyFlags) -> Self {
        Self {
            include_flags,
            exclude_flags,
            ..Default::default()
        }
    }

    /// Checks whether a polygon may be traversed
    #[inline]
    pub fn pass_filter(&self, poly: &Poly) -> bool {
        poly.flags.intersects(self.include_flags) && !poly.flags.intersects(self.exclude_flags)
    }

    /// Checks whether a link may be followed
    #[inline]
    pub fn pass_link(&self, link: &Link) -> bool {
        !link.reversed || self.reverse_one_way
    }

    /// Cost of moving from `pa` to `pb` while on a polygon of the given area
    #[inline]
    pub fn get_cost(&self, pa: &[f32; 3], pb: &[f32; 3], area: u8) -> f32 {
        navi_common::vdist(pa, pb) * self.area_cost[(area as usize) & (MAX_AREAS - 1)]
    }

    /// Sets the cost multiplier of an area
    pub fn set_area_cost(&mut self, area: u8, cost: f32) {
        self.area_cost[(area as usize) & (MAX_AREAS - 1)] = cost;
    }
}
