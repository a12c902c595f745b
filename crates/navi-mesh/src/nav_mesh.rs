//! Navigation mesh implementation
//!
//! The navigation mesh is an arena of tiles. Each tile owns its polygons,
//! vertices, detail triangles, bounding-volume tree and off-mesh connections.
//! Polygons are addressed by [`PolyRef`] handles that pack a tile salt, a tile
//! index and a polygon index; a handle is only valid while its salt matches
//! the salt of the tile occupying the slot.
//!
//! Adjacency is stored as [`Link`] records built when a tile is added: internal
//! links from the polygon neighbour data, links across tile portals to already
//! loaded neighbours, and links to and from off-mesh connection polygons.

use std::collections::HashMap;

use super::binary_format;
use super::{
    NavMeshParams, PolyFlags, PolyRef, PolyType, Status, EXT_LINK, LINK_SIDE_INTERNAL,
    MAX_VERTS_PER_POLY, OFFMESH_CON_BIDIR,
};
use navi_common::{
    closest_height_point_triangle, dist_pt_seg_sqr_2d, distance_pt_poly_edges_sqr, ilog2,
    next_pow2, opposite_tile, overlap_bounds, overlap_quant_bounds, point_in_polygon, vcopy,
    vlerp, vsub, Error, Result,
};

/// Detail triangle edge flag: the edge lies on the polygon boundary
const DETAIL_EDGE_BOUNDARY: u8 = 0x01;

/// Maximum polygons considered when snapping off-mesh endpoints to a tile
const MAX_SNAP_POLYS: usize = 128;

/// Maximum tile portals a single polygon edge can connect to
const MAX_PORTAL_CONNECTIONS: usize = 4;

/// Link between two polygons
#[derive(Debug, Clone, Copy)]
#[cfg_attr(
    feature = "serialization",
    derive(serde::Serialize, serde::Deserialize)
)]
pub struct Link {
    /// Reference to the connected polygon
    pub reference: PolyRef,
    /// Index of the next link in the polygon's list (None if last)
    pub next: Option<u32>,
    /// Index of the polygon edge that owns this link
    pub edge: u8,
    /// Tile side for portal links, `0xff` for links inside the tile
    pub side: u8,
    /// Start of the portal as a fraction of the edge (0..255)
    pub bmin: u8,
    /// End of the portal as a fraction of the edge (0..255)
    pub bmax: u8,
    /// Enters a one-way off-mesh connection from its end point
    pub reversed: bool,
}

impl Link {
    /// Creates a new link spanning the whole edge
    pub fn new(reference: PolyRef, edge: u8, side: u8) -> Self {
        Self {
            reference,
            next: None,
            edge,
            side,
            bmin: 0,
            bmax: 0,
            reversed: false,
        }
    }
}

/// Polygon in the navigation mesh
#[derive(Debug, Clone)]
#[cfg_attr(
    feature = "serialization",
    derive(serde::Serialize, serde::Deserialize)
)]
pub struct Poly {
    /// First link index
    pub first_link: Option<u32>,
    /// Vertex indices into the tile vertex array
    pub verts: [u16; MAX_VERTS_PER_POLY],
    /// Per-edge neighbour data: 0 for a border, `index + 1` for an internal
    /// neighbour, `EXT_LINK | side` for a tile portal
    pub neis: [u16; MAX_VERTS_PER_POLY],
    /// Flags for the polygon
    pub flags: PolyFlags,
    /// Number of vertices in the polygon
    pub vert_count: u8,
    /// Area id of the polygon
    pub area: u8,
    /// Polygon type
    pub poly_type: PolyType,
}

impl Poly {
    /// Creates a new polygon
    pub fn new(area: u8, poly_type: PolyType, flags: PolyFlags) -> Self {
        Self {
            first_link: None,
            verts: [0; MAX_VERTS_PER_POLY],
            neis: [0; MAX_VERTS_PER_POLY],
            flags,
            vert_count: 0,
            area,
            poly_type,
        }
    }

    /// Checks whether this polygon stands for an off-mesh connection
    #[inline]
    pub fn is_off_mesh_connection(&self) -> bool {
        self.poly_type == PolyType::OffMeshConnection
    }
}

/// Detail mesh sub-range for one polygon
#[derive(Debug, Clone, Default)]
#[cfg_attr(
    feature = "serialization",
    derive(serde::Serialize, serde::Deserialize)
)]
pub struct PolyDetail {
    /// Offset of the first detail vertex
    pub vert_base: u32,
    /// Offset of the first detail triangle
    pub tri_base: u32,
    /// Number of extra detail vertices
    pub vert_count: u8,
    /// Number of detail triangles
    pub tri_count: u8,
}

/// Bounding volume node with quantized bounds
#[derive(Debug, Clone, Default)]
#[cfg_attr(
    feature = "serialization",
    derive(serde::Serialize, serde::Deserialize)
)]
pub struct BVNode {
    pub bmin: [u16; 3],
    pub bmax: [u16; 3],
    /// Polygon index for leaves, negative escape offset for internal nodes
    pub i: i32,
}

/// Off-mesh connection
#[derive(Debug, Clone, Default)]
#[cfg_attr(
    feature = "serialization",
    derive(serde::Serialize, serde::Deserialize)
)]
pub struct OffMeshConnection {
    /// Start and end positions
    pub pos: [f32; 6],
    /// Snap radius of the endpoints
    pub rad: f32,
    /// Index of the polygon representing the connection
    pub poly: u16,
    /// Direction flags
    pub flags: u8,
    /// Tile side of the end point, `0xff` when it lands in the same tile
    pub side: u8,
    /// User-defined id
    pub user_id: u32,
}

impl OffMeshConnection {
    /// Gets the start position
    pub fn start_pos(&self) -> [f32; 3] {
        [self.pos[0], self.pos[1], self.pos[2]]
    }

    /// Gets the end position
    pub fn end_pos(&self) -> [f32; 3] {
        [self.pos[3], self.pos[4], self.pos[5]]
    }

    /// Checks if the connection can be taken from either end
    pub fn is_bidirectional(&self) -> bool {
        self.flags & OFFMESH_CON_BIDIR != 0
    }
}

/// Endpoints of an off-mesh connection, oriented for a traversal
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OffMeshEndPoints {
    /// Where the traversal enters the connection
    pub start: [f32; 3],
    /// Where the traversal leaves the connection
    pub end: [f32; 3],
    /// True when the traversal runs from the authored end to the authored start
    pub reversed: bool,
    /// True when the connection is authored as bidirectional
    pub bidirectional: bool,
}

/// Tile header information
#[derive(Debug, Clone, Default)]
#[cfg_attr(
    feature = "serialization",
    derive(serde::Serialize, serde::Deserialize)
)]
pub struct TileHeader {
    /// Tile grid x coordinate
    pub x: i32,
    /// Tile grid y coordinate
    pub y: i32,
    /// Tile layer
    pub layer: i32,
    pub user_id: u32,
    pub poly_count: i32,
    pub vert_count: i32,
    pub max_link_count: i32,
    pub detail_mesh_count: i32,
    pub detail_vert_count: i32,
    pub detail_tri_count: i32,
    pub bv_node_count: i32,
    pub off_mesh_con_count: i32,
    /// Index of the first off-mesh connection polygon
    pub off_mesh_base: i32,
    pub walkable_height: f32,
    pub walkable_radius: f32,
    pub walkable_climb: f32,
    /// Tile bounds
    pub bmin: [f32; 3],
    pub bmax: [f32; 3],
    /// Bounding volume quantization factor
    pub bv_quant_factor: f32,
}

/// Mesh tile in the navigation mesh
#[derive(Debug, Clone, Default)]
#[cfg_attr(
    feature = "serialization",
    derive(serde::Serialize, serde::Deserialize)
)]
pub struct MeshTile {
    /// Generation of the tile slot
    pub salt: u32,
    /// Tile header, `None` while the slot is free
    pub header: Option<TileHeader>,
    /// Polygons in the tile
    pub polys: Vec<Poly>,
    /// Vertices in the tile [x,y,z,...]
    pub verts: Vec<f32>,
    /// Links between polygons
    pub links: Vec<Link>,
    /// Detailed mesh data
    pub detail_meshes: Vec<PolyDetail>,
    /// Detailed mesh vertices [x,y,z,...]
    pub detail_verts: Vec<f32>,
    /// Detailed mesh triangles [a,b,c,edge_flags,...]
    pub detail_tris: Vec<u8>,
    /// Bounding volume tree nodes
    pub bv_tree: Vec<BVNode>,
    /// Off-mesh connections
    pub off_mesh_cons: Vec<OffMeshConnection>,
}

/// Iterator over the links of one polygon
pub struct PolyLinks<'a> {
    links: &'a [Link],
    next: Option<u32>,
}

impl<'a> Iterator for PolyLinks<'a> {
    type Item = &'a Link;

    fn next(&mut self) -> Option<Self::Item> {
        let link = self.links.get(self.next? as usize)?;
        self.next = link.next;
        Some(link)
    }
}

/// One triangle of a polygon's detail surface
struct DetailTri {
    verts: [[f32; 3]; 3],
    /// Local vertex indices, polygon vertices first
    idx: [u8; 3],
    /// Packed 2-bit edge flags
    flags: u8,
}

impl MeshTile {
    /// Creates a new empty mesh tile
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a tile occupies this slot
    pub fn is_loaded(&self) -> bool {
        self.header.is_some()
    }

    fn walkable_climb(&self) -> f32 {
        self.header.as_ref().map_or(0.0, |h| h.walkable_climb)
    }

    /// Gets a tile vertex
    #[inline]
    pub fn vert(&self, index: u16) -> [f32; 3] {
        let i = index as usize * 3;
        [self.verts[i], self.verts[i + 1], self.verts[i + 2]]
    }

    /// Iterates the links of a polygon
    pub fn poly_links(&self, poly: &Poly) -> PolyLinks<'_> {
        PolyLinks {
            links: &self.links,
            next: poly.first_link,
        }
    }

    /// Collects the vertices of a polygon into a packed buffer
    pub fn poly_verts(&self, poly: &Poly) -> ([f32; MAX_VERTS_PER_POLY * 3], usize) {
        let mut verts = [0.0; MAX_VERTS_PER_POLY * 3];
        let nv = poly.vert_count as usize;
        for i in 0..nv {
            verts[i * 3..i * 3 + 3].copy_from_slice(&self.vert(poly.verts[i]));
        }
        (verts, nv)
    }

    /// Computes the bounds of a polygon
    pub fn poly_bounds(&self, poly: &Poly) -> ([f32; 3], [f32; 3]) {
        let mut bmin = self.vert(poly.verts[0]);
        let mut bmax = bmin;
        for k in 1..poly.vert_count as usize {
            let v = self.vert(poly.verts[k]);
            for a in 0..3 {
                bmin[a] = bmin[a].min(v[a]);
                bmax[a] = bmax[a].max(v[a]);
            }
        }
        (bmin, bmax)
    }

    /// Pushes a link to the front of a polygon's link list
    pub(crate) fn push_link(&mut self, ip: usize, mut link: Link) {
        let idx = self.links.len() as u32;
        link.next = self.polys[ip].first_link;
        self.links.push(link);
        self.polys[ip].first_link = Some(idx);
    }

    /// Detail triangles of a ground polygon, or a fan over the polygon
    /// vertices when the tile carries no detail mesh for it
    fn detail_tris(&self, ip: usize) -> impl Iterator<Item = DetailTri> + '_ {
        let poly = &self.polys[ip];
        let nv = poly.vert_count as usize;
        let detail = self.detail_meshes.get(ip).filter(|pd| pd.tri_count > 0);
        let count = match detail {
            Some(pd) => pd.tri_count as usize,
            None => nv.saturating_sub(2),
        };

        (0..count).map(move |i| match detail {
            Some(pd) => {
                let t = (pd.tri_base as usize + i) * 4;
                let tri = &self.detail_tris[t..t + 4];
                let mut verts = [[0.0; 3]; 3];
                for k in 0..3 {
                    let v = tri[k] as usize;
                    verts[k] = if v < nv {
                        self.vert(poly.verts[v])
                    } else {
                        let d = (pd.vert_base as usize + (v - nv)) * 3;
                        vcopy(&self.detail_verts[d..d + 3])
                    };
                }
                DetailTri {
                    verts,
                    idx: [tri[0], tri[1], tri[2]],
                    flags: tri[3],
                }
            }
            None => {
                let j = i + 1;
                let mut flags = DETAIL_EDGE_BOUNDARY << 2;
                if j == 1 {
                    flags |= DETAIL_EDGE_BOUNDARY;
                }
                if j + 1 == nv - 1 {
                    flags |= DETAIL_EDGE_BOUNDARY << 4;
                }
                DetailTri {
                    verts: [
                        self.vert(poly.verts[0]),
                        self.vert(poly.verts[j]),
                        self.vert(poly.verts[j + 1]),
                    ],
                    idx: [0, j as u8, (j + 1) as u8],
                    flags,
                }
            }
        })
    }

    /// Closest point on the detail edges of a polygon, measured on the XZ plane
    pub fn closest_point_on_detail_edges(
        &self,
        ip: usize,
        pos: &[f32; 3],
        only_boundary: bool,
    ) -> [f32; 3] {
        const ANY_BOUNDARY_EDGE: u8 =
            DETAIL_EDGE_BOUNDARY | (DETAIL_EDGE_BOUNDARY << 2) | (DETAIL_EDGE_BOUNDARY << 4);

        let mut dmin = f32::MAX;
        let mut best: Option<([f32; 3], [f32; 3], f32)> = None;

        for tri in self.detail_tris(ip) {
            if only_boundary && (tri.flags & ANY_BOUNDARY_EDGE) == 0 {
                continue;
            }

            let mut j = 2;
            for k in 0..3 {
                let edge_flags = (tri.flags >> (j * 2)) & 0x3;
                // Skip internal edges when looking at the boundary, and inner
                // edges that are visited from the other triangle.
                if (edge_flags & DETAIL_EDGE_BOUNDARY) == 0
                    && (only_boundary || tri.idx[j] < tri.idx[k])
                {
                    j = k;
                    continue;
                }

                let (d, t) = dist_pt_seg_sqr_2d(pos, &tri.verts[j], &tri.verts[k]);
                if d < dmin {
                    dmin = d;
                    best = Some((tri.verts[j], tri.verts[k], t));
                }
                j = k;
            }
        }

        match best {
            Some((pmin, pmax, t)) => vlerp(&pmin, &pmax, t),
            None => *pos,
        }
    }

    /// Height of the polygon surface at the XZ location of `pos`.
    ///
    /// Off-mesh connection polygons interpolate along the connection segment.
    /// Returns `None` when `pos` is outside a ground polygon.
    pub fn get_poly_height(&self, ip: usize, pos: &[f32; 3]) -> Option<f32> {
        let poly = &self.polys[ip];

        if poly.is_off_mesh_connection() {
            let v0 = self.vert(poly.verts[0]);
            let v1 = self.vert(poly.verts[1]);
            let (_, t) = dist_pt_seg_sqr_2d(pos, &v0, &v1);
            return Some(v0[1] + (v1[1] - v0[1]) * t);
        }

        let (verts, nv) = self.poly_verts(poly);
        if !point_in_polygon(pos, &verts, nv) {
            return None;
        }

        for tri in self.detail_tris(ip) {
            if let Some(h) =
                closest_height_point_triangle(pos, &tri.verts[0], &tri.verts[1], &tri.verts[2])
            {
                return Some(h);
            }
        }

        // Degenerate triangles or a point exactly on an edge
        Some(self.closest_point_on_detail_edges(ip, pos, false)[1])
    }

    /// Closest point on a polygon, and whether `pos` lies over it
    pub fn closest_point_on_poly(&self, ip: usize, pos: &[f32; 3]) -> ([f32; 3], bool) {
        if let Some(h) = self.get_poly_height(ip, pos) {
            return ([pos[0], h, pos[2]], true);
        }

        let poly = &self.polys[ip];
        if poly.is_off_mesh_connection() {
            let v0 = self.vert(poly.verts[0]);
            let v1 = self.vert(poly.verts[1]);
            let (_, t) = dist_pt_seg_sqr_2d(pos, &v0, &v1);
            return (vlerp(&v0, &v1, t), false);
        }

        (self.closest_point_on_detail_edges(ip, pos, true), false)
    }

    /// Closest point on the boundary of a polygon; `pos` itself when inside
    pub fn closest_point_on_poly_boundary(&self, ip: usize, pos: &[f32; 3]) -> [f32; 3] {
        let (verts, nv) = self.poly_verts(&self.polys[ip]);
        let mut edged = [0.0; MAX_VERTS_PER_POLY];
        let mut edget = [0.0; MAX_VERTS_PER_POLY];

        if nv == 0 || distance_pt_poly_edges_sqr(pos, &verts, nv, &mut edged, &mut edget) {
            return *pos;
        }

        let mut imin = 0;
        for i in 1..nv {
            if edged[i] < edged[imin] {
                imin = i;
            }
        }
        let va = &verts[imin * 3..imin * 3 + 3];
        let vb = &verts[((imin + 1) % nv) * 3..((imin + 1) % nv) * 3 + 3];
        vlerp(va, vb, edget[imin])
    }

    /// Indices of the ground polygons whose bounds overlap the query box
    pub fn query_polygons(&self, qmin: &[f32; 3], qmax: &[f32; 3]) -> Vec<usize> {
        let mut result = Vec::new();
        let Some(header) = &self.header else {
            return result;
        };

        if !self.bv_tree.is_empty() {
            let tbmin = header.bmin;
            let tbmax = header.bmax;
            let qfac = header.bv_quant_factor;

            // Clamp query box to world box and quantize
            let mut bmin = [0u16; 3];
            let mut bmax = [0u16; 3];
            for a in 0..3 {
                let lo = qmin[a].clamp(tbmin[a], tbmax[a]) - tbmin[a];
                let hi = qmax[a].clamp(tbmin[a], tbmax[a]) - tbmin[a];
                bmin[a] = ((qfac * lo) as u16) & 0xfffe;
                bmax[a] = ((qfac * hi + 1.0) as u16) | 1;
            }

            let mut n = 0;
            while n < self.bv_tree.len() {
                let node = &self.bv_tree[n];
                let overlap = overlap_quant_bounds(&bmin, &bmax, &node.bmin, &node.bmax);
                let is_leaf = node.i >= 0;

                if is_leaf && overlap {
                    result.push(node.i as usize);
                }

                if overlap || is_leaf {
                    n += 1;
                } else {
                    n += (-node.i) as usize;
                }
            }
        } else {
            for (ip, poly) in self.polys.iter().enumerate() {
                if poly.is_off_mesh_connection() {
                    continue;
                }
                let (bmin, bmax) = self.poly_bounds(poly);
                if overlap_bounds(qmin, qmax, &bmin, &bmax) {
                    result.push(ip);
                }
            }
        }

        result
    }

    /// Finds the ground polygon nearest to `center` inside the search box.
    ///
    /// When the point lies over a polygon, the distance is the vertical gap
    /// minus the walkable climb (clamped at zero).
    pub fn find_nearest_poly(
        &self,
        center: &[f32; 3],
        half_extents: &[f32; 3],
    ) -> Option<(usize, [f32; 3])> {
        let bmin = vsub(center, half_extents);
        let bmax = [
            center[0] + half_extents[0],
            center[1] + half_extents[1],
            center[2] + half_extents[2],
        ];
        let climb = self.walkable_climb();

        let mut nearest = None;
        let mut nearest_dist = f32::MAX;
        for ip in self
            .query_polygons(&bmin, &bmax)
            .into_iter()
            .take(MAX_SNAP_POLYS)
        {
            let (closest, over) = self.closest_point_on_poly(ip, center);
            let d = nearest_distance(center, &closest, over, climb);
            if d < nearest_dist {
                nearest_dist = d;
                nearest = Some((ip, closest));
            }
        }
        nearest
    }

    /// Finds polygons in this tile whose portal edges on `side` touch the
    /// segment `va -> vb`. Returns polygon indices with the overlapping span.
    fn find_connecting_polys(
        &self,
        va: &[f32; 3],
        vb: &[f32; 3],
        side: i32,
    ) -> Vec<(usize, [f32; 2])> {
        let mut result = Vec::new();
        let (amin, amax) = calc_slab_end_points(va, vb, side);
        let apos = get_slab_coord(va, side);
        let climb = self.walkable_climb();
        let m = EXT_LINK | side as u16;

        for (ip, poly) in self.polys.iter().enumerate() {
            let nv = poly.vert_count as usize;
            for j in 0..nv {
                // Skip edges which do not point to the right side.
                if poly.neis[j] != m {
                    continue;
                }

                let vc = self.vert(poly.verts[j]);
                let vd = self.vert(poly.verts[(j + 1) % nv]);
                let bpos = get_slab_coord(&vc, side);

                if (apos - bpos).abs() > 0.01 {
                    continue;
                }

                let (bmin, bmax) = calc_slab_end_points(&vc, &vd, side);
                if !overlap_slabs(&amin, &amax, &bmin, &bmax, 0.01, climb) {
                    continue;
                }

                if result.len() < MAX_PORTAL_CONNECTIONS {
                    result.push((ip, [amin[0].max(bmin[0]), amax[0].min(bmax[0])]));
                }
                break;
            }
        }

        result
    }
}

/// Distance metric used when picking the nearest polygon
#[inline]
pub(crate) fn nearest_distance(center: &[f32; 3], closest: &[f32; 3], over: bool, climb: f32) -> f32 {
    let diff = vsub(center, closest);
    if over {
        let d = diff[1].abs() - climb;
        if d > 0.0 {
            d * d
        } else {
            0.0
        }
    } else {
        diff[0] * diff[0] + diff[1] * diff[1] + diff[2] * diff[2]
    }
}

fn get_slab_coord(va: &[f32; 3], side: i32) -> f32 {
    match side {
        0 | 4 => va[0],
        2 | 6 => va[2],
        _ => 0.0,
    }
}

/// Projects a portal edge onto the slab axis: `[along, height]` for both ends,
/// ordered along the axis
fn calc_slab_end_points(va: &[f32; 3], vb: &[f32; 3], side: i32) -> ([f32; 2], [f32; 2]) {
    let axis = match side {
        0 | 4 => 2,
        2 | 6 => 0,
        _ => return ([0.0; 2], [0.0; 2]),
    };
    if va[axis] < vb[axis] {
        ([va[axis], va[1]], [vb[axis], vb[1]])
    } else {
        ([vb[axis], vb[1]], [va[axis], va[1]])
    }
}

fn overlap_slabs(amin: &[f32; 2], amax: &[f32; 2], bmin: &[f32; 2], bmax: &[f32; 2], px: f32, py: f32) -> bool {
    // Shrink the segments a little so slabs touching at the end points do not connect.
    let minx = (amin[0] + px).max(bmin[0] + px);
    let maxx = (amax[0] - px).min(bmax[0] - px);
    if minx > maxx {
        return false;
    }

    // Check vertical overlap.
    let ad = (amax[1] - amin[1]) / (amax[0] - amin[0]);
    let ak = amin[1] - ad * amin[0];
    let bd = (bmax[1] - bmin[1]) / (bmax[0] - bmin[0]);
    let bk = bmin[1] - bd * bmin[0];
    let aminy = ad * minx + ak;
    let amaxy = ad * maxx + ak;
    let bminy = bd * minx + bk;
    let bmaxy = bd * maxx + bk;
    let dmin = bminy - aminy;
    let dmax = bmaxy - amaxy;

    // Crossing segments always overlap.
    if dmin * dmax < 0.0 {
        return true;
    }

    // Check for overlap at endpoints.
    let thr = (py * 2.0) * (py * 2.0);
    dmin * dmin <= thr || dmax * dmax <= thr
}

/// Navigation mesh made of tiles
#[derive(Debug)]
pub struct NavMesh {
    /// Navigation mesh parameters
    params: NavMeshParams,
    /// Tile slots, free slots have no header
    tiles: Vec<MeshTile>,
    /// Tile grid location lookup
    pos_lookup: HashMap<(i32, i32), Vec<usize>>,
    salt_bits: u32,
    tile_bits: u32,
    poly_bits: u32,
}

/// Links computed from shared borrows, applied afterwards
struct PendingOffMeshLink {
    con_poly: usize,
    land_poly: usize,
    land_pos: [f32; 3],
    bidirectional: bool,
}

impl NavMesh {
    /// Creates an empty navigation mesh
    pub fn new(params: NavMeshParams) -> Result<Self> {
        if params.origin.iter().any(|v| !v.is_finite()) {
            return Err(Error::Detour(Status::InvalidParam.to_string()));
        }

        if params.tile_width <= 0.0 || params.tile_height <= 0.0 {
            return Err(Error::Detour(Status::InvalidParam.to_string()));
        }

        if params.max_tiles <= 0 || params.max_polys_per_tile <= 0 {
            return Err(Error::Detour(Status::InvalidParam.to_string()));
        }

        let tile_bits = ilog2(next_pow2(params.max_tiles as u32));
        let poly_bits = ilog2(next_pow2(params.max_polys_per_tile as u32));
        // Only allow 31 salt bits, since the salt mask is calculated using 32bit uint and it will overflow.
        let salt_bits = 31u32.min(32u32.saturating_sub(tile_bits + poly_bits));
        if salt_bits < 10 {
            return Err(Error::Detour(Status::InvalidParam.to_string()));
        }

        let mut tiles = Vec::new();
        tiles.try_reserve_exact(params.max_tiles as usize)?;
        tiles.extend((0..params.max_tiles).map(|_| MeshTile {
            salt: 1,
            ..MeshTile::default()
        }));

        Ok(Self {
            params,
            tiles,
            pos_lookup: HashMap::new(),
            salt_bits,
            tile_bits,
            poly_bits,
        })
    }

    /// Gets the mesh parameters
    pub fn get_params(&self) -> &NavMeshParams {
        &self.params
    }

    /// Gets the maximum number of tiles
    pub fn get_max_tiles(&self) -> i32 {
        self.params.max_tiles
    }

    /// Gets a tile slot by index
    pub fn get_tile(&self, index: usize) -> Option<&MeshTile> {
        self.tiles.get(index)
    }

    /// Iterates over the loaded tiles
    pub fn tiles(&self) -> impl Iterator<Item = &MeshTile> {
        self.tiles.iter().filter(|t| t.is_loaded())
    }

    /// Number of loaded tiles
    pub fn tile_count(&self) -> usize {
        self.tiles().count()
    }

    /// Number of polygons across all loaded tiles
    pub fn poly_count(&self) -> usize {
        self.tiles().map(|t| t.polys.len()).sum()
    }

    /// Packs a salt, tile index and polygon index into a reference
    #[inline]
    pub fn encode_poly_ref(&self, salt: u32, tile: u32, poly: u32) -> PolyRef {
        PolyRef::new(
            (salt << (self.poly_bits + self.tile_bits)) | (tile << self.poly_bits) | poly,
        )
    }

    /// Unpacks a reference into salt, tile index and polygon index
    #[inline]
    pub fn decode_poly_ref(&self, reference: PolyRef) -> (u32, u32, u32) {
        let id = reference.id();
        let salt_mask = (1u32 << self.salt_bits) - 1;
        let tile_mask = (1u32 << self.tile_bits) - 1;
        let poly_mask = (1u32 << self.poly_bits) - 1;
        (
            (id >> (self.poly_bits + self.tile_bits)) & salt_mask,
            (id >> self.poly_bits) & tile_mask,
            id & poly_mask,
        )
    }

    /// Reference of polygon 0 in the tile at the given slot
    pub fn get_poly_ref_base(&self, tile_index: usize) -> PolyRef {
        let salt = self.tiles.get(tile_index).map_or(0, |t| t.salt);
        self.encode_poly_ref(salt, tile_index as u32, 0)
    }

    /// Resolves a reference into tile slot and polygon index
    pub fn decode_valid(&self, reference: PolyRef) -> Option<(usize, usize)> {
        if !reference.is_valid() {
            return None;
        }
        let (salt, it, ip) = self.decode_poly_ref(reference);
        let tile = self.tiles.get(it as usize)?;
        if !tile.is_loaded() || tile.salt != salt || ip as usize >= tile.polys.len() {
            return None;
        }
        Some((it as usize, ip as usize))
    }

    /// Checks that a reference resolves to a live polygon
    pub fn is_valid_poly_ref(&self, reference: PolyRef) -> bool {
        self.decode_valid(reference).is_some()
    }

    /// Gets the tile and polygon for a reference
    pub fn get_tile_and_poly_by_ref(&self, reference: PolyRef) -> Result<(&MeshTile, &Poly)> {
        let (it, ip) = self
            .decode_valid(reference)
            .ok_or(Error::Detour(Status::InvalidPolyRef.to_string()))?;
        let tile = &self.tiles[it];
        Ok((tile, &tile.polys[ip]))
    }

    /// Grid location of the tile containing a world position
    pub fn calc_tile_loc(&self, pos: &[f32; 3]) -> (i32, i32) {
        let tx = ((pos[0] - self.params.origin[0]) / self.params.tile_width).floor() as i32;
        let ty = ((pos[2] - self.params.origin[2]) / self.params.tile_height).floor() as i32;
        (tx, ty)
    }

    /// Slot indices of all tiles at a grid location (every layer)
    pub fn get_tiles_at(&self, x: i32, y: i32) -> &[usize] {
        self.pos_lookup.get(&(x, y)).map_or(&[], |v| v.as_slice())
    }

    /// Gets the tile at a grid location and layer
    pub fn get_tile_at(&self, x: i32, y: i32, layer: i32) -> Option<&MeshTile> {
        self.get_tiles_at(x, y)
            .iter()
            .map(|&i| &self.tiles[i])
            .find(|t| t.header.as_ref().is_some_and(|h| h.layer == layer))
    }

    fn get_neighbour_tiles_at(&self, x: i32, y: i32, side: i32) -> Vec<usize> {
        let (nx, ny) = match side {
            0 => (x + 1, y),
            1 => (x + 1, y + 1),
            2 => (x, y + 1),
            3 => (x - 1, y + 1),
            4 => (x - 1, y),
            5 => (x - 1, y - 1),
            6 => (x, y - 1),
            7 => (x + 1, y - 1),
            _ => (x, y),
        };
        self.get_tiles_at(nx, ny).to_vec()
    }

    /// Parses a tile blob and adds it to the mesh.
    ///
    /// With a non-null `last_ref` the tile is placed in the slot and salt that
    /// reference names, as stored in mesh set files. Returns the tile reference.
    pub fn add_tile(&mut self, data: &[u8], last_ref: PolyRef) -> Result<PolyRef> {
        let tile = binary_format::read_tile_data(data)?;
        self.add_mesh_tile(tile, last_ref)
    }

    /// Adds an already parsed tile and builds its links
    pub fn add_mesh_tile(&mut self, mut tile: MeshTile, last_ref: PolyRef) -> Result<PolyRef> {
        let header = tile
            .header
            .clone()
            .ok_or(Error::MalformedAsset(Status::DataCorrupted.to_string()))?;

        if header.poly_count as u64 > (1u64 << self.poly_bits) {
            log::error!(
                "tile ({}, {}) has {} polygons, mesh allows {}",
                header.x,
                header.y,
                header.poly_count,
                self.params.max_polys_per_tile
            );
            return Err(Status::DataCorrupted.into());
        }

        if self.get_tile_at(header.x, header.y, header.layer).is_some() {
            return Err(Status::AlreadyExists.into());
        }

        let tile_index = if last_ref.is_valid() {
            let (salt, it, _) = self.decode_poly_ref(last_ref);
            let it = it as usize;
            if it >= self.tiles.len() {
                return Err(Status::TileOutOfBounds.into());
            }
            if self.tiles[it].is_loaded() {
                return Err(Status::AlreadyExists.into());
            }
            if salt == 0 {
                return Err(Status::DataCorrupted.into());
            }
            tile.salt = salt;
            it
        } else {
            let it = self
                .tiles
                .iter()
                .position(|t| !t.is_loaded())
                .ok_or(Error::AllocationFailure("no free tile slots".to_string()))?;
            tile.salt = self.tiles[it].salt;
            it
        };

        tile.links.clear();
        tile.links
            .try_reserve(header.max_link_count.max(0) as usize)?;
        self.tiles[tile_index] = tile;
        self.pos_lookup
            .entry((header.x, header.y))
            .or_default()
            .push(tile_index);

        // Create connections within the tile.
        self.connect_int_links(tile_index);
        self.base_off_mesh_links(tile_index);
        self.connect_ext_off_mesh_links(tile_index, tile_index, -1);

        // Connect with layers in current tile.
        let layers: Vec<usize> = self
            .get_tiles_at(header.x, header.y)
            .iter()
            .copied()
            .filter(|&i| i != tile_index)
            .collect();
        for other in layers {
            self.connect_ext_links(tile_index, other, -1);
            self.connect_ext_links(other, tile_index, -1);
            self.connect_ext_off_mesh_links(tile_index, other, -1);
            self.connect_ext_off_mesh_links(other, tile_index, -1);
        }

        // Connect with neighbour tiles.
        for side in 0..8 {
            for other in self.get_neighbour_tiles_at(header.x, header.y, side) {
                let opposite = opposite_tile(side);
                self.connect_ext_links(tile_index, other, side);
                self.connect_ext_links(other, tile_index, opposite);
                self.connect_ext_off_mesh_links(tile_index, other, side);
                self.connect_ext_off_mesh_links(other, tile_index, opposite);
            }
        }

        let tile_ref = self.get_poly_ref_base(tile_index);
        log::debug!(
            "added tile ({}, {}, {}) at slot {} with {} polys and {} links",
            header.x,
            header.y,
            header.layer,
            tile_index,
            self.tiles[tile_index].polys.len(),
            self.tiles[tile_index].links.len()
        );
        Ok(tile_ref)
    }

    fn connect_int_links(&mut self, ti: usize) {
        let base = self.get_poly_ref_base(ti).id();
        let tile = &mut self.tiles[ti];

        for ip in 0..tile.polys.len() {
            tile.polys[ip].first_link = None;
            if tile.polys[ip].is_off_mesh_connection() {
                continue;
            }

            // Build edge links backwards so that the links will be in the
            // linked list from lowest index to highest.
            let nv = tile.polys[ip].vert_count as usize;
            for j in (0..nv).rev() {
                let nei = tile.polys[ip].neis[j];
                if nei == 0 || nei & EXT_LINK != 0 {
                    continue;
                }
                let reference = PolyRef::new(base | (nei - 1) as u32);
                tile.push_link(ip, Link::new(reference, j as u8, LINK_SIDE_INTERNAL));
            }
        }
    }

    fn base_off_mesh_links(&mut self, ti: usize) {
        let base = self.get_poly_ref_base(ti).id();
        let tile = &mut self.tiles[ti];
        let climb = tile.walkable_climb();

        for i in 0..tile.off_mesh_cons.len() {
            let con = &tile.off_mesh_cons[i];
            let con_poly = con.poly as usize;
            let rad = con.rad;
            let p = con.start_pos();

            let Some((land_poly, nearest)) = tile.find_nearest_poly(&p, &[rad, climb, rad]) else {
                continue;
            };
            // The nearest polygon may lie outside the connection radius.
            if sqr(nearest[0] - p[0]) + sqr(nearest[2] - p[2]) > sqr(rad) {
                continue;
            }

            // Make sure the location is on the current mesh.
            let v = tile.polys[con_poly].verts[0] as usize * 3;
            tile.verts[v..v + 3].copy_from_slice(&nearest);

            tile.push_link(
                con_poly,
                Link::new(PolyRef::new(base | land_poly as u32), 0, LINK_SIDE_INTERNAL),
            );
            // The start point always links back to the connection.
            tile.push_link(
                land_poly,
                Link::new(PolyRef::new(base | con_poly as u32), 0xff, LINK_SIDE_INTERNAL),
            );
        }
    }

    fn connect_ext_links(&mut self, ti: usize, target: usize, side: i32) {
        let target_base = self.get_poly_ref_base(target).id();
        let mut pending = Vec::new();

        {
            let tile = &self.tiles[ti];
            let target_tile = &self.tiles[target];

            for (ip, poly) in tile.polys.iter().enumerate() {
                let nv = poly.vert_count as usize;
                for j in 0..nv {
                    // Skip non-portal edges.
                    if poly.neis[j] & EXT_LINK == 0 {
                        continue;
                    }
                    let dir = (poly.neis[j] & 0xff) as i32;
                    if side != -1 && dir != side {
                        continue;
                    }

                    let va = tile.vert(poly.verts[j]);
                    let vb = tile.vert(poly.verts[(j + 1) % nv]);
                    for (nei, span) in target_tile.find_connecting_polys(&va, &vb, opposite_tile(dir))
                    {
                        let mut link =
                            Link::new(PolyRef::new(target_base | nei as u32), j as u8, dir as u8);

                        // Compress portal limits to a byte value.
                        let axis = match dir {
                            0 | 4 => Some(2),
                            2 | 6 => Some(0),
                            _ => None,
                        };
                        if let Some(axis) = axis {
                            let mut tmin = (span[0] - va[axis]) / (vb[axis] - va[axis]);
                            let mut tmax = (span[1] - va[axis]) / (vb[axis] - va[axis]);
                            if tmin > tmax {
                                std::mem::swap(&mut tmin, &mut tmax);
                            }
                            link.bmin = (tmin.clamp(0.0, 1.0) * 255.0).round() as u8;
                            link.bmax = (tmax.clamp(0.0, 1.0) * 255.0).round() as u8;
                        }
                        pending.push((ip, link));
                    }
                }
            }
        }

        let tile = &mut self.tiles[ti];
        for (ip, link) in pending {
            tile.push_link(ip, link);
        }
    }

    /// Connects off-mesh connections of `target` whose end point lands in `ti`
    fn connect_ext_off_mesh_links(&mut self, ti: usize, target: usize, side: i32) {
        let opposite_side = if side == -1 {
            LINK_SIDE_INTERNAL
        } else {
            opposite_tile(side) as u8
        };
        let tile_base = self.get_poly_ref_base(ti).id();
        let target_base = self.get_poly_ref_base(target).id();
        let mut pending = Vec::new();

        {
            let tile = &self.tiles[ti];
            let target_tile = &self.tiles[target];
            let climb = target_tile.walkable_climb();

            for con in &target_tile.off_mesh_cons {
                if con.side != opposite_side {
                    continue;
                }
                let con_poly = con.poly as usize;
                // Skip connections whose start could not be connected at all.
                if target_tile.polys[con_poly].first_link.is_none() {
                    continue;
                }

                let p = con.end_pos();
                let Some((land_poly, nearest)) =
                    tile.find_nearest_poly(&p, &[con.rad, climb, con.rad])
                else {
                    continue;
                };
                if sqr(nearest[0] - p[0]) + sqr(nearest[2] - p[2]) > sqr(con.rad) {
                    continue;
                }

                pending.push(PendingOffMeshLink {
                    con_poly,
                    land_poly,
                    land_pos: nearest,
                    bidirectional: con.is_bidirectional(),
                });
            }
        }

        for link in pending {
            let target_tile = &mut self.tiles[target];
            let v = target_tile.polys[link.con_poly].verts[1] as usize * 3;
            target_tile.verts[v..v + 3].copy_from_slice(&link.land_pos);
            target_tile.push_link(
                link.con_poly,
                Link::new(PolyRef::new(tile_base | link.land_poly as u32), 1, opposite_side),
            );

            // One-way connections get a reversed back link that only
            // filters allowing reverse traversal will follow.
            let back_side = if side == -1 {
                LINK_SIDE_INTERNAL
            } else {
                side as u8
            };
            let mut back = Link::new(
                PolyRef::new(target_base | link.con_poly as u32),
                0xff,
                back_side,
            );
            back.reversed = !link.bidirectional;
            self.tiles[ti].push_link(link.land_poly, back);
        }
    }

    /// Gets the off-mesh connection record behind a connection polygon
    pub fn get_off_mesh_connection_by_ref(&self, reference: PolyRef) -> Result<&OffMeshConnection> {
        let (it, ip) = self
            .decode_valid(reference)
            .ok_or(Error::Detour(Status::InvalidPolyRef.to_string()))?;
        let tile = &self.tiles[it];
        if !tile.polys[ip].is_off_mesh_connection() {
            return Err(Error::Detour(Status::InvalidParam.to_string()));
        }
        let base = tile
            .header
            .as_ref()
            .map_or(0, |h| h.off_mesh_base.max(0) as usize);
        ip.checked_sub(base)
            .and_then(|idx| tile.off_mesh_cons.get(idx))
            .ok_or(Error::Detour(Status::InvalidParam.to_string()))
    }

    /// Gets the endpoints of an off-mesh connection polygon, ordered for a
    /// traversal that arrives from `prev_ref`.
    ///
    /// The link on edge 0 points at the polygon the start endpoint landed on.
    /// If the traversal does not come from that polygon the endpoints are
    /// swapped. With no previous polygon the authored order is kept.
    pub fn get_off_mesh_connection_poly_end_points(
        &self,
        prev_ref: Option<PolyRef>,
        poly_ref: PolyRef,
    ) -> Result<OffMeshEndPoints> {
        let (it, ip) = self
            .decode_valid(poly_ref)
            .ok_or(Error::Detour(Status::InvalidPolyRef.to_string()))?;
        let tile = &self.tiles[it];
        let poly = &tile.polys[ip];

        if !poly.is_off_mesh_connection() {
            return Err(Error::Detour(Status::Failure.to_string()));
        }

        let reversed = match prev_ref {
            None => false,
            Some(prev) => tile
                .poly_links(poly)
                .find(|l| l.edge == 0)
                .is_some_and(|l| l.reference != prev),
        };
        let (i0, i1) = if reversed { (1, 0) } else { (0, 1) };
        let bidirectional = self
            .get_off_mesh_connection_by_ref(poly_ref)
            .map(|c| c.is_bidirectional())
            .unwrap_or(false);

        Ok(OffMeshEndPoints {
            start: tile.vert(poly.verts[i0]),
            end: tile.vert(poly.verts[i1]),
            reversed,
            bidirectional,
        })
    }
}

#[inline]
fn sqr(v: f32) -> f32 {
    v * v
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(max_tiles: i32, max_polys: i32) -> NavMeshParams {
        NavMeshParams {
            origin: [0.0, 0.0, 0.0],
            tile_width: 10.0,
            tile_height: 10.0,
            max_tiles,
            max_polys_per_tile: max_polys,
        }
    }

    #[test]
    fn test_poly_ref_encoding() -> Result<()> {
        let nav_mesh = NavMesh::new(params(128, 1024))?;
        let reference = nav_mesh.encode_poly_ref(5, 42, 123);
        assert_eq!(nav_mesh.decode_poly_ref(reference), (5, 42, 123));
        // 7 tile bits and 10 poly bits leave 15 salt bits
        assert_eq!(nav_mesh.salt_bits, 15);
        Ok(())
    }

    #[test]
    fn test_invalid_params() {
        let mut p = params(128, 1024);
        p.origin = [f32::INFINITY, 0.0, 0.0];
        assert!(NavMesh::new(p).is_err());

        let mut p = params(128, 1024);
        p.tile_width = -1.0;
        assert!(NavMesh::new(p).is_err());

        assert!(NavMesh::new(params(0, 16)).is_err());

        // 2^12 tiles and 2^12 polys leave only 8 salt bits
        assert!(NavMesh::new(params(4096, 4096)).is_err());
    }

    #[test]
    fn test_invalid_refs() -> Result<()> {
        let nav_mesh = NavMesh::new(params(4, 16))?;
        assert!(!nav_mesh.is_valid_poly_ref(PolyRef::NULL));
        // Slot exists but holds no tile
        assert!(!nav_mesh.is_valid_poly_ref(nav_mesh.encode_poly_ref(1, 0, 0)));
        assert!(nav_mesh.get_tile_and_poly_by_ref(PolyRef::new(1)).is_err());
        Ok(())
    }

    #[test]
    fn test_overlap_slabs() {
        // Two collinear edges sharing the middle section
        assert!(overlap_slabs(
            &[0.0, 0.0],
            &[2.0, 0.0],
            &[1.0, 0.0],
            &[3.0, 0.0],
            0.01,
            0.5
        ));
        // Touching only at an end point
        assert!(!overlap_slabs(
            &[0.0, 0.0],
            &[1.0, 0.0],
            &[1.0, 0.0],
            &[2.0, 0.0],
            0.01,
            0.5
        ));
        // Same span but far apart vertically
        assert!(!overlap_slabs(
            &[0.0, 0.0],
            &[2.0, 0.0],
            &[0.0, 5.0],
            &[2.0, 5.0],
            0.01,
            0.5
        ));
    }

    #[test]
    fn test_nav_mesh_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<NavMesh>();
    }
}
