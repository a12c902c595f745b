//! Synthetic mesh builders for tests
//!
//! Tiles are rectangular grids of quads. Every walkable cell becomes one
//! polygon wound the way baked meshes are, so funnel and portal code sees the
//! same left/right orientation it sees on real assets. Builders serialise to
//! tile blobs and mesh set files through the regular writer.

use std::fs;
use std::path::{Path, PathBuf};

use crate::binary_format::{write_nav_mesh_set, write_tile_data};
use crate::nav_mesh::{BVNode, MeshTile, OffMeshConnection, Poly, PolyDetail, TileHeader};
use crate::{
    NavMesh, NavMeshParams, PolyFlags, PolyRef, PolyType, EXT_LINK, LINK_SIDE_INTERNAL,
    OFFMESH_CON_BIDIR,
};
use navi_common::Result;

/// Surface height of a grid tile
#[derive(Debug, Clone, Copy)]
pub enum Terrain {
    /// Constant height
    Flat(f32),
    /// Height rising linearly along x
    SlopeX { base: f32, grade: f32 },
    /// `low` before world x `at`, `high` from it onwards
    StepX { at: f32, low: f32, high: f32 },
}

impl Terrain {
    fn height(&self, x: f32) -> f32 {
        match *self {
            Terrain::Flat(h) => h,
            Terrain::SlopeX { base, grade } => base + grade * x,
            Terrain::StepX { at, low, high } => {
                if x < at {
                    low
                } else {
                    high
                }
            }
        }
    }
}

/// Detail surface emitted for each ground polygon
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DetailMode {
    /// No detail meshes; queries fall back to the polygon fan
    None,
    /// Two explicit triangles per quad
    Fan,
    /// Four triangles around a centre vertex raised by the given amount
    Center(f32),
}

#[derive(Debug, Clone)]
struct OffMeshLink {
    start: [f32; 3],
    end: [f32; 3],
    rad: f32,
    bidirectional: bool,
    user_id: u32,
}

/// Builder for a grid tile
#[derive(Debug, Clone)]
pub struct GridTileBuilder {
    tx: i32,
    ty: i32,
    layer: i32,
    cols: usize,
    rows: usize,
    cell_size: f32,
    origin: [f32; 3],
    terrain: Terrain,
    blocked: Vec<(usize, usize)>,
    flags: Vec<((usize, usize), PolyFlags)>,
    areas: Vec<((usize, usize), u8)>,
    off_mesh: Vec<OffMeshLink>,
    bv_tree: bool,
    detail: DetailMode,
    walkable_climb: f32,
}

impl GridTileBuilder {
    /// A tile at grid location `(tx, ty)` made of `cells` x `cells` quads
    pub fn new(tx: i32, ty: i32, cells: usize, cell_size: f32) -> Self {
        Self {
            tx,
            ty,
            layer: 0,
            cols: cells,
            rows: cells,
            cell_size,
            origin: [0.0; 3],
            terrain: Terrain::Flat(0.0),
            blocked: Vec::new(),
            flags: Vec::new(),
            areas: Vec::new(),
            off_mesh: Vec::new(),
            bv_tree: false,
            detail: DetailMode::None,
            walkable_climb: 0.9,
        }
    }

    /// World origin of the mesh the tile belongs to
    pub fn origin(mut self, origin: [f32; 3]) -> Self {
        self.origin = origin;
        self
    }

    /// Number of quads along z. Set it before blocking columns.
    pub fn rows(mut self, rows: usize) -> Self {
        self.rows = rows;
        self
    }

    pub fn layer(mut self, layer: i32) -> Self {
        self.layer = layer;
        self
    }

    pub fn terrain(mut self, terrain: Terrain) -> Self {
        self.terrain = terrain;
        self
    }

    /// Leaves the cell at column `col`, row `row` unwalkable
    pub fn block(mut self, col: usize, row: usize) -> Self {
        self.blocked.push((col, row));
        self
    }

    /// Blocks a whole column
    pub fn block_column(mut self, col: usize) -> Self {
        for row in 0..self.rows {
            self.blocked.push((col, row));
        }
        self
    }

    /// Blocks a whole row
    pub fn block_row(mut self, row: usize) -> Self {
        for col in 0..self.cols {
            self.blocked.push((col, row));
        }
        self
    }

    pub fn unblock(mut self, col: usize, row: usize) -> Self {
        self.blocked.retain(|&c| c != (col, row));
        self
    }

    pub fn cell_flags(mut self, col: usize, row: usize, flags: PolyFlags) -> Self {
        self.flags.push(((col, row), flags));
        self
    }

    pub fn cell_area(mut self, col: usize, row: usize, area: u8) -> Self {
        self.areas.push(((col, row), area));
        self
    }

    /// Adds an off-mesh connection authored from `start` to `end`
    pub fn off_mesh(mut self, start: [f32; 3], end: [f32; 3], rad: f32, bidirectional: bool) -> Self {
        let user_id = self.off_mesh.len() as u32 + 1;
        self.off_mesh.push(OffMeshLink {
            start,
            end,
            rad,
            bidirectional,
            user_id,
        });
        self
    }

    pub fn bv_tree(mut self, enabled: bool) -> Self {
        self.bv_tree = enabled;
        self
    }

    pub fn detail(mut self, mode: DetailMode) -> Self {
        self.detail = mode;
        self
    }

    /// World width of the tile along x
    pub fn tile_size(&self) -> f32 {
        self.cols as f32 * self.cell_size
    }

    /// World depth of the tile along z
    pub fn tile_depth(&self) -> f32 {
        self.rows as f32 * self.cell_size
    }

    fn tile_min(&self) -> [f32; 2] {
        [
            self.origin[0] + self.tx as f32 * self.tile_size(),
            self.origin[2] + self.ty as f32 * self.tile_depth(),
        ]
    }

    fn is_walkable(&self, col: usize, row: usize) -> bool {
        !self.blocked.contains(&(col, row))
    }

    fn vert_index(&self, col: usize, row: usize) -> u16 {
        (row * (self.cols + 1) + col) as u16
    }

    /// Side of the tile an off-mesh end point lands in, `0xff` for this tile
    fn landing_side(&self, pos: &[f32; 3]) -> u8 {
        let ex = ((pos[0] - self.origin[0]) / self.tile_size()).floor() as i32 - self.tx;
        let ey = ((pos[2] - self.origin[2]) / self.tile_depth()).floor() as i32 - self.ty;
        match (ex.signum(), ey.signum()) {
            (1, 0) => 0,
            (1, 1) => 1,
            (0, 1) => 2,
            (-1, 1) => 3,
            (-1, 0) => 4,
            (-1, -1) => 5,
            (0, -1) => 6,
            (1, -1) => 7,
            _ => LINK_SIDE_INTERNAL,
        }
    }

    /// Builds the tile in memory
    pub fn build(&self) -> MeshTile {
        let (nc, nr) = (self.cols, self.rows);
        let [min_x, min_z] = self.tile_min();

        let mut verts = Vec::with_capacity((nc + 1) * (nr + 1) * 3);
        for row in 0..=nr {
            for col in 0..=nc {
                let x = min_x + col as f32 * self.cell_size;
                let z = min_z + row as f32 * self.cell_size;
                verts.extend_from_slice(&[x, self.terrain.height(x), z]);
            }
        }

        let mut cell_poly = vec![None; nc * nr];
        let mut next = 0u16;
        for row in 0..nr {
            for col in 0..nc {
                if self.is_walkable(col, row) {
                    cell_poly[row * nc + col] = Some(next);
                    next += 1;
                }
            }
        }
        let poly_at = |col: isize, row: isize| -> Option<u16> {
            if col < 0 || row < 0 || col >= nc as isize || row >= nr as isize {
                return None;
            }
            cell_poly[row as usize * nc + col as usize]
        };

        let mut polys = Vec::new();
        let mut detail_meshes = Vec::new();
        let mut detail_verts = Vec::new();
        let mut detail_tris = Vec::new();
        let mut edge_count = 0;

        for row in 0..nr {
            for col in 0..nc {
                if !self.is_walkable(col, row) {
                    continue;
                }
                let flags = self
                    .flags
                    .iter()
                    .rev()
                    .find(|(c, _)| *c == (col, row))
                    .map_or(PolyFlags::WALK, |(_, f)| *f);
                let area = self
                    .areas
                    .iter()
                    .rev()
                    .find(|(c, _)| *c == (col, row))
                    .map_or(0, |(_, a)| *a);

                let mut poly = Poly::new(area, PolyType::Ground, flags);
                poly.vert_count = 4;
                poly.verts[..4].copy_from_slice(&[
                    self.vert_index(col, row),
                    self.vert_index(col, row + 1),
                    self.vert_index(col + 1, row + 1),
                    self.vert_index(col + 1, row),
                ]);

                // Edge order: west, +z, east, -z; tile sides 4, 2, 0, 6.
                let (c, r) = (col as isize, row as isize);
                let edges = [(c - 1, r, 4u16), (c, r + 1, 2), (c + 1, r, 0), (c, r - 1, 6)];
                for (e, &(ec, er, side)) in edges.iter().enumerate() {
                    let outside = ec < 0 || er < 0 || ec >= nc as isize || er >= nr as isize;
                    poly.neis[e] = if outside {
                        EXT_LINK | side
                    } else {
                        poly_at(ec, er).map_or(0, |p| p + 1)
                    };
                    edge_count += 1;
                }
                polys.push(poly);

                match self.detail {
                    DetailMode::None => {}
                    DetailMode::Fan => {
                        detail_meshes.push(PolyDetail {
                            vert_base: (detail_verts.len() / 3) as u32,
                            tri_base: (detail_tris.len() / 4) as u32,
                            vert_count: 0,
                            tri_count: 2,
                        });
                        detail_tris.extend_from_slice(&[0, 1, 2, 0x01 | 0x04]);
                        detail_tris.extend_from_slice(&[0, 2, 3, 0x04 | 0x10]);
                    }
                    DetailMode::Center(bump) => {
                        let cx = min_x + (col as f32 + 0.5) * self.cell_size;
                        let cz = min_z + (row as f32 + 0.5) * self.cell_size;
                        detail_meshes.push(PolyDetail {
                            vert_base: (detail_verts.len() / 3) as u32,
                            tri_base: (detail_tris.len() / 4) as u32,
                            vert_count: 1,
                            tri_count: 4,
                        });
                        detail_verts.extend_from_slice(&[cx, self.terrain.height(cx) + bump, cz]);
                        for k in 0..4u8 {
                            detail_tris.extend_from_slice(&[k, (k + 1) % 4, 4, 0x01]);
                        }
                    }
                }
            }
        }

        let off_mesh_base = polys.len();
        let mut off_mesh_cons = Vec::new();
        for link in &self.off_mesh {
            let v = (verts.len() / 3) as u16;
            verts.extend_from_slice(&link.start);
            verts.extend_from_slice(&link.end);

            let mut poly = Poly::new(0, PolyType::OffMeshConnection, PolyFlags::JUMP);
            poly.vert_count = 2;
            poly.verts[0] = v;
            poly.verts[1] = v + 1;
            off_mesh_cons.push(OffMeshConnection {
                pos: [
                    link.start[0],
                    link.start[1],
                    link.start[2],
                    link.end[0],
                    link.end[1],
                    link.end[2],
                ],
                rad: link.rad,
                poly: polys.len() as u16,
                flags: if link.bidirectional { OFFMESH_CON_BIDIR } else { 0 },
                side: self.landing_side(&link.end),
                user_id: link.user_id,
            });
            polys.push(poly);
        }

        let mut bmin = [min_x, f32::MAX, min_z];
        let mut bmax = [min_x + self.tile_size(), f32::MIN, min_z + self.tile_depth()];
        for v in verts.chunks(3).take((nc + 1) * (nr + 1)) {
            bmin[1] = bmin[1].min(v[1]);
            bmax[1] = bmax[1].max(v[1]);
        }
        for v in detail_verts.chunks(3) {
            bmin[1] = bmin[1].min(v[1]);
            bmax[1] = bmax[1].max(v[1]);
        }

        let quant_factor = 1.0 / self.cell_size;
        let bv_tree = if self.bv_tree {
            build_flat_bv_tree(&polys[..off_mesh_base], &verts, &bmin, quant_factor)
        } else {
            Vec::new()
        };

        let header = TileHeader {
            x: self.tx,
            y: self.ty,
            layer: self.layer,
            user_id: 0,
            poly_count: polys.len() as i32,
            vert_count: (verts.len() / 3) as i32,
            max_link_count: (edge_count + off_mesh_cons.len() * 4) as i32,
            detail_mesh_count: detail_meshes.len() as i32,
            detail_vert_count: (detail_verts.len() / 3) as i32,
            detail_tri_count: (detail_tris.len() / 4) as i32,
            bv_node_count: bv_tree.len() as i32,
            off_mesh_con_count: off_mesh_cons.len() as i32,
            off_mesh_base: off_mesh_base as i32,
            walkable_height: 2.0,
            walkable_radius: 0.6,
            walkable_climb: self.walkable_climb,
            bmin,
            bmax,
            bv_quant_factor: quant_factor,
        };

        MeshTile {
            salt: 0,
            header: Some(header),
            polys,
            verts,
            links: Vec::new(),
            detail_meshes,
            detail_verts,
            detail_tris,
            bv_tree,
            off_mesh_cons,
        }
    }

    /// Serialises the tile into a blob
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        write_tile_data(&self.build())
    }
}

/// Root node spanning every leaf, followed by one leaf per polygon
fn build_flat_bv_tree(polys: &[Poly], verts: &[f32], tile_min: &[f32; 3], qf: f32) -> Vec<BVNode> {
    let quant = |v: f32, a: usize, up: bool| -> u16 {
        let q = (v - tile_min[a]) * qf;
        let q = if up { q.ceil() } else { q.floor() };
        q.clamp(0.0, u16::MAX as f32) as u16
    };

    let mut leaves = Vec::with_capacity(polys.len());
    for (ip, poly) in polys.iter().enumerate() {
        let mut node = BVNode {
            bmin: [u16::MAX; 3],
            bmax: [0; 3],
            i: ip as i32,
        };
        for &vi in &poly.verts[..poly.vert_count as usize] {
            let v = &verts[vi as usize * 3..vi as usize * 3 + 3];
            for a in 0..3 {
                node.bmin[a] = node.bmin[a].min(quant(v[a], a, false));
                node.bmax[a] = node.bmax[a].max(quant(v[a], a, true));
            }
        }
        leaves.push(node);
    }

    let mut root = BVNode {
        bmin: [u16::MAX; 3],
        bmax: [0; 3],
        i: -(leaves.len() as i32 + 1),
    };
    for leaf in &leaves {
        for a in 0..3 {
            root.bmin[a] = root.bmin[a].min(leaf.bmin[a]);
            root.bmax[a] = root.bmax[a].max(leaf.bmax[a]);
        }
    }

    let mut tree = Vec::with_capacity(leaves.len() + 1);
    tree.push(root);
    tree.extend(leaves);
    tree
}

/// Mesh parameters for square tiles of the given world size
pub fn grid_params(tile_size: f32, max_tiles: i32, max_polys: i32) -> NavMeshParams {
    NavMeshParams {
        origin: [0.0, 0.0, 0.0],
        tile_width: tile_size,
        tile_height: tile_size,
        max_tiles,
        max_polys_per_tile: max_polys,
    }
}

/// Parameters sized for a set of grid tiles
pub fn params_for(tiles: &[GridTileBuilder]) -> NavMeshParams {
    let tile_size = tiles.first().map_or(1.0, |t| t.tile_size());
    let max_polys = tiles
        .iter()
        .map(|t| t.cols * t.rows + t.off_mesh.len())
        .max()
        .unwrap_or(1);
    let mut params = grid_params(tile_size, tiles.len().max(1) as i32, max_polys as i32);
    if let Some(t) = tiles.first() {
        params.origin = t.origin;
        params.tile_height = t.tile_depth();
    }
    params
}

/// Builds a mesh directly from grid tiles
pub fn build_nav_mesh(tiles: &[GridTileBuilder]) -> Result<NavMesh> {
    let mut nav_mesh = NavMesh::new(params_for(tiles))?;
    for tile in tiles {
        nav_mesh.add_mesh_tile(tile.build(), PolyRef::NULL)?;
    }
    Ok(nav_mesh)
}

/// Serialises grid tiles as a mesh set, tile `i` stored in slot `i` with salt 1
pub fn build_mesh_set(tiles: &[GridTileBuilder]) -> Result<Vec<u8>> {
    let params = params_for(tiles);
    let layout = NavMesh::new(params.clone())?;

    let mut records = Vec::with_capacity(tiles.len());
    for (i, tile) in tiles.iter().enumerate() {
        records.push((layout.encode_poly_ref(1, i as u32, 0), tile.to_bytes()?));
    }

    let mut buffer = Vec::new();
    write_nav_mesh_set(&mut buffer, &params, &records)?;
    Ok(buffer)
}

/// Writes a mesh set to `{root}/{area}/{area}.nav`
pub fn write_area_file(root: &Path, area: &str, data: &[u8]) -> Result<PathBuf> {
    let dir = root.join(area);
    fs::create_dir_all(&dir)?;
    let path = dir.join(format!("{}.nav", area));
    fs::write(&path, data)?;
    Ok(path)
}

/// A single open tile of `cells` x `cells` unit quads
pub fn open_field(cells: usize) -> GridTileBuilder {
    GridTileBuilder::new(0, 0, cells, 1.0)
}

/// An 8x8 tile split into two islands by a blocked column
pub fn two_islands() -> GridTileBuilder {
    GridTileBuilder::new(0, 0, 8, 1.0).block_column(4)
}

/// A 9x3 tile whose middle column is a gap, bridged by a one-way jump from
/// the low west side onto a ledge two units higher
pub fn jump_gap(bidirectional: bool) -> GridTileBuilder {
    GridTileBuilder::new(0, 0, 9, 1.0)
        .rows(3)
        .block_column(4)
        .terrain(Terrain::StepX {
            at: 4.5,
            low: 0.0,
            high: 2.0,
        })
        .off_mesh([3.5, 0.0, 1.5], [5.5, 2.0, 1.5], 0.5, bidirectional)
}

/// A 12x12 serpentine: walls on every other row leave a single gap that
/// alternates between the east and west end
pub fn zigzag(cells: usize) -> GridTileBuilder {
    let mut builder = GridTileBuilder::new(0, 0, cells, 1.0);
    let mut row = 1;
    let mut gap_east = true;
    while row < cells {
        builder = builder.block_row(row);
        let gap = if gap_east { cells - 1 } else { 0 };
        builder = builder.unblock(gap, row);
        gap_east = !gap_east;
        row += 2;
    }
    builder
}

/// Two 4x4 tiles side by side along x
pub fn two_tile_strip() -> Vec<GridTileBuilder> {
    vec![
        GridTileBuilder::new(0, 0, 4, 1.0).bv_tree(true),
        GridTileBuilder::new(1, 0, 4, 1.0).bv_tree(true),
    ]
}
