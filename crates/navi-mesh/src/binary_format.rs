//! Binary navigation mesh formats
//!
//! Two little-endian layouts are supported:
//!
//! - the tile blob (`DNAV`, version 7): a 100-byte mesh header followed by
//!   4-byte aligned sections for vertices, polygons, links, detail meshes,
//!   detail vertices, detail triangles, BV nodes and off-mesh connections;
//! - the mesh set file (`MSET`, version 1): a 40-byte header carrying the mesh
//!   parameters, then one `(tile_ref, data_size)` record and tile blob per tile.

use std::fs::File;
use std::io::{BufReader, Cursor, ErrorKind, Read, Write};
use std::path::Path;

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use super::nav_mesh::{BVNode, MeshTile, OffMeshConnection, Poly, PolyDetail, TileHeader};
use super::{
    NavMesh, NavMeshParams, PolyFlags, PolyRef, PolyType, Status, EXT_LINK, MAX_VERTS_PER_POLY,
};
use navi_common::{Error, Result};

/// Magic number for tile data ('DNAV')
pub const DT_NAVMESH_MAGIC: u32 =
    (b'D' as u32) << 24 | (b'N' as u32) << 16 | (b'A' as u32) << 8 | b'V' as u32;

/// Tile data version
pub const DT_NAVMESH_VERSION: u32 = 7;

/// Magic number for mesh set files ('MSET')
pub const NAVMESHSET_MAGIC: u32 =
    (b'M' as u32) << 24 | (b'S' as u32) << 16 | (b'E' as u32) << 8 | b'T' as u32;

/// Mesh set file version
pub const NAVMESHSET_VERSION: u32 = 1;

/// Null link value
const DT_NULL_LINK: u32 = 0xffff_ffff;

const MESH_HEADER_SIZE: usize = 100;
const VERT_SIZE: usize = 12;
const POLY_SIZE: usize = 32;
const LINK_SIZE: usize = 12;
const DETAIL_MESH_SIZE: usize = 12;
const DETAIL_TRI_SIZE: usize = 4;
const BV_NODE_SIZE: usize = 16;
const OFF_MESH_CON_SIZE: usize = 36;

/// Align value to 4-byte boundary
fn align4(value: usize) -> usize {
    (value + 3) & !3
}

fn corrupted(what: &str) -> Error {
    Error::MalformedAsset(format!("{}: {}", Status::DataCorrupted, what))
}

/// Maps an I/O failure while reading asset bytes; short reads mean truncation
fn read_error(what: &'static str) -> impl Fn(std::io::Error) -> Error {
    move |err| {
        if err.kind() == ErrorKind::UnexpectedEof {
            Error::MalformedAsset(format!("truncated {}", what))
        } else {
            Error::Io(err)
        }
    }
}

/// Mesh header structure matching the tile blob header
#[derive(Debug, Clone)]
struct MeshHeader {
    magic: u32,
    version: u32,
    x: i32,
    y: i32,
    layer: i32,
    user_id: u32,
    poly_count: i32,
    vert_count: i32,
    max_link_count: i32,
    detail_mesh_count: i32,
    detail_vert_count: i32,
    detail_tri_count: i32,
    bv_node_count: i32,
    off_mesh_con_count: i32,
    off_mesh_base: i32,
    walkable_height: f32,
    walkable_radius: f32,
    walkable_climb: f32,
    bmin: [f32; 3],
    bmax: [f32; 3],
    bv_quant_factor: f32,
}

impl MeshHeader {
    fn read_from<R: Read>(reader: &mut R) -> std::io::Result<Self> {
        Ok(Self {
            magic: reader.read_u32::<LittleEndian>()?,
            version: reader.read_u32::<LittleEndian>()?,
            x: reader.read_i32::<LittleEndian>()?,
            y: reader.read_i32::<LittleEndian>()?,
            layer: reader.read_i32::<LittleEndian>()?,
            user_id: reader.read_u32::<LittleEndian>()?,
            poly_count: reader.read_i32::<LittleEndian>()?,
            vert_count: reader.read_i32::<LittleEndian>()?,
            max_link_count: reader.read_i32::<LittleEndian>()?,
            detail_mesh_count: reader.read_i32::<LittleEndian>()?,
            detail_vert_count: reader.read_i32::<LittleEndian>()?,
            detail_tri_count: reader.read_i32::<LittleEndian>()?,
            bv_node_count: reader.read_i32::<LittleEndian>()?,
            off_mesh_con_count: reader.read_i32::<LittleEndian>()?,
            off_mesh_base: reader.read_i32::<LittleEndian>()?,
            walkable_height: reader.read_f32::<LittleEndian>()?,
            walkable_radius: reader.read_f32::<LittleEndian>()?,
            walkable_climb: reader.read_f32::<LittleEndian>()?,
            bmin: read_vec3(reader)?,
            bmax: read_vec3(reader)?,
            bv_quant_factor: reader.read_f32::<LittleEndian>()?,
        })
    }

    fn write_to<W: Write>(&self, writer: &mut W) -> std::io::Result<()> {
        writer.write_u32::<LittleEndian>(self.magic)?;
        writer.write_u32::<LittleEndian>(self.version)?;
        writer.write_i32::<LittleEndian>(self.x)?;
        writer.write_i32::<LittleEndian>(self.y)?;
        writer.write_i32::<LittleEndian>(self.layer)?;
        writer.write_u32::<LittleEndian>(self.user_id)?;
        writer.write_i32::<LittleEndian>(self.poly_count)?;
        writer.write_i32::<LittleEndian>(self.vert_count)?;
        writer.write_i32::<LittleEndian>(self.max_link_count)?;
        writer.write_i32::<LittleEndian>(self.detail_mesh_count)?;
        writer.write_i32::<LittleEndian>(self.detail_vert_count)?;
        writer.write_i32::<LittleEndian>(self.detail_tri_count)?;
        writer.write_i32::<LittleEndian>(self.bv_node_count)?;
        writer.write_i32::<LittleEndian>(self.off_mesh_con_count)?;
        writer.write_i32::<LittleEndian>(self.off_mesh_base)?;
        writer.write_f32::<LittleEndian>(self.walkable_height)?;
        writer.write_f32::<LittleEndian>(self.walkable_radius)?;
        writer.write_f32::<LittleEndian>(self.walkable_climb)?;
        write_vec3(writer, &self.bmin)?;
        write_vec3(writer, &self.bmax)?;
        writer.write_f32::<LittleEndian>(self.bv_quant_factor)?;
        Ok(())
    }

    fn to_tile_header(&self) -> TileHeader {
        TileHeader {
            x: self.x,
            y: self.y,
            layer: self.layer,
            user_id: self.user_id,
            poly_count: self.poly_count,
            vert_count: self.vert_count,
            max_link_count: self.max_link_count,
            detail_mesh_count: self.detail_mesh_count,
            detail_vert_count: self.detail_vert_count,
            detail_tri_count: self.detail_tri_count,
            bv_node_count: self.bv_node_count,
            off_mesh_con_count: self.off_mesh_con_count,
            off_mesh_base: self.off_mesh_base,
            walkable_height: self.walkable_height,
            walkable_radius: self.walkable_radius,
            walkable_climb: self.walkable_climb,
            bmin: self.bmin,
            bmax: self.bmax,
            bv_quant_factor: self.bv_quant_factor,
        }
    }

    /// Byte length of the tile blob this header describes
    fn data_size(&self) -> u64 {
        let section = |count: i32, size: usize| align4(count.max(0) as usize * size) as u64;
        align4(MESH_HEADER_SIZE) as u64
            + section(self.vert_count, VERT_SIZE)
            + section(self.poly_count, POLY_SIZE)
            + section(self.max_link_count, LINK_SIZE)
            + section(self.detail_mesh_count, DETAIL_MESH_SIZE)
            + section(self.detail_vert_count, VERT_SIZE)
            + section(self.detail_tri_count, DETAIL_TRI_SIZE)
            + section(self.bv_node_count, BV_NODE_SIZE)
            + section(self.off_mesh_con_count, OFF_MESH_CON_SIZE)
    }
}

fn read_vec3<R: Read>(reader: &mut R) -> std::io::Result<[f32; 3]> {
    Ok([
        reader.read_f32::<LittleEndian>()?,
        reader.read_f32::<LittleEndian>()?,
        reader.read_f32::<LittleEndian>()?,
    ])
}

fn write_vec3<W: Write>(writer: &mut W, v: &[f32; 3]) -> std::io::Result<()> {
    for &c in v {
        writer.write_f32::<LittleEndian>(c)?;
    }
    Ok(())
}

/// Polygon record
#[derive(Debug, Clone)]
struct PolyData {
    first_link: u32,
    verts: [u16; MAX_VERTS_PER_POLY],
    neis: [u16; MAX_VERTS_PER_POLY],
    flags: u16,
    vert_count: u8,
    area_and_type: u8,
}

impl PolyData {
    fn read_from<R: Read>(reader: &mut R) -> std::io::Result<Self> {
        let first_link = reader.read_u32::<LittleEndian>()?;

        let mut verts = [0u16; MAX_VERTS_PER_POLY];
        for v in &mut verts {
            *v = reader.read_u16::<LittleEndian>()?;
        }

        let mut neis = [0u16; MAX_VERTS_PER_POLY];
        for n in &mut neis {
            *n = reader.read_u16::<LittleEndian>()?;
        }

        Ok(Self {
            first_link,
            verts,
            neis,
            flags: reader.read_u16::<LittleEndian>()?,
            vert_count: reader.read_u8()?,
            area_and_type: reader.read_u8()?,
        })
    }

    fn write_to<W: Write>(&self, writer: &mut W) -> std::io::Result<()> {
        writer.write_u32::<LittleEndian>(self.first_link)?;
        for &v in &self.verts {
            writer.write_u16::<LittleEndian>(v)?;
        }
        for &n in &self.neis {
            writer.write_u16::<LittleEndian>(n)?;
        }
        writer.write_u16::<LittleEndian>(self.flags)?;
        writer.write_u8(self.vert_count)?;
        writer.write_u8(self.area_and_type)?;
        Ok(())
    }

    /// Converts to internal Poly structure. Area is the low 6 bits, type the high 2.
    fn to_poly(&self) -> Result<Poly> {
        let poly_type = match self.area_and_type >> 6 {
            0 => PolyType::Ground,
            1 => PolyType::OffMeshConnection,
            other => return Err(corrupted(&format!("unknown polygon type {}", other))),
        };

        let mut poly = Poly::new(
            self.area_and_type & 0x3f,
            poly_type,
            PolyFlags::from_bits_retain(self.flags),
        );
        poly.verts = self.verts;
        poly.neis = self.neis;
        poly.vert_count = self.vert_count;
        Ok(poly)
    }

    fn from_poly(poly: &Poly) -> Self {
        Self {
            first_link: DT_NULL_LINK,
            verts: poly.verts,
            neis: poly.neis,
            flags: poly.flags.bits(),
            vert_count: poly.vert_count,
            area_and_type: (poly.area & 0x3f) | ((poly.poly_type as u8) << 6),
        }
    }
}

fn read_detail_mesh<R: Read>(reader: &mut R) -> std::io::Result<PolyDetail> {
    let detail = PolyDetail {
        vert_base: reader.read_u32::<LittleEndian>()?,
        tri_base: reader.read_u32::<LittleEndian>()?,
        vert_count: reader.read_u8()?,
        tri_count: reader.read_u8()?,
    };
    // Two padding bytes for struct alignment
    reader.read_u16::<LittleEndian>()?;
    Ok(detail)
}

fn write_detail_mesh<W: Write>(writer: &mut W, detail: &PolyDetail) -> std::io::Result<()> {
    writer.write_u32::<LittleEndian>(detail.vert_base)?;
    writer.write_u32::<LittleEndian>(detail.tri_base)?;
    writer.write_u8(detail.vert_count)?;
    writer.write_u8(detail.tri_count)?;
    writer.write_u16::<LittleEndian>(0)?;
    Ok(())
}

fn read_bv_node<R: Read>(reader: &mut R) -> std::io::Result<BVNode> {
    let mut node = BVNode::default();
    for v in &mut node.bmin {
        *v = reader.read_u16::<LittleEndian>()?;
    }
    for v in &mut node.bmax {
        *v = reader.read_u16::<LittleEndian>()?;
    }
    node.i = reader.read_i32::<LittleEndian>()?;
    Ok(node)
}

fn write_bv_node<W: Write>(writer: &mut W, node: &BVNode) -> std::io::Result<()> {
    for &v in node.bmin.iter().chain(node.bmax.iter()) {
        writer.write_u16::<LittleEndian>(v)?;
    }
    writer.write_i32::<LittleEndian>(node.i)?;
    Ok(())
}

fn read_off_mesh_con<R: Read>(reader: &mut R) -> std::io::Result<OffMeshConnection> {
    let mut con = OffMeshConnection::default();
    for v in &mut con.pos {
        *v = reader.read_f32::<LittleEndian>()?;
    }
    con.rad = reader.read_f32::<LittleEndian>()?;
    con.poly = reader.read_u16::<LittleEndian>()?;
    con.flags = reader.read_u8()?;
    con.side = reader.read_u8()?;
    con.user_id = reader.read_u32::<LittleEndian>()?;
    Ok(con)
}

fn write_off_mesh_con<W: Write>(writer: &mut W, con: &OffMeshConnection) -> std::io::Result<()> {
    for &v in &con.pos {
        writer.write_f32::<LittleEndian>(v)?;
    }
    writer.write_f32::<LittleEndian>(con.rad)?;
    writer.write_u16::<LittleEndian>(con.poly)?;
    writer.write_u8(con.flags)?;
    writer.write_u8(con.side)?;
    writer.write_u32::<LittleEndian>(con.user_id)?;
    Ok(())
}

/// Skips the padding that brings a section of `len` bytes to a 4-byte boundary
fn skip_padding(cursor: &mut Cursor<&[u8]>, len: usize) {
    let pad = align4(len) - len;
    cursor.set_position(cursor.position() + pad as u64);
}

fn write_padding<W: Write>(writer: &mut W, len: usize) -> std::io::Result<()> {
    for _ in len..align4(len) {
        writer.write_u8(0)?;
    }
    Ok(())
}

/// Reads `count` records into a vector sized up front
fn read_section<'d, T, F>(
    cursor: &mut Cursor<&'d [u8]>,
    count: i32,
    size: usize,
    mut read: F,
) -> Result<Vec<T>>
where
    F: FnMut(&mut Cursor<&'d [u8]>) -> std::io::Result<T>,
{
    let count = count.max(0) as usize;
    let mut items = Vec::new();
    items.try_reserve_exact(count)?;
    for _ in 0..count {
        items.push(read(cursor).map_err(read_error("tile section"))?);
    }
    skip_padding(cursor, count * size);
    Ok(items)
}

/// Parses a tile blob.
///
/// The link section is skipped; links are rebuilt when the tile is added to a
/// mesh. Every index stored in the blob is checked so queries never read out
/// of bounds.
pub fn read_tile_data(data: &[u8]) -> Result<MeshTile> {
    let mut cursor = Cursor::new(data);
    let header = MeshHeader::read_from(&mut cursor).map_err(read_error("tile header"))?;

    if header.magic != DT_NAVMESH_MAGIC {
        return Err(Status::WrongMagic.into());
    }
    if header.version != DT_NAVMESH_VERSION {
        return Err(Status::WrongVersion.into());
    }

    let counts = [
        header.poly_count,
        header.vert_count,
        header.max_link_count,
        header.detail_mesh_count,
        header.detail_vert_count,
        header.detail_tri_count,
        header.bv_node_count,
        header.off_mesh_con_count,
        header.off_mesh_base,
    ];
    if counts.iter().any(|&c| c < 0) {
        return Err(corrupted("negative section count"));
    }
    if header.data_size() > data.len() as u64 {
        return Err(Error::MalformedAsset(format!(
            "truncated tile data: need {} bytes, have {}",
            header.data_size(),
            data.len()
        )));
    }
    cursor.set_position(align4(MESH_HEADER_SIZE) as u64);

    let mut tile = MeshTile::new();
    tile.verts = read_section(&mut cursor, header.vert_count * 3, 4, |c| {
        c.read_f32::<LittleEndian>()
    })?;

    let polys = read_section(&mut cursor, header.poly_count, POLY_SIZE, PolyData::read_from)?;
    tile.polys = polys
        .iter()
        .map(PolyData::to_poly)
        .collect::<Result<Vec<_>>>()?;

    // Links are rebuilt on load.
    let links_len = align4(header.max_link_count as usize * LINK_SIZE);
    cursor.set_position(cursor.position() + links_len as u64);

    tile.detail_meshes = read_section(
        &mut cursor,
        header.detail_mesh_count,
        DETAIL_MESH_SIZE,
        read_detail_mesh,
    )?;
    tile.detail_verts = read_section(&mut cursor, header.detail_vert_count * 3, 4, |c| {
        c.read_f32::<LittleEndian>()
    })?;
    tile.detail_tris = read_section(&mut cursor, header.detail_tri_count * 4, 1, |c| c.read_u8())?;
    tile.bv_tree = read_section(&mut cursor, header.bv_node_count, BV_NODE_SIZE, read_bv_node)?;
    tile.off_mesh_cons = read_section(
        &mut cursor,
        header.off_mesh_con_count,
        OFF_MESH_CON_SIZE,
        read_off_mesh_con,
    )?;

    tile.header = Some(header.to_tile_header());
    validate_tile(&tile)?;
    Ok(tile)
}

/// Checks every stored index against the section it points into
fn validate_tile(tile: &MeshTile) -> Result<()> {
    let header = tile
        .header
        .as_ref()
        .ok_or_else(|| corrupted("missing header"))?;
    let poly_count = tile.polys.len();
    let vert_count = tile.verts.len() / 3;

    if header.off_mesh_base as usize > poly_count
        || tile.detail_meshes.len() > poly_count
        || tile.off_mesh_cons.len() > poly_count
    {
        return Err(corrupted("section counts exceed polygon count"));
    }

    for (ip, poly) in tile.polys.iter().enumerate() {
        let nv = poly.vert_count as usize;
        let required = if poly.is_off_mesh_connection() { 2 } else { 3 };
        if nv < required || nv > MAX_VERTS_PER_POLY {
            return Err(corrupted(&format!("polygon {} has {} vertices", ip, nv)));
        }
        if poly.verts[..nv].iter().any(|&v| v as usize >= vert_count) {
            return Err(corrupted(&format!("polygon {} vertex out of range", ip)));
        }
        for &nei in &poly.neis[..nv] {
            if nei != 0 && nei & EXT_LINK == 0 && (nei - 1) as usize >= poly_count {
                return Err(corrupted(&format!("polygon {} neighbour out of range", ip)));
            }
        }
    }

    let detail_vert_count = tile.detail_verts.len() / 3;
    let detail_tri_count = tile.detail_tris.len() / 4;
    for (ip, pd) in tile.detail_meshes.iter().enumerate() {
        let nv = tile.polys[ip].vert_count as usize;
        if pd.vert_base as usize + pd.vert_count as usize > detail_vert_count
            || pd.tri_base as usize + pd.tri_count as usize > detail_tri_count
        {
            return Err(corrupted(&format!("detail mesh {} out of range", ip)));
        }
        for t in 0..pd.tri_count as usize {
            let tri = (pd.tri_base as usize + t) * 4;
            if tile.detail_tris[tri..tri + 3]
                .iter()
                .any(|&v| v as usize >= nv + pd.vert_count as usize)
            {
                return Err(corrupted(&format!("detail triangle of polygon {} out of range", ip)));
            }
        }
    }

    let node_count = tile.bv_tree.len();
    for (n, node) in tile.bv_tree.iter().enumerate() {
        let valid = if node.i >= 0 {
            (node.i as usize) < poly_count
        } else {
            node.i != i32::MIN && n + (-node.i) as usize <= node_count
        };
        if !valid {
            return Err(corrupted(&format!("bv node {} out of range", n)));
        }
    }

    for (i, con) in tile.off_mesh_cons.iter().enumerate() {
        let valid = tile
            .polys
            .get(con.poly as usize)
            .is_some_and(|p| p.is_off_mesh_connection());
        if !valid {
            return Err(corrupted(&format!("off-mesh connection {} polygon invalid", i)));
        }
    }

    Ok(())
}

/// Serializes a tile into a blob, including an empty link section sized for
/// the links the tile may need
pub fn write_tile_data(tile: &MeshTile) -> Result<Vec<u8>> {
    let source = tile
        .header
        .as_ref()
        .ok_or_else(|| corrupted("missing header"))?;

    let header = MeshHeader {
        magic: DT_NAVMESH_MAGIC,
        version: DT_NAVMESH_VERSION,
        x: source.x,
        y: source.y,
        layer: source.layer,
        user_id: source.user_id,
        poly_count: tile.polys.len() as i32,
        vert_count: (tile.verts.len() / 3) as i32,
        max_link_count: source.max_link_count.max(0),
        detail_mesh_count: tile.detail_meshes.len() as i32,
        detail_vert_count: (tile.detail_verts.len() / 3) as i32,
        detail_tri_count: (tile.detail_tris.len() / 4) as i32,
        bv_node_count: tile.bv_tree.len() as i32,
        off_mesh_con_count: tile.off_mesh_cons.len() as i32,
        off_mesh_base: source.off_mesh_base,
        walkable_height: source.walkable_height,
        walkable_radius: source.walkable_radius,
        walkable_climb: source.walkable_climb,
        bmin: source.bmin,
        bmax: source.bmax,
        bv_quant_factor: source.bv_quant_factor,
    };

    let mut buffer = Vec::with_capacity(header.data_size() as usize);
    header.write_to(&mut buffer)?;

    for &v in &tile.verts {
        buffer.write_f32::<LittleEndian>(v)?;
    }
    write_padding(&mut buffer, tile.verts.len() * 4)?;

    for poly in &tile.polys {
        PolyData::from_poly(poly).write_to(&mut buffer)?;
    }
    write_padding(&mut buffer, tile.polys.len() * POLY_SIZE)?;

    for _ in 0..header.max_link_count {
        buffer.write_u32::<LittleEndian>(0)?;
        buffer.write_u32::<LittleEndian>(DT_NULL_LINK)?;
        buffer.write_u32::<LittleEndian>(0)?;
    }

    for detail in &tile.detail_meshes {
        write_detail_mesh(&mut buffer, detail)?;
    }
    for &v in &tile.detail_verts {
        buffer.write_f32::<LittleEndian>(v)?;
    }
    buffer.write_all(&tile.detail_tris)?;
    write_padding(&mut buffer, tile.detail_tris.len())?;

    for node in &tile.bv_tree {
        write_bv_node(&mut buffer, node)?;
    }
    for con in &tile.off_mesh_cons {
        write_off_mesh_con(&mut buffer, con)?;
    }

    Ok(buffer)
}

/// Mesh set file header
#[derive(Debug, Clone)]
pub struct NavMeshSetHeader {
    pub magic: u32,
    pub version: u32,
    pub num_tiles: i32,
    pub params: NavMeshParams,
}

impl NavMeshSetHeader {
    /// Creates a header with the current magic and version
    pub fn new(num_tiles: i32, params: NavMeshParams) -> Self {
        Self {
            magic: NAVMESHSET_MAGIC,
            version: NAVMESHSET_VERSION,
            num_tiles,
            params,
        }
    }

    pub fn write_to<W: Write>(&self, writer: &mut W) -> Result<()> {
        writer.write_u32::<LittleEndian>(self.magic)?;
        writer.write_u32::<LittleEndian>(self.version)?;
        writer.write_i32::<LittleEndian>(self.num_tiles)?;
        write_vec3(writer, &self.params.origin)?;
        writer.write_f32::<LittleEndian>(self.params.tile_width)?;
        writer.write_f32::<LittleEndian>(self.params.tile_height)?;
        writer.write_i32::<LittleEndian>(self.params.max_tiles)?;
        writer.write_i32::<LittleEndian>(self.params.max_polys_per_tile)?;
        Ok(())
    }

    pub fn read_from<R: Read>(reader: &mut R) -> Result<Self> {
        let mut read = || -> std::io::Result<Self> {
            Ok(Self {
                magic: reader.read_u32::<LittleEndian>()?,
                version: reader.read_u32::<LittleEndian>()?,
                num_tiles: reader.read_i32::<LittleEndian>()?,
                params: NavMeshParams {
                    origin: read_vec3(reader)?,
                    tile_width: reader.read_f32::<LittleEndian>()?,
                    tile_height: reader.read_f32::<LittleEndian>()?,
                    max_tiles: reader.read_i32::<LittleEndian>()?,
                    max_polys_per_tile: reader.read_i32::<LittleEndian>()?,
                },
            })
        };
        read().map_err(read_error("mesh set header"))
    }
}

/// Per-tile record preceding each tile blob in a mesh set file
#[derive(Debug, Clone, Copy)]
pub struct NavMeshTileHeader {
    pub tile_ref: u32,
    pub data_size: i32,
}

impl NavMeshTileHeader {
    pub fn write_to<W: Write>(&self, writer: &mut W) -> Result<()> {
        writer.write_u32::<LittleEndian>(self.tile_ref)?;
        writer.write_i32::<LittleEndian>(self.data_size)?;
        Ok(())
    }

    pub fn read_from<R: Read>(reader: &mut R) -> Result<Self> {
        let mut read = || -> std::io::Result<Self> {
            Ok(Self {
                tile_ref: reader.read_u32::<LittleEndian>()?,
                data_size: reader.read_i32::<LittleEndian>()?,
            })
        };
        read().map_err(read_error("tile record"))
    }
}

/// Reads a mesh set and builds the navigation mesh.
///
/// A tile record with a zero reference or a zero size ends the set early; the
/// tiles read so far form a valid mesh. Any other failure rejects the whole
/// mesh.
pub fn read_nav_mesh_set<R: Read>(reader: &mut R) -> Result<NavMesh> {
    let header = NavMeshSetHeader::read_from(reader)?;

    if header.magic != NAVMESHSET_MAGIC {
        return Err(Error::MalformedAsset(format!(
            "not a mesh set (magic {:#010x})",
            header.magic
        )));
    }
    if header.version != NAVMESHSET_VERSION {
        return Err(Error::MalformedAsset(format!(
            "unsupported mesh set version {}",
            header.version
        )));
    }

    let mut nav_mesh = NavMesh::new(header.params.clone()).map_err(|err| match err {
        Error::Detour(msg) => Error::MalformedAsset(format!("invalid mesh parameters: {}", msg)),
        other => other,
    })?;

    for i in 0..header.num_tiles.max(0) {
        let record = NavMeshTileHeader::read_from(reader)?;
        if record.tile_ref == 0 || record.data_size <= 0 {
            log::debug!(
                "tile record {} is a terminator, stopping after {} tiles",
                i,
                nav_mesh.tile_count()
            );
            break;
        }

        let size = record.data_size as usize;
        let mut data = Vec::new();
        data.try_reserve_exact(size)?;
        data.resize(size, 0);
        reader
            .read_exact(&mut data)
            .map_err(read_error("tile data"))?;

        nav_mesh
            .add_tile(&data, PolyRef::new(record.tile_ref))
            .map_err(|err| match err {
                Error::Detour(msg) => Error::MalformedAsset(format!("tile {}: {}", i, msg)),
                other => other,
            })?;
    }

    Ok(nav_mesh)
}

/// Loads a mesh set file from disk
pub fn load_nav_mesh_set<P: AsRef<Path>>(path: P) -> Result<NavMesh> {
    let path = path.as_ref();
    let file = File::open(path).map_err(|err| {
        if err.kind() == ErrorKind::NotFound {
            Error::MissingAsset(path.display().to_string())
        } else {
            Error::Io(err)
        }
    })?;
    read_nav_mesh_set(&mut BufReader::new(file))
}

/// Writes a mesh set from already serialized tile blobs
pub fn write_nav_mesh_set<W: Write>(
    writer: &mut W,
    params: &NavMeshParams,
    tiles: &[(PolyRef, Vec<u8>)],
) -> Result<()> {
    NavMeshSetHeader::new(tiles.len() as i32, params.clone()).write_to(writer)?;
    for (tile_ref, data) in tiles {
        NavMeshTileHeader {
            tile_ref: tile_ref.id(),
            data_size: data.len() as i32,
        }
        .write_to(writer)?;
        writer.write_all(data)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_magic_values() {
        assert_eq!(DT_NAVMESH_MAGIC, 0x444E_4156);
        assert_eq!(NAVMESHSET_MAGIC, 0x4D53_4554);
    }

    #[test]
    fn test_header_sizes() -> Result<()> {
        let mut buffer = Vec::new();
        NavMeshSetHeader::new(
            0,
            NavMeshParams {
                origin: [0.0; 3],
                tile_width: 1.0,
                tile_height: 1.0,
                max_tiles: 1,
                max_polys_per_tile: 1,
            },
        )
        .write_to(&mut buffer)?;
        assert_eq!(buffer.len(), 40);

        let tile = MeshTile {
            header: Some(TileHeader::default()),
            ..MeshTile::default()
        };
        let data = write_tile_data(&tile)?;
        assert_eq!(data.len(), MESH_HEADER_SIZE);
        Ok(())
    }

    #[test]
    fn test_tile_wrong_magic() -> Result<()> {
        let tile = MeshTile {
            header: Some(TileHeader::default()),
            ..MeshTile::default()
        };
        let mut data = write_tile_data(&tile)?;
        data[0] = 0;
        assert!(matches!(read_tile_data(&data), Err(Error::MalformedAsset(_))));
        Ok(())
    }

    #[test]
    fn test_tile_truncated_header() {
        let data = [0u8; 20];
        assert!(matches!(read_tile_data(&data), Err(Error::MalformedAsset(_))));
    }

    #[test]
    fn test_set_header_truncated() {
        let data = [0u8; 12];
        let result = read_nav_mesh_set(&mut Cursor::new(&data[..]));
        assert!(matches!(result, Err(Error::MalformedAsset(_))));
    }
}
