//! Navigation mesh query implementation
//!
//! [`NavMeshQuery`] borrows a loaded [`NavMesh`] and owns the scratch state a
//! search needs (node pools and the open list). A query object is cheap to
//! create and must not be shared between threads; create one per request.

use std::collections::VecDeque;

use super::nav_mesh::{MeshTile, OffMeshEndPoints};
use super::node_pool::{NodeFlags, NodeIndex, NodePool, NodeQueue};
use super::{
    NavMesh, PolyRef, PolyType, QueryFilter, Status, StraightPathFlags, EXT_LINK,
    LINK_SIDE_INTERNAL,
};
use navi_common::{
    dist_pt_seg_sqr_2d, overlap_bounds, point_in_polygon, tri_area_2d, vdist, vequal, vlerp,
    vsub, Error, Result,
};

/// Default size of the A* node pool
pub const DEFAULT_MAX_NODES: usize = 2048;

/// Default search box half extents used to locate polygons
pub const DEFAULT_HALF_EXTENTS: [f32; 3] = [10.0, 20.0, 10.0];

/// Heuristic scale, slightly below one to keep A* admissible
const H_SCALE: f32 = 0.999;

/// Node pool size of the surface move search
const TINY_NODE_POOL_SIZE: usize = 64;

/// Queue bound of the surface move search
const MAX_STACK: usize = 48;

/// Neighbours considered per polygon edge during a surface move
const MAX_NEIS: usize = 8;

/// Point of a straight path
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StraightPathPoint {
    pub pos: [f32; 3],
    pub flags: StraightPathFlags,
    /// Polygon entered at this point, null at the end of the path
    pub poly: PolyRef,
}

/// Portal between two adjacent polygons
#[derive(Debug, Clone, Copy)]
pub struct PortalPoints {
    pub left: [f32; 3],
    pub right: [f32; 3],
    pub from_type: PolyType,
    pub to_type: PolyType,
}

fn invalid_param() -> Error {
    Error::Detour(Status::InvalidParam.to_string())
}

fn is_finite(v: &[f32; 3]) -> bool {
    v.iter().all(|c| c.is_finite())
}

/// Appends a straight path point, merging it into the previous one when they
/// coincide. Returns true once the path is complete or full.
fn append_vertex(
    points: &mut Vec<StraightPathPoint>,
    max_points: usize,
    pos: [f32; 3],
    flags: StraightPathFlags,
    poly: PolyRef,
) -> bool {
    if let Some(last) = points.last_mut() {
        if vequal(&last.pos, &pos) {
            last.flags = flags;
            last.poly = poly;
            return false;
        }
    }

    points.push(StraightPathPoint { pos, flags, poly });
    flags.contains(StraightPathFlags::END) || points.len() >= max_points
}

/// Query context over a navigation mesh
#[derive(Debug)]
pub struct NavMeshQuery<'a> {
    nav_mesh: &'a NavMesh,
    node_pool: NodePool,
    tiny_node_pool: NodePool,
    open_list: NodeQueue,
}

impl<'a> NavMeshQuery<'a> {
    /// Creates a query with an A* pool of `max_nodes` nodes (1..=65534)
    pub fn new(nav_mesh: &'a NavMesh, max_nodes: usize) -> Result<Self> {
        if max_nodes == 0 || max_nodes >= u16::MAX as usize {
            return Err(invalid_param());
        }

        Ok(Self {
            nav_mesh,
            node_pool: NodePool::new(max_nodes),
            tiny_node_pool: NodePool::new(TINY_NODE_POOL_SIZE),
            open_list: NodeQueue::new(max_nodes),
        })
    }

    /// Gets the mesh this query runs against
    pub fn nav_mesh(&self) -> &'a NavMesh {
        self.nav_mesh
    }

    /// Resolves a reference into its tile, tile slot and polygon index
    fn resolve(&self, reference: PolyRef) -> Result<(&'a MeshTile, usize, usize)> {
        let mesh: &'a NavMesh = self.nav_mesh;
        let (it, ip) = mesh
            .decode_valid(reference)
            .ok_or_else(|| Error::Detour(Status::InvalidPolyRef.to_string()))?;
        let tile = mesh
            .get_tile(it)
            .ok_or_else(|| Error::Detour(Status::InvalidPolyRef.to_string()))?;
        Ok((tile, it, ip))
    }

    /// Finds the traversable ground polygon nearest to `center` within the box
    /// of the given half extents. Returns the polygon and the closest point on
    /// it, or `None` when no polygon qualifies.
    pub fn find_nearest_poly(
        &self,
        center: &[f32; 3],
        half_extents: &[f32; 3],
        filter: &QueryFilter,
    ) -> Result<Option<(PolyRef, [f32; 3])>> {
        if !is_finite(center) || !is_finite(half_extents) || half_extents.iter().any(|&h| h < 0.0)
        {
            return Err(invalid_param());
        }

        let bmin = vsub(center, half_extents);
        let bmax = [
            center[0] + half_extents[0],
            center[1] + half_extents[1],
            center[2] + half_extents[2],
        ];

        let mut nearest = None;
        let mut nearest_dist = f32::MAX;
        for it in self.tiles_overlapping(&bmin, &bmax) {
            let Some(tile) = self.nav_mesh.get_tile(it) else {
                continue;
            };
            let Some(header) = &tile.header else {
                continue;
            };
            let base = self.nav_mesh.get_poly_ref_base(it).id();

            for ip in tile.query_polygons(&bmin, &bmax) {
                if !filter.pass_filter(&tile.polys[ip]) {
                    continue;
                }
                let (closest, over) = tile.closest_point_on_poly(ip, center);
                let d = super::nav_mesh::nearest_distance(
                    center,
                    &closest,
                    over,
                    header.walkable_climb,
                );
                if d < nearest_dist {
                    nearest_dist = d;
                    nearest = Some((PolyRef::new(base | ip as u32), closest));
                }
            }
        }

        Ok(nearest)
    }

    /// Slots of the loaded tiles whose bounds overlap the box
    fn tiles_overlapping(&self, bmin: &[f32; 3], bmax: &[f32; 3]) -> Vec<usize> {
        let (minx, miny) = self.nav_mesh.calc_tile_loc(bmin);
        let (maxx, maxy) = self.nav_mesh.calc_tile_loc(bmax);
        let cells = (maxx as i64 - minx as i64 + 1) * (maxy as i64 - miny as i64 + 1);

        let overlaps = |it: &usize| {
            self.nav_mesh
                .get_tile(*it)
                .and_then(|t| t.header.as_ref())
                .is_some_and(|h| overlap_bounds(bmin, bmax, &h.bmin, &h.bmax))
        };

        // Huge boxes scan the slots instead of the grid.
        if cells > self.nav_mesh.get_max_tiles() as i64 {
            return (0..self.nav_mesh.get_max_tiles() as usize)
                .filter(overlaps)
                .collect();
        }

        let mut result = Vec::new();
        for y in miny..=maxy {
            for x in minx..=maxx {
                result.extend(self.nav_mesh.get_tiles_at(x, y).iter().copied().filter(overlaps));
            }
        }
        result
    }

    /// Finds the portal between two adjacent polygons
    pub fn get_portal_points(&self, from: PolyRef, to: PolyRef) -> Result<PortalPoints> {
        let (from_tile, _, from_ip) = self.resolve(from)?;
        let (to_tile, _, to_ip) = self.resolve(to)?;
        let from_poly = &from_tile.polys[from_ip];
        let to_poly = &to_tile.polys[to_ip];

        let link = from_tile
            .poly_links(from_poly)
            .find(|l| l.reference == to)
            .ok_or_else(invalid_param)?;

        let portal = |v: [f32; 3]| PortalPoints {
            left: v,
            right: v,
            from_type: from_poly.poly_type,
            to_type: to_poly.poly_type,
        };

        // Off-mesh connections have a single point portal at the endpoint
        // the link was made from.
        if from_poly.is_off_mesh_connection() {
            let v = from_poly
                .verts
                .get(link.edge as usize)
                .filter(|_| (link.edge as usize) < from_poly.vert_count as usize)
                .ok_or_else(invalid_param)?;
            return Ok(portal(from_tile.vert(*v)));
        }

        if to_poly.is_off_mesh_connection() {
            let back = to_tile
                .poly_links(to_poly)
                .find(|l| l.reference == from)
                .ok_or_else(invalid_param)?;
            let v = to_poly
                .verts
                .get(back.edge as usize)
                .filter(|_| (back.edge as usize) < to_poly.vert_count as usize)
                .ok_or_else(invalid_param)?;
            return Ok(portal(to_tile.vert(*v)));
        }

        let nv = from_poly.vert_count as usize;
        let edge = link.edge as usize;
        if edge >= nv {
            return Err(invalid_param());
        }
        let v0 = from_tile.vert(from_poly.verts[edge]);
        let v1 = from_tile.vert(from_poly.verts[(edge + 1) % nv]);

        let mut result = PortalPoints {
            left: v0,
            right: v1,
            from_type: from_poly.poly_type,
            to_type: to_poly.poly_type,
        };

        // Portals into neighbour tiles may cover only part of the edge.
        if link.side != LINK_SIDE_INTERNAL && (link.bmin != 0 || link.bmax != 255) {
            let s = 1.0 / 255.0;
            result.left = vlerp(&v0, &v1, link.bmin as f32 * s);
            result.right = vlerp(&v0, &v1, link.bmax as f32 * s);
        }

        Ok(result)
    }

    /// Midpoint of the portal between two adjacent polygons
    pub fn get_edge_mid_point(&self, from: PolyRef, to: PolyRef) -> Result<[f32; 3]> {
        let portal = self.get_portal_points(from, to)?;
        Ok(vlerp(&portal.left, &portal.right, 0.5))
    }

    /// A* search for a corridor from `start_ref` to `end_ref`.
    ///
    /// Returns at most `max_path` polygons, keeping the start side when the
    /// corridor is longer. Returns an empty corridor when either reference is
    /// invalid, the goal is unreachable, or the node pool runs out first.
    pub fn find_path(
        &mut self,
        start_ref: PolyRef,
        end_ref: PolyRef,
        start_pos: &[f32; 3],
        end_pos: &[f32; 3],
        filter: &QueryFilter,
        max_path: usize,
    ) -> Result<Vec<PolyRef>> {
        if max_path == 0 || !is_finite(start_pos) || !is_finite(end_pos) {
            return Err(invalid_param());
        }
        if !self.nav_mesh.is_valid_poly_ref(start_ref) || !self.nav_mesh.is_valid_poly_ref(end_ref)
        {
            return Ok(Vec::new());
        }
        if start_ref == end_ref {
            return Ok(vec![start_ref]);
        }

        self.node_pool.clear();
        self.open_list.clear();

        let start_idx = self
            .node_pool
            .get_node(start_ref, 0)
            .ok_or_else(|| Error::Detour(Status::OutOfNodes.to_string()))?;
        let start_total = vdist(start_pos, end_pos) * H_SCALE;
        if let Some(node) = self.node_pool.node_mut(start_idx) {
            node.pos = *start_pos;
            node.pidx = 0;
            node.cost = 0.0;
            node.total = start_total;
            node.flags = NodeFlags::OPEN;
        }
        self.open_list.push(start_idx, start_total);

        let mut out_of_nodes = false;
        let mut goal = None;

        while let Some(best_idx) = self.open_list.pop() {
            let Some(best) = self.node_pool.node_mut(best_idx) else {
                continue;
            };
            best.flags.remove(NodeFlags::OPEN);
            best.flags.insert(NodeFlags::CLOSED);
            let (best_ref, best_pos, best_cost, best_pidx) = (best.id, best.pos, best.cost, best.pidx);

            // Reached the goal, stop searching.
            if best_ref == end_ref {
                goal = Some(best_idx);
                break;
            }

            let (best_tile, _, best_ip) = self.resolve(best_ref)?;
            let best_poly = &best_tile.polys[best_ip];
            let parent_ref = self.node_pool.node(best_pidx).map(|n| n.id);

            for link in best_tile.poly_links(best_poly) {
                let neighbour_ref = link.reference;

                // Skip invalid ids and do not expand back to where we came from.
                if !neighbour_ref.is_valid() || Some(neighbour_ref) == parent_ref {
                    continue;
                }
                if !filter.pass_link(link) {
                    continue;
                }
                let Ok((neighbour_tile, _, neighbour_ip)) = self.resolve(neighbour_ref) else {
                    continue;
                };
                let neighbour_poly = &neighbour_tile.polys[neighbour_ip];
                if !filter.pass_filter(neighbour_poly) {
                    continue;
                }

                // Portals on tile borders are searched once per side.
                let cross_side = if link.side != LINK_SIDE_INTERNAL {
                    link.side >> 1
                } else {
                    0
                };

                let Some(neighbour_idx) = self.node_pool.get_node(neighbour_ref, cross_side) else {
                    out_of_nodes = true;
                    continue;
                };

                let fresh = self
                    .node_pool
                    .node(neighbour_idx)
                    .is_some_and(|n| n.flags == NodeFlags::default());
                let neighbour_pos = if fresh {
                    self.get_edge_mid_point(best_ref, neighbour_ref)
                        .unwrap_or(best_pos)
                } else {
                    self.node_pool
                        .node(neighbour_idx)
                        .map_or(best_pos, |n| n.pos)
                };

                let (cost, heuristic) = if neighbour_ref == end_ref {
                    let cur_cost = filter.get_cost(&best_pos, &neighbour_pos, best_poly.area);
                    let end_cost = filter.get_cost(&neighbour_pos, end_pos, neighbour_poly.area);
                    (best_cost + cur_cost + end_cost, 0.0)
                } else {
                    let cur_cost = filter.get_cost(&best_pos, &neighbour_pos, best_poly.area);
                    (best_cost + cur_cost, vdist(&neighbour_pos, end_pos) * H_SCALE)
                };
                let total = cost + heuristic;

                let Some(node) = self.node_pool.node_mut(neighbour_idx) else {
                    continue;
                };
                // The node is already in a list with a better cost.
                if (node.flags.contains(NodeFlags::OPEN) || node.flags.contains(NodeFlags::CLOSED))
                    && total >= node.total
                {
                    continue;
                }

                node.pos = neighbour_pos;
                node.pidx = best_idx;
                node.flags.remove(NodeFlags::CLOSED);
                node.cost = cost;
                node.total = total;

                if node.flags.contains(NodeFlags::OPEN) {
                    self.open_list.modify(neighbour_idx, total);
                } else {
                    node.flags.insert(NodeFlags::OPEN);
                    self.open_list.push(neighbour_idx, total);
                }
            }
        }

        let Some(goal) = goal else {
            log::debug!(
                "no corridor from {} to {} ({} nodes{})",
                start_ref,
                end_ref,
                self.node_pool.node_count(),
                if out_of_nodes { ", pool exhausted" } else { "" }
            );
            return Ok(Vec::new());
        };

        Ok(path_to_node(&self.node_pool, goal, max_path))
    }

    /// String-pulls a corridor into straight segments with the funnel
    /// algorithm.
    ///
    /// Start and end are first clamped to the boundary of the first and last
    /// polygon. At most `max_points` points are returned. When a portal of the
    /// corridor cannot be resolved the path ends at the closest point of the
    /// last valid polygon.
    pub fn find_straight_path(
        &self,
        start_pos: &[f32; 3],
        end_pos: &[f32; 3],
        path: &[PolyRef],
        max_points: usize,
    ) -> Result<Vec<StraightPathPoint>> {
        let (Some(&first), Some(&last)) = (path.first(), path.last()) else {
            return Err(invalid_param());
        };
        if max_points == 0 || !is_finite(start_pos) || !is_finite(end_pos) {
            return Err(invalid_param());
        }

        let mut points = Vec::with_capacity(max_points.min(path.len() + 2));
        let closest_start = self.closest_point_on_poly_boundary(first, start_pos)?;
        let closest_end = self.closest_point_on_poly_boundary(last, end_pos)?;

        if append_vertex(
            &mut points,
            max_points,
            closest_start,
            StraightPathFlags::START,
            first,
        ) {
            return Ok(points);
        }

        if path.len() > 1 {
            let mut portal_apex = closest_start;
            let mut portal_left = portal_apex;
            let mut portal_right = portal_apex;
            let mut apex_index = 0;
            let mut left_index = 0;
            let mut right_index = 0;

            let mut left_poly_type = PolyType::Ground;
            let mut right_poly_type = PolyType::Ground;
            let mut left_poly_ref = first;
            let mut right_poly_ref = first;

            let mut i = 0;
            while i < path.len() {
                let (left, right, to_type) = if i + 1 < path.len() {
                    match self.get_portal_points(path[i], path[i + 1]) {
                        Ok(portal) => (portal.left, portal.right, portal.to_type),
                        Err(_) => {
                            // Corridor is broken, end at the last valid polygon.
                            let end = self.closest_point_on_poly_boundary(path[i], end_pos)?;
                            append_vertex(
                                &mut points,
                                max_points,
                                end,
                                StraightPathFlags::empty(),
                                path[i],
                            );
                            return Ok(points);
                        }
                    }
                } else {
                    (closest_end, closest_end, PolyType::Ground)
                };

                // Starting really close to the portal, advance.
                if i == 0 && i + 1 < path.len() {
                    let (d, _) = dist_pt_seg_sqr_2d(&portal_apex, &left, &right);
                    if d < 0.001 * 0.001 {
                        i += 1;
                        continue;
                    }
                }

                let next_ref = path.get(i + 1).copied().unwrap_or(PolyRef::NULL);

                // Right vertex.
                if tri_area_2d(&portal_apex, &portal_right, &right) <= 0.0 {
                    if vequal(&portal_apex, &portal_right)
                        || tri_area_2d(&portal_apex, &portal_left, &right) > 0.0
                    {
                        portal_right = right;
                        right_poly_ref = next_ref;
                        right_poly_type = to_type;
                        right_index = i;
                    } else {
                        portal_apex = portal_left;
                        apex_index = left_index;

                        let flags = corner_flags(left_poly_ref, left_poly_type);
                        if append_vertex(&mut points, max_points, portal_apex, flags, left_poly_ref)
                        {
                            return Ok(points);
                        }

                        portal_left = portal_apex;
                        portal_right = portal_apex;
                        left_index = apex_index;
                        right_index = apex_index;

                        // Restart
                        i = apex_index + 1;
                        continue;
                    }
                }

                // Left vertex.
                if tri_area_2d(&portal_apex, &portal_left, &left) >= 0.0 {
                    if vequal(&portal_apex, &portal_left)
                        || tri_area_2d(&portal_apex, &portal_right, &left) < 0.0
                    {
                        portal_left = left;
                        left_poly_ref = next_ref;
                        left_poly_type = to_type;
                        left_index = i;
                    } else {
                        portal_apex = portal_right;
                        apex_index = right_index;

                        let flags = corner_flags(right_poly_ref, right_poly_type);
                        if append_vertex(
                            &mut points,
                            max_points,
                            portal_apex,
                            flags,
                            right_poly_ref,
                        ) {
                            return Ok(points);
                        }

                        portal_left = portal_apex;
                        portal_right = portal_apex;
                        left_index = apex_index;
                        right_index = apex_index;

                        // Restart
                        i = apex_index + 1;
                        continue;
                    }
                }

                i += 1;
            }
        }

        append_vertex(
            &mut points,
            max_points,
            closest_end,
            StraightPathFlags::END,
            PolyRef::NULL,
        );
        Ok(points)
    }

    /// Moves from `start_pos` towards `end_pos` while staying on the mesh.
    ///
    /// Runs a breadth-first search over neighbouring polygons inside the circle
    /// around the move segment. Returns the reachable position closest to the
    /// target and the polygons from the start to the one holding the result,
    /// at most `max_visited` of them.
    pub fn move_along_surface(
        &mut self,
        start_ref: PolyRef,
        start_pos: &[f32; 3],
        end_pos: &[f32; 3],
        filter: &QueryFilter,
        max_visited: usize,
    ) -> Result<([f32; 3], Vec<PolyRef>)> {
        if !self.nav_mesh.is_valid_poly_ref(start_ref) {
            return Err(Error::Detour(Status::InvalidPolyRef.to_string()));
        }
        if max_visited == 0 || !is_finite(start_pos) || !is_finite(end_pos) {
            return Err(invalid_param());
        }

        self.tiny_node_pool.clear();
        let start_idx = self
            .tiny_node_pool
            .get_node(start_ref, 0)
            .ok_or_else(|| Error::Detour(Status::OutOfNodes.to_string()))?;
        if let Some(node) = self.tiny_node_pool.node_mut(start_idx) {
            node.pidx = 0;
            node.cost = 0.0;
            node.total = 0.0;
            node.flags = NodeFlags::CLOSED;
        }

        let mut stack: VecDeque<NodeIndex> = VecDeque::with_capacity(MAX_STACK);
        stack.push_back(start_idx);

        let mut best_pos = *start_pos;
        let mut best_dist = f32::MAX;
        let mut best_node = start_idx;

        // Search constraints
        let search_pos = vlerp(start_pos, end_pos, 0.5);
        let search_rad = vdist(start_pos, end_pos) / 2.0 + 0.001;
        let search_rad_sqr = search_rad * search_rad;

        while let Some(cur_idx) = stack.pop_front() {
            let Some(cur_ref) = self.tiny_node_pool.node(cur_idx).map(|n| n.id) else {
                continue;
            };
            let (cur_tile, cur_it, cur_ip) = self.resolve(cur_ref)?;
            let cur_poly = &cur_tile.polys[cur_ip];
            let (verts, nverts) = cur_tile.poly_verts(cur_poly);

            // If target is inside the poly, stop search.
            if point_in_polygon(end_pos, &verts, nverts) {
                best_node = cur_idx;
                best_pos = *end_pos;
                break;
            }

            let base = self.nav_mesh.get_poly_ref_base(cur_it).id();

            // Find wall edges and find nearest point inside the walls.
            let mut j = nverts.wrapping_sub(1);
            for i in 0..nverts {
                let mut neis = [PolyRef::NULL; MAX_NEIS];
                let mut nneis = 0;

                if cur_poly.neis[j] & EXT_LINK != 0 {
                    // Tile border.
                    for link in cur_tile.poly_links(cur_poly) {
                        if link.edge as usize != j || !link.reference.is_valid() {
                            continue;
                        }
                        let passes = self
                            .resolve(link.reference)
                            .is_ok_and(|(t, _, p)| filter.pass_filter(&t.polys[p]));
                        if passes && nneis < MAX_NEIS {
                            neis[nneis] = link.reference;
                            nneis += 1;
                        }
                    }
                } else if cur_poly.neis[j] != 0 {
                    let idx = (cur_poly.neis[j] - 1) as usize;
                    if cur_tile.polys.get(idx).is_some_and(|p| filter.pass_filter(p)) {
                        neis[0] = PolyRef::new(base | idx as u32);
                        nneis = 1;
                    }
                }

                let vj = &verts[j * 3..j * 3 + 3];
                let vi = &verts[i * 3..i * 3 + 3];

                if nneis == 0 {
                    // Wall edge, calc distance.
                    let (dist_sqr, tseg) = dist_pt_seg_sqr_2d(end_pos, vj, vi);
                    if dist_sqr < best_dist {
                        best_pos = vlerp(vj, vi, tseg);
                        best_dist = dist_sqr;
                        best_node = cur_idx;
                    }
                } else {
                    for &nei in &neis[..nneis] {
                        let Some(neighbour_idx) = self.tiny_node_pool.get_node(nei, 0) else {
                            continue;
                        };
                        let Some(node) = self.tiny_node_pool.node_mut(neighbour_idx) else {
                            continue;
                        };
                        // Skip if already visited.
                        if node.flags.contains(NodeFlags::CLOSED) {
                            continue;
                        }

                        // Skip the link if it is too far from search constraint.
                        let (dist_sqr, _) = dist_pt_seg_sqr_2d(&search_pos, vj, vi);
                        if dist_sqr > search_rad_sqr {
                            continue;
                        }

                        // Mark as visited and queue.
                        if stack.len() < MAX_STACK {
                            node.pidx = cur_idx;
                            node.flags.insert(NodeFlags::CLOSED);
                            stack.push_back(neighbour_idx);
                        }
                    }
                }
                j = i;
            }
        }

        let visited = path_to_node(&self.tiny_node_pool, best_node, max_visited);
        Ok((best_pos, visited))
    }

    /// Height of a polygon's surface at the XZ location of `pos`
    pub fn get_poly_height(&self, reference: PolyRef, pos: &[f32; 3]) -> Result<Option<f32>> {
        let (tile, _, ip) = self.resolve(reference)?;
        Ok(tile.get_poly_height(ip, pos))
    }

    /// Closest point on a polygon and whether `pos` lies over it
    pub fn closest_point_on_poly(
        &self,
        reference: PolyRef,
        pos: &[f32; 3],
    ) -> Result<([f32; 3], bool)> {
        let (tile, _, ip) = self.resolve(reference)?;
        Ok(tile.closest_point_on_poly(ip, pos))
    }

    /// Closest point on a polygon's boundary; `pos` itself when inside
    pub fn closest_point_on_poly_boundary(
        &self,
        reference: PolyRef,
        pos: &[f32; 3],
    ) -> Result<[f32; 3]> {
        let (tile, _, ip) = self.resolve(reference)?;
        Ok(tile.closest_point_on_poly_boundary(ip, pos))
    }

    /// Polygons linked to `reference`, at most `max_neighbours`. Reversed
    /// one-way links are left out.
    pub fn get_poly_neighbours(
        &self,
        reference: PolyRef,
        max_neighbours: usize,
    ) -> Result<Vec<PolyRef>> {
        let (tile, _, ip) = self.resolve(reference)?;
        Ok(tile
            .poly_links(&tile.polys[ip])
            .filter(|l| !l.reversed)
            .map(|l| l.reference)
            .filter(PolyRef::is_valid)
            .take(max_neighbours)
            .collect())
    }

    /// Endpoints of an off-mesh connection oriented for a traversal arriving
    /// from `prev_ref`
    pub fn get_off_mesh_connection_poly_end_points(
        &self,
        prev_ref: Option<PolyRef>,
        poly_ref: PolyRef,
    ) -> Result<OffMeshEndPoints> {
        self.nav_mesh
            .get_off_mesh_connection_poly_end_points(prev_ref, poly_ref)
    }
}

/// Walks parent links back from `end` and returns the start-side prefix
fn path_to_node(pool: &NodePool, end: NodeIndex, max_path: usize) -> Vec<PolyRef> {
    let mut path = Vec::new();
    let mut idx = end;
    while let Some(node) = pool.node(idx) {
        path.push(node.id);
        idx = node.pidx;
        if path.len() > pool.node_count() {
            break;
        }
    }
    path.reverse();
    path.truncate(max_path);
    path
}

/// Flags of a funnel corner entering the given polygon
fn corner_flags(poly: PolyRef, poly_type: PolyType) -> StraightPathFlags {
    if !poly.is_valid() {
        StraightPathFlags::END
    } else if poly_type == PolyType::OffMeshConnection {
        StraightPathFlags::OFFMESH_CONNECTION
    } else {
        StraightPathFlags::empty()
    }
}
