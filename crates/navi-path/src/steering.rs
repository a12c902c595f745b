//! Steer point selection

use glam::Vec3;
use navi_mesh::{NavMeshQuery, PolyRef, StraightPathFlags};

use crate::config::SteerParams;
use crate::MAX_STEER_POINTS;

/// Point the walk heads for next
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SteerTarget {
    /// Target position at the cursor's height
    pub pos: Vec3,
    pub flags: StraightPathFlags,
    /// Polygon entered at the target
    pub poly: PolyRef,
}

impl SteerTarget {
    pub fn is_end(&self) -> bool {
        self.flags.contains(StraightPathFlags::END)
    }

    pub fn is_off_mesh(&self) -> bool {
        self.flags.contains(StraightPathFlags::OFFMESH_CONNECTION)
    }
}

/// True when `b` is horizontally within `radius` of `a` and vertically
/// within `height`
pub fn in_range(a: Vec3, b: Vec3, radius: f32, height: f32) -> bool {
    let dx = b.x - a.x;
    let dy = b.y - a.y;
    let dz = b.z - a.z;
    dx * dx + dz * dz < radius * radius && dy.abs() < height
}

/// Picks the first straight-path point that is not already under the cursor.
///
/// Off-mesh connection points are never skipped. Returns `None` when every
/// point is within the slop radius or no straight path exists.
pub fn get_steer_target(
    query: &NavMeshQuery,
    start: Vec3,
    end: Vec3,
    corridor: &[PolyRef],
    params: &SteerParams,
) -> Option<SteerTarget> {
    let points = match query.find_straight_path(
        &start.to_array(),
        &end.to_array(),
        corridor,
        MAX_STEER_POINTS,
    ) {
        Ok(points) => points,
        Err(e) => {
            log::debug!("no straight path to steer along: {}", e);
            return None;
        }
    };

    let point = points.iter().find(|p| {
        p.flags.contains(StraightPathFlags::OFFMESH_CONNECTION)
            || !in_range(Vec3::from(p.pos), start, params.slop, params.steer_height)
    })?;

    let mut pos = Vec3::from(point.pos);
    pos.y = start.y;
    Some(SteerTarget {
        pos,
        flags: point.flags,
        poly: point.poly,
    })
}
