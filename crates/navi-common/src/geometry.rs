//! Geometry operations for navigation mesh queries
//!
//! Most operations work on the XZ plane (Y-up coordinate system). Points are
//! plain `[f32; 3]` arrays or slices of at least three floats, the layout the
//! tile vertex buffers use.

/// Squared tolerance used by [`vequal`] (1/16384 in each direction)
const EQUAL_THRESHOLD_SQR: f32 = (1.0 / 16384.0) * (1.0 / 16384.0);

/// Calculate twice the signed area of a 2D triangle on the XZ plane.
///
/// The sign indicates the winding order:
/// - Positive: clockwise (when looking down Y axis)
/// - Negative: counter-clockwise (when looking down Y axis)
/// - Zero: degenerate (collinear points)
#[inline]
pub fn tri_area_2d(a: &[f32], b: &[f32], c: &[f32]) -> f32 {
    let abx = b[0] - a[0];
    let abz = b[2] - a[2];
    let acx = c[0] - a[0];
    let acz = c[2] - a[2];
    acx * abz - abx * acz
}

#[inline]
pub fn vsub(a: &[f32], b: &[f32]) -> [f32; 3] {
    [a[0] - b[0], a[1] - b[1], a[2] - b[2]]
}

/// Returns `a + b * s`
#[inline]
pub fn vmad(a: &[f32], b: &[f32], s: f32) -> [f32; 3] {
    [a[0] + b[0] * s, a[1] + b[1] * s, a[2] + b[2] * s]
}

/// Linear interpolation between two points
#[inline]
pub fn vlerp(a: &[f32], b: &[f32], t: f32) -> [f32; 3] {
    [
        a[0] + (b[0] - a[0]) * t,
        a[1] + (b[1] - a[1]) * t,
        a[2] + (b[2] - a[2]) * t,
    ]
}

#[inline]
pub fn vdot(a: &[f32], b: &[f32]) -> f32 {
    a[0] * b[0] + a[1] * b[1] + a[2] * b[2]
}

#[inline]
pub fn vdist_sqr(a: &[f32], b: &[f32]) -> f32 {
    let d = vsub(b, a);
    vdot(&d, &d)
}

#[inline]
pub fn vdist(a: &[f32], b: &[f32]) -> f32 {
    vdist_sqr(a, b).sqrt()
}

/// Squared distance between two points on the XZ plane
#[inline]
pub fn vdist_2d_sqr(a: &[f32], b: &[f32]) -> f32 {
    let dx = b[0] - a[0];
    let dz = b[2] - a[2];
    dx * dx + dz * dz
}

/// Checks two points for equality within a small fixed tolerance
#[inline]
pub fn vequal(a: &[f32], b: &[f32]) -> bool {
    vdist_sqr(a, b) < EQUAL_THRESHOLD_SQR
}

/// Copies the first three components of a slice into a point
#[inline]
pub fn vcopy(v: &[f32]) -> [f32; 3] {
    [v[0], v[1], v[2]]
}

/// Check whether two axis-aligned bounding boxes overlap (inclusive).
#[inline]
pub fn overlap_bounds(amin: &[f32; 3], amax: &[f32; 3], bmin: &[f32; 3], bmax: &[f32; 3]) -> bool {
    !(amin[0] > bmax[0]
        || amax[0] < bmin[0]
        || amin[1] > bmax[1]
        || amax[1] < bmin[1]
        || amin[2] > bmax[2]
        || amax[2] < bmin[2])
}

/// Check whether two quantized bounding boxes overlap (inclusive).
#[inline]
pub fn overlap_quant_bounds(
    amin: &[u16; 3],
    amax: &[u16; 3],
    bmin: &[u16; 3],
    bmax: &[u16; 3],
) -> bool {
    !(amin[0] > bmax[0]
        || amax[0] < bmin[0]
        || amin[1] > bmax[1]
        || amax[1] < bmin[1]
        || amin[2] > bmax[2]
        || amax[2] < bmin[2])
}

/// Squared distance from a point to a segment on the XZ plane.
///
/// Returns the squared distance together with the parametric position of the
/// closest point along `p -> q`.
pub fn dist_pt_seg_sqr_2d(pt: &[f32], p: &[f32], q: &[f32]) -> (f32, f32) {
    let pqx = q[0] - p[0];
    let pqz = q[2] - p[2];
    let dx = pt[0] - p[0];
    let dz = pt[2] - p[2];
    let d = pqx * pqx + pqz * pqz;
    let mut t = pqx * dx + pqz * dz;
    if d > 0.0 {
        t /= d;
    }
    let t = t.clamp(0.0, 1.0);
    let dx = p[0] + t * pqx - pt[0];
    let dz = p[2] + t * pqz - pt[2];
    (dx * dx + dz * dz, t)
}

/// Point-in-polygon test on the XZ plane.
///
/// `verts` holds `nverts` packed points.
pub fn point_in_polygon(pt: &[f32], verts: &[f32], nverts: usize) -> bool {
    let mut inside = false;
    let mut j = nverts.wrapping_sub(1);
    for i in 0..nverts {
        let vi = &verts[i * 3..i * 3 + 3];
        let vj = &verts[j * 3..j * 3 + 3];
        if ((vi[2] > pt[2]) != (vj[2] > pt[2]))
            && (pt[0] < (vj[0] - vi[0]) * (pt[2] - vi[2]) / (vj[2] - vi[2]) + vi[0])
        {
            inside = !inside;
        }
        j = i;
    }
    inside
}

/// Point-in-polygon test that also records the squared distance to every edge.
///
/// `ed[j]` and `et[j]` receive the distance and segment parameter for the edge
/// that starts at vertex `j`.
pub fn distance_pt_poly_edges_sqr(
    pt: &[f32],
    verts: &[f32],
    nverts: usize,
    ed: &mut [f32],
    et: &mut [f32],
) -> bool {
    let mut inside = false;
    let mut j = nverts.wrapping_sub(1);
    for i in 0..nverts {
        let vi = &verts[i * 3..i * 3 + 3];
        let vj = &verts[j * 3..j * 3 + 3];
        if ((vi[2] > pt[2]) != (vj[2] > pt[2]))
            && (pt[0] < (vj[0] - vi[0]) * (pt[2] - vi[2]) / (vj[2] - vi[2]) + vi[0])
        {
            inside = !inside;
        }
        let (d, t) = dist_pt_seg_sqr_2d(pt, vj, vi);
        ed[j] = d;
        et[j] = t;
        j = i;
    }
    inside
}

/// Height of the triangle surface at the XZ location of `p`.
///
/// Returns `None` when the point lies outside the triangle or the triangle is
/// degenerate on the XZ plane.
pub fn closest_height_point_triangle(p: &[f32], a: &[f32], b: &[f32], c: &[f32]) -> Option<f32> {
    const EPS: f32 = 1e-6;

    let v0 = vsub(c, a);
    let v1 = vsub(b, a);
    let v2 = vsub(p, a);

    // Compute scaled barycentric coordinates
    let mut denom = v0[0] * v1[2] - v0[2] * v1[0];
    if denom.abs() < EPS {
        return None;
    }

    let mut u = v1[2] * v2[0] - v1[0] * v2[2];
    let mut v = v0[0] * v2[2] - v0[2] * v2[0];

    if denom < 0.0 {
        denom = -denom;
        u = -u;
        v = -v;
    }

    // If point lies inside the triangle, return interpolated y-coordinate.
    if u >= 0.0 && v >= 0.0 && (u + v) <= denom {
        Some(a[1] + (v0[1] * u + v1[1] * v) / denom)
    } else {
        None
    }
}

/// Rounds up to the next power of two (0 stays 0)
pub fn next_pow2(mut v: u32) -> u32 {
    v = v.wrapping_sub(1);
    v |= v >> 1;
    v |= v >> 2;
    v |= v >> 4;
    v |= v >> 8;
    v |= v >> 16;
    v.wrapping_add(1)
}

/// Integer base-2 logarithm, rounded down (0 for 0)
pub fn ilog2(v: u32) -> u32 {
    if v == 0 {
        0
    } else {
        31 - v.leading_zeros()
    }
}

/// Returns the tile side opposite to `side` (0..7 around the compass)
#[inline]
pub fn opposite_tile(side: i32) -> i32 {
    (side + 4) & 0x7
}
