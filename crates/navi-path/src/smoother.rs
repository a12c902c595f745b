//! Follow-path smoothing
//!
//! Walks a polygon corridor in fixed steps. Each step heads for the first
//! straight-path corner that is not under the cursor, slides along the mesh
//! surface towards it and rewrites the corridor around the new position. The
//! cursor after every step is one output point.

use glam::Vec3;
use navi_common::Result;
use navi_mesh::{NavMeshQuery, PolyRef, QueryFilter};

use crate::config::SteerParams;
use crate::corridor::Corridor;
use crate::off_mesh::OffMeshConnectionHandler;
use crate::steering::{get_steer_target, in_range, SteerTarget};
use crate::MAX_VISITED;

/// State of the smoothing walk
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SmoothState {
    /// Stepping towards the next steer point
    Seeking,
    /// Arrived at the end of the corridor
    ApproachingEnd,
    /// Arrived at the take-off point of an off-mesh connection
    TraversingLink(PolyRef),
    /// Corridor exhausted, target reached or nothing left to steer to
    Done,
    /// Output capacity reached before the target
    Truncated,
}

/// Turns a corridor into a sequence of follow points
pub struct PathSmoother<'q, 'm> {
    query: &'q mut NavMeshQuery<'m>,
    filter: &'q QueryFilter,
    steer: SteerParams,
    max_points: usize,
    off_mesh: OffMeshConnectionHandler,
    state: SmoothState,
}

impl<'q, 'm> PathSmoother<'q, 'm> {
    pub fn new(
        query: &'q mut NavMeshQuery<'m>,
        filter: &'q QueryFilter,
        steer: SteerParams,
        max_points: usize,
        off_mesh: OffMeshConnectionHandler,
    ) -> Self {
        Self {
            query,
            filter,
            steer,
            max_points,
            off_mesh,
            state: SmoothState::Seeking,
        }
    }

    /// State the last walk ended in
    pub fn state(&self) -> SmoothState {
        self.state
    }

    /// Walks `corridor` from `start` to `target`.
    ///
    /// `start` must lie on the corridor head and `target` on its last polygon.
    /// The first point returned is `start`; at most `max_points` points are
    /// returned.
    pub fn smooth(&mut self, mut corridor: Corridor, start: Vec3, target: Vec3) -> Result<Vec<Vec3>> {
        let mut points = Vec::with_capacity(self.max_points.min(256));
        let mut cursor = start;
        self.state = SmoothState::Seeking;
        push_point(&mut points, self.max_points, cursor);

        loop {
            self.state = match self.state {
                SmoothState::Seeking => {
                    if corridor.is_empty() {
                        SmoothState::Done
                    } else if points.len() >= self.max_points {
                        SmoothState::Truncated
                    } else {
                        self.step(&mut corridor, &mut cursor, target, &mut points)?
                    }
                }
                SmoothState::ApproachingEnd => {
                    cursor = target;
                    push_point(&mut points, self.max_points, cursor);
                    SmoothState::Done
                }
                SmoothState::TraversingLink(connection) => {
                    self.traverse(&mut corridor, &mut cursor, connection, &mut points);
                    push_point(&mut points, self.max_points, cursor);
                    SmoothState::Seeking
                }
                SmoothState::Done | SmoothState::Truncated => break,
            };
        }

        log::debug!(
            "follow path ended {:?} with {} points, {} polygons left",
            self.state,
            points.len(),
            corridor.len()
        );
        Ok(points)
    }

    /// Moves the cursor one step and decides what happens next
    fn step(
        &mut self,
        corridor: &mut Corridor,
        cursor: &mut Vec3,
        target: Vec3,
        points: &mut Vec<Vec3>,
    ) -> Result<SmoothState> {
        let Some(steer) = get_steer_target(self.query, *cursor, target, corridor.path(), &self.steer)
        else {
            return Ok(SmoothState::Done);
        };
        let Some(head) = corridor.head() else {
            return Ok(SmoothState::Done);
        };

        let move_target = self.move_target(*cursor, &steer);
        let (result, visited) = self.query.move_along_surface(
            head,
            &cursor.to_array(),
            &move_target.to_array(),
            self.filter,
            MAX_VISITED,
        )?;

        corridor.fixup_start_moved(&visited);
        corridor.fixup_shortcuts(self.query)?;

        let mut moved = Vec3::from(result);
        moved.y = self.surface_height(corridor, moved).unwrap_or(moved.y);
        *cursor = moved;

        let arrived = in_range(*cursor, steer.pos, self.steer.slop, self.steer.arrival_height);
        if steer.is_end() && arrived {
            return Ok(SmoothState::ApproachingEnd);
        }
        if steer.is_off_mesh() && arrived {
            return Ok(SmoothState::TraversingLink(steer.poly));
        }

        push_point(points, self.max_points, *cursor);
        Ok(SmoothState::Seeking)
    }

    /// Where one step towards the steer point ends. End and connection points
    /// closer than a step are reached exactly.
    fn move_target(&self, cursor: Vec3, steer: &SteerTarget) -> Vec3 {
        let delta = steer.pos - cursor;
        let len = delta.length();
        let scale = if (steer.is_end() || steer.is_off_mesh()) && len < self.steer.step_size {
            1.0
        } else {
            self.steer.step_size / len
        };
        if scale.is_finite() {
            cursor + delta * scale
        } else {
            steer.pos
        }
    }

    /// Crosses a connection and puts the cursor at its exit
    fn traverse(
        &mut self,
        corridor: &mut Corridor,
        cursor: &mut Vec3,
        connection: PolyRef,
        points: &mut Vec<Vec3>,
    ) {
        let Some(previous) = corridor.advance_past(connection) else {
            log::debug!("connection {} is not on the corridor", connection);
            return;
        };
        let Some((entry, exit)) = self.off_mesh.resolve(self.query, previous, connection) else {
            return;
        };

        if push_point(points, self.max_points, entry) && points.len() % 2 == 1 {
            push_point(points, self.max_points, entry);
        }

        *cursor = exit;
        if let Some(h) = self.surface_height(corridor, exit) {
            cursor.y = h;
        }
    }

    /// Height of the corridor head's surface under `pos`
    fn surface_height(&self, corridor: &Corridor, pos: Vec3) -> Option<f32> {
        let head = corridor.head()?;
        self.query.get_poly_height(head, &pos.to_array()).ok().flatten()
    }
}

/// Appends a point when there is room left. Returns whether it was added.
fn push_point(points: &mut Vec<Vec3>, max_points: usize, point: Vec3) -> bool {
    if points.len() < max_points {
        points.push(point);
        true
    } else {
        false
    }
}
