//! Off-mesh connection traversal

use glam::Vec3;
use navi_mesh::{NavMeshQuery, PolyRef};

use crate::config::OffMeshDirection;

/// Resolves where the walk enters and leaves an off-mesh connection
#[derive(Debug, Clone, Copy, Default)]
pub struct OffMeshConnectionHandler {
    direction: OffMeshDirection,
}

impl OffMeshConnectionHandler {
    pub fn new(direction: OffMeshDirection) -> Self {
        Self { direction }
    }

    pub fn direction(&self) -> OffMeshDirection {
        self.direction
    }

    /// Entry and exit points of `connection` for a walk arriving from
    /// `previous`.
    ///
    /// Returns `None` when `connection` is not an off-mesh connection, or when
    /// the walk would run a one-way connection backwards and the handler only
    /// allows authored directions.
    pub fn resolve(
        &self,
        query: &NavMeshQuery,
        previous: Option<PolyRef>,
        connection: PolyRef,
    ) -> Option<(Vec3, Vec3)> {
        let ends = match query.get_off_mesh_connection_poly_end_points(previous, connection) {
            Ok(ends) => ends,
            Err(e) => {
                log::debug!("cannot traverse {}: {}", connection, e);
                return None;
            }
        };

        if ends.reversed
            && !ends.bidirectional
            && self.direction == OffMeshDirection::AsAuthored
        {
            log::debug!("refusing to run one-way connection {} backwards", connection);
            return None;
        }

        Some((Vec3::from(ends.start), Vec3::from(ends.end)))
    }
}
