//! Tests for off-mesh connection traversal

#[cfg(test)]
mod tests {
    use crate::nav_mesh_query::{DEFAULT_HALF_EXTENTS, DEFAULT_MAX_NODES};
    use crate::test_mesh_helpers::{build_nav_mesh, jump_gap, open_field};
    use crate::{NavMesh, NavMeshQuery, PolyRef, QueryFilter, StraightPathFlags};
    use navi_common::{Error, Result};

    const LOW: [f32; 3] = [2.5, 0.0, 1.5];
    const HIGH: [f32; 3] = [6.5, 2.0, 1.5];
    const TAKE_OFF: [f32; 3] = [3.5, 0.0, 1.5];
    const LANDING: [f32; 3] = [5.5, 2.0, 1.5];

    fn approx(a: &[f32; 3], b: &[f32; 3]) -> bool {
        a.iter().zip(b).all(|(x, y)| (x - y).abs() < 1e-3)
    }

    fn poly(nav_mesh: &NavMesh, ip: u32) -> PolyRef {
        PolyRef::new(nav_mesh.get_poly_ref_base(0).id() | ip)
    }

    fn corridor(query: &mut NavMeshQuery, from: [f32; 3], to: [f32; 3]) -> Result<Vec<PolyRef>> {
        corridor_with(query, from, to, &QueryFilter::default())
    }

    fn corridor_with(
        query: &mut NavMeshQuery,
        from: [f32; 3],
        to: [f32; 3],
        filter: &QueryFilter,
    ) -> Result<Vec<PolyRef>> {
        let start = query
            .find_nearest_poly(&from, &DEFAULT_HALF_EXTENTS, filter)?
            .ok_or(Error::Detour("no start polygon".into()))?;
        let end = query
            .find_nearest_poly(&to, &DEFAULT_HALF_EXTENTS, filter)?
            .ok_or(Error::Detour("no end polygon".into()))?;
        query.find_path(start.0, end.0, &from, &to, filter, 256)
    }

    #[test]
    fn test_end_points_follow_arrival() -> Result<()> {
        let nav_mesh = build_nav_mesh(&[jump_gap(true)])?;
        let query = NavMeshQuery::new(&nav_mesh, DEFAULT_MAX_NODES)?;
        let con = poly(&nav_mesh, 24);

        // Arriving from the take-off cell keeps the authored order
        let ends = query.get_off_mesh_connection_poly_end_points(Some(poly(&nav_mesh, 11)), con)?;
        assert!(!ends.reversed);
        assert!(ends.bidirectional);
        assert!(approx(&ends.start, &TAKE_OFF));
        assert!(approx(&ends.end, &LANDING));

        // Arriving from the ledge swaps them
        let ends = query.get_off_mesh_connection_poly_end_points(Some(poly(&nav_mesh, 12)), con)?;
        assert!(ends.reversed);
        assert!(approx(&ends.start, &LANDING));
        assert!(approx(&ends.end, &TAKE_OFF));

        // Unknown arrival uses the authored order
        let ends = query.get_off_mesh_connection_poly_end_points(None, con)?;
        assert!(!ends.reversed);
        assert!(approx(&ends.start, &TAKE_OFF));
        Ok(())
    }

    #[test]
    fn test_end_points_rejects_ground_polygon() -> Result<()> {
        let nav_mesh = build_nav_mesh(&[jump_gap(false)])?;
        let query = NavMeshQuery::new(&nav_mesh, DEFAULT_MAX_NODES)?;
        assert!(query
            .get_off_mesh_connection_poly_end_points(None, poly(&nav_mesh, 11))
            .is_err());
        assert!(query
            .get_off_mesh_connection_poly_end_points(None, PolyRef::NULL)
            .is_err());

        let con = nav_mesh.get_off_mesh_connection_by_ref(poly(&nav_mesh, 24))?;
        assert_eq!(con.user_id, 1);
        assert!(!con.is_bidirectional());
        Ok(())
    }

    #[test]
    fn test_path_crosses_gap_through_connection() -> Result<()> {
        let nav_mesh = build_nav_mesh(&[jump_gap(false)])?;
        let mut query = NavMeshQuery::new(&nav_mesh, DEFAULT_MAX_NODES)?;

        let path = corridor(&mut query, LOW, HIGH)?;
        let indices: Vec<u32> = path.iter().map(|r| nav_mesh.decode_poly_ref(*r).2).collect();
        assert_eq!(indices, vec![10, 11, 24, 12, 13]);
        Ok(())
    }

    #[test]
    fn test_one_way_connection_blocks_return() -> Result<()> {
        let nav_mesh = build_nav_mesh(&[jump_gap(false)])?;
        let mut query = NavMeshQuery::new(&nav_mesh, DEFAULT_MAX_NODES)?;
        assert!(corridor(&mut query, HIGH, LOW)?.is_empty());

        let nav_mesh = build_nav_mesh(&[jump_gap(true)])?;
        let mut query = NavMeshQuery::new(&nav_mesh, DEFAULT_MAX_NODES)?;
        let path = corridor(&mut query, HIGH, LOW)?;
        assert!(path.contains(&poly(&nav_mesh, 24)));
        Ok(())
    }

    #[test]
    fn test_one_way_connection_reversed_on_request() -> Result<()> {
        let nav_mesh = build_nav_mesh(&[jump_gap(false)])?;
        let mut query = NavMeshQuery::new(&nav_mesh, DEFAULT_MAX_NODES)?;
        let mut filter = QueryFilter::default();
        filter.reverse_one_way = true;

        let path = corridor_with(&mut query, HIGH, LOW, &filter)?;
        let indices: Vec<u32> = path.iter().map(|r| nav_mesh.decode_poly_ref(*r).2).collect();
        assert_eq!(indices, vec![13, 12, 24, 11, 10]);

        // Taken backwards the jump starts on the ledge
        let points = query.find_straight_path(&HIGH, &LOW, &path, 16)?;
        assert_eq!(points.len(), 4);
        assert!(points[1].flags.contains(StraightPathFlags::OFFMESH_CONNECTION));
        assert!(approx(&points[1].pos, &LANDING));
        assert!(approx(&points[2].pos, &TAKE_OFF));

        let ends = query.get_off_mesh_connection_poly_end_points(Some(poly(&nav_mesh, 12)), path[2])?;
        assert!(ends.reversed && !ends.bidirectional);

        // Neighbour lists never offer the reversed link
        let neighbours = query.get_poly_neighbours(poly(&nav_mesh, 12), 16)?;
        assert!(!neighbours.contains(&poly(&nav_mesh, 24)));
        Ok(())
    }

    #[test]
    fn test_straight_path_marks_connection() -> Result<()> {
        let nav_mesh = build_nav_mesh(&[jump_gap(false)])?;
        let mut query = NavMeshQuery::new(&nav_mesh, DEFAULT_MAX_NODES)?;
        let path = corridor(&mut query, LOW, HIGH)?;

        let points = query.find_straight_path(&LOW, &HIGH, &path, 16)?;
        assert_eq!(points.len(), 4);
        assert_eq!(points[0].flags, StraightPathFlags::START);

        assert!(points[1].flags.contains(StraightPathFlags::OFFMESH_CONNECTION));
        assert_eq!(points[1].poly, poly(&nav_mesh, 24));
        assert!(approx(&points[1].pos, &TAKE_OFF));

        assert!(approx(&points[2].pos, &LANDING));
        assert!(!points[2].flags.contains(StraightPathFlags::OFFMESH_CONNECTION));

        assert_eq!(points[3].flags, StraightPathFlags::END);
        assert!(approx(&points[3].pos, &HIGH));
        Ok(())
    }

    #[test]
    fn test_connection_polygons_are_not_nearest() -> Result<()> {
        let nav_mesh = build_nav_mesh(&[jump_gap(false)])?;
        let query = NavMeshQuery::new(&nav_mesh, DEFAULT_MAX_NODES)?;
        // Right over the gap the ground on either side is closer than the link
        let found = query
            .find_nearest_poly(&[4.5, 1.0, 1.5], &DEFAULT_HALF_EXTENTS, &QueryFilter::default())?
            .ok_or(Error::Detour("no polygon".into()))?;
        assert_ne!(nav_mesh.decode_poly_ref(found.0).2, 24);

        let nav_mesh = build_nav_mesh(&[open_field(2)])?;
        assert!(nav_mesh.get_off_mesh_connection_by_ref(nav_mesh.get_poly_ref_base(0)).is_err());
        Ok(())
    }
}
