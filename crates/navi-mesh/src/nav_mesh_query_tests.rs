//! Tests for polygon queries, corridor search and straight paths

#[cfg(test)]
mod tests {
    use crate::nav_mesh_query::{DEFAULT_HALF_EXTENTS, DEFAULT_MAX_NODES};
    use crate::test_mesh_helpers::{
        build_nav_mesh, open_field, two_islands, two_tile_strip, zigzag, DetailMode,
        GridTileBuilder, Terrain,
    };
    use crate::{NavMesh, NavMeshQuery, PolyFlags, PolyRef, QueryFilter, StraightPathFlags};
    use navi_common::{Error, Result};

    const EPS: f32 = 1e-3;

    fn approx(a: &[f32; 3], b: &[f32; 3]) -> bool {
        a.iter().zip(b).all(|(x, y)| (x - y).abs() < EPS)
    }

    fn nearest(query: &NavMeshQuery, pos: [f32; 3]) -> Result<PolyRef> {
        query
            .find_nearest_poly(&pos, &DEFAULT_HALF_EXTENTS, &QueryFilter::default())?
            .map(|(r, _)| r)
            .ok_or(Error::Detour("no polygon".into()))
    }

    fn poly_index(nav_mesh: &NavMesh, reference: PolyRef) -> u32 {
        nav_mesh.decode_poly_ref(reference).2
    }

    #[test]
    fn test_find_nearest_poly_over_surface() -> Result<()> {
        let nav_mesh = build_nav_mesh(&[open_field(4)])?;
        let query = NavMeshQuery::new(&nav_mesh, DEFAULT_MAX_NODES)?;
        let filter = QueryFilter::default();

        let found = query.find_nearest_poly(&[1.5, 3.0, 2.5], &DEFAULT_HALF_EXTENTS, &filter)?;
        let (reference, point) = found.ok_or(Error::Detour("no polygon".into()))?;
        assert_eq!(poly_index(&nav_mesh, reference), 9);
        assert!(approx(&point, &[1.5, 0.0, 2.5]));
        Ok(())
    }

    #[test]
    fn test_find_nearest_poly_outside_mesh() -> Result<()> {
        let nav_mesh = build_nav_mesh(&[open_field(4)])?;
        let query = NavMeshQuery::new(&nav_mesh, DEFAULT_MAX_NODES)?;
        let filter = QueryFilter::default();

        // Off the east side, snapped to the boundary
        let found = query.find_nearest_poly(&[6.0, 0.0, 0.5], &[3.0, 1.0, 3.0], &filter)?;
        let (reference, point) = found.ok_or(Error::Detour("no polygon".into()))?;
        assert_eq!(poly_index(&nav_mesh, reference), 3);
        assert!(approx(&point, &[4.0, 0.0, 0.5]));

        // Box does not reach the mesh
        let found = query.find_nearest_poly(&[50.0, 0.0, 50.0], &[1.0, 1.0, 1.0], &filter)?;
        assert!(found.is_none());
        Ok(())
    }

    #[test]
    fn test_find_nearest_poly_with_bv_tree() -> Result<()> {
        let nav_mesh = build_nav_mesh(&[open_field(4).bv_tree(true)])?;
        let query = NavMeshQuery::new(&nav_mesh, DEFAULT_MAX_NODES)?;
        let reference = nearest(&query, [3.5, 0.0, 0.5])?;
        assert_eq!(poly_index(&nav_mesh, reference), 3);
        Ok(())
    }

    #[test]
    fn test_find_nearest_poly_respects_filter() -> Result<()> {
        let tile = open_field(3).cell_flags(1, 1, PolyFlags::WALK | PolyFlags::DISABLED);
        let nav_mesh = build_nav_mesh(&[tile])?;
        let query = NavMeshQuery::new(&nav_mesh, DEFAULT_MAX_NODES)?;

        let filter = QueryFilter::new(PolyFlags::WALK, PolyFlags::DISABLED);
        let found = query.find_nearest_poly(&[1.5, 0.0, 1.5], &[2.0, 1.0, 2.0], &filter)?;
        let (reference, _) = found.ok_or(Error::Detour("no polygon".into()))?;
        assert_ne!(poly_index(&nav_mesh, reference), 4);

        assert!(query
            .find_nearest_poly(&[f32::NAN, 0.0, 0.0], &DEFAULT_HALF_EXTENTS, &filter)
            .is_err());
        Ok(())
    }

    #[test]
    fn test_find_path_straight_row() -> Result<()> {
        let nav_mesh = build_nav_mesh(&[open_field(5)])?;
        let mut query = NavMeshQuery::new(&nav_mesh, DEFAULT_MAX_NODES)?;
        let start = [0.5, 0.0, 0.5];
        let end = [4.5, 0.0, 0.5];
        let start_ref = nearest(&query, start)?;
        let end_ref = nearest(&query, end)?;

        let path =
            query.find_path(start_ref, end_ref, &start, &end, &QueryFilter::default(), 256)?;
        let indices: Vec<u32> = path.iter().map(|r| poly_index(&nav_mesh, *r)).collect();
        assert_eq!(indices, vec![0, 1, 2, 3, 4]);
        Ok(())
    }

    #[test]
    fn test_find_path_same_polygon() -> Result<()> {
        let nav_mesh = build_nav_mesh(&[open_field(2)])?;
        let mut query = NavMeshQuery::new(&nav_mesh, DEFAULT_MAX_NODES)?;
        let start_ref = nearest(&query, [0.5, 0.0, 0.5])?;
        let path = query.find_path(
            start_ref,
            start_ref,
            &[0.2, 0.0, 0.2],
            &[0.8, 0.0, 0.8],
            &QueryFilter::default(),
            256,
        )?;
        assert_eq!(path, vec![start_ref]);
        Ok(())
    }

    #[test]
    fn test_find_path_unreachable_is_empty() -> Result<()> {
        let nav_mesh = build_nav_mesh(&[two_islands()])?;
        let mut query = NavMeshQuery::new(&nav_mesh, DEFAULT_MAX_NODES)?;
        let start = [1.5, 0.0, 1.5];
        let end = [6.5, 0.0, 1.5];
        let start_ref = nearest(&query, start)?;
        let end_ref = nearest(&query, end)?;

        let path =
            query.find_path(start_ref, end_ref, &start, &end, &QueryFilter::default(), 256)?;
        assert!(path.is_empty());

        // Stale or null references are not an error either
        let path = query.find_path(
            PolyRef::NULL,
            end_ref,
            &start,
            &end,
            &QueryFilter::default(),
            256,
        )?;
        assert!(path.is_empty());
        Ok(())
    }

    #[test]
    fn test_find_path_truncates_to_start_side() -> Result<()> {
        let nav_mesh = build_nav_mesh(&[open_field(5)])?;
        let mut query = NavMeshQuery::new(&nav_mesh, DEFAULT_MAX_NODES)?;
        let start = [0.5, 0.0, 0.5];
        let end = [4.5, 0.0, 0.5];
        let start_ref = nearest(&query, start)?;
        let end_ref = nearest(&query, end)?;

        let path = query.find_path(start_ref, end_ref, &start, &end, &QueryFilter::default(), 2)?;
        assert_eq!(path.len(), 2);
        assert_eq!(path[0], start_ref);
        assert_eq!(poly_index(&nav_mesh, path[1]), 1);
        Ok(())
    }

    #[test]
    fn test_find_path_avoids_expensive_area() -> Result<()> {
        let nav_mesh = build_nav_mesh(&[open_field(3).cell_area(1, 1, 5)])?;
        let mut query = NavMeshQuery::new(&nav_mesh, DEFAULT_MAX_NODES)?;
        let start = [0.5, 0.0, 1.5];
        let end = [2.5, 0.0, 1.5];
        let start_ref = nearest(&query, start)?;
        let end_ref = nearest(&query, end)?;

        let cheap =
            query.find_path(start_ref, end_ref, &start, &end, &QueryFilter::default(), 256)?;
        assert_eq!(cheap.len(), 3);

        let mut filter = QueryFilter::default();
        filter.set_area_cost(5, 10.0);
        let detour = query.find_path(start_ref, end_ref, &start, &end, &filter, 256)?;
        assert_eq!(detour.len(), 5);
        assert!(detour.iter().all(|r| poly_index(&nav_mesh, *r) != 4));
        Ok(())
    }

    #[test]
    fn test_find_path_out_of_nodes_is_empty() -> Result<()> {
        let nav_mesh = build_nav_mesh(&[zigzag(12)])?;
        let mut query = NavMeshQuery::new(&nav_mesh, 8)?;
        let start = [0.5, 0.0, 0.5];
        let end = [0.5, 0.0, 11.5];
        let start_ref = nearest(&query, start)?;
        let end_ref = nearest(&query, end)?;

        let path =
            query.find_path(start_ref, end_ref, &start, &end, &QueryFilter::default(), 256)?;
        assert!(path.is_empty());
        Ok(())
    }

    #[test]
    fn test_find_path_across_tiles() -> Result<()> {
        let nav_mesh = build_nav_mesh(&two_tile_strip())?;
        let mut query = NavMeshQuery::new(&nav_mesh, DEFAULT_MAX_NODES)?;
        let start = [0.5, 0.0, 0.5];
        let end = [7.5, 0.0, 0.5];
        let start_ref = nearest(&query, start)?;
        let end_ref = nearest(&query, end)?;

        let path =
            query.find_path(start_ref, end_ref, &start, &end, &QueryFilter::default(), 256)?;
        assert_eq!(path.len(), 8);
        let tiles: Vec<u32> = path.iter().map(|r| nav_mesh.decode_poly_ref(*r).1).collect();
        assert_eq!(tiles, vec![0, 0, 0, 0, 1, 1, 1, 1]);
        Ok(())
    }

    #[test]
    fn test_partial_portal_across_tiles() -> Result<()> {
        // Fine west tile against a coarse east tile of the same width
        let tiles = [
            GridTileBuilder::new(0, 0, 4, 1.0),
            GridTileBuilder::new(1, 0, 2, 2.0),
        ];
        let nav_mesh = build_nav_mesh(&tiles)?;
        let query = NavMeshQuery::new(&nav_mesh, DEFAULT_MAX_NODES)?;

        let fine = nearest(&query, [3.5, 0.0, 0.5])?;
        let coarse = nearest(&query, [5.0, 0.0, 1.0])?;
        let portal = query.get_portal_points(coarse, fine)?;

        // Only the lower half of the coarse edge faces the fine cell
        assert!((portal.left[2] - 0.0).abs() < 0.01);
        assert!((portal.right[2] - 1.0).abs() < 0.01);
        assert!((portal.left[0] - 4.0).abs() < EPS);

        let portal = query.get_portal_points(fine, coarse)?;
        let span = (portal.left[2] - portal.right[2]).abs();
        assert!((span - 1.0).abs() < EPS);
        Ok(())
    }

    #[test]
    fn test_straight_path_around_corner() -> Result<()> {
        // Wall across the two western cells of the middle row
        let nav_mesh = build_nav_mesh(&[open_field(3).block(0, 1).block(1, 1)])?;
        let mut query = NavMeshQuery::new(&nav_mesh, DEFAULT_MAX_NODES)?;
        let start = [0.5, 0.0, 0.5];
        let end = [0.5, 0.0, 2.5];
        let start_ref = nearest(&query, start)?;
        let end_ref = nearest(&query, end)?;
        let filter = QueryFilter::default();

        let corridor = query.find_path(start_ref, end_ref, &start, &end, &filter, 256)?;
        assert_eq!(corridor.len(), 7);

        let points = query.find_straight_path(&start, &end, &corridor, 16)?;
        assert_eq!(points.len(), 4);
        assert_eq!(points[0].flags, StraightPathFlags::START);
        assert!(approx(&points[0].pos, &start));
        assert!(approx(&points[1].pos, &[2.0, 0.0, 1.0]));
        assert!(approx(&points[2].pos, &[2.0, 0.0, 2.0]));
        assert_eq!(points[3].flags, StraightPathFlags::END);
        assert!(approx(&points[3].pos, &end));
        assert!(!points[3].poly.is_valid());
        Ok(())
    }

    #[test]
    fn test_straight_path_limits() -> Result<()> {
        let nav_mesh = build_nav_mesh(&[open_field(3).block(0, 1).block(1, 1)])?;
        let mut query = NavMeshQuery::new(&nav_mesh, DEFAULT_MAX_NODES)?;
        let start = [0.5, 0.0, 0.5];
        let end = [0.5, 0.0, 2.5];
        let start_ref = nearest(&query, start)?;
        let end_ref = nearest(&query, end)?;
        let corridor =
            query.find_path(start_ref, end_ref, &start, &end, &QueryFilter::default(), 256)?;

        let points = query.find_straight_path(&start, &end, &corridor, 2)?;
        assert_eq!(points.len(), 2);
        assert!(!points[1].flags.contains(StraightPathFlags::END));

        // One polygon: start and end only, both clamped onto it
        let points = query.find_straight_path(&[-1.0, 0.0, 0.5], &[0.8, 0.0, 0.8], &[start_ref], 8)?;
        assert_eq!(points.len(), 2);
        assert!(approx(&points[0].pos, &[0.0, 0.0, 0.5]));
        assert_eq!(points[1].flags, StraightPathFlags::END);

        assert!(query.find_straight_path(&start, &end, &[], 8).is_err());
        Ok(())
    }

    #[test]
    fn test_straight_path_broken_corridor() -> Result<()> {
        let nav_mesh = build_nav_mesh(&[open_field(4)])?;
        let query = NavMeshQuery::new(&nav_mesh, DEFAULT_MAX_NODES)?;
        let a = nearest(&query, [0.5, 0.0, 0.5])?;
        let b = nearest(&query, [1.5, 0.0, 0.5])?;
        let far = nearest(&query, [3.5, 0.0, 3.5])?;

        // b and far are not adjacent, so the path stops inside b
        let points = query.find_straight_path(&[0.5, 0.0, 0.5], &[3.5, 0.0, 3.5], &[a, b, far], 8)?;
        let last = points.last().ok_or(Error::Detour("empty".into()))?;
        assert_eq!(last.poly, b);
        assert!(!last.flags.contains(StraightPathFlags::END));
        assert!(last.pos[0] <= 2.0 + EPS && last.pos[2] <= 1.0 + EPS);
        Ok(())
    }

    #[test]
    fn test_move_along_surface_reaches_target() -> Result<()> {
        let nav_mesh = build_nav_mesh(&[open_field(3)])?;
        let mut query = NavMeshQuery::new(&nav_mesh, DEFAULT_MAX_NODES)?;
        let start = [0.5, 0.0, 0.5];
        let start_ref = nearest(&query, start)?;

        let (pos, visited) = query.move_along_surface(
            start_ref,
            &start,
            &[2.5, 0.0, 0.5],
            &QueryFilter::default(),
            16,
        )?;
        assert!(approx(&pos, &[2.5, 0.0, 0.5]));
        let indices: Vec<u32> = visited.iter().map(|r| poly_index(&nav_mesh, *r)).collect();
        assert_eq!(indices, vec![0, 1, 2]);
        Ok(())
    }

    #[test]
    fn test_move_along_surface_slides_on_wall() -> Result<()> {
        let nav_mesh = build_nav_mesh(&[open_field(3)])?;
        let mut query = NavMeshQuery::new(&nav_mesh, DEFAULT_MAX_NODES)?;
        let start = [0.5, 0.0, 0.5];
        let start_ref = nearest(&query, start)?;

        let (pos, visited) = query.move_along_surface(
            start_ref,
            &start,
            &[0.5, 0.0, -1.0],
            &QueryFilter::default(),
            16,
        )?;
        assert!(approx(&pos, &[0.5, 0.0, 0.0]));
        assert_eq!(visited, vec![start_ref]);

        // Visited list is capped from the start side
        let (_, visited) = query.move_along_surface(
            start_ref,
            &start,
            &[2.5, 0.0, 0.5],
            &QueryFilter::default(),
            2,
        )?;
        assert_eq!(visited.len(), 2);
        assert_eq!(visited[0], start_ref);

        assert!(query
            .move_along_surface(PolyRef::NULL, &start, &start, &QueryFilter::default(), 16)
            .is_err());
        Ok(())
    }

    #[test]
    fn test_poly_height() -> Result<()> {
        let nav_mesh = build_nav_mesh(&[open_field(2).terrain(Terrain::SlopeX {
            base: 1.0,
            grade: 0.5,
        })])?;
        let query = NavMeshQuery::new(&nav_mesh, DEFAULT_MAX_NODES)?;
        let reference = nearest(&query, [0.5, 1.0, 0.5])?;

        let h = query.get_poly_height(reference, &[0.5, 0.0, 0.5])?;
        assert!(h.is_some_and(|h| (h - 1.25).abs() < EPS));
        assert_eq!(query.get_poly_height(reference, &[1.5, 0.0, 1.5])?, None);
        Ok(())
    }

    #[test]
    fn test_poly_height_uses_detail_mesh() -> Result<()> {
        let nav_mesh = build_nav_mesh(&[open_field(1).detail(DetailMode::Center(1.0))])?;
        let query = NavMeshQuery::new(&nav_mesh, DEFAULT_MAX_NODES)?;
        let reference = nearest(&query, [0.5, 0.0, 0.5])?;

        let centre = query.get_poly_height(reference, &[0.5, 0.0, 0.5])?;
        assert!(centre.is_some_and(|h| (h - 1.0).abs() < EPS));
        let halfway = query.get_poly_height(reference, &[0.25, 0.0, 0.5])?;
        assert!(halfway.is_some_and(|h| (h - 0.5).abs() < EPS));
        Ok(())
    }

    #[test]
    fn test_closest_point_on_poly() -> Result<()> {
        let nav_mesh = build_nav_mesh(&[open_field(1)])?;
        let query = NavMeshQuery::new(&nav_mesh, DEFAULT_MAX_NODES)?;
        let reference = nearest(&query, [0.5, 0.0, 0.5])?;

        let (point, over) = query.closest_point_on_poly(reference, &[0.5, 3.0, 0.5])?;
        assert!(over);
        assert!(approx(&point, &[0.5, 0.0, 0.5]));

        let (point, over) = query.closest_point_on_poly(reference, &[2.0, 0.0, 0.5])?;
        assert!(!over);
        assert!(approx(&point, &[1.0, 0.0, 0.5]));

        let inside = query.closest_point_on_poly_boundary(reference, &[0.5, 0.0, 0.5])?;
        assert!(approx(&inside, &[0.5, 0.0, 0.5]));
        let outside = query.closest_point_on_poly_boundary(reference, &[0.5, 0.0, -2.0])?;
        assert!(approx(&outside, &[0.5, 0.0, 0.0]));
        Ok(())
    }

    #[test]
    fn test_poly_neighbours() -> Result<()> {
        let nav_mesh = build_nav_mesh(&[open_field(3)])?;
        let query = NavMeshQuery::new(&nav_mesh, DEFAULT_MAX_NODES)?;
        let centre = nearest(&query, [1.5, 0.0, 1.5])?;

        let mut neighbours: Vec<u32> = query
            .get_poly_neighbours(centre, 16)?
            .iter()
            .map(|r| poly_index(&nav_mesh, *r))
            .collect();
        neighbours.sort();
        assert_eq!(neighbours, vec![1, 3, 5, 7]);
        assert_eq!(query.get_poly_neighbours(centre, 2)?.len(), 2);
        Ok(())
    }

    #[test]
    fn test_query_rejects_bad_pool_size() -> Result<()> {
        let nav_mesh = build_nav_mesh(&[open_field(1)])?;
        assert!(NavMeshQuery::new(&nav_mesh, 0).is_err());
        assert!(NavMeshQuery::new(&nav_mesh, 70_000).is_err());
        Ok(())
    }
}
