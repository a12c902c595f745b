//! Polygon corridor followed by the smoother
//!
//! The corridor is the ordered list of polygons the walk believes it still has
//! to cross, head first. It is rewritten after every step: polygons the move
//! went through are merged in at the head, and loops that a neighbour of the
//! head polygon short-circuits are cut out.

use navi_common::Result;
use navi_mesh::{NavMeshQuery, PolyRef};

use crate::{MAX_LOOK_AHEAD, MAX_NEIGHBOURS};

/// Bounded polygon corridor
#[derive(Debug, Clone, PartialEq)]
pub struct Corridor {
    path: Vec<PolyRef>,
    capacity: usize,
}

impl Corridor {
    /// Creates a corridor holding at most `capacity` polygons. Entries past the
    /// capacity are dropped from the far end.
    pub fn new(mut path: Vec<PolyRef>, capacity: usize) -> Self {
        path.truncate(capacity);
        Self { path, capacity }
    }

    /// Polygon the walk is currently on
    pub fn head(&self) -> Option<PolyRef> {
        self.path.first().copied()
    }

    pub fn path(&self) -> &[PolyRef] {
        &self.path
    }

    pub fn len(&self) -> usize {
        self.path.len()
    }

    pub fn is_empty(&self) -> bool {
        self.path.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Merges the polygons visited by a move that started at the head.
    ///
    /// Finds the furthest corridor entry that was visited and replaces
    /// everything up to it with the visited polygons, most recent first.
    /// Returns false and leaves the corridor alone when the move shares no
    /// polygon with it.
    pub fn fixup_start_moved(&mut self, visited: &[PolyRef]) -> bool {
        let common = self.path.iter().enumerate().rev().find_map(|(i, reference)| {
            visited
                .iter()
                .position(|v| v == reference)
                .map(|j| (i, j))
        });
        let Some((furthest_path, furthest_visited)) = common else {
            return false;
        };

        let mut merged: Vec<PolyRef> = visited[furthest_visited..].iter().rev().copied().collect();
        merged.extend_from_slice(&self.path[furthest_path + 1..]);
        merged.truncate(self.capacity);
        self.path = merged;
        true
    }

    /// Cuts out a detour when a polygon a few entries ahead is a direct
    /// neighbour of the head. Returns true when the corridor got shorter.
    pub fn fixup_shortcuts(&mut self, query: &NavMeshQuery) -> Result<bool> {
        if self.path.len() < 3 {
            return Ok(false);
        }

        let neighbours = query.get_poly_neighbours(self.path[0], MAX_NEIGHBOURS)?;
        let look_ahead = MAX_LOOK_AHEAD.min(self.path.len());
        let cut = (2..look_ahead)
            .rev()
            .find(|&i| neighbours.contains(&self.path[i]));

        match cut {
            Some(cut) => {
                self.path.drain(1..cut);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Drops every polygon up to and including `target`.
    ///
    /// Returns the polygon the corridor held just before `target`, if any.
    /// When `target` is not in the corridor the corridor is emptied and `None`
    /// is returned. A `target` at the head is dropped too and yields
    /// `Some(None)`, so its connection resolves in authored order.
    pub fn advance_past(&mut self, target: PolyRef) -> Option<Option<PolyRef>> {
        let Some(k) = self.path.iter().position(|&r| r == target) else {
            self.path.clear();
            return None;
        };
        let previous = k.checked_sub(1).map(|p| self.path[p]);
        self.path.drain(..=k);
        Some(previous)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use navi_common::Error;
    use navi_mesh::nav_mesh_query::DEFAULT_MAX_NODES;
    use navi_mesh::test_mesh_helpers::{build_nav_mesh, open_field};

    fn refs(ids: &[u32]) -> Vec<PolyRef> {
        ids.iter().map(|&i| PolyRef::new(i)).collect()
    }

    #[test]
    fn test_capacity_truncates_far_end() {
        let corridor = Corridor::new(refs(&[1, 2, 3, 4]), 3);
        assert_eq!(corridor.path(), refs(&[1, 2, 3]).as_slice());
        assert_eq!(corridor.head(), Some(PolyRef::new(1)));
    }

    #[test]
    fn test_fixup_moved_forward() {
        let mut corridor = Corridor::new(refs(&[1, 2, 3, 4, 5]), 256);
        assert!(corridor.fixup_start_moved(&refs(&[1, 2, 3])));
        assert_eq!(corridor.path(), refs(&[3, 4, 5]).as_slice());
    }

    #[test]
    fn test_fixup_moved_off_corridor() {
        // The move left the corridor through 5 into 6
        let mut corridor = Corridor::new(refs(&[1, 2, 3]), 256);
        assert!(corridor.fixup_start_moved(&refs(&[1, 5, 6])));
        assert_eq!(corridor.path(), refs(&[6, 5, 1, 2, 3]).as_slice());

        // Only the furthest corridor match counts
        let mut corridor = Corridor::new(refs(&[1, 2, 3, 4]), 256);
        assert!(corridor.fixup_start_moved(&refs(&[1, 7, 3])));
        assert_eq!(corridor.path(), refs(&[3, 4]).as_slice());

        // Moving within the head leaves it as is
        let mut corridor = Corridor::new(refs(&[1, 2]), 256);
        assert!(corridor.fixup_start_moved(&refs(&[1])));
        assert_eq!(corridor.path(), refs(&[1, 2]).as_slice());
    }

    #[test]
    fn test_fixup_moved_no_common_polygon() {
        let mut corridor = Corridor::new(refs(&[1, 2, 3]), 256);
        assert!(!corridor.fixup_start_moved(&refs(&[8, 9])));
        assert!(!corridor.fixup_start_moved(&[]));
        assert_eq!(corridor.path(), refs(&[1, 2, 3]).as_slice());
    }

    #[test]
    fn test_fixup_moved_is_idempotent() {
        let visited = refs(&[1, 6, 2]);
        let mut corridor = Corridor::new(refs(&[1, 2, 3, 4]), 256);
        corridor.fixup_start_moved(&visited);
        let once = corridor.clone();
        corridor.fixup_start_moved(&visited);
        assert_eq!(corridor, once);
    }

    #[test]
    fn test_fixup_moved_respects_capacity() {
        let mut corridor = Corridor::new(refs(&[1, 2, 3]), 3);
        corridor.fixup_start_moved(&refs(&[1, 5, 6]));
        assert_eq!(corridor.len(), 3);
        assert_eq!(corridor.path(), refs(&[6, 5, 1]).as_slice());
    }

    #[test]
    fn test_fixup_shortcuts() -> Result<()> {
        let nav_mesh = build_nav_mesh(&[open_field(3)])?;
        let query = NavMeshQuery::new(&nav_mesh, DEFAULT_MAX_NODES)?;
        let base = nav_mesh.get_poly_ref_base(0).id();
        let poly = |ip: u32| PolyRef::new(base | ip);

        // 0 -> 1 -> 4 -> 3 loops around a corner: 3 borders 0 directly
        let mut corridor = Corridor::new(vec![poly(0), poly(1), poly(4), poly(3), poly(6)], 256);
        assert!(corridor.fixup_shortcuts(&query)?);
        assert_eq!(corridor.path(), &[poly(0), poly(3), poly(6)]);

        // Nothing to cut on a straight run
        let mut corridor = Corridor::new(vec![poly(0), poly(1), poly(2)], 256);
        assert!(!corridor.fixup_shortcuts(&query)?);
        assert_eq!(corridor.len(), 3);

        // Too short to shortcut, even with an invalid head
        let mut corridor = Corridor::new(vec![PolyRef::NULL, poly(1)], 256);
        assert!(!corridor.fixup_shortcuts(&query)?);

        let mut corridor = Corridor::new(vec![PolyRef::NULL, poly(1), poly(2)], 256);
        assert!(matches!(corridor.fixup_shortcuts(&query), Err(Error::Detour(_))));
        Ok(())
    }

    #[test]
    fn test_fixup_shortcuts_never_lengthens() -> Result<()> {
        let nav_mesh = build_nav_mesh(&[open_field(4)])?;
        let query = NavMeshQuery::new(&nav_mesh, DEFAULT_MAX_NODES)?;
        let base = nav_mesh.get_poly_ref_base(0).id();

        let walk = [0u32, 1, 5, 9, 8, 4, 5, 6, 7, 11, 15];
        let mut corridor = Corridor::new(walk.iter().map(|&i| PolyRef::new(base | i)).collect(), 256);
        let mut len = corridor.len();
        while corridor.fixup_shortcuts(&query)? {
            assert!(corridor.len() < len);
            len = corridor.len();
        }
        assert_eq!(corridor.head(), Some(PolyRef::new(base)));
        Ok(())
    }

    #[test]
    fn test_advance_past() {
        let mut corridor = Corridor::new(refs(&[1, 2, 3, 4]), 256);
        assert_eq!(corridor.advance_past(PolyRef::new(3)), Some(Some(PolyRef::new(2))));
        assert_eq!(corridor.path(), refs(&[4]).as_slice());

        let mut corridor = Corridor::new(refs(&[3, 4]), 256);
        assert_eq!(corridor.advance_past(PolyRef::new(3)), Some(None));
        assert_eq!(corridor.path(), refs(&[4]).as_slice());

        let mut corridor = Corridor::new(refs(&[1, 2]), 256);
        assert_eq!(corridor.advance_past(PolyRef::new(9)), None);
        assert!(corridor.is_empty());
    }
}
