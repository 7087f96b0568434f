// ---------------------------------------------
// START GRID: two staggered columns behind the
// first route node, every car facing node 1
// ---------------------------------------------

use rapier3d::prelude::{Point, Real, Vector, point, vector};

use crate::route::Route;
use crate::track::TILE_H;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GridSlot {
    pub position: usize,
    pub location: Point<Real>,
    pub angle_deg: Real,
}

#[derive(Debug, Clone)]
pub struct StartGrid {
    origin: Point<Real>,
    forward: Vector<Real>,
    spacing: Real,
    lateral: Real,
}

impl StartGrid {
    /// None for an empty route.
    pub fn new(route: &Route, spacing: Real) -> Option<Self> {
        let first = route.nodes().first()?;
        let origin = first.location();

        let forward = route
            .nodes()
            .get(1)
            .map(|n| n.location() - origin)
            .filter(|d| d.norm() > 0.0)
            .map(|d| d.normalize())
            .unwrap_or_else(|| vector![1.0, 0.0, 0.0]);

        Some(Self { origin, forward, spacing, lateral: TILE_H / 6.0 })
    }

    pub fn angle_deg(&self) -> Real {
        self.forward.y.atan2(self.forward.x).to_degrees()
    }

    // ---------------------------------------------------------
    // Slot for grid position `position` (0 = pole)
    // ---------------------------------------------------------
    pub fn slot(&self, position: usize) -> GridSlot {
        let row = (position / 2) as Real;
        let column = position % 2;

        // left of the heading is +90 degrees
        let left = vector![-self.forward.y, self.forward.x, 0.0];
        let side = if column == 0 { self.lateral } else { -self.lateral };
        let back = self.spacing * (row + 1.0) + if column == 0 { 0.0 } else { self.spacing * 0.5 };

        let p = self.origin.coords - self.forward * back + left * side;
        GridSlot { position, location: point![p.x, p.y, 0.0], angle_deg: self.angle_deg() }
    }

    pub fn slots(&self, count: usize) -> Vec<GridSlot> {
        (0..count).map(|i| self.slot(i)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::route::TargetNode;

    fn route(points: &[(Real, Real)]) -> Route {
        let mut route = Route::new();
        for &(x, y) in points {
            route.push(TargetNode::unassigned(point![x, y, 0.0], (256.0, 256.0)));
        }
        route
    }

    #[test]
    fn empty_route_has_no_grid() {
        assert!(StartGrid::new(&Route::new(), 60.0).is_none());
    }

    #[test]
    fn slots_sit_behind_the_first_node() {
        let grid = StartGrid::new(&route(&[(1000.0, 500.0), (1256.0, 500.0)]), 60.0);
        let Some(grid) = grid else { panic!("grid expected") };
        assert!(grid.angle_deg().abs() < 1e-4);

        let slots = grid.slots(4);
        assert!((slots[0].location.x - 940.0).abs() < 1e-3);
        assert!(slots[0].location.y > 500.0);
        assert!((slots[1].location.x - 910.0).abs() < 1e-3);
        assert!(slots[1].location.y < 500.0);
        assert!((slots[2].location.x - 880.0).abs() < 1e-3);
        assert!(slots.iter().all(|s| s.location.x < 1000.0));
    }

    #[test]
    fn grid_faces_node_one() {
        let Some(grid) = StartGrid::new(&route(&[(0.0, 0.0), (0.0, 256.0)]), 60.0) else {
            panic!("grid expected")
        };
        assert!((grid.angle_deg() - 90.0).abs() < 1e-4);
        assert!(grid.slot(0).location.y < 0.0);
    }

    #[test]
    fn single_node_defaults_to_plus_x() {
        let Some(grid) = StartGrid::new(&route(&[(10.0, 10.0)]), 60.0) else { panic!("grid expected") };
        assert_eq!(grid.angle_deg(), 0.0);
    }
}
