// ==============================================================================
// track.rs — TILE MATRIX + ROUTE (WHAT THE CORE CONSUMES FROM TRACK DATA)
// ------------------------------------------------------------------------------
// Tile (c, r) covers [c*W, (c+1)*W) x [r*H, (r+1)*H). Each tile carries:
// - a type (asphalt or not, corner geometry for AI speed control)
// - a computer hint (none / brake / brake-hard)
// - a route index (-1 when the tile is not on the route)
//
// The route is derived from the tiles: one tile-sized target node per routed
// tile, rebuilt through Route::build_from_vector.
// ==============================================================================

use rapier3d::prelude::{Point, Real, point};
use serde::{Deserialize, Serialize};

use crate::route::{Route, TargetNode};

pub const TILE_W: Real = 256.0;
pub const TILE_H: Real = 256.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TileType {
    Clear,
    Grass,
    Sand,
    Straight,
    Straight45Male,
    Straight45Female,
    Corner90,
    Corner45Left,
    Corner45Right,
    Finish,
    Crossing,
}

impl TileType {
    pub fn has_asphalt(&self) -> bool {
        !matches!(self, TileType::Clear | TileType::Grass | TileType::Sand)
    }

    pub fn is_corner_90(&self) -> bool {
        matches!(self, TileType::Corner90)
    }

    pub fn is_corner_45(&self) -> bool {
        matches!(self, TileType::Corner45Left | TileType::Corner45Right)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComputerHint {
    #[default]
    None,
    Brake,
    BrakeHard,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrackTile {
    pub column: usize,
    pub row: usize,
    pub tile_type: TileType,
    pub computer_hint: ComputerHint,
    pub route_index: i32,
}

impl TrackTile {
    pub fn new(column: usize, row: usize, tile_type: TileType) -> Self {
        Self { column, row, tile_type, computer_hint: ComputerHint::None, route_index: -1 }
    }

    /// Tile centre in world units.
    pub fn location(&self) -> Point<Real> {
        point![
            self.column as Real * TILE_W + TILE_W * 0.5,
            self.row as Real * TILE_H + TILE_H * 0.5,
            0.0
        ]
    }
}

#[derive(Debug, Clone)]
pub struct TileMatrix {
    cols: usize,
    rows: usize,
    tiles: Vec<TrackTile>, // row-major
}

impl TileMatrix {
    /// A `cols` x `rows` field of grass.
    pub fn new(cols: usize, rows: usize) -> Self {
        let tiles = (0..rows)
            .flat_map(|r| (0..cols).map(move |c| TrackTile::new(c, r, TileType::Grass)))
            .collect();
        Self { cols, rows, tiles }
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn get(&self, column: usize, row: usize) -> Option<&TrackTile> {
        if column >= self.cols || row >= self.rows {
            return None;
        }
        self.tiles.get(row * self.cols + column)
    }

    pub fn get_mut(&mut self, column: usize, row: usize) -> Option<&mut TrackTile> {
        if column >= self.cols || row >= self.rows {
            return None;
        }
        self.tiles.get_mut(row * self.cols + column)
    }

    pub fn tiles(&self) -> &[TrackTile] {
        &self.tiles
    }

    pub fn tile_at_location(&self, x: Real, y: Real) -> Option<&TrackTile> {
        if !x.is_finite() || !y.is_finite() || x < 0.0 || y < 0.0 {
            return None;
        }
        self.get((x / TILE_W) as usize, (y / TILE_H) as usize)
    }
}

#[derive(Debug, Clone)]
pub struct Track {
    name: String,
    map: TileMatrix,
    route: Route,
}

impl Track {
    pub fn new(name: impl Into<String>, map: TileMatrix) -> Self {
        let nodes = map
            .tiles()
            .iter()
            .filter(|t| t.route_index >= 0)
            .map(|t| TargetNode::new(t.location(), (TILE_W, TILE_H), t.route_index))
            .collect();

        let mut route = Route::new();
        route.build_from_vector(nodes);

        Self { name: name.into(), map, route }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn map(&self) -> &TileMatrix {
        &self.map
    }

    pub fn route(&self) -> &Route {
        &self.route
    }

    pub fn tile_at_location(&self, p: Point<Real>) -> Option<&TrackTile> {
        self.map.tile_at_location(p.x, p.y)
    }

    /// No tile, or a tile without asphalt.
    pub fn is_off_track(&self, p: Point<Real>) -> bool {
        self.tile_at_location(p).is_none_or(|t| !t.tile_type.has_asphalt())
    }

    /// Rectangular circuit around the border of a `cols` x `rows` map, driven
    /// clockwise on screen (+X along row 0 first). The finish tile is (1, 0);
    /// the two tiles before each corner carry brake hints.
    pub fn ring(cols: usize, rows: usize) -> Self {
        let cols = cols.max(3);
        let rows = rows.max(3);
        let mut map = TileMatrix::new(cols, rows);

        let mut order = Vec::with_capacity(2 * (cols + rows));
        order.extend((1..cols).map(|c| (c, 0)));
        order.extend((1..rows).map(|r| (cols - 1, r)));
        order.extend((0..cols - 1).rev().map(|c| (c, rows - 1)));
        order.extend((0..rows - 1).rev().map(|r| (0, r)));

        let is_corner = |(c, r): (usize, usize)| (c == 0 || c == cols - 1) && (r == 0 || r == rows - 1);
        let n = order.len();

        for (i, &(c, r)) in order.iter().enumerate() {
            let tile_type = if is_corner((c, r)) {
                TileType::Corner90
            } else if i == 0 {
                TileType::Finish
            } else {
                TileType::Straight
            };
            let hint = if is_corner(order[(i + 1) % n]) {
                ComputerHint::BrakeHard
            } else if is_corner(order[(i + 2) % n]) {
                ComputerHint::Brake
            } else {
                ComputerHint::None
            };

            if let Some(tile) = map.get_mut(c, r) {
                tile.tile_type = tile_type;
                tile.computer_hint = hint;
                tile.route_index = i as i32;
            }
        }

        Self::new(format!("ring-{cols}x{rows}"), map)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tile_lookup_by_location() {
        let map = TileMatrix::new(4, 3);
        assert_eq!(map.tile_at_location(10.0, 10.0).map(|t| (t.column, t.row)), Some((0, 0)));
        assert_eq!(map.tile_at_location(300.0, 600.0).map(|t| (t.column, t.row)), Some((1, 2)));
        assert!(map.tile_at_location(-1.0, 10.0).is_none());
        assert!(map.tile_at_location(4.0 * TILE_W, 10.0).is_none());
        assert!(map.tile_at_location(Real::NAN, 10.0).is_none());
    }

    #[test]
    fn ring_route_starts_at_finish_and_walks_the_border() {
        let track = Track::ring(5, 4);
        let route = track.route();
        assert_eq!(route.num_nodes(), 2 * (5 - 1) + 2 * (4 - 1));

        let first = route.get(0).map(|n| n.location());
        let finish = track.map().get(1, 0).map(|t| t.location());
        assert_eq!(first, finish);
        assert_eq!(track.map().get(1, 0).map(|t| t.tile_type), Some(TileType::Finish));

        // consecutive nodes are neighbouring tiles
        for pair in route.nodes().windows(2) {
            let d = pair[1].location() - pair[0].location();
            assert!((d.norm() - TILE_W).abs() < 1e-3);
        }
        // adjacent ends: not closed by the proximity heuristic
        assert!(!route.is_closed());
    }

    #[test]
    fn ring_hints_precede_corners() {
        let track = Track::ring(5, 4);
        let before_corner = track.map().get(3, 0).copied();
        assert_eq!(before_corner.map(|t| t.computer_hint), Some(ComputerHint::BrakeHard));
        assert_eq!(track.map().get(2, 0).map(|t| t.computer_hint), Some(ComputerHint::Brake));
        assert_eq!(track.map().get(4, 0).map(|t| t.tile_type), Some(TileType::Corner90));
    }

    #[test]
    fn inner_field_is_off_track() {
        let track = Track::ring(5, 4);
        assert!(track.is_off_track(point![2.5 * TILE_W, 1.5 * TILE_H, 0.0]));
        assert!(!track.is_off_track(point![1.5 * TILE_W, 0.5 * TILE_H, 0.0]));
        assert!(track.is_off_track(point![-5.0, 0.0, 0.0]));
    }
}
