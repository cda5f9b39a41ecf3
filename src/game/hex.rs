//! Hexagonal coordinate system using offset coordinates.
//!
//! Based on Red Blob Games' excellent guide:
//! https://www.redblobgames.com/grids/hexagons/
//!
//! Rows are stacked bottom to top (row `r + 1` sits above row `r`) and odd rows
//! are shifted left by half a cell. Row pitch is compressed to 0.85 of the
//! cell size so that neighboring rows pack like hexagons.

use bevy::{math::Vec2, reflect::Reflect};

/// Vertical distance between two rows, as a fraction of the cell size.
pub const ROW_PITCH: f32 = 0.85;

/// Offset hex coordinate.
///
/// - `row` increases upward (new rows are appended above)
/// - `col` increases to the right
/// - odd rows are shifted left by half a cell
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Reflect)]
pub struct HexCoord {
    pub row: i32,
    pub col: i32,
}

impl HexCoord {
    pub const fn new(row: i32, col: i32) -> Self {
        Self { row, col }
    }

    #[inline]
    pub const fn is_odd_row(&self) -> bool {
        self.row.rem_euclid(2) == 1
    }

    /// Get all 6 neighboring coordinates.
    ///
    /// The order is fixed and used for tie-breaking when resolving slots:
    /// lower-right, right, upper-right, upper-left, left, lower-left.
    /// Diagonal column deltas mirror between even and odd rows.
    pub fn neighbors(&self) -> [HexCoord; 6] {
        let (r, c) = (self.row, self.col);
        let (right, left) = if self.is_odd_row() { (0, -1) } else { (1, 0) };

        [
            HexCoord::new(r - 1, c + right),
            HexCoord::new(r, c + 1),
            HexCoord::new(r + 1, c + right),
            HexCoord::new(r + 1, c + left),
            HexCoord::new(r, c - 1),
            HexCoord::new(r - 1, c + left),
        ]
    }

    pub fn is_neighbor_of(&self, other: HexCoord) -> bool {
        self.neighbors().contains(&other)
    }
}

impl std::fmt::Display for HexCoord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}, {})", self.row, self.col)
    }
}

/// Maps between grid coordinates and board-local world positions.
///
/// A pure function of the cell size and the board's column count.
#[derive(Debug, Clone, Copy, PartialEq, Reflect)]
pub struct HexLayout {
    /// Diameter of a bubble, also the horizontal distance between columns.
    pub size: f32,
    /// Number of playable columns on an even row.
    pub columns: i32,
}

impl HexLayout {
    pub const fn new(size: f32, columns: i32) -> Self {
        Self { size, columns }
    }

    fn center_col(&self) -> f32 {
        (self.columns - 1) as f32 / 2.0
    }

    /// Convert a grid coordinate to its world-space center.
    pub fn to_world(&self, coord: HexCoord) -> Vec2 {
        let mut x = (coord.col as f32 - self.center_col()) * self.size;
        if coord.is_odd_row() {
            x -= self.size / 2.0;
        }
        let y = coord.row as f32 * self.size * ROW_PITCH;
        Vec2::new(x, y)
    }

    /// Find the cell whose center is closest to a world position.
    ///
    /// Looks at the rounded row and the rows directly above and below it,
    /// since the shifted columns make a plain rounding inaccurate near row
    /// boundaries.
    pub fn nearest_cell(&self, pos: Vec2) -> HexCoord {
        let approx_row = (pos.y / (self.size * ROW_PITCH)).round() as i32;

        let mut best = HexCoord::new(approx_row, 0);
        let mut best_dist = f32::INFINITY;
        for row in [approx_row, approx_row - 1, approx_row + 1] {
            let shift = if row.rem_euclid(2) == 1 { 0.5 } else { 0.0 };
            let col = (pos.x / self.size + self.center_col() + shift).round() as i32;
            let candidate = HexCoord::new(row, col);
            let dist = self.to_world(candidate).distance_squared(pos);
            if dist < best_dist {
                best_dist = dist;
                best = candidate;
            }
        }
        best
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LAYOUT: HexLayout = HexLayout::new(42.5, 13);

    #[test]
    fn test_neighbors_even_row() {
        let n = HexCoord::new(4, 5).neighbors();
        assert_eq!(
            n,
            [
                HexCoord::new(3, 6),
                HexCoord::new(4, 6),
                HexCoord::new(5, 6),
                HexCoord::new(5, 5),
                HexCoord::new(4, 4),
                HexCoord::new(3, 5),
            ]
        );
    }

    #[test]
    fn test_neighbors_odd_row() {
        let n = HexCoord::new(3, 5).neighbors();
        assert_eq!(
            n,
            [
                HexCoord::new(2, 5),
                HexCoord::new(3, 6),
                HexCoord::new(4, 5),
                HexCoord::new(4, 4),
                HexCoord::new(3, 4),
                HexCoord::new(2, 4),
            ]
        );
    }

    #[test]
    fn test_neighbor_symmetry() {
        for row in 0..6 {
            for col in 0..=13 {
                let a = HexCoord::new(row, col);
                for b in a.neighbors() {
                    assert!(b.is_neighbor_of(a), "{b} should list {a} as a neighbor");
                }
            }
        }
    }

    #[test]
    fn test_neighbors_are_one_cell_apart() {
        for a in [HexCoord::new(4, 6), HexCoord::new(5, 6)] {
            let center = LAYOUT.to_world(a);
            for b in a.neighbors() {
                let d = LAYOUT.to_world(b).distance(center);
                assert!(d > LAYOUT.size * 0.95 && d <= LAYOUT.size + 0.001, "{a}->{b}: {d}");
            }
        }
    }

    #[test]
    fn test_to_world_even_and_odd_rows() {
        let layout = HexLayout::new(10.0, 13);
        assert_eq!(layout.to_world(HexCoord::new(0, 6)), Vec2::new(0.0, 0.0));
        assert_eq!(layout.to_world(HexCoord::new(0, 0)), Vec2::new(-60.0, 0.0));
        let odd = layout.to_world(HexCoord::new(1, 6));
        assert_eq!(odd.x, -5.0);
        assert!((odd.y - 8.5).abs() < 1e-5);
    }

    #[test]
    fn test_world_roundtrip() {
        for row in 0..30 {
            for col in 0..=13 {
                let cell = HexCoord::new(row, col);
                let back = LAYOUT.nearest_cell(LAYOUT.to_world(cell));
                assert_eq!(cell, back);
            }
        }
    }

    #[test]
    fn test_nearest_cell_with_jitter() {
        let cell = HexCoord::new(7, 3);
        let pos = LAYOUT.to_world(cell) + Vec2::new(6.0, -5.0);
        assert_eq!(LAYOUT.nearest_cell(pos), cell);
    }
}
