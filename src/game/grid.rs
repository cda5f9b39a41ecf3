//! The hexagonal grid that holds all settled bubbles.
//!
//! Uses a HashMap for sparse storage - only occupied cells are stored.
//! The grid is the only owner of the occupancy index; everything else reads
//! it through the queries below.

use std::collections::{BTreeSet, HashMap};

use bevy::math::Vec2;

use super::{
    bubble::{BubbleId, ColorId},
    error::{GridError, Result},
    hex::{HexCoord, HexLayout},
};

/// What the occupancy index stores for a settled bubble.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Occupant {
    pub id: BubbleId,
    pub color: ColorId,
}

#[derive(Debug, Clone)]
pub struct HexGrid {
    layout: HexLayout,
    /// Highest row index on the board. Rows above it don't exist yet.
    top_row: i32,
    cells: HashMap<HexCoord, Occupant>,
}

impl HexGrid {
    pub fn new(layout: HexLayout, top_row: i32) -> Self {
        Self {
            layout,
            top_row,
            cells: HashMap::new(),
        }
    }

    pub fn layout(&self) -> HexLayout {
        self.layout
    }

    pub fn columns(&self) -> i32 {
        self.layout.columns
    }

    pub fn top_row(&self) -> i32 {
        self.top_row
    }

    /// Check if a cell is inside the board: `0 <= col <= columns` and
    /// `row <= top_row`.
    ///
    /// Rows have no floor. The stack grows downward as shots settle, past
    /// row 0 if it has to; the danger line ends the game before that matters.
    pub fn contains(&self, coord: HexCoord) -> bool {
        (0..=self.layout.columns).contains(&coord.col) && coord.row <= self.top_row
    }

    /// Non-playable boundary column on an odd row.
    pub fn is_placeholder(&self, coord: HexCoord) -> bool {
        coord.is_odd_row() && (coord.col == 0 || coord.col == self.layout.columns)
    }

    /// A cell a bubble may settle in.
    ///
    /// Even rows only have `columns` cells, so their last index is outside the walls.
    pub fn is_playable(&self, coord: HexCoord) -> bool {
        if !self.contains(coord) || self.is_placeholder(coord) {
            return false;
        }
        coord.is_odd_row() || coord.col < self.layout.columns
    }

    pub fn cell_to_world(&self, coord: HexCoord) -> Vec2 {
        self.layout.to_world(coord)
    }

    pub fn world_to_nearest_cell(&self, pos: Vec2) -> HexCoord {
        self.layout.nearest_cell(pos)
    }

    pub fn is_occupied(&self, coord: HexCoord) -> bool {
        self.cells.contains_key(&coord)
    }

    pub fn get(&self, coord: HexCoord) -> Option<Occupant> {
        self.cells.get(&coord).copied()
    }

    pub fn color_at(&self, coord: HexCoord) -> Option<ColorId> {
        self.cells.get(&coord).map(|o| o.color)
    }

    /// Place a bubble in an empty cell.
    pub fn set(&mut self, coord: HexCoord, occupant: Occupant) -> Result<()> {
        if !self.contains(coord) {
            return Err(GridError::OutOfBounds { cell: coord });
        }
        if self.is_occupied(coord) {
            return Err(GridError::Occupied { cell: coord });
        }
        self.cells.insert(coord, occupant);
        Ok(())
    }

    /// Remove a bubble from a cell.
    ///
    /// Returns the occupant that was removed, if any.
    pub fn clear(&mut self, coord: HexCoord) -> Result<Option<Occupant>> {
        if !self.contains(coord) {
            return Err(GridError::OutOfBounds { cell: coord });
        }
        Ok(self.cells.remove(&coord))
    }

    /// Remove every bubble, keeping the row bounds.
    pub fn clear_all(&mut self) {
        self.cells.clear();
    }

    /// Grow the board by one row on top and return its index.
    pub fn append_row(&mut self) -> i32 {
        self.top_row += 1;
        self.top_row
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// Iterate over all occupied cells.
    pub fn iter(&self) -> impl Iterator<Item = (HexCoord, Occupant)> + '_ {
        self.cells.iter().map(|(c, o)| (*c, *o))
    }

    /// Get all occupied coordinates.
    pub fn coords(&self) -> impl Iterator<Item = HexCoord> + '_ {
        self.cells.keys().copied()
    }

    /// Occupied neighbors of a cell, in neighbor order.
    pub fn occupied_neighbors(&self, coord: HexCoord) -> Vec<HexCoord> {
        coord
            .neighbors()
            .into_iter()
            .filter(|n| self.is_occupied(*n))
            .collect()
    }

    /// Occupied cells of the current top row, sorted by column.
    pub fn top_row_coords(&self) -> Vec<HexCoord> {
        self.row_coords(self.top_row)
    }

    /// Occupied cells of a row, sorted by column.
    pub fn row_coords(&self, row: i32) -> Vec<HexCoord> {
        let mut coords: Vec<HexCoord> = self.cells.keys().filter(|c| c.row == row).copied().collect();
        coords.sort();
        coords
    }

    /// Lowest occupied row (smallest index). Used for the danger check.
    pub fn lowest_row(&self) -> Option<i32> {
        self.cells.keys().map(|c| c.row).min()
    }

    /// Highest occupied row.
    pub fn highest_row(&self) -> Option<i32> {
        self.cells.keys().map(|c| c.row).max()
    }

    /// Distinct colors currently on the grid, sorted.
    pub fn colors_present(&self) -> Vec<ColorId> {
        let colors: BTreeSet<ColorId> = self.cells.values().map(|o| o.color).collect();
        colors.into_iter().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grid() -> HexGrid {
        HexGrid::new(HexLayout::new(10.0, 13), 20)
    }

    fn occupant(id: u64, color: u8) -> Occupant {
        Occupant {
            id: BubbleId(id),
            color: ColorId(color),
        }
    }

    #[test]
    fn test_set_and_clear() {
        let mut grid = grid();
        let cell = HexCoord::new(5, 5);
        grid.set(cell, occupant(1, 2)).expect("empty cell");
        assert!(grid.is_occupied(cell));
        assert_eq!(grid.color_at(cell), Some(ColorId(2)));

        assert_eq!(
            grid.set(cell, occupant(2, 2)),
            Err(GridError::Occupied { cell })
        );

        assert_eq!(grid.clear(cell), Ok(Some(occupant(1, 2))));
        assert!(!grid.is_occupied(cell));
        assert_eq!(grid.clear(cell), Ok(None));
    }

    #[test]
    fn test_out_of_bounds() {
        let mut grid = grid();
        for cell in [
            HexCoord::new(0, -1),
            HexCoord::new(0, 14),
            HexCoord::new(21, 3),
        ] {
            assert_eq!(
                grid.set(cell, occupant(1, 1)),
                Err(GridError::OutOfBounds { cell })
            );
            assert_eq!(grid.clear(cell), Err(GridError::OutOfBounds { cell }));
        }
    }

    #[test]
    fn test_rows_below_zero_are_on_the_board() {
        let mut grid = grid();
        let cell = HexCoord::new(-1, 3);
        assert!(grid.contains(cell));
        assert!(grid.is_playable(cell));
        grid.set(cell, occupant(1, 1)).expect("free cell below row 0");
        assert_eq!(grid.lowest_row(), Some(-1));
        assert!(grid.cell_to_world(cell).y < 0.0);
    }

    #[test]
    fn test_placeholder_columns() {
        let grid = grid();
        assert!(grid.is_placeholder(HexCoord::new(3, 0)));
        assert!(grid.is_placeholder(HexCoord::new(3, 13)));
        assert!(!grid.is_placeholder(HexCoord::new(4, 0)));
        assert!(grid.is_playable(HexCoord::new(4, 0)));
        assert!(!grid.is_playable(HexCoord::new(4, 13)));
        assert!(grid.is_playable(HexCoord::new(3, 12)));
    }

    #[test]
    fn test_append_row_grows_top() {
        let mut grid = grid();
        assert!(!grid.contains(HexCoord::new(21, 0)));
        assert_eq!(grid.append_row(), 21);
        assert!(grid.contains(HexCoord::new(21, 0)));
    }

    #[test]
    fn test_row_queries() {
        let mut grid = grid();
        grid.set(HexCoord::new(20, 4), occupant(1, 1)).unwrap();
        grid.set(HexCoord::new(20, 2), occupant(2, 3)).unwrap();
        grid.set(HexCoord::new(12, 2), occupant(3, 1)).unwrap();

        assert_eq!(
            grid.top_row_coords(),
            vec![HexCoord::new(20, 2), HexCoord::new(20, 4)]
        );
        assert_eq!(grid.lowest_row(), Some(12));
        assert_eq!(grid.highest_row(), Some(20));
        assert_eq!(grid.colors_present(), vec![ColorId(1), ColorId(3)]);
    }
}
