//! Slot resolution - where a fired bubble settles.
//!
//! A shot that hits bubble X settles in the free neighbor of X closest to the
//! impact point. Placeholder columns on odd rows are never a valid result; a
//! shot that lands there is nudged inward.

use std::collections::{HashSet, VecDeque};

use bevy::math::Vec2;
use tracing::{debug, warn};

use super::{
    error::{GridError, Result},
    grid::HexGrid,
    hex::HexCoord,
    shooter::Impact,
};

/// Safety limit for the open-space ring search.
const MAX_RING_SEARCH: usize = 1000;

pub struct SlotResolver<'a> {
    grid: &'a HexGrid,
}

impl<'a> SlotResolver<'a> {
    pub fn new(grid: &'a HexGrid) -> Self {
        Self { grid }
    }

    /// Resolve the cell for a path's impact. `point` is in board space.
    pub fn resolve_impact(&self, impact: Impact, point: Vec2) -> Result<HexCoord> {
        match impact {
            Impact::Bubble(hit) => self.resolve(hit, point),
            Impact::Ceiling => self.resolve_open(point),
        }
    }

    /// The free neighbor of `hit` whose center is nearest to `point`.
    ///
    /// Ties go to the first neighbor in [`HexCoord::neighbors`] order.
    pub fn resolve(&self, hit: HexCoord, point: Vec2) -> Result<HexCoord> {
        let mut best: Option<(HexCoord, f32)> = None;
        for candidate in hit.neighbors() {
            if !self.grid.contains(candidate) || self.grid.is_occupied(candidate) {
                continue;
            }
            // Placeholders are corrected below; anything else unplayable is outside the walls.
            if !self.grid.is_playable(candidate) && !self.grid.is_placeholder(candidate) {
                continue;
            }
            let dist = self.grid.cell_to_world(candidate).distance(point);
            if best.is_none_or(|(_, d)| dist < d) {
                best = Some((candidate, dist));
            }
        }

        let Some((cell, _)) = best else {
            warn!("No free slot around {}", hit);
            return Err(GridError::NoFreeSlot { cell: hit });
        };

        debug!("Impact on {} resolves to {}", hit, cell);
        self.correct_boundary(cell)
    }

    /// Move a result off a placeholder column.
    ///
    /// Tries, in order: the same-row inward cell, the inward cell on the row
    /// below, the inward cell on the row above.
    pub fn correct_boundary(&self, cell: HexCoord) -> Result<HexCoord> {
        if !self.grid.is_placeholder(cell) {
            return Ok(cell);
        }

        let alternatives = if cell.col == 0 {
            [
                HexCoord::new(cell.row, 1),
                HexCoord::new(cell.row - 1, 0),
                HexCoord::new(cell.row + 1, 0),
            ]
        } else {
            let inner = self.grid.columns() - 1;
            [
                HexCoord::new(cell.row, inner),
                HexCoord::new(cell.row - 1, inner),
                HexCoord::new(cell.row + 1, inner),
            ]
        };

        alternatives
            .into_iter()
            .find(|c| self.grid.is_playable(*c) && !self.grid.is_occupied(*c))
            .inspect(|c| debug!("Placeholder {} corrected to {}", cell, c))
            .ok_or(GridError::NoFreeSlot { cell })
    }

    /// Nearest playable empty cell to a point, for shots that stop without
    /// touching a bubble.
    ///
    /// Searches neighbors in expanding rings from the cell under the point.
    pub fn resolve_open(&self, point: Vec2) -> Result<HexCoord> {
        let mut target = self.grid.world_to_nearest_cell(point);
        // The ceiling sits on the top row; never settle above it.
        target.row = target.row.min(self.grid.top_row());

        let mut checked = HashSet::new();
        let mut queue = VecDeque::from([target]);
        while let Some(coord) = queue.pop_front() {
            if !checked.insert(coord) {
                continue;
            }
            if self.grid.is_playable(coord) && !self.grid.is_occupied(coord) {
                return Ok(coord);
            }
            if checked.len() > MAX_RING_SEARCH {
                break;
            }
            for neighbor in coord.neighbors() {
                if self.grid.contains(neighbor) && !checked.contains(&neighbor) {
                    queue.push_back(neighbor);
                }
            }
        }

        warn!("No free slot near {:?}", point);
        Err(GridError::NoFreeSlot { cell: target })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::{
        bubble::{BubbleId, ColorId},
        grid::Occupant,
        hex::HexLayout,
    };

    fn grid_with(cells: &[HexCoord]) -> HexGrid {
        let mut grid = HexGrid::new(HexLayout::new(10.0, 13), 20);
        for (i, cell) in cells.iter().enumerate() {
            grid.set(
                *cell,
                Occupant {
                    id: BubbleId(i as u64),
                    color: ColorId(1),
                },
            )
            .unwrap();
        }
        grid
    }

    #[test]
    fn test_picks_neighbor_nearest_to_impact() {
        let hit = HexCoord::new(10, 6);
        let grid = grid_with(&[hit]);
        let resolver = SlotResolver::new(&grid);

        // Coming from below and slightly to the left
        let below_left = HexCoord::new(9, 6);
        let point = grid.cell_to_world(below_left) + Vec2::new(1.0, 1.0);
        assert_eq!(resolver.resolve(hit, point), Ok(below_left));
    }

    #[test]
    fn test_skips_occupied_neighbors() {
        let hit = HexCoord::new(10, 6);
        let below_left = HexCoord::new(9, 6);
        let grid = grid_with(&[hit, below_left]);
        let resolver = SlotResolver::new(&grid);

        let point = grid.cell_to_world(below_left);
        let cell = resolver.resolve(hit, point).unwrap();
        assert_ne!(cell, below_left);
        assert!(hit.is_neighbor_of(cell));
    }

    #[test]
    fn test_ties_go_to_first_neighbor() {
        let hit = HexCoord::new(10, 6);
        let mut cells = vec![hit];
        // Leave only the right and left neighbors free.
        cells.extend(
            hit.neighbors()
                .into_iter()
                .filter(|n| n.row != hit.row),
        );
        let grid = grid_with(&cells);
        let resolver = SlotResolver::new(&grid);

        // The hit bubble's own center is exactly one cell from both.
        let point = grid.cell_to_world(hit);
        assert_eq!(resolver.resolve(hit, point), Ok(HexCoord::new(10, 7)));
    }

    #[test]
    fn test_full_neighborhood_is_an_error() {
        let hit = HexCoord::new(10, 6);
        let mut cells = vec![hit];
        cells.extend(hit.neighbors());
        let grid = grid_with(&cells);
        let resolver = SlotResolver::new(&grid);

        assert_eq!(
            resolver.resolve(hit, grid.cell_to_world(hit)),
            Err(GridError::NoFreeSlot { cell: hit })
        );
    }

    #[test]
    fn test_left_placeholder_moves_inward() {
        // Bubble on even row 10, col 0. Its lower-left neighbor (9, 0) is a placeholder.
        let hit = HexCoord::new(10, 0);
        let grid = grid_with(&[hit]);
        let resolver = SlotResolver::new(&grid);

        let point = grid.cell_to_world(HexCoord::new(9, 0));
        assert_eq!(resolver.resolve(hit, point), Ok(HexCoord::new(9, 1)));
    }

    #[test]
    fn test_placeholder_fallback_order() {
        let placeholder = HexCoord::new(9, 0);
        let grid = grid_with(&[HexCoord::new(9, 1)]);
        let resolver = SlotResolver::new(&grid);
        assert_eq!(
            resolver.correct_boundary(placeholder),
            Ok(HexCoord::new(8, 0))
        );

        let grid = grid_with(&[HexCoord::new(9, 1), HexCoord::new(8, 0)]);
        let resolver = SlotResolver::new(&grid);
        assert_eq!(
            resolver.correct_boundary(placeholder),
            Ok(HexCoord::new(10, 0))
        );

        let grid = grid_with(&[HexCoord::new(9, 1), HexCoord::new(8, 0), HexCoord::new(10, 0)]);
        let resolver = SlotResolver::new(&grid);
        assert_eq!(
            resolver.correct_boundary(placeholder),
            Err(GridError::NoFreeSlot { cell: placeholder })
        );
    }

    #[test]
    fn test_right_placeholder_moves_inward() {
        let placeholder = HexCoord::new(11, 13);
        let grid = grid_with(&[]);
        let resolver = SlotResolver::new(&grid);
        assert_eq!(
            resolver.correct_boundary(placeholder),
            Ok(HexCoord::new(11, 12))
        );

        let grid = grid_with(&[HexCoord::new(11, 12)]);
        let resolver = SlotResolver::new(&grid);
        assert_eq!(
            resolver.correct_boundary(placeholder),
            Ok(HexCoord::new(10, 12))
        );
    }

    #[test]
    fn test_open_space_snaps_to_top_row_gap() {
        let mut cells: Vec<HexCoord> = (0..13).map(|c| HexCoord::new(20, c)).collect();
        cells.retain(|c| c.col != 6);
        let grid = grid_with(&cells);
        let resolver = SlotResolver::new(&grid);

        let point = grid.cell_to_world(HexCoord::new(20, 6)) + Vec2::new(0.0, 3.0);
        assert_eq!(resolver.resolve_open(point), Ok(HexCoord::new(20, 6)));
    }
}
