//! Cluster detection - finding and clearing matching bubbles.
//!
//! Uses flood fill (BFS) to find connected groups of same-colored bubbles.
//! When a cluster reaches the threshold, it clears. Effect bubbles reuse the
//! same primitive with different seeds or shapes.

use std::collections::{BTreeSet, HashSet, VecDeque};

use bevy::math::Vec2;
use tracing::{debug, info};

use super::{
    bubble::{BubbleId, ColorId},
    error::Result,
    grid::HexGrid,
    hex::HexCoord,
};

/// How a shot clears bubbles once it has settled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ClearPattern {
    /// Same-color cluster, cleared only when it reaches the threshold.
    #[default]
    Match,
    /// Same-color cluster, cleared whatever its size.
    Forced,
    /// Everything in a blast radius around the bubble that was hit.
    Bomb,
    /// The whole row of the bubble that was hit.
    Line,
    /// The same-color clusters of every neighbor of the settled cell.
    Rainbow,
    /// Every bubble along the straight aim line.
    Ray,
}

impl ClearPattern {
    /// Effect bubbles vanish themselves instead of joining the grid.
    pub fn consumes_projectile(&self) -> bool {
        matches!(
            self,
            ClearPattern::Bomb | ClearPattern::Line | ClearPattern::Rainbow | ClearPattern::Ray
        )
    }
}

/// One cleared or detached bubble.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClusterMember {
    pub cell: HexCoord,
    pub id: BubbleId,
    pub color: ColorId,
    /// Board-space position relative to the cluster's centroid.
    pub offset: Vec2,
}

/// A set of bubbles removed from the grid together.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ClearedCluster {
    /// Sorted by cell.
    pub members: Vec<ClusterMember>,
    /// Mean board-space position of the members.
    pub centroid: Vec2,
}

impl ClearedCluster {
    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn cells(&self) -> Vec<HexCoord> {
        self.members.iter().map(|m| m.cell).collect()
    }

    pub fn ids(&self) -> Vec<BubbleId> {
        self.members.iter().map(|m| m.id).collect()
    }
}

/// Remove a set of cells from the grid and describe them relative to their centroid.
///
/// Empty cells in the set are skipped.
pub fn detach(grid: &mut HexGrid, cells: &BTreeSet<HexCoord>) -> Result<ClearedCluster> {
    let mut removed = Vec::with_capacity(cells.len());
    for &cell in cells {
        if let Some(occupant) = grid.clear(cell)? {
            removed.push((cell, occupant));
        }
    }

    if removed.is_empty() {
        return Ok(ClearedCluster::default());
    }

    let positions: Vec<Vec2> = removed.iter().map(|(c, _)| grid.cell_to_world(*c)).collect();
    let centroid = positions.iter().copied().sum::<Vec2>() / positions.len() as f32;

    let members = removed
        .into_iter()
        .zip(positions)
        .map(|((cell, occupant), pos)| ClusterMember {
            cell,
            id: occupant.id,
            color: occupant.color,
            offset: pos - centroid,
        })
        .collect();

    Ok(ClearedCluster { members, centroid })
}

#[derive(Debug, Clone, Copy)]
pub struct MatchEngine {
    pub threshold: usize,
}

impl MatchEngine {
    pub fn new(threshold: usize) -> Self {
        Self { threshold }
    }

    /// Find all connected bubbles of the seed's color using flood fill (BFS).
    ///
    /// An empty seed yields an empty set.
    pub fn find_cluster(&self, grid: &HexGrid, seed: HexCoord) -> BTreeSet<HexCoord> {
        let mut cluster = BTreeSet::new();
        let Some(target_color) = grid.color_at(seed) else {
            return cluster;
        };

        let mut visited = HashSet::from([seed]);
        let mut queue = VecDeque::from([seed]);

        while let Some(coord) = queue.pop_front() {
            if grid.color_at(coord) != Some(target_color) {
                continue;
            }
            cluster.insert(coord);

            for neighbor in coord.neighbors() {
                if visited.insert(neighbor) {
                    queue.push_back(neighbor);
                }
            }
        }

        cluster
    }

    /// Clear the seed's cluster if it reaches the threshold.
    ///
    /// Returns `None` and leaves the grid untouched otherwise.
    pub fn clear_match(&self, grid: &mut HexGrid, seed: HexCoord) -> Result<Option<ClearedCluster>> {
        let cluster = self.find_cluster(grid, seed);
        if cluster.len() < self.threshold {
            debug!(
                "Cluster of {} at {} is below the threshold of {}",
                cluster.len(),
                seed,
                self.threshold
            );
            return Ok(None);
        }

        let cleared = detach(grid, &cluster)?;
        info!("Cleared cluster of {} bubbles at {}", cleared.len(), seed);
        Ok(Some(cleared))
    }

    /// Cells a pattern would clear. `settled` is where the projectile ended up
    /// and `hit` the bubble it collided with; `ray` lists the cells crossed by
    /// the aim line, for [`ClearPattern::Ray`].
    pub fn select(
        &self,
        grid: &HexGrid,
        pattern: ClearPattern,
        settled: HexCoord,
        hit: Option<HexCoord>,
        ray: &[HexCoord],
    ) -> BTreeSet<HexCoord> {
        match pattern {
            ClearPattern::Match => {
                let cluster = self.find_cluster(grid, settled);
                if cluster.len() >= self.threshold {
                    cluster
                } else {
                    BTreeSet::new()
                }
            }
            ClearPattern::Forced => self.find_cluster(grid, settled),
            ClearPattern::Bomb => blast_area(grid, hit.unwrap_or(settled)),
            ClearPattern::Line => {
                let row = hit.unwrap_or(settled).row;
                grid.row_coords(row).into_iter().collect()
            }
            ClearPattern::Rainbow => settled
                .neighbors()
                .into_iter()
                .flat_map(|n| self.find_cluster(grid, n))
                .collect(),
            ClearPattern::Ray => ray.iter().copied().filter(|c| grid.is_occupied(*c)).collect(),
        }
    }

    /// Select and detach in one step.
    pub fn clear(
        &self,
        grid: &mut HexGrid,
        pattern: ClearPattern,
        settled: HexCoord,
        hit: Option<HexCoord>,
        ray: &[HexCoord],
    ) -> Result<Option<ClearedCluster>> {
        if pattern == ClearPattern::Match {
            return self.clear_match(grid, settled);
        }

        let cells = self.select(grid, pattern, settled, hit, ray);
        if cells.is_empty() {
            return Ok(None);
        }
        let cleared = detach(grid, &cells)?;
        info!("{:?} cleared {} bubbles", pattern, cleared.len());
        Ok(Some(cleared))
    }
}

/// Occupied cells inside a bomb's blast around `center`.
///
/// Same row: two columns either side. Adjacent rows: one column either side
/// plus two toward the row's shifted side. Two rows away: one column either side.
pub fn blast_area(grid: &HexGrid, center: HexCoord) -> BTreeSet<HexCoord> {
    let reach = if center.is_odd_row() { -2 } else { 2 };
    grid.coords()
        .filter(|c| {
            let dr = (c.row - center.row).abs();
            let dc = c.col - center.col;
            match dr {
                0 => dc.abs() <= 2,
                1 => dc.abs() < 2 || dc == reach,
                2 => dc.abs() <= 1,
                _ => false,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::{grid::Occupant, hex::HexLayout};

    fn grid_with(cells: &[(HexCoord, u8)]) -> HexGrid {
        let mut grid = HexGrid::new(HexLayout::new(10.0, 13), 20);
        for (i, (cell, color)) in cells.iter().enumerate() {
            grid.set(
                *cell,
                Occupant {
                    id: BubbleId(i as u64),
                    color: ColorId(*color),
                },
            )
            .unwrap();
        }
        grid
    }

    #[test]
    fn test_find_cluster_follows_same_color_only() {
        let grid = grid_with(&[
            (HexCoord::new(10, 5), 1),
            (HexCoord::new(10, 6), 1),
            (HexCoord::new(11, 6), 1),
            (HexCoord::new(10, 7), 2),
            (HexCoord::new(10, 8), 1),
        ]);
        let engine = MatchEngine::new(3);
        let cluster = engine.find_cluster(&grid, HexCoord::new(10, 5));
        assert_eq!(
            cluster.into_iter().collect::<Vec<_>>(),
            vec![
                HexCoord::new(10, 5),
                HexCoord::new(10, 6),
                HexCoord::new(11, 6)
            ]
        );
    }

    #[test]
    fn test_cluster_is_the_same_from_any_seed() {
        let grid = grid_with(&[
            (HexCoord::new(10, 5), 1),
            (HexCoord::new(10, 6), 1),
            (HexCoord::new(11, 6), 1),
            (HexCoord::new(12, 6), 1),
        ]);
        let engine = MatchEngine::new(3);
        let from_first = engine.find_cluster(&grid, HexCoord::new(10, 5));
        for seed in from_first.clone() {
            assert_eq!(engine.find_cluster(&grid, seed), from_first);
        }
    }

    #[test]
    fn test_pair_does_not_clear() {
        let mut grid = grid_with(&[(HexCoord::new(10, 5), 1), (HexCoord::new(10, 6), 1)]);
        let engine = MatchEngine::new(3);
        assert_eq!(engine.clear_match(&mut grid, HexCoord::new(10, 5)), Ok(None));
        assert_eq!(grid.len(), 2);
    }

    #[test]
    fn test_triple_clears_with_centroid_offsets() {
        let mut grid = grid_with(&[
            (HexCoord::new(10, 5), 1),
            (HexCoord::new(10, 6), 1),
            (HexCoord::new(10, 7), 1),
            (HexCoord::new(11, 6), 2),
        ]);
        let engine = MatchEngine::new(3);
        let cleared = engine
            .clear_match(&mut grid, HexCoord::new(10, 6))
            .unwrap()
            .expect("a cluster of three clears");

        assert_eq!(cleared.len(), 3);
        assert_eq!(grid.len(), 1);
        let center = grid.cell_to_world(HexCoord::new(10, 6));
        assert!((cleared.centroid - center).length() < 1e-4);
        let offsets: Vec<f32> = cleared.members.iter().map(|m| m.offset.x).collect();
        assert!((offsets[0] + 10.0).abs() < 1e-4);
        assert!(offsets[1].abs() < 1e-4);
        assert!((offsets[2] - 10.0).abs() < 1e-4);
    }

    #[test]
    fn test_empty_seed_is_noop() {
        let mut grid = grid_with(&[(HexCoord::new(10, 5), 1)]);
        let engine = MatchEngine::new(3);
        assert!(engine.find_cluster(&grid, HexCoord::new(3, 3)).is_empty());
        assert_eq!(
            engine.clear(&mut grid, ClearPattern::Forced, HexCoord::new(3, 3), None, &[]),
            Ok(None)
        );
    }

    #[test]
    fn test_forced_clears_below_threshold() {
        let mut grid = grid_with(&[(HexCoord::new(10, 5), 1), (HexCoord::new(10, 6), 1)]);
        let engine = MatchEngine::new(3);
        let cleared = engine
            .clear(&mut grid, ClearPattern::Forced, HexCoord::new(10, 5), None, &[])
            .unwrap()
            .expect("forced clear");
        assert_eq!(cleared.len(), 2);
        assert!(grid.is_empty());
    }

    #[test]
    fn test_line_clears_the_hit_row() {
        let mut grid = grid_with(&[
            (HexCoord::new(10, 1), 1),
            (HexCoord::new(10, 4), 2),
            (HexCoord::new(10, 9), 3),
            (HexCoord::new(11, 4), 1),
        ]);
        let engine = MatchEngine::new(3);
        let cleared = engine
            .clear(
                &mut grid,
                ClearPattern::Line,
                HexCoord::new(9, 4),
                Some(HexCoord::new(10, 4)),
                &[],
            )
            .unwrap()
            .expect("line clear");
        assert_eq!(cleared.len(), 3);
        assert_eq!(grid.coords().collect::<Vec<_>>(), vec![HexCoord::new(11, 4)]);
    }

    #[test]
    fn test_bomb_shape_even_row() {
        let mut cells = Vec::new();
        for row in 6..=14 {
            for col in 0..13 {
                cells.push((HexCoord::new(row, col), 1));
            }
        }
        let grid = grid_with(&cells);
        let blast = blast_area(&grid, HexCoord::new(10, 6));

        // Same row: cols 4..=8, adjacent rows: 5..=7 plus 8, two rows away: 5..=7
        assert_eq!(blast.len(), 5 + 2 * 4 + 2 * 3);
        assert!(blast.contains(&HexCoord::new(11, 8)));
        assert!(!blast.contains(&HexCoord::new(11, 4)));
        assert!(blast.contains(&HexCoord::new(12, 5)));
        assert!(!blast.contains(&HexCoord::new(13, 6)));
    }

    #[test]
    fn test_bomb_shape_odd_row_reaches_left() {
        let mut cells = Vec::new();
        for row in 8..=12 {
            for col in 0..13 {
                cells.push((HexCoord::new(row, col), 1));
            }
        }
        let grid = grid_with(&cells);
        let blast = blast_area(&grid, HexCoord::new(11, 6));
        assert!(blast.contains(&HexCoord::new(10, 4)));
        assert!(!blast.contains(&HexCoord::new(10, 8)));
    }

    #[test]
    fn test_rainbow_clears_neighbor_clusters() {
        let settled = HexCoord::new(10, 6);
        // The rainbow bubble itself never joins the grid.
        let mut grid = grid_with(&[
            // Red pair to the right
            (HexCoord::new(10, 7), 1),
            (HexCoord::new(10, 8), 1),
            // Single blue to the left
            (HexCoord::new(10, 5), 2),
            // Unrelated green far away
            (HexCoord::new(15, 0), 3),
        ]);
        let engine = MatchEngine::new(3);
        let cleared = engine
            .clear(&mut grid, ClearPattern::Rainbow, settled, None, &[])
            .unwrap()
            .expect("rainbow clear");
        assert_eq!(
            cleared.cells(),
            vec![
                HexCoord::new(10, 5),
                HexCoord::new(10, 7),
                HexCoord::new(10, 8)
            ]
        );
        assert_eq!(grid.coords().collect::<Vec<_>>(), vec![HexCoord::new(15, 0)]);
    }

    #[test]
    fn test_ray_clears_listed_cells() {
        let mut grid = grid_with(&[(HexCoord::new(10, 6), 1), (HexCoord::new(12, 6), 2)]);
        let engine = MatchEngine::new(3);
        let cleared = engine
            .clear(
                &mut grid,
                ClearPattern::Ray,
                HexCoord::new(9, 6),
                None,
                &[HexCoord::new(10, 6), HexCoord::new(11, 6), HexCoord::new(12, 6)],
            )
            .unwrap()
            .expect("ray clear");
        assert_eq!(cleared.len(), 2);
        assert!(grid.is_empty());
    }
}
