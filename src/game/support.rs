//! Support analysis - which bubbles are still attached to the top.
//!
//! A bubble is supported if a chain of occupied neighbors (any color) links it
//! to the current top row. Everything else falls.

use std::collections::{BTreeSet, HashSet, VecDeque};

use tracing::debug;

use super::{
    cluster::{ClearedCluster, detach},
    error::Result,
    grid::HexGrid,
    hex::HexCoord,
};

/// Partition of the occupied cells. The two sets are disjoint and together
/// cover every occupied cell.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SupportReport {
    pub connected: BTreeSet<HexCoord>,
    pub unsupported: BTreeSet<HexCoord>,
}

/// Flood fill from every occupied top-row cell at once.
///
/// An empty top row supports nothing.
pub fn analyze(grid: &HexGrid) -> SupportReport {
    let anchors = grid.top_row_coords();
    if anchors.is_empty() {
        return SupportReport {
            connected: BTreeSet::new(),
            unsupported: grid.coords().collect(),
        };
    }

    let mut visited: HashSet<HexCoord> = anchors.iter().copied().collect();
    let mut queue: VecDeque<HexCoord> = anchors.into_iter().collect();
    let mut connected = BTreeSet::new();

    while let Some(coord) = queue.pop_front() {
        connected.insert(coord);
        for neighbor in coord.neighbors() {
            if grid.is_occupied(neighbor) && visited.insert(neighbor) {
                queue.push_back(neighbor);
            }
        }
    }

    let unsupported = grid.coords().filter(|c| !connected.contains(c)).collect();
    SupportReport {
        connected,
        unsupported,
    }
}

/// Remove every unsupported bubble from the grid.
///
/// Returns `None` when the whole board is still attached.
pub fn detach_unsupported(grid: &mut HexGrid) -> Result<Option<ClearedCluster>> {
    let report = analyze(grid);
    if report.unsupported.is_empty() {
        return Ok(None);
    }
    debug!(
        "{} bubbles lost support, {} remain attached",
        report.unsupported.len(),
        report.connected.len()
    );
    detach(grid, &report.unsupported).map(Some)
}
