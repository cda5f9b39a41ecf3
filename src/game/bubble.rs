//! Bubbles and the capability that spawns and recycles them.
//!
//! The engine never creates or destroys bubble nodes itself. It asks a
//! [`BubbleSource`] for an id when a bubble is fired or a row is spawned, and
//! hands the id back when the bubble is cleared or falls. Whatever sits behind
//! the source (a node pool, ECS entities, a test double) is up to the caller.

use std::collections::HashMap;

use bevy::{math::Vec2, prelude::Resource, reflect::Reflect};
use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::hex::HexCoord;

/// Small integer color. Equal ids match, nothing else does.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Reflect, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct ColorId(pub u8);

impl ColorId {
    /// Pick a color uniformly from a palette.
    pub fn random(palette: &[ColorId], rng: &mut impl Rng) -> Option<Self> {
        if palette.is_empty() {
            return None;
        }
        Some(palette[rng.random_range(0..palette.len())])
    }

    /// Pick a color weighted toward colors that still exist on the grid.
    /// There's a 70% chance to pick from the grid colors.
    pub fn random_weighted(
        palette: &[ColorId],
        grid_colors: &[ColorId],
        rng: &mut impl Rng,
    ) -> Option<Self> {
        if !grid_colors.is_empty() && rng.random_bool(0.7) {
            return Some(grid_colors[rng.random_range(0..grid_colors.len())]);
        }
        Self::random(palette, rng)
    }
}

impl std::fmt::Display for ColorId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "color#{}", self.0)
    }
}

/// Identity of a bubble, owned by the [`BubbleSource`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Reflect)]
pub struct BubbleId(pub u64);

impl std::fmt::Display for BubbleId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Reflect)]
pub enum BubbleState {
    /// Settled in a grid cell.
    Grid,
    /// Fired, travelling along its path.
    Flying,
    /// Cleared or unsupported, playing its exit effect.
    Falling,
    /// Back in the pool.
    #[default]
    Pooled,
}

#[derive(Debug, Clone, PartialEq, Reflect)]
pub struct Bubble {
    pub id: BubbleId,
    pub color: ColorId,
    /// `None` unless the bubble is part of the grid.
    pub cell: Option<HexCoord>,
    pub state: BubbleState,
}

/// Spawn / recycle capability the engine calls into.
pub trait BubbleSource {
    /// Get a bubble of the given color, reusing a recycled one when possible.
    fn acquire(&mut self, color: ColorId) -> BubbleId;

    /// Hand a bubble back once it has left the grid.
    fn release(&mut self, id: BubbleId);

    fn set_position(&mut self, id: BubbleId, position: Vec2);

    fn color(&self, id: BubbleId) -> Option<ColorId>;

    /// Tracks lifecycle transitions. Sources that don't care can ignore it.
    fn set_state(&mut self, _id: BubbleId, _state: BubbleState) {}

    /// The grid cell a bubble now occupies, `None` once it leaves the grid.
    fn set_cell(&mut self, _id: BubbleId, _cell: Option<HexCoord>) {}
}

/// Minimal bookkeeping source: hands out ids, reuses released ones and keeps
/// color, position and state per id.
///
/// Rendering layers read it to sync their nodes.
#[derive(Resource, Debug, Default)]
pub struct BubbleLedger {
    bubbles: HashMap<BubbleId, Bubble>,
    positions: HashMap<BubbleId, Vec2>,
    free: Vec<BubbleId>,
    next_id: u64,
}

impl BubbleLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: BubbleId) -> Option<&Bubble> {
        self.bubbles.get(&id)
    }

    pub fn position(&self, id: BubbleId) -> Option<Vec2> {
        self.positions.get(&id).copied()
    }

    /// Number of bubbles currently out of the pool.
    pub fn active_count(&self) -> usize {
        self.bubbles
            .values()
            .filter(|b| b.state != BubbleState::Pooled)
            .count()
    }

    /// Number of released ids waiting for reuse.
    pub fn pooled_count(&self) -> usize {
        self.free.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Bubble> {
        self.bubbles.values()
    }
}

impl BubbleSource for BubbleLedger {
    fn acquire(&mut self, color: ColorId) -> BubbleId {
        let id = self.free.pop().unwrap_or_else(|| {
            let id = BubbleId(self.next_id);
            self.next_id += 1;
            id
        });
        self.bubbles.insert(
            id,
            Bubble {
                id,
                color,
                cell: None,
                state: BubbleState::Flying,
            },
        );
        id
    }

    fn release(&mut self, id: BubbleId) {
        let Some(bubble) = self.bubbles.get_mut(&id) else {
            return;
        };
        if bubble.state == BubbleState::Pooled {
            debug!("Bubble {} released twice", id);
            return;
        }
        bubble.state = BubbleState::Pooled;
        bubble.cell = None;
        self.positions.remove(&id);
        self.free.push(id);
    }

    fn set_position(&mut self, id: BubbleId, position: Vec2) {
        self.positions.insert(id, position);
    }

    fn color(&self, id: BubbleId) -> Option<ColorId> {
        self.bubbles
            .get(&id)
            .filter(|b| b.state != BubbleState::Pooled)
            .map(|b| b.color)
    }

    fn set_state(&mut self, id: BubbleId, state: BubbleState) {
        if let Some(bubble) = self.bubbles.get_mut(&id) {
            bubble.state = state;
        }
    }

    fn set_cell(&mut self, id: BubbleId, cell: Option<HexCoord>) {
        if let Some(bubble) = self.bubbles.get_mut(&id) {
            bubble.cell = cell;
        }
    }
}
