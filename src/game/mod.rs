//! The grid & match engine for the bubble shooter.
//!
//! This module contains all the gameplay logic including:
//! - Hexagonal grid system (offset rows)
//! - Aim trajectories with wall reflections
//! - Slot resolution for incoming bubbles
//! - Cluster detection, effect clears and support analysis
//! - The session that ties them together
//!
//! Everything except [`state`]'s systems is plain Rust over the grid and can
//! be driven without an `App`.

pub mod bubble;
pub mod cluster;
pub mod config;
pub mod error;
pub mod grid;
pub mod hex;
pub mod projectile;
pub mod shooter;
pub mod state;
pub mod support;

use bevy::prelude::*;

pub(super) fn plugin(app: &mut App) {
    app.register_type::<hex::HexCoord>();
    app.register_type::<bubble::ColorId>();
    app.register_type::<bubble::BubbleId>();
    app.register_type::<bubble::Bubble>();

    app.add_plugins(state::plugin);
}
