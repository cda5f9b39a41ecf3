//! Logic core of a hexagonal bubble shooter.
//!
//! Add [`plugin`] to an `App` to get the session, the bubble ledger and the
//! aim / fire / evaluate systems. Insert a [`game::config::BoardConfig`]
//! resource first to override the defaults.

pub mod game;

use bevy::prelude::*;

pub use game::{
    bubble::{BubbleId, BubbleLedger, BubbleSource, ColorId},
    cluster::ClearPattern,
    config::BoardConfig,
    error::{GridError, Result},
    hex::HexCoord,
    state::GridSession,
};

pub fn plugin(app: &mut App) {
    app.add_plugins(game::plugin);
}
