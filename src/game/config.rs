//! Board configuration.
//!
//! Everything the engine reads but never mutates: geometry, thresholds and
//! the colors used when new rows are spawned. Loaded from JSON so a level can
//! tweak it without recompiling; missing fields fall back to the defaults.

use std::{f32::consts::FRAC_PI_2, fmt};

use bevy::{math::Vec2, prelude::Resource};
use serde::{Deserialize, Serialize};

use super::{bubble::ColorId, hex::HexLayout};

/// Diameter of a bubble in world units (68px sprites scaled by 0.625).
pub const BUBBLE_SIZE: f32 = 68.0 * 0.625;

/// Number of columns on an even row.
pub const COLUMNS: i32 = 13;

/// Minimum cluster size to clear (match-3).
pub const MIN_CLUSTER_SIZE: usize = 3;

/// A circular area the aim ray passes through without stopping,
/// e.g. the score receptacle.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ExcludedRegion {
    pub x: f32,
    pub y: f32,
    pub radius: f32,
}

impl ExcludedRegion {
    pub fn center(&self) -> Vec2 {
        Vec2::new(self.x, self.y)
    }
}

#[derive(Resource, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BoardConfig {
    pub cell_size: f32,
    pub columns: i32,
    pub cluster_threshold: usize,
    /// The board tops itself up with new rows when fewer rows than this remain.
    pub visible_rows: i32,
    /// Row index of the lowest row of a freshly loaded pattern.
    pub base_row: i32,
    /// World position of cell (0, 0) when the session starts.
    pub grid_origin: [f32; 2],
    /// Grid bubbles below this world y end the game.
    pub danger_line_y: f32,
    pub left_wall_x: f32,
    pub right_wall_x: f32,
    /// Radius of a grid bubble's collider as seen by the aim ray.
    pub collider_radius: f32,
    pub max_ray_length: f32,
    pub max_reflections: usize,
    /// Projectile speed in world units per second.
    pub projectile_speed: f32,
    /// Extra seconds to wait after the flight before evaluating a shot.
    pub settle_delay: f32,
    /// Maximum aim angle from vertical, in radians.
    pub max_aim_angle: f32,
    /// Colors new rows are drawn from.
    pub palette: Vec<ColorId>,
    pub excluded_regions: Vec<ExcludedRegion>,
}

impl Default for BoardConfig {
    fn default() -> Self {
        let half_width = COLUMNS as f32 / 2.0 * BUBBLE_SIZE;
        Self {
            cell_size: BUBBLE_SIZE,
            columns: COLUMNS,
            cluster_threshold: MIN_CLUSTER_SIZE,
            visible_rows: 20,
            base_row: 10,
            grid_origin: [0.0, 0.0],
            danger_line_y: 4.0 * BUBBLE_SIZE,
            left_wall_x: -half_width,
            right_wall_x: half_width,
            collider_radius: BUBBLE_SIZE * 0.5,
            max_ray_length: 2000.0,
            max_reflections: 20,
            projectile_speed: 1500.0,
            settle_delay: 0.05,
            max_aim_angle: 1.3,
            palette: vec![ColorId(4), ColorId(5), ColorId(6)],
            excluded_regions: Vec::new(),
        }
    }
}

impl BoardConfig {
    pub fn layout(&self) -> HexLayout {
        HexLayout::new(self.cell_size, self.columns)
    }

    pub fn grid_origin(&self) -> Vec2 {
        Vec2::from(self.grid_origin)
    }

    /// Parse a configuration from JSON and validate it.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: BoardConfig = serde_json::from_str(json).map_err(ConfigError::Parse)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.cell_size.is_nan() || self.cell_size <= 0.0 {
            return Err(ConfigError::Invalid("cell_size must be positive"));
        }
        if self.columns < 2 {
            return Err(ConfigError::Invalid("columns must be at least 2"));
        }
        if self.cluster_threshold == 0 {
            return Err(ConfigError::Invalid("cluster_threshold must be at least 1"));
        }
        if self.left_wall_x >= self.right_wall_x {
            return Err(ConfigError::Invalid("left wall must be left of the right wall"));
        }
        if self.projectile_speed.is_nan() || self.projectile_speed <= 0.0 {
            return Err(ConfigError::Invalid("projectile_speed must be positive"));
        }
        if self.palette.is_empty() {
            return Err(ConfigError::Invalid("palette must not be empty"));
        }
        if !self.settle_delay.is_finite() || self.settle_delay < 0.0 {
            return Err(ConfigError::Invalid("settle_delay must be a finite, non-negative number"));
        }
        if self.max_ray_length.is_nan() || self.max_ray_length <= 0.0 {
            return Err(ConfigError::Invalid("max_ray_length must be positive"));
        }
        if self.collider_radius.is_nan() || self.collider_radius <= 0.0 {
            return Err(ConfigError::Invalid("collider_radius must be positive"));
        }
        if !(self.max_aim_angle > 0.0 && self.max_aim_angle <= FRAC_PI_2) {
            return Err(ConfigError::Invalid("max_aim_angle must be in (0, pi/2]"));
        }
        if self.excluded_regions.iter().any(|r| r.radius.is_nan() || r.radius < 0.0) {
            return Err(ConfigError::Invalid("excluded region radius must not be negative"));
        }
        Ok(())
    }
}

#[derive(Debug)]
pub enum ConfigError {
    Parse(serde_json::Error),
    Invalid(&'static str),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Parse(e) => write!(f, "failed to parse board config: {e}"),
            ConfigError::Invalid(reason) => write!(f, "invalid board config: {reason}"),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::Parse(e) => Some(e),
            ConfigError::Invalid(_) => None,
        }
    }
}
