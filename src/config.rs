//! Board configuration.
//!
//! Every field has a default, so a host can send a partial JSON object and
//! only override what it cares about.

use bevy::prelude::Resource;
use bevy_math::{Vec3, vec3};
use error_stack::{Report, ResultExt};
use serde::{Deserialize, Serialize};

use crate::core::{Color, Priority};
use crate::{Result, TaskscapeError};

#[derive(Resource, Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BoardConfig {
    pub camera: CameraConfig,
    pub layout: LayoutConfig,
    pub label: LabelConfig,
    pub stage: StageConfig,
    pub palette: Palette,
    /// Mount as soon as the plugin starts instead of waiting for `BoardCommand::Mount`.
    pub auto_mount: bool,
    /// Overrides the container's device pixel ratio when set.
    pub pixel_ratio: Option<f32>,
}

impl Default for BoardConfig {
    fn default() -> Self {
        Self {
            camera: CameraConfig::default(),
            layout: LayoutConfig::default(),
            label: LabelConfig::default(),
            stage: StageConfig::default(),
            palette: Palette::default(),
            auto_mount: true,
            pixel_ratio: None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraConfig {
    /// Vertical field of view in radians.
    pub fov: f32,
    pub near: f32,
    pub far: f32,
    pub position: Vec3,
    pub target: Vec3,
    /// Fraction of orbit velocity removed every frame (0 = no damping, 1 = no inertia).
    pub damping: f32,
    pub rotate_speed: f32,
    pub zoom_speed: f32,
    pub min_radius: f32,
    pub max_radius: f32,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            fov: std::f32::consts::FRAC_PI_4,
            near: 0.1,
            far: 1000.0,
            position: vec3(0.0, 5.0, 14.0),
            target: vec3(0.0, 2.5, 0.0),
            damping: 0.08,
            rotate_speed: 0.005,
            zoom_speed: 0.05,
            min_radius: 3.0,
            max_radius: 60.0,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LayoutConfig {
    pub columns: usize,
    pub rows_per_layer: usize,
    pub column_spacing: f32,
    pub row_spacing: f32,
    pub layer_spacing: f32,
    /// Height of the first row above the ground plane.
    pub base_height: f32,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            columns: 3,
            rows_per_layer: 4,
            column_spacing: 4.0,
            row_spacing: 1.5,
            layer_spacing: 3.0,
            base_height: 0.75,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LabelConfig {
    /// World units per em.
    pub size: f32,
    pub depth: f32,
    pub padding: f32,
    pub max_chars: usize,
}

impl Default for LabelConfig {
    fn default() -> Self {
        Self {
            size: 0.35,
            depth: 0.12,
            padding: 0.2,
            max_chars: 24,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StageConfig {
    pub ground_size: f32,
    pub grid_divisions: u32,
    pub axis_length: f32,
    pub ambient_brightness: f32,
    pub sun_illuminance: f32,
    pub background: Color,
}

impl Default for StageConfig {
    fn default() -> Self {
        Self {
            ground_size: 30.0,
            grid_divisions: 30,
            axis_length: 2.0,
            ambient_brightness: 300.0,
            sun_illuminance: 8000.0,
            background: Color::SLATE,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Palette {
    pub low: Color,
    pub medium: Color,
    pub high: Color,
    pub completed: Color,
    pub glyph: Color,
    pub ground: Color,
    pub grid: Color,
}

impl Default for Palette {
    fn default() -> Self {
        Self {
            low: Color::rgb(0.22, 0.55, 0.85),
            medium: Color::rgb(0.95, 0.65, 0.15),
            high: Color::rgb(0.88, 0.24, 0.22),
            completed: Color::rgb(0.45, 0.48, 0.5),
            glyph: Color::WHITE,
            ground: Color::rgb(0.18, 0.2, 0.24),
            grid: Color::rgb(0.35, 0.37, 0.42),
        }
    }
}

impl Palette {
    /// Plate color for a task in the given state.
    pub fn task_color(&self, completed: bool, priority: Priority) -> Color {
        if completed {
            return self.completed;
        }
        match priority {
            Priority::Low => self.low,
            Priority::Medium => self.medium,
            Priority::High => self.high,
        }
    }
}

impl BoardConfig {
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| Report::new(TaskscapeError::Config(e.to_string())))?;
        config.validate().attach("while loading board configuration from JSON")?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let fail = |msg: &str| Err(Report::new(TaskscapeError::Config(msg.to_owned())));

        if self.layout.columns == 0 || self.layout.rows_per_layer == 0 {
            return fail("layout needs at least one column and one row per layer");
        }
        if !(self.camera.fov > 0.0 && self.camera.fov < std::f32::consts::PI) {
            return fail("camera fov must be in (0, pi)");
        }
        if !(self.camera.near > 0.0 && self.camera.near < self.camera.far) {
            return fail("camera near plane must be positive and closer than far");
        }
        if !(0.0..=1.0).contains(&self.camera.damping) {
            return fail("camera damping must be within [0, 1]");
        }
        if self.camera.min_radius <= 0.0 || self.camera.min_radius > self.camera.max_radius {
            return fail("camera radius bounds are inverted");
        }
        if self.label.size <= 0.0 || self.label.max_chars == 0 {
            return fail("labels need a positive size and at least one character");
        }
        if self.pixel_ratio.is_some_and(|ratio| ratio <= 0.0) {
            return fail("pixel ratio override must be positive");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_json_keeps_defaults() {
        let config = BoardConfig::from_json(r#"{"layout": {"columns": 5}, "auto_mount": false}"#)
            .unwrap();

        assert_eq!(config.layout.columns, 5);
        assert_eq!(config.layout.rows_per_layer, LayoutConfig::default().rows_per_layer);
        assert!(!config.auto_mount);
        assert_eq!(config.camera, CameraConfig::default());
    }

    #[test]
    fn zero_columns_is_rejected() {
        let err = BoardConfig::from_json(r#"{"layout": {"columns": 0}}"#).unwrap_err();
        assert!(matches!(err.current_context(), TaskscapeError::Config(_)));
    }

    #[test]
    fn completed_overrides_priority_color() {
        let palette = Palette::default();
        assert_eq!(palette.task_color(true, Priority::High), palette.completed);
        assert_eq!(palette.task_color(false, Priority::Low), palette.low);
    }
}
