use bevy::prelude::*;

use crate::core::{Priority, TaskId};

/// The single parent of every task visual.
#[derive(Component)]
pub struct TaskGroup;

/// Lookup tag on a task's visual node. Carries the task state the node
/// currently shows so the synchronizer can tell what changed.
#[derive(Component, Clone, Debug, PartialEq)]
pub struct TaskVisual {
    pub task_id: TaskId,
    pub text: String,
    pub completed: bool,
    pub priority: Priority,
    pub slot: usize,
}

/// The text part of a task visual, child of the node carrying [`TaskVisual`].
#[derive(Component)]
pub struct GlyphNode;

/// Local-space box used for hit testing, centered on the node's origin.
#[derive(Component, Clone, Copy, Debug, PartialEq)]
pub struct LabelBounds {
    pub half_extents: Vec3,
}

/// Marker for stage entities spawned by scene initialization (camera, lights,
/// ground, helpers, the task group).
#[derive(Component)]
pub struct SceneNode;

#[derive(Component)]
pub struct SceneCamera;

/// Ground plane, grid and axes.
#[derive(Component, Clone, Copy, Debug, PartialEq, Eq)]
pub enum StageHelper {
    Ground,
    Grid,
    Axes,
}

/// Orbit camera state with inertia.
#[derive(Component, Clone, Copy, Debug)]
pub struct OrbitControls {
    pub target: Vec3,
    pub radius: f32,
    pub yaw: f32,
    pub pitch: f32,
    pub yaw_velocity: f32,
    pub pitch_velocity: f32,
    pub zoom_velocity: f32,
    pub damping: f32,
    pub min_radius: f32,
    pub max_radius: f32,
}

impl OrbitControls {
    /// Controls that reproduce a camera placed at `eye` looking at `target`.
    pub fn looking_at(eye: Vec3, target: Vec3, damping: f32) -> Self {
        let offset = eye - target;
        let radius = offset.length().max(f32::EPSILON);
        Self {
            target,
            radius,
            yaw: offset.x.atan2(offset.z),
            pitch: (offset.y / radius).clamp(-1.0, 1.0).asin(),
            yaw_velocity: 0.0,
            pitch_velocity: 0.0,
            zoom_velocity: 0.0,
            damping,
            min_radius: 0.5,
            max_radius: f32::MAX,
        }
    }

    pub fn with_radius_bounds(mut self, min: f32, max: f32) -> Self {
        self.min_radius = min;
        self.max_radius = max;
        self.radius = self.radius.clamp(min, max);
        self
    }

    pub fn eye(&self) -> Vec3 {
        let (sy, cy) = self.yaw.sin_cos();
        let (sp, cp) = self.pitch.sin_cos();
        self.target + Vec3::new(sy * cp, sp, cy * cp) * self.radius
    }

    pub fn is_settled(&self) -> bool {
        const REST: f32 = 1e-5;
        self.yaw_velocity.abs() < REST
            && self.pitch_velocity.abs() < REST
            && self.zoom_velocity.abs() < REST
    }

    /// Apply one frame of accumulated velocity, then decay it.
    pub fn advance(&mut self) {
        const PITCH_LIMIT: f32 = 1.5;

        self.yaw += self.yaw_velocity;
        self.pitch = (self.pitch + self.pitch_velocity).clamp(-PITCH_LIMIT, PITCH_LIMIT);
        self.radius = (self.radius * (1.0 + self.zoom_velocity)).clamp(self.min_radius, self.max_radius);

        let keep = 1.0 - self.damping;
        self.yaw_velocity *= keep;
        self.pitch_velocity *= keep;
        self.zoom_velocity *= keep;
    }

    pub fn transform(&self) -> Transform {
        Transform::from_translation(self.eye()).looking_at(self.target, Vec3::Y)
    }
}
