//! Per-frame work: camera damping and the draw.

use bevy::input::mouse::{MouseMotion, MouseWheel};
use bevy::prelude::*;

use crate::config::BoardConfig;
use crate::render::components::{OrbitControls, SceneCamera};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum LoopState {
    #[default]
    Stopped,
    Running,
}

#[derive(Resource, Debug, Default)]
pub struct RenderLoop {
    state: LoopState,
    frames: u64,
}

impl RenderLoop {
    pub fn start(&mut self) {
        self.state = LoopState::Running;
    }

    pub fn stop(&mut self) {
        self.state = LoopState::Stopped;
    }

    pub fn state(&self) -> LoopState {
        self.state
    }

    pub fn is_running(&self) -> bool {
        self.state == LoopState::Running
    }

    /// Frames drawn since the plugin was added.
    pub fn frames(&self) -> u64 {
        self.frames
    }
}

/// One frame: advance damping, place the camera, draw. A tick that observes
/// `Stopped` touches nothing, even if it was already scheduled this frame.
pub fn tick_render_loop(
    mut render_loop: ResMut<RenderLoop>,
    mut cameras: Query<(&mut OrbitControls, &mut Transform, &mut Camera), With<SceneCamera>>,
) {
    if !render_loop.is_running() {
        for (_, _, mut camera) in &mut cameras {
            if camera.is_active {
                camera.is_active = false;
            }
        }
        return;
    }

    for (mut controls, mut transform, mut camera) in &mut cameras {
        if !controls.is_settled() {
            controls.advance();
            *transform = controls.transform();
        }
        if !camera.is_active {
            camera.is_active = true;
        }
    }
    render_loop.frames += 1;
}

/// Drag to orbit, wheel to zoom. Input only feeds velocity; the render loop
/// integrates it.
pub fn orbit_input(
    render_loop: Res<RenderLoop>,
    config: Res<BoardConfig>,
    mouse: Res<ButtonInput<MouseButton>>,
    mut motion: MessageReader<MouseMotion>,
    mut wheel: MessageReader<MouseWheel>,
    mut controls: Query<&mut OrbitControls, With<SceneCamera>>,
) {
    if !render_loop.is_running() {
        motion.clear();
        wheel.clear();
        return;
    }

    let mut drag = Vec2::ZERO;
    if mouse.pressed(MouseButton::Left) {
        for event in motion.read() {
            drag += event.delta;
        }
    } else {
        motion.clear();
    }
    let zoom: f32 = wheel.read().map(|event| event.y).sum();

    if drag == Vec2::ZERO && zoom == 0.0 {
        return;
    }
    for mut orbit in &mut controls {
        orbit.yaw_velocity -= drag.x * config.camera.rotate_speed;
        orbit.pitch_velocity += drag.y * config.camera.rotate_speed;
        orbit.zoom_velocity -= zoom * config.camera.zoom_speed;
    }
}
