//! Pointer -> task resolution.
//!
//! Only the task group's subtree is tested, so the ground and helpers can
//! never be selected. Hits are resolved against each node's [`LabelBounds`]
//! in the node's own space, then walked up to the nearest [`TaskVisual`] tag.

use bevy::ecs::system::SystemParam;
use bevy::prelude::*;
use bevy_camera::{PerspectiveProjection, Projection};
use bevy_math::Ray3d;
use glam::Affine3A;

use crate::core::TaskId;
use crate::render::components::{LabelBounds, SceneCamera, TaskVisual};
use crate::render::resources::{SceneHandles, SelectionHandler, ViewportHost};

/// A press at client coordinates (same space as the container's bounding rect).
#[derive(Message, Clone, Copy, Debug, PartialEq)]
pub struct PointerPressed {
    pub position: Vec2,
}

/// Normalized device coordinates of a pointer inside `rect`, or `None` when
/// the pointer is outside it.
pub fn pointer_to_ndc(pointer: Vec2, rect: Rect) -> Option<Vec2> {
    let size = rect.size();
    if size.x <= 0.0 || size.y <= 0.0 || !rect.contains(pointer) {
        return None;
    }
    let local = (pointer - rect.min) / size;
    Some(Vec2::new(local.x * 2.0 - 1.0, 1.0 - local.y * 2.0))
}

pub fn camera_ray(
    ndc: Vec2,
    camera: &Transform,
    projection: &PerspectiveProjection,
) -> Option<Ray3d> {
    let half_height = (projection.fov * 0.5).tan();
    let view = Vec3::new(
        ndc.x * half_height * projection.aspect_ratio,
        ndc.y * half_height,
        -1.0,
    );
    let direction = Dir3::new(camera.rotation * view).ok()?;
    Some(Ray3d {
        origin: camera.translation,
        direction,
    })
}

/// Where a world point lands inside `rect`, if it is in front of the camera.
pub fn project_to_viewport(
    point: Vec3,
    camera: &Transform,
    projection: &PerspectiveProjection,
    rect: Rect,
) -> Option<Vec2> {
    let view = camera.rotation.inverse() * (point - camera.translation);
    if view.z >= 0.0 {
        return None;
    }
    let half_height = (projection.fov * 0.5).tan();
    let depth = -view.z;
    let ndc = Vec2::new(
        view.x / (depth * half_height * projection.aspect_ratio),
        view.y / (depth * half_height),
    );
    Some(rect.min + Vec2::new((ndc.x + 1.0) * 0.5, (1.0 - ndc.y) * 0.5) * rect.size())
}

/// Distance along a local-space ray to a centered box, slab method.
fn ray_box(origin: Vec3, dir: Vec3, half: Vec3) -> Option<f32> {
    let mut t_min = 0.0_f32;
    let mut t_max = f32::INFINITY;

    for axis in 0..3 {
        let (o, d, h) = (origin[axis], dir[axis], half[axis]);
        if d.abs() < f32::EPSILON {
            if o < -h || o > h {
                return None;
            }
            continue;
        }
        let inv = 1.0 / d;
        let (a, b) = ((-h - o) * inv, (h - o) * inv);
        t_min = t_min.max(a.min(b));
        t_max = t_max.min(a.max(b));
        if t_min > t_max {
            return None;
        }
    }
    Some(t_min)
}

/// One hit-testable node: its world transform and local bounds.
#[derive(Clone, Copy, Debug)]
pub struct PickTarget<K> {
    pub key: K,
    pub world: Affine3A,
    pub half_extents: Vec3,
}

/// The nearest target the ray passes through, with its world distance.
pub fn nearest_hit<K: Copy>(
    ray: Ray3d,
    targets: impl IntoIterator<Item = PickTarget<K>>,
) -> Option<(K, f32)> {
    let mut best: Option<(K, f32)> = None;

    for target in targets {
        let inverse = target.world.inverse();
        let origin = inverse.transform_point3(ray.origin);
        let dir = inverse.transform_vector3(*ray.direction);
        let Some(t) = ray_box(origin, dir, target.half_extents) else {
            continue;
        };
        let hit = target.world.transform_point3(origin + dir * t);
        let distance = hit.distance(ray.origin);
        if best.is_none_or(|(_, d)| distance < d) {
            best = Some((target.key, distance));
        }
    }
    best
}

fn local_affine(transform: &Transform) -> Affine3A {
    Affine3A::from_scale_rotation_translation(
        transform.scale,
        transform.rotation,
        transform.translation,
    )
}

/// Read access to the task group's subtree for hit testing.
#[derive(SystemParam)]
pub struct PickNodes<'w, 's> {
    transforms: Query<'w, 's, (&'static Transform, Option<&'static ChildOf>)>,
    bounds: Query<'w, 's, &'static LabelBounds>,
    tags: Query<'w, 's, &'static TaskVisual>,
    children: Query<'w, 's, &'static Children>,
}

impl PickNodes<'_, '_> {
    /// World transform composed from the local transforms up the hierarchy.
    pub fn world_affine(&self, entity: Entity) -> Affine3A {
        let mut world = Affine3A::IDENTITY;
        let mut current = Some(entity);
        while let Some(e) = current {
            let Ok((transform, parent)) = self.transforms.get(e) else {
                break;
            };
            world = local_affine(transform) * world;
            current = parent.map(ChildOf::parent);
        }
        world
    }

    fn subtree_targets(&self, root: Entity) -> Vec<PickTarget<Entity>> {
        let mut targets = Vec::new();
        let mut stack = vec![root];
        while let Some(entity) = stack.pop() {
            if let Ok(bounds) = self.bounds.get(entity) {
                targets.push(PickTarget {
                    key: entity,
                    world: self.world_affine(entity),
                    half_extents: bounds.half_extents,
                });
            }
            if let Ok(children) = self.children.get(entity) {
                stack.extend(children.iter());
            }
        }
        targets
    }

    /// First entity from `entity` upward (inclusive) carrying a task tag,
    /// never leaving the subtree under `root`.
    pub fn owning_task(&self, entity: Entity, root: Entity) -> Option<&TaskId> {
        let mut current = Some(entity);
        while let Some(e) = current {
            if e == root {
                return None;
            }
            if let Ok(tag) = self.tags.get(e) {
                return Some(&tag.task_id);
            }
            current = self
                .transforms
                .get(e)
                .ok()
                .and_then(|(_, parent)| parent.map(ChildOf::parent));
        }
        None
    }

    pub fn resolve_pointer(
        &self,
        pointer: Vec2,
        rect: Rect,
        camera: &Transform,
        projection: &PerspectiveProjection,
        group: Entity,
    ) -> Option<TaskId> {
        let ndc = pointer_to_ndc(pointer, rect)?;
        let ray = camera_ray(ndc, camera, projection)?;
        let (hit, _) = nearest_hit(ray, self.subtree_targets(group))?;
        self.owning_task(hit, group).cloned()
    }
}

pub fn project_pointer_hits(
    mut presses: MessageReader<PointerPressed>,
    host: Option<NonSend<ViewportHost>>,
    handler: Option<NonSend<SelectionHandler>>,
    handles: Option<Res<SceneHandles>>,
    cameras: Query<(&Transform, &Projection), With<SceneCamera>>,
    nodes: PickNodes,
) {
    let (Some(host), Some(handles)) = (host, handles) else {
        presses.clear();
        return;
    };
    let Ok((camera, Projection::Perspective(projection))) = cameras.get(handles.camera) else {
        presses.clear();
        return;
    };

    let rect = host.container.bounding_rect();
    for press in presses.read() {
        match nodes.resolve_pointer(press.position, rect, camera, projection, handles.group) {
            Some(id) => {
                debug!("pointer at {} selects task {id}", press.position);
                if let Some(handler) = &handler {
                    handler.notify(&id);
                }
            }
            None => trace!("pointer at {} hit no task", press.position),
        }
    }
}

/// Turns primary-window left clicks into [`PointerPressed`] messages.
pub fn forward_window_clicks(
    mouse: Res<ButtonInput<MouseButton>>,
    windows: Query<&Window, With<bevy::window::PrimaryWindow>>,
    mut presses: MessageWriter<PointerPressed>,
) {
    if !mouse.just_pressed(MouseButton::Left) {
        return;
    }
    let Ok(window) = windows.single() else {
        return;
    };
    if let Some(position) = window.cursor_position() {
        presses.write(PointerPressed { position });
    }
}
