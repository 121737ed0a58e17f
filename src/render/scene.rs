//! Stage construction and teardown: camera, lights, ground, helpers and the
//! task group.

use bevy::prelude::*;
use bevy_asset::RenderAssetUsages;
use bevy_camera::{PerspectiveProjection, Projection};
use bevy_mesh::PrimitiveTopology;
use error_stack::Report;

use crate::config::BoardConfig;
use crate::render::components::{OrbitControls, SceneCamera, SceneNode, StageHelper, TaskGroup};
use crate::render::dispose::{AssetStores, OwnedAssets, dispose_each};
use crate::render::resources::SceneHandles;
use crate::viewport::{ContainerElement, physical_size};
use crate::{Result, TaskscapeError};

fn grid_mesh(size: f32, divisions: u32) -> Mesh {
    let divisions = divisions.max(1);
    let half = size * 0.5;
    let step = size / divisions as f32;

    let mut positions = Vec::with_capacity((divisions as usize + 1) * 4);
    for i in 0..=divisions {
        let t = -half + i as f32 * step;
        positions.extend_from_slice(&[[t, 0.0, -half], [t, 0.0, half], [-half, 0.0, t], [half, 0.0, t]]);
    }

    Mesh::new(PrimitiveTopology::LineList, RenderAssetUsages::default())
        .with_inserted_attribute(Mesh::ATTRIBUTE_POSITION, positions)
}

fn axes_mesh(length: f32) -> Mesh {
    let positions = vec![
        [0.0, 0.0, 0.0],
        [length, 0.0, 0.0],
        [0.0, 0.0, 0.0],
        [0.0, length, 0.0],
        [0.0, 0.0, 0.0],
        [0.0, 0.0, length],
    ];
    let colors = vec![
        [1.0, 0.2, 0.2, 1.0],
        [1.0, 0.2, 0.2, 1.0],
        [0.2, 1.0, 0.2, 1.0],
        [0.2, 1.0, 0.2, 1.0],
        [0.2, 0.4, 1.0, 1.0],
        [0.2, 0.4, 1.0, 1.0],
    ];

    Mesh::new(PrimitiveTopology::LineList, RenderAssetUsages::default())
        .with_inserted_attribute(Mesh::ATTRIBUTE_POSITION, positions)
        .with_inserted_attribute(Mesh::ATTRIBUTE_COLOR, colors)
}

fn unlit(color: Color) -> StandardMaterial {
    StandardMaterial {
        base_color: color,
        unlit: true,
        ..default()
    }
}

/// Build the stage inside `container`. Fails without spawning anything if the
/// container is not part of a document.
pub fn initialize_scene(
    commands: &mut Commands,
    container: &mut dyn ContainerElement,
    config: &BoardConfig,
    stores: &mut AssetStores<'_>,
) -> Result<SceneHandles> {
    if !container.is_attached() {
        return Err(Report::new(TaskscapeError::ContainerDetached)
            .attach("the board can only mount into an element inside the document"));
    }

    let css = container.size();
    let ratio = config.pixel_ratio.unwrap_or_else(|| container.pixel_ratio());
    let cam = &config.camera;
    let stage = &config.stage;

    let controls = OrbitControls::looking_at(cam.position, cam.target, cam.damping)
        .with_radius_bounds(cam.min_radius, cam.max_radius);
    let camera = commands
        .spawn((
            Name::new("board camera"),
            SceneNode,
            SceneCamera,
            Camera3d::default(),
            Camera {
                clear_color: ClearColorConfig::Custom(stage.background.into()),
                ..default()
            },
            Projection::from(PerspectiveProjection {
                fov: cam.fov,
                aspect_ratio: css.x / css.y.max(1.0),
                near: cam.near,
                far: cam.far,
                ..default()
            }),
            controls.transform(),
            controls,
        ))
        .id();

    commands.insert_resource(AmbientLight {
        brightness: stage.ambient_brightness,
        ..default()
    });

    let sun = commands
        .spawn((
            Name::new("board sun"),
            SceneNode,
            DirectionalLight {
                illuminance: stage.sun_illuminance,
                shadows_enabled: false,
                ..default()
            },
            Transform::from_xyz(5.0, 10.0, 7.0).looking_at(Vec3::ZERO, Vec3::Y),
        ))
        .id();

    let ground_mesh = stores.add_mesh(
        Plane3d::default()
            .mesh()
            .size(stage.ground_size, stage.ground_size),
    );
    let ground_material = stores.add_material(StandardMaterial {
        base_color: config.palette.ground.into(),
        perceptual_roughness: 1.0,
        ..default()
    });
    let ground = commands
        .spawn((
            Name::new("board ground"),
            SceneNode,
            StageHelper::Ground,
            Mesh3d(ground_mesh.clone()),
            MeshMaterial3d(ground_material.clone()),
            Transform::default(),
            OwnedAssets::new(ground_mesh, ground_material),
        ))
        .id();

    let grid_mesh = stores.add_mesh(grid_mesh(stage.ground_size, stage.grid_divisions));
    let grid_material = stores.add_material(unlit(config.palette.grid.into()));
    let grid = commands
        .spawn((
            Name::new("board grid"),
            SceneNode,
            StageHelper::Grid,
            Mesh3d(grid_mesh.clone()),
            MeshMaterial3d(grid_material.clone()),
            Transform::from_xyz(0.0, 0.001, 0.0),
            OwnedAssets::new(grid_mesh, grid_material),
        ))
        .id();

    let axes_mesh = stores.add_mesh(axes_mesh(stage.axis_length));
    let axes_material = stores.add_material(unlit(Color::WHITE));
    let axes = commands
        .spawn((
            Name::new("board axes"),
            SceneNode,
            StageHelper::Axes,
            Mesh3d(axes_mesh.clone()),
            MeshMaterial3d(axes_material.clone()),
            Transform::from_xyz(0.0, 0.002, 0.0),
            OwnedAssets::new(axes_mesh, axes_material),
        ))
        .id();

    let group = commands
        .spawn((
            Name::new("task group"),
            SceneNode,
            TaskGroup,
            Transform::default(),
            Visibility::default(),
        ))
        .id();

    let handles = SceneHandles {
        camera,
        sun,
        ground,
        grid,
        axes,
        group,
    };
    commands.insert_resource(handles);

    let surface = physical_size(css, ratio);
    container.attach_surface(surface);
    info!("board scene ready: {}x{} css px, surface {surface}", css.x, css.y);

    Ok(handles)
}

/// Release every stage node and detach the draw surface. Safe to call when
/// nothing (or only part of the stage) was ever built. Returns the number of
/// disposal failures.
pub fn teardown_scene<'a>(
    commands: &mut Commands,
    nodes: impl IntoIterator<Item = (Entity, Option<&'a OwnedAssets>)>,
    container: Option<&mut (dyn ContainerElement + 'static)>,
    stores: &mut AssetStores<'_>,
) -> usize {
    let mut owned = Vec::new();
    let mut despawned = 0;
    for (entity, assets) in nodes {
        if let Some(assets) = assets {
            owned.push((entity, assets));
        }
        commands.entity(entity).try_despawn();
        despawned += 1;
    }
    let failures = dispose_each(owned, stores);

    commands.remove_resource::<SceneHandles>();
    commands.remove_resource::<AmbientLight>();

    if let Some(container) = container {
        container.detach_surface();
    }
    if despawned > 0 {
        info!("board scene torn down ({despawned} nodes, {failures} release failures)");
    }
    failures
}
