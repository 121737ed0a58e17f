//! Task list -> task group reconciliation.
//!
//! Every pass diffs the live [`TaskList`] against the `TaskVisual` tags found
//! under the task group, so it never works from a stale copy. Unchanged tasks
//! cost nothing: no asset allocation, no spawn or despawn.

use bevy::ecs::system::SystemParam;
use bevy::prelude::*;
use std::collections::{HashMap, HashSet};

use crate::config::{BoardConfig, LayoutConfig};
use crate::core::{Task, TaskId};
use crate::glyphs::GlyphSet;
use crate::render::components::{GlyphNode, LabelBounds, TaskGroup, TaskVisual};
use crate::render::dispose::{AssetStores, Dispose, OwnedAssets};
use crate::render::label::{GlyphGeometry, build_label};
use crate::render::resources::{GlyphState, SceneHandles, SyncStats, TaskIndex, TaskList};

/// Set whenever the next frame should run a synchronization pass regardless
/// of whether the task list changed.
#[derive(Resource, Default, Debug)]
pub struct SyncRequest(pub bool);

impl SyncRequest {
    pub fn request(&mut self) {
        self.0 = true;
    }
}

/// What one pass did.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub created: usize,
    pub updated: usize,
    pub removed: usize,
    pub deferred: usize,
    pub skipped: usize,
}

impl SyncReport {
    pub fn is_noop(&self) -> bool {
        self.created == 0 && self.updated == 0 && self.removed == 0
    }
}

/// Diff between the incoming list and the existing visuals. `create` and
/// `update` refer to positions in the deduplicated incoming list, which are
/// also the placement slots.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SyncPlan<K> {
    pub create: Vec<usize>,
    pub update: Vec<(K, usize)>,
    pub remove: Vec<K>,
}

impl<K> Default for SyncPlan<K> {
    fn default() -> Self {
        Self {
            create: Vec::new(),
            update: Vec::new(),
            remove: Vec::new(),
        }
    }
}

impl<K> SyncPlan<K> {
    pub fn is_empty(&self) -> bool {
        self.create.is_empty() && self.update.is_empty() && self.remove.is_empty()
    }
}

/// Drop tasks that cannot be shown: empty ids, and repeats of an id already
/// seen (the first occurrence wins). Returns the kept tasks in order and the
/// number skipped.
pub fn dedup_tasks(tasks: &[Task]) -> (Vec<&Task>, usize) {
    let mut seen = HashSet::with_capacity(tasks.len());
    let mut kept = Vec::with_capacity(tasks.len());
    let mut skipped = 0;

    for task in tasks {
        if task.id.is_empty() {
            warn!("skipping task with empty id (text: {:?})", task.text);
            skipped += 1;
        } else if !seen.insert(&task.id) {
            warn!("skipping duplicate task id {}", task.id);
            skipped += 1;
        } else {
            kept.push(task);
        }
    }
    (kept, skipped)
}

fn needs_update(visual: &TaskVisual, task: &Task, slot: usize) -> bool {
    visual.completed != task.completed
        || visual.priority != task.priority
        || visual.text != task.text
        || visual.slot != slot
}

pub fn plan_sync<'a, K: Copy>(
    incoming: &[&Task],
    existing: impl IntoIterator<Item = (K, &'a TaskVisual)>,
) -> SyncPlan<K> {
    let slots: HashMap<&TaskId, usize> = incoming
        .iter()
        .enumerate()
        .map(|(slot, task)| (&task.id, slot))
        .collect();

    let mut plan = SyncPlan::default();
    let mut present: HashSet<&TaskId> = HashSet::with_capacity(slots.len());

    for (key, visual) in existing {
        match slots.get(&visual.task_id) {
            // A second node with the same tag is an orphan.
            Some(_) if present.contains(&visual.task_id) => plan.remove.push(key),
            Some(&slot) => {
                present.insert(&incoming[slot].id);
                if needs_update(visual, incoming[slot], slot) {
                    plan.update.push((key, slot));
                }
            }
            None => plan.remove.push(key),
        }
    }

    plan.create = incoming
        .iter()
        .enumerate()
        .filter(|(_, task)| !present.contains(&task.id))
        .map(|(slot, _)| slot)
        .collect();

    plan
}

/// Grid placement: columns across, rows downward, then layers going back.
pub fn slot_position(slot: usize, layout: &LayoutConfig) -> Vec3 {
    let cols = layout.columns.max(1);
    let rows = layout.rows_per_layer.max(1);

    let column = slot % cols;
    let row = (slot / cols) % rows;
    let layer = slot / (cols * rows);

    Vec3::new(
        (column as f32 - (cols - 1) as f32 * 0.5) * layout.column_spacing,
        layout.base_height + (rows - 1 - row) as f32 * layout.row_spacing,
        -(layer as f32) * layout.layer_spacing,
    )
}

#[derive(SystemParam)]
pub struct VisualNodes<'w, 's> {
    pub visuals: Query<
        'w,
        's,
        (
            Entity,
            &'static mut TaskVisual,
            &'static mut Transform,
            &'static mut OwnedAssets,
            &'static mut Mesh3d,
            &'static mut LabelBounds,
            Option<&'static Children>,
        ),
    >,
    pub glyphs: Query<'w, 's, &'static OwnedAssets, (With<GlyphNode>, Without<TaskVisual>)>,
}

/// Release a visual's assets (its own and its glyph node's) and despawn it,
/// which also detaches it from the task group. Returns the number of
/// disposal failures.
pub fn release_visual(
    commands: &mut Commands,
    nodes: &VisualNodes,
    entity: Entity,
    stores: &mut AssetStores<'_>,
) -> usize {
    let Ok((_, visual, _, owned, _, _, children)) = nodes.visuals.get(entity) else {
        return 0;
    };

    let mut failures = 0;
    for child in children.into_iter().flat_map(|c| c.iter()) {
        let Ok(glyph_assets) = nodes.glyphs.get(child) else {
            continue;
        };
        if let Err(report) = glyph_assets.dispose(stores) {
            failures += 1;
            warn!("failed to release glyphs of task {}: {report:?}", visual.task_id);
        }
    }
    if let Err(report) = owned.dispose(stores) {
        failures += 1;
        warn!("failed to release label of task {}: {report:?}", visual.task_id);
    }

    commands.entity(entity).try_despawn();
    failures
}

fn spawn_glyph_node(
    commands: &mut Commands,
    parent: Entity,
    geometry: GlyphGeometry,
    config: &BoardConfig,
    stores: &mut AssetStores<'_>,
) {
    let mesh = stores.add_mesh(geometry.mesh);
    let material = stores.add_material(StandardMaterial {
        base_color: config.palette.glyph.into(),
        unlit: true,
        ..default()
    });
    commands.spawn((
        GlyphNode,
        Mesh3d(mesh.clone()),
        MeshMaterial3d(material.clone()),
        Transform::from_translation(geometry.offset),
        LabelBounds {
            half_extents: geometry.half,
        },
        OwnedAssets::new(mesh, material),
        ChildOf(parent),
    ));
}

fn spawn_visual(
    commands: &mut Commands,
    group: Entity,
    task: &Task,
    slot: usize,
    glyphs: &GlyphSet,
    config: &BoardConfig,
    stores: &mut AssetStores<'_>,
) -> Entity {
    let label = build_label(&task.text, glyphs, &config.label);
    let color = config.palette.task_color(task.completed, task.priority);

    let plate = stores.add_mesh(label.plate);
    let material = stores.add_material(StandardMaterial {
        base_color: color.into(),
        perceptual_roughness: 0.6,
        ..default()
    });

    let entity = commands
        .spawn((
            Name::new(format!("task {}", task.id)),
            TaskVisual {
                task_id: task.id.clone(),
                text: task.text.clone(),
                completed: task.completed,
                priority: task.priority,
                slot,
            },
            Mesh3d(plate.clone()),
            MeshMaterial3d(material.clone()),
            Transform::from_translation(slot_position(slot, &config.layout)),
            LabelBounds {
                half_extents: label.plate_half,
            },
            OwnedAssets::new(plate, material),
            ChildOf(group),
        ))
        .id();

    if let Some(geometry) = label.glyphs {
        spawn_glyph_node(commands, entity, geometry, config, stores);
    }
    entity
}

/// Bring one existing visual in line with its task. Geometry is rebuilt only
/// when the label text changed and glyphs are available.
#[allow(clippy::too_many_arguments)]
fn update_visual(
    commands: &mut Commands,
    nodes: &mut VisualNodes,
    entity: Entity,
    task: &Task,
    slot: usize,
    glyphs: Option<&GlyphSet>,
    config: &BoardConfig,
    stores: &mut AssetStores<'_>,
) {
    let Ok((_, mut visual, mut transform, mut owned, mut mesh, mut bounds, children)) =
        nodes.visuals.get_mut(entity)
    else {
        return;
    };

    if visual.completed != task.completed || visual.priority != task.priority {
        let color = config.palette.task_color(task.completed, task.priority);
        let recolored = owned
            .material
            .as_ref()
            .is_some_and(|material| stores.set_base_color(material, color.into()));
        if !recolored {
            warn!("material of task {} is gone; color not updated", task.id);
        }
        visual.completed = task.completed;
        visual.priority = task.priority;
    }

    if visual.slot != slot {
        transform.translation = slot_position(slot, &config.layout);
        visual.slot = slot;
    }

    if visual.text != task.text {
        let Some(glyphs) = glyphs else {
            debug!("glyphs not ready; keeping old label for task {}", task.id);
            return;
        };
        let label = build_label(&task.text, glyphs, &config.label);

        if let Err(report) = owned.mesh.dispose(stores) {
            warn!("failed to release old label of task {}: {report:?}", task.id);
        }
        let plate = stores.add_mesh(label.plate);
        mesh.0 = plate.clone();
        owned.mesh = plate;
        bounds.half_extents = label.plate_half;

        for child in children.into_iter().flat_map(|c| c.iter()) {
            if let Ok(glyph_assets) = nodes.glyphs.get(child) {
                if let Err(report) = glyph_assets.dispose(stores) {
                    warn!("failed to release old glyphs of task {}: {report:?}", task.id);
                }
                commands.entity(child).try_despawn();
            }
        }
        if let Some(geometry) = label.glyphs {
            spawn_glyph_node(commands, entity, geometry, config, stores);
        }
        visual.text = task.text.clone();
    }
}

/// Run condition: a pass was requested or the task list changed.
pub fn sync_needed(request: Res<SyncRequest>, tasks: Res<TaskList>) -> bool {
    request.0 || tasks.is_changed()
}

#[allow(clippy::too_many_arguments)]
pub fn sync_task_meshes(
    mut commands: Commands,
    tasks: Res<TaskList>,
    handles: Option<Res<SceneHandles>>,
    glyph_state: Res<GlyphState>,
    config: Res<BoardConfig>,
    mut request: ResMut<SyncRequest>,
    mut index: ResMut<TaskIndex>,
    mut stats: ResMut<SyncStats>,
    group_children: Query<&Children, With<TaskGroup>>,
    mut nodes: VisualNodes,
    mut meshes: ResMut<Assets<Mesh>>,
    mut materials: ResMut<Assets<StandardMaterial>>,
) {
    let Some(handles) = handles else {
        debug!("no task group yet; synchronization skipped");
        return;
    };
    request.0 = false;

    let (incoming, skipped) = dedup_tasks(&tasks.0);
    let existing: Vec<Entity> = group_children
        .get(handles.group)
        .map(|children| children.iter().collect())
        .unwrap_or_default();

    let plan = plan_sync(
        &incoming,
        nodes
            .visuals
            .iter_many(existing.iter().copied())
            .map(|(entity, visual, ..)| (entity, visual)),
    );

    let mut report = SyncReport {
        skipped,
        ..default()
    };
    let mut stores = AssetStores::new(&mut meshes, &mut materials);

    for &entity in &plan.remove {
        if let Ok((_, visual, ..)) = nodes.visuals.get(entity) {
            if index.get(&visual.task_id) == Some(entity) {
                index.by_task.remove(&visual.task_id);
            }
        }
        stats.disposal_failures += release_visual(&mut commands, &nodes, entity, &mut stores) as u64;
        report.removed += 1;
    }

    // Survivors the index lost track of (e.g. the orphan it pointed at was removed).
    for (entity, visual, ..) in nodes.visuals.iter_many(existing.iter().copied()) {
        if !plan.remove.contains(&entity) && !index.by_task.contains_key(&visual.task_id) {
            index.by_task.insert(visual.task_id.clone(), entity);
        }
    }

    let glyphs = glyph_state.glyphs();
    for &(entity, slot) in &plan.update {
        let task = incoming[slot];
        update_visual(
            &mut commands,
            &mut nodes,
            entity,
            task,
            slot,
            glyphs,
            &config,
            &mut stores,
        );
        index.by_task.insert(task.id.clone(), entity);
        report.updated += 1;
    }

    match glyphs {
        Some(glyphs) => {
            for &slot in &plan.create {
                let task = incoming[slot];
                let entity = spawn_visual(
                    &mut commands,
                    handles.group,
                    task,
                    slot,
                    glyphs,
                    &config,
                    &mut stores,
                );
                index.by_task.insert(task.id.clone(), entity);
                report.created += 1;
            }
        }
        None => report.deferred = plan.create.len(),
    }

    let tally = stores.tally;
    stats.absorb(tally);
    stats.passes += 1;
    stats.created += report.created as u64;
    stats.updated += report.updated as u64;
    stats.removed += report.removed as u64;
    stats.deferred += report.deferred as u64;
    stats.skipped += report.skipped as u64;

    if report.is_noop() {
        trace!("sync pass: nothing to do ({} tasks)", incoming.len());
    } else {
        debug!(
            "sync pass: +{} ~{} -{} (deferred {}, skipped {})",
            report.created, report.updated, report.removed, report.deferred, report.skipped
        );
    }
}
