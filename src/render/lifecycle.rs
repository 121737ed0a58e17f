//! Mount / update / unmount sequencing.
//!
//! ```text
//! Unmounted --mount--> Mounting --scene ready--> Ready --unmount--> TearingDown --released--> Unmounted
//!                         |                                              ^
//!                         +------------- init failed (back to Unmounted) |
//!                         +------------- unmount ------------------------+
//! ```
//!
//! A mount that arrives while tearing down is held and starts as soon as the
//! teardown completes.

use bevy::prelude::*;
use bevy_camera::Projection;
use error_stack::Report;

use crate::config::BoardConfig;
use crate::render::components::{SceneCamera, SceneNode, TaskVisual};
use crate::render::dispose::{AssetStores, OwnedAssets};
use crate::render::frame::RenderLoop;
use crate::render::resources::{
    BoardCommand, BoardInbox, GlyphSource, GlyphState, SceneHandles, SyncStats, TaskIndex,
    TaskList, ViewportHost,
};
use crate::render::scene::{initialize_scene, teardown_scene};
use crate::render::sync::{SyncRequest, VisualNodes, release_visual};
use crate::viewport::physical_size;
use crate::{Result, TaskscapeError};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum LifecyclePhase {
    #[default]
    Unmounted,
    Mounting,
    Ready,
    TearingDown,
}

impl LifecyclePhase {
    pub fn name(self) -> &'static str {
        match self {
            LifecyclePhase::Unmounted => "Unmounted",
            LifecyclePhase::Mounting => "Mounting",
            LifecyclePhase::Ready => "Ready",
            LifecyclePhase::TearingDown => "TearingDown",
        }
    }
}

#[derive(Resource, Debug, Default)]
pub struct Lifecycle {
    phase: LifecyclePhase,
    mounts: u32,
    remount: bool,
}

impl Lifecycle {
    pub fn phase(&self) -> LifecyclePhase {
        self.phase
    }

    pub fn is_ready(&self) -> bool {
        self.phase == LifecyclePhase::Ready
    }

    /// Completed mounts since the plugin was added.
    pub fn mounts(&self) -> u32 {
        self.mounts
    }

    fn transition(
        &mut self,
        event: &'static str,
        allowed: &[LifecyclePhase],
        to: LifecyclePhase,
    ) -> Result<()> {
        if !allowed.contains(&self.phase) {
            return Err(Report::new(TaskscapeError::InvalidTransition {
                from: self.phase.name(),
                event,
            }));
        }
        debug!("board lifecycle: {} -> {} ({event})", self.phase.name(), to.name());
        self.phase = to;
        Ok(())
    }

    pub fn begin_mount(&mut self) -> Result<()> {
        self.transition("mount", &[LifecyclePhase::Unmounted], LifecyclePhase::Mounting)
    }

    /// Host mount request. During a teardown the mount is held and starts
    /// once the teardown finishes.
    pub fn request_mount(&mut self) -> Result<()> {
        if self.phase == LifecyclePhase::TearingDown {
            self.remount = true;
            return Ok(());
        }
        self.begin_mount()
    }

    pub fn remount_pending(&self) -> bool {
        self.remount
    }

    pub fn finish_mount(&mut self) -> Result<()> {
        self.transition("scene ready", &[LifecyclePhase::Mounting], LifecyclePhase::Ready)?;
        self.mounts += 1;
        Ok(())
    }

    pub fn abort_mount(&mut self) -> Result<()> {
        self.transition("mount failed", &[LifecyclePhase::Mounting], LifecyclePhase::Unmounted)
    }

    /// Start tearing down. Returns false when there is nothing to tear down
    /// (already unmounted or already tearing down). A later unmount cancels a
    /// queued mount.
    pub fn begin_teardown(&mut self) -> bool {
        self.remount = false;
        self.transition(
            "unmount",
            &[LifecyclePhase::Mounting, LifecyclePhase::Ready],
            LifecyclePhase::TearingDown,
        )
        .is_ok()
    }

    /// Ends in Mounting instead of Unmounted when a mount was queued.
    pub fn finish_teardown(&mut self) -> Result<()> {
        self.transition("released", &[LifecyclePhase::TearingDown], LifecyclePhase::Unmounted)?;
        if std::mem::take(&mut self.remount) {
            self.begin_mount()?;
        }
        Ok(())
    }
}

/// Polls the container size while the board is mounted.
#[derive(Resource, Debug, Default)]
pub struct ResizeWatcher {
    active: bool,
    last: Option<Vec2>,
}

impl ResizeWatcher {
    pub fn start(&mut self, size: Vec2) {
        self.active = true;
        self.last = Some(size);
    }

    pub fn stop(&mut self) {
        self.active = false;
        self.last = None;
    }

    pub fn is_active(&self) -> bool {
        self.active
    }
}

pub fn in_phase(phase: LifecyclePhase) -> impl FnMut(Res<Lifecycle>) -> bool + Clone {
    move |lifecycle: Res<Lifecycle>| lifecycle.phase() == phase
}

pub fn controller_ready(lifecycle: Res<Lifecycle>) -> bool {
    lifecycle.is_ready()
}

pub fn auto_mount(config: Res<BoardConfig>, mut lifecycle: ResMut<Lifecycle>) {
    if !config.auto_mount {
        return;
    }
    if let Err(report) = lifecycle.begin_mount() {
        warn!("auto mount skipped: {report:?}");
    }
}

/// Apply host commands queued through [`crate::render::BoardHandle`].
pub fn drain_board_commands(
    inbox: Option<Res<BoardInbox>>,
    mut lifecycle: ResMut<Lifecycle>,
    mut tasks: ResMut<TaskList>,
    mut request: ResMut<SyncRequest>,
    mut stats: ResMut<SyncStats>,
) {
    let Some(inbox) = inbox else {
        return;
    };
    let queued: Vec<BoardCommand> = inbox.0.try_iter().collect();

    for command in queued {
        match command {
            BoardCommand::Mount => {
                if let Err(report) = lifecycle.request_mount() {
                    warn!("mount ignored: {report:?}");
                }
            }
            BoardCommand::SetTasks(list) => {
                tasks.0 = list;
                if lifecycle.is_ready() {
                    request.request();
                } else {
                    stats.dropped_updates += 1;
                    debug!(
                        "task update while {}; the first pass after mount picks it up",
                        lifecycle.phase().name()
                    );
                }
            }
            BoardCommand::Unmount => {
                if !lifecycle.begin_teardown() {
                    debug!("unmount ignored while {}", lifecycle.phase().name());
                }
            }
        }
    }
}

#[allow(clippy::too_many_arguments)]
pub fn mount_controller(
    mut commands: Commands,
    mut lifecycle: ResMut<Lifecycle>,
    host: Option<NonSendMut<ViewportHost>>,
    config: Res<BoardConfig>,
    source: Res<GlyphSource>,
    mut glyph_state: ResMut<GlyphState>,
    mut render_loop: ResMut<RenderLoop>,
    mut resize: ResMut<ResizeWatcher>,
    mut request: ResMut<SyncRequest>,
    mut stats: ResMut<SyncStats>,
    mut meshes: ResMut<Assets<Mesh>>,
    mut materials: ResMut<Assets<StandardMaterial>>,
) {
    let Some(mut host) = host else {
        error!("task board has no container to mount into");
        let _ = lifecycle.abort_mount();
        return;
    };

    let mut stores = AssetStores::new(&mut meshes, &mut materials);
    let built = initialize_scene(&mut commands, host.container.as_mut(), &config, &mut stores);
    stats.absorb(stores.tally);

    if let Err(report) = built {
        error!("task board mount failed: {report:?}");
        let _ = lifecycle.abort_mount();
        return;
    }
    stats.scene_initializations += 1;

    let load = source.cache.load(source.provider.as_ref());
    *glyph_state = GlyphState {
        pending: Some(load),
        ready: None,
        failures: glyph_state.failures,
        retry_in: 0,
    };
    resize.start(host.container.size());
    render_loop.start();
    request.request();

    match lifecycle.finish_mount() {
        Ok(()) => info!("task board mounted"),
        Err(report) => error!("task board mount could not complete: {report:?}"),
    }
}

/// Picks up the mount's glyph load. After a failure the provider is asked
/// again with a backoff, so glyphs that show up later still reach the labels.
pub fn poll_glyphs(
    source: Res<GlyphSource>,
    mut state: ResMut<GlyphState>,
    mut request: ResMut<SyncRequest>,
) {
    if state.ready.is_some() {
        return;
    }
    let Some(outcome) = state.pending.as_ref().map(|load| load.poll_ready()) else {
        if state.retry_in > 0 {
            state.retry_in -= 1;
        } else {
            state.pending = Some(source.cache.load(source.provider.as_ref()));
        }
        return;
    };
    let Some(outcome) = outcome else {
        return;
    };
    state.pending = None;

    match outcome {
        Ok(glyphs) => {
            debug!("glyphs ready ({})", glyphs.family);
            state.ready = Some(glyphs);
            request.request();
        }
        Err(err) => {
            state.failures += 1;
            state.retry_in = 1 << state.failures.min(6);
            let report = Report::new(err).change_context(TaskscapeError::GlyphLoad(
                "task labels stay hidden until glyphs arrive".into(),
            ));
            warn!("{report:?}");
        }
    }
}

/// Keeps camera aspect and surface size in line with the container. Never
/// rebuilds the scene or touches task visuals.
pub fn watch_container_resize(
    mut resize: ResMut<ResizeWatcher>,
    host: Option<NonSendMut<ViewportHost>>,
    config: Res<BoardConfig>,
    handles: Option<Res<SceneHandles>>,
    mut cameras: Query<&mut Projection, With<SceneCamera>>,
) {
    if !resize.is_active() {
        return;
    }
    let (Some(mut host), Some(handles)) = (host, handles) else {
        return;
    };

    let size = host.container.size();
    if resize.last == Some(size) || size.x <= 0.0 || size.y <= 0.0 {
        return;
    }
    resize.last = Some(size);

    if let Ok(mut projection) = cameras.get_mut(handles.camera) {
        if let Projection::Perspective(perspective) = &mut *projection {
            perspective.aspect_ratio = size.x / size.y;
        }
    }

    let ratio = config.pixel_ratio.unwrap_or_else(|| host.container.pixel_ratio());
    let surface = physical_size(size, ratio);
    host.container.resize_surface(surface);
    debug!("board resized to {}x{} css px (surface {surface})", size.x, size.y);
}

/// Stop the frame loop and resize watcher, release every task visual, then
/// the stage. A failed release is logged and the rest still runs.
#[allow(clippy::too_many_arguments)]
pub fn teardown_controller(
    mut commands: Commands,
    mut lifecycle: ResMut<Lifecycle>,
    mut render_loop: ResMut<RenderLoop>,
    mut resize: ResMut<ResizeWatcher>,
    mut host: Option<NonSendMut<ViewportHost>>,
    mut glyph_state: ResMut<GlyphState>,
    mut index: ResMut<TaskIndex>,
    mut stats: ResMut<SyncStats>,
    nodes: VisualNodes,
    stage: Query<(Entity, Option<&OwnedAssets>), (With<SceneNode>, Without<TaskVisual>)>,
    mut meshes: ResMut<Assets<Mesh>>,
    mut materials: ResMut<Assets<StandardMaterial>>,
) {
    render_loop.stop();
    resize.stop();

    let mut stores = AssetStores::new(&mut meshes, &mut materials);

    let visuals: Vec<Entity> = nodes.visuals.iter().map(|(entity, ..)| entity).collect();
    let mut failures = 0;
    for &entity in &visuals {
        failures += release_visual(&mut commands, &nodes, entity, &mut stores);
    }
    index.by_task.clear();
    stats.removed += visuals.len() as u64;

    failures += teardown_scene(
        &mut commands,
        stage.iter(),
        host.as_deref_mut().map(|host| host.container.as_mut()),
        &mut stores,
    );

    stats.absorb(stores.tally);
    stats.disposal_failures += failures as u64;
    glyph_state.pending = None;
    glyph_state.ready = None;

    match lifecycle.finish_teardown() {
        Ok(()) => {
            info!(
                "task board unmounted ({} visuals released, {failures} release failures)",
                visuals.len()
            );
            if lifecycle.phase() == LifecyclePhase::Mounting {
                info!("remounting task board");
            }
        }
        Err(report) => error!("task board teardown ended out of order: {report:?}"),
    }
}
