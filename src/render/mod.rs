pub mod components;
pub mod dispose;
pub mod frame;
pub mod label;
pub mod lifecycle;
pub mod picking;
pub mod resources;
pub mod scene;
pub mod sync;

pub use components::*;
pub use dispose::{AssetTally, OwnedAssets};
pub use frame::{LoopState, RenderLoop};
pub use lifecycle::{Lifecycle, LifecyclePhase, ResizeWatcher};
pub use picking::{PointerPressed, project_to_viewport};
pub use resources::*;
pub use sync::{SyncReport, SyncRequest};

use frame::*;
use lifecycle::*;
use picking::*;
use sync::*;

use bevy::prelude::*;
use std::sync::Arc;

use crate::config::BoardConfig;
use crate::glyphs::{GlyphCache, GlyphProvider, GlyphSet, StaticGlyphs};

/// Ordering of the per-frame work. Chained, so commands issued by one set are
/// applied before the next one runs.
#[derive(SystemSet, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BoardSystems {
    Lifecycle,
    Assets,
    Sync,
    Input,
    Frame,
}

pub struct TaskBoardPlugin {
    pub config: BoardConfig,
    pub glyphs: GlyphSource,
}

impl TaskBoardPlugin {
    pub fn new(config: BoardConfig, provider: impl GlyphProvider) -> Self {
        Self {
            config,
            glyphs: GlyphSource {
                cache: GlyphCache::global(),
                provider: Arc::new(provider),
            },
        }
    }

    /// Use a private cache instead of the process-wide one.
    pub fn with_cache(mut self, cache: GlyphCache) -> Self {
        self.glyphs.cache = cache;
        self
    }
}

impl Default for TaskBoardPlugin {
    fn default() -> Self {
        Self::new(BoardConfig::default(), StaticGlyphs(GlyphSet::monospace(0.6)))
    }
}

impl Plugin for TaskBoardPlugin {
    fn build(&self, app: &mut App) {
        let (handle, inbox) = board_channel();

        app.insert_resource(self.config.clone())
            .insert_resource(self.glyphs.clone())
            .insert_resource(handle)
            .insert_resource(inbox)
            .init_resource::<Lifecycle>()
            .init_resource::<TaskList>()
            .init_resource::<TaskIndex>()
            .init_resource::<SyncRequest>()
            .init_resource::<SyncStats>()
            .init_resource::<GlyphState>()
            .init_resource::<RenderLoop>()
            .init_resource::<ResizeWatcher>()
            .add_message::<PointerPressed>()
            .configure_sets(
                Update,
                (
                    BoardSystems::Lifecycle,
                    BoardSystems::Assets,
                    BoardSystems::Sync,
                    BoardSystems::Input,
                    BoardSystems::Frame,
                )
                    .chain(),
            )
            .add_systems(Startup, auto_mount)
            .add_systems(
                Update,
                (
                    drain_board_commands,
                    mount_controller.run_if(in_phase(LifecyclePhase::Mounting)),
                    teardown_controller.run_if(in_phase(LifecyclePhase::TearingDown)),
                )
                    .chain()
                    .in_set(BoardSystems::Lifecycle),
            )
            .add_systems(
                Update,
                (poll_glyphs, watch_container_resize)
                    .run_if(controller_ready)
                    .in_set(BoardSystems::Assets),
            )
            .add_systems(
                Update,
                sync_task_meshes
                    .run_if(controller_ready.and(sync_needed))
                    .in_set(BoardSystems::Sync),
            )
            .add_systems(
                Update,
                project_pointer_hits
                    .run_if(controller_ready)
                    .in_set(BoardSystems::Input),
            )
            .add_systems(Update, tick_render_loop.in_set(BoardSystems::Frame));

        if app.is_plugin_added::<bevy::input::InputPlugin>() {
            app.add_systems(
                Update,
                (forward_window_clicks, orbit_input)
                    .before(project_pointer_hits)
                    .in_set(BoardSystems::Input),
            );
        } else {
            debug!("no input plugin; pointer presses must be written as PointerPressed");
        }
    }
}
