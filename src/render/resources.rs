use bevy::prelude::*;
use std::collections::HashMap;
use std::sync::Arc;

use crate::Result;
use crate::core::{Task, TaskId, tasks_from_json};
use crate::glyphs::{GlyphCache, GlyphLoad, GlyphProvider, GlyphSet};
use crate::render::dispose::AssetTally;
use crate::viewport::ContainerElement;

/// Latest task snapshot supplied by the store.
#[derive(Resource, Default, Clone, Debug)]
pub struct TaskList(pub Vec<Task>);

impl TaskList {
    pub fn from_json(json: &str) -> Result<Self> {
        tasks_from_json(json).map(Self)
    }
}

/// Task id -> visual node, maintained by the synchronization passes.
#[derive(Resource, Default, Debug)]
pub struct TaskIndex {
    pub by_task: HashMap<TaskId, Entity>,
}

impl TaskIndex {
    pub fn get(&self, id: &TaskId) -> Option<Entity> {
        self.by_task.get(id).copied()
    }

    pub fn len(&self) -> usize {
        self.by_task.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_task.is_empty()
    }
}

/// Stage entities created by scene initialization.
#[derive(Resource, Clone, Copy, Debug)]
pub struct SceneHandles {
    pub camera: Entity,
    pub sun: Entity,
    pub ground: Entity,
    pub grid: Entity,
    pub axes: Entity,
    pub group: Entity,
}

/// Running totals across synchronization passes and teardowns.
#[derive(Resource, Default, Clone, Debug, PartialEq, Eq)]
pub struct SyncStats {
    pub passes: u64,
    pub created: u64,
    pub updated: u64,
    pub removed: u64,
    pub deferred: u64,
    pub skipped: u64,
    pub assets: AssetTally,
    pub disposal_failures: u64,
    pub scene_initializations: u64,
    pub dropped_updates: u64,
}

impl SyncStats {
    pub fn absorb(&mut self, tally: AssetTally) {
        self.assets.meshes_allocated += tally.meshes_allocated;
        self.assets.meshes_released += tally.meshes_released;
        self.assets.materials_allocated += tally.materials_allocated;
        self.assets.materials_released += tally.materials_released;
    }
}

/// Where glyphs come from and which cache holds them.
#[derive(Resource, Clone)]
pub struct GlyphSource {
    pub cache: GlyphCache,
    pub provider: Arc<dyn GlyphProvider>,
}

/// Glyph availability for the current mount.
#[derive(Resource, Default)]
pub struct GlyphState {
    pub pending: Option<GlyphLoad>,
    pub ready: Option<Arc<GlyphSet>>,
    pub failures: u32,
    /// Frames to wait before asking the provider again after a failure.
    pub retry_in: u32,
}

impl GlyphState {
    pub fn glyphs(&self) -> Option<&GlyphSet> {
        self.ready.as_deref()
    }
}

/// Host callback for resolved selections.
pub struct SelectionHandler(Box<dyn Fn(&TaskId)>);

impl SelectionHandler {
    pub fn new(callback: impl Fn(&TaskId) + 'static) -> Self {
        Self(Box::new(callback))
    }

    pub fn notify(&self, id: &TaskId) {
        (self.0)(id)
    }
}

/// Owns the container element. Non-send: DOM handles stay on the main thread.
pub struct ViewportHost {
    pub container: Box<dyn ContainerElement>,
}

impl ViewportHost {
    pub fn new(container: impl ContainerElement + 'static) -> Self {
        Self {
            container: Box::new(container),
        }
    }
}

#[derive(Debug, Clone)]
pub enum BoardCommand {
    Mount,
    SetTasks(Vec<Task>),
    Unmount,
}

/// Cloneable sender the host uses to drive a running board.
#[derive(Resource, Clone)]
pub struct BoardHandle {
    tx: flume::Sender<BoardCommand>,
}

impl BoardHandle {
    pub fn mount(&self) {
        self.send(BoardCommand::Mount);
    }

    pub fn set_tasks(&self, tasks: Vec<Task>) {
        self.send(BoardCommand::SetTasks(tasks));
    }

    pub fn unmount(&self) {
        self.send(BoardCommand::Unmount);
    }

    fn send(&self, command: BoardCommand) {
        if self.tx.send(command).is_err() {
            warn!("task board is gone; command dropped");
        }
    }
}

#[derive(Resource)]
pub struct BoardInbox(pub flume::Receiver<BoardCommand>);

pub fn board_channel() -> (BoardHandle, BoardInbox) {
    let (tx, rx) = flume::unbounded();
    (BoardHandle { tx }, BoardInbox(rx))
}
