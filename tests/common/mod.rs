#![allow(dead_code)]

use bevy::ecs::message::Messages;
use bevy::prelude::*;
use bevy_camera::Projection;
use std::cell::RefCell;
use std::collections::BTreeSet;
use std::rc::Rc;

use taskscape::config::BoardConfig;
use taskscape::core::{Priority, Task, TaskId};
use taskscape::glyphs::{GlyphCache, GlyphProvider, GlyphSet, StaticGlyphs};
use taskscape::render::{
    BoardHandle, Lifecycle, LifecyclePhase, OwnedAssets, PointerPressed, SceneHandles,
    SelectionHandler, SyncStats, TaskBoardPlugin, TaskIndex, TaskVisual, ViewportHost,
    project_to_viewport,
};
use taskscape::viewport::{ContainerElement, HeadlessContainer};

pub struct Board {
    pub app: App,
    pub container: HeadlessContainer,
    pub selected: Rc<RefCell<Vec<TaskId>>>,
}

pub fn board() -> Board {
    board_with(
        BoardConfig::default(),
        StaticGlyphs(GlyphSet::monospace(0.6)),
        HeadlessContainer::new(800.0, 600.0),
    )
}

pub fn board_with(
    config: BoardConfig,
    glyphs: impl GlyphProvider,
    container: HeadlessContainer,
) -> Board {
    let selected = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&selected);

    let mut app = App::new();
    app.add_plugins(MinimalPlugins)
        .init_resource::<Assets<Mesh>>()
        .init_resource::<Assets<StandardMaterial>>()
        .insert_non_send_resource(ViewportHost::new(container.clone()))
        .insert_non_send_resource(SelectionHandler::new(move |id: &TaskId| {
            sink.borrow_mut().push(id.clone())
        }))
        .add_plugins(TaskBoardPlugin::new(config, glyphs).with_cache(GlyphCache::default()));

    Board {
        app,
        container,
        selected,
    }
}

pub fn abc() -> Vec<Task> {
    vec![
        Task::new("a", "write the report"),
        Task::new("b", "review pull request").priority(Priority::High),
        Task::new("c", "water plants").completed(true),
    ]
}

impl Board {
    pub fn handle(&self) -> BoardHandle {
        self.app.world().resource::<BoardHandle>().clone()
    }

    pub fn update(&mut self) {
        self.app.update();
    }

    pub fn stats(&self) -> SyncStats {
        self.app.world().resource::<SyncStats>().clone()
    }

    pub fn phase(&self) -> LifecyclePhase {
        self.app.world().resource::<Lifecycle>().phase()
    }

    pub fn handles(&self) -> Option<SceneHandles> {
        self.app.world().get_resource::<SceneHandles>().copied()
    }

    /// Task ids tagged on the task group's children.
    pub fn visual_ids(&mut self) -> BTreeSet<String> {
        let Some(handles) = self.handles() else {
            return BTreeSet::new();
        };
        let children: Vec<Entity> = self
            .app
            .world()
            .get::<Children>(handles.group)
            .map(|children| children.iter().collect())
            .unwrap_or_default();
        children
            .into_iter()
            .filter_map(|entity| self.app.world().get::<TaskVisual>(entity))
            .map(|visual| visual.task_id.as_str().to_owned())
            .collect()
    }

    pub fn group_child_count(&self) -> usize {
        self.handles()
            .and_then(|handles| self.app.world().get::<Children>(handles.group))
            .map_or(0, |children| children.len())
    }

    pub fn visual_entity(&self, id: &str) -> Entity {
        self.app
            .world()
            .resource::<TaskIndex>()
            .get(&TaskId::from(id))
            .unwrap_or_else(|| panic!("no visual for task {id}"))
    }

    /// Every asset handle owned by a task visual and its glyph node.
    pub fn owned_by(&self, entity: Entity) -> Vec<OwnedAssets> {
        let world = self.app.world();
        let mut owned = vec![world.get::<OwnedAssets>(entity).unwrap().clone()];
        if let Some(children) = world.get::<Children>(entity) {
            owned.extend(
                children
                    .iter()
                    .filter_map(|child| world.get::<OwnedAssets>(child).cloned()),
            );
        }
        owned
    }

    pub fn mesh_count(&self) -> usize {
        self.app.world().resource::<Assets<Mesh>>().len()
    }

    pub fn material_count(&self) -> usize {
        self.app.world().resource::<Assets<StandardMaterial>>().len()
    }

    /// Client coordinates of a task visual's center.
    pub fn screen_position_of(&mut self, id: &str) -> Vec2 {
        let entity = self.visual_entity(id);
        let handles = self.handles().unwrap();
        let world = self.app.world();
        let point = world.get::<Transform>(entity).unwrap().translation;
        let camera = *world.get::<Transform>(handles.camera).unwrap();
        let Some(Projection::Perspective(projection)) = world.get::<Projection>(handles.camera)
        else {
            panic!("board camera is not perspective");
        };
        project_to_viewport(point, &camera, projection, self.container.bounding_rect()).unwrap()
    }

    pub fn click(&mut self, position: Vec2) {
        self.app
            .world_mut()
            .resource_mut::<Messages<PointerPressed>>()
            .write(PointerPressed { position });
        self.update();
    }

    /// The visuals under the task group match the deduplicated task list and
    /// the index points at them.
    pub fn assert_in_sync(&mut self, tasks: &[Task]) {
        let mut expected = BTreeSet::new();
        for task in tasks {
            if !task.id.is_empty() {
                expected.insert(task.id.as_str().to_owned());
            }
        }
        assert_eq!(self.visual_ids(), expected);
        assert_eq!(self.group_child_count(), expected.len());

        let index_len = self.app.world().resource::<TaskIndex>().len();
        assert_eq!(index_len, expected.len());
        for id in &expected {
            let entity = self.visual_entity(id);
            let visual = self.app.world().get::<TaskVisual>(entity).unwrap();
            assert_eq!(visual.task_id.as_str(), id);
        }
    }
}
