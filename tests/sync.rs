mod common;

use bevy::prelude::*;
use common::{abc, board};
use taskscape::config::BoardConfig;
use taskscape::core::{Priority, Task};
use taskscape::render::{OwnedAssets, TaskVisual};

fn handles_live(board: &common::Board, owned: &[OwnedAssets]) -> bool {
    let world = board.app.world();
    let meshes = world.resource::<Assets<Mesh>>();
    let materials = world.resource::<Assets<StandardMaterial>>();
    owned.iter().all(|assets| {
        meshes.get(&assets.mesh).is_some()
            && assets
                .material
                .as_ref()
                .is_none_or(|material| materials.get(material).is_some())
    })
}

#[test]
fn first_pass_builds_one_visual_per_task() {
    let mut board = board();
    board.handle().set_tasks(abc());
    board.update();

    board.assert_in_sync(&abc());
    let stats = board.stats();
    assert_eq!(stats.created, 3);
    assert_eq!(stats.removed, 0);
}

#[test]
fn removing_a_task_releases_its_assets_once() {
    let mut board = board();
    board.handle().set_tasks(abc());
    board.update();

    let b = board.visual_entity("b");
    let owned = board.owned_by(b);
    assert_eq!(owned.len(), 2, "plate and glyph node");
    assert!(handles_live(&board, &owned));
    let released_before = board.stats().assets.releases();

    let remaining: Vec<Task> = abc().into_iter().filter(|t| t.id.as_str() != "b").collect();
    board.handle().set_tasks(remaining.clone());
    board.update();

    board.assert_in_sync(&remaining);
    assert_eq!(board.group_child_count(), 2);
    assert!(board.app.world().get_entity(b).is_err());

    let stats = board.stats();
    assert_eq!(stats.removed, 1);
    assert_eq!(stats.disposal_failures, 0);
    // Two meshes and two materials, each released exactly once.
    assert_eq!(stats.assets.releases() - released_before, 4);

    let world = board.app.world();
    let meshes = world.resource::<Assets<Mesh>>();
    assert!(owned.iter().all(|assets| meshes.get(&assets.mesh).is_none()));
}

#[test]
fn identical_list_allocates_nothing() {
    let mut board = board();
    board.handle().set_tasks(abc());
    board.update();

    let before = board.stats();
    let meshes = board.mesh_count();
    let a = board.visual_entity("a");

    board.handle().set_tasks(abc());
    board.update();

    let after = board.stats();
    assert_eq!(after.passes, before.passes + 1);
    assert_eq!(after.created, before.created);
    assert_eq!(after.updated, before.updated);
    assert_eq!(after.removed, before.removed);
    assert_eq!(after.assets, before.assets);
    assert_eq!(board.mesh_count(), meshes);
    assert_eq!(board.visual_entity("a"), a);
}

#[test]
fn completion_recolors_in_place() {
    let mut board = board();
    board.handle().set_tasks(abc());
    board.update();

    let a = board.visual_entity("a");
    let material = board.owned_by(a)[0].material.clone().unwrap();
    let allocations = board.stats().assets.allocations();

    let mut tasks = abc();
    tasks[0] = Task::new("a", "write the report").completed(true);
    board.handle().set_tasks(tasks.clone());
    board.update();

    board.assert_in_sync(&tasks);
    assert_eq!(board.visual_entity("a"), a);
    assert_eq!(board.stats().assets.allocations(), allocations);

    let world = board.app.world();
    let expected: Color = BoardConfig::default()
        .palette
        .task_color(true, Priority::Medium)
        .into();
    let actual = world
        .resource::<Assets<StandardMaterial>>()
        .get(&material)
        .unwrap()
        .base_color;
    assert_eq!(actual, expected);
    assert!(world.get::<TaskVisual>(a).unwrap().completed);
}

#[test]
fn renamed_task_rebuilds_only_its_label() {
    let mut board = board();
    board.handle().set_tasks(abc());
    board.update();

    let b = board.visual_entity("b");
    let old = board.owned_by(b);
    let c_assets = board.owned_by(board.visual_entity("c"));

    let mut tasks = abc();
    tasks[1] = Task::new("b", "review the other pull request").priority(Priority::High);
    board.handle().set_tasks(tasks.clone());
    board.update();

    board.assert_in_sync(&tasks);
    assert_eq!(board.visual_entity("b"), b);
    assert_eq!(
        board.app.world().get::<TaskVisual>(b).unwrap().text,
        "review the other pull request"
    );
    assert!(!handles_live(&board, &old[1..]), "old glyph node released");
    assert!(handles_live(&board, &board.owned_by(b)));
    assert!(handles_live(&board, &c_assets));
}

#[test]
fn duplicate_ids_keep_the_first_task() {
    let mut board = board();
    let tasks = vec![
        Task::new("a", "first"),
        Task::new("a", "second"),
        Task::new("", "nameless"),
        Task::new("b", "other"),
    ];
    board.handle().set_tasks(tasks.clone());
    board.update();

    board.assert_in_sync(&tasks);
    let a = board.visual_entity("a");
    assert_eq!(board.app.world().get::<TaskVisual>(a).unwrap().text, "first");
    assert_eq!(board.stats().skipped, 2);
}

#[test]
fn emptying_the_list_clears_the_group() {
    let mut board = board();
    board.handle().set_tasks(abc());
    board.update();

    board.handle().set_tasks(Vec::new());
    board.update();

    board.assert_in_sync(&[]);
    assert_eq!(board.stats().removed, 3);
}

#[test]
fn reordering_moves_without_recreating() {
    let mut board = board();
    board.handle().set_tasks(abc());
    board.update();

    let c = board.visual_entity("c");
    let first_slot = board.app.world().get::<Transform>(board.visual_entity("a")).unwrap().translation;

    let mut tasks = abc();
    tasks.rotate_right(1);
    board.handle().set_tasks(tasks.clone());
    board.update();

    board.assert_in_sync(&tasks);
    assert_eq!(board.visual_entity("c"), c);
    assert_eq!(board.app.world().get::<Transform>(c).unwrap().translation, first_slot);
    assert_eq!(board.stats().created, 3);
}
