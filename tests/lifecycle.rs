mod common;

use bevy::prelude::*;
use bevy_camera::Projection;
use common::{abc, board, board_with};
use taskscape::config::BoardConfig;
use taskscape::glyphs::{GlyphSet, StaticGlyphs, glyph_channel};
use taskscape::render::{LifecyclePhase, RenderLoop};
use taskscape::viewport::{ContainerElement, HeadlessContainer};

fn manual_mount() -> BoardConfig {
    BoardConfig {
        auto_mount: false,
        ..BoardConfig::default()
    }
}

#[test]
fn mounts_on_first_update() {
    let mut board = board();
    board.update();

    assert_eq!(board.phase(), LifecyclePhase::Ready);
    assert!(board.handles().is_some());
    assert!(board.app.world().resource::<RenderLoop>().is_running());
    assert_eq!(board.container.surface_size(), Some(UVec2::new(800, 600)));
    assert_eq!(board.stats().scene_initializations, 1);
}

#[test]
fn detached_container_never_mounts() {
    let mut board = board_with(
        BoardConfig::default(),
        StaticGlyphs(GlyphSet::monospace(0.6)),
        HeadlessContainer::detached(800.0, 600.0),
    );
    board.update();

    assert_eq!(board.phase(), LifecyclePhase::Unmounted);
    assert!(board.handles().is_none());
    assert_eq!(board.stats().scene_initializations, 0);
    assert_eq!(board.mesh_count(), 0);
    assert_eq!(board.container.surface_size(), None);
}

#[test]
fn updates_before_mount_are_dropped_but_the_latest_list_is_shown() {
    let mut board = board_with(
        manual_mount(),
        StaticGlyphs(GlyphSet::monospace(0.6)),
        HeadlessContainer::new(800.0, 600.0),
    );
    let handle = board.handle();

    handle.set_tasks(abc());
    board.update();
    assert_eq!(board.phase(), LifecyclePhase::Unmounted);
    assert_eq!(board.stats().dropped_updates, 1);
    assert!(board.handles().is_none());

    handle.mount();
    board.update();
    assert_eq!(board.phase(), LifecyclePhase::Ready);
    board.assert_in_sync(&abc());
}

#[test]
fn resize_keeps_the_scene() {
    let mut board = board();
    board.handle().set_tasks(abc());
    board.update();
    let a = board.visual_entity("a");
    let allocations = board.stats().assets.allocations();

    board.container.set_size(400.0, 300.0);
    board.update();

    assert_eq!(board.container.surface_size(), Some(UVec2::new(400, 300)));
    let camera = board.handles().unwrap().camera;
    let Some(Projection::Perspective(projection)) = board.app.world().get::<Projection>(camera)
    else {
        panic!("board camera is not perspective");
    };
    assert!((projection.aspect_ratio - 4.0 / 3.0).abs() < 1e-6);

    board.container.set_size(1000.0, 500.0);
    board.update();
    let Some(Projection::Perspective(projection)) = board.app.world().get::<Projection>(camera)
    else {
        panic!("board camera is not perspective");
    };
    assert!((projection.aspect_ratio - 2.0).abs() < 1e-6);
    assert_eq!(board.container.surface_size(), Some(UVec2::new(1000, 500)));

    assert_eq!(board.stats().scene_initializations, 1);
    assert_eq!(board.stats().assets.allocations(), allocations);
    assert_eq!(board.visual_entity("a"), a);
}

#[test]
fn surface_follows_pixel_ratio() {
    let mut board = board_with(
        BoardConfig::default(),
        StaticGlyphs(GlyphSet::monospace(0.6)),
        HeadlessContainer::new(800.0, 600.0).with_pixel_ratio(2.0),
    );
    board.update();
    assert_eq!(board.container.surface_size(), Some(UVec2::new(1600, 1200)));
}

#[test]
fn unmount_releases_everything() {
    let mut board = board();
    board.handle().set_tasks(abc());
    board.update();
    assert!(board.mesh_count() > 0);

    board.handle().unmount();
    board.update();

    assert_eq!(board.phase(), LifecyclePhase::Unmounted);
    assert!(board.handles().is_none());
    assert_eq!(board.mesh_count(), 0);
    assert_eq!(board.material_count(), 0);
    assert_eq!(board.container.surface_detaches(), 1);
    assert_eq!(board.container.surface_size(), None);

    let stats = board.stats();
    assert_eq!(stats.assets.allocations(), stats.assets.releases());
    assert_eq!(stats.disposal_failures, 0);
    assert_eq!(stats.removed, 3);
}

#[test]
fn no_frame_runs_after_unmount() {
    let mut board = board();
    board.update();
    board.update();

    board.handle().unmount();
    board.update();
    let frames = board.app.world().resource::<RenderLoop>().frames();
    assert!(!board.app.world().resource::<RenderLoop>().is_running());

    board.update();
    board.update();
    assert_eq!(board.app.world().resource::<RenderLoop>().frames(), frames);
}

#[test]
fn unmount_twice_is_harmless() {
    let mut board = board();
    board.handle().set_tasks(abc());
    board.update();

    let handle = board.handle();
    handle.unmount();
    handle.unmount();
    board.update();
    handle.unmount();
    board.update();

    assert_eq!(board.phase(), LifecyclePhase::Unmounted);
    assert_eq!(board.container.surface_detaches(), 1);
    assert_eq!(board.stats().disposal_failures, 0);
}

#[test]
fn task_updates_after_unmount_touch_nothing() {
    let mut board = board();
    board.update();
    board.handle().unmount();
    board.update();

    board.handle().set_tasks(abc());
    board.update();

    assert!(board.handles().is_none());
    assert_eq!(board.mesh_count(), 0);
    assert_eq!(board.stats().created, 0);
}

#[test]
fn remount_builds_a_fresh_scene() {
    let mut board = board();
    let handle = board.handle();
    handle.set_tasks(abc());
    board.update();
    handle.unmount();
    board.update();

    handle.mount();
    board.update();

    assert_eq!(board.phase(), LifecyclePhase::Ready);
    assert_eq!(board.stats().scene_initializations, 2);
    board.assert_in_sync(&abc());
}

#[test]
fn unmount_then_mount_in_one_frame_remounts() {
    let mut board = board();
    let handle = board.handle();
    handle.set_tasks(abc());
    board.update();

    handle.unmount();
    handle.mount();
    board.update();
    assert_eq!(board.phase(), LifecyclePhase::Mounting);
    assert_eq!(board.container.surface_detaches(), 1);

    board.update();
    assert_eq!(board.phase(), LifecyclePhase::Ready);
    assert!(board.handles().is_some());
    assert_eq!(board.stats().scene_initializations, 2);
    board.assert_in_sync(&abc());
}

#[test]
fn mount_then_unmount_during_teardown_stays_unmounted() {
    let mut board = board();
    board.update();

    let handle = board.handle();
    handle.unmount();
    handle.mount();
    handle.unmount();
    board.update();
    board.update();

    assert_eq!(board.phase(), LifecyclePhase::Unmounted);
    assert_eq!(board.stats().scene_initializations, 1);
}

#[test]
fn release_failure_during_unmount_does_not_stop_teardown() {
    let mut board = board();
    board.handle().set_tasks(abc());
    board.update();

    let plate = board.owned_by(board.visual_entity("a"))[0].mesh.clone();
    board
        .app
        .world_mut()
        .resource_mut::<Assets<Mesh>>()
        .remove(&plate);

    board.handle().unmount();
    board.update();

    assert_eq!(board.phase(), LifecyclePhase::Unmounted);
    assert!(board.handles().is_none());
    assert_eq!(board.stats().disposal_failures, 1);
    assert_eq!(board.stats().removed, 3);
    assert_eq!(board.mesh_count(), 0);
    assert_eq!(board.material_count(), 0);
    assert_eq!(board.container.surface_detaches(), 1);
}

#[test]
fn labels_wait_for_glyphs() {
    let (feed, provider) = glyph_channel();
    let mut board = board_with(
        BoardConfig::default(),
        provider,
        HeadlessContainer::new(800.0, 600.0),
    );
    board.handle().set_tasks(abc());
    board.update();

    assert_eq!(board.phase(), LifecyclePhase::Ready);
    assert_eq!(board.group_child_count(), 0);
    assert_eq!(board.stats().deferred, 3);

    feed.resolve(GlyphSet::monospace(0.6));
    board.update();
    board.assert_in_sync(&abc());
}

#[test]
fn failed_glyph_load_leaves_the_group_empty() {
    let (feed, provider) = glyph_channel();
    let mut board = board_with(
        BoardConfig::default(),
        provider,
        HeadlessContainer::new(800.0, 600.0),
    );
    board.handle().set_tasks(abc());
    board.update();

    feed.reject("font fetch failed");
    board.update();
    board.update();

    assert_eq!(board.phase(), LifecyclePhase::Ready);
    assert_eq!(board.group_child_count(), 0);
    assert!(board.handles().is_some());
    assert!(board.app.world().resource::<RenderLoop>().is_running());
}

#[test]
fn glyphs_supplied_after_a_rejection_show_labels() {
    let (feed, provider) = glyph_channel();
    let mut board = board_with(
        BoardConfig::default(),
        provider,
        HeadlessContainer::new(800.0, 600.0),
    );
    board.handle().set_tasks(abc());
    board.update();

    feed.reject("font fetch failed");
    board.update();
    assert_eq!(board.group_child_count(), 0);

    feed.resolve(GlyphSet::monospace(0.6));
    for _ in 0..8 {
        board.update();
    }

    assert_eq!(board.phase(), LifecyclePhase::Ready);
    board.assert_in_sync(&abc());
}
