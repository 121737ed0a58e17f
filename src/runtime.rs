use bevy::prelude::*;

use crate::config::BoardConfig;
use crate::core::{Task, TaskId};
use crate::glyphs::GlyphProvider;
use crate::render::{SelectionHandler, TaskBoardPlugin, TaskList, ViewportHost};

#[cfg(not(target_arch = "wasm32"))]
use crate::viewport::HeadlessContainer;

/// Stand-in container that tracks the primary window on desktop.
#[cfg(not(target_arch = "wasm32"))]
#[derive(Resource)]
struct WindowContainer(HeadlessContainer);

#[cfg(not(target_arch = "wasm32"))]
fn follow_primary_window(
    windows: Query<&Window, With<bevy::window::PrimaryWindow>>,
    container: Res<WindowContainer>,
) {
    if let Ok(window) = windows.single() {
        container.0.set_size(window.width(), window.height());
    }
}

#[cfg(not(target_arch = "wasm32"))]
pub fn run_task_board(
    tasks: Vec<Task>,
    config: BoardConfig,
    glyphs: impl GlyphProvider,
    on_select: impl Fn(&TaskId) + 'static,
) -> crate::Result<()> {
    config.validate()?;

    let window = Window::default();
    let container = HeadlessContainer::new(window.width(), window.height())
        .with_pixel_ratio(window.scale_factor());

    App::new()
        .insert_resource(ClearColor(config.stage.background.into()))
        .add_plugins(DefaultPlugins.set(WindowPlugin {
            primary_window: Some(Window {
                title: "taskscape".into(),
                ..window
            }),
            ..default()
        }))
        .insert_non_send_resource(ViewportHost::new(container.clone()))
        .insert_non_send_resource(SelectionHandler::new(on_select))
        .insert_resource(WindowContainer(container))
        .add_plugins(TaskBoardPlugin::new(config, glyphs))
        .insert_resource(TaskList(tasks))
        .add_systems(PreUpdate, follow_primary_window)
        .run();
    Ok(())
}

/// Mount a board into the element with id `container_id` and start the app.
/// The returned handle drives the running board.
#[cfg(target_arch = "wasm32")]
pub fn run_task_board(
    tasks: Vec<Task>,
    config: BoardConfig,
    glyphs: impl GlyphProvider,
    on_select: impl Fn(&TaskId) + 'static,
    container_id: &str,
) -> crate::Result<crate::render::BoardHandle> {
    use error_stack::Report;
    use wasm_bindgen::JsCast;

    use crate::TaskscapeError;
    use crate::render::BoardHandle;
    use crate::viewport::{ContainerElement, DomContainer};

    config.validate()?;

    let detached = || {
        Report::new(TaskscapeError::ContainerDetached)
            .attach(format!("no element with id {container_id:?}"))
    };
    let document = web_sys::window()
        .and_then(|w| w.document())
        .ok_or_else(detached)?;
    let element = document
        .get_element_by_id(container_id)
        .and_then(|e| e.dyn_into::<web_sys::HtmlElement>().ok())
        .ok_or_else(detached)?;
    let canvas = document
        .create_element("canvas")
        .ok()
        .and_then(|e| e.dyn_into::<web_sys::HtmlCanvasElement>().ok())
        .ok_or_else(detached)?;
    let canvas_id = format!("{container_id}-board");
    canvas.set_id(&canvas_id);

    // The window plugin looks the canvas up by selector, so it has to be in
    // the document before the app starts.
    let mut container = DomContainer::new(element, canvas);
    if !container.is_attached() {
        return Err(detached());
    }
    container.attach_surface(bevy::math::UVec2::ONE);

    let mut app = App::new();
    app.insert_resource(ClearColor(config.stage.background.into()))
        .add_plugins(DefaultPlugins.set(WindowPlugin {
            primary_window: Some(Window {
                canvas: Some(format!("#{canvas_id}")),
                fit_canvas_to_parent: true,
                ..default()
            }),
            ..default()
        }))
        .insert_non_send_resource(ViewportHost::new(container))
        .insert_non_send_resource(SelectionHandler::new(on_select))
        .add_plugins(TaskBoardPlugin::new(config, glyphs))
        .insert_resource(TaskList(tasks));

    let handle = app.world().resource::<BoardHandle>().clone();
    app.run();
    Ok(handle)
}
