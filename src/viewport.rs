//! The element the board renders into.
//!
//! A container has an observable CSS size and may host a draw surface. On the
//! web this is a DOM element with a `<canvas>`; natively and in tests it is a
//! [`HeadlessContainer`] whose size the host updates by hand.

use bevy_math::{Rect, UVec2, Vec2};
use parking_lot::Mutex;
use std::sync::Arc;

pub trait ContainerElement {
    /// Whether the element is currently part of a document.
    fn is_attached(&self) -> bool;
    /// Layout size in CSS pixels.
    fn size(&self) -> Vec2;
    /// Bounding rectangle in client coordinates.
    fn bounding_rect(&self) -> Rect;
    fn pixel_ratio(&self) -> f32;
    /// Insert the draw surface at the given physical size.
    fn attach_surface(&mut self, physical: UVec2);
    fn resize_surface(&mut self, physical: UVec2);
    /// Remove the draw surface and release its backing store. Safe to repeat.
    fn detach_surface(&mut self);
    fn surface_size(&self) -> Option<UVec2>;
}

/// Physical pixel size for a CSS size at a given pixel ratio.
pub fn physical_size(css: Vec2, pixel_ratio: f32) -> UVec2 {
    (css * pixel_ratio).round().max(Vec2::ONE).as_uvec2()
}

#[derive(Debug, Clone)]
struct HeadlessState {
    attached: bool,
    origin: Vec2,
    size: Vec2,
    pixel_ratio: f32,
    surface: Option<UVec2>,
    surface_detaches: u32,
}

/// In-memory container. Clones share state, so a host can keep one handle to
/// resize it while the board owns another.
#[derive(Debug, Clone)]
pub struct HeadlessContainer {
    state: Arc<Mutex<HeadlessState>>,
}

impl HeadlessContainer {
    pub fn new(width: f32, height: f32) -> Self {
        Self {
            state: Arc::new(Mutex::new(HeadlessState {
                attached: true,
                origin: Vec2::ZERO,
                size: Vec2::new(width, height),
                pixel_ratio: 1.0,
                surface: None,
                surface_detaches: 0,
            })),
        }
    }

    /// A container that was never inserted into a document.
    pub fn detached(width: f32, height: f32) -> Self {
        let container = Self::new(width, height);
        container.state.lock().attached = false;
        container
    }

    pub fn with_origin(self, origin: Vec2) -> Self {
        self.state.lock().origin = origin;
        self
    }

    pub fn with_pixel_ratio(self, ratio: f32) -> Self {
        self.state.lock().pixel_ratio = ratio;
        self
    }

    pub fn set_size(&self, width: f32, height: f32) {
        self.state.lock().size = Vec2::new(width, height);
    }

    pub fn set_attached(&self, attached: bool) {
        self.state.lock().attached = attached;
    }

    /// How many times an attached surface was actually removed.
    pub fn surface_detaches(&self) -> u32 {
        self.state.lock().surface_detaches
    }
}

impl ContainerElement for HeadlessContainer {
    fn is_attached(&self) -> bool {
        self.state.lock().attached
    }

    fn size(&self) -> Vec2 {
        self.state.lock().size
    }

    fn bounding_rect(&self) -> Rect {
        let state = self.state.lock();
        Rect::from_corners(state.origin, state.origin + state.size)
    }

    fn pixel_ratio(&self) -> f32 {
        self.state.lock().pixel_ratio
    }

    fn attach_surface(&mut self, physical: UVec2) {
        self.state.lock().surface = Some(physical);
    }

    fn resize_surface(&mut self, physical: UVec2) {
        let mut state = self.state.lock();
        if state.surface.is_some() {
            state.surface = Some(physical);
        }
    }

    fn detach_surface(&mut self) {
        let mut state = self.state.lock();
        if state.surface.take().is_some() {
            state.surface_detaches += 1;
        }
    }

    fn surface_size(&self) -> Option<UVec2> {
        self.state.lock().surface
    }
}

/// A DOM element hosting the board's canvas.
#[cfg(target_arch = "wasm32")]
pub struct DomContainer {
    element: web_sys::HtmlElement,
    canvas: web_sys::HtmlCanvasElement,
}

#[cfg(target_arch = "wasm32")]
impl DomContainer {
    pub fn new(element: web_sys::HtmlElement, canvas: web_sys::HtmlCanvasElement) -> Self {
        Self { element, canvas }
    }
}

#[cfg(target_arch = "wasm32")]
impl ContainerElement for DomContainer {
    fn is_attached(&self) -> bool {
        self.element.is_connected()
    }

    fn size(&self) -> Vec2 {
        Vec2::new(
            self.element.client_width() as f32,
            self.element.client_height() as f32,
        )
    }

    fn bounding_rect(&self) -> Rect {
        let r = self.element.get_bounding_client_rect();
        Rect::new(
            r.left() as f32,
            r.top() as f32,
            r.right() as f32,
            r.bottom() as f32,
        )
    }

    fn pixel_ratio(&self) -> f32 {
        web_sys::window()
            .map(|w| w.device_pixel_ratio() as f32)
            .unwrap_or(1.0)
    }

    fn attach_surface(&mut self, physical: UVec2) {
        if !self.canvas.is_connected() {
            if let Err(err) = self.element.append_child(&self.canvas) {
                bevy::log::error!("failed to attach board canvas: {err:?}");
            }
        }
        self.resize_surface(physical);
    }

    fn resize_surface(&mut self, physical: UVec2) {
        self.canvas.set_width(physical.x);
        self.canvas.set_height(physical.y);
    }

    fn detach_surface(&mut self) {
        if self.canvas.is_connected() {
            self.canvas.remove();
        }
        // Zero-sized canvases drop their backing store.
        self.canvas.set_width(0);
        self.canvas.set_height(0);
    }

    fn surface_size(&self) -> Option<UVec2> {
        self.canvas
            .is_connected()
            .then(|| UVec2::new(self.canvas.width(), self.canvas.height()))
    }
}
