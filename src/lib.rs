pub mod config;
pub mod core;
pub mod glyphs;
pub mod render;
pub mod runtime;
pub mod viewport;

#[cfg(target_arch = "wasm32")]
pub mod wasm_api;

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum TaskscapeError {
    #[error("container element is not attached to the document")]
    ContainerDetached,

    #[error("glyph data failed to load: {0}")]
    GlyphLoad(String),

    #[error("failed to release scene resource: {0}")]
    Dispose(String),

    #[error("invalid lifecycle transition from {from} on {event}")]
    InvalidTransition { from: &'static str, event: &'static str },

    #[error("malformed task list")]
    MalformedTasks,

    #[error("invalid board configuration: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, error_stack::Report<TaskscapeError>>;

#[cfg(target_arch = "wasm32")]
use wasm_bindgen::prelude::*;

#[cfg(target_arch = "wasm32")]
#[wasm_bindgen(start)]
pub fn start() {
    console_error_panic_hook::set_once();
}

pub mod prelude {
    pub use crate::config::*;
    pub use crate::core::*;
    pub use crate::glyphs::*;
    pub use crate::render::*;
    pub use crate::runtime::*;
    pub use crate::viewport::*;
    pub use crate::{Result, TaskscapeError};
}
