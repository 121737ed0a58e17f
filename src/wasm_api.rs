//! WASM API exports for JavaScript interop
//!
//! `#[wasm_bindgen]` bindings that let a page mount a task board into a
//! container element and keep feeding it the store's task list. Only
//! compiled when targeting wasm32.

#![cfg(target_arch = "wasm32")]

use bevy::log::{error, warn};
use wasm_bindgen::prelude::*;

use crate::config::BoardConfig;
use crate::core::tasks_from_json;
use crate::glyphs::{GlyphFeed, GlyphSet, glyph_channel};
use crate::render::BoardHandle;
use crate::runtime::run_task_board;

fn to_js(report: error_stack::Report<crate::TaskscapeError>) -> JsValue {
    JsValue::from_str(&format!("{report:?}"))
}

/// JavaScript-accessible task board
#[wasm_bindgen]
pub struct JsTaskBoard {
    handle: BoardHandle,
    glyphs: GlyphFeed,
    glyphs_supplied: bool,
}

#[wasm_bindgen]
impl JsTaskBoard {
    /// Mount a board into the element with id `container_id`.
    ///
    /// # Arguments
    /// * `container_id` - id of the hosting element (without #)
    /// * `tasks_json` - initial task list, an array of task records
    /// * `config_json` - board configuration; `"{}"` for defaults
    /// * `on_select` - called with the task id string when a task is clicked
    #[wasm_bindgen(constructor)]
    pub fn new(
        container_id: &str,
        tasks_json: &str,
        config_json: &str,
        on_select: js_sys::Function,
    ) -> Result<JsTaskBoard, JsValue> {
        let tasks = tasks_from_json(tasks_json).map_err(to_js)?;
        let config = BoardConfig::from_json(config_json).map_err(to_js)?;
        let (feed, provider) = glyph_channel();

        let notify = move |id: &crate::core::TaskId| {
            if let Err(err) = on_select.call1(&JsValue::NULL, &JsValue::from_str(id.as_str())) {
                error!("task selection callback threw: {err:?}");
            }
        };
        let handle = run_task_board(tasks, config, provider, notify, container_id).map_err(to_js)?;

        Ok(JsTaskBoard {
            handle,
            glyphs: feed,
            glyphs_supplied: false,
        })
    }

    /// Replace the task list. Takes effect on the next frame once mounted.
    #[wasm_bindgen]
    pub fn set_tasks(&self, tasks_json: &str) -> Result<(), JsValue> {
        let tasks = tasks_from_json(tasks_json).map_err(to_js)?;
        self.handle.set_tasks(tasks);
        Ok(())
    }

    /// Supply glyph metrics as typeface JSON. Allowed again after a rejection;
    /// once glyphs were accepted further calls are ignored.
    #[wasm_bindgen]
    pub fn set_glyphs(&mut self, typeface_json: &str) -> Result<(), JsValue> {
        if self.glyphs_supplied {
            warn!("glyphs already supplied");
            return Ok(());
        }
        match GlyphSet::from_typeface_json(typeface_json) {
            Ok(glyphs) => {
                self.glyphs.resolve(glyphs);
                self.glyphs_supplied = true;
                Ok(())
            }
            Err(err) => {
                let message = err.to_string();
                self.glyphs.reject(message.clone());
                Err(JsValue::from_str(&message))
            }
        }
    }

    /// Report that the font could not be fetched. Labels stay hidden until a
    /// later `set_glyphs`.
    #[wasm_bindgen]
    pub fn reject_glyphs(&mut self, reason: &str) {
        if !self.glyphs_supplied {
            self.glyphs.reject(reason);
        }
    }

    #[wasm_bindgen]
    pub fn mount(&self) {
        self.handle.mount();
    }

    #[wasm_bindgen]
    pub fn unmount(&self) {
        self.handle.unmount();
    }
}
