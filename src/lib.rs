/// AlterPage - Chrome Extension for User Scripts
/// Built with Rust + WASM + Yew

pub mod config;
pub mod error;
pub mod script_data;
pub mod metadata;
pub mod pattern;
pub mod storage;
pub mod injector;
pub mod coordinator;
pub mod router;
mod chrome;
pub mod background;
pub mod ui;

#[cfg(test)]
mod test_support;

use wasm_bindgen::prelude::*;

// Set up panic hook for better error messages in the browser console
#[wasm_bindgen(start)]
pub fn main() {
    console_error_panic_hook::set_once();
    wasm_logger::init(wasm_logger::Config::default());
}

// Start the background service worker logic; returns the event handlers
#[wasm_bindgen]
pub fn start_background(config: JsValue) -> Result<JsValue, JsValue> {
    background::start(config)
}

// Start the Yew app for the popup
#[wasm_bindgen]
pub fn start_popup() {
    yew::Renderer::<ui::popup::App>::new().render();
}

// Re-export pattern matching for JavaScript access
#[wasm_bindgen]
pub fn matches_url(url: &str, patterns: Vec<String>) -> bool {
    pattern::matches_url(url, &patterns)
}
